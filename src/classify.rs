//! Classification of the lines the launcher prints on stderr.
//!
//! `systemd-run` announces the transient unit's fate there; everything else
//! is ordinary diagnostic text that the supervisor buffers or passes through.

use std::sync::LazyLock;

use regex::Regex;

/// What a single stderr line means. Matching is anchored at line start and
/// unit names follow the `[A-Za-z0-9@_-]+.service` grammar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineClass {
    /// The transient unit is up; carries the unit name.
    UnitLive(String),
    /// The transient unit failed to start; carries the unit name.
    UnitFailed(String),
    /// The "see systemctl status / journalctl" hint printed next to a
    /// failure; carries no new information and is dropped.
    DetailsHint,
    /// Ordinary diagnostic text.
    Other,
}

static UNIT_LIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^Running as unit:\s*([A-Za-z0-9@_-]+\.service)\b").unwrap()
});

static UNIT_FAILED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^Job for ([A-Za-z0-9@_-]+\.service) failed\b").unwrap()
});

static DETAILS_HINT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^See "systemctl status[^"]*" and "journalctl[^"]*" for details\b"#).unwrap()
});

/// Classify one stderr line. Stateless; acting on the result is the
/// supervisor's job.
pub fn classify(line: &str) -> LineClass {
    if let Some(caps) = UNIT_LIVE.captures(line) {
        return LineClass::UnitLive(caps[1].to_string());
    }
    if let Some(caps) = UNIT_FAILED.captures(line) {
        return LineClass::UnitFailed(caps[1].to_string());
    }
    if DETAILS_HINT.is_match(line) {
        return LineClass::DetailsHint;
    }
    LineClass::Other
}
