//! Translation of the launcher's exit status into the harness exit code.

use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;

/// Shell-style encoding: a non-zero exit code passes through unchanged,
/// death by signal `N` becomes `128 + N`, anything else is success. CI can
/// therefore tell a normal failure from a signal death.
pub fn translate(code: Option<i32>, signal: Option<i32>) -> i32 {
    match (code, signal) {
        (Some(code), _) if code != 0 => code,
        (_, Some(signal)) => 128 + signal,
        _ => 0,
    }
}

pub fn from_status(status: ExitStatus) -> i32 {
    translate(status.code(), status.signal())
}
