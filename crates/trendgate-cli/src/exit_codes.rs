//! Process exit codes. Part of the public contract: CI workflows branch on them.

use trendgate_core::Error;

/// Success, gate passed or inconclusive, or a soft-mode gate failure.
pub const SUCCESS: i32 = 0;
/// Hard-mode quality gate failed.
pub const GATE_FAILED: i32 = 1;
/// Configuration, validation or collection input error.
pub const USER_ERROR: i32 = 2;
/// Storage or report output failure.
pub const INFRA_ERROR: i32 = 3;

pub fn for_error(err: &Error) -> i32 {
    if err.is_user_error() {
        USER_ERROR
    } else {
        INFRA_ERROR
    }
}
