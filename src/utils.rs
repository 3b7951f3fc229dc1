//! Shared utility functions for the launcher.

use std::process::ExitStatus;
use tokio::process::Command;

/// Apply platform-specific flags to hide the console window on Windows.
/// On non-Windows platforms, this is a no-op.
#[cfg(target_os = "windows")]
pub fn apply_creation_flags(cmd: &mut Command) -> &mut Command {
    use std::os::windows::process::CommandExt;
    const CREATE_NO_WINDOW: u32 = 0x08000000;
    cmd.creation_flags(CREATE_NO_WINDOW)
}

#[cfg(not(target_os = "windows"))]
pub fn apply_creation_flags(cmd: &mut Command) -> &mut Command {
    cmd
}

/// 종료 상태 → 프로세스 종료 코드
///
/// A normal exit keeps its code. A child terminated by signal `S` maps to
/// `128 + S`, the same value a POSIX shell reports for it.
pub fn exit_code_of(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(sig) = status.signal() {
            return 128 + sig;
        }
    }
    1
}

/// Clamp an exit code into the `u8` range `std::process::ExitCode` accepts.
pub fn exit_code_byte(code: i32) -> u8 {
    u8::try_from(code).unwrap_or(1)
}
