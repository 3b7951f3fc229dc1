//! 런처 전용 에러 타입 — 에러 종류별로 프로세스 종료 코드를 구분합니다.

use std::path::PathBuf;

use crate::config::ConfigError;

/// `sysexits.h` EX_CONFIG
const EXIT_CONFIG: i32 = 78;
/// Shell convention for "command not found".
const EXIT_NOT_FOUND: i32 = 127;
/// Shell convention for "found but not executable".
const EXIT_NOT_EXECUTABLE: i32 = 126;

/// Every variant is fatal; `main` logs it once and exits with `exit_code()`.
#[derive(thiserror::Error, Debug)]
pub enum LaunchError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("working directory '{}' does not exist or is not a directory", .0.display())]
    Environment(PathBuf),

    #[error("dependency install from '{}' failed: {reason}", .manifest.display())]
    DependencyInstall { manifest: PathBuf, reason: String },

    #[error("entry command '{0}' not found")]
    EntryNotFound(String),

    #[error("entry command '{0}' is not executable")]
    EntryNotExecutable(String),

    #[error("failed to launch '{program}': {source}")]
    Launch {
        program: String,
        source: std::io::Error,
    },

    #[error("{0}")]
    Internal(#[from] anyhow::Error),
}

impl LaunchError {
    /// Map an exec/spawn failure to the variant a shell would report.
    pub fn from_launch_io(program: &str, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::EntryNotFound(program.to_string()),
            std::io::ErrorKind::PermissionDenied => Self::EntryNotExecutable(program.to_string()),
            _ => Self::Launch {
                program: program.to_string(),
                source: err,
            },
        }
    }

    /// Process exit code for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => EXIT_CONFIG,
            Self::EntryNotFound(_) => EXIT_NOT_FOUND,
            Self::EntryNotExecutable(_) => EXIT_NOT_EXECUTABLE,
            Self::Environment(_)
            | Self::DependencyInstall { .. }
            | Self::Launch { .. }
            | Self::Internal(_) => 1,
        }
    }

    /// 머신 리더블 에러 코드
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Config(_) => "CONFIG",
            Self::Environment(_) => "ENVIRONMENT",
            Self::DependencyInstall { .. } => "DEPENDENCY_INSTALL",
            Self::EntryNotFound(_) => "ENTRY_NOT_FOUND",
            Self::EntryNotExecutable(_) => "ENTRY_NOT_EXECUTABLE",
            Self::Launch { .. } => "LAUNCH",
            Self::Internal(_) => "INTERNAL",
        }
    }
}
