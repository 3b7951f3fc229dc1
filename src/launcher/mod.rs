//! Bootstrap launcher — 작업 디렉토리 진입 → 의존성 설치 → 애플리케이션 인계
//!
//! A strictly linear procedure; the only branch is the verbose pip retry in
//! [`crate::python_env::install_requirements`]. Every error is fatal.

pub mod error;
pub mod handoff;

use crate::config::LauncherConfig;
use crate::python_env::{self, InstallOutcome};
use error::LaunchError;
use handoff::EntryCommand;

pub struct Launcher<'a> {
    config: &'a LauncherConfig,
}

impl<'a> Launcher<'a> {
    pub fn new(config: &'a LauncherConfig) -> Self {
        Self { config }
    }

    /// Run the whole bootstrap. Returns the exit code to exit with; with exec
    /// handoff on Unix it only returns on failure.
    pub async fn run(&self) -> Result<i32, LaunchError> {
        self.enter_working_dir()?;

        let python = python_env::resolve_interpreter(self.config.python.as_deref());
        self.install_dependencies(&python).await?;

        let entry = EntryCommand::new(&python, self.config);
        if !self.config.entry.exists() {
            tracing::warn!(
                "Entry point '{}' not found in {}; the runtime will report it",
                self.config.entry.display(),
                self.config.app_dir.display()
            );
        }
        handoff::hand_off(&entry, self.config.handoff).await
    }

    /// Step 1: `cd` into the integration directory.
    pub fn enter_working_dir(&self) -> Result<(), LaunchError> {
        let dir = &self.config.app_dir;
        if !dir.is_dir() {
            return Err(LaunchError::Environment(dir.clone()));
        }
        std::env::set_current_dir(dir).map_err(|e| {
            tracing::error!("chdir to {} failed: {}", dir.display(), e);
            LaunchError::Environment(dir.clone())
        })?;
        tracing::info!("Working directory: {}", dir.display());
        Ok(())
    }

    /// Step 2: install the manifest, unless dependencies were baked in.
    /// Must run after [`Self::enter_working_dir`]; the manifest path is relative.
    pub async fn install_dependencies(
        &self,
        python: &str,
    ) -> Result<Option<InstallOutcome>, LaunchError> {
        if self.config.skip_install {
            tracing::info!("Dependency install skipped (pre-installed)");
            return Ok(None);
        }
        python_env::install_requirements(python, &self.config.manifest)
            .await
            .map(Some)
    }
}
