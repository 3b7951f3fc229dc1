//! Control transfer to the application.
//!
//! - `Exec`: the launcher's process image is replaced, so the application keeps
//!   the PID, receives signals directly and its exit code is the process exit code.
//! - `Supervise`: the application runs as a child. Termination signals sent to
//!   the launcher are forwarded to it and its exit code is mirrored.

use anyhow::Context;
use std::ffi::OsString;
use std::process::{ExitStatus, Stdio};
use tokio::process::{Child, Command};

use super::error::LaunchError;
use crate::config::{HandoffMode, LauncherConfig};
use crate::utils::{apply_creation_flags, exit_code_of};

/// The fully resolved application command line and environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryCommand {
    pub program: String,
    pub args: Vec<OsString>,
    pub env: Vec<(&'static str, Option<String>)>,
}

impl EntryCommand {
    /// `<python> <entry> <entry_args...>`, resolved relative to the app directory.
    pub fn new(python: &str, cfg: &LauncherConfig) -> Self {
        let mut args = vec![cfg.entry.clone().into_os_string()];
        args.extend(cfg.entry_args.iter().map(OsString::from));
        Self {
            program: python.to_string(),
            args,
            env: cfg.app_env.vars(),
        }
    }

    /// Human-readable command line for logs.
    pub fn display(&self) -> String {
        let mut parts = vec![self.program.clone()];
        parts.extend(self.args.iter().map(|a| a.to_string_lossy().into_owned()));
        parts.join(" ")
    }

    fn std_command(&self) -> std::process::Command {
        let mut cmd = std::process::Command::new(&self.program);
        cmd.args(&self.args);
        for (key, value) in &self.env {
            match value {
                Some(v) => cmd.env(key, v),
                None => cmd.env_remove(key),
            };
        }
        cmd
    }

    fn tokio_command(&self) -> Command {
        let mut cmd = Command::from(self.std_command());
        cmd.stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(false);
        apply_creation_flags(&mut cmd);
        cmd
    }
}

/// Hand control to the application.
///
/// Returns the exit code the launcher should exit with. In `Exec` mode on Unix
/// this only returns when `exec` itself failed.
pub async fn hand_off(entry: &EntryCommand, mode: HandoffMode) -> Result<i32, LaunchError> {
    match mode {
        HandoffMode::Exec => exec_or_supervise(entry).await,
        HandoffMode::Supervise => supervise(entry).await,
    }
}

#[cfg(unix)]
async fn exec_or_supervise(entry: &EntryCommand) -> Result<i32, LaunchError> {
    Err(exec(entry))
}

#[cfg(not(unix))]
async fn exec_or_supervise(entry: &EntryCommand) -> Result<i32, LaunchError> {
    tracing::warn!("Process replacement is unavailable on this platform; supervising instead");
    supervise(entry).await
}

/// Replace the current process with the application. Only returns on failure.
#[cfg(unix)]
pub fn exec(entry: &EntryCommand) -> LaunchError {
    use std::os::unix::process::CommandExt;

    tracing::info!("Handing off (exec): {}", entry.display());
    let err = entry.std_command().exec();
    LaunchError::from_launch_io(&entry.program, err)
}

/// Run the application as a child, forward signals, return its exit code.
pub async fn supervise(entry: &EntryCommand) -> Result<i32, LaunchError> {
    // 시그널 감시를 먼저 설치해야 spawn 직후 도착한 SIGTERM도 전달됨
    let mut signals = ForwardedSignals::watch()?;

    let mut child = entry
        .tokio_command()
        .spawn()
        .map_err(|e| LaunchError::from_launch_io(&entry.program, e))?;

    tracing::info!(
        "Handing off (supervise): {} [pid {}]",
        entry.display(),
        child.id().map(|p| p.to_string()).unwrap_or_else(|| "?".into())
    );

    let status = wait_forwarding(&mut child, &mut signals).await?;
    let code = exit_code_of(status);
    tracing::info!("Application exited with {} (exit code {})", status, code);
    Ok(code)
}

async fn wait_forwarding(
    child: &mut Child,
    signals: &mut ForwardedSignals,
) -> Result<ExitStatus, LaunchError> {
    let pid = child.id();
    loop {
        tokio::select! {
            status = child.wait() => {
                return Ok(status.context("failed to wait for application")?);
            }
            sig = signals.recv() => signals.forward(child, pid, sig),
        }
    }
}

/// Termination signals relayed to the child: SIGTERM, SIGINT, SIGHUP, SIGQUIT.
#[cfg(unix)]
struct ForwardedSignals {
    term: tokio::signal::unix::Signal,
    int: tokio::signal::unix::Signal,
    hup: tokio::signal::unix::Signal,
    quit: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl ForwardedSignals {
    fn watch() -> Result<Self, LaunchError> {
        use tokio::signal::unix::{signal, SignalKind};

        Ok(Self {
            term: signal(SignalKind::terminate()).context("failed to watch SIGTERM")?,
            int: signal(SignalKind::interrupt()).context("failed to watch SIGINT")?,
            hup: signal(SignalKind::hangup()).context("failed to watch SIGHUP")?,
            quit: signal(SignalKind::quit()).context("failed to watch SIGQUIT")?,
        })
    }

    async fn recv(&mut self) -> nix::sys::signal::Signal {
        use nix::sys::signal::Signal;

        tokio::select! {
            _ = self.term.recv() => Signal::SIGTERM,
            _ = self.int.recv() => Signal::SIGINT,
            _ = self.hup.recv() => Signal::SIGHUP,
            _ = self.quit.recv() => Signal::SIGQUIT,
        }
    }

    fn forward(&self, _child: &mut Child, pid: Option<u32>, sig: nix::sys::signal::Signal) {
        use nix::sys::signal::kill;
        use nix::unistd::Pid;

        // 이미 종료되어 reap된 경우 pid가 없음
        let Some(pid) = pid else { return };
        match kill(Pid::from_raw(pid as i32), sig) {
            Ok(()) => tracing::info!("Forwarded {:?} to application (pid {})", sig, pid),
            Err(e) => tracing::warn!("Failed to forward {:?} to pid {}: {}", sig, pid, e),
        }
    }
}

/// No POSIX signals here: Ctrl-C terminates the child instead.
#[cfg(not(unix))]
struct ForwardedSignals;

#[cfg(not(unix))]
impl ForwardedSignals {
    fn watch() -> Result<Self, LaunchError> {
        Ok(Self)
    }

    async fn recv(&mut self) {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    }

    fn forward(&self, child: &mut Child, _pid: Option<u32>, _sig: ()) {
        tracing::info!("Ctrl-C received, terminating application");
        if let Err(e) = child.start_kill() {
            tracing::warn!("Failed to terminate application: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn entry(program: &str, args: &[&str]) -> EntryCommand {
        EntryCommand {
            program: program.to_string(),
            args: args.iter().map(OsString::from).collect(),
            env: Vec::new(),
        }
    }

    #[test]
    fn test_entry_command_from_config() {
        let cfg = LauncherConfig {
            entry: PathBuf::from("server.py"),
            entry_args: vec!["--port".into(), "9000".into()],
            ..LauncherConfig::default()
        };
        let e = EntryCommand::new("python3", &cfg);
        assert_eq!(e.program, "python3");
        assert_eq!(e.args, vec![OsString::from("server.py"), "--port".into(), "9000".into()]);
        assert_eq!(e.display(), "python3 server.py --port 9000");
        assert!(e.env.iter().any(|(k, v)| *k == "PORT" && v.as_deref() == Some("8000")));
    }

    #[test]
    fn test_std_command_applies_env() {
        let mut e = entry("python3", &["server.py"]);
        e.env = vec![("PORT", Some("8123".into())), ("PYTHONDONTWRITEBYTECODE", None)];
        let cmd = e.std_command();
        let envs: Vec<_> = cmd.get_envs().collect();
        assert!(envs.contains(&(std::ffi::OsStr::new("PORT"), Some(std::ffi::OsStr::new("8123")))));
        assert!(envs.contains(&(std::ffi::OsStr::new("PYTHONDONTWRITEBYTECODE"), None)));
    }

    #[tokio::test]
    async fn test_supervise_missing_program() {
        let e = entry("/definitely/not/here/python", &["server.py"]);
        let err = supervise(&e).await.unwrap_err();
        assert!(matches!(err, LaunchError::EntryNotFound(_)));
        assert_eq!(err.exit_code(), 127);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_supervise_propagates_exit_codes() {
        for code in [0, 1, 137, 255] {
            let e = entry("sh", &["-c", &format!("exit {code}")]);
            assert_eq!(supervise(&e).await.unwrap(), code);
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_supervise_maps_signal_death() {
        let e = entry("sh", &["-c", "kill -KILL $$"]);
        assert_eq!(supervise(&e).await.unwrap(), 137);
    }
}
