//! Python 의존성 설치 — 인터프리터 탐색과 2단계 pip 설치
//!
//! ## 설치 흐름
//! 1. 설정된 인터프리터 사용, 없으면 `PATH`에서 `python3` → `python` 순으로 탐색
//! 2. 조용한 설치: `pip install --no-cache-dir --quiet -r <manifest>`, 출력 버림
//! 3. 실패한 경우에만: 같은 설치를 출력 그대로 다시 실행
//! 4. 두 번째도 실패 → `LaunchError::DependencyInstall`
//!
//! Platform build steps often pre-install everything, so step 2 is usually a
//! no-op and stays out of the logs. Step 3 exists so a genuinely broken
//! install still shows pip's diagnostics to the operator.

use anyhow::Context;
use std::ffi::OsStr;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

use crate::launcher::error::LaunchError;
use crate::utils::apply_creation_flags;

const PYTHON_CANDIDATES: [&str; 2] = ["python3", "python"];

/// Which pip attempt satisfied the manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallOutcome {
    /// The suppressed first attempt succeeded.
    Quiet,
    /// The first attempt failed and the verbose retry succeeded.
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verbosity {
    Quiet,
    Verbose,
}

/// Configured interpreter verbatim, otherwise the first candidate on `PATH`.
///
/// No version gate: whatever runs the entry point is the application's call.
/// With nothing on `PATH` the first candidate is returned anyway so the
/// handoff fails the way a shell would (exit 127).
pub fn resolve_interpreter(configured: Option<&str>) -> String {
    if let Some(python) = configured {
        tracing::debug!("Using configured interpreter: {}", python);
        return python.to_string();
    }
    let path_var = std::env::var_os("PATH");
    find_on_path(path_var.as_deref())
}

fn find_on_path(path_var: Option<&OsStr>) -> String {
    for cmd_name in PYTHON_CANDIDATES {
        match which::which_in(cmd_name, path_var, Path::new(".")) {
            Ok(found) => {
                tracing::info!("Interpreter found: {} → {}", cmd_name, found.display());
                return cmd_name.to_string();
            }
            Err(e) => tracing::debug!("{} → not on PATH ({})", cmd_name, e),
        }
    }
    tracing::warn!(
        "None of {:?} found on PATH; handing off to '{}' regardless",
        PYTHON_CANDIDATES,
        PYTHON_CANDIDATES[0]
    );
    PYTHON_CANDIDATES[0].to_string()
}

/// Install the manifest with the quiet-then-verbose strategy.
///
/// `manifest` is passed to pip as given, so it should be relative to the
/// current directory (the launcher has already entered the app directory).
pub async fn install_requirements(
    python: &str,
    manifest: &Path,
) -> Result<InstallOutcome, LaunchError> {
    if !manifest.is_file() {
        tracing::warn!(
            "Dependency manifest '{}' not found; letting pip report it",
            manifest.display()
        );
    }

    tracing::info!("Installing dependencies from {}", manifest.display());

    // ── 1차: 조용한 설치 ──
    match run_pip(python, manifest, Verbosity::Quiet).await {
        Ok(()) => {
            tracing::info!("Dependencies satisfied");
            return Ok(InstallOutcome::Quiet);
        }
        Err(e) => {
            tracing::warn!("Quiet install failed ({:#}); retrying with full output", e);
        }
    }

    // ── 2차: 출력을 그대로 보여주는 재시도 ──
    run_pip(python, manifest, Verbosity::Verbose)
        .await
        .map_err(|e| LaunchError::DependencyInstall {
            manifest: manifest.to_path_buf(),
            reason: format!("{:#}", e),
        })?;

    tracing::info!("Dependencies installed on retry");
    Ok(InstallOutcome::Fallback)
}

fn pip_command(python: &str, manifest: &Path, verbosity: Verbosity) -> Command {
    let mut cmd = Command::new(python);
    cmd.args(["-m", "pip", "install", "--no-cache-dir"]);
    if verbosity == Verbosity::Quiet {
        cmd.arg("--quiet");
    }
    cmd.arg("-r").arg(manifest);

    match verbosity {
        Verbosity::Quiet => {
            cmd.stdout(Stdio::null()).stderr(Stdio::null());
        }
        Verbosity::Verbose => {
            cmd.stdout(Stdio::inherit()).stderr(Stdio::inherit());
        }
    }
    cmd.stdin(Stdio::null());
    apply_creation_flags(&mut cmd);
    cmd
}

/// pip 명령 실행
async fn run_pip(python: &str, manifest: &Path, verbosity: Verbosity) -> anyhow::Result<()> {
    let status = pip_command(python, manifest, verbosity)
        .status()
        .await
        .with_context(|| format!("failed to start '{} -m pip'", python))?;
    if !status.success() {
        return Err(anyhow::anyhow!("pip exited with {}", status));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args_of(cmd: &Command) -> Vec<String> {
        cmd.as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_quiet_pip_command_args() {
        let cmd = pip_command("python3", Path::new("requirements.txt"), Verbosity::Quiet);
        assert_eq!(cmd.as_std().get_program(), "python3");
        assert_eq!(
            args_of(&cmd),
            ["-m", "pip", "install", "--no-cache-dir", "--quiet", "-r", "requirements.txt"]
        );
    }

    #[test]
    fn test_verbose_pip_command_args() {
        let cmd = pip_command("python3", Path::new("reqs/prod.txt"), Verbosity::Verbose);
        let args = args_of(&cmd);
        assert!(!args.contains(&"--quiet".to_string()));
        assert_eq!(args, ["-m", "pip", "install", "--no-cache-dir", "-r", "reqs/prod.txt"]);
    }

    #[test]
    fn test_configured_interpreter_is_used_verbatim() {
        assert_eq!(resolve_interpreter(Some("/does/not/matter")), "/does/not/matter");
    }

    #[cfg(unix)]
    #[test]
    fn test_first_candidate_on_path_wins() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::tempdir().unwrap();
        // python3 없음, python만 존재 (버전 무관)
        let exe = tmp.path().join("python");
        std::fs::write(&exe, "#!/bin/sh\necho 'Python 3.7.17'\n").unwrap();
        std::fs::set_permissions(&exe, std::fs::Permissions::from_mode(0o755)).unwrap();

        assert_eq!(find_on_path(Some(tmp.path().as_os_str())), "python");
    }

    #[test]
    fn test_empty_path_falls_back_to_first_candidate() {
        let tmp = tempfile::tempdir().unwrap();
        assert_eq!(find_on_path(Some(tmp.path().as_os_str())), "python3");
        assert_eq!(find_on_path(None), "python3");
    }

    #[cfg(unix)]
    mod fake_pip {
        use super::super::*;
        use std::os::unix::fs::PermissionsExt;
        use std::path::PathBuf;

        /// Stand-in interpreter: quiet pip exits `quiet_rc`, verbose pip `verbose_rc`.
        /// Every invocation is appended to `calls.log`.
        fn fake_python(dir: &Path, quiet_rc: i32, verbose_rc: i32) -> PathBuf {
            let log = dir.join("calls.log");
            let script = format!(
                "#!/bin/sh\n\
                 echo \"$*\" >> '{log}'\n\
                 case \"$*\" in\n\
                 *--quiet*) exit {quiet_rc} ;;\n\
                 *pip*) echo 'pip: resolving'; exit {verbose_rc} ;;\n\
                 esac\n\
                 exit 0\n",
                log = log.display(),
            );
            let path = dir.join("python");
            std::fs::write(&path, script).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        fn calls(dir: &Path) -> Vec<String> {
            std::fs::read_to_string(dir.join("calls.log"))
                .unwrap_or_default()
                .lines()
                .map(String::from)
                .collect()
        }

        #[tokio::test]
        async fn test_quiet_success_skips_fallback() {
            let tmp = tempfile::tempdir().unwrap();
            let py = fake_python(tmp.path(), 0, 0);
            let manifest = tmp.path().join("requirements.txt");
            std::fs::write(&manifest, "fastapi\n").unwrap();

            let outcome = install_requirements(py.to_str().unwrap(), &manifest)
                .await
                .unwrap();
            assert_eq!(outcome, InstallOutcome::Quiet);

            let calls = calls(tmp.path());
            assert_eq!(calls.len(), 1);
            assert!(calls[0].contains("--quiet"));
            assert!(calls[0].contains("--no-cache-dir"));
        }

        #[tokio::test]
        async fn test_quiet_failure_triggers_verbose_retry() {
            let tmp = tempfile::tempdir().unwrap();
            let py = fake_python(tmp.path(), 1, 0);
            let manifest = tmp.path().join("requirements.txt");
            std::fs::write(&manifest, "fastapi\n").unwrap();

            let outcome = install_requirements(py.to_str().unwrap(), &manifest)
                .await
                .unwrap();
            assert_eq!(outcome, InstallOutcome::Fallback);

            let calls = calls(tmp.path());
            assert_eq!(calls.len(), 2);
            assert!(calls[0].contains("--quiet"));
            assert!(!calls[1].contains("--quiet"));
        }

        #[tokio::test]
        async fn test_both_attempts_failing_is_fatal() {
            let tmp = tempfile::tempdir().unwrap();
            let py = fake_python(tmp.path(), 1, 2);
            let manifest = tmp.path().join("requirements.txt");
            std::fs::write(&manifest, "definitely-not-a-real-package==0.0.0\n").unwrap();

            let err = install_requirements(py.to_str().unwrap(), &manifest)
                .await
                .unwrap_err();
            match err {
                LaunchError::DependencyInstall { manifest: m, reason } => {
                    assert_eq!(m, manifest);
                    assert!(reason.contains('2'), "reason: {reason}");
                }
                other => panic!("unexpected error: {other}"),
            }
            assert_eq!(calls(tmp.path()).len(), 2);
        }

        #[tokio::test]
        async fn test_missing_interpreter_fails_both_attempts() {
            let tmp = tempfile::tempdir().unwrap();
            let missing = tmp.path().join("no-such-python");
            let manifest = tmp.path().join("requirements.txt");

            let err = install_requirements(missing.to_str().unwrap(), &manifest)
                .await
                .unwrap_err();
            assert!(matches!(err, LaunchError::DependencyInstall { .. }));
        }
    }
}
