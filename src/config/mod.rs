//! 런처 설정 — 프로세스 시작 시 한 번만 조립됩니다.
//!
//! Layers, lowest to highest priority:
//! 1. built-in defaults
//! 2. optional TOML file (`LAUNCHER_CONFIG`, or `./launcher.toml` if present)
//! 3. environment variables
//!
//! The result is immutable for the process lifetime and passed by reference.

use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_APP_DIR: &str = "integrations/meiborg_brothers/find_load";
pub const DEFAULT_MANIFEST: &str = "requirements.txt";
pub const DEFAULT_ENTRY: &str = "server.py";
pub const DEFAULT_PORT: &str = "8000";
pub const DEFAULT_CONFIG_FILE: &str = "launcher.toml";

pub const ENV_CONFIG: &str = "LAUNCHER_CONFIG";
pub const ENV_APP_DIR: &str = "LAUNCHER_APP_DIR";
pub const ENV_MANIFEST: &str = "LAUNCHER_MANIFEST";
pub const ENV_ENTRY: &str = "LAUNCHER_ENTRY";
pub const ENV_ENTRY_ARGS: &str = "LAUNCHER_ENTRY_ARGS";
pub const ENV_PYTHON: &str = "LAUNCHER_PYTHON";
pub const ENV_SKIP_INSTALL: &str = "LAUNCHER_SKIP_INSTALL";
pub const ENV_HANDOFF: &str = "LAUNCHER_HANDOFF";

// Consumed by the application, not by the launcher.
pub const ENV_PORT: &str = "PORT";
pub const ENV_UNBUFFERED: &str = "PYTHONUNBUFFERED";
pub const ENV_DONT_WRITE_BYTECODE: &str = "PYTHONDONTWRITEBYTECODE";

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("config file '{}' not found", .0.display())]
    MissingFile(PathBuf),

    #[error("failed to read config file '{}': {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config file '{}': {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid value for {var}: '{value}' ({reason})")]
    InvalidValue {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// How control passes to the application once bootstrap is done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandoffMode {
    /// Replace the launcher's process image (Unix `exec`).
    Exec,
    /// Run the application as a child, forward signals, mirror its exit code.
    Supervise,
}

impl HandoffMode {
    pub fn platform_default() -> Self {
        if cfg!(unix) {
            Self::Exec
        } else {
            Self::Supervise
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "exec" => Some(Self::Exec),
            "supervise" => Some(Self::Supervise),
            _ => None,
        }
    }
}

/// Variables the application process inherits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppEnvironment {
    /// Passed through untouched; the application decides what it means.
    pub port: String,
    pub unbuffered: bool,
    pub dont_write_bytecode: bool,
}

impl Default for AppEnvironment {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT.to_string(),
            unbuffered: true,
            dont_write_bytecode: true,
        }
    }
}

impl AppEnvironment {
    /// `(name, Some(value))` to set, `(name, None)` to remove from the child.
    pub fn vars(&self) -> Vec<(&'static str, Option<String>)> {
        let flag = |on: bool| on.then(|| "1".to_string());
        vec![
            (ENV_PORT, Some(self.port.clone())),
            (ENV_UNBUFFERED, flag(self.unbuffered)),
            (ENV_DONT_WRITE_BYTECODE, flag(self.dont_write_bytecode)),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LauncherConfig {
    /// Integration directory; entry and manifest are resolved inside it.
    pub app_dir: PathBuf,
    pub manifest: PathBuf,
    pub entry: PathBuf,
    pub entry_args: Vec<String>,
    /// Interpreter to use. `None` means detect one on `PATH`.
    pub python: Option<String>,
    /// Dependencies were baked in at build time (container image).
    pub skip_install: bool,
    pub handoff: HandoffMode,
    pub app_env: AppEnvironment,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            app_dir: PathBuf::from(DEFAULT_APP_DIR),
            manifest: PathBuf::from(DEFAULT_MANIFEST),
            entry: PathBuf::from(DEFAULT_ENTRY),
            entry_args: Vec::new(),
            python: None,
            skip_install: false,
            handoff: HandoffMode::platform_default(),
            app_env: AppEnvironment::default(),
        }
    }
}

/// `launcher.toml` — every key optional.
#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    app_dir: Option<PathBuf>,
    manifest: Option<PathBuf>,
    entry: Option<PathBuf>,
    entry_args: Option<Vec<String>>,
    python: Option<String>,
    skip_install: Option<bool>,
    handoff: Option<HandoffMode>,
    port: Option<PortSetting>,
    unbuffered: Option<bool>,
    dont_write_bytecode: Option<bool>,
}

/// `port = 9100` and `port = "9100"` are both accepted.
#[derive(Deserialize, Debug)]
#[serde(untagged)]
enum PortSetting {
    Number(i64),
    Text(String),
}

impl PortSetting {
    fn into_string(self) -> String {
        match self {
            Self::Number(n) => n.to_string(),
            Self::Text(s) => s,
        }
    }
}

impl LauncherConfig {
    /// Assemble from the real process environment, relative to the current directory.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(|key| std::env::var(key).ok(), Path::new("."))
    }

    /// Assemble with an injected environment lookup. Relative config file
    /// paths resolve against `base_dir`.
    pub fn load_with<F>(env: F, base_dir: &Path) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        let file = match non_empty(&env, ENV_CONFIG) {
            Some(explicit) => {
                let path = base_dir.join(explicit);
                if !path.is_file() {
                    return Err(ConfigError::MissingFile(path));
                }
                Some(read_file(&path)?)
            }
            None => {
                let path = base_dir.join(DEFAULT_CONFIG_FILE);
                if path.is_file() {
                    Some(read_file(&path)?)
                } else {
                    None
                }
            }
        };

        if let Some(file) = file {
            cfg.apply_file(file);
        }
        cfg.apply_env(&env)?;

        tracing::debug!("Launcher config: {:?}", cfg);
        Ok(cfg)
    }

    fn apply_file(&mut self, file: FileConfig) {
        if let Some(v) = file.app_dir {
            self.app_dir = v;
        }
        if let Some(v) = file.manifest {
            self.manifest = v;
        }
        if let Some(v) = file.entry {
            self.entry = v;
        }
        if let Some(v) = file.entry_args {
            self.entry_args = v;
        }
        if file.python.is_some() {
            self.python = file.python;
        }
        if let Some(v) = file.skip_install {
            self.skip_install = v;
        }
        if let Some(v) = file.handoff {
            self.handoff = v;
        }
        if let Some(v) = file.port {
            self.app_env.port = v.into_string();
        }
        if let Some(v) = file.unbuffered {
            self.app_env.unbuffered = v;
        }
        if let Some(v) = file.dont_write_bytecode {
            self.app_env.dont_write_bytecode = v;
        }
    }

    fn apply_env<F>(&mut self, env: &F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = non_empty(env, ENV_APP_DIR) {
            self.app_dir = PathBuf::from(v);
        }
        if let Some(v) = non_empty(env, ENV_MANIFEST) {
            self.manifest = PathBuf::from(v);
        }
        if let Some(v) = non_empty(env, ENV_ENTRY) {
            self.entry = PathBuf::from(v);
        }
        // 공백 기준 분리: 공백이 들어간 인자는 TOML의 entry_args로만 가능
        if let Some(v) = non_empty(env, ENV_ENTRY_ARGS) {
            self.entry_args = v.split_whitespace().map(String::from).collect();
        }
        if let Some(v) = non_empty(env, ENV_PYTHON) {
            self.python = Some(v);
        }
        if let Some(v) = non_empty(env, ENV_SKIP_INSTALL) {
            self.skip_install = parse_switch(ENV_SKIP_INSTALL, &v)?;
        }
        if let Some(v) = non_empty(env, ENV_HANDOFF) {
            self.handoff = HandoffMode::parse(&v).ok_or_else(|| ConfigError::InvalidValue {
                var: ENV_HANDOFF,
                value: v.clone(),
                reason: "expected 'exec' or 'supervise'".to_string(),
            })?;
        }
        // 설정되어 있으면 빈 값이라도 그대로 전달
        if let Some(v) = env(ENV_PORT) {
            self.app_env.port = v;
        }
        // Python semantics: any non-empty value switches the flag on.
        if let Some(v) = env(ENV_UNBUFFERED) {
            self.app_env.unbuffered = !v.is_empty();
        }
        if let Some(v) = env(ENV_DONT_WRITE_BYTECODE) {
            self.app_env.dont_write_bytecode = !v.is_empty();
        }
        Ok(())
    }
}

fn non_empty<F>(env: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    env(key).filter(|v| !v.trim().is_empty())
}

fn parse_switch(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            var,
            value: value.to_string(),
            reason: "expected a boolean (1/0, true/false, yes/no, on/off)".to_string(),
        }),
    }
}

fn read_file(path: &Path) -> Result<FileConfig, ConfigError> {
    let s = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let file = toml::from_str(&s).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::info!("Loaded launcher config from {}", path.display());
    Ok(file)
}
