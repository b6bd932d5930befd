//! Configuration resolution for sidebridge.
//!
//! Implements hierarchical config resolution:
//! 1. Built-in defaults
//! 2. Global config (~/.config/sidebridge/settings.json)
//! 3. Project config (.sidebridge/settings.json)
//! 4. Environment variables
//! 5. CLI arguments (applied by the binary, highest priority)
//!
//! Settings files may be partial. Layers are deep-merged as JSON objects
//! before deserializing, so a project file that only sets
//! `worker.binaries_dir` keeps every other value from the layers below.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::error::{Error, Result};

/// Complete sidebridge configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Config {
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// How the worker process is located and launched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WorkerConfig {
    /// Program that hosts the worker binary (the JVM for packaged jars).
    pub runtime: PathBuf,
    /// Arguments placed before the worker binary path.
    pub runtime_args: Vec<String>,
    /// Directory holding the worker binaries.
    pub binaries_dir: PathBuf,
    /// Worker binary for the chat client.
    pub chat_binary: String,
    /// Worker binary for the music player.
    pub music_binary: String,
    /// Seconds to wait after SIGTERM before SIGKILL.
    pub terminate_timeout_secs: u64,
    /// Milliseconds to wait for remaining output after the worker exits.
    pub drain_timeout_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            runtime: PathBuf::from("java"),
            runtime_args: vec!["-jar".to_string()],
            binaries_dir: PathBuf::from("resources").join("binaries"),
            chat_binary: "Client.jar".to_string(),
            music_binary: "client.jar".to_string(),
            terminate_timeout_secs: 5,
            drain_timeout_ms: 500,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Front-end flavour a worker is launched for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AppKind {
    /// Chat client; takes the user name as its only argument.
    Chat,
    /// Music streaming player; takes no arguments.
    Music,
}

/// Fully resolved program and argument list for one worker launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl LaunchSpec {
    pub fn new(program: impl Into<PathBuf>, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

impl std::fmt::Display for LaunchSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

impl WorkerConfig {
    /// Path of the worker binary for `kind`.
    pub fn binary_path(&self, kind: AppKind) -> PathBuf {
        let name = match kind {
            AppKind::Chat => &self.chat_binary,
            AppKind::Music => &self.music_binary,
        };
        self.binaries_dir.join(name)
    }

    /// Build the launch command for `kind`, appending `extra_args` after the binary.
    pub fn launch_spec(&self, kind: AppKind, extra_args: &[String]) -> LaunchSpec {
        let mut args = self.runtime_args.clone();
        args.push(self.binary_path(kind).to_string_lossy().into_owned());
        args.extend(extra_args.iter().cloned());
        LaunchSpec {
            program: self.runtime.clone(),
            args,
        }
    }

    pub const fn terminate_timeout(&self) -> Duration {
        Duration::from_secs(self.terminate_timeout_secs)
    }

    pub const fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}

/// Load configuration with hierarchical resolution.
pub fn load_config(project_dir: Option<&Path>) -> Result<Config> {
    let mut merged = serde_json::to_value(Config::default())?;

    if let Some(global_path) = global_config_path()
        && global_path.exists()
    {
        merge_json(&mut merged, load_config_file(&global_path)?);
        debug!(path = %global_path.display(), "Loaded global config");
    }

    if let Some(dir) = project_dir {
        let project_path = dir.join(".sidebridge").join("settings.json");
        if project_path.exists() {
            merge_json(&mut merged, load_config_file(&project_path)?);
            debug!(path = %project_path.display(), "Loaded project config");
        }
    }

    let mut config: Config = serde_json::from_value(merged)
        .map_err(|e| Error::Config(format!("Invalid configuration: {e}")))?;

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());

    Ok(config)
}

/// Get the global config file path.
pub fn global_config_path() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .ok()
            .map(|h| PathBuf::from(h).join(".sidebridge").join("settings.json"))
    }
    #[cfg(target_os = "macos")]
    {
        std::env::var("HOME")
            .ok()
            .map(|h| PathBuf::from(h).join("Library/Application Support/sidebridge/settings.json"))
    }
    #[cfg(target_os = "linux")]
    {
        std::env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| std::env::var("HOME").ok().map(|h| PathBuf::from(h).join(".config")))
            .map(|p| p.join("sidebridge").join("settings.json"))
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
    {
        None
    }
}

fn load_config_file(path: &Path) -> Result<Value> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    let value: Value = serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
    })?;
    if !value.is_object() {
        return Err(Error::Config(format!(
            "Config file {} must contain a JSON object",
            path.display()
        )));
    }
    Ok(value)
}

/// Objects merge key by key; any other overlay value replaces the base.
fn merge_json(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge_json(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

/// Apply `SIDEBRIDGE_*` overrides, reading variables through `lookup`.
pub fn apply_env_overrides(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(val) = lookup("SIDEBRIDGE_RUNTIME") {
        config.worker.runtime = PathBuf::from(val);
    }
    if let Some(val) = lookup("SIDEBRIDGE_BINARIES_DIR") {
        config.worker.binaries_dir = PathBuf::from(val);
    }
    if let Some(val) = lookup("SIDEBRIDGE_TERMINATE_TIMEOUT")
        && let Ok(n) = val.parse()
    {
        config.worker.terminate_timeout_secs = n;
    }
    if let Some(val) = lookup("SIDEBRIDGE_LOG_LEVEL") {
        config.logging.level = val;
    }
    if let Some(val) = lookup("SIDEBRIDGE_LOG_JSON") {
        config.logging.json = matches!(val.as_str(), "1" | "true" | "yes");
    }
}
