//! Configuration for the `taskboard` shell.
//!
//! Priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/taskboard/config.toml`)
//! 4. Compiled defaults
//!
//! A missing default config file is not an error. An explicit `--config`
//! path that doesn't exist is.

use std::path::{Path, PathBuf};

use taskboard_proto::task::MAX_TASK_TITLE_LENGTH;

use crate::engine::EngineConfig;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),
}

/// Top-level TOML config file structure.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConfigFile {
    board: BoardFileConfig,
    log: LogFileConfig,
}

/// `[board]` section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct BoardFileConfig {
    max_title_len: Option<usize>,
    event_buffer: Option<usize>,
    seed_file: Option<PathBuf>,
}

/// `[log]` section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct LogFileConfig {
    level: Option<String>,
    file: Option<PathBuf>,
}

/// Fully resolved shell configuration.
#[derive(Debug, Clone)]
pub struct BoardConfig {
    /// Maximum task title length in characters.
    pub max_title_len: usize,
    /// Capacity of the board event channel.
    pub event_buffer: usize,
    /// JSON file of tasks loaded into the in-memory remote at startup.
    pub seed_file: Option<PathBuf>,
    /// Log level filter.
    pub log_level: String,
    /// Log file path; `None` means `$TMPDIR/taskboard.log`.
    pub log_file: Option<PathBuf>,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            max_title_len: MAX_TASK_TITLE_LENGTH,
            event_buffer: 64,
            seed_file: None,
            log_level: "info".to_string(),
            log_file: None,
        }
    }
}

impl BoardConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the config file cannot be read or parsed.
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Ok(Self::resolve(cli, &file))
    }

    /// Priority: CLI > file > default. Kept apart from `load()` for tests.
    fn resolve(cli: &CliArgs, file: &ConfigFile) -> Self {
        let defaults = Self::default();

        Self {
            max_title_len: cli
                .max_title_len
                .or(file.board.max_title_len)
                .unwrap_or(defaults.max_title_len),
            event_buffer: file.board.event_buffer.unwrap_or(defaults.event_buffer),
            seed_file: cli
                .seed
                .clone()
                .or_else(|| file.board.seed_file.clone()),
            log_level: cli
                .log_level
                .clone()
                .or_else(|| file.log.level.clone())
                .unwrap_or(defaults.log_level),
            log_file: cli.log_file.clone().or_else(|| file.log.file.clone()),
        }
    }

    /// Engine settings derived from this configuration.
    #[must_use]
    pub fn engine(&self) -> EngineConfig {
        EngineConfig {
            max_title_len: self.max_title_len,
            event_buffer: self.event_buffer,
        }
    }
}

/// CLI arguments parsed by clap.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Kanban board with optimistic sync")]
pub struct CliArgs {
    /// Path to config file (default: `~/.config/taskboard/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// JSON file of tasks to seed the board with.
    #[arg(long, env = "TASKBOARD_SEED")]
    pub seed: Option<PathBuf>,

    /// Maximum task title length.
    #[arg(long)]
    pub max_title_len: Option<usize>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, env = "TASKBOARD_LOG")]
    pub log_level: Option<String>,

    /// Path to log file (default: `$TMPDIR/taskboard.log`).
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

fn load_config_file(explicit_path: Option<&Path>) -> Result<ConfigFile, ConfigError> {
    if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    }

    let Some(config_dir) = dirs::config_dir() else {
        return Ok(ConfigFile::default());
    };
    let path = config_dir.join("taskboard").join("config.toml");

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
