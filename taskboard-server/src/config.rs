//! Settings for the `taskboard-server` binary.
//!
//! Each setting is taken from the first source that provides it: command
//! line, environment, `~/.config/taskboard-server/config.toml`, built-in
//! default. An explicitly named config file must exist; the default one
//! may be missing.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use taskboard_proto::task::MAX_TASK_TITLE_LENGTH;

const DEFAULT_PORT: u16 = 8080;

/// Server configuration failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file exists (or was named explicitly) but could not be read.
    #[error("cannot read {path}: {source}")]
    ReadFile {
        /// File that was opened.
        path: PathBuf,
        /// I/O failure.
        source: std::io::Error,
    },

    /// The config file is not valid TOML or has mistyped fields.
    #[error("invalid config file: {0}")]
    ParseToml(#[from] toml::de::Error),

    /// A title limit of zero would reject every task.
    #[error("max_title_len must be at least 1")]
    ZeroTitleLimit,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct FileConfig {
    server: FileServerSection,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct FileServerSection {
    bind_addr: Option<SocketAddr>,
    max_title_len: Option<usize>,
}

/// Command line of `taskboard-server`.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "In-memory task store speaking the taskboard REST API")]
pub struct ServerCliArgs {
    /// Socket address to listen on.
    #[arg(short, long, env = "TASKBOARD_ADDR")]
    pub bind: Option<SocketAddr>,

    /// Config file to read instead of the default location.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Longest task title accepted, in characters.
    #[arg(long)]
    pub max_title_len: Option<usize>,

    /// Tracing filter directive.
    #[arg(long, default_value = "info", env = "TASKBOARD_LOG")]
    pub log_level: String,
}

/// Settings the server runs with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Listen address.
    pub bind_addr: SocketAddr,
    /// Title limit enforced on create and update.
    pub max_title_len: usize,
    /// Fallback tracing filter when `TASKBOARD_LOG` is unset.
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_PORT)),
            max_title_len: MAX_TASK_TITLE_LENGTH,
            log_level: "info".to_string(),
        }
    }
}

impl ServerConfig {
    /// Reads the config file named by `cli` (or the default one) and
    /// merges it under the command line.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for an unreadable or malformed file, or a
    /// zero title limit.
    pub fn load(cli: &ServerCliArgs) -> Result<Self, ConfigError> {
        let file = read_file_config(cli.config.as_deref())?;
        Self::merge(cli, &file)
    }

    fn merge(cli: &ServerCliArgs, file: &FileConfig) -> Result<Self, ConfigError> {
        let fallback = Self::default();
        let max_title_len = cli
            .max_title_len
            .or(file.server.max_title_len)
            .unwrap_or(fallback.max_title_len);
        if max_title_len == 0 {
            return Err(ConfigError::ZeroTitleLimit);
        }

        Ok(Self {
            bind_addr: cli
                .bind
                .or(file.server.bind_addr)
                .unwrap_or(fallback.bind_addr),
            max_title_len,
            log_level: cli.log_level.clone(),
        })
    }
}

fn read_file_config(explicit: Option<&Path>) -> Result<FileConfig, ConfigError> {
    let (path, required) = match explicit {
        Some(path) => (path.to_path_buf(), true),
        None => match dirs::config_dir() {
            Some(dir) => (dir.join("taskboard-server").join("config.toml"), false),
            None => return Ok(FileConfig::default()),
        },
    };

    let contents = match std::fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(e) if !required && e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(FileConfig::default());
        }
        Err(source) => return Err(ConfigError::ReadFile { path, source }),
    };
    Ok(toml::from_str(&contents)?)
}
