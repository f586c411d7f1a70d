//! Service configuration.
//!
//! All knobs live in one [`ServiceConfig`] loaded from a TOML file with
//! environment-variable overrides for anything deployment-specific. Keeping
//! every setting in one struct makes it trivial to log the effective
//! configuration at startup and to diff two deployments when their
//! behaviour differs.
//!
//! Defaults match the reference deployment: bind `0.0.0.0:10000`, four HTTP
//! workers, 120 s client timeout, 5 s keep-alive.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Top-level service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub storage: StorageSettings,
    #[serde(default)]
    pub jobs: JobSettings,
    #[serde(default)]
    pub engine: EngineSettings,
    #[serde(default)]
    pub limits: LimitsSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Request-handling workers. 0 means one per CPU core.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Per-request timeout enforced by the serving layer, in seconds.
    /// Generous because result polling happens on separate fast requests;
    /// only the upload itself needs headroom.
    #[serde(default = "default_client_timeout")]
    pub client_timeout_seconds: u64,
    #[serde(default = "default_keep_alive")]
    pub keep_alive_seconds: u64,
}

/// Filesystem layout for uploaded sources and produced outputs.
///
/// Both directories are created at startup if absent. Files are never
/// deleted: retention is left to the deployment (see DESIGN.md).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

/// Job execution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSettings {
    /// Maximum conversions running at once. Submissions beyond the cap stay
    /// queued until a slot frees.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
}

/// External conversion engine invocation.
///
/// The engine is an opaque external program. `args` is an argv template:
/// `{input}`, `{output}`, and `{password}` are substituted per job. An
/// argument containing `{password}` is dropped entirely when the job has
/// no password.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSettings {
    #[serde(default = "default_engine_command")]
    pub command: String,
    #[serde(default = "default_engine_args")]
    pub args: Vec<String>,
    /// Wall-clock limit per conversion, in seconds. 0 disables the limit.
    #[serde(default = "default_engine_timeout")]
    pub timeout_seconds: u64,
}

/// Request size limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsSettings {
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default value functions

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    10000
}

fn default_workers() -> usize {
    4
}

fn default_client_timeout() -> u64 {
    120
}

fn default_keep_alive() -> u64 {
    5
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("uploads")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("outputs")
}

fn default_max_concurrent() -> usize {
    4
}

fn default_engine_command() -> String {
    "pdf2docx".to_string()
}

fn default_engine_args() -> Vec<String> {
    vec![
        "convert".to_string(),
        "{input}".to_string(),
        "{output}".to_string(),
    ]
}

fn default_engine_timeout() -> u64 {
    600
}

fn default_max_upload_bytes() -> usize {
    50 * 1024 * 1024 // 50 MB
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            workers: default_workers(),
            client_timeout_seconds: default_client_timeout(),
            keep_alive_seconds: default_keep_alive(),
        }
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            upload_dir: default_upload_dir(),
            output_dir: default_output_dir(),
        }
    }
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            command: default_engine_command(),
            args: default_engine_args(),
            timeout_seconds: default_engine_timeout(),
        }
    }
}

impl Default for LimitsSettings {
    fn default() -> Self {
        Self {
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            server: ServerSettings::default(),
            storage: StorageSettings::default(),
            jobs: JobSettings::default(),
            engine: EngineSettings::default(),
            limits: LimitsSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

/// Configuration loading/validation failure.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl ServiceConfig {
    /// Load configuration from a TOML file, apply environment overrides,
    /// and validate.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;

        let mut config: ServiceConfig =
            toml::from_str(&content).map_err(|e| ConfigError::Parse {
                path: path.to_path_buf(),
                source: e,
            })?;

        config.apply_env_overrides()?;
        config.validate()?;

        Ok(config)
    }

    /// Apply environment variable overrides.
    ///
    /// Supported variables:
    /// - `PORT` — hosting platforms assign the listen port this way
    /// - `PDF2DOCX_HOST` — override `server.host`
    /// - `PDF2DOCX_UPLOAD_DIR` / `PDF2DOCX_OUTPUT_DIR` — storage directories
    /// - `PDF2DOCX_ENGINE` — override `engine.command`
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        use std::env;

        if let Ok(port_str) = env::var("PORT") {
            self.server.port = port_str
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("invalid PORT value: {port_str}")))?;
        }

        if let Ok(host) = env::var("PDF2DOCX_HOST") {
            self.server.host = host;
        }

        if let Ok(dir) = env::var("PDF2DOCX_UPLOAD_DIR") {
            self.storage.upload_dir = PathBuf::from(dir);
        }

        if let Ok(dir) = env::var("PDF2DOCX_OUTPUT_DIR") {
            self.storage.output_dir = PathBuf::from(dir);
        }

        if let Ok(cmd) = env::var("PDF2DOCX_ENGINE") {
            self.engine.command = cmd;
        }

        Ok(())
    }

    /// Validate configuration settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Invalid("server port cannot be 0".into()));
        }

        if self.jobs.max_concurrent == 0 {
            return Err(ConfigError::Invalid(
                "jobs.max_concurrent must be at least 1".into(),
            ));
        }

        if self.engine.command.trim().is_empty() {
            return Err(ConfigError::Invalid("engine.command cannot be empty".into()));
        }

        if !self.engine.args.iter().any(|a| a.contains("{input}")) {
            return Err(ConfigError::Invalid(
                "engine.args must reference {input}".into(),
            ));
        }

        if !self.engine.args.iter().any(|a| a.contains("{output}")) {
            return Err(ConfigError::Invalid(
                "engine.args must reference {output}".into(),
            ));
        }

        if self.limits.max_upload_bytes == 0 {
            return Err(ConfigError::Invalid("max_upload_bytes cannot be 0".into()));
        }

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "invalid log level '{}', must be one of: {}",
                self.logging.level,
                valid_levels.join(", ")
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = ServiceConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn invalid_port_rejected() {
        let mut config = ServiceConfig::default();
        config.server.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_concurrency_rejected() {
        let mut config = ServiceConfig::default();
        config.jobs.max_concurrent = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn engine_args_must_carry_placeholders() {
        let mut config = ServiceConfig::default();
        config.engine.args = vec!["convert".into(), "{input}".into()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn invalid_log_level_rejected() {
        let mut config = ServiceConfig::default();
        config.logging.level = "loud".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn empty_sections_fall_back_to_defaults() {
        let config: ServiceConfig = toml::from_str("").expect("empty config parses");
        assert_eq!(config.server.port, 10000);
        assert_eq!(config.jobs.max_concurrent, 4);
        assert_eq!(config.storage.upload_dir, PathBuf::from("uploads"));
    }

    #[test]
    fn partial_toml_overrides_only_named_fields() {
        let config: ServiceConfig = toml::from_str(
            r#"
            [server]
            port = 8080

            [jobs]
            max_concurrent = 2
            "#,
        )
        .expect("partial config parses");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.jobs.max_concurrent, 2);
    }
}
