//! External conversion engine invocation.
//!
//! The actual PDF→DOCX transformation is delegated entirely to an external
//! converter program, treated as a black box: given a source path it must
//! produce the requested output file or exit non-zero. [`CommandEngine`]
//! runs the configured argv template as a child process and maps its exit
//! status onto [`EngineError`].
//!
//! The trait seam exists for the same reason as the analyzer's: the job
//! runner is exercised in tests with stub engines, and deployments can
//! point the template at whatever converter they ship with.

use crate::config::EngineSettings;
use crate::error::EngineError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

/// One conversion to perform.
#[derive(Debug, Clone)]
pub struct ConversionRequest {
    pub input: PathBuf,
    pub output: PathBuf,
    /// Forwarded to the converter when the argv template references it.
    pub password: Option<String>,
}

/// Performs the format transformation for one job.
#[async_trait]
pub trait ConversionEngine: Send + Sync {
    async fn convert(&self, request: &ConversionRequest) -> Result<(), EngineError>;
}

/// Engine that shells out to a configured converter command.
pub struct CommandEngine {
    settings: EngineSettings,
}

impl CommandEngine {
    pub fn new(settings: EngineSettings) -> Self {
        Self { settings }
    }

    /// Expand the argv template for one request.
    ///
    /// `{input}` and `{output}` are substituted with the request paths.
    /// Arguments referencing `{password}` are dropped entirely when the
    /// request carries none, so templates like `--password={password}`
    /// disappear rather than passing an empty value.
    fn build_args(&self, request: &ConversionRequest) -> Vec<String> {
        let input = request.input.to_string_lossy();
        let output = request.output.to_string_lossy();

        self.settings
            .args
            .iter()
            .filter_map(|arg| {
                if arg.contains("{password}") {
                    request
                        .password
                        .as_deref()
                        .map(|pwd| arg.replace("{password}", pwd))
                } else {
                    Some(arg.replace("{input}", &input).replace("{output}", &output))
                }
            })
            .collect()
    }
}

#[async_trait]
impl ConversionEngine for CommandEngine {
    async fn convert(&self, request: &ConversionRequest) -> Result<(), EngineError> {
        let args = self.build_args(request);
        debug!("running converter: {} {:?}", self.settings.command, args);

        let child = Command::new(&self.settings.command)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| EngineError::Spawn {
                command: self.settings.command.clone(),
                source: e,
            })?;

        let secs = self.settings.timeout_seconds;
        let waited = if secs > 0 {
            match tokio::time::timeout(Duration::from_secs(secs), child.wait_with_output()).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(
                        "converter exceeded {}s for '{}'",
                        secs,
                        request.input.display()
                    );
                    // kill_on_drop reaps the child when the future is dropped
                    return Err(EngineError::TimedOut { secs });
                }
            }
        } else {
            child.wait_with_output().await
        };
        let output = waited.map_err(|e| EngineError::Spawn {
            command: self.settings.command.clone(),
            source: e,
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(EngineError::Failed {
                code: output.status.code(),
                stderr,
            });
        }

        if !request.output.exists() {
            return Err(EngineError::MissingOutput {
                path: request.output.clone(),
            });
        }

        Ok(())
    }
}

/// Build the default output path for a request: `{dir}/{file_stem}.docx`.
pub fn output_path(output_dir: &Path, file_stem: &str) -> PathBuf {
    output_dir.join(format!("{file_stem}.docx"))
}
