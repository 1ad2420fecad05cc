//! Rendering backends
//!
//! A [`Renderer`] turns a source file (the original attachment or the HTML
//! intermediate) into one output format. [`CommandRenderer`] shells out to an
//! external converter such as pandoc or wkhtmltopdf.

use crate::config::RenderCommand;
use crate::delivery::OutputFormat;
use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;
use tokio::process::Command;

/// Errors raised while converting a document
///
/// Recoverable at item level: the item is skipped and retried next run.
#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("no renderer configured for format '{0}'")]
    NoRenderer(OutputFormat),

    #[error("renderer '{program}' for '{format}' failed ({status}): {stderr}")]
    RendererFailed {
        format: OutputFormat,
        program: String,
        status: String,
        stderr: String,
    },

    #[error("failed to launch renderer '{program}': {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("conversion I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("every requested format failed for '{0}'")]
    AllFormatsFailed(String),
}

/// Converts a source file into one output format
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Writes the `format` rendering of `input` to `output`
    async fn render(
        &self,
        input: &Path,
        format: OutputFormat,
        output: &Path,
    ) -> Result<(), ConversionError>;
}

/// Runs an external program with `{input}` and `{output}` substituted
pub struct CommandRenderer {
    command: RenderCommand,
}

impl CommandRenderer {
    pub fn new(command: RenderCommand) -> Self {
        Self { command }
    }

    fn arguments(&self, input: &Path, output: &Path) -> Vec<String> {
        let input = input.to_string_lossy();
        let output = output.to_string_lossy();
        self.command
            .args
            .iter()
            .map(|arg| arg.replace("{input}", &input).replace("{output}", &output))
            .collect()
    }
}

#[async_trait]
impl Renderer for CommandRenderer {
    async fn render(
        &self,
        input: &Path,
        format: OutputFormat,
        output: &Path,
    ) -> Result<(), ConversionError> {
        let program = &self.command.program;
        tracing::debug!("Rendering {} with {}", format, program);

        let result = Command::new(program)
            .args(self.arguments(input, output))
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| ConversionError::Launch {
                program: program.clone(),
                source,
            })?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(ConversionError::RendererFailed {
                format,
                program: program.clone(),
                status: result.status.to_string(),
                stderr: stderr.trim().chars().take(500).collect(),
            });
        }

        let written = tokio::fs::metadata(output)
            .await
            .map(|meta| meta.len() > 0)
            .unwrap_or(false);
        if !written {
            return Err(ConversionError::RendererFailed {
                format,
                program: program.clone(),
                status: result.status.to_string(),
                stderr: "renderer produced no output".to_string(),
            });
        }
        Ok(())
    }
}
