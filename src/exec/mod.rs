//! Command execution collaborator.
//!
//! The dispatcher only depends on the [`Executor`] trait; the production
//! implementation spawns real processes (see [`shell`]), tests inject mocks.
//! Retry and timeout policy for the underlying command live behind this
//! boundary, not in the dispatcher.

pub mod shell;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::CommandConfig;
use crate::listener::args::Args;

pub use shell::ShellExecutor;

/// Outcome of running the underlying command. Never mutated by the core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecCommandResult {
    /// Program that was run.
    pub command: String,

    /// Rendered program arguments.
    pub args: Vec<String>,

    /// Combined stdout and stderr.
    pub output: String,

    /// Process exit code.
    pub exit_code: i32,
}

/// Error type for command execution.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("failed to spawn command {command:?}: {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    #[error("command {command:?} exited with code {exit_code}: {output}")]
    Failed {
        command: String,
        exit_code: i32,
        output: String,
    },
}

/// Executes a command template against a final argument mapping.
#[async_trait]
pub trait Executor: Send + Sync + 'static {
    async fn execute(
        &self,
        command: &CommandConfig,
        args: &Args,
    ) -> Result<ExecCommandResult, ExecError>;
}
