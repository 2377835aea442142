//! Process-spawning executor.

use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;

use crate::config::CommandConfig;
use crate::exec::{ExecCommandResult, ExecError, Executor};
use crate::listener::args::Args;

/// Executor that spawns the configured program as a child process.
///
/// `{{key}}` placeholders in argv entries and env values are substituted
/// with the argument of the same name before spawning. Unknown keys render
/// as the empty string.
#[derive(Debug, Default, Clone)]
pub struct ShellExecutor;

impl ShellExecutor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Executor for ShellExecutor {
    async fn execute(
        &self,
        command: &CommandConfig,
        args: &Args,
    ) -> Result<ExecCommandResult, ExecError> {
        let rendered_args: Vec<String> = command
            .args
            .iter()
            .map(|template| render_template(template, args))
            .collect();

        let mut process = Command::new(&command.command);
        process.args(&rendered_args).kill_on_drop(true);
        for (key, value) in &command.env {
            process.env(key, render_template(value, args));
        }

        let output = process.output().await.map_err(|source| ExecError::Spawn {
            command: command.command.clone(),
            source,
        })?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        let exit_code = output.status.code().unwrap_or(-1);

        if !output.status.success() {
            return Err(ExecError::Failed {
                command: command.command.clone(),
                exit_code,
                output: combined,
            });
        }

        Ok(ExecCommandResult {
            command: command.command.clone(),
            args: rendered_args,
            output: combined,
            exit_code,
        })
    }
}

/// Substitute every `{{key}}` occurrence with the matching argument value.
fn render_template(template: &str, args: &Args) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                let key = after[..end].trim();
                if let Some(value) = args.get(key) {
                    out.push_str(&value_to_string(value));
                }
                rest = &after[end + 2..];
            }
            None => {
                // Unterminated placeholder, keep it verbatim.
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
