//! Debug plugin: logs the final argument mapping before execution and
//! reports execution failures.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::listener::args::Args;
use crate::plugins::{ErrorHook, Plugin, PluginResult, PreExecuteHook};

/// Configuration for the debug plugin.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DebugPluginConfig {
    /// Prefix used to identify log messages.
    pub prefix: String,

    /// Arguments merged over the request arguments, for debugging.
    pub args: Args,
}

/// Shared across listeners: the plugin keeps no per-request state.
pub struct DebugPlugin {
    config: DebugPluginConfig,
}

impl DebugPlugin {
    pub fn new(config: DebugPluginConfig) -> Self {
        Self { config }
    }
}

impl Plugin for DebugPlugin {
    fn name(&self) -> &'static str {
        "debug"
    }

    fn pre_execute(&self) -> Option<&dyn PreExecuteHook> {
        Some(self)
    }

    fn on_error(&self) -> Option<&dyn ErrorHook> {
        Some(self)
    }
}

#[async_trait]
impl PreExecuteHook for DebugPlugin {
    async fn hook_pre_execute(&self, args: &mut Args) -> PluginResult<()> {
        for (key, value) in &self.config.args {
            args.insert(key.clone(), value.clone());
        }

        tracing::warn!(prefix = %self.config.prefix, args = ?args, "pre-execute");
        Ok(())
    }
}

#[async_trait]
impl ErrorHook for DebugPlugin {
    async fn hook_error(&self, args: &Args, error: &str) -> PluginResult<()> {
        tracing::warn!(prefix = %self.config.prefix, error = %error, args = ?args, "execution failed");
        Ok(())
    }
}
