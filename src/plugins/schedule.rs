//! Schedule plugin: periodically invokes a listener without an HTTP request.
//!
//! On start it resolves the target listener through the registry and spawns
//! an interval task that calls the listener's dispatcher with the configured
//! arguments. Marked unique: each declaration owns its own task.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::listener::args::Args;
use crate::listener::registry::ListenerRegistry;
use crate::plugins::{LifecycleHook, Plugin, PluginError, PluginResult};

/// Configuration for the schedule plugin.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SchedulePluginConfig {
    /// Registry identifier of the listener to invoke.
    pub listener_id: String,

    /// Invocation interval in seconds.
    pub interval_secs: u64,

    /// Precomputed arguments passed to each invocation.
    pub args: Args,
}

pub struct SchedulePlugin {
    config: SchedulePluginConfig,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SchedulePlugin {
    pub fn new(config: SchedulePluginConfig) -> Self {
        Self {
            config,
            task: Mutex::new(None),
        }
    }
}

impl Plugin for SchedulePlugin {
    fn name(&self) -> &'static str {
        "schedule"
    }

    fn lifecycle(&self) -> Option<&dyn LifecycleHook> {
        Some(self)
    }
}

#[async_trait]
impl LifecycleHook for SchedulePlugin {
    async fn on_start(&self, registry: &Arc<ListenerRegistry>) -> PluginResult<()> {
        let listener = registry.lookup(&self.config.listener_id).ok_or_else(|| {
            PluginError::new(format!(
                "schedule plugin: unknown listener id {:?}",
                self.config.listener_id
            ))
        })?;

        let interval = Duration::from_secs(self.config.interval_secs);
        let args = self.config.args.clone();
        let listener_id = self.config.listener_id.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick fires immediately; skip it so the schedule
            // starts one interval after boot.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                // HTTP requests get a correlation id from the request-id
                // layer; out-of-band invocations mint their own.
                let invocation_id = uuid::Uuid::new_v4();
                let response = listener.handle_request(args.clone()).await;
                match &response.error {
                    Some(error) => {
                        tracing::warn!(
                            listener = %listener_id,
                            invocation_id = %invocation_id,
                            error = %error,
                            "scheduled invocation failed"
                        )
                    }
                    None => {
                        tracing::debug!(
                            listener = %listener_id,
                            invocation_id = %invocation_id,
                            "scheduled invocation completed"
                        )
                    }
                }
            }
        });

        *self.task.lock().await = Some(handle);
        Ok(())
    }

    async fn on_stop(&self) -> PluginResult<()> {
        if let Some(handle) = self.task.lock().await.take() {
            handle.abort();
        }
        Ok(())
    }
}
