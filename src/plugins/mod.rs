//! Plugin framework.
//!
//! A plugin implements zero or more hook capabilities; the framework checks
//! capability membership dynamically through the per-hook accessors on
//! [`Plugin`] and silently skips plugins that lack one. Plugin configs act
//! as factories: a unique config produces a fresh instance per listener,
//! while non-unique configs are de-duplicated by value at mount scope so one
//! instance (and any external resource it owns) is shared across routes.

pub mod debug;
pub mod schedule;
pub mod status;

use async_trait::async_trait;
use axum::Router;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

use crate::listener::args::Args;
use crate::listener::compile::CompiledListener;
use crate::listener::registry::ListenerRegistry;

pub use debug::{DebugPlugin, DebugPluginConfig};
pub use schedule::{SchedulePlugin, SchedulePluginConfig};
pub use status::{StatusPlugin, StatusPluginConfig};

/// Error returned by any plugin hook.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct PluginError(pub String);

impl PluginError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

pub type PluginResult<T> = Result<T, PluginError>;

/// Hook invoked before command execution; may mutate the argument mapping.
#[async_trait]
pub trait PreExecuteHook: Send + Sync {
    async fn hook_pre_execute(&self, args: &mut Args) -> PluginResult<()>;
}

/// Hook invoked once per listener at mount time, after the route is bound,
/// letting a plugin register auxiliary endpoints.
pub trait MountRoutesHook: Send + Sync {
    fn hook_mount_routes(&self, router: Router, listener: &Arc<CompiledListener>) -> Router;
}

/// Hook for process-wide start/stop, de-duplicated by instance identity.
#[async_trait]
pub trait LifecycleHook: Send + Sync {
    /// Invoked once per mount, before request serving begins. A failure is
    /// fatal to startup.
    async fn on_start(&self, registry: &Arc<ListenerRegistry>) -> PluginResult<()>;

    /// Invoked once at shutdown. Failures are logged, not propagated.
    async fn on_stop(&self) -> PluginResult<()>;
}

/// Hook invoked when command execution (or a pre-execute hook) fails.
#[async_trait]
pub trait ErrorHook: Send + Sync {
    async fn hook_error(&self, args: &Args, error: &str) -> PluginResult<()>;
}

/// A runtime plugin instance, polymorphic over the hook capability set.
///
/// The default accessors return `None`; a plugin overrides exactly the
/// capabilities it implements.
pub trait Plugin: Send + Sync {
    fn name(&self) -> &'static str;

    fn pre_execute(&self) -> Option<&dyn PreExecuteHook> {
        None
    }

    fn mount_routes(&self) -> Option<&dyn MountRoutesHook> {
        None
    }

    fn lifecycle(&self) -> Option<&dyn LifecycleHook> {
        None
    }

    fn on_error(&self) -> Option<&dyn ErrorHook> {
        None
    }
}

/// Declared plugin configuration; the factory side of the framework.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PluginSpec {
    Debug(DebugPluginConfig),
    Schedule(SchedulePluginConfig),
    Status(StatusPluginConfig),
}

impl PluginSpec {
    /// Whether instances of this configuration are unique per listener.
    /// Non-unique configs are candidates for sharing across listeners.
    pub fn is_unique(&self) -> bool {
        match self {
            PluginSpec::Debug(_) => false,
            PluginSpec::Schedule(_) => true,
            PluginSpec::Status(_) => false,
        }
    }

    fn build(&self) -> Arc<dyn Plugin> {
        match self {
            PluginSpec::Debug(config) => Arc::new(DebugPlugin::new(config.clone())),
            PluginSpec::Schedule(config) => Arc::new(SchedulePlugin::new(config.clone())),
            PluginSpec::Status(config) => Arc::new(StatusPlugin::new(config.clone())),
        }
    }
}

/// Mount-scope plugin instantiation state.
///
/// One `PluginSet` lives for the duration of a single mount operation and
/// hands out shared instances for value-identical non-unique configs.
#[derive(Default)]
pub struct PluginSet {
    shared: Vec<(PluginSpec, Arc<dyn Plugin>)>,
}

impl PluginSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve a config to an instance, reusing shared ones where allowed.
    pub fn resolve(&mut self, spec: &PluginSpec) -> Arc<dyn Plugin> {
        if spec.is_unique() {
            return spec.build();
        }
        if let Some((_, plugin)) = self.shared.iter().find(|(existing, _)| existing == spec) {
            return plugin.clone();
        }
        let plugin = spec.build();
        self.shared.push((spec.clone(), plugin.clone()));
        plugin
    }
}
