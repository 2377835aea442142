//! Listener compilation.
//!
//! Merges global defaults with a per-route configuration, resolves plugin
//! instances through the mount-scope [`PluginSet`], and produces an
//! immutable [`CompiledListener`]. Error-handler listeners are compiled one
//! level deep with the same defaults.

use std::sync::{Arc, OnceLock};
use thiserror::Error;

use crate::config::{AuthConfig, CommandConfig, ListenerConfig};
use crate::exec::Executor;
use crate::listener::cache::StorageCache;
use crate::plugins::{Plugin, PluginSet};

/// Methods bound when a listener declares none.
pub const DEFAULT_METHODS: &[&str] = &["GET", "POST"];

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("listener {route}: no command configured (directly or via defaults)")]
    MissingCommand { route: String },

    #[error("listener {route}: registry identifier {id:?} already in use")]
    DuplicateListenerId { route: String, id: String },
}

/// The resolved, executable form of a listener. Immutable after compilation
/// except for the one-time registry identifier assignment.
pub struct CompiledListener {
    pub(crate) route: String,
    pub(crate) methods: Vec<String>,
    pub(crate) auth: Vec<AuthConfig>,
    pub(crate) command: CommandConfig,
    pub(crate) plugins: Vec<Arc<dyn Plugin>>,
    pub(crate) executor: Arc<dyn Executor>,
    pub(crate) storage: StorageCache,
    pub(crate) storage_key: String,
    pub(crate) error_handler: Option<Arc<CompiledListener>>,
    pub(crate) id: OnceLock<String>,
}

impl CompiledListener {
    pub fn route(&self) -> &str {
        &self.route
    }

    /// Resolved method list; never empty once compiled.
    pub fn methods(&self) -> &[String] {
        &self.methods
    }

    pub fn auth(&self) -> &[AuthConfig] {
        &self.auth
    }

    pub fn command(&self) -> &CommandConfig {
        &self.command
    }

    pub fn plugins(&self) -> &[Arc<dyn Plugin>] {
        &self.plugins
    }

    pub fn error_handler(&self) -> Option<&Arc<CompiledListener>> {
        self.error_handler.as_ref()
    }

    /// Latest cached execution outcome for this listener, if any.
    pub fn last_outcome(&self) -> Option<crate::listener::cache::StorageEntry> {
        self.storage.get(&self.storage_key)
    }

    /// This listener's plugins plus its error handler's, for lifecycle
    /// bookkeeping.
    pub fn all_plugins(&self) -> Vec<Arc<dyn Plugin>> {
        let mut plugins = self.plugins.clone();
        if let Some(handler) = &self.error_handler {
            plugins.extend(handler.plugins.iter().cloned());
        }
        plugins
    }

    /// Registry identifier, once mounted. The first bound (route, method)
    /// pair wins; further assignments are ignored.
    pub fn id(&self) -> Option<&str> {
        self.id.get().map(String::as_str)
    }

    pub(crate) fn assign_id(&self, id: String) {
        let _ = self.id.set(id);
    }
}

/// Field-wise merge: the listener wins, empty/None falls back to defaults.
pub fn merge_listener(defaults: &ListenerConfig, config: &ListenerConfig) -> ListenerConfig {
    ListenerConfig {
        methods: if config.methods.is_empty() {
            defaults.methods.clone()
        } else {
            config.methods.clone()
        },
        auth: if config.auth.is_empty() {
            defaults.auth.clone()
        } else {
            config.auth.clone()
        },
        plugins: if config.plugins.is_empty() {
            defaults.plugins.clone()
        } else {
            config.plugins.clone()
        },
        command: config.command.clone().or_else(|| defaults.command.clone()),
        error_handler: config
            .error_handler
            .clone()
            .or_else(|| defaults.error_handler.clone()),
    }
}

/// Compile one route's listener against the defaults.
pub fn compile_listener(
    defaults: &ListenerConfig,
    config: &ListenerConfig,
    route: &str,
    is_error_handler: bool,
    storage: StorageCache,
    executor: Arc<dyn Executor>,
    plugin_set: &mut PluginSet,
) -> Result<Arc<CompiledListener>, CompileError> {
    let merged = merge_listener(defaults, config);

    let command = match merged.command {
        Some(command) if !command.command.is_empty() => command,
        _ => {
            return Err(CompileError::MissingCommand {
                route: route.to_string(),
            })
        }
    };

    let methods: Vec<String> = if merged.methods.is_empty() {
        DEFAULT_METHODS.iter().map(|m| m.to_string()).collect()
    } else {
        merged
            .methods
            .iter()
            .map(|m| m.to_ascii_uppercase())
            .collect()
    };

    let plugins: Vec<Arc<dyn Plugin>> = merged
        .plugins
        .iter()
        .map(|spec| plugin_set.resolve(spec))
        .collect();

    // One level of error-handler composition; the handler itself gets none.
    let error_handler = if is_error_handler {
        None
    } else if let Some(handler_config) = &merged.error_handler {
        Some(compile_listener(
            defaults,
            handler_config,
            &format!("{route}:error-handler"),
            true,
            storage.clone(),
            executor.clone(),
            plugin_set,
        )?)
    } else {
        None
    };

    Ok(Arc::new(CompiledListener {
        route: route.to_string(),
        methods,
        auth: merged.auth,
        command,
        plugins,
        executor,
        storage,
        storage_key: route.to_string(),
        error_handler,
        id: OnceLock::new(),
    }))
}
