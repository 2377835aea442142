//! Listener registry and aggregated plugin lifecycle.
//!
//! Assigns a stable identifier to each (route, method) pair bound at mount
//! time and exposes identifier lookup so out-of-band triggers (schedulers,
//! queue consumers) can invoke a listener without a live HTTP request.
//! Also owns the identity-deduplicated set of lifecycle-capable plugin
//! instances: a plugin shared across listeners starts and stops exactly once.

use std::collections::HashMap;
use std::sync::Arc;

use crate::listener::compile::{CompileError, CompiledListener};
use crate::plugins::{Plugin, PluginError};

/// Derive the stable identifier for one bound (route, method) pair.
pub fn derive_id(prefix: &str, route: &str, method: &str) -> String {
    format!(
        "{}-{}-{}",
        prefix,
        sanitize_route(route),
        method.to_ascii_lowercase()
    )
}

/// Collapse a route pattern into an identifier-safe token: every run of
/// non-word characters becomes a single dash.
fn sanitize_route(route: &str) -> String {
    let mut out = String::with_capacity(route.len());
    let mut last_dash = true; // swallow leading separators
    for c in route.chars() {
        if c.is_ascii_alphanumeric() || c == '_' {
            out.push(c);
            last_dash = false;
        } else if !last_dash {
            out.push('-');
            last_dash = true;
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    out
}

/// Builder used during one mount operation.
pub struct RegistryBuilder {
    prefix: String,
    listeners: HashMap<String, Arc<CompiledListener>>,
    lifecycle_plugins: Vec<Arc<dyn Plugin>>,
}

impl RegistryBuilder {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            listeners: HashMap::new(),
            lifecycle_plugins: Vec::new(),
        }
    }

    /// Register one bound (route, method) pair. The first registration of a
    /// listener also assigns its identifier and collects its lifecycle
    /// plugins, de-duplicated by instance identity.
    ///
    /// Sanitization can map distinct routes to the same identifier; such a
    /// collision is rejected rather than silently overwriting the earlier
    /// listener.
    pub fn register(
        &mut self,
        route: &str,
        method: &str,
        listener: Arc<CompiledListener>,
    ) -> Result<(), CompileError> {
        let id = derive_id(&self.prefix, route, method);
        if self.listeners.contains_key(&id) {
            return Err(CompileError::DuplicateListenerId {
                route: route.to_string(),
                id,
            });
        }
        listener.assign_id(id.clone());

        for plugin in listener.all_plugins() {
            if plugin.lifecycle().is_none() {
                continue;
            }
            let seen = self
                .lifecycle_plugins
                .iter()
                .any(|existing| Arc::ptr_eq(existing, &plugin));
            if !seen {
                self.lifecycle_plugins.push(plugin);
            }
        }

        self.listeners.insert(id, listener);
        Ok(())
    }

    pub fn build(self) -> ListenerRegistry {
        ListenerRegistry {
            listeners: self.listeners,
            lifecycle_plugins: self.lifecycle_plugins,
        }
    }
}

/// Identifier to compiled-listener mapping, immutable after mount.
pub struct ListenerRegistry {
    listeners: HashMap<String, Arc<CompiledListener>>,
    lifecycle_plugins: Vec<Arc<dyn Plugin>>,
}

impl ListenerRegistry {
    /// Registry with no listeners. Useful for tests and tooling.
    pub fn empty() -> Self {
        Self {
            listeners: HashMap::new(),
            lifecycle_plugins: Vec::new(),
        }
    }

    /// Look up a compiled listener by its registry identifier.
    pub fn lookup(&self, id: &str) -> Option<Arc<CompiledListener>> {
        self.listeners.get(id).cloned()
    }

    /// All registered identifiers.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.listeners.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Start every lifecycle-capable plugin exactly once. The first failure
    /// aborts startup.
    pub async fn start(self: &Arc<Self>) -> Result<(), PluginError> {
        for plugin in &self.lifecycle_plugins {
            if let Some(hook) = plugin.lifecycle() {
                hook.on_start(self).await.map_err(|err| {
                    PluginError::new(format!("plugin {} failed to start: {}", plugin.name(), err))
                })?;
                tracing::info!(plugin = plugin.name(), "plugin started");
            }
        }
        Ok(())
    }

    /// Stop every lifecycle-capable plugin exactly once. Failures are logged
    /// and do not block the remaining stops.
    pub async fn stop(&self) {
        for plugin in &self.lifecycle_plugins {
            if let Some(hook) = plugin.lifecycle() {
                if let Err(err) = hook.on_stop().await {
                    tracing::warn!(plugin = plugin.name(), error = %err, "plugin failed to stop");
                } else {
                    tracing::info!(plugin = plugin.name(), "plugin stopped");
                }
            }
        }
    }
}
