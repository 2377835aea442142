//! Configuration validation.
//!
//! Semantic checks on a parsed [`GatewayConfig`]; serde already handled the
//! syntactic ones. Collects every problem instead of stopping at the first,
//! so operators can fix a config file in one pass.

use std::collections::{BTreeMap, BTreeSet};

use crate::config::schema::{AuthConfig, GatewayConfig, ListenerConfig};
use crate::listener::compile::{merge_listener, DEFAULT_METHODS};
use crate::listener::registry::derive_id;
use crate::plugins::PluginSpec;

/// HTTP methods a listener may bind.
pub const SUPPORTED_METHODS: &[&str] = &[
    "GET", "POST", "PUT", "DELETE", "PATCH", "HEAD", "OPTIONS", "TRACE",
];

/// A single semantic validation failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("listener {route}: route must start with '/'")]
    RouteShape { route: String },

    #[error("listener {route}: unsupported HTTP method {method:?}")]
    UnsupportedMethod { route: String, method: String },

    #[error("listener {route}: duplicate HTTP method {method:?}")]
    DuplicateMethod { route: String, method: String },

    #[error("listener {route}: no command configured (directly or via defaults)")]
    MissingCommand { route: String },

    #[error("listener {route}: auth entry {index} has an empty secret")]
    EmptyAuthSecret { route: String, index: usize },

    #[error("listener {route}: schedule plugin requires interval_secs > 0")]
    ScheduleInterval { route: String },

    #[error("listener {route}: schedule plugin requires a target listener_id")]
    ScheduleTarget { route: String },

    #[error("listener {route}: identifier {id:?} collides with listener {previous}")]
    DuplicateListenerId {
        route: String,
        previous: String,
        id: String,
    },
}

/// Validate a full gateway configuration.
///
/// Pure function; returns all errors found across every listener, including
/// nested error-handler listeners.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    // Route sanitization can map distinct routes to the same registry
    // identifier; catch that here so mounting never has to.
    let mut seen_ids: BTreeMap<String, String> = BTreeMap::new();

    for (route, listener) in &config.listeners {
        if !route.starts_with('/') {
            errors.push(ValidationError::RouteShape {
                route: route.clone(),
            });
        }
        validate_listener(route, &config.defaults, listener, false, &mut errors);

        for method in resolved_methods(&config.defaults, listener) {
            let id = derive_id(&config.listener_id_prefix, route, &method);
            if let Some(previous) = seen_ids.insert(id.clone(), route.clone()) {
                errors.push(ValidationError::DuplicateListenerId {
                    route: route.clone(),
                    previous,
                    id,
                });
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// The methods a listener would bind: defaults applied, uppercased, deduped.
fn resolved_methods(defaults: &ListenerConfig, listener: &ListenerConfig) -> BTreeSet<String> {
    let merged = merge_listener(defaults, listener);
    if merged.methods.is_empty() {
        DEFAULT_METHODS.iter().map(|m| m.to_string()).collect()
    } else {
        merged
            .methods
            .iter()
            .map(|m| m.to_ascii_uppercase())
            .collect()
    }
}

fn validate_listener(
    route: &str,
    defaults: &ListenerConfig,
    listener: &ListenerConfig,
    is_error_handler: bool,
    errors: &mut Vec<ValidationError>,
) {
    let merged = merge_listener(defaults, listener);

    let mut seen = BTreeSet::new();
    for method in &merged.methods {
        let upper = method.to_ascii_uppercase();
        if !SUPPORTED_METHODS.contains(&upper.as_str()) {
            errors.push(ValidationError::UnsupportedMethod {
                route: route.to_string(),
                method: method.clone(),
            });
        } else if !seen.insert(upper) {
            errors.push(ValidationError::DuplicateMethod {
                route: route.to_string(),
                method: method.clone(),
            });
        }
    }

    match &merged.command {
        Some(command) if !command.command.is_empty() => {}
        _ => errors.push(ValidationError::MissingCommand {
            route: route.to_string(),
        }),
    }

    for (index, auth) in merged.auth.iter().enumerate() {
        let empty = match auth {
            AuthConfig::BasicAuth { password, .. } => password.is_empty(),
            AuthConfig::ApiKey { api_key } => api_key.is_empty(),
        };
        if empty {
            errors.push(ValidationError::EmptyAuthSecret {
                route: route.to_string(),
                index,
            });
        }
    }

    for plugin in &merged.plugins {
        if let PluginSpec::Schedule(schedule) = plugin {
            if schedule.interval_secs == 0 {
                errors.push(ValidationError::ScheduleInterval {
                    route: route.to_string(),
                });
            }
            if schedule.listener_id.is_empty() {
                errors.push(ValidationError::ScheduleTarget {
                    route: route.to_string(),
                });
            }
        }
    }

    // Error handlers are compiled one level deep; validate to the same depth.
    if !is_error_handler {
        if let Some(handler) = &merged.error_handler {
            let handler_route = format!("{route} (error handler)");
            validate_listener(&handler_route, defaults, handler, true, errors);
        }
    }
}
