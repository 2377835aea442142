//! Status plugin: mounts a read-only endpoint next to a listener.
//!
//! `GET <route><path_suffix>` returns the listener's latest cached outcome
//! as JSON, or 404 before the first invocation. Stateless, so instances are
//! shared across listeners with equal configs.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::listener::compile::CompiledListener;
use crate::plugins::{MountRoutesHook, Plugin};

fn default_path_suffix() -> String {
    "/status".to_string()
}

/// Configuration for the status plugin.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct StatusPluginConfig {
    /// Appended to the listener's route to form the status route.
    pub path_suffix: String,
}

impl Default for StatusPluginConfig {
    fn default() -> Self {
        Self {
            path_suffix: default_path_suffix(),
        }
    }
}

pub struct StatusPlugin {
    config: StatusPluginConfig,
}

impl StatusPlugin {
    pub fn new(config: StatusPluginConfig) -> Self {
        Self { config }
    }
}

impl Plugin for StatusPlugin {
    fn name(&self) -> &'static str {
        "status"
    }

    fn mount_routes(&self) -> Option<&dyn MountRoutesHook> {
        Some(self)
    }
}

impl MountRoutesHook for StatusPlugin {
    fn hook_mount_routes(&self, router: Router, listener: &Arc<CompiledListener>) -> Router {
        let path = format!(
            "{}{}",
            listener.route().trim_end_matches('/'),
            self.config.path_suffix
        );
        tracing::info!(listener = %listener.route(), status_route = %path, "mounting status route");

        let listener = listener.clone();
        router.route(
            &path,
            get(move || {
                let listener = listener.clone();
                async move { status_response(&listener) }
            }),
        )
    }
}

fn status_response(listener: &CompiledListener) -> Response {
    match listener.last_outcome() {
        Some(entry) => Json(entry).into_response(),
        None => (StatusCode::NOT_FOUND, "no recorded invocation").into_response(),
    }
}
