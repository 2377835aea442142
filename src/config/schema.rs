//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::plugins::PluginSpec;

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// HTTP server configuration (bind address, limits).
    pub server: ServerConfig,

    /// Prefix used when deriving listener registry identifiers.
    pub listener_id_prefix: String,

    /// Fallback values merged into every listener that does not override them.
    pub defaults: ListenerConfig,

    /// Listener definitions, keyed by route pattern (e.g. "/hooks/{name}").
    pub listeners: BTreeMap<String, ListenerConfig>,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            listener_id_prefix: "listener".to_string(),
            defaults: ListenerConfig::default(),
            listeners: BTreeMap::new(),
            observability: ObservabilityConfig::default(),
        }
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Request timeout in seconds.
    pub request_timeout_secs: u64,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            request_timeout_secs: 30,
            max_body_bytes: 2 * 1024 * 1024,
        }
    }
}

/// A single listener: route methods, auth, plugin chain and command template.
///
/// The same shape doubles as the `defaults` block; empty/None fields of a
/// listener fall back to the corresponding defaults field at compile time.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ListenerConfig {
    /// Accepted HTTP methods. Empty means GET and POST.
    pub methods: Vec<String>,

    /// Accepted authentication methods. Empty means open to all requests.
    /// A request is accepted if it satisfies at least one entry.
    pub auth: Vec<AuthConfig>,

    /// Ordered plugin chain.
    pub plugins: Vec<PluginSpec>,

    /// Command template to execute on each matching request.
    pub command: Option<CommandConfig>,

    /// Secondary listener invoked when the primary execution fails.
    pub error_handler: Option<Box<ListenerConfig>>,
}

/// One accepted authentication method.
///
/// Each entry is exactly one method; listing several entries means the
/// request passes if any one of them matches.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum AuthConfig {
    /// Fixed-identity HTTP basic credential.
    BasicAuth {
        /// Basic auth username. Defaults to the gateway's fixed identity.
        #[serde(default = "default_basic_auth_username")]
        username: String,

        /// Basic auth password.
        password: String,
    },

    /// Shared-secret token supplied via the reserved query parameter.
    ApiKey {
        /// The accepted key value.
        api_key: String,
    },
}

pub(crate) fn default_basic_auth_username() -> String {
    crate::listener::auth::DEFAULT_BASIC_AUTH_USER.to_string()
}

/// Command template for the execution collaborator.
///
/// `{{key}}` placeholders in `args` and `env` values are substituted with
/// the final request argument of the same name.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct CommandConfig {
    /// Program to run.
    pub command: String,

    /// Program arguments (templated).
    pub args: Vec<String>,

    /// Extra environment variables (values templated).
    pub env: BTreeMap<String, String>,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
