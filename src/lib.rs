//! HTTP-to-command gateway library.
//!
//! Maps inbound HTTP requests to the execution of external commands.
//! Operators declare named listeners (route, methods, auth, plugin chain,
//! command template); per request the gateway authenticates the caller,
//! assembles a flat argument mapping from the request, runs it through the
//! pre-execute plugin chain, executes the command and returns a structured
//! response, optionally composing an error-handler execution on failure.

// Core subsystems
pub mod config;
pub mod exec;
pub mod http;
pub mod listener;
pub mod plugins;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use config::{load_config, GatewayConfig};
pub use exec::{ExecCommandResult, Executor, ShellExecutor};
pub use http::GatewayServer;
pub use lifecycle::Shutdown;
pub use listener::{CompiledListener, ListenerRegistry, ListenerResponse};
