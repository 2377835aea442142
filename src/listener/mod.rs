//! Listener compilation and request-dispatch pipeline.
//!
//! # Data Flow
//! ```text
//! Mount time:
//!     GatewayConfig → compile.rs (defaults merge, plugin resolution)
//!         → CompiledListener → registry.rs (id assignment, lifecycle set)
//!
//! Per request:
//!     auth.rs (gate) → args.rs (extraction)
//!         → dispatch.rs (pre-execute chain → execution → cache.rs update
//!            → response composition → error-handler chain)
//! ```
//!
//! # Design Decisions
//! - CompiledListener is immutable after mount (id assignment excepted)
//! - One StorageCache per mount, shared by Arc into every listener
//! - Error-handler recursion bounded by an explicit depth counter

pub mod args;
pub mod auth;
pub mod cache;
pub mod compile;
pub mod dispatch;
pub mod registry;

pub use args::{extract_args, Args, ExtractError};
pub use auth::{verify_auth, AuthRejected};
pub use cache::{StorageCache, StorageEntry};
pub use compile::{compile_listener, CompileError, CompiledListener};
pub use dispatch::ListenerResponse;
pub use registry::{ListenerRegistry, RegistryBuilder};
