//! HTTP subsystem: router construction, listener mounting, request handling.

pub mod server;

pub use server::{mount_listeners, GatewayServer};
