//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     Load config → Validate → Mount listeners → Start plugin lifecycles
//!         → Serve traffic
//!
//! Shutdown:
//!     Signal received → Stop accepting → Drain → Stop plugin lifecycles
//! ```
//!
//! # Design Decisions
//! - Plugin OnStart failures are fatal: no partial service
//! - Plugin OnStop failures are logged, never block remaining stops

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
