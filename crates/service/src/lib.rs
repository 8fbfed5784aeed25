//! Service infrastructure for Burrow clients.
//!
//! This crate provides the ambient wiring a client process needs around the
//! core library:
//! - Configuration (timeouts, retry ceilings, cache freshness, identity)
//! - State management (per-user profile managers over one store client)
//! - Notification delivery (the fan-out loop behind the fire-and-forget
//!   channel processes push into)
//! - Runtime bootstrap (tracing, panic logging, graceful shutdown)

pub mod config;
pub mod notifier;
pub mod runtime;
pub mod state;

// Re-export key types for convenience
pub use config::{Config, ConfigError};
pub use notifier::{NotificationCoordinator, Subscribers};
pub use runtime::spawn_service;
pub use state::{State as ServiceState, StateSetupError};
