//! # Operations
//!
//! Concrete multi-step operations built on the process framework. Each one
//! is a plain instance of the framework: a typed context struct, a handful
//! of step values, and a builder wiring them into a [`Process`].
//!
//! The framework's driver never learns about any of these types - they talk
//! to it exclusively through the step contract.
//!
//! [`Process`]: crate::process::Process

pub mod delete;
pub mod register;

pub use delete::{delete_process, DeleteFileContext};
pub use register::{register_process, RegisterContext};
