//! # Process framework
//!
//! A generic state machine for composing ordered, pausable, rollback-capable
//! steps into multi-step network operations:
//!
//! - [`ProcessStep`] - the unit of work: execute with a typed failure, undo
//!   with locally cached pre-state
//! - [`Process`] - the driver: strict sequential execution, reverse-order
//!   rollback on failure, exactly-once listener notification
//! - [`Sequence`] - steps composed into one composite step; rollback crosses
//!   the boundary transparently
//! - [`ProcessCtx`] - per-process typed scratch space plus the pause/stop
//!   checkpoint and the notification side channel
//! - [`ProcessHandle`] - pause/resume/stop and an awaitable terminal state,
//!   no polling anywhere
//!
//! The driver knows nothing about concrete step types - only the
//! state-machine contract. Data-dependent branching is a step returning
//! [`StepOutcome::Finish`] or [`StepOutcome::Push`] after inspecting what it
//! fetched.

mod context;
mod error;
mod listener;
#[allow(clippy::module_inception)]
mod process;
mod sequence;
mod state;
mod step;

pub use context::ProcessCtx;
pub use error::{ExecutionError, RollbackError, RollbackReason};
pub use listener::ProcessListener;
pub use process::{ControlError, Process, ProcessHandle};
pub use sequence::Sequence;
pub use state::{ProcessState, StepState, Terminal};
pub use step::{ProcessStep, StepOutcome};
