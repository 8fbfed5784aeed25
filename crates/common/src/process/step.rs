use std::fmt;

use async_trait::async_trait;

use super::context::ProcessCtx;
use super::error::{ExecutionError, RollbackError, RollbackReason};
use super::state::StepState;

/// What the driver does after a step succeeds
///
/// This is how data-dependent branching works without the driver knowing any
/// concrete step type: a step inspects what it fetched and tells the driver
/// where the sequence goes from here.
pub enum StepOutcome<C: Send> {
    /// Run the next step in the sequence.
    Continue,
    /// Skip every remaining step; the enclosing sequence completes now.
    Finish,
    /// Splice these steps in right after the current one, then continue.
    Push(Vec<Box<dyn ProcessStep<C>>>),
}

impl<C: Send> fmt::Debug for StepOutcome<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Continue => write!(f, "Continue"),
            Self::Finish => write!(f, "Finish"),
            Self::Push(steps) => write!(f, "Push({} steps)", steps.len()),
        }
    }
}

/// The unit of work: one logical action with an undo
///
/// Contract:
///
/// - `execute` runs at most once, only from READY, and is awaited to
///   completion by the driver - logically synchronous from the process's
///   viewpoint even though any network operation inside it is async. It
///   must not leak partial durable mutations past a failure: apply local
///   state only once the remote write confirming it has been accepted.
/// - `rollback` undoes whatever durable side effect `execute` caused, using
///   only locally cached pre-state. It is invoked after the step succeeded
///   (or failed mid-execution) when a later failure unwinds the process.
///   The default is a no-op, which is also the correct behavior for a step
///   that never completed executing anything durable.
/// - Long-running steps should call [`ProcessCtx::checkpoint`] between
///   network operations so pause and stop requests take effect.
#[async_trait]
pub trait ProcessStep<C: Send>: Send {
    /// Short stable name, used in logs and rollback reasons.
    fn name(&self) -> &str;

    async fn execute(&mut self, ctx: &mut ProcessCtx<C>)
        -> Result<StepOutcome<C>, ExecutionError>;

    async fn rollback(
        &mut self,
        _ctx: &mut ProcessCtx<C>,
        _reason: &RollbackReason,
    ) -> Result<(), RollbackError> {
        Ok(())
    }
}

/// A step plus its driver-tracked state
pub(crate) struct StepEntry<C: Send> {
    pub step: Box<dyn ProcessStep<C>>,
    pub state: StepState,
}

impl<C: Send> StepEntry<C> {
    pub fn new(step: Box<dyn ProcessStep<C>>) -> Self {
        Self {
            step,
            state: StepState::Ready,
        }
    }
}
