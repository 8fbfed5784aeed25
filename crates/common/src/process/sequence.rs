use async_trait::async_trait;

use super::context::ProcessCtx;
use super::error::{ExecutionError, RollbackError, RollbackReason};
use super::state::StepState;
use super::step::{ProcessStep, StepEntry, StepOutcome};

/// An ordered group of steps acting as one composite step
///
/// A sequence runs its children to completion before control returns to the
/// enclosing process, and rollback crosses the boundary transparently: the
/// parent issues a single rollback on the sequence, which fans it out in
/// reverse over its executed children - including a failed child that only
/// partially executed.
///
/// A child returning [`StepOutcome::Finish`] finishes this sequence, not the
/// enclosing process.
pub struct Sequence<C: Send> {
    name: String,
    steps: Vec<StepEntry<C>>,
    executed: Vec<usize>,
    failed: Option<usize>,
    cursor: usize,
}

impl<C: Send> Sequence<C> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
            executed: Vec::new(),
            failed: None,
            cursor: 0,
        }
    }

    pub fn add_step(&mut self, step: impl ProcessStep<C> + 'static) {
        self.steps.push(StepEntry::new(Box::new(step)));
    }

    pub fn with_step(mut self, step: impl ProcessStep<C> + 'static) -> Self {
        self.add_step(step);
        self
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

#[async_trait]
impl<C: Send> ProcessStep<C> for Sequence<C> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(
        &mut self,
        ctx: &mut ProcessCtx<C>,
    ) -> Result<StepOutcome<C>, ExecutionError> {
        while self.cursor < self.steps.len() {
            ctx.checkpoint().await?;

            let entry = &mut self.steps[self.cursor];
            entry.state = StepState::Executing;
            tracing::debug!(
                "sequence '{}' executing step '{}'",
                self.name,
                entry.step.name()
            );

            match entry.step.execute(ctx).await {
                Ok(StepOutcome::Continue) => {
                    entry.state = StepState::Succeeded;
                    self.executed.push(self.cursor);
                    self.cursor += 1;
                }
                Ok(StepOutcome::Finish) => {
                    entry.state = StepState::Succeeded;
                    self.executed.push(self.cursor);
                    self.cursor = self.steps.len();
                }
                Ok(StepOutcome::Push(new_steps)) => {
                    entry.state = StepState::Succeeded;
                    self.executed.push(self.cursor);
                    let at = self.cursor + 1;
                    for (offset, step) in new_steps.into_iter().enumerate() {
                        self.steps.insert(at + offset, StepEntry::new(step));
                    }
                    self.cursor += 1;
                }
                Err(error) => {
                    entry.state = StepState::Failed;
                    self.failed = Some(self.cursor);
                    return Err(error);
                }
            }
        }

        Ok(StepOutcome::Continue)
    }

    async fn rollback(
        &mut self,
        ctx: &mut ProcessCtx<C>,
        reason: &RollbackReason,
    ) -> Result<(), RollbackError> {
        if let Some(index) = self.failed.take() {
            let entry = &mut self.steps[index];
            entry.state = StepState::RollingBack;
            entry.step.rollback(ctx, reason).await?;
            entry.state = StepState::RolledBack;
        }

        while let Some(index) = self.executed.pop() {
            let entry = &mut self.steps[index];
            entry.state = StepState::RollingBack;
            entry.step.rollback(ctx, reason).await?;
            entry.state = StepState::RolledBack;
        }

        Ok(())
    }
}
