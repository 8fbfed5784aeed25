//! Shared scripted steps for process integration tests
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use common::process::{
    ExecutionError, ProcessCtx, ProcessStep, RollbackError, RollbackReason, StepOutcome,
};

/// Shared execute/rollback log, asserted on for ordering properties
pub type StepLog = Arc<Mutex<Vec<String>>>;

pub fn step_log() -> StepLog {
    Arc::new(Mutex::new(Vec::new()))
}

/// What a scripted step does when executed
pub enum Plan {
    Continue,
    Finish,
    Fail,
    Push(Vec<ScriptedStep>),
}

/// A step that records its transitions and follows a scripted plan
pub struct ScriptedStep {
    name: String,
    log: StepLog,
    plan: Plan,
    fail_rollback: bool,
}

impl ScriptedStep {
    pub fn new(name: &str, log: &StepLog) -> Self {
        Self {
            name: name.to_string(),
            log: log.clone(),
            plan: Plan::Continue,
            fail_rollback: false,
        }
    }

    pub fn with_plan(mut self, plan: Plan) -> Self {
        self.plan = plan;
        self
    }

    pub fn failing(name: &str, log: &StepLog) -> Self {
        Self::new(name, log).with_plan(Plan::Fail)
    }

    pub fn with_failing_rollback(mut self) -> Self {
        self.fail_rollback = true;
        self
    }
}

#[async_trait]
impl ProcessStep<()> for ScriptedStep {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(
        &mut self,
        _ctx: &mut ProcessCtx<()>,
    ) -> Result<StepOutcome<()>, ExecutionError> {
        self.log.lock().push(format!("execute:{}", self.name));
        match std::mem::replace(&mut self.plan, Plan::Continue) {
            Plan::Continue => Ok(StepOutcome::Continue),
            Plan::Finish => Ok(StepOutcome::Finish),
            Plan::Fail => Err(ExecutionError::Invalid(format!(
                "{} scripted failure",
                self.name
            ))),
            Plan::Push(steps) => Ok(StepOutcome::Push(
                steps
                    .into_iter()
                    .map(|step| Box::new(step) as Box<dyn ProcessStep<()>>)
                    .collect(),
            )),
        }
    }

    async fn rollback(
        &mut self,
        _ctx: &mut ProcessCtx<()>,
        _reason: &RollbackReason,
    ) -> Result<(), RollbackError> {
        self.log.lock().push(format!("rollback:{}", self.name));
        if self.fail_rollback {
            return Err(RollbackError::new(&self.name, "scripted rollback failure"));
        }
        Ok(())
    }
}

/// A step that loops over many short waits, checkpointing between them,
/// so pause and stop requests have somewhere to land
pub struct TickStep {
    name: String,
    log: StepLog,
    ticks: u32,
    delay: Duration,
}

impl TickStep {
    pub fn new(name: &str, log: &StepLog, ticks: u32, delay: Duration) -> Self {
        Self {
            name: name.to_string(),
            log: log.clone(),
            ticks,
            delay,
        }
    }
}

#[async_trait]
impl ProcessStep<()> for TickStep {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(
        &mut self,
        ctx: &mut ProcessCtx<()>,
    ) -> Result<StepOutcome<()>, ExecutionError> {
        self.log.lock().push(format!("execute:{}", self.name));
        for _ in 0..self.ticks {
            ctx.checkpoint().await?;
            tokio::time::sleep(self.delay).await;
        }
        Ok(StepOutcome::Continue)
    }

    async fn rollback(
        &mut self,
        _ctx: &mut ProcessCtx<()>,
        _reason: &RollbackReason,
    ) -> Result<(), RollbackError> {
        self.log.lock().push(format!("rollback:{}", self.name));
        Ok(())
    }
}
