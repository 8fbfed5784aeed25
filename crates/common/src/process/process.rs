use std::sync::Arc;

use tokio::sync::watch;

use crate::crypto::PublicKey;
use crate::notify::NotificationDispatcher;

use super::context::{ControlReceiver, ControlRequest, ProcessCtx};
use super::error::{ExecutionError, RollbackReason};
use super::listener::{ListenerRegistry, ProcessListener};
use super::state::{ProcessState, StepState, Terminal};
use super::step::{ProcessStep, StepEntry, StepOutcome};

/// Errors from the control surface of a running process
#[derive(Debug, Clone, thiserror::Error)]
pub enum ControlError {
    /// The requested transition is not valid from the current state.
    #[error("invalid process state: {0:?}")]
    InvalidState(ProcessState),
    /// The driver task is gone without reporting a terminal state.
    #[error("process driver detached")]
    Detached,
}

/// An ordered, composable container of steps
///
/// Built by a caller, loaded with steps, then consumed by [`Process::start`]: the
/// driver task executes steps strictly in sequence, awaiting each to
/// completion, and on any failure unwinds every executed step in reverse
/// order. The process owns its steps exclusively; steps receive the context
/// and control plane by reference from the driver and hold no reference
/// back.
pub struct Process<C: Send> {
    name: String,
    steps: Vec<StepEntry<C>>,
    context: C,
    registry: ListenerRegistry,
    notifier: Option<(NotificationDispatcher, PublicKey)>,
}

impl<C: Send + 'static> Process<C> {
    pub fn new(name: impl Into<String>, context: C) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
            context,
            registry: ListenerRegistry::default(),
            notifier: None,
        }
    }

    /// Attach the side channel steps use to notify the user's other clients.
    pub fn with_notifier(mut self, dispatcher: NotificationDispatcher, sender: PublicKey) -> Self {
        self.notifier = Some((dispatcher, sender));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add_step(&mut self, step: impl ProcessStep<C> + 'static) {
        self.steps.push(StepEntry::new(Box::new(step)));
    }

    pub fn add_listener(&self, listener: Box<dyn ProcessListener>) {
        self.registry.lock().add(listener);
    }

    /// Spawn the driver onto the runtime and return the control handle.
    ///
    /// A process with zero steps goes straight to SUCCEEDED.
    pub fn start(self) -> ProcessHandle {
        let (control_tx, control_rx) = watch::channel(ControlRequest::default());
        let (state_tx, state_rx) = watch::channel(ProcessState::Ready);
        let state_tx = Arc::new(state_tx);
        let (terminal_tx, terminal_rx) = watch::channel(None);

        let registry = self.registry.clone();
        let driver_registry = registry.clone();
        let driver_state = state_tx.clone();
        let name = self.name.clone();

        let ctx = ProcessCtx::new(
            self.context,
            ControlReceiver {
                rx: control_rx,
                state: state_tx,
            },
            self.notifier,
        );
        let steps = self.steps;

        tokio::spawn(async move {
            let terminal = run(&name, steps, ctx, driver_state.as_ref()).await;
            driver_registry.lock().complete(terminal.clone());
            let _ = terminal_tx.send(Some(terminal));
        });

        ProcessHandle {
            name: self.name,
            control: Arc::new(control_tx),
            state: state_rx,
            terminal: terminal_rx,
            registry,
        }
    }
}

/// Control surface of a started process
///
/// Cheap to clone; every clone addresses the same driver.
#[derive(Clone)]
pub struct ProcessHandle {
    name: String,
    control: Arc<watch::Sender<ControlRequest>>,
    state: watch::Receiver<ProcessState>,
    terminal: watch::Receiver<Option<Terminal>>,
    registry: ListenerRegistry,
}

impl ProcessHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ProcessState {
        *self.state.borrow()
    }

    /// Suspend execution at the next checkpoint.
    ///
    /// Valid only while the process is running or already paused; step-local
    /// state and completed network effects are retained.
    pub fn pause(&self) -> Result<(), ControlError> {
        match self.state() {
            ProcessState::Running | ProcessState::Paused => {
                self.control.send_modify(|request| request.paused = true);
                Ok(())
            }
            state => Err(ControlError::InvalidState(state)),
        }
    }

    /// Resume a paused process.
    pub fn resume(&self) -> Result<(), ControlError> {
        match self.state() {
            ProcessState::Running | ProcessState::Paused => {
                self.control.send_modify(|request| request.paused = false);
                Ok(())
            }
            state => Err(ControlError::InvalidState(state)),
        }
    }

    /// Stop the process before natural completion.
    ///
    /// Modeled as an induced failure: the driver takes the normal rollback
    /// path. Already-issued network operations are allowed to complete but
    /// their results are discarded.
    pub fn stop(&self, reason: impl Into<String>) -> Result<(), ControlError> {
        let state = self.state();
        if state.is_terminal() {
            return Err(ControlError::InvalidState(state));
        }
        let reason = reason.into();
        self.control.send_modify(|request| {
            request.stop = Some(reason);
            // A paused process must wake to observe the stop
            request.paused = false;
        });
        Ok(())
    }

    /// Register a listener; fires immediately if already terminated.
    pub fn add_listener(&self, listener: Box<dyn ProcessListener>) {
        self.registry.lock().add(listener);
    }

    /// Await the terminal state without polling.
    pub async fn join(&self) -> Result<Terminal, ControlError> {
        let mut terminal = self.terminal.clone();
        let observed = terminal
            .wait_for(|t| t.is_some())
            .await
            .map_err(|_| ControlError::Detached)?;
        observed.clone().ok_or(ControlError::Detached)
    }
}

async fn run<C: Send>(
    name: &str,
    mut steps: Vec<StepEntry<C>>,
    mut ctx: ProcessCtx<C>,
    state: &watch::Sender<ProcessState>,
) -> Terminal {
    let _ = state.send(ProcessState::Running);
    tracing::info!("process '{}' started with {} steps", name, steps.len());

    let mut executed: Vec<usize> = Vec::new();
    let mut failed_index: Option<usize> = None;
    let mut reason: Option<RollbackReason> = None;

    let mut cursor = 0;
    while cursor < steps.len() {
        if let Err(error) = ctx.checkpoint().await {
            // Stopped before this step ran; nothing of it to roll back
            reason = Some(RollbackReason::new(steps[cursor].step.name(), &error));
            break;
        }

        let entry = &mut steps[cursor];
        entry.state = StepState::Executing;
        tracing::debug!("process '{}' executing step '{}'", name, entry.step.name());

        match entry.step.execute(&mut ctx).await {
            Ok(StepOutcome::Continue) => {
                entry.state = StepState::Succeeded;
                executed.push(cursor);
                cursor += 1;
            }
            Ok(StepOutcome::Finish) => {
                entry.state = StepState::Succeeded;
                executed.push(cursor);
                tracing::debug!(
                    "step '{}' finished process '{}' early",
                    entry.step.name(),
                    name
                );
                break;
            }
            Ok(StepOutcome::Push(new_steps)) => {
                entry.state = StepState::Succeeded;
                executed.push(cursor);
                let at = cursor + 1;
                for (offset, step) in new_steps.into_iter().enumerate() {
                    steps.insert(at + offset, StepEntry::new(step));
                }
                cursor += 1;
            }
            Err(error) => {
                entry.state = StepState::Failed;
                tracing::warn!(
                    "process '{}' step '{}' failed: {}",
                    name,
                    entry.step.name(),
                    error
                );
                reason = Some(RollbackReason::new(entry.step.name(), &error));
                failed_index = Some(cursor);
                break;
            }
        }
    }

    let reason = match reason {
        None => {
            let _ = state.send(ProcessState::Succeeded);
            tracing::info!("process '{}' succeeded", name);
            return Terminal::Succeeded;
        }
        Some(reason) => reason,
    };

    // Unwind: the failed step first (it may have applied partial durable
    // effects), then every succeeded step in strict reverse order
    let _ = state.send(ProcessState::RollingBack);
    ctx.set_rolling_back();
    tracing::info!("process '{}' rolling back: {}", name, reason);

    let mut unwind: Vec<usize> = Vec::with_capacity(executed.len() + 1);
    unwind.extend(failed_index);
    unwind.extend(executed.iter().rev());

    for index in unwind {
        let entry = &mut steps[index];
        entry.state = StepState::RollingBack;
        match entry.step.rollback(&mut ctx, &reason).await {
            Ok(()) => {
                entry.state = StepState::RolledBack;
            }
            Err(error) => {
                entry.state = StepState::Failed;
                tracing::error!(
                    "process '{}' could not roll back step '{}': {}",
                    name,
                    entry.step.name(),
                    error
                );
                let _ = state.send(ProcessState::Failed);
                return Terminal::Failed {
                    reason,
                    rollback: error.to_string(),
                };
            }
        }
    }

    let _ = state.send(ProcessState::RolledBack);
    tracing::info!("process '{}' rolled back", name);
    Terminal::RolledBack(reason)
}
