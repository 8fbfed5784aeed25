use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use tokio::sync::watch;

use crate::crypto::PublicKey;
use crate::notify::{ClientEvent, Notification, NotificationDispatcher};

use super::error::ExecutionError;
use super::state::ProcessState;

/// The caller's standing instructions to a running process
#[derive(Debug, Clone, Default)]
pub(crate) struct ControlRequest {
    pub paused: bool,
    pub stop: Option<String>,
}

/// The driver-side end of the control channel
pub(crate) struct ControlReceiver {
    pub rx: watch::Receiver<ControlRequest>,
    pub state: Arc<watch::Sender<ProcessState>>,
}

/// Typed scratch space plus control plane, handed to every step
///
/// The `C` payload is the explicit contract between the steps of one
/// process - one step populates a slot, a later step consumes it. The
/// wrapper adds the two services every step gets for free: checkpointing
/// (pause/stop) and the fire-and-forget notification side channel.
pub struct ProcessCtx<C> {
    data: C,
    control: Option<ControlReceiver>,
    notifier: Option<(NotificationDispatcher, PublicKey)>,
    rolling_back: bool,
}

impl<C> Deref for ProcessCtx<C> {
    type Target = C;
    fn deref(&self) -> &Self::Target {
        &self.data
    }
}

impl<C> DerefMut for ProcessCtx<C> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.data
    }
}

impl<C> ProcessCtx<C> {
    pub(crate) fn new(
        data: C,
        control: ControlReceiver,
        notifier: Option<(NotificationDispatcher, PublicKey)>,
    ) -> Self {
        Self {
            data,
            control: Some(control),
            notifier,
            rolling_back: false,
        }
    }

    /// A context with no control plane attached, for driving a step outside
    /// a process (tests, mostly). Checkpoints always pass.
    pub fn detached(data: C) -> Self {
        Self {
            data,
            control: None,
            notifier: None,
            rolling_back: false,
        }
    }

    pub(crate) fn set_rolling_back(&mut self) {
        self.rolling_back = true;
    }

    /// Yield to the caller's pause/stop requests.
    ///
    /// Called by the driver before every step and by long steps between
    /// network operations - never inside one. While paused, this waits on
    /// the control channel (no polling) and reports the process as paused.
    /// A stop request surfaces as [`ExecutionError::Stopped`], the induced
    /// failure that takes the normal rollback path.
    pub async fn checkpoint(&mut self) -> Result<(), ExecutionError> {
        // Rollback is not pausable or stoppable; it either completes or
        // fails on its own terms
        if self.rolling_back {
            return Ok(());
        }
        let control = match self.control.as_mut() {
            Some(control) => control,
            None => return Ok(()),
        };

        loop {
            let (paused, stop) = {
                let request = control.rx.borrow_and_update();
                (request.paused, request.stop.clone())
            };
            if let Some(reason) = stop {
                return Err(ExecutionError::Stopped(reason));
            }
            if !paused {
                return Ok(());
            }

            let _ = control.state.send(ProcessState::Paused);
            if control.rx.changed().await.is_err() {
                // Control handle is gone while we are paused; nobody can
                // ever resume us
                return Err(ExecutionError::Stopped(
                    "control handle dropped while paused".to_string(),
                ));
            }
            let _ = control.state.send(ProcessState::Running);
        }
    }

    /// Push a best-effort notification to the user's other clients.
    ///
    /// Fire-and-forget: failure to notify never fails the process.
    pub fn notify_other_clients(&self, event: ClientEvent) {
        match &self.notifier {
            Some((dispatcher, sender)) => dispatcher.dispatch(Notification {
                sender: *sender,
                event,
            }),
            None => {
                tracing::debug!("no notification channel configured, dropping event");
            }
        }
    }
}
