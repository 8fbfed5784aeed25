use std::sync::Arc;

use parking_lot::Mutex;

use super::error::RollbackReason;
use super::state::Terminal;

/// Observer of a process's terminal state
///
/// Exactly one callback fires, exactly once, when the process terminates.
/// A listener attached after termination is invoked immediately with the
/// already-reached terminal state - there are no missed notifications.
pub trait ProcessListener: Send + Sync {
    fn on_succeeded(&self) {}
    fn on_failed(&self, _reason: &RollbackReason) {}
    fn on_rolled_back(&self, _reason: &RollbackReason) {}
}

#[derive(Default)]
pub(crate) struct ListenerSet {
    listeners: Vec<Box<dyn ProcessListener>>,
    terminal: Option<Terminal>,
}

pub(crate) type ListenerRegistry = Arc<Mutex<ListenerSet>>;

impl ListenerSet {
    /// Register a listener; fires immediately if the process already
    /// terminated.
    pub fn add(&mut self, listener: Box<dyn ProcessListener>) {
        match &self.terminal {
            Some(terminal) => fire(listener.as_ref(), terminal),
            None => self.listeners.push(listener),
        }
    }

    /// Record the terminal state and notify every registered listener.
    ///
    /// The `Option` guard makes double-completion impossible.
    pub fn complete(&mut self, terminal: Terminal) {
        if self.terminal.is_some() {
            tracing::error!("process attempted to terminate twice; ignoring");
            return;
        }
        for listener in &self.listeners {
            fire(listener.as_ref(), &terminal);
        }
        self.terminal = Some(terminal);
    }
}

fn fire(listener: &dyn ProcessListener, terminal: &Terminal) {
    match terminal {
        Terminal::Succeeded => listener.on_succeeded(),
        Terminal::RolledBack(reason) => listener.on_rolled_back(reason),
        Terminal::Failed { reason, .. } => listener.on_failed(reason),
    }
}
