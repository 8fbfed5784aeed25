use super::error::RollbackReason;

/// Lifecycle of a process
///
/// ```text
/// Ready -> Running -> Succeeded
///            |  ^
///            v  |        (pause/resume)
///          Paused
///            |
///            v
/// Running -> RollingBack -> RolledBack
///                 |
///                 v
///               Failed        (a rollback itself errored; unrecoverable)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Ready,
    Running,
    Paused,
    RollingBack,
    Succeeded,
    RolledBack,
    Failed,
}

impl ProcessState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::RolledBack | Self::Failed)
    }
}

/// Lifecycle of one step, tracked by the driver
///
/// Pausing is a process-level affair: a step suspends only at explicit
/// checkpoints between network operations, during which the process reports
/// [`ProcessState::Paused`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepState {
    Ready,
    Executing,
    Succeeded,
    Failed,
    RollingBack,
    RolledBack,
}

/// The terminal outcome of a process, reported to listeners exactly once
#[derive(Debug, Clone)]
pub enum Terminal {
    /// Every step succeeded.
    Succeeded,
    /// A step failed and every executed step was rolled back in reverse.
    RolledBack(RollbackReason),
    /// A step failed and a rollback step itself errored; effects may linger.
    Failed {
        reason: RollbackReason,
        rollback: String,
    },
}

impl Terminal {
    pub fn is_succeeded(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(!ProcessState::Ready.is_terminal());
        assert!(!ProcessState::Running.is_terminal());
        assert!(!ProcessState::Paused.is_terminal());
        assert!(!ProcessState::RollingBack.is_terminal());
        assert!(ProcessState::Succeeded.is_terminal());
        assert!(ProcessState::RolledBack.is_terminal());
        assert!(ProcessState::Failed.is_terminal());
    }
}
