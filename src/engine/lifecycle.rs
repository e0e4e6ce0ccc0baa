// Per-version worker state machine.

use std::fmt;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Installing,
    /// Installed, waiting to take over.
    Waiting,
    Activating,
    Active,
    /// A newer version became active; this version's store may still exist.
    Superseded,
    /// Terminal. Nothing follows. An active-then-superseded worker gets here
    /// only once its store is deleted. A worker that never became active
    /// (abandoned install, replaced while waiting) gets here directly; it
    /// served no fetches, and whatever store it left is reaped by the next
    /// activation like any other stale store.
    Terminated,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("illegal worker transition {from} -> {to}")]
    InvalidTransition { from: WorkerState, to: WorkerState },
}

impl WorkerState {
    pub fn can_advance_to(self, next: WorkerState) -> bool {
        use WorkerState::*;
        matches!(
            (self, next),
            (Installing, Waiting)
                | (Waiting, Activating)
                | (Activating, Active)
                | (Active, Superseded)
                | (Superseded, Terminated)
                // Never active: the store, if any, is not checked here.
                | (Installing, Terminated)
                | (Waiting, Terminated)
        )
    }

    pub fn advance(self, next: WorkerState) -> Result<WorkerState, LifecycleError> {
        if self.can_advance_to(next) {
            Ok(next)
        } else {
            Err(LifecycleError::InvalidTransition {
                from: self,
                to: next,
            })
        }
    }

    pub fn is_terminal(self) -> bool {
        self == WorkerState::Terminated
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkerState::Installing => "installing",
            WorkerState::Waiting => "waiting",
            WorkerState::Activating => "activating",
            WorkerState::Active => "active",
            WorkerState::Superseded => "superseded",
            WorkerState::Terminated => "terminated",
        };
        f.write_str(name)
    }
}
