//! Session lifecycle
//!
//! ```text
//! Idle -> Preparing -> Scheduled -> Recording -> Stopping -> Idle
//!           \______________\____________\___________\-> Error
//! ```

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    /// Waiting for sync roles, estimating offsets, scheduling
    Preparing,
    /// Every device holds a committed trigger schedule
    Scheduled,
    Recording,
    Stopping,
    Error,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Preparing => "preparing",
            Self::Scheduled => "scheduled",
            Self::Recording => "recording",
            Self::Stopping => "stopping",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

/// State shared between the session, its handle and the monitor thread
#[derive(Debug, Clone)]
pub(crate) struct StateCell(Arc<Mutex<SessionState>>);

impl StateCell {
    pub(crate) fn new() -> Self {
        Self(Arc::new(Mutex::new(SessionState::Idle)))
    }

    pub(crate) fn get(&self) -> SessionState {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn set(&self, next: SessionState) {
        let mut state = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        if *state != next {
            debug!(from = %*state, to = %next, "session state");
            *state = next;
        }
    }

    /// Move to `next` unless the session already failed
    pub(crate) fn advance(&self, next: SessionState) {
        let mut state = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        if *state != SessionState::Error && *state != next {
            debug!(from = %*state, to = %next, "session state");
            *state = next;
        }
    }
}
