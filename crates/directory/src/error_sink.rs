//! Most recent reload outcome, for health reporting.
//!
//! Every reload attempt overwrites the sink: success clears it, failure sets
//! it. Nothing older than the last attempt is kept.

use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::LoadError;

/// A failed reload attempt.
#[derive(Debug, Clone, Serialize)]
pub struct ReloadFailure {
    /// Sequence number of the attempt (1 = first reload after startup).
    pub attempt: u64,
    pub at: DateTime<Utc>,
    /// Failure category, see [`LoadError::kind`].
    pub kind: &'static str,
    pub message: String,
    #[serde(skip)]
    pub error: Arc<LoadError>,
}

#[derive(Debug, Default)]
struct SinkState {
    attempts: u64,
    last_error: Option<ReloadFailure>,
}

/// Shared holder of the last reload failure.
#[derive(Debug, Default)]
pub struct ErrorSink {
    state: RwLock<SinkState>,
}

impl ErrorSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve the next attempt number.
    pub fn begin_attempt(&self) -> u64 {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.attempts += 1;
        state.attempts
    }

    /// Clear the sink if `attempt` is still the latest attempt.
    pub fn record_success(&self, attempt: u64) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if attempt >= state.attempts {
            state.last_error = None;
        }
    }

    /// Store `error` for `attempt` unless a later attempt has already reported.
    pub fn record_failure(&self, attempt: u64, error: LoadError) {
        let failure = ReloadFailure {
            attempt,
            at: Utc::now(),
            kind: error.kind(),
            message: error.to_string(),
            error: Arc::new(error),
        };
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if attempt >= state.attempts {
            state.last_error = Some(failure);
        }
    }

    pub fn last_error(&self) -> Option<ReloadFailure> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .last_error
            .clone()
    }

    pub fn is_healthy(&self) -> bool {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .last_error
            .is_none()
    }

    /// Reload attempts started so far.
    pub fn attempts(&self) -> u64 {
        self.state.read().unwrap_or_else(PoisonError::into_inner).attempts
    }
}
