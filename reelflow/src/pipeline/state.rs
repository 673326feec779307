//! Run lifecycle states.

use std::fmt;

/// Where a run is in its lifecycle.
///
/// `Ready` and `Error` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PipelineState {
    /// `start` has not been called.
    #[default]
    NotStarted,
    /// Stage `i` is executing.
    Running(usize),
    /// Every stage completed.
    Ready,
    /// The run failed.
    Error,
}

impl PipelineState {
    /// Index of the error sentinel.
    pub const ERROR_INDEX: i64 = -2;
    /// Index of the not-started sentinel.
    pub const NOT_STARTED_INDEX: i64 = -1;

    /// Returns the signed stage index: -1 not started, `i` running,
    /// `steps_max` ready, -2 error.
    #[must_use]
    pub fn index(self, steps_max: usize) -> i64 {
        match self {
            Self::NotStarted => Self::NOT_STARTED_INDEX,
            Self::Running(index) => to_i64(index),
            Self::Ready => to_i64(steps_max),
            Self::Error => Self::ERROR_INDEX,
        }
    }

    /// Returns true for `Ready` and `Error`.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Ready | Self::Error)
    }
}

fn to_i64(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStarted => write!(f, "not_started"),
            Self::Running(index) => write!(f, "running({index})"),
            Self::Ready => write!(f, "ready"),
            Self::Error => write!(f, "error"),
        }
    }
}
