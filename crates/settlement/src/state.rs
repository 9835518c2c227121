//! Reconciliation task lifecycle.

use serde::{Deserialize, Serialize};

/// The state of a reconciliation task.
///
/// State transitions:
/// ```text
/// Pending ──┬──► Resolved
///           └──► Abandoned
/// ```
/// A resolved or abandoned task goes back to `Pending` when the same
/// action is enqueued again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    /// Waiting for the next reconciliation run.
    #[default]
    Pending,

    /// The action went through.
    Resolved,

    /// The action failed in a way retrying cannot fix.
    Abandoned,
}

impl TaskState {
    pub fn is_pending(&self) -> bool {
        matches!(self, TaskState::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Pending => "PENDING",
            TaskState::Resolved => "RESOLVED",
            TaskState::Abandoned => "ABANDONED",
        }
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(TaskState::Pending),
            "RESOLVED" => Ok(TaskState::Resolved),
            "ABANDONED" => Ok(TaskState::Abandoned),
            other => Err(format!("unknown task state: {other}")),
        }
    }
}
