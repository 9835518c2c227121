//! Delivery assignment states and the agent's estimate.

use serde::{Deserialize, Serialize};

/// ```text
/// Assigned ──► InProgress ──► Completed
///     │             │
///     └─────────────┴──► Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssignmentState {
    #[default]
    Assigned,
    InProgress,
    Completed,
    Cancelled,
}

impl AssignmentState {
    pub fn can_transition_to(&self, target: AssignmentState) -> bool {
        use AssignmentState::*;
        matches!(
            (self, target),
            (Assigned, InProgress) | (InProgress, Completed) | (Assigned | InProgress, Cancelled)
        )
    }

    pub fn is_active(&self) -> bool {
        matches!(self, AssignmentState::Assigned | AssignmentState::InProgress)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AssignmentState::Assigned => "ASSIGNED",
            AssignmentState::InProgress => "IN_PROGRESS",
            AssignmentState::Completed => "COMPLETED",
            AssignmentState::Cancelled => "CANCELLED",
        }
    }
}

impl std::fmt::Display for AssignmentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AssignmentState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ASSIGNED" => Ok(AssignmentState::Assigned),
            "IN_PROGRESS" => Ok(AssignmentState::InProgress),
            "COMPLETED" => Ok(AssignmentState::Completed),
            "CANCELLED" => Ok(AssignmentState::Cancelled),
            other => Err(format!("unknown assignment state: {other}")),
        }
    }
}

/// Route estimate supplied by logistics when the agent is assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DeliveryEstimate {
    pub distance_meters: Option<u32>,
    pub eta_minutes: Option<u32>,
}

impl DeliveryEstimate {
    pub fn new(distance_meters: u32, eta_minutes: u32) -> Self {
        Self {
            distance_meters: Some(distance_meters),
            eta_minutes: Some(eta_minutes),
        }
    }
}
