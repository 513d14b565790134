use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::member::{MemberId, TenantId};
use crate::domain::policy::ApproverRole;
use crate::domain::request::RequestRef;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StepId(pub String);

impl std::fmt::Display for StepId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Approved,
    Rejected,
    Skipped,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Skipped => "skipped",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            "skipped" => Some(Self::Skipped),
            _ => None,
        }
    }

    /// Every status except PENDING is terminal.
    pub fn is_resolved(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// The action an approver takes on a pending step.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalDecision {
    Approve,
    Reject,
}

impl ApprovalDecision {
    pub fn resolved_status(&self) -> StepStatus {
        match self {
            Self::Approve => StepStatus::Approved,
            Self::Reject => StepStatus::Rejected,
        }
    }
}

/// The live unit of approval work: one row per (request, level).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalStep {
    pub id: StepId,
    pub tenant_id: TenantId,
    pub request: RequestRef,
    pub level_order: u32,
    pub required_role: ApproverRole,
    pub status: StepStatus,
    pub approver_id: Option<MemberId>,
    pub approver_name: Option<String>,
    pub approver_email: Option<String>,
    pub actioned_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Derived chain-level state; never stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainStatus {
    NotStarted,
    Pending,
    Approved,
    Rejected,
}

impl ChainStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

/// Rollup of one request's chain for list views and status badges.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainSummary {
    pub total_steps: u32,
    pub completed_steps: u32,
    /// The rejected step's order under REJECTED, the lowest pending order
    /// under PENDING, absent otherwise.
    pub current_step: Option<u32>,
    pub status: ChainStatus,
}

#[cfg(test)]
mod tests {
    use super::{ApprovalDecision, StepStatus};

    #[test]
    fn step_status_round_trips_from_storage_encoding() {
        let cases =
            [StepStatus::Pending, StepStatus::Approved, StepStatus::Rejected, StepStatus::Skipped];

        for status in cases {
            let decoded = StepStatus::parse(status.as_str());
            assert_eq!(decoded, Some(status));
        }
    }

    #[test]
    fn only_pending_is_unresolved() {
        assert!(!StepStatus::Pending.is_resolved());
        assert!(StepStatus::Approved.is_resolved());
        assert!(StepStatus::Rejected.is_resolved());
        assert!(StepStatus::Skipped.is_resolved());
    }

    #[test]
    fn decision_maps_to_terminal_status() {
        assert_eq!(ApprovalDecision::Approve.resolved_status(), StepStatus::Approved);
        assert_eq!(ApprovalDecision::Reject.resolved_status(), StepStatus::Rejected);
    }
}
