use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::member::TenantId;
use crate::domain::request::RequestKind;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PolicyId(pub String);

/// The abstract role an approver must hold at one rung of a chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApproverRole {
    Manager,
    HrManager,
    FinanceManager,
    Director,
    Employee,
}

impl ApproverRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manager => "manager",
            Self::HrManager => "hr_manager",
            Self::FinanceManager => "finance_manager",
            Self::Director => "director",
            Self::Employee => "employee",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "manager" => Some(Self::Manager),
            "hr_manager" => Some(Self::HrManager),
            "finance_manager" => Some(Self::FinanceManager),
            "director" => Some(Self::Director),
            "employee" => Some(Self::Employee),
            _ => None,
        }
    }

    /// EMPLOYEE is a requester role, never an approver role.
    pub fn can_approve(&self) -> bool {
        !matches!(self, Self::Employee)
    }
}

/// One rung of a policy's approval ladder.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalLevel {
    /// 1-based, contiguous within a policy.
    pub level_order: u32,
    pub required_role: ApproverRole,
}

/// A tenant-scoped rule set deciding which approval ladder applies to a
/// request of one kind.
///
/// Spend kinds are bounded by `min_amount`/`max_amount`, leave by
/// `min_days`/`max_days`. A missing lower bound means 0, a missing upper
/// bound means unbounded. Policies are never mutated by the workflow itself;
/// deactivation is the only retirement path.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalPolicy {
    pub id: PolicyId,
    pub tenant_id: TenantId,
    pub kind: RequestKind,
    pub name: String,
    pub is_active: bool,
    pub min_amount: Option<Decimal>,
    pub max_amount: Option<Decimal>,
    pub min_days: Option<Decimal>,
    pub max_days: Option<Decimal>,
    pub priority: i32,
    pub levels: Vec<ApprovalLevel>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ApprovalPolicy {
    /// Levels in processing order.
    pub fn ordered_levels(&self) -> Vec<ApprovalLevel> {
        let mut levels = self.levels.clone();
        levels.sort_by_key(|level| level.level_order);
        levels
    }
}
