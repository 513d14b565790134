use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemberId(pub String);

impl std::fmt::Display for MemberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A workspace member as seen by the approval engine.
///
/// The member directory is owned by the surrounding back office; this type
/// carries only the fields the engine needs for eligibility and authorization
/// checks.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: MemberId,
    pub tenant_id: TenantId,
    pub name: String,
    pub email: String,
    pub manager_id: Option<MemberId>,
    pub is_admin: bool,
    pub is_owner: bool,
    pub has_hr_access: bool,
    pub has_finance_access: bool,
    pub active: bool,
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Member {
    /// Whether this member may currently act in any approval capacity.
    pub fn can_act(&self) -> bool {
        self.active && !self.deleted
    }
}

/// Contact details for an approver, used to address notifications.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproverContact {
    pub id: MemberId,
    pub name: String,
    pub email: String,
}

impl From<&Member> for ApproverContact {
    fn from(member: &Member) -> Self {
        Self { id: member.id.clone(), name: member.name.clone(), email: member.email.clone() }
    }
}
