use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;

use signoff_core::domain::member::{Member, MemberId, TenantId};
use signoff_core::domain::policy::{ApprovalLevel, ApprovalPolicy, ApproverRole, PolicyId};
use signoff_core::domain::request::RequestKind;

use crate::repositories::{
    MemberDirectory, PolicyRepository, RepositoryError, SqlMemberDirectory, SqlPolicyRepository,
};
use crate::DbPool;

/// Deterministic demo dataset for one tenant.
///
/// Every id and timestamp is fixed so repeated seeding is idempotent and test
/// assertions can reference rows by name.
pub struct SeedDataset;

pub const SEED_TENANT: &str = "acme";

const SEED_MEMBER_IDS: &[&str] =
    &["mem-dana", "mem-morgan", "mem-harper", "mem-frankie", "mem-eli", "mem-riley"];

const SEED_POLICY_IDS: &[&str] =
    &["pol-leave-short", "pol-leave-extended", "pol-purchase-standard", "pol-purchase-major", "pol-asset-default"];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SeedResult {
    pub tenant: TenantId,
    pub members_seeded: usize,
    pub policies_seeded: usize,
}

fn seed_time() -> DateTime<Utc> {
    // Fixed instant so seeded rows sort deterministically.
    Utc.with_ymd_and_hms(2025, 1, 6, 9, 0, 0).single().unwrap_or_else(Utc::now)
}

fn seed_member(
    id: &str,
    name: &str,
    manager_id: Option<&str>,
    is_admin: bool,
    is_owner: bool,
    has_hr_access: bool,
    has_finance_access: bool,
) -> Member {
    let now = seed_time();
    Member {
        id: MemberId(id.to_string()),
        tenant_id: TenantId(SEED_TENANT.to_string()),
        name: name.to_string(),
        email: format!("{}@{}.test", id.trim_start_matches("mem-"), SEED_TENANT),
        manager_id: manager_id.map(|value| MemberId(value.to_string())),
        is_admin,
        is_owner,
        has_hr_access,
        has_finance_access,
        active: true,
        deleted: false,
        created_at: now,
        updated_at: now,
    }
}

fn seed_members() -> Vec<Member> {
    vec![
        // Dana owns the workspace and is the admin every DIRECTOR fallback
        // chain resolves to.
        seed_member("mem-dana", "Dana Okafor", None, true, true, false, false),
        seed_member("mem-morgan", "Morgan Lee", Some("mem-dana"), false, false, false, false),
        seed_member("mem-harper", "Harper Quinn", Some("mem-dana"), false, false, true, false),
        seed_member("mem-frankie", "Frankie Rhodes", Some("mem-dana"), false, false, false, true),
        seed_member("mem-eli", "Eli Vance", Some("mem-morgan"), false, false, false, false),
        // Riley has no manager assigned; their leave chains exercise the
        // DIRECTOR fallback path.
        seed_member("mem-riley", "Riley Ngata", None, false, false, false, false),
    ]
}

fn seed_policy(
    id: &str,
    kind: RequestKind,
    name: &str,
    priority: i32,
    bounds: (Option<Decimal>, Option<Decimal>),
    roles: &[ApproverRole],
) -> ApprovalPolicy {
    let now = seed_time();
    let (min, max) = bounds;
    let (min_amount, max_amount, min_days, max_days) = if kind.thresholds_by_days() {
        (None, None, min, max)
    } else {
        (min, max, None, None)
    };

    ApprovalPolicy {
        id: PolicyId(id.to_string()),
        tenant_id: TenantId(SEED_TENANT.to_string()),
        kind,
        name: name.to_string(),
        is_active: true,
        min_amount,
        max_amount,
        min_days,
        max_days,
        priority,
        levels: roles
            .iter()
            .enumerate()
            .map(|(index, role)| ApprovalLevel {
                level_order: index as u32 + 1,
                required_role: *role,
            })
            .collect(),
        created_at: now,
        updated_at: now,
    }
}

fn seed_policies() -> Vec<ApprovalPolicy> {
    vec![
        seed_policy(
            "pol-leave-short",
            RequestKind::LeaveRequest,
            "Short leave",
            20,
            (Some(Decimal::ZERO), Some(Decimal::from(2))),
            &[ApproverRole::Manager],
        ),
        seed_policy(
            "pol-leave-extended",
            RequestKind::LeaveRequest,
            "Extended leave",
            10,
            (Some(Decimal::new(25, 1)), None),
            &[ApproverRole::Manager, ApproverRole::HrManager],
        ),
        seed_policy(
            "pol-purchase-standard",
            RequestKind::PurchaseRequest,
            "Standard purchase",
            20,
            (Some(Decimal::ZERO), Some(Decimal::new(499_999, 2))),
            &[ApproverRole::Manager],
        ),
        seed_policy(
            "pol-purchase-major",
            RequestKind::PurchaseRequest,
            "Major purchase",
            10,
            (Some(Decimal::new(500_000, 2)), None),
            &[ApproverRole::Manager, ApproverRole::FinanceManager, ApproverRole::Director],
        ),
        seed_policy(
            "pol-asset-default",
            RequestKind::AssetRequest,
            "Asset issuance",
            10,
            (None, None),
            &[ApproverRole::Manager, ApproverRole::FinanceManager],
        ),
    ]
}

impl SeedDataset {
    /// Insert (or refresh) the demo tenant's members and policies.
    pub async fn apply(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let directory = SqlMemberDirectory::new(pool.clone());
        let policies = SqlPolicyRepository::new(pool.clone());

        let members = seed_members();
        for member in &members {
            directory.save(member.clone()).await?;
        }

        let policy_rows = seed_policies();
        for policy in &policy_rows {
            policies.save(policy.clone()).await?;
        }

        Ok(SeedResult {
            tenant: TenantId(SEED_TENANT.to_string()),
            members_seeded: members.len(),
            policies_seeded: policy_rows.len(),
        })
    }

    pub fn member_ids() -> &'static [&'static str] {
        SEED_MEMBER_IDS
    }

    pub fn policy_ids() -> &'static [&'static str] {
        SEED_POLICY_IDS
    }
}
