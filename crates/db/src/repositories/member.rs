use sqlx::{sqlite::SqliteRow, Row};

use signoff_core::domain::member::{ApproverContact, Member, MemberId, TenantId};
use signoff_core::domain::policy::ApproverRole;

use super::policy::parse_datetime;
use super::{MemberDirectory, RepositoryError};
use crate::DbPool;

pub struct SqlMemberDirectory {
    pool: DbPool,
}

impl SqlMemberDirectory {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn member_from_row(row: &SqliteRow) -> Result<Member, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let tenant_id: String =
        row.try_get("tenant_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let name: String = row.try_get("name").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let email: String = row.try_get("email").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let manager_id: Option<String> =
        row.try_get("manager_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let is_admin: i64 =
        row.try_get("is_admin").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let is_owner: i64 =
        row.try_get("is_owner").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let has_hr_access: i64 =
        row.try_get("has_hr_access").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let has_finance_access: i64 =
        row.try_get("has_finance_access").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let active: i64 = row.try_get("active").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let deleted: i64 =
        row.try_get("deleted").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let updated_at: String =
        row.try_get("updated_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(Member {
        id: MemberId(id),
        tenant_id: TenantId(tenant_id),
        name,
        email,
        manager_id: manager_id.map(MemberId),
        is_admin: is_admin != 0,
        is_owner: is_owner != 0,
        has_hr_access: has_hr_access != 0,
        has_finance_access: has_finance_access != 0,
        active: active != 0,
        deleted: deleted != 0,
        created_at: parse_datetime(&created_at)?,
        updated_at: parse_datetime(&updated_at)?,
    })
}

fn contact_from_row(row: &SqliteRow) -> Result<ApproverContact, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let name: String = row.try_get("name").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let email: String = row.try_get("email").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(ApproverContact { id: MemberId(id), name, email })
}

/// SQL predicate selecting members holding `role`, aliased as `m`.
///
/// MANAGER is relationship-bound rather than flag-bound and is handled by a
/// dedicated join in the calling queries; EMPLOYEE is never an approver. Both
/// fall through to a predicate that matches nothing.
fn role_predicate(role: ApproverRole) -> &'static str {
    match role {
        ApproverRole::HrManager => "m.has_hr_access = 1",
        ApproverRole::FinanceManager => "m.has_finance_access = 1",
        ApproverRole::Director => "(m.is_admin = 1 OR m.is_owner = 1)",
        ApproverRole::Manager | ApproverRole::Employee => "1 = 0",
    }
}

#[async_trait::async_trait]
impl MemberDirectory for SqlMemberDirectory {
    async fn find_member(&self, id: &MemberId) -> Result<Option<Member>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, tenant_id, name, email, manager_id, is_admin, is_owner,
                    has_hr_access, has_finance_access, active, deleted, created_at, updated_at
             FROM member WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(member_from_row).transpose()
    }

    async fn save(&self, member: Member) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO member (id, tenant_id, name, email, manager_id, is_admin, is_owner,
                                 has_hr_access, has_finance_access, active, deleted,
                                 created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 email = excluded.email,
                 manager_id = excluded.manager_id,
                 is_admin = excluded.is_admin,
                 is_owner = excluded.is_owner,
                 has_hr_access = excluded.has_hr_access,
                 has_finance_access = excluded.has_finance_access,
                 active = excluded.active,
                 deleted = excluded.deleted,
                 updated_at = excluded.updated_at",
        )
        .bind(&member.id.0)
        .bind(&member.tenant_id.0)
        .bind(&member.name)
        .bind(&member.email)
        .bind(member.manager_id.as_ref().map(|id| id.0.as_str()))
        .bind(i64::from(member.is_admin))
        .bind(i64::from(member.is_owner))
        .bind(i64::from(member.has_hr_access))
        .bind(i64::from(member.has_finance_access))
        .bind(i64::from(member.active))
        .bind(i64::from(member.deleted))
        .bind(member.created_at.to_rfc3339())
        .bind(member.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn has_approver_for_role(
        &self,
        role: ApproverRole,
        tenant: &TenantId,
        requester: &MemberId,
    ) -> Result<bool, RepositoryError> {
        let count: i64 = match role {
            ApproverRole::Employee => return Ok(false),
            ApproverRole::Manager => sqlx::query(
                "SELECT COUNT(*) AS count
                 FROM member r
                 JOIN member m ON m.id = r.manager_id
                 WHERE r.id = ? AND m.active = 1 AND m.deleted = 0",
            )
            .bind(&requester.0)
            .fetch_one(&self.pool)
            .await?
            .try_get("count")
            .map_err(|e| RepositoryError::Decode(e.to_string()))?,
            role => {
                let predicate = role_predicate(role);
                sqlx::query(&format!(
                    "SELECT COUNT(*) AS count
                     FROM member m
                     WHERE m.tenant_id = ? AND m.id <> ?
                       AND m.active = 1 AND m.deleted = 0 AND {predicate}"
                ))
                .bind(&tenant.0)
                .bind(&requester.0)
                .fetch_one(&self.pool)
                .await?
                .try_get("count")
                .map_err(|e| RepositoryError::Decode(e.to_string()))?
            }
        };

        Ok(count > 0)
    }

    async fn approvers_for_role(
        &self,
        role: ApproverRole,
        tenant: &TenantId,
        requester: &MemberId,
    ) -> Result<Vec<ApproverContact>, RepositoryError> {
        let rows = match role {
            ApproverRole::Employee => return Ok(Vec::new()),
            ApproverRole::Manager => {
                sqlx::query(
                    "SELECT m.id, m.name, m.email
                     FROM member r
                     JOIN member m ON m.id = r.manager_id
                     WHERE r.id = ? AND m.active = 1 AND m.deleted = 0",
                )
                .bind(&requester.0)
                .fetch_all(&self.pool)
                .await?
            }
            role => {
                let predicate = role_predicate(role);
                sqlx::query(&format!(
                    "SELECT m.id, m.name, m.email
                     FROM member m
                     WHERE m.tenant_id = ? AND m.id <> ?
                       AND m.active = 1 AND m.deleted = 0 AND {predicate}
                     ORDER BY m.name ASC"
                ))
                .bind(&tenant.0)
                .bind(&requester.0)
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.iter().map(contact_from_row).collect()
    }
}
