use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{sqlite::SqliteRow, Row};

use signoff_core::domain::member::TenantId;
use signoff_core::domain::policy::{ApprovalLevel, ApprovalPolicy, ApproverRole, PolicyId};
use signoff_core::domain::request::RequestKind;

use super::{PolicyRepository, RepositoryError};
use crate::DbPool;

pub struct SqlPolicyRepository {
    pool: DbPool,
}

impl SqlPolicyRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn load_levels(&self, policy_id: &PolicyId) -> Result<Vec<ApprovalLevel>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT level_order, required_role
             FROM approval_level
             WHERE policy_id = ?
             ORDER BY level_order ASC",
        )
        .bind(&policy_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(level_from_row).collect()
    }
}

pub(crate) fn parse_datetime(value: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|err| RepositoryError::Decode(format!("invalid timestamp `{value}`: {err}")))
}

pub(crate) fn parse_optional_decimal(
    value: Option<String>,
) -> Result<Option<Decimal>, RepositoryError> {
    value
        .map(|raw| {
            raw.parse::<Decimal>()
                .map_err(|err| RepositoryError::Decode(format!("invalid decimal `{raw}`: {err}")))
        })
        .transpose()
}

pub(crate) fn parse_kind(value: &str) -> Result<RequestKind, RepositoryError> {
    RequestKind::parse(value)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown request kind `{value}`")))
}

pub(crate) fn parse_role(value: &str) -> Result<ApproverRole, RepositoryError> {
    ApproverRole::parse(value)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown approver role `{value}`")))
}

fn level_from_row(row: &SqliteRow) -> Result<ApprovalLevel, RepositoryError> {
    let level_order: i64 =
        row.try_get("level_order").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let required_role: String =
        row.try_get("required_role").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(ApprovalLevel { level_order: level_order as u32, required_role: parse_role(&required_role)? })
}

fn policy_from_row(row: &SqliteRow) -> Result<ApprovalPolicy, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let tenant_id: String =
        row.try_get("tenant_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let request_kind: String =
        row.try_get("request_kind").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let name: String = row.try_get("name").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let is_active: i64 =
        row.try_get("is_active").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let min_amount: Option<String> =
        row.try_get("min_amount").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let max_amount: Option<String> =
        row.try_get("max_amount").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let min_days: Option<String> =
        row.try_get("min_days").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let max_days: Option<String> =
        row.try_get("max_days").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let priority: i64 =
        row.try_get("priority").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let updated_at: String =
        row.try_get("updated_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(ApprovalPolicy {
        id: PolicyId(id),
        tenant_id: TenantId(tenant_id),
        kind: parse_kind(&request_kind)?,
        name,
        is_active: is_active != 0,
        min_amount: parse_optional_decimal(min_amount)?,
        max_amount: parse_optional_decimal(max_amount)?,
        min_days: parse_optional_decimal(min_days)?,
        max_days: parse_optional_decimal(max_days)?,
        priority: priority as i32,
        levels: Vec::new(),
        created_at: parse_datetime(&created_at)?,
        updated_at: parse_datetime(&updated_at)?,
    })
}

const POLICY_COLUMNS: &str = "id, tenant_id, request_kind, name, is_active, min_amount,
             max_amount, min_days, max_days, priority, created_at, updated_at";

#[async_trait::async_trait]
impl PolicyRepository for SqlPolicyRepository {
    async fn find_by_id(&self, id: &PolicyId) -> Result<Option<ApprovalPolicy>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {POLICY_COLUMNS} FROM approval_policy WHERE id = ?"
        ))
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let mut policy = policy_from_row(&row)?;
        policy.levels = self.load_levels(&policy.id).await?;
        Ok(Some(policy))
    }

    async fn list_active(
        &self,
        tenant: &TenantId,
        kind: RequestKind,
    ) -> Result<Vec<ApprovalPolicy>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {POLICY_COLUMNS}
             FROM approval_policy
             WHERE tenant_id = ? AND request_kind = ? AND is_active = 1
             ORDER BY priority DESC, created_at ASC"
        ))
        .bind(&tenant.0)
        .bind(kind.as_str())
        .fetch_all(&self.pool)
        .await?;

        let mut policies = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut policy = policy_from_row(row)?;
            policy.levels = self.load_levels(&policy.id).await?;
            policies.push(policy);
        }
        Ok(policies)
    }

    async fn count_for_kind(
        &self,
        tenant: &TenantId,
        kind: RequestKind,
    ) -> Result<i64, RepositoryError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS count FROM approval_policy
             WHERE tenant_id = ? AND request_kind = ?",
        )
        .bind(&tenant.0)
        .bind(kind.as_str())
        .fetch_one(&self.pool)
        .await?;

        row.try_get("count").map_err(|e| RepositoryError::Decode(e.to_string()))
    }

    async fn save(&self, policy: ApprovalPolicy) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO approval_policy (id, tenant_id, request_kind, name, is_active,
                                          min_amount, max_amount, min_days, max_days,
                                          priority, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 is_active = excluded.is_active,
                 min_amount = excluded.min_amount,
                 max_amount = excluded.max_amount,
                 min_days = excluded.min_days,
                 max_days = excluded.max_days,
                 priority = excluded.priority,
                 updated_at = excluded.updated_at",
        )
        .bind(&policy.id.0)
        .bind(&policy.tenant_id.0)
        .bind(policy.kind.as_str())
        .bind(&policy.name)
        .bind(i64::from(policy.is_active))
        .bind(policy.min_amount.map(|value| value.to_string()))
        .bind(policy.max_amount.map(|value| value.to_string()))
        .bind(policy.min_days.map(|value| value.to_string()))
        .bind(policy.max_days.map(|value| value.to_string()))
        .bind(i64::from(policy.priority))
        .bind(policy.created_at.to_rfc3339())
        .bind(policy.updated_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        // Levels are immutable once a policy is in use; a save replaces the
        // full ladder rather than diffing it.
        sqlx::query("DELETE FROM approval_level WHERE policy_id = ?")
            .bind(&policy.id.0)
            .execute(&mut *tx)
            .await?;

        for level in &policy.levels {
            sqlx::query(
                "INSERT INTO approval_level (id, policy_id, level_order, required_role)
                 VALUES (?, ?, ?, ?)",
            )
            .bind(format!("{}-l{}", policy.id.0, level.level_order))
            .bind(&policy.id.0)
            .bind(i64::from(level.level_order))
            .bind(level.required_role.as_str())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use signoff_core::domain::member::TenantId;
    use signoff_core::domain::policy::{ApprovalLevel, ApprovalPolicy, ApproverRole, PolicyId};
    use signoff_core::domain::request::RequestKind;

    use super::SqlPolicyRepository;
    use crate::repositories::PolicyRepository;
    use crate::{connect_with_settings, migrations};

    async fn setup() -> sqlx::SqlitePool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }

    fn sample_policy(id: &str, priority: i32) -> ApprovalPolicy {
        let now = Utc::now();
        ApprovalPolicy {
            id: PolicyId(id.to_string()),
            tenant_id: TenantId("acme".to_string()),
            kind: RequestKind::LeaveRequest,
            name: "Short leave".to_string(),
            is_active: true,
            min_amount: None,
            max_amount: None,
            min_days: Some(Decimal::ZERO),
            max_days: Some(Decimal::from(2)),
            priority,
            levels: vec![
                ApprovalLevel { level_order: 1, required_role: ApproverRole::Manager },
                ApprovalLevel { level_order: 2, required_role: ApproverRole::HrManager },
            ],
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn save_and_find_round_trips_policy_with_levels() {
        let pool = setup().await;
        let repo = SqlPolicyRepository::new(pool);

        let policy = sample_policy("pol-1", 10);
        repo.save(policy.clone()).await.expect("save");

        let found = repo.find_by_id(&PolicyId("pol-1".to_string())).await.expect("find");
        let found = found.expect("should exist");

        assert_eq!(found.name, "Short leave");
        assert_eq!(found.max_days, Some(Decimal::from(2)));
        assert_eq!(found.levels.len(), 2);
        assert_eq!(found.levels[0].required_role, ApproverRole::Manager);
        assert_eq!(found.levels[1].level_order, 2);
    }

    #[tokio::test]
    async fn list_active_orders_by_priority_then_creation() {
        let pool = setup().await;
        let repo = SqlPolicyRepository::new(pool);

        let mut older_high = sample_policy("older-high", 20);
        older_high.created_at = Utc::now() - chrono::Duration::hours(2);
        repo.save(older_high).await.expect("save older");

        repo.save(sample_policy("newer-high", 20)).await.expect("save newer");
        repo.save(sample_policy("low", 5)).await.expect("save low");

        let mut inactive = sample_policy("inactive", 99);
        inactive.is_active = false;
        repo.save(inactive).await.expect("save inactive");

        let listed = repo
            .list_active(&TenantId("acme".to_string()), RequestKind::LeaveRequest)
            .await
            .expect("list");

        let ids: Vec<&str> = listed.iter().map(|policy| policy.id.0.as_str()).collect();
        assert_eq!(ids, vec!["older-high", "newer-high", "low"]);
    }

    #[tokio::test]
    async fn count_for_kind_includes_inactive_policies() {
        let pool = setup().await;
        let repo = SqlPolicyRepository::new(pool);

        repo.save(sample_policy("pol-1", 10)).await.expect("save");
        let mut inactive = sample_policy("pol-2", 10);
        inactive.is_active = false;
        repo.save(inactive).await.expect("save inactive");

        let count = repo
            .count_for_kind(&TenantId("acme".to_string()), RequestKind::LeaveRequest)
            .await
            .expect("count");
        assert_eq!(count, 2);

        let other = repo
            .count_for_kind(&TenantId("acme".to_string()), RequestKind::PurchaseRequest)
            .await
            .expect("count other kind");
        assert_eq!(other, 0);
    }

    #[tokio::test]
    async fn save_replaces_levels_on_conflict() {
        let pool = setup().await;
        let repo = SqlPolicyRepository::new(pool);

        repo.save(sample_policy("pol-1", 10)).await.expect("save");

        let mut updated = sample_policy("pol-1", 10);
        updated.levels =
            vec![ApprovalLevel { level_order: 1, required_role: ApproverRole::Director }];
        repo.save(updated).await.expect("upsert");

        let found =
            repo.find_by_id(&PolicyId("pol-1".to_string())).await.expect("find").expect("exists");
        assert_eq!(found.levels.len(), 1);
        assert_eq!(found.levels[0].required_role, ApproverRole::Director);
    }
}
