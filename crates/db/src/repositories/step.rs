use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use signoff_core::domain::member::{MemberId, TenantId};
use signoff_core::domain::request::{RequestId, RequestRef};
use signoff_core::domain::step::{ApprovalDecision, ApprovalStep, StepId, StepStatus};

use super::policy::{parse_datetime, parse_kind, parse_role};
use super::{RepositoryError, StepRepository, StepResolution, TransitionReceipt};
use crate::DbPool;

pub struct SqlStepRepository {
    pool: DbPool,
}

impl SqlStepRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn parse_status(value: &str) -> Result<StepStatus, RepositoryError> {
    StepStatus::parse(value)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown step status `{value}`")))
}

fn step_from_row(row: &SqliteRow) -> Result<ApprovalStep, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let tenant_id: String =
        row.try_get("tenant_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let request_kind: String =
        row.try_get("request_kind").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let request_id: String =
        row.try_get("request_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let level_order: i64 =
        row.try_get("level_order").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let required_role: String =
        row.try_get("required_role").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let status: String =
        row.try_get("status").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let approver_id: Option<String> =
        row.try_get("approver_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let approver_name: Option<String> =
        row.try_get("approver_name").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let approver_email: Option<String> =
        row.try_get("approver_email").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let actioned_at: Option<String> =
        row.try_get("actioned_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let notes: Option<String> =
        row.try_get("notes").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let updated_at: String =
        row.try_get("updated_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(ApprovalStep {
        id: StepId(id),
        tenant_id: TenantId(tenant_id),
        request: RequestRef { kind: parse_kind(&request_kind)?, id: RequestId(request_id) },
        level_order: level_order as u32,
        required_role: parse_role(&required_role)?,
        status: parse_status(&status)?,
        approver_id: approver_id.map(MemberId),
        approver_name,
        approver_email,
        actioned_at: actioned_at.as_deref().map(parse_datetime).transpose()?,
        notes,
        created_at: parse_datetime(&created_at)?,
        updated_at: parse_datetime(&updated_at)?,
    })
}

/// Step columns joined with the resolving approver's identity.
const STEP_SELECT: &str = "SELECT
        s.id,
        s.tenant_id,
        s.request_kind,
        s.request_id,
        s.level_order,
        s.required_role,
        s.status,
        s.approver_id,
        m.name AS approver_name,
        m.email AS approver_email,
        s.actioned_at,
        s.notes,
        s.created_at,
        s.updated_at
     FROM approval_step s
     LEFT JOIN member m ON m.id = s.approver_id";

#[async_trait::async_trait]
impl StepRepository for SqlStepRepository {
    async fn insert_chain(&self, steps: Vec<ApprovalStep>) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        for step in &steps {
            sqlx::query(
                "INSERT INTO approval_step (id, tenant_id, request_kind, request_id,
                                            level_order, required_role, status, approver_id,
                                            actioned_at, notes, created_at, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&step.id.0)
            .bind(&step.tenant_id.0)
            .bind(step.request.kind.as_str())
            .bind(&step.request.id.0)
            .bind(i64::from(step.level_order))
            .bind(step.required_role.as_str())
            .bind(step.status.as_str())
            .bind(step.approver_id.as_ref().map(|id| id.0.as_str()))
            .bind(step.actioned_at.map(|value| value.to_rfc3339()))
            .bind(step.notes.as_deref())
            .bind(step.created_at.to_rfc3339())
            .bind(step.updated_at.to_rfc3339())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn find_by_id(&self, id: &StepId) -> Result<Option<ApprovalStep>, RepositoryError> {
        let row = sqlx::query(&format!("{STEP_SELECT} WHERE s.id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(step_from_row).transpose()
    }

    async fn list_for_request(
        &self,
        request: &RequestRef,
    ) -> Result<Vec<ApprovalStep>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "{STEP_SELECT} WHERE s.request_kind = ? AND s.request_id = ?
             ORDER BY s.level_order ASC"
        ))
        .bind(request.kind.as_str())
        .bind(&request.id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(step_from_row).collect()
    }

    async fn current_pending(
        &self,
        request: &RequestRef,
    ) -> Result<Option<ApprovalStep>, RepositoryError> {
        let row = sqlx::query(&format!(
            "{STEP_SELECT} WHERE s.request_kind = ? AND s.request_id = ? AND s.status = 'pending'
             ORDER BY s.level_order ASC
             LIMIT 1"
        ))
        .bind(request.kind.as_str())
        .bind(&request.id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(step_from_row).transpose()
    }

    async fn count_pending(&self, request: &RequestRef) -> Result<i64, RepositoryError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS count FROM approval_step
             WHERE request_kind = ? AND request_id = ? AND status = 'pending'",
        )
        .bind(request.kind.as_str())
        .bind(&request.id.0)
        .fetch_one(&self.pool)
        .await?;

        row.try_get("count").map_err(|e| RepositoryError::Decode(e.to_string()))
    }

    async fn transition(
        &self,
        resolution: StepResolution,
    ) -> Result<TransitionReceipt, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let actioned_at = resolution.actioned_at.to_rfc3339();

        // Conditional update: only a still-PENDING row moves. Zero rows
        // affected means another actor resolved the step first.
        let updated = sqlx::query(
            "UPDATE approval_step
             SET status = ?, approver_id = ?, actioned_at = ?, notes = ?, updated_at = ?
             WHERE id = ? AND status = 'pending'",
        )
        .bind(resolution.decision.resolved_status().as_str())
        .bind(&resolution.approver_id.0)
        .bind(&actioned_at)
        .bind(resolution.notes.as_deref())
        .bind(&actioned_at)
        .bind(&resolution.step_id.0)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if updated == 0 {
            tx.rollback().await?;
            return Ok(TransitionReceipt { applied: false, skipped_steps: 0, remaining_pending: 0 });
        }

        let skipped_steps = match resolution.decision {
            ApprovalDecision::Reject => {
                // A rejection terminates the chain: everything still pending
                // is skipped in the same transaction as the rejection itself.
                sqlx::query(
                    "UPDATE approval_step
                     SET status = 'skipped', updated_at = ?
                     WHERE request_kind = ? AND request_id = ? AND status = 'pending'",
                )
                .bind(&actioned_at)
                .bind(resolution.request.kind.as_str())
                .bind(&resolution.request.id.0)
                .execute(&mut *tx)
                .await?
                .rows_affected()
            }
            ApprovalDecision::Approve => 0,
        };

        let remaining_pending: i64 = sqlx::query(
            "SELECT COUNT(*) AS count FROM approval_step
             WHERE request_kind = ? AND request_id = ? AND status = 'pending'",
        )
        .bind(resolution.request.kind.as_str())
        .bind(&resolution.request.id.0)
        .fetch_one(&mut *tx)
        .await?
        .try_get("count")
        .map_err(|e| RepositoryError::Decode(e.to_string()))?;

        tx.commit().await?;

        Ok(TransitionReceipt { applied: true, skipped_steps, remaining_pending })
    }

    async fn approve_all_pending(
        &self,
        request: &RequestRef,
        approver: &MemberId,
        notes: &str,
        actioned_at: DateTime<Utc>,
    ) -> Result<u64, RepositoryError> {
        let updated = sqlx::query(
            "UPDATE approval_step
             SET status = 'approved', approver_id = ?, actioned_at = ?, notes = ?, updated_at = ?
             WHERE request_kind = ? AND request_id = ? AND status = 'pending'",
        )
        .bind(&approver.0)
        .bind(actioned_at.to_rfc3339())
        .bind(notes)
        .bind(actioned_at.to_rfc3339())
        .bind(request.kind.as_str())
        .bind(&request.id.0)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(updated)
    }

    async fn delete_chain(&self, request: &RequestRef) -> Result<u64, RepositoryError> {
        let deleted = sqlx::query(
            "DELETE FROM approval_step WHERE request_kind = ? AND request_id = ?",
        )
        .bind(request.kind.as_str())
        .bind(&request.id.0)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use signoff_core::domain::member::{MemberId, TenantId};
    use signoff_core::domain::policy::ApproverRole;
    use signoff_core::domain::request::{RequestKind, RequestRef};
    use signoff_core::domain::step::{ApprovalDecision, ApprovalStep, StepId, StepStatus};

    use super::SqlStepRepository;
    use crate::repositories::{StepRepository, StepResolution};
    use crate::{connect_with_settings, migrations};

    async fn setup() -> sqlx::SqlitePool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }

    fn request() -> RequestRef {
        RequestRef::new(RequestKind::LeaveRequest, "lr-100")
    }

    fn pending_step(id: &str, order: u32, role: ApproverRole) -> ApprovalStep {
        let now = Utc::now();
        ApprovalStep {
            id: StepId(id.to_string()),
            tenant_id: TenantId("acme".to_string()),
            request: request(),
            level_order: order,
            required_role: role,
            status: StepStatus::Pending,
            approver_id: None,
            approver_name: None,
            approver_email: None,
            actioned_at: None,
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn resolution(step_id: &str, decision: ApprovalDecision) -> StepResolution {
        StepResolution {
            step_id: StepId(step_id.to_string()),
            request: request(),
            decision,
            approver_id: MemberId("mem-mgr".to_string()),
            notes: Some("looks fine".to_string()),
            actioned_at: Utc::now(),
        }
    }

    async fn insert_two_step_chain(pool: &sqlx::SqlitePool) -> SqlStepRepository {
        let repo = SqlStepRepository::new(pool.clone());
        repo.insert_chain(vec![
            pending_step("step-1", 1, ApproverRole::Manager),
            pending_step("step-2", 2, ApproverRole::HrManager),
        ])
        .await
        .expect("insert chain");
        repo
    }

    #[tokio::test]
    async fn insert_chain_and_list_round_trips_in_level_order() {
        let pool = setup().await;
        let repo = SqlStepRepository::new(pool.clone());

        repo.insert_chain(vec![
            pending_step("step-2", 2, ApproverRole::HrManager),
            pending_step("step-1", 1, ApproverRole::Manager),
        ])
        .await
        .expect("insert chain");

        let steps = repo.list_for_request(&request()).await.expect("list");
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].level_order, 1);
        assert_eq!(steps[0].required_role, ApproverRole::Manager);
        assert_eq!(steps[1].level_order, 2);
    }

    #[tokio::test]
    async fn current_pending_is_the_lowest_pending_order() {
        let pool = setup().await;
        let repo = insert_two_step_chain(&pool).await;

        let current = repo.current_pending(&request()).await.expect("current").expect("pending");
        assert_eq!(current.id.0, "step-1");

        let receipt = repo
            .transition(resolution("step-1", ApprovalDecision::Approve))
            .await
            .expect("transition");
        assert!(receipt.applied);
        assert_eq!(receipt.remaining_pending, 1);

        let current = repo.current_pending(&request()).await.expect("current").expect("pending");
        assert_eq!(current.id.0, "step-2");
    }

    #[tokio::test]
    async fn transition_is_guarded_against_double_processing() {
        let pool = setup().await;
        let repo = insert_two_step_chain(&pool).await;

        let first = repo
            .transition(resolution("step-1", ApprovalDecision::Approve))
            .await
            .expect("first transition");
        assert!(first.applied);

        let second = repo
            .transition(resolution("step-1", ApprovalDecision::Reject))
            .await
            .expect("second transition");
        assert!(!second.applied, "second actor must observe an already-resolved step");

        let step = repo
            .find_by_id(&StepId("step-1".to_string()))
            .await
            .expect("find")
            .expect("exists");
        assert_eq!(step.status, StepStatus::Approved, "losing transition must not overwrite");

        let untouched = repo
            .find_by_id(&StepId("step-2".to_string()))
            .await
            .expect("find")
            .expect("exists");
        assert_eq!(untouched.status, StepStatus::Pending, "cascade must not run for a lost race");
    }

    #[tokio::test]
    async fn rejection_cascades_skipped_over_remaining_pending_steps() {
        let pool = setup().await;
        let repo = SqlStepRepository::new(pool.clone());
        repo.insert_chain(vec![
            pending_step("step-1", 1, ApproverRole::Manager),
            pending_step("step-2", 2, ApproverRole::HrManager),
            pending_step("step-3", 3, ApproverRole::Director),
        ])
        .await
        .expect("insert chain");

        let receipt = repo
            .transition(resolution("step-1", ApprovalDecision::Reject))
            .await
            .expect("reject");

        assert!(receipt.applied);
        assert_eq!(receipt.skipped_steps, 2);
        assert_eq!(receipt.remaining_pending, 0);

        let steps = repo.list_for_request(&request()).await.expect("list");
        assert_eq!(steps[0].status, StepStatus::Rejected);
        assert_eq!(steps[1].status, StepStatus::Skipped);
        assert_eq!(steps[2].status, StepStatus::Skipped);
    }

    #[tokio::test]
    async fn approve_all_pending_stamps_the_admin_and_note() {
        let pool = setup().await;
        let repo = insert_two_step_chain(&pool).await;

        let updated = repo
            .approve_all_pending(
                &request(),
                &MemberId("mem-admin".to_string()),
                "Approved by admin (bypass)",
                Utc::now(),
            )
            .await
            .expect("bypass");
        assert_eq!(updated, 2);

        let steps = repo.list_for_request(&request()).await.expect("list");
        for step in steps {
            assert_eq!(step.status, StepStatus::Approved);
            assert_eq!(step.approver_id.as_ref().map(|id| id.0.as_str()), Some("mem-admin"));
            assert_eq!(step.notes.as_deref(), Some("Approved by admin (bypass)"));
        }
    }

    #[tokio::test]
    async fn approver_identity_is_joined_after_resolution() {
        let pool = setup().await;
        let repo = insert_two_step_chain(&pool).await;

        sqlx::query(
            "INSERT INTO member (id, tenant_id, name, email, created_at, updated_at)
             VALUES ('mem-mgr', 'acme', 'Morgan Lee', 'morgan@acme.test', ?, ?)",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(Utc::now().to_rfc3339())
        .execute(&pool)
        .await
        .expect("insert member");

        repo.transition(resolution("step-1", ApprovalDecision::Approve))
            .await
            .expect("transition");

        let step = repo
            .find_by_id(&StepId("step-1".to_string()))
            .await
            .expect("find")
            .expect("exists");
        assert_eq!(step.approver_name.as_deref(), Some("Morgan Lee"));
        assert_eq!(step.approver_email.as_deref(), Some("morgan@acme.test"));
    }

    #[tokio::test]
    async fn delete_chain_removes_every_step() {
        let pool = setup().await;
        let repo = insert_two_step_chain(&pool).await;

        let deleted = repo.delete_chain(&request()).await.expect("delete");
        assert_eq!(deleted, 2);

        let steps = repo.list_for_request(&request()).await.expect("list");
        assert!(steps.is_empty());
        assert_eq!(repo.count_pending(&request()).await.expect("count"), 0);
    }
}
