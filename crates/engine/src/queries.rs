use signoff_core::audit::{AuditCategory, AuditEvent, AuditOutcome};
use signoff_core::domain::member::{ApproverContact, MemberId, TenantId};
use signoff_core::domain::policy::ApproverRole;
use signoff_core::domain::request::RequestRef;
use signoff_core::domain::step::{ApprovalStep, ChainStatus, ChainSummary, StepStatus};
use signoff_core::summarize;

use crate::{ApprovalEngine, WorkflowError};

impl ApprovalEngine {
    /// All steps for a request, ordered by level, approver identity joined.
    pub async fn approval_chain(
        &self,
        request: &RequestRef,
    ) -> Result<Vec<ApprovalStep>, WorkflowError> {
        Ok(self.steps.list_for_request(request).await?)
    }

    /// The lowest-order PENDING step, if any remains.
    pub async fn current_pending_step(
        &self,
        request: &RequestRef,
    ) -> Result<Option<ApprovalStep>, WorkflowError> {
        Ok(self.steps.current_pending(request).await?)
    }

    pub async fn has_approval_chain(&self, request: &RequestRef) -> Result<bool, WorkflowError> {
        Ok(!self.steps.list_for_request(request).await?.is_empty())
    }

    /// True when the chain exists and resolved without a rejection.
    pub async fn is_fully_approved(&self, request: &RequestRef) -> Result<bool, WorkflowError> {
        let summary = self.chain_summary(request).await?;
        Ok(summary.status == ChainStatus::Approved)
    }

    pub async fn was_rejected(&self, request: &RequestRef) -> Result<bool, WorkflowError> {
        let chain = self.steps.list_for_request(request).await?;
        Ok(chain.iter().any(|step| step.status == StepStatus::Rejected))
    }

    /// Remove a request's chain outright; used when the parent request is
    /// cancelled and its history should not linger.
    pub async fn delete_approval_chain(
        &self,
        request: &RequestRef,
    ) -> Result<u64, WorkflowError> {
        let deleted = self.steps.delete_chain(request).await?;

        if deleted > 0 {
            self.audit.emit(
                AuditEvent::new(
                    Some(request.clone()),
                    "chain-delete",
                    "approval.chain_deleted",
                    AuditCategory::Chain,
                    "approval-engine",
                    AuditOutcome::Success,
                )
                .with_metadata("steps_deleted", deleted.to_string()),
            );
            tracing::info!(request = %request, steps_deleted = deleted, "approval chain deleted");
        }

        Ok(deleted)
    }

    /// Members who can satisfy `role` for a request raised by `requester`,
    /// used to address the next round of notifications.
    pub async fn approvers_for_role(
        &self,
        role: ApproverRole,
        tenant: &TenantId,
        requester: &MemberId,
    ) -> Result<Vec<ApproverContact>, WorkflowError> {
        Ok(self.directory.approvers_for_role(role, tenant, requester).await?)
    }

    pub async fn chain_summary(
        &self,
        request: &RequestRef,
    ) -> Result<ChainSummary, WorkflowError> {
        let chain = self.steps.list_for_request(request).await?;
        Ok(summarize(&chain))
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use signoff_core::domain::request::{RequestKind, RequestRef};
    use signoff_core::domain::step::ChainStatus;
    use signoff_core::{MemberId, PolicyCriteria};

    use crate::test_support::{harness, member, save_members, tenant};

    #[tokio::test]
    async fn chain_queries_reflect_lifecycle() {
        let h = harness();

        let mut admin = member("dana");
        admin.is_admin = true;
        save_members(&h.directory, vec![member("riley"), admin]).await;

        let request = RequestRef::new(RequestKind::PurchaseRequest, "pr-1");
        assert!(!h.engine.has_approval_chain(&request).await.expect("has chain"));
        assert_eq!(
            h.engine.chain_summary(&request).await.expect("summary").status,
            ChainStatus::NotStarted
        );

        let policy = h
            .engine
            .find_applicable_policy(
                &tenant(),
                RequestKind::PurchaseRequest,
                &PolicyCriteria::for_amount(Decimal::new(150_000, 2)),
            )
            .await
            .expect("find")
            .expect("standard purchase policy");

        h.engine
            .initialize_chain(&request, &policy, &tenant(), &MemberId("riley".to_string()))
            .await
            .expect("initialize");

        assert!(h.engine.has_approval_chain(&request).await.expect("has chain"));
        let current =
            h.engine.current_pending_step(&request).await.expect("current").expect("pending");
        assert_eq!(current.level_order, 1);
        assert!(!h.engine.is_fully_approved(&request).await.expect("not approved yet"));
        assert!(!h.engine.was_rejected(&request).await.expect("not rejected"));
    }

    #[tokio::test]
    async fn delete_chain_resets_the_request_to_not_started() {
        let h = harness();

        let mut admin = member("dana");
        admin.is_admin = true;
        save_members(&h.directory, vec![member("riley"), admin]).await;

        let request = RequestRef::new(RequestKind::AssetRequest, "ar-1");
        let policy = h
            .engine
            .find_applicable_policy(&tenant(), RequestKind::AssetRequest, &PolicyCriteria::none())
            .await
            .expect("find")
            .expect("asset policy");

        h.engine
            .initialize_chain(&request, &policy, &tenant(), &MemberId("riley".to_string()))
            .await
            .expect("initialize");

        let deleted = h.engine.delete_approval_chain(&request).await.expect("delete");
        assert!(deleted > 0);
        assert!(!h.engine.has_approval_chain(&request).await.expect("has chain"));
        assert_eq!(
            h.engine.chain_summary(&request).await.expect("summary").status,
            ChainStatus::NotStarted
        );

        let audit_logged = h
            .audit
            .events()
            .iter()
            .any(|event| event.event_type == "approval.chain_deleted");
        assert!(audit_logged);
    }
}
