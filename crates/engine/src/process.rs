use chrono::Utc;

use signoff_core::audit::{AuditCategory, AuditEvent, AuditOutcome};
use signoff_core::domain::member::MemberId;
use signoff_core::domain::request::RequestRef;
use signoff_core::domain::step::{ApprovalDecision, StepId, StepStatus};
use signoff_core::events::ApprovalEvent;
use signoff_core::{authorize_step, summarize, AuthorizationDecision};
use signoff_db::repositories::StepResolution;

use crate::{
    kind_label, ApprovalEngine, BypassOutcome, ProcessOutcome, ProcessedApproval, WorkflowError,
    DEFAULT_BYPASS_NOTE,
};

impl ApprovalEngine {
    /// Ask whether `actor_id` may resolve `step_id` without attempting the
    /// transition. Denial is a value; only missing rows are errors.
    pub async fn can_member_approve(
        &self,
        actor_id: &MemberId,
        step_id: &StepId,
        requester_id: &MemberId,
    ) -> Result<AuthorizationDecision, WorkflowError> {
        let step = self
            .steps
            .find_by_id(step_id)
            .await?
            .ok_or_else(|| WorkflowError::StepNotFound(step_id.clone()))?;
        let actor = self
            .directory
            .find_member(actor_id)
            .await?
            .ok_or_else(|| WorkflowError::MemberNotFound(actor_id.clone()))?;
        let requester = self
            .directory
            .find_member(requester_id)
            .await?
            .ok_or_else(|| WorkflowError::MemberNotFound(requester_id.clone()))?;

        Ok(authorize_step(&actor, &requester, step.required_role))
    }

    /// Resolve one pending step.
    ///
    /// The transition is a conditional update guarded on PENDING; when the
    /// guard misses, another actor won the race and `AlreadyProcessed` is
    /// returned. A rejection skips every remaining pending step in the same
    /// transaction. Events and notifications go out only after the commit.
    pub async fn process_approval(
        &self,
        step_id: &StepId,
        actor_id: &MemberId,
        requester_id: &MemberId,
        decision: ApprovalDecision,
        notes: Option<String>,
    ) -> Result<ProcessOutcome, WorkflowError> {
        let step = self
            .steps
            .find_by_id(step_id)
            .await?
            .ok_or_else(|| WorkflowError::StepNotFound(step_id.clone()))?;

        if step.status != StepStatus::Pending {
            return Err(WorkflowError::AlreadyProcessed(step_id.clone()));
        }

        let actor = self
            .directory
            .find_member(actor_id)
            .await?
            .ok_or_else(|| WorkflowError::MemberNotFound(actor_id.clone()))?;
        let requester = self
            .directory
            .find_member(requester_id)
            .await?
            .ok_or_else(|| WorkflowError::MemberNotFound(requester_id.clone()))?;

        let authorization = authorize_step(&actor, &requester, step.required_role);
        if !authorization.allowed {
            self.audit.emit(
                AuditEvent::new(
                    Some(step.request.clone()),
                    actor_id.0.clone(),
                    "approval.step_denied",
                    AuditCategory::Step,
                    actor_id.0.clone(),
                    AuditOutcome::Rejected,
                )
                .with_metadata("level_order", step.level_order.to_string())
                .with_metadata("reason", authorization.reason.clone()),
            );
            return Ok(ProcessOutcome::Denied { decision: authorization });
        }

        let request = step.request.clone();
        let tenant = step.tenant_id.clone();
        let receipt = self
            .steps
            .transition(StepResolution {
                step_id: step_id.clone(),
                request: request.clone(),
                decision,
                approver_id: actor.id.clone(),
                notes,
                actioned_at: Utc::now(),
            })
            .await?;

        if !receipt.applied {
            return Err(WorkflowError::AlreadyProcessed(step_id.clone()));
        }

        let chain = self.steps.list_for_request(&request).await?;
        let summary = summarize(&chain);
        let chain_complete = receipt.remaining_pending == 0;
        let processed_step =
            chain.iter().find(|candidate| candidate.id == *step_id).cloned().unwrap_or(step);

        match decision {
            ApprovalDecision::Reject => {
                self.publish(ApprovalEvent::ChainRejected {
                    tenant_id: tenant.clone(),
                    request: request.clone(),
                    requester_id: requester_id.clone(),
                    rejected_step: processed_step.clone(),
                })
                .await;
                self.notify_members(
                    &tenant,
                    &request,
                    std::iter::once(requester_id.clone()),
                    "Request rejected",
                    &format!("Your {} was rejected.", kind_label(request.kind)),
                )
                .await;
            }
            ApprovalDecision::Approve if chain_complete => {
                self.publish(ApprovalEvent::ChainCompleted {
                    tenant_id: tenant.clone(),
                    request: request.clone(),
                    requester_id: Some(requester_id.clone()),
                    final_step: Some(processed_step.clone()),
                })
                .await;
                self.notify_members(
                    &tenant,
                    &request,
                    std::iter::once(requester_id.clone()),
                    "Request approved",
                    &format!("Your {} is fully approved.", kind_label(request.kind)),
                )
                .await;
            }
            ApprovalDecision::Approve => {
                // The chain advanced: address the approvers for the next
                // pending rung, never the requester themselves.
                if let Some(next) =
                    chain.iter().find(|candidate| candidate.status == StepStatus::Pending)
                {
                    let recipients = self
                        .directory
                        .approvers_for_role(next.required_role, &tenant, requester_id)
                        .await?;
                    self.notify_members(
                        &tenant,
                        &request,
                        recipients.iter().map(|contact| contact.id.clone()),
                        "Approval needed",
                        &format!("A {} is waiting for your approval.", kind_label(request.kind)),
                    )
                    .await;
                    self.publish(ApprovalEvent::ChainAdvanced {
                        tenant_id: tenant.clone(),
                        request: request.clone(),
                        requester_id: requester_id.clone(),
                        approved_step: processed_step.clone(),
                        next_step: next.clone(),
                        recipients,
                    })
                    .await;
                }
            }
        }

        let event_type = match decision {
            ApprovalDecision::Approve => "approval.step_approved",
            ApprovalDecision::Reject => "approval.step_rejected",
        };
        self.audit.emit(
            AuditEvent::new(
                Some(request.clone()),
                actor_id.0.clone(),
                event_type,
                AuditCategory::Step,
                actor_id.0.clone(),
                AuditOutcome::Success,
            )
            .with_metadata("level_order", processed_step.level_order.to_string())
            .with_metadata("skipped_steps", receipt.skipped_steps.to_string())
            .with_metadata("chain_complete", chain_complete.to_string()),
        );

        tracing::info!(
            request = %request,
            step_id = %step_id,
            level_order = processed_step.level_order,
            decision = ?decision,
            chain_complete,
            "approval step processed"
        );

        Ok(ProcessOutcome::Processed(ProcessedApproval {
            step: processed_step,
            chain_complete,
            chain,
            summary,
        }))
    }

    /// Resolve the current pending step of a request's chain, located by the
    /// request reference instead of a step id.
    pub async fn process_request_approval(
        &self,
        request: &RequestRef,
        actor_id: &MemberId,
        requester_id: &MemberId,
        decision: ApprovalDecision,
        notes: Option<String>,
    ) -> Result<ProcessOutcome, WorkflowError> {
        let chain = self.steps.list_for_request(request).await?;
        if chain.is_empty() {
            return Err(WorkflowError::ChainNotFound(request.clone()));
        }

        let current_id = chain
            .iter()
            .find(|step| step.status == StepStatus::Pending)
            .map(|step| step.id.clone())
            .ok_or_else(|| WorkflowError::NothingPending(request.clone()))?;

        self.process_approval(&current_id, actor_id, requester_id, decision, notes).await
    }

    /// Force-approve every pending step of a chain in one statement.
    ///
    /// No authorization happens here: callers confirm the actor is an admin
    /// before invoking, which is why this lives behind a separate entry point
    /// rather than a flag on `process_approval`.
    pub async fn admin_bypass(
        &self,
        request: &RequestRef,
        admin_id: &MemberId,
        note: Option<String>,
    ) -> Result<BypassOutcome, WorkflowError> {
        let chain = self.steps.list_for_request(request).await?;
        let Some(first) = chain.first() else {
            return Err(WorkflowError::ChainNotFound(request.clone()));
        };
        let tenant = first.tenant_id.clone();

        let note = note.unwrap_or_else(|| DEFAULT_BYPASS_NOTE.to_string());
        let steps_approved =
            self.steps.approve_all_pending(request, admin_id, &note, Utc::now()).await?;

        let chain = self.steps.list_for_request(request).await?;
        let summary = summarize(&chain);

        self.publish(ApprovalEvent::ChainCompleted {
            tenant_id: tenant,
            request: request.clone(),
            requester_id: None,
            final_step: None,
        })
        .await;

        self.audit.emit(
            AuditEvent::new(
                Some(request.clone()),
                admin_id.0.clone(),
                "approval.chain_bypassed",
                AuditCategory::Chain,
                admin_id.0.clone(),
                AuditOutcome::Success,
            )
            .with_metadata("steps_approved", steps_approved.to_string()),
        );

        tracing::info!(
            request = %request,
            admin_id = %admin_id,
            steps_approved,
            "approval chain bypassed"
        );

        Ok(BypassOutcome { steps_approved, chain, summary })
    }
}


#[cfg(test)]
mod sqlite_scenarios {
    use std::sync::Arc;

    use rust_decimal::Decimal;

    use signoff_core::domain::member::{MemberId, TenantId};
    use signoff_core::domain::policy::ApproverRole;
    use signoff_core::domain::request::{RequestKind, RequestRef};
    use signoff_core::domain::step::{ApprovalDecision, ChainStatus, StepStatus};
    use signoff_core::events::InMemoryNotificationSink;
    use signoff_core::{ApprovalEvent, PolicyCriteria};
    use signoff_db::{connect_with_settings, migrations, SeedDataset, SEED_TENANT};

    use crate::{ApprovalEngine, ProcessOutcome};

    struct Scenario {
        engine: ApprovalEngine,
        sink: InMemoryNotificationSink,
    }

    async fn seeded_engine() -> Scenario {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        SeedDataset::apply(&pool).await.expect("seed");

        let sink = InMemoryNotificationSink::default();
        let engine =
            ApprovalEngine::for_pool(&pool).with_notification_sink(Arc::new(sink.clone()));
        Scenario { engine, sink }
    }

    fn tenant() -> TenantId {
        TenantId(SEED_TENANT.to_string())
    }

    #[tokio::test]
    async fn requester_without_manager_falls_back_to_a_director_chain() {
        let s = seeded_engine().await;

        // Riley has no manager; the short-leave ladder is [MANAGER] only, so
        // the whole ladder prunes away and DIRECTOR is synthesized.
        let policy = s
            .engine
            .find_applicable_policy(
                &tenant(),
                RequestKind::LeaveRequest,
                &PolicyCriteria::for_days(Decimal::ONE),
            )
            .await
            .expect("find")
            .expect("short-leave policy");
        assert_eq!(policy.levels.len(), 1);
        assert_eq!(policy.levels[0].required_role, ApproverRole::Manager);

        let request = RequestRef::new(RequestKind::LeaveRequest, "lr-riley-1");
        let chain = s
            .engine
            .initialize_chain(&request, &policy, &tenant(), &MemberId("mem-riley".to_string()))
            .await
            .expect("initialize");

        assert_eq!(chain.len(), 1);
        assert_eq!(chain[0].required_role, ApproverRole::Director);

        // Dana, the admin, resolves the fallback step.
        let outcome = s
            .engine
            .process_request_approval(
                &request,
                &MemberId("mem-dana".to_string()),
                &MemberId("mem-riley".to_string()),
                ApprovalDecision::Approve,
                None,
            )
            .await
            .expect("process");

        match outcome {
            ProcessOutcome::Processed(result) => {
                assert!(result.chain_complete);
                assert_eq!(result.summary.status, ChainStatus::Approved);
            }
            ProcessOutcome::Denied { decision } => panic!("denied: {}", decision.reason),
        }
    }

    #[tokio::test]
    async fn extended_leave_flows_through_manager_then_hr() {
        let s = seeded_engine().await;

        let policy = s
            .engine
            .find_applicable_policy(
                &tenant(),
                RequestKind::LeaveRequest,
                &PolicyCriteria::for_days(Decimal::from(4)),
            )
            .await
            .expect("find")
            .expect("extended-leave policy");

        let request = RequestRef::new(RequestKind::LeaveRequest, "lr-eli-1");
        let chain = s
            .engine
            .initialize_chain(&request, &policy, &tenant(), &MemberId("mem-eli".to_string()))
            .await
            .expect("initialize");
        assert_eq!(chain.len(), 2);

        // Level 1: Morgan is Eli's direct manager.
        let outcome = s
            .engine
            .process_approval(
                &chain[0].id,
                &MemberId("mem-morgan".to_string()),
                &MemberId("mem-eli".to_string()),
                ApprovalDecision::Approve,
                None,
            )
            .await
            .expect("manager approval");
        let result = match outcome {
            ProcessOutcome::Processed(result) => result,
            ProcessOutcome::Denied { decision } => panic!("denied: {}", decision.reason),
        };
        assert!(!result.chain_complete);
        assert_eq!(result.summary.current_step, Some(2));

        // The HR audience excludes the requester and names Harper.
        let advanced = s
            .sink
            .events()
            .into_iter()
            .find_map(|event| match event {
                ApprovalEvent::ChainAdvanced { recipients, .. } => Some(recipients),
                _ => None,
            })
            .expect("advanced event");
        assert_eq!(advanced.len(), 1);
        assert_eq!(advanced[0].id.0, "mem-harper");

        // Level 2: Harper rejects after Morgan approved.
        let outcome = s
            .engine
            .process_approval(
                &result.chain[1].id,
                &MemberId("mem-harper".to_string()),
                &MemberId("mem-eli".to_string()),
                ApprovalDecision::Reject,
                Some("insufficient cover that week".to_string()),
            )
            .await
            .expect("hr rejection");

        let result = match outcome {
            ProcessOutcome::Processed(result) => result,
            ProcessOutcome::Denied { decision } => panic!("denied: {}", decision.reason),
        };
        assert_eq!(result.chain[0].status, StepStatus::Approved);
        assert_eq!(result.chain[1].status, StepStatus::Rejected);
        assert_eq!(result.summary.status, ChainStatus::Rejected);
        assert_eq!(result.summary.current_step, Some(2));
        assert!(result.chain_complete);
    }
}
