//! Orchestrating service for multi-level approval chains.
//!
//! The engine binds the pure decision logic in `signoff-core` (policy
//! matching, chain planning, authorization, summaries) to persisted state in
//! `signoff-db`, and fans committed transitions out to notification and audit
//! sinks. It owns no HTTP surface; request handlers call it and remain
//! responsible for flipping the business entity's own status afterwards.

mod process;
mod queries;

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use signoff_core::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink, NoopAuditSink};
use signoff_core::domain::member::{MemberId, TenantId};
use signoff_core::domain::policy::{ApprovalLevel, ApprovalPolicy, ApproverRole, PolicyId};
use signoff_core::domain::request::{RequestKind, RequestRef};
use signoff_core::domain::step::{ApprovalStep, ChainSummary, StepId, StepStatus};
use signoff_core::events::{ApprovalEvent, NoopNotificationSink, NotificationSink};
use signoff_core::{plan_chain, select_policy, AuthorizationDecision, PolicyCriteria};
use signoff_db::repositories::{
    MemberDirectory, NotificationRepository, PolicyRepository, RepositoryError,
    SqlMemberDirectory, SqlNotificationRepository, SqlPolicyRepository, SqlStepRepository,
    StepRepository,
};
use signoff_db::DbPool;

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("approval step not found: {0}")]
    StepNotFound(StepId),
    #[error("no approval chain exists for {0}")]
    ChainNotFound(RequestRef),
    #[error("no pending step remains for {0}")]
    NothingPending(RequestRef),
    #[error("member not found: {0}")]
    MemberNotFound(MemberId),
    #[error("step {0} was already processed")]
    AlreadyProcessed(StepId),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Result of a processing call that passed data-integrity checks.
///
/// Authorization denial is a value, not an error: the `reason` is meant for
/// the UI, and nothing about the chain changed.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ProcessOutcome {
    Denied { decision: AuthorizationDecision },
    Processed(ProcessedApproval),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProcessedApproval {
    pub step: ApprovalStep,
    pub chain_complete: bool,
    pub chain: Vec<ApprovalStep>,
    pub summary: ChainSummary,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BypassOutcome {
    pub steps_approved: u64,
    pub chain: Vec<ApprovalStep>,
    pub summary: ChainSummary,
}

pub(crate) const DEFAULT_BYPASS_NOTE: &str = "Approved by admin (bypass)";

pub struct ApprovalEngine {
    policies: Arc<dyn PolicyRepository>,
    steps: Arc<dyn StepRepository>,
    directory: Arc<dyn MemberDirectory>,
    notifications: Arc<dyn NotificationRepository>,
    sink: Arc<dyn NotificationSink>,
    audit: Arc<dyn AuditSink>,
}

impl ApprovalEngine {
    pub fn new(
        policies: Arc<dyn PolicyRepository>,
        steps: Arc<dyn StepRepository>,
        directory: Arc<dyn MemberDirectory>,
        notifications: Arc<dyn NotificationRepository>,
    ) -> Self {
        Self {
            policies,
            steps,
            directory,
            notifications,
            sink: Arc::new(NoopNotificationSink),
            audit: Arc::new(NoopAuditSink),
        }
    }

    /// Wire the SQL repositories over one pool.
    pub fn for_pool(pool: &DbPool) -> Self {
        Self::new(
            Arc::new(SqlPolicyRepository::new(pool.clone())),
            Arc::new(SqlStepRepository::new(pool.clone())),
            Arc::new(SqlMemberDirectory::new(pool.clone())),
            Arc::new(SqlNotificationRepository::new(pool.clone())),
        )
    }

    pub fn with_notification_sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    /// Resolve the policy governing a request, lazily seeding the built-in
    /// defaults the first time a tenant uses a request kind.
    pub async fn find_applicable_policy(
        &self,
        tenant: &TenantId,
        kind: RequestKind,
        criteria: &PolicyCriteria,
    ) -> Result<Option<ApprovalPolicy>, WorkflowError> {
        self.ensure_default_policies(tenant, kind).await?;

        let candidates = self.policies.list_active(tenant, kind).await?;
        Ok(select_policy(&candidates, criteria).cloned())
    }

    /// Seed the built-in policy ladder for (tenant, kind) when the tenant has
    /// configured nothing at all — including nothing inactive.
    pub async fn ensure_default_policies(
        &self,
        tenant: &TenantId,
        kind: RequestKind,
    ) -> Result<(), WorkflowError> {
        if self.policies.count_for_kind(tenant, kind).await? > 0 {
            return Ok(());
        }

        for policy in default_policies(tenant, kind) {
            let policy_id = policy.id.0.clone();
            self.policies.save(policy).await?;
            self.audit.emit(
                AuditEvent::new(
                    None,
                    "policy-seed",
                    "approval.policy_seeded",
                    AuditCategory::Policy,
                    "approval-engine",
                    AuditOutcome::Success,
                )
                .with_metadata("policy_id", policy_id)
                .with_metadata("request_kind", kind.as_str()),
            );
        }

        tracing::info!(
            tenant_id = %tenant.0,
            request_kind = kind.as_str(),
            "seeded default approval policies"
        );

        Ok(())
    }

    /// Expand a matched policy into persisted PENDING steps for one request.
    ///
    /// Levels with no eligible approver are pruned and the survivors
    /// renumbered; a fully pruned ladder degrades to a single DIRECTOR step.
    /// The insert is one transaction, and the returned steps are re-read from
    /// storage with approver identity joined.
    pub async fn initialize_chain(
        &self,
        request: &RequestRef,
        policy: &ApprovalPolicy,
        tenant: &TenantId,
        requester_id: &MemberId,
    ) -> Result<Vec<ApprovalStep>, WorkflowError> {
        let requester = self
            .directory
            .find_member(requester_id)
            .await?
            .ok_or_else(|| WorkflowError::MemberNotFound(requester_id.clone()))?;

        let levels = policy.ordered_levels();
        let mut eligibility = std::collections::HashMap::new();
        for level in &levels {
            if eligibility.contains_key(&level.required_role) {
                continue;
            }
            let eligible = self
                .directory
                .has_approver_for_role(level.required_role, tenant, &requester.id)
                .await?;
            eligibility.insert(level.required_role, eligible);
        }

        let planned = plan_chain(&levels, |role| eligibility.get(&role).copied().unwrap_or(false));

        let now = Utc::now();
        let rows: Vec<ApprovalStep> = planned
            .iter()
            .map(|step| ApprovalStep {
                id: StepId(Uuid::new_v4().to_string()),
                tenant_id: tenant.clone(),
                request: request.clone(),
                level_order: step.level_order,
                required_role: step.required_role,
                status: StepStatus::Pending,
                approver_id: None,
                approver_name: None,
                approver_email: None,
                actioned_at: None,
                notes: None,
                created_at: now,
                updated_at: now,
            })
            .collect();

        self.steps.insert_chain(rows).await?;
        let chain = self.steps.list_for_request(request).await?;

        self.audit.emit(
            AuditEvent::new(
                Some(request.clone()),
                requester_id.0.clone(),
                "approval.chain_initialized",
                AuditCategory::Chain,
                "approval-engine",
                AuditOutcome::Success,
            )
            .with_metadata("policy_id", policy.id.0.clone())
            .with_metadata("total_steps", chain.len().to_string()),
        );

        tracing::info!(
            request = %request,
            policy_id = %policy.id.0,
            total_steps = chain.len(),
            "approval chain initialized"
        );

        if let Some(first) = chain.first() {
            let recipients =
                self.directory.approvers_for_role(first.required_role, tenant, requester_id).await?;
            self.publish(ApprovalEvent::ChainInitialized {
                tenant_id: tenant.clone(),
                request: request.clone(),
                requester_id: requester_id.clone(),
                step: first.clone(),
                recipients: recipients.clone(),
            })
            .await;
            self.notify_members(
                tenant,
                request,
                recipients.iter().map(|contact| contact.id.clone()),
                "Approval needed",
                &format!("A {} is waiting for your approval.", kind_label(request.kind)),
            )
            .await;
        }

        Ok(chain)
    }

    /// Deliver an event to the sink; failures are logged and swallowed so a
    /// notification channel outage can never fail an approval.
    pub(crate) async fn publish(&self, event: ApprovalEvent) {
        if let Err(error) = self.sink.deliver(&event).await {
            tracing::warn!(
                event_type = event.event_type(),
                request = %event.request(),
                %error,
                "approval event delivery failed"
            );
            self.audit.emit(AuditEvent::new(
                Some(event.request().clone()),
                "notification",
                event.event_type(),
                AuditCategory::Notification,
                "approval-engine",
                AuditOutcome::Failed,
            ));
        }
    }

    /// Best-effort bulk insert of in-app notification rows.
    pub(crate) async fn notify_members(
        &self,
        tenant: &TenantId,
        request: &RequestRef,
        recipients: impl Iterator<Item = MemberId>,
        title: &str,
        body: &str,
    ) {
        let now = Utc::now();
        let rows: Vec<signoff_core::Notification> = recipients
            .map(|recipient_id| signoff_core::Notification {
                id: signoff_core::NotificationId(Uuid::new_v4().to_string()),
                tenant_id: tenant.clone(),
                recipient_id,
                request: request.clone(),
                title: title.to_string(),
                body: body.to_string(),
                read: false,
                created_at: now,
            })
            .collect();

        if rows.is_empty() {
            return;
        }

        if let Err(error) = self.notifications.insert_bulk(rows).await {
            tracing::warn!(request = %request, %error, "in-app notification write failed");
        }
    }
}

pub(crate) fn kind_label(kind: RequestKind) -> &'static str {
    match kind {
        RequestKind::LeaveRequest => "leave request",
        RequestKind::PurchaseRequest => "purchase request",
        RequestKind::AssetRequest => "asset request",
    }
}

fn ladder(roles: &[ApproverRole]) -> Vec<ApprovalLevel> {
    roles
        .iter()
        .enumerate()
        .map(|(index, role)| ApprovalLevel { level_order: index as u32 + 1, required_role: *role })
        .collect()
}

/// Built-in ladders used when a tenant has configured no policies for a
/// request kind. Bounds are chosen so exactly one policy matches any value:
/// leave splits at 2 days (half-day granularity makes 2.5 the next value up),
/// purchases split at 5,000.
fn default_policies(tenant: &TenantId, kind: RequestKind) -> Vec<ApprovalPolicy> {
    let now = Utc::now();
    let base = |id: &str, name: &str, priority: i32| ApprovalPolicy {
        id: PolicyId(format!("{}-{}", tenant.0, id)),
        tenant_id: tenant.clone(),
        kind,
        name: name.to_string(),
        is_active: true,
        min_amount: None,
        max_amount: None,
        min_days: None,
        max_days: None,
        priority,
        levels: Vec::new(),
        created_at: now,
        updated_at: now,
    };

    match kind {
        RequestKind::LeaveRequest => vec![
            ApprovalPolicy {
                min_days: Some(Decimal::ZERO),
                max_days: Some(Decimal::from(2)),
                levels: ladder(&[ApproverRole::Manager]),
                ..base("leave-short", "Short leave", 20)
            },
            ApprovalPolicy {
                min_days: Some(Decimal::new(25, 1)),
                max_days: None,
                levels: ladder(&[ApproverRole::Manager, ApproverRole::HrManager]),
                ..base("leave-extended", "Extended leave", 10)
            },
        ],
        RequestKind::PurchaseRequest => vec![
            ApprovalPolicy {
                min_amount: Some(Decimal::ZERO),
                max_amount: Some(Decimal::new(499_999, 2)),
                levels: ladder(&[ApproverRole::Manager]),
                ..base("purchase-standard", "Standard purchase", 20)
            },
            ApprovalPolicy {
                min_amount: Some(Decimal::new(500_000, 2)),
                max_amount: None,
                levels: ladder(&[
                    ApproverRole::Manager,
                    ApproverRole::FinanceManager,
                    ApproverRole::Director,
                ]),
                ..base("purchase-major", "Major purchase", 10)
            },
        ],
        RequestKind::AssetRequest => vec![ApprovalPolicy {
            levels: ladder(&[ApproverRole::Manager, ApproverRole::FinanceManager]),
            ..base("asset-default", "Asset issuance", 10)
        }],
    }
}
