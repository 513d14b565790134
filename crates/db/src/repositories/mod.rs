use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use signoff_core::domain::member::{ApproverContact, Member, MemberId, TenantId};
use signoff_core::domain::notification::Notification;
use signoff_core::domain::policy::{ApprovalPolicy, ApproverRole, PolicyId};
use signoff_core::domain::request::{RequestKind, RequestRef};
use signoff_core::domain::step::{ApprovalDecision, ApprovalStep, StepId};

pub mod member;
pub mod memory;
pub mod notification;
pub mod policy;
pub mod step;

pub use member::SqlMemberDirectory;
pub use memory::{
    InMemoryMemberDirectory, InMemoryNotificationRepository, InMemoryPolicyRepository,
    InMemoryStepRepository,
};
pub use notification::SqlNotificationRepository;
pub use policy::SqlPolicyRepository;
pub use step::SqlStepRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

/// Resolution of one pending step, handed to the step store for the
/// compare-and-set transition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StepResolution {
    pub step_id: StepId,
    pub request: RequestRef,
    pub decision: ApprovalDecision,
    pub approver_id: MemberId,
    pub notes: Option<String>,
    pub actioned_at: DateTime<Utc>,
}

/// What the transactional transition actually did.
///
/// `applied` is false when the conditional update matched zero rows, i.e.
/// another actor resolved the step first; in that case nothing else was
/// touched. `skipped_steps` and `remaining_pending` are read inside the same
/// transaction as the update, so they describe a consistent snapshot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransitionReceipt {
    pub applied: bool,
    pub skipped_steps: u64,
    pub remaining_pending: i64,
}

#[async_trait]
pub trait PolicyRepository: Send + Sync {
    async fn find_by_id(&self, id: &PolicyId) -> Result<Option<ApprovalPolicy>, RepositoryError>;

    /// Active policies for one (tenant, kind), ordered by priority descending
    /// then creation time ascending, levels loaded.
    async fn list_active(
        &self,
        tenant: &TenantId,
        kind: RequestKind,
    ) -> Result<Vec<ApprovalPolicy>, RepositoryError>;

    /// Count every policy for (tenant, kind), active or not; used to decide
    /// whether defaults should be seeded.
    async fn count_for_kind(
        &self,
        tenant: &TenantId,
        kind: RequestKind,
    ) -> Result<i64, RepositoryError>;

    async fn save(&self, policy: ApprovalPolicy) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait StepRepository: Send + Sync {
    /// Persist a freshly planned chain as a single transaction; a partially
    /// written chain is never observable.
    async fn insert_chain(&self, steps: Vec<ApprovalStep>) -> Result<(), RepositoryError>;

    async fn find_by_id(&self, id: &StepId) -> Result<Option<ApprovalStep>, RepositoryError>;

    /// All steps for one request ordered by level, approver identity joined.
    async fn list_for_request(
        &self,
        request: &RequestRef,
    ) -> Result<Vec<ApprovalStep>, RepositoryError>;

    /// The lowest-order PENDING step, if any.
    async fn current_pending(
        &self,
        request: &RequestRef,
    ) -> Result<Option<ApprovalStep>, RepositoryError>;

    async fn count_pending(&self, request: &RequestRef) -> Result<i64, RepositoryError>;

    /// Resolve one step with a conditional update guarded on PENDING, cascade
    /// SKIPPED over the rest of the chain on rejection, and recount pending —
    /// all inside one transaction.
    async fn transition(
        &self,
        resolution: StepResolution,
    ) -> Result<TransitionReceipt, RepositoryError>;

    /// Force-approve every PENDING step of a request; returns how many rows
    /// were updated.
    async fn approve_all_pending(
        &self,
        request: &RequestRef,
        approver: &MemberId,
        notes: &str,
        actioned_at: DateTime<Utc>,
    ) -> Result<u64, RepositoryError>;

    /// Remove the whole chain; used when the parent request is cancelled.
    async fn delete_chain(&self, request: &RequestRef) -> Result<u64, RepositoryError>;
}

/// Read-side oracle over the member directory.
#[async_trait]
pub trait MemberDirectory: Send + Sync {
    async fn find_member(&self, id: &MemberId) -> Result<Option<Member>, RepositoryError>;

    async fn save(&self, member: Member) -> Result<(), RepositoryError>;

    /// Whether any eligible approver exists for `role`, excluding the
    /// requester themselves.
    async fn has_approver_for_role(
        &self,
        role: ApproverRole,
        tenant: &TenantId,
        requester: &MemberId,
    ) -> Result<bool, RepositoryError>;

    /// The members who should be notified when a step requiring `role`
    /// becomes current, excluding the requester.
    async fn approvers_for_role(
        &self,
        role: ApproverRole,
        tenant: &TenantId,
        requester: &MemberId,
    ) -> Result<Vec<ApproverContact>, RepositoryError>;
}

#[async_trait]
pub trait NotificationRepository: Send + Sync {
    async fn insert_bulk(&self, notifications: Vec<Notification>) -> Result<(), RepositoryError>;

    async fn list_for_recipient(
        &self,
        recipient: &MemberId,
        unread_only: bool,
    ) -> Result<Vec<Notification>, RepositoryError>;

    async fn mark_read(&self, id: &signoff_core::NotificationId) -> Result<(), RepositoryError>;
}
