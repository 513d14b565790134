use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::member::{ApproverContact, MemberId, TenantId};
use crate::domain::request::RequestRef;
use crate::domain::step::ApprovalStep;

/// Outbound event describing a committed chain transition.
///
/// Events are published after the owning transaction commits, so a consumer
/// never observes a transition that later rolled back. Delivery is
/// best-effort by contract: a sink failure is logged by the publisher and
/// never fails the approval itself.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ApprovalEvent {
    /// A chain was created; `step` is the first pending rung.
    ChainInitialized {
        tenant_id: TenantId,
        request: RequestRef,
        requester_id: MemberId,
        step: ApprovalStep,
        recipients: Vec<ApproverContact>,
    },
    /// A step was approved and a later rung is now waiting.
    ChainAdvanced {
        tenant_id: TenantId,
        request: RequestRef,
        requester_id: MemberId,
        approved_step: ApprovalStep,
        next_step: ApprovalStep,
        recipients: Vec<ApproverContact>,
    },
    /// The final pending step was approved (or an admin bypassed the chain).
    /// The requester is absent on the bypass path, where only the acting
    /// admin is known to the engine.
    ChainCompleted {
        tenant_id: TenantId,
        request: RequestRef,
        requester_id: Option<MemberId>,
        final_step: Option<ApprovalStep>,
    },
    /// A step was rejected; every remaining rung was skipped with it.
    ChainRejected {
        tenant_id: TenantId,
        request: RequestRef,
        requester_id: MemberId,
        rejected_step: ApprovalStep,
    },
}

impl ApprovalEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ChainInitialized { .. } => "approval.chain_initialized",
            Self::ChainAdvanced { .. } => "approval.chain_advanced",
            Self::ChainCompleted { .. } => "approval.chain_completed",
            Self::ChainRejected { .. } => "approval.chain_rejected",
        }
    }

    pub fn request(&self) -> &RequestRef {
        match self {
            Self::ChainInitialized { request, .. }
            | Self::ChainAdvanced { request, .. }
            | Self::ChainCompleted { request, .. }
            | Self::ChainRejected { request, .. } => request,
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum NotifyError {
    #[error("failed to render notification: {0}")]
    Render(String),
    #[error("failed to deliver notification: {0}")]
    Transport(String),
}

/// Delivery channel for approval events.
#[async_trait::async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, event: &ApprovalEvent) -> Result<(), NotifyError>;
}

/// Sink that drops every event; used when outbound delivery is disabled.
#[derive(Clone, Debug, Default)]
pub struct NoopNotificationSink;

#[async_trait::async_trait]
impl NotificationSink for NoopNotificationSink {
    async fn deliver(&self, _event: &ApprovalEvent) -> Result<(), NotifyError> {
        Ok(())
    }
}

/// Test sink that records delivered events.
#[derive(Clone, Default)]
pub struct InMemoryNotificationSink {
    events: Arc<Mutex<Vec<ApprovalEvent>>>,
}

impl InMemoryNotificationSink {
    pub fn events(&self) -> Vec<ApprovalEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait::async_trait]
impl NotificationSink for InMemoryNotificationSink {
    async fn deliver(&self, event: &ApprovalEvent) -> Result<(), NotifyError> {
        match self.events.lock() {
            Ok(mut events) => events.push(event.clone()),
            Err(poisoned) => poisoned.into_inner().push(event.clone()),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use crate::domain::member::{MemberId, TenantId};
    use crate::domain::policy::ApproverRole;
    use crate::domain::request::{RequestKind, RequestRef};
    use crate::domain::step::{ApprovalStep, StepId, StepStatus};

    use super::{ApprovalEvent, InMemoryNotificationSink, NotificationSink};

    fn sample_step() -> ApprovalStep {
        let now = Utc::now();
        ApprovalStep {
            id: StepId("step-1".to_string()),
            tenant_id: TenantId("acme".to_string()),
            request: RequestRef::new(RequestKind::LeaveRequest, "lr-1"),
            level_order: 1,
            required_role: ApproverRole::Manager,
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

    #[tokio::test]
    async fn in_memory_sink_records_delivered_events() {
        let sink = InMemoryNotificationSink::default();
        let event = ApprovalEvent::ChainRejected {
            tenant_id: TenantId("acme".to_string()),
            request: RequestRef::new(RequestKind::LeaveRequest, "lr-1"),
            requester_id: MemberId("emp".to_string()),
            rejected_step: sample_step(),
        };

        sink.deliver(&event).await.expect("deliver");

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type(), "approval.chain_rejected");
        assert_eq!(events[0].request().id.0, "lr-1");
    }
}
