use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use signoff_core::domain::member::{ApproverContact, Member, MemberId, TenantId};
use signoff_core::domain::notification::{Notification, NotificationId};
use signoff_core::domain::policy::{ApprovalPolicy, ApproverRole, PolicyId};
use signoff_core::domain::request::{RequestKind, RequestRef};
use signoff_core::domain::step::{ApprovalDecision, ApprovalStep, StepId, StepStatus};

use super::{
    MemberDirectory, NotificationRepository, PolicyRepository, RepositoryError, StepRepository,
    StepResolution, TransitionReceipt,
};

#[derive(Default)]
pub struct InMemoryPolicyRepository {
    policies: RwLock<HashMap<String, ApprovalPolicy>>,
}

#[async_trait::async_trait]
impl PolicyRepository for InMemoryPolicyRepository {
    async fn find_by_id(&self, id: &PolicyId) -> Result<Option<ApprovalPolicy>, RepositoryError> {
        let policies = self.policies.read().await;
        Ok(policies.get(&id.0).cloned())
    }

    async fn list_active(
        &self,
        tenant: &TenantId,
        kind: RequestKind,
    ) -> Result<Vec<ApprovalPolicy>, RepositoryError> {
        let policies = self.policies.read().await;
        let mut listed: Vec<ApprovalPolicy> = policies
            .values()
            .filter(|policy| {
                policy.is_active && policy.tenant_id == *tenant && policy.kind == kind
            })
            .cloned()
            .collect();

        listed.sort_by(|left, right| {
            right
                .priority
                .cmp(&left.priority)
                .then_with(|| left.created_at.cmp(&right.created_at))
                .then_with(|| left.id.0.cmp(&right.id.0))
        });

        Ok(listed)
    }

    async fn count_for_kind(
        &self,
        tenant: &TenantId,
        kind: RequestKind,
    ) -> Result<i64, RepositoryError> {
        let policies = self.policies.read().await;
        Ok(policies
            .values()
            .filter(|policy| policy.tenant_id == *tenant && policy.kind == kind)
            .count() as i64)
    }

    async fn save(&self, policy: ApprovalPolicy) -> Result<(), RepositoryError> {
        let mut policies = self.policies.write().await;
        policies.insert(policy.id.0.clone(), policy);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryStepRepository {
    steps: RwLock<HashMap<String, ApprovalStep>>,
}

impl InMemoryStepRepository {
    fn steps_for<'a>(
        steps: &'a HashMap<String, ApprovalStep>,
        request: &RequestRef,
    ) -> Vec<&'a ApprovalStep> {
        let mut matching: Vec<&ApprovalStep> =
            steps.values().filter(|step| step.request == *request).collect();
        matching.sort_by_key(|step| step.level_order);
        matching
    }
}

#[async_trait::async_trait]
impl StepRepository for InMemoryStepRepository {
    async fn insert_chain(&self, chain: Vec<ApprovalStep>) -> Result<(), RepositoryError> {
        let mut steps = self.steps.write().await;
        for step in chain {
            steps.insert(step.id.0.clone(), step);
        }
        Ok(())
    }

    async fn find_by_id(&self, id: &StepId) -> Result<Option<ApprovalStep>, RepositoryError> {
        let steps = self.steps.read().await;
        Ok(steps.get(&id.0).cloned())
    }

    async fn list_for_request(
        &self,
        request: &RequestRef,
    ) -> Result<Vec<ApprovalStep>, RepositoryError> {
        let steps = self.steps.read().await;
        Ok(Self::steps_for(&steps, request).into_iter().cloned().collect())
    }

    async fn current_pending(
        &self,
        request: &RequestRef,
    ) -> Result<Option<ApprovalStep>, RepositoryError> {
        let steps = self.steps.read().await;
        Ok(Self::steps_for(&steps, request)
            .into_iter()
            .find(|step| step.status == StepStatus::Pending)
            .cloned())
    }

    async fn count_pending(&self, request: &RequestRef) -> Result<i64, RepositoryError> {
        let steps = self.steps.read().await;
        Ok(Self::steps_for(&steps, request)
            .into_iter()
            .filter(|step| step.status == StepStatus::Pending)
            .count() as i64)
    }

    async fn transition(
        &self,
        resolution: StepResolution,
    ) -> Result<TransitionReceipt, RepositoryError> {
        // The whole transition runs under one write lock, mirroring the SQL
        // implementation's single transaction.
        let mut steps = self.steps.write().await;

        let applied = match steps.get_mut(&resolution.step_id.0) {
            Some(step) if step.status == StepStatus::Pending => {
                step.status = resolution.decision.resolved_status();
                step.approver_id = Some(resolution.approver_id.clone());
                step.actioned_at = Some(resolution.actioned_at);
                step.notes = resolution.notes.clone();
                step.updated_at = resolution.actioned_at;
                true
            }
            _ => false,
        };

        if !applied {
            return Ok(TransitionReceipt { applied: false, skipped_steps: 0, remaining_pending: 0 });
        }

        let mut skipped_steps = 0;
        if resolution.decision == ApprovalDecision::Reject {
            for step in steps.values_mut() {
                if step.request == resolution.request && step.status == StepStatus::Pending {
                    step.status = StepStatus::Skipped;
                    step.updated_at = resolution.actioned_at;
                    skipped_steps += 1;
                }
            }
        }

        let remaining_pending = steps
            .values()
            .filter(|step| step.request == resolution.request)
            .filter(|step| step.status == StepStatus::Pending)
            .count() as i64;

        Ok(TransitionReceipt { applied: true, skipped_steps, remaining_pending })
    }

    async fn approve_all_pending(
        &self,
        request: &RequestRef,
        approver: &MemberId,
        notes: &str,
        actioned_at: DateTime<Utc>,
    ) -> Result<u64, RepositoryError> {
        let mut steps = self.steps.write().await;
        let mut updated = 0;

        for step in steps.values_mut() {
            if step.request == *request && step.status == StepStatus::Pending {
                step.status = StepStatus::Approved;
                step.approver_id = Some(approver.clone());
                step.actioned_at = Some(actioned_at);
                step.notes = Some(notes.to_string());
                step.updated_at = actioned_at;
                updated += 1;
            }
        }

        Ok(updated)
    }

    async fn delete_chain(&self, request: &RequestRef) -> Result<u64, RepositoryError> {
        let mut steps = self.steps.write().await;
        let before = steps.len();
        steps.retain(|_, step| step.request != *request);
        Ok((before - steps.len()) as u64)
    }
}

#[derive(Default)]
pub struct InMemoryMemberDirectory {
    members: RwLock<HashMap<String, Member>>,
}

impl InMemoryMemberDirectory {
    fn holds_role(member: &Member, role: ApproverRole) -> bool {
        match role {
            ApproverRole::HrManager => member.has_hr_access,
            ApproverRole::FinanceManager => member.has_finance_access,
            ApproverRole::Director => member.is_admin || member.is_owner,
            ApproverRole::Manager | ApproverRole::Employee => false,
        }
    }
}

#[async_trait::async_trait]
impl MemberDirectory for InMemoryMemberDirectory {
    async fn find_member(&self, id: &MemberId) -> Result<Option<Member>, RepositoryError> {
        let members = self.members.read().await;
        Ok(members.get(&id.0).cloned())
    }

    async fn save(&self, member: Member) -> Result<(), RepositoryError> {
        let mut members = self.members.write().await;
        members.insert(member.id.0.clone(), member);
        Ok(())
    }

    async fn has_approver_for_role(
        &self,
        role: ApproverRole,
        tenant: &TenantId,
        requester: &MemberId,
    ) -> Result<bool, RepositoryError> {
        Ok(!self.approvers_for_role(role, tenant, requester).await?.is_empty())
    }

    async fn approvers_for_role(
        &self,
        role: ApproverRole,
        tenant: &TenantId,
        requester: &MemberId,
    ) -> Result<Vec<ApproverContact>, RepositoryError> {
        let members = self.members.read().await;

        let mut contacts: Vec<ApproverContact> = match role {
            ApproverRole::Employee => Vec::new(),
            ApproverRole::Manager => members
                .get(&requester.0)
                .and_then(|requester| requester.manager_id.as_ref())
                .and_then(|manager_id| members.get(&manager_id.0))
                .filter(|manager| manager.can_act())
                .map(|manager| vec![ApproverContact::from(manager)])
                .unwrap_or_default(),
            role => members
                .values()
                .filter(|member| member.tenant_id == *tenant && member.id != *requester)
                .filter(|member| member.can_act())
                .filter(|member| Self::holds_role(member, role))
                .map(ApproverContact::from)
                .collect(),
        };

        contacts.sort_by(|left, right| left.name.cmp(&right.name));
        Ok(contacts)
    }
}

#[derive(Default)]
pub struct InMemoryNotificationRepository {
    notifications: RwLock<HashMap<String, Notification>>,
}

#[async_trait::async_trait]
impl NotificationRepository for InMemoryNotificationRepository {
    async fn insert_bulk(&self, batch: Vec<Notification>) -> Result<(), RepositoryError> {
        let mut notifications = self.notifications.write().await;
        for notification in batch {
            notifications.insert(notification.id.0.clone(), notification);
        }
        Ok(())
    }

    async fn list_for_recipient(
        &self,
        recipient: &MemberId,
        unread_only: bool,
    ) -> Result<Vec<Notification>, RepositoryError> {
        let notifications = self.notifications.read().await;
        let mut listed: Vec<Notification> = notifications
            .values()
            .filter(|notification| notification.recipient_id == *recipient)
            .filter(|notification| !unread_only || !notification.read)
            .cloned()
            .collect();

        listed.sort_by(|left, right| right.created_at.cmp(&left.created_at));
        Ok(listed)
    }

    async fn mark_read(&self, id: &NotificationId) -> Result<(), RepositoryError> {
        let mut notifications = self.notifications.write().await;
        if let Some(notification) = notifications.get_mut(&id.0) {
            notification.read = true;
        }
        Ok(())
    }
}
