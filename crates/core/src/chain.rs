use crate::domain::policy::{ApprovalLevel, ApproverRole};
use crate::domain::step::{ApprovalStep, ChainStatus, ChainSummary, StepStatus};

/// A level that survived eligibility pruning, renumbered for persistence.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlannedStep {
    pub level_order: u32,
    pub required_role: ApproverRole,
}

/// Expand a policy's ladder into the steps that will actually be persisted.
///
/// Levels whose role has no eligible approver are dropped, preserving the
/// relative order of the survivors; the survivors are renumbered 1..N so no
/// gaps reach storage. When every level is pruned, a single DIRECTOR step is
/// synthesized instead: an admin or owner always exists in a tenant, so the
/// chain can never be unapprovable.
pub fn plan_chain(
    levels: &[ApprovalLevel],
    mut eligible: impl FnMut(ApproverRole) -> bool,
) -> Vec<PlannedStep> {
    let mut ordered = levels.to_vec();
    ordered.sort_by_key(|level| level.level_order);

    let surviving: Vec<ApproverRole> = ordered
        .iter()
        .map(|level| level.required_role)
        .filter(|role| role.can_approve() && eligible(*role))
        .collect();

    let roles = if surviving.is_empty() { vec![ApproverRole::Director] } else { surviving };

    roles
        .into_iter()
        .enumerate()
        .map(|(index, required_role)| PlannedStep {
            level_order: index as u32 + 1,
            required_role,
        })
        .collect()
}

/// Roll one request's steps up into a chain summary.
///
/// REJECTED wins over everything and pins `current_step` to the rejected
/// rung; otherwise a chain with pending work reports the lowest pending rung;
/// otherwise a non-empty chain is APPROVED. `completed_steps` counts resolved
/// steps (approved, rejected, or skipped) under every branch.
pub fn summarize(steps: &[ApprovalStep]) -> ChainSummary {
    let total_steps = steps.len() as u32;
    let completed_steps = steps.iter().filter(|step| step.status.is_resolved()).count() as u32;

    if let Some(rejected) = steps.iter().find(|step| step.status == StepStatus::Rejected) {
        return ChainSummary {
            total_steps,
            completed_steps,
            current_step: Some(rejected.level_order),
            status: ChainStatus::Rejected,
        };
    }

    let lowest_pending = steps
        .iter()
        .filter(|step| step.status == StepStatus::Pending)
        .map(|step| step.level_order)
        .min();

    if let Some(order) = lowest_pending {
        return ChainSummary {
            total_steps,
            completed_steps,
            current_step: Some(order),
            status: ChainStatus::Pending,
        };
    }

    if total_steps == 0 {
        return ChainSummary {
            total_steps,
            completed_steps,
            current_step: None,
            status: ChainStatus::NotStarted,
        };
    }

    ChainSummary { total_steps, completed_steps, current_step: None, status: ChainStatus::Approved }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use crate::domain::member::TenantId;
    use crate::domain::policy::{ApprovalLevel, ApproverRole};
    use crate::domain::request::{RequestKind, RequestRef};
    use crate::domain::step::{ApprovalStep, ChainStatus, StepId, StepStatus};

    use super::{plan_chain, summarize};

    fn ladder(roles: &[ApproverRole]) -> Vec<ApprovalLevel> {
        roles
            .iter()
            .enumerate()
            .map(|(index, role)| ApprovalLevel {
                level_order: index as u32 + 1,
                required_role: *role,
            })
            .collect()
    }

    fn step(order: u32, status: StepStatus) -> ApprovalStep {
        let now = Utc::now();
        ApprovalStep {
            id: StepId(format!("step-{order}")),
            tenant_id: TenantId("acme".to_string()),
            request: RequestRef::new(RequestKind::LeaveRequest, "lr-1"),
            level_order: order,
            required_role: ApproverRole::Manager,
            status,
            approver_id: None,
            approver_name: None,
            approver_email: None,
            actioned_at: None,
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn drops_ineligible_levels_and_renumbers_contiguously() {
        let levels =
            ladder(&[ApproverRole::Manager, ApproverRole::HrManager, ApproverRole::Director]);

        let planned = plan_chain(&levels, |role| role != ApproverRole::HrManager);

        assert_eq!(planned.len(), 2);
        assert_eq!(planned[0].level_order, 1);
        assert_eq!(planned[0].required_role, ApproverRole::Manager);
        assert_eq!(planned[1].level_order, 2);
        assert_eq!(planned[1].required_role, ApproverRole::Director);
    }

    #[test]
    fn falls_back_to_a_single_director_step_when_nothing_survives() {
        let levels = ladder(&[ApproverRole::Manager, ApproverRole::HrManager]);

        let planned = plan_chain(&levels, |_| false);

        assert_eq!(planned.len(), 1);
        assert_eq!(planned[0].level_order, 1);
        assert_eq!(planned[0].required_role, ApproverRole::Director);
    }

    #[test]
    fn employee_levels_are_pruned_even_when_reported_eligible() {
        let levels = ladder(&[ApproverRole::Employee, ApproverRole::Manager]);

        let planned = plan_chain(&levels, |_| true);

        assert_eq!(planned.len(), 1);
        assert_eq!(planned[0].required_role, ApproverRole::Manager);
    }

    #[test]
    fn plan_respects_level_order_not_input_order() {
        let levels = vec![
            ApprovalLevel { level_order: 2, required_role: ApproverRole::HrManager },
            ApprovalLevel { level_order: 1, required_role: ApproverRole::Manager },
        ];

        let planned = plan_chain(&levels, |_| true);

        assert_eq!(planned[0].required_role, ApproverRole::Manager);
        assert_eq!(planned[1].required_role, ApproverRole::HrManager);
    }

    #[test]
    fn empty_chain_summarizes_as_not_started() {
        let summary = summarize(&[]);
        assert_eq!(summary.status, ChainStatus::NotStarted);
        assert_eq!(summary.total_steps, 0);
        assert_eq!(summary.current_step, None);
    }

    #[test]
    fn pending_chain_points_at_lowest_pending_rung() {
        let steps = vec![
            step(1, StepStatus::Approved),
            step(2, StepStatus::Pending),
            step(3, StepStatus::Pending),
        ];

        let summary = summarize(&steps);
        assert_eq!(summary.status, ChainStatus::Pending);
        assert_eq!(summary.current_step, Some(2));
        assert_eq!(summary.completed_steps, 1);
        assert_eq!(summary.total_steps, 3);
    }

    #[test]
    fn rejection_wins_and_pins_current_step() {
        let steps = vec![
            step(1, StepStatus::Approved),
            step(2, StepStatus::Rejected),
            step(3, StepStatus::Skipped),
        ];

        let summary = summarize(&steps);
        assert_eq!(summary.status, ChainStatus::Rejected);
        assert_eq!(summary.current_step, Some(2));
        assert_eq!(summary.completed_steps, 3);
    }

    #[test]
    fn fully_approved_chain_summarizes_as_approved() {
        let steps = vec![step(1, StepStatus::Approved), step(2, StepStatus::Approved)];

        let summary = summarize(&steps);
        assert_eq!(summary.status, ChainStatus::Approved);
        assert_eq!(summary.current_step, None);
        assert_eq!(summary.completed_steps, 2);
    }
}
