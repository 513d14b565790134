use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::policy::ApprovalPolicy;

/// Threshold values extracted from the request being matched.
///
/// Leave requests carry `days`, spend requests carry `amount`. When neither
/// is supplied the first active policy wins outright (administrative "any
/// policy" lookup).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyCriteria {
    pub amount: Option<Decimal>,
    pub days: Option<Decimal>,
}

impl PolicyCriteria {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn for_amount(amount: Decimal) -> Self {
        Self { amount: Some(amount), days: None }
    }

    pub fn for_days(days: Decimal) -> Self {
        Self { amount: None, days: Some(days) }
    }
}

/// Select the single applicable policy for a request.
///
/// Candidates are filtered to active policies whose bounds contain the
/// threshold value, then ordered by priority descending and creation time
/// ascending, so the oldest of the highest-priority matches wins regardless
/// of input order. Returns `None` when no bounds contain the value; the
/// caller treats that as "no chain required".
pub fn select_policy<'a>(
    policies: &'a [ApprovalPolicy],
    criteria: &PolicyCriteria,
) -> Option<&'a ApprovalPolicy> {
    let mut matches: Vec<&ApprovalPolicy> = policies
        .iter()
        .filter(|policy| policy.is_active)
        .filter(|policy| bounds_contain(policy, criteria))
        .collect();

    matches.sort_by(|left, right| {
        right
            .priority
            .cmp(&left.priority)
            .then_with(|| left.created_at.cmp(&right.created_at))
            .then_with(|| left.id.0.cmp(&right.id.0))
    });

    matches.into_iter().next()
}

fn bounds_contain(policy: &ApprovalPolicy, criteria: &PolicyCriteria) -> bool {
    let value = if policy.kind.thresholds_by_days() { criteria.days } else { criteria.amount };

    let Some(value) = value else {
        // No threshold supplied: every active policy is a candidate.
        return true;
    };

    let (min, max) = if policy.kind.thresholds_by_days() {
        (policy.min_days, policy.max_days)
    } else {
        (policy.min_amount, policy.max_amount)
    };

    let above_min = value >= min.unwrap_or(Decimal::ZERO);
    let below_max = max.map_or(true, |max| value <= max);
    above_min && below_max
}
