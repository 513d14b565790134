use serde::{Deserialize, Serialize};

use crate::domain::member::Member;
use crate::domain::policy::ApproverRole;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuthorizationDenial {
    MemberInactive { member_id: String },
    NotRequestersManager { member_id: String },
    MissingHrAccess { member_id: String },
    MissingFinanceAccess { member_id: String },
    DirectorRequiresAdmin { member_id: String },
    RoleCannotApprove { role: ApproverRole },
}

impl AuthorizationDenial {
    fn reason(&self) -> String {
        match self {
            Self::MemberInactive { member_id } => {
                format!("member `{member_id}` is inactive or removed")
            }
            Self::NotRequestersManager { member_id } => {
                format!("member `{member_id}` is not the requester's direct manager")
            }
            Self::MissingHrAccess { member_id } => {
                format!("member `{member_id}` does not have HR access")
            }
            Self::MissingFinanceAccess { member_id } => {
                format!("member `{member_id}` does not have finance access")
            }
            Self::DirectorRequiresAdmin { member_id } => {
                format!("director-level approval requires an admin; `{member_id}` is not one")
            }
            Self::RoleCannotApprove { role } => {
                format!("role `{}` cannot act as an approver", role.as_str())
            }
        }
    }
}

/// Outcome of asking whether a member may act on a step.
///
/// Denial is an ordinary value so callers can surface `reason` to the UI
/// without exception handling; only missing rows are errors, and those are
/// raised before authorization is evaluated.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationDecision {
    pub allowed: bool,
    pub reason: String,
    pub denial: Option<AuthorizationDenial>,
}

impl AuthorizationDecision {
    fn allow(reason: impl Into<String>) -> Self {
        Self { allowed: true, reason: reason.into(), denial: None }
    }

    fn deny(denial: AuthorizationDenial) -> Self {
        Self { allowed: false, reason: denial.reason(), denial: Some(denial) }
    }
}

/// Decide whether `actor` may resolve a step requiring `required_role` on a
/// request raised by `requester`.
///
/// Admins bypass every role check. MANAGER binds to the requester's
/// configured direct manager rather than to a flag, so the same member can be
/// a valid approver for one requester and not another.
pub fn authorize_step(
    actor: &Member,
    requester: &Member,
    required_role: ApproverRole,
) -> AuthorizationDecision {
    if !actor.can_act() {
        return AuthorizationDecision::deny(AuthorizationDenial::MemberInactive {
            member_id: actor.id.0.clone(),
        });
    }

    if actor.is_admin {
        return AuthorizationDecision::allow(format!(
            "member `{}` is an admin and bypasses role checks",
            actor.id.0
        ));
    }

    match required_role {
        ApproverRole::Manager => {
            if requester.manager_id.as_ref() == Some(&actor.id) {
                AuthorizationDecision::allow(format!(
                    "member `{}` is the requester's direct manager",
                    actor.id.0
                ))
            } else {
                AuthorizationDecision::deny(AuthorizationDenial::NotRequestersManager {
                    member_id: actor.id.0.clone(),
                })
            }
        }
        ApproverRole::HrManager => {
            if actor.has_hr_access {
                AuthorizationDecision::allow(format!("member `{}` has HR access", actor.id.0))
            } else {
                AuthorizationDecision::deny(AuthorizationDenial::MissingHrAccess {
                    member_id: actor.id.0.clone(),
                })
            }
        }
        ApproverRole::FinanceManager => {
            if actor.has_finance_access {
                AuthorizationDecision::allow(format!("member `{}` has finance access", actor.id.0))
            } else {
                AuthorizationDecision::deny(AuthorizationDenial::MissingFinanceAccess {
                    member_id: actor.id.0.clone(),
                })
            }
        }
        // Non-admins never reach an allow here; the admin bypass above is the
        // only path that satisfies a DIRECTOR step.
        ApproverRole::Director => {
            AuthorizationDecision::deny(AuthorizationDenial::DirectorRequiresAdmin {
                member_id: actor.id.0.clone(),
            })
        }
        ApproverRole::Employee => {
            AuthorizationDecision::deny(AuthorizationDenial::RoleCannotApprove {
                role: ApproverRole::Employee,
            })
        }
    }
}
