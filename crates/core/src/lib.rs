pub mod audit;
pub mod authorize;
pub mod chain;
pub mod config;
pub mod domain;
pub mod errors;
pub mod events;
pub mod matcher;

pub use authorize::{authorize_step, AuthorizationDecision, AuthorizationDenial};
pub use chain::{plan_chain, summarize, PlannedStep};
pub use domain::member::{ApproverContact, Member, MemberId, TenantId};
pub use domain::notification::{Notification, NotificationId};
pub use domain::policy::{ApprovalLevel, ApprovalPolicy, ApproverRole, PolicyId};
pub use domain::request::{RequestId, RequestKind, RequestRef};
pub use domain::step::{
    ApprovalDecision, ApprovalStep, ChainStatus, ChainSummary, StepId, StepStatus,
};
pub use errors::{validate_step_transition, DomainError};
pub use events::{
    ApprovalEvent, InMemoryNotificationSink, NoopNotificationSink, NotificationSink, NotifyError,
};
pub use matcher::{select_policy, PolicyCriteria};

pub use chrono;
