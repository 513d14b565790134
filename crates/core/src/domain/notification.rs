use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::member::{MemberId, TenantId};
use crate::domain::request::RequestRef;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NotificationId(pub String);

/// An in-app notification row addressed to a single member.
///
/// Written best-effort after an approval transition commits; a failed write
/// never rolls back the transition it describes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub tenant_id: TenantId,
    pub recipient_id: MemberId,
    pub request: RequestRef,
    pub title: String,
    pub body: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}
