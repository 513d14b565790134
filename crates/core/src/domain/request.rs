use serde::{Deserialize, Serialize};

/// The business modules whose requests can carry an approval chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    LeaveRequest,
    PurchaseRequest,
    AssetRequest,
}

impl RequestKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LeaveRequest => "leave_request",
            Self::PurchaseRequest => "purchase_request",
            Self::AssetRequest => "asset_request",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "leave_request" => Some(Self::LeaveRequest),
            "purchase_request" => Some(Self::PurchaseRequest),
            "asset_request" => Some(Self::AssetRequest),
            _ => None,
        }
    }

    /// Spend modules are thresholded by amount, leave by day count.
    pub fn thresholds_by_amount(&self) -> bool {
        matches!(self, Self::PurchaseRequest | Self::AssetRequest)
    }

    pub fn thresholds_by_days(&self) -> bool {
        matches!(self, Self::LeaveRequest)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub String);

/// Tagged reference to the request row owning an approval chain.
///
/// Requests live in one table per module, so approval steps point at them by
/// (kind, id) rather than a typed foreign key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestRef {
    pub kind: RequestKind,
    pub id: RequestId,
}

impl RequestRef {
    pub fn new(kind: RequestKind, id: impl Into<String>) -> Self {
        Self { kind, id: RequestId(id.into()) }
    }
}

impl std::fmt::Display for RequestRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.kind.as_str(), self.id.0)
    }
}
