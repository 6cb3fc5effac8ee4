//! Wire types shared by the agent service, the feed and the partner service.

use chrono::Utc;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Kind of pending transaction announced on the feed
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TransactionType {
    ApproveWithdraw,
    Transfer,
    Other(String),
}

impl From<String> for TransactionType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "ApproveWithdraw" => TransactionType::ApproveWithdraw,
            "Transfer" => TransactionType::Transfer,
            _ => TransactionType::Other(value),
        }
    }
}

impl From<TransactionType> for String {
    fn from(value: TransactionType) -> Self {
        match value {
            TransactionType::ApproveWithdraw => "ApproveWithdraw".to_string(),
            TransactionType::Transfer => "Transfer".to_string(),
            TransactionType::Other(other) => other,
        }
    }
}

impl TransactionType {
    /// Partner resource holding the details of this kind of transaction
    pub fn resource(&self) -> ResourceKind {
        match self {
            TransactionType::ApproveWithdraw => ResourceKind::Withdraw,
            _ => ResourceKind::Transfer,
        }
    }
}

/// Partner-service resource path segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Withdraw,
    Transfer,
}

impl ResourceKind {
    pub fn as_path(&self) -> &'static str {
        match self {
            ResourceKind::Withdraw => "withdraw",
            ResourceKind::Transfer => "transfer",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_path())
    }
}

/// A pending-transaction message from the feed
///
/// Known fields are typed; anything else the server sends is kept in
/// `extra` so the policy sees the full payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedMessage {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    #[serde(rename = "coreClientID", default, skip_serializing_if = "Option::is_none")]
    pub core_client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_seconds",
        skip_serializing_if = "Option::is_none"
    )]
    pub timestamp: Option<i64>,
    #[serde(
        rename = "expireTime",
        default,
        deserialize_with = "lenient_seconds",
        skip_serializing_if = "Option::is_none"
    )]
    pub expire_time: Option<i64>,
    /// Partner transaction detail, filled in by the pipeline
    #[serde(default)]
    pub details: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl FeedMessage {
    pub fn parse(payload: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(payload)?)
    }

    /// True when the server-announced expiry is already in the past
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now().timestamp())
    }

    pub fn is_expired_at(&self, now: i64) -> bool {
        matches!(self.expire_time, Some(expiry) if expiry > 0 && expiry <= now)
    }
}

/// Unix seconds sent as an integer, a float or a numeric string. Anything
/// else reads as absent instead of failing the whole message.
fn lenient_seconds<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(seconds_from_value))
}

fn seconds_from_value(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f as i64))
        }
        _ => None,
    }
}

/// Body of `POST /api/v1/register`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub apikey: String,
    pub base64privatekey: String,
}

/// Response of `POST /api/v1/register`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub agent_id: String,
}
