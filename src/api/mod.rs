//! Clients for the two remote services
//!
//! The decision pipeline only sees the two traits below, so it can be driven
//! against in-memory fakes as well as the real HTTP clients.

mod agent;
mod http;
mod partner;
pub mod types;

use async_trait::async_trait;
use serde_json::Value;

pub use agent::AgentApiClient;
pub use partner::PartnerApiClient;
pub use types::{FeedMessage, RegisterRequest, RegisterResponse, ResourceKind, TransactionType};

/// Where approve/reject decisions are reported
#[async_trait]
pub trait AgentActions: Send + Sync {
    /// Returns false when the call did not succeed; failures are not retried
    async fn approve(&self, action_id: &str) -> bool;

    async fn reject(&self, action_id: &str) -> bool;
}

/// Source of per-transaction detail
#[async_trait]
pub trait DetailSource: Send + Sync {
    /// `Ok(None)` when the service has no answer; `Err` only when the
    /// request could not be made at all (e.g. signing failed)
    async fn transaction_details(
        &self,
        company_id: &str,
        resource: ResourceKind,
        transaction_id: &str,
    ) -> crate::Result<Option<Value>>;
}
