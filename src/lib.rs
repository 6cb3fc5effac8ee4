//! Signing Agent Client
//!
//! Client side of a policy-in-the-loop transaction signing protocol:
//! - Registers an agent identity with the custody service
//! - Keeps a reconnecting WebSocket feed of pending approvals
//! - Enriches each approval with signed partner API lookups
//! - Asks a caller-supplied policy and reports approve or reject
//!
//! # Security Model
//!
//! - Partner requests are signed with RSA PKCS#1 v1.5 over SHA-256 of
//!   `timestamp ++ url ++ body`
//! - The private key and API key are never logged
//! - Anything other than an explicit approval from the policy is a reject

pub mod api;
pub mod config;
pub mod feed;
pub mod pipeline;
pub mod policy;
pub mod session;
pub mod signing;

mod error;

// Re-export commonly used types
pub use api::{AgentActions, DetailSource, FeedMessage, TransactionType};
pub use config::Config;
pub use error::{Error, Result};
pub use pipeline::Decision;
pub use policy::{policy_fn, ApprovalPolicy, NetAmountPolicy, RejectAll};
pub use session::{AgentIdentity, AgentSession};
pub use signing::{CanonicalSigner, RequestKey};
