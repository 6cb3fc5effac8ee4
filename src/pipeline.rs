//! Decision pipeline
//!
//! Consumes feed messages one at a time: enrich with partner detail when a
//! company is configured, ask the policy, then send exactly one approve or
//! reject for the action. Messages are never processed concurrently, so a
//! redelivered id that is still in the recent set is skipped.

use crate::api::{AgentActions, DetailSource, FeedMessage};
use crate::config::PipelineSettings;
use crate::policy::{evaluate_guarded, ApprovalPolicy};
use serde_json::Value;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Approve,
    Reject,
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Decision::Approve => f.write_str("approve"),
            Decision::Reject => f.write_str("reject"),
        }
    }
}

/// Bounded set of recently decided action ids, oldest evicted first
#[derive(Debug)]
pub struct RecentIds {
    capacity: usize,
    order: VecDeque<String>,
    ids: HashSet<String>,
}

impl RecentIds {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            order: VecDeque::with_capacity(capacity),
            ids: HashSet::with_capacity(capacity),
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Returns false if the id was already present
    pub fn insert(&mut self, id: &str) -> bool {
        if !self.ids.insert(id.to_string()) {
            return false;
        }
        self.order.push_back(id.to_string());
        if self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.ids.remove(&oldest);
            }
        }
        true
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

pub struct DecisionPipeline {
    actions: Arc<dyn AgentActions>,
    details: Arc<dyn DetailSource>,
    policy: Arc<dyn ApprovalPolicy>,
    company_id: Option<String>,
    policy_timeout: Duration,
    detail_timeout: Duration,
    decided: RecentIds,
}

impl DecisionPipeline {
    /// # Arguments
    /// * `actions` - Receives the approve/reject calls
    /// * `details` - Partner detail lookup, only used when `company_id` is set
    /// * `policy` - Caller-supplied decision function
    /// * `company_id` - Tenant for detail lookups
    /// * `settings` - Timeouts and duplicate window
    pub fn new(
        actions: Arc<dyn AgentActions>,
        details: Arc<dyn DetailSource>,
        policy: Arc<dyn ApprovalPolicy>,
        company_id: Option<String>,
        settings: &PipelineSettings,
    ) -> Self {
        Self {
            actions,
            details,
            policy,
            company_id,
            policy_timeout: settings.policy_timeout(),
            detail_timeout: settings.detail_timeout(),
            decided: RecentIds::new(settings.dedup_capacity),
        }
    }

    /// Process messages in arrival order until the feed side goes away
    pub async fn run(mut self, mut rx: mpsc::UnboundedReceiver<FeedMessage>) {
        while let Some(message) = rx.recv().await {
            self.process(message).await;
        }
        tracing::info!("Feed channel closed, pipeline stopped");
    }

    /// Decide one message. `None` when it was skipped as a duplicate.
    pub async fn process(&mut self, mut message: FeedMessage) -> Option<Decision> {
        let action_id = message.id.clone();

        if self.decided.contains(&action_id) {
            tracing::info!(action_id = %action_id, "Skipping already decided action");
            return None;
        }

        let decision = if message.is_expired() {
            tracing::warn!(
                action_id = %action_id,
                expire_time = message.expire_time,
                "Action expired before evaluation, rejecting"
            );
            Decision::Reject
        } else {
            message.details = self.fetch_details(&message).await;
            let outcome =
                evaluate_guarded(Arc::clone(&self.policy), message, self.policy_timeout).await;
            tracing::debug!(action_id = %action_id, outcome = ?outcome, "Policy evaluated");
            if outcome.approves() {
                Decision::Approve
            } else {
                Decision::Reject
            }
        };

        // Recorded before the call so a failed call is not retried on redelivery
        self.decided.insert(&action_id);

        let delivered = match decision {
            Decision::Approve => self.actions.approve(&action_id).await,
            Decision::Reject => self.actions.reject(&action_id).await,
        };
        if delivered {
            tracing::info!(action_id = %action_id, decision = %decision, "Decision sent");
        } else {
            tracing::warn!(
                action_id = %action_id,
                decision = %decision,
                "Decision call failed, not retrying"
            );
        }

        Some(decision)
    }

    async fn fetch_details(&self, message: &FeedMessage) -> Option<Value> {
        let company_id = self.company_id.as_deref()?;
        let resource = message.kind.resource();

        let lookup = self
            .details
            .transaction_details(company_id, resource, &message.id);
        match tokio::time::timeout(self.detail_timeout, lookup).await {
            Ok(Ok(details)) => {
                if details.is_none() {
                    tracing::debug!(action_id = %message.id, "No transaction details available");
                }
                details
            }
            Ok(Err(e)) => {
                tracing::warn!(action_id = %message.id, error = %e, "Detail lookup failed");
                None
            }
            Err(_) => {
                tracing::warn!(
                    action_id = %message.id,
                    timeout_secs = self.detail_timeout.as_secs_f64(),
                    "Detail lookup timed out"
                );
                None
            }
        }
    }
}
