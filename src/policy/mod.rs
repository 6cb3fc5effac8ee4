//! Approval policy seam
//!
//! The operator supplies the decision function; the pipeline only awaits a
//! boolean. Evaluation runs on its own task under a time limit so a slow or
//! panicking policy turns into a reject instead of a silent approval.

mod net_amount;

use crate::api::FeedMessage;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

pub use net_amount::NetAmountPolicy;

/// Caller-defined decision: `true` approves, `false` rejects
#[async_trait]
pub trait ApprovalPolicy: Send + Sync {
    async fn evaluate(&self, message: &FeedMessage) -> bool;
}

/// Adapter for plain async closures
pub struct PolicyFn<F> {
    f: F,
}

/// Wrap `async |message| -> bool` as a policy
pub fn policy_fn<F, Fut>(f: F) -> PolicyFn<F>
where
    F: Fn(FeedMessage) -> Fut + Send + Sync,
    Fut: Future<Output = bool> + Send,
{
    PolicyFn { f }
}

#[async_trait]
impl<F, Fut> ApprovalPolicy for PolicyFn<F>
where
    F: Fn(FeedMessage) -> Fut + Send + Sync,
    Fut: Future<Output = bool> + Send,
{
    async fn evaluate(&self, message: &FeedMessage) -> bool {
        (self.f)(message.clone()).await
    }
}

/// Used when no policy was supplied
#[derive(Debug, Clone, Copy, Default)]
pub struct RejectAll;

#[async_trait]
impl ApprovalPolicy for RejectAll {
    async fn evaluate(&self, _message: &FeedMessage) -> bool {
        false
    }
}

/// How a guarded evaluation ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyOutcome {
    Approved,
    Rejected,
    TimedOut,
    Failed,
}

impl PolicyOutcome {
    /// Only an explicit `true` from the policy approves
    pub fn approves(&self) -> bool {
        matches!(self, PolicyOutcome::Approved)
    }
}

/// Run `policy` on its own task, bounded by `limit`
pub async fn evaluate_guarded(
    policy: Arc<dyn ApprovalPolicy>,
    message: FeedMessage,
    limit: Duration,
) -> PolicyOutcome {
    let action_id = message.id.clone();
    let mut task = tokio::spawn(async move { policy.evaluate(&message).await });

    match tokio::time::timeout(limit, &mut task).await {
        Ok(Ok(true)) => PolicyOutcome::Approved,
        Ok(Ok(false)) => PolicyOutcome::Rejected,
        Ok(Err(e)) => {
            tracing::error!(action_id = %action_id, error = %e, "Approval policy failed");
            PolicyOutcome::Failed
        }
        Err(_) => {
            task.abort();
            tracing::warn!(
                action_id = %action_id,
                timeout_secs = limit.as_secs_f64(),
                "Approval policy timed out"
            );
            PolicyOutcome::TimedOut
        }
    }
}
