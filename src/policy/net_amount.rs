//! Net amount policy
//!
//! Approves transactions whose partner-reported net amount is below a
//! ceiling. Used by the CLI; library callers normally bring their own.

use super::ApprovalPolicy;
use crate::api::FeedMessage;
use crate::config::PolicySettings;
use async_trait::async_trait;

/// Policy that approves small transactions only
#[derive(Debug, Clone)]
pub struct NetAmountPolicy {
    /// Exclusive upper bound on `details.statusDetails.netAmount`
    max_net_amount: f64,
    /// Decision when the amount cannot be determined
    approve_without_details: bool,
}

impl NetAmountPolicy {
    /// Create a fail-closed policy
    ///
    /// # Arguments
    /// * `max_net_amount` - Transactions at or above this are rejected
    pub fn new(max_net_amount: f64) -> Self {
        Self {
            max_net_amount,
            approve_without_details: false,
        }
    }

    pub fn from_settings(settings: &PolicySettings) -> Self {
        Self {
            max_net_amount: settings.max_net_amount,
            approve_without_details: settings.approve_without_details,
        }
    }

    /// Net amount from the partner detail, numeric or numeric string
    fn net_amount(message: &FeedMessage) -> Option<f64> {
        let amount = message
            .details
            .as_ref()?
            .get("statusDetails")?
            .get("netAmount")?;
        amount
            .as_f64()
            .or_else(|| amount.as_str().and_then(|s| s.parse().ok()))
    }
}

#[async_trait]
impl ApprovalPolicy for NetAmountPolicy {
    async fn evaluate(&self, message: &FeedMessage) -> bool {
        match Self::net_amount(message) {
            Some(amount) => {
                let approve = amount < self.max_net_amount;
                tracing::info!(
                    action_id = %message.id,
                    net_amount = amount,
                    max_net_amount = self.max_net_amount,
                    approve = approve,
                    "Net amount policy evaluated"
                );
                approve
            }
            None => {
                tracing::warn!(
                    action_id = %message.id,
                    approve = self.approve_without_details,
                    "No net amount in transaction details"
                );
                self.approve_without_details
            }
        }
    }
}
