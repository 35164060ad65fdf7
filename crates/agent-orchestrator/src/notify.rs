//! Notification policy for high-impact insights
//!
//! The engine never notifies on its own. Callers check each insight against
//! a [`NotificationPolicy`] and forward matches to a [`Notifier`].

use crate::error::Result;
use crate::synthesis::{Action, RiskLevel, SynthesizedInsight};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

/// Why an insight crossed the notification threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationReason {
    /// The recommendation is one of the configured actions
    Action(Action),
    /// The risk level reached the configured minimum
    Risk(RiskLevel),
}

impl fmt::Display for NotificationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Action(action) => write!(f, "recommendation {action}"),
            Self::Risk(level) => write!(f, "risk {level}"),
        }
    }
}

/// Thresholds that make an insight worth a notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationPolicy {
    /// Recommendations that trigger a notification
    pub actions: Vec<Action>,
    /// Risk level at or above which a notification is sent
    pub min_risk: RiskLevel,
    /// Consensus an action needs before it triggers
    pub min_consensus: f64,
}

impl Default for NotificationPolicy {
    fn default() -> Self {
        Self {
            actions: vec![Action::Buy, Action::Sell],
            min_risk: RiskLevel::High,
            min_consensus: 0.7,
        }
    }
}

impl NotificationPolicy {
    /// Reason to notify about `insight`, if any
    pub fn should_notify(&self, insight: &SynthesizedInsight) -> Option<NotificationReason> {
        if self.actions.contains(&insight.action_recommendation)
            && insight.agent_consensus >= self.min_consensus
        {
            return Some(NotificationReason::Action(insight.action_recommendation));
        }
        (insight.risk_level >= self.min_risk).then_some(NotificationReason::Risk(insight.risk_level))
    }
}

/// Delivery channel for notifications
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver one notification
    async fn notify(&self, insight: &SynthesizedInsight, reason: NotificationReason) -> Result<()>;

    /// Get the channel's name
    fn name(&self) -> &str;
}

/// Notifier that emits a warning-level log event
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(&self, insight: &SynthesizedInsight, reason: NotificationReason) -> Result<()> {
        warn!(
            ticker = %insight.ticker,
            %reason,
            action = %insight.action_recommendation,
            risk = %insight.risk_level,
            consensus = insight.agent_consensus,
            "high-impact insight"
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "tracing"
    }
}
