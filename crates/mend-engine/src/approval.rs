use async_trait::async_trait;
use mend_common::{ApprovalDecision, HealProposal};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

/// Whoever decides on heal proposals: a person at a prompt, an IDE plugin,
/// or a fixed policy in CI.
#[async_trait]
pub trait DecisionMaker: Send + Sync {
    async fn request_approval(&self, proposal: &HealProposal) -> ApprovalDecision;

    /// Called when a heal was applied without asking.
    async fn notify_auto_applied(&self, _proposal: &HealProposal) {}

    /// Called when a proposal was rejected without asking (blacklisted pair).
    async fn notify_rejected(&self, _proposal: &HealProposal, _reason: &str) {}
}

/// Bounds every approval request by a timeout.
#[derive(Clone)]
pub struct ApprovalWorkflow {
    maker: Arc<dyn DecisionMaker>,
    timeout: Duration,
}

impl ApprovalWorkflow {
    pub fn new(maker: Arc<dyn DecisionMaker>, timeout: Duration) -> Self {
        Self { maker, timeout }
    }

    /// Ask for a decision. When the timeout elapses the pending request is
    /// dropped and `Timeout` is returned.
    pub async fn request(&self, proposal: &HealProposal) -> ApprovalDecision {
        match tokio::time::timeout(self.timeout, self.maker.request_approval(proposal)).await {
            Ok(decision) => {
                info!(
                    proposed = %proposal.proposed_locator,
                    decision = %decision,
                    "Heal proposal decided"
                );
                decision
            }
            Err(_) => {
                warn!(
                    proposed = %proposal.proposed_locator,
                    timeout_secs = self.timeout.as_secs(),
                    "Heal approval timed out"
                );
                ApprovalDecision::Timeout
            }
        }
    }

    pub async fn notify_auto_applied(&self, proposal: &HealProposal) {
        self.maker.notify_auto_applied(proposal).await;
    }

    pub async fn notify_rejected(&self, proposal: &HealProposal, reason: &str) {
        self.maker.notify_rejected(proposal, reason).await;
    }
}

/// Answers every proposal the same way.
#[derive(Debug, Clone)]
pub struct StaticDecisionMaker {
    decision: ApprovalDecision,
}

impl StaticDecisionMaker {
    pub fn new(decision: ApprovalDecision) -> Self {
        Self { decision }
    }
}

#[async_trait]
impl DecisionMaker for StaticDecisionMaker {
    async fn request_approval(&self, _proposal: &HealProposal) -> ApprovalDecision {
        self.decision.clone()
    }
}

/// A pending proposal handed to an interactive collaborator.
#[derive(Debug)]
pub struct ApprovalRequest {
    pub proposal: HealProposal,
    pub reply: oneshot::Sender<ApprovalDecision>,
}

/// Forwards proposals over a channel and waits for the reply. A collaborator
/// that drops the reply sender, or a closed channel, counts as `Skip`.
#[derive(Debug, Clone)]
pub struct ChannelDecisionMaker {
    requests: mpsc::Sender<ApprovalRequest>,
}

impl ChannelDecisionMaker {
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<ApprovalRequest>) {
        let (requests, rx) = mpsc::channel(buffer.max(1));
        (Self { requests }, rx)
    }
}

#[async_trait]
impl DecisionMaker for ChannelDecisionMaker {
    async fn request_approval(&self, proposal: &HealProposal) -> ApprovalDecision {
        let (reply, response) = oneshot::channel();
        let request = ApprovalRequest {
            proposal: proposal.clone(),
            reply,
        };
        if self.requests.send(request).await.is_err() {
            warn!("Approval channel closed, skipping proposal");
            return ApprovalDecision::Skip;
        }
        response.await.unwrap_or(ApprovalDecision::Skip)
    }
}
