//! Per-test healing engine.
//!
//! One engine serves one test session and one driver. Guardrails, the heal
//! cache and history live in the shared [`HealState`], so concurrent tests
//! see each other's failures, approvals and blacklisted pairs.

use crate::approval::{ApprovalWorkflow, DecisionMaker};
use crate::cache::{ApplyAuthority, CacheSource, Fingerprint, HealVerdict, WithholdReason};
use crate::config::HealConfig;
use crate::error::HealError;
use crate::executor::{ActionExecutor, ExecutionReport};
use crate::generator::CandidateGenerator;
use crate::guardrail::{CircuitState, ReviewPolicy, TrustSnapshot};
use crate::history::{HealRecord, HealStatus};
use crate::reasoning::ReasoningService;
use crate::state::HealState;
use chrono::{DateTime, Utc};
use mend_common::{
    ApprovalDecision, Driver, ElementHandle, ElementSnapshot, HealProposal, Locator, StepRequest,
    TestContext,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// A heal that was applied to get a step through.
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedHeal {
    pub proposal: HealProposal,
    pub authority: ApplyAuthority,
    pub source: CacheSource,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    pub report: ExecutionReport,
    /// `None` when the recorded locator still worked.
    pub heal: Option<AppliedHeal>,
}

/// Summary of one test session, returned by [`HealingEngine::stop`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionReport {
    pub feature: String,
    pub scenario: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub steps: usize,
    pub heals_applied: usize,
    pub heals_withheld: usize,
    pub heal_failures: usize,
    pub healing_disabled: usize,
    pub trust: TrustSnapshot,
    pub circuit: CircuitState,
}

#[derive(Debug, Default)]
struct SessionStats {
    steps: usize,
    heals_applied: usize,
    heals_withheld: usize,
    heal_failures: usize,
    healing_disabled: usize,
}

#[derive(Debug)]
struct Session {
    context: TestContext,
    started_at: DateTime<Utc>,
    stats: SessionStats,
}

/// How a step that needed healing ended, for session stats.
enum HealTally {
    NotNeeded,
    Applied,
    Withheld,
    Failed,
    Disabled,
}

pub struct HealingEngine {
    state: Arc<HealState>,
    config: HealConfig,
    generator: CandidateGenerator,
    approval: ApprovalWorkflow,
    executor: ActionExecutor,
    session: Option<Session>,
}

impl HealingEngine {
    pub fn new(
        state: Arc<HealState>,
        config: HealConfig,
        decision_maker: Arc<dyn DecisionMaker>,
        reasoning: Option<Arc<dyn ReasoningService>>,
    ) -> Self {
        let generator = CandidateGenerator::new(config.generator.clone(), reasoning);
        let approval = ApprovalWorkflow::new(decision_maker, config.approval.timeout());
        let executor = ActionExecutor::new(config.executor.clone())
            .with_fuzzy_threshold(config.generator.fuzzy_threshold);
        Self {
            state,
            config,
            generator,
            approval,
            executor,
            session: None,
        }
    }

    pub fn state(&self) -> &Arc<HealState> {
        &self.state
    }

    pub fn is_started(&self) -> bool {
        self.session.is_some()
    }

    /// Begin a test session. Starting again replaces the previous session.
    pub fn start(&mut self, context: TestContext) {
        if let Some(previous) = &self.session {
            warn!(
                feature = %previous.context.feature,
                scenario = %previous.context.scenario,
                "Healing session restarted without stop"
            );
        }
        info!(feature = %context.feature, scenario = %context.scenario, "Healing session started");
        self.session = Some(Session {
            context,
            started_at: Utc::now(),
            stats: SessionStats::default(),
        });
    }

    pub fn stop(&mut self) -> Result<SessionReport, HealError> {
        let session = self.session.take().ok_or(HealError::NotStarted)?;
        let report = SessionReport {
            feature: session.context.feature,
            scenario: session.context.scenario,
            started_at: session.started_at,
            finished_at: Utc::now(),
            steps: session.stats.steps,
            heals_applied: session.stats.heals_applied,
            heals_withheld: session.stats.heals_withheld,
            heal_failures: session.stats.heal_failures,
            healing_disabled: session.stats.healing_disabled,
            trust: self.state.guardrails.trust_snapshot(),
            circuit: self.state.guardrails.circuit_state(),
        };
        info!(
            feature = %report.feature,
            scenario = %report.scenario,
            steps = report.steps,
            heals_applied = report.heals_applied,
            "Healing session stopped"
        );
        Ok(report)
    }

    /// Run a step: act on the recorded locator, or heal it and act on the
    /// replacement when it no longer resolves.
    pub async fn resolve_and_act<D: Driver + ?Sized>(
        &mut self,
        driver: &mut D,
        step: &StepRequest,
    ) -> Result<StepOutcome, HealError> {
        let context = match &self.session {
            Some(session) => session.context.clone(),
            None => return Err(HealError::NotStarted),
        };

        let (result, tally) = self.run_step(driver, step, &context).await;

        if let Some(session) = self.session.as_mut() {
            let stats = &mut session.stats;
            stats.steps += 1;
            match tally {
                HealTally::NotNeeded => {}
                HealTally::Applied => stats.heals_applied += 1,
                HealTally::Withheld => stats.heals_withheld += 1,
                HealTally::Failed => stats.heal_failures += 1,
                HealTally::Disabled => stats.healing_disabled += 1,
            }
        }
        result
    }

    async fn run_step<D: Driver + ?Sized>(
        &self,
        driver: &mut D,
        step: &StepRequest,
        context: &TestContext,
    ) -> (Result<StepOutcome, HealError>, HealTally) {
        if step.action.needs_input() && step.data.is_none() {
            return (Err(HealError::MissingActionData(step.action)), HealTally::NotNeeded);
        }
        let original: Locator = match step.locator.parse() {
            Ok(locator) => locator,
            Err(source) => {
                let err = HealError::InvalidLocator {
                    locator: step.locator.clone(),
                    source,
                };
                return (Err(err), HealTally::NotNeeded);
            }
        };
        let original_key = original.to_string();
        let data = step.data.as_deref();

        let found = match find_first(driver, &original).await {
            Ok(found) => found,
            Err(e) => return (Err(e), HealTally::NotNeeded),
        };
        if let Some(element) = found {
            self.state.guardrails.record_locator_success(&original_key);
            let result = self.act(driver, step, &element, data).await;
            return (
                result.map(|report| StepOutcome { report, heal: None }),
                HealTally::NotNeeded,
            );
        }

        self.state.guardrails.record_locator_failure(&original_key);
        let _permit = match self.state.guardrails.begin_heal() {
            Ok(permit) => permit,
            Err(rejection) => {
                warn!(
                    locator = %original_key,
                    state = ?rejection.state,
                    retry_after_secs = rejection.retry_after.as_secs(),
                    "Healing refused by circuit breaker"
                );
                let err = HealError::HealingDisabled {
                    retry_after: rejection.retry_after,
                };
                return (Err(err), HealTally::Disabled);
            }
        };

        let fingerprint = Fingerprint::compute(context, &step.step, &original);
        let heal_driver = &mut *driver;
        let failed = &original;
        let (verdict, source) = self
            .state
            .cache
            .resolve(&fingerprint, move || {
                self.decide(heal_driver, context, step, failed)
            })
            .await;
        debug!(fingerprint = %fingerprint, source = ?source, "Heal verdict resolved");

        let (proposal, authority) = match verdict {
            HealVerdict::Apply {
                proposal,
                authority,
            } => (proposal, authority),
            HealVerdict::Withhold { reason, .. } => {
                info!(locator = %original_key, reason = ?reason, "Heal withheld");
                let err = HealError::ElementNotFound {
                    locator: step.locator.clone(),
                };
                return (Err(err), HealTally::Withheld);
            }
        };

        // Remembered and joined verdicts may predate a blacklisting.
        let healed_key = proposal.proposed_locator.to_string();
        if self.state.guardrails.is_blacklisted(&original_key, &healed_key) {
            info!(
                original = %original_key,
                healed = %healed_key,
                source = ?source,
                "Heal pair blacklisted since it was decided, not applying"
            );
            self.state.cache.invalidate(&fingerprint);
            self.approval.notify_rejected(&proposal, "blacklisted").await;
            let record_id = self.state.history.record(HealRecord::pending(&proposal));
            self.state.history.settle(record_id, HealStatus::Blacklisted);
            self.state.guardrails.record_heal_failure();
            let err = HealError::ElementNotFound {
                locator: step.locator.clone(),
            };
            return (Err(err), HealTally::Withheld);
        }

        match self.apply(driver, step, &proposal).await {
            Ok(report) => {
                self.state.guardrails.record_heal_success(&original_key);
                info!(
                    original = %original_key,
                    healed = %proposal.proposed_locator,
                    authority = ?authority,
                    source = ?source,
                    "Heal applied"
                );
                self.capture_evidence(driver, &fingerprint).await;
                let heal = AppliedHeal {
                    proposal,
                    authority,
                    source,
                };
                (
                    Ok(StepOutcome {
                        report,
                        heal: Some(heal),
                    }),
                    HealTally::Applied,
                )
            }
            Err(e) => {
                warn!(
                    original = %original_key,
                    healed = %proposal.proposed_locator,
                    error = %e,
                    "Applied heal failed"
                );
                self.state.guardrails.record_heal_failure();
                if authority == ApplyAuthority::ApprovedAndRemembered {
                    self.state.cache.invalidate(&fingerprint);
                }
                (Err(e), HealTally::Failed)
            }
        }
    }

    async fn act<D: Driver + ?Sized>(
        &self,
        driver: &mut D,
        step: &StepRequest,
        element: &ElementHandle,
        data: Option<&str>,
    ) -> Result<ExecutionReport, HealError> {
        let snapshot = ElementSnapshot::capture(driver, element).await?;
        self.executor
            .perform(driver, step.action, element, &snapshot, data)
            .await
    }

    async fn apply<D: Driver + ?Sized>(
        &self,
        driver: &mut D,
        step: &StepRequest,
        proposal: &HealProposal,
    ) -> Result<ExecutionReport, HealError> {
        let element = find_first(driver, &proposal.proposed_locator)
            .await?
            .ok_or_else(|| HealError::ElementNotFound {
                locator: proposal.proposed_locator.to_string(),
            })?;
        self.act(driver, step, &element, step.data.as_deref()).await
    }

    /// Produce the verdict for a failed locator. Runs once per fingerprint at
    /// a time; records the guardrail outcome of every verdict that will not
    /// be applied.
    async fn decide<D: Driver + ?Sized>(
        &self,
        driver: &mut D,
        context: &TestContext,
        step: &StepRequest,
        original: &Locator,
    ) -> HealVerdict {
        let guardrails = &self.state.guardrails;

        let candidates = match self
            .generator
            .generate(driver, original, &step.intent, step.action)
            .await
        {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!(error = %e, "Candidate generation failed");
                Vec::new()
            }
        };
        if candidates.is_empty() {
            info!(locator = %original, "No replacement candidate found");
            guardrails.record_heal_failure();
            return HealVerdict::Withhold {
                proposal: None,
                reason: WithholdReason::NoCandidate,
            };
        }

        let original_key = original.to_string();
        let mut blacklisted = None;
        for candidate in &candidates {
            let proposal = HealProposal::from_candidate(context, &step.step, original, candidate);
            let record_id = self.state.history.record(HealRecord::pending(&proposal));
            let healed_key = proposal.proposed_locator.to_string();
            if guardrails.is_blacklisted(&original_key, &healed_key) {
                info!(original = %original_key, healed = %healed_key, "Candidate is blacklisted, auto-rejecting");
                self.approval.notify_rejected(&proposal, "blacklisted").await;
                self.state.history.settle(record_id, HealStatus::Blacklisted);
                blacklisted = Some(proposal);
                continue;
            }
            return self.review(record_id, proposal).await;
        }

        guardrails.record_heal_failure();
        HealVerdict::Withhold {
            proposal: blacklisted,
            reason: WithholdReason::Blacklisted,
        }
    }

    /// Route a proposal by trust level: apply it, ask for approval, or ask
    /// and log only.
    async fn review(&self, record_id: Uuid, proposal: HealProposal) -> HealVerdict {
        let policy = self.state.guardrails.review_policy(proposal.confidence);
        let original_key = proposal.original_locator.to_string();
        let healed_key = proposal.proposed_locator.to_string();
        info!(
            original = %original_key,
            healed = %healed_key,
            confidence = proposal.confidence,
            policy = ?policy,
            "Heal proposal ready"
        );

        match policy {
            ReviewPolicy::AutoApply => {
                self.approval.notify_auto_applied(&proposal).await;
                self.state.history.settle(record_id, HealStatus::Accepted);
                HealVerdict::Apply {
                    proposal,
                    authority: ApplyAuthority::Auto,
                }
            }
            ReviewPolicy::RequireApproval => {
                let decision = self.approval.request(&proposal).await;
                self.settle(record_id, proposal, decision)
            }
            ReviewPolicy::ShadowOnly => {
                let decision = self.approval.request(&proposal).await;
                self.settle_shadow(record_id, proposal, decision)
            }
        }
    }

    fn settle(&self, record_id: Uuid, proposal: HealProposal, decision: ApprovalDecision) -> HealVerdict {
        let guardrails = &self.state.guardrails;
        let history = &self.state.history;
        match decision {
            ApprovalDecision::Approve => {
                history.settle(record_id, HealStatus::Accepted);
                HealVerdict::Apply {
                    proposal,
                    authority: ApplyAuthority::Approved,
                }
            }
            ApprovalDecision::ApproveAndRemember => {
                history.settle(record_id, HealStatus::Accepted);
                HealVerdict::Apply {
                    proposal,
                    authority: ApplyAuthority::ApprovedAndRemembered,
                }
            }
            ApprovalDecision::Reject(reason) => {
                history.settle(record_id, HealStatus::Rejected);
                guardrails.record_heal_failure();
                HealVerdict::Withhold {
                    proposal: Some(proposal),
                    reason: WithholdReason::Rejected(reason),
                }
            }
            ApprovalDecision::RejectAndBlacklist(reason) => {
                self.blacklist(&proposal, &reason);
                history.settle(record_id, HealStatus::Blacklisted);
                guardrails.record_heal_failure();
                HealVerdict::Withhold {
                    proposal: Some(proposal),
                    reason: WithholdReason::Rejected(reason),
                }
            }
            ApprovalDecision::Skip => {
                guardrails.record_heal_neutral();
                HealVerdict::Withhold {
                    proposal: Some(proposal),
                    reason: WithholdReason::Skipped,
                }
            }
            ApprovalDecision::Timeout => {
                guardrails.record_heal_neutral();
                HealVerdict::Withhold {
                    proposal: Some(proposal),
                    reason: WithholdReason::TimedOut,
                }
            }
        }
    }

    /// Shadow mode: the decision is logged and moves trust, nothing is applied.
    fn settle_shadow(
        &self,
        record_id: Uuid,
        proposal: HealProposal,
        decision: ApprovalDecision,
    ) -> HealVerdict {
        let guardrails = &self.state.guardrails;
        let history = &self.state.history;
        match &decision {
            d if d.approves() => {
                history.settle(record_id, HealStatus::Accepted);
                guardrails.record_shadow_outcome(true);
            }
            ApprovalDecision::RejectAndBlacklist(reason) => {
                self.blacklist(&proposal, reason);
                history.settle(record_id, HealStatus::Blacklisted);
                guardrails.record_shadow_outcome(false);
            }
            ApprovalDecision::Reject(_) => {
                history.settle(record_id, HealStatus::Rejected);
                guardrails.record_shadow_outcome(false);
            }
            _ => guardrails.record_heal_neutral(),
        }
        info!(
            healed = %proposal.proposed_locator,
            decision = %decision,
            "Shadow mode: heal logged, not applied"
        );
        HealVerdict::Withhold {
            proposal: Some(proposal),
            reason: WithholdReason::Shadowed(decision),
        }
    }

    fn blacklist(&self, proposal: &HealProposal, reason: &str) {
        self.state.blacklist(
            &proposal.original_locator.to_string(),
            &proposal.proposed_locator.to_string(),
            reason,
        );
    }

    /// Best-effort screenshot of an applied heal.
    async fn capture_evidence<D: Driver + ?Sized>(&self, driver: &mut D, fingerprint: &Fingerprint) {
        let Some(dir) = self.config.storage.screenshot_dir.as_deref() else {
            return;
        };
        let bytes = match driver.screenshot().await {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!(error = %e, "Heal evidence screenshot unavailable");
                return;
            }
        };
        let file = format!(
            "heal-{}-{}.png",
            &fingerprint.as_str()[..12],
            Utc::now().format("%Y%m%dT%H%M%S%3f")
        );
        if let Err(e) = write_evidence(dir, &file, &bytes).await {
            warn!(error = %e, "Could not write heal evidence screenshot");
        }
    }
}

async fn find_first<D: Driver + ?Sized>(
    driver: &mut D,
    locator: &Locator,
) -> Result<Option<ElementHandle>, HealError> {
    match driver.find_elements(locator).await {
        Ok(found) => Ok(found.into_iter().next()),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn write_evidence(dir: &Path, file: &str, bytes: &[u8]) -> std::io::Result<()> {
    tokio::fs::create_dir_all(dir).await?;
    tokio::fs::write(dir.join(file), bytes).await
}
