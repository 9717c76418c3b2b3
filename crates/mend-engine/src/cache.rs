//! Single-flight heal cache.
//!
//! Concurrent steps failing on the same locator in the same test share one
//! heal computation: the first caller leads, the others wait on a `watch`
//! channel for its verdict. Only verdicts approved with "remember" outlive
//! the computation.

use mend_common::{ApprovalDecision, HealProposal, Locator, TestContext};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::watch;
use tracing::debug;

/// SHA-256 over the test context, step and original locator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn compute(context: &TestContext, step: &str, original: &Locator) -> Self {
        let mut hasher = Sha256::new();
        for part in [
            context.feature.as_str(),
            context.scenario.as_str(),
            step,
            &original.to_string(),
        ] {
            hasher.update(part.as_bytes());
            hasher.update([0u8]);
        }
        Fingerprint(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApplyAuthority {
    /// Trust level allowed the heal without review.
    Auto,
    Approved,
    ApprovedAndRemembered,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WithholdReason {
    NoCandidate,
    Blacklisted,
    Rejected(String),
    /// Shadow mode records the decision but never applies.
    Shadowed(ApprovalDecision),
    Skipped,
    TimedOut,
}

#[derive(Debug, Clone, PartialEq)]
pub enum HealVerdict {
    Apply {
        proposal: HealProposal,
        authority: ApplyAuthority,
    },
    Withhold {
        proposal: Option<HealProposal>,
        reason: WithholdReason,
    },
}

impl HealVerdict {
    pub fn proposal(&self) -> Option<&HealProposal> {
        match self {
            HealVerdict::Apply { proposal, .. } => Some(proposal),
            HealVerdict::Withhold { proposal, .. } => proposal.as_ref(),
        }
    }

    fn is_remembered(&self) -> bool {
        matches!(
            self,
            HealVerdict::Apply {
                authority: ApplyAuthority::ApprovedAndRemembered,
                ..
            }
        )
    }
}

/// Where a verdict handed out by [`HealCache::resolve`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
    Computed,
    Joined,
    Remembered,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RememberedHeal {
    pub fingerprint: Fingerprint,
    pub proposal: HealProposal,
}

#[derive(Debug, Default)]
struct CacheInner {
    in_flight: HashMap<Fingerprint, watch::Receiver<Option<HealVerdict>>>,
    remembered: HashMap<Fingerprint, HealProposal>,
}

#[derive(Debug, Default)]
pub struct HealCache {
    inner: Mutex<CacheInner>,
}

/// Clears the in-flight slot if the leading computation is dropped before it
/// publishes, which wakes joiners with a closed channel.
struct LeaderSlot<'a> {
    cache: &'a HealCache,
    fingerprint: &'a Fingerprint,
    armed: bool,
}

impl Drop for LeaderSlot<'_> {
    fn drop(&mut self) {
        if self.armed {
            debug!(fingerprint = %self.fingerprint, "Heal computation abandoned");
            self.cache.lock().in_flight.remove(self.fingerprint);
        }
    }
}

impl HealCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, CacheInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Return the verdict for `fingerprint`, running `compute` only when no
    /// remembered verdict exists and no other caller is already computing.
    pub async fn resolve<F, Fut>(&self, fingerprint: &Fingerprint, compute: F) -> (HealVerdict, CacheSource)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = HealVerdict>,
    {
        let tx = loop {
            let mut rx = {
                let mut inner = self.lock();
                if let Some(proposal) = inner.remembered.get(fingerprint) {
                    let verdict = HealVerdict::Apply {
                        proposal: proposal.clone(),
                        authority: ApplyAuthority::ApprovedAndRemembered,
                    };
                    return (verdict, CacheSource::Remembered);
                }
                match inner.in_flight.get(fingerprint) {
                    Some(rx) => rx.clone(),
                    None => {
                        let (tx, rx) = watch::channel(None);
                        inner.in_flight.insert(fingerprint.clone(), rx);
                        break tx;
                    }
                }
            };

            let published = rx.wait_for(Option::is_some).await.map(|v| (*v).clone());
            match published {
                Ok(Some(verdict)) => return (verdict, CacheSource::Joined),
                _ => {
                    debug!(fingerprint = %fingerprint, "Leader went away, retrying heal");
                }
            }
        };

        let mut slot = LeaderSlot {
            cache: self,
            fingerprint,
            armed: true,
        };
        let verdict = compute().await;

        {
            let mut inner = self.lock();
            if verdict.is_remembered()
                && let Some(proposal) = verdict.proposal()
            {
                inner.remembered.insert(fingerprint.clone(), proposal.clone());
            }
            tx.send_replace(Some(verdict.clone()));
            inner.in_flight.remove(fingerprint);
        }
        slot.armed = false;

        (verdict, CacheSource::Computed)
    }

    /// Forget a remembered heal, e.g. when its locator stopped resolving.
    pub fn invalidate(&self, fingerprint: &Fingerprint) -> bool {
        let removed = self.lock().remembered.remove(fingerprint).is_some();
        if removed {
            debug!(fingerprint = %fingerprint, "Remembered heal invalidated");
        }
        removed
    }

    /// Forget every remembered heal that maps `original` to `healed`.
    pub fn forget_pair(&self, original: &str, healed: &str) -> usize {
        let mut inner = self.lock();
        let before = inner.remembered.len();
        inner.remembered.retain(|_, proposal| {
            proposal.original_locator.to_string() != original
                || proposal.proposed_locator.to_string() != healed
        });
        let forgotten = before - inner.remembered.len();
        if forgotten > 0 {
            debug!(original, healed, forgotten, "Remembered heals for blacklisted pair dropped");
        }
        forgotten
    }

    pub fn clear(&self) {
        self.lock().remembered.clear();
    }

    pub fn remembered(&self) -> Vec<RememberedHeal> {
        let mut all: Vec<_> = self
            .lock()
            .remembered
            .iter()
            .map(|(fingerprint, proposal)| RememberedHeal {
                fingerprint: fingerprint.clone(),
                proposal: proposal.clone(),
            })
            .collect();
        all.sort_by(|a, b| a.fingerprint.cmp(&b.fingerprint));
        all
    }

    pub fn remember(&self, heal: RememberedHeal) {
        self.lock().remembered.insert(heal.fingerprint, heal.proposal);
    }

    pub fn is_remembered(&self, fingerprint: &Fingerprint) -> bool {
        self.lock().remembered.contains_key(fingerprint)
    }

    pub fn in_flight_count(&self) -> usize {
        self.lock().in_flight.len()
    }
}
