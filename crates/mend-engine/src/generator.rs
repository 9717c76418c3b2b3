//! Candidate discovery for a locator that no longer resolves.
//!
//! The generator scans the page for elements of the family the step acts on,
//! labels each one the way a user would read it, scores those labels against
//! the step intent and the words left in the failed locator, and derives a
//! fresh locator for every element worth proposing. The page is only read.

use crate::config::GeneratorConfig;
use crate::reasoning::{CandidateSummary, ReasoningRequest, ReasoningService};
use mend_common::locator::looks_auto_generated;
use mend_common::matcher::{MatchKind, MatchScore, MatchTarget, score_target};
use mend_common::snapshot::TEST_ID_ATTRIBUTE;
use mend_common::{ActionType, Driver, DriverError, ElementCandidate, ElementHandle, Locator};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Weight applied to matches against words recovered from the failed locator.
const HINT_WEIGHT: f64 = 0.9;

/// Upper bound on candidates described to the reasoning service.
const REASONING_CANDIDATE_LIMIT: usize = 20;

/// Kind of control a step acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementFamily {
    Clickable,
    TextInput,
    Selection,
    Submit,
}

impl ElementFamily {
    /// Family implied by the action, refined by hints in the failed locator
    /// for pointer actions (`#country-select` clicked is still a select).
    pub fn infer(action: ActionType, failed: &Locator) -> Self {
        let base = match action {
            ActionType::Click | ActionType::DoubleClick | ActionType::RightClick | ActionType::Hover => {
                ElementFamily::Clickable
            }
            ActionType::Type | ActionType::Clear => ElementFamily::TextInput,
            ActionType::Select => ElementFamily::Selection,
            ActionType::Submit => ElementFamily::Submit,
        };
        if base != ElementFamily::Clickable {
            return base;
        }

        let hints = failed.hint_words();
        let has = |words: &[&str]| hints.iter().any(|h| words.contains(&h.as_str()));
        if has(&["select", "dropdown", "combo", "combobox", "listbox"]) {
            ElementFamily::Selection
        } else if has(&["input", "field", "textbox", "textarea"]) {
            ElementFamily::TextInput
        } else {
            ElementFamily::Clickable
        }
    }

    /// CSS query selecting every element of the family.
    pub fn css_query(&self) -> &'static str {
        match self {
            ElementFamily::Clickable => {
                "button, a, input[type=\"button\"], input[type=\"submit\"], input[type=\"reset\"], \
                 [role=\"button\"], [role=\"link\"], [onclick]"
            }
            ElementFamily::TextInput => {
                "input:not([type]), input[type=\"text\"], input[type=\"email\"], \
                 input[type=\"password\"], input[type=\"search\"], input[type=\"tel\"], \
                 input[type=\"url\"], input[type=\"number\"], textarea, [contenteditable=\"true\"]"
            }
            ElementFamily::Selection => "select, [role=\"listbox\"], [role=\"combobox\"]",
            ElementFamily::Submit => {
                "button[type=\"submit\"], input[type=\"submit\"], button:not([type])"
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LabelSource {
    ForLabel,
    AriaLabel,
    Name,
    Text,
    Placeholder,
    Title,
    Value,
}

impl fmt::Display for LabelSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LabelSource::ForLabel => "label",
            LabelSource::AriaLabel => "aria-label",
            LabelSource::Name => "name",
            LabelSource::Text => "text",
            LabelSource::Placeholder => "placeholder",
            LabelSource::Title => "title",
            LabelSource::Value => "value",
        })
    }
}

/// What was read from one element on the page.
#[derive(Debug, Default)]
struct ElementReading {
    tag: String,
    id: Option<String>,
    name: Option<String>,
    aria_label: Option<String>,
    test_id: Option<String>,
    class: Option<String>,
    text: Option<String>,
    placeholder: Option<String>,
    title: Option<String>,
    value: Option<String>,
    for_label: Option<String>,
}

impl ElementReading {
    fn labels(&self) -> Vec<(LabelSource, &str)> {
        [
            (LabelSource::ForLabel, &self.for_label),
            (LabelSource::AriaLabel, &self.aria_label),
            (LabelSource::Name, &self.name),
            (LabelSource::Text, &self.text),
            (LabelSource::Placeholder, &self.placeholder),
            (LabelSource::Title, &self.title),
            (LabelSource::Value, &self.value),
        ]
        .into_iter()
        .filter_map(|(source, value)| value.as_deref().map(|v| (source, v)))
        .collect()
    }

    /// Locators the element supports, most stable first. Empty when it
    /// carries nothing better than its tag.
    fn locator_options(&self) -> Vec<Locator> {
        let mut options = Vec::new();
        if let Some(test_id) = &self.test_id {
            options.push(Locator::TestId(test_id.clone()));
        }
        if let Some(id) = &self.id
            && !looks_auto_generated(id)
        {
            options.push(Locator::Id(id.clone()));
        }
        if let Some(aria) = &self.aria_label {
            options.push(Locator::AriaLabel(aria.clone()));
        }
        if let Some(name) = &self.name {
            options.push(Locator::tag_with_attribute(&self.tag, "name", name));
        }
        if let Some(text) = &self.text {
            options.push(Locator::tag_with_text(&self.tag, text));
        }
        if let Some(class) = &self.class {
            let classes: Vec<&str> = class.split_whitespace().collect();
            if !classes.is_empty() {
                options.push(Locator::Css(format!("{}.{}", self.tag, classes.join("."))));
            }
        }
        options
    }
}

#[derive(Debug)]
struct Scored {
    reading: ElementReading,
    handle: ElementHandle,
    locator: Locator,
    score: MatchScore,
    confidence: f64,
    label: Option<String>,
    rationale: String,
}

pub struct CandidateGenerator {
    config: GeneratorConfig,
    reasoning: Option<Arc<dyn ReasoningService>>,
}

impl CandidateGenerator {
    pub fn new(config: GeneratorConfig, reasoning: Option<Arc<dyn ReasoningService>>) -> Self {
        Self { config, reasoning }
    }

    /// Scored replacement candidates for `failed`, best first. Empty when
    /// nothing on the page is a plausible replacement.
    pub async fn generate<D: Driver + ?Sized>(
        &self,
        driver: &mut D,
        failed: &Locator,
        intent: &str,
        action: ActionType,
    ) -> Result<Vec<ElementCandidate>, DriverError> {
        let family = ElementFamily::infer(action, failed);
        let hint = failed.hint_words().join(" ");
        let handles = driver
            .find_elements(&Locator::Css(family.css_query().to_string()))
            .await?;
        debug!(
            family = ?family,
            scanned = handles.len(),
            hint = %hint,
            "Scanning page for replacement candidates"
        );

        let mut scored = Vec::new();
        for handle in handles {
            let reading = match read_element(driver, &handle).await {
                Ok(reading) => reading,
                Err(e) if e.is_not_found() => {
                    debug!(element = %handle, "Element went stale during scan");
                    continue;
                }
                Err(e) => return Err(e),
            };
            let Some(locator) = unique_locator(driver, &reading, &handle, failed).await? else {
                debug!(element = %handle, tag = %reading.tag, "No locator singles out element");
                continue;
            };
            scored.push(self.score(reading, handle, locator, intent, &hint));
        }
        scored.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

        let mut accepted: Vec<usize> = scored
            .iter()
            .enumerate()
            .filter(|(_, s)| s.confidence >= self.config.min_confidence)
            .map(|(i, _)| i)
            .collect();

        let ambiguous = match accepted.as_slice() {
            [top, second, ..] => {
                scored[*top].confidence - scored[*second].confidence <= self.config.ambiguity_margin
            }
            _ => false,
        };
        if accepted.is_empty() || ambiguous {
            if let Some(pick) = self
                .consult_reasoning(driver, &mut scored, failed, intent, ambiguous)
                .await
            {
                accepted.retain(|&i| i != pick);
                accepted.insert(0, pick);
            }
        }

        accepted.truncate(self.config.max_candidates);
        let mut slots: Vec<Option<Scored>> = scored.into_iter().map(Some).collect();
        let candidates: Vec<ElementCandidate> = accepted
            .into_iter()
            .filter_map(|i| slots.get_mut(i).and_then(Option::take))
            .map(|s| ElementCandidate {
                locator: s.locator,
                confidence: s.confidence,
                rationale: s.rationale,
                match_kind: s.score.kind,
                label: s.label,
                handle: s.handle,
            })
            .collect();

        info!(
            failed = %failed,
            candidates = candidates.len(),
            top = candidates.first().map(|c| c.confidence).unwrap_or(0.0),
            "Candidate generation finished"
        );
        Ok(candidates)
    }

    fn score(
        &self,
        reading: ElementReading,
        handle: ElementHandle,
        locator: Locator,
        intent: &str,
        hint: &str,
    ) -> Scored {
        let mut best = MatchScore::NONE;
        let mut best_confidence = 0.0;
        let mut best_label: Option<(LabelSource, String, &'static str)> = None;

        for (source, label) in reading.labels() {
            let target = if source == LabelSource::Value {
                MatchTarget {
                    text: "",
                    value: Some(label),
                }
            } else {
                MatchTarget {
                    text: label,
                    value: None,
                }
            };
            for (query, weight, against) in [(intent, 1.0, "intent"), (hint, HINT_WEIGHT, "locator hint")] {
                let s = score_target(target, query, self.config.fuzzy_threshold);
                let weighted = s.confidence * weight;
                if s.is_match() && weighted > best_confidence {
                    best = s;
                    best_confidence = weighted;
                    best_label = Some((source, label.to_string(), against));
                }
            }
        }

        let (label, rationale) = match best_label {
            Some((source, text, against)) => (
                Some(text.clone()),
                format!(
                    "{} '{}' matched {} ({:?}, {:.2})",
                    source, text, against, best.kind, best_confidence
                ),
            ),
            None => (None, format!("{} element with no matching label", reading.tag)),
        };

        Scored {
            reading,
            handle,
            locator,
            score: best,
            confidence: best_confidence,
            label,
            rationale,
        }
    }

    /// Ask the reasoning service to pick among the scanned elements. Returns
    /// the index of an accepted pick after updating its score in place.
    async fn consult_reasoning<D: Driver + ?Sized>(
        &self,
        driver: &mut D,
        scored: &mut [Scored],
        failed: &Locator,
        intent: &str,
        ambiguous: bool,
    ) -> Option<usize> {
        let service = self.reasoning.as_ref().filter(|_| self.config.use_reasoning)?;
        if scored.is_empty() {
            return None;
        }

        let page_context = driver.page_context().await.unwrap_or_else(|e| {
            warn!(error = %e, "Could not read page context for reasoning");
            String::new()
        });
        let limit = scored.len().min(REASONING_CANDIDATE_LIMIT);
        let request = ReasoningRequest {
            page_context,
            intent: intent.to_string(),
            failed_locator: failed.to_string(),
            candidates: scored[..limit]
                .iter()
                .enumerate()
                .map(|(index, s)| CandidateSummary {
                    index,
                    locator: s.locator.to_string(),
                    tag: s.reading.tag.clone(),
                    label: s.label.clone(),
                    heuristic_confidence: s.confidence,
                })
                .collect(),
        };

        debug!(ambiguous, candidates = limit, "Consulting reasoning service");
        let suggestion =
            match tokio::time::timeout(self.config.reasoning_timeout(), service.suggest(&request)).await {
                Ok(Ok(suggestion)) => suggestion,
                Ok(Err(e)) => {
                    warn!(error = %e, "Reasoning service failed, using heuristics only");
                    return None;
                }
                Err(_) => {
                    warn!(
                        timeout_ms = self.config.reasoning_timeout_ms,
                        "Reasoning service timed out, using heuristics only"
                    );
                    return None;
                }
            };

        if suggestion.index >= limit {
            warn!(index = suggestion.index, "Reasoning pick out of range, ignored");
            return None;
        }
        if !(0.0..=1.0).contains(&suggestion.confidence) {
            warn!(
                confidence = suggestion.confidence,
                "Reasoning confidence outside [0, 1], ignored"
            );
            return None;
        }
        if suggestion.confidence < self.config.min_confidence {
            info!(
                confidence = suggestion.confidence,
                "Reasoning pick below minimum confidence, ignored"
            );
            return None;
        }

        let pick = &mut scored[suggestion.index];
        pick.confidence = suggestion.confidence;
        pick.rationale = format!("reasoning: {}", suggestion.rationale);
        if pick.score.kind == MatchKind::None {
            pick.score.confidence = suggestion.confidence;
        }
        info!(locator = %pick.locator, confidence = pick.confidence, "Reasoning service picked candidate");
        Some(suggestion.index)
    }
}

async fn read_element<D: Driver + ?Sized>(
    driver: &mut D,
    handle: &ElementHandle,
) -> Result<ElementReading, DriverError> {
    let tag = driver.tag_name(handle).await?.to_lowercase();
    let mut reading = ElementReading {
        tag,
        id: non_blank(driver.attribute(handle, "id").await?),
        name: non_blank(driver.attribute(handle, "name").await?),
        aria_label: non_blank(driver.attribute(handle, "aria-label").await?),
        test_id: non_blank(driver.attribute(handle, TEST_ID_ATTRIBUTE).await?),
        class: non_blank(driver.attribute(handle, "class").await?),
        text: non_blank(Some(driver.text(handle).await?)),
        placeholder: non_blank(driver.attribute(handle, "placeholder").await?),
        title: non_blank(driver.attribute(handle, "title").await?),
        value: non_blank(driver.attribute(handle, "value").await?),
        for_label: None,
    };

    if let Some(id) = &reading.id {
        let labels = driver
            .find_elements(&Locator::tag_with_attribute("label", "for", id))
            .await?;
        if let Some(label) = labels.first() {
            reading.for_label = non_blank(Some(driver.text(label).await?));
        }
    }
    Ok(reading)
}

/// The most stable of the element's locators that resolves to that element
/// alone. Acting on a locator shared with other elements would hit whichever
/// comes first in the document.
async fn unique_locator<D: Driver + ?Sized>(
    driver: &mut D,
    reading: &ElementReading,
    handle: &ElementHandle,
    failed: &Locator,
) -> Result<Option<Locator>, DriverError> {
    for locator in reading.locator_options() {
        if &locator == failed {
            continue;
        }
        match driver.find_elements(&locator).await {
            Ok(found) if found.as_slice() == std::slice::from_ref(handle) => return Ok(Some(locator)),
            Ok(found) => {
                debug!(locator = %locator, matches = found.len(), "Locator does not single out element");
            }
            Err(e) if e.is_not_found() || matches!(e, DriverError::InvalidSelector { .. }) => {
                debug!(locator = %locator, error = %e, "Locator unusable");
            }
            Err(e) => return Err(e),
        }
    }
    Ok(None)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
