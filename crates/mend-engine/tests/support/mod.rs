#![allow(dead_code)]

use async_trait::async_trait;
use mend_engine::approval::DecisionMaker;
use mend_engine::reasoning::{
    ReasoningError, ReasoningRequest, ReasoningService, ReasoningSuggestion,
};
use mend_engine::{
    ApprovalDecision, Driver, DriverError, ElementHandle, HealConfig, HealProposal, HealState,
    HealingEngine, Locator, SelectOption, TestContext,
};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ============================================================
// Fake page
// ============================================================

#[derive(Debug, Clone, Default)]
pub struct FakeElement {
    pub tag: String,
    pub attrs: BTreeMap<String, String>,
    pub text: String,
    pub options: Vec<SelectOption>,
    pub selected: Option<String>,
    pub detached: bool,
    failing: HashSet<String>,
}

impl FakeElement {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
            ..Default::default()
        }
    }

    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attrs.insert(name.to_string(), value.to_string());
        self
    }

    pub fn text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }

    pub fn option(mut self, text: &str, value: &str) -> Self {
        self.options.push(SelectOption {
            text: text.to_string(),
            value: value.to_string(),
        });
        self
    }

    /// Make an interaction (`click`, `pointer_click`, `type`, `script`, ...) fail.
    pub fn fail_on(mut self, action: &str) -> Self {
        self.failing.insert(action.to_string());
        self
    }
}

/// In-memory page implementing just enough CSS and XPath for the locators
/// the engine produces.
#[derive(Debug, Clone, Default)]
pub struct FakePage {
    pub elements: Vec<FakeElement>,
    /// Every locator passed to `find_elements`, in order.
    pub queries: Vec<Locator>,
    /// Successful interactions as `"<action> <handle>"`.
    pub actions: Vec<String>,
    pub scripts: Vec<String>,
    pub screenshots: usize,
}

impl FakePage {
    pub fn new(elements: Vec<FakeElement>) -> Self {
        Self {
            elements,
            ..Default::default()
        }
    }

    pub fn handle(index: usize) -> ElementHandle {
        ElementHandle::new(format!("e{}", index))
    }

    pub fn detach(&mut self, index: usize) {
        self.elements[index].detached = true;
    }

    pub fn element(&self, index: usize) -> &FakeElement {
        &self.elements[index]
    }

    /// Queries other than the given locator, i.e. healing work.
    pub fn queries_except(&self, locator: &Locator) -> usize {
        self.queries.iter().filter(|q| *q != locator).count()
    }

    fn index(&self, handle: &ElementHandle) -> Result<usize, DriverError> {
        let index = handle
            .id()
            .strip_prefix('e')
            .and_then(|n| n.parse::<usize>().ok())
            .filter(|i| *i < self.elements.len())
            .ok_or_else(|| DriverError::NoSuchElement(handle.to_string()))?;
        if self.elements[index].detached {
            return Err(DriverError::StaleElement(handle.to_string()));
        }
        Ok(index)
    }

    fn interact(&mut self, handle: &ElementHandle, action: &str) -> Result<usize, DriverError> {
        let index = self.index(handle)?;
        if self.elements[index].failing.contains(action) {
            return Err(DriverError::NotInteractable {
                handle: handle.to_string(),
                reason: format!("{} intercepted", action),
            });
        }
        self.actions.push(format!("{} {}", action, handle));
        Ok(index)
    }

    fn matches(&self, element: &FakeElement, locator: &Locator) -> Result<bool, DriverError> {
        let attr = |name: &str, value: &str| element.attrs.get(name).map(String::as_str) == Some(value);
        Ok(match locator {
            Locator::Id(v) => attr("id", v.as_str()),
            Locator::Name(v) => attr("name", v.as_str()),
            Locator::TestId(v) => attr("data-testid", v.as_str()),
            Locator::AriaLabel(v) => attr("aria-label", v.as_str()),
            Locator::Css(css) => css
                .split(',')
                .map(|part| parse_compound(part.trim()))
                .collect::<Option<Vec<_>>>()
                .ok_or_else(|| DriverError::InvalidSelector {
                    selector: css.clone(),
                })?
                .iter()
                .any(|compound| compound.matches(element)),
            Locator::XPath(xpath) => {
                let (tag, text) =
                    parse_text_xpath(xpath).ok_or_else(|| DriverError::InvalidSelector {
                        selector: xpath.clone(),
                    })?;
                (tag == "*" || tag == element.tag) && normalize(&element.text) == text
            }
        })
    }
}

fn normalize(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[derive(Debug, Default)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attrs: Vec<(String, Option<String>)>,
    without: Vec<String>,
}

impl Compound {
    fn matches(&self, el: &FakeElement) -> bool {
        self.tag.as_ref().is_none_or(|t| *t == el.tag)
            && self
                .id
                .as_ref()
                .is_none_or(|id| el.attrs.get("id") == Some(id))
            && self.classes.iter().all(|c| {
                el.attrs
                    .get("class")
                    .is_some_and(|cls| cls.split_whitespace().any(|x| x == c))
            })
            && self.attrs.iter().all(|(name, value)| match value {
                Some(v) => el.attrs.get(name) == Some(v),
                None => el.attrs.contains_key(name),
            })
            && self.without.iter().all(|name| !el.attrs.contains_key(name))
    }
}

fn ident(chars: &[char], pos: &mut usize) -> String {
    let start = *pos;
    while *pos < chars.len() && (chars[*pos].is_alphanumeric() || "-_".contains(chars[*pos])) {
        *pos += 1;
    }
    chars[start..*pos].iter().collect()
}

/// `[name]` or `[name="value"]`, starting at the opening bracket.
fn attribute(chars: &[char], pos: &mut usize) -> Option<(String, Option<String>)> {
    *pos += 1;
    let name = ident(chars, pos);
    match chars.get(*pos)? {
        ']' => {
            *pos += 1;
            Some((name, None))
        }
        '=' => {
            *pos += 1;
            if chars.get(*pos)? != &'"' {
                return None;
            }
            *pos += 1;
            let mut value = String::new();
            loop {
                match chars.get(*pos)? {
                    '\\' => {
                        value.push(*chars.get(*pos + 1)?);
                        *pos += 2;
                    }
                    '"' => {
                        *pos += 1;
                        break;
                    }
                    c => {
                        value.push(*c);
                        *pos += 1;
                    }
                }
            }
            if chars.get(*pos)? != &']' {
                return None;
            }
            *pos += 1;
            Some((name, Some(value)))
        }
        _ => None,
    }
}

fn parse_compound(s: &str) -> Option<Compound> {
    let chars: Vec<char> = s.chars().collect();
    let mut pos = 0;
    let mut compound = Compound::default();
    if chars.first().is_some_and(|c| c.is_alphabetic()) {
        compound.tag = Some(ident(&chars, &mut pos).to_lowercase());
    }
    while pos < chars.len() {
        match chars[pos] {
            '#' => {
                pos += 1;
                compound.id = Some(ident(&chars, &mut pos));
            }
            '.' => {
                pos += 1;
                compound.classes.push(ident(&chars, &mut pos));
            }
            '[' => compound.attrs.push(attribute(&chars, &mut pos)?),
            ':' => {
                let rest: String = chars[pos..].iter().collect();
                if !rest.starts_with(":not([") {
                    return None;
                }
                pos += ":not(".len();
                let (name, value) = attribute(&chars, &mut pos)?;
                if value.is_some() || chars.get(pos)? != &')' {
                    return None;
                }
                pos += 1;
                compound.without.push(name);
            }
            _ => return None,
        }
    }
    Some(compound)
}

/// `//tag[normalize-space(.)='text']` with either quote kind.
fn parse_text_xpath(xpath: &str) -> Option<(String, String)> {
    let rest = xpath.strip_prefix("//")?;
    let (tag, rest) = rest.split_once("[normalize-space(.)=")?;
    let literal = rest.strip_suffix(']')?;
    let text = literal
        .strip_prefix('\'')
        .and_then(|l| l.strip_suffix('\''))
        .or_else(|| literal.strip_prefix('"').and_then(|l| l.strip_suffix('"')))?;
    Some((tag.to_string(), text.to_string()))
}

#[async_trait]
impl Driver for FakePage {
    async fn find_elements(&mut self, locator: &Locator) -> Result<Vec<ElementHandle>, DriverError> {
        self.queries.push(locator.clone());
        let mut found = Vec::new();
        for (i, element) in self.elements.iter().enumerate() {
            if !element.detached && self.matches(element, locator)? {
                found.push(FakePage::handle(i));
            }
        }
        Ok(found)
    }

    async fn attribute(
        &mut self,
        element: &ElementHandle,
        name: &str,
    ) -> Result<Option<String>, DriverError> {
        let i = self.index(element)?;
        Ok(self.elements[i].attrs.get(name).cloned())
    }

    async fn text(&mut self, element: &ElementHandle) -> Result<String, DriverError> {
        let i = self.index(element)?;
        Ok(self.elements[i].text.clone())
    }

    async fn tag_name(&mut self, element: &ElementHandle) -> Result<String, DriverError> {
        let i = self.index(element)?;
        Ok(self.elements[i].tag.clone())
    }

    async fn click(&mut self, element: &ElementHandle) -> Result<(), DriverError> {
        self.interact(element, "click").map(|_| ())
    }

    async fn double_click(&mut self, element: &ElementHandle) -> Result<(), DriverError> {
        self.interact(element, "double_click").map(|_| ())
    }

    async fn right_click(&mut self, element: &ElementHandle) -> Result<(), DriverError> {
        self.interact(element, "right_click").map(|_| ())
    }

    async fn hover(&mut self, element: &ElementHandle) -> Result<(), DriverError> {
        self.interact(element, "hover").map(|_| ())
    }

    async fn type_text(&mut self, element: &ElementHandle, text: &str) -> Result<(), DriverError> {
        let i = self.interact(element, "type")?;
        self.elements[i].attrs.insert("value".into(), text.into());
        Ok(())
    }

    async fn clear(&mut self, element: &ElementHandle) -> Result<(), DriverError> {
        let i = self.interact(element, "clear")?;
        self.elements[i].attrs.remove("value");
        Ok(())
    }

    async fn select_by_text(
        &mut self,
        element: &ElementHandle,
        text: &str,
    ) -> Result<(), DriverError> {
        let i = self.interact(element, "select_by_text")?;
        let option = self.elements[i]
            .options
            .iter()
            .find(|o| o.text == text)
            .cloned()
            .ok_or_else(|| DriverError::OptionNotFound { value: text.into() })?;
        self.elements[i].selected = Some(option.value);
        Ok(())
    }

    async fn select_by_value(
        &mut self,
        element: &ElementHandle,
        value: &str,
    ) -> Result<(), DriverError> {
        let i = self.interact(element, "select_by_value")?;
        if !self.elements[i].options.iter().any(|o| o.value == value) {
            return Err(DriverError::OptionNotFound {
                value: value.into(),
            });
        }
        self.elements[i].selected = Some(value.to_string());
        Ok(())
    }

    async fn select_by_index(
        &mut self,
        element: &ElementHandle,
        index: usize,
    ) -> Result<(), DriverError> {
        let i = self.interact(element, "select_by_index")?;
        let option = self.elements[i]
            .options
            .get(index)
            .cloned()
            .ok_or_else(|| DriverError::OptionNotFound {
                value: index.to_string(),
            })?;
        self.elements[i].selected = Some(option.value);
        Ok(())
    }

    async fn submit(&mut self, element: &ElementHandle) -> Result<(), DriverError> {
        self.interact(element, "submit").map(|_| ())
    }

    async fn scroll_into_view(&mut self, element: &ElementHandle) -> Result<(), DriverError> {
        self.interact(element, "scroll").map(|_| ())
    }

    async fn wait_until_interactable(
        &mut self,
        element: &ElementHandle,
        _timeout: Duration,
    ) -> Result<(), DriverError> {
        self.interact(element, "wait").map(|_| ())
    }

    async fn pointer_click(&mut self, element: &ElementHandle) -> Result<(), DriverError> {
        self.interact(element, "pointer_click").map(|_| ())
    }

    async fn select_options(
        &mut self,
        element: &ElementHandle,
    ) -> Result<Vec<SelectOption>, DriverError> {
        let i = self.index(element)?;
        if self.elements[i].tag != "select" {
            return Err(DriverError::NotSupported("select_options".into()));
        }
        Ok(self.elements[i].options.clone())
    }

    async fn execute_script(
        &mut self,
        script: &str,
        args: &[ElementHandle],
    ) -> Result<serde_json::Value, DriverError> {
        for arg in args {
            self.interact(arg, "script")?;
        }
        self.scripts.push(script.to_string());
        Ok(serde_json::Value::Null)
    }

    async fn page_context(&mut self) -> Result<String, DriverError> {
        Ok(format!("{} elements", self.elements.len()))
    }

    async fn screenshot(&mut self) -> Result<Vec<u8>, DriverError> {
        self.screenshots += 1;
        Ok(vec![0x89, b'P', b'N', b'G'])
    }
}

// ============================================================
// Collaborators
// ============================================================

/// Decision maker that answers with a fixed decision after an optional delay
/// and counts what it was asked.
pub struct RecordingDecisionMaker {
    decision: ApprovalDecision,
    delay: Duration,
    pub requests: AtomicUsize,
    pub auto_applied: AtomicUsize,
    pub rejected: Mutex<Vec<String>>,
}

impl RecordingDecisionMaker {
    pub fn new(decision: ApprovalDecision) -> Arc<Self> {
        Self::delayed(decision, Duration::ZERO)
    }

    pub fn delayed(decision: ApprovalDecision, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            decision,
            delay,
            requests: AtomicUsize::new(0),
            auto_applied: AtomicUsize::new(0),
            rejected: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    pub fn auto_applied(&self) -> usize {
        self.auto_applied.load(Ordering::SeqCst)
    }

    pub fn rejected(&self) -> Vec<String> {
        self.rejected.lock().unwrap().clone()
    }
}

#[async_trait]
impl DecisionMaker for RecordingDecisionMaker {
    async fn request_approval(&self, _proposal: &HealProposal) -> ApprovalDecision {
        self.requests.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.decision.clone()
    }

    async fn notify_auto_applied(&self, _proposal: &HealProposal) {
        self.auto_applied.fetch_add(1, Ordering::SeqCst);
    }

    async fn notify_rejected(&self, proposal: &HealProposal, reason: &str) {
        self.rejected
            .lock()
            .unwrap()
            .push(format!("{} ({})", proposal.proposed_locator, reason));
    }
}

/// Reasoning service with a scripted answer.
pub struct ScriptedReasoning {
    answer: Result<ReasoningSuggestion, String>,
    delay: Duration,
    pub calls: AtomicUsize,
    pub last_request: Mutex<Option<ReasoningRequest>>,
}

impl ScriptedReasoning {
    pub fn picks(index: usize, confidence: f64, rationale: &str) -> Arc<Self> {
        Arc::new(Self {
            answer: Ok(ReasoningSuggestion {
                index,
                confidence,
                rationale: rationale.to_string(),
            }),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        })
    }

    pub fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            answer: Err(message.to_string()),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        })
    }

    pub fn slow(index: usize, confidence: f64, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            answer: Ok(ReasoningSuggestion {
                index,
                confidence,
                rationale: "slow".into(),
            }),
            delay,
            calls: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReasoningService for ScriptedReasoning {
    async fn suggest(&self, request: &ReasoningRequest) -> Result<ReasoningSuggestion, ReasoningError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some(request.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.answer
            .clone()
            .map_err(ReasoningError::Unavailable)
    }
}

// ============================================================
// Engine wiring
// ============================================================

pub fn config_at(trust: &str) -> HealConfig {
    let mut config = HealConfig::default();
    config.guardrails.initial_trust_level = trust.to_string();
    config.guardrails.max_trust_level = "L3_AUTO_ALL".to_string();
    config
}

pub fn shared_state(config: &HealConfig) -> Arc<HealState> {
    Arc::new(HealState::new(config).expect("valid config"))
}

pub fn started_engine(
    state: Arc<HealState>,
    config: HealConfig,
    maker: Arc<dyn DecisionMaker>,
    reasoning: Option<Arc<dyn ReasoningService>>,
) -> HealingEngine {
    let mut engine = HealingEngine::new(state, config, maker, reasoning);
    engine.start(TestContext::new("login", "valid credentials"));
    engine
}

/// The login page from the classic "the-internet" demo: the button lost its id.
pub fn login_page() -> FakePage {
    FakePage::new(vec![
        FakeElement::new("input")
            .attr("id", "username")
            .attr("name", "username")
            .attr("type", "text"),
        FakeElement::new("input")
            .attr("id", "password")
            .attr("name", "password")
            .attr("type", "password"),
        FakeElement::new("button")
            .attr("class", "radius")
            .attr("type", "submit")
            .text(" Login "),
    ])
}
