//! Locator model.
//!
//! A locator is the query a test step recorded to find its element. The string
//! forms accepted here follow the common driver conventions:
//!
//! - `id=login`, `name=email`, `testid=submit`, `aria-label=Close` for attribute lookups
//! - `//button[...]` or `xpath=...` for XPath
//! - `css=...` or any other string for CSS

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LocatorError {
    #[error("Empty locator")]
    Empty,
    #[error("Empty value for locator strategy '{0}'")]
    MissingValue(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Locator {
    Css(String),
    XPath(String),
    Id(String),
    Name(String),
    TestId(String),
    AriaLabel(String),
}

impl Locator {
    /// XPath locator for an element of `tag` whose normalised text equals `text`.
    pub fn tag_with_text(tag: &str, text: &str) -> Self {
        Locator::XPath(format!(
            "//{}[normalize-space(.)={}]",
            tag,
            xpath_literal(text.trim())
        ))
    }

    /// CSS locator for `tag` with an exact attribute value.
    pub fn tag_with_attribute(tag: &str, attribute: &str, value: &str) -> Self {
        Locator::Css(format!("{}[{}=\"{}\"]", tag, attribute, css_escape(value)))
    }

    /// Lower-case words carried by the locator, used as a naming hint when
    /// the element it pointed at is gone (`#login-btn` → `login button`).
    pub fn hint_words(&self) -> Vec<String> {
        let raw = match self {
            Locator::Css(s) | Locator::XPath(s) => s.as_str(),
            Locator::Id(s) | Locator::Name(s) | Locator::TestId(s) | Locator::AriaLabel(s) => {
                s.as_str()
            }
        };

        let mut words = Vec::new();
        for token in WORD_SPLIT.split(&split_camel_case(raw)) {
            let token = token.to_lowercase();
            if token.len() < 2 || token.chars().all(|c| c.is_ascii_digit()) {
                continue;
            }
            let word = match token.as_str() {
                "btn" => "button".to_string(),
                "lbl" => "label".to_string(),
                "nav" => "navigation".to_string(),
                _ => token,
            };
            if NOISE_WORDS.contains(&word.as_str()) || words.contains(&word) {
                continue;
            }
            words.push(word);
        }
        words
    }
}

const NOISE_WORDS: &[&str] = &[
    "css", "xpath", "id", "name", "testid", "data", "test", "aria", "normalize", "space", "div",
    "span", "contains", "text", "class", "type", "nth", "child", "of", "qa",
];

lazy_static! {
    static ref WORD_SPLIT: Regex = Regex::new(r"[^A-Za-z0-9]+").unwrap();
    static ref CAMEL_BOUNDARY: Regex = Regex::new(r"([a-z0-9])([A-Z])").unwrap();
    static ref HEX_RUN: Regex = Regex::new(r"[0-9a-fA-F]{8,}").unwrap();
    static ref NUMERIC_SUFFIX: Regex = Regex::new(r"(?:[-_:.]\d+|\d{3,})$").unwrap();
    static ref SHORT_ALNUM: Regex = Regex::new(r"^[A-Za-z]{1,4}[-_]?\d{2,}$").unwrap();
}

fn split_camel_case(s: &str) -> String {
    CAMEL_BOUNDARY.replace_all(s, "$1 $2").into_owned()
}

/// Whether an id looks framework-generated and therefore unsafe to locate by:
/// an embedded hex run of 8+ characters containing a digit, a numeric suffix,
/// or a short letters+digits form such as `j12` or `ext-4`.
pub fn looks_auto_generated(id: &str) -> bool {
    let id = id.trim();
    if id.is_empty() {
        return false;
    }

    let hex_with_digit = HEX_RUN
        .find_iter(id)
        .any(|m| m.as_str().chars().any(|c| c.is_ascii_digit()));

    hex_with_digit || NUMERIC_SUFFIX.is_match(id) || SHORT_ALNUM.is_match(id)
}

/// Quote a string as an XPath literal, falling back to `concat()` when it
/// contains both quote kinds.
pub fn xpath_literal(s: &str) -> String {
    if !s.contains('\'') {
        format!("'{}'", s)
    } else if !s.contains('"') {
        format!("\"{}\"", s)
    } else {
        let parts: Vec<String> = s.split('\'').map(|p| format!("'{}'", p)).collect();
        format!("concat({})", parts.join(", \"'\", "))
    }
}

fn css_escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

impl FromStr for Locator {
    type Err = LocatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(LocatorError::Empty);
        }

        if s.starts_with('/') || s.starts_with("(/") {
            return Ok(Locator::XPath(s.to_string()));
        }

        if let Some((strategy, value)) = s.split_once('=') {
            let ctor: Option<fn(String) -> Locator> = match strategy.trim() {
                "css" => Some(Locator::Css),
                "xpath" => Some(Locator::XPath),
                "id" => Some(Locator::Id),
                "name" => Some(Locator::Name),
                "testid" | "data-testid" => Some(Locator::TestId),
                "aria-label" | "aria" => Some(Locator::AriaLabel),
                _ => None,
            };
            if let Some(ctor) = ctor {
                let value = value.trim();
                if value.is_empty() {
                    return Err(LocatorError::MissingValue(strategy.trim().to_string()));
                }
                return Ok(ctor(value.to_string()));
            }
        }

        Ok(Locator::Css(s.to_string()))
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Css(s) => {
                // Bare CSS would re-parse as a strategy prefix.
                if s.split_once('=').is_some_and(|(p, _)| is_strategy_prefix(p)) {
                    write!(f, "css={}", s)
                } else {
                    f.write_str(s)
                }
            }
            Locator::XPath(s) if s.starts_with('/') || s.starts_with("(/") => f.write_str(s),
            Locator::XPath(s) => write!(f, "xpath={}", s),
            Locator::Id(s) => write!(f, "id={}", s),
            Locator::Name(s) => write!(f, "name={}", s),
            Locator::TestId(s) => write!(f, "testid={}", s),
            Locator::AriaLabel(s) => write!(f, "aria-label={}", s),
        }
    }
}

fn is_strategy_prefix(prefix: &str) -> bool {
    matches!(
        prefix.trim(),
        "css" | "xpath" | "id" | "name" | "testid" | "data-testid" | "aria-label" | "aria"
    )
}

impl From<Locator> for String {
    fn from(locator: Locator) -> Self {
        locator.to_string()
    }
}

impl TryFrom<String> for Locator {
    type Error = LocatorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}
