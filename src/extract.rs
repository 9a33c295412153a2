//! Structured-field extraction from a finished answer.
//!
//! After the stream ends, whichever of `matched_schools`,
//! `student_background` and `recommended_projects` did not arrive on an event
//! are searched for in the result document and the answer text. The search
//! walks a fixed list of [`Strategy`]s; each one either yields a JSON object
//! carrying at least one target key or fails on its own without affecting the
//! others. A field is taken from the first strategy that supplies it.
//!
//! Failures are logged at `debug` per strategy. When nothing at all could be
//! recovered the run is logged at `warn` and the fields stay `None`.

use crate::lenient;
use crate::scan::{self, Delimiter, ObjectScan, balanced_span};
use crate::types::StructuredFields;
use crate::{Error, Result};
use regex::Regex;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::LazyLock;

/// Everything between the first opening fence and the last closing fence
static FENCED_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)```(?:json)?\s*(.*)\s*```").expect("Valid regex pattern"));

/// The `matched_schools` key as it appears inside a JSON object
static MATCHED_SCHOOLS_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""matched_schools"\s*:\s*"#).expect("Valid regex pattern"));

const FENCE: &str = "```";

/// Strategies that only look at `source.text`
const TEXT_STRATEGIES: [Strategy; 6] = [
    Strategy::FirstBalancedObject,
    Strategy::WholeDocument,
    Strategy::FencedBlock,
    Strategy::FencePrefixedScan,
    Strategy::GreedyBraces,
    Strategy::MatchedSchoolsPattern,
];

/// `eventData` fields that may carry an answer of their own, in order
const EVENT_DATA_TEXT_KEYS: [&str; 3] = ["response", "message", "content"];

/// How many enclosing `{` candidates the key search tries before giving up
const MAX_ENCLOSING_CANDIDATES: usize = 64;

/// One way of locating the structured fields, in the order they are tried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Keys directly on the result document
    TopLevel,
    /// Keys on the document's nested `eventData`
    EventData,
    /// The text strategies, run over the answer text nested in `eventData`
    EventDataText,
    /// First balanced object in the text
    FirstBalancedObject,
    /// The whole text as one JSON document
    WholeDocument,
    /// Contents of a markdown code fence
    FencedBlock,
    /// Balanced object after an unterminated leading fence
    FencePrefixedScan,
    /// From the first `{` to the last `}`
    GreedyBraces,
    /// Object (or bare array) around a `"matched_schools"` key
    MatchedSchoolsPattern,
}

impl Strategy {
    pub const ALL: [Strategy; 9] = [
        Strategy::TopLevel,
        Strategy::EventData,
        Strategy::EventDataText,
        Strategy::FirstBalancedObject,
        Strategy::WholeDocument,
        Strategy::FencedBlock,
        Strategy::FencePrefixedScan,
        Strategy::GreedyBraces,
        Strategy::MatchedSchoolsPattern,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Strategy::TopLevel => "top-level",
            Strategy::EventData => "eventData",
            Strategy::EventDataText => "eventData-text",
            Strategy::FirstBalancedObject => "first-balanced-object",
            Strategy::WholeDocument => "whole-document",
            Strategy::FencedBlock => "fenced-block",
            Strategy::FencePrefixedScan => "fence-prefixed-scan",
            Strategy::GreedyBraces => "greedy-braces",
            Strategy::MatchedSchoolsPattern => "matched-schools-pattern",
        }
    }

    /// Runs this strategy alone against `source`.
    pub fn attempt(self, source: &ExtractionSource<'_>) -> Result<StructuredFields> {
        match self {
            Strategy::TopLevel => {
                let object = source
                    .top_level
                    .ok_or_else(|| Error::extraction("no result document"))?;
                accept(object)
            }
            Strategy::EventData => {
                let object = source
                    .event_data
                    .and_then(Value::as_object)
                    .ok_or_else(|| Error::extraction("no eventData object"))?;
                accept(object)
            }
            Strategy::EventDataText => {
                let nested = event_data_text(source)?;
                let mut fields = StructuredFields::default();
                for strategy in TEXT_STRATEGIES {
                    if let Ok(candidate) = strategy.attempt(&ExtractionSource::from_text(nested)) {
                        fields.fill_missing(candidate);
                    }
                }
                if fields.is_empty() {
                    Err(Error::extraction("nothing found in eventData text"))
                } else {
                    Ok(fields)
                }
            }
            Strategy::FirstBalancedObject => {
                let object = ObjectScan::new().parse(non_empty(source.text)?)?;
                accept(&object)
            }
            Strategy::WholeDocument => accept(&scan::parse_object(non_empty(source.text)?)?),
            Strategy::FencedBlock => {
                let inner = FENCED_BLOCK
                    .captures(non_empty(source.text)?)
                    .and_then(|caps| caps.get(1))
                    .ok_or_else(|| Error::extraction("no fenced block"))?;
                accept(&scan::parse_object(inner.as_str())?)
            }
            Strategy::FencePrefixedScan => {
                let text = non_empty(source.text)?;
                if !text.trim_start().starts_with(FENCE) {
                    return Err(Error::extraction("text does not open with a fence"));
                }
                let object = ObjectScan::new().start_after(FENCE).parse(text)?;
                accept(&object)
            }
            Strategy::GreedyBraces => {
                let text = non_empty(source.text)?;
                let span = text
                    .find('{')
                    .zip(text.rfind('}'))
                    .filter(|(open, close)| open < close)
                    .map(|(open, close)| &text[open..=close])
                    .ok_or_else(|| Error::extraction("no brace pair"))?;
                accept(&scan::parse_object(span)?)
            }
            Strategy::MatchedSchoolsPattern => matched_schools_pattern(non_empty(source.text)?),
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Inputs the strategies look at
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtractionSource<'a> {
    /// The result document itself (JSON responses only)
    pub top_level: Option<&'a Map<String, Value>>,
    /// Diagnostic payload: `eventData` of a JSON response, or the last final event of a stream
    pub event_data: Option<&'a Value>,
    /// Assembled answer text
    pub text: &'a str,
}

impl<'a> ExtractionSource<'a> {
    pub fn from_text(text: &'a str) -> Self {
        Self {
            text,
            ..Default::default()
        }
    }
}

/// Outcome of one extraction run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    pub fields: StructuredFields,
    /// Strategies that supplied at least one field, in order
    pub strategies: Vec<Strategy>,
}

/// Fills the fields missing from `known` using the strategies in order.
///
/// Fields already present in `known` are never replaced. Pure: the same
/// inputs always give the same [`Extraction`].
pub fn extract_structured(source: &ExtractionSource<'_>, known: &StructuredFields) -> Extraction {
    let mut extraction = Extraction {
        fields: known.clone(),
        strategies: Vec::new(),
    };

    for strategy in Strategy::ALL {
        if extraction.fields.is_complete() {
            break;
        }

        match strategy.attempt(source) {
            Ok(candidate) => {
                let missing_before = extraction.fields.missing().len();
                extraction.fields.fill_missing(candidate);
                let missing = extraction.fields.missing();
                if missing.len() < missing_before {
                    log::debug!("extraction: {} recovered fields, missing {:?}", strategy, missing);
                    extraction.strategies.push(strategy);
                } else {
                    log::debug!("extraction: {} matched but added nothing", strategy);
                }
            }
            Err(e) => log::debug!("extraction: {} failed: {}", strategy, e),
        }
    }

    if extraction.strategies.is_empty() && known.is_empty() {
        log::warn!(
            "extraction: all strategies failed ({} chars of text)",
            source.text.chars().count()
        );
    }

    extraction
}

/// Shorthand for extracting from bare text with nothing known
pub fn extract_from_text(text: &str) -> StructuredFields {
    extract_structured(&ExtractionSource::from_text(text), &StructuredFields::default()).fields
}

fn accept(object: &Map<String, Value>) -> Result<StructuredFields> {
    if StructuredFields::object_has_any(object) {
        Ok(StructuredFields::from_object(object))
    } else {
        Err(Error::extraction(format!(
            "object has none of {:?}",
            StructuredFields::KEYS
        )))
    }
}

/// First non-empty answer string in `eventData` that is not the main text
fn event_data_text<'a>(source: &ExtractionSource<'a>) -> Result<&'a str> {
    let object = source
        .event_data
        .and_then(Value::as_object)
        .ok_or_else(|| Error::extraction("no eventData object"))?;
    EVENT_DATA_TEXT_KEYS
        .iter()
        .filter_map(|key| object.get(*key).and_then(Value::as_str))
        .find(|text| !text.trim().is_empty() && text.trim() != source.text.trim())
        .ok_or_else(|| Error::extraction("no separate answer text in eventData"))
}

fn non_empty(text: &str) -> Result<&str> {
    if text.trim().is_empty() {
        Err(Error::extraction("no text"))
    } else {
        Ok(text)
    }
}

/// Looks for the object enclosing a `"matched_schools"` key, innermost first.
/// If no enclosing object parses, the array value alone is tried.
fn matched_schools_pattern(text: &str) -> Result<StructuredFields> {
    let key = MATCHED_SCHOOLS_KEY
        .find(text)
        .ok_or_else(|| Error::extraction("no matched_schools key"))?;

    let enclosing = text[..key.start()]
        .rmatch_indices('{')
        .take(MAX_ENCLOSING_CANDIDATES)
        .filter_map(|(open, _)| balanced_span(text, open, Delimiter::Brace))
        .filter(|span| span.end > key.end())
        .find_map(|span| scan::parse_object(&text[span]).ok());

    if let Some(object) = enclosing {
        return accept(&object);
    }

    let array_start = key.end();
    let span = balanced_span(text, array_start, Delimiter::Bracket)
        .ok_or_else(|| Error::extraction("matched_schools value is not a balanced array"))?;
    let value: Value = serde_json::from_str(&text[span]).map_err(|e| Error::extraction(e.to_string()))?;
    let schools = lenient::decode_list(&value, StructuredFields::MATCHED_SCHOOLS)
        .ok_or_else(|| Error::extraction("matched_schools value is not an array"))?;

    Ok(StructuredFields {
        matched_schools: Some(schools),
        ..Default::default()
    })
}
