//! Result assembly and session identifiers.
//!
//! [`ResultAssembler`] turns what a run gathered into the single
//! [`MatchResult`] handed to the UI. It never fails: with nothing recovered it
//! still produces a result carrying the fallback message.
//!
//! Answer text precedence for a stream:
//!
//! 1. the accumulated answer buffer
//! 2. the description of the last step, if that step succeeded
//! 3. `message`, then `content`, of the last final-kind event
//! 4. the configured fallback message

use crate::accumulator::AccumulationState;
use crate::extract::{self, ExtractionSource};
use crate::lenient;
use crate::types::{MatchOptions, MatchResult, StructuredFields};
use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicU64, Ordering};

/// Source of session identifiers for assembled results.
///
/// Injected through [`MatchOptions`] so that tests and multi-tenant hosts can
/// control identifiers without any process-global counter.
pub trait SessionIdSource: Send + Sync {
    fn next_id(&self) -> String;
}

/// Current Unix time in milliseconds, the format the backend has always used
#[derive(Debug, Clone, Copy, Default)]
pub struct MillisSessionIds;

impl SessionIdSource for MillisSessionIds {
    fn next_id(&self) -> String {
        Utc::now().timestamp_millis().to_string()
    }
}

/// `<prefix><n>` with `n` counting up from 1
#[derive(Debug, Default)]
pub struct CounterSessionIds {
    prefix: String,
    next: AtomicU64,
}

impl CounterSessionIds {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: AtomicU64::new(1),
        }
    }
}

impl SessionIdSource for CounterSessionIds {
    fn next_id(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        format!("{}{}", self.prefix, n)
    }
}

/// 16 random lowercase hex digits
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomSessionIds;

impl SessionIdSource for RandomSessionIds {
    fn next_id(&self) -> String {
        format!("{:016x}", rand::random::<u64>())
    }
}

/// RFC 3339 UTC timestamp with millisecond precision
pub fn timestamp_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Builds [`MatchResult`]s according to one set of [`MatchOptions`]
#[derive(Debug, Clone, Copy)]
pub struct ResultAssembler<'a> {
    options: &'a MatchOptions,
}

impl<'a> ResultAssembler<'a> {
    pub fn new(options: &'a MatchOptions) -> Self {
        Self { options }
    }

    /// Answer text for a finished stream, before the fixed fallback applies
    pub fn answer_text(state: &AccumulationState) -> Option<&str> {
        Some(state.text_buffer.as_str())
            .filter(|text| !text.trim().is_empty())
            .or_else(|| state.successful_step_description())
            .or_else(|| state.final_event_text())
    }

    /// Runs extraction against a finished stream and assembles the result.
    pub fn finish_stream(&self, state: AccumulationState) -> MatchResult {
        let extracted = {
            let source = ExtractionSource {
                top_level: None,
                event_data: state.last_final.as_ref(),
                text: Self::answer_text(&state).unwrap_or_default(),
            };
            extract::extract_structured(&source, &state.structured).fields
        };
        self.assemble(state, extracted)
    }

    /// Merges accumulated state with text-extracted fields.
    /// Fields adopted from events take precedence over extracted ones.
    pub fn assemble(&self, state: AccumulationState, extracted: StructuredFields) -> MatchResult {
        let response = Self::answer_text(&state)
            .map(str::to_string)
            .unwrap_or_else(|| self.options.fallback_message.clone());

        let AccumulationState {
            structured,
            progress_messages,
            steps,
            last_final,
            ..
        } = state;

        let mut fields = structured;
        fields.fill_missing(extracted);

        let mut result = self.blank(response);
        result.set_structured(fields);
        result.progress_messages = progress_messages;
        result.steps = (!steps.is_empty()).then_some(steps);
        result.event_data = last_final;
        result
    }

    /// Resolves a non-streaming JSON response.
    ///
    /// An object is taken as a [`MatchResult`] as-is, with `timestamp` and
    /// `session_id` filled in when missing and absent structured fields
    /// extracted from the document, its `eventData` and its text. Anything
    /// else is wrapped as answer text.
    pub fn from_document(&self, document: Value) -> MatchResult {
        let object = match document {
            Value::Object(object) => object,
            other => {
                let text = lenient::value_to_text(&other).unwrap_or_else(|| other.to_string());
                let mut object = Map::new();
                object.insert("success".into(), Value::Bool(true));
                object.insert("response".into(), Value::String(text));
                object
            }
        };

        let mut result = match serde_json::from_value::<MatchResult>(Value::Object(object.clone())) {
            Ok(result) => result,
            Err(e) => {
                log::warn!("response document is not a match result: {}", e);
                self.blank(String::new())
            }
        };

        if result.response.trim().is_empty() {
            result.response = ["message", "content"]
                .iter()
                .filter_map(|key| object.get(*key).and_then(lenient::value_to_text))
                .find(|text| !text.trim().is_empty())
                .unwrap_or_else(|| self.options.fallback_message.clone());
        }
        if result.timestamp.is_empty() {
            result.timestamp = timestamp_now();
        }
        if result.session_id.is_empty() {
            result.session_id = self.options.session_ids.next_id();
        }

        let known = result.structured();
        if !known.is_complete() {
            let source = ExtractionSource {
                top_level: Some(&object),
                event_data: object.get("eventData"),
                text: &result.response,
            };
            let fields = extract::extract_structured(&source, &known).fields;
            result.set_structured(fields);
        }

        result
    }

    fn blank(&self, response: String) -> MatchResult {
        MatchResult {
            success: true,
            response,
            timestamp: timestamp_now(),
            session_id: self.options.session_ids.next_id(),
            matched_schools: None,
            student_background: None,
            recommended_projects: None,
            progress_messages: Vec::new(),
            steps: None,
            event_data: None,
        }
    }
}
