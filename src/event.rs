//! SSE line parsing and event decoding.
//!
//! The match service speaks a loose dialect of Server-Sent Events: every
//! interesting line is `data: <json>`, the JSON carries a `type`
//! discriminator, and the set of discriminators is whatever the backend
//! happens to emit that week. Parsing is therefore split in two steps:
//!
//! 1. [`parse_line`] turns one framed line into a JSON value (or nothing).
//! 2. [`StreamEvent::decode`] classifies that value into a closed set of
//!    [`EventKind`]s, with [`EventKind::Unknown`] keeping anything
//!    unrecognised instead of rejecting it.
//!
//! ```text
//! data: {"type":"start","message":"开始匹配"}            -> Start
//! data: {"type":"ai_token","content":"牛"}               -> Token
//! data: {"type":"final_response","response":"..."}      -> Final(FinalResponse)
//! data: {"type":"end"}                                  -> End
//! data: {"type":"heartbeat_v2","seq":4}                 -> Unknown
//! ```

use crate::lenient;
use crate::types::StructuredFields;
use crate::{Error, Result};
use serde_json::{Map, Value};

/// Prefix of an SSE data line, including the mandatory space
pub const DATA_PREFIX: &str = "data: ";

/// Lines starting with this are SSE comments (keep-alives)
pub const COMMENT_PREFIX: char = ':';

/// OpenAI-style end sentinel some proxies append; not JSON, silently skipped
const DONE_SENTINEL: &str = "[DONE]";

/// Parses one framed line.
///
/// Returns `Ok(None)` for blank lines, comments, non-data SSE fields
/// (`event:`, `id:`, `retry:`) and the `[DONE]` sentinel; `Ok(Some(value))`
/// for a data line holding valid JSON; and [`Error::EventParse`] when the
/// payload is not JSON. The caller is expected to log that error and keep going.
pub fn parse_line(line: &str) -> Result<Option<Value>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with(COMMENT_PREFIX) {
        return Ok(None);
    }

    let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
        return Ok(None);
    };

    let payload = payload.trim();
    if payload == DONE_SENTINEL {
        return Ok(None);
    }

    serde_json::from_str(payload)
        .map(Some)
        .map_err(|e| Error::event_parse(format!("{e} in {}", preview(payload, 120))))
}

/// Which final-kind discriminator an event used
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalVariant {
    Result,
    Final,
    FinalResponse,
}

/// Whether a tool-boundary event opens or closes a tool call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolPhase {
    Start,
    End,
}

/// Classification of one event by its `type` field
#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    /// `start`
    Start,
    /// `step`, with the backend's step status when given
    Step { status: Option<String> },
    /// `tool_start` / `tool_end`
    ToolBoundary(ToolPhase),
    /// `ai_token` (or bare `token`)
    Token,
    /// `result` / `final` / `final_response`; `payload` is the whole event object
    Final {
        variant: FinalVariant,
        payload: Map<String, Value>,
    },
    /// `end`
    End,
    /// Anything else, kept verbatim
    Unknown {
        raw_type: String,
        raw_fields: Map<String, Value>,
    },
}

impl EventKind {
    pub fn is_final(&self) -> bool {
        matches!(self, EventKind::Final { .. })
    }

    /// Kinds whose `message` is surfaced as progress when there is no `description`
    fn surfaces_message(&self) -> bool {
        matches!(self, EventKind::Start | EventKind::ToolBoundary(_))
    }
}

/// One decoded SSE event
#[derive(Debug, Clone, PartialEq)]
pub struct StreamEvent {
    pub kind: EventKind,
    pub description: Option<String>,
    pub message: Option<String>,
    /// Incremental fragment carried by token-like events
    pub content: Option<String>,
    /// Full or partial answer carried by final-like events
    pub response: Option<String>,
    /// Structured result fields carried directly on the event, whatever its kind
    pub structured: StructuredFields,
}

impl StreamEvent {
    /// Decodes a parsed data payload. Only non-object payloads are rejected.
    pub fn decode(value: Value) -> Result<Self> {
        let Value::Object(fields) = value else {
            return Err(Error::event_parse(format!(
                "event payload is not an object: {}",
                preview(&value.to_string(), 80)
            )));
        };

        let text = |key: &str| fields.get(key).and_then(lenient::value_to_text);
        let description = text("description");
        let message = text("message");
        let content = text("content");
        let response = text("response");
        let status = text("status");
        let structured = StructuredFields::from_object(&fields);
        let raw_type = text("type").unwrap_or_default();

        let kind = match raw_type.as_str() {
            "start" => EventKind::Start,
            "step" => EventKind::Step { status },
            "tool_start" => EventKind::ToolBoundary(ToolPhase::Start),
            "tool_end" => EventKind::ToolBoundary(ToolPhase::End),
            "ai_token" | "token" => EventKind::Token,
            "result" => final_kind(FinalVariant::Result, fields),
            "final" => final_kind(FinalVariant::Final, fields),
            "final_response" => final_kind(FinalVariant::FinalResponse, fields),
            "end" => EventKind::End,
            _ => EventKind::Unknown {
                raw_type,
                raw_fields: fields,
            },
        };

        Ok(Self {
            kind,
            description,
            message,
            content,
            response,
            structured,
        })
    }

    /// The progress text this event surfaces, if any.
    ///
    /// `description` always wins; `message` only counts on start and
    /// tool-boundary events.
    pub fn progress_text(&self) -> Option<&str> {
        fn non_empty(s: &Option<String>) -> Option<&str> {
            s.as_deref().filter(|s| !s.is_empty())
        }
        non_empty(&self.description)
            .or_else(|| non_empty(&self.message).filter(|_| self.kind.surfaces_message()))
    }

    /// The answer fragment this event contributes, if any.
    ///
    /// Token events contribute `content`, final events contribute `response`;
    /// each falls back to the other field when its own is missing.
    pub fn answer_fragment(&self) -> Option<&str> {
        match self.kind {
            EventKind::Token => self.content.as_deref().or(self.response.as_deref()),
            EventKind::Final { .. } => self.response.as_deref().or(self.content.as_deref()),
            _ => None,
        }
    }
}

fn final_kind(variant: FinalVariant, payload: Map<String, Value>) -> EventKind {
    EventKind::Final { variant, payload }
}

/// First `max` characters of `text`, for log lines
pub(crate) fn preview(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}…", &text[..cut]),
        None => text.to_string(),
    }
}
