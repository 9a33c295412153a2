//! Event classification and answer accumulation.
//!
//! One [`Accumulator`] belongs to exactly one stream consumption. It is fed
//! framed lines in arrival order and builds up an [`AccumulationState`]:
//! the answer text, the structured fields adopted from events, the progress
//! messages surfaced and the backend's step log.
//!
//! The rules applied to each event are independent of each other:
//!
//! - **Progress**: `description`, or `message` on start/tool-boundary events,
//!   is surfaced to the caller.
//! - **Answer text**: token events append `content`, final events append
//!   `response`. Repeated final events are appended, never replaced.
//! - **End marker**: `end` is recorded and nothing else happens. Reading
//!   continues until the transport itself completes, since the producer has
//!   been seen emitting content after `end`.
//! - **Structured fields**: any event may carry `matched_schools`,
//!   `student_background` or `recommended_projects`; a non-null value
//!   replaces the previous one, a null or absent value never clears it.

use crate::event::{self, EventKind, StreamEvent};
use crate::types::{StepRecord, StructuredFields};
use serde_json::Value;

/// Everything gathered from one stream, read-only once consumption ends
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AccumulationState {
    /// Concatenated answer fragments, in arrival order
    pub text_buffer: String,

    /// Whether an `end` event was seen; diagnostic only
    pub saw_end_marker: bool,

    /// Structured fields carried directly on events
    pub structured: StructuredFields,

    /// Every progress message surfaced, in order
    pub progress_messages: Vec<String>,

    /// Every `step` event, in order
    pub steps: Vec<StepRecord>,

    /// Raw body of the most recent final-kind event
    pub last_final: Option<Value>,

    /// Events successfully decoded
    pub events_seen: usize,

    /// Data lines skipped because they failed to decode
    pub malformed_lines: usize,
}

impl AccumulationState {
    /// Description of the last step when that step reported success
    pub fn successful_step_description(&self) -> Option<&str> {
        let last = self.steps.last()?;
        if last.status.as_deref() == Some("success") {
            last.description.as_deref().filter(|d| !d.is_empty())
        } else {
            None
        }
    }

    /// `message`, then `content`, of the last final-kind event
    pub fn final_event_text(&self) -> Option<&str> {
        let last = self.last_final.as_ref()?;
        ["message", "content"]
            .iter()
            .filter_map(|key| last.get(*key).and_then(Value::as_str))
            .find(|text| !text.is_empty())
    }
}

/// Stateful event router for one stream consumption
#[derive(Debug, Default)]
pub struct Accumulator {
    state: AccumulationState,
}

impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses and applies one framed line.
    ///
    /// Returns the progress message the line surfaced, if any. Lines that
    /// fail to parse are logged and counted, never raised.
    pub fn ingest_line(&mut self, line: &str) -> Option<String> {
        let value = match event::parse_line(line) {
            Ok(Some(value)) => value,
            Ok(None) => return None,
            Err(e) => {
                self.state.malformed_lines += 1;
                log::debug!("skipping SSE line: {}", e);
                return None;
            }
        };

        match StreamEvent::decode(value) {
            Ok(event) => self.apply(event),
            Err(e) => {
                self.state.malformed_lines += 1;
                log::debug!("skipping SSE event: {}", e);
                None
            }
        }
    }

    /// Applies one decoded event and returns the progress message it surfaced.
    pub fn apply(&mut self, event: StreamEvent) -> Option<String> {
        let state = &mut self.state;
        state.events_seen += 1;

        let progress = event.progress_text().map(str::to_string);
        if let Some(message) = &progress {
            state.progress_messages.push(message.clone());
        }

        if let Some(fragment) = event.answer_fragment() {
            state.text_buffer.push_str(fragment);
        }

        let StreamEvent {
            kind,
            description,
            message,
            structured,
            ..
        } = event;

        state.structured.adopt(structured);

        match kind {
            EventKind::Step { status } => state.steps.push(StepRecord {
                description,
                status,
                message,
            }),
            EventKind::Final { variant, payload } => {
                log::debug!("final event ({:?}), {} keys", variant, payload.len());
                state.last_final = Some(Value::Object(payload));
            }
            EventKind::End => {
                if !state.saw_end_marker {
                    log::debug!("end marker after {} events; reading on", state.events_seen);
                }
                state.saw_end_marker = true;
            }
            EventKind::Unknown { raw_type, .. } if !raw_type.is_empty() => {
                log::debug!("unrecognised event type {:?}", raw_type);
            }
            _ => {}
        }

        progress
    }

    /// Read access while consumption is still running
    pub fn state(&self) -> &AccumulationState {
        &self.state
    }

    /// Ends consumption and hands the state over.
    pub fn finish(self) -> AccumulationState {
        self.state
    }
}
