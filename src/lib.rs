//! # School Match SDK
//!
//! Client-side core of a study-abroad advising console: submits a student
//! profile to the match service, consumes the streamed answer and recovers the
//! structured recommendations embedded in it.
//!
//! ## Overview
//!
//! The match service is a language model behind a thin proxy. It answers over
//! Server-Sent Events with a loosely specified event vocabulary, and the
//! structured part of its answer (matched schools, the student's background,
//! recommended programs) arrives either on the events themselves or as JSON
//! somewhere inside the free-form answer text: bare, fenced in markdown, or
//! concatenated with other objects. This crate turns that into one
//! [`MatchResult`] without ever losing data that was already received.
//!
//! ## Key Features
//!
//! - **Chunk-safe decoding**: multi-byte characters split across network reads decode correctly
//! - **Tolerant event handling**: malformed lines are skipped, unknown event types are kept
//! - **Layered extraction**: a fixed fallback order of strategies for embedded JSON
//! - **Soft failure**: a stalled or broken stream still yields a (partial) result
//! - **Callbacks or streams**: report through [`MatchHandler`] or consume [`MatchUpdate`]s
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use school_match::{FormData, MatchClient, MatchOptions, MatchRequest, PromptData, get_base_url};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let options = MatchOptions::builder()
//!         .base_url(get_base_url(None))
//!         .build()?;
//!     let client = MatchClient::new(options)?;
//!
//!     let request = MatchRequest::new(
//!         FormData {
//!             student_school: "华中科技大学".into(),
//!             grade_system: "四分制".into(),
//!             grade: "3.6".into(),
//!             target_school: "香港大学".into(),
//!             ..Default::default()
//!         },
//!         PromptData::default(),
//!     );
//!
//!     let result = client.match_once(&request).await?;
//!     println!("{}", result.response);
//!     for school in result.matched_schools.unwrap_or_default() {
//!         println!("{} ({})", school.chinese_name, school.school_category);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! Data flows through the pipeline stages in order:
//!
//! - **reader**: byte chunks to text, with an inactivity window
//! - **framer**: text to lines
//! - **event**: lines to typed events
//! - **accumulator**: events to answer text, progress and structured fields
//! - **extract** / **scan**: structured fields recovered from the answer text
//! - **assemble**: the final [`MatchResult`]
//!
//! Around it sit **client** (HTTP and dispatch), **callbacks**, **storage**
//! (persisted form state), **types**, **config** and **error**.

// ============================================================================
// MODULE DECLARATIONS
// ============================================================================

/// Event classification and answer accumulation for one stream.
pub mod accumulator;

/// Result assembly and injectable session identifier sources.
pub mod assemble;

/// Progress, completion and error notification handlers.
mod callbacks;

/// HTTP submission, content-type dispatch and the stream consumption driver.
mod client;

/// Environment-variable configuration helpers.
mod config;

/// Error types and the crate-wide `Result` alias.
mod error;

/// SSE line parsing and tagged event decoding.
pub mod event;

/// Structured-field extraction strategies.
pub mod extract;

/// Line framing over decoded text.
pub mod framer;

/// Tolerant deserializers for loosely typed backend fields.
mod lenient;

/// Chunk reading and incremental UTF-8 decoding.
pub mod reader;

/// Balanced-delimiter scanning.
pub mod scan;

/// Namespaced key-value persistence.
pub mod storage;

/// Data model, request records and client options.
mod types;

// ============================================================================
// PUBLIC EXPORTS
// ============================================================================

// --- Client API ---

pub use client::{MatchClient, MatchResponse, consume_stream, submit_match};

// --- Notifications ---

pub use callbacks::{
    ChannelHandler, Callbacks, CollectingHandler, CompleteCallback, ErrorCallback, MatchHandler,
    MatchUpdate, ProgressCallback,
};

// --- Configuration ---

pub use config::{get_base_url, get_inactivity_timeout};

// --- Error Handling ---

pub use error::{Error, Result};

// --- Pipeline ---

pub use assemble::{
    CounterSessionIds, MillisSessionIds, RandomSessionIds, ResultAssembler, SessionIdSource,
};
pub use extract::{Extraction, ExtractionSource, Strategy, extract_from_text, extract_structured};

// --- Core Types ---

pub use types::{
    DEFAULT_ENDPOINT, DEFAULT_FALLBACK_MESSAGE, FormData, GpaRequirement, GradeSystem,
    MatchOptions, MatchOptionsBuilder, MatchRequest, MatchResult, MatchedSchool, PromptData,
    RecommendedProject, Requirement, SchoolTier, StepRecord, StructuredFields, StudentBackground,
    TestRequirement,
};

// ============================================================================
// CONVENIENCE PRELUDE
// ============================================================================

/// The types most callers need.
/// Import with `use school_match::prelude::*;`.
pub mod prelude {
    pub use crate::{
        Callbacks, Error, FormData, MatchClient, MatchHandler, MatchOptions, MatchRequest,
        MatchResult, MatchUpdate, MatchedSchool, PromptData, RecommendedProject, Result,
        StudentBackground,
    };
}
