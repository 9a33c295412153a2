//! Client for submitting match requests and consuming their responses
//!
//! This module ties the pipeline together. A submission is a single POST to
//! the match endpoint; the backend answers either with an SSE stream or with a
//! plain JSON document, and the client dispatches on `Content-Type`.
//!
//! # Request Flow
//!
//! ```text
//! MatchRequest
//!     │
//!     ├─> validate()
//!     │
//!     ├─> POST {base_url}{endpoint}
//!     │
//!     ├─> non-2xx ───────────────> Error::Api ──> on_error
//!     │
//!     ├─> text/event-stream
//!     │     │
//!     │     ├─> StreamReader   (bytes → text, inactivity window)
//!     │     ├─> LineFramer     (text → lines)
//!     │     ├─> Accumulator    (lines → events → state, on_progress)
//!     │     ├─> extract        (state → structured fields)
//!     │     └─> ResultAssembler ──────> on_complete
//!     │
//!     └─> anything else
//!           │
//!           └─> JSON document ─> ResultAssembler::from_document ─> on_complete
//! ```
//!
//! # Failure Model
//!
//! Only a transport that yields nothing at all is a hard failure. A stream
//! that breaks or goes quiet after data arrived is treated as finished and
//! whatever was gathered is delivered through `on_complete`.
//!
//! # Examples
//!
//! ```rust,no_run
//! use school_match::{Callbacks, FormData, MatchClient, MatchOptions, MatchRequest, PromptData};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = MatchClient::new(
//!     MatchOptions::builder()
//!         .base_url("http://localhost:3000")
//!         .build()?,
//! )?;
//!
//! let request = MatchRequest::new(
//!     FormData {
//!         student_school: "浙江大学".into(),
//!         grade_system: "百分制".into(),
//!         grade: "88".into(),
//!         target_school: "英国G5".into(),
//!         ..Default::default()
//!     },
//!     PromptData::default(),
//! );
//!
//! let mut callbacks = Callbacks::new()
//!     .with_progress(|message| println!("… {message}"))
//!     .with_complete(|result, _raw| println!("{}", result.response))
//!     .with_error(|message| eprintln!("{message}"));
//!
//! client.run(&request, &mut callbacks).await;
//! # Ok(())
//! # }
//! ```

use crate::accumulator::Accumulator;
use crate::assemble::ResultAssembler;
use crate::callbacks::{ChannelHandler, CollectingHandler, MatchHandler, MatchUpdate, Settled};
use crate::framer::LineFramer;
use crate::lenient;
use crate::reader::{ReadOutcome, StreamReader};
use crate::types::{MatchOptions, MatchRequest, MatchResult};
use crate::{Error, Result};
use bytes::Bytes;
use futures::stream::Stream;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde_json::{Value, json};
use std::fmt::Display;
use std::time::Duration;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// What the match endpoint answered with
#[derive(Debug)]
pub enum MatchResponse {
    /// An SSE body, not yet read
    Stream(reqwest::Response),
    /// A complete JSON document (non-JSON bodies arrive wrapped as text)
    Json(Value),
}

/// Client for the match endpoint.
///
/// Cheap to clone; clones share the underlying connection pool. The client
/// holds no per-run state, so any number of runs may be in flight at once.
#[derive(Debug, Clone)]
pub struct MatchClient {
    options: MatchOptions,
    http_client: reqwest::Client,
}

impl MatchClient {
    /// Creates a new client.
    ///
    /// `request_timeout` bounds connecting and waiting for response headers.
    /// The body is bounded only by the per-chunk inactivity window.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the HTTP client cannot be built.
    pub fn new(options: MatchOptions) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(options.request_timeout))
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            options,
            http_client,
        })
    }

    pub fn options(&self) -> &MatchOptions {
        &self.options
    }

    /// Posts `request` and classifies the response.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidInput`] if the request fails validation
    /// - [`Error::Http`] for connection failures
    /// - [`Error::Other`] if no response headers arrive within `request_timeout`
    /// - [`Error::Api`] for non-2xx responses, with the backend's message appended
    pub async fn submit(&self, request: &MatchRequest) -> Result<MatchResponse> {
        request.validate()?;

        let url = self.options.match_url();
        log::debug!("submitting match request to {}", url);

        let send = self
            .http_client
            .post(&url)
            .header(ACCEPT, "text/event-stream, application/json")
            .json(request)
            .send();

        let response = tokio::time::timeout(Duration::from_secs(self.options.request_timeout), send)
            .await
            .map_err(|_| {
                Error::other(format!(
                    "no response from {} within {}s",
                    url, self.options.request_timeout
                ))
            })?
            .map_err(Error::Http)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_else(|e| {
                log::warn!("failed to read error response body: {}", e);
                String::new()
            });
            return Err(Error::api(api_error_message(status, &body)));
        }

        let is_event_stream = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|content_type| content_type.contains("text/event-stream"));

        if is_event_stream {
            log::debug!("match response is an event stream");
            return Ok(MatchResponse::Stream(response));
        }

        let body = response.text().await?;
        Ok(MatchResponse::Json(match serde_json::from_str::<Value>(&body) {
            Ok(document) => document,
            Err(_) => {
                log::debug!("match response is not JSON; wrapping {} chars as text", body.len());
                json!({ "success": true, "response": body })
            }
        }))
    }

    /// Consumes an SSE response, reporting through `handler`.
    pub async fn process_stream<H>(&self, response: reqwest::Response, handler: &mut H)
    where
        H: MatchHandler + ?Sized,
    {
        consume_stream(Box::pin(response.bytes_stream()), &self.options, handler).await
    }

    /// Turns a non-streaming JSON response into a result.
    pub fn resolve_json(&self, document: Value) -> MatchResult {
        ResultAssembler::new(&self.options).from_document(document)
    }

    /// Submits `request` and reports the outcome through `handler`.
    ///
    /// Always ends in exactly one `on_complete` or `on_error`.
    pub async fn run<H>(&self, request: &MatchRequest, handler: &mut H)
    where
        H: MatchHandler + ?Sized,
    {
        match self.submit(request).await {
            Ok(MatchResponse::Stream(response)) => self.process_stream(response, handler).await,
            Ok(MatchResponse::Json(document)) => {
                let result = self.resolve_json(document);
                handler.on_complete(result, None);
            }
            Err(e) => {
                log::warn!("match request failed: {}", e);
                handler.on_error(&e.to_string());
            }
        }
    }

    /// Runs `request` on the tokio runtime and returns its updates as a stream.
    ///
    /// The stream ends after the terminal update.
    pub fn updates(&self, request: MatchRequest) -> UnboundedReceiverStream<MatchUpdate> {
        let (mut handler, updates) = ChannelHandler::channel();
        let client = self.clone();
        tokio::spawn(async move {
            client.run(&request, &mut handler).await;
        });
        updates
    }

    /// Submits `request` and waits for the final result.
    pub async fn match_once(&self, request: &MatchRequest) -> Result<MatchResult> {
        match self.submit(request).await? {
            MatchResponse::Json(document) => Ok(self.resolve_json(document)),
            MatchResponse::Stream(response) => {
                let mut collector = CollectingHandler::new();
                self.process_stream(response, &mut collector).await;
                match (collector.result, collector.error) {
                    (Some(result), _) => Ok(result),
                    (None, Some(message)) => Err(Error::other(message)),
                    (None, None) => Err(Error::other("stream finished without a result")),
                }
            }
        }
    }
}

/// One-shot convenience: builds a client from `options` and waits for the result.
pub async fn submit_match(request: &MatchRequest, options: &MatchOptions) -> Result<MatchResult> {
    MatchClient::new(options.clone())?.match_once(request).await
}

/// Drives one stream consumption from raw body chunks to `on_complete`.
///
/// The stream is owned by the reader for the whole consumption and released
/// when this function returns, on every path. Progress is reported as lines
/// are processed; after the stream ends (or is abandoned) the answer is
/// assembled and delivered together with the raw accumulated answer text.
pub async fn consume_stream<S, E, H>(stream: S, options: &MatchOptions, handler: &mut H)
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Unpin,
    E: Display,
    H: MatchHandler + ?Sized,
{
    let mut handler = Settled::new(handler);
    let mut reader = StreamReader::new(stream, options.inactivity_timeout);
    let mut framer = LineFramer::new();
    let mut accumulator = Accumulator::new();

    loop {
        match reader.read().await {
            Ok(ReadOutcome::Chunk(chunk)) => {
                feed_lines(framer.push(&chunk), &mut accumulator, &mut handler);
            }
            Ok(ReadOutcome::Done) => break,
            Err(e @ Error::StreamUnavailable(_)) => {
                log::warn!("{}", e);
                handler.on_error(&e.to_string());
                return;
            }
            Err(e) => {
                // Soft end: keep everything received so far.
                log::warn!(
                    "abandoning stream after {} bytes: {}",
                    reader.bytes_read(),
                    e
                );
                break;
            }
        }
    }

    if let Some(tail) = reader.finish() {
        feed_lines(framer.push(&tail), &mut accumulator, &mut handler);
    }
    if let Some(last_line) = framer.finish() {
        feed_lines(vec![last_line], &mut accumulator, &mut handler);
    }
    let bytes_read = reader.bytes_read();
    drop(reader);

    let state = accumulator.finish();
    log::debug!(
        "stream finished: {} bytes, {} events, {} malformed lines, end marker: {}",
        bytes_read,
        state.events_seen,
        state.malformed_lines,
        state.saw_end_marker
    );

    let raw_text = state.text_buffer.clone();
    let result = ResultAssembler::new(options).finish_stream(state);
    handler.on_complete(result, Some(raw_text));
}

fn feed_lines<H: MatchHandler>(lines: Vec<String>, accumulator: &mut Accumulator, handler: &mut H) {
    for line in lines {
        if let Some(progress) = accumulator.ingest_line(&line) {
            handler.on_progress(&progress);
        }
    }
}

/// `"<status>: <detail>"`, where detail is the body's `message` or `error`
/// field when the body is JSON, or the raw body otherwise.
fn api_error_message(status: reqwest::StatusCode, body: &str) -> String {
    let detail = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|document| {
            ["message", "error"]
                .iter()
                .find_map(|key| document.get(*key).and_then(lenient::value_to_text))
        })
        .unwrap_or_else(|| body.trim().to_string());

    if detail.is_empty() {
        status.to_string()
    } else {
        format!("{}: {}", status, detail)
    }
}
