//! Caller-facing notifications for one match run.
//!
//! A run reports through three callbacks:
//!
//! - `on_progress(message)`: zero or more times, in arrival order
//! - `on_complete(result, raw_text)`: once, when the run produced a result
//!   (including the partial result of an abandoned stream)
//! - `on_error(message)`: once, when there was nothing to read at all
//!
//! Exactly one of `on_complete` / `on_error` fires per run and no progress is
//! reported after it. Implement [`MatchHandler`] directly, build a
//! [`Callbacks`] from closures, or use [`CollectingHandler`] /
//! [`ChannelHandler`].
//!
//! # Example
//!
//! ```rust
//! use school_match::Callbacks;
//!
//! let callbacks = Callbacks::new()
//!     .with_progress(|message| println!("… {message}"))
//!     .with_complete(|result, _raw| println!("done: {}", result.response))
//!     .with_error(|message| eprintln!("failed: {message}"));
//! ```

use crate::types::MatchResult;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// Receiver of progress, completion and error notifications
pub trait MatchHandler: Send {
    fn on_progress(&mut self, message: &str);
    fn on_complete(&mut self, result: MatchResult, raw_text: Option<String>);
    fn on_error(&mut self, message: &str);
}

impl<H: MatchHandler + ?Sized> MatchHandler for &mut H {
    fn on_progress(&mut self, message: &str) {
        (**self).on_progress(message)
    }

    fn on_complete(&mut self, result: MatchResult, raw_text: Option<String>) {
        (**self).on_complete(result, raw_text)
    }

    fn on_error(&mut self, message: &str) {
        (**self).on_error(message)
    }
}

impl<H: MatchHandler + ?Sized> MatchHandler for Box<H> {
    fn on_progress(&mut self, message: &str) {
        (**self).on_progress(message)
    }

    fn on_complete(&mut self, result: MatchResult, raw_text: Option<String>) {
        (**self).on_complete(result, raw_text)
    }

    fn on_error(&mut self, message: &str) {
        (**self).on_error(message)
    }
}

/// Type alias for a progress callback
pub type ProgressCallback = Box<dyn FnMut(&str) + Send>;

/// Type alias for a completion callback
pub type CompleteCallback = Box<dyn FnMut(MatchResult, Option<String>) + Send>;

/// Type alias for an error callback
pub type ErrorCallback = Box<dyn FnMut(&str) + Send>;

/// Closure-backed [`MatchHandler`]; unset callbacks do nothing
#[derive(Default)]
pub struct Callbacks {
    progress: Option<ProgressCallback>,
    complete: Option<CompleteCallback>,
    error: Option<ErrorCallback>,
}

impl Callbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_progress<F>(mut self, f: F) -> Self
    where
        F: FnMut(&str) + Send + 'static,
    {
        self.progress = Some(Box::new(f));
        self
    }

    pub fn with_complete<F>(mut self, f: F) -> Self
    where
        F: FnMut(MatchResult, Option<String>) + Send + 'static,
    {
        self.complete = Some(Box::new(f));
        self
    }

    pub fn with_error<F>(mut self, f: F) -> Self
    where
        F: FnMut(&str) + Send + 'static,
    {
        self.error = Some(Box::new(f));
        self
    }
}

impl MatchHandler for Callbacks {
    fn on_progress(&mut self, message: &str) {
        if let Some(f) = self.progress.as_mut() {
            f(message);
        }
    }

    fn on_complete(&mut self, result: MatchResult, raw_text: Option<String>) {
        if let Some(f) = self.complete.as_mut() {
            f(result, raw_text);
        }
    }

    fn on_error(&mut self, message: &str) {
        if let Some(f) = self.error.as_mut() {
            f(message);
        }
    }
}

impl std::fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Callbacks")
            .field("on_progress", &self.progress.is_some())
            .field("on_complete", &self.complete.is_some())
            .field("on_error", &self.error.is_some())
            .finish()
    }
}

/// Records every notification; handy for tests and one-shot callers
#[derive(Debug, Default)]
pub struct CollectingHandler {
    pub progress: Vec<String>,
    pub result: Option<MatchResult>,
    pub raw_text: Option<String>,
    pub error: Option<String>,
    /// Number of `on_complete` calls received
    pub completions: usize,
    /// Number of `on_error` calls received
    pub errors: usize,
}

impl CollectingHandler {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MatchHandler for CollectingHandler {
    fn on_progress(&mut self, message: &str) {
        self.progress.push(message.to_string());
    }

    fn on_complete(&mut self, result: MatchResult, raw_text: Option<String>) {
        self.completions += 1;
        self.result = Some(result);
        self.raw_text = raw_text;
    }

    fn on_error(&mut self, message: &str) {
        self.errors += 1;
        self.error = Some(message.to_string());
    }
}

/// One notification, as delivered on an update stream
#[derive(Debug, Clone, PartialEq)]
pub enum MatchUpdate {
    Progress(String),
    Complete {
        result: MatchResult,
        raw_text: Option<String>,
    },
    Failed(String),
}

impl MatchUpdate {
    /// Whether this update ends the run
    pub fn is_terminal(&self) -> bool {
        !matches!(self, MatchUpdate::Progress(_))
    }
}

/// Forwards notifications into an unbounded channel
#[derive(Debug, Clone)]
pub struct ChannelHandler {
    tx: mpsc::UnboundedSender<MatchUpdate>,
}

impl ChannelHandler {
    /// Creates a handler and the stream its updates arrive on.
    pub fn channel() -> (Self, UnboundedReceiverStream<MatchUpdate>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, UnboundedReceiverStream::new(rx))
    }

    fn send(&self, update: MatchUpdate) {
        if self.tx.send(update).is_err() {
            log::debug!("update receiver dropped; discarding update");
        }
    }
}

impl MatchHandler for ChannelHandler {
    fn on_progress(&mut self, message: &str) {
        self.send(MatchUpdate::Progress(message.to_string()));
    }

    fn on_complete(&mut self, result: MatchResult, raw_text: Option<String>) {
        self.send(MatchUpdate::Complete { result, raw_text });
    }

    fn on_error(&mut self, message: &str) {
        self.send(MatchUpdate::Failed(message.to_string()));
    }
}

/// Enforces the delivery contract on top of any handler: once the run is
/// settled, further notifications are dropped.
pub(crate) struct Settled<H> {
    inner: H,
    settled: bool,
}

impl<H: MatchHandler> Settled<H> {
    pub(crate) fn new(inner: H) -> Self {
        Self {
            inner,
            settled: false,
        }
    }
}

impl<H: MatchHandler> MatchHandler for Settled<H> {
    fn on_progress(&mut self, message: &str) {
        if self.settled {
            log::debug!("progress after completion dropped: {}", message);
            return;
        }
        self.inner.on_progress(message);
    }

    fn on_complete(&mut self, result: MatchResult, raw_text: Option<String>) {
        if self.settled {
            log::warn!("second completion dropped");
            return;
        }
        self.settled = true;
        self.inner.on_complete(result, raw_text);
    }

    fn on_error(&mut self, message: &str) {
        if self.settled {
            log::warn!("error after completion dropped: {}", message);
            return;
        }
        self.settled = true;
        self.inner.on_error(message);
    }
}
