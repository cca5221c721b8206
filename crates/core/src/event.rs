//! Progress notices published while the agent works.
//!
//! Notices are purely informational: publishing never blocks the agent,
//! failures to deliver are swallowed, and nothing the observer does can
//! affect the outcome of a run.

use std::fmt::{self, Debug};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};

/// A textual status notice.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProgressNotice {
    /// Name of the agent (or tool) that published the notice.
    pub source: String,
    /// The notice text, e.g. `Finished task`.
    pub message: String,
}

/// An observer that receives progress notices.
///
/// Implementations must return promptly. A sink that cannot accept a
/// notice right now should drop it.
pub trait EventSink: Send + Sync + 'static {
    /// Publishes a notice.
    fn publish(&self, notice: ProgressNotice);
}

impl EventSink for mpsc::Sender<ProgressNotice> {
    fn publish(&self, notice: ProgressNotice) {
        if let Err(err) = self.try_send(notice) {
            debug!("dropped a progress notice: {err}");
        }
    }
}

impl EventSink for mpsc::UnboundedSender<ProgressNotice> {
    fn publish(&self, notice: ProgressNotice) {
        if self.send(notice).is_err() {
            debug!("dropped a progress notice: receiver closed");
        }
    }
}

impl EventSink for broadcast::Sender<ProgressNotice> {
    fn publish(&self, notice: ProgressNotice) {
        // Having no subscribers at the moment is not an error.
        self.send(notice).ok();
    }
}

pub(crate) struct CallbackSink<F>(pub F);

impl<F> EventSink for CallbackSink<F>
where
    F: Fn(ProgressNotice) + Send + Sync + 'static,
{
    #[inline]
    fn publish(&self, notice: ProgressNotice) {
        (self.0)(notice)
    }
}

/// A cheap handle for emitting notices on behalf of a named source.
///
/// An emitter without a sink is disabled and ignores everything.
#[derive(Clone)]
pub struct EventEmitter {
    source: Arc<str>,
    sink: Option<Arc<dyn EventSink>>,
}

impl EventEmitter {
    /// Creates an emitter publishing to `sink` as `source`.
    #[inline]
    pub fn new(source: Arc<str>, sink: Option<Arc<dyn EventSink>>) -> Self {
        Self { source, sink }
    }

    /// Creates an emitter that drops everything.
    #[inline]
    pub fn disabled() -> Self {
        Self {
            source: Arc::from(""),
            sink: None,
        }
    }

    /// Returns `true` if notices are actually delivered somewhere.
    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.sink.is_some()
    }

    /// Emits a notice with this emitter's source name.
    pub fn emit<S: Into<String>>(&self, message: S) {
        let Some(sink) = &self.sink else {
            return;
        };
        let notice = ProgressNotice {
            source: self.source.to_string(),
            message: message.into(),
        };
        trace!("progress notice: {}", notice.message);
        sink.publish(notice);
    }
}

impl Debug for EventEmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventEmitter")
            .field("source", &self.source)
            .field("enabled", &self.is_enabled())
            .finish()
    }
}
