//! A scripted fake model for testing purpose.

#[macro_use]
extern crate tracing;

mod preset;

use std::collections::HashMap;
use std::error::Error as StdError;
use std::fmt::{self, Display, Formatter};
use std::future::ready;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, ready};
use std::time::Duration;

use stepwise_model::{
    ErrorKind, ModelFinishReason, ModelMessage, ModelProvider,
    ModelProviderError, ModelRequest, ModelResponse, ModelResponseEvent,
};
use tokio::time::{Sleep, sleep};

pub use preset::*;

#[derive(Debug)]
pub struct Error {
    message: &'static str,
    kind: ErrorKind,
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.kind)
    }
}

impl StdError for Error {}

impl ModelProviderError for Error {
    #[inline]
    fn kind(&self) -> ErrorKind {
        self.kind
    }
}

#[derive(Default)]
struct Records {
    requests: Mutex<Vec<ModelRequest>>,
    attempts: Mutex<HashMap<usize, u64>>,
    live_responses: AtomicUsize,
}

pub struct TestModelResponse {
    preset: PresetResponse,
    delay: Duration,
    event_idx: usize,
    sleep: Option<Pin<Box<Sleep>>>,
    records: Arc<Records>,
}

impl ModelResponse for TestModelResponse {
    type Error = crate::Error;

    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, Self::Error>> {
        let this = self.get_mut();
        let events = &this.preset.events;
        if this.event_idx > events.len() {
            // In case this method is called after completion.
            return Poll::Ready(Ok(None));
        }

        let delay = this.delay;
        let sleep = this.sleep.get_or_insert_with(|| Box::pin(sleep(delay)));
        ready!(sleep.as_mut().poll(cx));
        this.sleep = None;

        let event = match events.get(this.event_idx) {
            Some(PresetEvent::MessageDelta(msg)) => {
                ModelResponseEvent::MessageDelta(msg.clone())
            }
            Some(PresetEvent::ToolCall(req)) => {
                ModelResponseEvent::ToolCall(req.clone())
            }
            None => ModelResponseEvent::Completed(
                if this.preset.has_tool_call() {
                    ModelFinishReason::ToolCalls
                } else {
                    ModelFinishReason::Stop
                },
            ),
        };
        this.event_idx += 1;
        Poll::Ready(Ok(Some(event)))
    }
}

impl Drop for TestModelResponse {
    fn drop(&mut self) {
        self.records.live_responses.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A local fake model for testing purpose.
///
/// Before sending requests, you need to setup the script, which is how
/// the model should respond in each round. A round is selected by the
/// number of assistant messages already present in the request, so the
/// first request of a conversation gets the first preset, the request
/// that carries the results of the first tool calls gets the second one,
/// and so on. If there are no enough presets in the script, an error
/// will be returned.
///
/// Clones share the recorded requests, so a test can keep a clone around
/// for inspection after handing the provider to an agent.
///
/// # Note
///
/// This type is not optimized for production use, there are heavy memory
/// copies involved. You should only use it for testing.
#[derive(Clone, Default)]
pub struct TestModelProvider {
    script: Vec<PresetResponse>,
    delay: Option<Duration>,
    records: Arc<Records>,
}

impl TestModelProvider {
    /// Appends the response for the next round.
    #[inline]
    pub fn add_response(&mut self, preset: PresetResponse) {
        self.script.push(preset);
    }

    /// Sets the delay before each event, 1ms by default.
    #[inline]
    pub fn set_delay(&mut self, duration: Duration) {
        self.delay = Some(duration);
    }

    /// Returns all requests received so far.
    pub fn requests(&self) -> Vec<ModelRequest> {
        match self.records.requests.lock() {
            Ok(requests) => requests.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Returns the number of responses that have been created but not
    /// dropped yet.
    #[inline]
    pub fn live_responses(&self) -> usize {
        self.records.live_responses.load(Ordering::SeqCst)
    }

    fn should_fail(&self, round: usize, preset: &PresetResponse) -> bool {
        let Some(failures) = preset.failures else {
            return false;
        };
        let mut attempts = match self.records.attempts.lock() {
            Ok(attempts) => attempts,
            Err(poisoned) => poisoned.into_inner(),
        };
        let attempt = attempts.entry(round).or_default();
        *attempt += 1;
        failures == 0 || *attempt <= failures
    }
}

impl ModelProvider for TestModelProvider {
    type Error = crate::Error;
    type Response = TestModelResponse;

    fn send_request(
        &self,
        req: &ModelRequest,
    ) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send + 'static
    {
        if let Ok(mut requests) = self.records.requests.lock() {
            requests.push(req.clone());
        }

        let round = req
            .messages
            .iter()
            .filter(|msg| matches!(msg, ModelMessage::Assistant(_)))
            .count();
        trace!("scripted round {round}");

        let result = match self.script.get(round) {
            None => Err(Error {
                message: "no enough steps",
                kind: ErrorKind::Other,
            }),
            Some(preset) if self.should_fail(round, preset) => Err(Error {
                message: "scripted failure",
                kind: ErrorKind::RateLimitExceeded,
            }),
            Some(preset) => {
                self.records.live_responses.fetch_add(1, Ordering::SeqCst);
                Ok(TestModelResponse {
                    preset: preset.clone(),
                    delay: self.delay.unwrap_or(Duration::from_millis(1)),
                    event_idx: 0,
                    sleep: None,
                    records: Arc::clone(&self.records),
                })
            }
        };
        ready(result)
    }
}
