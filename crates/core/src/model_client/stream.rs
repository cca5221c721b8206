use std::collections::VecDeque;
use std::future::poll_fn;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use futures_util::{Stream, StreamExt};
use stepwise_model::{ModelFinishReason, ModelResponseEvent};

use super::{BoxedResponse, ModelReply, ReplyBuilder};
use crate::error::ModelError;

/// What a streamed response turned out to be.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ReplyKind {
    /// The model requests tool calls. The content is delivered in one
    /// piece once fully assembled.
    ToolCall,
    /// The model answers with text. The content is delivered fragment by
    /// fragment.
    PlainText,
}

/// An item of a [`ReplyStream`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReplyFragment {
    /// A piece of text, in arrival order.
    Delta(String),
    /// The assembled reply. Always the last item.
    Complete(ModelReply),
}

/// A streamed response that has not been classified yet.
pub struct PendingReply {
    response: BoxedResponse,
}

impl PendingReply {
    #[inline]
    pub(crate) fn new(response: BoxedResponse) -> Self {
        Self { response }
    }

    /// Reads ahead until it is clear whether the response is a tool-call
    /// response or a plain-text one.
    ///
    /// The first non-empty text delta makes it plain text; a tool call,
    /// or the model finishing for tool calls, makes it a tool call. A
    /// response that ends before anything decisive is plain text. Events
    /// read during classification are not lost, the returned stream
    /// replays them.
    pub async fn classify(self) -> Result<ReplyStream, ModelError> {
        let mut response = self.response;
        let mut lookahead = VecDeque::new();

        let (kind, exhausted) = loop {
            let event =
                poll_fn(|cx| response.as_mut().poll_next_event(cx)).await?;
            let Some(event) = event else {
                break (ReplyKind::PlainText, true);
            };
            let kind = classify_event(&event);
            lookahead.push_back(event);
            if let Some(kind) = kind {
                break (kind, false);
            }
        };
        debug!("classified the reply as {kind:?}");

        Ok(ReplyStream {
            kind,
            response: if exhausted { None } else { Some(response) },
            lookahead,
            builder: ReplyBuilder::default(),
            done: false,
        })
    }
}

fn classify_event(event: &ModelResponseEvent) -> Option<ReplyKind> {
    match event {
        ModelResponseEvent::MessageDelta(delta) if delta.is_empty() => None,
        ModelResponseEvent::MessageDelta(_) => Some(ReplyKind::PlainText),
        ModelResponseEvent::ToolCall(_) => Some(ReplyKind::ToolCall),
        ModelResponseEvent::Completed(ModelFinishReason::ToolCalls) => {
            Some(ReplyKind::ToolCall)
        }
        ModelResponseEvent::Completed(ModelFinishReason::Stop) => {
            Some(ReplyKind::PlainText)
        }
    }
}

/// A classified streamed response.
///
/// For [`ReplyKind::ToolCall`] the stream yields a single
/// [`ReplyFragment::Complete`]. For [`ReplyKind::PlainText`] it yields
/// every text delta as it arrives, then the complete reply whose content
/// is the concatenation of the deltas. Tool calls that show up after a
/// reply was classified as plain text are discarded.
///
/// Dropping the stream drops the underlying response, which stops the
/// generation.
pub struct ReplyStream {
    kind: ReplyKind,
    response: Option<BoxedResponse>,
    lookahead: VecDeque<ModelResponseEvent>,
    builder: ReplyBuilder,
    done: bool,
}

impl ReplyStream {
    /// Returns the classification of this response.
    #[inline]
    pub fn kind(&self) -> ReplyKind {
        self.kind
    }

    /// Drains the stream and returns the complete reply.
    pub async fn into_reply(mut self) -> Result<ModelReply, ModelError> {
        let mut reply = None;
        while let Some(fragment) = self.next().await {
            if let ReplyFragment::Complete(complete) = fragment? {
                reply = Some(complete);
            }
        }
        Ok(reply.unwrap_or_default())
    }

    fn poll_event(
        &mut self,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, ModelError>> {
        if let Some(event) = self.lookahead.pop_front() {
            return Poll::Ready(Ok(Some(event)));
        }
        let Some(response) = &mut self.response else {
            return Poll::Ready(Ok(None));
        };
        let result = ready!(response.as_mut().poll_next_event(cx));
        if !matches!(result, Ok(Some(_))) {
            // Release the response as soon as it has nothing more to say.
            self.response = None;
        }
        Poll::Ready(result)
    }
}

impl Stream for ReplyStream {
    type Item = Result<ReplyFragment, ModelError>;

    fn poll_next(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            if this.done {
                return Poll::Ready(None);
            }
            let event = match ready!(this.poll_event(cx)) {
                Ok(Some(event)) => event,
                Ok(None) => {
                    this.done = true;
                    let reply = this.builder.finish();
                    return Poll::Ready(Some(Ok(ReplyFragment::Complete(
                        reply,
                    ))));
                }
                Err(err) => {
                    this.done = true;
                    return Poll::Ready(Some(Err(err)));
                }
            };

            match (this.kind, event) {
                (ReplyKind::PlainText, ModelResponseEvent::ToolCall(req)) => {
                    warn!(
                        "discarding tool call `{}` after a text reply",
                        req.name
                    );
                }
                (ReplyKind::PlainText, event) => {
                    if let Some(delta) = this.builder.push(event) {
                        if !delta.is_empty() {
                            let fragment = ReplyFragment::Delta(delta);
                            return Poll::Ready(Some(Ok(fragment)));
                        }
                    }
                }
                (ReplyKind::ToolCall, event) => {
                    this.builder.push(event);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use stepwise_model::{ModelMessage, ModelRequest, ToolCallRequest};
    use stepwise_test_model::{PresetEvent, PresetResponse, TestModelProvider};

    use super::*;
    use crate::model_client::ModelClient;

    fn request() -> ModelRequest {
        ModelRequest {
            messages: vec![ModelMessage::user("Hi")],
            tools: vec![],
        }
    }

    fn tool_call(id: &str) -> ToolCallRequest {
        ToolCallRequest {
            id: id.to_owned(),
            name: "glob".to_owned(),
            arguments: json!({ "pattern": "*" }),
        }
    }

    async fn stream_of(preset: PresetResponse) -> ReplyStream {
        let mut model_provider = TestModelProvider::default();
        model_provider.add_response(preset);
        let model_client = ModelClient::new(model_provider);
        let pending = model_client.stream(request()).await.unwrap();
        pending.classify().await.unwrap()
    }

    #[tokio::test]
    async fn test_tool_call_reply_is_delivered_assembled() {
        let mut stream = stream_of(PresetResponse::with_events([
            PresetEvent::ToolCall(tool_call("call_1")),
            PresetEvent::MessageDelta("checking".to_owned()),
            PresetEvent::ToolCall(tool_call("call_2")),
        ]))
        .await;
        assert_eq!(stream.kind(), ReplyKind::ToolCall);

        let mut fragments = vec![];
        while let Some(fragment) = stream.next().await {
            fragments.push(fragment.unwrap());
        }
        assert_eq!(fragments.len(), 1);
        let ReplyFragment::Complete(reply) = &fragments[0] else {
            panic!("expected the assembled reply, got {fragments:?}");
        };
        assert_eq!(reply.message.content, "checking");
        assert_eq!(
            reply.message.tool_calls,
            [tool_call("call_1"), tool_call("call_2")]
        );
    }

    #[tokio::test]
    async fn test_plain_text_reply_is_forwarded_in_order() {
        let parts = ["The ", "", "answer ", "is ", "42."];
        let mut stream = stream_of(PresetResponse::text(parts)).await;
        assert_eq!(stream.kind(), ReplyKind::PlainText);

        let mut deltas = vec![];
        let mut complete = None;
        while let Some(fragment) = stream.next().await {
            match fragment.unwrap() {
                ReplyFragment::Delta(delta) => {
                    assert!(
                        complete.is_none(),
                        "delta after the complete reply"
                    );
                    deltas.push(delta);
                }
                ReplyFragment::Complete(reply) => complete = Some(reply),
            }
        }
        assert_eq!(deltas, ["The ", "answer ", "is ", "42."]);
        let complete = complete.unwrap();
        assert_eq!(complete.message.content, deltas.concat());
        assert!(complete.message.tool_calls.is_empty());
    }

    #[tokio::test]
    async fn test_late_tool_call_is_discarded() {
        let reply = stream_of(PresetResponse::with_events([
            PresetEvent::MessageDelta("Let me see.".to_owned()),
            PresetEvent::ToolCall(tool_call("call_1")),
        ]))
        .await
        .into_reply()
        .await
        .unwrap();
        assert_eq!(reply.message.content, "Let me see.");
        assert!(reply.message.tool_calls.is_empty());
    }

    #[tokio::test]
    async fn test_empty_reply_is_plain_text() {
        let stream =
            stream_of(PresetResponse::text(Vec::<String>::new())).await;
        assert_eq!(stream.kind(), ReplyKind::PlainText);
        let reply = stream.into_reply().await.unwrap();
        assert_eq!(reply.message.content, "");
        assert_eq!(reply.finish_reason, Some(ModelFinishReason::Stop));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_releases_the_response() {
        let mut model_provider = TestModelProvider::default();
        model_provider.set_delay(Duration::from_millis(10));
        model_provider.add_response(PresetResponse::text(["a", "b", "c", "d"]));
        let model_client = ModelClient::new(model_provider.clone());

        let mut stream = model_client
            .stream(request())
            .await
            .unwrap()
            .classify()
            .await
            .unwrap();
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first, ReplyFragment::Delta("a".to_owned()));
        assert_eq!(model_provider.live_responses(), 1);

        drop(stream);
        assert_eq!(model_provider.live_responses(), 0);
    }
}
