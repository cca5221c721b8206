//! Model invocation, buffered or streamed.

mod stream;

use std::future::poll_fn;
use std::mem;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use stepwise_model::{
    AssistantMessage, ModelFinishReason, ModelProvider, ModelRequest,
    ModelResponse, ModelResponseEvent,
};
use tracing::Instrument;

use crate::error::ModelError;
pub use stream::{PendingReply, ReplyFragment, ReplyKind, ReplyStream};

type EventResult = Result<Option<ModelResponseEvent>, ModelError>;

/// A [`ModelResponse`] with the provider's types erased.
pub(crate) trait ErasedResponse: Send {
    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<EventResult>;
}

impl<R: ModelResponse> ErasedResponse for R {
    #[inline]
    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<EventResult> {
        ModelResponse::poll_next_event(self, cx).map_err(ModelError::new)
    }
}

pub(crate) type BoxedResponse = Pin<Box<dyn ErasedResponse>>;

type SendRequestResult = Result<BoxedResponse, ModelError>;
type BoxedSendRequestFuture =
    Pin<Box<dyn Future<Output = SendRequestResult> + Send>>;
type HandlerFn =
    Arc<dyn Fn(ModelRequest) -> BoxedSendRequestFuture + Send + Sync>;

/// A wrapper around a model provider that provides a type-erased
/// interface for the other modules.
#[derive(Clone)]
pub struct ModelClient {
    handler_fn: HandlerFn,
}

impl ModelClient {
    /// Creates a client for the given provider.
    pub fn new<P: ModelProvider + 'static>(provider: P) -> Self {
        // We have to erase the type `P`, since `ModelClient` doesn't have a
        // generic parameter and we don't want it either.
        let handler_fn: HandlerFn = Arc::new(move |req| {
            let fut = provider.send_request(&req);
            Box::pin(
                async move {
                    trace!("got a request: {:?}", req);
                    match fut.await {
                        Ok(resp) => Ok(Box::pin(resp) as BoxedResponse),
                        Err(err) => {
                            error!("got an error: {err:?}");
                            Err(ModelError::new(err))
                        }
                    }
                }
                .instrument(trace_span!("model client req")),
            )
        });
        Self { handler_fn }
    }

    /// Sends a request and waits for the complete response.
    ///
    /// # Cancel safety
    ///
    /// This method is cancel safe. The response stops streaming further
    /// events when this operation is cancelled.
    pub async fn complete(
        &self,
        req: ModelRequest,
    ) -> Result<ModelReply, ModelError> {
        let mut resp = (self.handler_fn)(req).await?;
        let mut builder = ReplyBuilder::default();

        trace!("start receiving events");
        while let Some(event) =
            poll_fn(|cx| resp.as_mut().poll_next_event(cx)).await?
        {
            trace!("got an event: {event:?}");
            builder.push(event);
        }
        trace!("finished a request");

        Ok(builder.finish())
    }

    /// Sends a request and returns the response as soon as the model
    /// service accepted it.
    ///
    /// The response must be classified with [`PendingReply::classify`]
    /// before its content can be read.
    pub async fn stream(
        &self,
        req: ModelRequest,
    ) -> Result<PendingReply, ModelError> {
        let resp = (self.handler_fn)(req).await?;
        Ok(PendingReply::new(resp))
    }
}

/// A completely received response from the model.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ModelReply {
    /// The assembled message, including any tool calls.
    pub message: AssistantMessage,
    /// The reason the model finished generating, if it told us.
    pub finish_reason: Option<ModelFinishReason>,
}

#[derive(Default)]
pub(crate) struct ReplyBuilder {
    reply: ModelReply,
}

impl ReplyBuilder {
    /// Folds an event into the reply. Returns the text delta, if the
    /// event carried one.
    pub fn push(&mut self, event: ModelResponseEvent) -> Option<String> {
        match event {
            ModelResponseEvent::MessageDelta(delta) => {
                self.reply.message.content.push_str(&delta);
                Some(delta)
            }
            ModelResponseEvent::ToolCall(req) => {
                self.reply.message.tool_calls.push(req);
                None
            }
            ModelResponseEvent::Completed(reason) => {
                self.reply.finish_reason = Some(reason);
                None
            }
        }
    }

    #[inline]
    pub fn finish(&mut self) -> ModelReply {
        mem::take(&mut self.reply)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use stepwise_model::{ErrorKind, ModelMessage, ToolCallRequest};
    use stepwise_test_model::{PresetEvent, PresetResponse, TestModelProvider};

    use super::*;

    fn request(input: &str) -> ModelRequest {
        ModelRequest {
            messages: vec![ModelMessage::user(input)],
            tools: vec![],
        }
    }

    #[tokio::test]
    async fn test_complete() {
        let mut model_provider = TestModelProvider::default();
        model_provider.add_response(PresetResponse::with_events([
            PresetEvent::MessageDelta("Looking ".to_owned()),
            PresetEvent::MessageDelta("around.".to_owned()),
            PresetEvent::ToolCall(ToolCallRequest {
                id: "call_1".to_owned(),
                name: "glob".to_owned(),
                arguments: json!({ "pattern": "*.rs" }),
            }),
        ]));

        let model_client = ModelClient::new(model_provider.clone());

        for _ in 0..3 {
            let reply = model_client.complete(request("Hi")).await.unwrap();
            assert_eq!(reply.message.content, "Looking around.");
            assert_eq!(reply.message.tool_calls.len(), 1);
            assert_eq!(reply.finish_reason, Some(ModelFinishReason::ToolCalls));
        }
        assert_eq!(model_provider.requests().len(), 3);
        assert_eq!(model_provider.live_responses(), 0);
    }

    #[tokio::test]
    async fn test_error_handling() {
        let model_provider = TestModelProvider::default();
        let model_client = ModelClient::new(model_provider);
        let err = model_client.complete(request("Hi")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Other);
    }
}
