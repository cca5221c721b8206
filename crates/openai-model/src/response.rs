use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use futures_util::future::BoxFuture;
use pin_project_lite::pin_project;
use serde_json::Value;
use stepwise_model::{
    ErrorKind, ModelFinishReason, ModelResponse, ModelResponseEvent,
    ToolCallRequest,
};

use crate::Error;
use crate::io::{Sse, SseError};
use crate::proto::{ChatCompletionChunk, ToolCallDelta};

/// A tool call whose fragments are still arriving.
#[derive(Default)]
struct PartialToolCall {
    index: u32,
    id: String,
    name: String,
    arguments: String,
}

impl PartialToolCall {
    fn merge(&mut self, delta: ToolCallDelta) {
        if let Some(id) = delta.id {
            self.id.push_str(&id);
        }
        if let Some(function) = delta.function {
            if let Some(name) = function.name {
                self.name.push_str(&name);
            }
            if let Some(arguments) = function.arguments {
                self.arguments.push_str(&arguments);
            }
        }
    }

    fn finish(self) -> ToolCallRequest {
        let arguments = if self.arguments.trim().is_empty() {
            Value::Object(Default::default())
        } else {
            serde_json::from_str(&self.arguments).unwrap_or_else(|err| {
                // Let the tool reject it, so the model gets to see why.
                warn!("tool call {} has malformed arguments: {err}", self.id);
                Value::String(self.arguments)
            })
        };
        ToolCallRequest {
            id: self.id,
            name: self.name,
            arguments,
        }
    }
}

struct StreamState {
    sse: Sse,
    id: Option<String>,
    // Tool calls are streamed one after another, so at most the last one
    // is incomplete.
    partial_tool_call: Option<PartialToolCall>,
    pending: VecDeque<ModelResponseEvent>,
    finished: bool,
}

impl StreamState {
    fn flush_tool_call(&mut self) {
        if let Some(partial) = self.partial_tool_call.take() {
            self.pending
                .push_back(ModelResponseEvent::ToolCall(partial.finish()));
        }
    }

    fn push_tool_call_delta(&mut self, delta: ToolCallDelta) {
        if let Some(partial) = &mut self.partial_tool_call {
            if partial.index == delta.index {
                partial.merge(delta);
                return;
            }
        }
        self.flush_tool_call();
        let mut partial = PartialToolCall {
            index: delta.index,
            ..Default::default()
        };
        partial.merge(delta);
        self.partial_tool_call = Some(partial);
    }

    fn finish(&mut self, reason: ModelFinishReason) {
        self.flush_tool_call();
        self.pending.push_back(ModelResponseEvent::Completed(reason));
        self.finished = true;
    }

    fn process_chunk(
        &mut self,
        chunk: ChatCompletionChunk,
    ) -> Result<(), Error> {
        if self.id.get_or_insert_with(|| chunk.id.clone()) != &chunk.id {
            return Err(Error::new("chunk id mismatch", ErrorKind::Other));
        }

        // The usage chunk carries no choices.
        let Some(choice) = chunk.choices.into_iter().next() else {
            return Ok(());
        };

        if let Some(content) = choice.delta.content {
            if !content.is_empty() {
                self.pending
                    .push_back(ModelResponseEvent::MessageDelta(content));
            }
        }
        for delta in choice.delta.tool_calls.into_iter().flatten() {
            self.push_tool_call_delta(delta);
        }

        match choice.finish_reason.as_deref() {
            None => {}
            Some("tool_calls" | "function_call") => {
                self.finish(ModelFinishReason::ToolCalls)
            }
            Some("content_filter") => {
                return Err(Error::new(
                    "the response was filtered",
                    ErrorKind::Moderated,
                ));
            }
            Some(_) => self.finish(ModelFinishReason::Stop),
        }
        Ok(())
    }
}

type NextEvent = Result<(Option<ModelResponseEvent>, StreamState), Error>;

pin_project! {
    /// A streamed chat completion.
    pub struct OpenAIResponse {
        next_event_fut: Option<BoxFuture<'static, NextEvent>>,
    }
}

impl OpenAIResponse {
    #[inline]
    pub fn from_sse(sse: Sse) -> Self {
        let state = StreamState {
            sse,
            id: None,
            partial_tool_call: None,
            pending: VecDeque::new(),
            finished: false,
        };
        Self {
            next_event_fut: Some(Box::pin(next_event(state))),
        }
    }
}

impl ModelResponse for OpenAIResponse {
    type Error = crate::Error;

    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, Self::Error>> {
        let this = self.project();
        let Some(next_event_fut) = this.next_event_fut else {
            return Poll::Ready(Ok(None));
        };
        let result = ready!(next_event_fut.as_mut().poll(cx));
        match result {
            Ok((Some(event), state)) => {
                *this.next_event_fut = Some(Box::pin(next_event(state)));
                Poll::Ready(Ok(Some(event)))
            }
            Ok((None, _)) => {
                *this.next_event_fut = None;
                Poll::Ready(Ok(None))
            }
            Err(err) => {
                *this.next_event_fut = None;
                Poll::Ready(Err(err))
            }
        }
    }
}

async fn next_event(mut state: StreamState) -> NextEvent {
    loop {
        if let Some(event) = state.pending.pop_front() {
            return Ok((Some(event), state));
        }
        if state.finished {
            return Ok((None, state));
        }

        let data = match state.sse.next_event().await {
            Ok(Some(data)) if data != "[DONE]" => data,
            Ok(_) => {
                // The server closed the stream without a finish reason.
                debug!("stream ended without a finish reason");
                state.flush_tool_call();
                state.finished = true;
                continue;
            }
            Err(SseError::Chunks(err)) => {
                return Err(Error::new(
                    err.to_string(),
                    ErrorKind::Unreachable,
                ));
            }
            Err(err) => {
                return Err(Error::new(err.to_string(), ErrorKind::Other));
            }
        };
        trace!("got sse event: {data}");

        let chunk = serde_json::from_str::<ChatCompletionChunk>(&data)
            .map_err(|err| Error::new(format!("{err}"), ErrorKind::Other))?;
        state.process_chunk(chunk)?;
    }
}
