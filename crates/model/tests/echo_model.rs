use std::collections::VecDeque;
use std::error::Error;
use std::fmt::{self, Display, Formatter};
use std::future::{poll_fn, ready};
use std::pin::Pin;
use std::task::{self, Poll, ready};
use std::time::Duration;

use serde_json::json;
use stepwise_model::{
    AssistantMessage, ErrorKind, ModelFinishReason, ModelMessage,
    ModelProvider, ModelProviderError, ModelRequest, ModelResponse,
    ModelResponseEvent, ToolCallRequest,
};
use tokio::time::{Sleep, sleep};

#[derive(Debug)]
struct EchoError(ErrorKind);

impl Display for EchoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "echo model failed: {}", self.0)
    }
}

impl Error for EchoError {}

impl ModelProviderError for EchoError {
    fn kind(&self) -> ErrorKind {
        self.0
    }
}

/// Echoes the last user message word by word. A message starting with
/// `!` is turned into a tool call instead.
struct EchoResponse {
    pending: VecDeque<ModelResponseEvent>,
    sleep: Option<Pin<Box<Sleep>>>,
}

impl EchoResponse {
    fn new(input: &str) -> Self {
        let mut pending = VecDeque::new();
        if let Some(tool) = input.strip_prefix('!') {
            pending.push_back(ModelResponseEvent::ToolCall(ToolCallRequest {
                id: "call:0".to_owned(),
                name: tool.to_owned(),
                arguments: json!({}),
            }));
            pending.push_back(ModelResponseEvent::Completed(
                ModelFinishReason::ToolCalls,
            ));
        } else {
            let words: Vec<_> = format!("You said {input}")
                .split(' ')
                .map(ToString::to_string)
                .collect();
            let last = words.len().saturating_sub(1);
            for (idx, mut word) in words.into_iter().enumerate() {
                if idx != last {
                    word.push(' ');
                }
                pending.push_back(ModelResponseEvent::MessageDelta(word));
            }
            let completed =
                ModelResponseEvent::Completed(ModelFinishReason::Stop);
            pending.push_back(completed);
        }
        Self {
            pending,
            sleep: None,
        }
    }
}

impl ModelResponse for EchoResponse {
    type Error = EchoError;

    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut task::Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, Self::Error>> {
        let this = self.get_mut();
        let sleep = this
            .sleep
            .get_or_insert_with(|| Box::pin(sleep(Duration::from_millis(1))));
        ready!(sleep.as_mut().poll(cx));
        this.sleep = None;
        Poll::Ready(Ok(this.pending.pop_front()))
    }
}

struct EchoProvider;

impl ModelProvider for EchoProvider {
    type Error = EchoError;
    type Response = EchoResponse;

    fn send_request(
        &self,
        req: &ModelRequest,
    ) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send + 'static
    {
        let last_user = req.messages.iter().rev().find_map(|msg| match msg {
            ModelMessage::User { content } => Some(content.as_str()),
            _ => None,
        });
        let result = match last_user {
            Some(input) => Ok(EchoResponse::new(input)),
            None => Err(EchoError(ErrorKind::Rejected)),
        };
        ready(result)
    }
}

async fn collect(mut resp: EchoResponse) -> AssistantMessage {
    let mut reply = AssistantMessage::default();
    while let Some(event) =
        poll_fn(|cx| Pin::new(&mut resp).poll_next_event(cx))
            .await
            .unwrap()
    {
        match event {
            ModelResponseEvent::MessageDelta(delta) => {
                reply.content.push_str(&delta)
            }
            ModelResponseEvent::ToolCall(req) => reply.tool_calls.push(req),
            ModelResponseEvent::Completed(_) => {}
        }
    }
    reply
}

#[tokio::test]
async fn test_text_completion() {
    let req = ModelRequest {
        messages: vec![
            ModelMessage::system("Be polite."),
            ModelMessage::user("Good morning"),
        ],
        tools: vec![],
    };
    let resp = EchoProvider.send_request(&req).await.unwrap();
    let reply = collect(resp).await;
    assert_eq!(reply.content, "You said Good morning");
    assert!(!reply.has_tool_calls());
}

#[tokio::test]
async fn test_tool_call_completion() {
    let req = ModelRequest {
        messages: vec![ModelMessage::user("!clock")],
        tools: vec![],
    };
    let resp = EchoProvider.send_request(&req).await.unwrap();
    let reply = collect(resp).await;
    assert!(reply.content.is_empty());
    assert_eq!(reply.tool_calls.len(), 1);
    assert_eq!(reply.tool_calls[0].name, "clock");
}

#[tokio::test]
async fn test_error() {
    let req = ModelRequest {
        messages: vec![],
        tools: vec![],
    };
    let Err(err) = EchoProvider.send_request(&req).await else {
        panic!("expected an error");
    };
    assert_eq!(err.kind(), ErrorKind::Rejected);
}
