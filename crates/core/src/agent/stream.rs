use std::time::Duration;

use async_stream::try_stream;
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use tokio::time::{Instant, timeout_at};
use tracing::{Instrument, Span};

use super::state::Stage;
use super::{Agent, RunResult};
use crate::error::AgentError;
use crate::model_client::ReplyFragment;

/// An item of a streaming run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunEvent {
    /// A piece of the final reply's text, in arrival order.
    Delta(String),
    /// The run has finished. Always the last item.
    Finished(RunResult),
}

/// The lazy sequence of events of a streaming run.
pub type RunStream<'a> = BoxStream<'a, Result<RunEvent, AgentError>>;

/// The time budget of one streaming run.
struct RunBudget {
    deadline: Instant,
    limit: Duration,
    span: Span,
}

impl RunBudget {
    async fn guard<F: Future>(&self, fut: F) -> Result<F::Output, AgentError> {
        timeout_at(self.deadline, fut.instrument(self.span.clone()))
            .await
            .map_err(|_| {
                warn!("run timed out after {:?}", self.limit);
                AgentError::Timeout(self.limit)
            })
    }
}

impl Agent {
    /// Runs the agent on a user input, streaming the final reply.
    ///
    /// Replies that request tools are consumed internally. Only the text
    /// of the final plain-text reply is forwarded, as
    /// [`RunEvent::Delta`]s, and the stream ends with
    /// [`RunEvent::Finished`]. Errors end the stream, with the same
    /// semantics as [`run`](Self::run).
    ///
    /// The stream is lazy: nothing happens until it's polled, and the
    /// timeout starts counting when this method is called. Dropping the
    /// stream stops the model request and aborts every running tool. A
    /// reply that was still being streamed is not persisted.
    pub fn run_streaming<S: Into<String>>(
        &mut self,
        input: S,
    ) -> RunStream<'_> {
        let input = input.into();
        let span = info_span!(
            "agent run",
            agent = %self.name,
            run = self.runs + 1,
            streaming = true
        );
        let budget = RunBudget {
            deadline: Instant::now() + self.timeout,
            limit: self.timeout,
            span,
        };

        Box::pin(try_stream! {
            let mut stage = Stage::Start(input);
            loop {
                trace!(parent: &budget.span, "entering stage: {stage:?}");
                stage = match stage {
                    Stage::Start(input) => {
                        let request =
                            budget.span.in_scope(|| self.begin_run(input));
                        Stage::AwaitingModel(request)
                    }
                    Stage::AwaitingModel(request) => {
                        let pending = budget
                            .guard(self.model_client.stream(request))
                            .await??;
                        let mut reply =
                            budget.guard(pending.classify()).await??;
                        let mut complete = None;
                        while let Some(fragment) =
                            budget.guard(reply.next()).await?
                        {
                            match fragment? {
                                ReplyFragment::Delta(delta) => {
                                    yield RunEvent::Delta(delta);
                                }
                                ReplyFragment::Complete(message) => {
                                    complete = Some(message);
                                }
                            }
                        }
                        let message = complete.unwrap_or_default().message;
                        budget.span.in_scope(|| self.accept_reply(message))
                    }
                    Stage::ToolDispatch(calls) => {
                        let request =
                            budget.guard(self.dispatch_tools(calls)).await?;
                        Stage::AwaitingModel(request)
                    }
                    Stage::Done(result) => {
                        yield RunEvent::Finished(result);
                        break;
                    }
                };
            }
        })
    }
}
