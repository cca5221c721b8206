mod builder;
mod state;
mod stream;

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use stepwise_model::{AssistantMessage, ModelMessage};
use tokio::time::timeout;
use tracing::Instrument;

use crate::conversation::MemoryStore;
use crate::error::AgentError;
use crate::event::EventEmitter;
use crate::model_client::ModelClient;
use crate::tool::{ToolOutput, ToolRegistry};
pub use builder::AgentBuilder;
use state::Stage;
pub use stream::{RunEvent, RunStream};

/// The outcome of a successful run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RunResult {
    /// The final reply of the model, which carries no tool calls.
    pub response: AssistantMessage,
    /// Outputs of every tool call that succeeded during the run, in the
    /// order the model requested them.
    pub sources: Vec<ToolOutput>,
}

/// An agent instance, which owns one conversation, a model client and a
/// set of tools.
///
/// Each call to [`run`](Self::run) or [`run_streaming`](Self::run_streaming)
/// drives the conversation from a user input to a final reply, calling
/// tools as often as the model asks for them. Runs borrow the agent
/// mutably, so one agent never has two runs in flight. Use separate agents
/// for concurrent conversations.
pub struct Agent {
    name: Arc<str>,
    description: String,
    system_prompt: Option<String>,
    model_client: ModelClient,
    tools: ToolRegistry,
    memory: Box<dyn MemoryStore>,
    sources: Vec<ToolOutput>,
    events: EventEmitter,
    timeout: Duration,
    runs: u64,
}

impl Agent {
    /// Returns the display name of the agent.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the description of the agent.
    #[inline]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns the sources gathered by the current (or last) run.
    ///
    /// Sources are cleared when a new run starts.
    #[inline]
    pub fn sources(&self) -> &[ToolOutput] {
        &self.sources
    }

    /// Returns a snapshot of the conversation log.
    #[inline]
    pub fn messages(&self) -> Vec<ModelMessage> {
        self.memory.snapshot()
    }

    /// Runs the agent on a user input and waits for the final reply.
    ///
    /// Tool failures never end a run, they are reported back to the model.
    /// The run fails if the model service fails, or if it doesn't finish
    /// within the configured timeout.
    ///
    /// # Cancel safety
    ///
    /// Dropping the returned future stops the model request and aborts
    /// every running tool. Messages appended before that stay in the log.
    pub async fn run<S: Into<String>>(
        &mut self,
        input: S,
    ) -> Result<RunResult, AgentError> {
        let input = input.into();
        let limit = self.timeout;
        let span =
            info_span!("agent run", agent = %self.name, run = self.runs + 1);

        match timeout(limit, self.drive(input)).instrument(span).await {
            Ok(result) => result,
            Err(_) => {
                warn!("run timed out after {limit:?}");
                Err(AgentError::Timeout(limit))
            }
        }
    }

    async fn drive(&mut self, input: String) -> Result<RunResult, AgentError> {
        let mut stage = Stage::Start(input);
        loop {
            trace!("entering stage: {stage:?}");
            stage = match stage {
                Stage::Start(input) => {
                    Stage::AwaitingModel(self.begin_run(input))
                }
                Stage::AwaitingModel(request) => {
                    let reply = self.model_client.complete(request).await?;
                    self.accept_reply(reply.message)
                }
                Stage::ToolDispatch(calls) => {
                    Stage::AwaitingModel(self.dispatch_tools(calls).await)
                }
                Stage::Done(result) => return Ok(result),
            };
        }
    }
}
