use std::time::Duration;

use stepwise_core::event::{EventSink, ProgressNotice};
use stepwise_core::{Agent, AgentBuilder, AgentError, RunResult, RunStream};
use stepwise_model::{ModelMessage, ModelProvider};

use crate::tools::*;

const SESSION_AGENT_NAME: &str = "stepwise";
const SESSION_AGENT_DESCRIPTION: &str =
    "Answers questions about files on this machine.";

/// A session builder.
///
/// See [`Session`].
pub struct SessionBuilder {
    agent_builder: AgentBuilder,
}

impl SessionBuilder {
    /// Creates a session builder with a specified model provider.
    pub fn with_model_provider<M: ModelProvider + 'static>(
        provider: M,
    ) -> Self {
        let agent_builder = AgentBuilder::with_model_provider(provider)
            .with_name(SESSION_AGENT_NAME)
            .with_description(SESSION_AGENT_DESCRIPTION);
        Self { agent_builder }
    }

    /// Sets the system prompt for the agent.
    #[inline]
    pub fn with_system_prompt<S: Into<String>>(mut self, prompt: S) -> Self {
        self.agent_builder = self.agent_builder.with_system_prompt(prompt);
        self
    }

    /// Seeds the session with earlier messages.
    #[inline]
    pub fn with_history<I>(mut self, history: I) -> Self
    where
        I: IntoIterator<Item = ModelMessage>,
    {
        self.agent_builder = self.agent_builder.with_history(history);
        self
    }

    /// Sets the time limit of each message.
    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent_builder = self.agent_builder.with_timeout(timeout);
        self
    }

    /// Publishes progress notices to `sink`.
    #[inline]
    pub fn with_event_sink<S: EventSink>(mut self, sink: S) -> Self {
        self.agent_builder = self.agent_builder.with_event_sink(sink);
        self
    }

    /// Attaches a callback to be invoked for every progress notice.
    #[inline]
    pub fn on_progress(
        mut self,
        on_progress: impl Fn(ProgressNotice) + Send + Sync + 'static,
    ) -> Self {
        self.agent_builder = self.agent_builder.on_progress(on_progress);
        self
    }

    /// Builds a new session.
    pub fn build(self) -> Session {
        let agent = self
            .agent_builder
            .with_tool(GlobTool::new())
            .with_context_aware_tool(ReadFileTool::new())
            .build();

        Session { agent }
    }
}

/// A chat session, like a window that displays messages and has a input box.
///
/// The session holds a fully configured agent that you can use directly, and it
/// is basically a wrapper around [`Agent`].
pub struct Session {
    agent: Agent,
}

impl Session {
    /// Sends a message and waits for the complete answer.
    #[inline]
    pub async fn send_message(
        &mut self,
        message: &str,
    ) -> Result<RunResult, AgentError> {
        self.agent.run(message).await
    }

    /// Sends a message and streams the answer as it is generated.
    #[inline]
    pub fn stream_message(&mut self, message: &str) -> RunStream<'_> {
        self.agent.run_streaming(message)
    }

    /// Returns the underlying agent.
    #[inline]
    pub fn agent(&self) -> &Agent {
        &self.agent
    }
}
