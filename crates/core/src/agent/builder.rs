use std::sync::Arc;
use std::time::Duration;

use stepwise_model::{ModelMessage, ModelProvider};

use super::Agent;
use crate::conversation::{Conversation, MemoryStore};
use crate::event::{CallbackSink, EventEmitter, EventSink, ProgressNotice};
use crate::model_client::ModelClient;
use crate::tool::{ContextAwareTool, Tool, ToolRegistry};

const DEFAULT_NAME: &str = "agent";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(360);

/// [`Agent`] builder.
pub struct AgentBuilder {
    model_client: ModelClient,
    name: String,
    description: String,
    system_prompt: Option<String>,
    history: Vec<ModelMessage>,
    tools: ToolRegistry,
    timeout: Duration,
    write_events: bool,
    event_sink: Option<Arc<dyn EventSink>>,
    memory: Option<Box<dyn MemoryStore>>,
}

impl AgentBuilder {
    /// Creates a new builder with the specified model provider.
    #[inline]
    pub fn with_model_provider<P: ModelProvider + 'static>(
        provider: P,
    ) -> Self {
        Self {
            model_client: ModelClient::new(provider),
            name: DEFAULT_NAME.to_owned(),
            description: String::new(),
            system_prompt: None,
            history: vec![],
            tools: ToolRegistry::default(),
            timeout: DEFAULT_TIMEOUT,
            write_events: true,
            event_sink: None,
            memory: None,
        }
    }

    /// Sets the display name, which is also the source of the agent's
    /// progress notices.
    #[inline]
    pub fn with_name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the description.
    #[inline]
    pub fn with_description<S: Into<String>>(mut self, description: S) -> Self {
        self.description = description.into();
        self
    }

    /// Sets the system prompt. It's added to the conversation once, when
    /// the first run starts.
    #[inline]
    pub fn with_system_prompt<S: Into<String>>(mut self, prompt: S) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Seeds the conversation with earlier messages.
    #[inline]
    pub fn with_history<I>(mut self, history: I) -> Self
    where
        I: IntoIterator<Item = ModelMessage>,
    {
        self.history.extend(history);
        self
    }

    /// Registers a tool.
    #[inline]
    pub fn with_tool<T: Tool>(mut self, tool: T) -> Self {
        self.tools.add_tool(tool);
        self
    }

    /// Registers a tool that receives the run context.
    #[inline]
    pub fn with_context_aware_tool<T: ContextAwareTool>(
        mut self,
        tool: T,
    ) -> Self {
        self.tools.add_context_aware_tool(tool);
        self
    }

    /// Sets the time limit of each run, 360 seconds by default.
    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Turns progress notices on or off. They are on by default, but
    /// nothing is published until a sink is attached.
    #[inline]
    pub fn write_events(mut self, enabled: bool) -> Self {
        self.write_events = enabled;
        self
    }

    /// Publishes progress notices to `sink`.
    #[inline]
    pub fn with_event_sink<S: EventSink>(mut self, sink: S) -> Self {
        self.event_sink = Some(Arc::new(sink));
        self
    }

    /// Publishes progress notices to a callback. The callback runs on the
    /// agent's task and must return promptly.
    #[inline]
    pub fn on_progress(
        self,
        callback: impl Fn(ProgressNotice) + Send + Sync + 'static,
    ) -> Self {
        self.with_event_sink(CallbackSink(callback))
    }

    /// Uses a custom store for the conversation, instead of an unbounded
    /// [`Conversation`].
    #[inline]
    pub fn with_memory<M: MemoryStore + 'static>(mut self, memory: M) -> Self {
        self.memory = Some(Box::new(memory));
        self
    }

    /// Builds the agent.
    pub fn build(self) -> Agent {
        let AgentBuilder {
            model_client,
            name,
            description,
            system_prompt,
            history,
            tools,
            timeout,
            write_events,
            event_sink,
            memory,
        } = self;

        let mut memory = memory.unwrap_or_else(|| {
            Box::new(Conversation::default()) as Box<dyn MemoryStore>
        });
        for msg in history {
            memory.append(msg);
        }

        let name: Arc<str> = Arc::from(name);
        let events = if write_events {
            EventEmitter::new(Arc::clone(&name), event_sink)
        } else {
            EventEmitter::disabled()
        };
        debug!(
            "built agent {name} with {} tools, events {}",
            tools.len(),
            if events.is_enabled() { "on" } else { "off" }
        );

        Agent {
            name,
            description,
            system_prompt,
            model_client,
            tools,
            memory,
            sources: vec![],
            events,
            timeout,
            runs: 0,
        }
    }
}
