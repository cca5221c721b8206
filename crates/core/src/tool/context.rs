use std::sync::Arc;

use crate::event::EventEmitter;

/// Run-scoped context handed to [`ContextAwareTool`]s.
///
/// [`ContextAwareTool`]: super::ContextAwareTool
#[derive(Clone, Debug)]
pub struct RunContext {
    agent_name: Arc<str>,
    run_id: u64,
    events: EventEmitter,
}

impl RunContext {
    /// Creates a context. The agent does this for every run, tools only
    /// need it for testing.
    #[inline]
    pub fn new(
        agent_name: Arc<str>,
        run_id: u64,
        events: EventEmitter,
    ) -> Self {
        Self {
            agent_name,
            run_id,
            events,
        }
    }

    /// Returns the name of the agent running the tool.
    #[inline]
    pub fn agent_name(&self) -> &str {
        &self.agent_name
    }

    /// Returns the number of the current run, starting from 1 for the
    /// first run of an agent.
    #[inline]
    pub fn run_id(&self) -> u64 {
        self.run_id
    }

    /// Publishes a progress notice on behalf of the agent. Does nothing
    /// if the agent doesn't publish notices.
    #[inline]
    pub fn emit<S: Into<String>>(&self, message: S) {
        self.events.emit(message);
    }
}
