use std::fmt::{self, Debug};
use std::sync::Arc;

use stepwise_model::{
    AssistantMessage, ModelMessage, ModelRequest, ToolCallRequest,
    ToolCallResult,
};

use super::{Agent, RunResult};
use crate::tool::{ErrorKind, RunContext, ToolOutput};

/// The stages of a run.
pub(super) enum Stage {
    Start(String),
    AwaitingModel(ModelRequest),
    ToolDispatch(Vec<ToolCallRequest>),
    Done(RunResult),
}

impl Debug for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Start(_) => f.write_str("Start"),
            Stage::AwaitingModel(req) => {
                write!(f, "AwaitingModel({} messages)", req.messages.len())
            }
            Stage::ToolDispatch(calls) => {
                write!(f, "ToolDispatch({} calls)", calls.len())
            }
            Stage::Done(_) => f.write_str("Done"),
        }
    }
}

impl Agent {
    /// `Start -> AwaitingModel`.
    pub(super) fn begin_run(&mut self, input: String) -> ModelRequest {
        self.runs += 1;
        self.sources.clear();

        if let Some(prompt) = &self.system_prompt {
            let msg = ModelMessage::system(prompt.as_str());
            if !self.memory.contains(&msg) {
                self.memory.append(msg);
            }
        }
        self.events.emit(format!("Start to work on: {input}"));
        self.memory.append(ModelMessage::user(input));

        debug!("run {} started", self.runs);
        self.build_request()
    }

    /// `AwaitingModel -> Done | ToolDispatch`.
    pub(super) fn accept_reply(&mut self, reply: AssistantMessage) -> Stage {
        self.memory.append(ModelMessage::Assistant(reply.clone()));

        if !reply.has_tool_calls() {
            self.events.emit("Finished task");
            debug!(
                "run {} finished with {} sources",
                self.runs,
                self.sources.len()
            );
            return Stage::Done(self.finish_run(reply));
        }
        Stage::ToolDispatch(reply.tool_calls)
    }

    fn finish_run(&self, response: AssistantMessage) -> RunResult {
        RunResult {
            response,
            sources: self.sources.clone(),
        }
    }

    /// `ToolDispatch -> AwaitingModel`.
    pub(super) async fn dispatch_tools(
        &mut self,
        calls: Vec<ToolCallRequest>,
    ) -> ModelRequest {
        let ctx = self.run_context();
        for call in &calls {
            self.events.emit(format!("Calling tool: {}", call.name));
        }

        let results = self.tools.dispatch(&calls, &ctx).await;

        for (call, result) in calls.into_iter().zip(results) {
            let content = match result {
                Ok(content) => {
                    self.sources.push(ToolOutput {
                        call_id: call.id.clone(),
                        tool_name: call.name.clone(),
                        arguments: call.arguments,
                        content: content.clone(),
                    });
                    content
                }
                Err(err) if err.kind() == ErrorKind::NotFound => {
                    err.reason().into_owned()
                }
                Err(err) => {
                    warn!(
                        "tool call {} ({}) failed: {err}",
                        call.id, call.name
                    );
                    format!("Encountered error in tool call: {}", err.reason())
                }
            };
            self.memory.append(ModelMessage::Tool(ToolCallResult {
                id: call.id,
                name: call.name,
                content,
            }));
        }

        self.build_request()
    }

    fn run_context(&self) -> RunContext {
        RunContext::new(Arc::clone(&self.name), self.runs, self.events.clone())
    }

    fn build_request(&self) -> ModelRequest {
        ModelRequest {
            messages: self.memory.snapshot(),
            tools: self.tools.definitions(),
        }
    }
}
