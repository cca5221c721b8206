use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use stepwise_model::{ModelTool, ToolCallRequest};
use tokio::task::JoinSet;
use tracing::Instrument;

use super::object::{ContextAware, ContextFree, ToolObject};
use super::{ContextAwareTool, Error, RunContext, Tool, ToolResult};

/// The set of tools an agent can dispatch to, keyed by name.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn ToolObject>>,
}

impl ToolRegistry {
    /// Registers a context-free tool, replacing any tool with the same
    /// name.
    pub fn add_tool<T: Tool>(&mut self, tool: T) {
        let name = tool.name().to_owned();
        self.insert(name, Arc::new(ContextFree(tool)));
    }

    /// Registers a context-aware tool, replacing any tool with the same
    /// name.
    pub fn add_context_aware_tool<T: ContextAwareTool>(&mut self, tool: T) {
        let name = tool.name().to_owned();
        self.insert(name, Arc::new(ContextAware(tool)));
    }

    fn insert(&mut self, name: String, tool: Arc<dyn ToolObject>) {
        if self.tools.insert(name, tool).is_some() {
            warn!("a tool with the same name has been replaced");
        }
    }

    /// Returns the number of registered tools.
    #[inline]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Returns `true` if no tool is registered.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Looks up a tool by name.
    #[inline]
    pub fn resolve(&self, name: &str) -> Option<Capability> {
        self.tools.get(name).cloned().map(Capability)
    }

    /// Returns the definitions of all tools, sorted by name.
    pub fn definitions(&self) -> Vec<ModelTool> {
        let mut definitions: Vec<_> = self
            .tools
            .values()
            .map(|tool| ModelTool {
                name: tool.name().to_owned(),
                description: tool.description().to_owned(),
                parameters: tool.parameter_schema().clone(),
            })
            .collect();
        definitions.sort_by(|a, b| a.name.cmp(&b.name));
        definitions
    }

    /// Executes a batch of tool call requests concurrently.
    ///
    /// Each known tool runs in its own task. The returned results are in
    /// the same order as `requests`, no matter in which order the tasks
    /// complete. A request for an unknown tool yields a `NotFound` error
    /// without running anything, and a tool that panics yields an
    /// `ExecutionError`.
    ///
    /// # Cancel safety
    ///
    /// Dropping the returned future aborts all tools still running.
    pub async fn dispatch(
        &self,
        requests: &[ToolCallRequest],
        ctx: &RunContext,
    ) -> Vec<ToolResult> {
        let span = debug_span!("tool dispatch", count = requests.len());
        async move {
            let mut results: Vec<Option<ToolResult>> =
                vec![None; requests.len()];
            let mut tasks = JoinSet::new();
            let mut slots = HashMap::with_capacity(requests.len());

            for (idx, req) in requests.iter().enumerate() {
                let Some(capability) = self.resolve(&req.name) else {
                    warn!("tool not found: {}", req.name);
                    let reason = format!("Tool {} does not exist", req.name);
                    results[idx] =
                        Some(Err(Error::not_found().with_reason(reason)));
                    continue;
                };
                trace!(
                    "spawning a tool ({}) with args: {:?}",
                    req.id, req.arguments
                );
                let span = debug_span!(
                    "tool execute",
                    name = %req.name,
                    id = %req.id
                );
                let fut = capability
                    .invoke(req.arguments.clone(), ctx)
                    .instrument(span);
                let handle = tasks.spawn(fut);
                slots.insert(handle.id(), idx);
            }

            while let Some(joined) = tasks.join_next_with_id().await {
                let (task_id, result) = match joined {
                    Ok((task_id, result)) => (task_id, result),
                    Err(err) => {
                        error!("tool task failed: {err}");
                        let reason = if err.is_panic() {
                            "the tool panicked"
                        } else {
                            "the tool was cancelled"
                        };
                        let err_id = err.id();
                        (
                            err_id,
                            Err(Error::execution_error().with_reason(reason)),
                        )
                    }
                };
                if let Some(&idx) = slots.get(&task_id) {
                    results[idx] = Some(result);
                }
            }

            results
                .into_iter()
                .map(|result| {
                    result.unwrap_or_else(|| {
                        Err(Error::execution_error()
                            .with_reason("the tool did not report a result"))
                    })
                })
                .collect()
        }
        .instrument(span)
        .await
    }
}

/// A resolved tool, ready to be invoked.
#[derive(Clone)]
pub struct Capability(Arc<dyn ToolObject>);

impl Capability {
    /// Returns the name of the tool.
    #[inline]
    pub fn name(&self) -> &str {
        self.0.name()
    }

    /// Returns `true` if the tool receives the run context.
    #[inline]
    pub fn is_context_aware(&self) -> bool {
        self.0.is_context_aware()
    }

    /// Invokes the tool. `ctx` is only handed to context-aware tools.
    ///
    /// Invalid arguments resolve to an `InvalidInput` error.
    #[inline]
    pub fn invoke(
        &self,
        arguments: Value,
        ctx: &RunContext,
    ) -> impl Future<Output = ToolResult> + Send + 'static {
        self.0.execute(arguments, ctx)
    }
}

#[cfg(test)]
mod tests {
    use std::future::ready;
    use std::sync::Mutex;
    use std::time::Duration;

    use serde::Deserialize;
    use serde_json::json;

    use super::*;
    use crate::event::EventEmitter;

    static EMPTY_SCHEMA: &Value = &Value::Null;

    #[derive(Deserialize)]
    struct SleepInput {
        millis: u64,
        #[serde(default)]
        fail: bool,
    }

    struct SleepTool;

    impl Tool for SleepTool {
        type Input = SleepInput;

        fn name(&self) -> &str {
            "sleep"
        }

        fn description(&self) -> &str {
            "Sleeps for a while"
        }

        fn parameter_schema(&self) -> &Value {
            EMPTY_SCHEMA
        }

        fn execute(
            &self,
            input: Self::Input,
        ) -> impl Future<Output = ToolResult> + Send + 'static {
            async move {
                tokio::time::sleep(Duration::from_millis(input.millis)).await;
                if input.fail {
                    return Err(Error::execution_error()
                        .with_reason("woke up grumpy"));
                }
                Ok(format!("slept {}ms", input.millis))
            }
        }
    }

    struct PanicTool;

    impl Tool for PanicTool {
        type Input = Value;

        fn name(&self) -> &str {
            "panic"
        }

        fn description(&self) -> &str {
            "Always panics"
        }

        fn parameter_schema(&self) -> &Value {
            EMPTY_SCHEMA
        }

        fn execute(
            &self,
            _input: Self::Input,
        ) -> impl Future<Output = ToolResult> + Send + 'static {
            async move {
                let output: Option<String> = None;
                Ok(output.expect("boom"))
            }
        }
    }

    struct RunIdTool(Arc<Mutex<Vec<u64>>>);

    impl ContextAwareTool for RunIdTool {
        type Input = Value;

        fn name(&self) -> &str {
            "run_id"
        }

        fn description(&self) -> &str {
            "Reports the run id"
        }

        fn parameter_schema(&self) -> &Value {
            EMPTY_SCHEMA
        }

        fn execute(
            &self,
            ctx: RunContext,
            _input: Self::Input,
        ) -> impl Future<Output = ToolResult> + Send + 'static {
            self.0.lock().unwrap().push(ctx.run_id());
            ready(Ok(format!("{}#{}", ctx.agent_name(), ctx.run_id())))
        }
    }

    fn request(id: &str, name: &str, arguments: Value) -> ToolCallRequest {
        ToolCallRequest {
            id: id.to_owned(),
            name: name.to_owned(),
            arguments,
        }
    }

    fn context() -> RunContext {
        RunContext::new(Arc::from("tester"), 7, EventEmitter::disabled())
    }

    #[test]
    fn test_resolve_and_definitions() {
        let mut registry = ToolRegistry::default();
        registry.add_tool(SleepTool);
        registry.add_context_aware_tool(RunIdTool(Default::default()));

        assert_eq!(registry.len(), 2);
        assert!(registry.resolve("read_tool").is_none());
        assert!(!registry.resolve("sleep").unwrap().is_context_aware());
        assert!(registry.resolve("run_id").unwrap().is_context_aware());

        let names: Vec<_> = registry
            .definitions()
            .into_iter()
            .map(|definition| definition.name)
            .collect();
        assert_eq!(names, ["run_id", "sleep"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispatch_keeps_request_order() {
        let mut registry = ToolRegistry::default();
        registry.add_tool(SleepTool);

        let requests = vec![
            request("1", "sleep", json!({ "millis": 30 })),
            request("2", "sleep", json!({ "millis": 20, "fail": true })),
            request("3", "sleep", json!({ "millis": 10 })),
        ];
        let results = registry.dispatch(&requests, &context()).await;

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_deref(), Ok("slept 30ms"));
        assert_eq!(
            results[1].as_ref().unwrap_err().kind(),
            crate::tool::ErrorKind::ExecutionError
        );
        assert_eq!(results[2].as_deref(), Ok("slept 10ms"));
    }

    #[tokio::test]
    async fn test_dispatch_absorbs_failures() {
        let mut registry = ToolRegistry::default();
        registry.add_tool(SleepTool);
        registry.add_tool(PanicTool);

        let requests = vec![
            request("1", "read_tool", json!({})),
            request("2", "panic", json!({})),
            request("3", "sleep", json!({ "millis": "soon" })),
        ];
        let results = registry.dispatch(&requests, &context()).await;

        let kinds: Vec<_> = results
            .iter()
            .map(|result| result.as_ref().unwrap_err().kind())
            .collect();
        assert_eq!(
            kinds,
            [
                crate::tool::ErrorKind::NotFound,
                crate::tool::ErrorKind::ExecutionError,
                crate::tool::ErrorKind::InvalidInput,
            ]
        );
        assert_eq!(
            results[0].as_ref().unwrap_err().reason(),
            "Tool read_tool does not exist"
        );
    }

    #[tokio::test]
    async fn test_context_reaches_context_aware_tools_only() {
        let seen = Arc::new(Mutex::new(vec![]));
        let mut registry = ToolRegistry::default();
        registry.add_context_aware_tool(RunIdTool(Arc::clone(&seen)));

        let results = registry
            .dispatch(&[request("1", "run_id", Value::Null)], &context())
            .await;
        assert_eq!(results[0].as_deref(), Ok("tester#7"));
        assert_eq!(*seen.lock().unwrap(), [7]);
    }
}
