use std::pin::Pin;

use serde::de::DeserializeOwned;
use serde_json::Value;

use super::{ContextAwareTool, Error, RunContext, Tool, ToolResult};

pub(crate) type ToolFuture = Pin<Box<dyn Future<Output = ToolResult> + Send>>;

pub(crate) trait ToolObject: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn parameter_schema(&self) -> &Value;

    fn is_context_aware(&self) -> bool;

    fn execute(&self, arguments: Value, ctx: &RunContext) -> ToolFuture;
}

/// Wraps a [`Tool`]. The run context never reaches the tool.
pub(crate) struct ContextFree<T: Tool>(pub T);

/// Wraps a [`ContextAwareTool`].
pub(crate) struct ContextAware<T: ContextAwareTool>(pub T);

impl<T: Tool> ToolObject for ContextFree<T> {
    #[inline]
    fn name(&self) -> &str {
        self.0.name()
    }

    #[inline]
    fn description(&self) -> &str {
        self.0.description()
    }

    #[inline]
    fn parameter_schema(&self) -> &Value {
        self.0.parameter_schema()
    }

    #[inline]
    fn is_context_aware(&self) -> bool {
        false
    }

    fn execute(&self, arguments: Value, _ctx: &RunContext) -> ToolFuture {
        match parse_input::<T::Input>(arguments) {
            Ok(input) => Box::pin(self.0.execute(input)),
            Err(err) => Box::pin(std::future::ready(Err(err))),
        }
    }
}

impl<T: ContextAwareTool> ToolObject for ContextAware<T> {
    #[inline]
    fn name(&self) -> &str {
        self.0.name()
    }

    #[inline]
    fn description(&self) -> &str {
        self.0.description()
    }

    #[inline]
    fn parameter_schema(&self) -> &Value {
        self.0.parameter_schema()
    }

    #[inline]
    fn is_context_aware(&self) -> bool {
        true
    }

    fn execute(&self, arguments: Value, ctx: &RunContext) -> ToolFuture {
        match parse_input::<T::Input>(arguments) {
            Ok(input) => Box::pin(self.0.execute(ctx.clone(), input)),
            Err(err) => Box::pin(std::future::ready(Err(err))),
        }
    }
}

fn parse_input<I: DeserializeOwned>(arguments: Value) -> Result<I, Error> {
    // Models tend to omit the arguments of tools that take none.
    let arguments = match arguments {
        Value::Null => Value::Object(Default::default()),
        arguments => arguments,
    };
    serde_json::from_value(arguments)
        .map_err(|err| Error::invalid_input().with_reason(format!("{err}")))
}
