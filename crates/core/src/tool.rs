//! Tool call supports.
//!
//! Tools come in two flavors: context-free tools implement [`Tool`], and
//! tools that need to know about the run they are called from implement
//! [`ContextAwareTool`]. Both are registered in a [`ToolRegistry`], which
//! fixes the calling convention once, at registration time.

mod context;
mod error;
mod object;
mod registry;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

pub use context::RunContext;
pub use error::{Error, ErrorKind};
pub use registry::{Capability, ToolRegistry};

/// The result of a tool call.
pub type ToolResult = Result<String, Error>;

/// A tool that can be called by the model.
///
/// Implementations of this trait should be stateless, and may not maintain any
/// internal state.
pub trait Tool: Send + Sync + 'static {
    /// The type of input that the tool accepts.
    type Input: DeserializeOwned;

    /// Returns the name of the tool.
    fn name(&self) -> &str;

    /// Returns the description of the tool.
    fn description(&self) -> &str;

    /// Returns the parameter schema of the tool.
    fn parameter_schema(&self) -> &Value;

    /// Executes the tool with the given input.
    ///
    /// This method must return a future that is fully independent of `self`,
    /// and the future should be cancellation safe.
    fn execute(
        &self,
        input: Self::Input,
    ) -> impl Future<Output = ToolResult> + Send + 'static;
}

/// A tool that needs access to the run it is called from.
///
/// Same contract as [`Tool`], except that [`execute`](Self::execute) also
/// receives the [`RunContext`] of the current run.
pub trait ContextAwareTool: Send + Sync + 'static {
    /// The type of input that the tool accepts.
    type Input: DeserializeOwned;

    /// Returns the name of the tool.
    fn name(&self) -> &str;

    /// Returns the description of the tool.
    fn description(&self) -> &str;

    /// Returns the parameter schema of the tool.
    fn parameter_schema(&self) -> &Value;

    /// Executes the tool with the given context and input.
    fn execute(
        &self,
        ctx: RunContext,
        input: Self::Input,
    ) -> impl Future<Output = ToolResult> + Send + 'static;
}

/// The output of a successful tool call, as collected in a run's sources.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ToolOutput {
    /// The identifier of the tool call request.
    pub call_id: String,
    /// The name of the tool.
    pub tool_name: String,
    /// The arguments the model passed.
    pub arguments: Value,
    /// What the tool returned.
    pub content: String,
}
