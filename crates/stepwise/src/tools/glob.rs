use std::path::Path;

use schemars::{JsonSchema, schema_for};
use serde::Deserialize;
use serde_json::Value;
use stepwise_core::tool::{Error as ToolError, Tool, ToolResult};
use tokio::task::spawn_blocking;

const MAX_MATCHES: usize = 50;

#[derive(Deserialize, JsonSchema)]
pub struct GlobToolParameters {
    #[schemars(description = "The glob pattern, relative to `path`.")]
    pattern: String,
    #[schemars(description = "Absolute path of the directory to search in.")]
    path: String,
}

/// A tool for finding files using glob patterns.
pub struct GlobTool {
    parameter_schema: Value,
}

impl GlobTool {
    /// Creates a new glob tool.
    #[inline]
    pub fn new() -> Self {
        GlobTool {
            parameter_schema: schema_for!(GlobToolParameters).to_value(),
        }
    }
}

impl Default for GlobTool {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl Tool for GlobTool {
    type Input = GlobToolParameters;

    fn name(&self) -> &str {
        "glob"
    }

    fn description(&self) -> &str {
        "Finds files and directories matching a glob pattern. Supports *, ? \
         and ** for recursive searches. Returns at most 50 paths, sorted."
    }

    fn parameter_schema(&self) -> &Value {
        &self.parameter_schema
    }

    #[allow(clippy::manual_async_fn)]
    fn execute(
        &self,
        input: GlobToolParameters,
    ) -> impl Future<Output = ToolResult> + Send + 'static {
        async move {
            let root = Path::new(&input.path);
            if !root.is_absolute() {
                return Err(ToolError::invalid_input()
                    .with_reason("`path` must be absolute"));
            }
            if Path::new(&input.pattern).is_absolute() {
                return Err(ToolError::invalid_input()
                    .with_reason("`pattern` must be relative to `path`"));
            }

            let full_pattern = root.join(&input.pattern);
            let paths = glob::glob(&full_pattern.to_string_lossy()).map_err(
                |err| ToolError::invalid_input().with_reason(err.to_string()),
            )?;

            spawn_blocking(move || collect_matches(paths))
                .await
                .map_err(|_| {
                    ToolError::execution_error()
                        .with_reason("the search was interrupted")
                })
        }
    }
}

fn collect_matches(paths: glob::Paths) -> String {
    let mut matches: Vec<String> = paths
        .flatten()
        .map(|path| path.to_string_lossy().into_owned())
        .collect();
    if matches.is_empty() {
        return "No files matched.".to_owned();
    }
    matches.sort();

    let total = matches.len();
    matches.truncate(MAX_MATCHES);
    let mut result = matches.join("\n");
    if total > MAX_MATCHES {
        result.push_str(&format!("\n({} more not shown)", total - MAX_MATCHES));
    }
    result
}
