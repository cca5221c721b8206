use std::fmt::Write as _;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use schemars::{JsonSchema, schema_for};
use serde::Deserialize;
use serde_json::Value;
use stepwise_core::tool::{
    ContextAwareTool, Error as ToolError, RunContext, ToolResult,
};
use tokio::task::spawn_blocking;

const MAX_LINES: usize = 50;

#[derive(Deserialize, JsonSchema)]
pub struct ReadFileItem {
    #[schemars(description = "Absolute path to the file.")]
    path: String,
    #[schemars(description = "1-based start line to read from, default to 1.")]
    start_line: Option<usize>,
}

#[derive(Deserialize, JsonSchema)]
pub struct ReadFileParameters {
    #[schemars(description = "Files to read.")]
    files: Vec<ReadFileItem>,
}

/// A tool for reading file content with line numbers.
///
/// Publishes a progress notice for every file it reads.
pub struct ReadFileTool {
    parameter_schema: Value,
}

impl ReadFileTool {
    /// Creates a new read file tool.
    #[inline]
    pub fn new() -> Self {
        ReadFileTool {
            parameter_schema: schema_for!(ReadFileParameters).to_value(),
        }
    }
}

impl Default for ReadFileTool {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl ContextAwareTool for ReadFileTool {
    type Input = ReadFileParameters;

    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Reads files from absolute paths and returns their contents prefixed \
         with line numbers. Each file takes a path and an optional 1-based \
         start line, and returns up to 50 lines."
    }

    fn parameter_schema(&self) -> &Value {
        &self.parameter_schema
    }

    #[allow(clippy::manual_async_fn)]
    fn execute(
        &self,
        ctx: RunContext,
        input: ReadFileParameters,
    ) -> impl Future<Output = ToolResult> + Send + 'static {
        async move {
            let mut sections = Vec::with_capacity(input.files.len());
            for file in input.files {
                if !Path::new(&file.path).is_absolute() {
                    return Err(ToolError::invalid_input()
                        .with_reason("`path` must be absolute"));
                }
                let start_line = file.start_line.unwrap_or(1);
                if start_line == 0 {
                    return Err(ToolError::invalid_input()
                        .with_reason("`start_line` must be 1-based"));
                }

                ctx.emit(format!("Reading {}", file.path));
                let section = spawn_blocking(move || {
                    read_file_section(&file.path, start_line)
                })
                .await
                .map_err(|_| {
                    ToolError::execution_error()
                        .with_reason("the read was interrupted")
                })??;
                sections.push(section);
            }
            Ok(sections.join("\n"))
        }
    }
}

fn read_file_section(
    path: &str,
    start_line: usize,
) -> Result<String, ToolError> {
    let file = File::open(path).map_err(|err| {
        ToolError::execution_error().with_reason(format!("{path}: {err}"))
    })?;
    format_reader_section(path, file, start_line)
}

fn format_reader_section<R: Read>(
    path: &str,
    reader: R,
    start_line: usize,
) -> Result<String, ToolError> {
    let lines = BufReader::new(reader)
        .lines()
        .skip(start_line - 1)
        .take(MAX_LINES)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| {
            ToolError::execution_error().with_reason(format!("{path}: {err}"))
        })?;

    let mut result = format!("==> {path} <==\n");
    let width = (start_line + lines.len().saturating_sub(1)).to_string().len();
    for (offset, line) in lines.iter().enumerate() {
        writeln!(result, "{:>width$}: {line}", start_line + offset).ok();
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::Arc;

    use stepwise_core::event::{EventEmitter, EventSink};
    use tokio::sync::mpsc;

    use super::*;

    #[test]
    fn test_read_file_section_formats_lines() {
        let input = b"first\nsecond\nthird\n";

        let output =
            format_reader_section("/fake/path", Cursor::new(input), 2).unwrap();
        let mut output_lines = output.lines();

        assert_eq!(output_lines.next().unwrap(), "==> /fake/path <==");
        assert_eq!(output_lines.next().unwrap(), "2: second");
        assert_eq!(output_lines.next().unwrap(), "3: third");
        assert_eq!(output_lines.next(), None);
    }

    #[test]
    fn test_read_file_section_respects_limit() {
        let input = "line\n".repeat(MAX_LINES + 10);

        let output =
            format_reader_section("/fake/path", Cursor::new(input), 1).unwrap();
        let lines = output.lines().collect::<Vec<_>>();
        assert_eq!(lines.len(), MAX_LINES + 1);
        assert_eq!(lines[1], " 1: line");
    }

    #[tokio::test]
    async fn test_emits_a_notice_per_file() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink: Arc<dyn EventSink> = Arc::new(tx);
        let ctx = RunContext::new(
            Arc::from("tester"),
            1,
            EventEmitter::new(Arc::from("tester"), Some(sink)),
        );
        let manifest = concat!(env!("CARGO_MANIFEST_DIR"), "/Cargo.toml");

        let output = ReadFileTool::new()
            .execute(
                ctx,
                ReadFileParameters {
                    files: vec![ReadFileItem {
                        path: manifest.to_owned(),
                        start_line: None,
                    }],
                },
            )
            .await
            .unwrap();
        assert!(output.contains("name = \"stepwise\""));

        let notice = rx.try_recv().unwrap();
        assert_eq!(notice.source, "tester");
        assert_eq!(notice.message, format!("Reading {manifest}"));
    }
}
