use std::{fmt::Write, process::Stdio};

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;

use crate::{FixFile, FixGenerator, FixRequest, FixResult};

/// Fix generation via the Claude Code CLI. The tool is handed a prompt built
/// from the canonical error record and must answer with a JSON object, which
/// it routinely wraps in explanatory prose or a fenced code block.
pub struct ClaudeCodeTool {
    command: String,
    api_key: Option<String>,
}

/// The JSON shape the CLI is asked to produce.
#[derive(Debug, Deserialize)]
struct RawFixOutput {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    description: String,
    #[serde(default)]
    files: Vec<FixFile>,
    #[serde(default)]
    error: Option<String>,
}

impl ClaudeCodeTool {
    pub fn new(command: impl Into<String>, api_key: Option<String>) -> Self {
        Self { command: command.into(), api_key }
    }
}

#[async_trait]
impl FixGenerator for ClaudeCodeTool {
    async fn generate_fix(&self, request: &FixRequest) -> Result<FixResult> {
        let prompt = build_prompt(request);
        let mut command = Command::new(&self.command);
        command
            .arg("-p")
            .arg(&prompt)
            .arg("--output-format")
            .arg("text")
            .env("GITHUB_TOKEN", &request.repo_token)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(api_key) = &self.api_key {
            command.env("ANTHROPIC_API_KEY", api_key);
        }
        tracing::info!("Running {} for issue {}", self.command, request.issue_id);
        let output = command
            .output()
            .await
            .with_context(|| format!("Failed to run {}", self.command))?;
        if !output.status.success() {
            bail!(
                "{} exited with {}: {}",
                self.command,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_fix_output(&stdout)
    }
}

/// Parse the tool's stdout into a fix proposal. A structured failure reason
/// from the tool is surfaced as an error for this job.
pub fn parse_fix_output(output: &str) -> Result<FixResult> {
    let json = extract_json(output).context("No JSON object found in tool output")?;
    let raw: RawFixOutput =
        serde_json::from_str(json).context("Failed to parse tool output JSON")?;
    if !raw.success {
        bail!(
            "fix generation reported failure: {}",
            raw.error.as_deref().unwrap_or("no reason given")
        );
    }
    if raw.files.is_empty() {
        bail!("fix generation returned no file changes");
    }
    Ok(FixResult { description: raw.description, files: raw.files })
}

/// Locate the first syntactically balanced top-level JSON object inside an
/// arbitrary text blob. The scan tracks string state and escapes so braces
/// inside quoted strings don't affect the balance.
pub fn extract_json(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if escaped {
            escaped = false;
            continue;
        }
        match b {
            b'\\' if in_string => escaped = true,
            b'"' => in_string = !in_string,
            b'{' if !in_string => depth += 1,
            b'}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Build the prompt handed to the CLI.
pub fn build_prompt(request: &FixRequest) -> String {
    let mut prompt = String::new();
    let _ = writeln!(prompt, "You are fixing a production error reported by Sentry.");
    let _ = writeln!(prompt);
    let _ = writeln!(prompt, "Repository: {}", request.repo_url);
    let _ = writeln!(prompt, "Issue ID: {}", request.issue_id);
    let _ = writeln!(prompt, "Title: {}", request.title);
    let _ = writeln!(prompt, "Error: {}: {}", request.error_type, request.error_message);
    let _ = writeln!(prompt, "Level: {}", request.level);
    let _ = writeln!(prompt, "Platform: {}", request.platform);
    let _ = writeln!(prompt, "Culprit: {}", request.culprit);
    let _ = writeln!(prompt, "Permalink: {}", request.permalink);
    if !request.stacktrace.is_empty() {
        let _ = writeln!(prompt);
        let _ = writeln!(prompt, "Stack trace (outermost first):");
        for frame in &request.stacktrace {
            let marker = if frame.in_app { " [IN APP]" } else { "" };
            let _ = writeln!(
                prompt,
                "  {}:{} in {}{}",
                frame.filename, frame.line_no, frame.function, marker
            );
        }
    }
    let _ = writeln!(prompt);
    let _ = writeln!(
        prompt,
        "Analyze the error and propose a minimal fix. Respond with a single JSON object:"
    );
    let _ = writeln!(
        prompt,
        r#"{{"success": true|false, "description": "...", "files": [{{"path": "...", "content": "<entire new file content>"}}], "error": "reason when success is false"}}"#
    );
    let _ = writeln!(
        prompt,
        "Each files[] entry must contain the complete new content of that file."
    );
    prompt
}
