//! Command-line programs exposed as MCP tools
//!
//! Each configured command becomes one tool. Descriptions and input schemas
//! are derived from the command's `-h`/`--help` output unless a description
//! is configured; a `tools/call` runs the command with the call arguments
//! translated to flags.

use async_trait::async_trait;
use dashmap::DashMap;
use regex::Regex;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{ChainError, ConfigError, Result};
use crate::handler::McpHandler;
use crate::protocol::{self, codes, methods};

const DEFAULT_EXEC_TIMEOUT: Duration = Duration::from_secs(30);
const HELP_TIMEOUT: Duration = Duration::from_secs(10);
const HELP_FLAGS: [&str; 2] = ["-h", "--help"];

pub struct CliServer {
    name: String,
    commands: Vec<String>,
    descriptions: HashMap<String, String>,
    exec_timeout: Duration,
    tool_cache: DashMap<String, Value>,
}

impl CliServer {
    pub fn new(name: impl Into<String>, commands: Vec<String>) -> Result<Self> {
        if commands.is_empty() {
            return Err(ConfigError::Validation(
                "CLI server needs at least one command".into(),
            )
            .into());
        }

        Ok(Self {
            name: name.into(),
            commands,
            descriptions: HashMap::new(),
            exec_timeout: DEFAULT_EXEC_TIMEOUT,
            tool_cache: DashMap::new(),
        })
    }

    pub fn with_descriptions(mut self, descriptions: HashMap<String, String>) -> Self {
        self.descriptions = descriptions;
        self
    }

    pub fn with_exec_timeout(mut self, timeout: Duration) -> Self {
        self.exec_timeout = timeout;
        self
    }

    async fn tool_info(&self, command: &str) -> Value {
        if let Some(cached) = self.tool_cache.get(command) {
            return cached.clone();
        }

        let help = help_text(command).await;
        let description = match (self.descriptions.get(command), &help) {
            (Some(configured), _) => configured.clone(),
            (None, Some(help)) => extract_description(help, command),
            (None, None) => default_description(command),
        };
        let input_schema = match &help {
            Some(help) => extract_input_schema(help),
            None => basic_input_schema(),
        };

        let info = json!({
            "name": command,
            "description": description,
            "inputSchema": input_schema,
        });
        self.tool_cache.insert(command.to_string(), info.clone());
        info
    }

    async fn tools(&self) -> Vec<Value> {
        let mut tools = Vec::with_capacity(self.commands.len());
        for command in &self.commands {
            tools.push(self.tool_info(command).await);
        }
        tools
    }

    async fn call_tool(&self, request: &Value) -> Value {
        let id = request.get("id").cloned();
        let params = request.get("params").cloned().unwrap_or_else(|| json!({}));
        let tool = params.get("name").and_then(Value::as_str).unwrap_or_default();

        if !self.commands.iter().any(|c| c == tool) {
            return protocol::error(id, codes::INVALID_PARAMS, format!("Tool not found: {tool}"));
        }

        let arguments = params
            .get("arguments")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        match self.execute(tool, &arguments).await {
            Ok(output) => protocol::success(id, protocol::text_content(output, false)),
            Err(e) => {
                warn!("Tool '{}' failed: {}", tool, e);
                protocol::success(
                    id,
                    protocol::text_content(format!("Error executing {tool}: {e}"), true),
                )
            }
        }
    }

    async fn execute(&self, command: &str, arguments: &Map<String, Value>) -> Result<String> {
        let argv = build_args(arguments);
        debug!("Executing {} {:?}", command, argv);

        let output = tokio::time::timeout(
            self.exec_timeout,
            Command::new(command)
                .args(&argv)
                .stdin(Stdio::null())
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| ChainError::Tool {
            name: command.to_string(),
            reason: format!("Command timed out after {} seconds", self.exec_timeout.as_secs()),
        })?
        .map_err(|e| ChainError::Tool {
            name: command.to_string(),
            reason: format!("Failed to execute command: {e}"),
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        Ok(format_output(stdout.trim(), stderr.trim(), output.status.code()))
    }
}

#[async_trait]
impl McpHandler for CliServer {
    async fn get_metadata(&self) -> Result<Value> {
        Ok(json!({
            "tools": self.tools().await,
            "resources": [],
            "server_name": self.name,
        }))
    }

    async fn handle_request(&self, request: Value) -> Result<Value> {
        let id = request.get("id").cloned();
        let method = request.get("method").and_then(Value::as_str).unwrap_or_default();

        let response = match method {
            methods::TOOLS_LIST => protocol::success(id, json!({ "tools": self.tools().await })),
            methods::TOOLS_CALL => self.call_tool(&request).await,
            other => protocol::error(
                id,
                codes::METHOD_NOT_FOUND,
                format!("Method not found: {other}"),
            ),
        };
        Ok(response)
    }
}

/// Translates call arguments to a command line.
///
/// Booleans become bare flags when true, arrays repeat the flag per item and
/// everything else becomes `flag value`. Single-character keys use `-k`,
/// longer ones `--key`. Keys starting with `_` are internal, except `_args`
/// whose items are appended as positional arguments.
pub fn build_args(arguments: &Map<String, Value>) -> Vec<String> {
    let mut argv = Vec::new();

    for (key, value) in arguments {
        if key.starts_with('_') {
            continue;
        }
        let flag = if key.chars().count() == 1 {
            format!("-{key}")
        } else {
            format!("--{key}")
        };

        match value {
            Value::Bool(true) => argv.push(flag),
            Value::Bool(false) => {}
            Value::Array(items) => {
                for item in items {
                    argv.push(flag.clone());
                    argv.push(scalar(item));
                }
            }
            other => {
                argv.push(flag);
                argv.push(scalar(other));
            }
        }
    }

    match arguments.get("_args") {
        Some(Value::Array(items)) => argv.extend(items.iter().map(scalar)),
        Some(single) => argv.push(scalar(single)),
        None => {}
    }

    argv
}

fn scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn format_output(stdout: &str, stderr: &str, code: Option<i32>) -> String {
    let mut parts = Vec::new();
    if !stdout.is_empty() {
        parts.push(format!("STDOUT:\n{stdout}"));
    }
    if !stderr.is_empty() {
        parts.push(format!("STDERR:\n{stderr}"));
    }
    match code {
        Some(0) => {}
        Some(code) => parts.push(format!("Exit code: {code}")),
        None => parts.push("Terminated by signal".to_string()),
    }

    if parts.is_empty() {
        "Command completed with no output".to_string()
    } else {
        parts.join("\n\n")
    }
}

async fn help_text(command: &str) -> Option<String> {
    for flag in HELP_FLAGS {
        let run = Command::new(command)
            .arg(flag)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        match tokio::time::timeout(HELP_TIMEOUT, run).await {
            Ok(Ok(output)) => {
                let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
                // Some commands print help on stderr.
                let text = if stdout.is_empty() {
                    String::from_utf8_lossy(&output.stderr).trim().to_string()
                } else {
                    stdout
                };
                if text.len() > 10 {
                    return Some(text);
                }
            }
            Ok(Err(e)) => debug!("{} {} failed: {}", command, flag, e),
            Err(_) => debug!("{} {} timed out", command, flag),
        }
    }
    None
}

fn default_description(command: &str) -> String {
    format!("Execute {command} command-line tool")
}

fn usage_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-zA-Z_-]+\s+\[").expect("valid regex"))
}

fn option_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(-\w,?\s*)?--(\w+)").expect("valid regex"))
}

/// First meaningful line of help text, else the line following a
/// `DESCRIPTION:`/`NAME:`/`SYNOPSIS:` header, else a generic description.
pub fn extract_description(help: &str, command: &str) -> String {
    let lines: Vec<&str> = help.lines().collect();

    for line in lines.iter().take(10).map(|l| l.trim()) {
        if line.is_empty() || line.to_lowercase().starts_with("usage:") {
            continue;
        }
        if !usage_line().is_match(line)
            && line.split_whitespace().count() > 1
            && !line.starts_with('-')
            && !line.starts_with("Options:")
            && !line.starts_with("Arguments:")
        {
            return line.to_string();
        }
    }

    for (i, line) in lines.iter().enumerate() {
        let line = line.trim();
        if ["DESCRIPTION:", "NAME:", "SYNOPSIS:"]
            .iter()
            .any(|header| line.starts_with(header))
        {
            if let Some(next) = lines.get(i + 1).map(|l| l.trim()) {
                if next.split_whitespace().count() > 1 {
                    return next.to_string();
                }
            }
        }
    }

    default_description(command)
}

pub fn basic_input_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "_args": {
                "type": "array",
                "description": "Positional arguments for the command",
                "items": {"type": "string"},
            },
        },
        "required": [],
    })
}

/// Positional `_args` plus one string property per `--option` in the help text.
pub fn extract_input_schema(help: &str) -> Value {
    let mut schema = basic_input_schema();
    if let Some(properties) = schema["properties"].as_object_mut() {
        for line in help.lines() {
            if let Some(caps) = option_pattern().captures(line.trim()) {
                let option = &caps[2];
                if option != "help" && option != "version" {
                    properties.insert(
                        option.to_string(),
                        json!({
                            "type": "string",
                            "description": format!("Option --{option}"),
                        }),
                    );
                }
            }
        }
    }
    schema
}
