use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Name reported to clients in `serverInfo`.
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default)]
    pub logging: LoggingConfig,
    pub terminal: TerminalConfig,
    /// Layers in declared order; the first entry is outermost.
    #[serde(default)]
    pub middleware: Vec<MiddlewareConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
    /// Log to a daily rolling file instead of stderr.
    #[serde(default)]
    pub file: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TerminalConfig {
    #[serde(rename_all = "camelCase")]
    External {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: HashMap<String, String>,
        #[serde(default)]
        working_directory: Option<PathBuf>,
        #[serde(default = "default_request_timeout")]
        request_timeout_ms: u64,
    },
    #[serde(rename_all = "camelCase")]
    Cli {
        commands: Vec<String>,
        #[serde(default)]
        descriptions: HashMap<String, String>,
        #[serde(default = "default_exec_timeout")]
        timeout_ms: u64,
    },
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum MiddlewareConfig {
    RequireToken {
        field: String,
        #[serde(default)]
        token: Option<String>,
    },
    MarkTools {
        fields: Map<String, Value>,
        #[serde(default)]
        tools: Option<Vec<String>>,
    },
    FilterTools {
        #[serde(default)]
        allow: Option<Vec<String>>,
        #[serde(default)]
        deny: Vec<String>,
    },
    RequestLog {
        #[serde(default = "default_label")]
        label: String,
    },
    #[serde(rename_all = "camelCase")]
    Timeout { timeout_ms: u64 },
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            file: None,
        }
    }
}

// Default value functions
fn default_name() -> String {
    "mcp-chain".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_request_timeout() -> u64 {
    30000
}

fn default_exec_timeout() -> u64 {
    30000
}

fn default_label() -> String {
    "chain".to_string()
}

impl TerminalConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            TerminalConfig::External { .. } => "external",
            TerminalConfig::Cli { .. } => "cli",
        }
    }
}
