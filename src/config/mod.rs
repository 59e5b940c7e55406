//! Declarative chain configuration.
//!
//! A config file names one terminal and an ordered list of middleware layers:
//!
//! ```yaml
//! name: postgres-guarded
//! terminal:
//!   type: external
//!   command: postgres-mcp
//!   args: ["--dsn", "${PG_DSN}"]
//! middleware:
//!   - type: requestLog
//!     label: edge
//!   - type: requireToken
//!     field: token
//!     token: ${API_TOKEN:-dev}
//! ```

pub mod loader;
pub mod schema;

pub use loader::{load_from_env_or_file, load_from_path, substitute_env_vars, validate};
pub use schema::{Config, LogFormat, LoggingConfig, MiddlewareConfig, TerminalConfig};

use std::time::Duration;
use tracing::info;

use crate::chain::Chain;
use crate::error::Result;
use crate::middleware::{FilterTools, MarkTools, RequestLog, RequireToken, Timeout};
use crate::terminal::{CliServer, ExternalServer};

/// Builds the configured chain: middleware in declared order, sealed with the
/// terminal.
pub fn build_chain(config: &Config) -> Result<Chain> {
    let mut chain = Chain::new();
    for layer in &config.middleware {
        chain = add_layer(&chain, layer)?;
    }

    let chain = match &config.terminal {
        TerminalConfig::External {
            command,
            args,
            env,
            working_directory,
            request_timeout_ms,
        } => {
            let mut server = ExternalServer::new(&config.name, command)
                .with_args(args.clone())
                .with_env(env.clone())
                .with_request_timeout(Duration::from_millis(*request_timeout_ms));
            if let Some(dir) = working_directory {
                server = server.with_working_dir(dir.clone());
            }
            chain.seal(server)?
        }
        TerminalConfig::Cli {
            commands,
            descriptions,
            timeout_ms,
        } => {
            let server = CliServer::new(&config.name, commands.clone())?
                .with_descriptions(descriptions.clone())
                .with_exec_timeout(Duration::from_millis(*timeout_ms));
            chain.seal(server)?
        }
    };

    info!(
        "Built chain '{}': {} layer(s) over {} terminal",
        config.name,
        chain.depth(),
        config.terminal.kind()
    );
    Ok(chain)
}

fn add_layer(chain: &Chain, layer: &MiddlewareConfig) -> Result<Chain> {
    match layer {
        MiddlewareConfig::RequireToken { field, token } => {
            let mut auth = RequireToken::new(field);
            if let Some(token) = token {
                auth = auth.with_token(token);
            }
            chain.with(auth)
        }
        MiddlewareConfig::MarkTools { fields, tools } => {
            let mut marker = MarkTools::new(fields.clone());
            if let Some(tools) = tools {
                marker = marker.only(tools.clone());
            }
            chain.with(marker)
        }
        MiddlewareConfig::FilterTools { allow, deny } => chain.with(FilterTools {
            allow: allow.clone(),
            deny: deny.clone(),
        }),
        MiddlewareConfig::RequestLog { label } => chain.with(RequestLog::new(label)),
        MiddlewareConfig::Timeout { timeout_ms } => chain.with(Timeout::new(*timeout_ms)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cli_config(middleware: Vec<MiddlewareConfig>) -> Config {
        Config {
            name: "tools".into(),
            logging: LoggingConfig::default(),
            terminal: TerminalConfig::Cli {
                commands: vec!["echo".into()],
                descriptions: Default::default(),
                timeout_ms: 1000,
            },
            middleware,
        }
    }

    #[test]
    fn test_build_chain_seals_with_terminal() {
        let chain = build_chain(&cli_config(vec![])).unwrap();
        assert!(chain.is_sealed());
        assert_eq!(chain.depth(), 0);
        assert_eq!(chain.sentinel_count(), 0);
    }

    #[test]
    fn test_build_chain_stacks_middleware() {
        let config = cli_config(vec![
            MiddlewareConfig::RequestLog {
                label: "edge".into(),
            },
            MiddlewareConfig::MarkTools {
                fields: json!({"auth_required": true}).as_object().cloned().unwrap(),
                tools: None,
            },
            MiddlewareConfig::Timeout { timeout_ms: 100 },
        ]);
        let chain = build_chain(&config).unwrap();
        assert!(chain.is_sealed());
        assert_eq!(chain.depth(), 3);
    }

    #[test]
    fn test_yaml_shape() {
        let config: Config = serde_yaml::from_str(
            r#"
terminal:
  type: cli
  commands: [git]
middleware:
  - type: filterTools
    deny: [rm]
"#,
        )
        .unwrap();
        assert_eq!(config.name, "mcp-chain");
        assert!(matches!(
            &config.middleware[0],
            MiddlewareConfig::FilterTools { allow: None, deny } if deny == &vec!["rm".to_string()]
        ));
    }
}
