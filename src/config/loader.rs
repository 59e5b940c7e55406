use figment::{
    providers::{Env, Format, Json, Toml, Yaml},
    Figment,
};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::debug;

use super::schema::{Config, MiddlewareConfig, TerminalConfig};
use crate::error::{ConfigError, Result};

const ENV_PREFIX: &str = "MCP_CHAIN_";

/// Per-user config file, `<config_dir>/mcp-chain/config.yaml`.
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("mcp-chain").join("config.yaml"))
}

pub async fn load_from_env_or_file() -> Result<Config> {
    let mut figment = Figment::new();
    if let Some(path) = user_config_path() {
        debug!("Looking for user config at {}", path.display());
        figment = figment.merge(Yaml::file(path));
    }

    let config: Config = figment
        // Files in the working directory win over the user config
        .merge(Toml::file("mcp-chain.toml"))
        .merge(Json::file("mcp-chain.json"))
        .merge(Yaml::file("mcp-chain.yaml"))
        .merge(Yaml::file("mcp-chain.yml"))
        .merge(Env::prefixed(ENV_PREFIX).split("_"))
        .extract()
        .map_err(|e| ConfigError::Parse(e.to_string()))?;

    validate(&config)?;
    apply_env_substitutions(config)
}

pub async fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path = path.as_ref();

    let figment = match path.extension().and_then(|e| e.to_str()) {
        Some("toml") => Figment::new().merge(Toml::file(path)),
        Some("json") => Figment::new().merge(Json::file(path)),
        Some("yaml") | Some("yml") => Figment::new().merge(Yaml::file(path)),
        _ => {
            return Err(ConfigError::Parse(
                "Unsupported config file format. Use .toml, .json, .yaml, or .yml".into(),
            )
            .into())
        }
    };

    if !path.exists() {
        return Err(ConfigError::Parse(format!("Config file not found: {}", path.display())).into());
    }

    let config: Config = figment
        .merge(Env::prefixed(ENV_PREFIX).split("_"))
        .extract()
        .map_err(|e| ConfigError::Parse(e.to_string()))?;

    validate(&config)?;
    apply_env_substitutions(config)
}

pub fn validate(config: &Config) -> Result<()> {
    if config.name.trim().is_empty() {
        return Err(ConfigError::Validation("Server name must not be empty".into()).into());
    }

    match &config.terminal {
        TerminalConfig::External {
            command,
            request_timeout_ms,
            ..
        } => {
            if command.trim().is_empty() {
                return Err(
                    ConfigError::Validation("External terminal has empty command".into()).into(),
                );
            }
            if *request_timeout_ms == 0 {
                return Err(ConfigError::Validation(
                    "External terminal request timeout must be greater than 0".into(),
                )
                .into());
            }
        }
        TerminalConfig::Cli {
            commands,
            timeout_ms,
            ..
        } => {
            if commands.is_empty() {
                return Err(ConfigError::Validation(
                    "CLI terminal needs at least one command".into(),
                )
                .into());
            }
            if commands.iter().any(|c| c.trim().is_empty()) {
                return Err(
                    ConfigError::Validation("CLI terminal has an empty command".into()).into(),
                );
            }
            if *timeout_ms == 0 {
                return Err(ConfigError::Validation(
                    "CLI terminal timeout must be greater than 0".into(),
                )
                .into());
            }
        }
    }

    for (index, layer) in config.middleware.iter().enumerate() {
        match layer {
            MiddlewareConfig::RequireToken { field, .. } if field.trim().is_empty() => {
                return Err(ConfigError::Validation(format!(
                    "Middleware #{index}: requireToken has empty field"
                ))
                .into());
            }
            MiddlewareConfig::Timeout { timeout_ms: 0 } => {
                return Err(ConfigError::Validation(format!(
                    "Middleware #{index}: timeout must be greater than 0"
                ))
                .into());
            }
            _ => {}
        }
    }

    Ok(())
}

fn apply_env_substitutions(mut config: Config) -> Result<Config> {
    if let TerminalConfig::External { args, env, .. } = &mut config.terminal {
        for arg in args.iter_mut() {
            *arg = substitute_env_vars(arg)?;
        }
        for value in env.values_mut() {
            *value = substitute_env_vars(value)?;
        }
    }

    for layer in config.middleware.iter_mut() {
        if let MiddlewareConfig::RequireToken {
            token: Some(token), ..
        } = layer
        {
            *token = substitute_env_vars(token)?;
        }
    }

    Ok(config)
}

fn env_var_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\{([^}]+)\}").expect("valid regex"))
}

/// Expands `${VAR}` and `${VAR:-default}`. An unset variable without a
/// default is an error.
pub fn substitute_env_vars(input: &str) -> Result<String> {
    let mut result = input.to_string();

    for cap in env_var_pattern().captures_iter(input) {
        let expr = &cap[1];
        let (name, default) = match expr.split_once(":-") {
            Some((name, default)) => (name, Some(default)),
            None => (expr, None),
        };

        let value = match (std::env::var(name), default) {
            (Ok(value), _) => value,
            (Err(_), Some(default)) => default.to_string(),
            (Err(_), None) => {
                return Err(ConfigError::EnvVar(format!(
                    "Environment variable '{name}' not found"
                ))
                .into())
            }
        };
        result = result.replace(&cap[0], &value);
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ChainError;
    use std::io::Write;

    #[test]
    fn test_env_substitution() {
        std::env::set_var("CHAIN_LOADER_TEST_VAR", "test_value");

        let result = substitute_env_vars("Hello ${CHAIN_LOADER_TEST_VAR}!").unwrap();
        assert_eq!(result, "Hello test_value!");

        let result = substitute_env_vars("${CHAIN_LOADER_TEST_VAR:-other}").unwrap();
        assert_eq!(result, "test_value");

        let result = substitute_env_vars("${CHAIN_LOADER_MISSING_VAR:-default}").unwrap();
        assert_eq!(result, "default");

        std::env::remove_var("CHAIN_LOADER_TEST_VAR");
    }

    #[test]
    fn test_missing_env_var_is_error() {
        let err = substitute_env_vars("${CHAIN_LOADER_SURELY_UNSET_42}").unwrap_err();
        assert!(matches!(err, ChainError::Config(ConfigError::EnvVar(_))));
    }

    #[tokio::test]
    async fn test_load_yaml() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            r#"
name: pg
terminal:
  type: external
  command: postgres-mcp
  args: ["--db", "${{CHAIN_LOADER_DB:-main}}"]
middleware:
  - type: requireToken
    field: token
  - type: timeout
    timeoutMs: 500
"#
        )
        .unwrap();

        let config = load_from_path(file.path()).await.unwrap();
        assert_eq!(config.name, "pg");
        assert_eq!(config.middleware.len(), 2);
        match config.terminal {
            TerminalConfig::External {
                args,
                request_timeout_ms,
                ..
            } => {
                assert_eq!(args, vec!["--db", "main"]);
                assert_eq!(request_timeout_ms, 30000);
            }
            other => panic!("unexpected terminal: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unsupported_extension() {
        let file = tempfile::Builder::new().suffix(".ini").tempfile().unwrap();
        let err = load_from_path(file.path()).await.unwrap_err();
        assert!(matches!(err, ChainError::Config(ConfigError::Parse(_))));
    }

    #[tokio::test]
    async fn test_empty_cli_commands_rejected() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"{{"terminal": {{"type": "cli", "commands": []}}}}"#).unwrap();

        let err = load_from_path(file.path()).await.unwrap_err();
        assert!(matches!(err, ChainError::Config(ConfigError::Validation(_))));
    }
}
