use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use nhl_forecast_core::store::DEFAULT_MAX_VALUE_BYTES;
use nhl_forecast_provider::{AgentRoster, HttpAgentConfig};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// Largest single value the store accepts, in bytes.
    pub max_value_bytes: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_value_bytes: DEFAULT_MAX_VALUE_BYTES,
        }
    }
}

/// Operator configuration. Every field has a default, so an empty file is
/// a valid configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ForecastConfig {
    pub agents: AgentRoster,
    pub endpoint: HttpAgentConfig,
    pub store: StoreConfig,
    pub show_sample: bool,
}

/// Load configuration YAML from disk.
///
/// # Errors
/// Returns an error when the file cannot be read, parsed, or validated.
pub fn load_config_from_path(path: &Path) -> Result<ForecastConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read config at {}", path.display()))?;
    parse_config_yaml(&content)
}

/// Parse and validate configuration YAML.
///
/// # Errors
/// Returns an error when the YAML is malformed or a value is invalid.
pub fn parse_config_yaml(yaml: &str) -> Result<ForecastConfig> {
    let config: ForecastConfig = if yaml.trim().is_empty() {
        ForecastConfig::default()
    } else {
        serde_yaml::from_str(yaml).map_err(|err| anyhow!("invalid config YAML structure: {err}"))?
    };
    validate_config(&config)?;
    Ok(config)
}

/// # Errors
/// Returns an error naming the first invalid field.
pub fn validate_config(config: &ForecastConfig) -> Result<()> {
    ensure_non_empty("agents.projection", &config.agents.projection)?;
    ensure_non_empty("agents.results", &config.agents.results)?;
    ensure_non_empty("agents.patterns", &config.agents.patterns)?;

    if config.endpoint.timeout_ms == 0 {
        return Err(anyhow!("endpoint.timeout_ms MUST be greater than zero"));
    }
    if config.store.max_value_bytes == 0 {
        return Err(anyhow!("store.max_value_bytes MUST be greater than zero"));
    }
    if let Some(env_name) = &config.endpoint.auth_bearer_env {
        ensure_non_empty("endpoint.auth_bearer_env", env_name)?;
    }
    Ok(())
}

fn ensure_non_empty(field_name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(anyhow!("{field_name} MUST be non-empty"));
    }
    Ok(())
}
