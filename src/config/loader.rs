//! Configuration loading from disk and the environment.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::schema::{EndpointConfig, ProxyConfig, ServerConfig};
use crate::config::validation::{validate_config, ValidationError};

const ENDPOINTS_JSON_VAR: &str = "PROXY_ENDPOINTS_JSON";
const ENDPOINT_PREFIX: &str = "PROXY_ENDPOINT_";
const TARGET_SUFFIX: &str = "_TARGET";

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Parse error: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("invalid {var} value: {value}")]
    Env { var: String, value: String },

    #[error("no endpoints configured (use PROXY_ENDPOINTS_JSON or PROXY_ENDPOINT_{{KEY}}_TARGET)")]
    NoEndpoints,

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Where the configuration comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// A JSON or TOML file.
    File(PathBuf),
    /// Environment variables only.
    Env,
    /// A file, with server settings overridden from the environment.
    Hybrid(PathBuf),
}

impl ConfigSource {
    /// Load and validate a configuration from this source.
    pub fn load(&self) -> Result<ProxyConfig, ConfigError> {
        match self {
            ConfigSource::File(path) => load_config(path),
            ConfigSource::Env => load_from_env_vars(std::env::vars()),
            ConfigSource::Hybrid(path) => load_hybrid(path, std::env::vars()),
        }
    }

    /// The file backing this source, if any (used for watching).
    pub fn path(&self) -> Option<&Path> {
        match self {
            ConfigSource::File(path) | ConfigSource::Hybrid(path) => Some(path),
            ConfigSource::Env => None,
        }
    }
}

/// Load and validate configuration from a JSON or TOML file.
///
/// Files ending in `.json` are parsed as JSON; everything else as TOML.
pub fn load_config(path: &Path) -> Result<ProxyConfig, ConfigError> {
    let mut config = read_config_file(path)?;
    config.normalize();
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

fn read_config_file(path: &Path) -> Result<ProxyConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    if is_json {
        Ok(serde_json::from_str(&content)?)
    } else {
        Ok(toml::from_str(&content)?)
    }
}

/// Load a file and override server settings from the given variables.
pub fn load_hybrid<I>(path: &Path, vars: I) -> Result<ProxyConfig, ConfigError>
where
    I: IntoIterator<Item = (String, String)>,
{
    let vars: HashMap<String, String> = vars.into_iter().collect();
    let mut config = read_config_file(path)?;
    apply_server_overrides(&mut config.server, &vars)?;
    config.normalize();
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Build a configuration entirely from the given variables.
pub fn load_from_env_vars<I>(vars: I) -> Result<ProxyConfig, ConfigError>
where
    I: IntoIterator<Item = (String, String)>,
{
    let vars: HashMap<String, String> = vars.into_iter().collect();

    let mut config = ProxyConfig::default();
    apply_server_overrides(&mut config.server, &vars)?;
    config.endpoints = endpoints_from_vars(&vars)?;
    config.normalize();

    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Apply `PROXY_PORT`, `PROXY_READ_TIMEOUT`, `PROXY_WRITE_TIMEOUT` and
/// `PROXY_UPSTREAM_TIMEOUT` when set. Unset variables leave the field alone.
pub fn apply_server_overrides(
    server: &mut ServerConfig,
    vars: &HashMap<String, String>,
) -> Result<(), ConfigError> {
    if let Some(port) = parse_var(vars, "PROXY_PORT")? {
        server.port = port;
    }
    if let Some(timeout) = parse_var(vars, "PROXY_READ_TIMEOUT")? {
        server.read_timeout = timeout;
    }
    if let Some(timeout) = parse_var(vars, "PROXY_WRITE_TIMEOUT")? {
        server.write_timeout = timeout;
    }
    if let Some(timeout) = parse_var(vars, "PROXY_UPSTREAM_TIMEOUT")? {
        server.upstream_timeout = timeout;
    }
    Ok(())
}

fn parse_var<T: std::str::FromStr>(
    vars: &HashMap<String, String>,
    var: &str,
) -> Result<Option<T>, ConfigError> {
    match vars.get(var).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(value) => value.parse().map(Some).map_err(|_| ConfigError::Env {
            var: var.to_string(),
            value: value.clone(),
        }),
    }
}

/// Collect endpoints from `PROXY_ENDPOINTS_JSON` and `PROXY_ENDPOINT_{KEY}_TARGET`.
///
/// Individual variables override JSON entries under the same map key. The
/// map key is always `{KEY}`; the display name is `PROXY_ENDPOINT_{KEY}_NAME`
/// when set, otherwise `{KEY}` lower-cased with `_` replaced by `-`.
fn endpoints_from_vars(
    vars: &HashMap<String, String>,
) -> Result<BTreeMap<String, EndpointConfig>, ConfigError> {
    let mut endpoints = BTreeMap::new();

    if let Some(json) = vars.get(ENDPOINTS_JSON_VAR).filter(|v| !v.is_empty()) {
        endpoints = serde_json::from_str(json).map_err(|_| ConfigError::Env {
            var: ENDPOINTS_JSON_VAR.to_string(),
            value: json.clone(),
        })?;
    }

    let mut keys: Vec<&str> = vars
        .iter()
        .filter(|(_, target)| !target.is_empty())
        .filter_map(|(var, _)| {
            var.strip_prefix(ENDPOINT_PREFIX)
                .and_then(|rest| rest.strip_suffix(TARGET_SUFFIX))
        })
        .filter(|key| !key.is_empty())
        .collect();
    keys.sort_unstable();

    for key in keys {
        let target = vars[&format!("{ENDPOINT_PREFIX}{key}{TARGET_SUFFIX}")].clone();
        let explicit_name = vars
            .get(&format!("{ENDPOINT_PREFIX}{key}_NAME"))
            .filter(|n| !n.is_empty());

        let name = match explicit_name {
            Some(name) => name.clone(),
            None => key.to_lowercase().replace('_', "-"),
        };

        endpoints.insert(key.to_string(), EndpointConfig { name, target });
    }

    if endpoints.is_empty() {
        return Err(ConfigError::NoEndpoints);
    }
    Ok(endpoints)
}
