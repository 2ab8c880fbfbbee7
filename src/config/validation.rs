//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Every endpoint has a name and an absolute http(s) target
//! - Validate value ranges (port, upstream timeout)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use url::Url;

use crate::config::schema::ProxyConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("at least one endpoint must be configured")]
    NoEndpoints,

    #[error("endpoint {key}: name is required")]
    MissingName { key: String },

    #[error("endpoint {key}: target is required")]
    MissingTarget { key: String },

    #[error("endpoint {key}: target must be a valid HTTP/HTTPS URL (got '{target}')")]
    InvalidTarget { key: String, target: String },

    #[error("server: port must be between 1 and 65535")]
    InvalidPort,

    #[error("server: upstream_timeout must be greater than zero")]
    ZeroUpstreamTimeout,
}

/// Check an endpoint target is an absolute `http`/`https` URL.
pub fn is_valid_target(target: &str) -> bool {
    match Url::parse(target) {
        Ok(url) => matches!(url.scheme(), "http" | "https") && url.has_host(),
        Err(_) => false,
    }
}

/// Validate a configuration, collecting every violation.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.endpoints.is_empty() {
        errors.push(ValidationError::NoEndpoints);
    }

    for (key, endpoint) in &config.endpoints {
        if endpoint.name.is_empty() {
            errors.push(ValidationError::MissingName { key: key.clone() });
        }
        if endpoint.target.is_empty() {
            errors.push(ValidationError::MissingTarget { key: key.clone() });
        } else if !is_valid_target(&endpoint.target) {
            errors.push(ValidationError::InvalidTarget {
                key: key.clone(),
                target: endpoint.target.clone(),
            });
        }
    }

    if config.server.port == 0 {
        errors.push(ValidationError::InvalidPort);
    }
    if config.server.upstream_timeout == 0 {
        errors.push(ValidationError::ZeroUpstreamTimeout);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_config() {
        let config = ProxyConfig::default().with_endpoint("api", "https://api.example.com");
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = ProxyConfig::default()
            .with_endpoint("bad", "not-a-url")
            .with_endpoint("ftp", "ftp://files.example.com");
        config.server.port = 0;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors.contains(&ValidationError::InvalidPort));
        assert!(errors.contains(&ValidationError::InvalidTarget {
            key: "bad".into(),
            target: "not-a-url".into(),
        }));
    }

    #[test]
    fn test_empty_config_rejected() {
        let errors = validate_config(&ProxyConfig::default()).unwrap_err();
        assert_eq!(errors, vec![ValidationError::NoEndpoints]);
    }

    #[test]
    fn test_target_rules() {
        assert!(is_valid_target("http://localhost:3000"));
        assert!(is_valid_target("https://api.example.com/v1/"));
        assert!(!is_valid_target("api.example.com"));
        assert!(!is_valid_target("/relative/path"));
        assert!(!is_valid_target("mailto:someone@example.com"));
    }
}
