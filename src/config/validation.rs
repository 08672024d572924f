//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, windows > 0, gzip level)
//! - Validate addresses and the CORS policy before anything is built
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use crate::config::schema::ServerConfig;
use crate::security::cors::CorsPolicy;

/// One semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

/// Check `config`, collecting every violation.
pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("not a socket address: {:?}", config.listener.bind_address),
        ));
    }

    if config.timeouts.enabled && config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new(
            "timeouts.request_secs",
            "must be greater than 0",
        ));
    }

    let rate_limit = &config.rate_limit;
    if rate_limit.enabled {
        for (field, value) in [
            ("rate_limit.max_requests", rate_limit.max_requests),
            ("rate_limit.window_secs", rate_limit.window_secs),
            ("rate_limit.sweep_interval_secs", rate_limit.sweep_interval_secs),
            ("rate_limit.retention_secs", rate_limit.retention_secs),
        ] {
            if value == 0 {
                errors.push(ValidationError::new(field, "must be greater than 0"));
            }
        }
    }

    if config.cors.enabled {
        if let Err(e) = CorsPolicy::new(config.cors.options.clone()) {
            errors.push(ValidationError::new("cors", e.to_string()));
        }
    }

    if config.compression.level > 9 {
        errors.push(ValidationError::new(
            "compression.level",
            format!("must be between 0 and 9, got {}", config.compression.level),
        ));
    }

    let observability = &config.observability;
    if observability.metrics_enabled
        && observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("not a socket address: {:?}", observability.metrics_address),
        ));
    }
    if tracing_subscriber::EnvFilter::try_new(&observability.log_filter).is_err() {
        errors.push(ValidationError::new(
            "observability.log_filter",
            format!("invalid filter directive: {:?}", observability.log_filter),
        ));
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
    fn test_defaults_are_valid() {
        assert_eq!(validate_config(&ServerConfig::default()), Ok(()));
    }

    #[test]
    fn test_all_errors_are_reported() {
        let mut config = ServerConfig::default();
        config.listener.bind_address = "not-an-address".into();
        config.timeouts.request_secs = 0;
        config.rate_limit.enabled = true;
        config.rate_limit.window_secs = 0;
        config.compression.level = 12;

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec![
                "listener.bind_address",
                "timeouts.request_secs",
                "rate_limit.window_secs",
                "compression.level"
            ]
        );
    }

    #[test]
    fn test_invalid_cors_policy_is_reported() {
        let mut config = ServerConfig::default();
        config.cors.enabled = true;
        config.cors.options.allow_credentials = true;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "cors");
        assert!(errors[0].to_string().contains("wildcard origin"));
    }

    #[test]
    fn test_disabled_sections_are_not_checked() {
        let mut config = ServerConfig::default();
        config.rate_limit.window_secs = 0;
        config.observability.metrics_address = "nowhere".into();
        assert!(validate_config(&config).is_ok());
    }
}
