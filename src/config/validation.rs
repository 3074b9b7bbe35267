use std::net::SocketAddr;

use http::{HeaderName, HeaderValue};

use crate::config::models::{HealthConfig, PipelineConfig, ServerConfig};

/// Validation result type alias
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validation error types
#[derive(Debug, thiserror::Error, Clone)]
pub enum ValidationError {
    #[error("Invalid field '{field}': {message}")]
    InvalidField { field: String, message: String },

    #[error("Invalid listen address '{address}': {reason}")]
    InvalidListenAddress { address: String, reason: String },

    #[error("Listener conflict: {message}")]
    ListenerConflict { message: String },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },
}

/// Server configuration validator
pub struct ServerConfigValidator;

impl ServerConfigValidator {
    /// Validate the entire server configuration
    pub fn validate(config: &ServerConfig) -> ValidationResult<()> {
        let mut errors = Vec::new();

        let grpc = Self::validate_listen_address(&config.grpc_listen_addr);
        let health = Self::validate_listen_address(&config.health_listen_addr);

        match (&grpc, &health) {
            (Ok(a), Ok(b)) if a == b && a.port() != 0 => {
                errors.push(ValidationError::ListenerConflict {
                    message: format!("grpc_listen_addr and health_listen_addr are both {a}"),
                })
            }
            _ => {}
        }
        errors.extend(grpc.err());
        errors.extend(health.err());

        errors.extend(Self::validate_pipeline(&config.pipeline));
        errors.extend(Self::validate_health(&config.health));

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::ValidationFailed {
                message: Self::format_multiple_errors(errors),
            })
        }
    }

    /// Validate listen address format
    fn validate_listen_address(address: &str) -> ValidationResult<SocketAddr> {
        address
            .parse::<SocketAddr>()
            .map_err(|_| ValidationError::InvalidListenAddress {
                address: address.to_string(),
                reason: "Must be in format 'IP:PORT' (e.g., '127.0.0.1:9001' or '0.0.0.0:8080')"
                    .to_string(),
            })
    }

    fn validate_pipeline(pipeline: &PipelineConfig) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        for (field, name) in [
            ("pipeline.stamp_header", &pipeline.stamp_header),
            ("pipeline.directive_header", &pipeline.directive_header),
            ("pipeline.authorization_header", &pipeline.authorization_header),
        ] {
            if let Err(e) = Self::validate_header_name(field, name, false) {
                errors.push(e);
            }
        }

        if let Err(e) = Self::validate_header_name("pipeline.path_header", &pipeline.path_header, true)
        {
            errors.push(e);
        }

        if HeaderValue::from_str(&pipeline.stamp_value).is_err() {
            errors.push(ValidationError::InvalidField {
                field: "pipeline.stamp_value".to_string(),
                message: format!("'{}' is not a valid header value", pipeline.stamp_value),
            });
        }

        errors
    }

    fn validate_health(health: &HealthConfig) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if !health.http_path.starts_with('/') {
            errors.push(ValidationError::InvalidField {
                field: "health.http_path".to_string(),
                message: "HTTP probe path must start with '/'".to_string(),
            });
        }

        if health.service_name.is_empty() {
            errors.push(ValidationError::InvalidField {
                field: "health.service_name".to_string(),
                message: "service name must not be empty (\"\" is reserved for overall health)"
                    .to_string(),
            });
        }

        errors
    }

    /// Header names must be lower-case tokens; pseudo-headers only where allowed.
    fn validate_header_name(field: &str, name: &str, allow_pseudo: bool) -> ValidationResult<()> {
        let token = match name.strip_prefix(':') {
            Some(rest) if allow_pseudo => rest,
            Some(_) => {
                return Err(ValidationError::InvalidField {
                    field: field.to_string(),
                    message: format!("pseudo-header '{name}' is not allowed here"),
                });
            }
            None => name,
        };

        if token.chars().any(|c| c.is_ascii_uppercase()) {
            return Err(ValidationError::InvalidField {
                field: field.to_string(),
                message: format!("header name '{name}' must be lower-case"),
            });
        }

        if HeaderName::from_bytes(token.as_bytes()).is_err() {
            return Err(ValidationError::InvalidField {
                field: field.to_string(),
                message: format!("'{name}' is not a valid header name"),
            });
        }

        Ok(())
    }

    fn format_multiple_errors(errors: Vec<ValidationError>) -> String {
        errors
            .iter()
            .enumerate()
            .map(|(i, e)| format!("  {}. {}", i + 1, e))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(ServerConfigValidator::validate(&ServerConfig::default()).is_ok());
    }

    #[test]
    fn test_invalid_listen_address() {
        let config = ServerConfig::builder()
            .grpc_listen_addr("localhost")
            .build();

        let err = ServerConfigValidator::validate(&config).unwrap_err();
        assert!(err.to_string().contains("localhost"));
    }

    #[test]
    fn test_listener_conflict() {
        let config = ServerConfig::builder()
            .grpc_listen_addr("127.0.0.1:9001")
            .health_listen_addr("127.0.0.1:9001")
            .build();

        let err = ServerConfigValidator::validate(&config).unwrap_err();
        assert!(err.to_string().contains("Listener conflict"));
    }

    #[test]
    fn test_invalid_header_names_are_aggregated() {
        let config = ServerConfig::builder()
            .pipeline(PipelineConfig {
                stamp_header: "X-Processed-By".to_string(),
                directive_header: ":instructions".to_string(),
                stamp_value: "bad\nvalue".to_string(),
                ..PipelineConfig::default()
            })
            .build();

        let message = ServerConfigValidator::validate(&config)
            .unwrap_err()
            .to_string();
        assert!(message.contains("pipeline.stamp_header"));
        assert!(message.contains("pipeline.directive_header"));
        assert!(message.contains("pipeline.stamp_value"));
    }

    #[test]
    fn test_pseudo_header_allowed_for_path() {
        let config = ServerConfig::builder()
            .pipeline(PipelineConfig {
                path_header: "x-original-path".to_string(),
                ..PipelineConfig::default()
            })
            .build();
        assert!(ServerConfigValidator::validate(&config).is_ok());
    }

    #[test]
    fn test_health_path_must_be_absolute() {
        let config = ServerConfig::builder()
            .health(HealthConfig {
                http_path: "health".to_string(),
                ..HealthConfig::default()
            })
            .build();
        assert!(ServerConfigValidator::validate(&config).is_err());
    }
}
