//! Configuration validation.
//!
//! Ensures batch sizes and worker bounds are usable and that the oracle
//! section names something we can call before any work is started.

use thiserror::Error;

use crate::config::{Config, ObservabilityConfig, OracleConfig, PipelineConfig};

/// Log levels accepted by `observability.log_level`.
pub const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Log formats accepted by `observability.log_format`.
pub const LOG_FORMATS: &[&str] = &["pretty", "json"];

/// Providers the oracle crate knows how to construct.
pub const PROVIDERS: &[&str] = &["openai"];

/// Configuration validation error.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Multiple validation errors: {0:?}")]
    Multiple(Vec<ValidationError>),
}

impl ValidationError {
    fn invalid(field: &str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    /// Flatten into individual errors.
    pub fn into_vec(self) -> Vec<ValidationError> {
        match self {
            Self::Multiple(errors) => errors,
            other => vec![other],
        }
    }
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Trait for validatable configuration sections.
pub trait Validate {
    /// Validate this configuration section.
    fn validate(&self) -> ValidationResult<()>;
}

/// Collapse a list of errors into a single result.
fn collect(mut errors: Vec<ValidationError>) -> ValidationResult<()> {
    if errors.is_empty() {
        Ok(())
    } else if errors.len() == 1 {
        Err(errors.remove(0))
    } else {
        Err(ValidationError::Multiple(errors))
    }
}

impl Validate for Config {
    fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if let Err(e) = self.oracle.validate() {
            errors.extend(e.into_vec());
        }
        if let Err(e) = self.pipeline.validate() {
            errors.extend(e.into_vec());
        }
        if let Err(e) = self.observability.validate() {
            errors.extend(e.into_vec());
        }

        collect(errors)
    }
}

impl Validate for OracleConfig {
    fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if !PROVIDERS.contains(&self.provider.as_str()) {
            errors.push(ValidationError::invalid(
                "oracle.provider",
                format!("unknown provider '{}' (expected one of {PROVIDERS:?})", self.provider),
            ));
        }
        if self.model.trim().is_empty() {
            errors.push(ValidationError::MissingField {
                field: "oracle.model".into(),
            });
        }
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            errors.push(ValidationError::invalid(
                "oracle.base_url",
                "must start with http:// or https://",
            ));
        }
        if self.timeout_secs == 0 {
            errors.push(ValidationError::invalid("oracle.timeout_secs", "must be positive"));
        }
        if let Some(t) = self.temperature {
            if !(0.0..=2.0).contains(&t) {
                errors.push(ValidationError::invalid(
                    "oracle.temperature",
                    "must be between 0.0 and 2.0",
                ));
            }
        }

        collect(errors)
    }
}

impl OracleConfig {
    /// The API key, required before any oracle call is made.
    pub fn require_api_key(&self) -> ValidationResult<&str> {
        match self.api_key.as_deref() {
            Some(key) if !key.trim().is_empty() => Ok(key),
            _ => Err(ValidationError::MissingField {
                field: "oracle.api_key (or OPENAI_API_KEY)".into(),
            }),
        }
    }
}

impl Validate for PipelineConfig {
    fn validate(&self) -> ValidationResult<()> {
        let positive = [
            ("pipeline.topic_sample_size", self.topic_sample_size),
            ("pipeline.axis_sample_size", self.axis_sample_size),
            ("pipeline.anchor_sample_size", self.anchor_sample_size),
            ("pipeline.classify_batch_size", self.classify_batch_size),
            ("pipeline.score_batch_size", self.score_batch_size),
            ("pipeline.workers", self.workers),
            ("pipeline.score_workers", self.score_workers),
        ];

        let errors = positive
            .iter()
            .filter(|(_, value)| *value == 0)
            .map(|(field, _)| ValidationError::invalid(field, "must be greater than zero"))
            .collect();

        collect(errors)
    }
}

impl Validate for ObservabilityConfig {
    fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if !LOG_LEVELS.contains(&self.log_level.to_lowercase().as_str()) {
            errors.push(ValidationError::invalid(
                "observability.log_level",
                format!("'{}' is not one of {LOG_LEVELS:?}", self.log_level),
            ));
        }
        if !LOG_FORMATS.contains(&self.log_format.as_str()) {
            errors.push(ValidationError::invalid(
                "observability.log_format",
                format!("'{}' is not one of {LOG_FORMATS:?}", self.log_format),
            ));
        }

        collect(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test_case("classify_batch_size")]
    #[test_case("score_batch_size")]
    #[test_case("workers")]
    #[test_case("score_workers")]
    fn test_zero_pipeline_value_rejected(field: &str) {
        let mut pipeline = PipelineConfig::default();
        match field {
            "classify_batch_size" => pipeline.classify_batch_size = 0,
            "score_batch_size" => pipeline.score_batch_size = 0,
            "workers" => pipeline.workers = 0,
            _ => pipeline.score_workers = 0,
        }

        let err = pipeline.validate().unwrap_err();
        assert!(err.to_string().contains(field));
    }

    #[test]
    fn test_multiple_errors_are_collected() {
        let mut config = Config::default();
        config.pipeline.workers = 0;
        config.observability.log_format = "xml".into();
        config.oracle.model = "  ".into();

        match config.validate().unwrap_err() {
            ValidationError::Multiple(errors) => assert_eq!(errors.len(), 3),
            other => panic!("expected multiple errors, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let oracle = OracleConfig {
            provider: "carrier-pigeon".into(),
            ..OracleConfig::default()
        };
        assert!(oracle.validate().is_err());
    }

    #[test]
    fn test_require_api_key() {
        let mut oracle = OracleConfig::default();
        assert!(oracle.require_api_key().is_err());
        oracle.api_key = Some("   ".into());
        assert!(oracle.require_api_key().is_err());
        oracle.api_key = Some("sk-live".into());
        assert_eq!(oracle.require_api_key().unwrap(), "sk-live");
    }
}
