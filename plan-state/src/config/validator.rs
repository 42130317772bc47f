use crate::config::error::{ConfigError, Result};
use crate::config::loader::EngineConfig;
use jsonschema::{Draft, JSONSchema};
use serde_json::Value;

/// Schema validator for [`EngineConfig`]
///
/// The schema is embedded at compile time so validation never depends on
/// files next to the binary.
pub struct SchemaValidator {
    schema: JSONSchema,
}

impl SchemaValidator {
    pub fn new() -> Result<Self> {
        let schema_str = include_str!("schemas/engine_config.schema.json");
        let schema_value: Value = serde_json::from_str(schema_str).map_err(|e| {
            ConfigError::SchemaValidationError(format!("Failed to parse engine schema: {e}"))
        })?;

        let schema = JSONSchema::options()
            .with_draft(Draft::Draft7)
            .compile(&schema_value)
            .map_err(|e| {
                ConfigError::SchemaValidationError(format!("Failed to compile engine schema: {e}"))
            })?;

        Ok(Self { schema })
    }

    /// Validate a config, listing every violation in the error.
    pub fn validate(&self, config: &EngineConfig) -> Result<()> {
        let config_value = serde_json::to_value(config).map_err(|e| {
            ConfigError::SchemaValidationError(format!("Failed to serialize config: {e}"))
        })?;

        if let Err(errors) = self.schema.validate(&config_value) {
            let messages: Vec<String> = errors
                .map(|e| {
                    let path = e.instance_path.to_string();
                    let path = if path.is_empty() { "root".to_string() } else { path };
                    format!("{e} at '{path}'")
                })
                .collect();

            return Err(ConfigError::SchemaValidationError(format!(
                "Configuration validation failed ({} error{}):\n  - {}",
                messages.len(),
                if messages.len() == 1 { "" } else { "s" },
                messages.join("\n  - ")
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_default_config() {
        let validator = SchemaValidator::new().expect("Failed to create validator");
        let result = validator.validate(&EngineConfig::default());
        assert!(result.is_ok(), "Default config should be valid: {result:?}");
    }

    #[test]
    fn test_reports_every_violation() {
        let mut config = EngineConfig::default();
        config.context.debounce_interval = 0;
        config.layout.state_file = String::new();

        let validator = SchemaValidator::new().expect("Failed to create validator");
        let err = validator.validate(&config).unwrap_err();

        let msg = err.to_string();
        assert!(msg.contains("2 errors"), "unexpected message: {msg}");
        assert!(msg.contains("/context/debounce_interval"));
        assert!(msg.contains("/layout/state_file"));
    }
}
