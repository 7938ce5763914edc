use crate::config::types::{Config, LedgerConfig};
use crate::ConfigError;

/// Upper bound on the running timeout (one week)
const MAX_RUNNING_TIMEOUT_MINUTES: u32 = 7 * 24 * 60;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_ledger_config(&config.ledger)?;
    Ok(())
}

/// Validates ledger configuration
fn validate_ledger_config(config: &LedgerConfig) -> Result<(), ConfigError> {
    if config.database_path.trim().is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    if config.running_timeout_minutes < 1
        || config.running_timeout_minutes > MAX_RUNNING_TIMEOUT_MINUTES
    {
        return Err(ConfigError::Validation(format!(
            "running_timeout_minutes must be between 1 and {}, got {}",
            MAX_RUNNING_TIMEOUT_MINUTES, config.running_timeout_minutes
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::StubAccounting;

    fn create_valid_config() -> Config {
        Config {
            ledger: LedgerConfig {
                database_path: "./ledger.db".to_string(),
                running_timeout_minutes: 60,
                stub_accounting: StubAccounting::Subtract,
            },
        }
    }

    #[test]
    fn test_valid_config() {
        let config = create_valid_config();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn test_empty_database_path() {
        let mut config = create_valid_config();
        config.ledger.database_path = "  ".to_string();
        assert!(matches!(
            validate(&config),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_zero_timeout() {
        let mut config = create_valid_config();
        config.ledger.running_timeout_minutes = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_timeout_too_large() {
        let mut config = create_valid_config();
        config.ledger.running_timeout_minutes = MAX_RUNNING_TIMEOUT_MINUTES + 1;
        assert!(validate(&config).is_err());
    }
}
