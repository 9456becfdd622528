use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{ProtocolError, Result};

#[derive(Debug, Deserialize, Clone, Serialize, Default)]
pub struct AppConfig {
    pub channel: ChannelConfig,
    pub settlement: SettlementConfig,
    pub requester: RequesterConfig,
    pub provider: ProviderConfig,
    pub insurance: InsuranceConfig,
    pub bridge: BridgeConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone, Serialize)]
pub struct ChannelConfig {
    pub relay_endpoint: String,
    pub poll_interval_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Clone, Serialize)]
pub struct SettlementConfig {
    pub currency: String,
    /// Balance credited to each agent account at startup.
    pub opening_balance: f64,
}

#[derive(Debug, Deserialize, Clone, Serialize)]
pub struct RequesterConfig {
    pub agent_id: String,
    pub account_id: String,
    pub max_budget: f64,
    pub insurance_tier: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Serialize)]
pub struct ProviderConfig {
    pub agent_id: String,
    pub account_id: String,
    pub service: String,
    pub response_delay_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Clone, Serialize)]
pub struct InsuranceConfig {
    pub agent_id: String,
    pub account_id: String,
    pub response_delay_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Clone, Serialize)]
pub struct BridgeConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone, Serialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: Option<String>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            relay_endpoint: "http://localhost:8600".to_string(),
            poll_interval_ms: Some(500),
        }
    }
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            currency: "USD".to_string(),
            opening_balance: 5000.0,
        }
    }
}

impl Default for RequesterConfig {
    fn default() -> Self {
        Self {
            agent_id: "travel-agent".to_string(),
            account_id: "0.0.1001".to_string(),
            max_budget: 500.0,
            insurance_tier: Some("basic".to_string()),
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            agent_id: "hotel-agent".to_string(),
            account_id: "0.0.1002".to_string(),
            service: "hotel_booking".to_string(),
            response_delay_ms: None,
        }
    }
}

impl Default for InsuranceConfig {
    fn default() -> Self {
        Self {
            agent_id: "insurance-agent".to_string(),
            account_id: "0.0.1003".to_string(),
            response_delay_ms: None,
        }
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8601,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: None,
        }
    }
}

impl AppConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)
            .map_err(|e| ProtocolError::Config(format!("Failed to read config file: {}", e)))?;

        let config: AppConfig = toml::from_str(&config_str)
            .map_err(|e| ProtocolError::Config(format!("Failed to parse config file: {}", e)))?;

        Ok(config)
    }

    pub fn load_with_env_overrides<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::load(path)?;

        if let Ok(endpoint) = std::env::var("RELAY_ENDPOINT") {
            config.channel.relay_endpoint = endpoint;
        }

        if let Ok(log_level) = std::env::var("RUST_LOG") {
            config.logging.level = log_level;
        }

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.channel.relay_endpoint.is_empty() {
            return Err(ProtocolError::Config(
                "Relay endpoint cannot be empty".to_string(),
            ));
        }
        if self.requester.max_budget <= 0.0 {
            return Err(ProtocolError::Config(
                "Requester budget must be greater than 0".to_string(),
            ));
        }
        if self.settlement.opening_balance < 0.0 {
            return Err(ProtocolError::Config(
                "Opening balance cannot be negative".to_string(),
            ));
        }
        if self.bridge.port == 0 {
            return Err(ProtocolError::Config(
                "Bridge port cannot be 0".to_string(),
            ));
        }

        let accounts = [
            &self.requester.account_id,
            &self.provider.account_id,
            &self.insurance.account_id,
        ];
        if accounts.iter().any(|account| account.is_empty()) {
            return Err(ProtocolError::Config(
                "Agent account ids cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}

pub fn create_default_config_file<P: AsRef<Path>>(path: P) -> Result<()> {
    let default_config = AppConfig::default();
    let toml_str = toml::to_string_pretty(&default_config)
        .map_err(|e| ProtocolError::Config(format!("Failed to serialize default config: {}", e)))?;

    std::fs::write(path, toml_str)
        .map_err(|e| ProtocolError::Config(format!("Failed to write default config file: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.requester.max_budget, 500.0);
        assert_eq!(config.provider.service, "hotel_booking");
        assert_eq!(config.bridge.port, 8601);
    }

    #[test]
    fn test_config_validation() {
        let mut config = AppConfig::default();
        assert!(config.validate().is_ok());

        config.requester.max_budget = 0.0;
        assert!(config.validate().is_err());

        config.requester.max_budget = 500.0;
        config.provider.account_id.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_file_round_trip() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path();

        create_default_config_file(path).unwrap();
        assert!(path.exists());

        let loaded = AppConfig::load(path).unwrap();
        assert_eq!(loaded.channel.relay_endpoint, "http://localhost:8600");
        assert_eq!(loaded.insurance.agent_id, "insurance-agent");
    }

    #[test]
    fn test_partial_config_is_rejected() {
        let temp_file = NamedTempFile::new().unwrap();
        std::fs::write(temp_file.path(), "[requester]\nmax_budget = 100.0\n").unwrap();

        // Sections are required; a fragment is a config error.
        assert!(AppConfig::load(temp_file.path()).is_err());
    }
}
