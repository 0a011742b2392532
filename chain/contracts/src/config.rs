//! Deployment configuration
//!
//! Loaded from JSON; every field is optional and falls back to its default.

use serde::{Deserialize, Serialize};
use types::ids::Address;
use types::numeric::{Amount, INVERSE_BASIS_POINT};

use crate::errors::ConfigError;
use crate::registry::DEFAULT_DELAY_SECONDS;

/// Exchange parameters (owner-tunable after deployment)
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeConfig {
    /// Basis points a SplitFee maker must offer the protocol
    pub minimum_maker_protocol_fee: Amount,
    /// Basis points a SplitFee taker must offer the protocol
    pub minimum_taker_protocol_fee: Amount,
    /// Receives protocol fees; zero means the deploying owner
    pub protocol_fee_recipient: Address,
}

/// Proxy registry parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Delay for grant revocation and default-caller additions
    pub revoke_delay_seconds: i64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            revoke_delay_seconds: DEFAULT_DELAY_SECONDS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    pub exchange: ExchangeConfig,
    pub registry: RegistryConfig,
}

impl ChainConfig {
    /// Parse and validate a JSON configuration.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: ChainConfig =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.registry.revoke_delay_seconds < 0 {
            return Err(ConfigError::Invalid(format!(
                "revoke_delay_seconds must be non-negative, got {}",
                self.registry.revoke_delay_seconds
            )));
        }
        let cap = Amount::new(INVERSE_BASIS_POINT);
        for (name, fee) in [
            ("minimum_maker_protocol_fee", self.exchange.minimum_maker_protocol_fee),
            ("minimum_taker_protocol_fee", self.exchange.minimum_taker_protocol_fee),
        ] {
            if fee > cap {
                return Err(ConfigError::Invalid(format!(
                    "{} exceeds {} basis points",
                    name, INVERSE_BASIS_POINT
                )));
            }
        }
        Ok(())
    }
}
