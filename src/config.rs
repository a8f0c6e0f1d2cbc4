use crate::error::{LedgerError, LedgerResult};
use crate::units::{Amount, MAX_ORDINAL};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;

fn default_unit_size() -> Amount {
    1_000_000_000_000_000_000
}

fn default_max_issuable() -> u128 {
    10_000
}

/// Ledger parameters fixed at construction, some of which an admin may change later
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Fungible amount represented by one discrete unit
    #[serde(default = "default_unit_size")]
    pub unit_size: Amount,

    /// Cap on the monotonic issuance counter
    #[serde(default = "default_max_issuable")]
    pub max_issuable: u128,

    /// Optional cap on total fungible supply
    #[serde(default)]
    pub max_supply: Option<Amount>,

    /// Per-unit cost for paid issuance; paid issuance is disabled when unset
    #[serde(default)]
    pub unit_price: Option<Amount>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            unit_size: default_unit_size(),
            max_issuable: default_max_issuable(),
            max_supply: None,
            unit_price: None,
        }
    }
}

impl LedgerConfig {
    pub fn with_unit_size(mut self, unit_size: Amount) -> Self {
        self.unit_size = unit_size;
        self
    }

    pub fn with_max_issuable(mut self, max_issuable: u128) -> Self {
        self.max_issuable = max_issuable;
        self
    }

    pub fn with_max_supply(mut self, max_supply: Amount) -> Self {
        self.max_supply = Some(max_supply);
        self
    }

    pub fn with_unit_price(mut self, unit_price: Amount) -> Self {
        self.unit_price = Some(unit_price);
        self
    }

    /// Parse a configuration from JSON; missing fields take their defaults
    pub fn from_json_str(json: &str) -> LedgerResult<Self> {
        let config: LedgerConfig = serde_json::from_str(json)
            .map_err(|e| LedgerError::Config(format!("Invalid ledger config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON configuration file
    pub fn load<P: AsRef<Path>>(path: P) -> LedgerResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read ledger config {}", path.display()))?;
        let config: LedgerConfig = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse ledger config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> LedgerResult<()> {
        if self.unit_size == 0 {
            return Err(LedgerError::InvalidUnitSize(self.unit_size));
        }
        if self.max_issuable > MAX_ORDINAL {
            return Err(LedgerError::InvalidIssuanceLimit {
                requested: self.max_issuable,
                issued: 0,
            });
        }
        Ok(())
    }
}
