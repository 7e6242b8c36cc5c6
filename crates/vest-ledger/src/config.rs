use std::path::Path;

use serde::{Deserialize, Serialize};
use vest_types::{Address, StreamId};

/// Errors raised while loading or validating a [`LedgerConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Configuration for a stream ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Address that holds deposited funds. Streams may not pay to it.
    pub custody_address: Address,
    /// Owner at construction; `None` starts the ledger unowned.
    pub initial_owner: Option<Address>,
    /// Identifier given to the first stream.
    pub first_stream_id: StreamId,
    /// Upper bound on ids accepted by a single batch call.
    pub max_batch_size: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            custody_address: Address::derive("vest-ledger-custody"),
            initial_owner: None,
            first_stream_id: StreamId::new(1),
            max_batch_size: 256,
        }
    }
}

impl LedgerConfig {
    /// Parse from TOML text. Missing keys take their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: LedgerConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn with_owner(mut self, owner: Address) -> Self {
        self.initial_owner = Some(owner);
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.custody_address.is_zero() {
            return Err(ConfigError::Invalid(
                "custody_address must not be the zero address".into(),
            ));
        }
        if self.max_batch_size == 0 {
            return Err(ConfigError::Invalid("max_batch_size must be at least 1".into()));
        }
        if self.first_stream_id.value() == 0 {
            return Err(ConfigError::Invalid("first_stream_id must be at least 1".into()));
        }
        Ok(())
    }
}
