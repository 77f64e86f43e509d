use crate::error::Error;
use derive_builder::Builder;
use serde::{Deserialize, Serialize};

/// How far behind the chain's own time estimate a block may be stamped.
pub const DEFAULT_GRACE_PERIOD_SECS: i64 = 60 * 60;

fn default_grace_period() -> i64 {
    DEFAULT_GRACE_PERIOD_SECS
}

/// Schedule and window of the difficulty time keeper.
#[derive(Builder, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[builder(pattern = "owned")]
pub struct TimeKeeperConfig {
    /// Unix time of block 0 on the schedule.
    pub origin_time: i64,
    /// Target seconds between blocks.
    pub block_interval_secs: i64,
    /// Maximum number of retained block records.
    pub window: usize,
    #[builder(default = "DEFAULT_GRACE_PERIOD_SECS")]
    #[serde(default = "default_grace_period")]
    pub grace_period_secs: i64,
}

impl TimeKeeperConfig {
    pub fn validate(&self) -> Result<(), Error> {
        if self.block_interval_secs <= 0 {
            return Err(Error::InvalidConfig(
                "block_interval_secs must be >= 1".into(),
            ));
        }
        if self.window == 0 {
            return Err(Error::InvalidConfig("window must be >= 1".into()));
        }
        if self.grace_period_secs < 0 {
            return Err(Error::InvalidConfig(
                "grace_period_secs must be >= 0".into(),
            ));
        }
        Ok(())
    }

    /// Parse and validate a JSON document.
    pub fn from_json(json: &str) -> Result<Self, Error> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| Error::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}

impl TimeKeeperConfigBuilder {
    pub fn build_validated(self) -> Result<TimeKeeperConfig, Error> {
        let config = self
            .build()
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}
