use config::builder::DefaultState;
use config::{Config as ConfigLoader, ConfigBuilder, Environment, File, FileFormat};
use serde::Deserialize;

use crate::error::Result;
use crate::limiter::{ConsumeStrategy, LimiterConfig, TokenBucketLimiter};

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    // General
    pub log_level: String,

    // Bucket shape, applied to every client
    pub capacity: i64,
    pub refill_rate: i64,
    pub consume_strategy: ConsumeStrategy,
}

impl Settings {
    /// Loads `.env`, then an optional `rate_limiter.toml`, then `RATE_LIMITER_*` variables.
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        let settings = Self::defaults()?
            .add_source(File::with_name("rate_limiter").required(false))
            .add_source(Environment::with_prefix("RATE_LIMITER"))
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    pub fn from_toml_str(source: &str) -> Result<Self> {
        let settings = Self::defaults()?
            .add_source(File::from_str(source, FileFormat::Toml))
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    fn defaults() -> Result<ConfigBuilder<DefaultState>> {
        Ok(ConfigLoader::builder()
            .set_default("log_level", "info")?
            .set_default("capacity", 10)?
            .set_default("refill_rate", 10)?
            .set_default("consume_strategy", "single_shot")?)
    }

    pub fn limiter_config(&self) -> LimiterConfig {
        LimiterConfig::new(self.capacity, self.refill_rate).with_strategy(self.consume_strategy)
    }

    pub fn build_limiter(&self) -> Result<TokenBucketLimiter> {
        TokenBucketLimiter::from_config(self.limiter_config())
    }
}
