use std::path::PathBuf;

use anyhow::{bail, Result};
use config::Config;

#[derive(Clone, Debug, serde::Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct ChainDbConfig {
    pub database_path: PathBuf,
    pub security_parameter: u64,
    pub migration_batch: usize,
}

impl ChainDbConfig {
    pub fn try_load(config: &Config) -> Result<Self> {
        let full_config = Config::builder()
            .add_source(config::File::from_str(
                include_str!("../config.default.toml"),
                config::FileFormat::Toml,
            ))
            .add_source(config.clone())
            .build()?;
        let loaded: Self = full_config.try_deserialize()?;
        if loaded.security_parameter == 0 {
            bail!("security-parameter must be at least 1");
        }
        if loaded.migration_batch == 0 {
            bail!("migration-batch must be at least 1");
        }
        Ok(loaded)
    }

    /// Defaults rooted at `path`
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            database_path: path.into(),
            ..Self::default()
        }
    }
}

impl Default for ChainDbConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("db"),
            security_parameter: follower_common::params::SECURITY_PARAMETER_K,
            migration_batch: follower_common::params::MIGRATION_BATCH,
        }
    }
}
