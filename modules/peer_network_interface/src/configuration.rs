use anyhow::{Result, bail};
use config::Config;

#[derive(Clone, Debug, serde::Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct InterfaceConfig {
    pub node_addresses: Vec<String>,
    pub magic_number: u32,
    /// Connections kept open at once; extra addresses are ignored
    pub max_peers: usize,
}

impl InterfaceConfig {
    pub fn try_load(config: &Config) -> Result<Self> {
        let full_config = Config::builder()
            .add_source(config::File::from_str(
                include_str!("../config.default.toml"),
                config::FileFormat::Toml,
            ))
            .add_source(config.clone())
            .build()?;
        let cfg: Self = full_config.try_deserialize()?;
        if cfg.max_peers == 0 {
            bail!("max-peers must be at least 1");
        }
        Ok(cfg)
    }

    /// The addresses to connect to
    pub fn peer_addresses(&self) -> &[String] {
        let count = self.max_peers.min(self.node_addresses.len());
        &self.node_addresses[..count]
    }
}
