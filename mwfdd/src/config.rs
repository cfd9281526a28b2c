use std::{fs, path::Path};

use anyhow::{Context, Result};
use mwfd_core::Name;
use mwfd_fw::{CsConfig, DispatchConfig, ForwarderConfig, UnsolicitedDataPolicy};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub daemon: DaemonSection,
    pub forwarding: ForwardingSection,
    pub cs: CsSection,
    pub dispatch: DispatchSection,
    pub strategy: StrategySection,
    pub logging: LoggingSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonSection {
    pub pid_file: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForwardingSection {
    /// Number of forwarding worker loops.
    pub workers: usize,
    pub pit_capacity: usize,
    pub unsolicited_data: UnsolicitedDataPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CsSection {
    pub capacity: usize,
    pub exact_capacity: Option<usize>,
    pub policy: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchSection {
    pub shard_prefix_len: usize,
    pub queue_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategySection {
    /// Strategy bound to the root prefix.
    pub default: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSection {
    pub level: String,
    pub file: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            daemon: DaemonSection {
                pid_file: "/var/run/mwfdd.pid".to_string(),
            },
            forwarding: ForwardingSection {
                workers: 2,
                pit_capacity: 65536,
                unsolicited_data: UnsolicitedDataPolicy::DropAll,
            },
            cs: CsSection {
                capacity: 65536,
                exact_capacity: None,
                policy: "lru".to_string(),
            },
            dispatch: DispatchSection {
                shard_prefix_len: 2,
                queue_capacity: 4096,
            },
            strategy: StrategySection {
                default: "/localhost/mwfd/strategy/best-route".to_string(),
            },
            logging: LoggingSection {
                level: "info".to_string(),
                file: None,
            },
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        if !path.as_ref().exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.as_ref().display()))?;
        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("parsing {}", path.as_ref().display()))?;
        Ok(config)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(&path, contents)
            .with_context(|| format!("writing {}", path.as_ref().display()))?;
        Ok(())
    }

    pub fn forwarder_config(&self) -> ForwarderConfig {
        ForwarderConfig {
            cs: CsConfig {
                capacity: self.cs.capacity,
                exact_capacity: self.cs.exact_capacity,
                policy: self.cs.policy.clone(),
            },
            pit_capacity: self.forwarding.pit_capacity,
            unsolicited_data: self.forwarding.unsolicited_data,
            default_strategy: Name::from_uri(&self.strategy.default),
        }
    }

    pub fn dispatch_config(&self) -> DispatchConfig {
        DispatchConfig {
            workers: self.forwarding.workers,
            queue_capacity: self.dispatch.queue_capacity,
            shard_prefix_len: self.dispatch.shard_prefix_len,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let config = Config::load("/nonexistent/mwfdd.conf").unwrap();
        assert_eq!(config.forwarding.workers, 2);
        assert_eq!(config.cs.policy, "lru");
    }

    #[test]
    fn round_trip_through_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mwfdd.conf");
        let mut config = Config::default();
        config.forwarding.workers = 7;
        config.cs.exact_capacity = Some(1024);
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.forwarding.workers, 7);
        assert_eq!(loaded.cs.exact_capacity, Some(1024));
        assert_eq!(loaded.strategy.default, config.strategy.default);
    }

    #[test]
    fn derived_configs_carry_settings() {
        let mut config = Config::default();
        config.dispatch.shard_prefix_len = 3;
        config.forwarding.pit_capacity = 99;
        assert_eq!(config.dispatch_config().shard_prefix_len, 3);
        assert_eq!(config.forwarder_config().pit_capacity, 99);
        assert_eq!(
            config.forwarder_config().default_strategy,
            Name::from_uri("/localhost/mwfd/strategy/best-route")
        );
    }
}
