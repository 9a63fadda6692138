//! # Prober Configuration
//!
//! Loaded from a TOML file, then overridden from the environment.
//!
//! ## File Format
//!
//! ```toml
//! [network]
//! listen_addr = "0.0.0.0:36666"
//! bootstrap_nodes = ["10.0.0.1:30303"]
//! max_peers = 200
//! dial_interval_secs = 15
//! # node_key = "<128 hex chars>"
//!
//! [chain]
//! network_id = 1
//! protocol_version = 63
//! genesis_hash = "0xd4e5...8fa3"
//! start_block = "0xdc2d...a524"
//! start_total_difficulty = "2303762395359969"
//!
//! [aggregator]
//! report_interval_secs = 30
//! pull_interval_secs = 5
//! channel_capacity = 64
//!
//! [logging]
//! log_level = "info"
//! ```
//!
//! ## Environment Overrides
//!
//! `CP_LISTEN_ADDR`, `CP_NETWORK_ID`, `CP_LOG_LEVEL`. `CP_CONFIG` names the
//! file when no path is passed on the command line.

use cp_02_chain_aggregator::AggregatorConfig;
use rand::RngCore;
use serde::Deserialize;
use shared_types::{parse_hash, parse_total_difficulty, Hash, PeerIdentity, PEER_IDENTITY_LEN};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// Default config file name.
pub const DEFAULT_CONFIG_FILE: &str = "prober.toml";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {error}")]
    Io { path: String, error: String },

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// Complete prober configuration.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ProberConfig {
    pub network: NetworkConfig,
    pub chain: ChainConfig,
    pub aggregator: AggregatorSection,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct NetworkConfig {
    pub listen_addr: String,
    /// `host:port` entries, resolved at dial time.
    pub bootstrap_nodes: Vec<String>,
    pub max_peers: usize,
    pub dial_interval_secs: u64,
    /// Hex node identity; a random one is generated when absent.
    pub node_key: Option<String>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:36666".to_string(),
            bootstrap_nodes: Vec::new(),
            max_peers: 200,
            dial_interval_secs: 15,
            node_key: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChainConfig {
    pub network_id: u64,
    pub protocol_version: u32,
    pub genesis_hash: String,
    pub start_block: String,
    /// Decimal.
    pub start_total_difficulty: String,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            network_id: 1,
            protocol_version: 63,
            genesis_hash: "0xd4e56740f876aef8c010b86a40d5f56745a118d0906a34e69aec8c0db1cb8fa3"
                .to_string(),
            start_block: "0xdc2d938e4cd0a149681e9e04352953ef5ab399d59bcd5b0357f6c0797470a524"
                .to_string(),
            start_total_difficulty: "2303762395359969".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AggregatorSection {
    pub report_interval_secs: u64,
    pub pull_interval_secs: u64,
    pub channel_capacity: usize,
}

impl Default for AggregatorSection {
    fn default() -> Self {
        Self {
            report_interval_secs: 30,
            pull_interval_secs: 5,
            channel_capacity: 64,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    pub log_level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

impl ProberConfig {
    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io {
            path: path.as_ref().display().to_string(),
            error: e.to_string(),
        })?;
        Self::parse(&content)
    }

    /// Apply `CP_*` overrides from `lookup` (normally the process env).
    /// Returns the overrides that were rejected; the field keeps its value.
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Vec<ConfigError> {
        let mut rejected = Vec::new();
        if let Some(addr) = lookup("CP_LISTEN_ADDR") {
            self.network.listen_addr = addr;
        }
        if let Some(id) = lookup("CP_NETWORK_ID") {
            match id.parse() {
                Ok(id) => self.chain.network_id = id,
                Err(e) => rejected.push(ConfigError::InvalidValue {
                    field: "CP_NETWORK_ID",
                    reason: format!("{} ({:?})", e, id),
                }),
            }
        }
        if let Some(level) = lookup("CP_LOG_LEVEL") {
            self.logging.log_level = level;
        }
        rejected
    }

    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.network
            .listen_addr
            .parse()
            .map_err(|e: std::net::AddrParseError| ConfigError::InvalidValue {
                field: "network.listen_addr",
                reason: e.to_string(),
            })
    }

    pub fn genesis(&self) -> Result<Hash, ConfigError> {
        parse_hash(&self.chain.genesis_hash).map_err(|e| ConfigError::InvalidValue {
            field: "chain.genesis_hash",
            reason: e.to_string(),
        })
    }

    pub fn dial_interval(&self) -> Duration {
        Duration::from_secs(self.network.dial_interval_secs.max(1))
    }

    /// Node identity from `node_key`, or a fresh random one.
    pub fn node_identity(&self) -> Result<PeerIdentity, ConfigError> {
        match &self.network.node_key {
            Some(key) => key.parse().map_err(|e: shared_types::ParseError| {
                ConfigError::InvalidValue {
                    field: "network.node_key",
                    reason: e.to_string(),
                }
            }),
            None => {
                let mut bytes = [0u8; PEER_IDENTITY_LEN];
                rand::thread_rng().fill_bytes(&mut bytes);
                Ok(PeerIdentity::new(bytes))
            }
        }
    }

    /// Aggregator settings seeded from the `[chain]` section.
    pub fn aggregator_config(&self) -> Result<AggregatorConfig, ConfigError> {
        let start_block =
            parse_hash(&self.chain.start_block).map_err(|e| ConfigError::InvalidValue {
                field: "chain.start_block",
                reason: e.to_string(),
            })?;
        let start_total_difficulty = parse_total_difficulty(&self.chain.start_total_difficulty)
            .map_err(|e| ConfigError::InvalidValue {
                field: "chain.start_total_difficulty",
                reason: e.to_string(),
            })?;
        Ok(AggregatorConfig {
            network_id: self.chain.network_id,
            protocol_version: self.chain.protocol_version,
            genesis: self.genesis()?,
            start_block,
            start_total_difficulty,
            report_interval: Duration::from_secs(self.aggregator.report_interval_secs.max(1)),
            pull_interval: Duration::from_secs(self.aggregator.pull_interval_secs.max(1)),
            channel_capacity: self.aggregator.channel_capacity.max(1),
        })
    }
}

/// Loaded configuration plus what happened while loading it. Logging is
/// not installed yet at load time, so the notices are kept for
/// [`LoadedConfig::log_summary`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedConfig {
    pub config: ProberConfig,
    /// File the config was read from, `None` for defaults.
    pub source: Option<PathBuf>,
    pub rejected_overrides: Vec<ConfigError>,
}

impl LoadedConfig {
    /// Emit the load notices. Call after `init_tracing`.
    pub fn log_summary(&self) {
        match &self.source {
            Some(path) => info!("Loaded config from {}", path.display()),
            None => info!("No config file found, using defaults"),
        }
        for rejected in &self.rejected_overrides {
            warn!("Ignoring environment override: {}", rejected);
        }
    }
}

/// Load configuration the way the binary does: explicit path, else
/// `CP_CONFIG`, else `prober.toml` if present, else defaults; then env
/// overrides.
pub fn load_config(path: Option<&Path>) -> Result<LoadedConfig, ConfigError> {
    load_config_with(path, |key| std::env::var(key).ok())
}

/// [`load_config`] reading `CP_*` variables through `lookup`.
pub fn load_config_with(
    path: Option<&Path>,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<LoadedConfig, ConfigError> {
    let source = path
        .map(Path::to_path_buf)
        .or_else(|| lookup("CP_CONFIG").map(PathBuf::from))
        .or_else(|| {
            let default = Path::new(DEFAULT_CONFIG_FILE);
            default.exists().then(|| default.to_path_buf())
        });
    let mut config = match &source {
        Some(path) => ProberConfig::load(path)?,
        None => ProberConfig::default(),
    };
    let rejected_overrides = config.apply_overrides(lookup);
    Ok(LoadedConfig {
        config,
        source,
        rejected_overrides,
    })
}
