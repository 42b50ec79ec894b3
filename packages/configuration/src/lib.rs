//! Typed configuration for the dht-crawler.
//!
//! The configuration is loaded from a [TOML](https://toml.io/en/) file,
//! `crawler.toml` by default, or from a single environment variable
//! carrying the whole file's content: `DHT_CRAWLER_CONFIG`. The
//! environment variable takes priority over the file, which in turn takes
//! priority over the path named by `DHT_CRAWLER_PATH_CONFIG`. If none of
//! those are present, an in-memory [`Configuration::default`] is used and
//! a warning is logged — the crawler still starts, it just runs with the
//! documented defaults.
//!
//! # Sections
//!
//! - [`Configuration::log_level`]: the `tracing` log level.
//! - [`Crawler`]: sizes and timeouts for the DHT server pool, the
//!   metadata fetcher pool, and the internal queues.
//! - [`BootstrapNode`]: the list of well-known DHT routers used to seed
//!   each DHT server's node FIFO at startup.
//!
//! ```
//! use dht_crawler_configuration::Configuration;
//!
//! let config = Configuration::default();
//! assert_eq!(config.crawler.dht_servers, 8);
//! assert_eq!(config.bootstrap_nodes.len(), 3);
//! ```
use std::sync::Arc;
use std::{env, fs};

use config::{Config, File, FileFormat};
use dht_crawler_located_error::{DynError, Located, LocatedError};
use serde::{Deserialize, Serialize};

/// The whole `crawler.toml` file content. Has priority over the config file.
pub const ENV_VAR_CONFIG: &str = "DHT_CRAWLER_CONFIG";

/// The `crawler.toml` file location.
pub const ENV_VAR_PATH_CONFIG: &str = "DHT_CRAWLER_PATH_CONFIG";

/// Default configuration file path, used when neither environment variable is set.
pub const DEFAULT_PATH_CONFIG: &str = "./share/default/config/crawler.toml";

/// Sizes and timeouts for the crawl-and-fetch pipeline.
///
/// See the purpose specification, §4.8, for the meaning of each field;
/// defaults mirror the reference Python implementation's module-level
/// constants.
#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Clone)]
pub struct Crawler {
    /// Number of independent DHT server endpoints to run, each with its
    /// own `UdpSocket` and `NodeId`.
    pub dht_servers: u16,

    /// Upper bound on each DHT server's node FIFO. The find-node spam loop
    /// drains this FIFO at `max_node_qsize` queries per second.
    pub max_node_qsize: usize,

    /// Number of concurrent metadata fetcher workers.
    pub metadata_workers: usize,

    /// Overall per-fetch timeout, in seconds.
    pub metadata_timeout_secs: u64,

    /// Bound on the info-event queue (DHT servers -> router) and the
    /// metadata priority queue (router -> fetchers).
    pub max_queue_size: usize,

    /// Bound on the verified-record queue (fetchers -> sink).
    pub sink_queue_size: usize,

    /// How often, in seconds, the orchestrator logs an aggregated counter line.
    pub print_interval_secs: u64,

    /// Base blacklist ban duration, in seconds. `ban_duration = min(base * failures, max)`.
    pub blacklist_base_secs: u64,

    /// Upper bound on a blacklist ban duration, in seconds.
    pub blacklist_max_secs: u64,

    /// The fetch-queue dedup set is cleared once it grows past this many
    /// `(info_hash, ip)` entries.
    pub seen_set_limit: usize,
}

impl Default for Crawler {
    fn default() -> Self {
        Self {
            dht_servers: 8,
            max_node_qsize: 500,
            metadata_workers: 400,
            metadata_timeout_secs: 6,
            max_queue_size: 10_000,
            sink_queue_size: 5_000,
            print_interval_secs: 5,
            blacklist_base_secs: 180,
            blacklist_max_secs: 1_800,
            seen_set_limit: 50_000,
        }
    }
}

/// A DHT bootstrap router, resolved to all its A-records at startup.
#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Clone)]
pub struct BootstrapNode {
    pub host: String,
    pub port: u16,
}

impl BootstrapNode {
    #[must_use]
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
        }
    }
}

fn default_bootstrap_nodes() -> Vec<BootstrapNode> {
    vec![
        BootstrapNode::new("router.bittorrent.com", 6881),
        BootstrapNode::new("dht.transmissionbt.com", 6881),
        BootstrapNode::new("router.utorrent.com", 6881),
    ]
}

/// Top-level crawler configuration.
#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Clone)]
pub struct Configuration {
    /// `tracing` log level: `off`, `error`, `warn`, `info`, `debug`, or `trace`.
    pub log_level: Option<String>,

    /// Crawler pool sizes and timeouts.
    #[serde(default)]
    pub crawler: Crawler,

    /// DHT bootstrap routers.
    #[serde(default = "default_bootstrap_nodes")]
    pub bootstrap_nodes: Vec<BootstrapNode>,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            log_level: Some(String::from("info")),
            crawler: Crawler::default(),
            bootstrap_nodes: default_bootstrap_nodes(),
        }
    }
}

/// Errors that can occur while loading the configuration.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("unable to load the configuration file: {source}")]
    UnableToLoadFromConfigFile {
        source: LocatedError<'static, dyn std::error::Error + Send + Sync>,
    },

    #[error("failed parsing the configuration: {source}")]
    ConfigError {
        source: LocatedError<'static, dyn std::error::Error + Send + Sync>,
    },
}

impl Configuration {
    /// Loads the configuration the same way the binary entry point does:
    ///
    /// 1. `DHT_CRAWLER_CONFIG` environment variable (whole TOML content), if set.
    /// 2. The file at `DHT_CRAWLER_PATH_CONFIG`, if that variable is set.
    /// 3. The file at [`DEFAULT_PATH_CONFIG`], if it exists.
    /// 4. [`Configuration::default`], with a warning logged by the caller.
    ///
    /// # Errors
    ///
    /// Returns `Err` if a configuration source was found but failed to parse.
    pub fn load() -> Result<Configuration, Error> {
        if let Ok(toml) = env::var(ENV_VAR_CONFIG) {
            return Self::from_toml_str(&toml);
        }

        let path = env::var(ENV_VAR_PATH_CONFIG).unwrap_or_else(|_| DEFAULT_PATH_CONFIG.to_string());

        if let Ok(toml) = fs::read_to_string(&path) {
            return Self::from_toml_str(&toml);
        }

        tracing::warn!("no configuration file found at `{path}` and {ENV_VAR_CONFIG} is unset; using built-in defaults");
        Ok(Configuration::default())
    }

    /// Loads the configuration from a TOML file at `path`, without falling
    /// back to defaults if it is missing or malformed.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the file cannot be read or fails to parse.
    pub fn load_from_file(path: &str) -> Result<Configuration, Error> {
        let toml = fs::read_to_string(path).map_err(|err| Error::UnableToLoadFromConfigFile {
            source: Located(err).into(),
        })?;
        Self::from_toml_str(&toml)
    }

    fn from_toml_str(toml: &str) -> Result<Configuration, Error> {
        let built = Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()
            .map_err(|err| Error::ConfigError {
                source: (Arc::new(err) as DynError).into(),
            })?;

        built.try_deserialize().map_err(|err| Error::ConfigError {
            source: (Arc::new(err) as DynError).into(),
        })
    }

    /// Encodes the configuration back to TOML, e.g. to write out a
    /// starter configuration file.
    ///
    /// # Panics
    ///
    /// Panics if the configuration cannot be encoded, which should never
    /// happen for a value built from this struct.
    #[must_use]
    pub fn to_toml(&self) -> String {
        toml::to_string(self).expect("configuration should always encode to TOML")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_pipeline_sizes() {
        let config = Configuration::default();
        assert_eq!(config.crawler.dht_servers, 8);
        assert_eq!(config.crawler.max_node_qsize, 500);
        assert_eq!(config.crawler.metadata_workers, 400);
        assert_eq!(config.crawler.max_queue_size, 10_000);
        assert_eq!(config.crawler.sink_queue_size, 5_000);
        assert_eq!(config.crawler.blacklist_base_secs, 180);
        assert_eq!(config.crawler.blacklist_max_secs, 1_800);
    }

    #[test]
    fn defaults_to_the_three_well_known_routers() {
        let config = Configuration::default();
        assert_eq!(config.bootstrap_nodes.len(), 3);
        assert!(config.bootstrap_nodes.iter().any(|n| n.host == "router.bittorrent.com"));
    }

    #[test]
    fn loads_a_minimal_toml_overriding_only_some_fields() {
        let toml = r#"
            log_level = "debug"

            [crawler]
            dht_servers = 2
            max_node_qsize = 50
            metadata_workers = 10
            metadata_timeout_secs = 6
            max_queue_size = 1000
            sink_queue_size = 500
            print_interval_secs = 5
            blacklist_base_secs = 180
            blacklist_max_secs = 1800
            seen_set_limit = 50000
        "#;
        let config = Configuration::from_toml_str(toml).unwrap();
        assert_eq!(config.log_level, Some("debug".to_string()));
        assert_eq!(config.crawler.dht_servers, 2);
        assert_eq!(config.bootstrap_nodes.len(), 3, "omitted section should fall back to its default");
    }

    #[test]
    fn round_trips_through_toml() {
        let config = Configuration::default();
        let toml = config.to_toml();
        let parsed = Configuration::from_toml_str(&toml).unwrap();
        assert_eq!(config, parsed);
    }

    #[test]
    fn rejects_malformed_toml() {
        assert!(Configuration::from_toml_str("not = [valid").is_err());
    }

    #[test]
    fn load_from_file_reads_a_real_file() {
        use uuid::Uuid;

        let path = env::temp_dir().join(format!("dht-crawler-test-{}.toml", Uuid::new_v4()));
        let path = path.to_string_lossy().to_string();
        fs::write(&path, Configuration::default().to_toml()).unwrap();

        let config = Configuration::load_from_file(&path).unwrap();
        assert_eq!(config, Configuration::default());

        fs::remove_file(&path).ok();
    }
}
