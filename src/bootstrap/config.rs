//! Loads the crawler's configuration the same way the binary entry point
//! does, delegating to [`dht_crawler_configuration::Configuration`] and
//! layering the `--config`/`--log-level` CLI overrides on top.

use clap::Parser;
use dht_crawler_configuration::Configuration;

/// Command-line overrides for the layered configuration described in
/// `dht_crawler_configuration`. Every field is optional: omitting a flag
/// leaves the corresponding environment-variable/file/default resolution
/// untouched.
#[derive(Parser, Debug, Default)]
#[command(name = "dht-crawler", about = "A Mainline DHT crawler that harvests info-hashes and fetches torrent metadata.")]
pub struct Args {
    /// Path to a TOML configuration file, taking priority over
    /// `DHT_CRAWLER_PATH_CONFIG` and the built-in default path.
    #[arg(long, env = "DHT_CRAWLER_PATH_CONFIG")]
    pub config: Option<String>,

    /// Overrides the configured `tracing` log level for this run only.
    #[arg(long)]
    pub log_level: Option<String>,
}

/// Loads the configuration from the environment or the file named by
/// `args.config`, falling back to the documented defaults (and a logged
/// warning) when no source is present, then applies `args.log_level` on
/// top if given.
///
/// A malformed configuration source is a fatal startup error, reported to
/// the caller rather than panicking, so the binary's `main` can print it
/// and exit with a non-zero status instead of unwinding.
///
/// # Errors
///
/// Returns an error if a configuration source was found but failed to parse.
pub fn initialize_configuration(args: &Args) -> anyhow::Result<Configuration> {
    let mut config = match &args.config {
        Some(path) => Configuration::load_from_file(path)?,
        None => Configuration::load()?,
    };

    if let Some(log_level) = &args.log_level {
        config.log_level = Some(log_level.clone());
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_should_load_with_default_config() {
        drop(initialize_configuration(&Args::default()).unwrap());
    }

    #[test]
    fn log_level_override_takes_priority_over_the_loaded_value() {
        let args = Args {
            config: None,
            log_level: Some("trace".to_string()),
        };
        let config = initialize_configuration(&args).unwrap();
        assert_eq!(config.log_level.as_deref(), Some("trace"));
    }

    #[test]
    fn a_missing_config_file_named_by_the_flag_is_reported_as_an_error() {
        let args = Args {
            config: Some("/nonexistent/dht-crawler-test-config.toml".to_string()),
            log_level: None,
        };
        assert!(initialize_configuration(&args).is_err());
    }
}
