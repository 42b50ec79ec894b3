//! Sets up the application's `tracing` subscriber.
//!
//! Redirects every `tracing::{trace,debug,info,warn,error}` call to standard
//! output at the level named by [`Configuration::log_level`]. Called once,
//! from [`crate::bootstrap`], before any DHT server or fetcher task starts.

use std::sync::Once;

use dht_crawler_configuration::Configuration;
use tracing::debug;
use tracing_subscriber::filter::LevelFilter;

static INIT: Once = Once::new();

/// Installs the global `tracing` subscriber per `config.log_level`.
///
/// A level of `"off"` (case-insensitive) installs no subscriber at all.
/// Installing twice is a no-op: only the first caller's level takes effect,
/// matching the once-per-process nature of `tracing`'s global dispatcher.
///
/// An unrecognized `log_level` is a fatal startup error, reported to the
/// caller rather than panicking, so the binary's `main` can print it and
/// exit with a non-zero status instead of unwinding.
///
/// # Errors
///
/// Returns an error if `config.log_level` is set to a string that is not
/// one of `off`, `error`, `warn`, `info`, `debug`, `trace`
/// (case-insensitive).
pub fn setup(config: &Configuration) -> anyhow::Result<()> {
    let filter = level_filter(config.log_level.as_deref().unwrap_or("info"))?;

    if filter == LevelFilter::OFF {
        return Ok(());
    }

    INIT.call_once(|| {
        tracing_subscriber::fmt().with_max_level(filter).init();
        debug!("tracing initialized.");
    });

    Ok(())
}

fn level_filter(level: &str) -> anyhow::Result<LevelFilter> {
    level.parse().map_err(|_| {
        anyhow::anyhow!(
            "
Error! Unrecognized `log_level` `{level}`!

But, the possible values are:
                    - `off`
                    - `error` (strongest)
    (default)  ---> - `info`
                    - `debug`
                    - `trace` (weakest)
"
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_documented_level() {
        for level in ["off", "error", "warn", "info", "debug", "trace"] {
            level_filter(level).unwrap();
        }
    }

    #[test]
    fn rejects_an_unknown_level() {
        assert!(level_filter("verbose").is_err());
    }
}
