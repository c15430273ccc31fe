//! Logging setup with a reloadable filter and local-time timestamps.

use chrono::Local;
use tracing::info;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::Writer, time::FormatTime},
    layer::SubscriberExt,
    reload::{self, Handle},
    util::SubscriberInitExt,
};

use crate::error::{Error, Result};

/// Default log filter directive.
pub const DEFAULT_LOG_FILTER: &str = "notify_center=info,hub_client=info,notify_cli=info";

/// Formats timestamps in the local timezone.
#[derive(Debug, Clone, Copy)]
struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        let now = Local::now();
        write!(w, "{}", now.format("%Y-%m-%dT%H:%M:%S%.3f%:z"))
    }
}

pub type FilterHandle = Handle<EnvFilter, tracing_subscriber::Registry>;

/// Output format of the console layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Handle to the installed subscriber.
pub struct LoggingHandle {
    handle: FilterHandle,
}

impl LoggingHandle {
    /// Current filter directive.
    pub fn filter(&self) -> String {
        self.handle
            .with_current(|filter| filter.to_string())
            .unwrap_or_default()
    }

    /// Replace the filter directive at runtime.
    pub fn set_filter(&self, directive: &str) -> Result<()> {
        let filter = EnvFilter::try_new(directive)
            .map_err(|e| Error::config(format!("Invalid log filter '{}': {}", directive, e)))?;
        self.handle
            .reload(filter)
            .map_err(|e| Error::Other(format!("Failed to reload filter: {}", e)))?;
        info!(directive = %directive, "Log filter updated");
        Ok(())
    }
}

/// Resolve the initial filter: explicit directive, then `RUST_LOG`, then the default.
pub fn initial_filter(directive: Option<&str>) -> Result<EnvFilter> {
    match directive {
        Some(directive) => EnvFilter::try_new(directive)
            .map_err(|e| Error::config(format!("Invalid log filter '{}': {}", directive, e))),
        None => Ok(EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))),
    }
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init(directive: Option<&str>, format: LogFormat) -> Result<LoggingHandle> {
    let (filter_layer, handle) = reload::Layer::new(initial_filter(directive)?);

    let console = match format {
        LogFormat::Pretty => fmt::layer().with_timer(LocalTimer).boxed(),
        LogFormat::Json => fmt::layer().json().with_timer(LocalTimer).boxed(),
    };

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(console)
        .try_init()
        .map_err(|e| Error::Other(format!("Failed to set global default subscriber: {}", e)))?;

    Ok(LoggingHandle { handle })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter() {
        assert!(DEFAULT_LOG_FILTER.contains("notify_center=info"));
        assert!(DEFAULT_LOG_FILTER.contains("hub_client=info"));
    }

    #[test]
    fn test_initial_filter() {
        assert!(initial_filter(Some("notify_center=debug")).is_ok());
        assert!(matches!(
            initial_filter(Some("notify_center=[")),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_set_filter_reloads() {
        let (_layer, handle) = reload::Layer::<EnvFilter, tracing_subscriber::Registry>::new(
            EnvFilter::new(DEFAULT_LOG_FILTER),
        );
        let logging = LoggingHandle { handle };

        logging.set_filter("hub_client=debug").unwrap();
        assert!(logging.filter().contains("hub_client=debug"));
        assert!(!logging.filter().contains("notify_center"));

        assert!(matches!(
            logging.set_filter("hub_client=["),
            Err(Error::Configuration(_))
        ));
        assert!(logging.filter().contains("hub_client=debug"));
    }
}
