//! Structured logging setup.
//!
//! Compact timestamped output on stderr with per-target levels from the
//! `[logging]` config section. `RUST_LOG` takes precedence when set:
//!
//! ```bash
//! RUST_LOG=debug helpdesk serve
//! RUST_LOG=helpdesk_rag_core=trace helpdesk ask "What is the warranty?"
//! ```
//!
//! Stdout is left to user-facing CLI output.

use std::sync::Once;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::LoggingConfig;

static INIT: Once = Once::new();

/// Compact time format: HH:MM:SS.mmm
struct CompactTime;

impl FormatTime for CompactTime {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", chrono::Local::now().format("%H:%M:%S%.3f"))
    }
}

/// Build the filter directive string from config.
pub fn filter_directives(config: &LoggingConfig) -> String {
    let mut directives = config.default.clone();
    for (target, level) in &config.modules {
        directives.push_str(&format!(",{target}={level}"));
    }
    directives
}

/// Install the global subscriber. Only the first call has any effect.
pub fn init_with_config(config: &LoggingConfig) {
    INIT.call_once(|| {
        let filter = if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            EnvFilter::new(filter_directives(config))
        };

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_timer(CompactTime)
            .with_level(true)
            .with_filter(filter);

        // A subscriber may already be installed (e.g. by a test harness).
        let _ = tracing_subscriber::registry().with(fmt_layer).try_init();
    });
}

/// Initialise with the default `info` level.
pub fn init() {
    init_with_config(&LoggingConfig::default());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_directives() {
        let mut config = LoggingConfig::default();
        assert_eq!(filter_directives(&config), "info");

        config.default = "warn".into();
        config.modules.insert("helpdesk_rag".into(), "debug".into());
        config.modules.insert("helpdesk_rag_core".into(), "trace".into());
        assert_eq!(
            filter_directives(&config),
            "warn,helpdesk_rag=debug,helpdesk_rag_core=trace"
        );
    }
}
