//! Tracing subscriber setup shared by the server and the CLI

use crate::config::LoggingConfig;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Crates whose level follows `logging.level` when it is a bare level
const OWN_TARGETS: &[&str] = &[
    "pgrag",
    "pgrag_api",
    "pgrag_rag",
    "pgrag_vector",
    "pgrag_core",
    "tower_http",
];

/// Install the global tracing subscriber, writing to stderr.
///
/// `RUST_LOG` wins over the configured level when set.
pub fn init_tracing(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(&config.level)));

    let registry = tracing_subscriber::registry().with(filter);

    if config.json_format {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_file(config.include_location)
                    .with_line_number(config.include_location),
            )
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_file(config.include_location)
                    .with_line_number(config.include_location),
            )
            .init();
    }
}

/// A bare level applies to our crates and tower_http; anything else is
/// taken as a full filter directive.
fn default_directive(level: &str) -> String {
    match level {
        "trace" | "debug" | "info" | "warn" | "error" => OWN_TARGETS
            .iter()
            .map(|target| format!("{target}={level}"))
            .collect::<Vec<_>>()
            .join(","),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directive() {
        let directive = default_directive("debug");
        assert!(directive.starts_with("pgrag=debug,"));
        assert!(directive.contains("pgrag_rag=debug"));
        assert!(directive.contains("tower_http=debug"));
        assert!(EnvFilter::try_new(&directive).is_ok());

        assert_eq!(default_directive("warn,sqlx=error"), "warn,sqlx=error");
    }
}
