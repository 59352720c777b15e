//! Logging and observability
//!
//! Structured logging via tracing-subscriber, supporting text and JSON
//! output. All log output goes to stderr so stdout stays reserved for the
//! single structured result document.

use anyhow::Result;
use std::{io, sync::Once};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

/// Initialize the logging system with an optional format specification.
///
/// Safe to call multiple times; subsequent calls are no-ops.
///
/// ## Arguments
///
/// * `format` - `None` or `"text"` for human-readable output, `"json"` for
///   structured JSON output.
///
/// ## Environment Variables
///
/// * `STEVEDORE_LOG_FORMAT` - log output format ("json" for JSON, anything
///   else for text); overridden by the `format` argument
/// * `STEVEDORE_LOG` - logging filter specification
/// * `RUST_LOG` - standard fallback filter (default: `info`)
pub fn init(format: Option<&str>) -> Result<()> {
    INIT.call_once(|| {
        let filter = create_env_filter();

        let env_format = std::env::var("STEVEDORE_LOG_FORMAT").ok();
        let effective_format = format.or(env_format.as_deref()).unwrap_or("text");

        match effective_format {
            "json" => {
                tracing_subscriber::registry()
                    .with(
                        fmt::layer()
                            .json()
                            .with_target(true)
                            .with_writer(io::stderr),
                    )
                    .with(filter)
                    .init();
            }
            _ => {
                tracing_subscriber::registry()
                    .with(fmt::layer().with_target(true).with_writer(io::stderr))
                    .with(filter)
                    .init();
            }
        }

        tracing::debug!("Logging initialized with format: {}", effective_format);
    });

    Ok(())
}

/// Create an EnvFilter from STEVEDORE_LOG, falling back to RUST_LOG, then "info"
fn create_env_filter() -> EnvFilter {
    if let Ok(spec) = std::env::var("STEVEDORE_LOG") {
        EnvFilter::try_new(&spec).unwrap_or_else(|_| EnvFilter::new("info"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

/// Check if logging has been initialized. Primarily useful in tests.
pub fn is_initialized() -> bool {
    INIT.is_completed()
}
