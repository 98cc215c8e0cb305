//! Tracing subscriber bootstrap for hosts embedding the detector.
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: filter directives (default: `duplication_kernel=info,sqlx=warn`)
//! - `LOG_FORMAT`: "json" for structured logs, "pretty" for development (default: json)

use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "duplication_kernel=info,sqlx=warn";

/// Output format of the installed subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per event.
    Json,
    /// Human-readable lines.
    Pretty,
}

impl LogFormat {
    /// Read `LOG_FORMAT`; anything other than "pretty" means JSON.
    pub fn from_env() -> Self {
        match std::env::var("LOG_FORMAT").as_deref() {
            Ok("pretty") => Self::Pretty,
            _ => Self::Json,
        }
    }
}

/// Install the global subscriber.
///
/// Returns false if a subscriber was already installed, which makes
/// repeated calls from tests harmless.
pub fn init_tracing() -> bool {
    init_tracing_with(LogFormat::from_env())
}

/// Install the global subscriber with an explicit format.
pub fn init_tracing_with(format: LogFormat) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into());

    let installed = match format {
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_span_events(FmtSpan::CLOSE))
            .try_init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_current_span(true)
                    .with_span_events(FmtSpan::CLOSE)
                    .flatten_event(true),
            )
            .try_init(),
    };
    installed.is_ok()
}
