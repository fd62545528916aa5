//! Tracing bootstrap for applications using the client
//!
//! The library only emits `tracing` events; nothing is printed until the
//! application installs a subscriber, for example with [`init_telemetry`].

use anyhow::Result;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

const DEFAULT_FILTER: &str = "arangokit_rs=info,arangokit_core=info";

/// Install a global subscriber writing to stdout
///
/// `RUST_LOG` overrides the default filter. With `json` every event is one
/// JSON object carrying its span context; otherwise output is human-readable.
pub fn init_telemetry(json: bool) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let layer = if json {
        fmt::layer()
            .json()
            .with_writer(std::io::stdout)
            .with_span_events(FmtSpan::CLOSE)
            .with_current_span(true)
            .with_target(true)
            .with_thread_ids(true)
            .boxed()
    } else {
        fmt::layer()
            .with_writer(std::io::stdout)
            .with_span_events(FmtSpan::CLOSE)
            .with_target(false)
            .boxed()
    };

    tracing_subscriber::registry().with(env_filter).with(layer).try_init()?;

    tracing::info!(json, "Telemetry initialized");
    Ok(())
}
