use rma_attach_core::Config;
use tracing_subscriber::{
    fmt::format::Format, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

const DEFAULT_FILTER: &str = "rma_attach=debug,tower_http=debug";

/// Install the global tracing subscriber.
///
/// `ATTACH_LOG_FORMAT=json` emits one JSON object per event; anything else
/// uses the compact console format. `RUST_LOG` overrides the default filter.
pub fn init_telemetry(config: &Config) -> Result<(), anyhow::Error> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into());

    if config.log_format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true),
            )
            .try_init()?;
    } else {
        let console_fmt = tracing_subscriber::fmt::layer()
            .event_format(Format::default().compact().with_target(false));
        tracing_subscriber::registry()
            .with(filter)
            .with(console_fmt)
            .try_init()?;
    }

    tracing::info!(
        environment = %config.environment,
        log_format = %config.log_format,
        "Telemetry initialized"
    );
    Ok(())
}
