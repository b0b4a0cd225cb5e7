use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Install the global subscriber. `RUST_LOG` wins over the configured filter.
pub fn init_logging(filter: &str, json: bool) -> anyhow::Result<()> {
    let filter = match std::env::var("RUST_LOG") {
        Ok(directives) => EnvFilter::try_new(directives)?,
        Err(_) => EnvFilter::try_new(filter)?,
    };
    let subscriber = tracing_subscriber::registry().with(filter);

    if json {
        // JSON format for log shipping
        let json_layer = fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .with_target(true);
        subscriber.with(json_layer).try_init()?;
    } else {
        let pretty_layer = fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_line_number(false)
            .with_file(false);
        subscriber.with(pretty_layer).try_init()?;
    }

    Ok(())
}
