//! `enrich`: batch entrypoint.
//! Reads raw feed items (JSON array), enriches them with the configured capabilities and
//! prints a report. Ctrl-C stops dispatching new stages; the partial batch is still reported.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use hyperlocal_news::bootstrap::EnricherRuntime;
use hyperlocal_news::ingest::types::{FeedSource, JsonFileFeed};
use hyperlocal_news::metrics::Metrics;
use hyperlocal_news::{CancelSignal, ReportAggregator, ReportFormat};

#[derive(Parser, Debug)]
#[command(name = "enrich", version, about = "Enrich hyperlocal news items and print a report")]
struct Args {
    /// JSON array of raw feed items
    input: PathBuf,

    /// Report format
    #[arg(short, long, value_enum, default_value_t = ReportFormat::Markdown)]
    format: ReportFormat,

    /// Location shown in the report header
    #[arg(long, value_name = "NAME")]
    location: Option<String>,

    /// Print Prometheus metrics to stderr after the report
    #[arg(long)]
    metrics: bool,
}

/// Compact logs by default; `ENRICHER_LOG_JSON=1` switches to JSON lines.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("hyperlocal_news=info,warn"));
    let json = std::env::var("ENRICHER_LOG_JSON")
        .ok()
        .is_some_and(|v| v == "1");

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json().with_writer(std::io::stderr)).init();
    } else {
        registry.with(fmt::layer().compact().with_writer(std::io::stderr)).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let args = Args::parse();
    let metrics = if args.metrics {
        Some(Metrics::init()?)
    } else {
        None
    };

    let runtime = EnricherRuntime::from_default()?;
    let items = JsonFileFeed::new(&args.input).fetch_items().await?;

    let cancel = CancelSignal::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received, no new stages will be dispatched");
                cancel.cancel();
            }
        });
    }

    let batch = runtime.run(items, &cancel).await;

    let mut aggregator = ReportAggregator::new(&batch);
    if let Some(loc) = args.location {
        aggregator = aggregator.with_location(loc);
    }
    let doc = aggregator.project(args.format)?;
    println!("{}", doc.content);

    if let Some(m) = metrics {
        eprintln!("{}", m.render());
    }
    Ok(())
}
