//! Binary entry point for `twim-bot`.
//!
//! Parses the command line, wires `tracing` to stdout and to an OTLP/HTTP
//! span exporter, loads the Matrix and storage settings, and hands over to
//! the sync loop in [`twim_bot::start`].

use clap::Parser;
use opentelemetry::trace::TracerProvider;
use opentelemetry_otlp::{Protocol, WithExportConfig};
use tracing_subscriber::{fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt};
use twim_bot::base::{config::Config, types::Void};

/// Twim-bot – collects "This Week In Matrix" updates from Matrix rooms.
///
/// The bot logs in to `matrix_homeserver` with `matrix_access_token`, joins
/// the configured main and echo rooms, and records messages starting with
/// `TWIM`. Settings come from a TOML file or `TWIM_BOT_*` environment
/// variables (e.g. `TWIM_BOT_MATRIX_ACCESS_TOKEN`).
#[derive(Parser, Debug)]
#[command(version, author, about, long_about = None)]
struct Args {
    /// Path to the TOML settings (homeserver, token, rooms, database).
    ///
    /// Defaults to `.hidden/config.toml` when that file exists; otherwise only
    /// the environment is read.
    #[arg(short, long)]
    config: Option<std::path::PathBuf>,
    /// Increase log verbosity (-v, -vv, etc.).
    ///
    /// Use multiple times to increase verbosity:
    /// - No flag: INFO level
    /// - -v: DEBUG level
    /// - -vv or more: TRACE level
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// Set up tracing, load the settings, and run the bot until Ctrl-C.
#[tokio::main]
async fn main() -> Void {
    let args = Args::parse();

    // Construct the level filter.

    let level = match args.verbose {
        0 => tracing::Level::INFO,
        1 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    let level_filter = tracing_subscriber::filter::LevelFilter::from_level(level);

    // Prepare the log layer.

    let stdout = tracing_subscriber::fmt::layer()
        .without_time()
        .with_ansi(true)
        .with_level(true)
        .with_file(false)
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE);

    // Prepare the otlp layer; spans of every handled Matrix event are exported.

    let exporter = opentelemetry_otlp::SpanExporter::builder().with_http().with_protocol(Protocol::HttpBinary).build()?;
    let tracer = opentelemetry_sdk::trace::SdkTracerProvider::builder().with_simple_exporter(exporter).build().tracer("twim-bot");
    let otel = tracing_opentelemetry::layer().with_tracer(tracer);

    tracing_subscriber::registry().with(otel).with(level_filter).with(stdout).init();

    let config = Config::load(args.config.as_deref())?;

    twim_bot::start(config).await
}
