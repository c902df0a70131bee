use anyhow::{bail, Context};
use clap::Parser;
use flightdesk_cli::{batch_options, drive_batch, AcceptAll, TerminalReviewer};
use flightdesk_dispatch::{DispatchError, DispatchMode, QueryDispatchEngine};
use flightdesk_roster::RosterSettings;
use flightdesk_store::{build_chain, Config};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "flightdesk")]
#[command(about = "Fill a pasted flight roster with times from ordered flight data sources", long_about = None)]
struct Args {
    /// Roster text file starting with a JCSY header line
    roster: PathBuf,

    /// sequential (review every result) or parallel (accept automatically)
    #[arg(long, value_parser = parse_mode)]
    mode: Option<DispatchMode>,

    /// Worker count for parallel batches, 1 to 5
    #[arg(long)]
    concurrency: Option<usize>,

    /// Directory holding default.toml and the source recordings
    #[arg(long, default_value = "config")]
    config_dir: PathBuf,
}

fn parse_mode(s: &str) -> Result<DispatchMode, DispatchError> {
    s.parse()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "flightdesk_cli=info,flightdesk_dispatch=info,flightdesk_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    let config = Config::load_from(&args.config_dir)
        .with_context(|| format!("loading configuration from {}", args.config_dir.display()))?;
    let text = tokio::fs::read_to_string(&args.roster)
        .await
        .with_context(|| format!("reading roster {}", args.roster.display()))?;

    let settings = RosterSettings {
        home_airport: config.desk.home_airport.clone(),
        list_type: config.desk.list_type,
    };
    let roster = flightdesk_roster::parse(&text, &settings)?;
    if roster.is_empty() {
        bail!("no flight lines found in {}", args.roster.display());
    }
    tracing::info!(
        "Roster {} for {}: {} flights, {} lines skipped",
        roster.header.flight_number,
        roster.header.date,
        roster.entries.len(),
        roster.skipped.len()
    );

    let chain = build_chain(&config, &args.config_dir)?;
    let options = batch_options(&config.dispatch, args.mode, args.concurrency);
    let engine = QueryDispatchEngine::new(chain);
    let handle = engine.submit_batch(roster.queries(), options)?;

    let cancel = handle.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling batch");
            cancel.cancel();
        }
    });

    let report = match options.mode {
        DispatchMode::Sequential => drive_batch(handle, &roster, &mut TerminalReviewer::new()).await,
        DispatchMode::Parallel => drive_batch(handle, &roster, &mut AcceptAll).await,
    };

    println!("{}", report.processed.render());
    println!();
    println!("{}", report.summary_line());
    Ok(())
}
