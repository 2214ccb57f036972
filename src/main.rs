mod db;
mod error;
mod fetch;
mod parser;
mod pipeline;
mod report;

use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand, ValueEnum};
use parser::extract::{CardLayout, CardSelectors};
use report::{Output, Report};

#[derive(Parser)]
#[command(name = "ccbb_events", about = "CCBB Rio de Janeiro events scraper")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
    /// SQLite database file (created on first run)
    #[arg(long, global = true, default_value = db::DB_PATH)]
    db: PathBuf,
    /// Events listing page to fetch
    #[arg(long, global = true, default_value = fetch::EVENTS_URL)]
    url: String,
    /// HTTP request timeout in seconds
    #[arg(long, global = true, default_value_t = fetch::DEFAULT_TIMEOUT_SECS)]
    timeout: u64,
    /// Output format for the reports
    #[arg(long, global = true, value_enum, default_value_t = Format::Text)]
    format: Format,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch, extract and store events, then print reports (default)
    Run,
    /// Print reports from the existing database without fetching
    Report,
    /// Show row counts
    Stats,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let conn = db::connect(&cli.db)?;
    db::ensure_schema(&conn)?;

    let mut report = None;
    let mut summary = None;
    let mut counts = None;
    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            let fetcher = fetch::HttpFetcher::new(Duration::from_secs(cli.timeout))?;
            let selectors = CardSelectors::compile(&CardLayout::default())?;
            summary =
                Some(pipeline::extract_and_store(&conn, &fetcher, &cli.url, &selectors).await?);
            report = Some(Report::collect(&conn)?);
        }
        Commands::Report => report = Some(Report::collect(&conn)?),
        Commands::Stats => counts = Some(db::counts(&conn)?),
    }

    let output = Output {
        report: report.as_ref(),
        summary: summary.as_ref(),
        counts: counts.as_ref(),
        elapsed: t0.elapsed(),
    };
    print!("{}", render(&output, cli.format)?);
    Ok(())
}

/// The complete stdout payload for one command.
fn render(output: &Output, format: Format) -> anyhow::Result<String> {
    Ok(match format {
        Format::Text => output.to_string(),
        Format::Json => output.render_json()? + "\n",
    })
}
