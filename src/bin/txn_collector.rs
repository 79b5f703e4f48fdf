use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use txn_collector::app::{Collector, plan_urls};
use txn_collector::clock::SystemClock;
use txn_collector::config::{CollectorConfig, ConfigLoader, Overrides, split_list};
use txn_collector::error::CollectorError;
use txn_collector::fetch::HttpApiClient;
use txn_collector::output::{ConsoleOutput, JsonOutput, OutputMode};

#[derive(Parser)]
#[command(name = "txn-collector")]
#[command(about = "Pull transaction queries from the ERP API and store them as JSON artifacts")]
#[command(version, author)]
struct Cli {
    /// JSON config file (defaults to txn-collector.json when present)
    #[arg(long, global = true)]
    config: Option<String>,

    /// Directory that receives the artifacts
    #[arg(long, global = true)]
    output_dir: Option<Utf8PathBuf>,

    /// Overrides API_BASE_URL
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Comma separated dimension values, overrides API_DIMENSIONS
    #[arg(long, global = true)]
    dimensions: Option<String>,

    /// Print machine-readable JSON instead of progress lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    #[command(about = "Fetch every query and write its artifact (default)")]
    Run,
    #[command(about = "Print the request URL of every unit without fetching")]
    Urls,
    #[command(about = "Print the resolved query catalog")]
    Catalog,
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(report) => {
            eprintln!("{report:?}");
            if let Some(err) = report.downcast_ref::<CollectorError>() {
                return ExitCode::from(err.exit_code());
            }
            ExitCode::from(1)
        }
    }
}

fn run() -> miette::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Console
    };

    let mut overrides = Overrides::from_env();
    if let Some(base_url) = cli.base_url {
        overrides.base_url = Some(base_url);
    }
    if let Some(dimensions) = cli.dimensions {
        overrides.dimensions = Some(split_list(&dimensions));
    }
    overrides.output_dir = cli.output_dir;
    let config = ConfigLoader::resolve(cli.config.as_deref(), overrides)?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run_collect(config, output_mode),
        Command::Urls => run_urls(&config, output_mode),
        Command::Catalog => {
            JsonOutput::print_catalog(&config.catalog).into_diagnostic()?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn run_collect(config: CollectorConfig, output_mode: OutputMode) -> miette::Result<ExitCode> {
    let client = HttpApiClient::new(&config.http)?;
    let collector = Collector::new(config, client, SystemClock);
    let report = match output_mode {
        OutputMode::Console => {
            let report = collector.run(&ConsoleOutput)?;
            ConsoleOutput::print_summary(&report);
            report
        }
        OutputMode::Json => {
            let report = collector.run(&JsonOutput)?;
            JsonOutput::print_report(&report).into_diagnostic()?;
            report
        }
    };

    if report.has_failures() {
        return Ok(ExitCode::from(1));
    }
    Ok(ExitCode::SUCCESS)
}

fn run_urls(config: &CollectorConfig, output_mode: OutputMode) -> miette::Result<ExitCode> {
    let urls = plan_urls(config)?;
    match output_mode {
        OutputMode::Console => {
            for (unit, url) in &urls {
                println!("{unit}\t{url}");
            }
        }
        OutputMode::Json => JsonOutput::print_urls(&urls).into_diagnostic()?,
    }
    Ok(ExitCode::SUCCESS)
}
