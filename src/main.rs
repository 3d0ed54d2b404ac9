use std::path::PathBuf;

use clap::{Parser, Subcommand};
use payroll_combine::events::RunLog;
use payroll_combine::run::{self, MergeRequest};
use payroll_combine::{ReportError, Result};
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = Cli::parse();
    if let Err(error) = execute(cli) {
        eprintln!("error: {error}");
        std::process::exit(1);
    }
}

fn execute(cli: Cli) -> Result<()> {
    init_logging()?;
    match cli.command {
        Command::Merge(args) => execute_merge(args),
    }
}

fn init_logging() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|error| ReportError::Logging(error.to_string()))
}

fn execute_merge(args: MergeArgs) -> Result<()> {
    if !args.workbook.exists() {
        return Err(ReportError::MissingInput(args.workbook));
    }
    if !args.lookup.exists() {
        return Err(ReportError::MissingInput(args.lookup));
    }

    let request = MergeRequest {
        workbook: args.workbook,
        lookup: args.lookup,
        output_dir: args.output_dir,
    };

    let mut log = RunLog::new();
    let report = run::merge_workbook(&request, &mut log)?;

    if let Some(print_date) = args.print_date {
        // The per-tab export needs a native spreadsheet application
        // driven through the `export::PageRenderer` gateway; none is
        // wired into this build.
        let unavailable = ReportError::GatewayUnavailable(
            "no spreadsheet rendering engine is wired into this build".to_string(),
        );
        log.error(format!(
            "{unavailable}; skipping PDF export dated {print_date}"
        ));
    }

    println!(
        "Combined workbook written to {} ({} technician sheets)",
        report.output_path.display(),
        report.sheets.len()
    );
    if log.warning_count() > 0 {
        println!(
            "Completed with {} warning(s); review the log output above.",
            log.warning_count()
        );
    }
    Ok(())
}

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Merge a payroll workbook into per-technician report sheets."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Merge the payroll workbook and customer lookup into a combined
    /// report workbook.
    Merge(MergeArgs),
}

#[derive(clap::Args)]
struct MergeArgs {
    /// Source payroll workbook (.xlsx).
    #[arg(long)]
    workbook: PathBuf,

    /// Customer lookup table: .xlsx export or .json fast-reload cache.
    #[arg(long)]
    lookup: PathBuf,

    /// Directory receiving the combined workbook and PDF exports.
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,

    /// Print date stamped into exported PDF names.
    #[arg(long)]
    print_date: Option<String>,
}
