// Entrypoint for the CLI application.
// - Keeps `main` small: parse arguments, set up logging, resolve settings
//   and hand over to the UI flows.
// - Returns `anyhow::Result` so setup errors print with their context.

use catalog_importer::config::Settings;
use catalog_importer::ui::{self, ImportArgs, RunStatus};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser)]
#[command(author, version, about = "Create a catalog structure from a CSV of categories and PLUs")]
struct Cli {
    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, default_value = "warn", env = "CATALOG_IMPORTER_LOG_LEVEL", global = true)]
    log_level: String,

    /// Settings file (defaults to ~/.catalog_importer.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Base URL of the catalog API
    #[arg(long, global = true)]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new catalog from a CSV with Category 1, Category 2 and Plu columns
    Import(ImportCommand),
    /// Check that an account is linked to the developer account
    Check {
        /// Account ID
        #[arg(long)]
        account: Option<String>,
    },
    /// Write an example CSV
    Template {
        /// Output file (stdout when omitted)
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
}

#[derive(Args)]
struct ImportCommand {
    /// Account ID
    #[arg(long)]
    account: Option<String>,

    /// Name of the new catalog/menu
    #[arg(long)]
    name: Option<String>,

    /// CSV file to import, or `-` for stdin
    #[arg(long)]
    csv: String,

    /// Products fetched per listing request
    #[arg(long)]
    page_size: Option<u32>,

    /// Fail on rows with an empty Category 1, Category 2 or Plu instead of skipping them
    #[arg(long)]
    strict: bool,

    /// Attach each PLU only once per subcategory
    #[arg(long)]
    dedupe_plus: bool,

    /// Do not ask for confirmation
    #[arg(long, short)]
    yes: bool,
}

fn init_tracing(level: &str) {
    // RUST_LOG wins when set; otherwise only this crate logs, at `level`.
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("catalog_importer={}", level)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

/// Settings from file and environment, with the global flags on top.
fn load_settings(config: Option<&Path>, api_url: Option<String>) -> anyhow::Result<Settings> {
    let mut settings = Settings::load(config)?;
    if let Some(url) = api_url {
        settings.api_base_url = url;
    }
    Ok(settings)
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let status = match cli.command {
        Commands::Import(cmd) => {
            let mut settings = load_settings(cli.config.as_deref(), cli.api_url)?;
            if let Some(page_size) = cmd.page_size {
                settings.page_size = page_size;
            }
            settings.skip_incomplete_rows = !cmd.strict;
            settings.dedupe_plus = cmd.dedupe_plus;
            settings.validate()?;
            ui::run_import(
                &settings,
                ImportArgs {
                    account: cmd.account,
                    name: cmd.name,
                    csv: cmd.csv,
                    assume_yes: cmd.yes,
                },
            )?
        }
        Commands::Check { account } => {
            let settings = load_settings(cli.config.as_deref(), cli.api_url)?;
            ui::run_check(&settings, account)?
        }
        Commands::Template { output } => {
            ui::write_template(output)?;
            RunStatus::Completed
        }
    };

    Ok(ExitCode::from(status.exit_code()))
}
