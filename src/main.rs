use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::error;

use stack_backup::cli::{handle_config, handle_list, handle_run, Commands, GlobalOptions};
use stack_backup::logging;

#[derive(Parser)]
#[command(
    name = "stack-backup",
    version,
    about = "Back up Docker Compose stacks and their bind-mounted data",
    long_about = "stack-backup stops each Docker Compose project found under the \
                  compose directory, archives its definition and appdata into a \
                  dated zip, optionally ships the archive with rsync, and restarts \
                  the stack. A failing project never stops the others."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    global: GlobalOptions,
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<ExitCode> {
    // A .env file next to the tool feeds the DOCKER_BACKUP_* layer
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Run);

    let settings = cli
        .global
        .resolve_settings()
        .context("Failed to load configuration")?;

    // Only a real run writes the log file
    let log_file = match command {
        Commands::Run => settings.log_file(),
        _ => None,
    };
    logging::init(settings.verbose, log_file, &settings.log_rotation())?;

    match command {
        Commands::Run => {
            let summary = handle_run(&settings)?;
            Ok(ExitCode::from(summary.exit_code()))
        }
        Commands::List => {
            handle_list(&settings)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Config => {
            handle_config(&settings, &cli.global.config)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}
