pub mod output;
pub mod process;
pub mod query;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use process::{restart_server, stop_server};
use query::{
    process_delete_command, process_log_command, process_status_command, process_summary_command,
    DeleteCommand, LogCommand, SummaryCommand,
};
use tracing::level_filters::LevelFilter;

use crate::{
    daemon::start_daemon,
    utils::{
        dir::create_application_default_path,
        logging::{enable_logging, CLI_PREFIX},
    },
};

#[derive(Parser, Debug)]
#[command(name = "Focuswatch", version, long_about = None)]
#[command(about = "Tracks which application and window hold your attention", long_about = None)]
struct Args {
    #[command(subcommand)]
    commands: Commands,
    #[arg(long, help = "Enable logging")]
    log: bool,
}

#[derive(Subcommand, Debug)]
#[command(version, about, long_about = None)]
enum Commands {
    #[command(about = "Starts a daemon for the application")]
    Init {
        #[arg(
            long,
            help = "Application directory. By default tries to save into $XDG_STATE_HOME or $HOME/.local/state"
        )]
        dir: Option<PathBuf>,
    },
    #[command(about = "Show the current session and today's total")]
    Status {},
    #[command(about = "Display usage summaries by app or window")]
    Summary {
        #[command(flatten)]
        command: SummaryCommand,
    },
    #[command(about = "List and search recorded sessions")]
    Log {
        #[command(flatten)]
        command: LogCommand,
    },
    #[command(about = "Delete recorded sessions")]
    Delete {
        #[command(flatten)]
        command: DeleteCommand,
    },
    #[command(
        about = "Run a daemon directly in current console. Used for creating a daemon internally and for debugging"
    )]
    Serve {
        #[arg(
            long,
            help = "Application directory. By default tries to save into $XDG_STATE_HOME or $HOME/.local/state"
        )]
        dir: Option<PathBuf>,
    },
    #[command(about = "Stop currently running daemon.")]
    Stop {},
}

pub async fn run_cli() -> Result<()> {
    let args = Args::parse();

    let logging_level = if args.log {
        Some(LevelFilter::TRACE)
    } else {
        None
    };
    enable_logging(
        CLI_PREFIX,
        &create_application_default_path()?,
        logging_level,
        args.log,
    )?;

    match args.commands {
        Commands::Init { .. } => {
            restart_server()?;
            Ok(())
        }
        Commands::Stop {} => stop_server(),
        Commands::Serve { dir } => {
            let dir = dir.map_or_else(create_application_default_path, Ok)?;
            start_daemon(dir).await?;
            Ok(())
        }
        Commands::Status {} => process_status_command(),
        Commands::Summary { command } => process_summary_command(command),
        Commands::Log { command } => process_log_command(command),
        Commands::Delete { command } => process_delete_command(command),
    }
}
