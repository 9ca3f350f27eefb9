//! boardsync CLI - Manage whiteboard boards from the command line
//!
//! Works offline against the local store; with a user and remote URL every
//! mutation goes through the cloud or the durable offline queue.

mod cli;
mod commands;
mod error;


use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};
use crate::commands::boards::{run_create, run_delete, run_rename};
use crate::commands::common::{open_storage, SessionOptions};
use crate::commands::completions::run_completions;
use crate::commands::list::run_list;
use crate::commands::scene::{run_save, run_show};
use crate::commands::sync::{run_flush, run_logout, run_queue, run_status};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("boardsync=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let mut options = SessionOptions::from_cli(&cli);

    match &cli.command {
        Commands::Completions { shell, output } => {
            return run_completions(*shell, output.as_deref());
        }
        Commands::Queue { .. } => {
            options.require_user("queue")?;
        }
        Commands::Flush => {
            options.require_user("flush")?;
        }
        Commands::Logout => {
            options.require_user("logout")?;
            // Nothing is pulled just to be wiped.
            options.offline = true;
        }
        _ => {}
    }

    let storage = open_storage(&options).await?;
    match cli.command {
        Commands::List { json } => run_list(&storage, json).await?,
        Commands::Create { name } => run_create(&storage, &name).await?,
        Commands::Rename { id, name } => run_rename(&storage, &id, &name).await?,
        Commands::Delete { id } => run_delete(&storage, &id).await?,
        Commands::Show { id, json } => run_show(&storage, &id, json).await?,
        Commands::Save { id, file } => run_save(&storage, &id, file.as_deref()).await?,
        Commands::Status { json } => run_status(&storage, json).await?,
        Commands::Queue { json } => run_queue(&storage, json).await?,
        Commands::Flush => run_flush(&storage).await?,
        Commands::Logout => run_logout(&storage).await?,
        Commands::Completions { .. } => {}
    }

    storage.flush_save().await?;
    Ok(())
}
