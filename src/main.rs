use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

use commands::{ConfigCommand, DeleteLastCommand, ListCommand, RefreshCommand, WatchCommand};
use glam_catalog::config::Config;

#[derive(Parser)]
#[command(name = "glam")]
#[command(version)]
#[command(about = "Offline-first Glam category catalog", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List cached categories
    List(ListCommand),

    /// Refresh the cache from the remote endpoint
    Refresh(RefreshCommand),

    /// Delete the category with the highest id
    DeleteLast(DeleteLastCommand),

    /// Search and refresh interactively
    Watch(WatchCommand),

    /// Manage configuration
    Config(ConfigCommand),
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "glam=warn,glam_catalog=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config)?;

    match cli.command {
        Some(Commands::List(cmd)) => cmd.run(&config).await?,
        Some(Commands::Refresh(cmd)) => cmd.run(&config).await?,
        Some(Commands::DeleteLast(cmd)) => cmd.run(&config).await?,
        Some(Commands::Watch(cmd)) => cmd.run(&config).await?,
        Some(Commands::Config(cmd)) => cmd.run(&config)?,
        None => {
            println!("Use --help to see available commands");
        }
    }

    Ok(())
}
