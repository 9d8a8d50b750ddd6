use clap::Parser;
use color_eyre::Result;
use std::path::PathBuf;

use shelfctl::library::CachedLibraryClient;
use shelfctl::{cli, config, logging};

#[derive(Parser, Debug)]
#[command(name = "shelfctl")]
#[command(about = "A command-line client for a library management service")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/shelfctl/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Override the API base URL
  #[arg(long)]
  base_url: Option<String>,

  /// Write logs to this file instead of stderr
  #[arg(long)]
  log_file: Option<PathBuf>,

  #[command(subcommand)]
  command: cli::Command,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _guard = logging::init(args.log_file.as_deref())?;

  // Load configuration
  let config = config::Config::load(args.config.as_deref())?;

  // Override the base URL if specified on the command line
  let config = if let Some(base_url) = args.base_url {
    config::Config { base_url, ..config }
  } else {
    config
  };

  let client = CachedLibraryClient::new(&config)?;
  cli::run(args.command, &client, config.page_size).await
}
