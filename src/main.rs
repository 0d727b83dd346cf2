// ABOUTME: Command-line entry point for the bridge tools
// ABOUTME: Replays recorded event streams, sniffs files and prints the effective config

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mdbridge::console_host::ConsoleHost;
use mdbridge::replay::{self, FileSend};
use mdbridge::{logging, paths};
use mdbridge_core::send_file::{document_title, FileEncoding};
use mdbridge_core::{Config, EXIT_OK};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "mdbridge")]
#[command(about = "Multi-device messaging bridge tools", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a session against a recorded JSONL event stream
    Replay {
        /// File with one JSON event per line
        events: PathBuf,
        /// Account identifier; defaults to the configured username
        #[arg(long)]
        account: Option<String>,
        /// Send a file after the stream is drained: <CHAT> <PATH>
        #[arg(long, num_args = 2, value_names = ["CHAT", "PATH"])]
        send_file: Option<Vec<String>>,
    },
    /// Show the detected content type of a file and how it would be sent
    Sniff { path: PathBuf },
    /// Print the effective configuration as TOML
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let log_guard = logging::init(&paths::log_dir())?;

    let exit_code = run(cli).await?;

    // flush the file log before exiting with a send error code
    drop(log_guard);
    if exit_code != EXIT_OK {
        std::process::exit(exit_code);
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<i32> {
    let config = Config::load()?;

    match cli.command {
        Commands::Replay {
            events,
            account,
            send_file,
        } => {
            let account = account.unwrap_or_else(|| config.account.username.clone());
            if account.is_empty() {
                anyhow::bail!("No account given; pass --account or set account.username");
            }
            let send = match send_file.as_deref() {
                Some([chat, path]) => Some(FileSend {
                    chat: chat.clone(),
                    path: PathBuf::from(path),
                }),
                _ => None,
            };
            let events = replay::load_events(&events)?;
            let host = Arc::new(ConsoleHost::stdout());
            let report = replay::run(&account, config, events, host, send).await?;

            tracing::info!(
                events = report.events,
                exit_code = report.exit_code,
                "Replay finished"
            );
            return Ok(report.exit_code);
        }
        Commands::Sniff { path } => {
            let data = std::fs::read(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let content_type = mdbridge_core::sniff_content_type(&data);
            match FileEncoding::for_content_type(&content_type) {
                FileEncoding::Image => println!("{}\timage", content_type),
                FileEncoding::Document => {
                    println!("{}\tdocument \"{}\"", content_type, document_title(&path))
                }
            }
        }
        Commands::Config => {
            print!("{}", config.to_toml()?);
        }
    }

    Ok(EXIT_OK)
}
