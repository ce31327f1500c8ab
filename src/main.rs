// src/main.rs - runs newline-delimited JSON commands through a simulated FireStep device
use clap::Parser;
use std::path::PathBuf;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader};

use firestep_rs::{Command, Config, EventKind, load_config, simulated_queue};

#[derive(Parser, Debug)]
#[command(name = "firestep-host", about = "Send FireStep JSON commands to a simulated device")]
struct Cli {
    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,
    /// Serial path to open, overriding the configuration
    #[arg(long)]
    serial_path: Option<String>,
    /// Log every write and read
    #[arg(long)]
    verbose: bool,
    /// File of JSON commands, one per line; stdin when omitted
    commands: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .with_writer(std::io::stderr)
        .init();

    let mut config = match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            load_config(path)?
        }
        None => Config::default(),
    };
    if let Some(serial_path) = cli.serial_path {
        config.device.serial_path = serial_path;
    }

    let queue = simulated_queue(&config)?;
    queue.on(EventKind::Idle, |_| tracing::debug!("Command queue idle"));
    queue.open(config.device.serial_path.clone()).await?;

    let input: Box<dyn AsyncBufRead + Unpin + Send> = match &cli.commands {
        Some(path) => Box::new(BufReader::new(tokio::fs::File::open(path).await?)),
        None => Box::new(BufReader::new(tokio::io::stdin())),
    };
    let mut lines = input.lines();
    let mut completions = Vec::new();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match Command::parse(line) {
            Ok(command) => completions.push(queue.push_queue(command)),
            Err(e) => tracing::warn!("Skipping malformed command {}: {}", line, e),
        }
    }

    let mut stdout = tokio::io::stdout();
    for completion in completions {
        let response = completion.await?;
        stdout.write_all(format!("{response}\n").as_bytes()).await?;
    }
    stdout.flush().await?;

    let status = queue.status().await?;
    tracing::info!(
        "{}: {} writes, {} reads",
        status.driver,
        status.writes,
        status.reads
    );
    queue.close();
    Ok(())
}
