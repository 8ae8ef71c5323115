mod archiver;
mod config;
mod cycle;
mod error;
mod mirror;
mod orchestrator;
mod retention;

use archiver::ZipArchiver;
use clap::Parser;
use common::Command;
use orchestrator::{Orchestrator, Trigger};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file (.yaml, .yml, .toml, or key=value lines)
    #[arg(short, long, default_value = common::DEFAULT_CONFIG_PATH)]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    setup_logging()?;
    log::info!("Backups daemon starting...");
    log::info!("Loading config...");

    let config = match config::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            log::error!("{:#}", e);
            std::process::exit(1);
        }
    };
    log::info!("Config loaded: {}", config);

    let orchestrator = Orchestrator::start(config, Arc::new(ZipArchiver));
    let mut reports = orchestrator.subscribe();
    tokio::spawn(async move {
        loop {
            let report = match reports.recv().await {
                Ok(report) => report,
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            };
            if report.trigger != Trigger::Manual {
                continue;
            }
            match report.result.archive {
                Some(archive) => println!("Manual backup done: {}", archive.file_name()),
                None => println!("Manual backup failed, see log"),
            }
        }
    });
    log::info!("Started! You can type 'backup' to start manual backup or 'stop' to quit.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => match Command::parse(&line) {
                    Some(Command::Backup) => {
                        orchestrator.trigger_manual();
                    }
                    Some(Command::Stop) => break,
                    None => {}
                },
                Ok(None) => {
                    log::info!("Console closed, running until interrupted");
                    stdin_open = false;
                }
                Err(e) => {
                    log::error!("Failed to read console input: {}", e);
                    stdin_open = false;
                }
            },
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    log::error!("Failed to listen for interrupt: {}", e);
                }
                break;
            }
        }
    }

    orchestrator.stop(common::STOP_TIMEOUT).await;
    // Exit without waiting for a cycle that outlived the stop timeout.
    std::process::exit(0);
}

fn setup_logging() -> anyhow::Result<()> {
    let level = std::env::var(common::LOG_LEVEL_ENV)
        .ok()
        .and_then(|l| l.parse().ok())
        .unwrap_or(log::LevelFilter::Info);

    let mut dispatch = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{}][{}][{}] {}",
                chrono::Local::now().format("%Y-%m-%d][%H:%M:%S"),
                record.target(),
                record.level(),
                message
            ))
        })
        .level(level)
        .chain(std::io::stdout());

    if let Ok(log_file) = std::env::var(common::LOG_FILE_ENV) {
        dispatch = dispatch.chain(fern::log_file(log_file)?);
    }

    dispatch.apply()?;
    Ok(())
}
