mod audit;
mod categories;
mod categorizer;
mod error;
mod logging;
mod mail_reader;
mod monitor;
mod settings;
mod web;


use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use itertools::Itertools;
use log::{debug, error, info};

use crate::audit::AuditLog;
use crate::categories::{CategoryDirectory, ConfiguredCategories};
use crate::categorizer::{classify, gate_names, PatternLibrary};
use crate::error::SetupError;
use crate::mail_reader::display::{display_categories, display_classifications};
use crate::mail_reader::encryption::CredentialStore;
use crate::mail_reader::imap::{fetch_unread_messages, ImapConnector};
use crate::mail_reader::message::Message;
use crate::monitor::{Monitor, MonitorStatus};
use crate::settings::{load_settings, Config, ImapConfig, DEFAULT_SETTINGS_PATH};

#[derive(Parser, Debug)]
#[command(name = "mail-categorizer", version, about = "Tags incoming mail with a helpdesk category")]
struct Cli {
    /// Settings file
    #[arg(long, global = true, default_value = DEFAULT_SETTINGS_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the web control panel
    Serve,
    /// Monitor the mailbox for one category until interrupted
    Monitor {
        #[arg(long)]
        category: String,
    },
    /// Show the verdicts for the current unread messages without tagging them
    Preview {
        #[arg(long)]
        category: String,
    },
    /// Classify a hand-written message
    Check {
        #[arg(long, default_value = "")]
        subject: String,
        #[arg(long, default_value = "")]
        sender: String,
        #[arg(long, default_value = "")]
        body: String,
        #[arg(long = "attachment")]
        attachments: Vec<String>,
        /// Category already on the message
        #[arg(long = "tag")]
        tags: Vec<String>,
        #[arg(long)]
        category: String,
    },
    /// List the categories an operator can monitor for
    Categories,
}

fn imap_config(config: &Config) -> Result<&ImapConfig, SetupError> {
    config.imap.as_ref().ok_or(SetupError::NotConfigured)
}

fn load_password(imap: &ImapConfig) -> Result<String, SetupError> {
    CredentialStore::from_config(imap)
        .password(&imap.username)
        .map_err(|e| SetupError::Credentials(e.to_string()))
}

fn ensure_known(directory: &dyn CategoryDirectory, category: &str) -> Result<()> {
    if !directory.contains(category) {
        bail!("Unknown category '{}'", category);
    }
    Ok(())
}

fn build_monitor(config: &Config, library: Arc<PatternLibrary>, audit: Arc<AuditLog>) -> Result<Monitor> {
    let imap = imap_config(config)?;
    // Resolved up front so the worker never has to prompt
    let password = load_password(imap)?;
    let connector = Arc::new(ImapConnector::new(imap.clone(), password));
    Ok(Monitor::new(
        connector,
        library,
        audit,
        Duration::from_secs(config.monitor.poll_interval_seconds),
    ))
}

async fn run_headless(monitor: Monitor, category: &str) -> Result<()> {
    monitor.start(category).await?;
    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal?;
                info!("Interrupted, stopping...");
                monitor.stop().await;
                return Ok(());
            }
            _ = ticker.tick() => {
                if let MonitorStatus::Faulted { error } = monitor.status().await {
                    bail!("Monitoring stopped: {}", error);
                }
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_settings(&cli.config)?;
    logging::setup_logging(&config.logging)?;

    let library = match PatternLibrary::new(&config.categorizer) {
        Ok(library) => Arc::new(library),
        Err(e) => {
            error!("Invalid categorizer settings: {}", e);
            return Err(e.into());
        }
    };
    debug!("Evaluation gates: {}", gate_names().join(", "));
    let directory = Arc::new(ConfiguredCategories::new(&config.categories));

    match cli.command {
        Command::Serve => {
            let audit = Arc::new(AuditLog::new(config.monitor.audit_capacity));
            let monitor = build_monitor(&config, library, Arc::clone(&audit))?;
            let app = web::AppState::new(Arc::new(monitor), audit, directory)?;
            web::start_web_server(&config.server, Arc::new(app)).await?;
        }
        Command::Monitor { category } => {
            ensure_known(directory.as_ref(), &category)?;
            let audit = Arc::new(AuditLog::new(config.monitor.audit_capacity));
            let monitor = build_monitor(&config, library, audit)?;
            run_headless(monitor, &category).await?;
        }
        Command::Preview { category } => {
            ensure_known(directory.as_ref(), &category)?;
            let imap = imap_config(&config)?;
            let password = load_password(imap)?;
            let messages = fetch_unread_messages(imap, &password).await?;
            let classifications: Vec<_> = messages
                .iter()
                .map(|message| classify(message, &category, &library))
                .collect();
            display_classifications(&classifications);
        }
        Command::Check {
            subject,
            sender,
            body,
            attachments,
            tags,
            category,
        } => {
            let message = Message {
                id: "cli".to_string(),
                subject,
                sender,
                body,
                attachments,
                categories: tags,
                unread: true,
            };
            display_classifications(&[classify(&message, &category, &library)]);
        }
        Command::Categories => display_categories(&directory.list_categories()),
    }

    Ok(())
}
