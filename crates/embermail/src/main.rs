//! `embermail` command line: send one message or poll a mailbox.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use embermail::imap::{DownloadSelection, FetchOptions, ImapSession, SearchOptions};
use embermail::smtp::{Attachment, Mailbox, Message, SmtpSession};
use embermail::{AppConfig, TcpTransport, init_logging};
use embermail_core::TracingSink;
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send a text message
    Send {
        /// JSON configuration file
        config: PathBuf,
        /// Recipient address
        to: String,
        /// Subject line
        subject: String,
        /// Message text
        text: String,
        /// Files to attach
        #[arg(short, long)]
        attach: Vec<PathBuf>,
    },
    /// List the most recent matching messages
    Poll {
        /// JSON configuration file
        config: PathBuf,
        /// IMAP search criteria
        #[arg(default_value = "UNSEEN")]
        criteria: String,
        /// Mailbox to search
        #[arg(short, long, default_value = "INBOX")]
        mailbox: String,
        /// How many messages to fetch
        #[arg(short, long, default_value_t = 5)]
        limit: usize,
        /// Save bodies and attachments under `storage_root`
        #[arg(short, long)]
        save: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    match Args::parse().command {
        Command::Send {
            config,
            to,
            subject,
            text,
            attach,
        } => send(&config, &to, subject, text, &attach).await,
        Command::Poll {
            config,
            criteria,
            mailbox,
            limit,
            save,
        } => poll(&config, &criteria, &mailbox, limit, save).await,
    }
}

async fn send(
    config: &Path,
    to: &str,
    subject: String,
    text: String,
    attach: &[PathBuf],
) -> Result<()> {
    let config = AppConfig::load(config).await?;
    let from = config
        .sender()
        .context("no sender: set \"from\" or the SMTP user")?;

    let mut message = Message::new(Mailbox::parse(from)?)
        .to(Mailbox::parse(to)?)
        .subject(subject)
        .text(text);
    for path in attach {
        let data = tokio::fs::read(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        let name = path
            .file_name()
            .map_or_else(|| "attachment".to_string(), |n| n.to_string_lossy().into_owned());
        message = message.attach(Attachment::blob(name, "application/octet-stream", data));
    }

    let mut session = SmtpSession::new(TcpTransport::new(), config.smtp()?.clone())
        .with_status_sink(TracingSink);
    if let Some(storage) = config.storage() {
        session = session.with_storage(storage);
    }
    let report = session.send(&message, false).await?;
    info!(
        bytes = report.bytes,
        recipients = report.recipients,
        "delivered"
    );
    println!("{}", report.response);
    Ok(())
}

async fn poll(config: &Path, criteria: &str, mailbox: &str, limit: usize, save: bool) -> Result<()> {
    let config = AppConfig::load(config).await?;
    let mut session =
        ImapSession::new(TcpTransport::new(), config.imap()?.clone()).with_status_sink(TracingSink);
    let mut options = FetchOptions::default();
    if save {
        let storage = config
            .storage()
            .context("--save needs \"storage_root\" in the configuration")?;
        session = session.with_storage(storage);
        options = options.download(DownloadSelection {
            header: true,
            text: true,
            html: true,
            attachment: true,
            inline: true,
            rfc822: false,
        });
    }

    session.open_session().await?;
    let info = session.select_mailbox(mailbox).await?;
    info!(mailbox, exists = info.exists, "selected");

    let ids = session.search(criteria, SearchOptions::recent(limit)).await?;
    for id in ids {
        let message = session.fetch(id, &options).await?;
        let preview = message
            .text()
            .and_then(|t| t.lines().find(|l| !l.trim().is_empty()))
            .unwrap_or_default();
        println!(
            "{:>8}  {}  {}  {}",
            message.uid, message.envelope.from, message.envelope.subject, preview
        );
        if let Some(dir) = &message.saved_dir {
            println!("          saved to {dir}");
        }
    }
    session.logout().await?;
    Ok(())
}
