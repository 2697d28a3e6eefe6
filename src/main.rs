#![allow(missing_docs)]

//! leadbox CLI: inspect and operate a vendor inbox database.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;

use leadbox::config::{config_dir, Config};
use leadbox::identity::Caller;
use leadbox::inbox::grouping::{EventWindow, GroupBy, ListQuery, Scope};
use leadbox::inbox::lead::parse_event_date;
use leadbox::inbox::{threads, Inbox, LeadStatus};

#[derive(Debug, Parser)]
#[command(name = "leadbox", version, about = "Vendor inbox and lead tracking")]
struct Cli {
    /// Path to config.toml (default: ~/.leadbox/config.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Database file, overriding the config.
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Write JSON logs to this directory, overriding `[logging] dir`.
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create the database and apply the schema.
    Init,
    /// Print thread and message counts.
    Status,
    /// List a vendor's inbox.
    Threads {
        /// Vendor id.
        #[arg(long)]
        vendor: String,
        /// `active` or `archived`.
        #[arg(long, default_value = "active")]
        scope: String,
        /// `order` or `counterpart`.
        #[arg(long, default_value = "order")]
        group_by: String,
        /// Free-text search.
        #[arg(long)]
        search: Option<String>,
        /// Lead status filter.
        #[arg(long)]
        status: Option<String>,
        /// Event type filter.
        #[arg(long)]
        event_type: Option<String>,
        /// `upcoming-30d`, `past` or `all`.
        #[arg(long, default_value = "all")]
        window: String,
        /// Page size.
        #[arg(long)]
        limit: Option<usize>,
        /// Items to skip.
        #[arg(long, default_value_t = 0)]
        offset: usize,
    },
    /// Print the messages of a thread.
    Messages {
        /// Vendor id.
        #[arg(long)]
        vendor: String,
        /// Thread id.
        #[arg(long)]
        thread: String,
    },
    /// List leads by event date.
    Planning {
        /// Vendor id.
        #[arg(long)]
        vendor: String,
        /// First date (`YYYY-MM-DD`), default today.
        #[arg(long)]
        from: Option<String>,
        /// Last date (`YYYY-MM-DD`), default from + planning window.
        #[arg(long)]
        to: Option<String>,
    },
    /// Print the vendor's unread badge.
    Unread {
        /// Vendor id.
        #[arg(long)]
        vendor: String,
    },
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let out = serde_json::to_string_pretty(value).context("failed to encode output")?;
    println!("{out}");
    Ok(())
}

/// The CLI runs with the operator acting for the given vendor.
fn operator(vendor: &str) -> Caller {
    Caller::vendor("cli", vendor)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = match cli.config {
        Some(path) => path,
        None => config_dir()?.join("config.toml"),
    };
    let config = Config::load_or_default(&config_path)?;

    let _log_guard = match cli.log_dir.as_ref().or(config.logging.dir.as_ref()) {
        Some(dir) => Some(leadbox::logging::init_file(dir, &config.logging)?),
        None => {
            leadbox::logging::init_console()?;
            None
        }
    };
    info!(command = ?cli.command, config = %config_path.display(), "running command");
    let db_path = cli.db.unwrap_or_else(|| config.database.path.clone());

    let pool = leadbox::db::open(&db_path, config.database.max_connections).await?;
    let inbox = Inbox::new(pool.clone()).with_config(&config);

    match cli.command {
        Command::Init => {
            info!(path = %db_path.display(), "database initialised");
            println!("initialised {}", db_path.display());
        }
        Command::Status => {
            let stats = threads::stats(&pool).await?;
            print_json(&stats)?;
        }
        Command::Threads {
            vendor,
            scope,
            group_by,
            search,
            status,
            event_type,
            window,
            limit,
            offset,
        } => {
            let query = ListQuery {
                scope: Scope::parse(&scope)?,
                search,
                status: status.as_deref().map(LeadStatus::parse).transpose()?,
                event_type,
                event_window: EventWindow::parse(&window)?,
                group_by: GroupBy::parse(&group_by)?,
                limit,
                offset,
            };
            let items = inbox.vendor_threads(&operator(&vendor), &query).await?;
            print_json(&items)?;
        }
        Command::Messages { vendor, thread } => {
            let messages = inbox.vendor_messages(&operator(&vendor), &thread).await?;
            print_json(&messages)?;
        }
        Command::Planning { vendor, from, to } => {
            let from = from
                .as_deref()
                .map(|raw| parse_event_date("from", raw))
                .transpose()?;
            let to = to
                .as_deref()
                .map(|raw| parse_event_date("to", raw))
                .transpose()?;
            let entries = inbox.vendor_planning(&operator(&vendor), from, to).await?;
            print_json(&entries)?;
        }
        Command::Unread { vendor } => {
            let count = inbox.vendor_unread_badge(&operator(&vendor)).await?;
            print_json(&serde_json::json!({ "vendor": vendor, "unread": count }))?;
        }
    }

    pool.close().await;
    Ok(())
}
