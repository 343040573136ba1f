use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use stack_delivery::cache::{PersistenceStore, SqliteStore};
use stack_delivery::sync::SyncCursor;
use stack_delivery::{CachePolicy, Config, Query, Stack, SyncEventType, SyncParams};

#[derive(Parser, Debug)]
#[command(name = "stackq")]
#[command(about = "Query a content delivery stack from the terminal")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/stackq/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Publishing environment to read from
  #[arg(short, long)]
  environment: Option<String>,

  /// Cache policy for reads (ignore_cache, network_else_cache,
  /// cache_then_network, cache_else_network)
  #[arg(short, long)]
  policy: Option<CachePolicy>,

  /// Write logs to this file instead of stderr
  #[arg(long)]
  log_file: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Fetch a single entry
  Entry {
    content_type: String,
    uid: String,
    #[arg(long)]
    locale: Option<String>,
    /// Reference fields to resolve inline
    #[arg(long = "include")]
    include: Vec<String>,
  },
  /// Query entries of a content type
  Entries {
    content_type: String,
    /// Equality filter, `field=value`; may repeat
    #[arg(long = "where", value_parser = parse_filter)]
    filters: Vec<(String, String)>,
    #[arg(long)]
    limit: Option<u32>,
    #[arg(long)]
    skip: Option<u32>,
    #[arg(long)]
    locale: Option<String>,
  },
  /// Fetch a content type schema
  ContentType { uid: String },
  /// Fetch a single asset
  Asset { uid: String },
  /// Run a delta sync
  Sync {
    #[arg(long, conflicts_with = "pagination_token")]
    sync_token: Option<String>,
    #[arg(long)]
    pagination_token: Option<String>,
    /// Restrict to event types; may repeat
    #[arg(long = "type")]
    types: Vec<SyncEventType>,
    #[arg(long)]
    content_type: Option<String>,
    /// ISO 8601 date to start an initial sync from
    #[arg(long)]
    start_date: Option<String>,
    /// Return only the first page instead of draining the feed
    #[arg(long)]
    single_page: bool,
  },
  /// Manage the local cache
  Cache {
    #[command(subcommand)]
    action: CacheAction,
  },
}

#[derive(Subcommand, Debug)]
enum CacheAction {
  /// Remove cached records, optionally only those of one content type
  Clear {
    #[arg(long)]
    content_type: Option<String>,
  },
  /// Remove expired records
  Purge,
}

fn parse_filter(s: &str) -> Result<(String, String), String> {
  match s.split_once('=') {
    Some((field, value)) if !field.is_empty() => Ok((field.to_string(), value.to_string())),
    _ => Err(format!("expected field=value, got '{}'", s)),
  }
}

/// Logs go to stderr (stdout carries the JSON output) unless a file is given.
fn init_logging(log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
  let filter = EnvFilter::try_from_env("STACKQ_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));

  match log_file {
    Some(path) => {
      let dir = path.parent().unwrap_or_else(|| Path::new("."));
      let name = path
        .file_name()
        .ok_or_else(|| eyre!("Invalid log file path: {}", path.display()))?;
      let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
      tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .init();
      Ok(Some(guard))
    }
    None => {
      tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
      Ok(None)
    }
  }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _guard = init_logging(args.log_file.as_deref())?;

  // Load configuration
  let mut config = Config::load(args.config.as_deref())?;

  // Command-line overrides
  if let Some(environment) = args.environment {
    config.stack.environment = environment;
  }
  if let Some(policy) = args.policy {
    config.cache.policy = policy;
  }

  match args.command {
    Command::Cache { action } => {
      let store = match &config.cache.path {
        Some(path) => SqliteStore::open(path),
        None => SqliteStore::open_default(),
      }?;
      let removed = match action {
        CacheAction::Clear { content_type } => store.clear(content_type.as_deref())?,
        CacheAction::Purge => store.purge_expired()?,
      };
      info!(removed, "cache updated");
      println!("removed {} cached record(s)", removed);
    }
    Command::Entry {
      content_type,
      uid,
      locale,
      include,
    } => {
      let stack = Stack::from_config(&config)?;
      let mut entry = stack.content_type(&content_type).entry(&uid);
      if let Some(locale) = locale {
        entry = entry.locale(&locale);
      }
      for field in &include {
        entry = entry.include_reference(field);
      }
      print_json(&entry.fetch().await?.data)?;
    }
    Command::Entries {
      content_type,
      filters,
      limit,
      skip,
      locale,
    } => {
      let stack = Stack::from_config(&config)?;
      let mut query = Query::entries(&content_type);
      for (field, value) in filters {
        query = query.equal_to(&field, value);
      }
      if let Some(limit) = limit {
        query = query.limit(limit);
      }
      if let Some(skip) = skip {
        query = query.skip(skip);
      }
      if let Some(locale) = locale {
        query = query.locale(&locale);
      }
      print_json(&stack.find(query).await?.data)?;
    }
    Command::ContentType { uid } => {
      let stack = Stack::from_config(&config)?;
      print_json(&stack.content_type(&uid).fetch().await?.data)?;
    }
    Command::Asset { uid } => {
      let stack = Stack::from_config(&config)?;
      print_json(&stack.asset(&uid).fetch().await?.data)?;
    }
    Command::Sync {
      sync_token,
      pagination_token,
      types,
      content_type,
      start_date,
      single_page,
    } => {
      let stack = Stack::from_config(&config)?;

      let mut params = match (sync_token, pagination_token) {
        (Some(token), _) => SyncParams::from_sync_token(token),
        (None, Some(token)) => SyncParams::from_pagination_token(token),
        (None, None) => SyncParams::new(),
      };
      for event in types {
        params = params.event_type(event);
      }
      if let Some(uid) = content_type {
        params = params.content_type_uid(uid);
      }
      if let Some(date) = start_date {
        params = params.start_date(date);
      }

      let batch = stack.sync(params, !single_page).await?;
      match batch.cursor() {
        Some(SyncCursor::Sync(token)) => info!(items = batch.items.len(), %token, "sync complete"),
        Some(SyncCursor::Pagination(token)) => {
          info!(items = batch.items.len(), %token, "more pages available")
        }
        None => info!(items = batch.items.len(), "sync returned no cursor"),
      }
      print_json(&batch)?;
    }
  }

  Ok(())
}
