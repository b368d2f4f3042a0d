mod cache;
mod config;
mod db;
mod queue;
mod remote;
mod search;
mod sync;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cache::{CacheStore, RecordPatch, SqliteCacheStore};
use config::Config;
use db::Database;
use queue::{MutationQueue, PendingMutation, SqliteMutationQueue};
use remote::HttpRemote;
use search::{OfflineSearch, SearchCategory, SearchQuery};
use sync::{LocalWriter, MetadataStore, SqliteMetadataStore, SyncOrchestrator};

#[derive(Parser, Debug)]
#[command(name = "vidsync")]
#[command(about = "Offline cache, search and sync for a remote video library")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/vidsync/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Push queued changes, then pull the newest videos
  Sync,
  /// Search the offline cache
  Search {
    /// Whitespace-separated terms; every term must match
    #[arg(default_value = "")]
    query: String,
    /// Restrict matching to a category (repeatable)
    #[arg(short = 'C', long = "category", value_parser = parse_category)]
    categories: Vec<SearchCategory>,
    #[arg(short, long, default_value_t = 20)]
    limit: usize,
    #[arg(short, long, default_value_t = 0)]
    offset: usize,
  },
  /// Show a single cached video
  Show { id: String },
  /// Cache and queue status
  Status,
  /// List changes waiting to be pushed
  Pending,
  /// Edit user fields of a video locally
  Edit {
    id: String,
    /// Set notes; an empty string clears them
    #[arg(long)]
    notes: Option<String>,
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=5))]
    rating: Option<u8>,
    #[arg(long)]
    favorite: Option<bool>,
    #[arg(long)]
    watched: Option<bool>,
  },
  /// Delete a video locally and queue the delete
  Delete { id: String },
}

fn parse_category(s: &str) -> std::result::Result<SearchCategory, String> {
  s.parse().map_err(|e: color_eyre::Report| e.to_string())
}

/// One row of the `pending` listing.
fn pending_line(mutation: &PendingMutation) -> String {
  format!(
    "{}  {}  {}  {}  retries={}{}",
    mutation.id,
    mutation.timestamp.to_rfc3339(),
    mutation.kind.as_str(),
    mutation.target_id,
    mutation.retry_count,
    mutation
      .last_error
      .as_ref()
      .map(|e| format!("  last error: {}", e))
      .unwrap_or_default()
  )
}

/// Log to a daily file under the data directory. RUST_LOG overrides the level.
fn init_tracing() -> Result<WorkerGuard> {
  let log_dir = db::data_dir()?;
  std::fs::create_dir_all(&log_dir)?;

  let appender = tracing_appender::rolling::daily(&log_dir, "vidsync.log");
  let (writer, guard) = tracing_appender::non_blocking(appender);

  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

  tracing_subscriber::registry()
    .with(fmt::layer().with_writer(writer).with_ansi(false))
    .with(filter)
    .init();

  Ok(guard)
}

struct Stores {
  cache: Arc<SqliteCacheStore>,
  queue: Arc<SqliteMutationQueue>,
  metadata: Arc<SqliteMetadataStore>,
}

impl Stores {
  fn open(config: &Config) -> Result<Self> {
    let db = Database::open(config.storage.db_path.as_deref())?;
    Ok(Self {
      cache: Arc::new(SqliteCacheStore::new(db.clone())),
      queue: Arc::new(SqliteMutationQueue::new(db.clone())),
      metadata: Arc::new(SqliteMetadataStore::new(db)),
    })
  }

  fn orchestrator(&self, config: &Config) -> Result<SyncOrchestrator> {
    let remote = HttpRemote::new(
      config.remote_url()?,
      std::time::Duration::from_secs(config.remote.timeout_secs),
      Config::get_api_token(),
    )?;
    Ok(SyncOrchestrator::new(
      self.cache.clone(),
      self.queue.clone(),
      self.metadata.clone(),
      Arc::new(remote),
      config.limits,
    ))
  }

  fn writer(&self) -> LocalWriter {
    LocalWriter::new(self.cache.clone(), self.queue.clone())
  }

  /// Best-effort resync when the stored payload version is stale.
  ///
  /// Offline use keeps working with whatever is cached.
  async fn refresh_if_stale(&self, config: &Config) {
    if config.remote.url.is_none() {
      return;
    }
    let result = match self.orchestrator(config) {
      Ok(orchestrator) => orchestrator.ensure_cache_version().await,
      Err(e) => Err(e),
    };
    if let Err(e) = result {
      warn!(error = %e, "Could not refresh stale cache, using local copy");
    }
  }
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _log_guard = init_tracing()?;

  let config = Config::load(args.config.as_deref())?;
  let stores = Stores::open(&config)?;

  match args.command {
    Command::Sync => {
      // A full sync rewrites the payload version itself
      let orchestrator = stores.orchestrator(&config)?;
      match orchestrator.full_sync().await? {
        Some(summary) => {
          println!(
            "Synced at {}: {} videos cached, {} changes pushed",
            summary.last_sync_time.to_rfc3339(),
            summary.videos_updated,
            summary.mutations_synced
          );
          for failure in &summary.errors {
            println!("  {}: {}", failure.mutation_id, failure.error);
          }
        }
        None => println!("A sync is already running"),
      }
    }

    Command::Search {
      query,
      categories,
      limit,
      offset,
    } => {
      stores.refresh_if_stale(&config).await;
      let search = OfflineSearch::new(stores.cache.clone());
      let query = SearchQuery::new(query)
        .categories(categories)
        .limit(limit)
        .offset(offset);
      let results = search.search(&query)?;

      println!(
        "{} matches (showing {})",
        results.total,
        results.records.len()
      );
      for record in &results.records {
        println!(
          "{}  {}  {}  [{}]",
          record.id,
          record.published_at.format("%Y-%m-%d"),
          record.title,
          record.channel
        );
      }
    }

    Command::Show { id } => {
      // Accept the platform video id as well
      let id = match stores.cache.get_by_video_id(&id)? {
        Some(record) if stores.cache.get(&id)?.is_none() => record.id,
        _ => id,
      };
      match stores.writer().get(&id)? {
        Some((record, pending)) => {
          println!("{}", serde_json::to_string_pretty(&record)?);
          if pending {
            println!("(has local changes not yet synced)");
          }
        }
        None => println!("{} is not cached", id),
      }
    }

    Command::Status => {
      stores.refresh_if_stale(&config).await;
      let meta = stores.metadata.load()?;
      println!("Cached videos:    {}", stores.cache.count()?);
      println!("Cache size:       {} bytes", stores.cache.estimate_size_bytes()?);
      println!(
        "Size budget:      {} / {} bytes",
        config.limits.effective_target_bytes(),
        config.limits.max_cache_bytes
      );
      println!("Pending changes:  {}", stores.queue.count()?);
      println!(
        "Last sync:        {}",
        meta
          .last_sync
          .map(|t| t.to_rfc3339())
          .unwrap_or_else(|| "never".to_string())
      );
      println!(
        "Payload version:  {}",
        meta
          .cache_payload_version
          .map(|v| v.to_string())
          .unwrap_or_else(|| "none".to_string())
      );
    }

    Command::Pending => {
      let pending = stores.queue.get_all_ordered_by_timestamp()?;
      if pending.is_empty() {
        println!("No pending changes");
      }
      for mutation in &pending {
        println!("{}", pending_line(mutation));
      }
    }

    Command::Edit {
      id,
      notes,
      rating,
      favorite,
      watched,
    } => {
      let patch = RecordPatch {
        notes,
        rating,
        favorite,
        watched,
      };
      let mutation = stores.writer().update(&id, patch)?;
      println!("Queued update {} for {}", mutation.id, id);
    }

    Command::Delete { id } => {
      let mutation = stores.writer().delete(&id)?;
      println!("Queued delete {} for {}", mutation.id, id);
    }
  }

  Ok(())
}
