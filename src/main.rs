//! Relay Descriptors: Import, Download, and Export Tor Relay Descriptors
//!
//! This application collects the documents that describe the public Tor network. It
//! imports descriptors from Tor data directories and from a local archive, works out
//! which referenced documents are missing, downloads them from the directory
//! authorities, and hands everything to the configured outputs.
//!
//! ## Design Overview
//! - **Fetching**: Local imports and authority downloads live in the `fetch` module. A
//!   ledger file remembers wanted and received documents between runs.
//! - **Parsing**: The `parse` module recognizes each document and extracts its fields.
//! - **Exporting**: The `export` module writes an on-disk archive, imports into
//!   PostgreSQL, and keeps consensus, bridge and directory request statistics.
//!
//! ## Usage
//! 1. Configure the application using either a `.env` file or command-line arguments:
//!    ```env
//!    CACHE_DIRS=/var/lib/tor
//!    ARCHIVE_DIR=archive
//!    DB_PARAMS=host=localhost user=postgres password=2099 dbname=tordir
//!    DOWNLOAD_ALL_SERVER_DESCRIPTORS=true
//!    ```
//! 2. Run the application:
//!    ```sh
//!    cargo run -- --cache-dirs /var/lib/tor --download-current-consensus --archive-dir archive
//!    ```
//! 3. Logs are written to the console, controlled by the `RUST_LOG` environment variable:
//!    ```sh
//!    export RUST_LOG=info
//!    cargo run
//!    ```

use chrono::Utc;
use clap::Parser;
use dotenv::dotenv;
use log::{error, info, warn};
use relay_descriptors::config::Config;
use relay_descriptors::export::{
  lock, ArchiveWriter, BridgeStats, ConsensusStats, DirreqStats, NetworkHealth, PostgresImporter,
};
use relay_descriptors::fetch::{import_directory, DescriptorDownloader, HttpDirectoryClient};
use relay_descriptors::parse::RelayDescriptorParser;
use std::mem;
use std::sync::{Arc, Mutex};

/// Imports, downloads, and exports relay descriptors.
///
/// This function:
/// 1. Loads and validates configuration from the environment or command-line arguments.
/// 2. Builds the parser with every configured output attached.
/// 3. Imports descriptors from the cache directories, then from the archive.
/// 4. Downloads missing descriptors and saves the ledger.
/// 5. Exports to PostgreSQL if a connection string is given.
/// 6. Logs what was collected.
///
/// # Returns
/// - `Ok(())` once the run completes; failed downloads or exports are logged, not fatal.
/// - `Err` if the configuration is invalid or the HTTP client cannot be built.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Initialize logging
  env_logger::init();

  // Load environment variables from .env file (if present)
  dotenv().ok();

  let config = Config::parse().validate()?;
  let now = Utc::now().naive_utc();

  let consensus_stats = Arc::new(Mutex::new(ConsensusStats::new()));
  let bridge_stats = Arc::new(Mutex::new(BridgeStats::new()));
  let dirreq_stats = Arc::new(Mutex::new(DirreqStats::new()));
  let health = Arc::new(Mutex::new(NetworkHealth::new()));
  let importer = config
    .db_params
    .as_ref()
    .map(|_| Arc::new(Mutex::new(PostgresImporter::new())));

  let mut parser = RelayDescriptorParser::new(config.parser.clone())
    .with_consensus_stats(Arc::clone(&consensus_stats))
    .with_bridge_stats(Arc::clone(&bridge_stats))
    .with_dirreq_stats(Arc::clone(&dirreq_stats))
    .with_health(Arc::clone(&health));
  if let Some(root) = &config.archive_dir {
    info!("Archiving descriptors below {}", root.display());
    parser = parser.with_archive(ArchiveWriter::new(root.clone()));
  }
  if let Some(importer) = &importer {
    parser = parser.with_database(Arc::clone(importer));
  }

  let mut downloader = match config.downloader.clone() {
    Some(downloader_config) => {
      let client = HttpDirectoryClient::new(downloader_config.timeout)?;
      let downloader = DescriptorDownloader::new(downloader_config, client, now);
      parser.set_listener(downloader.listener());
      Some(downloader)
    }
    None => None,
  };

  // Import local descriptors
  for dir in &config.cache_dirs {
    import_directory(dir, &mut parser);
  }
  if let Some(dir) = &config.import_archive {
    import_directory(dir, &mut parser);
  }

  // Download whatever is still missing
  if let Some(downloader) = downloader.as_mut() {
    let summary = downloader.download_missing_descriptors(&mut parser).await;
    info!(
      "Sent {} request(s), {} failed, {} document(s) abandoned; still wanted: {:?}",
      summary.requests, summary.failed_requests, summary.abandoned, summary.still_wanted
    );
    if let Err(e) = downloader.write_file() {
      error!("Failed to save the ledger: {:#}", e);
    }
  }

  // Export to PostgreSQL
  if let (Some(importer), Some(db_params)) = (&importer, &config.db_params) {
    let pending = mem::take(&mut *lock(importer));
    match pending.export(db_params, config.clear).await {
      Ok(()) => info!("Descriptors exported to PostgreSQL"),
      Err(e) => error!("Failed to export to PostgreSQL: {:#}", e),
    }
  }

  for (kind, count) in parser.parsed_counts() {
    info!("Parsed {} {} document(s)", count, kind.as_str());
  }
  if let Some(summary) = lock(&consensus_stats).summary() {
    info!("{}", summary);
  }
  info!("Saw {} hashed relay identities", lock(&bridge_stats).len());
  info!("Kept {} directory request observation(s)", lock(&dirreq_stats).len());
  for problem in lock(&health).check(now) {
    warn!("{}", problem);
  }

  Ok(())
}
