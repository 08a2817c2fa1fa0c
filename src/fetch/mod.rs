//! # Fetching Relay Descriptors
//!
//! This module brings relay descriptors to the parser: from local cache and archive
//! directories, and from the directory authorities. While documents are parsed, a
//! ledger records which referenced documents we have and which we still want; the
//! downloader then requests the missing ones in batches and feeds the responses back
//! into the parser.
//!
//! ## Usage
//!
//! Create a [`DescriptorDownloader`], attach its [`DescriptorDownloader::listener`] to
//! the parser, import local documents with [`import_directory`], then call
//! [`DescriptorDownloader::download_missing_descriptors`] and persist the ledger with
//! [`DescriptorDownloader::write_file`].
//!
//! ## Submodules
//!
//! - **client**: The directory authority client and its HTTP implementation.
//! - **downloader**: Want tracking and batched, retried downloads.
//! - **ledger**: The persisted set of wanted and received documents.
//! - **local**: Import from directories on disk.
//! - **types**: Data structures shared by the submodules.

mod client;
mod downloader;
mod ledger;
mod local;
mod types;

pub use client::{resource_url, DirectoryClient, HttpDirectoryClient};
pub use downloader::{
    DescriptorDownloader, LedgerListener, DIGESTS_PER_REQUEST, LEDGER_RETENTION_HOURS, MAX_PASSES,
};
pub use ledger::WantSet;
pub use local::import_directory;
pub use types::{DownloadSummary, DownloaderConfig, WantEntry, WantStatus};
