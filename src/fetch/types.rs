use crate::parse::DocumentKind;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Debug;
use std::path::PathBuf;
use std::time::Duration;

/// Where a wanted document stands in this and earlier runs.
///
/// Entries only move forward: `Wanted` to `Requested` to `Received`, with `Received`
/// reachable from either earlier state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WantStatus {
    Wanted,
    Requested,
    Received,
}

/// A document we know about, keyed elsewhere by digest or publication time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WantEntry {
    pub status: WantStatus,
    /// Publication or valid-after time; used to expire old entries.
    pub reference_time: NaiveDateTime,
    /// Fingerprint of the relay the document belongs to, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
}

/// Which documents the downloader asks for, and where.
#[derive(Debug, Clone)]
pub struct DownloaderConfig {
    /// Directory authorities as `host[:port]`, tried in order.
    pub authorities: Vec<String>,
    pub download_current_consensus: bool,
    pub download_current_votes: bool,
    pub download_all_server_descriptors: bool,
    pub download_all_extra_infos: bool,
    /// Upper-case fingerprints of relays whose descriptors are always wanted.
    pub relays_of_interest: BTreeSet<String>,
    /// File the want ledger is kept in between runs.
    pub ledger_path: PathBuf,
    /// Bound on connecting to, and on a whole request to, an authority.
    pub timeout: Duration,
}

/// Outcome of one `download_missing_descriptors` run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadSummary {
    /// Requests sent, including retries.
    pub requests: usize,
    /// Requests that failed or returned a non-success status.
    pub failed_requests: usize,
    /// Keys whose batch failed on both authorities and was given up for this run.
    pub abandoned: usize,
    /// Keys still wanted at the end of the run, by kind.
    pub still_wanted: BTreeMap<DocumentKind, usize>,
}
