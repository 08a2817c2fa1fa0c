use super::types::{WantEntry, WantStatus};
use crate::parse::DocumentKind;
use anyhow::{Context, Result as AnyhowResult};
use chrono::NaiveDateTime;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Documents we want, have asked for, or have, by kind and key.
///
/// Keys are the valid-after time for consensuses, `<valid-after>,<AUTHORITY>` for
/// votes, and the lower-case digest for server and extra-info descriptors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WantSet {
    kinds: BTreeMap<DocumentKind, BTreeMap<String, WantEntry>>,
}

impl WantSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads a ledger written by [`WantSet::write`]. A missing file gives an empty set.
    pub fn load(path: &Path) -> AnyhowResult<WantSet> {
        if !path.exists() {
            debug!("No ledger at {}, starting empty", path.display());
            return Ok(WantSet::new());
        }
        let raw = fs::read(path).with_context(|| format!("Failed to read ledger {}", path.display()))?;
        let wants: WantSet = serde_json::from_slice(&raw)
            .with_context(|| format!("Failed to parse ledger {}", path.display()))?;
        info!("Loaded {} ledger entries from {}", wants.len(), path.display());
        Ok(wants)
    }

    /// Writes the ledger as JSON, replacing the previous file only once the new one is
    /// complete.
    pub fn write(&self, path: &Path) -> AnyhowResult<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }
        let raw = serde_json::to_vec_pretty(self).context("Failed to serialize ledger")?;
        let partial = path.with_extension("partial");
        fs::write(&partial, raw).with_context(|| format!("Failed to write {}", partial.display()))?;
        fs::rename(&partial, path)
            .with_context(|| format!("Failed to move ledger into place at {}", path.display()))?;
        Ok(())
    }

    /// Adds `key` as wanted unless it is already known. Returns whether it was added.
    pub fn want(
        &mut self,
        kind: DocumentKind,
        key: &str,
        reference_time: NaiveDateTime,
        fingerprint: Option<&str>,
    ) -> bool {
        let entries = self.kinds.entry(kind).or_default();
        if entries.contains_key(key) {
            return false;
        }
        entries.insert(
            key.to_string(),
            WantEntry {
                status: WantStatus::Wanted,
                reference_time,
                fingerprint: fingerprint.map(str::to_string),
            },
        );
        true
    }

    /// Moves a wanted entry to requested. Other entries are left alone.
    pub fn mark_requested(&mut self, kind: DocumentKind, key: &str) {
        if let Some(entry) = self.kinds.get_mut(&kind).and_then(|e| e.get_mut(key)) {
            if entry.status == WantStatus::Wanted {
                entry.status = WantStatus::Requested;
            }
        }
    }

    /// Records `key` as received, adding it if it was never wanted.
    pub fn mark_received(&mut self, kind: DocumentKind, key: &str, reference_time: NaiveDateTime) {
        self.kinds
            .entry(kind)
            .or_default()
            .entry(key.to_string())
            .and_modify(|entry| entry.status = WantStatus::Received)
            .or_insert(WantEntry {
                status: WantStatus::Received,
                reference_time,
                fingerprint: None,
            });
    }

    pub fn entry(&self, kind: DocumentKind, key: &str) -> Option<&WantEntry> {
        self.kinds.get(&kind)?.get(key)
    }

    pub fn status(&self, kind: DocumentKind, key: &str) -> Option<WantStatus> {
        self.entry(kind, key).map(|entry| entry.status)
    }

    /// Keys of `kind` that are still wanted, in key order.
    pub fn wanted(&self, kind: DocumentKind) -> Vec<String> {
        self.kinds
            .get(&kind)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|(_, entry)| entry.status == WantStatus::Wanted)
                    .map(|(key, _)| key.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn count(&self, kind: DocumentKind, status: WantStatus) -> usize {
        self.kinds.get(&kind).map_or(0, |entries| {
            entries.values().filter(|entry| entry.status == status).count()
        })
    }

    pub fn len(&self) -> usize {
        self.kinds.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops entries whose reference time lies before `cutoff`. Returns how many.
    pub fn prune(&mut self, cutoff: NaiveDateTime) -> usize {
        let before = self.len();
        for entries in self.kinds.values_mut() {
            entries.retain(|_, entry| entry.reference_time >= cutoff);
        }
        before - self.len()
    }
}
