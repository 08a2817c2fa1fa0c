use super::sinks::ArchiveSink;
use anyhow::{Context, Result as AnyhowResult};
use chrono::NaiveDateTime;
use log::{debug, error};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Writes raw descriptors into a directory archive.
///
/// The layout below `root` is
///
/// ```text
/// consensus/YYYY/MM/DD/YYYY-MM-DD-HH-MM-SS-consensus
/// vote/YYYY/MM/DD/YYYY-MM-DD-HH-MM-SS-vote-<authority>-<digest>
/// server-descriptor/YYYY/MM/<d0>/<d1>/<digest>
/// extra-info/YYYY/MM/<d0>/<d1>/<digest>
/// ```
///
/// where `<d0>` and `<d1>` are the first two hex characters of the digest. Files that
/// already exist are left alone.
#[derive(Debug)]
pub struct ArchiveWriter {
    root: PathBuf,
    written: usize,
}

impl ArchiveWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        ArchiveWriter {
            root: root.into(),
            written: 0,
        }
    }

    /// Number of files written so far.
    pub fn written(&self) -> usize {
        self.written
    }

    fn consensus_path(&self, valid_after: NaiveDateTime) -> PathBuf {
        self.root
            .join("consensus")
            .join(valid_after.format("%Y/%m/%d").to_string())
            .join(format!("{}-consensus", valid_after.format("%Y-%m-%d-%H-%M-%S")))
    }

    fn vote_path(&self, valid_after: NaiveDateTime, authority: &str, digest: &str) -> PathBuf {
        self.root
            .join("vote")
            .join(valid_after.format("%Y/%m/%d").to_string())
            .join(format!(
                "{}-vote-{}-{}",
                valid_after.format("%Y-%m-%d-%H-%M-%S"),
                authority,
                digest
            ))
    }

    fn descriptor_path(&self, kind: &str, digest: &str, published: NaiveDateTime) -> PathBuf {
        let mut path = self
            .root
            .join(kind)
            .join(published.format("%Y/%m").to_string());
        for c in digest.chars().take(2) {
            path.push(c.to_string());
        }
        path.join(digest)
    }

    /// Writes `raw` to `path` unless the file exists, logging failures.
    fn store(&mut self, path: PathBuf, raw: &[u8]) {
        match write_new(&path, raw) {
            Ok(true) => {
                self.written += 1;
                debug!("Stored {}", path.display());
            }
            Ok(false) => debug!("Not overwriting {}", path.display()),
            Err(e) => error!("Could not store {} in archive: {:#}", path.display(), e),
        }
    }
}

/// File name parts taken from documents must be plain hex, so they stay inside their
/// directory.
fn is_hex_name(value: &str) -> bool {
    !value.is_empty() && value.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Creates `path` with `raw` as its content. Returns `Ok(false)` if it already exists.
fn write_new(path: &Path, raw: &[u8]) -> AnyhowResult<bool> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(false),
        Err(e) => return Err(e).context("Failed to create file"),
    };
    file.write_all(raw).context("Failed to write file")?;
    Ok(true)
}

impl ArchiveSink for ArchiveWriter {
    fn store_consensus(&mut self, raw: &[u8], valid_after: NaiveDateTime) {
        let path = self.consensus_path(valid_after);
        self.store(path, raw);
    }

    fn store_vote(&mut self, raw: &[u8], valid_after: NaiveDateTime, authority: &str, digest: &str) {
        if !is_hex_name(authority) || !is_hex_name(digest) {
            error!(
                "Not archiving vote valid after {} with unusable name '{}-{}'",
                valid_after, authority, digest
            );
            return;
        }
        let path = self.vote_path(valid_after, authority, digest);
        self.store(path, raw);
    }

    fn store_server_descriptor(&mut self, raw: &[u8], digest: &str, published: NaiveDateTime) {
        if !is_hex_name(digest) {
            error!("Not archiving server descriptor with unusable digest '{}'", digest);
            return;
        }
        let path = self.descriptor_path("server-descriptor", digest, published);
        self.store(path, raw);
    }

    fn store_extra_info_descriptor(&mut self, raw: &[u8], digest: &str, published: NaiveDateTime) {
        if !is_hex_name(digest) {
            error!("Not archiving extra-info descriptor with unusable digest '{}'", digest);
            return;
        }
        let path = self.descriptor_path("extra-info", digest, published);
        self.store(path, raw);
    }
}
