use super::cursor::LineCursor;
use super::error::ParseError;
use super::types::{DocumentKind, FlagTallies, NetworkStatusDocument, RawDocument, RouterStatusEntry};
use crate::utils::{compute_digest, decode_identity, hashed_relay_identity, is_fingerprint};
use chrono::NaiveDateTime;
use log::warn;
use std::collections::BTreeSet;
use std::net::Ipv4Addr;

/// Start of the signed range of a network status document.
pub const SIGNED_RANGE_START: &str = "network-status-version ";
/// End of the signed range of a network status document, inclusive.
pub const SIGNED_RANGE_END: &str = "directory-signature ";

/// Assembly state of the status entry currently being read.
///
/// An entry leaves `Building` only when the next `r` line starts or the document ends.
enum EntryState {
    Idle,
    Building(RouterStatusEntry),
}

impl EntryState {
    /// Finalizes the entry in progress, if any, and returns to `Idle`.
    fn finish(&mut self) -> Option<RouterStatusEntry> {
        match std::mem::replace(self, EntryState::Idle) {
            EntryState::Building(entry) => Some(entry),
            EntryState::Idle => None,
        }
    }

    fn current(&mut self) -> Option<&mut RouterStatusEntry> {
        match self {
            EntryState::Building(entry) => Some(entry),
            EntryState::Idle => None,
        }
    }
}

/// Decodes a network status consensus or vote.
///
/// The document is read in a single pass. It is a consensus unless a `vote-status vote`
/// line says otherwise. A malformed `r` line drops that one entry, and the `s`, `v`,
/// `w` and `p` lines following it are ignored until the next `r` line. A missing or
/// unparsable `valid-after` rejects the whole document.
///
/// # Arguments
///
/// * `raw` - The document, whose first line is `network-status-version 3`.
///
/// # Returns
///
/// * `Ok(NetworkStatusDocument)` - The decoded document with all finalized entries.
/// * `Err(ParseError)` - The document lacks a usable `valid-after` line.
pub fn decode(raw: &RawDocument<'_>) -> Result<NetworkStatusDocument, ParseError> {
    let mut kind = DocumentKind::Consensus;
    let mut valid_after: Option<NaiveDateTime> = None;
    let mut dir_source: Option<String> = None;
    let mut authority_fingerprint: Option<String> = None;
    let mut dir_sources = BTreeSet::new();
    let mut entries = Vec::new();
    let mut tallies = FlagTallies::default();
    let mut state = EntryState::Idle;

    let mut finalize = |state: &mut EntryState, entries: &mut Vec<RouterStatusEntry>| {
        if let Some(entry) = state.finish() {
            tallies.count(&entry.flags);
            entries.push(entry);
        }
    };

    for line in raw.lines().skip(1) {
        if line == "vote-status vote" {
            kind = DocumentKind::Vote;
        } else if let Some(time) = line.strip_prefix("valid-after ") {
            valid_after = Some(super::cursor::parse_timestamp(time)?);
        } else if line.starts_with("dir-source ") {
            let mut cursor = LineCursor::new(line);
            match cursor.next_field("nickname").and_then(|_| cursor.next_field("identity")) {
                Ok(identity) if is_fingerprint(identity) => dir_source = Some(identity.to_uppercase()),
                Ok(identity) => {
                    dir_source = None;
                    warn!("Skipping dir-source line with bad identity '{}'", identity);
                }
                Err(e) => {
                    dir_source = None;
                    warn!("Skipping dir-source line: {}", e);
                }
            }
        } else if line.starts_with("vote-digest ") {
            if let Some(source) = &dir_source {
                dir_sources.insert(source.clone());
            }
        } else if line.starts_with("fingerprint ") {
            let mut cursor = LineCursor::new(line);
            match cursor.next_field("fingerprint") {
                Ok(fingerprint) if is_fingerprint(fingerprint) => {
                    authority_fingerprint = Some(fingerprint.to_uppercase())
                }
                _ => warn!("Ignoring malformed authority line '{}'", line),
            }
        } else if line.starts_with("r ") {
            finalize(&mut state, &mut entries);
            match decode_r_line(line) {
                Ok(entry) => state = EntryState::Building(entry),
                Err(e) => warn!("Skipping status entry '{}': {}", line, e),
            }
        } else if line == "s" || line.starts_with("s ") {
            if let Some(entry) = state.current() {
                entry.flags = line
                    .split_whitespace()
                    .skip(1)
                    .map(str::to_string)
                    .collect();
                append_raw(entry, line);
            }
        } else if let Some(version) = line.strip_prefix("v ") {
            if let Some(entry) = state.current() {
                entry.version = Some(version.to_string());
                append_raw(entry, line);
            }
        } else if line.starts_with("w ") {
            if let Some(entry) = state.current() {
                match decode_w_line(line) {
                    Ok(bandwidth) => entry.bandwidth = bandwidth,
                    Err(e) => warn!("Ignoring bandwidth of {}: {}", entry.nickname, e),
                }
                append_raw(entry, line);
            }
        } else if let Some(ports) = line.strip_prefix("p ") {
            if let Some(entry) = state.current() {
                entry.ports = Some(ports.to_string());
                append_raw(entry, line);
            }
        }
    }
    finalize(&mut state, &mut entries);

    let valid_after = valid_after.ok_or(ParseError::MissingLine {
        keyword: "valid-after",
    })?;
    let digest = compute_digest(raw.bytes(), SIGNED_RANGE_START, SIGNED_RANGE_END)
        .map(|digest| digest.to_uppercase());

    Ok(NetworkStatusDocument {
        kind,
        valid_after,
        dir_source,
        authority_fingerprint,
        dir_sources,
        entries,
        tallies,
        digest,
        raw: raw.bytes().to_vec(),
    })
}

/// Decodes `r <nickname> <identity> <digest> <date> <time> <address> <orport> <dirport>`.
fn decode_r_line(line: &str) -> Result<RouterStatusEntry, ParseError> {
    let mut cursor = LineCursor::new(line);
    let nickname = cursor.next_field("nickname")?.to_string();
    let identity = decode_identity(cursor.next_field("identity")?)?;
    let digest = decode_identity(cursor.next_field("digest")?)?;
    let published = cursor.next_timestamp("published")?;
    let address = cursor.next_field("address")?;
    let address = address
        .parse::<Ipv4Addr>()
        .map_err(|_| ParseError::InvalidAddress {
            raw: address.to_string(),
        })?;
    let or_port = cursor.next_parsed::<u16>("orport")?;
    let dir_port = cursor.next_parsed::<u16>("dirport")?;

    Ok(RouterStatusEntry {
        nickname,
        fingerprint: hex::encode(identity),
        descriptor_digest: hex::encode(digest),
        hashed_identity: hashed_relay_identity(&identity),
        published,
        address,
        or_port,
        dir_port,
        flags: BTreeSet::new(),
        version: None,
        bandwidth: None,
        ports: None,
        raw: format!("{}\n", line),
    })
}

/// Extracts the `Bandwidth=` value of a `w` line, if present.
fn decode_w_line(line: &str) -> Result<Option<u64>, ParseError> {
    for part in line.split_whitespace().skip(1) {
        if let Some(value) = part.strip_prefix("Bandwidth=") {
            return value.parse::<u64>().map(Some).map_err(|_| ParseError::InvalidInt {
                raw: value.to_string(),
                context: "w Bandwidth".to_string(),
            });
        }
    }
    Ok(None)
}

fn append_raw(entry: &mut RouterStatusEntry, line: &str) {
    entry.raw.push_str(line);
    entry.raw.push('\n');
}
