use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Debug;
use std::net::Ipv4Addr;

/// Timestamp format used throughout the directory protocol, always UTC.
pub const DATE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Country key under which the sum over all countries is reported.
pub const ALL_COUNTRIES: &str = "zy";

/// The kinds of relay descriptor documents the parser understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DocumentKind {
    Consensus,
    Vote,
    ServerDescriptor,
    ExtraInfoDescriptor,
}

impl DocumentKind {
    /// All kinds, in the order the downloader requests them.
    pub const ALL: [DocumentKind; 4] = [
        DocumentKind::Consensus,
        DocumentKind::Vote,
        DocumentKind::ServerDescriptor,
        DocumentKind::ExtraInfoDescriptor,
    ];

    /// Classifies a document by its first line.
    ///
    /// A network status document is reported as a consensus; it is reclassified as a
    /// vote only once its `vote-status vote` line has been seen. Returns `None` for
    /// documents we do not handle.
    pub fn classify(first_line: &str) -> Option<DocumentKind> {
        let first_line = first_line.trim_end_matches('\r');
        if first_line == "network-status-version 3" {
            Some(DocumentKind::Consensus)
        } else if first_line.starts_with("router ") {
            Some(DocumentKind::ServerDescriptor)
        } else if first_line.starts_with("extra-info ") {
            Some(DocumentKind::ExtraInfoDescriptor)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Consensus => "consensus",
            DocumentKind::Vote => "vote",
            DocumentKind::ServerDescriptor => "server-descriptor",
            DocumentKind::ExtraInfoDescriptor => "extra-info",
        }
    }
}

/// A raw document as received from a cache, an archive, or a directory authority.
///
/// The bytes are kept untouched for storage; parsing works on an ASCII view in which
/// non-ASCII bytes are ignored.
#[derive(Debug, Clone)]
pub struct RawDocument<'a> {
    bytes: &'a [u8],
    ascii: String,
}

impl<'a> RawDocument<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        let ascii = bytes
            .iter()
            .filter(|b| b.is_ascii())
            .map(|&b| b as char)
            .collect();
        RawDocument { bytes, ascii }
    }

    pub fn bytes(&self) -> &'a [u8] {
        self.bytes
    }

    pub fn ascii(&self) -> &str {
        &self.ascii
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> + '_ {
        self.ascii.lines().map(|line| line.trim_end_matches('\r'))
    }

    pub fn first_line(&self) -> Option<&str> {
        self.lines().next()
    }
}

/// A reference from a status entry to the server descriptor it describes.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ServerDescriptorRef {
    pub published: NaiveDateTime,
    /// Lower-case hex relay fingerprint.
    pub fingerprint: String,
    /// Lower-case hex server descriptor digest.
    pub digest: String,
}

/// Running totals of relay flags over all running relays of a consensus.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlagTallies {
    pub exit: u32,
    pub fast: u32,
    pub guard: u32,
    pub running: u32,
    pub stable: u32,
}

impl FlagTallies {
    /// Counts one status entry. Only running relays are counted.
    pub fn count(&mut self, flags: &BTreeSet<String>) {
        if !flags.contains("Running") {
            return;
        }
        self.running += 1;
        self.exit += u32::from(flags.contains("Exit"));
        self.fast += u32::from(flags.contains("Fast"));
        self.guard += u32::from(flags.contains("Guard"));
        self.stable += u32::from(flags.contains("Stable"));
    }
}

/// A single relay's entry in a network status consensus or vote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterStatusEntry {
    pub nickname: String,
    /// Lower-case hex relay identity fingerprint.
    pub fingerprint: String,
    /// Lower-case hex digest of the referenced server descriptor.
    pub descriptor_digest: String,
    /// Upper-case hex SHA-1 of the raw identity, for bridge statistics.
    pub hashed_identity: String,
    pub published: NaiveDateTime,
    pub address: Ipv4Addr,
    pub or_port: u16,
    pub dir_port: u16,
    pub flags: BTreeSet<String>,
    pub version: Option<String>,
    pub bandwidth: Option<u64>,
    pub ports: Option<String>,
    /// The entry's lines as they appeared in the document.
    pub raw: String,
}

impl RouterStatusEntry {
    pub fn has_flag(&self, flag: &str) -> bool {
        self.flags.contains(flag)
    }

    pub fn descriptor_ref(&self) -> ServerDescriptorRef {
        ServerDescriptorRef {
            published: self.published,
            fingerprint: self.fingerprint.clone(),
            digest: self.descriptor_digest.clone(),
        }
    }
}

/// A decoded network status consensus or vote.
#[derive(Debug, Clone)]
pub struct NetworkStatusDocument {
    /// Either [`DocumentKind::Consensus`] or [`DocumentKind::Vote`].
    pub kind: DocumentKind,
    pub valid_after: NaiveDateTime,
    /// Identity of the authority that published a vote, from its `dir-source` line.
    pub dir_source: Option<String>,
    /// Fingerprint of a vote's authority, from its `fingerprint` line.
    pub authority_fingerprint: Option<String>,
    /// Authorities whose votes contributed to a consensus.
    pub dir_sources: BTreeSet<String>,
    pub entries: Vec<RouterStatusEntry>,
    pub tallies: FlagTallies,
    /// Digest over the signed range; upper-case hex.
    pub digest: Option<String>,
    pub raw: Vec<u8>,
}

impl NetworkStatusDocument {
    pub fn is_consensus(&self) -> bool {
        self.kind == DocumentKind::Consensus
    }

    /// The identity under which a vote's authority is known.
    pub fn authority(&self) -> Option<&str> {
        self.authority_fingerprint
            .as_deref()
            .or(self.dir_source.as_deref())
    }

    /// Server descriptors referenced by this document's entries.
    pub fn descriptor_refs(&self) -> BTreeSet<ServerDescriptorRef> {
        self.entries.iter().map(RouterStatusEntry::descriptor_ref).collect()
    }

    pub fn hashed_identities(&self) -> BTreeSet<&str> {
        self.entries.iter().map(|e| e.hashed_identity.as_str()).collect()
    }
}

/// Advertised bandwidth of a relay, in bytes per second.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bandwidth {
    pub average: u64,
    pub burst: u64,
    pub observed: u64,
}

/// A decoded server descriptor.
#[derive(Debug, Clone)]
pub struct ServerDescriptor {
    /// Hex digest over the signed range.
    pub digest: String,
    pub nickname: String,
    pub address: String,
    pub or_port: u16,
    pub dir_port: u16,
    /// Lower-case hex fingerprint; missing in some very old descriptors.
    pub fingerprint: Option<String>,
    pub bandwidth: Option<Bandwidth>,
    pub platform: Option<String>,
    pub published: NaiveDateTime,
    pub uptime: Option<u64>,
    /// Lower-case hex digest of the companion extra-info descriptor.
    pub extra_info_digest: Option<String>,
    pub raw: Vec<u8>,
}

/// The traffic histories reported in extra-info descriptors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HistoryType {
    Read,
    Write,
    DirreqRead,
    DirreqWrite,
}

impl HistoryType {
    pub fn from_keyword(keyword: &str) -> Option<HistoryType> {
        match keyword {
            "read-history" => Some(HistoryType::Read),
            "write-history" => Some(HistoryType::Write),
            "dirreq-read-history" => Some(HistoryType::DirreqRead),
            "dirreq-write-history" => Some(HistoryType::DirreqWrite),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryType::Read => "read-history",
            HistoryType::Write => "write-history",
            HistoryType::DirreqRead => "dirreq-read-history",
            HistoryType::DirreqWrite => "dirreq-write-history",
        }
    }
}

/// Bandwidth history samples keyed by history type and interval end.
pub type BandwidthHistory = BTreeMap<(HistoryType, NaiveDateTime), u64>;

/// Directory requests by country as seen by one directory on one day.
#[derive(Debug, Clone, PartialEq)]
pub struct DirreqObservation {
    /// Upper-case hex fingerprint of the reporting directory.
    pub directory: String,
    pub date: Option<NaiveDate>,
    /// Requests per two-letter country code; the total is stored under [`ALL_COUNTRIES`].
    pub requests: BTreeMap<String, i64>,
    /// The directory's expected share of all requests, in percent, as written.
    pub share: String,
}

impl DirreqObservation {
    /// Keeps only the given countries and the all-countries total.
    pub fn restricted_to(&self, countries: &BTreeSet<String>) -> DirreqObservation {
        let requests = self
            .requests
            .iter()
            .filter(|(country, _)| country.as_str() == ALL_COUNTRIES || countries.contains(*country))
            .map(|(country, count)| (country.clone(), *count))
            .collect();
        DirreqObservation {
            requests,
            ..self.clone()
        }
    }
}

/// A decoded extra-info descriptor.
#[derive(Debug, Clone)]
pub struct ExtraInfoDescriptor {
    /// Hex digest over the signed range, if it could be resolved.
    pub digest: Option<String>,
    pub nickname: String,
    /// Lower-case hex fingerprint.
    pub fingerprint: String,
    pub published: NaiveDateTime,
    pub bandwidth_history: BandwidthHistory,
    pub dirreq: Option<DirreqObservation>,
    pub raw: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_first_line() {
        assert_eq!(
            DocumentKind::classify("network-status-version 3"),
            Some(DocumentKind::Consensus)
        );
        assert_eq!(
            DocumentKind::classify("router moria1 128.31.0.34 9101 0 9131"),
            Some(DocumentKind::ServerDescriptor)
        );
        assert_eq!(
            DocumentKind::classify("extra-info moria1 9695DFC35FFEB861329B9F1AB04C46397020CE31"),
            Some(DocumentKind::ExtraInfoDescriptor)
        );
        assert_eq!(DocumentKind::classify("network-status-version 2"), None);
        assert_eq!(DocumentKind::classify("bridge-pool-assignment 2022-04-09 00:29:37"), None);
    }

    #[test]
    fn test_raw_document_ignores_non_ascii() {
        let bytes = "router caf\u{e9} 1.2.3.4 9001 0 0\r\nplatform x\n".as_bytes();
        let doc = RawDocument::new(bytes);
        assert_eq!(doc.first_line(), Some("router caf 1.2.3.4 9001 0 0"));
        assert_eq!(doc.bytes(), bytes);
    }

    #[test]
    fn test_tallies_only_count_running() {
        let mut tallies = FlagTallies::default();
        let running: BTreeSet<String> = ["Running", "Exit", "Stable"].iter().map(|s| s.to_string()).collect();
        let not_running: BTreeSet<String> = ["Exit", "Fast"].iter().map(|s| s.to_string()).collect();
        tallies.count(&running);
        tallies.count(&not_running);
        assert_eq!(
            tallies,
            FlagTallies {
                exit: 1,
                fast: 0,
                guard: 0,
                running: 1,
                stable: 1,
            }
        );
    }

    #[test]
    fn test_observation_restricted_to_countries() {
        let obs = DirreqObservation {
            directory: "ABCD".to_string(),
            date: None,
            requests: [("us", 4), ("de", 4), ("fr", 12), (ALL_COUNTRIES, 20)]
                .iter()
                .map(|(c, n)| (c.to_string(), *n))
                .collect(),
            share: "1.00".to_string(),
        };
        let countries: BTreeSet<String> = ["us", "de"].iter().map(|s| s.to_string()).collect();
        let restricted = obs.restricted_to(&countries);
        assert_eq!(restricted.requests.len(), 3);
        assert!(!restricted.requests.contains_key("fr"));
        assert_eq!(restricted.requests[ALL_COUNTRIES], 20);
    }
}
