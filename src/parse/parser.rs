use super::types::{
    DocumentKind, ExtraInfoDescriptor, NetworkStatusDocument, RawDocument, ServerDescriptor,
    ServerDescriptorRef,
};
use super::{extra_info, network_status, server_descriptor};
use crate::export::{
    ArchiveSink, BridgeStatsSink, ConsensusStatsSink, DatabaseSink, DirreqStatsSink, HealthSink,
};
use chrono::NaiveDateTime;
use log::{debug, warn};
use std::collections::{BTreeMap, BTreeSet};

/// Receives the references between documents as they are parsed.
///
/// Implemented by the downloader to learn which documents are still missing.
pub trait DescriptorListener {
    fn notify_parsed_consensus(
        &mut self,
        valid_after: NaiveDateTime,
        dir_sources: &BTreeSet<String>,
        descriptors: &BTreeSet<ServerDescriptorRef>,
    );

    fn notify_parsed_vote(
        &mut self,
        valid_after: NaiveDateTime,
        authority: &str,
        descriptors: &BTreeSet<ServerDescriptorRef>,
    );

    fn notify_parsed_server_descriptor(
        &mut self,
        published: NaiveDateTime,
        fingerprint: Option<&str>,
        digest: &str,
        extra_info_digest: Option<&str>,
    );

    fn notify_parsed_extra_info_descriptor(
        &mut self,
        published: NaiveDateTime,
        fingerprint: &str,
        digest: &str,
    );
}

/// What the parser keeps and forwards.
#[derive(Debug, Clone, Default)]
pub struct ParserConfig {
    /// Two-letter country codes whose request counts are kept.
    pub countries: BTreeSet<String>,
    /// Upper-case fingerprints of directories whose request statistics are kept.
    pub directories: BTreeSet<String>,
}

/// Parses relay descriptors and hands the results to the configured sinks.
///
/// Every sink is optional; a document is still decoded when no sink wants it, so the
/// listener and the parse counters stay accurate.
#[derive(Default)]
pub struct RelayDescriptorParser {
    config: ParserConfig,
    archive: Option<Box<dyn ArchiveSink>>,
    database: Option<Box<dyn DatabaseSink>>,
    consensus_stats: Option<Box<dyn ConsensusStatsSink>>,
    bridge_stats: Option<Box<dyn BridgeStatsSink>>,
    dirreq_stats: Option<Box<dyn DirreqStatsSink>>,
    health: Option<Box<dyn HealthSink>>,
    listener: Option<Box<dyn DescriptorListener>>,
    parsed: BTreeMap<DocumentKind, usize>,
}

impl RelayDescriptorParser {
    pub fn new(config: ParserConfig) -> Self {
        RelayDescriptorParser {
            config,
            ..Default::default()
        }
    }

    pub fn with_archive(mut self, sink: impl ArchiveSink + 'static) -> Self {
        self.archive = Some(Box::new(sink));
        self
    }

    pub fn with_database(mut self, sink: impl DatabaseSink + 'static) -> Self {
        self.database = Some(Box::new(sink));
        self
    }

    pub fn with_consensus_stats(mut self, sink: impl ConsensusStatsSink + 'static) -> Self {
        self.consensus_stats = Some(Box::new(sink));
        self
    }

    pub fn with_bridge_stats(mut self, sink: impl BridgeStatsSink + 'static) -> Self {
        self.bridge_stats = Some(Box::new(sink));
        self
    }

    pub fn with_dirreq_stats(mut self, sink: impl DirreqStatsSink + 'static) -> Self {
        self.dirreq_stats = Some(Box::new(sink));
        self
    }

    pub fn with_health(mut self, sink: impl HealthSink + 'static) -> Self {
        self.health = Some(Box::new(sink));
        self
    }

    /// Attaches the listener that learns about document references.
    ///
    /// The downloader is created after the parser, so this takes `&mut self`.
    pub fn set_listener(&mut self, listener: impl DescriptorListener + 'static) {
        self.listener = Some(Box::new(listener));
    }

    /// Number of documents parsed so far, by kind.
    pub fn parsed_counts(&self) -> &BTreeMap<DocumentKind, usize> {
        &self.parsed
    }

    /// Parses one document and forwards it to the sinks.
    ///
    /// Never fails: a document that cannot be decoded is logged and dropped, and a
    /// document of unknown kind is ignored.
    pub fn parse(&mut self, bytes: &[u8]) {
        let raw = RawDocument::new(bytes);
        let Some(first_line) = raw.first_line() else {
            debug!("Ignoring empty document");
            return;
        };
        match DocumentKind::classify(first_line) {
            Some(DocumentKind::Consensus | DocumentKind::Vote) => match network_status::decode(&raw) {
                Ok(document) if document.is_consensus() => self.emit_consensus(document),
                Ok(document) => self.emit_vote(document),
                Err(e) => warn!("Could not parse network status document: {}", e),
            },
            Some(DocumentKind::ServerDescriptor) => match server_descriptor::decode(&raw) {
                Ok(descriptor) => self.emit_server_descriptor(descriptor),
                Err(e) => warn!("Could not parse server descriptor '{}': {}", first_line, e),
            },
            Some(DocumentKind::ExtraInfoDescriptor) => match extra_info::decode(&raw) {
                Ok(descriptor) => self.emit_extra_info_descriptor(descriptor),
                Err(e) => warn!("Could not parse extra-info descriptor '{}': {}", first_line, e),
            },
            None => debug!("Ignoring document starting with '{}'", first_line),
        }
    }

    fn count(&mut self, kind: DocumentKind) {
        *self.parsed.entry(kind).or_default() += 1;
    }

    fn emit_consensus(&mut self, consensus: NetworkStatusDocument) {
        self.count(DocumentKind::Consensus);
        debug!(
            "Parsed consensus valid after {} with {} entries",
            consensus.valid_after,
            consensus.entries.len()
        );
        if let Some(database) = self.database.as_mut() {
            database.add_consensus(&consensus);
            for entry in &consensus.entries {
                database.add_status_entry(consensus.valid_after, entry);
            }
        }
        if let Some(stats) = self.consensus_stats.as_mut() {
            stats.add_consensus_results(consensus.valid_after, consensus.tallies);
        }
        if let Some(bridge_stats) = self.bridge_stats.as_mut() {
            for hashed_identity in consensus.hashed_identities() {
                bridge_stats.add_hashed_relay(hashed_identity);
            }
        }
        if let Some(listener) = self.listener.as_mut() {
            listener.notify_parsed_consensus(
                consensus.valid_after,
                &consensus.dir_sources,
                &consensus.descriptor_refs(),
            );
        }
        if let Some(archive) = self.archive.as_mut() {
            archive.store_consensus(&consensus.raw, consensus.valid_after);
        }
        if let Some(health) = self.health.as_mut() {
            health.process_consensus(consensus.valid_after, &consensus.raw);
        }
    }

    fn emit_vote(&mut self, vote: NetworkStatusDocument) {
        let Some(authority) = vote.authority().map(str::to_string) else {
            warn!(
                "Vote valid after {} names no authority, ignoring it",
                vote.valid_after
            );
            return;
        };
        self.count(DocumentKind::Vote);
        debug!(
            "Parsed vote of {} valid after {} with {} entries",
            authority,
            vote.valid_after,
            vote.entries.len()
        );
        match (self.archive.as_mut(), vote.digest.as_deref()) {
            (Some(archive), Some(digest)) => {
                archive.store_vote(&vote.raw, vote.valid_after, &authority, digest)
            }
            (Some(_), None) => warn!(
                "Could not compute digest of vote of {} valid after {}, not archiving it",
                authority, vote.valid_after
            ),
            _ => {}
        }
        if let Some(database) = self.database.as_mut() {
            database.add_vote(&vote);
        }
        if let Some(listener) = self.listener.as_mut() {
            listener.notify_parsed_vote(vote.valid_after, &authority, &vote.descriptor_refs());
        }
        if let Some(health) = self.health.as_mut() {
            health.process_vote(vote.valid_after, &authority, &vote.raw);
        }
    }

    fn emit_server_descriptor(&mut self, descriptor: ServerDescriptor) {
        self.count(DocumentKind::ServerDescriptor);
        if let Some(archive) = self.archive.as_mut() {
            archive.store_server_descriptor(&descriptor.raw, &descriptor.digest, descriptor.published);
        }
        if let Some(listener) = self.listener.as_mut() {
            listener.notify_parsed_server_descriptor(
                descriptor.published,
                descriptor.fingerprint.as_deref(),
                &descriptor.digest,
                descriptor.extra_info_digest.as_deref(),
            );
        }
        if let Some(database) = self.database.as_mut() {
            database.add_server_descriptor(&descriptor);
        }
    }

    fn emit_extra_info_descriptor(&mut self, descriptor: ExtraInfoDescriptor) {
        self.count(DocumentKind::ExtraInfoDescriptor);
        if let (Some(stats), Some(observation)) = (self.dirreq_stats.as_mut(), &descriptor.dirreq) {
            if self.config.directories.contains(&observation.directory) {
                stats.add_obs(observation.restricted_to(&self.config.countries));
            }
        }
        let Some(digest) = descriptor.digest.as_deref() else {
            warn!(
                "Could not compute digest of extra-info descriptor of {}, not storing it",
                descriptor.fingerprint
            );
            return;
        };
        if let Some(archive) = self.archive.as_mut() {
            archive.store_extra_info_descriptor(&descriptor.raw, digest, descriptor.published);
        }
        if let Some(listener) = self.listener.as_mut() {
            listener.notify_parsed_extra_info_descriptor(
                descriptor.published,
                &descriptor.fingerprint,
                digest,
            );
        }
        if let Some(database) = self.database.as_mut() {
            database.add_extra_info_descriptor(&descriptor);
        }
    }
}
