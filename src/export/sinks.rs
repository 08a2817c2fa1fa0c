use crate::parse::{
    DirreqObservation, ExtraInfoDescriptor, FlagTallies, NetworkStatusDocument, RouterStatusEntry,
    ServerDescriptor,
};
use chrono::NaiveDateTime;
use std::sync::{Arc, Mutex, PoisonError};

/// Stores raw descriptors in a directory archive.
pub trait ArchiveSink {
    fn store_consensus(&mut self, raw: &[u8], valid_after: NaiveDateTime);
    fn store_vote(&mut self, raw: &[u8], valid_after: NaiveDateTime, authority: &str, digest: &str);
    fn store_server_descriptor(&mut self, raw: &[u8], digest: &str, published: NaiveDateTime);
    fn store_extra_info_descriptor(&mut self, raw: &[u8], digest: &str, published: NaiveDateTime);
}

/// Receives fully decoded descriptors for database import.
pub trait DatabaseSink {
    fn add_consensus(&mut self, consensus: &NetworkStatusDocument);
    fn add_vote(&mut self, vote: &NetworkStatusDocument);
    fn add_status_entry(&mut self, valid_after: NaiveDateTime, entry: &RouterStatusEntry);
    fn add_server_descriptor(&mut self, descriptor: &ServerDescriptor);
    fn add_extra_info_descriptor(&mut self, descriptor: &ExtraInfoDescriptor);
}

/// Accumulates relay flag tallies per consensus.
pub trait ConsensusStatsSink {
    fn add_consensus_results(&mut self, valid_after: NaiveDateTime, tallies: FlagTallies);
}

/// Accumulates hashed relay identities, used to tell relays apart from bridges.
pub trait BridgeStatsSink {
    fn add_hashed_relay(&mut self, hashed_identity: &str);
}

/// Accumulates directory request observations.
pub trait DirreqStatsSink {
    fn add_obs(&mut self, observation: DirreqObservation);
}

/// Checks the health of the network status documents we see.
pub trait HealthSink {
    fn process_consensus(&mut self, valid_after: NaiveDateTime, raw: &[u8]);
    fn process_vote(&mut self, valid_after: NaiveDateTime, dir_source: &str, raw: &[u8]);
}

// Shared sinks let the caller keep a handle to read results back after parsing.

impl<T: ArchiveSink> ArchiveSink for Arc<Mutex<T>> {
    fn store_consensus(&mut self, raw: &[u8], valid_after: NaiveDateTime) {
        lock(self).store_consensus(raw, valid_after)
    }

    fn store_vote(&mut self, raw: &[u8], valid_after: NaiveDateTime, authority: &str, digest: &str) {
        lock(self).store_vote(raw, valid_after, authority, digest)
    }

    fn store_server_descriptor(&mut self, raw: &[u8], digest: &str, published: NaiveDateTime) {
        lock(self).store_server_descriptor(raw, digest, published)
    }

    fn store_extra_info_descriptor(&mut self, raw: &[u8], digest: &str, published: NaiveDateTime) {
        lock(self).store_extra_info_descriptor(raw, digest, published)
    }
}

impl<T: DatabaseSink> DatabaseSink for Arc<Mutex<T>> {
    fn add_consensus(&mut self, consensus: &NetworkStatusDocument) {
        lock(self).add_consensus(consensus)
    }

    fn add_vote(&mut self, vote: &NetworkStatusDocument) {
        lock(self).add_vote(vote)
    }

    fn add_status_entry(&mut self, valid_after: NaiveDateTime, entry: &RouterStatusEntry) {
        lock(self).add_status_entry(valid_after, entry)
    }

    fn add_server_descriptor(&mut self, descriptor: &ServerDescriptor) {
        lock(self).add_server_descriptor(descriptor)
    }

    fn add_extra_info_descriptor(&mut self, descriptor: &ExtraInfoDescriptor) {
        lock(self).add_extra_info_descriptor(descriptor)
    }
}

impl<T: ConsensusStatsSink> ConsensusStatsSink for Arc<Mutex<T>> {
    fn add_consensus_results(&mut self, valid_after: NaiveDateTime, tallies: FlagTallies) {
        lock(self).add_consensus_results(valid_after, tallies)
    }
}

impl<T: BridgeStatsSink> BridgeStatsSink for Arc<Mutex<T>> {
    fn add_hashed_relay(&mut self, hashed_identity: &str) {
        lock(self).add_hashed_relay(hashed_identity)
    }
}

impl<T: DirreqStatsSink> DirreqStatsSink for Arc<Mutex<T>> {
    fn add_obs(&mut self, observation: DirreqObservation) {
        lock(self).add_obs(observation)
    }
}

impl<T: HealthSink> HealthSink for Arc<Mutex<T>> {
    fn process_consensus(&mut self, valid_after: NaiveDateTime, raw: &[u8]) {
        lock(self).process_consensus(valid_after, raw)
    }

    fn process_vote(&mut self, valid_after: NaiveDateTime, dir_source: &str, raw: &[u8]) {
        lock(self).process_vote(valid_after, dir_source, raw)
    }
}

/// Locks a shared sink. A panic in another holder does not invalidate what a sink
/// has collected, so poisoning is ignored.
pub fn lock<T>(shared: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}
