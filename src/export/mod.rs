//! Destinations for parsed relay descriptors.
//!
//! The parser talks to its outputs only through the sink traits defined here, so each
//! output is optional and can be replaced in tests. This module also provides the
//! implementations used by the binary: a directory archive writer, a PostgreSQL
//! importer, and in-memory statistics accumulators.
//!
//! ## Submodules
//!
//! - **sinks**: The sink traits, plus forwarding implementations for shared sinks.
//! - **archive**: Writes raw documents into a dated directory layout.
//! - **postgres**: Buffers decoded records and exports them in one transaction.
//! - **stats**: Flag tallies, hashed relay identities, directory request counts, and
//!   network health.

mod archive;
mod postgres;
mod sinks;
mod stats;

pub use archive::ArchiveWriter;
pub use postgres::PostgresImporter;
pub use sinks::{
    lock, ArchiveSink, BridgeStatsSink, ConsensusStatsSink, DatabaseSink, DirreqStatsSink,
    HealthSink,
};
pub use stats::{BridgeStats, ConsensusStats, DirreqStats, NetworkHealth, MAX_CONSENSUS_AGE};
