//! Relay Descriptors Library
//!
//! This library reads Tor relay descriptors (consensuses, votes, server descriptors and
//! extra-info descriptors) from local directories and from the directory authorities,
//! parses them, and hands the results to archive, database and statistics sinks. A
//! persisted ledger remembers which referenced documents are still missing so they can
//! be downloaded.
//!

pub mod config;
pub mod export;
pub mod fetch;
pub mod parse;
pub mod utils;
