//! # Parsing Relay Descriptors
//!
//! This module decodes the documents published by the Tor directory authorities:
//! network status consensuses and votes, server descriptors and extra-info descriptors.
//! Each document kind has its own single-pass decoder producing a typed record, and
//! [`RelayDescriptorParser`] dispatches raw documents to them and forwards the results
//! to whichever sinks are configured.
//!
//! ## Usage
//!
//! Build a [`RelayDescriptorParser`] with a [`ParserConfig`], attach sinks with its
//! `with_*` methods, and call [`RelayDescriptorParser::parse`] once per document.
//! Malformed input never surfaces as an error; it is logged and skipped.
//!
//! ## Submodules
//!
//! - **network_status**: Consensus and vote decoder.
//! - **server_descriptor**: Server descriptor decoder.
//! - **extra_info**: Extra-info descriptor decoder, including bandwidth histories and
//!   directory request statistics.
//! - **parser**: Dispatch and sink wiring.
//! - **types**: Decoded records shared with the other modules.

mod cursor;
mod error;
mod extra_info;
mod network_status;
mod parser;
mod server_descriptor;
mod types;

#[cfg(test)]
pub(crate) mod testdata;

pub use error::ParseError;
pub use parser::{DescriptorListener, ParserConfig, RelayDescriptorParser};
pub use types::{
    Bandwidth, BandwidthHistory, DirreqObservation, DocumentKind, ExtraInfoDescriptor, FlagTallies,
    HistoryType, NetworkStatusDocument, RawDocument, RouterStatusEntry, ServerDescriptor,
    ServerDescriptorRef, ALL_COUNTRIES, DATE_TIME_FORMAT,
};
