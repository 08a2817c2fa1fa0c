//! # Utility Functions for Relay Descriptors
//!
//! This module provides helpers shared by the parser and the downloader.
//!
//! ## Submodules
//!
//! - **digest**: SHA-1 digests over signed descriptor ranges and base64 identity decoding.
//! - **split**: Splitting concatenated descriptors into single documents.

mod digest;
mod split;

pub use digest::{compute_digest, decode_identity, hashed_relay_identity, is_fingerprint, IDENTITY_LEN};
pub use split::split_documents;
