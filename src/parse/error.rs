//! Error types for decoding relay descriptors.

/// Error that occurred while decoding a relay descriptor.
///
/// These errors never leave the parser: it logs them and skips the offending line,
/// entry, or document.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("document is empty")]
    Empty,
    #[error("line '{keyword}' is missing its {field} field")]
    MissingField {
        keyword: String,
        field: &'static str,
    },
    #[error("required '{keyword}' line not found")]
    MissingLine { keyword: &'static str },
    #[error("could not parse integer '{raw}' in {context}")]
    InvalidInt { raw: String, context: String },
    #[error("could not parse timestamp '{raw}'")]
    InvalidTimestamp { raw: String },
    #[error("could not decode '{raw}' as a 20-byte base64 value")]
    InvalidBase64 { raw: String },
    #[error("invalid IPv4 address '{raw}'")]
    InvalidAddress { raw: String },
    #[error("signed range '{start}'...'{end}' not found")]
    UnresolvedDigest {
        start: &'static str,
        end: &'static str,
    },
    #[error("malformed {context}: '{raw}'")]
    Malformed { context: &'static str, raw: String },
}
