use crate::parse::ParseError;
use sha1::{Digest, Sha1};

/// Length in bytes of a relay identity or descriptor digest.
pub const IDENTITY_LEN: usize = 20;

/// Computes the digest of the signed part of a descriptor.
///
/// The signed part starts at the first occurrence of `start_token` and ends
/// right after the first occurrence of `end_token`. Both searches operate on
/// the raw bytes so that non-ASCII content elsewhere in the document does not
/// shift the range.
///
/// # Arguments
///
/// * `raw` - The raw bytes of the document.
/// * `start_token` - Token marking the start of the signed range (e.g., "router ").
/// * `end_token` - Token marking the end of the signed range (e.g., "\nrouter-signature\n").
///
/// # Returns
///
/// The lower-case hexadecimal SHA-1 digest, or `None` if either token is missing or the
/// end token precedes the start token.
pub fn compute_digest(raw: &[u8], start_token: &str, end_token: &str) -> Option<String> {
    let start = find(raw, start_token.as_bytes())?;
    let end = find(raw, end_token.as_bytes())?;
    if end < start {
        return None;
    }
    let end = end + end_token.len();
    let mut hasher = Sha1::new();
    hasher.update(&raw[start..end]);
    Some(hex::encode(hasher.finalize()))
}

/// Decodes a base64 identity or digest field from a status entry.
///
/// Status entries omit the trailing `=` padding, which has to be restored before the
/// field can be decoded.
///
/// # Arguments
///
/// * `field` - The unpadded base64 field (e.g., "AAoQ1DAR6kkoo19hBAX5K0QztNw").
///
/// # Returns
///
/// * `Ok([u8; 20])` - The decoded bytes.
/// * `Err(ParseError)` - The field is not valid base64 or does not decode to 20 bytes.
pub fn decode_identity(field: &str) -> Result<[u8; IDENTITY_LEN], ParseError> {
    let mut padded = field.trim_end_matches('=').to_string();
    while padded.len() % 4 != 0 {
        padded.push('=');
    }
    let decoded = base64::decode(&padded).map_err(|_| ParseError::InvalidBase64 {
        raw: field.to_string(),
    })?;
    <[u8; IDENTITY_LEN]>::try_from(decoded.as_slice()).map_err(|_| ParseError::InvalidBase64 {
        raw: field.to_string(),
    })
}

/// Whether `value` is a relay or authority fingerprint: 40 hex characters.
pub fn is_fingerprint(value: &str) -> bool {
    value.len() == 2 * IDENTITY_LEN && value.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Hashes a relay identity once more, as used for anonymized bridge statistics.
///
/// Returns the upper-case hexadecimal SHA-1 digest of the raw identity bytes.
pub fn hashed_relay_identity(identity: &[u8; IDENTITY_LEN]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(identity);
    hex::encode_upper(hasher.finalize())
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DESCRIPTOR: &[u8] = b"@purpose general\nrouter test 10.0.0.1 9001 0 0\nplatform Tor\nrouter-signature\n-----BEGIN SIGNATURE-----\n";

    #[test]
    fn test_compute_digest_covers_signed_range() {
        let digest = compute_digest(DESCRIPTOR, "router ", "\nrouter-signature\n").unwrap();
        let mut hasher = Sha1::new();
        hasher.update(b"router test 10.0.0.1 9001 0 0\nplatform Tor\nrouter-signature\n");
        assert_eq!(digest, hex::encode(hasher.finalize()));
        assert_eq!(digest.len(), 40);
        assert_eq!(digest, digest.to_lowercase());
    }

    #[test]
    fn test_compute_digest_is_deterministic() {
        let first = compute_digest(DESCRIPTOR, "router ", "\nrouter-signature\n");
        let second = compute_digest(DESCRIPTOR, "router ", "\nrouter-signature\n");
        assert!(first.is_some());
        assert_eq!(first, second);
    }

    #[test]
    fn test_compute_digest_missing_or_misordered_tokens() {
        assert!(compute_digest(b"router x\n", "router ", "\nrouter-signature\n").is_none());
        assert!(compute_digest(b"platform\n", "router ", "platform").is_none());
        assert!(compute_digest(b"\nrouter-signature\nrouter x", "router ", "\nrouter-signature\n").is_none());
    }

    #[test]
    fn test_decode_identity_restores_padding() {
        // 20 bytes encode to 28 base64 characters, one of which is padding.
        let decoded = decode_identity("AAoQ1DAR6kkoo19hBAX5K0QztNw").unwrap();
        assert_eq!(decoded.len(), IDENTITY_LEN);
        assert_eq!(hex::encode(decoded), "000a10d43011ea4928a35f610405f92b4433b4dc");
        assert_eq!(decode_identity("AAoQ1DAR6kkoo19hBAX5K0QztNw=").unwrap(), decoded);
    }

    #[test]
    fn test_decode_identity_rejects_wrong_length() {
        assert!(decode_identity("AAAA").is_err());
        assert!(decode_identity("not*base64").is_err());
    }

    #[test]
    fn test_hashed_relay_identity_is_upper_case() {
        let hashed = hashed_relay_identity(&[0u8; IDENTITY_LEN]);
        assert_eq!(hashed, "6768033E216468247BD031A0A2D9876D79818F8F");
    }
}
