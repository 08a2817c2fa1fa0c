use super::cursor::LineCursor;
use super::error::ParseError;
use super::types::{Bandwidth, RawDocument, ServerDescriptor};
use crate::utils::compute_digest;
use chrono::NaiveDateTime;
use log::warn;

/// Start of the signed range of a server descriptor.
pub const SIGNED_RANGE_START: &str = "router ";
/// End of the signed range of a server or extra-info descriptor, inclusive.
pub const SIGNED_RANGE_END: &str = "\nrouter-signature\n";

/// Decodes a server descriptor.
///
/// Collects the `router`, `platform`, `published`, `fingerprint`, `bandwidth`,
/// `extra-info-digest` and `uptime` lines; the last three also accept their legacy
/// `opt`-prefixed spelling. Optional lines that fail to parse are logged and ignored.
///
/// # Returns
///
/// * `Ok(ServerDescriptor)` - The decoded descriptor.
/// * `Err(ParseError)` - The `router` or `published` line is unusable, or the signed
///   range for the digest cannot be found.
pub fn decode(raw: &RawDocument<'_>) -> Result<ServerDescriptor, ParseError> {
    let mut lines = raw.lines();
    let router_line = lines.next().ok_or(ParseError::Empty)?;
    let mut cursor = LineCursor::new(router_line);
    let nickname = cursor.next_field("nickname")?.to_string();
    let address = cursor.next_field("address")?.to_string();
    let or_port = cursor.next_parsed::<u16>("orport")?;
    let _socks_port = cursor.next_field("socksport")?;
    let dir_port = cursor.next_parsed::<u16>("dirport")?;

    let mut platform = None;
    let mut published: Option<NaiveDateTime> = None;
    let mut fingerprint = None;
    let mut bandwidth = None;
    let mut extra_info_digest = None;
    let mut uptime = None;

    for line in lines {
        let line = line.strip_prefix("opt ").unwrap_or(line);
        let cursor = LineCursor::new(line);
        match cursor.keyword() {
            "platform" => platform = Some(cursor.raw_arguments().to_string()),
            "published" => {
                published = Some(LineCursor::new(line).next_timestamp("published")?);
            }
            "fingerprint" => {
                let hex: String = cursor.rest().chars().filter(|c| !c.is_whitespace()).collect();
                fingerprint = Some(hex.to_lowercase());
            }
            "bandwidth" => match decode_bandwidth(line) {
                Ok(value) => bandwidth = Some(value),
                Err(e) => warn!("Ignoring bandwidth of {}: {}", nickname, e),
            },
            "extra-info-digest" => {
                let mut cursor = cursor;
                match cursor.next_field("digest") {
                    Ok(digest) => extra_info_digest = Some(digest.to_lowercase()),
                    Err(e) => warn!("Ignoring extra-info-digest of {}: {}", nickname, e),
                }
            }
            "uptime" => {
                let mut cursor = cursor;
                match cursor.next_parsed::<u64>("seconds") {
                    Ok(seconds) => uptime = Some(seconds),
                    Err(e) => warn!("Ignoring uptime of {}: {}", nickname, e),
                }
            }
            _ => {}
        }
    }

    let published = published.ok_or(ParseError::MissingLine {
        keyword: "published",
    })?;
    let digest = compute_digest(raw.bytes(), SIGNED_RANGE_START, SIGNED_RANGE_END).ok_or(
        ParseError::UnresolvedDigest {
            start: SIGNED_RANGE_START,
            end: SIGNED_RANGE_END,
        },
    )?;

    Ok(ServerDescriptor {
        digest,
        nickname,
        address,
        or_port,
        dir_port,
        fingerprint,
        bandwidth,
        platform,
        published,
        uptime,
        extra_info_digest,
        raw: raw.bytes().to_vec(),
    })
}

fn decode_bandwidth(line: &str) -> Result<Bandwidth, ParseError> {
    let mut cursor = LineCursor::new(line);
    Ok(Bandwidth {
        average: cursor.next_parsed("average")?,
        burst: cursor.next_parsed("burst")?,
        observed: cursor.next_parsed("observed")?,
    })
}
