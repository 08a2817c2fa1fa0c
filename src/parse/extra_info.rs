use super::cursor::{parse_timestamp, LineCursor};
use super::error::ParseError;
use super::server_descriptor::SIGNED_RANGE_END;
use super::types::{
    BandwidthHistory, DirreqObservation, ExtraInfoDescriptor, HistoryType, RawDocument, ALL_COUNTRIES,
};
use crate::utils::compute_digest;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use log::{debug, warn};
use std::collections::BTreeMap;

/// Start of the signed range of an extra-info descriptor.
pub const SIGNED_RANGE_START: &str = "extra-info ";

/// Largest accepted distance between a history's interval end and the publication time.
pub const MAX_HISTORY_SKEW: i64 = 7 * 24 * 60 * 60;

/// Padding that relays add to every reported per-country request count.
pub const REQUEST_COUNT_BIAS: i64 = 4;

/// Decodes an extra-info descriptor.
///
/// History lines are buffered and expanded once the whole descriptor has been read, so
/// their timestamps can be checked against the publication time wherever the
/// `published` line appears.
///
/// # Returns
///
/// * `Ok(ExtraInfoDescriptor)` - The decoded descriptor. Its digest is `None` if the
///   signed range could not be found.
/// * `Err(ParseError)` - The first line or the `published` line is unusable.
pub fn decode(raw: &RawDocument<'_>) -> Result<ExtraInfoDescriptor, ParseError> {
    let mut lines = raw.lines();
    let first_line = lines.next().ok_or(ParseError::Empty)?;
    let mut cursor = LineCursor::new(first_line);
    let nickname = cursor.next_field("nickname")?.to_string();
    let fingerprint = cursor.next_field("fingerprint")?.to_string();

    let mut published = None;
    let mut history_lines = Vec::new();
    let mut stats_end: Option<NaiveDate> = None;
    let mut v3_reqs: Option<&str> = None;
    let mut v3_share: Option<&str> = None;

    for line in lines {
        let cursor = LineCursor::new(line);
        match cursor.keyword() {
            "published" => published = Some(parse_timestamp(cursor.raw_arguments())?),
            keyword if HistoryType::from_keyword(keyword).is_some() => history_lines.push(line),
            "dirreq-stats-end" => {
                let mut cursor = cursor;
                match cursor.next_field("date").map(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d")) {
                    Ok(Ok(date)) => stats_end = Some(date),
                    _ => warn!("Ignoring malformed line '{}' of {}", line, fingerprint),
                }
            }
            "dirreq-v3-reqs" => {
                let args = cursor.raw_arguments().trim();
                if !args.is_empty() {
                    v3_reqs = Some(args);
                }
            }
            "dirreq-v3-share" => v3_share = Some(cursor.raw_arguments().trim()),
            _ => {}
        }
    }

    let published = published.ok_or(ParseError::MissingLine {
        keyword: "published",
    })?;

    let mut bandwidth_history = BandwidthHistory::new();
    for line in history_lines {
        if let Err(e) = expand_history(line, published, &mut bandwidth_history) {
            warn!("Skipping history line '{}' of {}: {}", line, fingerprint, e);
        }
    }

    let dirreq = match (v3_reqs, v3_share) {
        (Some(reqs), Some(share)) => match decode_requests(reqs) {
            Ok(requests) => Some(DirreqObservation {
                directory: fingerprint.to_uppercase(),
                date: stats_end,
                requests,
                share: share.trim_end_matches('%').to_string(),
            }),
            Err(e) => {
                warn!("Ignoring directory requests of {}: {}", fingerprint, e);
                None
            }
        },
        _ => None,
    };

    Ok(ExtraInfoDescriptor {
        digest: compute_digest(raw.bytes(), SIGNED_RANGE_START, SIGNED_RANGE_END),
        nickname,
        fingerprint: fingerprint.to_lowercase(),
        published,
        bandwidth_history,
        dirreq,
        raw: raw.bytes().to_vec(),
    })
}

/// Expands `<type> <date> <time> (<n> s) <v1>,...,<vk>` into one sample per interval.
///
/// The given time ends the interval of the last value, so values are assigned from the
/// last one backward, one interval length apart. Nothing is added unless every value
/// parses and the end time lies within [`MAX_HISTORY_SKEW`] of `published`.
fn expand_history(
    line: &str,
    published: NaiveDateTime,
    history: &mut BandwidthHistory,
) -> Result<(), ParseError> {
    let mut cursor = LineCursor::new(line);
    let history_type = HistoryType::from_keyword(cursor.keyword()).ok_or(ParseError::Malformed {
        context: "history type",
        raw: cursor.keyword().to_string(),
    })?;
    let interval_end = cursor.next_timestamp("interval end")?;
    let interval = cursor.next_field("interval")?;
    let interval = interval
        .strip_prefix('(')
        .and_then(|s| s.parse::<i64>().ok())
        .filter(|&seconds| seconds > 0)
        .ok_or_else(|| ParseError::Malformed {
            context: "history interval",
            raw: interval.to_string(),
        })?;
    let unit = cursor.next_field("interval unit")?;
    if unit != "s)" {
        return Err(ParseError::Malformed {
            context: "history interval unit",
            raw: unit.to_string(),
        });
    }
    let values = cursor.next_field("values")?;

    let skew = (published - interval_end).num_seconds().abs();
    if skew > MAX_HISTORY_SKEW {
        debug!(
            "Publication time {} and interval end {} in {} line differ by more than 7 days",
            published,
            interval_end,
            history_type.as_str()
        );
        return Err(ParseError::Malformed {
            context: "history interval end",
            raw: interval_end.to_string(),
        });
    }

    let values = values
        .split(',')
        .map(|v| {
            v.parse::<u64>().map_err(|_| ParseError::InvalidInt {
                raw: v.to_string(),
                context: history_type.as_str().to_string(),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let out_of_range = || ParseError::Malformed {
        context: "history interval",
        raw: format!("{} s", interval),
    };
    let step = Duration::try_seconds(interval).ok_or_else(out_of_range)?;
    let mut samples = Vec::with_capacity(values.len());
    let mut end = Some(interval_end);
    for value in values.into_iter().rev() {
        let at = end.ok_or_else(out_of_range)?;
        samples.push(((history_type, at), value));
        end = at.checked_sub_signed(step);
    }
    history.extend(samples);
    Ok(())
}

/// Decodes `cc=N,cc=N,...` request counts, subtracting the bias from every count and
/// summing them under [`ALL_COUNTRIES`].
///
/// Each entry is a two-letter country code followed by its count, optionally separated
/// by `=`.
fn decode_requests(reqs: &str) -> Result<BTreeMap<String, i64>, ParseError> {
    let mut requests = BTreeMap::new();
    let mut all: i64 = 0;
    for entry in reqs.split(',') {
        let malformed = || ParseError::Malformed {
            context: "dirreq-v3-reqs entry",
            raw: entry.to_string(),
        };
        let country = entry.get(..2).ok_or_else(malformed)?;
        let count = entry[2..].strip_prefix('=').unwrap_or(&entry[2..]);
        let count = count
            .parse::<i64>()
            .ok()
            .and_then(|count| count.checked_sub(REQUEST_COUNT_BIAS))
            .ok_or_else(malformed)?;
        all = all.checked_add(count).ok_or_else(malformed)?;
        requests.insert(country.to_string(), count);
    }
    requests.insert(ALL_COUNTRIES.to_string(), all);
    Ok(requests)
}
