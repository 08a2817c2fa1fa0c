use super::error::ParseError;
use super::types::DATE_TIME_FORMAT;
use chrono::NaiveDateTime;
use std::str::{FromStr, SplitWhitespace};

/// Cursor over the whitespace-separated fields of a single descriptor line.
///
/// The first field is taken as the line's keyword and is used to name the line in
/// errors. Every accessor reports a missing or unparsable field as a [`ParseError`]
/// rather than panicking on an out-of-range index.
pub(crate) struct LineCursor<'a> {
    keyword: &'a str,
    line: &'a str,
    fields: SplitWhitespace<'a>,
}

impl<'a> LineCursor<'a> {
    pub(crate) fn new(line: &'a str) -> Self {
        let mut fields = line.split_whitespace();
        let keyword = fields.next().unwrap_or("");
        LineCursor {
            keyword,
            line,
            fields,
        }
    }

    /// Creates a cursor for a line that begins with a multi-word keyword, such as
    /// `opt fingerprint`, skipping `words` fields in total.
    pub(crate) fn after_keyword(line: &'a str, words: usize) -> Self {
        let mut cursor = LineCursor::new(line);
        for _ in 1..words {
            cursor.fields.next();
        }
        cursor
    }

    pub(crate) fn keyword(&self) -> &'a str {
        self.keyword
    }

    pub(crate) fn next_field(&mut self, field: &'static str) -> Result<&'a str, ParseError> {
        self.fields.next().ok_or_else(|| ParseError::MissingField {
            keyword: self.keyword.to_string(),
            field,
        })
    }

    pub(crate) fn next_parsed<T: FromStr>(&mut self, field: &'static str) -> Result<T, ParseError> {
        let raw = self.next_field(field)?;
        raw.parse::<T>().map_err(|_| ParseError::InvalidInt {
            raw: raw.to_string(),
            context: format!("{} {}", self.keyword, field),
        })
    }

    /// Consumes a `YYYY-MM-DD HH:MM:SS` timestamp spread over two fields.
    pub(crate) fn next_timestamp(&mut self, field: &'static str) -> Result<NaiveDateTime, ParseError> {
        let date = self.next_field(field)?;
        let time = self.next_field(field)?;
        parse_timestamp(&format!("{} {}", date, time))
    }

    /// Returns the remaining fields joined by single spaces.
    pub(crate) fn rest(self) -> String {
        self.fields.collect::<Vec<_>>().join(" ")
    }

    /// Returns the untouched text after the keyword.
    pub(crate) fn raw_arguments(&self) -> &'a str {
        self.line
            .trim_start()
            .get(self.keyword.len()..)
            .map(|s| s.strip_prefix(' ').unwrap_or(s))
            .unwrap_or("")
    }
}

/// Parses a `YYYY-MM-DD HH:MM:SS` timestamp, interpreted as UTC.
pub(crate) fn parse_timestamp(raw: &str) -> Result<NaiveDateTime, ParseError> {
    NaiveDateTime::parse_from_str(raw.trim(), DATE_TIME_FORMAT).map_err(|_| {
        ParseError::InvalidTimestamp {
            raw: raw.to_string(),
        }
    })
}
