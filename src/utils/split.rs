/// Keywords that begin a descriptor which may be concatenated with others of its kind.
const CONCATENATED_KEYWORDS: [&[u8]; 2] = [b"router ", b"extra-info "];

/// Splits a buffer of concatenated descriptors into single documents.
///
/// Directory authorities answer digest lookups with all requested descriptors in one
/// body, and Tor's `cached-descriptors` and `cached-extrainfo` files store them the same
/// way, each one possibly preceded by `@` annotation lines. Leading annotations are
/// skipped. If the first document is a server or extra-info descriptor, the buffer is
/// cut at every line that starts with the same keyword; anything else is returned as a
/// single document.
pub fn split_documents(raw: &[u8]) -> Vec<&[u8]> {
    let raw = skip_annotations(raw);
    if raw.is_empty() {
        return Vec::new();
    }
    let keyword = match CONCATENATED_KEYWORDS.iter().find(|k| raw.starts_with(k)) {
        Some(keyword) => *keyword,
        None => return vec![raw],
    };

    let mut starts = vec![0];
    let mut pos = 0;
    while let Some(offset) = raw[pos..].iter().position(|&b| b == b'\n') {
        let line_start = pos + offset + 1;
        if raw[line_start..].starts_with(keyword) {
            starts.push(line_start);
        }
        pos = line_start;
    }

    let mut documents = Vec::with_capacity(starts.len());
    for (i, &start) in starts.iter().enumerate() {
        let end = starts.get(i + 1).copied().unwrap_or(raw.len());
        documents.push(&raw[start..end]);
    }
    documents
}

fn skip_annotations(mut raw: &[u8]) -> &[u8] {
    while raw.first() == Some(&b'@') {
        match raw.iter().position(|&b| b == b'\n') {
            Some(newline) => raw = &raw[newline + 1..],
            None => return &[],
        }
    }
    raw
}
