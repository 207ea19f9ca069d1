/// Normalizes one metric name segment.
///
/// Lowercases and replaces ASCII spaces with `-`. Everything else is kept,
/// so `CodeHeap 'non-nmethods'` becomes `codeheap-'non-nmethods'`.
pub fn normalize(segment: &str) -> String {
    segment.to_lowercase().replace(' ', "-")
}

/// Joins `prefix` and the normalized `parts` with `.`.
///
/// The prefix is used verbatim. Empty segments are kept, so an empty prefix
/// yields a name starting with `.`.
pub fn metric_name(prefix: &str, parts: &[&str]) -> String {
    let mut rv = String::from(prefix);
    for part in parts {
        rv.push('.');
        rv.push_str(&normalize(part));
    }
    rv
}
