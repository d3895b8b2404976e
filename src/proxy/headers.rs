//! Response header allow-list.
//!
//! Only headers a browser needs for range playback and caching leave the
//! proxy. Storage-internal metadata (`x-amz-*`, `server`, cookies...) stays
//! behind.

/// Upstream response headers relayed to the client.
pub const ALLOWED_RESPONSE_HEADERS: [&str; 8] = [
    "content-type",
    "content-length",
    "accept-ranges",
    "content-range",
    "etag",
    "last-modified",
    "cache-control",
    "content-disposition",
];

/// Keeps the allow-listed subset of `upstream`, in allow-list order.
///
/// Names come out lowercase. Repeated headers are folded into one
/// comma-separated value. Headers missing upstream or sent with an empty
/// value are omitted. Values are copied as raw bytes.
pub fn filter_headers<V: AsRef<[u8]>>(upstream: &[(String, V)]) -> Vec<(String, Vec<u8>)> {
    let mut filtered = Vec::new();

    for name in ALLOWED_RESPONSE_HEADERS {
        let values: Vec<&[u8]> = upstream
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_ref().trim_ascii())
            .filter(|v| !v.is_empty())
            .collect();

        if values.is_empty() {
            continue;
        }

        filtered.push((name.to_string(), values.join(&b", "[..])));
    }

    filtered
}
