//! Canonical request construction for SDK-HMAC-SHA256.
//!
//! The canonical request has four newline-separated parts:
//!
//! ```text
//! HTTPRequestMethod\n
//! CanonicalURI\n
//! CanonicalHeaders\n
//! SignedHeaders
//! ```
//!
//! Every header line of `CanonicalHeaders` is newline-terminated, so the
//! header block and the signed header list are separated by an empty line.

use std::collections::BTreeMap;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, percent_encode};

/// Characters percent-encoded in URI path segments.
///
/// All characters except the RFC 3986 unreserved set
/// (A-Z, a-z, 0-9, `-`, `_`, `.`, `~`) are encoded.
const URI_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Build the full canonical request string.
///
/// `headers` is every header carried by the request; all of them are signed.
///
/// # Examples
///
/// ```
/// use mepauth_sign::canonical::build_canonical_request;
///
/// let canonical = build_canonical_request(
///     "POST",
///     "/mepauth/v1/token",
///     &[("Host", "127.0.0.1:8080"), ("x-sdk-date", "20200101T000000Z")],
/// );
/// assert_eq!(
///     canonical,
///     "POST\n/mepauth/v1/token/\nhost:127.0.0.1:8080\nx-sdk-date:20200101T000000Z\n\nhost;x-sdk-date"
/// );
/// ```
#[must_use]
pub fn build_canonical_request(method: &str, path: &str, headers: &[(&str, &str)]) -> String {
    let canonical_uri = build_canonical_uri(path);
    let canonical_headers = build_canonical_headers(headers);
    let signed_headers = build_signed_headers_string(headers);

    format!("{method}\n{canonical_uri}\n{canonical_headers}\n{signed_headers}")
}

/// Build the canonical URI.
///
/// Each path segment is percent-decoded and re-encoded individually; empty,
/// `.` and `..` segments are kept as they are. The result always ends with `/`.
///
/// # Examples
///
/// ```
/// use mepauth_sign::canonical::build_canonical_uri;
///
/// assert_eq!(build_canonical_uri("/mepauth/v1/token"), "/mepauth/v1/token/");
/// assert_eq!(build_canonical_uri(""), "/");
/// ```
#[must_use]
pub fn build_canonical_uri(path: &str) -> String {
    let mut uri = path
        .split('/')
        .map(|segment| match segment {
            "" | "." | ".." => segment.to_owned(),
            _ => {
                // Decode first so an already-encoded path is not encoded twice.
                let decoded: Vec<u8> = percent_decode_str(segment).collect();
                percent_encode(&decoded, URI_ENCODE_SET).to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("/");

    if !uri.ends_with('/') {
        uri.push('/');
    }
    uri
}

/// Build the canonical header block.
///
/// Header names are lowercased; the values of one name are trimmed, sorted
/// and joined with `,`. Lines are sorted by their full `name:value` text and
/// each one is terminated by `\n`.
///
/// # Examples
///
/// ```
/// use mepauth_sign::canonical::build_canonical_headers;
///
/// let block = build_canonical_headers(&[("X-B", " 2 "), ("x-a", "1"), ("X-B", "1")]);
/// assert_eq!(block, "x-a:1\nx-b:1,2\n");
/// ```
#[must_use]
pub fn build_canonical_headers(headers: &[(&str, &str)]) -> String {
    let mut header_map: BTreeMap<String, Vec<&str>> = BTreeMap::new();
    for (name, value) in headers {
        header_map
            .entry(name.to_ascii_lowercase())
            .or_default()
            .push(value.trim());
    }

    let mut lines: Vec<String> = header_map
        .into_iter()
        .map(|(name, mut values)| {
            values.sort_unstable();
            format!("{name}:{}", values.join(","))
        })
        .collect();
    lines.sort_unstable();

    lines.iter().fold(String::new(), |mut block, line| {
        block.push_str(line);
        block.push('\n');
        block
    })
}

/// Build the signed header list: distinct lowercase names, sorted, joined by `;`.
///
/// # Examples
///
/// ```
/// use mepauth_sign::canonical::build_signed_headers_string;
///
/// assert_eq!(
///     build_signed_headers_string(&[("X-Sdk-Date", "d"), ("Host", "h"), ("Content-Type", "json")]),
///     "content-type;host;x-sdk-date"
/// );
/// ```
#[must_use]
pub fn build_signed_headers_string(headers: &[(&str, &str)]) -> String {
    let mut names: Vec<String> = headers
        .iter()
        .map(|(name, _)| name.to_ascii_lowercase())
        .collect();
    names.sort_unstable();
    names.dedup();
    names.join(";")
}
