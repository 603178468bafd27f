//! ETag handling for versioned participant resources
//!
//! Participants are versioned; reads return the version as a weak ETag (`W/"3"`) and
//! updates must send it back in `If-Match`.

use axum::http::{header, HeaderMap, HeaderValue};

use crate::{Error, Result};

/// Parse a weak ETag value into a version
///
/// # Examples
/// ```
/// use rdr::api::headers::parse_etag;
/// assert_eq!(parse_etag("W/\"3\""), Some(3));
/// assert_eq!(parse_etag("3"), None);
/// ```
pub fn parse_etag(etag: &str) -> Option<i32> {
    etag.trim()
        .strip_prefix("W/\"")?
        .strip_suffix('"')?
        .parse()
        .ok()
}

pub fn format_etag(version: i32) -> String {
    format!("W/\"{}\"", version)
}

/// The version a PUT expects to overwrite
pub fn require_if_match(headers: &HeaderMap) -> Result<i32> {
    let value = headers
        .get(header::IF_MATCH)
        .ok_or_else(|| Error::BadRequest("If-Match is missing for PUT request".to_string()))?;
    value
        .to_str()
        .ok()
        .and_then(parse_etag)
        .ok_or_else(|| Error::BadRequest(format!("Invalid If-Match header: {value:?}")))
}

pub fn etag_headers(version: i32) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(&format_etag(version)) {
        headers.insert(header::ETAG, value);
    }
    headers
}
