//! Header rewriting applied to forwarded requests and responses.

use std::net::IpAddr;

use hyper::header::{HeaderMap, HeaderName, HeaderValue, InvalidHeaderValue, CONNECTION};

/// `X-Forwarded-For`.
pub const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

/// Headers that only apply to a single transport hop.
pub const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Remove hop-by-hop headers, including any header listed in `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let named: Vec<String> = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(|name| name.trim().to_ascii_lowercase())
        .filter(|name| !name.is_empty())
        .collect();

    for name in &named {
        headers.remove(name.as_str());
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

/// Append `client` to `X-Forwarded-For`, folding prior values into one header.
///
/// Prior values that are not visible ASCII are dropped.
pub fn append_forwarded_for(
    headers: &mut HeaderMap,
    client: IpAddr,
) -> Result<(), InvalidHeaderValue> {
    let mut chain: Vec<String> = headers
        .get_all(&X_FORWARDED_FOR)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .map(str::to_string)
        .collect();
    chain.push(client.to_string());

    let value = HeaderValue::from_str(&chain.join(", "))?;
    headers.insert(X_FORWARDED_FOR, value);
    Ok(())
}
