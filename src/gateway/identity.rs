//! Client identity extraction.

use http::HeaderMap;

/// Extract the client identity for a request.
///
/// The first comma-separated entry of `header_name` wins, trimmed. Without a
/// usable header value the host part of `remote_addr` is used, or the whole
/// address if it has no port. With neither, the identity is empty.
pub fn extract_identity(headers: &HeaderMap, header_name: &str, remote_addr: Option<&str>) -> String {
    let forwarded = headers
        .get(header_name)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());

    if let Some(identity) = forwarded {
        return identity.to_string();
    }

    remote_addr.map(host_part).unwrap_or_default().to_string()
}

/// Strip the port from `host:port` or `[v6]:port`.
fn host_part(addr: &str) -> &str {
    if let Some(rest) = addr.strip_prefix('[') {
        return match rest.split_once("]:") {
            Some((host, _)) => host,
            None => addr,
        };
    }

    match addr.split_once(':') {
        // More than one colon without brackets is a bare IPv6 address
        Some((host, port)) if !port.contains(':') => host,
        _ => addr,
    }
}
