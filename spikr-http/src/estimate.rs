use crate::util::{has_header, host_header_value, parse_target};
use crate::{RequestSpec, Result};

/// Best-effort HTTP/1.1 size of `spec` on the wire: request line, headers, blank line, body.
///
/// `Host` and `Content-Length` are counted even when the request leaves them implicit, since the
/// client always sends them.
pub fn estimate_request_bytes(spec: &RequestSpec) -> Result<u64> {
    let parsed = parse_target(&spec.url)?;
    let body_len = spec.body_len();

    let target = match parsed.query() {
        Some(query) => format!("{}?{query}", parsed.path()),
        None => parsed.path().to_string(),
    };

    // "METHOD SP target SP HTTP/1.1 CRLF"
    let mut bytes = (spec.method.as_str().len() + 1 + target.len() + 1 + "HTTP/1.1".len() + 2) as u64;

    for (k, v) in &spec.headers {
        bytes = bytes.saturating_add(header_line_bytes(k.as_bytes(), v.as_bytes()));
    }

    if !has_header(&spec.headers, "host")
        && let Some(host) = host_header_value(&parsed)
    {
        bytes = bytes.saturating_add(header_line_bytes(b"host", host.as_bytes()));
    }

    if body_len != 0 && !has_header(&spec.headers, "content-length") {
        let v = body_len.to_string();
        bytes = bytes.saturating_add(header_line_bytes(b"content-length", v.as_bytes()));
    }

    Ok(bytes.saturating_add(2).saturating_add(body_len))
}

/// Status line plus headers plus the terminating CRLF. The reason phrase is ignored.
pub(crate) fn response_head_bytes(
    version: http::Version,
    status: http::StatusCode,
    headers: &http::HeaderMap,
) -> u64 {
    let version_len = match version {
        http::Version::HTTP_2 => "HTTP/2".len(),
        http::Version::HTTP_3 => "HTTP/3".len(),
        _ => "HTTP/1.1".len(),
    } as u64;

    let status_line = version_len
        .saturating_add(1)
        .saturating_add(status.as_str().len() as u64)
        .saturating_add(2);

    headers
        .iter()
        .map(|(name, value)| header_line_bytes(name.as_str().as_bytes(), value.as_bytes()))
        .fold(status_line, u64::saturating_add)
        .saturating_add(2)
}

fn header_line_bytes(name: &[u8], value: &[u8]) -> u64 {
    // "name: value\r\n"
    (name.len() + 2 + value.len() + 2) as u64
}
