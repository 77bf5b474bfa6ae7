use crate::{Error, Result};

pub(crate) fn has_header(headers: &[(String, String)], name: &str) -> bool {
    headers.iter().any(|(k, _)| k.eq_ignore_ascii_case(name))
}

/// `Host` value as hyper would send it: the port is omitted when it is the scheme default.
pub(crate) fn host_header_value(parsed: &url::Url) -> Option<String> {
    let host = parsed.host_str()?;
    match parsed.port() {
        Some(port) => Some(format!("{host}:{port}")),
        None => Some(host.to_string()),
    }
}

/// Parses `raw` and rejects anything that is not `http` or `https`.
pub(crate) fn parse_target(raw: &str) -> Result<url::Url> {
    let parsed = url::Url::parse(raw).map_err(|_| Error::InvalidUrl(raw.to_string()))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        _ => Err(Error::UnsupportedScheme(raw.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_header_keeps_explicit_port() {
        let parsed = parse_target("http://localhost:8080/lb").unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(host_header_value(&parsed).as_deref(), Some("localhost:8080"));

        let default_port = parse_target("https://example.com:443/").unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(host_header_value(&default_port).as_deref(), Some("example.com"));
    }

    #[test]
    fn rejects_non_http_schemes() {
        assert!(matches!(
            parse_target("ftp://example.com/"),
            Err(Error::UnsupportedScheme(_))
        ));
        assert!(matches!(parse_target("not a url"), Err(Error::InvalidUrl(_))));
    }

    #[test]
    fn header_lookup_ignores_case() {
        let headers = vec![("Content-Type".to_string(), "application/json".to_string())];
        assert!(has_header(&headers, "content-type"));
        assert!(!has_header(&headers, "content-length"));
    }
}
