use std::time::Duration;

pub type Result<T> = std::result::Result<T, Error>;

/// Stable, low-cardinality label for a failed request. Used as the transport-error
/// marker inside a [`crate::RequestOutcome`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum TransportErrorKind {
    InvalidUrl,
    UnsupportedScheme,
    RequestBuild,
    HeaderName,
    HeaderValue,
    Connect,
    Request,
    Timeout,
    BodyRead,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("only http:// and https:// URLs are supported: {0}")]
    UnsupportedScheme(String),

    #[error("http request build failed: {0}")]
    RequestBuild(#[from] http::Error),

    #[error("invalid http header name: {0}")]
    HeaderName(#[from] http::header::InvalidHeaderName),

    #[error("invalid http header value: {0}")]
    HeaderValue(#[from] http::header::InvalidHeaderValue),

    #[error("http request failed: {0}")]
    Request(#[from] hyper_util::client::legacy::Error),

    #[error("http request timed out after {0:?}")]
    Timeout(Duration),

    #[error("failed to read response body: {0}")]
    BodyRead(#[from] hyper::Error),
}

impl Error {
    #[must_use]
    pub fn transport_error_kind(&self) -> TransportErrorKind {
        match self {
            Self::InvalidUrl(_) => TransportErrorKind::InvalidUrl,
            Self::UnsupportedScheme(_) => TransportErrorKind::UnsupportedScheme,
            Self::RequestBuild(_) => TransportErrorKind::RequestBuild,
            Self::HeaderName(_) => TransportErrorKind::HeaderName,
            Self::HeaderValue(_) => TransportErrorKind::HeaderValue,
            Self::Request(err) if err.is_connect() => TransportErrorKind::Connect,
            Self::Request(_) => TransportErrorKind::Request,
            Self::Timeout(_) => TransportErrorKind::Timeout,
            Self::BodyRead(_) => TransportErrorKind::BodyRead,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_render_snake_case() {
        assert_eq!(TransportErrorKind::InvalidUrl.to_string(), "invalid_url");
        assert_eq!(TransportErrorKind::BodyRead.to_string(), "body_read");
        assert_eq!(
            "timeout".parse::<TransportErrorKind>().ok(),
            Some(TransportErrorKind::Timeout)
        );
    }

    #[test]
    fn timeout_error_maps_to_timeout_kind() {
        let err = Error::Timeout(Duration::from_millis(5));
        assert_eq!(err.transport_error_kind(), TransportErrorKind::Timeout);
    }
}
