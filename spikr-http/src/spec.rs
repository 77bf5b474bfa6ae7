use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::Serialize;

/// Expected-status assertion attached to a request, e.g. `"enroll queued 200"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusCheck {
    pub name: Arc<str>,
    pub expected_status: u16,
}

/// One HTTP request produced by a workload iteration.
///
/// Specs are immutable once handed to the scheduler; the builder methods consume `self`.
#[derive(Debug, Clone)]
pub struct RequestSpec {
    pub method: http::Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Bytes>,
    /// Metric grouping key. Defaults to the URL path.
    pub name: Option<Arc<str>>,
    /// Overrides the issuer's default request timeout.
    pub timeout: Option<Duration>,
    pub check: Option<StatusCheck>,
}

impl RequestSpec {
    pub fn new(method: http::Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: None,
            name: None,
            timeout: None,
            check: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(http::Method::GET, url)
    }

    pub fn post(url: impl Into<String>, body: impl Into<Bytes>) -> Self {
        let mut spec = Self::new(http::Method::POST, url);
        spec.body = Some(body.into());
        spec
    }

    /// POST with a JSON body and `content-type: application/json`.
    pub fn post_json<T: Serialize + ?Sized>(
        url: impl Into<String>,
        value: &T,
    ) -> serde_json::Result<Self> {
        let body = serde_json::to_vec(value)?;
        Ok(Self::post(url, body).with_header("content-type", "application/json"))
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<Arc<str>>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn with_check(mut self, name: impl Into<Arc<str>>, expected_status: u16) -> Self {
        self.check = Some(StatusCheck {
            name: name.into(),
            expected_status,
        });
        self
    }

    pub fn body_len(&self) -> u64 {
        self.body.as_ref().map_or(0, |b| b.len() as u64)
    }

    /// Name used to group this request in statistics.
    pub fn metric_name(&self) -> Arc<str> {
        if let Some(name) = &self.name {
            return name.clone();
        }

        match url::Url::parse(&self.url) {
            Ok(parsed) => Arc::from(parsed.path()),
            Err(_) => Arc::from(self.url.as_str()),
        }
    }
}
