use bytes::Bytes;
use http_body_util::{BodyExt as _, Full};
use hyper::Request;
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use std::time::Duration;

use crate::estimate::{estimate_request_bytes, response_head_bytes};
use crate::util::{has_header, host_header_value, parse_target};
use crate::{Error, RequestSpec, Result};

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Bytes,
    /// Lowercased names, repeated values joined with `", "`.
    pub headers: Vec<(String, String)>,
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

/// Pooled HTTP/1.1 client shared by every worker of a run.
#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: Client<HttpsConnector<HttpConnector>, Full<Bytes>>,
    request_timeout: Duration,
}

impl Default for HttpClient {
    fn default() -> Self {
        // Without a connect timeout an unreachable target stalls each worker for the OS
        // default, which can outlast a short run.
        Self::new(Some(DEFAULT_CONNECT_TIMEOUT))
    }
}

impl HttpClient {
    #[must_use]
    pub fn new(connect_timeout: Option<Duration>) -> Self {
        let mut http_connector = HttpConnector::new();
        http_connector.enforce_http(false);
        http_connector.set_connect_timeout(connect_timeout);
        http_connector.set_nodelay(true);

        let https_connector = HttpsConnectorBuilder::new()
            .with_webpki_roots()
            .https_or_http()
            .enable_http1()
            .wrap_connector(http_connector);

        let inner = Client::builder(TokioExecutor::new()).build(https_connector);

        Self {
            inner,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Timeout for requests whose spec does not carry its own.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sends `spec` and reads the full body. The timeout covers the whole exchange.
    pub async fn request(&self, spec: &RequestSpec) -> Result<HttpResponse> {
        let timeout = spec.timeout.unwrap_or(self.request_timeout);
        match tokio::time::timeout(timeout, self.exchange(spec)).await {
            Ok(res) => res,
            Err(_) => Err(Error::Timeout(timeout)),
        }
    }

    async fn exchange(&self, spec: &RequestSpec) -> Result<HttpResponse> {
        let parsed = parse_target(&spec.url)?;
        let bytes_sent = estimate_request_bytes(spec)?;

        let uri: hyper::Uri = spec
            .url
            .parse()
            .map_err(|_| Error::InvalidUrl(spec.url.clone()))?;

        let mut builder = Request::builder().method(spec.method.clone()).uri(uri);

        // Implicit headers are made explicit so the byte estimate matches what is sent.
        if !has_header(&spec.headers, "host")
            && let Some(host) = host_header_value(&parsed)
        {
            builder = builder.header(http::header::HOST, host);
        }
        let body = spec.body.clone().unwrap_or_default();
        if !body.is_empty() && !has_header(&spec.headers, "content-length") {
            builder = builder.header(http::header::CONTENT_LENGTH, body.len());
        }

        for (k, v) in &spec.headers {
            let name = http::header::HeaderName::from_bytes(k.as_bytes())?;
            let value = http::header::HeaderValue::from_str(v)?;
            builder = builder.header(name, value);
        }

        let req: Request<Full<Bytes>> = builder.body(Full::new(body))?;
        let res = self.inner.request(req).await?;

        let (parts, body) = res.into_parts();
        let head_bytes = response_head_bytes(parts.version, parts.status, &parts.headers);

        let mut headers: Vec<(String, String)> = Vec::with_capacity(parts.headers.keys_len());
        for name in parts.headers.keys() {
            let joined = parts
                .headers
                .get_all(name)
                .iter()
                .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
                .collect::<Vec<_>>()
                .join(", ");
            headers.push((name.as_str().to_string(), joined));
        }

        let body = body.collect().await?.to_bytes();
        let bytes_received = head_bytes.saturating_add(body.len() as u64);

        Ok(HttpResponse {
            status: parts.status.as_u16(),
            body,
            headers,
            bytes_sent,
            bytes_received,
        })
    }
}
