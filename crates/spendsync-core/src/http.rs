//! Blocking HTTP transport over a shared async client.
//!
//! Uses async reqwest on a shared tokio runtime but presents a sync
//! interface: uploads go out strictly one request at a time and each
//! call blocks until the round trip completes.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;
use std::time::Duration;

/// Connect timeout
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// The only status the remote service uses for an accepted request.
pub const SUCCESS_STATUS: u16 = 200;

/// Request never produced a usable HTTP response.
#[derive(Debug)]
pub enum TransportError {
    /// DNS, connect, TLS, reset or timeout before a status line arrived
    NoResponse(String),
    /// HTTP client could not be built (bad proxy, TLS backend)
    Client(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoResponse(msg) => write!(f, "no response received: {msg}"),
            Self::Client(msg) => write!(f, "HTTP client error: {msg}"),
        }
    }
}

impl std::error::Error for TransportError {}

impl TransportError {
    pub fn from_reqwest(e: &reqwest::Error) -> Self {
        if e.is_builder() {
            return Self::Client(e.to_string());
        }
        let kind = if e.is_timeout() {
            "timeout: "
        } else if e.is_connect() {
            "connect: "
        } else {
            ""
        };
        Self::NoResponse(format!("{kind}{e}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// Outgoing request. The password is never printed by `Debug`.
#[derive(Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub basic_auth: Option<(String, String)>,
    pub headers: Vec<(String, String)>,
    /// JSON body; sent with `content-type: application/json`
    pub body: Option<String>,
}

impl fmt::Debug for HttpRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpRequest")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("user", &self.basic_auth.as_ref().map(|(u, _)| u))
            .field("headers", &self.headers.iter().map(|(n, _)| n).collect::<Vec<_>>())
            .field("body_len", &self.body.as_ref().map(String::len))
            .finish()
    }
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            basic_auth: None,
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn post_json(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            basic_auth: None,
            headers: Vec::new(),
            body: Some(body.into()),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn basic_auth(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.basic_auth = Some((user.into(), password.into()));
        self
    }
}

/// Status, headers (lowercase names) and body text of a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

impl HttpReply {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn is_success(&self) -> bool {
        self.status == SUCCESS_STATUS
    }
}

/// One blocking request/response exchange.
pub trait Transport {
    fn send(&self, request: &HttpRequest) -> Result<HttpReply, TransportError>;
}

/// Join an endpoint base URL and a resource path with exactly one slash.
pub fn join_url(endpoint: &str, path: &str) -> String {
    format!(
        "{}/{}",
        endpoint.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Shared tokio runtime driving the async client.
pub static SHARED_RUNTIME: LazyLock<tokio::runtime::Runtime> = LazyLock::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()
        .expect("failed to build tokio runtime")
});

/// reqwest-backed [`Transport`].
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Build a client, optionally routed through `proxy` (`host:port` or a URL).
    pub fn new(proxy: Option<&str>) -> Result<Self, TransportError> {
        let mut builder = reqwest::Client::builder().connect_timeout(CONNECT_TIMEOUT);
        if let Some(proxy) = proxy.filter(|p| !p.is_empty()) {
            let url = if proxy.contains("://") {
                proxy.to_string()
            } else {
                format!("http://{proxy}")
            };
            let proxy = reqwest::Proxy::all(&url)
                .map_err(|e| TransportError::Client(format!("invalid proxy {url}: {e}")))?;
            log::debug!("routing requests through proxy {url}");
            builder = builder.proxy(proxy);
        }
        let client = builder
            .build()
            .map_err(|e| TransportError::Client(e.to_string()))?;
        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: &HttpRequest) -> Result<HttpReply, TransportError> {
        SHARED_RUNTIME.handle().block_on(async {
            let mut builder = match request.method {
                Method::Get => self.client.get(&request.url),
                Method::Post => self.client.post(&request.url),
            };
            if let Some((user, password)) = &request.basic_auth {
                builder = builder.basic_auth(user, Some(password));
            }
            for (name, value) in &request.headers {
                builder = builder.header(name.as_str(), value.as_str());
            }
            if let Some(body) = &request.body {
                builder = builder
                    .header(reqwest::header::CONTENT_TYPE, "application/json")
                    .body(body.clone());
            }

            let response = builder
                .send()
                .await
                .map_err(|e| TransportError::from_reqwest(&e))?;

            let status = response.status().as_u16();
            let headers = response
                .headers()
                .iter()
                .filter_map(|(name, value)| {
                    value
                        .to_str()
                        .ok()
                        .map(|v| (name.as_str().to_string(), v.to_string()))
                })
                .collect();
            // A status arrived, so the request reached the service; an
            // unreadable body is recorded rather than treated as no response.
            let body = match response.text().await {
                Ok(text) => text,
                Err(e) => {
                    log::warn!("failed to read response body (HTTP {status}): {e}");
                    format!("<unreadable response body: {e}>")
                }
            };

            Ok(HttpReply {
                status,
                headers,
                body,
            })
        })
    }
}
