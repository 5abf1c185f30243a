//! Request and response snapshots exchanged between the page, the caches and
//! the network.

use bytes::Bytes;
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// How the page issued a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RequestMode {
    /// Top-level document navigation.
    Navigate,
    /// Sub-resource restricted to the page's origin.
    SameOrigin,
    /// Cross-origin sub-resource with CORS.
    #[default]
    Cors,
    /// Cross-origin sub-resource without CORS (yields opaque responses).
    NoCors,
}

/// Classification of a response relative to the controlled origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ResponseType {
    /// Same-origin response with readable body and headers.
    #[default]
    Basic,
    /// Cross-origin response that passed CORS.
    Cors,
    /// Cross-origin response whose contents are hidden from the page.
    Opaque,
    /// Synthetic network error.
    Error,
}

/// An outgoing request from the controlled scope.
#[derive(Debug, Clone)]
pub struct Request {
    /// Upper-case HTTP method.
    pub method: String,
    /// Absolute target URL.
    pub url: Url,
    /// Request mode.
    pub mode: RequestMode,
    /// Request headers in arrival order.
    pub headers: Vec<(String, String)>,
    /// Request body (empty for `GET`).
    pub body: Bytes,
}

impl Request {
    /// Creates a `GET` request for a sub-resource.
    #[must_use]
    pub fn get(url: Url) -> Self {
        Self {
            method: "GET".to_string(),
            url,
            mode: RequestMode::default(),
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    /// Creates a `GET` navigation request.
    #[must_use]
    pub fn navigate(url: Url) -> Self {
        Self::get(url).with_mode(RequestMode::Navigate)
    }

    /// Resolves `path` against `origin` and creates a `GET` request for it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUrl`] if the path cannot be joined onto the origin.
    pub fn for_path(origin: &Url, path: &str) -> Result<Self> {
        resolve(origin, path).map(Self::get)
    }

    /// Sets the HTTP method.
    #[must_use]
    pub fn with_method(mut self, method: &str) -> Self {
        self.method = method.to_ascii_uppercase();
        self
    }

    /// Sets the request mode.
    #[must_use]
    pub const fn with_mode(mut self, mode: RequestMode) -> Self {
        self.mode = mode;
        self
    }

    /// Appends a header.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Sets the request body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Returns the key this request is stored under: the URL without fragment.
    #[must_use]
    pub fn cache_key(&self) -> String {
        let mut url = self.url.clone();
        url.set_fragment(None);
        url.into()
    }

    /// Returns the URL path component.
    #[must_use]
    pub fn path(&self) -> &str {
        self.url.path()
    }

    /// Returns true for top-level document navigations.
    #[must_use]
    pub fn is_navigation(&self) -> bool {
        self.mode == RequestMode::Navigate
    }

    /// Returns true for `GET` requests.
    #[must_use]
    pub fn is_get(&self) -> bool {
        self.method == "GET"
    }

    /// Returns the first header value with the given name (case-insensitive).
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

/// An immutable snapshot of a network or cached response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    /// HTTP status code.
    pub status: u16,
    /// Response type relative to the controlled origin.
    #[serde(default)]
    pub response_type: ResponseType,
    /// Final URL after redirects, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Whether the request was redirected before producing this response.
    #[serde(default)]
    pub redirected: bool,
    /// Response headers in arrival order.
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    /// Response body.
    #[serde(skip)]
    pub body: Bytes,
}

impl Response {
    /// Creates a basic response with the given status and body.
    #[must_use]
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            response_type: ResponseType::Basic,
            url: None,
            redirected: false,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    /// Sets the response type.
    #[must_use]
    pub const fn with_type(mut self, response_type: ResponseType) -> Self {
        self.response_type = response_type;
        self
    }

    /// Appends a header.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Sets the final URL.
    #[must_use]
    pub fn with_url(mut self, url: &Url) -> Self {
        self.url = Some(url.to_string());
        self
    }

    /// Marks the response as the result of a redirect.
    #[must_use]
    pub const fn with_redirected(mut self, redirected: bool) -> Self {
        self.redirected = redirected;
        self
    }

    /// Returns true for 2xx statuses.
    #[must_use]
    pub const fn ok(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    /// Returns true if the response may be written into the core namespace:
    /// status exactly 200 and a same-origin basic response.
    #[must_use]
    pub fn is_cacheable_core(&self) -> bool {
        self.status == 200 && self.response_type == ResponseType::Basic
    }

    /// Returns the first header value with the given name (case-insensitive).
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    /// Returns the `Content-Type` header, if present.
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }
}

/// Resolves `path` against `origin`.
///
/// # Errors
///
/// Returns [`Error::InvalidUrl`] if the join fails.
pub fn resolve(origin: &Url, path: &str) -> Result<Url> {
    origin.join(path).map_err(|e| Error::InvalidUrl {
        url: path.to_string(),
        reason: e.to_string(),
    })
}

/// Parses an absolute URL.
///
/// # Errors
///
/// Returns [`Error::InvalidUrl`] if the input is not an absolute URL.
pub fn parse_url(input: &str) -> Result<Url> {
    Url::parse(input).map_err(|e| Error::InvalidUrl {
        url: input.to_string(),
        reason: e.to_string(),
    })
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}
