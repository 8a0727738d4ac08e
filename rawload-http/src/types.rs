use std::time::Duration;

use bytes::Bytes;

use super::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    /// Canonical reason phrase for `status`, empty when the code has none.
    pub reason: &'static str,
    pub body: Bytes,
    /// Response headers (lowercased header names). Multiple values are joined with ", ".
    pub headers: Vec<(String, String)>,
    /// Time from dispatch until the full body was read.
    pub elapsed: Duration,
}

impl HttpResponse {
    pub fn body_utf8(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }

    /// HTTP/1 style status line without the version, e.g. `200 OK`.
    pub fn status_line(&self) -> String {
        if self.reason.is_empty() {
            self.status.to_string()
        } else {
            format!("{} {}", self.status, self.reason)
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: http::Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    /// Builds a request from a free-form method name (`get`, `POST`, ...).
    pub fn new(method: &str, url: impl Into<String>) -> Result<Self> {
        let method = http::Method::from_bytes(method.trim().to_ascii_uppercase().as_bytes())?;
        Ok(Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: Bytes::new(),
            timeout: None,
        })
    }

    pub fn get(url: &str) -> Self {
        Self {
            method: http::Method::GET,
            url: url.to_string(),
            headers: Vec::new(),
            body: Bytes::new(),
            timeout: None,
        }
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn has_header(&self, name: &str) -> bool {
        super::util::has_header(&self.headers, name)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn new_normalizes_method_case() {
        let req = HttpRequest::new(" post ", "http://localhost/").unwrap();
        assert_eq!(req.method, http::Method::POST);
    }

    #[test]
    fn new_rejects_garbage_method() {
        let err = HttpRequest::new("GE T", "http://localhost/").unwrap_err();
        assert_eq!(
            err.transport_error_kind(),
            crate::HttpTransportErrorKind::InvalidMethod
        );
    }

    #[test]
    fn status_line_includes_reason_when_known() {
        let res = HttpResponse {
            status: 404,
            reason: "Not Found",
            body: Bytes::new(),
            headers: Vec::new(),
            elapsed: Duration::ZERO,
        };
        assert_eq!(res.status_line(), "404 Not Found");

        let res = HttpResponse {
            status: 599,
            reason: "",
            ..res
        };
        assert_eq!(res.status_line(), "599");
    }
}
