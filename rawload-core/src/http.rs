use std::collections::BTreeMap;
use std::sync::Arc;

use rawload_http::{Error as HttpError, HttpClient, HttpRequest, HttpResponse};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::runner::{CANCELLED_RESPONSE, PerformFuture, PerformRequest, RequestSpec};

const DEFAULT_CONTENT_TYPE: &str = "application/json";

/// [`PerformRequest`] backed by [`HttpClient`].
///
/// Responses are rendered as
/// `Status: <code> <reason>\nHeaders: <metadata json>\nBody: <body>`, where the
/// metadata carries `timing.total` in milliseconds. Failures render as
/// `Error: <message>` and cancellation as [`CANCELLED_RESPONSE`].
#[derive(Debug, Clone, Default)]
pub struct HttpPerformer {
    client: HttpClient,
}

impl HttpPerformer {
    #[must_use]
    pub fn new(client: HttpClient) -> Self {
        Self { client }
    }
}

#[derive(Serialize)]
struct Timing {
    total: u64,
}

#[derive(Serialize)]
struct Metadata<'a> {
    timing: Timing,
    size: usize,
    headers: BTreeMap<&'a str, &'a str>,
}

fn parse_headers(raw: &str) -> Vec<(String, String)> {
    if raw.trim().is_empty() {
        return Vec::new();
    }
    let Ok(map) = serde_json::from_str::<serde_json::Map<String, serde_json::Value>>(raw) else {
        tracing::debug!("ignoring malformed headers json");
        return Vec::new();
    };
    map.into_iter()
        .filter_map(|(name, value)| match value {
            serde_json::Value::String(s) => Some((name, s)),
            serde_json::Value::Number(n) => Some((name, n.to_string())),
            serde_json::Value::Bool(b) => Some((name, b.to_string())),
            _ => None,
        })
        .collect()
}

fn build_request(spec: &RequestSpec) -> rawload_http::Result<HttpRequest> {
    let mut req = HttpRequest::new(&spec.method, spec.url.clone())?.with_timeout(spec.timeout);
    for (name, value) in parse_headers(&spec.headers_json) {
        req = req.with_header(name, value);
    }
    if !spec.body.is_empty() {
        if !req.has_header("content-type") {
            req = req.with_header("content-type", DEFAULT_CONTENT_TYPE);
        }
        req = req.with_body(spec.body.clone());
    }
    Ok(req)
}

fn render_response(res: &HttpResponse) -> String {
    let headers = res
        .headers
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();
    let metadata = Metadata {
        timing: Timing {
            total: u64::try_from(res.elapsed.as_millis()).unwrap_or(u64::MAX).max(1),
        },
        size: res.body.len(),
        headers,
    };
    let metadata = serde_json::to_string(&metadata).unwrap_or_else(|_| "{}".to_string());
    format!(
        "Status: {}\nHeaders: {metadata}\nBody: {}",
        res.status_line(),
        String::from_utf8_lossy(&res.body)
    )
}

fn render_error(err: &HttpError) -> String {
    match err {
        HttpError::Timeout(after) => format!("Error: Request timeout after {}ms", after.as_millis()),
        other => format!("Error: {other}"),
    }
}

impl PerformRequest for HttpPerformer {
    fn perform(&self, cancel: CancellationToken, request: Arc<RequestSpec>) -> PerformFuture {
        let client = self.client.clone();
        Box::pin(async move {
            let req = match build_request(&request) {
                Ok(req) => req,
                Err(err) => return render_error(&err),
            };
            tokio::select! {
                biased;
                () = cancel.cancelled() => CANCELLED_RESPONSE.to_string(),
                res = client.request(req) => match res {
                    Ok(res) => render_response(&res),
                    Err(err) => render_error(&err),
                },
            }
        })
    }
}
