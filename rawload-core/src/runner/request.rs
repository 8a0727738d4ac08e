use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// The single request every virtual user repeats.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestSpec {
    pub method: String,
    pub url: String,
    /// JSON object of header names to values.
    pub headers_json: String,
    pub body: String,
    pub timeout: Option<Duration>,
}

pub type PerformFuture = Pin<Box<dyn Future<Output = String> + Send + 'static>>;

/// Executes one request and renders it as a textual response record.
///
/// The record is either [`CANCELLED_RESPONSE`](super::CANCELLED_RESPONSE) (the token fired),
/// an `Error: ...` line, or `Status: <code> <reason>\nHeaders: <json>\nBody: <body>`
/// where the JSON carries `timing.total` in milliseconds.
pub trait PerformRequest: Send + Sync + 'static {
    fn perform(&self, cancel: CancellationToken, request: Arc<RequestSpec>) -> PerformFuture;
}

impl<F, Fut> PerformRequest for F
where
    F: Fn(CancellationToken, Arc<RequestSpec>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = String> + Send + 'static,
{
    fn perform(&self, cancel: CancellationToken, request: Arc<RequestSpec>) -> PerformFuture {
        Box::pin(self(cancel, request))
    }
}
