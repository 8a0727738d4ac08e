use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::config::NormalizedConfig;
use super::error::{Error, Result};
use super::progress::{EventFn, RunEvent};
use super::request::{PerformRequest, RequestSpec};
use super::run::run_load_test;
use super::stats::Results;

const PANIC_MESSAGE: &str = "Load test panicked";

#[derive(Debug, Clone)]
struct Registration {
    run: u64,
    cancel: CancellationToken,
}

/// Starts load tests and routes cancellation to them by request id.
#[derive(Clone)]
pub struct LoadTestEngine {
    performer: Arc<dyn PerformRequest>,
    events: EventFn,
    running: Arc<DashMap<String, Registration>>,
    next_run: Arc<AtomicU64>,
}

/// Handle to a started run.
#[derive(Debug)]
pub struct RunHandle {
    request_id: String,
    task: JoinHandle<Option<Results>>,
}

impl RunHandle {
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Waits for the run to end. `None` when the run faulted; the fault was
    /// reported as [`RunEvent::Error`].
    pub async fn wait(self) -> Option<Results> {
        self.task.await.ok().flatten()
    }
}

impl LoadTestEngine {
    pub fn new(performer: impl PerformRequest, events: EventFn) -> Self {
        Self {
            performer: Arc::new(performer),
            events,
            running: Arc::new(DashMap::new()),
            next_run: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Validates the arguments and config, then starts the run in the background.
    ///
    /// All failures are reported here, before anything is spawned. Afterwards the
    /// run only reports through events. Must be called inside a Tokio runtime.
    pub fn start_load_test(
        &self,
        request_id: &str,
        method: &str,
        url: &str,
        headers_json: &str,
        body: &str,
        config_json: &str,
    ) -> Result<RunHandle> {
        let request_id = request_id.trim();
        if request_id.is_empty() {
            return Err(Error::MissingRequestId);
        }
        let (method, url) = (method.trim(), url.trim());
        if method.is_empty() || url.is_empty() {
            return Err(Error::MissingMethodOrUrl);
        }
        let cfg = NormalizedConfig::from_json(config_json)?;

        let run = self.next_run.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        match self.running.entry(request_id.to_string()) {
            Entry::Occupied(_) => return Err(Error::DuplicateRequestId(request_id.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(Registration {
                    run,
                    cancel: cancel.clone(),
                });
            }
        }

        let request = RequestSpec {
            method: method.to_string(),
            url: url.to_string(),
            headers_json: headers_json.to_string(),
            body: body.to_string(),
            timeout: cfg.request_timeout,
        };

        let inner = tokio::spawn(run_load_test(
            request_id.to_string(),
            request,
            cfg,
            self.performer.clone(),
            self.events.clone(),
            cancel.clone(),
        ));

        let id = request_id.to_string();
        let events = self.events.clone();
        let running = self.running.clone();
        let task = tokio::spawn(async move {
            let outcome = inner.await;

            cancel.cancel();
            running.remove_if(&id, |_, reg| reg.run == run);

            match outcome {
                Ok(results) => Some(results),
                Err(err) => {
                    tracing::error!(request_id = %id, error = %err, "load test task failed");
                    (events)(RunEvent::Error {
                        request_id: id,
                        message: PANIC_MESSAGE.to_string(),
                    });
                    None
                }
            }
        });

        Ok(RunHandle {
            request_id: request_id.to_string(),
            task,
        })
    }

    /// Cancels the run registered under `request_id`. Returns whether one was found;
    /// repeated calls are no-ops.
    pub fn cancel_request(&self, request_id: &str) -> bool {
        match self.running.remove(request_id.trim()) {
            Some((_, reg)) => {
                tracing::info!(request_id = request_id.trim(), "load test cancellation requested");
                reg.cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self, request_id: &str) -> bool {
        self.running.contains_key(request_id.trim())
    }
}
