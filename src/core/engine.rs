use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::{stream, StreamExt};
use log::debug;
use url::Url;

use crate::core::task::{FuzzResult, FuzzTask};
use crate::http::HttpClient;
use crate::SinkRef;

/// Concurrent fuzz executor.
///
/// Every task issues exactly one request and yields exactly one
/// `FuzzResult`. Transport failures (timeouts, refused connections, body
/// read errors) are recorded as results with no status and the failure
/// description as excerpt; they never abort the run.
///
/// Results come back in completion order. Callers regroup by `task_id`.
pub struct FuzzExecutor {
    client: Arc<HttpClient>,
    base_url: Url,
    concurrency_limit: usize,
}

impl FuzzExecutor {
    pub fn new(client: Arc<HttpClient>, base_url: Url, concurrency_limit: usize) -> Self {
        Self {
            client,
            base_url,
            concurrency_limit: concurrency_limit.max(1),
        }
    }

    pub fn concurrency_limit(&self) -> usize {
        self.concurrency_limit
    }

    /// Runs every task with at most `concurrency_limit` requests in flight
    /// and waits for all of them to settle.
    pub async fn run(&self, tasks: Vec<FuzzTask>, sink: &SinkRef) -> Vec<FuzzResult> {
        let total = tasks.len();
        let done = Arc::new(AtomicUsize::new(0));
        sink.on_progress("Fuzzing", 0, total);

        stream::iter(tasks)
            .map(|task| {
                let client = Arc::clone(&self.client);
                let base_url = &self.base_url;
                let done = Arc::clone(&done);
                let sink = Arc::clone(sink);

                async move {
                    let result = execute(&client, base_url, &task).await;
                    let current = done.fetch_add(1, Ordering::Relaxed) + 1;
                    sink.on_progress("Fuzzing", current, total);
                    result
                }
            })
            .buffer_unordered(self.concurrency_limit)
            .collect::<Vec<FuzzResult>>()
            .await
    }
}

async fn execute(client: &HttpClient, base_url: &Url, task: &FuzzTask) -> FuzzResult {
    let request = match task.to_request(base_url) {
        Ok(req) => req,
        Err(e) => {
            let url = base_url.as_str();
            debug!("RequestFailed {} {}: {}", task.method, url, e);
            return FuzzResult::failed(task, url, None, &format!("request not built: {}", e));
        }
    };
    let url = request.url.to_string();

    let response = match client.send_request(&request).await {
        Ok(r) => r,
        Err(e) => {
            let reason = describe_failure(client, &e);
            debug!("RequestFailed {} {}: {}", task.method, url, reason);
            return FuzzResult::failed(task, &url, None, &reason);
        }
    };

    let status = response.status().as_u16();
    match response.text().await {
        Ok(body) => FuzzResult::completed(task, &url, status, &body),
        Err(e) => {
            let reason = describe_failure(client, &e);
            debug!("RequestFailed {} {} (HTTP {}): {}", task.method, url, status, reason);
            FuzzResult::failed(task, &url, None, &reason)
        }
    }
}

fn describe_failure(client: &HttpClient, e: &reqwest::Error) -> String {
    if e.is_timeout() {
        format!("request timed out after {}s", client.timeout().as_secs())
    } else if e.is_connect() {
        format!("connection failed: {}", e)
    } else {
        format!("request failed: {}", e)
    }
}
