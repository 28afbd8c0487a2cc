// src/logger/sender.rs
//
// Byte senders behind the batching pipeline. A sender accepts one
// framed batch at a time; delivery failures never propagate into the
// foreground call that enqueued the events. They are reported through
// the error reporter (and therefore the watchdog).

use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Semaphore;

use crate::config::Configuration;
use crate::status::{ApiError, ApiResult, ErrorReporter};
use crate::trace::TraceLogger;

pub trait Sender: Send + Sync + std::fmt::Debug {
    /// Acquire resources (open files, validate endpoints).
    fn init(&mut self, config: &Configuration) -> ApiResult<()>;

    /// Hand over one framed batch. `Ok` means accepted for delivery;
    /// asynchronous senders may still fail afterwards, in which case the
    /// failure goes to the error reporter.
    fn send(&self, bytes: Vec<u8>) -> ApiResult<()>;
}

/// Appends framed batches to a local file.
pub struct FileSender {
    path: PathBuf,
    writer: Mutex<Option<BufWriter<std::fs::File>>>,
}

impl std::fmt::Debug for FileSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileSender")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl FileSender {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            writer: Mutex::new(None),
        }
    }
}

impl Sender for FileSender {
    fn init(&mut self, _config: &Configuration) -> ApiResult<()> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| {
                ApiError::sender_init(format!(
                    "failed to open event file {}: {e}",
                    self.path.display()
                ))
            })?;
        *self.writer.lock().expect("file sender lock poisoned") = Some(BufWriter::new(file));
        Ok(())
    }

    fn send(&self, bytes: Vec<u8>) -> ApiResult<()> {
        let mut guard = self.writer.lock().expect("file sender lock poisoned");
        let writer = guard
            .as_mut()
            .ok_or_else(|| ApiError::send_failed("file sender was not initialized"))?;
        writer
            .write_all(&bytes)
            .and_then(|_| writer.flush())
            .map_err(|e| ApiError::send_failed(format!("file write failed: {e}")))
    }
}

/// POSTs framed batches to an HTTP endpoint with bounded retries and a
/// bounded number of in-flight tasks.
pub struct HttpApiSender {
    url: String,
    client: reqwest::Client,
    runtime: tokio::runtime::Handle,
    permits: Arc<Semaphore>,
    max_retries: u32,
    reporter: ErrorReporter,
    trace: Arc<dyn TraceLogger>,
}

impl std::fmt::Debug for HttpApiSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpApiSender")
            .field("url", &self.url)
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

impl HttpApiSender {
    pub fn new(
        url: impl Into<String>,
        runtime: tokio::runtime::Handle,
        tasks_limit: usize,
        max_retries: u32,
        reporter: ErrorReporter,
        trace: Arc<dyn TraceLogger>,
    ) -> Self {
        Self {
            url: url.into(),
            client: reqwest::Client::new(),
            runtime,
            permits: Arc::new(Semaphore::new(tasks_limit.max(1))),
            max_retries: max_retries.max(1),
            reporter,
            trace,
        }
    }
}

impl Sender for HttpApiSender {
    fn init(&mut self, _config: &Configuration) -> ApiResult<()> {
        if self.url.is_empty() {
            return Err(ApiError::http_uri_not_provided(
                "http sender requires a non-empty endpoint",
            ));
        }
        Ok(())
    }

    fn send(&self, bytes: Vec<u8>) -> ApiResult<()> {
        let url = self.url.clone();
        let client = self.client.clone();
        let permits = self.permits.clone();
        let max_retries = self.max_retries;
        let reporter = self.reporter.clone();
        let trace = self.trace.clone();
        let _task = self.runtime.spawn(async move {
            // Bound the number of in-flight posts; excess batches queue
            // here in submission order.
            let _permit = match permits.acquire_owned().await {
                Ok(p) => p,
                Err(_) => return,
            };
            let mut backoff = Duration::from_millis(50);
            for attempt in 1..=max_retries {
                let result = client.post(&url).body(bytes.clone()).send().await;
                match result.and_then(|r| r.error_for_status()) {
                    Ok(_) => return,
                    Err(e) => {
                        trace.warn(&format!(
                            "batch post attempt {attempt}/{max_retries} failed: {e}"
                        ));
                    }
                }
                if attempt < max_retries {
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(Duration::from_secs(1));
                }
            }
            reporter.report(&ApiError::send_failed(format!(
                "batch delivery to {url} failed after {max_retries} attempts"
            )));
        });
        Ok(())
    }
}

/// In-memory sender for tests: records frames and can be scripted to
/// fail a number of sends.
#[derive(Clone, Default, Debug)]
pub struct MemorySender {
    frames: Arc<Mutex<Vec<Vec<u8>>>>,
    fail_next: Arc<AtomicUsize>,
}

impl MemorySender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> Vec<Vec<u8>> {
        self.frames.lock().expect("memory sender lock poisoned").clone()
    }

    pub fn frame_count(&self) -> usize {
        self.frames.lock().expect("memory sender lock poisoned").len()
    }

    /// Make the next `n` sends fail with `SendFailed`.
    pub fn fail_next_sends(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }
}

impl Sender for MemorySender {
    fn init(&mut self, _config: &Configuration) -> ApiResult<()> {
        Ok(())
    }

    fn send(&self, bytes: Vec<u8>) -> ApiResult<()> {
        let remaining = self.fail_next.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_next.store(remaining - 1, Ordering::SeqCst);
            return Err(ApiError::send_failed("memory sender scripted failure"));
        }
        self.frames
            .lock()
            .expect("memory sender lock poisoned")
            .push(bytes);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watchdog::Watchdog;

    #[test]
    fn file_sender_appends_frames() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("interaction.events.data");
        let mut sender = FileSender::new(&path);
        sender.init(&Configuration::new()).unwrap();
        sender.send(b"frame-1".to_vec()).unwrap();
        sender.send(b"frame-2".to_vec()).unwrap();
        let contents = std::fs::read(&path).unwrap();
        assert_eq!(contents, b"frame-1frame-2");
    }

    #[test]
    fn uninitialized_file_sender_refuses_sends() {
        let sender = FileSender::new("/tmp/never-opened");
        assert!(sender.send(vec![1]).is_err());
    }

    #[test]
    fn memory_sender_scripted_failures() {
        let sender = MemorySender::new();
        sender.fail_next_sends(1);
        assert!(sender.send(vec![1]).is_err());
        assert!(sender.send(vec![2]).is_ok());
        assert_eq!(sender.frame_count(), 1);
    }

    #[test]
    fn http_sender_reports_after_retry_exhaustion() {
        let server = httpmock::MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(httpmock::Method::POST).path("/events");
            then.status(500);
        });

        let runtime = tokio::runtime::Runtime::new().unwrap();
        let watchdog = Arc::new(Watchdog::new());
        let reporter = ErrorReporter::new(watchdog.clone(), None);
        let mut sender = HttpApiSender::new(
            server.url("/events"),
            runtime.handle().clone(),
            2,
            2,
            reporter,
            Arc::new(crate::trace::NullTrace),
        );
        sender.init(&Configuration::new()).unwrap();
        sender.send(b"frame".to_vec()).unwrap();

        // Two attempts with one 50 ms backoff in between.
        std::thread::sleep(Duration::from_millis(600));
        assert!(mock.hits() >= 2);
        assert!(watchdog.has_background_error_been_reported());
    }

    #[test]
    fn http_sender_delivers_on_success() {
        let server = httpmock::MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(httpmock::Method::POST).path("/events");
            then.status(200);
        });

        let runtime = tokio::runtime::Runtime::new().unwrap();
        let watchdog = Arc::new(Watchdog::new());
        let reporter = ErrorReporter::new(watchdog.clone(), None);
        let mut sender = HttpApiSender::new(
            server.url("/events"),
            runtime.handle().clone(),
            4,
            4,
            reporter,
            Arc::new(crate::trace::NullTrace),
        );
        sender.init(&Configuration::new()).unwrap();
        sender.send(b"frame".to_vec()).unwrap();

        std::thread::sleep(Duration::from_millis(400));
        assert_eq!(mock.hits(), 1);
        assert!(!watchdog.has_background_error_been_reported());
    }

    #[test]
    fn empty_url_fails_init() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let watchdog = Arc::new(Watchdog::new());
        let mut sender = HttpApiSender::new(
            "",
            runtime.handle().clone(),
            1,
            1,
            ErrorReporter::new(watchdog, None),
            Arc::new(crate::trace::NullTrace),
        );
        let err = sender.init(&Configuration::new()).unwrap_err();
        assert_eq!(err.code, crate::status::ErrorCode::HttpUriNotProvided);
    }
}
