//! Result delivery.
//!
//! A [`ResultSink`] receives one [`DetectionEvent`] per processed clip.
//! [`HttpSink`] POSTs it as JSON and retries transient failures:
//!
//! | Outcome | Class | Action |
//! |---------|-------|--------|
//! | 2xx / 3xx | success | return status |
//! | 4xx | permanent | fail immediately |
//! | 5xx | transient | back off, retry |
//! | timeout / connect error | transient | back off, retry |
//!
//! Backoff doubles from `initial_backoff`; after `max_retries` retries the
//! last error is returned as [`DeliveryError::Exhausted`].

use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::events::DetectionEvent;

/// Production result endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://main.do3lhk8wdr8hy.amplifyapp.com/api/laundry-events";

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("sink rejected event with status {status}")]
    Permanent { status: u16 },

    #[error("sink returned status {status}")]
    Server { status: u16 },

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("delivery failed after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        #[source]
        last: Box<DeliveryError>,
    },
}

impl DeliveryError {
    /// Whether another attempt could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            DeliveryError::Permanent { .. } | DeliveryError::Exhausted { .. } => false,
            DeliveryError::Server { .. } => true,
            DeliveryError::Request(e) => !e.is_builder(),
        }
    }
}

/// Anything that accepts detection events.
pub trait ResultSink: Send + Sync {
    /// Deliver one event, returning the final HTTP-like status on success.
    fn deliver(&self, event: &DetectionEvent) -> Result<u16, DeliveryError>;
}

impl<S: ResultSink + ?Sized> ResultSink for &S {
    fn deliver(&self, event: &DetectionEvent) -> Result<u16, DeliveryError> {
        (**self).deliver(event)
    }
}

impl<S: ResultSink + ?Sized> ResultSink for Box<S> {
    fn deliver(&self, event: &DetectionEvent) -> Result<u16, DeliveryError> {
        (**self).deliver(event)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt. Default: 3.
    pub max_retries: u32,
    /// Delay before the first retry. Default: 1 s.
    pub initial_backoff: Duration,
    /// Growth factor between retries. Default: 2.
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_secs(1),
            multiplier: 2,
        }
    }
}

impl RetryPolicy {
    /// No waiting between attempts.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            initial_backoff: Duration::ZERO,
            multiplier: 1,
        }
    }

    /// Delay before retry number `retry` (0-based).
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = self.multiplier.max(1).saturating_pow(retry);
        self.initial_backoff.saturating_mul(factor)
    }
}

/// POSTs events as JSON to a fixed endpoint.
pub struct HttpSink {
    client: reqwest::blocking::Client,
    endpoint: String,
    retry: RetryPolicy,
}

impl HttpSink {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, DeliveryError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn post_once(&self, event: &DetectionEvent) -> Result<u16, DeliveryError> {
        let response = self.client.post(&self.endpoint).json(event).send()?;
        let status = response.status();
        if status.is_client_error() {
            return Err(DeliveryError::Permanent {
                status: status.as_u16(),
            });
        }
        if status.is_server_error() {
            return Err(DeliveryError::Server {
                status: status.as_u16(),
            });
        }
        Ok(status.as_u16())
    }
}

impl ResultSink for HttpSink {
    fn deliver(&self, event: &DetectionEvent) -> Result<u16, DeliveryError> {
        let mut retry = 0u32;
        loop {
            match self.post_once(event) {
                Ok(status) => {
                    info!(filename = %event.filename, status, attempt = retry + 1, "event delivered");
                    return Ok(status);
                }
                Err(e) if !e.is_retryable() => {
                    warn!(filename = %event.filename, error = %e, "event rejected; not retrying");
                    return Err(e);
                }
                Err(e) if retry >= self.retry.max_retries => {
                    warn!(filename = %event.filename, error = %e, attempts = retry + 1, "event delivery exhausted retries");
                    return Err(DeliveryError::Exhausted {
                        attempts: retry + 1,
                        last: Box::new(e),
                    });
                }
                Err(e) => {
                    let delay = self.retry.backoff(retry);
                    debug!(
                        filename = %event.filename,
                        error = %e,
                        attempt = retry + 1,
                        delay_ms = delay.as_millis() as u64,
                        "transient delivery failure; backing off"
                    );
                    std::thread::sleep(delay);
                    retry += 1;
                }
            }
        }
    }
}

/// Collects events in memory. Used for dry runs.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<DetectionEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<DetectionEvent> {
        self.events.lock().clone()
    }

    pub fn take(&self) -> Vec<DetectionEvent> {
        std::mem::take(&mut *self.events.lock())
    }
}

impl ResultSink for MemorySink {
    fn deliver(&self, event: &DetectionEvent) -> Result<u16, DeliveryError> {
        self.events.lock().push(event.clone());
        Ok(200)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ClassificationResult;
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::sync::{Arc, Mutex as StdMutex};
    use std::thread::JoinHandle;

    /// Serves one canned status per connection, recording request bodies.
    fn canned_server(statuses: Vec<u16>) -> (String, Arc<StdMutex<Vec<String>>>, JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind test listener");
        let addr = listener.local_addr().expect("listener addr");
        let bodies = Arc::new(StdMutex::new(Vec::new()));
        let seen = Arc::clone(&bodies);

        let handle = std::thread::spawn(move || {
            for status in statuses {
                let (stream, _) = listener.accept().expect("accept");
                let mut reader = BufReader::new(stream);
                let mut content_length = 0usize;
                loop {
                    let mut line = String::new();
                    reader.read_line(&mut line).expect("read header");
                    if line == "\r\n" || line.is_empty() {
                        break;
                    }
                    let lower = line.to_ascii_lowercase();
                    if let Some(v) = lower.strip_prefix("content-length:") {
                        content_length = v.trim().parse().expect("content length");
                    }
                }
                let mut body = vec![0u8; content_length];
                reader.read_exact(&mut body).expect("read body");
                seen.lock().unwrap().push(String::from_utf8_lossy(&body).into_owned());

                let mut stream = reader.into_inner();
                write!(
                    stream,
                    "HTTP/1.1 {status} X\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                )
                .expect("write response");
                stream.flush().expect("flush");
            }
        });

        (format!("http://{addr}/api/laundry-events"), bodies, handle)
    }

    fn event() -> DetectionEvent {
        let result = ClassificationResult {
            has_sound: true,
            is_speech: true,
            is_voice: true,
            is_clapping: false,
            confidence: 0.8,
        };
        DetectionEvent::new("test.wav", "2023-10-27T10:00:00Z", &result)
    }

    fn sink(url: String, retries: u32) -> HttpSink {
        HttpSink::new(url, Duration::from_secs(5))
            .expect("build client")
            .with_retry(RetryPolicy::immediate(retries))
    }

    #[test]
    fn default_policy_backs_off_one_two_four_seconds() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.backoff(0), Duration::from_secs(1));
        assert_eq!(policy.backoff(1), Duration::from_secs(2));
        assert_eq!(policy.backoff(2), Duration::from_secs(4));
    }

    #[test]
    fn success_posts_json_payload_once() {
        let (url, bodies, handle) = canned_server(vec![200]);
        let status = sink(url, 3).deliver(&event()).expect("delivered");
        handle.join().unwrap();

        assert_eq!(status, 200);
        let bodies = bodies.lock().unwrap();
        assert_eq!(bodies.len(), 1);
        let json: serde_json::Value = serde_json::from_str(&bodies[0]).unwrap();
        assert_eq!(json["filename"], "test.wav");
        assert_eq!(json["is_speech"], true);
    }

    #[test]
    fn client_error_is_not_retried() {
        let (url, bodies, handle) = canned_server(vec![400]);
        let err = sink(url, 3).deliver(&event()).unwrap_err();
        handle.join().unwrap();

        assert!(matches!(err, DeliveryError::Permanent { status: 400 }));
        assert!(!err.is_retryable());
        assert_eq!(bodies.lock().unwrap().len(), 1);
    }

    #[test]
    fn server_error_is_retried_then_succeeds() {
        let (url, bodies, handle) = canned_server(vec![503, 500, 201]);
        let status = sink(url, 3).deliver(&event()).expect("delivered on third attempt");
        handle.join().unwrap();

        assert_eq!(status, 201);
        assert_eq!(bodies.lock().unwrap().len(), 3);
    }

    #[test]
    fn server_errors_exhaust_retries() {
        let (url, bodies, handle) = canned_server(vec![500, 500, 500, 500]);
        let err = sink(url, 3).deliver(&event()).unwrap_err();
        handle.join().unwrap();

        match err {
            DeliveryError::Exhausted { attempts, last } => {
                assert_eq!(attempts, 4);
                assert!(matches!(*last, DeliveryError::Server { status: 500 }));
            }
            other => panic!("expected exhaustion, got {other:?}"),
        }
        assert_eq!(bodies.lock().unwrap().len(), 4);
    }

    #[test]
    fn connection_refused_is_transient() {
        // Bind then drop to get a port with nothing listening.
        let addr = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap();
        let err = sink(format!("http://{addr}/"), 1).deliver(&event()).unwrap_err();
        match err {
            DeliveryError::Exhausted { attempts, last } => {
                assert_eq!(attempts, 2);
                assert!(matches!(*last, DeliveryError::Request(_)));
            }
            other => panic!("expected exhaustion, got {other:?}"),
        }
    }

    #[test]
    fn memory_sink_records_events() {
        let sink = MemorySink::new();
        sink.deliver(&event()).unwrap();
        (&sink).deliver(&event()).unwrap();
        assert_eq!(sink.events().len(), 2);
        assert_eq!(sink.take().len(), 2);
        assert!(sink.events().is_empty());
    }
}
