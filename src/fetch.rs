//! Finite fetch tasks and the retrieval seam they run against.
//!
//! A [`FetchTask`] performs one retrieval through a [`Fetcher`], optionally
//! sleeps for a fixed delay, and returns a [`StatsRecord`] with the elapsed
//! time (delay included), payload size and SHA-256 digest.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Serialize, Serializer};
use sha2::{Digest, Sha256};
use tokio::time::Instant;

use crate::error::FetchError;

/// External retrieval of a target's payload.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Retrieves the full payload for `target`.
    async fn fetch(&self, target: &str) -> Result<Vec<u8>, FetchError>;
}

/// [`Fetcher`] issuing HTTP GET requests through a shared [`reqwest::Client`].
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpFetcher {
    /// Creates a fetcher applying `timeout` to every request.
    pub fn new(timeout: Duration) -> Self {
        Self::with_client(reqwest::Client::new(), timeout)
    }

    /// Creates a fetcher reusing an existing client.
    pub fn with_client(client: reqwest::Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, target: &str) -> Result<Vec<u8>, FetchError> {
        let response = self
            .client
            .get(target)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| FetchError::classify_reqwest(&e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Http {
                status: status.as_u16(),
                message: status
                    .canonical_reason()
                    .unwrap_or("unexpected status")
                    .to_string(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::classify_reqwest(&e))?;
        Ok(body.to_vec())
    }
}

/// Result of one successful fetch task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatsRecord {
    /// Submission index of the task.
    pub task: usize,
    /// Wall time from start of retrieval to end of the delay.
    #[serde(rename = "duration_secs", serialize_with = "serialize_secs")]
    pub duration: Duration,
    /// Payload size in bytes.
    pub size: usize,
    /// Lowercase hex SHA-256 of the payload.
    pub digest: String,
}

fn serialize_secs<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_secs_f64())
}

/// Returns the lowercase hex SHA-256 digest of `data`.
pub fn sha256_hex(data: &[u8]) -> String {
    Sha256::digest(data)
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// One finite unit of work: fetch, optional delay, measure.
#[derive(Clone)]
pub struct FetchTask {
    id: usize,
    target: String,
    delay: Option<Duration>,
    fetcher: Arc<dyn Fetcher>,
}

impl FetchTask {
    pub fn new(
        id: usize,
        target: impl Into<String>,
        delay: Option<Duration>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Self {
        Self {
            id,
            target: target.into(),
            delay,
            fetcher,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Runs the task to completion.
    ///
    /// The delay only applies after a successful retrieval; a failed fetch
    /// returns immediately.
    pub async fn run(self) -> Result<StatsRecord, FetchError> {
        tracing::debug!(task = self.id, target = %self.target, "fetch started");
        let start = Instant::now();

        let body = match self.fetcher.fetch(&self.target).await {
            Ok(body) => body,
            Err(err) => {
                tracing::warn!(
                    task = self.id,
                    target = %self.target,
                    category = err.error_category(),
                    "fetch failed: {err}"
                );
                return Err(err);
            }
        };
        if let Some(delay) = self.delay.filter(|d| !d.is_zero()) {
            tokio::time::sleep(delay).await;
        }

        let record = StatsRecord {
            task: self.id,
            duration: start.elapsed(),
            size: body.len(),
            digest: sha256_hex(&body),
        };
        tracing::debug!(
            task = self.id,
            size = record.size,
            elapsed_ms = record.duration.as_millis() as u64,
            "fetch finished"
        );
        Ok(record)
    }
}

impl std::fmt::Debug for FetchTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchTask")
            .field("id", &self.id)
            .field("target", &self.target)
            .field("delay", &self.delay)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    struct StaticFetcher(Result<Vec<u8>, FetchError>);

    #[async_trait]
    impl Fetcher for StaticFetcher {
        async fn fetch(&self, _target: &str) -> Result<Vec<u8>, FetchError> {
            self.0.clone()
        }
    }

    #[test]
    fn test_sha256_hex_known_vectors() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[tokio::test]
    async fn test_run_reports_size_and_digest() {
        let fetcher = Arc::new(StaticFetcher(Ok(b"abc".to_vec())));
        let record = FetchTask::new(2, "mem://abc", None, fetcher)
            .run()
            .await
            .unwrap();
        assert_eq!(record.task, 2);
        assert_eq!(record.size, 3);
        assert_eq!(record.digest, sha256_hex(b"abc"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_counts_toward_duration() {
        let fetcher = Arc::new(StaticFetcher(Ok(Vec::new())));
        let task = FetchTask::new(0, "mem://", Some(Duration::from_millis(250)), fetcher);
        let record = task.run().await.unwrap();
        assert!(record.duration >= Duration::from_millis(250));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_skips_delay() {
        let fetcher = Arc::new(StaticFetcher(Err(FetchError::Timeout)));
        let task = FetchTask::new(0, "mem://", Some(Duration::from_secs(60)), fetcher);
        let start = tokio::time::Instant::now();
        assert_eq!(task.run().await.unwrap_err(), FetchError::Timeout);
        assert!(start.elapsed() < Duration::from_secs(60));
    }

    #[test]
    fn test_stats_record_serializes_seconds() {
        let record = StatsRecord {
            task: 1,
            duration: Duration::from_millis(1500),
            size: 10,
            digest: "00".to_string(),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["duration_secs"], 1.5);
        assert_eq!(json["size"], 10);
    }
}
