/// HTTP client for converter workers
///
/// Wraps the four operations of the worker contract: trigger a conversion,
/// poll its status, list the produced artifacts, and download one artifact.
/// Each call carries its own timeout; retry policy lives in the pipeline,
/// which knows which failures are worth another round and which are not.
use crate::config::PipelineConfig;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("worker rejected the job: {0}")]
    Rejected(String),

    #[error("request timed out")]
    Timeout,

    #[error("worker returned HTTP {0}")]
    Status(reqwest::StatusCode),

    #[error("invalid worker response: {0}")]
    Decode(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("failed to store artifact: {0}")]
    Io(String),
}

impl From<reqwest::Error> for WorkerError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            WorkerError::Timeout
        } else if err.is_decode() {
            WorkerError::Decode(err.to_string())
        } else {
            WorkerError::Transport(err.to_string())
        }
    }
}

/// Conversion job request, POSTed to `<worker>/convert`
#[derive(Debug, Clone, Serialize)]
pub struct ConvertRequest {
    pub video_id: String,
    pub source_url: String,
    pub target_height: u32,
    pub video_bitrate: String,
    pub audio_bitrate: String,
    /// Advisory encode timeout in seconds
    pub timeout: u64,
}

#[derive(Debug, Deserialize)]
struct ConvertResponse {
    status: String,
    #[serde(default)]
    error: Option<String>,
}

/// Status reported by `<worker>/status/<video_id>`
#[derive(Debug, Clone, Deserialize)]
pub struct JobStatus {
    pub status: String,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FileListing {
    files: Vec<String>,
}

#[derive(Clone)]
pub struct WorkerClient {
    http: reqwest::Client,
    trigger_timeout: Duration,
    poll_timeout: Duration,
    list_timeout: Duration,
    fetch_timeout: Duration,
}

impl WorkerClient {
    pub fn new(config: &PipelineConfig) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().build()?;
        Ok(Self {
            http,
            trigger_timeout: config.trigger_timeout,
            poll_timeout: config.poll_timeout,
            list_timeout: config.list_timeout,
            fetch_timeout: config.fetch_timeout,
        })
    }

    /// Trigger a conversion. Ok means the worker answered
    /// `{"status": "processing_started"}`; anything else is an error the
    /// pipeline attributes to this variant.
    pub async fn start(&self, base_url: &str, request: &ConvertRequest) -> Result<(), WorkerError> {
        let response = self
            .http
            .post(format!("{}/convert", base_url.trim_end_matches('/')))
            .timeout(self.trigger_timeout)
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(WorkerError::Status(response.status()));
        }

        let body: ConvertResponse = response.json().await?;
        if body.status == "processing_started" {
            Ok(())
        } else {
            Err(WorkerError::Rejected(body.error.unwrap_or_else(|| {
                format!("unexpected trigger status {:?}", body.status)
            })))
        }
    }

    /// Poll the job status for one video on one worker
    pub async fn poll(&self, base_url: &str, video_id: &str) -> Result<JobStatus, WorkerError> {
        let response = self
            .http
            .get(format!(
                "{}/status/{}",
                base_url.trim_end_matches('/'),
                video_id
            ))
            .timeout(self.poll_timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(WorkerError::Status(response.status()));
        }

        Ok(response.json().await?)
    }

    /// List the artifact filenames a completed worker produced
    pub async fn list(&self, base_url: &str, video_id: &str) -> Result<Vec<String>, WorkerError> {
        let response = self
            .http
            .get(format!(
                "{}/files/{}",
                base_url.trim_end_matches('/'),
                video_id
            ))
            .timeout(self.list_timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(WorkerError::Status(response.status()));
        }

        let listing: FileListing = response.json().await?;
        Ok(listing.files)
    }

    /// Stream one artifact to disk
    pub async fn fetch(
        &self,
        base_url: &str,
        video_id: &str,
        filename: &str,
        destination: &Path,
    ) -> Result<(), WorkerError> {
        let response = self
            .http
            .get(format!(
                "{}/files/{}/{}",
                base_url.trim_end_matches('/'),
                video_id,
                filename
            ))
            .timeout(self.fetch_timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(WorkerError::Status(response.status()));
        }

        let mut file = tokio::fs::File::create(destination)
            .await
            .map_err(|err| WorkerError::Io(err.to_string()))?;

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk: bytes::Bytes = chunk?;
            file.write_all(&chunk)
                .await
                .map_err(|err| WorkerError::Io(err.to_string()))?;
        }

        file.flush()
            .await
            .map_err(|err| WorkerError::Io(err.to_string()))?;
        Ok(())
    }
}
