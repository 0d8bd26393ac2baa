/// Data models for transcode-service
///
/// This module defines:
/// - VideoRecord: per-video pipeline state, persisted across restarts
/// - VariantSpec: one target rendition (label, height, bitrates)
/// - Response DTOs for the status and upload endpoints
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// ========================================
// Video Models
// ========================================

/// Video status in the pipeline lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoStatus {
    Uploaded,
    Distributing,
    Polling,
    Collecting,
    Manifesting,
    Ready,
    Error,
}

impl VideoStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uploaded => "uploaded",
            Self::Distributing => "distributing",
            Self::Polling => "polling",
            Self::Collecting => "collecting",
            Self::Manifesting => "manifesting",
            Self::Ready => "ready",
            Self::Error => "error",
        }
    }

    /// Terminal states are never overwritten by a later transition.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ready | Self::Error)
    }
}

/// Per-video pipeline state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoRecord {
    pub status: VideoStatus,
    #[serde(default)]
    pub qualities_done: BTreeSet<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub manifest_path: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl VideoRecord {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            status: VideoStatus::Uploaded,
            qualities_done: BTreeSet::new(),
            error: None,
            manifest_path: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Append a diagnostic message. Existing messages are never truncated;
    /// entries are joined by newline.
    pub fn append_error(&mut self, message: &str) {
        match self.error {
            Some(ref mut existing) => {
                existing.push('\n');
                existing.push_str(message);
            }
            None => self.error = Some(message.to_string()),
        }
    }
}

impl Default for VideoRecord {
    fn default() -> Self {
        Self::new()
    }
}

// ========================================
// Variant configuration
// ========================================

/// One target rendition. Bitrates are in ffmpeg notation (e.g. "2800k").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantSpec {
    pub label: String,
    pub height: u32,
    pub video_bitrate: String,
    pub audio_bitrate: String,
}

impl VariantSpec {
    pub fn new(label: &str, height: u32, video_bitrate: &str, audio_bitrate: &str) -> Self {
        Self {
            label: label.to_string(),
            height,
            video_bitrate: video_bitrate.to_string(),
            audio_bitrate: audio_bitrate.to_string(),
        }
    }
}

// ========================================
// Response DTOs
// ========================================

/// Status response DTO
///
/// Unknown IDs are reported as `status: "not_found"` with HTTP 200 so the
/// player page can poll every video with a uniform contract.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
    pub error: Option<String>,
    pub qualities_done: Vec<String>,
    pub manifest_path: Option<String>,
}

impl StatusResponse {
    pub fn from_record(record: &VideoRecord) -> Self {
        Self {
            status: record.status.as_str().to_string(),
            error: record.error.clone(),
            qualities_done: record.qualities_done.iter().cloned().collect(),
            manifest_path: record.manifest_path.clone(),
        }
    }

    pub fn not_found() -> Self {
        Self {
            status: "not_found".to_string(),
            error: None,
            qualities_done: Vec::new(),
            manifest_path: None,
        }
    }
}

/// Upload response DTO
#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub success: bool,
    pub video_id: String,
}

/// Summary row for the video listing endpoint
#[derive(Debug, Serialize)]
pub struct VideoSummary {
    pub video_id: String,
    pub status: String,
    pub qualities_done: Vec<String>,
    pub manifest_path: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl VideoSummary {
    pub fn from_record(video_id: &str, record: &VideoRecord) -> Self {
        Self {
            video_id: video_id.to_string(),
            status: record.status.as_str().to_string(),
            qualities_done: record.qualities_done.iter().cloned().collect(),
            manifest_path: record.manifest_path.clone(),
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}
