/// Persistent status store
///
/// Process-wide ordered map of `video_id -> VideoRecord`. All mutation goes
/// through a single update entry point serialized by one mutex; the full map
/// is rewritten to the status file before the lock is released, so the
/// on-disk snapshot always matches the last completed mutation.
use crate::models::{VideoRecord, VideoStatus};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio::sync::Mutex;

pub struct StatusStore {
    path: PathBuf,
    records: Mutex<BTreeMap<String, VideoRecord>>,
}

impl StatusStore {
    /// Load the store from disk. A missing file starts empty; an unreadable
    /// or corrupt file is logged and left in place, and the store starts
    /// empty rather than refusing to boot.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let records = match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(map) => map,
                Err(err) => {
                    tracing::warn!(
                        path = %path.display(),
                        "status file is not valid JSON, starting empty: {}",
                        err
                    );
                    BTreeMap::new()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => {
                tracing::warn!(
                    path = %path.display(),
                    "failed to read status file, starting empty: {}",
                    err
                );
                BTreeMap::new()
            }
        };

        Self {
            path,
            records: Mutex::new(records),
        }
    }

    /// Snapshot of one record
    pub async fn get(&self, video_id: &str) -> Option<VideoRecord> {
        self.records.lock().await.get(video_id).cloned()
    }

    /// Snapshot of the whole map
    pub async fn all(&self) -> BTreeMap<String, VideoRecord> {
        self.records.lock().await.clone()
    }

    pub async fn insert(&self, video_id: &str, record: VideoRecord) {
        let mut records = self.records.lock().await;
        records.insert(video_id.to_string(), record);
        self.persist(&records).await;
    }

    pub async fn remove(&self, video_id: &str) -> Option<VideoRecord> {
        let mut records = self.records.lock().await;
        let removed = records.remove(video_id);
        if removed.is_some() {
            self.persist(&records).await;
        }
        removed
    }

    /// Single update entry point. Every state change funnels through here;
    /// `updated_at` is bumped and the map is rewritten under the same lock.
    /// Returns false when the record does not exist.
    pub async fn update<F>(&self, video_id: &str, mutate: F) -> bool
    where
        F: FnOnce(&mut VideoRecord),
    {
        let mut records = self.records.lock().await;
        let Some(record) = records.get_mut(video_id) else {
            return false;
        };
        mutate(record);
        record.updated_at = chrono::Utc::now();
        self.persist(&records).await;
        true
    }

    /// Advance to a non-terminal phase. Terminal records are left untouched.
    pub async fn transition(&self, video_id: &str, status: VideoStatus) {
        self.update(video_id, |record| {
            if record.status.is_terminal() && !status.is_terminal() {
                tracing::warn!(
                    video_id,
                    from = record.status.as_str(),
                    to = status.as_str(),
                    "refusing to regress a terminal record"
                );
                return;
            }
            record.status = status;
        })
        .await;
    }

    pub async fn append_error(&self, video_id: &str, message: &str) {
        tracing::warn!(video_id, "{}", message);
        self.update(video_id, |record| record.append_error(message))
            .await;
    }

    pub async fn mark_quality_done(&self, video_id: &str, label: &str) {
        self.update(video_id, |record| {
            record.qualities_done.insert(label.to_string());
        })
        .await;
    }

    /// Startup sweep: records a previous process left in non-terminal states
    /// have no owning pipeline task anymore and would look stuck forever.
    /// They are failed with an explanatory diagnostic. Returns the number of
    /// records swept.
    pub async fn fail_interrupted(&self) -> usize {
        let mut records = self.records.lock().await;
        let mut swept = 0;
        for (video_id, record) in records.iter_mut() {
            if record.status.is_terminal() {
                continue;
            }
            tracing::warn!(
                %video_id,
                status = record.status.as_str(),
                "marking interrupted video as failed"
            );
            record.append_error("processing interrupted by service restart");
            record.status = VideoStatus::Error;
            record.updated_at = chrono::Utc::now();
            swept += 1;
        }
        if swept > 0 {
            self.persist(&records).await;
        }
        swept
    }

    /// Rewrite the snapshot file. Writes a temp file and renames it over the
    /// target so readers never observe a partial write. Persistence failures
    /// are logged; the in-memory map stays authoritative.
    async fn persist(&self, records: &BTreeMap<String, VideoRecord>) {
        let json = match serde_json::to_vec_pretty(records) {
            Ok(json) => json,
            Err(err) => {
                tracing::error!("failed to serialize status map: {}", err);
                return;
            }
        };

        let tmp = self.path.with_extension("json.tmp");
        let result = async {
            tokio::fs::write(&tmp, &json).await?;
            tokio::fs::rename(&tmp, &self.path).await
        }
        .await;

        if let Err(err) = result {
            tracing::error!(path = %self.path.display(), "failed to persist status map: {}", err);
        }
    }
}
