/// Per-video transcoding pipeline
///
/// Each uploaded video owns one pipeline task driving the state machine
/// `uploaded -> distributing -> polling -> collecting -> manifesting ->
/// ready`, with `error` as the terminal failure state. Sub-operation
/// failures are attributed to the affected variant and the pipeline carries
/// on with whatever survives; only an empty survivor set is fatal.
use crate::config::Config;
use crate::models::{VariantSpec, VideoStatus};
use crate::services::manifest;
use crate::services::worker_client::{ConvertRequest, WorkerClient, WorkerError};
use crate::store::StatusStore;
use futures::future::join_all;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;

/// Shared handles a pipeline task needs. Cheap to clone; one copy is
/// registered as app data so the upload handler can spawn pipelines.
#[derive(Clone)]
pub struct PipelineContext {
    pub config: Arc<Config>,
    pub store: Arc<StatusStore>,
    pub client: WorkerClient,
    pub limiter: Arc<Semaphore>,
}

/// A variant whose worker accepted the conversion job
#[derive(Debug, Clone)]
struct ActiveVariant {
    spec: VariantSpec,
    worker: String,
}

/// Spawn the pipeline for one video. The upload response does not wait for
/// the permit; excess pipelines queue on the semaphore inside the task.
pub fn spawn(ctx: PipelineContext, video_id: String, source_url: String, source_path: std::path::PathBuf) {
    tokio::spawn(async move {
        let _permit = match ctx.limiter.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => return,
        };
        run(&ctx, &video_id, &source_url, &source_path).await;
    });
}

/// Drive one video to a terminal state.
pub async fn run(ctx: &PipelineContext, video_id: &str, source_url: &str, source_path: &Path) {
    tracing::info!(video_id, source_url, "starting transcoding pipeline");

    ctx.store
        .transition(video_id, VideoStatus::Distributing)
        .await;
    let active = distribute(ctx, video_id, source_url).await;
    if active.is_empty() {
        fail(ctx, video_id, "No conversion jobs could be started").await;
        return;
    }

    ctx.store.transition(video_id, VideoStatus::Polling).await;
    let completed = poll_workers(ctx, video_id, active).await;
    if completed.is_empty() {
        fail(ctx, video_id, "No conversion jobs completed").await;
        return;
    }

    ctx.store.transition(video_id, VideoStatus::Collecting).await;
    let collected = collect(ctx, video_id, &completed).await;
    if collected.is_empty() {
        fail(ctx, video_id, "No variant artifacts could be collected").await;
        return;
    }

    ctx.store
        .transition(video_id, VideoStatus::Manifesting)
        .await;
    match write_master(ctx, video_id, &collected).await {
        Ok(manifest_path) => {
            ctx.store
                .update(video_id, |record| {
                    record.status = VideoStatus::Ready;
                    record.manifest_path = Some(manifest_path);
                })
                .await;
            // The record is already ready; a leftover source only costs disk.
            if let Err(err) = tokio::fs::remove_file(source_path).await {
                if err.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(video_id, "failed to remove source file: {}", err);
                }
            }
            tracing::info!(video_id, variants = collected.len(), "video ready");
        }
        Err(message) => fail(ctx, video_id, &message).await,
    }
}

/// Terminal failure: record the reason and commit the error status in one
/// store mutation.
async fn fail(ctx: &PipelineContext, video_id: &str, reason: &str) {
    tracing::error!(video_id, "pipeline failed: {}", reason);
    ctx.store
        .update(video_id, |record| {
            record.append_error(reason);
            record.status = VideoStatus::Error;
        })
        .await;
}

/// Distribute phase: trigger every configured variant concurrently. A
/// variant is active iff its worker accepted the job; every other outcome
/// excludes it with a diagnostic.
async fn distribute(ctx: &PipelineContext, video_id: &str, source_url: &str) -> Vec<ActiveVariant> {
    let mut triggers = Vec::new();
    for spec in &ctx.config.variants {
        let Some(worker) = ctx.config.workers.get(&spec.label) else {
            ctx.store
                .append_error(video_id, &format!("{}: no converter configured", spec.label))
                .await;
            continue;
        };

        let request = ConvertRequest {
            video_id: video_id.to_string(),
            source_url: source_url.to_string(),
            target_height: spec.height,
            video_bitrate: spec.video_bitrate.clone(),
            audio_bitrate: spec.audio_bitrate.clone(),
            timeout: ctx.config.pipeline.ffmpeg_timeout.as_secs(),
        };
        let client = ctx.client.clone();
        let spec = spec.clone();
        let worker = worker.clone();
        triggers.push(async move {
            match client.start(&worker, &request).await {
                Ok(()) => Ok(ActiveVariant { spec, worker }),
                Err(err) => Err((spec.label.clone(), err)),
            }
        });
    }

    let mut active = Vec::new();
    for result in join_all(triggers).await {
        match result {
            Ok(variant) => {
                tracing::info!(video_id, variant = %variant.spec.label, "conversion started");
                active.push(variant);
            }
            Err((label, err)) => {
                ctx.store
                    .append_error(
                        video_id,
                        &format!("{label}: failed to start conversion: {err}"),
                    )
                    .await;
            }
        }
    }
    active
}

/// Poll phase: round-robin over the pending variants with a sleep between
/// dequeues. Transient failures re-enqueue; definite failures drop the
/// variant; the overall deadline fails everything still pending.
async fn poll_workers(
    ctx: &PipelineContext,
    video_id: &str,
    active: Vec<ActiveVariant>,
) -> Vec<ActiveVariant> {
    let mut pending: VecDeque<ActiveVariant> = active.into();
    let mut completed = Vec::new();
    let deadline = Instant::now() + ctx.config.pipeline.poll_deadline;
    let mut first = true;

    while let Some(variant) = pending.pop_front() {
        if !first {
            tokio::time::sleep(ctx.config.pipeline.poll_interval).await;
        }
        first = false;

        if Instant::now() >= deadline {
            pending.push_front(variant);
            while let Some(expired) = pending.pop_front() {
                ctx.store
                    .append_error(
                        video_id,
                        &format!("{}: conversion timed out while polling", expired.spec.label),
                    )
                    .await;
            }
            break;
        }

        let label = variant.spec.label.clone();
        match ctx.client.poll(&variant.worker, video_id).await {
            Ok(status) => match status.status.as_str() {
                "completed" => {
                    tracing::info!(video_id, variant = %label, "conversion completed");
                    ctx.store.mark_quality_done(video_id, &label).await;
                    completed.push(variant);
                }
                "error" => {
                    let reason = status
                        .error
                        .unwrap_or_else(|| "unknown worker error".to_string());
                    ctx.store
                        .append_error(video_id, &format!("{label}: worker reported failure: {reason}"))
                        .await;
                }
                "pending" | "processing" | "downloading" => pending.push_back(variant),
                other => {
                    // Unknown statuses are treated as still running.
                    tracing::debug!(video_id, variant = %label, status = other, "unrecognized worker status");
                    pending.push_back(variant);
                }
            },
            Err(WorkerError::Timeout) => pending.push_back(variant),
            Err(WorkerError::Status(code)) if code == reqwest::StatusCode::NOT_FOUND => {
                ctx.store
                    .append_error(video_id, &format!("{label}: worker lost track of the job"))
                    .await;
            }
            Err(WorkerError::Decode(err)) => {
                ctx.store
                    .append_error(video_id, &format!("{label}: invalid status response: {err}"))
                    .await;
            }
            Err(err) => {
                tracing::debug!(video_id, variant = %label, "status poll failed, retrying: {}", err);
                pending.push_back(variant);
            }
        }
    }

    completed
}

/// Collect phase: download every completed variant's artifacts. A failing
/// variant is cleaned up and excluded without affecting its siblings.
async fn collect(
    ctx: &PipelineContext,
    video_id: &str,
    completed: &[ActiveVariant],
) -> Vec<(VariantSpec, String)> {
    let mut collected = Vec::new();
    for variant in completed {
        match collect_variant(ctx, video_id, variant).await {
            Ok(playlist_path) => {
                tracing::info!(video_id, variant = %variant.spec.label, "artifacts collected");
                collected.push((variant.spec.clone(), playlist_path));
            }
            Err(message) => {
                ctx.store.append_error(video_id, &message).await;
                let dir = ctx
                    .config
                    .storage
                    .hls_dir
                    .join(video_id)
                    .join(&variant.spec.label);
                if let Err(err) = tokio::fs::remove_dir_all(&dir).await {
                    if err.kind() != std::io::ErrorKind::NotFound {
                        tracing::warn!(video_id, "failed to clean up variant dir: {}", err);
                    }
                }
            }
        }
    }
    collected
}

/// Download one variant's artifacts; returns the relative playlist path on
/// success and a diagnostic message on failure.
async fn collect_variant(
    ctx: &PipelineContext,
    video_id: &str,
    variant: &ActiveVariant,
) -> Result<String, String> {
    let label = &variant.spec.label;
    let files = ctx
        .client
        .list(&variant.worker, video_id)
        .await
        .map_err(|err| format!("{label}: failed to list artifacts: {err}"))?;

    if files.is_empty() {
        return Err(format!("{label}: worker produced no artifacts"));
    }

    let dir = ctx.config.storage.hls_dir.join(video_id).join(label);
    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(|err| format!("{label}: failed to create variant dir: {err}"))?;

    let mut playlist = None;
    for filename in &files {
        if !is_safe_artifact_name(filename) {
            return Err(format!("{label}: unsafe artifact filename {filename:?}"));
        }
        ctx.client
            .fetch(&variant.worker, video_id, filename, &dir.join(filename))
            .await
            .map_err(|err| format!("{label}: failed to download {filename}: {err}"))?;
        if filename.ends_with(".m3u8") {
            playlist = Some(filename.clone());
        }
    }

    match playlist {
        Some(name) => Ok(format!("{label}/{name}")),
        None => Err(format!("{label}: no playlist found among artifacts")),
    }
}

/// Manifest phase: write master.m3u8 and return its store-relative path.
async fn write_master(
    ctx: &PipelineContext,
    video_id: &str,
    collected: &[(VariantSpec, String)],
) -> Result<String, String> {
    let content = manifest::master_playlist(collected);
    let dir = ctx.config.storage.hls_dir.join(video_id);
    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(|err| format!("failed to create HLS dir: {err}"))?;
    tokio::fs::write(dir.join("master.m3u8"), content)
        .await
        .map_err(|err| format!("failed to write master playlist: {err}"))?;
    Ok(format!("{video_id}/master.m3u8"))
}

/// Worker-supplied filenames are joined under the variant directory; reject
/// anything that could escape it.
fn is_safe_artifact_name(name: &str) -> bool {
    !name.is_empty() && !name.starts_with('/') && !name.contains("..")
}
