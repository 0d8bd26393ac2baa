/// Status handlers - per-video progress, listing, and purge
use actix_web::{web, HttpResponse};

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::handlers::is_valid_video_id;
use crate::models::{StatusResponse, VideoSummary};
use crate::store::StatusStore;

/// Handle `GET /status/{video_id}`
///
/// Unknown IDs answer 200 with `status: "not_found"` so the player page can
/// poll every video with the same contract.
pub async fn get_status(
    store: web::Data<StatusStore>,
    video_id: web::Path<String>,
) -> Result<HttpResponse> {
    let video_id = video_id.into_inner();
    let response = match store.get(&video_id).await {
        Some(record) => StatusResponse::from_record(&record),
        None => StatusResponse::not_found(),
    };
    Ok(HttpResponse::Ok().json(response))
}

/// Handle `GET /videos`
pub async fn list_videos(store: web::Data<StatusStore>) -> Result<HttpResponse> {
    let records = store.all().await;
    let summaries: Vec<VideoSummary> = records
        .iter()
        .map(|(video_id, record)| VideoSummary::from_record(video_id, record))
        .collect();
    Ok(HttpResponse::Ok().json(summaries))
}

/// Handle `DELETE /videos/{video_id}`
///
/// Removes the record along with any source file and HLS artifacts.
pub async fn purge_video(
    store: web::Data<StatusStore>,
    config: web::Data<Config>,
    video_id: web::Path<String>,
) -> Result<HttpResponse> {
    let video_id = video_id.into_inner();
    if !is_valid_video_id(&video_id) {
        return Err(AppError::BadRequest("invalid video id".into()));
    }

    if store.remove(&video_id).await.is_none() {
        return Err(AppError::NotFound("unknown video".into()));
    }

    let hls_dir = config.storage.hls_dir.join(&video_id);
    if let Err(err) = tokio::fs::remove_dir_all(&hls_dir).await {
        if err.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(%video_id, "failed to remove HLS artifacts: {}", err);
        }
    }

    let prefix = format!("{video_id}.");
    if let Ok(mut entries) = tokio::fs::read_dir(&config.storage.upload_dir).await {
        while let Ok(Some(entry)) = entries.next_entry().await {
            if entry.file_name().to_string_lossy().starts_with(&prefix) {
                if let Err(err) = tokio::fs::remove_file(entry.path()).await {
                    tracing::warn!(%video_id, "failed to remove source file: {}", err);
                }
            }
        }
    }

    tracing::info!(%video_id, "video purged");
    Ok(HttpResponse::NoContent().finish())
}
