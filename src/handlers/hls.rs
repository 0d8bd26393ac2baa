/// HLS delivery - master playlist, variant playlists, and segments
///
/// Artifacts are immutable once the manifest phase finished, so plain
/// streamed reads are enough. Responses carry a permissive CORS header so
/// players on other origins can consume the stream.
use actix_web::http::header;
use actix_web::{web, HttpResponse};
use std::path::Path;
use tokio_util::io::ReaderStream;

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::handlers::is_valid_video_id;

/// Handle `GET /hls/{video_id}/{asset}`
pub async fn serve_asset(
    config: web::Data<Config>,
    path: web::Path<(String, String)>,
) -> Result<HttpResponse> {
    let (video_id, asset) = path.into_inner();
    if !is_valid_video_id(&video_id) {
        return Err(AppError::BadRequest("invalid video id".into()));
    }
    if asset.is_empty() || asset.starts_with('/') || asset.contains("..") {
        return Err(AppError::BadRequest("invalid asset path".into()));
    }

    let base = config.storage.hls_dir.join(&video_id);
    let requested = base.join(&asset);

    // Resolve symlinks and dot segments, then require the result to still
    // live under this video's directory.
    let base = tokio::fs::canonicalize(&base)
        .await
        .map_err(|_| AppError::NotFound("unknown video".into()))?;
    let resolved = tokio::fs::canonicalize(&requested)
        .await
        .map_err(|_| AppError::NotFound("asset not found".into()))?;
    if !resolved.starts_with(&base) {
        return Err(AppError::BadRequest("invalid asset path".into()));
    }

    let metadata = tokio::fs::metadata(&resolved).await?;
    if !metadata.is_file() {
        return Err(AppError::NotFound("asset not found".into()));
    }

    let file = tokio::fs::File::open(&resolved).await?;
    Ok(HttpResponse::Ok()
        .content_type(asset_content_type(&resolved))
        .insert_header((header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"))
        .streaming(ReaderStream::new(file)))
}

fn asset_content_type(path: &Path) -> &'static str {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("m3u8") => "application/vnd.apple.mpegurl",
        Some("ts") => "video/mp2t",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_asset_content_types() {
        assert_eq!(
            asset_content_type(&PathBuf::from("v/master.m3u8")),
            "application/vnd.apple.mpegurl"
        );
        assert_eq!(
            asset_content_type(&PathBuf::from("v/720p/segment000.ts")),
            "video/mp2t"
        );
        assert_eq!(
            asset_content_type(&PathBuf::from("v/thumb.jpg")),
            "application/octet-stream"
        );
    }
}
