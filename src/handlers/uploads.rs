/// Upload handler - multipart ingest and pipeline kickoff
///
/// Accepts a single file under the multipart field `video`, persists it
/// under a freshly minted video ID, records the video as `uploaded`, and
/// spawns the transcoding pipeline. The response returns as soon as the
/// source is durable; progress is observable through the status API.
use actix_multipart::{Field, Multipart};
use actix_web::{web, HttpRequest, HttpResponse};
use futures_util::StreamExt;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::models::{UploadResponse, VideoRecord};
use crate::services::{pipeline, PipelineContext};
use crate::store::StatusStore;

/// Handle `POST /upload`
pub async fn upload_video(
    req: HttpRequest,
    config: web::Data<Config>,
    store: web::Data<StatusStore>,
    pipeline_ctx: web::Data<PipelineContext>,
    mut payload: Multipart,
) -> Result<HttpResponse> {
    let mut saved: Option<(String, PathBuf)> = None;

    while let Some(item) = payload.next().await {
        let mut field = item
            .map_err(|err| AppError::BadRequest(format!("malformed multipart payload: {err}")))?;
        if field.name() != Some("video") {
            continue;
        }

        let filename = field
            .content_disposition()
            .and_then(|cd| cd.get_filename())
            .map(str::to_owned)
            .unwrap_or_default();
        if filename.is_empty() {
            return Err(AppError::BadRequest("upload is missing a filename".into()));
        }

        let video_id = Uuid::new_v4().to_string();
        let extension = sanitize_extension(&filename);
        tokio::fs::create_dir_all(&config.storage.upload_dir).await?;
        let source_path = config
            .storage
            .upload_dir
            .join(format!("{video_id}.{extension}"));

        let written =
            match stream_to_file(&mut field, &source_path, config.limits.max_content_length).await
            {
                Ok(written) => written,
                Err(err) => {
                    remove_quietly(&source_path).await;
                    return Err(err);
                }
            };
        if written == 0 {
            remove_quietly(&source_path).await;
            return Err(AppError::Internal("uploaded file is empty".into()));
        }

        saved = Some((video_id, source_path));
        break;
    }

    let Some((video_id, source_path)) = saved else {
        return Err(AppError::BadRequest(
            "no file part named \"video\" in the upload".into(),
        ));
    };

    store.insert(&video_id, VideoRecord::new()).await;

    // Workers must be able to fetch the source through whatever proxy sits
    // in front of this service; a URL we cannot determine would strand every
    // conversion job, so the upload is rejected instead.
    let Some(source_url) = derive_source_url(&req, &video_id) else {
        store.remove(&video_id).await;
        remove_quietly(&source_path).await;
        return Err(AppError::Internal(
            "could not determine an externally reachable source URL".into(),
        ));
    };

    tracing::info!(%video_id, %source_url, "upload accepted");
    pipeline::spawn(
        pipeline_ctx.get_ref().clone(),
        video_id.clone(),
        source_url,
        source_path,
    );

    Ok(HttpResponse::Ok().json(UploadResponse {
        success: true,
        video_id,
    }))
}

/// Stream one multipart field to disk, enforcing the upload size limit.
/// Returns the number of bytes written.
async fn stream_to_file(field: &mut Field, path: &Path, limit: u64) -> Result<u64> {
    let mut file = tokio::fs::File::create(path).await?;
    let mut written: u64 = 0;

    while let Some(chunk) = field.next().await {
        let chunk =
            chunk.map_err(|err| AppError::BadRequest(format!("failed to read upload: {err}")))?;
        written += chunk.len() as u64;
        if written > limit {
            return Err(AppError::PayloadTooLarge(format!(
                "upload exceeds the {limit} byte limit"
            )));
        }
        file.write_all(&chunk).await?;
    }

    file.flush().await?;
    Ok(written)
}

async fn remove_quietly(path: &Path) {
    if let Err(err) = tokio::fs::remove_file(path).await {
        if err.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), "failed to remove upload: {}", err);
        }
    }
}

/// Keep only ASCII alphanumerics from the client-supplied extension; default
/// to mp4. The extension is the only client-controlled input that reaches a
/// filesystem path.
fn sanitize_extension(filename: &str) -> String {
    let extension: String = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext)
        .unwrap_or("")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase();
    if extension.is_empty() {
        "mp4".to_string()
    } else {
        extension
    }
}

/// Derive the source URL workers will fetch from. Scheme comes from
/// `X-Forwarded-Proto` (else the connection scheme), host from
/// `X-Forwarded-Host` (else the `Host` header). There is deliberately no
/// localhost fallback: a guessed host produces a pipeline that fails twenty
/// minutes later instead of an upload that fails now.
fn derive_source_url(req: &HttpRequest, video_id: &str) -> Option<String> {
    let scheme = header_value(req, "x-forwarded-proto")
        .unwrap_or_else(|| req.connection_info().scheme().to_string());
    let host = header_value(req, "x-forwarded-host").or_else(|| header_value(req, "host"))?;
    Some(format!("{scheme}://{host}/download_source/{video_id}"))
}

fn header_value(req: &HttpRequest, name: &str) -> Option<String> {
    req.headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_owned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[test]
    fn test_sanitize_extension() {
        assert_eq!(sanitize_extension("clip.mp4"), "mp4");
        assert_eq!(sanitize_extension("CLIP.MOV"), "mov");
        assert_eq!(sanitize_extension("archive.tar.gz"), "gz");
        assert_eq!(sanitize_extension("no_extension"), "mp4");
        assert_eq!(sanitize_extension("evil.../../sh"), "sh");
        assert_eq!(sanitize_extension("dots..."), "mp4");
    }

    #[test]
    fn test_source_url_prefers_forwarded_headers() {
        let req = TestRequest::default()
            .insert_header(("X-Forwarded-Proto", "https"))
            .insert_header(("X-Forwarded-Host", "cdn.example.com"))
            .insert_header(("Host", "internal:5000"))
            .to_http_request();

        assert_eq!(
            derive_source_url(&req, "vid-1").as_deref(),
            Some("https://cdn.example.com/download_source/vid-1")
        );
    }

    #[test]
    fn test_source_url_falls_back_to_host_header() {
        let req = TestRequest::default()
            .insert_header(("Host", "example.com:5000"))
            .to_http_request();

        assert_eq!(
            derive_source_url(&req, "vid-1").as_deref(),
            Some("http://example.com:5000/download_source/vid-1")
        );
    }

    #[test]
    fn test_source_url_requires_a_host() {
        let req = TestRequest::default().to_http_request();
        assert_eq!(derive_source_url(&req, "vid-1"), None);
    }
}
