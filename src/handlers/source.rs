/// Source delivery - serves uploaded files to converter workers
///
/// Workers fetch the original upload by video ID. The upload directory is
/// keyed `<video_id>.<ext>`, so exactly one file may match; zero or several
/// matches indicate a missing or inconsistent store.
use actix_web::http::header;
use actix_web::{web, HttpResponse};
use std::path::{Path, PathBuf};
use tokio_util::io::ReaderStream;

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::handlers::is_valid_video_id;
use crate::store::StatusStore;

/// Handle `GET /download_source/{video_id}`
pub async fn download_source(
    config: web::Data<Config>,
    store: web::Data<StatusStore>,
    video_id: web::Path<String>,
) -> Result<HttpResponse> {
    let video_id = video_id.into_inner();
    if !is_valid_video_id(&video_id) {
        return Err(AppError::BadRequest("invalid video id".into()));
    }

    let matches = find_source_files(&config.storage.upload_dir, &video_id).await?;
    match matches.as_slice() {
        [] => {
            // A live record without its source file means the pipeline is
            // about to fail; surface that as an inconsistency, not a 404.
            let in_flight = store
                .get(&video_id)
                .await
                .map(|record| !record.status.is_terminal())
                .unwrap_or(false);
            if in_flight {
                Err(AppError::Internal(
                    "source file missing for an in-flight video".into(),
                ))
            } else {
                Err(AppError::NotFound("no source for this video".into()))
            }
        }
        [path] => serve_source(path).await,
        _ => Err(AppError::Internal(
            "multiple source files match this video".into(),
        )),
    }
}

async fn find_source_files(dir: &Path, video_id: &str) -> Result<Vec<PathBuf>> {
    let prefix = format!("{video_id}.");
    let mut matches = Vec::new();

    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(matches),
        Err(err) => return Err(err.into()),
    };
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_name().to_string_lossy().starts_with(&prefix) {
            matches.push(entry.path());
        }
    }
    Ok(matches)
}

async fn serve_source(path: &Path) -> Result<HttpResponse> {
    let metadata = tokio::fs::metadata(path).await?;
    if metadata.len() == 0 {
        return Err(AppError::Internal("source file is empty".into()));
    }

    let file = tokio::fs::File::open(path).await?;
    Ok(HttpResponse::Ok()
        .content_type(source_content_type(path))
        .insert_header((header::CONTENT_DISPOSITION, "inline"))
        .streaming(ReaderStream::new(file)))
}

fn source_content_type(path: &Path) -> &'static str {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("mp4") | Some("m4v") => "video/mp4",
        Some("mov") => "video/quicktime",
        Some("webm") => "video/webm",
        Some("avi") => "video/x-msvideo",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_prefix_matching_is_exact() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("vid-1.mp4"), b"data").unwrap();
        std::fs::write(dir.path().join("vid-10.mp4"), b"data").unwrap();

        let matches = find_source_files(dir.path(), "vid-1").await.unwrap();
        assert_eq!(matches.len(), 1);
        assert!(matches[0].ends_with("vid-1.mp4"));
    }

    #[tokio::test]
    async fn test_missing_upload_dir_means_no_matches() {
        let matches = find_source_files(Path::new("does/not/exist"), "vid-1")
            .await
            .unwrap();
        assert!(matches.is_empty());
    }

    #[test]
    fn test_source_content_types() {
        assert_eq!(source_content_type(Path::new("a/v.mp4")), "video/mp4");
        assert_eq!(source_content_type(Path::new("a/v.webm")), "video/webm");
        assert_eq!(
            source_content_type(Path::new("a/v.bin")),
            "application/octet-stream"
        );
    }
}
