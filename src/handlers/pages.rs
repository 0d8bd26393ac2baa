/// Viewer-facing pages and service introspection
///
/// The HTML here is deliberately minimal; this service's job is the
/// pipeline, not the frontend.
use actix_web::http::header;
use actix_web::{web, HttpResponse};

use crate::error::{AppError, Result};
use crate::handlers::is_valid_video_id;

const UPLOAD_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><title>Upload a video</title></head>
<body>
  <h1>Upload a video</h1>
  <form action="/upload" method="post" enctype="multipart/form-data">
    <input type="file" name="video" accept="video/*" required>
    <button type="submit">Upload</button>
  </form>
</body>
</html>
"#;

const WATCH_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head>
  <title>Watch</title>
  <script src="https://cdn.jsdelivr.net/npm/hls.js@1"></script>
</head>
<body>
  <video id="player" controls width="960"></video>
  <pre id="state">loading...</pre>
  <script>
    const videoId = "{video_id}";
    const state = document.getElementById("state");
    const player = document.getElementById("player");

    async function poll() {
      const res = await fetch(`/status/${videoId}`);
      const body = await res.json();
      state.textContent = JSON.stringify(body, null, 2);
      if (body.status === "ready" && body.manifest_path) {
        const src = `/hls/${body.manifest_path}`;
        if (Hls.isSupported()) {
          const hls = new Hls();
          hls.loadSource(src);
          hls.attachMedia(player);
        } else {
          player.src = src;
        }
        return;
      }
      if (body.status !== "error" && body.status !== "not_found") {
        setTimeout(poll, 3000);
      }
    }
    poll();
  </script>
</body>
</html>
"#;

/// Handle `GET /`
pub async fn index() -> HttpResponse {
    HttpResponse::Found()
        .insert_header((header::LOCATION, "/upload"))
        .finish()
}

/// Handle `GET /health`
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({"status": "ok"}))
}

/// Handle `GET /upload`
pub async fn upload_page() -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(UPLOAD_PAGE)
}

/// Handle `GET /watch/{video_id}`
pub async fn watch_page(video_id: web::Path<String>) -> Result<HttpResponse> {
    let video_id = video_id.into_inner();
    if !is_valid_video_id(&video_id) {
        return Err(AppError::BadRequest("invalid video id".into()));
    }
    Ok(HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(WATCH_PAGE.replace("{video_id}", &video_id)))
}
