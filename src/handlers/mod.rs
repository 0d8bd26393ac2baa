/// HTTP handlers for transcode-service
///
/// This module contains handlers for:
/// - uploads: multipart ingest and pipeline kickoff
/// - status: per-video status polling, listing, purge
/// - hls: playlist and segment delivery to viewers
/// - source: source file delivery to converter workers
/// - pages: redirect, upload form, player page, health

pub mod hls;
pub mod pages;
pub mod source;
pub mod status;
pub mod uploads;

use actix_web::web;

/// Video IDs end up in filesystem paths; restrict them to the UUID charset
/// before any join.
pub fn is_valid_video_id(video_id: &str) -> bool {
    !video_id.is_empty()
        && video_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-')
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(pages::index))
        .route("/health", web::get().to(pages::health))
        .route("/upload", web::get().to(pages::upload_page))
        .route("/upload", web::post().to(uploads::upload_video))
        .route("/watch/{video_id}", web::get().to(pages::watch_page))
        .route("/status/{video_id}", web::get().to(status::get_status))
        .route("/videos", web::get().to(status::list_videos))
        .route("/videos/{video_id}", web::delete().to(status::purge_video))
        .route("/hls/{video_id}/{asset:.*}", web::get().to(hls::serve_asset))
        .route(
            "/download_source/{video_id}",
            web::get().to(source::download_source),
        );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_video_id_charset() {
        assert!(is_valid_video_id(
            "550e8400-e29b-41d4-a716-446655440000"
        ));
        assert!(is_valid_video_id("abc123"));
        assert!(!is_valid_video_id(""));
        assert!(!is_valid_video_id("../etc"));
        assert!(!is_valid_video_id("id with spaces"));
        assert!(!is_valid_video_id("id$"));
    }
}
