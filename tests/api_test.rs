//! Endpoint-level tests for the HTTP surface.

use actix_web::http::{header, StatusCode};
use actix_web::{test, web, App};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

use transcode_service::config::{AppConfig, Config, LimitsConfig, PipelineConfig, StorageConfig};
use transcode_service::handlers;
use transcode_service::models::{StatusResponse, UploadResponse, VariantSpec, VideoRecord, VideoStatus};
use transcode_service::services::{PipelineContext, WorkerClient};
use transcode_service::store::StatusStore;

struct TestState {
    config: web::Data<Config>,
    store: web::Data<StatusStore>,
    ctx: web::Data<PipelineContext>,
}

fn test_state(root: &Path, max_content_length: u64) -> TestState {
    // Port 1 is never listening; pipeline triggers fail fast with a
    // connection error instead of hanging the test.
    let config = Config {
        app: AppConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
        },
        storage: StorageConfig {
            upload_dir: root.join("uploads"),
            hls_dir: root.join("hls"),
            status_file: root.join("video_status.json"),
        },
        limits: LimitsConfig { max_content_length },
        workers: BTreeMap::from([
            ("360p".to_string(), "http://127.0.0.1:1".to_string()),
            ("480p".to_string(), "http://127.0.0.1:1".to_string()),
            ("720p".to_string(), "http://127.0.0.1:1".to_string()),
        ]),
        variants: vec![
            VariantSpec::new("360p", 360, "800k", "96k"),
            VariantSpec::new("480p", 480, "1400k", "128k"),
            VariantSpec::new("720p", 720, "2800k", "128k"),
        ],
        pipeline: PipelineConfig {
            trigger_timeout: Duration::from_secs(2),
            poll_timeout: Duration::from_secs(2),
            list_timeout: Duration::from_secs(2),
            fetch_timeout: Duration::from_secs(2),
            poll_interval: Duration::from_millis(10),
            ffmpeg_timeout: Duration::from_secs(2),
            poll_deadline: Duration::from_secs(5),
            max_concurrent: 2,
        },
    };

    let config = Arc::new(config);
    let store = Arc::new(StatusStore::load(&config.storage.status_file));
    let client = WorkerClient::new(&config.pipeline).unwrap();
    let ctx = PipelineContext {
        config: config.clone(),
        store: store.clone(),
        client,
        limiter: Arc::new(Semaphore::new(config.pipeline.max_concurrent)),
    };

    TestState {
        config: web::Data::from(config),
        store: web::Data::from(store),
        ctx: web::Data::new(ctx),
    }
}

macro_rules! test_app {
    ($state:expr) => {
        test::init_service(
            App::new()
                .app_data($state.config.clone())
                .app_data($state.store.clone())
                .app_data($state.ctx.clone())
                .configure(handlers::configure_routes),
        )
        .await
    };
}

fn multipart_payload(data: &[u8]) -> (String, Vec<u8>) {
    let boundary = "test-boundary";
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"video\"; \
             filename=\"clip.mp4\"\r\nContent-Type: video/mp4\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    (format!("multipart/form-data; boundary={boundary}"), body)
}

#[actix_web::test]
async fn unknown_video_polls_as_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path(), 1024);
    let app = test_app!(state);

    let req = test::TestRequest::get()
        .uri("/status/no-such-video")
        .to_request();
    let response: StatusResponse = test::call_and_read_body_json(&app, req).await;

    assert_eq!(response.status, "not_found");
    assert!(response.qualities_done.is_empty());
}

#[actix_web::test]
async fn status_survives_a_restart() {
    let dir = tempfile::tempdir().unwrap();

    let first = test_state(dir.path(), 1024);
    first.store.insert("vid-1", VideoRecord::new()).await;
    first
        .store
        .update("vid-1", |record| {
            record.status = VideoStatus::Ready;
            record.qualities_done.insert("360p".to_string());
            record.qualities_done.insert("720p".to_string());
            record.manifest_path = Some("vid-1/master.m3u8".to_string());
            record.append_error("480p: worker reported failure: encode crashed");
        })
        .await;

    let app = test_app!(first);
    let req = test::TestRequest::get().uri("/status/vid-1").to_request();
    let before: serde_json::Value = test::call_and_read_body_json(&app, req).await;

    // A second state on the same directory plays the restarted process.
    let second = test_state(dir.path(), 1024);
    let app = test_app!(second);
    let req = test::TestRequest::get().uri("/status/vid-1").to_request();
    let after: serde_json::Value = test::call_and_read_body_json(&app, req).await;

    assert_eq!(before, after);
    assert_eq!(after["status"], "ready");
    assert_eq!(after["manifest_path"], "vid-1/master.m3u8");
}

#[actix_web::test]
async fn hls_serves_playlists_with_mime_and_cors() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path(), 1024);

    let video_dir = dir.path().join("hls").join("vid-1");
    std::fs::create_dir_all(video_dir.join("720p")).unwrap();
    std::fs::write(video_dir.join("master.m3u8"), "#EXTM3U\n").unwrap();
    std::fs::write(video_dir.join("720p").join("segment000.ts"), [0x47u8; 188]).unwrap();

    let app = test_app!(state);

    let req = test::TestRequest::get()
        .uri("/hls/vid-1/master.m3u8")
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(
        res.headers().get(header::CONTENT_TYPE).unwrap(),
        "application/vnd.apple.mpegurl"
    );
    assert_eq!(
        res.headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .unwrap(),
        "*"
    );
    let body = test::read_body(res).await;
    assert_eq!(&body[..], b"#EXTM3U\n");

    let req = test::TestRequest::get()
        .uri("/hls/vid-1/720p/segment000.ts")
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers().get(header::CONTENT_TYPE).unwrap(), "video/mp2t");

    // Immutable artifacts: a second read returns identical bytes.
    let req = test::TestRequest::get()
        .uri("/hls/vid-1/master.m3u8")
        .to_request();
    let again = test::call_service(&app, req).await;
    assert_eq!(&test::read_body(again).await[..], b"#EXTM3U\n");
}

#[actix_web::test]
async fn hls_rejects_bad_ids_and_traversal() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path(), 1024);
    std::fs::create_dir_all(dir.path().join("hls").join("vid-1")).unwrap();
    let app = test_app!(state);

    let req = test::TestRequest::get()
        .uri("/hls/vid-1/..%2F..%2Fvideo_status.json")
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let req = test::TestRequest::get()
        .uri("/hls/bad%24id/master.m3u8")
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let req = test::TestRequest::get()
        .uri("/hls/vid-1/missing.m3u8")
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn source_endpoint_validates_and_streams() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path(), 1024);
    std::fs::create_dir_all(dir.path().join("uploads")).unwrap();
    std::fs::write(dir.path().join("uploads").join("vid-1.mp4"), b"sourcedata").unwrap();
    let app = test_app!(state);

    let req = test::TestRequest::get()
        .uri("/download_source/bad%24id")
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let req = test::TestRequest::get()
        .uri("/download_source/vid-2")
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let req = test::TestRequest::get()
        .uri("/download_source/vid-1")
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers().get(header::CONTENT_TYPE).unwrap(), "video/mp4");
    assert_eq!(
        res.headers().get(header::CONTENT_DISPOSITION).unwrap(),
        "inline"
    );
    assert_eq!(&test::read_body(res).await[..], b"sourcedata");
}

#[actix_web::test]
async fn source_inconsistencies_are_server_errors() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path(), 1024);
    std::fs::create_dir_all(dir.path().join("uploads")).unwrap();

    // A record that is still being processed but has lost its file.
    state.store.insert("vid-live", VideoRecord::new()).await;

    // Two files claiming the same video.
    std::fs::write(dir.path().join("uploads").join("vid-dup.mp4"), b"a").unwrap();
    std::fs::write(dir.path().join("uploads").join("vid-dup.mov"), b"b").unwrap();

    // An empty source file.
    std::fs::write(dir.path().join("uploads").join("vid-empty.mp4"), b"").unwrap();

    let app = test_app!(state);
    for video_id in ["vid-live", "vid-dup", "vid-empty"] {
        let req = test::TestRequest::get()
            .uri(&format!("/download_source/{video_id}"))
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(
            res.status(),
            StatusCode::INTERNAL_SERVER_ERROR,
            "expected 500 for {video_id}"
        );
    }
}

#[actix_web::test]
async fn upload_requires_a_video_field() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path(), 1024);
    let app = test_app!(state);

    let boundary = "test-boundary";
    let body = format!(
        "--{boundary}\r\nContent-Disposition: form-data; name=\"other\"; \
         filename=\"x.mp4\"\r\n\r\ndata\r\n--{boundary}--\r\n"
    );
    let req = test::TestRequest::post()
        .uri("/upload")
        .insert_header((
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={boundary}"),
        ))
        .insert_header(("Host", "example.com:5000"))
        .set_payload(body)
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let body: serde_json::Value = test::read_body_json(res).await;
    assert_eq!(body["success"], false);
}

#[actix_web::test]
async fn upload_accepts_a_file_and_creates_a_record() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path(), 1024);
    let app = test_app!(state);

    let (content_type, body) = multipart_payload(&[0xABu8; 512]);
    let req = test::TestRequest::post()
        .uri("/upload")
        .insert_header((header::CONTENT_TYPE, content_type))
        .insert_header(("Host", "example.com:5000"))
        .set_payload(body)
        .to_request();
    let response: UploadResponse = test::call_and_read_body_json(&app, req).await;

    assert!(response.success);
    assert!(state.store.get(&response.video_id).await.is_some());

    let saved: Vec<_> = std::fs::read_dir(dir.path().join("uploads"))
        .unwrap()
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            entry
                .file_name()
                .to_string_lossy()
                .starts_with(&response.video_id)
        })
        .collect();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].metadata().unwrap().len(), 512);
}

#[actix_web::test]
async fn upload_size_limit_is_exact() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path(), 512);
    let app = test_app!(state);

    // Exactly at the limit: accepted.
    let (content_type, body) = multipart_payload(&[0x01u8; 512]);
    let req = test::TestRequest::post()
        .uri("/upload")
        .insert_header((header::CONTENT_TYPE, content_type))
        .insert_header(("Host", "example.com:5000"))
        .set_payload(body)
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::OK);

    // One byte over: rejected, nothing new left on disk.
    let before = std::fs::read_dir(dir.path().join("uploads")).unwrap().count();
    let (content_type, body) = multipart_payload(&[0x01u8; 513]);
    let req = test::TestRequest::post()
        .uri("/upload")
        .insert_header((header::CONTENT_TYPE, content_type))
        .insert_header(("Host", "example.com:5000"))
        .set_payload(body)
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let after = std::fs::read_dir(dir.path().join("uploads")).unwrap().count();
    assert_eq!(before, after);
}

#[actix_web::test]
async fn purge_removes_record_and_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path(), 1024);

    std::fs::create_dir_all(dir.path().join("uploads")).unwrap();
    std::fs::write(dir.path().join("uploads").join("vid-1.mp4"), b"data").unwrap();
    let video_dir = dir.path().join("hls").join("vid-1");
    std::fs::create_dir_all(&video_dir).unwrap();
    std::fs::write(video_dir.join("master.m3u8"), "#EXTM3U\n").unwrap();
    state.store.insert("vid-1", VideoRecord::new()).await;

    let app = test_app!(state);
    let req = test::TestRequest::delete().uri("/videos/vid-1").to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    assert!(state.store.get("vid-1").await.is_none());
    assert!(!video_dir.exists());
    assert!(!dir.path().join("uploads").join("vid-1.mp4").exists());

    let req = test::TestRequest::delete().uri("/videos/vid-1").to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn health_and_pages_respond() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path(), 1024);
    let app = test_app!(state);

    let req = test::TestRequest::get().uri("/health").to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["status"], "ok");

    let req = test::TestRequest::get().uri("/").to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::FOUND);
    assert_eq!(res.headers().get(header::LOCATION).unwrap(), "/upload");

    let req = test::TestRequest::get().uri("/watch/vid-1").to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::OK);
    let body = test::read_body(res).await;
    assert!(std::str::from_utf8(&body).unwrap().contains("vid-1"));
}
