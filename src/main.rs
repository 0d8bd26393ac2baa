/// Transcode Service - HTTP server
///
/// Ingests video uploads, orchestrates remote converter workers into an HLS
/// package per video, and serves sources, status, and finished streams.
use actix_web::{middleware, web, App, HttpServer};
use std::io;
use std::sync::Arc;
use tokio::sync::Semaphore;

use transcode_service::handlers;
use transcode_service::services::{PipelineContext, WorkerClient};
use transcode_service::store::StatusStore;
use transcode_service::Config;

#[actix_web::main]
async fn main() -> io::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let config = Config::from_env();
    std::fs::create_dir_all(&config.storage.upload_dir)?;
    std::fs::create_dir_all(&config.storage.hls_dir)?;

    let store = Arc::new(StatusStore::load(&config.storage.status_file));
    let swept = store.fail_interrupted().await;
    if swept > 0 {
        tracing::info!(swept, "failed videos interrupted by a previous shutdown");
    }

    let client = WorkerClient::new(&config.pipeline).expect("failed to build worker HTTP client");
    let config = Arc::new(config);
    let pipeline_ctx = PipelineContext {
        config: config.clone(),
        store: store.clone(),
        client,
        limiter: Arc::new(Semaphore::new(config.pipeline.max_concurrent)),
    };

    let bind_address = format!("{}:{}", config.app.host, config.app.port);
    tracing::info!(
        %bind_address,
        workers = config.workers.len(),
        variants = config.variants.len(),
        "transcode-service starting"
    );

    let config_data = web::Data::from(config);
    let store_data = web::Data::from(store);
    let ctx_data = web::Data::new(pipeline_ctx);

    HttpServer::new(move || {
        App::new()
            .wrap(middleware::Logger::default())
            .app_data(config_data.clone())
            .app_data(store_data.clone())
            .app_data(ctx_data.clone())
            .configure(handlers::configure_routes)
    })
    .bind(&bind_address)?
    .run()
    .await
}
