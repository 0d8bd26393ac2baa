/// Business logic for transcode-service
///
/// - pipeline: per-video orchestration state machine
/// - worker_client: HTTP client for the converter worker contract
/// - manifest: HLS master playlist generation

pub mod manifest;
pub mod pipeline;
pub mod worker_client;

pub use pipeline::PipelineContext;
pub use worker_client::WorkerClient;
