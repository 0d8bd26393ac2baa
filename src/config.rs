/// Configuration management for transcode-service
///
/// Loads configuration from environment variables with sensible defaults.
use crate::models::VariantSpec;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct Config {
    pub app: AppConfig,
    pub storage: StorageConfig,
    pub limits: LimitsConfig,
    /// Converter endpoints, variant label -> worker base URL
    pub workers: BTreeMap<String, String>,
    /// Target renditions produced for every upload
    pub variants: Vec<VariantSpec>,
    pub pipeline: PipelineConfig,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Clone, Debug)]
pub struct StorageConfig {
    /// Uploaded source files, one `<video_id>.<ext>` per video
    pub upload_dir: PathBuf,
    /// Finished HLS packages, one directory per video
    pub hls_dir: PathBuf,
    /// JSON snapshot of the status map
    pub status_file: PathBuf,
}

#[derive(Clone, Debug)]
pub struct LimitsConfig {
    /// Maximum accepted upload size in bytes (default: 1 GiB)
    pub max_content_length: u64,
}

/// Timeouts and bounds for the per-video pipeline
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Timeout for the /convert trigger call
    pub trigger_timeout: Duration,
    /// Timeout for one /status poll
    pub poll_timeout: Duration,
    /// Timeout for the artifact listing call
    pub list_timeout: Duration,
    /// Timeout for one streamed artifact download
    pub fetch_timeout: Duration,
    /// Sleep between poll dequeues
    pub poll_interval: Duration,
    /// Advisory encode timeout passed to workers in the convert payload
    pub ffmpeg_timeout: Duration,
    /// Overall polling deadline; still-pending variants fail when it expires
    pub poll_deadline: Duration,
    /// Upper bound on concurrently running pipelines
    pub max_concurrent: usize,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let ffmpeg_timeout = Duration::from_secs(env_parse("FFMPEG_TIMEOUT", 3600));

        Config {
            app: AppConfig {
                host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env_parse("PORT", 5000u16),
            },
            storage: StorageConfig {
                upload_dir: std::env::var("UPLOAD_DIR")
                    .unwrap_or_else(|_| "uploads".to_string())
                    .into(),
                hls_dir: std::env::var("HLS_DIR")
                    .unwrap_or_else(|_| "static/hls".to_string())
                    .into(),
                status_file: std::env::var("VIDEO_STATUS_FILE")
                    .unwrap_or_else(|_| "video_status.json".to_string())
                    .into(),
            },
            limits: LimitsConfig {
                // Default: 1 GiB
                max_content_length: env_parse("MAX_CONTENT_LENGTH", 1024 * 1024 * 1024u64),
            },
            workers: std::env::var("CONVERTER_SERVERS")
                .map(|raw| parse_worker_map(&raw))
                .unwrap_or_else(|_| default_workers()),
            variants: std::env::var("RESOLUTIONS")
                .map(|raw| parse_variants(&raw))
                .unwrap_or_else(|_| default_variants()),
            pipeline: PipelineConfig {
                trigger_timeout: Duration::from_secs(env_parse("CONVERT_TIMEOUT", 20)),
                poll_timeout: Duration::from_secs(env_parse("STATUS_TIMEOUT", 15)),
                list_timeout: Duration::from_secs(env_parse("FILE_LIST_TIMEOUT", 20)),
                fetch_timeout: Duration::from_secs(env_parse("FILE_FETCH_TIMEOUT", 120)),
                poll_interval: Duration::from_secs(env_parse("POLL_INTERVAL", 20)),
                ffmpeg_timeout,
                // Workers get FFMPEG_TIMEOUT to encode, plus slack for
                // their own download/queue overhead.
                poll_deadline: ffmpeg_timeout + Duration::from_secs(600),
                max_concurrent: env_parse("MAX_CONCURRENT_PIPELINES", 4usize),
            },
        }
    }
}

fn env_parse<T: std::str::FromStr + Copy>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Parse `label=base_url` pairs, e.g.
/// `360p=http://worker-a:9000,480p=http://worker-b:9000`
fn parse_worker_map(raw: &str) -> BTreeMap<String, String> {
    let mut workers = BTreeMap::new();
    for entry in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        match entry.split_once('=') {
            Some((label, url)) if !label.trim().is_empty() && !url.trim().is_empty() => {
                workers.insert(
                    label.trim().to_string(),
                    url.trim().trim_end_matches('/').to_string(),
                );
            }
            _ => {
                tracing::warn!(entry, "ignoring malformed CONVERTER_SERVERS entry");
            }
        }
    }
    workers
}

/// Parse `label=height:vbitrate:abitrate` triples, e.g.
/// `720p=720:2800k:128k,480p=480:1400k:128k`
fn parse_variants(raw: &str) -> Vec<VariantSpec> {
    let mut variants = Vec::new();
    for entry in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let parsed = entry.split_once('=').and_then(|(label, rest)| {
            let mut parts = rest.split(':');
            let height = parts.next()?.trim().parse().ok()?;
            let video_bitrate = parts.next()?.trim();
            let audio_bitrate = parts.next()?.trim();
            Some(VariantSpec::new(
                label.trim(),
                height,
                video_bitrate,
                audio_bitrate,
            ))
        });
        match parsed {
            Some(spec) => variants.push(spec),
            None => tracing::warn!(entry, "ignoring malformed RESOLUTIONS entry"),
        }
    }
    if variants.is_empty() {
        tracing::warn!("RESOLUTIONS yielded no variants, falling back to defaults");
        return default_variants();
    }
    variants
}

fn default_variants() -> Vec<VariantSpec> {
    vec![
        VariantSpec::new("360p", 360, "800k", "96k"),
        VariantSpec::new("480p", 480, "1400k", "128k"),
        VariantSpec::new("720p", 720, "2800k", "128k"),
    ]
}

fn default_workers() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("360p".to_string(), "http://127.0.0.1:9001".to_string()),
        ("480p".to_string(), "http://127.0.0.1:9002".to_string()),
        ("720p".to_string(), "http://127.0.0.1:9003".to_string()),
    ])
}
