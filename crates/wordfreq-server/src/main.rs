use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{Level, info};
use tracing_subscriber::EnvFilter;
use wordfreq_text::{MAX_FILE_BYTES, load_builtin_or_empty};

use wordfreq_server::sessions::DEFAULT_MAX_SESSIONS;
use wordfreq_server::{AppState, SessionStore, router};

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_STOPWORDS_PATH: &str = "resources/stopwords.txt";
const DEFAULT_STOPWORDS_IMAGE_PATH: &str = "/app/resources/stopwords.txt";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = load_config();
    info!("binding to {}:{}", config.host, config.port);
    info!("using stopwords at {}", config.stopwords_path.display());
    info!("upload limit: {} bytes", config.max_upload_bytes);
    info!("session limit: {}", config.max_sessions);

    let start = Instant::now();
    let stopwords = Arc::new(load_builtin_or_empty(&config.stopwords_path));
    info!(
        "{} built-in stopwords loaded in {} ms",
        stopwords.len(),
        start.elapsed().as_millis()
    );

    let state = AppState {
        stopwords,
        sessions: SessionStore::with_capacity(config.max_sessions),
        max_upload_bytes: config.max_upload_bytes,
    };

    let app = router(state).layer(TraceLayer::new_for_http());
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .with_context(|| format!("invalid listen address {}:{}", config.host, config.port))?;
    let listener = TcpListener::bind(addr).await?;

    axum::serve(listener, app).await?;
    Ok(())
}

#[derive(Debug, Clone)]
struct Config {
    host: String,
    port: u16,
    stopwords_path: PathBuf,
    max_upload_bytes: u64,
    max_sessions: usize,
}

fn load_config() -> Config {
    let mut cli_stopwords: Option<PathBuf> = None;
    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--stopwords" {
            if let Some(path) = args.next() {
                cli_stopwords = Some(PathBuf::from(path));
            }
        } else if let Some(path) = arg.strip_prefix("--stopwords=") {
            cli_stopwords = Some(PathBuf::from(path));
        }
    }

    let host = env::var("HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string());
    let port = env::var("PORT")
        .ok()
        .and_then(|p| p.parse::<u16>().ok())
        .unwrap_or(DEFAULT_PORT);
    let stopwords_path = cli_stopwords
        .or_else(|| env::var("STOPWORDS_PATH").ok().map(PathBuf::from))
        .unwrap_or_else(default_stopwords_path);
    // The analyzer refuses anything above MAX_FILE_BYTES regardless.
    let max_upload_bytes = env::var("MAX_UPLOAD_BYTES")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .filter(|v| *v > 0)
        .map_or(MAX_FILE_BYTES, |v| v.min(MAX_FILE_BYTES));
    let max_sessions = env::var("MAX_SESSIONS")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(DEFAULT_MAX_SESSIONS);

    Config {
        host,
        port,
        stopwords_path,
        max_upload_bytes,
        max_sessions,
    }
}

fn default_stopwords_path() -> PathBuf {
    let local = PathBuf::from(DEFAULT_STOPWORDS_PATH);
    if local.exists() {
        return local;
    }
    PathBuf::from(DEFAULT_STOPWORDS_IMAGE_PATH)
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let max_level = env_filter
        .max_level_hint()
        .and_then(|hint| hint.into_level())
        .unwrap_or(Level::INFO);
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_level(true)
        .with_max_level(max_level)
        .init();
}
