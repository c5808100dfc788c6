use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod error;
mod evaluation;
mod preprocessing;
mod provider;
mod providers;
mod server;
mod settings;
#[cfg(test)]
mod test_support;

#[derive(Parser, Debug)]
#[command(name = "essay-ocr-server")]
#[command(about = "Image enhancement and text extraction for handwritten essays")]
#[command(version)]
pub struct Args {
    /// Host address to bind to
    #[arg(long, env = "ESSAY_OCR_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Port to listen on
    #[arg(long, env = "ESSAY_OCR_PORT", default_value = "9393")]
    pub port: u16,

    /// Maximum upload size in bytes (default: 50MB)
    #[arg(long, env = "ESSAY_OCR_MAX_FILE_SIZE", default_value = "52428800")]
    pub max_file_size: usize,

    /// Text extraction provider used when neither the request nor the user's settings pick one
    #[arg(long, env = "ESSAY_OCR_DEFAULT_PROVIDER", default_value = "vision")]
    pub default_provider: String,

    /// Google Cloud Vision API key (enables the "vision" provider)
    #[arg(long, env = "GOOGLE_VISION_API_KEY")]
    pub vision_api_key: Option<String>,

    /// Google Cloud Vision endpoint
    #[arg(
        long,
        env = "GOOGLE_VISION_ENDPOINT",
        default_value = "https://vision.googleapis.com"
    )]
    pub vision_endpoint: String,

    /// Keep only Vision blocks whose confidence is below this value
    #[arg(long, env = "GOOGLE_VISION_CONFIDENCE_FILTER")]
    pub vision_confidence_filter: Option<f32>,

    /// OpenAI API key (enables the "openai" provider)
    #[arg(long, env = "OPENAI_API_KEY")]
    pub openai_api_key: Option<String>,

    /// OpenAI API base URL
    #[arg(long, env = "OPENAI_BASE_URL", default_value = "https://api.openai.com/v1")]
    pub openai_base_url: String,

    /// Model used for handwriting transcription
    #[arg(long, env = "OPENAI_MODEL", default_value = "gpt-4o-mini")]
    pub openai_model: String,

    /// Assistant used for essay evaluation (enables /evaluate)
    #[arg(long, env = "OPENAI_ASSISTANT_ID")]
    pub openai_assistant_id: Option<String>,

    /// Delay between evaluation run status checks, in milliseconds
    #[arg(long, env = "ESSAY_OCR_EVALUATION_POLL_MS", default_value = "1000")]
    pub evaluation_poll_ms: u64,

    /// Give up on an evaluation run after this many status checks
    #[arg(long, env = "ESSAY_OCR_EVALUATION_MAX_POLLS", default_value = "300")]
    pub evaluation_max_polls: u32,

    /// Settings file (defaults to the platform config directory)
    #[arg(long, env = "ESSAY_OCR_SETTINGS_PATH")]
    pub settings_path: Option<PathBuf>,

    /// Keep user settings in memory only
    #[arg(long, env = "ESSAY_OCR_IN_MEMORY_SETTINGS")]
    pub in_memory_settings: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = config::Config::from(args);

    tracing::info!("Starting essay-ocr-server v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Binding to {}:{}", config.host, config.port);

    server::run(config).await
}
