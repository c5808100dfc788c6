use crate::config::{Config, SettingsBackend};
use crate::error::AppError;
use crate::evaluation::{AssistantEvaluator, EssayEvaluator};
use crate::preprocessing::{enhance, EnhancementConfig, Pipeline, PreprocessingResult};
use crate::providers::{ProviderInfo, ProviderRegistry};
use crate::settings::{FileSettingsStore, MemorySettingsStore, SettingsStore, UserSettings};
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::header,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// File name offered when extracted text is downloaded
const DOWNLOAD_FILE_NAME: &str = "texto_extraido.txt";

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub providers: Arc<ProviderRegistry>,
    pub evaluator: Option<Arc<dyn EssayEvaluator>>,
    pub settings: Arc<dyn SettingsStore>,
    pub max_file_size: usize,
}

/// Which image is sent for text extraction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageSource {
    #[default]
    Processed,
    Original,
}

impl ImageSource {
    fn parse(value: &str) -> Result<Self, AppError> {
        match value.trim().to_lowercase().as_str() {
            "" | "processed" => Ok(Self::Processed),
            "original" => Ok(Self::Original),
            other => Err(AppError::InvalidRequest(format!(
                "source must be 'processed' or 'original', got '{}'",
                other
            ))),
        }
    }
}

/// OCR response
#[derive(Serialize)]
pub struct OcrResponse {
    pub text: String,
    pub provider: String,
    pub source: ImageSource,
    pub processing_time_ms: u64,
    pub preprocessing: Option<PreprocessingResult>,
}

#[derive(Debug, Default, Deserialize)]
pub struct OcrQuery {
    #[serde(default)]
    pub download: bool,
}

#[derive(Deserialize)]
pub struct EvaluateRequest {
    pub text: String,
}

#[derive(Serialize)]
pub struct EvaluateResponse {
    pub evaluation: String,
    pub processing_time_ms: u64,
}

#[derive(Serialize)]
pub struct SaveSettingsResponse {
    pub success: bool,
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Server info response
#[derive(Serialize)]
pub struct InfoResponse {
    pub version: String,
    pub default_provider: String,
    pub available_providers: Vec<ProviderInfo>,
    pub evaluation_available: bool,
    pub max_file_size_bytes: usize,
    pub enhancement_defaults: EnhancementConfig,
}

/// Parsed multipart upload shared by /enhance and /ocr
struct Upload {
    data: Bytes,
    config: EnhancementConfig,
    source: ImageSource,
    user_id: Option<String>,
}

/// Run the HTTP server
pub async fn run(config: Config) -> anyhow::Result<()> {
    let state = build_state(&config)?;
    let addr = format!("{}:{}", config.host, config.port);

    tracing::info!(
        "Text extraction providers: {:?} (default: {})",
        state.providers.list(),
        state.providers.default_name()
    );

    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

fn build_state(config: &Config) -> Result<AppState, AppError> {
    let providers = ProviderRegistry::new(config)?;

    let evaluator = config.evaluation.as_ref().map(|evaluation| {
        tracing::info!("Essay evaluation enabled");
        Arc::new(AssistantEvaluator::new(evaluation)) as Arc<dyn EssayEvaluator>
    });

    let settings: Arc<dyn SettingsStore> = match &config.settings {
        SettingsBackend::Memory => Arc::new(MemorySettingsStore::new()),
        SettingsBackend::File(path) => Arc::new(FileSettingsStore::open(path)?),
    };

    Ok(AppState {
        providers: Arc::new(providers),
        evaluator,
        settings,
        max_file_size: config.max_file_size,
    })
}

pub fn router(state: AppState) -> Router {
    let max_file_size = state.max_file_size;

    Router::new()
        .route("/enhance", post(handle_enhance))
        .route("/ocr", post(handle_ocr))
        .route("/ocr/:provider", post(handle_ocr_with_provider))
        .route("/evaluate", post(handle_evaluate))
        .route(
            "/settings/:user_id",
            get(handle_get_settings).put(handle_put_settings),
        )
        .route("/health", get(handle_health))
        .route("/info", get(handle_info))
        // Leave room for the multipart framing around the file itself
        .layer(DefaultBodyLimit::max(max_file_size.saturating_add(64 * 1024)))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Accepts `true/false`, `1/0`, `on/off` and `yes/no`
fn parse_flag(name: &str, value: &str) -> Result<bool, AppError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "on" | "yes" => Ok(true),
        "false" | "0" | "off" | "no" | "" => Ok(false),
        other => Err(AppError::InvalidRequest(format!(
            "{} must be a boolean, got '{}'",
            name, other
        ))),
    }
}

async fn read_upload(mut multipart: Multipart, max_file_size: usize) -> Result<Upload, AppError> {
    let mut file_data: Option<Bytes> = None;
    let mut config = EnhancementConfig::default();
    let mut source = ImageSource::default();
    let mut user_id = None;

    // Parse multipart form
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::InvalidRequest(format!("Failed to parse multipart: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();

        if name == "file" {
            if let Some(content_type) = field.content_type() {
                if !content_type.starts_with("image/") {
                    tracing::warn!("Received file with content type: {}", content_type);
                }
            }
            file_data = Some(field.bytes().await.map_err(|e| {
                AppError::InvalidRequest(format!("Failed to read file data: {}", e))
            })?);
            continue;
        }

        let value = field
            .text()
            .await
            .map_err(|e| AppError::InvalidRequest(format!("Invalid field {}: {}", name, e)))?;

        match name.as_str() {
            "grayscale" => config.grayscale = parse_flag(&name, &value)?,
            "threshold" => config.threshold = parse_flag(&name, &value)?,
            "denoise" => config.denoise = parse_flag(&name, &value)?,
            "contrast_enhance" => config.contrast_enhance = parse_flag(&name, &value)?,
            "morphological" => config.morphological = parse_flag(&name, &value)?,
            "source" => source = ImageSource::parse(&value)?,
            "user_id" => user_id = Some(value).filter(|v| !v.trim().is_empty()),
            _ => {
                // Ignore unknown fields
            }
        }
    }

    // Validate file was provided
    let data = file_data.ok_or(AppError::MissingFile)?;

    if data.len() > max_file_size {
        return Err(AppError::ImageTooLarge {
            size: data.len(),
            max: max_file_size,
        });
    }

    Ok(Upload {
        data,
        config,
        source,
        user_id,
    })
}

/// Run the pipeline on the blocking pool; it is CPU-bound
async fn run_pipeline(data: Bytes, config: EnhancementConfig) -> Result<PreprocessingResult, AppError> {
    let result = tokio::task::spawn_blocking(move || Pipeline::new(config).process(&data))
        .await
        .map_err(|e| AppError::Internal(format!("Preprocessing task failed: {}", e)))??;

    tracing::info!(
        "Preprocessing completed in {}ms: {}x{} {:?}, steps: {:?}",
        result.total_time_ms,
        result.width,
        result.height,
        result.channels,
        result.steps.iter().map(|s| s.name.as_str()).collect::<Vec<_>>()
    );

    Ok(result)
}

/// Handle enhancement requests: returns the processed PNG
async fn handle_enhance(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    let upload = read_upload(multipart, state.max_file_size).await?;
    let config = upload.config;
    let data = upload.data;

    let start = Instant::now();
    let image = tokio::task::spawn_blocking(move || enhance(&data, &config))
        .await
        .map_err(|e| AppError::Internal(format!("Preprocessing task failed: {}", e)))??;
    let time_ms = start.elapsed().as_millis() as u64;
    tracing::info!("Enhancement completed in {}ms, {} bytes", time_ms, image.len());

    let headers = [
        ("content-type", "image/png".to_string()),
        ("x-processing-time-ms", time_ms.to_string()),
        ("x-output-channels", config.output_channels().count().to_string()),
        ("x-skipped-steps", config.inapplicable_steps().join(",")),
    ];

    Ok((headers, image).into_response())
}

/// Handle OCR requests using the user's or the server's default provider
async fn handle_ocr(
    State(state): State<AppState>,
    Query(query): Query<OcrQuery>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    process_ocr(state, None, query, multipart).await
}

/// Handle OCR requests for an explicit provider
async fn handle_ocr_with_provider(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Query(query): Query<OcrQuery>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    process_ocr(state, Some(provider), query, multipart).await
}

async fn process_ocr(
    state: AppState,
    provider: Option<String>,
    query: OcrQuery,
    multipart: Multipart,
) -> Result<Response, AppError> {
    let start = Instant::now();
    let upload = read_upload(multipart, state.max_file_size).await?;

    let provider_name = match provider {
        Some(name) => name,
        None => match &upload.user_id {
            Some(user_id) => load_settings(&state, user_id)
                .await
                .text_extraction_api
                .provider_name()
                .to_string(),
            None => state.providers.default_name().to_string(),
        },
    };
    let extractor = state.providers.resolve(&provider_name)?;

    let (image, preprocessing) = match upload.source {
        ImageSource::Processed => {
            let mut result = run_pipeline(upload.data, upload.config).await?;
            let image = std::mem::take(&mut result.image);
            (Bytes::from(image), Some(result))
        }
        ImageSource::Original => (upload.data, None),
    };

    let text = extractor.extract_text(&image).await?;
    let processing_time_ms = start.elapsed().as_millis() as u64;

    tracing::info!(
        "Text extraction via {} completed in {}ms, text length: {}",
        extractor.name(),
        processing_time_ms,
        text.len()
    );

    if query.download {
        let headers = [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", DOWNLOAD_FILE_NAME),
            ),
        ];
        return Ok((headers, text).into_response());
    }

    Ok(Json(OcrResponse {
        text,
        provider: extractor.name().to_string(),
        source: upload.source,
        processing_time_ms,
        preprocessing,
    })
    .into_response())
}

/// Handle essay evaluation requests
async fn handle_evaluate(
    State(state): State<AppState>,
    Json(request): Json<EvaluateRequest>,
) -> Result<Json<EvaluateResponse>, AppError> {
    let start = Instant::now();
    let evaluator = state
        .evaluator
        .clone()
        .ok_or_else(|| AppError::NotConfigured("essay evaluation assistant".to_string()))?;

    if request.text.trim().is_empty() {
        return Err(AppError::InvalidRequest("text must not be empty".to_string()));
    }

    let evaluation = evaluator.evaluate(&request.text).await?;
    let processing_time_ms = start.elapsed().as_millis() as u64;
    tracing::info!("Essay evaluation completed in {}ms", processing_time_ms);

    Ok(Json(EvaluateResponse {
        evaluation,
        processing_time_ms,
    }))
}

/// Stored settings, falling back to the default when the store cannot be read
async fn load_settings(state: &AppState, user_id: &str) -> UserSettings {
    let store = state.settings.clone();
    let id = user_id.to_string();
    let loaded = tokio::task::spawn_blocking(move || store.load_config(&id))
        .await
        .map_err(|e| AppError::Internal(format!("Settings task failed: {}", e)))
        .and_then(|r| r);

    loaded.unwrap_or_else(|e| {
        tracing::warn!(user_id, "Failed to load settings, using defaults: {}", e);
        UserSettings::default()
    })
}

async fn handle_get_settings(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Json<UserSettings> {
    Json(load_settings(&state, &user_id).await)
}

async fn handle_put_settings(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(settings): Json<UserSettings>,
) -> Result<Json<SaveSettingsResponse>, AppError> {
    let store = state.settings.clone();
    tokio::task::spawn_blocking(move || store.save_config(&user_id, &settings))
        .await
        .map_err(|e| AppError::Internal(format!("Settings task failed: {}", e)))??;

    Ok(Json(SaveSettingsResponse { success: true }))
}

/// Handle health check requests
async fn handle_health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Handle info requests
async fn handle_info(State(state): State<AppState>) -> impl IntoResponse {
    Json(InfoResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        default_provider: state.providers.default_name().to_string(),
        available_providers: state.providers.info(),
        evaluation_available: state.evaluator.is_some(),
        max_file_size_bytes: state.max_file_size,
        enhancement_defaults: EnhancementConfig::default(),
    })
}
