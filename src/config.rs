use crate::Args;
use std::path::PathBuf;
use std::time::Duration;

/// Server configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub max_file_size: usize,
    pub default_provider: String,
    pub vision: Option<VisionConfig>,
    pub openai: Option<OpenAiConfig>,
    pub evaluation: Option<EvaluationConfig>,
    pub settings: SettingsBackend,
}

#[derive(Debug, Clone)]
pub struct VisionConfig {
    pub api_key: String,
    pub endpoint: String,
    pub confidence_filter: Option<f32>,
}

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
}

#[derive(Debug, Clone)]
pub struct EvaluationConfig {
    pub api_key: String,
    pub base_url: String,
    pub assistant_id: String,
    pub poll_interval: Duration,
    pub max_polls: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SettingsBackend {
    Memory,
    File(PathBuf),
}

impl From<Args> for Config {
    fn from(args: Args) -> Self {
        let vision = non_empty(args.vision_api_key).map(|api_key| VisionConfig {
            api_key,
            endpoint: args.vision_endpoint.trim_end_matches('/').to_string(),
            confidence_filter: args.vision_confidence_filter,
        });

        let openai_key = non_empty(args.openai_api_key);
        let openai_base_url = args.openai_base_url.trim_end_matches('/').to_string();

        let evaluation = match (&openai_key, non_empty(args.openai_assistant_id)) {
            (Some(api_key), Some(assistant_id)) => Some(EvaluationConfig {
                api_key: api_key.clone(),
                base_url: openai_base_url.clone(),
                assistant_id,
                poll_interval: Duration::from_millis(args.evaluation_poll_ms),
                max_polls: args.evaluation_max_polls,
            }),
            _ => None,
        };

        let openai = openai_key.map(|api_key| OpenAiConfig {
            api_key,
            base_url: openai_base_url,
            model: args.openai_model,
        });

        let settings = if args.in_memory_settings {
            SettingsBackend::Memory
        } else {
            match args
                .settings_path
                .or_else(crate::settings::FileSettingsStore::default_path)
            {
                Some(path) => SettingsBackend::File(path),
                None => SettingsBackend::Memory,
            }
        };

        Self {
            host: args.host,
            port: args.port,
            max_file_size: args.max_file_size,
            default_provider: args.default_provider,
            vision,
            openai,
            evaluation,
            settings,
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
