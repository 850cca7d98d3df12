use std::env;

use tracing::info;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Persistence
    pub db_path: String,

    // Topic and ingestion
    pub default_topic: String,
    pub feed_path: String,

    // Oracle (OpenAI-compatible endpoint)
    pub llm_api_key: String,
    pub llm_base_url: String,
    pub llm_model: String,
    pub llm_temperature: f32,
    pub llm_max_retries: u32,
    pub llm_timeout_secs: u64,

    // Alerting
    pub alert_webhook_url: Option<String>,
}

impl Config {
    /// Load full configuration for a reconciliation run.
    /// Panics with a clear message if required vars are missing.
    pub fn from_env() -> Self {
        Self {
            db_path: env::var("RADAR_DB_PATH").unwrap_or_else(|_| "data/radar.db".to_string()),
            default_topic: env::var("RADAR_TOPIC")
                .unwrap_or_else(|_| "semiconductors".to_string()),
            feed_path: env::var("RADAR_FEED_PATH")
                .unwrap_or_else(|_| "data/feed.json".to_string()),
            llm_api_key: required_env("LLM_API_KEY"),
            llm_base_url: env::var("LLM_BASE_URL")
                .unwrap_or_else(|_| "https://api.siliconflow.cn/v1".to_string()),
            llm_model: env::var("LLM_MODEL")
                .unwrap_or_else(|_| "deepseek-ai/DeepSeek-V3".to_string()),
            llm_temperature: env::var("LLM_TEMPERATURE")
                .unwrap_or_else(|_| "0.1".to_string())
                .parse()
                .expect("LLM_TEMPERATURE must be a number"),
            llm_max_retries: env::var("LLM_MAX_RETRIES")
                .unwrap_or_else(|_| "3".to_string())
                .parse()
                .expect("LLM_MAX_RETRIES must be a number"),
            llm_timeout_secs: env::var("LLM_TIMEOUT_SECS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()
                .expect("LLM_TIMEOUT_SECS must be a number"),
            alert_webhook_url: env::var("ALERT_WEBHOOK_URL").ok(),
        }
    }

    /// Minimal config for read-only commands (history view, no oracle needed).
    pub fn read_only_from_env() -> Self {
        Self {
            db_path: env::var("RADAR_DB_PATH").unwrap_or_else(|_| "data/radar.db".to_string()),
            default_topic: env::var("RADAR_TOPIC")
                .unwrap_or_else(|_| "semiconductors".to_string()),
            feed_path: String::new(),
            llm_api_key: String::new(),
            llm_base_url: String::new(),
            llm_model: String::new(),
            llm_temperature: 0.0,
            llm_max_retries: 0,
            llm_timeout_secs: 0,
            alert_webhook_url: None,
        }
    }

    /// Log the loaded config without leaking secrets.
    pub fn log_redacted(&self) {
        info!(
            db_path = self.db_path.as_str(),
            default_topic = self.default_topic.as_str(),
            feed_path = self.feed_path.as_str(),
            llm_base_url = self.llm_base_url.as_str(),
            llm_model = self.llm_model.as_str(),
            llm_max_retries = self.llm_max_retries,
            llm_timeout_secs = self.llm_timeout_secs,
            alert_webhook = self.alert_webhook_url.is_some(),
            "Config loaded"
        );
    }
}

fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} environment variable is required"))
}
