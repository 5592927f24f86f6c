use std::fs;

use serde::Deserialize;

use crate::stream::DEFAULT_MAX_RETRIES;

#[derive(Debug, Clone)]
pub struct Settings {
    pub api_base_url: String,
    pub storage_base_url: String,
    pub auth_token: Option<String>,
    pub max_stream_retries: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_base_url: "http://127.0.0.1:8000/api/v1/review/".into(),
            storage_base_url: "http://127.0.0.1:10000/documents/".into(),
            auth_token: None,
            max_stream_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    api_base_url: Option<String>,
    storage_base_url: Option<String>,
    auth_token: Option<String>,
    max_stream_retries: Option<u32>,
}

/// Defaults, overlaid by an optional `review.toml`, overlaid by environment
/// variables.
pub fn load_settings() -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string("review.toml") {
        if let Ok(file_cfg) = toml::from_str::<FileSettings>(&raw) {
            if let Some(v) = file_cfg.api_base_url {
                settings.api_base_url = v;
            }
            if let Some(v) = file_cfg.storage_base_url {
                settings.storage_base_url = v;
            }
            if let Some(v) = file_cfg.auth_token {
                settings.auth_token = Some(v);
            }
            if let Some(v) = file_cfg.max_stream_retries {
                settings.max_stream_retries = v;
            }
        }
    }

    if let Ok(v) = std::env::var("REVIEW_API_URL") {
        settings.api_base_url = v;
    }
    if let Ok(v) = std::env::var("REVIEW_STORAGE_URL") {
        settings.storage_base_url = v;
    }
    if let Ok(v) = std::env::var("REVIEW_AUTH_TOKEN") {
        settings.auth_token = Some(v);
    }
    if let Ok(v) = std::env::var("REVIEW_MAX_STREAM_RETRIES") {
        if let Ok(parsed) = v.parse::<u32>() {
            settings.max_stream_retries = parsed;
        }
    }

    settings
}
