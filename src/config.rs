use std::path::PathBuf;

use eyre::Result;
use log::debug;
use serde::{Deserialize, Serialize};

pub const DEFAULT_DATA_API: &str = "https://www.googleapis.com/youtube/v3";
pub const DEFAULT_TIMEDTEXT: &str = "https://www.youtube.com/api/timedtext";
pub const DEFAULT_GEMINI: &str = "https://generativelanguage.googleapis.com";

/// Base URLs of the remote services
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Endpoints {
    pub data_api: String,
    pub timedtext: String,
    pub gemini: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            data_api: DEFAULT_DATA_API.to_string(),
            timedtext: DEFAULT_TIMEDTEXT.to_string(),
            gemini: DEFAULT_GEMINI.to_string(),
        }
    }
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub storage_path: Option<PathBuf>,
    pub max_results: Option<u32>,
    pub chat_model: Option<String>,
    pub caption_lang: Option<String>,
    pub autosave_ms: Option<u64>,
    pub endpoints: Endpoints,
}

impl Config {
    /// Load config from ~/.config/ytstudy/config.toml if it exists
    pub fn load() -> Result<Self> {
        let path = config_path();
        if path.exists() {
            debug!("Loading config from {}", path.display());
            let content = std::fs::read_to_string(&path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            debug!("No config file found at {}", path.display());
            Ok(Config::default())
        }
    }

    pub fn storage_path(&self) -> PathBuf {
        self.storage_path.clone().unwrap_or_else(default_storage_path)
    }

    pub fn max_results(&self) -> u32 {
        self.max_results.unwrap_or(5)
    }

    pub fn chat_model(&self) -> &str {
        self.chat_model.as_deref().unwrap_or("gemini-1.5-flash")
    }

    pub fn caption_lang(&self) -> &str {
        self.caption_lang.as_deref().unwrap_or("en")
    }

    pub fn autosave_ms(&self) -> u64 {
        self.autosave_ms.unwrap_or(1000)
    }
}

pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from(".config"))
        .join("ytstudy")
        .join("config.toml")
}

pub fn default_storage_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ytstudy")
        .join("storage.json")
}
