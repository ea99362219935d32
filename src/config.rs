use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{AppError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: String,

    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    pub groq_api_key: Option<String>,

    #[serde(default = "default_platform_base_url")]
    pub platform_base_url: String,

    #[serde(default = "default_categories")]
    pub categories: Vec<Category>,

    #[serde(default)]
    pub collection: CollectionConfig,

    #[serde(default)]
    pub evaluation: EvaluationConfig,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

/// A listing category: `name` keys the database, `label` is what the
/// platform's listing API is queried with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub name: String,
    pub label: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionConfig {
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,

    /// Entries older than this many days stop a category.
    #[serde(default = "default_cutoff_days")]
    pub cutoff_days: i64,

    #[serde(default = "default_page_delay_ms")]
    pub page_delay_ms: u64,

    /// Cap on leftover references swept per category per run.
    #[serde(default = "default_backlog_limit")]
    pub backlog_limit: u32,

    #[serde(default = "default_preview_chars")]
    pub preview_chars: usize,

    /// Same-platform links in a body at or above this count exclude it.
    #[serde(default = "default_link_threshold")]
    pub link_threshold: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationConfig {
    /// Candidates per run, sized to the oracle's free daily tier.
    #[serde(default = "default_daily_limit")]
    pub daily_limit: u32,

    #[serde(default = "default_retry_budget")]
    pub retry_budget: i64,

    #[serde(default = "default_summary_max_chars")]
    pub summary_max_chars: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_per_minute")]
    pub per_minute: u32,

    #[serde(default = "default_per_day")]
    pub per_day: u32,
}

fn default_db_path() -> String {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("limelight");
    std::fs::create_dir_all(&data_dir).ok();
    data_dir.join("limelight.db").to_string_lossy().to_string()
}

fn default_output_dir() -> String {
    "docs/data".to_string()
}

fn default_platform_base_url() -> String {
    "https://note.com".to_string()
}

fn default_categories() -> Vec<Category> {
    vec![
        Category {
            name: "kpop".to_string(),
            label: "K-POP".to_string(),
        },
        Category {
            name: "idol".to_string(),
            label: "アイドル".to_string(),
        },
    ]
}

fn default_max_pages() -> u32 {
    5
}

fn default_cutoff_days() -> i64 {
    1
}

fn default_page_delay_ms() -> u64 {
    1000
}

fn default_backlog_limit() -> u32 {
    50
}

fn default_preview_chars() -> usize {
    200
}

fn default_link_threshold() -> usize {
    4
}

fn default_daily_limit() -> u32 {
    100
}

fn default_retry_budget() -> i64 {
    3
}

fn default_summary_max_chars() -> usize {
    300
}

fn default_per_minute() -> u32 {
    30
}

fn default_per_day() -> u32 {
    14400
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            max_pages: default_max_pages(),
            cutoff_days: default_cutoff_days(),
            page_delay_ms: default_page_delay_ms(),
            backlog_limit: default_backlog_limit(),
            preview_chars: default_preview_chars(),
            link_threshold: default_link_threshold(),
        }
    }
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            daily_limit: default_daily_limit(),
            retry_budget: default_retry_budget(),
            summary_max_chars: default_summary_max_chars(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            per_minute: default_per_minute(),
            per_day: default_per_day(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            output_dir: default_output_dir(),
            groq_api_key: None,
            platform_base_url: default_platform_base_url(),
            categories: default_categories(),
            collection: CollectionConfig::default(),
            evaluation: EvaluationConfig::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save()?;
            Ok(config)
        }
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| AppError::Config(e.to_string()))?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("limelight")
            .join("config.toml")
    }
}
