use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{AppError, Result};

const APP_DIR: &str = "molt-tracker";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: String,

    #[serde(default = "default_credentials_path")]
    pub credentials_path: String,

    #[serde(default = "default_api_base")]
    pub api_base: String,

    #[serde(default = "default_fetch_limit")]
    pub fetch_limit: u32,

    #[serde(default)]
    pub export: ExportConfig,

    #[serde(default)]
    pub report: ReportConfig,

    #[serde(default)]
    pub search: SearchConfig,
}

/// Where export files go locally and where they land in the warehouse.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub dir: String,
    pub state_file: String,
    pub bucket: String,
    pub prefix: String,
    pub project: String,
    pub dataset: String,
    pub table: String,
    pub keep_days: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Authors never shown in any report.
    pub denylist: Vec<String>,
    /// Platform accounts, additionally hidden from the pulse and author rankings.
    pub platform_authors: Vec<String>,
    pub site_base: String,
    pub reporter: String,
    pub digest_submolt: String,
    pub pulse_submolt: String,
    pub engagement_weight: i64,
    pub min_upvotes: i64,
    pub min_comments: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub enabled: bool,
    pub endpoint: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

fn data_dir() -> PathBuf {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR);
    std::fs::create_dir_all(&data_dir).ok();
    data_dir
}

fn default_db_path() -> String {
    data_dir().join("moltbook.db").to_string_lossy().to_string()
}

fn default_credentials_path() -> String {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("moltbook")
        .join("credentials.json")
        .to_string_lossy()
        .to_string()
}

fn default_api_base() -> String {
    "https://www.moltbook.com/api/v1".to_string()
}

fn default_fetch_limit() -> u32 {
    50
}

impl Default for ExportConfig {
    fn default() -> Self {
        let data_dir = data_dir();
        Self {
            dir: data_dir.join("exports").to_string_lossy().to_string(),
            state_file: data_dir
                .join("bigquery_state.json")
                .to_string_lossy()
                .to_string(),
            bucket: "moltbook-monitoring-db".to_string(),
            prefix: "exports/parquet".to_string(),
            project: "the-molt-report".to_string(),
            dataset: "moltbook".to_string(),
            table: "posts".to_string(),
            keep_days: 7,
        }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            denylist: ["KingMolt", "donaldtrump", "CryptoMolt", "evil", "MoltReporter"]
                .into_iter()
                .map(String::from)
                .collect(),
            platform_authors: vec!["MoltReg".to_string()],
            site_base: "https://moltbook.com".to_string(),
            reporter: "MoltReporter".to_string(),
            digest_submolt: "moltdigest".to_string(),
            pulse_submolt: "molt-report".to_string(),
            engagement_weight: 5,
            min_upvotes: 2,
            min_comments: 2,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: "https://api.search.brave.com/res/v1/web/search".to_string(),
            api_key: None,
            timeout_secs: 3,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            credentials_path: default_credentials_path(),
            api_base: default_api_base(),
            fetch_limit: default_fetch_limit(),
            export: ExportConfig::default(),
            report: ReportConfig::default(),
            search: SearchConfig::default(),
        }
    }
}

impl Config {
    /// Load from `path`, or from the default location when none is given.
    /// A missing file is created with defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(Self::config_path);

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: Config = toml::from_str(&content)?;
            config.validate()?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save(&config_path)?;
            Ok(config)
        }
    }

    pub fn save(&self, config_path: &Path) -> Result<()> {
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
            .join(APP_DIR)
            .join("config.toml")
    }

    fn validate(&self) -> Result<()> {
        if self.fetch_limit == 0 {
            return Err(AppError::Config("fetch_limit must be at least 1".to_string()));
        }
        if self.export.bucket.is_empty() || self.export.dataset.is_empty() {
            return Err(AppError::Config(
                "export.bucket and export.dataset must be set".to_string(),
            ));
        }
        Ok(())
    }
}
