use crate::error::{InsightError, InsightResult};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Root application configuration. Loaded from an optional TOML file and
/// environment variables with the prefix `INSIGHT__`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub ga4: Ga4Config,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub sheets: SheetsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Ga4Config {
    /// Analytics property id. Required; there is no sensible default.
    #[serde(default)]
    pub property_id: String,
    #[serde(default = "default_ga4_api_url")]
    pub api_url: String,
    /// Service-account key file. Falls back to `GOOGLE_APPLICATION_CREDENTIALS`.
    #[serde(default = "default_credentials_path")]
    pub credentials_path: Option<PathBuf>,
    /// Pre-issued bearer token; skips the service-account exchange when set.
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_row_limit")]
    pub row_limit: usize,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    #[serde(default = "default_jobs_path")]
    pub jobs_path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SheetsConfig {
    #[serde(default = "default_sheets_api_url")]
    pub api_url: String,
}

// Default functions
fn default_ga4_api_url() -> String {
    "https://analyticsdata.googleapis.com/v1beta".to_string()
}
fn default_credentials_path() -> Option<PathBuf> {
    std::env::var_os("GOOGLE_APPLICATION_CREDENTIALS").map(PathBuf::from)
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_row_limit() -> usize {
    100_000
}
fn default_page_size() -> usize {
    1_000
}
fn default_max_workers() -> usize {
    5
}
fn default_jobs_path() -> PathBuf {
    PathBuf::from("config/etl_config.json")
}
fn default_sheets_api_url() -> String {
    "https://sheets.googleapis.com/v4".to_string()
}

impl Default for Ga4Config {
    fn default() -> Self {
        Self {
            property_id: String::new(),
            api_url: default_ga4_api_url(),
            credentials_path: default_credentials_path(),
            access_token: None,
            timeout_secs: default_timeout_secs(),
            row_limit: default_row_limit(),
            page_size: default_page_size(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            jobs_path: default_jobs_path(),
        }
    }
}

impl Default for SheetsConfig {
    fn default() -> Self {
        Self {
            api_url: default_sheets_api_url(),
        }
    }
}

impl AppConfig {
    /// Load configuration from an optional TOML file, then environment
    /// variables (`INSIGHT__GA4__PROPERTY_ID`, ...), later sources winning.
    pub fn load(file: Option<&Path>) -> InsightResult<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let config = builder
            .add_source(
                config::Environment::with_prefix("INSIGHT")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Reject configurations that cannot possibly reach the reporting API.
    /// Called once at startup, before any job is dispatched.
    pub fn validate(&self) -> InsightResult<()> {
        if self.ga4.property_id.trim().is_empty() {
            return Err(InsightError::Config(
                "ga4.property_id is not set (INSIGHT__GA4__PROPERTY_ID)".into(),
            ));
        }
        if self.ga4.access_token.is_none() && self.ga4.credentials_path.is_none() {
            return Err(InsightError::Config(
                "no credentials: set ga4.credentials_path, GOOGLE_APPLICATION_CREDENTIALS \
                 or ga4.access_token"
                    .into(),
            ));
        }
        if self.ga4.page_size == 0 {
            return Err(InsightError::Config("ga4.page_size must be positive".into()));
        }
        if self.pipeline.max_workers == 0 {
            return Err(InsightError::Config(
                "pipeline.max_workers must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> AppConfig {
        let mut config = AppConfig::default();
        config.ga4.property_id = "123456".into();
        config.ga4.access_token = Some("token".into());
        config
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.ga4.row_limit, 100_000);
        assert_eq!(config.ga4.page_size, 1_000);
        assert_eq!(config.pipeline.max_workers, 5);
        assert!(config.ga4.api_url.starts_with("https://analyticsdata"));
    }

    #[test]
    fn test_validate_ok() {
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn test_missing_property_id_is_fatal() {
        let mut config = valid();
        config.ga4.property_id = "  ".into();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, InsightError::Config(_)));
    }

    #[test]
    fn test_missing_credentials_is_fatal() {
        let mut config = valid();
        config.ga4.access_token = None;
        config.ga4.credentials_path = None;
        assert!(matches!(config.validate(), Err(InsightError::Config(_))));
    }

    #[test]
    fn test_zero_workers_rejected() {
        let mut config = valid();
        config.pipeline.max_workers = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_toml_file() {
        let dir = std::env::temp_dir().join(format!("insight-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("insight.toml");
        std::fs::write(
            &path,
            "[ga4]\nproperty_id = \"987\"\npage_size = 250\n\n[pipeline]\nmax_workers = 2\n",
        )
        .unwrap();

        let config = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(config.ga4.property_id, "987");
        assert_eq!(config.ga4.page_size, 250);
        assert_eq!(config.ga4.row_limit, 100_000);
        assert_eq!(config.pipeline.max_workers, 2);

        std::fs::remove_dir_all(&dir).ok();
    }
}
