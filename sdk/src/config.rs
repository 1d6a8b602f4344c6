use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

pub const CONFIG_FILE: &str = "restmodel.yaml";

/// Client configuration shared by transports and collections
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ClientConfig {
    pub base_url: String,
    /// Joined in front of relative resource paths
    pub prefix: String,
    pub timeout_secs: u64,
    pub user_agent: String,
    pub per_page: u32,
    /// Keep cookies between requests
    pub with_credentials: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost".to_string(),
            prefix: "/api".to_string(),
            timeout_secs: 30,
            user_agent: format!("restmodel-sdk/{}", env!("CARGO_PKG_VERSION")),
            per_page: 15,
            with_credentials: true,
        }
    }
}

impl ClientConfig {
    /// Load configuration from `restmodel.yaml` inside `dir`
    pub fn load_from_path<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let config_path = dir.as_ref().join(CONFIG_FILE);

        if !config_path.exists() {
            return Err(anyhow!(
                "Configuration file not found at: {}",
                config_path.display()
            ));
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: ClientConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration as `restmodel.yaml` inside `dir`
    pub fn save_to_path<P: AsRef<Path>>(&self, dir: P) -> Result<()> {
        let config_path = dir.as_ref().join(CONFIG_FILE);

        let content = serde_yaml::to_string(self).context("Failed to serialize configuration")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    /// Override fields from `RESTMODEL_*` environment variables
    pub fn apply_env(&mut self) -> Result<()> {
        if let Ok(base_url) = env::var("RESTMODEL_BASE_URL") {
            self.base_url = base_url;
        }

        if let Ok(prefix) = env::var("RESTMODEL_PREFIX") {
            self.prefix = prefix;
        }

        if let Ok(timeout) = env::var("RESTMODEL_TIMEOUT_SECS") {
            self.timeout_secs = timeout
                .parse()
                .with_context(|| format!("Invalid RESTMODEL_TIMEOUT_SECS: {timeout}"))?;
        }

        if let Ok(per_page) = env::var("RESTMODEL_PER_PAGE") {
            self.per_page = per_page
                .parse()
                .with_context(|| format!("Invalid RESTMODEL_PER_PAGE: {per_page}"))?;
        }

        self.validate()
    }

    pub fn validate(&self) -> Result<()> {
        if self.base_url.is_empty() {
            return Err(anyhow!("Base URL cannot be empty"));
        }

        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(anyhow!("Base URL must be http or https: {}", self.base_url));
        }

        if self.timeout_secs == 0 {
            return Err(anyhow!("Timeout must be greater than zero"));
        }

        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
