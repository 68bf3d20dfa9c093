use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf};
use tracing::debug;

const YAHOO_BASE_URL: &str = "https://query1.finance.yahoo.com";
const SINA_BASE_URL: &str = "https://hq.sinajs.cn";
const TENCENT_BASE_URL: &str = "http://qt.gtimg.cn";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ProviderEndpoint {
    pub base_url: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ProvidersConfig {
    pub yahoo: Option<ProviderEndpoint>,
    pub sina: Option<ProviderEndpoint>,
    pub tencent: Option<ProviderEndpoint>,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        ProvidersConfig {
            yahoo: Some(ProviderEndpoint {
                base_url: YAHOO_BASE_URL.to_string(),
            }),
            sina: Some(ProviderEndpoint {
                base_url: SINA_BASE_URL.to_string(),
            }),
            tencent: Some(ProviderEndpoint {
                base_url: TENCENT_BASE_URL.to_string(),
            }),
        }
    }
}

impl ProvidersConfig {
    pub fn yahoo_base_url(&self) -> &str {
        self.yahoo.as_ref().map_or(YAHOO_BASE_URL, |p| &p.base_url)
    }

    pub fn sina_base_url(&self) -> &str {
        self.sina.as_ref().map_or(SINA_BASE_URL, |p| &p.base_url)
    }

    pub fn tencent_base_url(&self) -> &str {
        self.tencent
            .as_ref()
            .map_or(TENCENT_BASE_URL, |p| &p.base_url)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    /// Directory holding one `<fund_code>.csv` disclosure per fund.
    #[serde(default = "default_holdings_dir")]
    pub holdings_dir: PathBuf,
    #[serde(default)]
    pub providers: ProvidersConfig,
}

fn default_holdings_dir() -> PathBuf {
    PathBuf::from("fund_holdings")
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        Self::load_from_path(&config_path)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("io", "navcast", "navcast")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.config_dir().join("config.yaml"))
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        debug!("Successfully loaded config");
        Ok(config)
    }
}
