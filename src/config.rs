use anyhow::{anyhow, bail, Context, Result};
use reqwest::Url;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "http://localhost:8000";
const DEFAULT_TIMEOUT_SECS: u64 = 60;

const API_URL_VAR: &str = "JOBASSIST_API_URL";
const TIMEOUT_VAR: &str = "JOBASSIST_TIMEOUT_SECS";
const DATA_DIR_VAR: &str = "JOBASSIST_DATA_DIR";

#[derive(Debug, Clone)]
pub struct Config {
    pub api_base_url: Url,
    pub timeout: Duration,
    pub data_dir: PathBuf,
}

impl Config {
    /// Command-line flags win over the environment, which wins over defaults.
    pub fn load(api_url_flag: Option<&str>) -> Result<Self> {
        Self::resolve(
            api_url_flag,
            env::var(API_URL_VAR).ok(),
            env::var(TIMEOUT_VAR).ok(),
            env::var(DATA_DIR_VAR).ok(),
        )
    }

    fn resolve(
        api_url_flag: Option<&str>,
        api_url_env: Option<String>,
        timeout_env: Option<String>,
        data_dir_env: Option<String>,
    ) -> Result<Self> {
        let api_url = api_url_flag.map(str::to_string).or(api_url_env);
        let data_dir = data_dir_env
            .filter(|dir| !dir.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(default_data_dir);

        Self::from_parts(api_url.as_deref(), timeout_env.as_deref(), data_dir)
    }

    pub fn from_parts(api_url: Option<&str>, timeout_secs: Option<&str>, data_dir: PathBuf) -> Result<Self> {
        let api_base_url = parse_base_url(api_url.unwrap_or(DEFAULT_API_URL))?;

        let timeout = match timeout_secs.map(str::trim).filter(|s| !s.is_empty()) {
            Some(raw) => {
                let secs: u64 = raw
                    .parse()
                    .with_context(|| format!("{} must be a whole number of seconds, got '{}'", TIMEOUT_VAR, raw))?;
                if secs == 0 {
                    bail!("{} must be greater than zero", TIMEOUT_VAR);
                }
                Duration::from_secs(secs)
            }
            None => Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        };

        Ok(Self {
            api_base_url,
            timeout,
            data_dir,
        })
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("session.db")
    }

    pub fn log_path(&self) -> PathBuf {
        self.data_dir.join("jobassist.log")
    }
}

fn parse_base_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw.trim()).with_context(|| format!("Invalid API URL: {}", raw))?;
    if url.cannot_be_a_base() || !matches!(url.scheme(), "http" | "https") {
        return Err(anyhow!("API URL must be an http(s) URL, got: {}", raw));
    }
    Ok(url)
}

fn default_data_dir() -> PathBuf {
    // Use XDG data directory or fallback
    if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "jobassist") {
        proj_dirs.data_dir().to_path_buf()
    } else {
        PathBuf::from(".")
    }
}
