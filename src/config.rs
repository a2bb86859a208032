use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::GrabError;

pub const DEFAULT_SRA_BASE_URL: &str = "https://trace.ncbi.nlm.nih.gov/Traces/sra/sra.cgi";
pub const DEFAULT_MGRAST_BASE_URL: &str = "http://api.metagenomics.anl.gov";
pub const DEFAULT_IMICROBE_BASE_URL: &str = "https://www.imicrobe.us/api/v1";
pub const DEFAULT_IMICROBE_DATA_URL: &str = "https://de.cyverse.org/anon-files";
pub const DEFAULT_SRA_RETRIES: u32 = 2;
pub const DEFAULT_RETRY_DELAY_SECS: u64 = 100;

const CONFIG_FILE: &str = "grabseqs.json";

/// On-disk configuration. Every field is optional; command-line flags win.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub retries: Option<u32>,
    #[serde(default)]
    pub retry_delay_secs: Option<u64>,
    #[serde(default)]
    pub threads: Option<usize>,
    #[serde(default)]
    pub outdir: Option<String>,
    #[serde(default)]
    pub tools: ToolPaths,
    #[serde(default)]
    pub endpoints: Endpoints,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ToolPaths {
    #[serde(default)]
    pub fasterq_dump: Option<PathBuf>,
    #[serde(default)]
    pub fastq_dump: Option<PathBuf>,
    #[serde(default)]
    pub pigz: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Endpoints {
    #[serde(default)]
    pub sra: Option<String>,
    #[serde(default)]
    pub mgrast: Option<String>,
    #[serde(default)]
    pub imicrobe: Option<String>,
    #[serde(default)]
    pub imicrobe_data: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ResolvedEndpoints {
    pub sra: String,
    pub mgrast: String,
    pub imicrobe: String,
    pub imicrobe_data: String,
}

#[derive(Debug, Clone)]
pub struct Settings {
    /// `None` leaves the per-repository default in place.
    pub retries: Option<u32>,
    pub retry_delay: Duration,
    pub threads: usize,
    pub outdir: String,
    pub tools: ToolPaths,
    pub endpoints: ResolvedEndpoints,
}

impl Default for Settings {
    fn default() -> Self {
        Self::from_config(Config::default())
    }
}

impl Settings {
    pub fn from_config(config: Config) -> Self {
        let endpoints = config.endpoints;
        Self {
            retries: config.retries,
            retry_delay: Duration::from_secs(
                config.retry_delay_secs.unwrap_or(DEFAULT_RETRY_DELAY_SECS),
            ),
            threads: config.threads.unwrap_or(1).max(1),
            outdir: config.outdir.unwrap_or_default(),
            tools: config.tools,
            endpoints: ResolvedEndpoints {
                sra: trim_url(endpoints.sra, DEFAULT_SRA_BASE_URL),
                mgrast: trim_url(endpoints.mgrast, DEFAULT_MGRAST_BASE_URL),
                imicrobe: trim_url(endpoints.imicrobe, DEFAULT_IMICROBE_BASE_URL),
                imicrobe_data: trim_url(endpoints.imicrobe_data, DEFAULT_IMICROBE_DATA_URL),
            },
        }
    }
}

fn trim_url(value: Option<String>, default: &str) -> String {
    value
        .unwrap_or_else(|| default.to_string())
        .trim_end_matches('/')
        .to_string()
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads `path` if given (it must exist), otherwise the first of
    /// `./grabseqs.json` and the per-user config file that exists, falling
    /// back to built-in defaults.
    pub fn resolve(path: Option<&Path>) -> Result<Settings, GrabError> {
        if let Some(path) = path {
            if !path.exists() {
                return Err(GrabError::MissingConfig(path.to_path_buf()));
            }
            return Self::load(path).map(Settings::from_config);
        }

        for candidate in Self::default_locations() {
            if candidate.exists() {
                tracing::debug!(path = %candidate.display(), "loading config");
                return Self::load(&candidate).map(Settings::from_config);
            }
        }
        Ok(Settings::default())
    }

    pub fn default_locations() -> Vec<PathBuf> {
        let mut locations = vec![PathBuf::from(CONFIG_FILE)];
        if let Some(dirs) = ProjectDirs::from("", "", "grabseqs") {
            locations.push(dirs.config_dir().join("config.json"));
        }
        locations
    }

    fn load(path: &Path) -> Result<Config, GrabError> {
        let content =
            fs::read_to_string(path).map_err(|_| GrabError::ConfigRead(path.to_path_buf()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Config, GrabError> {
        serde_json::from_str(content).map_err(|err| GrabError::ConfigParse(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_empty() {
        let settings = Settings::from_config(ConfigLoader::parse("{}").unwrap());
        assert_eq!(settings.retries, None);
        assert_eq!(settings.threads, 1);
        assert_eq!(settings.retry_delay, Duration::from_secs(100));
        assert_eq!(settings.endpoints.mgrast, DEFAULT_MGRAST_BASE_URL);
    }

    #[test]
    fn overrides_and_trims() {
        let config = ConfigLoader::parse(
            r#"{"retries": 4, "threads": 0, "endpoints": {"sra": "http://localhost:9000/"},
                "tools": {"pigz": "/opt/bin/pigz"}}"#,
        )
        .unwrap();
        let settings = Settings::from_config(config);
        assert_eq!(settings.retries, Some(4));
        assert_eq!(settings.threads, 1);
        assert_eq!(settings.endpoints.sra, "http://localhost:9000");
        assert_eq!(settings.tools.pigz, Some(PathBuf::from("/opt/bin/pigz")));
    }
}
