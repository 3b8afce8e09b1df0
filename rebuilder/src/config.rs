use std::env;
use thiserror::Error;
use url::Url;

pub const DEFAULT_ORIGIN: &str = "https://uniform.app";
pub const DEFAULT_STATE: &str = "64";
const DEFAULT_CONCURRENCY: usize = 4;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required setting: {0}")]
    Missing(&'static str),

    #[error("invalid origin URL: {0}")]
    InvalidOrigin(#[from] url::ParseError),

    #[error("invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },

    #[error("render concurrency must be greater than zero")]
    InvalidConcurrency,
}

/// Settings a rebuild run needs before any work starts. Missing settings are
/// fatal for the whole run.
#[derive(Clone, Debug)]
pub struct Config {
    pub project_id: String,
    pub api_key: String,
    /// Management origin of the composition API.
    pub origin: Url,
    /// Snapshot state token; only one state is ever rendered and cached.
    pub state: String,
    /// Degree of parallelism for per-route render work.
    pub concurrency: usize,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build from an arbitrary settings lookup; `from_env` is the thin
    /// process-environment binding over this.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let origin = lookup("COMPOSITION_ORIGIN").unwrap_or_else(|| DEFAULT_ORIGIN.to_string());
        let concurrency = match lookup("RENDER_CONCURRENCY") {
            Some(raw) => raw.parse::<usize>().map_err(|_| ConfigError::Invalid {
                name: "RENDER_CONCURRENCY",
                value: raw,
            })?,
            None => DEFAULT_CONCURRENCY,
        };

        let config = Config {
            project_id: require(&lookup, "PROJECT_ID")?,
            api_key: require(&lookup, "COMPOSITION_API_KEY")?,
            origin: Url::parse(&origin)?,
            state: lookup("SNAPSHOT_STATE").unwrap_or_else(|| DEFAULT_STATE.to_string()),
            concurrency,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.project_id.is_empty() {
            return Err(ConfigError::Missing("PROJECT_ID"));
        }
        if self.api_key.is_empty() {
            return Err(ConfigError::Missing("COMPOSITION_API_KEY"));
        }
        if self.concurrency == 0 {
            return Err(ConfigError::InvalidConcurrency);
        }
        Ok(())
    }
}

fn require(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<String, ConfigError> {
    lookup(name)
        .filter(|value| !value.is_empty())
        .ok_or(ConfigError::Missing(name))
}
