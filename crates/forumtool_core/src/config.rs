use std::env;

use anyhow::{Result, bail};

pub const ENV_API_KEY: &str = "DISCOURSE_API_KEY";
pub const ENV_API_USER: &str = "DISCOURSE_API_USER";
pub const ENV_BASE_URL: &str = "DISCOURSE_BASE_URL";

/// Static API credentials for one run. Resolved once at startup, before any
/// network activity; a missing value aborts the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub api_key: String,
    pub api_username: String,
    pub base_url: String,
}

impl Credentials {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Resolve from an arbitrary lookup. The env indirection keeps tests off
    /// process-global state.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = required(&lookup, ENV_API_KEY)?;
        let api_username = required(&lookup, ENV_API_USER)?;
        let base_url = required(&lookup, ENV_BASE_URL)?;
        Ok(Self {
            api_key,
            api_username,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

fn required<F>(lookup: &F, name: &str) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(value) => {
            let trimmed = value.trim().to_string();
            if trimmed.is_empty() {
                bail!("required environment variable {name} is empty");
            }
            Ok(trimmed)
        }
        None => bail!("missing required environment variable {name}"),
    }
}
