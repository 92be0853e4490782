//! Runtime configuration from the environment, overridden by flags.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use invsync_remote::{AuthScheme, HttpConfig};

use crate::cli::Cli;

pub const ENV_URL: &str = "INVENTREE_URL";
pub const ENV_TOKEN: &str = "INVENTREE_TOKEN";
pub const ENV_AUTH_SCHEME: &str = "INVENTREE_AUTH_SCHEME";
pub const ENV_TIMEOUT: &str = "INVENTREE_TIMEOUT_SECS";
pub const ENV_DATA_ROOT: &str = "INVSYNC_DATA_ROOT";

const DEFAULT_DATA_ROOT: &str = "data";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),

    #[error("invalid {var}: {message}")]
    Invalid { var: &'static str, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub url: Option<String>,
    pub token: Option<String>,
    pub scheme: AuthScheme,
    /// Bound on each request.
    pub request_timeout: Duration,
    pub data_root: PathBuf,
    /// Bound on the whole run.
    pub run_timeout: Option<Duration>,
}

impl Config {
    /// Reads `.env` (if any) and the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Builds a config from any variable source; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |var: &str| lookup(var).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let scheme = match get(ENV_AUTH_SCHEME) {
            Some(raw) => raw.parse::<AuthScheme>().map_err(|message| ConfigError::Invalid {
                var: ENV_AUTH_SCHEME,
                message,
            })?,
            None => AuthScheme::default(),
        };
        let timeout_secs = match get(ENV_TIMEOUT) {
            Some(raw) => raw
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .ok_or_else(|| ConfigError::Invalid {
                    var: ENV_TIMEOUT,
                    message: format!("'{raw}' is not a positive number of seconds"),
                })?,
            None => DEFAULT_TIMEOUT_SECS,
        };
        let url = get(ENV_URL).map(normalize_url).transpose()?;

        Ok(Self {
            url,
            token: get(ENV_TOKEN),
            scheme,
            request_timeout: Duration::from_secs(timeout_secs),
            data_root: get(ENV_DATA_ROOT)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_ROOT)),
            run_timeout: None,
        })
    }

    /// Applies command-line flags on top of the environment.
    pub fn with_overrides(mut self, cli: &Cli) -> Self {
        if let Some(root) = &cli.data_root {
            self.data_root = root.clone();
        }
        if let Some(secs) = cli.run_timeout {
            self.run_timeout = Some(Duration::from_secs(secs));
        }
        self
    }

    /// Connection settings; both URL and token are required.
    pub fn http(&self) -> Result<HttpConfig, ConfigError> {
        let url = self.url.as_deref().ok_or(ConfigError::Missing(ENV_URL))?;
        let token = self.token.as_deref().ok_or(ConfigError::Missing(ENV_TOKEN))?;
        Ok(HttpConfig::new(url, token)
            .with_scheme(self.scheme)
            .with_timeout(self.request_timeout))
    }
}

fn normalize_url(raw: String) -> Result<String, ConfigError> {
    if !(raw.starts_with("http://") || raw.starts_with("https://")) {
        return Err(ConfigError::Invalid {
            var: ENV_URL,
            message: format!("'{raw}' is not an http(s) URL"),
        });
    }
    let mut url = raw;
    if !url.ends_with('/') {
        url.push('/');
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| vars.get(var).cloned()
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.url, None);
        assert_eq!(config.scheme, AuthScheme::Token);
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.data_root, PathBuf::from("data"));
        assert_eq!(config.http().unwrap_err(), ConfigError::Missing(ENV_URL));
    }

    #[test]
    fn environment_is_read_and_normalized() {
        let config = Config::from_lookup(lookup(&[
            (ENV_URL, "https://inventree.example.com"),
            (ENV_TOKEN, " abc123 "),
            (ENV_AUTH_SCHEME, "Bearer"),
            (ENV_TIMEOUT, "5"),
            (ENV_DATA_ROOT, "/srv/inventory"),
        ]))
        .unwrap();
        let http = config.http().unwrap();
        assert_eq!(http.base_url, "https://inventree.example.com/");
        assert_eq!(http.token, "abc123");
        assert_eq!(http.scheme, AuthScheme::Bearer);
        assert_eq!(http.timeout, Duration::from_secs(5));
        assert_eq!(config.data_root, PathBuf::from("/srv/inventory"));
    }

    #[test]
    fn token_is_required_for_a_connection() {
        let config = Config::from_lookup(lookup(&[(ENV_URL, "http://localhost:8000/")])).unwrap();
        assert_eq!(config.http().unwrap_err(), ConfigError::Missing(ENV_TOKEN));
    }

    #[test]
    fn bad_values_are_rejected() {
        let err = Config::from_lookup(lookup(&[(ENV_TIMEOUT, "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: ENV_TIMEOUT, .. }));
        let err = Config::from_lookup(lookup(&[(ENV_AUTH_SCHEME, "basic")])).unwrap_err();
        assert!(err.to_string().contains("unknown auth scheme 'basic'"));
        let err = Config::from_lookup(lookup(&[(ENV_URL, "inventree.local")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: ENV_URL, .. }));
    }

    #[test]
    fn flags_override_the_environment() {
        let cli = Cli::parse_from(["invsync", "--data-root", "other", "--run-timeout", "60", "plan"]);
        let config = Config::from_lookup(lookup(&[(ENV_DATA_ROOT, "/srv/inventory")]))
            .unwrap()
            .with_overrides(&cli);
        assert_eq!(config.data_root, PathBuf::from("other"));
        assert_eq!(config.run_timeout, Some(Duration::from_secs(60)));
    }
}
