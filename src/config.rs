//! User configuration.
//!
//! Everything a bot operator may want to change without recompiling lives
//! here. The configuration is read from a TOML file; every key is optional
//! and falls back to the value in [`Config::default`].

use serde::Deserialize;
use std::{
    path::{Path, PathBuf},
    time::Duration,
};

/// The environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "WIKIBOT_CONFIG";

/// A login account for one or more sites.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct Account {
    /// The family the account belongs to.
    pub family: String,
    /// The language code, or `*` for every language in the family.
    #[serde(default = "wildcard")]
    pub code: String,
    /// The user name.
    pub username: String,
    /// The password, or a bot password in `Name@bot:secret` form.
    #[serde(default)]
    pub password: Option<String>,
}

/// Client configuration.
#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Login accounts.
    pub accounts: Vec<Account>,
    /// The default language code.
    pub code: String,
    /// Where the HTTP cookie jar is persisted, if anywhere.
    pub cookie_file: Option<PathBuf>,
    /// The default family.
    pub family: String,
    /// The depth of the HTTP request queue.
    pub http_queue_size: usize,
    /// The `maxlag` value sent with every request, in seconds.
    pub maxlag: u32,
    /// The maximum number of times a lagged or garbled request is retried.
    /// `None` retries forever.
    pub max_retries: Option<u32>,
    /// The number of HTTP worker threads.
    pub numthreads: usize,
    /// The minimum time between two writes on the same site, in seconds.
    pub put_throttle: f64,
    /// How often a long retry streak is logged, in seconds.
    pub retry_log_interval: f64,
    /// How long to wait before retrying a lagged request, in seconds.
    pub retry_wait: f64,
    /// The HTTP request timeout, in seconds.
    pub timeout: f64,
    /// The HTTP `User-Agent` header.
    pub user_agent: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            accounts: Vec::new(),
            code: "en".into(),
            cookie_file: None,
            family: "wikipedia".into(),
            http_queue_size: 64,
            maxlag: 5,
            max_retries: Some(60),
            numthreads: 1,
            put_throttle: 10.0,
            retry_log_interval: 30.0,
            retry_wait: 5.0,
            timeout: 30.0,
            user_agent: format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Errors that may occur when loading a configuration file.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The file could not be read.
    #[error("{1}: I/O error: {0}")]
    Io(std::io::Error, PathBuf),
    /// The file is not valid TOML or has unknown keys.
    #[error("{1}: {0}")]
    Toml(toml::de::Error, PathBuf),
}

impl Config {
    /// Loads the configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|err| Error::Io(err, path.into()))?;
        toml::from_str(&text).map_err(|err| Error::Toml(err, path.into()))
    }

    /// Loads the configuration from `path`, or from the file named by
    /// [`CONFIG_ENV`] if no path is given. With neither, the defaults are
    /// used.
    pub fn load(path: Option<&Path>) -> Result<Self, Error> {
        if let Some(path) = path {
            return Self::from_file(path);
        }

        match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    /// Finds the configured account for a site.
    ///
    /// An account for the exact language code wins over a wildcard account.
    pub fn account(&self, family: &str, code: &str) -> Option<&Account> {
        let mut accounts = self.accounts.iter().filter(|a| a.family == family);
        let exact = accounts.clone().find(|a| a.code == code);
        exact.or_else(|| accounts.find(|a| a.code == "*"))
    }

    /// The minimum time between two writes on the same site.
    pub fn put_throttle(&self) -> Duration {
        Duration::from_secs_f64(self.put_throttle.max(0.0))
    }

    /// How often a long retry streak is logged.
    pub fn retry_log_interval(&self) -> Duration {
        Duration::from_secs_f64(self.retry_log_interval.max(0.0))
    }

    /// How long to wait before retrying a lagged request.
    pub fn retry_wait(&self) -> Duration {
        Duration::from_secs_f64(self.retry_wait.max(0.0))
    }

    /// The HTTP request timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs_f64(self.timeout.max(0.0))
    }
}

fn wildcard() -> String {
    "*".into()
}
