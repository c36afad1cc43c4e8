//! Configuration loading for wicket.
//!
//! The file lives at `~/.wicket/config.toml`; every section is optional and
//! every field falls back to a built-in default. String values may reference
//! environment variables with `${VAR}` syntax.
//!
//! ```toml
//! [api]
//! base_url = "http://127.0.0.1:8000"
//! ai_timeout_secs = 30
//!
//! [session]
//! remember_me = true
//!
//! [sandbox]
//! demo_token = "demo_session_token"
//! allowlist = ["/db/test-connection", "/nexus/upload"]
//!
//! [timings]
//! granted_ms = 1500
//! welcome_ms = 3000
//! denied_redirect_ms = 3000
//!
//! [developer]
//! secret = "${WICKET_DEV_SECRET}"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fs};

use serde::Deserialize;
use url::Url;

pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8000";
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_AI_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MAX_RETRIES: u32 = 2;
pub const DEFAULT_SESSION_KEY_PREFIX: &str = "wicket_";
pub const DEFAULT_COUNTER_PREFIX: &str = "wicket_demo_ai_quota:";
pub const DEFAULT_DEMO_TOKEN: &str = "demo_session_token";
pub const DEFAULT_SANDBOX_ALLOWLIST: [&str; 2] = ["/db/test-connection", "/nexus/upload"];
pub const DEFAULT_GRANTED_MS: u64 = 1500;
pub const DEFAULT_WELCOME_MS: u64 = 3000;
pub const DEFAULT_DENIED_REDIRECT_MS: u64 = 3000;
pub const DEFAULT_AI_QUOTA_PER_FEATURE: u32 = 3;

/// Env var overriding `[api] base_url`.
pub const API_URL_ENV: &str = "WICKET_API_URL";
/// Env var overriding `[developer] secret`.
pub const DEV_SECRET_ENV: &str = "WICKET_DEV_SECRET";

const SESSION_FILENAME: &str = "session.json";

#[derive(Debug, Default, Deserialize)]
pub struct WicketConfig {
    pub api: Option<ApiConfig>,
    pub session: Option<SessionConfig>,
    pub sandbox: Option<SandboxConfig>,
    pub timings: Option<TimingsConfig>,
    pub demo: Option<DemoConfig>,
    pub developer: Option<DeveloperConfig>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid API base URL {value:?}: {source}")]
    InvalidUrl {
        value: String,
        source: url::ParseError,
    },
}

/// Backend endpoint settings.
#[derive(Debug, Default, Deserialize)]
pub struct ApiConfig {
    pub base_url: Option<String>,
    pub connect_timeout_secs: Option<u64>,
    /// Upper bound for AI-backed requests. Default: 30.
    pub ai_timeout_secs: Option<u64>,
    /// Retries for idempotent (GET) calls. Default: 2.
    pub max_retries: Option<u32>,
}

/// Session storage layout.
#[derive(Debug, Default, Deserialize)]
pub struct SessionConfig {
    pub key_prefix: Option<String>,
    pub counter_prefix: Option<String>,
    pub persistent_path: Option<String>,
    /// Store logins in the persistent tier. Default: true.
    pub remember_me: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SandboxConfig {
    pub demo_token: Option<String>,
    /// Mutating paths that demo sessions may still reach.
    pub allowlist: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TimingsConfig {
    pub granted_ms: Option<u64>,
    pub welcome_ms: Option<u64>,
    pub denied_redirect_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DemoConfig {
    pub ai_quota_per_feature: Option<u32>,
}

#[derive(Default, Deserialize)]
pub struct DeveloperConfig {
    pub secret: Option<String>,
}

// Manual Debug impl to prevent leaking the unlock secret in logs.
impl std::fmt::Debug for DeveloperConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let secret = if self.secret.is_some() {
            "[REDACTED]"
        } else {
            "None"
        };
        f.debug_struct("DeveloperConfig")
            .field("secret", &secret)
            .finish()
    }
}

/// Replace `${VAR}` references with their environment values.
///
/// Missing variables expand to the empty string; unterminated references are
/// kept verbatim.
#[must_use]
pub fn expand_env_vars(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let var = &after[..end];
                if !var.is_empty() {
                    out.push_str(&env::var(var).unwrap_or_default());
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

fn expand_home(raw: &str) -> PathBuf {
    if let Some(stripped) = raw.strip_prefix("~/")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(stripped);
    }
    PathBuf::from(raw)
}

impl WicketConfig {
    /// Load from the default location. `Ok(None)` when no file exists.
    pub fn load() -> Result<Option<Self>, ConfigError> {
        let Some(path) = config_path() else {
            return Ok(None);
        };
        if !path.exists() {
            return Ok(None);
        }
        Self::load_from(&path).map(Some)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!("Failed to read config at {:?}: {}", path, err);
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: err,
                });
            }
        };

        toml::from_str(&content).map_err(|err| {
            tracing::warn!("Failed to parse config at {:?}: {}", path, err);
            ConfigError::Parse {
                path: path.to_path_buf(),
                source: err,
            }
        })
    }

    #[must_use]
    pub fn path() -> Option<PathBuf> {
        config_path()
    }

    /// Base URL for every backend call: `WICKET_API_URL`, then `[api] base_url`,
    /// then [`DEFAULT_API_URL`].
    pub fn api_base_url(&self) -> Result<Url, ConfigError> {
        let raw = env::var(API_URL_ENV)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .or_else(|| {
                self.api
                    .as_ref()
                    .and_then(|api| api.base_url.as_deref())
                    .map(expand_env_vars)
            })
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());
        Url::parse(raw.trim()).map_err(|source| ConfigError::InvalidUrl { value: raw, source })
    }

    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        let secs = self
            .api
            .as_ref()
            .and_then(|api| api.connect_timeout_secs)
            .filter(|secs| *secs > 0)
            .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS);
        Duration::from_secs(secs)
    }

    #[must_use]
    pub fn ai_timeout(&self) -> Duration {
        let secs = self
            .api
            .as_ref()
            .and_then(|api| api.ai_timeout_secs)
            .filter(|secs| *secs > 0)
            .unwrap_or(DEFAULT_AI_TIMEOUT_SECS);
        Duration::from_secs(secs)
    }

    #[must_use]
    pub fn max_retries(&self) -> u32 {
        self.api
            .as_ref()
            .and_then(|api| api.max_retries)
            .unwrap_or(DEFAULT_MAX_RETRIES)
    }

    #[must_use]
    pub fn session_key_prefix(&self) -> String {
        self.session
            .as_ref()
            .and_then(|s| s.key_prefix.clone())
            .unwrap_or_else(|| DEFAULT_SESSION_KEY_PREFIX.to_string())
    }

    #[must_use]
    pub fn counter_prefix(&self) -> String {
        self.session
            .as_ref()
            .and_then(|s| s.counter_prefix.clone())
            .unwrap_or_else(|| DEFAULT_COUNTER_PREFIX.to_string())
    }

    /// Location of the persistent tier file.
    #[must_use]
    pub fn persistent_path(&self) -> Option<PathBuf> {
        match self
            .session
            .as_ref()
            .and_then(|s| s.persistent_path.as_deref())
        {
            Some(raw) => Some(expand_home(&expand_env_vars(raw))),
            None => data_dir().map(|dir| dir.join(SESSION_FILENAME)),
        }
    }

    #[must_use]
    pub fn remember_me(&self) -> bool {
        self.session
            .as_ref()
            .and_then(|s| s.remember_me)
            .unwrap_or(true)
    }

    #[must_use]
    pub fn demo_token(&self) -> String {
        self.sandbox
            .as_ref()
            .and_then(|s| s.demo_token.clone())
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_DEMO_TOKEN.to_string())
    }

    #[must_use]
    pub fn sandbox_allowlist(&self) -> Vec<String> {
        self.sandbox
            .as_ref()
            .and_then(|s| s.allowlist.clone())
            .unwrap_or_else(|| {
                DEFAULT_SANDBOX_ALLOWLIST
                    .iter()
                    .map(ToString::to_string)
                    .collect()
            })
    }

    #[must_use]
    pub fn granted_delay(&self) -> Duration {
        let ms = self.timings.as_ref().and_then(|t| t.granted_ms);
        Duration::from_millis(ms.unwrap_or(DEFAULT_GRANTED_MS))
    }

    #[must_use]
    pub fn welcome_delay(&self) -> Duration {
        let ms = self.timings.as_ref().and_then(|t| t.welcome_ms);
        Duration::from_millis(ms.unwrap_or(DEFAULT_WELCOME_MS))
    }

    #[must_use]
    pub fn denied_redirect_delay(&self) -> Duration {
        let ms = self.timings.as_ref().and_then(|t| t.denied_redirect_ms);
        Duration::from_millis(ms.unwrap_or(DEFAULT_DENIED_REDIRECT_MS))
    }

    #[must_use]
    pub fn ai_quota_per_feature(&self) -> u32 {
        self.demo
            .as_ref()
            .and_then(|d| d.ai_quota_per_feature)
            .unwrap_or(DEFAULT_AI_QUOTA_PER_FEATURE)
    }

    /// Developer unlock secret: `WICKET_DEV_SECRET`, then `[developer] secret`.
    #[must_use]
    pub fn developer_secret(&self) -> Option<String> {
        env::var(DEV_SECRET_ENV)
            .ok()
            .or_else(|| {
                self.developer
                    .as_ref()
                    .and_then(|d| d.secret.as_deref())
                    .map(expand_env_vars)
            })
            .filter(|s| !s.trim().is_empty())
    }
}

/// `~/.wicket`
#[must_use]
pub fn data_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".wicket"))
}

#[must_use]
pub fn config_path() -> Option<PathBuf> {
    data_dir().map(|dir| dir.join("config.toml"))
}
