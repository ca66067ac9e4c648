//! Client configuration.

use anyhow::{Context, anyhow, bail};
use serde::{Deserialize, Serialize};
use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};
use swipeduel_model::LeaderboardKey;

use crate::{
    cache::{CachePolicy, CachePolicyTable, LeaderboardPolicy},
    constants::{cache, http, preload, snapshot, supply},
    supply::preloader::RetryPolicy,
};

/// Source that produced the client configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConfigSource {
    #[default]
    Default,
    EnvPath(PathBuf),
    EnvInline,
    File(PathBuf),
}

/// Everything the client needs to talk to the backend and size its caches.
///
/// Durations accept human-readable strings (`"600s"`, `"2h"`) or integer
/// milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    /// API root, e.g. `https://swipeduel.example/api`.
    pub server_url: String,
    /// Bearer token for authenticated endpoints.
    pub auth_token: Option<String>,
    /// Records per block. Must be even.
    pub block_size: usize,
    pub preload_attempts: u32,
    pub backoff_base: u32,
    #[serde(with = "duration_str")]
    pub backoff_unit: Duration,
    #[serde(with = "duration_str")]
    pub snapshot_ttl: Duration,
    #[serde(with = "duration_str")]
    pub leaderboard_ttl: Duration,
    pub leaderboard_limit: usize,
    /// Decode leaderboard images before an entry counts as a hit.
    pub leaderboard_preload_images: bool,
    pub leaderboard_preload_concurrency: usize,
    #[serde(with = "duration_str")]
    pub user_ttl: Duration,
    /// Wait before the first background cache refresh after startup.
    #[serde(with = "duration_str")]
    pub startup_refresh_delay: Duration,
    #[serde(with = "duration_str")]
    pub request_timeout: Duration,
    /// Override for the snapshot directory. Defaults to the platform cache dir.
    pub storage_dir: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:3000/api".to_string(),
            auth_token: None,
            block_size: supply::DEFAULT_BLOCK_SIZE,
            preload_attempts: preload::MAX_ATTEMPTS,
            backoff_base: preload::BACKOFF_BASE,
            backoff_unit: preload::BACKOFF_UNIT,
            snapshot_ttl: snapshot::TTL,
            leaderboard_ttl: cache::LEADERBOARD_TTL,
            leaderboard_limit: cache::LEADERBOARD_LIMIT,
            leaderboard_preload_images: true,
            leaderboard_preload_concurrency: preload::BULK_CONCURRENCY,
            user_ttl: cache::USER_PROFILE_TTL,
            startup_refresh_delay: cache::STARTUP_REFRESH_DELAY,
            request_timeout: http::REQUEST_TIMEOUT,
            storage_dir: None,
        }
    }
}

impl ClientConfig {
    /// Load configuration using environment variables.
    /// Evaluation order:
    /// 1) `$SWIPEDUEL_CONFIG_PATH` (TOML or JSON file),
    /// 2) `$SWIPEDUEL_CONFIG_JSON` (inline JSON),
    /// 3) the first default candidate file that exists,
    /// 4) defaults.
    ///
    /// `$SWIPEDUEL_SERVER_URL` and `$SWIPEDUEL_TOKEN` override the result.
    pub fn load_from_env() -> anyhow::Result<(Self, ConfigSource)> {
        let (config, source) = Self::load_base()?;
        let config = config.with_overrides(
            non_empty_var("SWIPEDUEL_SERVER_URL"),
            non_empty_var("SWIPEDUEL_TOKEN"),
        );
        config
            .validate()
            .with_context(|| format!("invalid client config from {source:?}"))?;
        Ok((config, source))
    }

    fn load_base() -> anyhow::Result<(Self, ConfigSource)> {
        if let Some(path_str) = non_empty_var("SWIPEDUEL_CONFIG_PATH") {
            let path = PathBuf::from(path_str);
            let config = Self::load_from_file(&path)?;
            return Ok((config, ConfigSource::EnvPath(path)));
        }

        if let Some(raw) = non_empty_var("SWIPEDUEL_CONFIG_JSON") {
            let parsed = Self::parse_json(&raw)
                .context("failed to parse SWIPEDUEL_CONFIG_JSON")?;
            return Ok((parsed, ConfigSource::EnvInline));
        }

        if let Some(path) = Self::find_default_file() {
            let config = Self::load_from_file(&path)?;
            return Ok((config, ConfigSource::File(path)));
        }

        Ok((Self::default(), ConfigSource::Default))
    }

    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path).with_context(|| {
            format!("failed to read client config from {}", path.display())
        })?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::parse_json(&contents).with_context(|| {
                format!("invalid client config {}", path.display())
            }),
            Some("toml") => toml::from_str(&contents).map_err(|err| {
                anyhow!("invalid client config {}: {}", path.display(), err)
            }),
            _ => Self::parse_from_str(&contents, &path.display().to_string()),
        }
    }

    pub fn parse_from_str(contents: &str, origin: &str) -> anyhow::Result<Self> {
        // TOML first, then JSON.
        toml::from_str(contents).or_else(|toml_err| {
            serde_json::from_str(contents).map_err(|json_err| {
                anyhow!(
                    "failed to parse client config {}: toml error: {}; json error: {}",
                    origin,
                    toml_err,
                    json_err
                )
            })
        })
    }

    pub fn parse_json(raw: &str) -> anyhow::Result<Self> {
        serde_json::from_str(raw)
            .map_err(|err| anyhow!("invalid client config json: {err}"))
    }

    /// Apply explicit server URL and token overrides.
    pub fn with_overrides(
        mut self,
        server_url: Option<String>,
        auth_token: Option<String>,
    ) -> Self {
        if let Some(url) = server_url {
            self.server_url = url;
        }
        if let Some(token) = auth_token {
            self.auth_token = Some(token);
        }
        self
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.server_url.trim().is_empty() {
            bail!("server_url must not be empty");
        }
        if self.block_size == 0 || self.block_size % 2 != 0 {
            bail!("block_size must be a positive even number, got {}", self.block_size);
        }
        if self.preload_attempts == 0 {
            bail!("preload_attempts must be at least 1");
        }
        if self.backoff_base < 1 {
            bail!("backoff_base must be at least 1");
        }
        if self.leaderboard_limit == 0 {
            bail!("leaderboard_limit must be at least 1");
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.preload_attempts,
            backoff_base: self.backoff_base,
            backoff_unit: self.backoff_unit,
        }
    }

    pub fn cache_policies(&self) -> CachePolicyTable {
        CachePolicyTable {
            leaderboard: LeaderboardPolicy {
                ttl: self.leaderboard_ttl,
                keys: LeaderboardKey::all(),
                preload_images: self.leaderboard_preload_images,
                limit: self.leaderboard_limit,
                preload_concurrency: self.leaderboard_preload_concurrency,
            },
            user_profile: CachePolicy { ttl: self.user_ttl },
        }
    }

    fn find_default_file() -> Option<PathBuf> {
        const CANDIDATES: &[&str] = &[
            "swipeduel.toml",
            "config/swipeduel.toml",
            "swipeduel.json",
        ];

        CANDIDATES
            .iter()
            .map(Path::new)
            .find(|path| path.exists())
            .map(Path::to_path_buf)
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

/// Serde adapter: human-readable duration strings, or integer milliseconds.
mod duration_str {
    use serde::{Deserialize, Deserializer, Serializer, de};
    use std::time::Duration;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Millis(u64),
        Text(String),
    }

    pub fn serialize<S: Serializer>(
        value: &Duration,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&humantime::format_duration(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Duration, D::Error> {
        match Raw::deserialize(deserializer)? {
            Raw::Millis(ms) => Ok(Duration::from_millis(ms)),
            Raw::Text(text) => {
                humantime::parse_duration(text.trim()).map_err(de::Error::custom)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let config = ClientConfig::default();
        config.validate().unwrap();
        assert_eq!(config.block_size, 10);
        assert_eq!(config.snapshot_ttl, Duration::from_secs(60));
        assert_eq!(config.retry_policy(), RetryPolicy::default());
    }

    #[test]
    fn toml_with_human_durations() {
        let config = ClientConfig::parse_from_str(
            r#"
                server_url = "https://duel.test/api"
                block_size = 20
                backoff_unit = "250ms"
                leaderboard_ttl = "5m"
                user_ttl = 3600000
            "#,
            "inline",
        )
        .unwrap();

        assert_eq!(config.server_url, "https://duel.test/api");
        assert_eq!(config.block_size, 20);
        assert_eq!(config.backoff_unit, Duration::from_millis(250));
        assert_eq!(config.leaderboard_ttl, Duration::from_secs(300));
        assert_eq!(config.user_ttl, Duration::from_secs(3600));
        assert_eq!(config.snapshot_ttl, snapshot::TTL);
    }

    #[test]
    fn json_falls_back_after_toml() {
        let config = ClientConfig::parse_from_str(
            r#"{"server_url": "http://json.test", "preload_attempts": 5}"#,
            "inline",
        )
        .unwrap();
        assert_eq!(config.server_url, "http://json.test");
        assert_eq!(config.preload_attempts, 5);
    }

    #[test]
    fn loads_by_extension() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"{{"block_size": 4, "snapshot_ttl": "30s"}}"#).unwrap();

        let config = ClientConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.block_size, 4);
        assert_eq!(config.snapshot_ttl, Duration::from_secs(30));
    }

    #[test]
    fn validation_rejects_bad_values() {
        let odd = ClientConfig {
            block_size: 7,
            ..ClientConfig::default()
        };
        assert!(odd.validate().is_err());

        let zero_attempts = ClientConfig {
            preload_attempts: 0,
            ..ClientConfig::default()
        };
        assert!(zero_attempts.validate().is_err());

        let zero_base = ClientConfig {
            backoff_base: 0,
            ..ClientConfig::default()
        };
        assert!(zero_base.validate().is_err());
    }

    #[test]
    fn overrides_replace_url_and_token() {
        let config = ClientConfig::default().with_overrides(
            Some("https://override.test".to_string()),
            Some("secret".to_string()),
        );
        assert_eq!(config.server_url, "https://override.test");
        assert_eq!(config.auth_token.as_deref(), Some("secret"));

        let untouched = ClientConfig::default().with_overrides(None, None);
        assert_eq!(untouched, ClientConfig::default());
    }

    #[test]
    fn policies_follow_config() {
        let config = ClientConfig {
            leaderboard_limit: 5,
            leaderboard_preload_images: false,
            ..ClientConfig::default()
        };
        let policies = config.cache_policies();
        assert_eq!(policies.leaderboard.limit, 5);
        assert!(!policies.leaderboard.preload_images);
        assert_eq!(policies.user_profile.ttl, cache::USER_PROFILE_TTL);
    }
}
