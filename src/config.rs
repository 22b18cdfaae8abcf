use std::{net::SocketAddr, str::FromStr, time::Duration};

use anyhow::{Context, anyhow};

/// Remote vector index the matcher queries for similar users.
#[derive(Debug, Clone)]
pub struct RemoteIndex {
    pub url: String,
    pub api_key: String,
}

/// Transport liveness for the real-time channel.
#[derive(Debug, Clone, Copy)]
pub struct Liveness {
    pub ping_interval: Duration,
    pub ping_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub database_url: String,
    pub cors_origin: String,
    pub similarity: Option<RemoteIndex>,
    pub top_k: usize,
    pub connection_ttl: Duration,
    pub reap_interval: Duration,
    pub liveness: Liveness,
    pub room_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8082)),
            database_url: "sqlite://soulmegle.db?mode=rwc".to_owned(),
            cors_origin: "http://localhost:5173".to_owned(),
            similarity: None,
            top_k: 100,
            connection_ttl: Duration::from_secs(3600),
            reap_interval: Duration::from_secs(60),
            liveness: Liveness {
                ping_interval: Duration::from_secs(25),
                ping_timeout: Duration::from_secs(60),
            },
            room_capacity: 2,
        }
    }
}

impl Config {
    /// Reads the configuration from the process environment, after loading
    /// `.env` if there is one.
    pub fn from_env() -> anyhow::Result<Config> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| dotenv::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Config> {
        let defaults = Config::default();

        let similarity = match lookup("SIMILARITY_URL").filter(|url| !url.is_empty()) {
            Some(url) => Some(RemoteIndex {
                url: url.trim_end_matches('/').to_owned(),
                api_key: lookup("SIMILARITY_API_KEY").unwrap_or_default(),
            }),
            None => None,
        };

        let config = Config {
            bind_addr: parsed(&lookup, "BIND_ADDR")?.unwrap_or(defaults.bind_addr),
            database_url: lookup("DATABASE_URL").unwrap_or(defaults.database_url),
            cors_origin: lookup("CORS_ORIGIN").unwrap_or(defaults.cors_origin),
            similarity,
            top_k: parsed(&lookup, "SIMILARITY_TOP_K")?.unwrap_or(defaults.top_k),
            connection_ttl: secs(&lookup, "CONNECTION_TTL_SECS")?.unwrap_or(defaults.connection_ttl),
            reap_interval: secs(&lookup, "REAP_INTERVAL_SECS")?.unwrap_or(defaults.reap_interval),
            liveness: Liveness {
                ping_interval: secs(&lookup, "PING_INTERVAL_SECS")?
                    .unwrap_or(defaults.liveness.ping_interval),
                ping_timeout: secs(&lookup, "PING_TIMEOUT_SECS")?
                    .unwrap_or(defaults.liveness.ping_timeout),
            },
            room_capacity: parsed(&lookup, "ROOM_CAPACITY")?.unwrap_or(defaults.room_capacity),
        };

        if config.top_k == 0 {
            return Err(anyhow!("SIMILARITY_TOP_K must be at least 1"));
        }
        if config.room_capacity < 2 {
            return Err(anyhow!("ROOM_CAPACITY must be at least 2"));
        }
        if config.liveness.ping_timeout <= config.liveness.ping_interval {
            return Err(anyhow!("PING_TIMEOUT_SECS must exceed PING_INTERVAL_SECS"));
        }
        if config.reap_interval.is_zero() || config.connection_ttl.is_zero() {
            return Err(anyhow!("REAP_INTERVAL_SECS and CONNECTION_TTL_SECS must be positive"));
        }

        Ok(config)
    }

    /// The vector index to serve with. Without one no stored profile can be
    /// found, so every unpaired user's match request would fail.
    pub fn remote_index(&self) -> anyhow::Result<&RemoteIndex> {
        self.similarity
            .as_ref()
            .context("SIMILARITY_URL must be set; without a vector index every match request fails")
    }
}

fn parsed<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    lookup(key)
        .map(|raw| raw.trim().parse::<T>().with_context(|| format!("invalid {key}: {raw:?}")))
        .transpose()
}

fn secs(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> anyhow::Result<Option<Duration>> {
    Ok(parsed::<u64>(lookup, key)?.map(Duration::from_secs))
}
