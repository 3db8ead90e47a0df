//! Application configuration loaded from environment variables.

use std::time::Duration;

/// Partition counts of the sharded stores, read once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShardCounts {
    pub order: usize,
    pub stock: usize,
    pub payment: usize,
    pub saga_log: usize,
}

impl Default for ShardCounts {
    fn default() -> Self {
        Self {
            order: Config::DEFAULT_SHARDS,
            stock: Config::DEFAULT_SHARDS,
            payment: Config::DEFAULT_SHARDS,
            saga_log: Config::DEFAULT_SHARDS,
        }
    }
}

/// Gateway configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default `0.0.0.0`)
/// - `PORT`: listen port (default `5000`)
/// - `RUST_LOG`: tracing filter directive (default `info`)
/// - `CHECKOUT_TIMEOUT_SECS`: how long a checkout request waits (default `30`)
/// - `ORDER_SHARDS`, `STOCK_SHARDS`, `PAYMENT_SHARDS`, `SAGA_LOG_SHARDS`:
///   partition counts (default `3`; zero or garbage falls back to the default)
/// - `RELEASE_CALLBACK_URL`: when set, sagas release checkouts through
///   `POST {url}/release/...` instead of in-process
/// - `SAGA_LOG_DATABASE_URLS`: comma-separated PostgreSQL URLs, one saga log
///   partition each; in-memory partitions when unset
/// - `KAFKA_BOOTSTRAP_SERVERS`: when set, saga messages travel through Kafka
///   (needs the `kafka` feature) instead of the in-process transport
/// - `KAFKA_GROUP_PREFIX`: consumer group prefix (default `checkout`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub checkout_timeout: Duration,
    pub shards: ShardCounts,
    pub release_callback_url: Option<String>,
    pub saga_log_database_urls: Vec<String>,
    pub kafka_bootstrap_servers: Option<String>,
    pub kafka_group_prefix: String,
}

impl Config {
    pub const DEFAULT_SHARDS: usize = 3;
    pub const DEFAULT_CHECKOUT_TIMEOUT: Duration = Duration::from_secs(30);
    pub const DEFAULT_KAFKA_GROUP_PREFIX: &str = "checkout";

    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from any key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let shards = |key: &str| {
            lookup(key)
                .and_then(|v| v.trim().parse::<usize>().ok())
                .filter(|&n| n > 0)
                .unwrap_or(Self::DEFAULT_SHARDS)
        };

        let saga_log_database_urls: Vec<String> = lookup("SAGA_LOG_DATABASE_URLS")
            .map(|urls| {
                urls.split(',')
                    .map(str::trim)
                    .filter(|url| !url.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        let saga_log = if saga_log_database_urls.is_empty() {
            shards("SAGA_LOG_SHARDS")
        } else {
            saga_log_database_urls.len()
        };

        Self {
            host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: lookup("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(5000),
            log_level: lookup("RUST_LOG").unwrap_or_else(|| "info".to_string()),
            checkout_timeout: lookup("CHECKOUT_TIMEOUT_SECS")
                .and_then(|s| s.parse().ok())
                .filter(|&secs| secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(Self::DEFAULT_CHECKOUT_TIMEOUT),
            shards: ShardCounts {
                order: shards("ORDER_SHARDS"),
                stock: shards("STOCK_SHARDS"),
                payment: shards("PAYMENT_SHARDS"),
                saga_log,
            },
            release_callback_url: lookup("RELEASE_CALLBACK_URL").filter(|url| !url.is_empty()),
            saga_log_database_urls,
            kafka_bootstrap_servers: lookup("KAFKA_BOOTSTRAP_SERVERS")
                .map(|servers| servers.trim().to_string())
                .filter(|servers| !servers.is_empty()),
            kafka_group_prefix: lookup("KAFKA_GROUP_PREFIX")
                .filter(|prefix| !prefix.is_empty())
                .unwrap_or_else(|| Self::DEFAULT_KAFKA_GROUP_PREFIX.to_string()),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            log_level: "info".to_string(),
            checkout_timeout: Self::DEFAULT_CHECKOUT_TIMEOUT,
            shards: ShardCounts::default(),
            release_callback_url: None,
            saga_log_database_urls: Vec::new(),
            kafka_bootstrap_servers: None,
            kafka_group_prefix: Self::DEFAULT_KAFKA_GROUP_PREFIX.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(pairs: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_default_values() {
        let config = config_from(&[]);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 5000);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.checkout_timeout, Duration::from_secs(30));
        assert_eq!(config.shards, ShardCounts::default());
        assert!(config.release_callback_url.is_none());
        assert!(config.saga_log_database_urls.is_empty());
        assert!(config.kafka_bootstrap_servers.is_none());
        assert_eq!(config.kafka_group_prefix, "checkout");
    }

    #[test]
    fn test_kafka_settings() {
        let config = config_from(&[
            ("KAFKA_BOOTSTRAP_SERVERS", " kafka:9092 "),
            ("KAFKA_GROUP_PREFIX", "shop"),
        ]);
        assert_eq!(config.kafka_bootstrap_servers.as_deref(), Some("kafka:9092"));
        assert_eq!(config.kafka_group_prefix, "shop");

        let blank = config_from(&[("KAFKA_BOOTSTRAP_SERVERS", "  ")]);
        assert!(blank.kafka_bootstrap_servers.is_none());
    }

    #[test]
    fn test_shard_counts_fall_back_on_zero_and_garbage() {
        let config = config_from(&[
            ("ORDER_SHARDS", "5"),
            ("STOCK_SHARDS", "0"),
            ("PAYMENT_SHARDS", "many"),
        ]);
        assert_eq!(config.shards.order, 5);
        assert_eq!(config.shards.stock, 3);
        assert_eq!(config.shards.payment, 3);
    }

    #[test]
    fn test_database_urls_set_saga_log_partitions() {
        let config = config_from(&[
            ("SAGA_LOG_SHARDS", "7"),
            ("SAGA_LOG_DATABASE_URLS", "postgres://a/db, postgres://b/db,"),
        ]);
        assert_eq!(
            config.saga_log_database_urls,
            vec!["postgres://a/db", "postgres://b/db"]
        );
        assert_eq!(config.shards.saga_log, 2);
    }

    #[test]
    fn test_timeout_and_callback() {
        let config = config_from(&[
            ("CHECKOUT_TIMEOUT_SECS", "2"),
            ("RELEASE_CALLBACK_URL", "http://gateway:5000"),
        ]);
        assert_eq!(config.checkout_timeout, Duration::from_secs(2));
        assert_eq!(
            config.release_callback_url.as_deref(),
            Some("http://gateway:5000")
        );
    }

    #[test]
    fn test_addr_formatting() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
            ..Config::default()
        };
        assert_eq!(config.addr(), "127.0.0.1:8080");
    }
}
