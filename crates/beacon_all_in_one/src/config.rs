use config::{Config, ConfigError, Environment};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServiceConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    // HTTP configuration
    #[serde(default = "default_http_host")]
    pub http_host: String,

    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// `direct` writes straight to ClickHouse, `buffered` goes through NATS
    #[serde(default = "default_delivery_mode")]
    pub delivery_mode: String,

    // NATS configuration
    /// Comma-separated NATS server URLs
    #[serde(default = "default_nats_urls")]
    pub nats_urls: String,

    /// Prefix of the drain's durable consumer names
    #[serde(default = "default_nats_consumer_group")]
    pub nats_consumer_group: String,

    #[serde(default = "default_nats_stream_replicas")]
    pub nats_stream_replicas: usize,

    #[serde(default = "default_nats_connect_timeout_secs")]
    pub nats_connect_timeout_secs: u64,

    /// Also bounds each publish attempt
    #[serde(default = "default_nats_request_timeout_secs")]
    pub nats_request_timeout_secs: u64,

    // Publish retry configuration
    #[serde(default = "default_publish_max_retries")]
    pub publish_max_retries: u32,

    #[serde(default = "default_publish_initial_backoff_ms")]
    pub publish_initial_backoff_ms: u64,

    #[serde(default = "default_publish_max_backoff_ms")]
    pub publish_max_backoff_ms: u64,

    // Drain configuration
    /// Only has an effect in buffered mode
    #[serde(default = "default_drain_enabled")]
    pub drain_enabled: bool,

    #[serde(default = "default_drain_batch_size")]
    pub drain_batch_size: usize,

    #[serde(default = "default_drain_max_wait_ms")]
    pub drain_max_wait_ms: u64,

    #[serde(default = "default_drain_max_restarts")]
    pub drain_max_restarts: u32,

    #[serde(default = "default_drain_restart_delay_secs")]
    pub drain_restart_delay_secs: u64,

    // ClickHouse configuration
    #[serde(default = "default_clickhouse_url")]
    pub clickhouse_url: String,

    #[serde(default = "default_clickhouse_database")]
    pub clickhouse_database: String,

    #[serde(default = "default_clickhouse_username")]
    pub clickhouse_username: String,

    #[serde(default = "default_clickhouse_password")]
    pub clickhouse_password: String,

    #[serde(default = "default_clickhouse_table")]
    pub clickhouse_table: String,

    #[serde(default = "default_clickhouse_insert_timeout_secs")]
    pub clickhouse_insert_timeout_secs: u64,

    // PostgreSQL configuration
    #[serde(default = "default_postgres_host")]
    pub postgres_host: String,

    #[serde(default = "default_postgres_port")]
    pub postgres_port: u16,

    #[serde(default = "default_postgres_database")]
    pub postgres_database: String,

    #[serde(default = "default_postgres_username")]
    pub postgres_username: String,

    #[serde(default = "default_postgres_password")]
    pub postgres_password: String,

    #[serde(default = "default_postgres_max_pool_size")]
    pub postgres_max_pool_size: usize,

    #[serde(default = "default_credential_lookup_timeout_secs")]
    pub credential_lookup_timeout_secs: u64,

    /// Bound on connecting to each backing service at startup
    #[serde(default = "default_startup_timeout_secs")]
    pub startup_timeout_secs: u64,

    // OpenTelemetry configuration
    #[serde(default = "default_otel_endpoint")]
    pub otel_endpoint: String,

    #[serde(default = "default_otel_enabled")]
    pub otel_enabled: bool,

    #[serde(default = "default_otel_service_name")]
    pub otel_service_name: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_http_host() -> String {
    "0.0.0.0".to_string()
}

fn default_http_port() -> u16 {
    3000
}

fn default_delivery_mode() -> String {
    "buffered".to_string()
}

fn default_nats_urls() -> String {
    "nats://localhost:4222".to_string()
}

fn default_nats_consumer_group() -> String {
    "beacon-drain".to_string()
}

fn default_nats_stream_replicas() -> usize {
    1
}

fn default_nats_connect_timeout_secs() -> u64 {
    15
}

fn default_nats_request_timeout_secs() -> u64 {
    30
}

fn default_publish_max_retries() -> u32 {
    5
}

fn default_publish_initial_backoff_ms() -> u64 {
    100
}

fn default_publish_max_backoff_ms() -> u64 {
    5000
}

fn default_drain_enabled() -> bool {
    true
}

fn default_drain_batch_size() -> usize {
    10
}

fn default_drain_max_wait_ms() -> u64 {
    1000
}

fn default_drain_max_restarts() -> u32 {
    5
}

fn default_drain_restart_delay_secs() -> u64 {
    5
}

fn default_clickhouse_url() -> String {
    "http://localhost:8123".to_string()
}

fn default_clickhouse_database() -> String {
    "default".to_string()
}

fn default_clickhouse_username() -> String {
    "default".to_string()
}

fn default_clickhouse_password() -> String {
    String::new()
}

fn default_clickhouse_table() -> String {
    "user_events_v2".to_string()
}

fn default_clickhouse_insert_timeout_secs() -> u64 {
    30
}

fn default_postgres_host() -> String {
    "localhost".to_string()
}

fn default_postgres_port() -> u16 {
    5432
}

fn default_postgres_database() -> String {
    "beacon".to_string()
}

fn default_postgres_username() -> String {
    "beacon".to_string()
}

fn default_postgres_password() -> String {
    "beacon".to_string()
}

fn default_postgres_max_pool_size() -> usize {
    10
}

fn default_credential_lookup_timeout_secs() -> u64 {
    5
}

fn default_startup_timeout_secs() -> u64 {
    30
}

fn default_otel_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_otel_enabled() -> bool {
    false
}

fn default_otel_service_name() -> String {
    "beacon".to_string()
}

impl ServiceConfig {
    /// Load configuration from `BEACON_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(Environment::with_prefix("BEACON"))
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Tests touch process-wide env vars, so they run one at a time
    static TEST_LOCK: Mutex<()> = Mutex::new(());

    const VARS: [&str; 4] = [
        "BEACON_LOG_LEVEL",
        "BEACON_HTTP_PORT",
        "BEACON_DELIVERY_MODE",
        "BEACON_NATS_URLS",
    ];

    fn clear_vars() {
        for var in VARS {
            // SAFETY: Test runs with mutex lock to prevent concurrent env access
            unsafe {
                std::env::remove_var(var);
            }
        }
    }

    #[test]
    fn test_default_config() {
        let _lock = TEST_LOCK.lock().unwrap();
        clear_vars();

        let config = ServiceConfig::from_env().unwrap();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.http_port, 3000);
        assert_eq!(config.delivery_mode, "buffered");
        assert_eq!(config.nats_urls, "nats://localhost:4222");
        assert_eq!(config.nats_consumer_group, "beacon-drain");
        assert_eq!(config.nats_stream_replicas, 1);
        assert_eq!(config.clickhouse_table, "user_events_v2");
        assert_eq!(config.credential_lookup_timeout_secs, 5);
        assert!(config.drain_enabled);
        assert!(!config.otel_enabled);
    }

    #[test]
    fn test_custom_config() {
        let _lock = TEST_LOCK.lock().unwrap();
        clear_vars();

        // SAFETY: Test runs with mutex lock to prevent concurrent env access
        unsafe {
            std::env::set_var("BEACON_LOG_LEVEL", "debug");
            std::env::set_var("BEACON_HTTP_PORT", "8080");
            std::env::set_var("BEACON_DELIVERY_MODE", "direct");
            std::env::set_var("BEACON_NATS_URLS", "nats://a:4222,nats://b:4222");
        }

        let config = ServiceConfig::from_env().unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.http_port, 8080);
        assert_eq!(config.delivery_mode, "direct");
        assert_eq!(config.nats_urls, "nats://a:4222,nats://b:4222");

        clear_vars();
    }
}
