use anyhow::{Context, Result};
use std::str::FromStr;

// ============================================================================
// Configuration - environment variables, optionally seeded from `.env`
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct QueueConfig {
    pub topic: String,
    pub retry_topic: String,
    pub dlq_topic: String,
    pub group_id: String,
    /// Deliveries before a failing message is dead-lettered
    pub max_deliveries: u32,
    pub batch_size: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub http_host: String,
    pub http_port: u16,
    pub scylla_nodes: Vec<String>,
    pub scylla_keyspace: String,
    pub redpanda_brokers: String,
    pub events_topic: String,
    pub queue: QueueConfig,
    pub cors_allow_origin: String,
}

impl Config {
    /// Load `.env` if present, then read the process environment
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let text = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let scylla_nodes: Vec<String> = text("SCYLLA_NODES", "127.0.0.1:9042")
            .split(',')
            .map(str::trim)
            .filter(|node| !node.is_empty())
            .map(str::to_string)
            .collect();
        if scylla_nodes.is_empty() {
            anyhow::bail!("SCYLLA_NODES must name at least one node");
        }

        let max_deliveries: u32 = parsed(&lookup, "QUEUE_MAX_DELIVERIES", 3)?;
        if max_deliveries == 0 {
            anyhow::bail!("QUEUE_MAX_DELIVERIES must be at least 1");
        }
        let batch_size: usize = parsed(&lookup, "QUEUE_BATCH_SIZE", 10)?;
        if batch_size == 0 {
            anyhow::bail!("QUEUE_BATCH_SIZE must be at least 1");
        }

        Ok(Self {
            http_host: text("HTTP_HOST", "0.0.0.0"),
            http_port: parsed(&lookup, "HTTP_PORT", 8080)?,
            scylla_nodes,
            scylla_keyspace: text("SCYLLA_KEYSPACE", "orders_ks"),
            redpanda_brokers: text("REDPANDA_BROKERS", "127.0.0.1:9092"),
            events_topic: text("EVENTS_TOPIC", "order-events"),
            queue: QueueConfig {
                topic: text("QUEUE_TOPIC", "order-queue"),
                retry_topic: text("QUEUE_RETRY_TOPIC", "order-queue-retry"),
                dlq_topic: text("QUEUE_DLQ_TOPIC", "order-queue-dlq"),
                group_id: text("QUEUE_GROUP_ID", "order-service"),
                max_deliveries,
                batch_size,
            },
            cors_allow_origin: text("CORS_ALLOW_ORIGIN", "*"),
        })
    }
}

fn parsed<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{} has an invalid value '{}'", key, raw)),
        None => Ok(default),
    }
}
