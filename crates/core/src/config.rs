use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub dispatch: DispatchConfig,
    pub execution: ExecutionConfig,
    pub automation: AutomationConfig,
    pub fees: FeeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Events older than this are a race already lost; never acted on.
    pub staleness_bound_secs: i64,
    /// Bounded parallelism for per-config evaluation and lock/enqueue.
    pub eval_concurrency: usize,
    pub lock_ttl_secs: u64,
    pub aux_cache_ttl_secs: u64,
    pub aux_cache_capacity: usize,
    pub aux_fetch_timeout_ms: u64,
    pub aux_fetch_attempts: u32,
    pub aux_fetch_backoff_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    pub workers: usize,
    /// Queue-wide cap respecting upstream transaction-submission limits.
    pub jobs_per_minute: u32,
    /// Longer than the dispatch TTL: must cover on-chain confirmation.
    pub lock_ttl_secs: u64,
    pub queue_poll_ms: u64,
    pub balance_cache_ttl_ms: u64,
    pub balance_read_attempts: u32,
    pub balance_read_backoff_ms: u64,
    pub position_insert_attempts: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationConfig {
    pub poll_interval_ms: u64,
    pub price_timeout_ms: u64,
    /// Backoff after a failed sell before the same position is retried.
    pub sell_cooldown_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeConfig {
    /// Platform fee as basis points of the buy amount.
    pub platform_fee_bps: u16,
    /// Fixed buffer for network fees on top of everything else.
    pub network_fee_buffer_lamports: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "postgresql://localhost/sniper".to_string(),
                max_connections: 10,
            },
            redis: RedisConfig {
                url: "redis://127.0.0.1/".to_string(),
            },
            dispatch: DispatchConfig::default(),
            execution: ExecutionConfig::default(),
            automation: AutomationConfig::default(),
            fees: FeeConfig::default(),
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            staleness_bound_secs: 30,
            eval_concurrency: 16,
            lock_ttl_secs: 120,
            aux_cache_ttl_secs: 60,
            aux_cache_capacity: 256,
            aux_fetch_timeout_ms: 1_500,
            aux_fetch_attempts: 3,
            aux_fetch_backoff_ms: 200,
        }
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            jobs_per_minute: 30,
            lock_ttl_secs: 300,
            queue_poll_ms: 200,
            balance_cache_ttl_ms: 10_000,
            balance_read_attempts: 3,
            balance_read_backoff_ms: 250,
            position_insert_attempts: 3,
        }
    }
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 500,
            price_timeout_ms: 800,
            sell_cooldown_secs: 30,
        }
    }
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            platform_fee_bps: 100,
            network_fee_buffer_lamports: 5_000_000,
        }
    }
}
