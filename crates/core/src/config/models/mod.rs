pub mod app_config;
pub mod connection_request;
pub mod lock;
pub mod observability;
pub mod redis;
pub mod worker;

pub use app_config::AppConfig;
pub use connection_request::ConnectionRequestConfig;
pub use lock::{LockConfig, MIN_LOCK_RETRY_INTERVAL_MS};
pub use observability::ObservabilityConfig;
pub use redis::{KvBackend, RedisConfig};
pub use worker::{WorkerConfig, SHUTDOWN_RECOVERY_MARGIN_MS};
