use serde::{Deserialize, Serialize};

/// 重试间隔下限（毫秒）
pub const MIN_LOCK_RETRY_INTERVAL_MS: u64 = 1000;

/// 分布式锁默认参数
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    pub key_prefix: String,
    pub ttl_ms: u64,
    pub retry_interval_ms: u64,
    pub max_retries: u32,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            key_prefix: "lock:".to_string(),
            ttl_ms: 30_000,
            retry_interval_ms: MIN_LOCK_RETRY_INTERVAL_MS,
            max_retries: 3,
        }
    }
}

impl LockConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.ttl_ms == 0 {
            return Err(anyhow::anyhow!("锁租约时间必须大于0"));
        }

        if self.retry_interval_ms < MIN_LOCK_RETRY_INTERVAL_MS {
            return Err(anyhow::anyhow!(
                "锁重试间隔不能小于 {MIN_LOCK_RETRY_INTERVAL_MS} 毫秒: {}",
                self.retry_interval_ms
            ));
        }

        Ok(())
    }

    pub fn lock_key(&self, name: &str) -> String {
        format!("{}{}", self.key_prefix, name)
    }
}
