//! 分布式锁
//!
//! 基于存储的条件写入 (`SET key holder NX PX ttl`) 实现的具名、限时、带持有者标识的锁。
//! 同一个键在任意时刻最多只有一个持有者，由存储对条件写入的原子性保证。
//!
//! 租约到期是唯一的释放方式，没有续约。持有时间超过租约的任务会与下一个持有者重叠执行。

use std::time::Duration;

use taskmgmt_core::{config::LockConfig, KvResult};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::kv::{KvClient, SetOptions};

/// 重试间隔下限
pub const MIN_RETRY_INTERVAL: Duration = Duration::from_millis(1000);

/// 首次尝试加上 `max_retries` 次重试
fn total_attempts(max_retries: u32) -> u64 {
    u64::from(max_retries) + 1
}

#[derive(Debug, Clone)]
pub struct DistributedLock {
    kv: KvClient,
    defaults: LockConfig,
}

impl DistributedLock {
    pub fn new(kv: KvClient, defaults: LockConfig) -> Self {
        Self { kv, defaults }
    }

    pub fn lock_key(&self, name: &str) -> String {
        self.defaults.lock_key(name)
    }

    /// 尝试获取锁
    ///
    /// 每次尝试都是一次条件写入，存储接受写入即为获取成功。被拒绝时最多重试
    /// `max_retries` 次，即最多写入 `max_retries + 1` 次；两次尝试之间至少间隔
    /// `retry_interval`，小于1秒的间隔按1秒处理。单次尝试中的存储错误视为该次被拒绝。
    pub async fn acquire(
        &self,
        lock_key: &str,
        holder_id: &str,
        ttl: Duration,
        retry_interval: Duration,
        max_retries: u32,
    ) -> bool {
        let retry_interval = if retry_interval < MIN_RETRY_INTERVAL {
            warn!(
                lock_key,
                "Retry interval {:?} is below the minimum, using {:?}",
                retry_interval,
                MIN_RETRY_INTERVAL
            );
            MIN_RETRY_INTERVAL
        } else {
            retry_interval
        };
        let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);
        let options = SetOptions::new().expiration_ms(ttl_ms).not_exist();

        for attempt in 0..=max_retries {
            match self.kv.set(lock_key, holder_id, options).await {
                Ok(Some(_)) => {
                    debug!(lock_key, holder_id, attempt, "Lock acquired");
                    metrics::counter!("taskmgmt_lock_acquired_total").increment(1);
                    return true;
                }
                Ok(None) => {
                    debug!(lock_key, holder_id, attempt, "Lock is held by another holder");
                }
                Err(e) => {
                    warn!(
                        lock_key,
                        holder_id, attempt, "Lock attempt failed, counted as denied: {}", e
                    );
                }
            }

            if attempt < max_retries {
                sleep(retry_interval).await;
            }
        }

        info!(
            lock_key,
            holder_id,
            "Lock not acquired after {} attempts",
            total_attempts(max_retries)
        );
        metrics::counter!("taskmgmt_lock_denied_total").increment(1);
        false
    }

    /// 使用配置中的默认参数获取 `name` 对应的锁
    pub async fn acquire_with_defaults(&self, name: &str, holder_id: &str) -> bool {
        let lock_key = self.lock_key(name);
        self.acquire(
            &lock_key,
            holder_id,
            Duration::from_millis(self.defaults.ttl_ms),
            Duration::from_millis(self.defaults.retry_interval_ms),
            self.defaults.max_retries,
        )
        .await
    }

    /// 查看当前持有者，租约已过期时返回 `None`
    pub async fn holder(&self, lock_key: &str) -> KvResult<Option<String>> {
        self.kv.get(lock_key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_attempts_includes_first_try() {
        assert_eq!(total_attempts(0), 1);
        assert_eq!(total_attempts(3), 4);
        assert_eq!(total_attempts(u32::MAX), u64::from(u32::MAX) + 1);
    }
}
