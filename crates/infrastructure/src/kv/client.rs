use std::sync::Arc;

use async_trait::async_trait;
use taskmgmt_core::{KvError, KvResult};
use tracing::{debug, error, warn};

use super::command::{KvCommand, SetOptions};
use super::memory::InMemoryKvTransport;
use super::reply::{FromKvReply, KvReply};

/// KV存储传输层
///
/// 负责把 [`KvCommand`] 发送到具体的存储并返回原始应答。
/// 连接层面的故障返回 `Err`，存储执行失败则以 [`KvReply::Error`] 返回。
#[async_trait]
pub trait KvTransport: Send + Sync {
    async fn execute(&self, command: KvCommand) -> KvResult<KvReply>;
}

/// 类型化的KV/队列客户端
///
/// 所有操作都是异步的，并且只产生一个结果：
/// - `Ok(Some(value))`: 应答形态与声明的形态一致
/// - `Ok(None)`: 存储成功但没有值
/// - `Err(KvError::Store)`: 存储返回失败状态，操作未生效
/// - `Err(KvError::UnexpectedShape)`: 应答形态与声明不符
#[derive(Clone)]
pub struct KvClient {
    transport: Arc<dyn KvTransport>,
}

impl KvClient {
    pub fn new(transport: Arc<dyn KvTransport>) -> Self {
        Self { transport }
    }

    /// 使用进程内存储创建客户端
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryKvTransport::new()))
    }

    /// 执行命令并按声明的形态 `T` 解析应答
    pub async fn query<T: FromKvReply>(&self, command: KvCommand) -> KvResult<Option<T>> {
        let name = command.name();
        metrics::counter!("taskmgmt_kv_commands_total", "command" => name).increment(1);

        let reply = self.transport.execute(command).await.inspect_err(|e| {
            metrics::counter!("taskmgmt_kv_errors_total", "command" => name).increment(1);
            warn!("KV command {} failed at transport level: {}", name, e);
        })?;

        match reply {
            KvReply::Nil => Ok(None),
            KvReply::Error(message) => {
                metrics::counter!("taskmgmt_kv_errors_total", "command" => name).increment(1);
                debug!("KV command {} returned failure status: {}", name, message);
                Err(KvError::Store {
                    command: name,
                    message,
                })
            }
            reply => T::from_reply(reply).map(Some).inspect_err(|e| {
                error!("KV command {} returned unexpected reply: {}", name, e);
            }),
        }
    }

    pub async fn ping(&self) -> KvResult<()> {
        match self.query::<String>(KvCommand::Ping).await? {
            Some(reply) if reply == "PONG" => Ok(()),
            other => Err(KvError::Connection(format!(
                "Unexpected PING response: {other:?}"
            ))),
        }
    }

    pub async fn get(&self, key: &str) -> KvResult<Option<String>> {
        self.query(KvCommand::Get {
            key: key.to_string(),
        })
        .await
    }

    /// 写入字符串值
    ///
    /// 返回 `Some("OK")` 表示已写入，`None` 表示写入条件未满足。
    /// 同时要求 `not_exist` 与 `exist` 时直接返回
    /// [`KvError::ConflictingSetConditions`]，不会访问存储。
    pub async fn set(
        &self,
        key: &str,
        value: &str,
        options: SetOptions,
    ) -> KvResult<Option<String>> {
        let condition = options.condition()?;
        self.query(KvCommand::Set {
            key: key.to_string(),
            value: value.to_string(),
            expiration_ms: options.effective_expiration(),
            condition,
        })
        .await
    }

    pub async fn del(&self, key: &str) -> KvResult<Option<i64>> {
        self.query(KvCommand::Del {
            key: key.to_string(),
        })
        .await
    }

    pub async fn sadd(&self, key: &str, member: &str) -> KvResult<Option<i64>> {
        self.query(KvCommand::SAdd {
            key: key.to_string(),
            member: member.to_string(),
        })
        .await
    }

    pub async fn smembers(&self, key: &str) -> KvResult<Option<Vec<String>>> {
        self.query(KvCommand::SMembers {
            key: key.to_string(),
        })
        .await
    }

    pub async fn lpush(&self, key: &str, value: &str) -> KvResult<Option<i64>> {
        self.query(KvCommand::LPush {
            key: key.to_string(),
            value: value.to_string(),
        })
        .await
    }

    pub async fn rpush(&self, key: &str, value: &str) -> KvResult<Option<i64>> {
        self.query(KvCommand::RPush {
            key: key.to_string(),
            value: value.to_string(),
        })
        .await
    }

    pub async fn lpop(&self, key: &str) -> KvResult<Option<String>> {
        self.query(KvCommand::LPop {
            key: key.to_string(),
        })
        .await
    }

    pub async fn llen(&self, key: &str) -> KvResult<Option<i64>> {
        self.query(KvCommand::LLen {
            key: key.to_string(),
        })
        .await
    }

    pub async fn lrange(&self, key: &str, start: i64, stop: i64) -> KvResult<Option<Vec<String>>> {
        self.query(KvCommand::LRange {
            key: key.to_string(),
            start,
            stop,
        })
        .await
    }

    /// 删除列表中第一个等于 `value` 的元素
    pub async fn lrem(&self, key: &str, value: &str) -> KvResult<Option<i64>> {
        self.query(KvCommand::LRem {
            key: key.to_string(),
            value: value.to_string(),
        })
        .await
    }

    pub async fn zadd(&self, key: &str, score: i64, member: &str) -> KvResult<Option<i64>> {
        self.query(KvCommand::ZAdd {
            key: key.to_string(),
            score,
            member: member.to_string(),
        })
        .await
    }

    pub async fn zrem(&self, key: &str, member: &str) -> KvResult<Option<i64>> {
        self.query(KvCommand::ZRem {
            key: key.to_string(),
            member: member.to_string(),
        })
        .await
    }

    pub async fn zrange(&self, key: &str, start: i64, stop: i64) -> KvResult<Option<Vec<String>>> {
        self.query(KvCommand::ZRange {
            key: key.to_string(),
            start,
            stop,
        })
        .await
    }

    pub async fn zrange_by_score(
        &self,
        key: &str,
        min: i64,
        max: i64,
        offset: i64,
        count: i64,
    ) -> KvResult<Option<Vec<String>>> {
        self.query(KvCommand::ZRangeByScore {
            key: key.to_string(),
            min,
            max,
            offset,
            count,
        })
        .await
    }
}

impl std::fmt::Debug for KvClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KvClient").finish_non_exhaustive()
    }
}
