use taskmgmt_core::{Message, TaskMgmtResult};
use tracing::debug;

use crate::kv::KvClient;

/// 基于存储列表的持久队列
///
/// 入队追加到列表尾部 (RPUSH)，出队从头部取出 (LPOP)。
/// 进程崩溃不会丢失已入队的消息。
#[derive(Debug, Clone)]
pub struct DurableQueue {
    kv: KvClient,
    name: String,
}

impl DurableQueue {
    pub fn new(kv: KvClient, name: impl Into<String>) -> Self {
        Self {
            kv,
            name: name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 入队并返回入队后的队列长度
    pub async fn push(&self, message: &Message) -> TaskMgmtResult<usize> {
        let payload = message.serialize()?;
        let len = self.kv.rpush(&self.name, &payload).await?.unwrap_or(0);
        debug!(queue = %self.name, message_id = %message.id, "Message pushed");
        Ok(usize::try_from(len).unwrap_or(0))
    }

    pub async fn pop(&self) -> TaskMgmtResult<Option<Message>> {
        match self.kv.lpop(&self.name).await? {
            Some(payload) => Ok(Some(Message::deserialize(&payload)?)),
            None => Ok(None),
        }
    }

    /// 弹出原始负载，由调用方决定如何处理无法解析的消息
    pub async fn pop_raw(&self) -> TaskMgmtResult<Option<String>> {
        Ok(self.kv.lpop(&self.name).await?)
    }

    pub async fn len(&self) -> TaskMgmtResult<usize> {
        let len = self.kv.llen(&self.name).await?.unwrap_or(0);
        Ok(usize::try_from(len).unwrap_or(0))
    }

    pub async fn is_empty(&self) -> TaskMgmtResult<bool> {
        Ok(self.len().await? == 0)
    }

    /// 删除队列中第一条与 `message` 相同的消息，返回是否删除
    pub async fn remove(&self, message: &Message) -> TaskMgmtResult<bool> {
        let payload = message.serialize()?;
        Ok(self.kv.lrem(&self.name, &payload).await?.unwrap_or(0) > 0)
    }

    /// 读取队列中的全部消息，不出队
    pub async fn peek_all(&self) -> TaskMgmtResult<Vec<Message>> {
        let payloads = self.kv.lrange(&self.name, 0, -1).await?.unwrap_or_default();
        payloads
            .iter()
            .map(|payload| Message::deserialize(payload).map_err(Into::into))
            .collect()
    }
}
