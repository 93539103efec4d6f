use async_trait::async_trait;
use taskmgmt_core::{Message, MessageBus, TaskMgmtResult};
use tracing::{debug, error};

use crate::durable_queue::DurableQueue;
use crate::kv::KvClient;

/// 基于存储列表的消息总线
///
/// 每个地址对应一个 [`DurableQueue`]，地址即列表键。
/// 无法解析的消息会被记录并丢弃，不会阻塞后续消息。
#[derive(Debug, Clone)]
pub struct KvMessageBus {
    kv: KvClient,
}

impl KvMessageBus {
    pub fn new(kv: KvClient) -> Self {
        Self { kv }
    }

    pub fn queue(&self, address: &str) -> DurableQueue {
        DurableQueue::new(self.kv.clone(), address)
    }
}

#[async_trait]
impl MessageBus for KvMessageBus {
    async fn publish(&self, address: &str, message: &Message) -> TaskMgmtResult<()> {
        self.queue(address).push(message).await?;
        debug!(address, kind = message.kind_name(), "Message published");
        metrics::counter!("taskmgmt_bus_published_total").increment(1);
        Ok(())
    }

    async fn consume(&self, address: &str, max_messages: usize) -> TaskMgmtResult<Vec<Message>> {
        let queue = self.queue(address);
        let mut messages = Vec::new();

        while messages.len() < max_messages {
            let Some(payload) = queue.pop_raw().await? else {
                break;
            };
            match Message::deserialize(&payload) {
                Ok(message) => messages.push(message),
                Err(e) => {
                    error!(address, "Discarding undecodable message: {}", e);
                    metrics::counter!("taskmgmt_bus_discarded_total").increment(1);
                }
            }
        }

        Ok(messages)
    }

    async fn requeue(&self, address: &str, message: &Message) -> TaskMgmtResult<()> {
        self.queue(address).push(message).await?;
        debug!(address, message_id = %message.id, "Message requeued");
        Ok(())
    }

    async fn pending(&self, address: &str) -> TaskMgmtResult<usize> {
        self.queue(address).len().await
    }
}
