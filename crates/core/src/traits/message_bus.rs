use async_trait::async_trait;

use crate::{models::Message, Result};

/// 消息总线抽象接口
///
/// 每个Worker池实例拥有一个入站地址；连接请求执行Worker消费一个独立地址。
/// 消费即出队，没有被接纳的消息由消费者调用 [`MessageBus::requeue`] 交还，
/// 由总线自身的投递语义决定何时再次投递。
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// 发布消息到指定地址
    async fn publish(&self, address: &str, message: &Message) -> Result<()>;

    /// 从指定地址最多取出 `max_messages` 条消息
    async fn consume(&self, address: &str, max_messages: usize) -> Result<Vec<Message>>;

    /// 将未被接纳的消息交还给总线
    async fn requeue(&self, address: &str, message: &Message) -> Result<()>;

    /// 获取地址上待投递的消息数量
    async fn pending(&self, address: &str) -> Result<usize>;
}
