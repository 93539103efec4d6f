use std::fmt;
use std::sync::Arc;

use taskmgmt_core::{
    config::ConnectionRequestConfig, ConnectionRequest, Message, MessageBus, TaskMgmtResult,
};
use taskmgmt_infrastructure::{KvClient, SetOptions};
use tracing::{debug, error, info};

/// 连接请求状态
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionRequestStatus {
    InProgress,
    Succeeded,
    Failed(String),
}

impl fmt::Display for ConnectionRequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionRequestStatus::InProgress => f.write_str("in-progress"),
            ConnectionRequestStatus::Succeeded => f.write_str("succeeded"),
            ConnectionRequestStatus::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// 连接请求协调器
///
/// 每个设备的连接请求状态以 `<key_prefix><device_id>` 为键保存在KV存储中，
/// 状态字符串对协调器而言是不透明的。请求本身通过消息总线发给专门的执行Worker。
#[derive(Clone)]
pub struct ConnectionRequestCoordinator {
    bus: Arc<dyn MessageBus>,
    kv: KvClient,
    address: String,
    key_prefix: String,
}

impl ConnectionRequestCoordinator {
    pub fn new(bus: Arc<dyn MessageBus>, kv: KvClient, config: &ConnectionRequestConfig) -> Self {
        Self {
            bus,
            kv,
            address: config.address.clone(),
            key_prefix: config.key_prefix.clone(),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn state_key(&self, device_id: &str) -> String {
        format!("{}{}", self.key_prefix, device_id)
    }

    /// 提交连接请求
    ///
    /// 只负责发布，不等待执行结果。执行进度通过 [`Self::get_state`] 查询。
    pub async fn submit(&self, request: ConnectionRequest) -> TaskMgmtResult<()> {
        let device_id = request.device_id.clone();
        let message = Message::connection_request(request);

        self.bus
            .publish(&self.address, &message)
            .await
            .inspect_err(|e| {
                error!(device_id = %device_id, "Failed to submit connection request: {}", e);
            })?;

        info!(device_id = %device_id, "Connection request submitted");
        metrics::counter!("taskmgmt_connreq_submitted_total").increment(1);
        Ok(())
    }

    /// 查询设备的连接请求状态，没有记录时返回 `None`
    pub async fn get_state(&self, device_id: &str) -> TaskMgmtResult<Option<String>> {
        Ok(self.kv.get(&self.state_key(device_id)).await?)
    }

    /// 写入设备的连接请求状态，`ttl_ms` 为 0 时不过期
    pub async fn record_state(
        &self,
        device_id: &str,
        status: &ConnectionRequestStatus,
        ttl_ms: u64,
    ) -> TaskMgmtResult<()> {
        let key = self.state_key(device_id);
        self.kv
            .set(&key, &status.to_string(), SetOptions::new().expiration_ms(ttl_ms))
            .await?;
        debug!(device_id, "Connection request state: {}", status);
        Ok(())
    }
}

impl fmt::Debug for ConnectionRequestCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionRequestCoordinator")
            .field("address", &self.address)
            .field("key_prefix", &self.key_prefix)
            .finish()
    }
}
