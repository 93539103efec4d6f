use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionRequestConfig {
    pub enabled: bool,
    /// 连接请求执行Worker消费的地址
    pub address: String,
    pub key_prefix: String,
    pub status_ttl_ms: u64,
    pub http_timeout_seconds: u64,
}

impl Default for ConnectionRequestConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            address: "taskmgmt.connreq".to_string(),
            key_prefix: "connreq:".to_string(),
            status_ttl_ms: 600_000,
            http_timeout_seconds: 10,
        }
    }
}

impl ConnectionRequestConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.address.is_empty() {
            return Err(anyhow::anyhow!("连接请求地址不能为空"));
        }

        if self.key_prefix.is_empty() {
            return Err(anyhow::anyhow!("连接请求状态键前缀不能为空"));
        }

        if self.http_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("连接请求HTTP超时时间必须大于0"));
        }

        Ok(())
    }
}
