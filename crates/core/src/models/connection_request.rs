use serde::{Deserialize, Serialize};

/// 发往连接请求执行Worker的请求记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionRequest {
    /// 设备复合标识，例如 `OUI-SN`
    pub device_id: String,
    /// 设备的连接请求URL
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl ConnectionRequest {
    pub fn new(device_id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            url: url.into(),
            username: None,
            password: None,
        }
    }

    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }
}

/// 由 OUI 和序列号组成设备复合标识
pub fn device_key(oui: &str, serial_number: &str) -> String {
    format!("{oui}-{serial_number}")
}
