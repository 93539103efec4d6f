use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ConnectionRequest, TaskDescriptor};

/// 消息总线上传输的消息信封
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub kind: MessageKind,
    pub timestamp: DateTime<Utc>,
    pub retry_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MessageKind {
    Task(TaskDescriptor),
    ConnectionRequest(ConnectionRequest),
}

impl Message {
    pub fn task(task: TaskDescriptor) -> Self {
        Self::with_kind(MessageKind::Task(task))
    }

    pub fn connection_request(request: ConnectionRequest) -> Self {
        Self::with_kind(MessageKind::ConnectionRequest(request))
    }

    fn with_kind(kind: MessageKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            timestamp: Utc::now(),
            retry_count: 0,
        }
    }

    pub fn increment_retry(&mut self) {
        self.retry_count = self.retry_count.saturating_add(1);
    }

    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            MessageKind::Task(_) => "task",
            MessageKind::ConnectionRequest(_) => "connection_request",
        }
    }

    pub fn serialize(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn deserialize(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_is_internally_tagged() {
        let message = Message::connection_request(
            ConnectionRequest::new("OUI-SN1", "http://10.0.0.1:7547/").with_credentials("u", "p"),
        );
        let encoded = message.serialize().unwrap();
        let value: serde_json::Value = serde_json::from_str(&encoded).unwrap();

        assert_eq!(value["kind"]["type"], "ConnectionRequest");
        assert_eq!(value["kind"]["deviceId"], "OUI-SN1");
        assert_eq!(Message::deserialize(&encoded).unwrap(), message);
    }

    #[test]
    fn test_retry_count() {
        let mut message = Message::task(TaskDescriptor::new("Noop", json!(null)));
        assert_eq!(message.kind_name(), "task");
        message.increment_retry();
        message.increment_retry();
        assert_eq!(message.retry_count, 2);
    }
}
