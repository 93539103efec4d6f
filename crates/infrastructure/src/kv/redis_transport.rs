use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{Client, RedisError, Value};
use serde_json::Map;
use taskmgmt_core::{config::RedisConfig, KvError, KvResult, TaskMgmtError, TaskMgmtResult};
use tokio::time::{sleep, timeout};
use tracing::{debug, error, warn};

use super::client::KvTransport;
use super::command::{KvCommand, SetCondition};
use super::reply::KvReply;

/// 基于Redis的KV传输层
///
/// 使用 `ConnectionManager` 复用单个多路复用连接，断线后自动重连。
#[derive(Clone)]
pub struct RedisKvTransport {
    manager: ConnectionManager,
}

impl RedisKvTransport {
    /// 连接Redis，按配置的次数和间隔重试
    pub async fn connect(config: &RedisConfig) -> TaskMgmtResult<Self> {
        Self::connect_url(
            &config.build_url(),
            config.max_retry_attempts,
            Duration::from_secs(config.retry_delay_seconds),
            Duration::from_secs(config.connection_timeout_seconds),
        )
        .await
    }

    pub async fn connect_url(
        url: &str,
        max_retry_attempts: u32,
        retry_delay: Duration,
        connection_timeout: Duration,
    ) -> TaskMgmtResult<Self> {
        let client = Client::open(url).map_err(|e| {
            KvError::Connection(format!("Failed to create Redis client: {e}"))
        })?;

        let attempts = max_retry_attempts.max(1);
        let mut last_error = String::from("Unknown");

        for attempt in 0..attempts {
            match timeout(connection_timeout, ConnectionManager::new(client.clone())).await {
                Ok(Ok(manager)) => {
                    if attempt > 0 {
                        debug!(
                            "Successfully connected to Redis after {} attempts",
                            attempt + 1
                        );
                    }
                    let transport = Self { manager };
                    transport.test_connection().await?;
                    return Ok(transport);
                }
                Ok(Err(e)) => last_error = e.to_string(),
                Err(_) => last_error = format!("timed out after {connection_timeout:?}"),
            }

            if attempt + 1 < attempts {
                warn!(
                    "Failed to connect to Redis (attempt {}/{}): {}. Retrying in {:?}...",
                    attempt + 1,
                    attempts,
                    last_error,
                    retry_delay
                );
                sleep(retry_delay).await;
            }
        }

        let error_msg = format!(
            "Failed to connect to Redis after {attempts} attempts. Last error: {last_error}"
        );
        error!("{}", error_msg);
        Err(TaskMgmtError::Kv(KvError::Connection(error_msg)))
    }

    async fn test_connection(&self) -> TaskMgmtResult<()> {
        match self.execute(KvCommand::Ping).await? {
            KvReply::Text(response) if response == "PONG" => {
                debug!("Redis connection test successful");
                Ok(())
            }
            other => {
                let error_msg = format!("Unexpected PING response: {other:?}");
                error!("{}", error_msg);
                Err(TaskMgmtError::Kv(KvError::Connection(error_msg)))
            }
        }
    }

    fn build_command(command: &KvCommand) -> redis::Cmd {
        match command {
            KvCommand::Ping => redis::cmd("PING"),
            KvCommand::Get { key } => {
                let mut cmd = redis::cmd("GET");
                cmd.arg(key);
                cmd
            }
            KvCommand::Set {
                key,
                value,
                expiration_ms,
                condition,
            } => {
                let mut cmd = redis::cmd("SET");
                cmd.arg(key).arg(value);
                if let Some(ms) = expiration_ms {
                    cmd.arg("PX").arg(*ms);
                }
                match condition {
                    Some(SetCondition::NotExists) => {
                        cmd.arg("NX");
                    }
                    Some(SetCondition::Exists) => {
                        cmd.arg("XX");
                    }
                    None => {}
                }
                cmd
            }
            KvCommand::Del { key } => {
                let mut cmd = redis::cmd("DEL");
                cmd.arg(key);
                cmd
            }
            KvCommand::SAdd { key, member } => {
                let mut cmd = redis::cmd("SADD");
                cmd.arg(key).arg(member);
                cmd
            }
            KvCommand::SMembers { key } => {
                let mut cmd = redis::cmd("SMEMBERS");
                cmd.arg(key);
                cmd
            }
            KvCommand::LPush { key, value } => {
                let mut cmd = redis::cmd("LPUSH");
                cmd.arg(key).arg(value);
                cmd
            }
            KvCommand::RPush { key, value } => {
                let mut cmd = redis::cmd("RPUSH");
                cmd.arg(key).arg(value);
                cmd
            }
            KvCommand::LPop { key } => {
                let mut cmd = redis::cmd("LPOP");
                cmd.arg(key);
                cmd
            }
            KvCommand::LLen { key } => {
                let mut cmd = redis::cmd("LLEN");
                cmd.arg(key);
                cmd
            }
            KvCommand::LRange { key, start, stop } => {
                let mut cmd = redis::cmd("LRANGE");
                cmd.arg(key).arg(*start).arg(*stop);
                cmd
            }
            KvCommand::LRem { key, value } => {
                let mut cmd = redis::cmd("LREM");
                cmd.arg(key).arg(1).arg(value);
                cmd
            }
            KvCommand::ZAdd { key, score, member } => {
                let mut cmd = redis::cmd("ZADD");
                cmd.arg(key).arg(*score).arg(member);
                cmd
            }
            KvCommand::ZRem { key, member } => {
                let mut cmd = redis::cmd("ZREM");
                cmd.arg(key).arg(member);
                cmd
            }
            KvCommand::ZRange { key, start, stop } => {
                let mut cmd = redis::cmd("ZRANGE");
                cmd.arg(key).arg(*start).arg(*stop);
                cmd
            }
            KvCommand::ZRangeByScore {
                key,
                min,
                max,
                offset,
                count,
            } => {
                let mut cmd = redis::cmd("ZRANGEBYSCORE");
                cmd.arg(key)
                    .arg(*min)
                    .arg(*max)
                    .arg("LIMIT")
                    .arg(*offset)
                    .arg(*count);
                cmd
            }
        }
    }

    fn is_connection_error(e: &RedisError) -> bool {
        e.is_io_error() || e.is_timeout() || e.is_connection_dropped() || e.is_connection_refusal()
    }
}

fn to_reply(value: Value) -> KvReply {
    match value {
        Value::Nil => KvReply::Nil,
        Value::Int(n) => KvReply::Integer(n),
        Value::BulkString(bytes) => KvReply::Text(String::from_utf8_lossy(&bytes).into_owned()),
        Value::SimpleString(text) => KvReply::Text(text),
        Value::Okay => KvReply::Text("OK".to_string()),
        Value::Array(items) | Value::Set(items) => {
            KvReply::Array(items.into_iter().map(to_reply).collect())
        }
        Value::Map(pairs) => {
            let mut object = Map::with_capacity(pairs.len());
            for (key, value) in pairs {
                let key = match to_reply(key) {
                    KvReply::Text(text) => text,
                    other => format!("{other:?}"),
                };
                object.insert(key, to_json(to_reply(value)));
            }
            KvReply::Object(object)
        }
        Value::Double(d) => KvReply::Text(d.to_string()),
        Value::Boolean(b) => KvReply::Integer(i64::from(b)),
        other => KvReply::Error(format!("unsupported reply: {other:?}")),
    }
}

fn to_json(reply: KvReply) -> serde_json::Value {
    match reply {
        KvReply::Nil => serde_json::Value::Null,
        KvReply::Text(text) => serde_json::Value::String(text),
        KvReply::Integer(n) => serde_json::Value::from(n),
        KvReply::Object(object) => serde_json::Value::Object(object),
        KvReply::Array(items) => serde_json::Value::Array(items.into_iter().map(to_json).collect()),
        KvReply::Error(message) => serde_json::Value::String(message),
    }
}

#[async_trait]
impl KvTransport for RedisKvTransport {
    async fn execute(&self, command: KvCommand) -> KvResult<KvReply> {
        let cmd = Self::build_command(&command);
        let mut conn = self.manager.clone();

        match cmd.query_async::<Value>(&mut conn).await {
            Ok(value) => Ok(to_reply(value)),
            Err(e) if Self::is_connection_error(&e) => {
                warn!("Redis connection error on {}: {}", command, e);
                Err(KvError::Connection(e.to_string()))
            }
            Err(e) => Ok(KvReply::Error(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_mapping() {
        assert_eq!(to_reply(Value::Nil), KvReply::Nil);
        assert_eq!(to_reply(Value::Okay), KvReply::Text("OK".to_string()));
        assert_eq!(
            to_reply(Value::BulkString(b"online".to_vec())),
            KvReply::Text("online".to_string())
        );
        assert_eq!(
            to_reply(Value::Array(vec![Value::Int(1), Value::Nil])),
            KvReply::Array(vec![KvReply::Integer(1), KvReply::Nil])
        );
    }

    #[test]
    fn test_map_reply_becomes_object() {
        let reply = to_reply(Value::Map(vec![(
            Value::SimpleString("status".to_string()),
            Value::BulkString(b"succeeded".to_vec()),
        )]));

        match reply {
            KvReply::Object(object) => assert_eq!(object["status"], "succeeded"),
            other => panic!("expected object reply, got {other:?}"),
        }
    }

    #[test]
    fn test_set_command_arguments() {
        let cmd = RedisKvTransport::build_command(&KvCommand::Set {
            key: "lock:device-42".to_string(),
            value: "worker-1".to_string(),
            expiration_ms: Some(5000),
            condition: Some(SetCondition::NotExists),
        });
        let packed = String::from_utf8_lossy(&cmd.get_packed_command()).into_owned();

        assert!(packed.contains("SET"));
        assert!(packed.contains("PX"));
        assert!(packed.contains("5000"));
        assert!(packed.contains("NX"));
        assert!(!packed.contains("XX"));
    }
}
