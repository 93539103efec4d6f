use std::fmt;

/// SET 的写入条件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetCondition {
    /// 仅当键不存在时写入 (NX)
    NotExists,
    /// 仅当键已存在时写入 (XX)
    Exists,
}

/// KV存储命令
///
/// 覆盖执行引擎用到的全部存储命令。传输层只需要把这些命令翻译为具体存储的协议。
#[derive(Debug, Clone, PartialEq)]
pub enum KvCommand {
    Ping,
    Get {
        key: String,
    },
    Set {
        key: String,
        value: String,
        expiration_ms: Option<u64>,
        condition: Option<SetCondition>,
    },
    Del {
        key: String,
    },
    SAdd {
        key: String,
        member: String,
    },
    SMembers {
        key: String,
    },
    LPush {
        key: String,
        value: String,
    },
    RPush {
        key: String,
        value: String,
    },
    LPop {
        key: String,
    },
    LLen {
        key: String,
    },
    LRange {
        key: String,
        start: i64,
        stop: i64,
    },
    /// 删除列表中与值相等的第一个元素
    LRem {
        key: String,
        value: String,
    },
    ZAdd {
        key: String,
        score: i64,
        member: String,
    },
    ZRem {
        key: String,
        member: String,
    },
    ZRange {
        key: String,
        start: i64,
        stop: i64,
    },
    ZRangeByScore {
        key: String,
        min: i64,
        max: i64,
        offset: i64,
        count: i64,
    },
}

impl KvCommand {
    /// 命令名称，用于日志和错误信息
    pub fn name(&self) -> &'static str {
        match self {
            KvCommand::Ping => "PING",
            KvCommand::Get { .. } => "GET",
            KvCommand::Set { .. } => "SET",
            KvCommand::Del { .. } => "DEL",
            KvCommand::SAdd { .. } => "SADD",
            KvCommand::SMembers { .. } => "SMEMBERS",
            KvCommand::LPush { .. } => "LPUSH",
            KvCommand::RPush { .. } => "RPUSH",
            KvCommand::LPop { .. } => "LPOP",
            KvCommand::LLen { .. } => "LLEN",
            KvCommand::LRange { .. } => "LRANGE",
            KvCommand::LRem { .. } => "LREM",
            KvCommand::ZAdd { .. } => "ZADD",
            KvCommand::ZRem { .. } => "ZREM",
            KvCommand::ZRange { .. } => "ZRANGE",
            KvCommand::ZRangeByScore { .. } => "ZRANGEBYSCORE",
        }
    }

    pub fn key(&self) -> Option<&str> {
        match self {
            KvCommand::Ping => None,
            KvCommand::Get { key }
            | KvCommand::Set { key, .. }
            | KvCommand::Del { key }
            | KvCommand::SAdd { key, .. }
            | KvCommand::SMembers { key }
            | KvCommand::LPush { key, .. }
            | KvCommand::RPush { key, .. }
            | KvCommand::LPop { key }
            | KvCommand::LLen { key }
            | KvCommand::LRange { key, .. }
            | KvCommand::LRem { key, .. }
            | KvCommand::ZAdd { key, .. }
            | KvCommand::ZRem { key, .. }
            | KvCommand::ZRange { key, .. }
            | KvCommand::ZRangeByScore { key, .. } => Some(key),
        }
    }
}

impl fmt::Display for KvCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.key() {
            Some(key) => write!(f, "{} {}", self.name(), key),
            None => f.write_str(self.name()),
        }
    }
}

/// SET 选项
///
/// `expiration_ms` 为 0 或 `None` 时不设置过期时间。
/// `not_exist` 与 `exist` 互斥，同时为 true 时客户端直接返回错误，不访问存储。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SetOptions {
    pub expiration_ms: Option<u64>,
    pub not_exist: bool,
    pub exist: bool,
}

impl SetOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn expiration_ms(mut self, expiration_ms: u64) -> Self {
        self.expiration_ms = Some(expiration_ms);
        self
    }

    pub fn not_exist(mut self) -> Self {
        self.not_exist = true;
        self
    }

    pub fn exist(mut self) -> Self {
        self.exist = true;
        self
    }

    pub(crate) fn effective_expiration(&self) -> Option<u64> {
        self.expiration_ms.filter(|ms| *ms > 0)
    }

    pub(crate) fn condition(&self) -> taskmgmt_core::KvResult<Option<SetCondition>> {
        match (self.not_exist, self.exist) {
            (true, true) => Err(taskmgmt_core::KvError::ConflictingSetConditions),
            (true, false) => Ok(Some(SetCondition::NotExists)),
            (false, true) => Ok(Some(SetCondition::Exists)),
            (false, false) => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskmgmt_core::KvError;

    #[test]
    fn test_set_options_condition() {
        assert_eq!(SetOptions::new().condition(), Ok(None));
        assert_eq!(
            SetOptions::new().not_exist().condition(),
            Ok(Some(SetCondition::NotExists))
        );
        assert_eq!(
            SetOptions::new().exist().condition(),
            Ok(Some(SetCondition::Exists))
        );
        assert_eq!(
            SetOptions::new().not_exist().exist().condition(),
            Err(KvError::ConflictingSetConditions)
        );
    }

    #[test]
    fn test_zero_expiration_is_ignored() {
        assert_eq!(SetOptions::new().expiration_ms(0).effective_expiration(), None);
        assert_eq!(
            SetOptions::new().expiration_ms(5000).effective_expiration(),
            Some(5000)
        );
    }

    #[test]
    fn test_command_display() {
        let command = KvCommand::LLen {
            key: "queue".to_string(),
        };
        assert_eq!(command.to_string(), "LLEN queue");
        assert_eq!(KvCommand::Ping.to_string(), "PING");
    }
}
