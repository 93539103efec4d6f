use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use taskmgmt_core::{KvError, KvResult};
use tokio::time::Instant;

use super::client::KvTransport;
use super::command::{KvCommand, SetCondition};
use super::reply::KvReply;

const WRONG_TYPE: &str = "WRONGTYPE Operation against a key holding the wrong kind of value";

#[derive(Debug)]
enum StoredValue {
    Text(String),
    List(VecDeque<String>),
    Set(BTreeSet<String>),
    /// (score, member)，按分数再按成员排序
    SortedSet(BTreeSet<(i64, String)>),
}

#[derive(Debug)]
struct Entry {
    value: StoredValue,
    expires_at: Option<Instant>,
}

impl Entry {
    fn new(value: StoredValue) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// 进程内KV存储
///
/// 遵循与Redis相同的命令语义（条件写入、毫秒级过期、列表/集合/有序集合），
/// 用于测试和单进程运行。过期时间基于 `tokio::time::Instant`，
/// 因此在暂停时钟的测试中可以通过推进时间触发过期。
#[derive(Debug, Default)]
pub struct InMemoryKvTransport {
    entries: Mutex<HashMap<String, Entry>>,
}

impl InMemoryKvTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn apply(entries: &mut HashMap<String, Entry>, command: KvCommand, now: Instant) -> KvReply {
        if let Some(key) = command.key() {
            if entries.get(key).is_some_and(|entry| entry.is_expired(now)) {
                entries.remove(key);
            }
        }

        match command {
            KvCommand::Ping => KvReply::Text("PONG".to_string()),
            KvCommand::Get { key } => match entries.get(&key).map(|e| &e.value) {
                None => KvReply::Nil,
                Some(StoredValue::Text(text)) => KvReply::Text(text.clone()),
                Some(_) => KvReply::Error(WRONG_TYPE.to_string()),
            },
            KvCommand::Set {
                key,
                value,
                expiration_ms,
                condition,
            } => {
                let exists = entries.contains_key(&key);
                match condition {
                    Some(SetCondition::NotExists) if exists => return KvReply::Nil,
                    Some(SetCondition::Exists) if !exists => return KvReply::Nil,
                    _ => {}
                }
                entries.insert(
                    key,
                    Entry {
                        value: StoredValue::Text(value),
                        expires_at: expiration_ms.map(|ms| now + Duration::from_millis(ms)),
                    },
                );
                KvReply::Text("OK".to_string())
            }
            KvCommand::Del { key } => KvReply::Integer(i64::from(entries.remove(&key).is_some())),
            KvCommand::SAdd { key, member } => {
                let entry = entries
                    .entry(key)
                    .or_insert_with(|| Entry::new(StoredValue::Set(BTreeSet::new())));
                match &mut entry.value {
                    StoredValue::Set(members) => KvReply::Integer(i64::from(members.insert(member))),
                    _ => KvReply::Error(WRONG_TYPE.to_string()),
                }
            }
            KvCommand::SMembers { key } => match entries.get(&key).map(|e| &e.value) {
                None => KvReply::Array(Vec::new()),
                Some(StoredValue::Set(members)) => {
                    KvReply::Array(members.iter().cloned().map(KvReply::Text).collect())
                }
                Some(_) => KvReply::Error(WRONG_TYPE.to_string()),
            },
            KvCommand::LPush { key, value } => Self::push(entries, key, value, true),
            KvCommand::RPush { key, value } => Self::push(entries, key, value, false),
            KvCommand::LPop { key } => {
                let reply = match entries.get_mut(&key).map(|e| &mut e.value) {
                    None => return KvReply::Nil,
                    Some(StoredValue::List(items)) => {
                        items.pop_front().map_or(KvReply::Nil, KvReply::Text)
                    }
                    Some(_) => return KvReply::Error(WRONG_TYPE.to_string()),
                };
                Self::remove_if_empty(entries, &key);
                reply
            }
            KvCommand::LLen { key } => match entries.get(&key).map(|e| &e.value) {
                None => KvReply::Integer(0),
                Some(StoredValue::List(items)) => KvReply::Integer(items.len() as i64),
                Some(_) => KvReply::Error(WRONG_TYPE.to_string()),
            },
            KvCommand::LRange { key, start, stop } => match entries.get(&key).map(|e| &e.value) {
                None => KvReply::Array(Vec::new()),
                Some(StoredValue::List(items)) => KvReply::Array(
                    index_range(items.len(), start, stop)
                        .map(|(from, to)| {
                            items
                                .range(from..=to)
                                .cloned()
                                .map(KvReply::Text)
                                .collect()
                        })
                        .unwrap_or_default(),
                ),
                Some(_) => KvReply::Error(WRONG_TYPE.to_string()),
            },
            KvCommand::LRem { key, value } => {
                let reply = match entries.get_mut(&key).map(|e| &mut e.value) {
                    None => return KvReply::Integer(0),
                    Some(StoredValue::List(items)) => {
                        match items.iter().position(|item| *item == value) {
                            Some(index) => {
                                items.remove(index);
                                KvReply::Integer(1)
                            }
                            None => KvReply::Integer(0),
                        }
                    }
                    Some(_) => return KvReply::Error(WRONG_TYPE.to_string()),
                };
                Self::remove_if_empty(entries, &key);
                reply
            }
            KvCommand::ZAdd { key, score, member } => {
                let entry = entries
                    .entry(key)
                    .or_insert_with(|| Entry::new(StoredValue::SortedSet(BTreeSet::new())));
                match &mut entry.value {
                    StoredValue::SortedSet(members) => {
                        let previous = members.iter().find(|(_, m)| *m == member).cloned();
                        let added = previous.is_none();
                        if let Some(previous) = previous {
                            members.remove(&previous);
                        }
                        members.insert((score, member));
                        KvReply::Integer(i64::from(added))
                    }
                    _ => KvReply::Error(WRONG_TYPE.to_string()),
                }
            }
            KvCommand::ZRem { key, member } => {
                let reply = match entries.get_mut(&key).map(|e| &mut e.value) {
                    None => return KvReply::Integer(0),
                    Some(StoredValue::SortedSet(members)) => {
                        let previous = members.iter().find(|(_, m)| *m == member).cloned();
                        match previous {
                            Some(previous) => {
                                members.remove(&previous);
                                KvReply::Integer(1)
                            }
                            None => KvReply::Integer(0),
                        }
                    }
                    Some(_) => return KvReply::Error(WRONG_TYPE.to_string()),
                };
                Self::remove_if_empty(entries, &key);
                reply
            }
            KvCommand::ZRange { key, start, stop } => match entries.get(&key).map(|e| &e.value) {
                None => KvReply::Array(Vec::new()),
                Some(StoredValue::SortedSet(members)) => KvReply::Array(
                    index_range(members.len(), start, stop)
                        .map(|(from, to)| {
                            members
                                .iter()
                                .skip(from)
                                .take(to - from + 1)
                                .map(|(_, member)| KvReply::Text(member.clone()))
                                .collect()
                        })
                        .unwrap_or_default(),
                ),
                Some(_) => KvReply::Error(WRONG_TYPE.to_string()),
            },
            KvCommand::ZRangeByScore {
                key,
                min,
                max,
                offset,
                count,
            } => match entries.get(&key).map(|e| &e.value) {
                None => KvReply::Array(Vec::new()),
                Some(StoredValue::SortedSet(members)) => {
                    let matching = members
                        .iter()
                        .filter(|(score, _)| *score >= min && *score <= max)
                        .skip(offset.max(0) as usize);
                    let selected: Vec<KvReply> = if count < 0 {
                        matching.map(|(_, m)| KvReply::Text(m.clone())).collect()
                    } else {
                        matching
                            .take(count as usize)
                            .map(|(_, m)| KvReply::Text(m.clone()))
                            .collect()
                    };
                    KvReply::Array(selected)
                }
                Some(_) => KvReply::Error(WRONG_TYPE.to_string()),
            },
        }
    }

    fn push(entries: &mut HashMap<String, Entry>, key: String, value: String, front: bool) -> KvReply {
        let entry = entries
            .entry(key)
            .or_insert_with(|| Entry::new(StoredValue::List(VecDeque::new())));
        match &mut entry.value {
            StoredValue::List(items) => {
                if front {
                    items.push_front(value);
                } else {
                    items.push_back(value);
                }
                KvReply::Integer(items.len() as i64)
            }
            _ => KvReply::Error(WRONG_TYPE.to_string()),
        }
    }

    fn remove_if_empty(entries: &mut HashMap<String, Entry>, key: &str) {
        let empty = match entries.get(key).map(|e| &e.value) {
            Some(StoredValue::List(items)) => items.is_empty(),
            Some(StoredValue::Set(members)) => members.is_empty(),
            Some(StoredValue::SortedSet(members)) => members.is_empty(),
            _ => false,
        };
        if empty {
            entries.remove(key);
        }
    }
}

/// 将Redis风格的闭区间索引（支持负数）转换为有效的下标区间
fn index_range(len: usize, start: i64, stop: i64) -> Option<(usize, usize)> {
    let len = len as i64;
    let start = if start < 0 { len + start } else { start }.max(0);
    let stop = if stop < 0 { len + stop } else { stop }.min(len - 1);
    if len == 0 || start > stop || start >= len {
        return None;
    }
    Some((start as usize, stop as usize))
}

#[async_trait]
impl KvTransport for InMemoryKvTransport {
    async fn execute(&self, command: KvCommand) -> KvResult<KvReply> {
        let now = Instant::now();
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| KvError::Connection("in-memory store lock poisoned".to_string()))?;
        Ok(Self::apply(&mut entries, command, now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_range() {
        assert_eq!(index_range(5, 0, -1), Some((0, 4)));
        assert_eq!(index_range(5, 1, 2), Some((1, 2)));
        assert_eq!(index_range(5, -2, -1), Some((3, 4)));
        assert_eq!(index_range(5, 3, 100), Some((3, 4)));
        assert_eq!(index_range(5, 4, 2), None);
        assert_eq!(index_range(0, 0, -1), None);
    }

    #[tokio::test]
    async fn test_wrong_type_is_store_error() {
        let transport = InMemoryKvTransport::new();
        transport
            .execute(KvCommand::RPush {
                key: "queue".to_string(),
                value: "a".to_string(),
            })
            .await
            .unwrap();

        let reply = transport
            .execute(KvCommand::Get {
                key: "queue".to_string(),
            })
            .await
            .unwrap();
        assert!(matches!(reply, KvReply::Error(message) if message.starts_with("WRONGTYPE")));
    }

    #[tokio::test]
    async fn test_popping_last_item_removes_key() {
        let transport = InMemoryKvTransport::new();
        let key = "queue".to_string();
        transport
            .execute(KvCommand::LPush {
                key: key.clone(),
                value: "only".to_string(),
            })
            .await
            .unwrap();
        transport
            .execute(KvCommand::LPop { key: key.clone() })
            .await
            .unwrap();

        let reply = transport
            .execute(KvCommand::Set {
                key,
                value: "v".to_string(),
                expiration_ms: None,
                condition: Some(SetCondition::NotExists),
            })
            .await
            .unwrap();
        assert_eq!(reply, KvReply::Text("OK".to_string()));
    }
}
