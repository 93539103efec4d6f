use serde_json::{Map, Value};
use taskmgmt_core::{KvError, KvResult};

/// 存储返回的原始应答
///
/// 每个应答都带有类型标签，客户端根据调用方声明的结果形态进行匹配。
#[derive(Debug, Clone, PartialEq)]
pub enum KvReply {
    /// 成功但没有值
    Nil,
    Text(String),
    Integer(i64),
    Object(Map<String, Value>),
    Array(Vec<KvReply>),
    /// 存储返回的失败状态
    Error(String),
}

impl KvReply {
    pub fn shape(&self) -> &'static str {
        match self {
            KvReply::Nil => "nil",
            KvReply::Text(_) => "string",
            KvReply::Integer(_) => "integer",
            KvReply::Object(_) => "object",
            KvReply::Array(_) => "array",
            KvReply::Error(_) => "error",
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, KvReply::Nil)
    }
}

/// 可以从存储应答中提取的结果形态
///
/// 客户端在调用前已处理了 `Nil` 和 `Error`，实现只需要处理有值的应答。
/// 形态不匹配是缺陷，返回 [`KvError::UnexpectedShape`]。
pub trait FromKvReply: Sized {
    const SHAPE: &'static str;

    fn from_reply(reply: KvReply) -> KvResult<Self>;
}

fn unexpected(expected: &'static str, reply: &KvReply) -> KvError {
    KvError::UnexpectedShape {
        expected,
        actual: reply.shape(),
    }
}

impl FromKvReply for String {
    const SHAPE: &'static str = "string";

    fn from_reply(reply: KvReply) -> KvResult<Self> {
        match reply {
            KvReply::Text(text) => Ok(text),
            other => Err(unexpected(Self::SHAPE, &other)),
        }
    }
}

impl FromKvReply for i64 {
    const SHAPE: &'static str = "integer";

    fn from_reply(reply: KvReply) -> KvResult<Self> {
        match reply {
            KvReply::Integer(value) => Ok(value),
            other => Err(unexpected(Self::SHAPE, &other)),
        }
    }
}

impl FromKvReply for Map<String, Value> {
    const SHAPE: &'static str = "object";

    fn from_reply(reply: KvReply) -> KvResult<Self> {
        match reply {
            KvReply::Object(object) => Ok(object),
            other => Err(unexpected(Self::SHAPE, &other)),
        }
    }
}

impl FromKvReply for Vec<String> {
    const SHAPE: &'static str = "array";

    fn from_reply(reply: KvReply) -> KvResult<Self> {
        match reply {
            KvReply::Array(items) => items.into_iter().map(String::from_reply).collect(),
            other => Err(unexpected(Self::SHAPE, &other)),
        }
    }
}
