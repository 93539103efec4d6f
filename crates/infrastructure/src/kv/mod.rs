//! KV/队列存储客户端
//!
//! 上层组件只通过 [`KvClient`] 访问存储。客户端把类型化的 [`KvCommand`]
//! 交给 [`KvTransport`] 执行，再按调用方声明的结果形态解析应答。
//!
//! ```text
//! KvClient::query::<T>(command)
//!     ├── KvReply::Nil        -> Ok(None)
//!     ├── KvReply::Error(msg) -> Err(KvError::Store)
//!     ├── 形态匹配            -> Ok(Some(T))
//!     └── 形态不匹配          -> Err(KvError::UnexpectedShape)
//! ```

pub mod client;
pub mod command;
pub mod memory;
pub mod redis_transport;
pub mod reply;

pub use client::{KvClient, KvTransport};
pub use command::{KvCommand, SetCondition, SetOptions};
pub use memory::InMemoryKvTransport;
pub use redis_transport::RedisKvTransport;
pub use reply::{FromKvReply, KvReply};
