//! # 数据模型
//!
//! 执行引擎在进程间传递的数据结构：任务描述符、消息信封和连接请求记录。
//! 所有模型都实现了序列化和反序列化，以JSON形式写入消息总线和KV存储。

pub mod connection_request;
pub mod message;
pub mod task;

pub use connection_request::*;
pub use message::*;
pub use task::*;
