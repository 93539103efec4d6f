//! 任务管理引擎核心库
//!
//! 包含错误类型、配置模型、数据模型、处理器与消息总线接口以及任务类型注册表。

pub mod config;
pub mod errors;
pub mod handler_registry;
pub mod models;
pub mod traits;

pub use config::AppConfig;
pub use errors::*;
pub use handler_registry::{HandlerCatalog, TaskTypeRegistry};
pub use models::{
    ConnectionRequest, Message, MessageKind, TaskDescriptor, TaskOutcome, TaskRunStatus,
};
pub use traits::{MessageBus, TaskContext, TaskHandler};

/// 统一的Result类型
pub type TaskMgmtResult<T> = std::result::Result<T, TaskMgmtError>;
