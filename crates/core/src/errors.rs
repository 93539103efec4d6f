use thiserror::Error;

/// KV/队列存储客户端错误
///
/// 存储层错误在客户端边界被分类，以类型化结果返回给调用方，
/// 不会以panic的形式向上传播。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KvError {
    #[error("SET 条件冲突: \"notExist\" 与 \"exist\" 不能同时为 true")]
    ConflictingSetConditions,

    #[error("存储返回失败状态 ({command}): {message}")]
    Store {
        command: &'static str,
        message: String,
    },

    #[error("存储结果类型不匹配: 期望 {expected}，实际为 {actual}")]
    UnexpectedShape {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("存储连接错误: {0}")]
    Connection(String),

    #[error("存储数据序列化错误: {0}")]
    Serialization(String),
}

pub type KvResult<T> = std::result::Result<T, KvError>;

/// 任务管理引擎错误类型定义
#[derive(Debug, Error)]
pub enum TaskMgmtError {
    #[error("配置错误: {0}")]
    Configuration(String),

    #[error(transparent)]
    Kv(#[from] KvError),

    #[error("消息总线错误: {0}")]
    MessageBus(String),

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("任务执行错误: {0}")]
    TaskExecution(String),

    #[error("无效的任务: {0}")]
    InvalidTask(String),

    #[error("未能获取分布式锁: {key}")]
    LockNotAcquired { key: String },

    #[error("工作流恢复失败: {failed}/{total} 个实例未能重新入队")]
    RecoveryFailed { failed: usize, total: usize },

    #[error("内部错误: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for TaskMgmtError {
    fn from(e: serde_json::Error) -> Self {
        TaskMgmtError::Serialization(e.to_string())
    }
}

/// 统一的Result类型
pub type Result<T> = std::result::Result<T, TaskMgmtError>;
