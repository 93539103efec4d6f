use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 任务描述符
///
/// 入队后不可变。由生产者创建，被某个Worker消费一次，
/// 在完成或失败确认后销毁。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDescriptor {
    /// 任务类型标识，对应注册表中的处理器
    pub task_type_id: String,
    /// 任务负载，由处理器自行解释
    pub payload: serde_json::Value,
    /// 提交时间
    pub submitted_at: DateTime<Utc>,
    /// 工作流实例ID，仅长时工作流任务携带
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_instance_id: Option<String>,
}

impl TaskDescriptor {
    pub fn new(task_type_id: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            task_type_id: task_type_id.into(),
            payload,
            submitted_at: Utc::now(),
            workflow_instance_id: None,
        }
    }

    /// 创建携带工作流实例ID的任务描述符
    pub fn workflow(
        task_type_id: impl Into<String>,
        instance_id: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            workflow_instance_id: Some(instance_id.into()),
            ..Self::new(task_type_id, payload)
        }
    }

    /// 从负载中读取字符串字段
    pub fn payload_str(&self, field: &str) -> Option<&str> {
        self.payload.get(field).and_then(|v| v.as_str())
    }
}

/// 任务运行的终态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TaskRunStatus {
    #[serde(rename = "COMPLETED")]
    Completed,
    #[serde(rename = "FAILED")]
    Failed,
    #[serde(rename = "CANCELLED")]
    Cancelled,
}

impl std::fmt::Display for TaskRunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskRunStatus::Completed => "COMPLETED",
            TaskRunStatus::Failed => "FAILED",
            TaskRunStatus::Cancelled => "CANCELLED",
        };
        f.write_str(s)
    }
}

/// 处理器返回的执行结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskOutcome {
    pub success: bool,
    pub output: Option<String>,
    pub error_message: Option<String>,
}

impl TaskOutcome {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: Some(output.into()),
            error_message: None,
        }
    }

    pub fn empty() -> Self {
        Self {
            success: true,
            output: None,
            error_message: None,
        }
    }

    pub fn failure(error_message: impl Into<String>) -> Self {
        Self {
            success: false,
            output: None,
            error_message: Some(error_message.into()),
        }
    }

    pub fn status(&self) -> TaskRunStatus {
        if self.success {
            TaskRunStatus::Completed
        } else {
            TaskRunStatus::Failed
        }
    }
}
