use serde::{Deserialize, Serialize};

fn default_worker_id() -> String {
    let host = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "localhost".to_string());
    format!("worker-{host}")
}

/// 排空期结束后留给中止和重新入队的时间
pub const SHUTDOWN_RECOVERY_MARGIN_MS: u64 = 10_000;

fn default_max_outstanding_tasks() -> usize {
    1
}

/// Worker池配置
///
/// `classNames` 和 `maxOutstandingTasks` 保留了部署配置中使用的键名，
/// 同时接受 snake_case 写法。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub enabled: bool,
    #[serde(default = "default_worker_id")]
    pub worker_id: String,
    /// 入站消息地址，每个Worker池一个
    pub inbound_address: String,
    #[serde(alias = "classNames")]
    pub class_names: Vec<String>,
    #[serde(
        alias = "maxOutstandingTasks",
        default = "default_max_outstanding_tasks"
    )]
    pub max_outstanding_tasks: usize,
    pub poll_interval_ms: u64,
    pub drain_timeout_ms: u64,
    /// 进程等待应用停止的总时长，必须覆盖排空期加上恢复余量
    pub shutdown_timeout_ms: u64,
    /// 被拒绝的消息最多重新投递的次数，超过后转入死信地址
    pub max_redeliveries: u32,
    /// 关闭时未完成工作流的重新入队地址，缺省为入站地址
    pub recovery_queue: Option<String>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            worker_id: default_worker_id(),
            inbound_address: "taskmgmt.workflow".to_string(),
            class_names: vec!["connection-request".to_string()],
            max_outstanding_tasks: default_max_outstanding_tasks(),
            poll_interval_ms: 500,
            drain_timeout_ms: 20_000,
            shutdown_timeout_ms: 30_000,
            max_redeliveries: 10,
            recovery_queue: None,
        }
    }
}

impl WorkerConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.worker_id.is_empty() {
            return Err(anyhow::anyhow!("Worker ID不能为空"));
        }

        if self.inbound_address.is_empty() {
            return Err(anyhow::anyhow!("入站地址不能为空"));
        }

        if self.enabled && self.class_names.is_empty() {
            return Err(anyhow::anyhow!("classNames 不能为空"));
        }

        if self.class_names.iter().any(|name| name.trim().is_empty()) {
            return Err(anyhow::anyhow!("classNames 中包含空的任务类型标识"));
        }

        if self.max_outstanding_tasks == 0 {
            return Err(anyhow::anyhow!("maxOutstandingTasks 必须大于0"));
        }

        if self.poll_interval_ms == 0 {
            return Err(anyhow::anyhow!("任务轮询间隔必须大于0"));
        }

        if self.drain_timeout_ms.saturating_add(SHUTDOWN_RECOVERY_MARGIN_MS)
            > self.shutdown_timeout_ms
        {
            return Err(anyhow::anyhow!(
                "关闭超时 {}ms 不足以覆盖排空期 {}ms 和 {}ms 的恢复余量",
                self.shutdown_timeout_ms,
                self.drain_timeout_ms,
                SHUTDOWN_RECOVERY_MARGIN_MS
            ));
        }

        if let Some(queue) = &self.recovery_queue {
            if queue.is_empty() {
                return Err(anyhow::anyhow!("恢复队列名称不能为空"));
            }
        }

        Ok(())
    }

    /// 超过重新投递上限的消息的去向
    pub fn dead_letter_address(&self) -> String {
        format!("{}.dead-letter", self.inbound_address)
    }

    pub fn recovery_queue(&self) -> &str {
        self.recovery_queue
            .as_deref()
            .unwrap_or(&self.inbound_address)
    }
}
