use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, error};

use crate::{traits::TaskHandler, Result, TaskMgmtError};

type HandlerFactory = Arc<dyn Fn() -> Arc<dyn TaskHandler> + Send + Sync>;

/// 任务类型目录
///
/// 任务类型标识到处理器工厂的显式映射，在进程启动时通过 `register` 填充。
/// 配置只提供标识，从不提供可执行的代码路径。
#[derive(Clone, Default)]
pub struct HandlerCatalog {
    factories: HashMap<String, HandlerFactory>,
}

impl HandlerCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F, H>(&mut self, task_type_id: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn() -> H + Send + Sync + 'static,
        H: TaskHandler + 'static,
    {
        let task_type_id = task_type_id.into();
        debug!("Registering task type factory: {}", task_type_id);
        self.factories.insert(
            task_type_id,
            Arc::new(move || Arc::new(factory()) as Arc<dyn TaskHandler>),
        );
        self
    }

    pub fn contains(&self, task_type_id: &str) -> bool {
        self.factories.contains_key(task_type_id)
    }

    pub fn task_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.factories.keys().cloned().collect();
        types.sort();
        types
    }

    /// 将配置的任务类型标识解析为处理器注册表
    ///
    /// 任一标识无法解析都会使整个注册表失败，不存在部分注册表。
    pub fn resolve(&self, class_names: &[String]) -> Result<TaskTypeRegistry> {
        if class_names.is_empty() {
            error!("classNames is missing or empty");
            return Err(TaskMgmtError::Configuration(
                "classNames 缺失或为空".to_string(),
            ));
        }

        let mut handlers = HashMap::with_capacity(class_names.len());
        let mut order = Vec::with_capacity(class_names.len());

        for class_name in class_names {
            if handlers.contains_key(class_name) {
                continue;
            }
            let factory = self.factories.get(class_name).ok_or_else(|| {
                error!(
                    "Invalid task type '{}' found, configured list: {:?}",
                    class_name, class_names
                );
                TaskMgmtError::Configuration(format!("无法解析任务类型: {class_name}"))
            })?;
            handlers.insert(class_name.clone(), factory());
            order.push(class_name.clone());
        }

        Ok(TaskTypeRegistry { handlers, order })
    }
}

impl fmt::Debug for HandlerCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerCatalog")
            .field("task_types", &self.task_types())
            .finish()
    }
}

/// 已解析的任务类型注册表，构造后不可变
#[derive(Clone)]
pub struct TaskTypeRegistry {
    handlers: HashMap<String, Arc<dyn TaskHandler>>,
    order: Vec<String>,
}

impl TaskTypeRegistry {
    pub fn get(&self, task_type_id: &str) -> Option<Arc<dyn TaskHandler>> {
        self.handlers.get(task_type_id).cloned()
    }

    pub fn contains(&self, task_type_id: &str) -> bool {
        self.handlers.contains_key(task_type_id)
    }

    /// 按配置顺序返回任务类型标识
    pub fn task_types(&self) -> &[String] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl fmt::Debug for TaskTypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskTypeRegistry")
            .field("task_types", &self.order)
            .finish()
    }
}
