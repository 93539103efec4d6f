//! 配置管理
//!
//! 配置按以下顺序合并：内置默认值、TOML配置文件、`TASKMGMT_` 前缀的环境变量。
//! 加载完成后统一执行 [`AppConfig::validate`]，任何配置错误在启动阶段即为致命错误。
//!
//! ```text
//! [worker]
//! classNames = ["connection-request"]
//! maxOutstandingTasks = 4
//! ```

pub mod models;


pub use models::*;
