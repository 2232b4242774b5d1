//! 插件系统模块
//!
//! 能力契约、模块加载、插件注册表以及按分区调度生命周期的管理器

pub mod builtin;
pub mod core;
pub mod loader;
pub mod manager;
pub mod registry;

// 重新导出核心组件
pub use self::core::*;
pub use loader::*;
pub use manager::*;
pub use registry::*;
