//! 核心基础层模块
//!
//! 提供阻塞队列和消息总线

pub mod message_bus;
pub mod queue;

// 重新导出核心组件
pub use message_bus::*;
pub use queue::*;
