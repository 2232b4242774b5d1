//! SenseBus - 进程内发布/订阅消息总线与动态插件框架
//!
//! 将独立构建的传感器、检测器和世界模型插件连接在一起，彼此之间没有编译期依赖。
//!
//! # 组成
//!
//! - **消息总线**: 话题注册、发布权限校验、按话题排队和阻塞式分发循环
//! - **插件注册表**: 按目录和类别动态加载、卸载实现了能力契约的模块
//! - **运行器**: 加载插件、接入总线、激活插件，然后运行分发循环直到被中断
//!
//! # 示例
//!
//! ```no_run
//! use sense_bus::{config::SenseConfig, runner::SenseRunner};
//!
//! let mut runner = SenseRunner::from_config(SenseConfig::default())?;
//! let stop = runner.stop_handle();
//! std::thread::spawn(move || {
//!     std::thread::sleep(std::time::Duration::from_secs(1));
//!     stop.stop();
//! });
//! runner.run()?;
//! runner.shutdown()?;
//! # Ok::<(), sense_bus::SenseBusError>(())
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod plugins;
pub mod runner;
pub mod types;

// 重新导出核心类型
pub use crate::core::*;
pub use error::*;
pub use plugins::*;
pub use types::*;

use config::LoggingConfig;

/// 框架信息
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const FRAMEWORK_NAME: &str = "SenseBus";

/// 结果类型别名
pub type Result<T> = std::result::Result<T, SenseBusError>;

/// 初始化日志系统，重复调用时保留已有的订阅者
pub fn initialize(logging: &LoggingConfig) -> Result<()> {
    let level = if logging.verbose {
        tracing::Level::TRACE
    } else {
        logging.level.to_tracing_level()
    };

    let installed = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(logging.verbose)
        .try_init()
        .is_ok();

    if installed {
        tracing::info!("🚀 Initializing {} v{}", FRAMEWORK_NAME, VERSION);
    } else {
        tracing::debug!("Logging already initialized");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_framework_info() {
        assert_eq!(FRAMEWORK_NAME, "SenseBus");
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_initialize_is_idempotent() {
        let logging = LoggingConfig::default();
        assert!(initialize(&logging).is_ok());
        assert!(initialize(&logging).is_ok());
    }
}
