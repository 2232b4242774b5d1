//! SenseBus 错误处理系统
//!
//! 统一的错误类型和错误处理机制

use thiserror::Error;

/// 框架统一错误类型
#[derive(Error, Debug)]
pub enum SenseBusError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Library error: {0}")]
    Library(#[from] libloading::Error),

    #[error("Module format error: {0}")]
    ModuleFormat(#[from] object::Error),

    #[error("Serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Unauthorised publication request to {topic} from plugin {owner}")]
    UnauthorizedPublication { topic: String, owner: String },

    #[error("Plugin not found: {name}")]
    PluginNotFound { name: String },

    #[error("Plugin load error: {message}")]
    PluginLoad { message: String },

    #[error("Lifecycle error in {plugin}: {message}")]
    Lifecycle { plugin: String, message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl SenseBusError {
    /// 创建未授权发布错误
    pub fn unauthorized(topic: &str, owner: &str) -> Self {
        Self::UnauthorizedPublication {
            topic: topic.to_string(),
            owner: owner.to_string(),
        }
    }

    /// 创建插件未找到错误
    pub fn plugin_not_found(name: &str) -> Self {
        Self::PluginNotFound {
            name: name.to_string(),
        }
    }

    /// 创建插件加载错误
    pub fn plugin_load(message: &str) -> Self {
        Self::PluginLoad {
            message: message.to_string(),
        }
    }

    /// 创建生命周期错误
    pub fn lifecycle(plugin: &str, message: &str) -> Self {
        Self::Lifecycle {
            plugin: plugin.to_string(),
            message: message.to_string(),
        }
    }

    /// 创建配置相关错误
    pub fn config(message: &str) -> Self {
        Self::Config {
            message: message.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Result;

    #[test]
    fn test_error_creation() {
        let error = SenseBusError::unauthorized("faces", "intruder");
        assert!(matches!(error, SenseBusError::UnauthorizedPublication { .. }));
        assert_eq!(
            error.to_string(),
            "Unauthorised publication request to faces from plugin intruder"
        );

        let error = SenseBusError::plugin_not_found("Sense,missing");
        assert_eq!(error.to_string(), "Plugin not found: Sense,missing");
    }

    #[test]
    fn test_error_from_io() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "File not found");
        let error = SenseBusError::from(io_error);
        assert!(matches!(error, SenseBusError::Io(_)));
    }

    #[test]
    fn test_result_type() {
        let success: Result<i32> = Ok(42);
        let failure: Result<i32> = Err(SenseBusError::config("Test error"));

        assert!(success.is_ok());
        assert!(failure.is_err());
    }
}
