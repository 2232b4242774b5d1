//! SenseBus 配置管理系统
//!
//! 支持YAML配置文件驱动的插件加载与消息总线运行

use crate::core::MessageBusConfig;
use crate::plugins::{HARDWARE_CATEGORY, SENSE_CATEGORY};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// 框架配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SenseConfig {
    /// 框架基础设置
    pub framework: FrameworkSettings,
    /// 感知插件
    pub sense: PluginSection,
    /// 硬件插件
    pub hardware: PluginSection,
    /// 消息总线
    pub bus: BusSettings,
    /// 插件参数：插件名 -> 参数表
    #[serde(default)]
    pub plugin_params: HashMap<String, HashMap<String, String>>,
    /// 日志配置
    pub logging: LoggingConfig,
}

/// 框架基础设置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameworkSettings {
    /// 框架名称
    pub name: String,
    /// 版本
    pub version: String,
}

/// 插件分区：一个目录加一个类别
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginSection {
    /// 插件目录
    pub plugin_dir: PathBuf,
    /// 插件类别，同时是工厂符号前缀
    pub category: String,
    /// 是否启用
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl PluginSection {
    pub fn new<P: Into<PathBuf>>(plugin_dir: P, category: &str) -> Self {
        Self {
            plugin_dir: plugin_dir.into(),
            category: category.to_string(),
            enabled: true,
        }
    }

    /// 目录和类别都不能为空，类别中不能含有 `,`
    pub fn validate(&self, section: &str) -> Result<()> {
        if self.plugin_dir.as_os_str().is_empty() {
            return Err(crate::SenseBusError::config(&format!(
                "{}: No plugin directory given",
                section
            )));
        }
        if self.category.is_empty() {
            return Err(crate::SenseBusError::config(&format!(
                "{}: No category given",
                section
            )));
        }
        if self.category.contains(',') {
            return Err(crate::SenseBusError::config(&format!(
                "{}: Category cannot contain ','",
                section
            )));
        }
        Ok(())
    }
}

/// 消息总线设置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusSettings {
    /// 等待工作时的轮询间隔（毫秒）
    pub poll_interval_ms: u64,
}

impl BusSettings {
    pub fn to_bus_config(&self) -> MessageBusConfig {
        MessageBusConfig {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// 日志级别
    pub level: LogLevel,
    /// 是否启用详细日志
    pub verbose: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            verbose: false,
        }
    }
}

/// 日志级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

impl Default for SenseConfig {
    fn default() -> Self {
        Self {
            framework: FrameworkSettings {
                name: crate::FRAMEWORK_NAME.to_string(),
                version: crate::VERSION.to_string(),
            },
            sense: PluginSection::new("sense/plugins", SENSE_CATEGORY),
            hardware: PluginSection::new("sense/hardware", HARDWARE_CATEGORY),
            bus: BusSettings {
                poll_interval_ms: 10,
            },
            plugin_params: HashMap::new(),
            logging: LoggingConfig::default(),
        }
    }
}

/// 配置管理器
#[derive(Debug)]
pub struct ConfigManager {
    config: SenseConfig,
}

impl ConfigManager {
    /// 从文件加载配置
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            crate::SenseBusError::config(&format!("Failed to read config file: {}", e))
        })?;

        let config: SenseConfig = serde_yaml::from_str(&content).map_err(|e| {
            crate::SenseBusError::config(&format!("Failed to parse config file: {}", e))
        })?;

        Ok(Self { config })
    }

    /// 创建默认配置
    pub fn new_default() -> Self {
        Self {
            config: SenseConfig::default(),
        }
    }

    /// 使用给定配置
    pub fn from_config(config: SenseConfig) -> Self {
        Self { config }
    }

    /// 保存配置到文件
    pub async fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_yaml::to_string(&self.config).map_err(|e| {
            crate::SenseBusError::config(&format!("Failed to serialize config: {}", e))
        })?;

        tokio::fs::write(path, content).await.map_err(|e| {
            crate::SenseBusError::config(&format!("Failed to write config file: {}", e))
        })?;

        Ok(())
    }

    /// 获取配置
    pub fn get_config(&self) -> &SenseConfig {
        &self.config
    }

    /// 获取可变配置
    pub fn get_config_mut(&mut self) -> &mut SenseConfig {
        &mut self.config
    }

    /// 获取插件参数，未配置时为空
    pub fn params_for(&self, plugin_name: &str) -> HashMap<String, String> {
        self.config
            .plugin_params
            .get(plugin_name)
            .cloned()
            .unwrap_or_default()
    }

    /// 验证配置有效性
    pub fn validate(&self) -> Result<()> {
        if self.config.framework.name.is_empty() {
            return Err(crate::SenseBusError::config("Framework name cannot be empty"));
        }

        self.config.sense.validate("sense")?;
        self.config.hardware.validate("hardware")?;

        if self.config.bus.poll_interval_ms == 0 {
            return Err(crate::SenseBusError::config(
                "Bus poll interval must be positive",
            ));
        }

        tracing::info!("Configuration validation passed");
        Ok(())
    }
}

/// 生成默认配置文件
pub async fn generate_default_config_file<P: AsRef<Path>>(path: P) -> Result<()> {
    let config_manager = ConfigManager::new_default();
    config_manager.save_to_file(path).await?;
    Ok(())
}
