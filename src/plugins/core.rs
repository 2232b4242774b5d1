//! 插件系统核心特征定义
//!
//! 能力契约按类别划分：感知插件 [`SensePlugin`] 与硬件插件 [`HardwarePlugin`]，
//! 二者共享 [`ManagedPlugin`] 生命周期接口。

use crate::types::{MessageSender, Publisher, Subscriber};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// 感知插件的默认类别
pub const SENSE_CATEGORY: &str = "Sense";
/// 硬件插件的默认类别
pub const HARDWARE_CATEGORY: &str = "SenseHw";

/// 插件状态
///
/// `Unconfigured → Inactive → Active → Inactive → Shutdown`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PluginState {
    /// 未配置
    Unconfigured,
    /// 已配置，未激活
    Inactive,
    /// 运行中
    Active,
    /// 已清理
    Shutdown,
}

/// 设备类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceType {
    Unknown,
    Camera,
}

/// 硬件设备描述
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub device_type: DeviceType,
    pub id: String,
    pub name: String,
    /// 设备能力，如 `RGBD`
    pub attributes: Vec<String>,
}

impl Default for DeviceInfo {
    fn default() -> Self {
        Self {
            device_type: DeviceType::Unknown,
            id: String::new(),
            name: String::new(),
            attributes: Vec::new(),
        }
    }
}

/// 感知插件档案
#[derive(Debug, Clone, Default)]
pub struct SenseProfile {
    /// 是否希望在独立线程中运行
    pub threaded: bool,
    pub publishers: Vec<Publisher>,
    pub subscribers: Vec<Subscriber>,
}

/// 硬件插件档案
#[derive(Debug, Clone, Default)]
pub struct HardwareProfile {
    pub device: DeviceInfo,
    pub publishers: Vec<Publisher>,
}

/// 插件档案
#[derive(Debug, Clone)]
pub enum PluginProfile {
    Sensing(SenseProfile),
    Hardware(HardwareProfile),
}

impl PluginProfile {
    /// 声明的发布者
    pub fn publishers(&self) -> &[Publisher] {
        match self {
            PluginProfile::Sensing(profile) => &profile.publishers,
            PluginProfile::Hardware(profile) => &profile.publishers,
        }
    }

    /// 声明的订阅者，硬件插件没有订阅者
    pub fn subscribers(&self) -> &[Subscriber] {
        match self {
            PluginProfile::Sensing(profile) => &profile.subscribers,
            PluginProfile::Hardware(_) => &[],
        }
    }

    /// 硬件设备描述
    pub fn device(&self) -> Option<&DeviceInfo> {
        match self {
            PluginProfile::Hardware(profile) => Some(&profile.device),
            PluginProfile::Sensing(_) => None,
        }
    }
}

/// 插件上报的运行时错误
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginError {
    pub plugin: String,
    pub message: String,
}

impl PluginError {
    pub fn new(plugin: &str, message: &str) -> Self {
        Self {
            plugin: plugin.to_string(),
            message: message.to_string(),
        }
    }
}

impl fmt::Display for PluginError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.plugin, self.message)
    }
}

/// 插件错误回调
pub type ErrorCallback = Arc<dyn Fn(PluginError) + Send + Sync>;

/// 插件基础特征
pub trait Plugin: Send + Sync {
    /// 插件名称，约定为 `类别,库名`
    fn name(&self) -> String;

    /// 插件档案
    fn profile(&self) -> &PluginProfile;
}

/// 带生命周期的插件
///
/// 生命周期方法返回 `false` 表示该步骤失败，调用方负责记录并跳过后续步骤。
pub trait ManagedPlugin: Plugin {
    /// 使用参数配置插件，成功后进入 `Inactive`
    fn configure(&mut self, params: &HashMap<String, String>) -> bool;

    /// 激活插件
    fn activate(&mut self) -> bool;

    /// 停用插件
    fn deactivate(&mut self) -> bool;

    /// 清理插件资源，之后进入 `Shutdown`
    fn cleanup(&mut self) -> bool;

    /// 当前状态
    fn state(&self) -> PluginState;

    /// 设置消息发送函数
    fn set_message_sender(&mut self, sender: MessageSender);

    /// 设置错误回调
    fn set_error_callback(&mut self, callback: ErrorCallback);
}

/// 感知插件：订阅并发布处理后的数据
pub trait SensePlugin: ManagedPlugin {
    /// 是否希望在独立线程中运行
    fn threaded(&self) -> bool {
        match self.profile() {
            PluginProfile::Sensing(profile) => profile.threaded,
            PluginProfile::Hardware(_) => false,
        }
    }
}

/// 硬件插件：只发布原始数据
pub trait HardwarePlugin: ManagedPlugin {
    /// 设备描述
    fn device_info(&self) -> Option<&DeviceInfo> {
        self.profile().device()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MessageType;

    #[test]
    fn test_profile_accessors() {
        let sensing = PluginProfile::Sensing(SenseProfile {
            threaded: true,
            publishers: vec![Publisher::new("faces", "detector", MessageType::FaceDetection)],
            subscribers: vec![Subscriber::silent("images", "detector")],
        });
        assert_eq!(sensing.publishers().len(), 1);
        assert_eq!(sensing.subscribers().len(), 1);
        assert!(sensing.device().is_none());

        let hardware = PluginProfile::Hardware(HardwareProfile {
            device: DeviceInfo {
                device_type: DeviceType::Camera,
                id: "2".to_string(),
                name: "dummydevice".to_string(),
                attributes: vec!["RGBD".to_string()],
            },
            publishers: vec![Publisher::new("test3", "camera", MessageType::Image)],
        });
        assert!(hardware.subscribers().is_empty());
        assert_eq!(hardware.device().map(|d| d.device_type), Some(DeviceType::Camera));
    }

    #[test]
    fn test_plugin_error_display() {
        let error = PluginError::new("Sense,detector", "camera timeout");
        assert_eq!(error.to_string(), "Sense,detector: camera timeout");
    }

    #[test]
    fn test_device_info_serialization() {
        let device = DeviceInfo {
            device_type: DeviceType::Camera,
            id: "2".to_string(),
            name: "dummydevice".to_string(),
            attributes: vec!["RGBD".to_string()],
        };
        let yaml = serde_yaml::to_string(&device).unwrap();
        let back: DeviceInfo = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back, device);
    }
}
