//! SenseBus 核心数据类型模块
//!
//! 话题、发布者、订阅者以及消息回调等基础类型

pub mod messages;

// 重新导出所有公共类型
pub use messages::*;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::Result;

/// 纳秒时间戳
pub type TimestampNs = i64;

/// 唯一标识符类型
pub type Topic = String;
pub type PluginName = String;

/// 获取当前纳秒时间戳
pub fn now_ns() -> TimestampNs {
    chrono::Utc::now().timestamp_nanos_opt().unwrap_or(0)
}

/// 消息类型标签
///
/// 总线只比较标签，不校验负载结构。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    Image,          // 图像
    FaceDetection,  // 人脸检测
    FaceLandmarks,  // 人脸关键点
    FaceEncoding,   // 人脸特征编码
    BodyParts,      // 人体姿态
    PersonState,    // 人物状态
    Custom(String), // 自定义
}

/// 订阅者收到消息时调用的回调
pub type MessageCallback = Arc<dyn Fn(MessageHandle) + Send + Sync>;

/// 插件通过它向总线发送消息：`(topic, owner, message)`
pub type MessageSender = Arc<dyn Fn(&str, &str, MessageHandle) -> Result<()> + Send + Sync>;

/// 发布者声明
///
/// 唯一键是 `name`，同一个名字在同一话题下重复注册是幂等的。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Publisher {
    /// 话题
    pub topic: Topic,
    /// 发布者名称，通常是插件名
    pub name: String,
    /// 消息类型标签
    pub message_type: MessageType,
}

impl Publisher {
    pub fn new(topic: &str, name: &str, message_type: MessageType) -> Self {
        Self {
            topic: topic.to_string(),
            name: name.to_string(),
            message_type,
        }
    }
}

impl PartialEq for Publisher {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Publisher {}

/// 订阅者声明
///
/// 回调可以为空：只登记存在，不需要投递。
#[derive(Clone)]
pub struct Subscriber {
    /// 话题
    pub topic: Topic,
    /// 订阅者名称，通常是插件名
    pub name: String,
    /// 消息回调
    pub callback: Option<MessageCallback>,
}

impl Subscriber {
    /// 创建带回调的订阅者
    pub fn new<F>(topic: &str, name: &str, callback: F) -> Self
    where
        F: Fn(MessageHandle) + Send + Sync + 'static,
    {
        Self {
            topic: topic.to_string(),
            name: name.to_string(),
            callback: Some(Arc::new(callback)),
        }
    }

    /// 创建不带回调的订阅者
    pub fn silent(topic: &str, name: &str) -> Self {
        Self {
            topic: topic.to_string(),
            name: name.to_string(),
            callback: None,
        }
    }
}

impl fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriber")
            .field("topic", &self.topic)
            .field("name", &self.name)
            .field("callback", &self.callback.is_some())
            .finish()
    }
}

impl PartialEq for Subscriber {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Subscriber {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publisher_identity_is_name() {
        let a = Publisher::new("faces", "detector", MessageType::FaceDetection);
        let b = Publisher::new("images", "detector", MessageType::Image);
        let c = Publisher::new("faces", "tracker", MessageType::FaceDetection);

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_subscriber_debug_hides_callback() {
        let sub = Subscriber::new("faces", "tracker", |_| {});
        let text = format!("{:?}", sub);
        assert!(text.contains("tracker"));
        assert!(text.contains("callback: true"));

        let silent = Subscriber::silent("faces", "tracker");
        assert!(silent.callback.is_none());
        assert_eq!(sub, silent);
    }

    #[test]
    fn test_message_type_serialization() {
        let yaml = serde_yaml::to_string(&MessageType::Custom("pose".to_string())).unwrap();
        let back: MessageType = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back, MessageType::Custom("pose".to_string()));
    }

    #[test]
    fn test_now_ns_is_positive() {
        assert!(now_ns() > 0);
    }
}
