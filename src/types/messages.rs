//! 消息相关类型定义

use super::*;
use std::any::Any;

/// 消息基础特征
///
/// 总线只持有共享引用，从不检查负载内容。
pub trait Message: Send + Sync + Any + fmt::Debug {
    /// 创建时间
    fn timestamp(&self) -> TimestampNs;

    /// 类型擦除转换
    fn as_any(&self) -> &dyn Any;
}

/// 共享所有权的消息句柄
pub type MessageHandle = Arc<dyn Message>;

/// 将消息句柄还原为具体类型
pub fn downcast_message<T: Message>(msg: &MessageHandle) -> Option<&T> {
    msg.as_any().downcast_ref::<T>()
}

/// 传感数据消息头
///
/// 记录源数据采集的时间和坐标系。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    /// 源数据采集时间
    pub timestamp: TimestampNs,
    /// 源数据所在坐标系
    pub frame_id: String,
}

impl Header {
    pub fn new(frame_id: &str) -> Self {
        Self {
            timestamp: now_ns(),
            frame_id: frame_id.to_string(),
        }
    }
}

/// 批量消息，将多个条目作为一条消息发送
#[derive(Debug, Clone)]
pub struct ListMessage<T> {
    header: Header,
    items: Vec<T>,
}

impl<T> ListMessage<T> {
    pub fn new(header: Header, items: Vec<T>) -> Self {
        Self { header, items }
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T> Message for ListMessage<T>
where
    T: fmt::Debug + Send + Sync + 'static,
{
    fn timestamp(&self) -> TimestampNs {
        self.header.timestamp
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Ping {
        id: u32,
        timestamp: TimestampNs,
    }

    impl Message for Ping {
        fn timestamp(&self) -> TimestampNs {
            self.timestamp
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[test]
    fn test_downcast_message() {
        let msg: MessageHandle = Arc::new(Ping { id: 7, timestamp: now_ns() });

        let ping = downcast_message::<Ping>(&msg).unwrap();
        assert_eq!(ping.id, 7);
        assert!(downcast_message::<ListMessage<u8>>(&msg).is_none());
    }

    #[test]
    fn test_list_message() {
        let header = Header::new("camera_front");
        let list = ListMessage::new(header.clone(), vec![4, 8, 15, 16, 23, 42]);

        assert_eq!(list.len(), 6);
        assert!(!list.is_empty());
        assert_eq!(list.items()[5], 42);
        assert_eq!(list.header().frame_id, "camera_front");
        assert_eq!(list.timestamp(), header.timestamp);
    }

    #[test]
    fn test_shared_ownership_released_by_last_holder() {
        let msg: MessageHandle = Arc::new(Ping { id: 1, timestamp: 0 });
        let held_by_queue = msg.clone();
        let held_by_subscriber = msg.clone();
        assert_eq!(Arc::strong_count(&msg), 3);

        drop(held_by_queue);
        drop(held_by_subscriber);
        assert_eq!(Arc::strong_count(&msg), 1);
    }
}
