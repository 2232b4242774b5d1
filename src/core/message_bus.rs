//! 消息总线实现
//!
//! 每个话题一条阻塞队列，发布权限在入队时校验，`notify` 在调用线程上
//! 按入队顺序同步投递给所有订阅者。

use super::queue::BlockingQueue;
use crate::types::{MessageCallback, MessageHandle, MessageSender, Publisher, Subscriber, Topic};
use crate::{Result, SenseBusError};
use parking_lot::{Condvar, Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// 消息总线配置
#[derive(Debug, Clone)]
pub struct MessageBusConfig {
    /// 等待工作时的轮询间隔
    pub poll_interval: Duration,
}

impl Default for MessageBusConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(10),
        }
    }
}

/// 发布者与订阅者登记表
#[derive(Default)]
struct Registrations {
    /// 话题 -> 发布者
    publishers: HashMap<Topic, Vec<Publisher>>,
    /// 话题 -> 订阅者
    subscribers: HashMap<Topic, Vec<Subscriber>>,
}

/// 消息总线
pub struct MessageBus {
    /// 登记锁，锁顺序总是先登记后队列
    registrations: RwLock<Registrations>,
    /// 队列锁
    queues: Mutex<HashMap<Topic, Arc<BlockingQueue<MessageHandle>>>>,
    /// 所有队列中的消息总数
    pending: AtomicUsize,
    /// 运行标志，一旦清除不再恢复
    running: AtomicBool,
    /// 等待工作用的锁与条件变量
    work_lock: Mutex<()>,
    work_signal: Condvar,
    /// 配置
    config: MessageBusConfig,
}

impl MessageBus {
    /// 创建新的消息总线
    pub fn new(config: MessageBusConfig) -> Self {
        Self {
            registrations: RwLock::new(Registrations::default()),
            queues: Mutex::new(HashMap::new()),
            pending: AtomicUsize::new(0),
            running: AtomicBool::new(true),
            work_lock: Mutex::new(()),
            work_signal: Condvar::new(),
            config,
        }
    }

    /// 声明向话题发布消息，幂等
    pub fn publish(&self, topic: &str, mut publisher: Publisher) {
        publisher.topic = topic.to_string();

        let mut registrations = self.registrations.write();
        let publishers = registrations.publishers.entry(topic.to_string()).or_default();
        if publishers.contains(&publisher) {
            debug!(topic, publisher = %publisher.name, "Publisher already registered");
        } else {
            info!(topic, publisher = %publisher.name, "Registered publisher");
            publishers.push(publisher);
        }
        registrations.subscribers.entry(topic.to_string()).or_default();

        self.queues.lock().entry(topic.to_string()).or_default();
    }

    /// 订阅话题，回调可以为空，幂等
    pub fn subscribe(&self, topic: &str, name: &str, callback: Option<MessageCallback>) {
        let subscriber = Subscriber {
            topic: topic.to_string(),
            name: name.to_string(),
            callback,
        };

        let mut registrations = self.registrations.write();
        let subscribers = registrations.subscribers.entry(topic.to_string()).or_default();
        if subscribers.contains(&subscriber) {
            debug!(topic, subscriber = name, "Subscriber already registered");
        } else {
            info!(topic, subscriber = name, "Registered subscriber");
            subscribers.push(subscriber);
        }
        registrations.publishers.entry(topic.to_string()).or_default();

        self.queues.lock().entry(topic.to_string()).or_default();
    }

    /// 将消息放入话题队列，不通知订阅者
    ///
    /// 发送者必须已注册为该话题的发布者，否则返回 `UnauthorizedPublication`。
    pub fn send(&self, topic: &str, owner: &str, msg: MessageHandle) -> Result<()> {
        {
            let registrations = self.registrations.read();
            let authorized = registrations
                .publishers
                .get(topic)
                .map_or(false, |publishers| publishers.iter().any(|p| p.name == owner));

            if !authorized {
                error!(topic, owner, "Unauthorised publication request");
                return Err(SenseBusError::unauthorized(topic, owner));
            }

            let mut queues = self.queues.lock();
            queues.entry(topic.to_string()).or_default().push(msg);
            self.pending.fetch_add(1, Ordering::SeqCst);
        }

        // 先经过等待锁再通知，避免丢失唤醒
        drop(self.work_lock.lock());
        self.work_signal.notify_one();
        Ok(())
    }

    /// 投递所有队列中的消息，返回本轮取出的消息数
    pub fn notify(&self) -> usize {
        let batches: Vec<(Topic, Vec<MessageHandle>)> = {
            let queues = self.queues.lock();
            let batches: Vec<_> = queues
                .iter()
                .filter(|(_, queue)| !queue.is_empty())
                .map(|(topic, queue)| (topic.clone(), queue.pop_all()))
                .collect();
            let drained: usize = batches.iter().map(|(_, messages)| messages.len()).sum();
            self.pending.fetch_sub(drained, Ordering::SeqCst);
            batches
        };

        let mut delivered = 0;
        for (topic, messages) in batches {
            delivered += messages.len();

            let callbacks: Vec<MessageCallback> = {
                let registrations = self.registrations.read();
                registrations
                    .subscribers
                    .get(&topic)
                    .map(|subscribers| {
                        subscribers
                            .iter()
                            .filter_map(|s| s.callback.clone())
                            .collect()
                    })
                    .unwrap_or_default()
            };

            if callbacks.is_empty() {
                debug!(topic = %topic, count = messages.len(), "No subscriber callbacks, dropping messages");
                continue;
            }

            for msg in &messages {
                for callback in &callbacks {
                    callback(msg.clone());
                }
            }
        }

        delivered
    }

    /// 阻塞直到有待处理消息或总线停止
    ///
    /// 返回 `false` 表示总线已停止，调用方应退出循环。
    pub fn wait_for_work(&self) -> bool {
        if !self.is_running() {
            return false;
        }

        let mut guard = self.work_lock.lock();
        while self.is_running() && self.pending.load(Ordering::SeqCst) == 0 {
            self.work_signal.wait_for(&mut guard, self.config.poll_interval);
        }

        self.is_running()
    }

    /// 设置运行标志，`false` 会唤醒所有等待者
    pub fn set_work(&self, flag: bool) {
        if flag {
            if !self.is_running() {
                warn!("Message bus has been stopped and cannot be resumed");
            }
            return;
        }

        if self.running.swap(false, Ordering::SeqCst) {
            info!("Message bus stopping");
        }
        drop(self.work_lock.lock());
        self.work_signal.notify_all();
    }

    /// 总线是否仍在运行
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// 获取全部发布者
    pub fn get_publishers(&self) -> Vec<Publisher> {
        let registrations = self.registrations.read();
        registrations.publishers.values().flatten().cloned().collect()
    }

    /// 获取话题的订阅者名称
    pub fn subscriber_names(&self, topic: &str) -> Vec<String> {
        let registrations = self.registrations.read();
        registrations
            .subscribers
            .get(topic)
            .map(|subscribers| subscribers.iter().map(|s| s.name.clone()).collect())
            .unwrap_or_default()
    }

    /// 已知的全部话题
    pub fn topics(&self) -> Vec<Topic> {
        let mut topics: Vec<_> = self.queues.lock().keys().cloned().collect();
        topics.sort();
        topics
    }

    /// 话题队列长度
    pub fn queue_len(&self, topic: &str) -> usize {
        self.queues.lock().get(topic).map_or(0, |queue| queue.len())
    }

    /// 所有队列中的消息总数
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// 清空所有队列、发布者和订阅者
    ///
    /// 用于在插件模块卸载前释放插件持有的回调。
    pub fn clear(&self) {
        let mut registrations = self.registrations.write();
        let mut queues = self.queues.lock();

        queues.clear();
        registrations.publishers.clear();
        registrations.subscribers.clear();
        self.pending.store(0, Ordering::SeqCst);

        info!("Message bus cleared");
    }

    /// 创建绑定到本总线的发送函数
    ///
    /// 只持有弱引用，插件持有发送函数不会延长总线寿命。
    pub fn sender(self: &Arc<Self>) -> MessageSender {
        let bus: Weak<MessageBus> = Arc::downgrade(self);
        Arc::new(move |topic: &str, owner: &str, msg: MessageHandle| match bus.upgrade() {
            Some(bus) => bus.send(topic, owner, msg),
            None => Err(SenseBusError::lifecycle(owner, "message bus has been dropped")),
        })
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new(MessageBusConfig::default())
    }
}
