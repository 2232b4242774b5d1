//! 线程安全的阻塞队列
//!
//! 无界 FIFO 队列，`pop` 在队列为空时阻塞，`pop_all` 一次性取走全部元素。

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;

/// 阻塞队列
pub struct BlockingQueue<T> {
    /// 队列内容
    items: Mutex<VecDeque<T>>,
    /// 非空通知
    not_empty: Condvar,
}

impl<T> BlockingQueue<T> {
    /// 创建空队列
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            not_empty: Condvar::new(),
        }
    }

    /// 追加到队尾，并唤醒至多一个等待者
    pub fn push(&self, item: T) {
        let mut items = self.items.lock();
        items.push_back(item);
        self.not_empty.notify_one();
    }

    /// 取出队首元素，队列为空时阻塞
    pub fn pop(&self) -> T {
        let mut items = self.items.lock();
        loop {
            if let Some(item) = items.pop_front() {
                return item;
            }
            self.not_empty.wait(&mut items);
        }
    }

    /// 非阻塞地取出队首元素
    pub fn try_pop(&self) -> Option<T> {
        self.items.lock().pop_front()
    }

    /// 取出全部元素，保持原有顺序
    pub fn pop_all(&self) -> Vec<T> {
        let mut items = self.items.lock();
        items.drain(..).collect()
    }

    /// 当前长度（快照）
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    /// 是否为空（快照）
    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }
}

impl<T> Default for BlockingQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_push_threaded() {
        let queue = Arc::new(BlockingQueue::new());
        assert!(queue.is_empty());

        let pusher = {
            let queue = queue.clone();
            thread::spawn(move || {
                for i in 0..500 {
                    queue.push(i);
                }
            })
        };

        for i in 500..1000 {
            queue.push(i);
        }
        pusher.join().unwrap();

        assert_eq!(queue.len(), 1000);
        assert!(!queue.is_empty());
    }

    #[test]
    fn test_pop_blocks_until_push() {
        let queue = Arc::new(BlockingQueue::new());

        let pusher = {
            let queue = queue.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(10));
                queue.push("hi".to_string());
            })
        };

        assert_eq!(queue.pop(), "hi");
        pusher.join().unwrap();
        assert!(queue.is_empty());
    }

    #[test]
    fn test_pop_preserves_order() {
        let queue = BlockingQueue::new();
        for i in 0..500 {
            queue.push(i);
        }
        for i in 0..500 {
            assert_eq!(queue.pop(), i);
        }
        assert!(queue.try_pop().is_none());
    }

    #[test]
    fn test_pop_all() {
        let queue = BlockingQueue::new();
        assert!(queue.pop_all().is_empty());

        for i in 0..500 {
            queue.push(i);
        }

        let items = queue.pop_all();
        assert_eq!(items.len(), 500);
        assert_eq!(items, (0..500).collect::<Vec<_>>());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_concurrent_exactly_once() {
        let queue = Arc::new(BlockingQueue::new());
        let producers = 4;
        let per_producer = 250;

        let handles: Vec<_> = (0..producers)
            .map(|p| {
                let queue = queue.clone();
                thread::spawn(move || {
                    for i in 0..per_producer {
                        queue.push(p * per_producer + i);
                    }
                })
            })
            .collect();

        // 消费线程交替使用 pop 与 pop_all
        let consumer = {
            let queue = queue.clone();
            thread::spawn(move || {
                let mut seen = Vec::new();
                while seen.len() < producers * per_producer {
                    seen.push(queue.pop());
                    seen.extend(queue.pop_all());
                }
                seen
            })
        };

        for handle in handles {
            handle.join().unwrap();
        }
        let seen = consumer.join().unwrap();

        assert_eq!(seen.len(), producers * per_producer);
        let unique: HashSet<_> = seen.iter().copied().collect();
        assert_eq!(unique.len(), producers * per_producer);

        // 同一生产者的元素保持先后顺序
        for p in 0..producers {
            let from_p: Vec<_> = seen
                .iter()
                .copied()
                .filter(|v| v / per_producer == p)
                .collect();
            let mut sorted = from_p.clone();
            sorted.sort_unstable();
            assert_eq!(from_p, sorted);
        }
    }
}
