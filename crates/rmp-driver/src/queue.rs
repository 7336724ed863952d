//! 有界快照队列
//!
//! 单生产者（采集线程）/ 单消费者（分发线程）的 FIFO。
//! 满时丢弃最旧的元素，生产者永远不阻塞。

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// 默认容量
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

struct QueueInner<T> {
    items: VecDeque<T>,
    canceled: bool,
}

/// 丢弃最旧元素的有界阻塞队列
pub struct BoundedQueue<T> {
    inner: Mutex<QueueInner<T>>,
    not_empty: Condvar,
    capacity: usize,
}

impl<T> BoundedQueue<T> {
    /// 创建队列，容量至少为 1
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(QueueInner {
                items: VecDeque::with_capacity(capacity.min(DEFAULT_QUEUE_CAPACITY)),
                canceled: false,
            }),
            not_empty: Condvar::new(),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().items.is_empty()
    }

    pub fn is_canceled(&self) -> bool {
        self.inner.lock().canceled
    }

    /// 入队，不阻塞
    ///
    /// 队列已满时移除并返回最旧的元素，新元素总是被接纳。
    pub fn enqueue(&self, item: T) -> Option<T> {
        let dropped = {
            let mut inner = self.inner.lock();
            let dropped = if inner.items.len() >= self.capacity {
                inner.items.pop_front()
            } else {
                None
            };
            inner.items.push_back(item);
            dropped
        };
        self.not_empty.notify_one();
        dropped
    }

    /// 阻塞出队
    ///
    /// 队列为空时等待；取消后返回 `None`（队列中剩余的元素保持不动）。
    pub fn dequeue(&self) -> Option<T> {
        let mut inner = self.inner.lock();
        loop {
            if inner.canceled {
                return None;
            }
            if let Some(item) = inner.items.pop_front() {
                return Some(item);
            }
            self.not_empty.wait(&mut inner);
        }
    }

    /// 带超时的出队，超时或取消时返回 `None`
    pub fn dequeue_timeout(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock();
        loop {
            if inner.canceled {
                return None;
            }
            if let Some(item) = inner.items.pop_front() {
                return Some(item);
            }
            if self.not_empty.wait_until(&mut inner, deadline).timed_out() {
                return inner.items.pop_front().filter(|_| !inner.canceled);
            }
        }
    }

    /// 取消：唤醒所有等待者，之后的 `dequeue` 立即返回 `None`
    pub fn cancel(&self) {
        self.inner.lock().canceled = true;
        self.not_empty.notify_all();
    }

    /// 清空并重新启用
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.items.clear();
        inner.canceled = false;
    }
}

impl<T> Default for BoundedQueue<T> {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}
