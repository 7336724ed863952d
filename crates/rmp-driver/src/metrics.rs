//! 遥测流水线运行指标
//!
//! 采集线程和分发线程直接累加原子计数器，任何线程都可以无锁读取。

use std::sync::atomic::{AtomicU64, Ordering};

/// 流水线计数器
///
/// ```rust
/// use rmp_driver::PipelineMetrics;
/// use std::sync::atomic::Ordering;
///
/// let metrics = PipelineMetrics::new();
/// metrics.frames_received.fetch_add(1, Ordering::Relaxed);
/// assert_eq!(metrics.snapshot().frames_received, 1);
/// ```
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    /// 校验通过的帧数
    pub frames_received: AtomicU64,
    /// 校验失败被丢弃的帧数
    pub checksum_errors: AtomicU64,
    /// 读取无数据的次数（链路空闲时正常增长）
    pub no_data_events: AtomicU64,
    /// 传输层错误次数
    pub transport_errors: AtomicU64,
    /// 组装完成的快照数
    pub snapshots_assembled: AtomicU64,
    /// 队列满时被丢弃的快照数
    ///
    /// 持续增长说明状态回调处理太慢。
    pub snapshots_dropped: AtomicU64,
    /// 已交给状态回调的快照数
    pub snapshots_delivered: AtomicU64,
    /// 状态回调 panic 次数
    pub callback_panics: AtomicU64,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// 读取所有计数器（Relaxed，各计数器之间可能有微小的时间差）
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            frames_received: self.frames_received.load(Ordering::Relaxed),
            checksum_errors: self.checksum_errors.load(Ordering::Relaxed),
            no_data_events: self.no_data_events.load(Ordering::Relaxed),
            transport_errors: self.transport_errors.load(Ordering::Relaxed),
            snapshots_assembled: self.snapshots_assembled.load(Ordering::Relaxed),
            snapshots_dropped: self.snapshots_dropped.load(Ordering::Relaxed),
            snapshots_delivered: self.snapshots_delivered.load(Ordering::Relaxed),
            callback_panics: self.callback_panics.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        self.frames_received.store(0, Ordering::Relaxed);
        self.checksum_errors.store(0, Ordering::Relaxed);
        self.no_data_events.store(0, Ordering::Relaxed);
        self.transport_errors.store(0, Ordering::Relaxed);
        self.snapshots_assembled.store(0, Ordering::Relaxed);
        self.snapshots_dropped.store(0, Ordering::Relaxed);
        self.snapshots_delivered.store(0, Ordering::Relaxed);
        self.callback_panics.store(0, Ordering::Relaxed);
    }
}

/// 计数器快照
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub frames_received: u64,
    pub checksum_errors: u64,
    pub no_data_events: u64,
    pub transport_errors: u64,
    pub snapshots_assembled: u64,
    pub snapshots_dropped: u64,
    pub snapshots_delivered: u64,
    pub callback_panics: u64,
}

impl MetricsSnapshot {
    /// 被丢弃快照占组装总数的百分比
    pub fn drop_rate(&self) -> f64 {
        if self.snapshots_assembled == 0 {
            return 0.0;
        }
        (self.snapshots_dropped as f64 / self.snapshots_assembled as f64) * 100.0
    }

    /// 坏帧占全部帧的百分比
    pub fn checksum_error_rate(&self) -> f64 {
        let total = self.frames_received + self.checksum_errors;
        if total == 0 {
            return 0.0;
        }
        (self.checksum_errors as f64 / total as f64) * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_snapshot_and_reset() {
        let metrics = PipelineMetrics::new();
        metrics.frames_received.fetch_add(10, Ordering::Relaxed);
        metrics.snapshots_assembled.fetch_add(4, Ordering::Relaxed);
        metrics.snapshots_dropped.fetch_add(1, Ordering::Relaxed);

        let snap = metrics.snapshot();
        assert_eq!(snap.frames_received, 10);
        assert_eq!(snap.snapshots_assembled, 4);
        assert_eq!(snap.snapshots_dropped, 1);
        assert_eq!(snap.callback_panics, 0);

        metrics.reset();
        assert_eq!(metrics.snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn test_rates() {
        let snap = MetricsSnapshot {
            frames_received: 90,
            checksum_errors: 10,
            snapshots_assembled: 200,
            snapshots_dropped: 50,
            ..Default::default()
        };
        assert!((snap.checksum_error_rate() - 10.0).abs() < 1e-9);
        assert!((snap.drop_rate() - 25.0).abs() < 1e-9);

        let empty = MetricsSnapshot::default();
        assert_eq!(empty.drop_rate(), 0.0);
        assert_eq!(empty.checksum_error_rate(), 0.0);
    }

    #[test]
    fn test_concurrent_updates() {
        let metrics = Arc::new(PipelineMetrics::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let metrics = metrics.clone();
                thread::spawn(move || {
                    for _ in 0..1000 {
                        metrics.frames_received.fetch_add(1, Ordering::Relaxed);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(metrics.snapshot().frames_received, 4000);
    }
}
