//! 遥测流水线
//!
//! 两个线程：
//! - `rmp-ingest`：读帧、组装快照、入队。只做解析，不调用状态回调。
//! - `rmp-dispatch`：出队并调用用户的状态回调。
//!
//! 中间的有界队列满时丢弃最旧快照，慢回调不会拖住读帧。

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use arc_swap::ArcSwapOption;
use rmp_io::{CancelToken, FrameReader, IoError, RxTransport};
use rmp_protocol::{FrameError, StatusAssembler, StatusSnapshot, VehicleProfile};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, trace};

use crate::error::DriverError;
use crate::hooks::{CallbackRegistry, LogLevel};
use crate::metrics::PipelineMetrics;
use crate::queue::{BoundedQueue, DEFAULT_QUEUE_CAPACITY};

/// 流水线配置
///
/// ```
/// use rmp_driver::PipelineConfig;
///
/// let config = PipelineConfig {
///     queue_capacity: 64,
///     ..Default::default()
/// };
/// assert_eq!(config.read_buffer_size, 256);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// 快照队列容量
    pub queue_capacity: usize,
    /// 单次从传输层读取的最大字节数
    pub read_buffer_size: usize,
    /// 传输层出错后的退避时间（毫秒）
    pub error_backoff_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            read_buffer_size: rmp_io::framed::DEFAULT_READ_BUFFER_SIZE,
            error_backoff_ms: 10,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), DriverError> {
        if self.queue_capacity == 0 {
            return Err(DriverError::Configuration(
                "pipeline.queue_capacity must be at least 1".into(),
            ));
        }
        if self.read_buffer_size == 0 {
            return Err(DriverError::Configuration(
                "pipeline.read_buffer_size must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// 驱动门面与工作线程共享的状态
///
/// 跨越多次连接保持不变：回调、计数器和最近一次快照。
#[derive(Debug, Default)]
pub struct PipelineContext {
    pub callbacks: CallbackRegistry,
    pub metrics: PipelineMetrics,
    latest: ArcSwapOption<StatusSnapshot>,
}

impl PipelineContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// 最近一个完整周期的快照（无锁读取）
    pub fn latest(&self) -> Option<StatusSnapshot> {
        self.latest.load_full().map(|snapshot| *snapshot)
    }

    fn publish(&self, snapshot: StatusSnapshot) {
        self.latest.store(Some(Arc::new(snapshot)));
    }

    pub fn clear_latest(&self) {
        self.latest.store(None);
    }
}

/// 采集循环
///
/// 运行标志清除或读取被取消后退出。帧错误通过错误日志回调报告，
/// 其它传输层错误通过异常回调报告并短暂退避。
pub fn ingest_loop(
    mut reader: FrameReader,
    mut assembler: StatusAssembler,
    ctx: Arc<PipelineContext>,
    queue: Arc<BoundedQueue<StatusSnapshot>>,
    is_running: Arc<AtomicBool>,
    config: PipelineConfig,
) {
    #[cfg(feature = "realtime")]
    {
        use thread_priority::*;
        use tracing::{info, warn};

        match set_current_thread_priority(ThreadPriority::Max) {
            Ok(_) => info!("Ingest thread priority set to MAX (realtime)"),
            Err(e) => warn!(
                "Failed to set ingest thread priority: {}. \
                On Linux this needs CAP_SYS_NICE or rtkit.",
                e
            ),
        }
    }

    let backoff = Duration::from_millis(config.error_backoff_ms);

    while is_running.load(Ordering::Acquire) {
        match reader.read_frame() {
            Ok(frame) => {
                ctx.metrics.frames_received.fetch_add(1, Ordering::Relaxed);

                let completed = assembler.apply(&frame, || ctx.callbacks.now());
                if let Some(snapshot) = completed {
                    ctx.metrics.snapshots_assembled.fetch_add(1, Ordering::Relaxed);
                    ctx.publish(snapshot);

                    if queue.enqueue(snapshot).is_some() {
                        ctx.metrics.snapshots_dropped.fetch_add(1, Ordering::Relaxed);
                        ctx.callbacks.log(
                            LogLevel::Error,
                            "Falling behind, status queue is full, dropping oldest snapshot",
                        );
                    }
                }
            },
            Err(IoError::Frame(err)) => {
                match err {
                    FrameError::ChecksumMismatch { .. } => {
                        ctx.metrics.checksum_errors.fetch_add(1, Ordering::Relaxed)
                    },
                    FrameError::NoData => ctx.metrics.no_data_events.fetch_add(1, Ordering::Relaxed),
                };
                ctx.callbacks.log(
                    LogLevel::Error,
                    &format!("Frame error (code {}): {}", err.code(), err),
                );
            },
            Err(IoError::Canceled) => {
                trace!("Ingest thread: read canceled");
                break;
            },
            Err(e) => {
                ctx.metrics.transport_errors.fetch_add(1, Ordering::Relaxed);
                ctx.callbacks.exception(&DriverError::Read(e));
                thread::sleep(backoff);
            },
        }
    }

    trace!("Ingest thread: loop exited");
}

/// 分发循环
///
/// 队列被取消后退出。回调 panic 会被捕获并转交给异常回调，线程继续运行。
pub fn dispatch_loop(
    ctx: Arc<PipelineContext>,
    queue: Arc<BoundedQueue<StatusSnapshot>>,
    is_running: Arc<AtomicBool>,
) {
    while let Some(snapshot) = queue.dequeue() {
        if !is_running.load(Ordering::Acquire) {
            continue;
        }

        let callback = ctx.callbacks.status();
        match catch_unwind(AssertUnwindSafe(|| callback(snapshot))) {
            Ok(()) => {
                ctx.metrics.snapshots_delivered.fetch_add(1, Ordering::Relaxed);
            },
            Err(payload) => {
                ctx.metrics.callback_panics.fetch_add(1, Ordering::Relaxed);
                let msg = panic_message(payload.as_ref());
                error!("Status callback panicked: {}", msg);
                ctx.callbacks.exception(&DriverError::Callback(msg));
            },
        }
    }

    trace!("Dispatch thread: loop exited");
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        String::from("unknown panic payload")
    }
}

/// 运行中的遥测流水线
///
/// 持有两个工作线程；`stop` 或 `Drop` 时按顺序关闭。
pub struct TelemetryPipeline {
    is_running: Arc<AtomicBool>,
    cancel: CancelToken,
    queue: Arc<BoundedQueue<StatusSnapshot>>,
    ingest: Option<JoinHandle<()>>,
    dispatch: Option<JoinHandle<()>>,
}

impl TelemetryPipeline {
    /// 启动采集线程和分发线程
    pub fn start(
        rx: Box<dyn RxTransport>,
        profile: VehicleProfile,
        ctx: Arc<PipelineContext>,
        config: &PipelineConfig,
    ) -> Result<Self, DriverError> {
        config.validate()?;

        let cancel = CancelToken::new();
        let reader = FrameReader::with_buffer_size(rx, cancel.clone(), config.read_buffer_size);
        let queue = Arc::new(BoundedQueue::new(config.queue_capacity));
        let is_running = Arc::new(AtomicBool::new(true));

        let mut pipeline = Self {
            is_running: is_running.clone(),
            cancel,
            queue: queue.clone(),
            ingest: None,
            dispatch: None,
        };

        let dispatch_ctx = ctx.clone();
        let dispatch_queue = queue.clone();
        let dispatch_running = is_running.clone();
        pipeline.dispatch = Some(
            thread::Builder::new()
                .name("rmp-dispatch".into())
                .spawn(move || dispatch_loop(dispatch_ctx, dispatch_queue, dispatch_running))
                .map_err(|e| DriverError::Thread(format!("Failed to spawn dispatch thread: {}", e)))?,
        );

        let ingest_config = config.clone();
        let assembler = StatusAssembler::new(profile);
        pipeline.ingest = Some(
            thread::Builder::new()
                .name("rmp-ingest".into())
                .spawn(move || {
                    ingest_loop(reader, assembler, ctx, queue, is_running, ingest_config)
                })
                .map_err(|e| DriverError::Thread(format!("Failed to spawn ingest thread: {}", e)))?,
        );

        debug!(
            "Telemetry pipeline started (queue capacity {})",
            config.queue_capacity
        );
        Ok(pipeline)
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Acquire)
    }

    /// 两个线程都未退出
    pub fn is_healthy(&self) -> bool {
        let alive = |h: &Option<JoinHandle<()>>| h.as_ref().is_some_and(|h| !h.is_finished());
        alive(&self.ingest) && alive(&self.dispatch)
    }

    /// 队列中等待分发的快照数
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    #[cfg(test)]
    fn queue_is_canceled(&self) -> bool {
        self.queue.is_canceled()
    }

    /// 停止流水线
    ///
    /// 顺序：清除运行标志 → 取消读取 → 等待采集线程 → 取消队列 → 等待分发线程。
    /// 幂等。
    pub fn stop(&mut self) {
        self.is_running.store(false, Ordering::Release);
        self.cancel.cancel();

        if let Some(handle) = self.ingest.take()
            && handle.join().is_err()
        {
            error!("Ingest thread panicked");
        }

        self.queue.cancel();

        if let Some(handle) = self.dispatch.take()
            && handle.join().is_err()
        {
            error!("Dispatch thread panicked");
        }
    }
}

impl Drop for TelemetryPipeline {
    fn drop(&mut self) {
        self.stop();
    }
}
