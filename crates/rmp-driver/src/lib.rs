//! # RMP Driver Layer
//!
//! 驱动层：遥测流水线、指令接口、配置与回调。
//!
//! ## 线程模型
//!
//! - `rmp-ingest`：从传输的接收半部读帧，组装完整周期的 [`StatusSnapshot`]，放入有界队列
//! - `rmp-dispatch`：从队列取快照，调用用户的状态回调
//! - 调用方线程：通过传输的发送半部直接写指令
//!
//! 队列满时丢弃最旧的快照并通过错误日志回调报告，读帧永远不会被慢回调阻塞。
//!
//! [`StatusSnapshot`]: rmp_protocol::StatusSnapshot

pub mod builder;
pub mod config;
pub mod error;
pub mod hooks;
pub mod metrics;
pub mod pipeline;
pub mod queue;
pub mod rmp;

pub use builder::RmpBuilder;
pub use config::{DriverConfig, InterfaceType, SerialConfig, UsbConfig};
pub use error::DriverError;
pub use hooks::{
    CallbackRegistry, Callbacks, ExceptionCallback, LogCallback, LogLevel, StatusCallback,
    TimestampCallback,
};
pub use metrics::{MetricsSnapshot, PipelineMetrics};
pub use pipeline::{PipelineConfig, PipelineContext, TelemetryPipeline};
pub use queue::{BoundedQueue, DEFAULT_QUEUE_CAPACITY};
pub use rmp::SegwayRmp;
