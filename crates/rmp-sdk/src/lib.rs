//! Segway RMP SDK
//!
//! 两轮自平衡底盘（RMP50 / 100 / 200 / 400 / X440）的主机端驱动。
//!
//! # 分层
//!
//! - **协议层** (`protocol`): 18 字节帧的校验、同步解码、编码；遥测快照组装；指令编码
//! - **传输层** (`io`): 串口、FTDI USB、内存 mock
//! - **驱动层** (`driver`): 遥测流水线、回调、配置、`SegwayRmp` 门面
//!
//! # 快速开始
//!
//! ```no_run
//! use rmp_sdk::prelude::*;
//!
//! rmp_sdk::init_logging();
//!
//! let mut rmp = RmpBuilder::new()
//!     .vehicle(VehicleType::Rmp200)
//!     .usb_index(0)
//!     .build()?;
//! rmp.set_status_callback(|status| println!("{}", status));
//! rmp.connect(true)?;
//! rmp.set_operational_mode(OperationalMode::Tractor)?;
//! rmp.move_velocity(0.3, 10.0)?;
//! # Ok::<(), DriverError>(())
//! ```

pub use rmp_driver as driver;
pub use rmp_io as io;
pub use rmp_protocol as protocol;

pub mod prelude;

pub use rmp_driver::{
    DriverConfig, DriverError, InterfaceType, LogLevel, MetricsSnapshot, PipelineConfig,
    RmpBuilder, SegwayRmp,
};
pub use rmp_io::{IoError, Transport};
pub use rmp_protocol::{ProtocolError, StatusSnapshot, VehicleType};

use tracing_subscriber::EnvFilter;

/// 默认日志过滤规则
pub const DEFAULT_LOG_FILTER: &str = "info";

/// 初始化日志输出
///
/// 读取 `RUST_LOG`，未设置时使用 `info`。同时把 `log` crate 的记录桥接到 `tracing`。
/// 重复调用是安全的，只有第一次生效。
pub fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    install(filter);
}

/// 使用指定的过滤规则初始化日志，如 `"rmp_driver=debug,info"`
///
/// 规则无法解析时回退到 `info`。
pub fn init_logging_with_filter(directives: &str) {
    let filter = EnvFilter::try_new(directives).unwrap_or_else(|e| {
        eprintln!("Invalid log filter '{}': {}, falling back to info", directives, e);
        EnvFilter::new(DEFAULT_LOG_FILTER)
    });
    install(filter);
}

fn install(filter: EnvFilter) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .try_init();
    // 订阅器可能已经装过 log 桥接，这里失败可以忽略
    let _ = tracing_log::LogTracer::init();
}
