//! Prelude - 常用类型的便捷导入
//!
//! ```rust
//! use rmp_sdk::prelude::*;
//! ```

// 驱动层
pub use rmp_driver::{
    DriverConfig, InterfaceType, LogLevel, MetricsSnapshot, PipelineConfig, RmpBuilder, SegwayRmp,
};

// 协议层
pub use rmp_protocol::{
    ControllerGainSchedule, MotorStatus, OperationalMode, StatusSnapshot, Timestamp,
    VehicleProfile, VehicleType,
};

// 传输层
pub use rmp_io::Transport;

// 错误类型
pub use rmp_driver::DriverError;
pub use rmp_io::IoError;
pub use rmp_protocol::ProtocolError;
