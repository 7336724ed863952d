//! 驱动层错误类型定义

use rmp_io::IoError;
use rmp_protocol::FrameError;
use thiserror::Error;

/// 驱动层错误类型
#[derive(Error, Debug)]
pub enum DriverError {
    /// 配置错误（接口类型不支持、未配置即连接、参数非法等）
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// 连接失败
    #[error("Connection failed: {0}")]
    Connection(#[source] IoError),

    /// 读取失败（传输层错误，非帧错误）
    #[error("Read failed: {0}")]
    Read(#[source] IoError),

    /// 指令写出失败
    #[error("Write failed: {0}")]
    Write(#[source] IoError),

    /// 帧层错误（校验失败 / 无数据）
    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),

    /// 指令被拒绝（未连接）
    #[error("Command rejected: {0}")]
    Command(String),

    /// 用户回调 panic
    #[error("Callback panicked: {0}")]
    Callback(String),

    /// 工作线程错误
    #[error("Thread error: {0}")]
    Thread(String),
}

impl DriverError {
    /// 帧错误的数字子码（校验失败 2，无数据 3）
    pub fn code(&self) -> Option<u8> {
        match self {
            DriverError::Frame(e) => Some(e.code()),
            DriverError::Read(IoError::Frame(e)) => Some(e.code()),
            _ => None,
        }
    }

    /// 是否可以继续运行（帧错误、回调错误、非致命的读错误）
    pub fn is_recoverable(&self) -> bool {
        match self {
            DriverError::Frame(_) | DriverError::Callback(_) => true,
            DriverError::Read(IoError::Device(dev)) => !dev.is_fatal(),
            DriverError::Read(IoError::NotConnected) => false,
            DriverError::Read(_) => true,
            _ => false,
        }
    }
}
