//! # RMP Transport Layer
//!
//! 字节流传输抽象，为驱动层提供统一的读写接口。
//!
//! ## 后端
//!
//! - `serial`: 串口（`serialport`）
//! - `ftdi`: FTDI USB 桥接芯片（`rusb`，用户态 libusb）
//! - `mock`: 内存传输，用于测试
//!
//! ## 读写分离
//!
//! [`Transport::split`] 把一个已连接的传输拆成独立的接收半部和发送半部，
//! 接收线程阻塞读取时不会挡住调用方线程上的指令发送。

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;

pub use rmp_protocol::{FrameError, RmpFrame};

pub mod framed;
pub mod mock;

#[cfg(feature = "serial")]
pub mod serial;

#[cfg(feature = "usb")]
pub mod ftdi;

pub use framed::{FrameReader, FrameWriter};
pub use mock::{MockHandle, MockTransport};

#[cfg(feature = "serial")]
pub use serial::SerialTransport;

#[cfg(feature = "usb")]
pub use ftdi::{UsbDeviceInfo, UsbSelector, UsbTransport, enumerate_usb_devices};

/// 传输层统一错误类型
#[derive(Error, Debug)]
pub enum IoError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Device Error: {0}")]
    Device(#[from] DeviceError),
    #[error("Frame Error: {0}")]
    Frame(#[from] FrameError),
    #[error("Transport not configured: {0}")]
    NotConfigured(String),
    #[error("Transport not connected")]
    NotConnected,
    #[error("Read canceled")]
    Canceled,
    #[error("Short write: wrote {written} of {expected} bytes")]
    ShortWrite { written: usize, expected: usize },
}

impl IoError {
    /// 帧层错误（校验失败 / 无数据）可以继续读取
    pub fn is_frame_error(&self) -> bool {
        matches!(self, IoError::Frame(_))
    }

    pub fn is_canceled(&self) -> bool {
        matches!(self, IoError::Canceled)
    }
}

/// 设备/后端错误的结构化分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceErrorKind {
    Unknown,
    NotFound,
    NoDevice,
    AccessDenied,
    Busy,
    InvalidConfig,
    Timeout,
    Backend,
}

/// 结构化设备错误
#[derive(Error, Debug, Clone)]
#[error("{kind:?}: {message}")]
pub struct DeviceError {
    pub kind: DeviceErrorKind,
    pub message: String,
}

impl DeviceError {
    pub fn new(kind: DeviceErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// 设备已经不可用，继续读写没有意义
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind,
            DeviceErrorKind::NoDevice | DeviceErrorKind::AccessDenied | DeviceErrorKind::NotFound
        )
    }
}

impl From<String> for DeviceError {
    fn from(message: String) -> Self {
        Self::new(DeviceErrorKind::Unknown, message)
    }
}

impl From<&str> for DeviceError {
    fn from(message: &str) -> Self {
        Self::new(DeviceErrorKind::Unknown, message)
    }
}

/// 取消令牌
///
/// 由驱动层持有一份、帧读取器持有一份。置位后 [`FrameReader`] 在下一次读取前
/// 返回 [`IoError::Canceled`]。通过 [`RxTransport::set_cancel_token`] 注册了令牌的后端
/// 在阻塞读取中途也会返回；其余后端受自身读超时约束。
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_canceled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// 重新启用（用于断开后再次连接）
    pub fn reset(&self) {
        self.0.store(false, Ordering::Release);
    }
}

/// 字节流传输
///
/// `connect` / `disconnect` 幂等。`read` 返回 0 是合法结果（超时内没有数据）。
pub trait Transport: Send {
    fn connect(&mut self) -> Result<(), IoError>;
    fn disconnect(&mut self);
    fn is_connected(&self) -> bool;
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, IoError>;
    fn write(&mut self, buf: &[u8]) -> Result<usize, IoError>;

    /// 拆分为接收 / 发送两个半部（需要已连接）
    ///
    /// 传输对象本身仍然保留，用于之后的 `disconnect`。
    fn split(&mut self) -> Result<(Box<dyn RxTransport>, Box<dyn TxTransport>), IoError>;

    /// 用于日志的简短描述
    fn describe(&self) -> String {
        String::from("transport")
    }
}

/// 接收半部
pub trait RxTransport: Send {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, IoError>;

    /// 注册取消令牌，置位后正在阻塞的 `read` 返回 `IoError::Canceled`
    ///
    /// 默认忽略，读取时间由后端的读超时决定。
    fn set_cancel_token(&mut self, _token: CancelToken) {}
}

/// 发送半部
pub trait TxTransport: Send {
    fn write(&mut self, buf: &[u8]) -> Result<usize, IoError>;
}
