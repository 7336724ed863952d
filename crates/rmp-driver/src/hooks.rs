//! 回调注册表
//!
//! 四类用户回调：状态、分级日志、时间戳、异常。每一类都有一个显式的默认实现
//! （写入 `tracing`），在构造时就位，不存在"未设置"的状态。
//!
//! 回调保存在 `RwLock` 中；调用前先把 `Arc` 克隆出来再释放锁，
//! 因此回调内部可以安全地重新注册回调。

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use parking_lot::RwLock;
use rmp_protocol::{StatusSnapshot, Timestamp};
use tracing::{debug, error, info};

use crate::error::DriverError;

/// 状态回调：每个完整的遥测周期调用一次
pub type StatusCallback = Arc<dyn Fn(StatusSnapshot) + Send + Sync>;

/// 日志回调
pub type LogCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// 时间戳回调：在周期起始帧到达时调用
pub type TimestampCallback = Arc<dyn Fn() -> Timestamp + Send + Sync>;

/// 异常回调
pub type ExceptionCallback = Arc<dyn Fn(&DriverError) + Send + Sync>;

/// 日志级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogLevel {
    Debug,
    Info,
    Error,
}

impl LogLevel {
    pub const ALL: [LogLevel; 3] = [LogLevel::Debug, LogLevel::Info, LogLevel::Error];

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = DriverError;

    /// 大小写不敏感
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "error" => Ok(LogLevel::Error),
            other => Err(DriverError::Configuration(format!(
                "Unknown log level '{}' (expected debug, info or error)",
                other
            ))),
        }
    }
}

/// 一组回调
#[derive(Clone)]
pub struct Callbacks {
    pub status: StatusCallback,
    pub debug_log: LogCallback,
    pub info_log: LogCallback,
    pub error_log: LogCallback,
    pub timestamp: TimestampCallback,
    pub exception: ExceptionCallback,
}

impl Default for Callbacks {
    fn default() -> Self {
        Self {
            status: Arc::new(|snapshot: StatusSnapshot| info!("{}", snapshot)),
            debug_log: Arc::new(|msg: &str| debug!("{}", msg)),
            info_log: Arc::new(|msg: &str| info!("{}", msg)),
            error_log: Arc::new(|msg: &str| error!("{}", msg)),
            timestamp: Arc::new(Timestamp::now),
            exception: Arc::new(|err: &DriverError| error!("RMP exception: {}", err)),
        }
    }
}

impl fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callbacks").finish_non_exhaustive()
    }
}

/// 线程安全的回调注册表
///
/// 由驱动门面和两个工作线程共享。
#[derive(Debug, Default)]
pub struct CallbackRegistry {
    inner: RwLock<Callbacks>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_callbacks(callbacks: Callbacks) -> Self {
        Self {
            inner: RwLock::new(callbacks),
        }
    }

    pub fn set_status(&self, callback: StatusCallback) {
        self.inner.write().status = callback;
    }

    pub fn set_log(&self, level: LogLevel, callback: LogCallback) {
        let mut inner = self.inner.write();
        match level {
            LogLevel::Debug => inner.debug_log = callback,
            LogLevel::Info => inner.info_log = callback,
            LogLevel::Error => inner.error_log = callback,
        }
    }

    pub fn set_timestamp(&self, callback: TimestampCallback) {
        self.inner.write().timestamp = callback;
    }

    pub fn set_exception(&self, callback: ExceptionCallback) {
        self.inner.write().exception = callback;
    }

    /// 当前回调的拷贝
    pub fn snapshot(&self) -> Callbacks {
        self.inner.read().clone()
    }

    pub fn status(&self) -> StatusCallback {
        self.inner.read().status.clone()
    }

    pub fn log_callback(&self, level: LogLevel) -> LogCallback {
        let inner = self.inner.read();
        match level {
            LogLevel::Debug => inner.debug_log.clone(),
            LogLevel::Info => inner.info_log.clone(),
            LogLevel::Error => inner.error_log.clone(),
        }
    }

    /// 调用对应级别的日志回调
    pub fn log(&self, level: LogLevel, msg: &str) {
        let callback = self.log_callback(level);
        callback(msg);
    }

    /// 调用时间戳回调取得当前时间
    pub fn now(&self) -> Timestamp {
        let callback = self.inner.read().timestamp.clone();
        callback()
    }

    pub fn exception(&self, err: &DriverError) {
        let callback = self.inner.read().exception.clone();
        callback(err);
    }
}
