//! 串口传输（`serialport`）
//!
//! 8N1、无流控。读取超时映射为 `Ok(0)`，拆分时对端口句柄做 `try_clone`。

use std::io::{ErrorKind, Read, Write};
use std::time::Duration;

use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use tracing::{debug, warn};

use crate::{DeviceError, DeviceErrorKind, IoError, RxTransport, Transport, TxTransport};

/// 默认波特率
pub const DEFAULT_BAUD_RATE: u32 = 460_800;

/// 默认读取超时
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(1000);

impl From<serialport::Error> for IoError {
    fn from(err: serialport::Error) -> Self {
        let kind = match err.kind() {
            serialport::ErrorKind::NoDevice => DeviceErrorKind::NoDevice,
            serialport::ErrorKind::InvalidInput => DeviceErrorKind::InvalidConfig,
            serialport::ErrorKind::Io(ErrorKind::NotFound) => DeviceErrorKind::NotFound,
            serialport::ErrorKind::Io(ErrorKind::PermissionDenied) => DeviceErrorKind::AccessDenied,
            serialport::ErrorKind::Io(ErrorKind::TimedOut) => DeviceErrorKind::Timeout,
            serialport::ErrorKind::Io(_) => DeviceErrorKind::Backend,
            serialport::ErrorKind::Unknown => DeviceErrorKind::Unknown,
        };
        IoError::Device(DeviceError::new(kind, err.description))
    }
}

/// 列出系统中的串口名
pub fn available_ports() -> Result<Vec<String>, IoError> {
    Ok(serialport::available_ports()?
        .into_iter()
        .map(|p| p.port_name)
        .collect())
}

fn read_port(port: &mut dyn SerialPort, buf: &mut [u8]) -> Result<usize, IoError> {
    match port.read(buf) {
        Ok(n) => Ok(n),
        Err(e) if e.kind() == ErrorKind::TimedOut => Ok(0),
        Err(e) if e.kind() == ErrorKind::Interrupted => Ok(0),
        Err(e) => Err(e.into()),
    }
}

fn write_port(port: &mut dyn SerialPort, buf: &[u8]) -> Result<usize, IoError> {
    port.write_all(buf)?;
    port.flush()?;
    Ok(buf.len())
}

/// 串口传输
pub struct SerialTransport {
    port_name: String,
    baud_rate: u32,
    read_timeout: Duration,
    port: Option<Box<dyn SerialPort>>,
}

impl SerialTransport {
    pub fn new(port_name: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate,
            read_timeout: DEFAULT_READ_TIMEOUT,
            port: None,
        }
    }

    /// 设置读取超时（连接前调用）
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    fn port_mut(&mut self) -> Result<&mut Box<dyn SerialPort>, IoError> {
        self.port.as_mut().ok_or(IoError::NotConnected)
    }
}

impl Transport for SerialTransport {
    fn connect(&mut self) -> Result<(), IoError> {
        if self.port.is_some() {
            return Ok(());
        }
        if self.port_name.is_empty() {
            return Err(IoError::NotConfigured(String::from("serial port name is empty")));
        }

        let port = serialport::new(&self.port_name, self.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(self.read_timeout)
            .open()?;

        if let Err(e) = port.clear(serialport::ClearBuffer::All) {
            warn!("Failed to clear serial buffers on {}: {}", self.port_name, e);
        }

        debug!("Serial port {} opened at {} baud", self.port_name, self.baud_rate);
        self.port = Some(port);
        Ok(())
    }

    fn disconnect(&mut self) {
        if self.port.take().is_some() {
            debug!("Serial port {} closed", self.port_name);
        }
    }

    fn is_connected(&self) -> bool {
        self.port.is_some()
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, IoError> {
        read_port(self.port_mut()?.as_mut(), buf)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize, IoError> {
        write_port(self.port_mut()?.as_mut(), buf)
    }

    fn split(&mut self) -> Result<(Box<dyn RxTransport>, Box<dyn TxTransport>), IoError> {
        let port = self.port_mut()?;
        let rx = SerialRx {
            port: port.try_clone()?,
        };
        let tx = SerialTx {
            port: port.try_clone()?,
        };
        Ok((Box::new(rx), Box::new(tx)))
    }

    fn describe(&self) -> String {
        format!("serial:{}@{}", self.port_name, self.baud_rate)
    }
}

/// 串口接收半部
pub struct SerialRx {
    port: Box<dyn SerialPort>,
}

impl RxTransport for SerialRx {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, IoError> {
        read_port(self.port.as_mut(), buf)
    }
}

/// 串口发送半部
pub struct SerialTx {
    port: Box<dyn SerialPort>,
}

impl TxTransport for SerialTx {
    fn write(&mut self, buf: &[u8]) -> Result<usize, IoError> {
        write_port(self.port.as_mut(), buf)
    }
}
