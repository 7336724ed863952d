//! FTDI USB 传输（`rusb`）
//!
//! 底盘通过一颗 FT232 桥接芯片暴露为 USB 设备（VID 0x0403 / PID 0xE729）。
//! 这里直接用 libusb 配置芯片：复位、波特率、8N1、关闭流控、延迟定时器 1 ms、
//! 清空收发缓冲区，然后在 Bulk 端点上收发原始字节。

pub mod protocol;

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::{Buf, BytesMut};
use rusb::{DeviceHandle, GlobalContext};
use tracing::{debug, trace, warn};

use self::protocol::*;
use crate::{
    CancelToken, DeviceError, DeviceErrorKind, IoError, RxTransport, Transport, TxTransport,
};

/// 默认读取超时
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(1000);

/// 默认写入超时
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_millis(1000);

const CONTROL_TIMEOUT: Duration = Duration::from_millis(1000);

/// 阻塞读取中检查取消令牌的间隔
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// 单次 Bulk IN 读取的缓冲区大小（64 / 512 的整数倍）
const RAW_READ_SIZE: usize = 4096;

impl From<rusb::Error> for IoError {
    fn from(err: rusb::Error) -> Self {
        let kind = match err {
            rusb::Error::NotFound => DeviceErrorKind::NotFound,
            rusb::Error::NoDevice => DeviceErrorKind::NoDevice,
            rusb::Error::Access => DeviceErrorKind::AccessDenied,
            rusb::Error::Busy => DeviceErrorKind::Busy,
            rusb::Error::Timeout => DeviceErrorKind::Timeout,
            rusb::Error::InvalidParam | rusb::Error::NotSupported => DeviceErrorKind::InvalidConfig,
            _ => DeviceErrorKind::Backend,
        };
        IoError::Device(DeviceError::new(kind, err.to_string()))
    }
}

/// 设备选择方式
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UsbSelector {
    /// 按 USB 序列号
    SerialNumber(String),
    /// 按产品描述字符串
    Description(String),
    /// 按枚举顺序（从 0 开始）
    Index(usize),
}

impl std::fmt::Display for UsbSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UsbSelector::SerialNumber(s) => write!(f, "serial number '{}'", s),
            UsbSelector::Description(d) => write!(f, "description '{}'", d),
            UsbSelector::Index(i) => write!(f, "index {}", i),
        }
    }
}

/// 枚举到的设备信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsbDeviceInfo {
    pub index: usize,
    pub bus_number: u8,
    pub address: u8,
    pub serial_number: Option<String>,
    pub description: Option<String>,
}

impl UsbDeviceInfo {
    fn matches(&self, selector: &UsbSelector) -> bool {
        match selector {
            UsbSelector::SerialNumber(s) => self.serial_number.as_deref() == Some(s.as_str()),
            UsbSelector::Description(d) => self.description.as_deref() == Some(d.as_str()),
            UsbSelector::Index(i) => self.index == *i,
        }
    }
}

fn is_rmp_device(vendor_id: u16, product_id: u16) -> bool {
    vendor_id == FTDI_VENDOR_ID && product_id == SEGWAY_RMP_PRODUCT_ID
}

/// 读取字符串描述符，索引为 0 或读取失败时返回 `None`
fn read_string(handle: &DeviceHandle<GlobalContext>, index: Option<u8>) -> Option<String> {
    match index {
        Some(idx) if idx != 0 => handle.read_string_descriptor_ascii(idx).ok(),
        _ => None,
    }
}

/// 扫描匹配的设备，返回 (信息, 设备) 列表
fn scan() -> Result<Vec<(UsbDeviceInfo, rusb::Device<GlobalContext>)>, IoError> {
    let mut found = Vec::new();

    for device in rusb::devices()?.iter() {
        let desc = match device.device_descriptor() {
            Ok(desc) => desc,
            Err(_) => continue,
        };
        if !is_rmp_device(desc.vendor_id(), desc.product_id()) {
            continue;
        }

        // 打不开的设备仍然计入索引，只是拿不到字符串
        let (serial_number, description) = match device.open() {
            Ok(handle) => (
                read_string(&handle, desc.serial_number_string_index()),
                read_string(&handle, desc.product_string_index()),
            ),
            Err(e) => {
                trace!("Cannot open device for enumeration: {}", e);
                (None, None)
            },
        };

        let info = UsbDeviceInfo {
            index: found.len(),
            bus_number: device.bus_number(),
            address: device.address(),
            serial_number,
            description,
        };
        found.push((info, device));
    }

    Ok(found)
}

/// 列出所有连接的 RMP USB 设备
pub fn enumerate_usb_devices() -> Result<Vec<UsbDeviceInfo>, IoError> {
    Ok(scan()?.into_iter().map(|(info, _)| info).collect())
}

/// 已打开并配置好的 FTDI 设备
struct FtdiDevice {
    handle: DeviceHandle<GlobalContext>,
    interface_number: u8,
    endpoint_in: u8,
    endpoint_out: u8,
    packet_size: usize,
}

impl FtdiDevice {
    fn open(selector: &UsbSelector) -> Result<Self, IoError> {
        let (info, device) = scan()?
            .into_iter()
            .find(|(info, _)| info.matches(selector))
            .ok_or_else(|| {
                DeviceError::new(
                    DeviceErrorKind::NotFound,
                    format!("No Segway RMP USB device with {}", selector),
                )
            })?;

        let config = device.config_descriptor(0)?;
        let interface = config
            .interfaces()
            .next()
            .and_then(|iface| iface.descriptors().next())
            .ok_or_else(|| DeviceError::new(DeviceErrorKind::InvalidConfig, "Device has no interface"))?;

        let mut endpoint_in = None;
        let mut endpoint_out = None;
        let mut packet_size = 64usize;
        for endpoint in interface.endpoint_descriptors() {
            if endpoint.transfer_type() != rusb::TransferType::Bulk {
                continue;
            }
            match endpoint.direction() {
                rusb::Direction::In => {
                    endpoint_in = Some(endpoint.address());
                    packet_size = endpoint.max_packet_size() as usize;
                },
                rusb::Direction::Out => endpoint_out = Some(endpoint.address()),
            }
        }
        let (endpoint_in, endpoint_out) = match (endpoint_in, endpoint_out) {
            (Some(i), Some(o)) => (i, o),
            _ => {
                return Err(DeviceError::new(
                    DeviceErrorKind::InvalidConfig,
                    "Device has no bulk endpoints",
                )
                .into());
            },
        };
        let interface_number = interface.interface_number();

        let mut handle = device.open()?;

        // ftdi_sio 会抢占接口，先卸载
        #[cfg(any(target_os = "linux", target_os = "macos"))]
        {
            if handle.kernel_driver_active(interface_number).unwrap_or(false) {
                handle.detach_kernel_driver(interface_number)?;
            }
        }
        handle.claim_interface(interface_number)?;

        debug!(
            "Opened Segway RMP USB device #{} (bus {}, address {}, serial {:?})",
            info.index, info.bus_number, info.address, info.serial_number
        );

        Ok(Self {
            handle,
            interface_number,
            endpoint_in,
            endpoint_out,
            packet_size,
        })
    }

    fn control_out(&self, request: u8, value: u16, index: u16) -> Result<(), IoError> {
        self.handle
            .write_control(FTDI_REQ_OUT, request, value, index, &[], CONTROL_TIMEOUT)?;
        Ok(())
    }

    /// 复位并配置串口参数
    fn configure(&self, baud_rate: u32, latency_ms: u8) -> Result<(), IoError> {
        let divisor = baud_divisor(baud_rate).ok_or_else(|| {
            DeviceError::new(
                DeviceErrorKind::InvalidConfig,
                format!("Unsupported baud rate {}", baud_rate),
            )
        })?;
        if divisor.actual_baud != baud_rate {
            debug!("Requested {} baud, chip will run at {}", baud_rate, divisor.actual_baud);
        }

        self.control_out(SIO_RESET_REQUEST, SIO_RESET_SIO, 0)?;
        self.control_out(SIO_SET_BAUDRATE_REQUEST, divisor.value, divisor.index)?;
        self.control_out(SIO_SET_DATA_REQUEST, SIO_DATA_8N1, 0)?;
        self.control_out(SIO_SET_FLOW_CTRL_REQUEST, 0, SIO_DISABLE_FLOW_CTRL)?;
        self.control_out(SIO_SET_LATENCY_TIMER_REQUEST, latency_ms as u16, 0)?;
        self.control_out(SIO_RESET_REQUEST, SIO_RESET_PURGE_RX, 0)?;
        self.control_out(SIO_RESET_REQUEST, SIO_RESET_PURGE_TX, 0)?;
        Ok(())
    }

    fn write(&self, buf: &[u8], timeout: Duration) -> Result<usize, IoError> {
        match self.handle.write_bulk(self.endpoint_out, buf, timeout) {
            Ok(n) => Ok(n),
            Err(rusb::Error::Timeout) => {
                // 超时后端点可能停在 STALL 状态
                if let Err(e) = self.handle.clear_halt(self.endpoint_out) {
                    warn!("Failed to clear endpoint halt after write timeout: {}", e);
                }
                Err(rusb::Error::Timeout.into())
            },
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for FtdiDevice {
    fn drop(&mut self) {
        // 设备可能已拔出，忽略错误
        let _ = self.handle.release_interface(self.interface_number);
        trace!("USB interface released");
    }
}

/// USB 接收半部
///
/// 芯片在没有数据时也会按延迟定时器返回只含状态字节的包，
/// 因此在超时时间内循环读取，直到拿到负载字节。
pub struct UsbRx {
    device: Arc<FtdiDevice>,
    raw: Vec<u8>,
    pending: BytesMut,
    timeout: Duration,
    cancel: Option<CancelToken>,
}

impl UsbRx {
    fn new(device: Arc<FtdiDevice>, timeout: Duration) -> Self {
        Self {
            device,
            raw: vec![0u8; RAW_READ_SIZE],
            pending: BytesMut::with_capacity(RAW_READ_SIZE),
            timeout,
            cancel: None,
        }
    }
}

impl RxTransport for UsbRx {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, IoError> {
        let deadline = Instant::now() + self.timeout;

        while self.pending.is_empty() {
            if self.cancel.as_ref().is_some_and(CancelToken::is_canceled) {
                return Err(IoError::Canceled);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(0);
            }

            match self.device.handle.read_bulk(
                self.device.endpoint_in,
                &mut self.raw,
                remaining.min(CANCEL_POLL_INTERVAL),
            ) {
                Ok(n) => strip_modem_status(&self.raw[..n], self.device.packet_size, &mut self.pending),
                Err(rusb::Error::Timeout) => {},
                Err(e) => return Err(e.into()),
            }
        }

        let n = self.pending.len().min(buf.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.advance(n);
        Ok(n)
    }

    fn set_cancel_token(&mut self, token: CancelToken) {
        self.cancel = Some(token);
    }
}

/// USB 发送半部
pub struct UsbTx {
    device: Arc<FtdiDevice>,
    timeout: Duration,
}

impl TxTransport for UsbTx {
    fn write(&mut self, buf: &[u8]) -> Result<usize, IoError> {
        self.device.write(buf, self.timeout)
    }
}

/// FTDI USB 传输
pub struct UsbTransport {
    selector: UsbSelector,
    baud_rate: u32,
    latency_ms: u8,
    read_timeout: Duration,
    write_timeout: Duration,
    device: Option<Arc<FtdiDevice>>,
    rx: Option<UsbRx>,
}

impl UsbTransport {
    pub fn new(selector: UsbSelector, baud_rate: u32) -> Self {
        Self {
            selector,
            baud_rate,
            latency_ms: DEFAULT_LATENCY_TIMER_MS,
            read_timeout: DEFAULT_READ_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            device: None,
            rx: None,
        }
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_latency_timer(mut self, latency_ms: u8) -> Self {
        self.latency_ms = latency_ms.max(1);
        self
    }

    pub fn selector(&self) -> &UsbSelector {
        &self.selector
    }

    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }
}

impl Transport for UsbTransport {
    fn connect(&mut self) -> Result<(), IoError> {
        if self.device.is_some() {
            return Ok(());
        }

        let device = FtdiDevice::open(&self.selector)?;
        device.configure(self.baud_rate, self.latency_ms)?;

        let device = Arc::new(device);
        self.rx = Some(UsbRx::new(device.clone(), self.read_timeout));
        self.device = Some(device);
        Ok(())
    }

    fn disconnect(&mut self) {
        self.rx = None;
        if self.device.take().is_some() {
            debug!("Segway RMP USB device ({}) closed", self.selector);
        }
    }

    fn is_connected(&self) -> bool {
        self.device.is_some()
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, IoError> {
        self.rx.as_mut().ok_or(IoError::NotConnected)?.read(buf)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize, IoError> {
        self.device
            .as_ref()
            .ok_or(IoError::NotConnected)?
            .write(buf, self.write_timeout)
    }

    fn split(&mut self) -> Result<(Box<dyn RxTransport>, Box<dyn TxTransport>), IoError> {
        let device = self.device.as_ref().ok_or(IoError::NotConnected)?;
        let rx = UsbRx::new(device.clone(), self.read_timeout);
        let tx = UsbTx {
            device: device.clone(),
            timeout: self.write_timeout,
        };
        Ok((Box::new(rx), Box::new(tx)))
    }

    fn describe(&self) -> String {
        format!("usb:{}@{}", self.selector, self.baud_rate)
    }
}
