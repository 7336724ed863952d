//! Builder 模式实现
//!
//! 链式构造 `SegwayRmp`，也可以直接从 [`DriverConfig`] 构造。

use rmp_io::Transport;
use rmp_protocol::VehicleType;

use crate::config::{DEFAULT_BAUD_RATE, DriverConfig, InterfaceType, SerialConfig, UsbConfig};
use crate::error::DriverError;
use crate::pipeline::PipelineConfig;
use crate::rmp::SegwayRmp;

/// Segway RMP Builder
///
/// ```no_run
/// use rmp_driver::RmpBuilder;
/// use rmp_protocol::VehicleType;
///
/// let mut rmp = RmpBuilder::new()
///     .vehicle(VehicleType::Rmp400)
///     .serial_port("/dev/ttyUSB0")
///     .build()?;
/// rmp.connect(true)?;
/// # Ok::<(), rmp_driver::DriverError>(())
/// ```
pub struct RmpBuilder {
    vehicle: VehicleType,
    interface: InterfaceType,
    serial: Option<SerialConfig>,
    usb: Option<UsbConfig>,
    pipeline_config: PipelineConfig,
    transport: Option<Box<dyn Transport>>,
}

impl RmpBuilder {
    pub fn new() -> Self {
        Self {
            vehicle: VehicleType::default(),
            interface: InterfaceType::default(),
            serial: None,
            usb: None,
            pipeline_config: PipelineConfig::default(),
            transport: None,
        }
    }

    /// 从配置文件内容构造
    pub fn from_config(config: &DriverConfig) -> Self {
        Self {
            vehicle: config.vehicle,
            interface: config.interface,
            serial: config.serial.clone(),
            usb: config.usb.clone(),
            pipeline_config: config.pipeline.clone(),
            transport: None,
        }
    }

    pub fn vehicle(mut self, vehicle: VehicleType) -> Self {
        self.vehicle = vehicle;
        self
    }

    pub fn interface(mut self, interface: InterfaceType) -> Self {
        self.interface = interface;
        self
    }

    /// 使用串口（同时把接口类型设为串口）
    pub fn serial_port(mut self, port: impl Into<String>) -> Self {
        self.interface = InterfaceType::Serial;
        let baud_rate = self.serial.as_ref().map_or(DEFAULT_BAUD_RATE, |s| s.baud_rate);
        let mut serial = SerialConfig::new(port);
        serial.baud_rate = baud_rate;
        self.serial = Some(serial);
        self
    }

    pub fn usb_serial_number(mut self, serial_number: impl Into<String>) -> Self {
        self.interface = InterfaceType::Usb;
        let usb = self.usb_selector_reset();
        usb.serial_number = Some(serial_number.into());
        self
    }

    pub fn usb_description(mut self, description: impl Into<String>) -> Self {
        self.interface = InterfaceType::Usb;
        let usb = self.usb_selector_reset();
        usb.description = Some(description.into());
        self
    }

    pub fn usb_index(mut self, index: usize) -> Self {
        self.interface = InterfaceType::Usb;
        let usb = self.usb_selector_reset();
        usb.index = Some(index);
        self
    }

    fn usb_selector_reset(&mut self) -> &mut UsbConfig {
        let usb = self.usb.get_or_insert_with(UsbConfig::default);
        usb.serial_number = None;
        usb.description = None;
        usb.index = None;
        usb
    }

    /// 波特率，作用于已选择的串口或 USB 接口
    pub fn baud_rate(mut self, baud_rate: u32) -> Self {
        if let Some(serial) = self.serial.as_mut() {
            serial.baud_rate = baud_rate;
        }
        if self.interface == InterfaceType::Usb || self.usb.is_some() {
            self.usb.get_or_insert_with(UsbConfig::default).baud_rate = baud_rate;
        }
        self
    }

    pub fn pipeline_config(mut self, config: PipelineConfig) -> Self {
        self.pipeline_config = config;
        self
    }

    /// 使用自定义传输，忽略接口设置
    pub fn transport(mut self, transport: Box<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// 构造驱动（不连接）
    ///
    /// USB 接口未指定设备时选择第一个匹配的设备。
    pub fn build(self) -> Result<SegwayRmp, DriverError> {
        let mut rmp = match self.transport {
            Some(transport) => SegwayRmp::with_transport(transport, self.vehicle),
            None => {
                let mut rmp = SegwayRmp::new(self.interface, self.vehicle)?;
                match self.interface {
                    InterfaceType::Serial => Self::apply_serial(&mut rmp, self.serial)?,
                    InterfaceType::Usb => Self::apply_usb(&mut rmp, self.usb)?,
                    InterfaceType::Can | InterfaceType::Ethernet => {},
                }
                rmp
            },
        };
        rmp.set_pipeline_config(self.pipeline_config)?;
        Ok(rmp)
    }

    #[cfg(feature = "serial")]
    fn apply_serial(rmp: &mut SegwayRmp, serial: Option<SerialConfig>) -> Result<(), DriverError> {
        let serial = serial.ok_or_else(|| {
            DriverError::Configuration("Serial interface selected but no port given".into())
        })?;
        let transport = rmp_io::SerialTransport::new(serial.port, serial.baud_rate)
            .with_read_timeout(std::time::Duration::from_millis(serial.read_timeout_ms));
        rmp.install_transport(InterfaceType::Serial, Box::new(transport))
    }

    #[cfg(not(feature = "serial"))]
    fn apply_serial(_rmp: &mut SegwayRmp, _serial: Option<SerialConfig>) -> Result<(), DriverError> {
        Err(DriverError::Configuration(
            "Serial support is not enabled (feature \"serial\")".into(),
        ))
    }

    #[cfg(feature = "usb")]
    fn apply_usb(rmp: &mut SegwayRmp, usb: Option<UsbConfig>) -> Result<(), DriverError> {
        let usb = usb.unwrap_or_default();
        match (usb.serial_number, usb.description, usb.index) {
            (Some(serial), None, None) => rmp.configure_usb_by_serial(&serial, usb.baud_rate),
            (None, Some(description), None) => {
                rmp.configure_usb_by_description(&description, usb.baud_rate)
            },
            (None, None, index) => rmp.configure_usb_by_index(index.unwrap_or(0), usb.baud_rate),
            _ => Err(DriverError::Configuration(
                "usb: set only one of serial_number, description or index".into(),
            )),
        }
    }

    #[cfg(not(feature = "usb"))]
    fn apply_usb(_rmp: &mut SegwayRmp, _usb: Option<UsbConfig>) -> Result<(), DriverError> {
        Err(DriverError::Configuration(
            "USB support is not enabled (feature \"usb\")".into(),
        ))
    }
}

impl Default for RmpBuilder {
    fn default() -> Self {
        Self::new()
    }
}
