//! Segway RMP 驱动门面
//!
//! 生命周期：构造 → 配置接口 → `connect` → 收发 → `disconnect`。
//! 指令方法只需要 `&self`，可以把驱动放进 `Arc` 在多个线程（包括回调内部）发送指令。

use std::sync::Arc;

use parking_lot::Mutex;
use rmp_io::{FrameWriter, Transport};
use rmp_protocol::{
    ConfigCommand, ControllerGainSchedule, MotionCommand, OperationalMode, RmpFrame,
    ShutdownCommand, StatusSnapshot, Timestamp, VehicleProfile, VehicleType,
    reset_all_integrators_frames,
};
use tracing::{debug, info, warn};

use crate::config::InterfaceType;
use crate::error::DriverError;
use crate::hooks::LogLevel;
use crate::metrics::MetricsSnapshot;
use crate::pipeline::{PipelineConfig, PipelineContext, TelemetryPipeline};

/// Segway RMP 驱动
///
/// ```no_run
/// use rmp_driver::{InterfaceType, SegwayRmp};
/// use rmp_protocol::VehicleType;
///
/// let mut rmp = SegwayRmp::new(InterfaceType::Serial, VehicleType::Rmp200)?;
/// rmp.configure_serial("/dev/ttyUSB0", 460_800)?;
/// rmp.set_status_callback(|status| println!("{}", status));
/// rmp.connect(true)?;
/// rmp.move_velocity(0.2, 0.0)?;
/// # Ok::<(), rmp_driver::DriverError>(())
/// ```
pub struct SegwayRmp {
    /// 自定义传输时为 `None`
    interface: Option<InterfaceType>,
    vehicle: VehicleType,
    profile: VehicleProfile,
    pipeline_config: PipelineConfig,
    /// 只在 `&mut self` 方法中通过 `get_mut` 访问
    transport: Mutex<Option<Box<dyn Transport>>>,
    writer: Mutex<Option<FrameWriter>>,
    pipeline: Option<TelemetryPipeline>,
    ctx: Arc<PipelineContext>,
}

impl SegwayRmp {
    /// 按接口类型创建驱动，之后需要调用对应的 `configure_*`
    ///
    /// CAN 和以太网返回配置错误。
    pub fn new(interface: InterfaceType, vehicle: VehicleType) -> Result<Self, DriverError> {
        if !interface.is_supported() {
            return Err(DriverError::Configuration(format!(
                "Interface type '{}' is not supported",
                interface
            )));
        }
        debug!("Creating RMP driver: interface={}, vehicle={}", interface, vehicle);
        Ok(Self::build(Some(interface), vehicle, None))
    }

    /// 使用已经构造好的传输创建驱动
    pub fn with_transport(transport: Box<dyn Transport>, vehicle: VehicleType) -> Self {
        debug!(
            "Creating RMP driver on {} transport, vehicle={}",
            transport.describe(),
            vehicle
        );
        Self::build(None, vehicle, Some(transport))
    }

    fn build(
        interface: Option<InterfaceType>,
        vehicle: VehicleType,
        transport: Option<Box<dyn Transport>>,
    ) -> Self {
        Self {
            interface,
            vehicle,
            profile: vehicle.profile(),
            pipeline_config: PipelineConfig::default(),
            transport: Mutex::new(transport),
            writer: Mutex::new(None),
            pipeline: None,
            ctx: Arc::new(PipelineContext::new()),
        }
    }

    pub fn vehicle_type(&self) -> VehicleType {
        self.vehicle
    }

    pub fn vehicle_profile(&self) -> &VehicleProfile {
        &self.profile
    }

    /// 接口类型；自定义传输返回 `None`
    pub fn interface_type(&self) -> Option<InterfaceType> {
        self.interface
    }

    pub fn pipeline_config(&self) -> &PipelineConfig {
        &self.pipeline_config
    }

    /// 设置流水线参数，下次 `connect` 生效
    pub fn set_pipeline_config(&mut self, config: PipelineConfig) -> Result<(), DriverError> {
        config.validate()?;
        self.pipeline_config = config;
        Ok(())
    }

    // ========================================================================
    // 接口配置
    // ========================================================================

    fn expect_interface(&self, expected: InterfaceType) -> Result<(), DriverError> {
        if self.is_connected() {
            return Err(DriverError::Configuration(
                "Cannot reconfigure the interface while connected".into(),
            ));
        }
        match self.interface {
            Some(actual) if actual == expected => Ok(()),
            Some(actual) => Err(DriverError::Configuration(format!(
                "Cannot configure {} on a driver created for {}",
                expected, actual
            ))),
            None => Err(DriverError::Configuration(
                "Driver was created with a custom transport".into(),
            )),
        }
    }

    pub(crate) fn install_transport(
        &mut self,
        expected: InterfaceType,
        transport: Box<dyn Transport>,
    ) -> Result<(), DriverError> {
        self.expect_interface(expected)?;
        debug!("Configured {} transport: {}", expected, transport.describe());
        *self.transport.get_mut() = Some(transport);
        Ok(())
    }

    /// 配置串口
    #[cfg(feature = "serial")]
    pub fn configure_serial(&mut self, port: &str, baud_rate: u32) -> Result<(), DriverError> {
        let transport = rmp_io::SerialTransport::new(port, baud_rate);
        self.install_transport(InterfaceType::Serial, Box::new(transport))
    }

    #[cfg(feature = "usb")]
    fn configure_usb(
        &mut self,
        selector: rmp_io::UsbSelector,
        baud_rate: u32,
    ) -> Result<(), DriverError> {
        let transport = rmp_io::UsbTransport::new(selector, baud_rate);
        self.install_transport(InterfaceType::Usb, Box::new(transport))
    }

    /// 按 USB 序列号选择设备
    #[cfg(feature = "usb")]
    pub fn configure_usb_by_serial(
        &mut self,
        serial_number: &str,
        baud_rate: u32,
    ) -> Result<(), DriverError> {
        self.configure_usb(rmp_io::UsbSelector::SerialNumber(serial_number.into()), baud_rate)
    }

    /// 按产品描述选择设备
    #[cfg(feature = "usb")]
    pub fn configure_usb_by_description(
        &mut self,
        description: &str,
        baud_rate: u32,
    ) -> Result<(), DriverError> {
        self.configure_usb(rmp_io::UsbSelector::Description(description.into()), baud_rate)
    }

    /// 按枚举顺序选择设备
    #[cfg(feature = "usb")]
    pub fn configure_usb_by_index(&mut self, index: usize, baud_rate: u32) -> Result<(), DriverError> {
        self.configure_usb(rmp_io::UsbSelector::Index(index), baud_rate)
    }

    // ========================================================================
    // 连接
    // ========================================================================

    /// 打开传输并启动遥测流水线
    ///
    /// `reset_integrators` 为真时在连接后立即复位全部积分器。已连接时直接返回。
    pub fn connect(&mut self, reset_integrators: bool) -> Result<(), DriverError> {
        if self.is_connected() {
            return Ok(());
        }

        let transport = self.transport.get_mut().as_mut().ok_or_else(|| {
            DriverError::Configuration(
                "Interface not configured, call a configure_* method before connect".into(),
            )
        })?;

        transport.connect().map_err(DriverError::Connection)?;
        let (rx, tx) = match transport.split() {
            Ok(halves) => halves,
            Err(e) => {
                transport.disconnect();
                return Err(DriverError::Connection(e));
            },
        };
        let description = transport.describe();

        self.ctx.clear_latest();
        let pipeline = match TelemetryPipeline::start(
            rx,
            self.profile,
            self.ctx.clone(),
            &self.pipeline_config,
        ) {
            Ok(pipeline) => pipeline,
            Err(e) => {
                transport.disconnect();
                return Err(e);
            },
        };
        self.pipeline = Some(pipeline);
        *self.writer.lock() = Some(FrameWriter::new(tx));

        info!("Connected to Segway RMP ({}) over {}", self.vehicle, description);
        self.ctx
            .callbacks
            .log(LogLevel::Info, &format!("Connected over {}", description));

        if reset_integrators {
            self.reset_all_integrators()?;
        }
        Ok(())
    }

    /// 停止流水线并关闭传输；幂等
    pub fn disconnect(&mut self) {
        let was_connected = self.writer.lock().take().is_some();

        if let Some(mut pipeline) = self.pipeline.take() {
            pipeline.stop();
        }
        if let Some(transport) = self.transport.get_mut().as_mut() {
            transport.disconnect();
        }

        if was_connected {
            info!("Disconnected from Segway RMP");
            self.ctx.callbacks.log(LogLevel::Info, "Disconnected");
        }
    }

    pub fn is_connected(&self) -> bool {
        self.writer.lock().is_some()
    }

    /// 两个工作线程是否都还在运行；未连接时返回 `false`
    pub fn is_healthy(&self) -> bool {
        self.pipeline.as_ref().is_some_and(|p| p.is_healthy())
    }

    // ========================================================================
    // 指令
    // ========================================================================

    fn send(&self, frames: &[RmpFrame]) -> Result<(), DriverError> {
        let mut guard = self.writer.lock();
        let writer = guard
            .as_mut()
            .ok_or_else(|| DriverError::Command("Not connected to the vehicle".into()))?;
        writer.write_frames(frames).map_err(|e| {
            warn!("Command write failed: {}", e);
            DriverError::Write(e)
        })
    }

    /// 速度指令：线速度（米/秒）、角速度（度/秒）
    pub fn move_velocity(&self, linear_mps: f64, angular_dps: f64) -> Result<(), DriverError> {
        let command = MotionCommand::from_velocity(linear_mps, angular_dps, &self.profile);
        self.send(&[command.to_frame()])
    }

    /// 直接以计数发送速度指令（不做限幅）
    pub fn move_counts(&self, linear_counts: i16, angular_counts: i16) -> Result<(), DriverError> {
        self.send(&[MotionCommand::from_counts(linear_counts, angular_counts).to_frame()])
    }

    /// 让底盘断电
    pub fn shutdown(&self) -> Result<(), DriverError> {
        self.send(&[ShutdownCommand.to_frame()])
    }

    pub fn set_operational_mode(&self, mode: OperationalMode) -> Result<(), DriverError> {
        self.send(&[ConfigCommand::operational_mode(mode).to_frame()])
    }

    pub fn set_controller_gain_schedule(
        &self,
        schedule: ControllerGainSchedule,
    ) -> Result<(), DriverError> {
        self.send(&[ConfigCommand::gain_schedule(schedule).to_frame()])
    }

    pub fn set_balance_mode_locking(&self, locked: bool) -> Result<(), DriverError> {
        self.send(&[ConfigCommand::balance_mode_locking(locked).to_frame()])
    }

    /// 依次复位右轮、左轮、偏航、前后四个积分器
    pub fn reset_all_integrators(&self) -> Result<(), DriverError> {
        self.send(&reset_all_integrators_frames())
    }

    /// 最大速度比例，取值 [0, 1]，超出范围会被截断
    pub fn set_max_velocity_scale_factor(&self, scalar: f64) -> Result<(), DriverError> {
        self.send(&[ConfigCommand::max_velocity_scale(scalar).to_frame()])
    }

    pub fn set_max_acceleration_scale_factor(&self, scalar: f64) -> Result<(), DriverError> {
        self.send(&[ConfigCommand::max_acceleration_scale(scalar).to_frame()])
    }

    pub fn set_max_turn_scale_factor(&self, scalar: f64) -> Result<(), DriverError> {
        self.send(&[ConfigCommand::max_turn_scale(scalar).to_frame()])
    }

    pub fn set_current_limit_scale_factor(&self, scalar: f64) -> Result<(), DriverError> {
        self.send(&[ConfigCommand::current_limit_scale(scalar).to_frame()])
    }

    // ========================================================================
    // 回调与状态
    // ========================================================================

    pub fn set_status_callback<F>(&self, callback: F)
    where
        F: Fn(StatusSnapshot) + Send + Sync + 'static,
    {
        self.ctx.callbacks.set_status(Arc::new(callback));
    }

    pub fn set_log_callback<F>(&self, level: LogLevel, callback: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.ctx.callbacks.set_log(level, Arc::new(callback));
    }

    pub fn set_timestamp_callback<F>(&self, callback: F)
    where
        F: Fn() -> Timestamp + Send + Sync + 'static,
    {
        self.ctx.callbacks.set_timestamp(Arc::new(callback));
    }

    pub fn set_exception_callback<F>(&self, callback: F)
    where
        F: Fn(&DriverError) + Send + Sync + 'static,
    {
        self.ctx.callbacks.set_exception(Arc::new(callback));
    }

    /// 最近一个完整周期的状态，连接后尚未收到完整周期时为 `None`
    pub fn last_status(&self) -> Option<StatusSnapshot> {
        self.ctx.latest()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.ctx.metrics.snapshot()
    }

    pub fn reset_metrics(&self) {
        self.ctx.metrics.reset();
    }
}

impl Drop for SegwayRmp {
    fn drop(&mut self) {
        self.disconnect();
    }
}
