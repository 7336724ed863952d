//! 遥测帧解析与状态快照组装
//!
//! 底盘以固定周期发送一组遥测帧（0x0400 ~ 0x0407），每帧只携带状态的一部分。
//! [`StatusAssembler`] 把一个周期内的帧合并成一个 [`StatusSnapshot`]，
//! 收到周期结束帧 0x0407 时交出完整快照。

use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::ids::*;
use crate::profile::VehicleProfile;
use crate::{RmpFrame, bytes_to_i16_be, bytes_to_i32_word_swapped, bytes_to_u16_be};

// ============================================================================
// 枚举类型定义
// ============================================================================

/// 运行模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum OperationalMode {
    #[default]
    Disabled,
    Tractor,
    Balanced,
    PowerDown,
    /// 固件上报了未定义的值
    Unknown(i16),
}

impl OperationalMode {
    /// 线上数值
    pub fn value(&self) -> i16 {
        match self {
            OperationalMode::Disabled => 0,
            OperationalMode::Tractor => 1,
            OperationalMode::Balanced => 2,
            OperationalMode::PowerDown => 3,
            OperationalMode::Unknown(v) => *v,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            OperationalMode::Disabled => "Disabled",
            OperationalMode::Tractor => "Tractor",
            OperationalMode::Balanced => "Balanced",
            OperationalMode::PowerDown => "Power Down",
            OperationalMode::Unknown(_) => "Unknown",
        }
    }
}

impl From<i16> for OperationalMode {
    fn from(value: i16) -> Self {
        match value {
            0 => OperationalMode::Disabled,
            1 => OperationalMode::Tractor,
            2 => OperationalMode::Balanced,
            3 => OperationalMode::PowerDown,
            other => OperationalMode::Unknown(other),
        }
    }
}

/// 控制器增益档位
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ControllerGainSchedule {
    #[default]
    Light,
    Tall,
    Heavy,
    Unknown(i16),
}

impl ControllerGainSchedule {
    pub fn value(&self) -> i16 {
        match self {
            ControllerGainSchedule::Light => 0,
            ControllerGainSchedule::Tall => 1,
            ControllerGainSchedule::Heavy => 2,
            ControllerGainSchedule::Unknown(v) => *v,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ControllerGainSchedule::Light => "Light",
            ControllerGainSchedule::Tall => "Tall",
            ControllerGainSchedule::Heavy => "Heavy",
            ControllerGainSchedule::Unknown(_) => "Unknown",
        }
    }
}

impl From<i16> for ControllerGainSchedule {
    fn from(value: i16) -> Self {
        match value {
            0 => ControllerGainSchedule::Light,
            1 => ControllerGainSchedule::Tall,
            2 => ControllerGainSchedule::Heavy,
            other => ControllerGainSchedule::Unknown(other),
        }
    }
}

/// 电机状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MotorStatus {
    /// 急停（默认）
    #[default]
    EStopped,
    /// 电机已使能
    Enabled,
}

impl MotorStatus {
    pub fn is_enabled(&self) -> bool {
        matches!(self, MotorStatus::Enabled)
    }
}

// ============================================================================
// 时间戳
// ============================================================================

/// 主机侧时间戳（秒 + 纳秒）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Timestamp {
    pub sec: u64,
    pub nsec: u32,
}

impl Timestamp {
    pub fn new(sec: u64, nsec: u32) -> Self {
        Self { sec, nsec }
    }

    /// 当前墙钟时间；系统时间早于 UNIX 纪元时返回零值
    pub fn now() -> Self {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(Self::from)
            .unwrap_or_default()
    }

    pub fn as_secs_f64(&self) -> f64 {
        self.sec as f64 + self.nsec as f64 * 1e-9
    }
}

impl From<Duration> for Timestamp {
    fn from(d: Duration) -> Self {
        Self {
            sec: d.as_secs(),
            nsec: d.subsec_nanos(),
        }
    }
}

// ============================================================================
// 状态快照
// ============================================================================

/// 一个遥测周期的完整状态
///
/// 角度单位为度，角速度为度/秒，速度为米/秒，位移为米，扭矩为牛·米，电压为伏。
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StatusSnapshot {
    /// 周期起始帧到达时的主机时间
    pub timestamp: Timestamp,
    pub pitch: f32,
    pub pitch_rate: f32,
    pub roll: f32,
    pub roll_rate: f32,
    pub left_wheel_speed: f32,
    pub right_wheel_speed: f32,
    pub yaw_rate: f32,
    /// 伺服帧计数（秒）
    pub servo_frames: f32,
    pub integrated_left_wheel_position: f32,
    pub integrated_right_wheel_position: f32,
    pub integrated_forward_position: f32,
    /// 累计转向角（度）
    pub integrated_turn_position: f32,
    pub left_motor_torque: f32,
    pub right_motor_torque: f32,
    pub ui_battery_voltage: f32,
    pub powerbase_battery_voltage: f32,
    pub operational_mode: OperationalMode,
    pub controller_gain_schedule: ControllerGainSchedule,
    pub commanded_velocity: f32,
    pub commanded_yaw_rate: f32,
    pub motor_status: MotorStatus,
    /// 至少有一个数据帧写入过此快照
    pub touched: bool,
}

impl fmt::Display for StatusSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Segway RMP Status:")?;
        writeln!(f, "  Timestamp: {}.{:09}", self.timestamp.sec, self.timestamp.nsec)?;
        writeln!(f, "  Pitch: {:.4} deg, Pitch Rate: {:.4} deg/s", self.pitch, self.pitch_rate)?;
        writeln!(f, "  Roll: {:.4} deg, Roll Rate: {:.4} deg/s", self.roll, self.roll_rate)?;
        writeln!(
            f,
            "  Wheel Speed: left {:.4} m/s, right {:.4} m/s",
            self.left_wheel_speed, self.right_wheel_speed
        )?;
        writeln!(f, "  Yaw Rate: {:.4} deg/s", self.yaw_rate)?;
        writeln!(f, "  Servo Frames: {:.2} s", self.servo_frames)?;
        writeln!(
            f,
            "  Integrated Wheel Position: left {:.4} m, right {:.4} m",
            self.integrated_left_wheel_position, self.integrated_right_wheel_position
        )?;
        writeln!(
            f,
            "  Integrated Forward Position: {:.4} m",
            self.integrated_forward_position
        )?;
        writeln!(
            f,
            "  Integrated Turn Position: {:.4} deg",
            self.integrated_turn_position
        )?;
        writeln!(
            f,
            "  Motor Torque: left {:.4} Nm, right {:.4} Nm",
            self.left_motor_torque, self.right_motor_torque
        )?;
        writeln!(
            f,
            "  Operational Mode: {} ({})",
            self.operational_mode.name(),
            self.operational_mode.value()
        )?;
        writeln!(
            f,
            "  Controller Gain Schedule: {} ({})",
            self.controller_gain_schedule.name(),
            self.controller_gain_schedule.value()
        )?;
        writeln!(f, "  UI Battery Voltage: {:.3} V", self.ui_battery_voltage)?;
        writeln!(
            f,
            "  Powerbase Battery Voltage: {:.3} V",
            self.powerbase_battery_voltage
        )?;
        writeln!(
            f,
            "  Commanded Velocity: {:.4} m/s, Commanded Yaw Rate: {:.4}",
            self.commanded_velocity, self.commanded_yaw_rate
        )?;
        write!(
            f,
            "  Motor Status: {}",
            if self.motor_status.is_enabled() {
                "Motors Enabled"
            } else {
                "E-Stopped"
            }
        )
    }
}

// ============================================================================
// 帧解析
// ============================================================================

#[inline]
fn i16_at(payload: &[u8; 8], offset: usize) -> f64 {
    bytes_to_i16_be([payload[offset], payload[offset + 1]]) as f64
}

#[inline]
fn u16_at(payload: &[u8; 8], offset: usize) -> f64 {
    bytes_to_u16_be([payload[offset], payload[offset + 1]]) as f64
}

#[inline]
fn i32_at(payload: &[u8; 8], offset: usize) -> f64 {
    bytes_to_i32_word_swapped([
        payload[offset],
        payload[offset + 1],
        payload[offset + 2],
        payload[offset + 3],
    ]) as f64
}

/// 把一帧合并进快照
///
/// 返回 `true` 表示收到了周期结束帧，快照已完整。
/// 通道 B 的帧、命令帧和未知 ID 被忽略；0x0400 只打时间戳，不标记 `touched`。
/// `now` 只在 0x0400 帧上被调用。
pub fn apply_frame(
    frame: &RmpFrame,
    snapshot: &mut StatusSnapshot,
    profile: &VehicleProfile,
    now: impl FnOnce() -> Timestamp,
) -> bool {
    if frame.channel == CHANNEL_B {
        return false;
    }
    match FrameType::from_id(frame.message_id) {
        FrameType::Telemetry | FrameType::MotorStatus => {},
        FrameType::Command | FrameType::Unknown => return false,
    }

    let data = &frame.payload;
    match frame.message_id {
        ID_CYCLE_START => {
            snapshot.timestamp = now();
            return false;
        },
        ID_PITCH_ROLL => {
            snapshot.pitch = (i16_at(data, 0) / profile.dps_to_counts) as f32;
            snapshot.pitch_rate = (i16_at(data, 2) / profile.dps_to_counts) as f32;
            snapshot.roll = (i16_at(data, 4) / profile.dps_to_counts) as f32;
            snapshot.roll_rate = (i16_at(data, 6) / profile.dps_to_counts) as f32;
        },
        ID_WHEEL_SPEED => {
            snapshot.left_wheel_speed = (i16_at(data, 0) / profile.mps_to_counts) as f32;
            snapshot.right_wheel_speed = (i16_at(data, 2) / profile.mps_to_counts) as f32;
            snapshot.yaw_rate = (i16_at(data, 4) / profile.dps_to_counts) as f32;
            snapshot.servo_frames = (u16_at(data, 6) * 0.01) as f32;
        },
        ID_WHEEL_POSITION => {
            snapshot.integrated_left_wheel_position =
                (i32_at(data, 0) / profile.meters_to_counts) as f32;
            snapshot.integrated_right_wheel_position =
                (i32_at(data, 4) / profile.meters_to_counts) as f32;
        },
        ID_BODY_POSITION => {
            snapshot.integrated_forward_position =
                (i32_at(data, 0) / profile.meters_to_counts) as f32;
            snapshot.integrated_turn_position =
                (i32_at(data, 4) / profile.rev_to_counts * 360.0) as f32;
        },
        ID_MOTOR_TORQUE => {
            snapshot.left_motor_torque = (i16_at(data, 0) / profile.torque_to_counts) as f32;
            snapshot.right_motor_torque = (i16_at(data, 2) / profile.torque_to_counts) as f32;
        },
        ID_MODE_BATTERY => {
            snapshot.operational_mode = bytes_to_i16_be([data[0], data[1]]).into();
            snapshot.controller_gain_schedule = bytes_to_i16_be([data[2], data[3]]).into();
            snapshot.ui_battery_voltage = (u16_at(data, 4) * 0.0125 + 1.4) as f32;
            snapshot.powerbase_battery_voltage = (u16_at(data, 6) / 4.0) as f32;
        },
        ID_CYCLE_END => {
            snapshot.commanded_velocity = (i16_at(data, 0) / profile.mps_to_counts) as f32;
            snapshot.commanded_yaw_rate = (i16_at(data, 2) / 1024.0) as f32;
            snapshot.touched = true;
            return true;
        },
        ID_MOTOR_STATUS => {
            snapshot.motor_status = if data[3] == 0x80 {
                MotorStatus::Enabled
            } else {
                MotorStatus::EStopped
            };
        },
        _ => return false,
    }

    snapshot.touched = true;
    false
}

/// 多帧状态组装器
///
/// 持有正在组装的快照；周期完成时把快照整体移交给调用方并换上一个新的空快照。
#[derive(Debug, Clone, Default)]
pub struct StatusAssembler {
    profile: VehicleProfile,
    working: StatusSnapshot,
}

impl StatusAssembler {
    pub fn new(profile: VehicleProfile) -> Self {
        Self {
            profile,
            working: StatusSnapshot::default(),
        }
    }

    pub fn profile(&self) -> &VehicleProfile {
        &self.profile
    }

    /// 正在组装中的快照
    pub fn working(&self) -> &StatusSnapshot {
        &self.working
    }

    /// 合并一帧；周期完成时返回完整快照
    pub fn apply(
        &mut self,
        frame: &RmpFrame,
        now: impl FnOnce() -> Timestamp,
    ) -> Option<StatusSnapshot> {
        if apply_frame(frame, &mut self.working, &self.profile, now) {
            Some(std::mem::take(&mut self.working))
        } else {
            None
        }
    }

    /// 丢弃半个周期的数据
    pub fn reset(&mut self) {
        self.working = StatusSnapshot::default();
    }
}
