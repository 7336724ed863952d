//! 控制帧构建
//!
//! 所有运动和配置指令共用消息 ID 0x0413：
//! - 运动指令：负载 0..2 为线速度计数，2..4 为角速度计数（均为大端 i16）
//! - 配置指令：负载字节 5 为子命令，字节 7 为参数，其余为 0
//!
//! 关机指令使用 0x0412，负载全 0。

use smallvec::SmallVec;

use crate::RmpFrame;
use crate::feedback::{ControllerGainSchedule, OperationalMode};
use crate::i16_to_bytes_be;
use crate::ids::*;
use crate::profile::VehicleProfile;

/// 一次操作产生的帧序列（通常 1 帧，复位全部积分器时 4 帧）
pub type CommandFrames = SmallVec<[RmpFrame; 4]>;

// ============================================================================
// 运动指令
// ============================================================================

/// 运动指令 (0x0413)
///
/// 计数值直接下发，不做限幅。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MotionCommand {
    pub linear_counts: i16,
    pub angular_counts: i16,
}

impl MotionCommand {
    /// 从计数值创建
    pub fn from_counts(linear_counts: i16, angular_counts: i16) -> Self {
        Self {
            linear_counts,
            angular_counts,
        }
    }

    /// 从物理量（米/秒，度/秒）创建
    ///
    /// 乘以车型常数后截断为 i16，超出范围时饱和到 i16 边界。
    pub fn from_velocity(linear_mps: f64, angular_dps: f64, profile: &VehicleProfile) -> Self {
        Self {
            linear_counts: (linear_mps * profile.mps_to_counts) as i16,
            angular_counts: (angular_dps * profile.dps_to_counts) as i16,
        }
    }

    pub fn to_frame(self) -> RmpFrame {
        let mut data = [0u8; 8];
        data[0..2].copy_from_slice(&i16_to_bytes_be(self.linear_counts));
        data[2..4].copy_from_slice(&i16_to_bytes_be(self.angular_counts));

        RmpFrame::new(ID_MOTION_COMMAND, CHANNEL_COMMAND, &data)
    }
}

// ============================================================================
// 配置指令
// ============================================================================

/// 积分器选择位
#[derive(Debug, Clone, Copy, PartialEq, Eq, num_enum::IntoPrimitive)]
#[repr(u8)]
pub enum Integrator {
    RightWheel = 0x01,
    LeftWheel = 0x02,
    Yaw = 0x04,
    ForeAft = 0x08,
}

impl Integrator {
    /// 复位全部积分器时的发送顺序
    pub const ALL: [Integrator; 4] = [
        Integrator::RightWheel,
        Integrator::LeftWheel,
        Integrator::Yaw,
        Integrator::ForeAft,
    ];
}

/// 把 [0, 1] 内的比例系数编码为参数字节
///
/// 先限幅到 [0, 1]，乘以倍率后向下取整，再取 i16 的低字节。
/// 倍率为 256 且系数为 1.0 时结果为 256，低字节是 0x00，与固件约定一致。
pub fn scale_factor_parameter(scalar: f64, multiplier: f64) -> u8 {
    let scaled = (scalar.clamp(0.0, 1.0) * multiplier).floor() as i16;
    (scaled & 0x00FF) as u8
}

/// 配置指令 (0x0413)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigCommand {
    /// 子命令（负载字节 5）
    pub sub_command: u8,
    /// 参数（负载字节 7）
    pub parameter: u8,
}

impl ConfigCommand {
    pub fn new(sub_command: u8, parameter: u8) -> Self {
        Self {
            sub_command,
            parameter,
        }
    }

    /// 设置运行模式
    pub fn operational_mode(mode: OperationalMode) -> Self {
        Self::new(CMD_OPERATIONAL_MODE, mode.value() as u8)
    }

    /// 设置增益档位
    pub fn gain_schedule(schedule: ControllerGainSchedule) -> Self {
        Self::new(CMD_GAIN_SCHEDULE, schedule.value() as u8)
    }

    /// 平衡模式锁定
    pub fn balance_mode_locking(locked: bool) -> Self {
        Self::new(CMD_BALANCE_LOCK, u8::from(locked))
    }

    /// 复位单个积分器
    pub fn reset_integrator(integrator: Integrator) -> Self {
        Self::new(CMD_RESET_INTEGRATORS, integrator.into())
    }

    /// 最大速度比例（×16）
    pub fn max_velocity_scale(scalar: f64) -> Self {
        Self::new(CMD_MAX_VELOCITY_SCALE, scale_factor_parameter(scalar, 16.0))
    }

    /// 最大加速度比例（×16）
    pub fn max_acceleration_scale(scalar: f64) -> Self {
        Self::new(CMD_MAX_ACCELERATION_SCALE, scale_factor_parameter(scalar, 16.0))
    }

    /// 最大转向比例（×16）
    pub fn max_turn_scale(scalar: f64) -> Self {
        Self::new(CMD_MAX_TURN_SCALE, scale_factor_parameter(scalar, 16.0))
    }

    /// 电流限制比例（×256）
    pub fn current_limit_scale(scalar: f64) -> Self {
        Self::new(CMD_CURRENT_LIMIT_SCALE, scale_factor_parameter(scalar, 256.0))
    }

    pub fn to_frame(self) -> RmpFrame {
        let mut data = [0u8; 8];
        data[5] = self.sub_command;
        data[7] = self.parameter;

        RmpFrame::new(ID_MOTION_COMMAND, CHANNEL_COMMAND, &data)
    }
}

/// 依次复位右轮、左轮、偏航、前后四个积分器
pub fn reset_all_integrators_frames() -> CommandFrames {
    Integrator::ALL
        .iter()
        .map(|&i| ConfigCommand::reset_integrator(i).to_frame())
        .collect()
}

// ============================================================================
// 关机指令
// ============================================================================

/// 关机指令 (0x0412)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ShutdownCommand;

impl ShutdownCommand {
    pub fn to_frame(self) -> RmpFrame {
        RmpFrame::new(ID_SHUTDOWN_COMMAND, CHANNEL_COMMAND, &[])
    }
}
