//! 消息 ID 与子命令常量
//!
//! 遥测帧 ID 为 12 位，从线上字节 4、5 拼出；命令帧 ID 以大端写入字节 6、7。

// ============================================================================
// 帧头常量
// ============================================================================

/// 帧头第一个字节
pub const FRAME_HEADER_0: u8 = 0xF0;

/// 帧头第二个字节
pub const FRAME_HEADER_1: u8 = 0x55;

/// 遥测通道 A（状态组装只处理此通道）
pub const CHANNEL_A: u8 = 0xAA;

/// 遥测通道 B（忽略）
pub const CHANNEL_B: u8 = 0xBB;

/// 命令帧使用的通道字节
pub const CHANNEL_COMMAND: u8 = 0x00;

// ============================================================================
// 遥测帧 ID 常量（一个周期从 0x0400 开始、到 0x0407 结束）
// ============================================================================

/// 周期起始，只用于打时间戳
pub const ID_CYCLE_START: u16 = 0x0400;

/// 俯仰/横滚角及角速度
pub const ID_PITCH_ROLL: u16 = 0x0401;

/// 左右轮速、偏航角速度、伺服帧计数
pub const ID_WHEEL_SPEED: u16 = 0x0402;

/// 左右轮累计位移
pub const ID_WHEEL_POSITION: u16 = 0x0403;

/// 前进/转向累计位移
pub const ID_BODY_POSITION: u16 = 0x0404;

/// 左右电机扭矩
pub const ID_MOTOR_TORQUE: u16 = 0x0405;

/// 运行模式、增益档位、电池电压
pub const ID_MODE_BATTERY: u16 = 0x0406;

/// 指令回显，周期结束
pub const ID_CYCLE_END: u16 = 0x0407;

/// 电机使能状态
pub const ID_MOTOR_STATUS: u16 = 0x0680;

// ============================================================================
// 命令帧 ID 常量
// ============================================================================

/// 运动指令 / 配置指令
pub const ID_MOTION_COMMAND: u16 = 0x0413;

/// 关机指令
pub const ID_SHUTDOWN_COMMAND: u16 = 0x0412;

// ============================================================================
// 配置子命令（写入负载字节 5，参数写入字节 7）
// ============================================================================

pub const CMD_MAX_VELOCITY_SCALE: u8 = 0x0A;
pub const CMD_MAX_ACCELERATION_SCALE: u8 = 0x0B;
pub const CMD_MAX_TURN_SCALE: u8 = 0x0C;
pub const CMD_GAIN_SCHEDULE: u8 = 0x0D;
pub const CMD_CURRENT_LIMIT_SCALE: u8 = 0x0E;
pub const CMD_BALANCE_LOCK: u8 = 0x0F;
pub const CMD_OPERATIONAL_MODE: u8 = 0x10;
pub const CMD_RESET_INTEGRATORS: u8 = 0x32;

// ============================================================================
// ID 分类枚举
// ============================================================================

/// 帧类型分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    /// 周期内遥测帧
    Telemetry,
    /// 电机状态帧
    MotorStatus,
    /// 命令帧
    Command,
    /// 未知类型
    Unknown,
}

impl FrameType {
    /// 根据消息 ID 判断帧类型
    pub fn from_id(id: u16) -> Self {
        match id {
            ID_CYCLE_START..=ID_CYCLE_END => FrameType::Telemetry,
            ID_MOTOR_STATUS => FrameType::MotorStatus,
            ID_SHUTDOWN_COMMAND | ID_MOTION_COMMAND => FrameType::Command,
            _ => FrameType::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_type_telemetry() {
        assert_eq!(FrameType::from_id(0x0400), FrameType::Telemetry);
        assert_eq!(FrameType::from_id(0x0403), FrameType::Telemetry);
        assert_eq!(FrameType::from_id(0x0407), FrameType::Telemetry);
    }

    #[test]
    fn test_frame_type_other() {
        assert_eq!(FrameType::from_id(0x0680), FrameType::MotorStatus);
        assert_eq!(FrameType::from_id(0x0412), FrameType::Command);
        assert_eq!(FrameType::from_id(0x0413), FrameType::Command);
        assert_eq!(FrameType::from_id(0x0408), FrameType::Unknown);
        assert_eq!(FrameType::from_id(0x0123), FrameType::Unknown);
    }
}
