//! # RMP Protocol
//!
//! Segway RMP 底盘串行帧协议定义（无硬件依赖）
//!
//! ## 模块
//!
//! - `ids`: 消息 ID 与子命令常量
//! - `codec`: 18 字节帧的校验、编码与增量同步解码
//! - `profile`: 车型换算常数
//! - `feedback`: 遥测帧解析与状态快照组装
//! - `control`: 控制帧构建
//!
//! ## 字节序
//!
//! 负载中的 16 位字段均为高位在前（大端字节序）。
//! 32 位累计量按"低 16 位字在前、字内大端"的顺序发送，见 [`bytes_to_i32_word_swapped`]。

pub mod codec;
pub mod control;
pub mod feedback;
pub mod ids;
pub mod profile;

pub use codec::*;
pub use control::*;
pub use feedback::*;
pub use ids::*;
pub use profile::*;

use thiserror::Error;

/// 线上帧的统一抽象
///
/// 解码后只保留消息 ID、通道字节和 8 字节负载；帧头、保留字节与校验字节
/// 由 [`codec`] 负责生成和校验。
///
/// ```text
/// Protocol Layer (rmp-protocol)
///     ↓ StatusAssembler 解析 / 命令结构体 to_frame() 构建
/// RmpFrame (此类型)
///     ↓ encode_frame() / FrameDecoder
/// Transport Layer (rmp-io)
/// ```
///
/// ```rust
/// use rmp_protocol::{RmpFrame, CHANNEL_A};
///
/// let frame = RmpFrame::new(0x0401, CHANNEL_A, &[1, 2, 3, 4]);
/// assert_eq!(frame.message_id, 0x0401);
/// assert_eq!(frame.payload, [1, 2, 3, 4, 0, 0, 0, 0]);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RmpFrame {
    /// 消息 ID（遥测帧为 12 位）
    pub message_id: u16,

    /// 通道字节（遥测为 0xAA / 0xBB）
    pub channel: u8,

    /// 负载（固定 8 字节，不足部分补 0）
    pub payload: [u8; 8],
}

impl RmpFrame {
    /// 构造帧，`payload` 超过 8 字节的部分被截断
    pub fn new(message_id: u16, channel: u8, payload: &[u8]) -> Self {
        let mut fixed = [0u8; 8];
        let len = payload.len().min(8);
        fixed[..len].copy_from_slice(&payload[..len]);

        Self {
            message_id,
            channel,
            payload: fixed,
        }
    }

    pub fn message_id(&self) -> u16 {
        self.message_id
    }

    pub fn payload(&self) -> &[u8; 8] {
        &self.payload
    }
}

/// 协议解析错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    #[error("Invalid value for field {field}: {value}")]
    InvalidValue { field: String, value: i64 },
}

/// 大端字节序转 i16
pub fn bytes_to_i16_be(bytes: [u8; 2]) -> i16 {
    i16::from_be_bytes(bytes)
}

/// 大端字节序转 u16
pub fn bytes_to_u16_be(bytes: [u8; 2]) -> u16 {
    u16::from_be_bytes(bytes)
}

/// i16 转大端字节序
pub fn i16_to_bytes_be(value: i16) -> [u8; 2] {
    value.to_be_bytes()
}

/// 解析"字交换"的 32 位有符号数
///
/// 底盘先发低 16 位字，再发高 16 位字，每个字内部高字节在前：
/// `[lo_hi, lo_lo, hi_hi, hi_lo]`。
pub fn bytes_to_i32_word_swapped(bytes: [u8; 4]) -> i32 {
    i32::from_be_bytes([bytes[2], bytes[3], bytes[0], bytes[1]])
}
