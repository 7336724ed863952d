//! 车型换算常数
//!
//! 底盘以"计数"（counts）为单位收发物理量，不同车型的换算比例不同。

use std::fmt;
use std::str::FromStr;

use crate::ProtocolError;

/// 支持的车型
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, num_enum::TryFromPrimitive, num_enum::IntoPrimitive,
)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
#[repr(u8)]
pub enum VehicleType {
    Rmp50 = 0,
    Rmp100 = 1,
    #[default]
    Rmp200 = 2,
    Rmp400 = 3,
    Rmpx440 = 4,
}

impl VehicleType {
    pub const ALL: [VehicleType; 5] = [
        VehicleType::Rmp50,
        VehicleType::Rmp100,
        VehicleType::Rmp200,
        VehicleType::Rmp400,
        VehicleType::Rmpx440,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            VehicleType::Rmp50 => "rmp50",
            VehicleType::Rmp100 => "rmp100",
            VehicleType::Rmp200 => "rmp200",
            VehicleType::Rmp400 => "rmp400",
            VehicleType::Rmpx440 => "rmpx440",
        }
    }

    /// 该车型的换算常数
    pub fn profile(&self) -> VehicleProfile {
        VehicleProfile::for_vehicle(*self)
    }
}

impl fmt::Display for VehicleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for VehicleType {
    type Err = ProtocolError;

    /// 不区分大小写，如 `"RMP200"`、`"rmpx440"`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        VehicleType::ALL
            .into_iter()
            .find(|v| v.name() == lower)
            .ok_or_else(|| ProtocolError::InvalidValue {
                field: format!("vehicle type '{}'", s),
                value: -1,
            })
    }
}

/// 物理量与计数之间的换算常数
///
/// 构造后不可变。所有遥测量都是"计数 ÷ 常数"，所有运动指令都是"物理量 × 常数"。
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VehicleProfile {
    /// 度/秒 → 计数
    pub dps_to_counts: f64,
    /// 米/秒 → 计数
    pub mps_to_counts: f64,
    /// 米 → 计数
    pub meters_to_counts: f64,
    /// 圈 → 计数
    pub rev_to_counts: f64,
    /// 牛·米 → 计数
    pub torque_to_counts: f64,
}

impl VehicleProfile {
    /// RMP50 / RMP100 的小轮系数
    pub const SMALL_WHEEL: VehicleProfile = VehicleProfile {
        dps_to_counts: 7.8,
        mps_to_counts: 401.0,
        meters_to_counts: 40181.0,
        rev_to_counts: 117031.0,
        torque_to_counts: 1463.0,
    };

    /// RMP200 / RMP400 / RMPX440 的系数
    pub const LARGE_WHEEL: VehicleProfile = VehicleProfile {
        dps_to_counts: 7.8,
        mps_to_counts: 332.0,
        meters_to_counts: 33215.0,
        rev_to_counts: 112644.0,
        torque_to_counts: 1094.0,
    };

    pub fn for_vehicle(vehicle: VehicleType) -> Self {
        match vehicle {
            VehicleType::Rmp50 | VehicleType::Rmp100 => Self::SMALL_WHEEL,
            VehicleType::Rmp200 | VehicleType::Rmp400 | VehicleType::Rmpx440 => Self::LARGE_WHEEL,
        }
    }
}

impl Default for VehicleProfile {
    fn default() -> Self {
        Self::for_vehicle(VehicleType::default())
    }
}
