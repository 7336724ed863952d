//! 集成测试共用的帧构造工具

#![allow(dead_code)]

use std::time::{Duration, Instant};

use rmp_sdk::io::{MockHandle, MockTransport};
use rmp_sdk::protocol::{
    CHANNEL_A, ID_BODY_POSITION, ID_CYCLE_END, ID_CYCLE_START, ID_MODE_BATTERY, ID_MOTOR_STATUS,
    ID_MOTOR_TORQUE, ID_PITCH_ROLL, ID_WHEEL_POSITION, ID_WHEEL_SPEED, RmpFrame,
    encode_telemetry_frame,
};
use rmp_sdk::{SegwayRmp, VehicleType};

/// 底盘方向的线上字节
pub fn wire(id: u16, channel: u8, payload: [u8; 8]) -> Vec<u8> {
    encode_telemetry_frame(&RmpFrame::new(id, channel, &payload)).to_vec()
}

/// RMP200 的一个完整周期，各字段取值见 `assert_full_cycle`
pub fn full_cycle() -> Vec<u8> {
    let frames: [(u16, [u8; 8]); 9] = [
        (ID_CYCLE_START, [0; 8]),
        (ID_PITCH_ROLL, [0xFF, 0xE8, 0x00, 0x20, 0x00, 0x30, 0x00, 0x10]),
        (ID_WHEEL_SPEED, [0x01, 0x4C, 0xFE, 0xB4, 0x00, 0x4E, 0x04, 0xD2]),
        (ID_WHEEL_POSITION, [0x03, 0x7E, 0x00, 0x01, 0x7E, 0x41, 0xFF, 0xFF]),
        (ID_BODY_POSITION, [0x81, 0xBF, 0x00, 0x00, 0x6E, 0x01, 0x00, 0x00]),
        (ID_MOTOR_TORQUE, [0x04, 0x46, 0xFD, 0xDD, 0, 0, 0, 0]),
        (ID_MODE_BATTERY, [0x00, 0x02, 0x00, 0x01, 0x03, 0x20, 0x01, 0x20]),
        (ID_MOTOR_STATUS, [0, 0, 0, 0x80, 0, 0, 0, 0]),
        (ID_CYCLE_END, [0x00, 0xA6, 0x02, 0x00, 0, 0, 0, 0]),
    ];
    frames
        .iter()
        .flat_map(|(id, payload)| wire(*id, CHANNEL_A, *payload))
        .collect()
}

/// 只有起止帧的周期，`commanded` 为速度计数
pub fn minimal_cycle(commanded: i16) -> Vec<u8> {
    let c = commanded.to_be_bytes();
    let mut bytes = wire(ID_CYCLE_START, CHANNEL_A, [0; 8]);
    bytes.extend(wire(ID_CYCLE_END, CHANNEL_A, [c[0], c[1], 0, 0, 0, 0, 0, 0]));
    bytes
}

pub fn assert_close(actual: f32, expected: f64, what: &str) {
    assert!(
        (actual as f64 - expected).abs() < 1e-3,
        "{}: expected {}, got {}",
        what,
        expected,
        actual
    );
}

/// 驱动 + mock 句柄（未连接）
pub fn mock_rmp(vehicle: VehicleType) -> (SegwayRmp, MockHandle) {
    let (transport, handle) = MockTransport::with_read_timeout(Duration::from_millis(10));
    (SegwayRmp::with_transport(Box::new(transport), vehicle), handle)
}

/// 轮询直到条件成立或超时
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}
