//! 指令编码端到端测试：驱动 API → 线上字节

mod common;

use common::mock_rmp;
use proptest::prelude::*;
use rmp_sdk::prelude::*;
use rmp_sdk::protocol::{FRAME_LEN, checksum};

/// 线上字节中的 (子命令, 参数)
fn config_params(written: &[Vec<u8>]) -> Vec<(u8, u8)> {
    written.iter().map(|b| (b[14], b[16])).collect()
}

#[test]
fn test_motion_command_exact_bytes() {
    let (mut rmp, handle) = mock_rmp(VehicleType::Rmp200);
    rmp.connect(false).unwrap();

    rmp.move_velocity(1.0, 0.0).unwrap();
    let written = handle.written();
    assert_eq!(
        written[0],
        vec![
            0xF0, 0x55, 0x00, 0x00, 0x00, 0x00, 0x04, 0x13, 0x00, 0x01, 0x4C, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x56,
        ]
    );
}

#[test]
fn test_shutdown_exact_bytes() {
    let (mut rmp, handle) = mock_rmp(VehicleType::Rmp50);
    rmp.connect(false).unwrap();

    rmp.shutdown().unwrap();
    let mut expected = vec![0xF0, 0x55, 0x00, 0x00, 0x00, 0x00, 0x04, 0x12];
    expected.extend([0u8; 9]);
    expected.push(0xA4);
    assert_eq!(handle.written()[0], expected);
}

#[test]
fn test_velocity_uses_vehicle_profile() {
    let (mut small, small_handle) = mock_rmp(VehicleType::Rmp100);
    small.connect(false).unwrap();
    small.move_velocity(1.0, -10.0).unwrap();
    let bytes = &small_handle.written()[0];
    // 401 计数，-78 计数
    assert_eq!(&bytes[9..13], &[0x01, 0x91, 0xFF, 0xB2]);
}

#[test]
fn test_move_counts_not_clamped() {
    let (mut rmp, handle) = mock_rmp(VehicleType::Rmp200);
    rmp.connect(false).unwrap();
    rmp.move_counts(i16::MAX, i16::MIN).unwrap();
    assert_eq!(&handle.written()[0][9..13], &[0x7F, 0xFF, 0x80, 0x00]);
}

#[test]
fn test_scale_factor_quirks() {
    let (mut rmp, handle) = mock_rmp(VehicleType::Rmp200);
    rmp.connect(false).unwrap();

    rmp.set_max_velocity_scale_factor(1.0).unwrap();
    rmp.set_max_turn_scale_factor(0.99).unwrap();
    // 1.0 × 256 = 256，低字节为 0
    rmp.set_current_limit_scale_factor(1.0).unwrap();
    rmp.set_current_limit_scale_factor(f64::NAN).unwrap();

    assert_eq!(
        config_params(&handle.written()),
        vec![(0x0A, 16), (0x0C, 15), (0x0E, 0), (0x0E, 0)]
    );
}

#[test]
fn test_connect_with_integrator_reset() {
    let (mut rmp, handle) = mock_rmp(VehicleType::Rmp200);
    rmp.connect(true).unwrap();

    let written = handle.written();
    assert_eq!(written.len(), 4);
    assert_eq!(
        config_params(&written),
        vec![(0x32, 0x01), (0x32, 0x02), (0x32, 0x04), (0x32, 0x08)]
    );
    for bytes in &written {
        assert_eq!(&bytes[6..8], &[0x04, 0x13]);
    }
}

#[test]
fn test_commands_after_disconnect_rejected() {
    let (mut rmp, handle) = mock_rmp(VehicleType::Rmp200);
    rmp.connect(false).unwrap();
    rmp.disconnect();
    handle.clear_written();

    let err = rmp.set_balance_mode_locking(false).unwrap_err();
    assert!(matches!(err, DriverError::Command(_)));
    assert!(handle.written().is_empty());
}

#[test]
fn test_commands_from_status_callback() {
    use std::sync::Arc;
    use std::time::Duration;

    let (mut rmp, handle) = mock_rmp(VehicleType::Rmp200);
    rmp.connect(false).unwrap();
    let rmp = Arc::new(rmp);

    // 回调里持有驱动的弱引用，避免循环引用
    let weak = Arc::downgrade(&rmp);
    rmp.set_status_callback(move |_status| {
        if let Some(rmp) = weak.upgrade() {
            let _ = rmp.move_counts(10, 0);
        }
    });
    handle.feed(&common::minimal_cycle(0));

    assert!(common::wait_until(Duration::from_secs(2), || !handle.written().is_empty()));
    assert_eq!(&handle.written()[0][9..11], &[0x00, 0x0A]);
    // 回调返回后临时升级的 Arc 已释放，最后一个引用留在测试线程
    assert!(common::wait_until(Duration::from_secs(2), || {
        rmp.metrics().snapshots_delivered == 1
    }));
}

proptest! {
    /// 任意计数都产生合法的 18 字节命令帧
    #[test]
    fn prop_motion_frames_well_formed(linear in any::<i16>(), angular in any::<i16>()) {
        let (mut rmp, handle) = mock_rmp(VehicleType::Rmp200);
        rmp.connect(false).unwrap();
        rmp.move_counts(linear, angular).unwrap();

        let bytes = handle.written().remove(0);
        prop_assert_eq!(bytes.len(), FRAME_LEN);
        prop_assert_eq!(&bytes[..3], &[0xF0, 0x55, 0x00]);
        prop_assert_eq!(bytes[17], checksum(&bytes[..17]));
        prop_assert_eq!(i16::from_be_bytes([bytes[9], bytes[10]]), linear);
        prop_assert_eq!(i16::from_be_bytes([bytes[11], bytes[12]]), angular);
        rmp.disconnect();
    }
}
