//! 配置文件加载与 Builder 测试

use std::io::Write;

use rmp_sdk::prelude::*;

#[test]
fn test_load_serial_config_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
vehicle = "RMP400"
interface = "serial"

[serial]
port = "/dev/ttyUSB1"
baud_rate = 115200
read_timeout_ms = 250

[pipeline]
queue_capacity = 64
error_backoff_ms = 5
"#
    )
    .unwrap();

    // 车型名大小写敏感，"RMP400" 不合法
    assert!(DriverConfig::from_file(file.path()).is_err());

    let text = std::fs::read_to_string(file.path())
        .unwrap()
        .replace("RMP400", "rmp400");
    let config = DriverConfig::from_toml_str(&text).unwrap();
    assert_eq!(config.vehicle, VehicleType::Rmp400);
    assert_eq!(config.interface, InterfaceType::Serial);

    let serial = config.serial.as_ref().unwrap();
    assert_eq!(serial.port, "/dev/ttyUSB1");
    assert_eq!(serial.baud_rate, 115_200);
    assert_eq!(serial.read_timeout_ms, 250);
    assert_eq!(config.pipeline.queue_capacity, 64);
    assert_eq!(config.pipeline.error_backoff_ms, 5);
    assert_eq!(config.pipeline.read_buffer_size, 256);

    #[cfg(feature = "serial")]
    {
        let rmp = RmpBuilder::from_config(&config).build().unwrap();
        assert_eq!(rmp.vehicle_type(), VehicleType::Rmp400);
        assert_eq!(rmp.interface_type(), Some(InterfaceType::Serial));
        assert_eq!(rmp.pipeline_config().queue_capacity, 64);
        assert!(!rmp.is_connected());
    }
}

#[test]
fn test_can_and_ethernet_rejected_everywhere() {
    for interface in [InterfaceType::Can, InterfaceType::Ethernet] {
        let text = format!("interface = \"{}\"", interface);
        assert!(matches!(
            DriverConfig::from_toml_str(&text),
            Err(DriverError::Configuration(_))
        ));
        assert!(RmpBuilder::new().interface(interface).build().is_err());
        assert!(SegwayRmp::new(interface, VehicleType::Rmp200).is_err());
    }
}

#[test]
fn test_config_roundtrip_through_toml() {
    let config = DriverConfig {
        vehicle: VehicleType::Rmp50,
        interface: InterfaceType::Usb,
        serial: None,
        usb: Some(rmp_sdk::driver::UsbConfig {
            serial_number: Some("00000042".into()),
            description: None,
            index: None,
            baud_rate: 460_800,
        }),
        pipeline: PipelineConfig::default(),
    };

    let text = config.to_toml_string().unwrap();
    assert!(text.contains("serial_number"));
    assert!(!text.contains("description"));
    assert_eq!(DriverConfig::from_toml_str(&text).unwrap(), config);
}

#[test]
fn test_malformed_toml_is_configuration_error() {
    let err = DriverConfig::from_toml_str("vehicle = ").unwrap_err();
    assert!(matches!(err, DriverError::Configuration(_)));
    assert!(err.to_string().starts_with("Configuration error"));
}
