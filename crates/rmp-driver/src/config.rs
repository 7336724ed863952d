//! 驱动配置
//!
//! TOML 格式：
//!
//! ```toml
//! vehicle = "rmp200"
//! interface = "usb"
//!
//! [usb]
//! serial_number = "FTD1234"
//! baud_rate = 460800
//!
//! [pipeline]
//! queue_capacity = 256
//! ```

use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use rmp_protocol::VehicleType;
use serde::{Deserialize, Serialize};

use crate::error::DriverError;
use crate::pipeline::PipelineConfig;

/// 默认波特率（串口和 USB 相同）
pub const DEFAULT_BAUD_RATE: u32 = 460_800;

/// 默认串口读超时（毫秒）
pub const DEFAULT_SERIAL_READ_TIMEOUT_MS: u64 = 1000;

/// 物理接口类型
///
/// 只实现了串口和 USB；CAN 和以太网在配置阶段被拒绝。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterfaceType {
    Can,
    #[default]
    Usb,
    Serial,
    Ethernet,
}

impl InterfaceType {
    pub fn name(&self) -> &'static str {
        match self {
            InterfaceType::Can => "can",
            InterfaceType::Usb => "usb",
            InterfaceType::Serial => "serial",
            InterfaceType::Ethernet => "ethernet",
        }
    }

    pub fn is_supported(&self) -> bool {
        matches!(self, InterfaceType::Usb | InterfaceType::Serial)
    }
}

impl fmt::Display for InterfaceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for InterfaceType {
    type Err = DriverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "can" => Ok(InterfaceType::Can),
            "usb" => Ok(InterfaceType::Usb),
            "serial" => Ok(InterfaceType::Serial),
            "ethernet" => Ok(InterfaceType::Ethernet),
            other => Err(DriverError::Configuration(format!(
                "Unknown interface type '{}'",
                other
            ))),
        }
    }
}

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}

fn default_read_timeout_ms() -> u64 {
    DEFAULT_SERIAL_READ_TIMEOUT_MS
}

/// `[serial]` 段
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialConfig {
    pub port: String,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
}

impl SerialConfig {
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout_ms: DEFAULT_SERIAL_READ_TIMEOUT_MS,
        }
    }
}

/// `[usb]` 段，三种选择方式恰好指定一种
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsbConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
}

impl Default for UsbConfig {
    fn default() -> Self {
        Self {
            serial_number: None,
            description: None,
            index: None,
            baud_rate: DEFAULT_BAUD_RATE,
        }
    }
}

impl UsbConfig {
    fn selector_count(&self) -> usize {
        [
            self.serial_number.is_some(),
            self.description.is_some(),
            self.index.is_some(),
        ]
        .iter()
        .filter(|set| **set)
        .count()
    }
}

/// 驱动配置
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DriverConfig {
    #[serde(default)]
    pub vehicle: VehicleType,
    #[serde(default)]
    pub interface: InterfaceType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial: Option<SerialConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usb: Option<UsbConfig>,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

impl DriverConfig {
    /// 解析 TOML 文本并校验
    pub fn from_toml_str(s: &str) -> Result<Self, DriverError> {
        let config: DriverConfig = toml::from_str(s)
            .map_err(|e| DriverError::Configuration(format!("Invalid config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// 从文件加载
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, DriverError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            DriverError::Configuration(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn to_toml_string(&self) -> Result<String, DriverError> {
        toml::to_string(self)
            .map_err(|e| DriverError::Configuration(format!("Failed to serialize config: {}", e)))
    }

    /// 检查接口类型与对应段是否一致
    pub fn validate(&self) -> Result<(), DriverError> {
        if !self.interface.is_supported() {
            return Err(DriverError::Configuration(format!(
                "Interface type '{}' is not supported",
                self.interface
            )));
        }

        if let Some(usb) = &self.usb
            && usb.selector_count() > 1
        {
            return Err(DriverError::Configuration(
                "usb: set only one of serial_number, description or index".into(),
            ));
        }

        match self.interface {
            InterfaceType::Serial if self.usb.is_some() => {
                return Err(DriverError::Configuration(
                    "[usb] section given but interface is serial".into(),
                ));
            },
            InterfaceType::Usb if self.serial.is_some() => {
                return Err(DriverError::Configuration(
                    "[serial] section given but interface is usb".into(),
                ));
            },
            _ => {},
        }

        self.pipeline.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_usb_config_default_matches_serde_default() {
        let config = UsbConfig {
            index: Some(0),
            ..Default::default()
        };
        assert_eq!(config.baud_rate, DEFAULT_BAUD_RATE);

        let parsed: UsbConfig = toml::from_str("index = 0").unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_parse_serial_config() {
        let config = DriverConfig::from_toml_str(
            r#"
            vehicle = "rmp50"
            interface = "serial"

            [serial]
            port = "/dev/ttyUSB0"
            "#,
        )
        .unwrap();

        assert_eq!(config.vehicle, VehicleType::Rmp50);
        assert_eq!(config.interface, InterfaceType::Serial);
        let serial = config.serial.unwrap();
        assert_eq!(serial.port, "/dev/ttyUSB0");
        assert_eq!(serial.baud_rate, 460_800);
        assert_eq!(serial.read_timeout_ms, 1000);
        assert_eq!(config.pipeline, PipelineConfig::default());
    }

    #[test]
    fn test_parse_usb_config_with_pipeline() {
        let config = DriverConfig::from_toml_str(
            r#"
            vehicle = "rmpx440"
            interface = "usb"

            [usb]
            description = "Robotic Mobile Platform"
            baud_rate = 115200

            [pipeline]
            queue_capacity = 16
            "#,
        )
        .unwrap();

        assert_eq!(config.vehicle, VehicleType::Rmpx440);
        let usb = config.usb.unwrap();
        assert_eq!(usb.description.as_deref(), Some("Robotic Mobile Platform"));
        assert_eq!(usb.baud_rate, 115_200);
        assert_eq!(config.pipeline.queue_capacity, 16);
        assert_eq!(config.pipeline.error_backoff_ms, 10);
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = DriverConfig::from_toml_str("").unwrap();
        assert_eq!(config.vehicle, VehicleType::Rmp200);
        assert_eq!(config.interface, InterfaceType::Usb);
        assert!(config.usb.is_none());
    }

    #[test]
    fn test_unsupported_interface_rejected() {
        for text in ["interface = \"can\"", "interface = \"ethernet\""] {
            let err = DriverConfig::from_toml_str(text).unwrap_err();
            assert!(matches!(err, DriverError::Configuration(_)), "{}", err);
        }
    }

    #[test]
    fn test_conflicting_sections_rejected() {
        let err = DriverConfig::from_toml_str(
            r#"
            interface = "serial"
            [usb]
            index = 0
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("[usb]"));

        let err = DriverConfig::from_toml_str(
            r#"
            interface = "usb"
            [usb]
            index = 0
            serial_number = "A"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("only one"));
    }

    #[test]
    fn test_unknown_vehicle_rejected() {
        assert!(DriverConfig::from_toml_str("vehicle = \"rmp9000\"").is_err());
    }

    #[test]
    fn test_interface_type_from_str() {
        assert_eq!("USB".parse::<InterfaceType>().unwrap(), InterfaceType::Usb);
        assert_eq!("Serial".parse::<InterfaceType>().unwrap(), InterfaceType::Serial);
        assert!("bluetooth".parse::<InterfaceType>().is_err());
        assert!(!InterfaceType::Can.is_supported());
    }

    #[test]
    fn test_from_file_and_back() {
        let config = DriverConfig {
            vehicle: VehicleType::Rmp400,
            interface: InterfaceType::Serial,
            serial: Some(SerialConfig::new("COM3")),
            usb: None,
            pipeline: PipelineConfig::default(),
        };

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(config.to_toml_string().unwrap().as_bytes())
            .unwrap();

        let loaded = DriverConfig::from_file(file.path()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_from_missing_file() {
        let err = DriverConfig::from_file("/nonexistent/rmp.toml").unwrap_err();
        assert!(matches!(err, DriverError::Configuration(_)));
    }
}
