//! FTDI 厂商请求常量与波特率除数计算

/// FTDI 厂商 ID
pub const FTDI_VENDOR_ID: u16 = 0x0403;

/// Segway RMP 内置 FT232 的产品 ID
pub const SEGWAY_RMP_PRODUCT_ID: u16 = 0xE729;

/// Vendor | Device | Host-to-Device
pub const FTDI_REQ_OUT: u8 = 0x40;

pub const SIO_RESET_REQUEST: u8 = 0x00;
pub const SIO_SET_FLOW_CTRL_REQUEST: u8 = 0x02;
pub const SIO_SET_BAUDRATE_REQUEST: u8 = 0x03;
pub const SIO_SET_DATA_REQUEST: u8 = 0x04;
pub const SIO_SET_LATENCY_TIMER_REQUEST: u8 = 0x09;

pub const SIO_RESET_SIO: u16 = 0;
pub const SIO_RESET_PURGE_RX: u16 = 1;
pub const SIO_RESET_PURGE_TX: u16 = 2;

pub const SIO_DISABLE_FLOW_CTRL: u16 = 0x0000;

/// 8 数据位、无校验、1 停止位
pub const SIO_DATA_8N1: u16 = 0x0008;

/// 每个 Bulk IN 包开头的两个调制解调器状态字节
pub const MODEM_STATUS_LEN: usize = 2;

/// 默认波特率
pub const DEFAULT_BAUD_RATE: u32 = 460_800;

/// 默认延迟定时器（毫秒）
pub const DEFAULT_LATENCY_TIMER_MS: u8 = 1;

const CLOCK_HZ: u64 = 48_000_000;
const CLOCK_DIV: u64 = 16;

/// 小数部分编码表（1/8 步进）
const FRAC_CODE: [u32; 8] = [0, 3, 2, 4, 1, 5, 6, 7];

/// 波特率除数编码结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BaudDivisor {
    /// 控制传输 wValue
    pub value: u16,
    /// 控制传输 wIndex（单接口芯片）
    pub index: u16,
    /// 实际可达到的波特率
    pub actual_baud: u32,
}

/// 计算 FT232BM/R 类芯片的波特率除数
///
/// 3 MHz 基准时钟，除数带 3 位小数。`baud_rate` 为 0 时返回 `None`。
pub fn baud_divisor(baud_rate: u32) -> Option<BaudDivisor> {
    if baud_rate == 0 {
        return None;
    }
    let baud = baud_rate as u64;

    let (encoded, actual): (u32, u64) = if baud >= CLOCK_HZ / CLOCK_DIV {
        (0, CLOCK_HZ / CLOCK_DIV)
    } else if baud >= CLOCK_HZ / (CLOCK_DIV + CLOCK_DIV / 2) {
        (1, CLOCK_HZ / (CLOCK_DIV + CLOCK_DIV / 2))
    } else if baud >= CLOCK_HZ / (2 * CLOCK_DIV) {
        (2, CLOCK_HZ / (2 * CLOCK_DIV))
    } else {
        // 多算一位用于四舍五入
        let divisor = CLOCK_HZ * 16 / CLOCK_DIV / baud;
        let mut best = if divisor & 1 == 1 {
            divisor / 2 + 1
        } else {
            divisor / 2
        };
        if best > 0x20000 {
            best = 0x1FFFF;
        }

        let raw_baud = CLOCK_HZ * 16 / CLOCK_DIV / best;
        let actual = if raw_baud & 1 == 1 {
            raw_baud / 2 + 1
        } else {
            raw_baud / 2
        };

        let encoded = ((best >> 3) as u32) | (FRAC_CODE[(best & 0x7) as usize] << 14);
        (encoded, actual)
    };

    Some(BaudDivisor {
        value: (encoded & 0xFFFF) as u16,
        index: (encoded >> 16) as u16,
        actual_baud: actual as u32,
    })
}

/// 去掉每个 Bulk 包开头的状态字节，把负载追加到 `out`
pub fn strip_modem_status(raw: &[u8], packet_size: usize, out: &mut bytes::BytesMut) {
    if packet_size <= MODEM_STATUS_LEN {
        return;
    }
    for chunk in raw.chunks(packet_size) {
        if chunk.len() > MODEM_STATUS_LEN {
            out.extend_from_slice(&chunk[MODEM_STATUS_LEN..]);
        }
    }
}
