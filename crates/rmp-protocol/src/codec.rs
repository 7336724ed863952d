//! 18 字节线上帧的校验、编码与增量同步解码
//!
//! 帧格式：
//!
//! ```text
//! byte  0     1     2        3..=5   6..=7       8    9..=16   17
//!       0xF0  0x55  channel  ...     cmd id(BE)  0    payload  checksum
//! ```
//!
//! 遥测帧的 12 位消息 ID 取自字节 4、5；命令帧的 ID 以大端写在字节 6、7。
//! 两个方向的头部布局不对称，这是底盘固件的约定。

use bytes::{Buf, BytesMut};
use thiserror::Error;

use crate::RmpFrame;
use crate::ids::{CHANNEL_A, CHANNEL_B, FRAME_HEADER_0, FRAME_HEADER_1};

/// 线上帧长度
pub const FRAME_LEN: usize = 18;

/// 负载在线上帧中的起始偏移
pub const PAYLOAD_OFFSET: usize = 9;

/// 帧层错误
///
/// `code()` 返回的数字子码便于上层在日志和统计中区分错误类别。
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    /// 校验和不匹配，整帧被丢弃
    #[error("Checksum mismatch: expected 0x{expected:02X}, got 0x{actual:02X}")]
    ChecksumMismatch { expected: u8, actual: u8 },

    /// 传输层本次读取没有带来任何新字节
    #[error("No data received from transport")]
    NoData,
}

impl FrameError {
    /// 数字子码：校验失败为 2，无数据为 3
    pub fn code(&self) -> u8 {
        match self {
            FrameError::ChecksumMismatch { .. } => 2,
            FrameError::NoData => 3,
        }
    }
}

/// 计算校验字节
///
/// 对输入字节做 16 位累加，把高字节折叠进低字节两次，再取二进制补码的低 8 位。
/// 对完整帧调用时应传入前 17 个字节。
pub fn checksum(bytes: &[u8]) -> u8 {
    let mut sum: u16 = 0;
    for &b in bytes {
        sum = sum.wrapping_add(b as u16);
    }

    let mut folded = (sum & 0xFF) + (sum >> 8);
    folded = (folded & 0xFF) + (folded >> 8);

    ((!folded).wrapping_add(1) & 0xFF) as u8
}

/// 从线上字节 4、5 提取 12 位消息 ID
pub fn decode_message_id(b4: u8, b5: u8) -> u16 {
    (((b4 as u16) << 3) | (((b5 >> 5) & 0x07) as u16)) & 0x0FFF
}

/// 编码一帧
///
/// 字节 2 写入通道，字节 6、7 写入大端消息 ID，字节 17 写入校验和。
pub fn encode_frame(frame: &RmpFrame) -> [u8; FRAME_LEN] {
    let mut bytes = [0u8; FRAME_LEN];
    bytes[0] = FRAME_HEADER_0;
    bytes[1] = FRAME_HEADER_1;
    bytes[2] = frame.channel;
    bytes[6..8].copy_from_slice(&frame.message_id.to_be_bytes());
    bytes[PAYLOAD_OFFSET..PAYLOAD_OFFSET + 8].copy_from_slice(&frame.payload);
    bytes[FRAME_LEN - 1] = checksum(&bytes[..FRAME_LEN - 1]);
    bytes
}

/// 按底盘上行方向的布局编码一帧（消息 ID 写在字节 4、5）
///
/// 用于模拟底盘、回放录制数据和测试；主机发出的命令帧使用 [`encode_frame`]。
pub fn encode_telemetry_frame(frame: &RmpFrame) -> [u8; FRAME_LEN] {
    let id = frame.message_id & 0x0FFF;
    let mut bytes = [0u8; FRAME_LEN];
    bytes[0] = FRAME_HEADER_0;
    bytes[1] = FRAME_HEADER_1;
    bytes[2] = frame.channel;
    bytes[4] = (id >> 3) as u8;
    bytes[5] = ((id & 0x07) as u8) << 5;
    bytes[PAYLOAD_OFFSET..PAYLOAD_OFFSET + 8].copy_from_slice(&frame.payload);
    bytes[FRAME_LEN - 1] = checksum(&bytes[..FRAME_LEN - 1]);
    bytes
}

/// 解码一个已经对齐的 18 字节帧（会检查帧头和校验和）
pub fn decode_frame(bytes: &[u8; FRAME_LEN]) -> Result<RmpFrame, FrameError> {
    let expected = checksum(&bytes[..FRAME_LEN - 1]);
    let actual = bytes[FRAME_LEN - 1];
    if expected != actual {
        return Err(FrameError::ChecksumMismatch { expected, actual });
    }

    let mut payload = [0u8; 8];
    payload.copy_from_slice(&bytes[PAYLOAD_OFFSET..PAYLOAD_OFFSET + 8]);

    Ok(RmpFrame {
        message_id: decode_message_id(bytes[4], bytes[5]),
        channel: bytes[2],
        payload,
    })
}

/// 同步状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SyncState {
    /// 丢弃字节直到遇到 0xF0
    SeekHeader0,
    /// 期待 0x55
    SeekHeader1,
    /// 期待 0xAA / 0xBB
    SeekChannel,
    /// 逐字节收集剩余 15 字节
    Body,
}

/// 增量帧解码器
///
/// 把无边界的字节流切分成 18 字节帧。调用方用 [`extend`](Self::extend) 追加
/// 读到的字节，然后反复调用 [`next_frame`](Self::next_frame)：
///
/// - `Ok(Some(frame))`：得到一个校验通过的帧
/// - `Ok(None)`：缓冲区已耗尽，需要更多数据（已收集的半帧会保留）
/// - `Err(ChecksumMismatch)`：一个完整帧校验失败，已丢弃
///
/// 头部第 2、3 个字节匹配失败时，失败的那个字节不会被吞掉，
/// 而是作为新的 0xF0 候选重新扫描，所以 `F0 F0 55 AA ...` 能在第二个 0xF0 处同步。
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: BytesMut,
    state: SyncState,
    frame: [u8; FRAME_LEN],
    filled: usize,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::with_capacity(FRAME_LEN * 16)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(capacity),
            state: SyncState::SeekHeader0,
            frame: [0u8; FRAME_LEN],
            filled: 0,
        }
    }

    /// 追加原始字节
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// 尚未扫描的原始字节数
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// 当前是否处于帧中间（已匹配到至少一个帧头字节）
    pub fn in_frame(&self) -> bool {
        self.state != SyncState::SeekHeader0
    }

    /// 清空缓冲区和同步状态
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.state = SyncState::SeekHeader0;
        self.filled = 0;
    }

    /// 尝试从缓冲区中取出下一帧
    pub fn next_frame(&mut self) -> Result<Option<RmpFrame>, FrameError> {
        while self.buffer.has_remaining() {
            let byte = self.buffer[0];
            match self.state {
                SyncState::SeekHeader0 => {
                    self.buffer.advance(1);
                    if byte == FRAME_HEADER_0 {
                        self.frame[0] = byte;
                        self.filled = 1;
                        self.state = SyncState::SeekHeader1;
                    }
                },
                SyncState::SeekHeader1 => {
                    if byte == FRAME_HEADER_1 {
                        self.buffer.advance(1);
                        self.frame[1] = byte;
                        self.filled = 2;
                        self.state = SyncState::SeekChannel;
                    } else {
                        // 不消费，作为 0xF0 候选重新扫描
                        self.state = SyncState::SeekHeader0;
                    }
                },
                SyncState::SeekChannel => {
                    if byte == CHANNEL_A || byte == CHANNEL_B {
                        self.buffer.advance(1);
                        self.frame[2] = byte;
                        self.filled = 3;
                        self.state = SyncState::Body;
                    } else {
                        self.state = SyncState::SeekHeader0;
                    }
                },
                SyncState::Body => {
                    let take = (FRAME_LEN - self.filled).min(self.buffer.len());
                    self.frame[self.filled..self.filled + take]
                        .copy_from_slice(&self.buffer[..take]);
                    self.buffer.advance(take);
                    self.filled += take;

                    if self.filled == FRAME_LEN {
                        self.state = SyncState::SeekHeader0;
                        self.filled = 0;
                        return decode_frame(&self.frame).map(Some);
                    }
                },
            }
        }

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::*;

    /// 构造一个遥测帧的线上字节（ID 写在字节 4、5）
    fn telemetry_bytes(id: u16, channel: u8, payload: [u8; 8]) -> [u8; FRAME_LEN] {
        encode_telemetry_frame(&RmpFrame::new(id, channel, &payload))
    }

    #[test]
    fn test_checksum_zero_sum() {
        assert_eq!(checksum(&[]), 0);
        assert_eq!(checksum(&[0u8; 17]), 0);
    }

    #[test]
    fn test_checksum_header_only() {
        // 0xF0 + 0x55 + 0xAA = 0x1EF，折叠为 0xF0，补码 0x10
        assert_eq!(checksum(&[0xF0, 0x55, 0xAA]), 0x10);
    }

    #[test]
    fn test_checksum_folds_high_byte_twice() {
        // 17 个 0xFF：和为 0x10EF，第一次折叠 0xEF + 0x10 = 0xFF，第二次保持
        let bytes = [0xFFu8; 17];
        assert_eq!(checksum(&bytes), 0x01);
    }

    #[test]
    fn test_decode_message_id() {
        assert_eq!(decode_message_id(0x80, 0x20), 0x0401);
        assert_eq!(decode_message_id(0xD0, 0x00), 0x0680);
        assert_eq!(decode_message_id(0xFF, 0xFF), 0x07FF);
    }

    #[test]
    fn test_encode_frame_layout() {
        let frame = RmpFrame::new(ID_MOTION_COMMAND, CHANNEL_COMMAND, &[0, 0x0C, 0, 0, 0, 0x10, 0, 1]);
        let bytes = encode_frame(&frame);

        assert_eq!(&bytes[..3], &[0xF0, 0x55, 0x00]);
        assert_eq!(&bytes[3..6], &[0, 0, 0]);
        assert_eq!(&bytes[6..8], &[0x04, 0x13]);
        assert_eq!(bytes[8], 0);
        assert_eq!(&bytes[9..17], &[0, 0x0C, 0, 0, 0, 0x10, 0, 1]);
        assert_eq!(bytes[17], checksum(&bytes[..17]));
    }

    #[test]
    fn test_telemetry_frame_layout() {
        let frame = RmpFrame::new(ID_MOTOR_STATUS, CHANNEL_A, &[0, 0, 0, 0x80, 0, 0, 0, 0]);
        let bytes = encode_telemetry_frame(&frame);
        assert_eq!(&bytes[..3], &[0xF0, 0x55, 0xAA]);
        assert_eq!(&bytes[4..6], &[0xD0, 0x00]);
        assert_eq!(&bytes[6..8], &[0, 0]);
        assert_eq!(decode_frame(&bytes).unwrap(), frame);
    }

    #[test]
    fn test_encode_decode_header_asymmetry() {
        // 命令帧的 ID 在字节 6、7，解码按遥测约定读字节 4、5，因此 ID 为 0
        let frame = RmpFrame::new(ID_MOTION_COMMAND, CHANNEL_A, &[9, 8, 7, 6, 5, 4, 3, 2]);
        let decoded = decode_frame(&encode_frame(&frame)).unwrap();
        assert_eq!(decoded.message_id, 0);
        assert_eq!(decoded.channel, CHANNEL_A);
        assert_eq!(decoded.payload, frame.payload);
    }

    #[test]
    fn test_decoder_single_frame() {
        let mut decoder = FrameDecoder::new();
        decoder.extend(&telemetry_bytes(0x0402, CHANNEL_A, [0, 0x0C, 0, 0, 0, 0, 0, 0]));

        let frame = decoder.next_frame().unwrap().unwrap();
        assert_eq!(frame.message_id, 0x0402);
        assert_eq!(frame.channel, CHANNEL_A);
        assert_eq!(frame.payload[1], 0x0C);
        assert_eq!(decoder.next_frame().unwrap(), None);
    }

    #[test]
    fn test_decoder_skips_noise() {
        let mut decoder = FrameDecoder::new();
        decoder.extend(&[0x00, 0x13, 0x55, 0xAA, 0x42]);
        decoder.extend(&telemetry_bytes(0x0403, CHANNEL_B, [1; 8]));

        let frame = decoder.next_frame().unwrap().unwrap();
        assert_eq!(frame.message_id, 0x0403);
        assert_eq!(frame.channel, CHANNEL_B);
    }

    #[test]
    fn test_decoder_rescans_failing_header_byte() {
        let mut decoder = FrameDecoder::new();
        // F0 后面跟着真正的帧头 F0 55 AA
        decoder.extend(&[0xF0]);
        decoder.extend(&telemetry_bytes(0x0405, CHANNEL_A, [2; 8]));
        assert_eq!(decoder.next_frame().unwrap().unwrap().message_id, 0x0405);

        // F0 55 后面的通道字节非法，且本身是 F0
        let mut decoder = FrameDecoder::new();
        decoder.extend(&[0xF0, 0x55]);
        decoder.extend(&telemetry_bytes(0x0406, CHANNEL_A, [3; 8]));
        assert_eq!(decoder.next_frame().unwrap().unwrap().message_id, 0x0406);
    }

    #[test]
    fn test_decoder_partial_frame_is_kept() {
        let bytes = telemetry_bytes(0x0407, CHANNEL_A, [4; 8]);
        let mut decoder = FrameDecoder::new();

        decoder.extend(&bytes[..7]);
        assert_eq!(decoder.next_frame().unwrap(), None);
        assert!(decoder.in_frame());
        assert_eq!(decoder.buffered(), 0);

        decoder.extend(&bytes[7..]);
        assert_eq!(decoder.next_frame().unwrap().unwrap().message_id, 0x0407);
    }

    #[test]
    fn test_decoder_byte_by_byte() {
        let bytes = telemetry_bytes(0x0401, CHANNEL_A, [5; 8]);
        let mut decoder = FrameDecoder::new();
        let mut frames = Vec::new();
        for b in bytes {
            decoder.extend(&[b]);
            if let Some(frame) = decoder.next_frame().unwrap() {
                frames.push(frame);
            }
        }
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].payload, [5; 8]);
    }

    #[test]
    fn test_decoder_checksum_mismatch_then_recovers() {
        let mut bad = telemetry_bytes(0x0401, CHANNEL_A, [6; 8]);
        bad[17] = bad[17].wrapping_add(1);
        let good = telemetry_bytes(0x0402, CHANNEL_A, [7; 8]);

        let mut decoder = FrameDecoder::new();
        decoder.extend(&bad);
        decoder.extend(&good);

        let err = decoder.next_frame().unwrap_err();
        assert!(matches!(err, FrameError::ChecksumMismatch { .. }));
        assert_eq!(err.code(), 2);
        assert_eq!(decoder.next_frame().unwrap().unwrap().message_id, 0x0402);
    }

    #[test]
    fn test_frame_error_codes() {
        assert_eq!(FrameError::NoData.code(), 3);
        assert_eq!(
            FrameError::ChecksumMismatch {
                expected: 1,
                actual: 2
            }
            .code(),
            2
        );
    }

    #[test]
    fn test_decoder_reset() {
        let mut decoder = FrameDecoder::new();
        decoder.extend(&[0xF0, 0x55, 0xAA, 1, 2]);
        assert_eq!(decoder.next_frame().unwrap(), None);
        assert!(decoder.in_frame());
        decoder.reset();
        assert!(!decoder.in_frame());
        assert_eq!(decoder.buffered(), 0);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// 编码后的帧总能通过自身的校验
            #[test]
            fn prop_encoded_checksum_valid(id in 0u16..0x1000, channel in any::<u8>(), payload in any::<[u8; 8]>()) {
                let bytes = encode_frame(&RmpFrame::new(id, channel, &payload));
                prop_assert_eq!(bytes[17], checksum(&bytes[..17]));
                prop_assert!(decode_frame(&bytes).is_ok());
            }

            /// 修改任意一个字节都会被校验和发现
            #[test]
            fn prop_single_byte_corruption_detected(
                payload in any::<[u8; 8]>(),
                index in 0usize..17,
                delta in 1u8..255,
            ) {
                let mut bytes = telemetry_bytes(0x0402, CHANNEL_A, payload);
                bytes[index] = bytes[index].wrapping_add(delta);
                // 0x00 与 0xFF 在折叠求和下等价，跳过这种换位
                let before = telemetry_bytes(0x0402, CHANNEL_A, payload)[index];
                prop_assume!(!((before == 0x00 && bytes[index] == 0xFF) || (before == 0xFF && bytes[index] == 0x00)));
                prop_assert!(decode_frame(&bytes).is_err());
            }

            /// 不含 0xF0 的噪声前缀不影响同步
            #[test]
            fn prop_resync_after_noise(
                noise in proptest::collection::vec(any::<u8>().prop_filter("no header", |b| *b != 0xF0), 0..64),
                id in 0x0400u16..0x0408,
                payload in any::<[u8; 8]>(),
                split in 0usize..82,
            ) {
                let mut stream = noise.clone();
                stream.extend_from_slice(&telemetry_bytes(id, CHANNEL_A, payload));
                let split = split.min(stream.len());

                let mut decoder = FrameDecoder::new();
                decoder.extend(&stream[..split]);
                let mut frames = Vec::new();
                while let Some(f) = decoder.next_frame().unwrap() {
                    frames.push(f);
                }
                decoder.extend(&stream[split..]);
                while let Some(f) = decoder.next_frame().unwrap() {
                    frames.push(f);
                }

                prop_assert_eq!(frames.len(), 1);
                prop_assert_eq!(frames[0].message_id, id);
                prop_assert_eq!(frames[0].payload, payload);
            }
        }
    }
}
