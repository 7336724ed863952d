//! 帧级读写
//!
//! [`FrameReader`] 在接收半部之上做帧同步，[`FrameWriter`] 在发送半部之上做帧编码。

use rmp_protocol::{FRAME_LEN, FrameDecoder, FrameError, RmpFrame, encode_frame};
use tracing::trace;

use crate::{CancelToken, IoError, RxTransport, TxTransport};

/// 默认单次读取缓冲区大小
pub const DEFAULT_READ_BUFFER_SIZE: usize = 256;

/// 帧读取器
///
/// 解码器中的字节耗尽后才向传输层要数据；一次读取没有带来任何字节时
/// 返回 `FrameError::NoData`，由上层决定是否继续。
pub struct FrameReader {
    rx: Box<dyn RxTransport>,
    decoder: FrameDecoder,
    scratch: Vec<u8>,
    cancel: CancelToken,
}

impl FrameReader {
    pub fn new(rx: Box<dyn RxTransport>, cancel: CancelToken) -> Self {
        Self::with_buffer_size(rx, cancel, DEFAULT_READ_BUFFER_SIZE)
    }

    pub fn with_buffer_size(
        mut rx: Box<dyn RxTransport>,
        cancel: CancelToken,
        size: usize,
    ) -> Self {
        rx.set_cancel_token(cancel.clone());
        Self {
            rx,
            decoder: FrameDecoder::new(),
            scratch: vec![0u8; size.max(FRAME_LEN)],
            cancel,
        }
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// 读取下一个校验通过的帧
    ///
    /// # 错误
    /// - `IoError::Frame(ChecksumMismatch)`：丢弃了一个坏帧，可以继续调用
    /// - `IoError::Frame(NoData)`：传输层超时内无数据，可以继续调用
    /// - `IoError::Canceled`：取消令牌已置位
    /// - 其它：传输层错误
    pub fn read_frame(&mut self) -> Result<RmpFrame, IoError> {
        loop {
            if let Some(frame) = self.decoder.next_frame()? {
                return Ok(frame);
            }

            if self.cancel.is_canceled() {
                return Err(IoError::Canceled);
            }

            let n = self.rx.read(&mut self.scratch)?;
            if n == 0 {
                return Err(FrameError::NoData.into());
            }
            trace!("read {} bytes from transport", n);
            self.decoder.extend(&self.scratch[..n]);
        }
    }
}

/// 帧写入器
pub struct FrameWriter {
    tx: Box<dyn TxTransport>,
}

impl FrameWriter {
    pub fn new(tx: Box<dyn TxTransport>) -> Self {
        Self { tx }
    }

    /// 编码并写出一帧，写出字节数不足 18 时报错
    pub fn write_frame(&mut self, frame: &RmpFrame) -> Result<(), IoError> {
        let bytes = encode_frame(frame);
        let written = self.tx.write(&bytes)?;
        if written != FRAME_LEN {
            return Err(IoError::ShortWrite {
                written,
                expected: FRAME_LEN,
            });
        }
        trace!("sent frame 0x{:04X}", frame.message_id);
        Ok(())
    }

    /// 按顺序写出多帧，遇到第一个错误即停止
    pub fn write_frames(&mut self, frames: &[RmpFrame]) -> Result<(), IoError> {
        for frame in frames {
            self.write_frame(frame)?;
        }
        Ok(())
    }
}
