//! 内存传输（无硬件依赖）
//!
//! 测试通过 [`MockHandle`] 向接收方向注入字节块、查看已写出的数据，
//! 以及注入连接 / 读 / 写失败。

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use bytes::{Buf, BytesMut};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use parking_lot::Mutex;

use crate::{
    CancelToken, DeviceError, DeviceErrorKind, IoError, RxTransport, Transport, TxTransport,
};

/// 默认读取超时
pub const MOCK_READ_TIMEOUT: Duration = Duration::from_millis(50);

/// 注册了取消令牌时，阻塞读取检查令牌的间隔
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(5);

#[derive(Debug, Default)]
struct MockState {
    written: Mutex<Vec<Vec<u8>>>,
    connected: AtomicBool,
    fail_connect: AtomicBool,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    connect_count: AtomicUsize,
    disconnect_count: AtomicUsize,
}

/// 测试侧句柄
#[derive(Debug, Clone)]
pub struct MockHandle {
    feed: Sender<Vec<u8>>,
    state: Arc<MockState>,
}

impl MockHandle {
    /// 注入一块接收数据（一次 `read` 最多返回一块）
    pub fn feed(&self, bytes: &[u8]) {
        // 所有接收端都已释放时丢弃即可
        let _ = self.feed.send(bytes.to_vec());
    }

    /// 已写出的数据（每次 `write` 一项）
    pub fn written(&self) -> Vec<Vec<u8>> {
        self.state.written.lock().clone()
    }

    /// 已写出数据的拼接
    pub fn written_bytes(&self) -> Vec<u8> {
        self.state.written.lock().concat()
    }

    pub fn clear_written(&self) {
        self.state.written.lock().clear();
    }

    pub fn is_connected(&self) -> bool {
        self.state.connected.load(Ordering::Acquire)
    }

    pub fn connect_count(&self) -> usize {
        self.state.connect_count.load(Ordering::Acquire)
    }

    pub fn disconnect_count(&self) -> usize {
        self.state.disconnect_count.load(Ordering::Acquire)
    }

    pub fn set_fail_connect(&self, fail: bool) {
        self.state.fail_connect.store(fail, Ordering::Release);
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.state.fail_reads.store(fail, Ordering::Release);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.state.fail_writes.store(fail, Ordering::Release);
    }
}

/// 接收半部
struct MockRx {
    chunks: Receiver<Vec<u8>>,
    pending: BytesMut,
    timeout: Duration,
    cancel: Option<CancelToken>,
    state: Arc<MockState>,
}

impl MockRx {
    /// 等待下一块数据，超时返回 `false`
    fn wait_chunk(&mut self) -> Result<bool, IoError> {
        let deadline = Instant::now() + self.timeout;
        loop {
            if self.cancel.as_ref().is_some_and(CancelToken::is_canceled) {
                return Err(IoError::Canceled);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(false);
            }
            let slice = match self.cancel {
                Some(_) => remaining.min(CANCEL_POLL_INTERVAL),
                None => remaining,
            };

            match self.chunks.recv_timeout(slice) {
                Ok(chunk) => {
                    self.pending.extend_from_slice(&chunk);
                    return Ok(true);
                },
                Err(RecvTimeoutError::Timeout) => {},
                // 没有句柄了，按超时处理
                Err(RecvTimeoutError::Disconnected) => std::thread::sleep(slice),
            }
        }
    }
}

impl RxTransport for MockRx {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, IoError> {
        if !self.state.connected.load(Ordering::Acquire) {
            return Err(IoError::NotConnected);
        }
        if self.state.fail_reads.load(Ordering::Acquire) {
            return Err(DeviceError::new(DeviceErrorKind::Backend, "injected read failure").into());
        }

        if self.pending.is_empty() && !self.wait_chunk()? {
            return Ok(0);
        }

        let n = self.pending.len().min(buf.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.advance(n);
        Ok(n)
    }

    fn set_cancel_token(&mut self, token: CancelToken) {
        self.cancel = Some(token);
    }
}

/// 发送半部
struct MockTx {
    state: Arc<MockState>,
}

impl TxTransport for MockTx {
    fn write(&mut self, buf: &[u8]) -> Result<usize, IoError> {
        if !self.state.connected.load(Ordering::Acquire) {
            return Err(IoError::NotConnected);
        }
        if self.state.fail_writes.load(Ordering::Acquire) {
            return Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "injected write failure").into());
        }
        self.state.written.lock().push(buf.to_vec());
        Ok(buf.len())
    }
}

/// 内存传输
pub struct MockTransport {
    rx: MockRx,
    tx: MockTx,
}

impl MockTransport {
    pub fn new() -> (Self, MockHandle) {
        Self::with_read_timeout(MOCK_READ_TIMEOUT)
    }

    pub fn with_read_timeout(timeout: Duration) -> (Self, MockHandle) {
        let (feed, chunks) = unbounded();
        let state = Arc::new(MockState::default());

        let transport = Self {
            rx: MockRx {
                chunks,
                pending: BytesMut::new(),
                timeout,
                cancel: None,
                state: state.clone(),
            },
            tx: MockTx {
                state: state.clone(),
            },
        };
        (transport, MockHandle { feed, state })
    }
}

impl Transport for MockTransport {
    fn connect(&mut self) -> Result<(), IoError> {
        let state = &self.rx.state;
        if state.fail_connect.load(Ordering::Acquire) {
            return Err(DeviceError::new(DeviceErrorKind::NotFound, "injected connect failure").into());
        }
        if !state.connected.swap(true, Ordering::AcqRel) {
            state.connect_count.fetch_add(1, Ordering::AcqRel);
        }
        Ok(())
    }

    fn disconnect(&mut self) {
        let state = &self.rx.state;
        if state.connected.swap(false, Ordering::AcqRel) {
            state.disconnect_count.fetch_add(1, Ordering::AcqRel);
        }
    }

    fn is_connected(&self) -> bool {
        self.rx.state.connected.load(Ordering::Acquire)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, IoError> {
        self.rx.read(buf)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize, IoError> {
        self.tx.write(buf)
    }

    fn split(&mut self) -> Result<(Box<dyn RxTransport>, Box<dyn TxTransport>), IoError> {
        if !self.is_connected() {
            return Err(IoError::NotConnected);
        }

        let rx = MockRx {
            chunks: self.rx.chunks.clone(),
            pending: std::mem::take(&mut self.rx.pending),
            timeout: self.rx.timeout,
            cancel: None,
            state: self.rx.state.clone(),
        };
        let tx = MockTx {
            state: self.tx.state.clone(),
        };
        Ok((Box::new(rx), Box::new(tx)))
    }

    fn describe(&self) -> String {
        String::from("mock")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_connect_is_idempotent() {
        let (mut transport, handle) = MockTransport::new();
        transport.connect().unwrap();
        transport.connect().unwrap();
        assert!(transport.is_connected());
        assert_eq!(handle.connect_count(), 1);

        transport.disconnect();
        transport.disconnect();
        assert!(!handle.is_connected());
        assert_eq!(handle.disconnect_count(), 1);
    }

    #[test]
    fn test_connect_failure() {
        let (mut transport, handle) = MockTransport::new();
        handle.set_fail_connect(true);
        assert!(matches!(transport.connect(), Err(IoError::Device(_))));
        assert!(!transport.is_connected());
    }

    #[test]
    fn test_read_partial_chunks() {
        let (mut transport, handle) = MockTransport::new();
        transport.connect().unwrap();
        handle.feed(&[1, 2, 3, 4, 5]);

        let mut buf = [0u8; 3];
        assert_eq!(transport.read(&mut buf).unwrap(), 3);
        assert_eq!(buf, [1, 2, 3]);
        assert_eq!(transport.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], &[4, 5]);
    }

    #[test]
    fn test_read_times_out_with_zero() {
        let (mut transport, _handle) = MockTransport::with_read_timeout(Duration::from_millis(10));
        transport.connect().unwrap();
        let start = Instant::now();
        let mut buf = [0u8; 8];
        assert_eq!(transport.read(&mut buf).unwrap(), 0);
        assert!(start.elapsed() >= Duration::from_millis(10));
    }

    #[test]
    fn test_read_write_require_connection() {
        let (mut transport, _handle) = MockTransport::new();
        let mut buf = [0u8; 8];
        assert!(matches!(transport.read(&mut buf), Err(IoError::NotConnected)));
        assert!(matches!(transport.write(&[1]), Err(IoError::NotConnected)));
        assert!(transport.split().is_err());
    }

    #[test]
    fn test_split_halves_share_state() {
        let (mut transport, handle) = MockTransport::new();
        transport.connect().unwrap();
        let (mut rx, mut tx) = transport.split().unwrap();

        handle.feed(&[9, 9]);
        let mut buf = [0u8; 4];
        assert_eq!(rx.read(&mut buf).unwrap(), 2);

        tx.write(&[1, 2, 3]).unwrap();
        assert_eq!(handle.written_bytes(), vec![1, 2, 3]);
        handle.clear_written();
        assert!(handle.written().is_empty());
    }

    #[test]
    fn test_injected_failures() {
        let (mut transport, handle) = MockTransport::new();
        transport.connect().unwrap();

        handle.set_fail_reads(true);
        let mut buf = [0u8; 4];
        assert!(matches!(transport.read(&mut buf), Err(IoError::Device(_))));

        handle.set_fail_writes(true);
        assert!(matches!(transport.write(&[1]), Err(IoError::Io(_))));
    }
}
