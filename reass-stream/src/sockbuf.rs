//! Socket receive buffer fed by the reassembly queue.
#![forbid(unsafe_code)]

use std::collections::VecDeque;

use bytes::{Buf, Bytes};

/// Destination for bytes that became contiguous.
pub trait ReceiveBuffer {
    /// Take ownership of delivered bytes.
    fn append(&mut self, payload: Bytes);

    /// Whether the application still wants data. When this is `false` delivered bytes are
    /// dropped by the queue but still consume sequence space.
    fn can_receive_more(&self) -> bool;
}

/// In-order byte stream waiting to be read by the application.
#[derive(Debug, Default)]
pub struct SockBuf {
    chunks: VecDeque<Bytes>,
    len: usize,
    cant_rcv_more: bool,
}

impl SockBuf {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes available to read.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Stop accepting data, as after `shutdown(SHUT_RD)`.
    pub fn shutdown_read(&mut self) {
        self.cant_rcv_more = true;
    }

    /// Copy up to `buf.len()` bytes out. Returns the number copied.
    pub fn read(&mut self, buf: &mut [u8]) -> usize {
        let mut copied = 0;
        while copied < buf.len() {
            let Some(front) = self.chunks.front_mut() else { break };
            let n = front.len().min(buf.len() - copied);
            buf[copied..copied + n].copy_from_slice(&front[..n]);
            front.advance(n);
            if front.is_empty() {
                self.chunks.pop_front();
            }
            copied += n;
        }
        self.len -= copied;
        copied
    }

    /// Drain everything currently buffered.
    pub fn read_to_vec(&mut self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len);
        for chunk in self.chunks.drain(..) {
            out.extend_from_slice(&chunk);
        }
        self.len = 0;
        out
    }
}

impl ReceiveBuffer for SockBuf {
    fn append(&mut self, payload: Bytes) {
        if self.cant_rcv_more || payload.is_empty() {
            return;
        }
        self.len += payload.len();
        self.chunks.push_back(payload);
    }

    fn can_receive_more(&self) -> bool {
        !self.cant_rcv_more
    }
}
