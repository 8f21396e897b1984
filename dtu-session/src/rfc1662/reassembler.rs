//! Reassembly of serial reads into RFC1662 frames
//!
//! A UART read returns whatever bytes have arrived: part of a frame, a frame
//! and a half, or line noise. The reassembler accumulates reads for one link
//! and hands out frames that passed decoding.
//!
//! Two policies are available:
//!
//! * [`ReassemblyMode::Compatible`] reproduces the deployed module. A buffer
//!   that does not both start with `7E FF 03` and end with `7E` is dropped, a
//!   buffer holding less than its declared frame is dropped, and once a frame
//!   is extracted everything after it is dropped too. Only buffers shorter than
//!   three bytes survive to the next read.
//! * [`ReassemblyMode::Retaining`] keeps incomplete frames across reads,
//!   resynchronises on the next `7E FF 03` after garbage, and extracts every
//!   complete frame in the buffer.

use crate::rfc1662::frame::{frame_len, peek_info_len, starts_with_header, to_hex, Frame, END, HEADER};
use crate::rfc1662::statistics::LinkStatistics;
use bytes::{Buf, BytesMut};
use serde::{Deserialize, Serialize};

/// Default upper bound on buffered bytes (one maximal frame)
pub const DEFAULT_MAX_BUFFER: usize = 7 + u16::MAX as usize + 3;

/// Buffering policy of a [`StreamReassembler`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReassemblyMode {
    /// Drop the buffer on every terminal outcome, including incomplete frames
    #[default]
    Compatible,
    /// Keep partial frames and trailing bytes for the next read
    Retaining,
}

/// Per-link accumulator turning serial reads into frames
#[derive(Debug)]
pub struct StreamReassembler {
    buffer: BytesMut,
    mode: ReassemblyMode,
    max_buffer: usize,
    statistics: LinkStatistics,
}

impl StreamReassembler {
    pub fn new(mode: ReassemblyMode) -> Self {
        Self {
            buffer: BytesMut::with_capacity(1024),
            mode,
            max_buffer: DEFAULT_MAX_BUFFER,
            statistics: LinkStatistics::new(),
        }
    }

    /// Cap the number of buffered bytes; larger buffers are dropped
    pub fn with_max_buffer(mut self, max_buffer: usize) -> Self {
        self.max_buffer = max_buffer.max(3);
        self
    }

    /// Feed one read from the transport, returning every frame it completed
    pub fn push(&mut self, data: &[u8]) -> Vec<Frame> {
        if data.is_empty() {
            return Vec::new();
        }
        self.statistics.record_chunk(data.len());
        self.buffer.extend_from_slice(data);

        let frames = match self.mode {
            ReassemblyMode::Compatible => self.extract_compatible().into_iter().collect(),
            ReassemblyMode::Retaining => self.extract_retaining(),
        };

        if self.buffer.len() > self.max_buffer {
            log::error!(
                "Reassembly buffer exceeded {} bytes, dropping {} bytes",
                self.max_buffer,
                self.buffer.len()
            );
            self.statistics.overflow_discards += 1;
            self.discard_all();
        }
        frames
    }

    fn extract_compatible(&mut self) -> Option<Frame> {
        if self.buffer.len() < 3 {
            log::warn!("Received {} bytes, waiting for more", self.buffer.len());
            return None;
        }

        if !starts_with_header(&self.buffer) || self.buffer.last() != Some(&END) {
            log::error!("Dropping garbage: {}", to_hex(&self.buffer));
            self.statistics.garbage_discards += 1;
            self.discard_all();
            return None;
        }

        match peek_info_len(&self.buffer).map(frame_len) {
            Some(total) if total <= self.buffer.len() => {
                let result = Frame::decode(&self.buffer[..total]);
                self.statistics.record_discard(self.buffer.len() - total);
                self.buffer.clear();
                self.accept(result)
            }
            _ => {
                log::warn!("Dropping incomplete frame: {}", to_hex(&self.buffer));
                self.statistics.incomplete_discards += 1;
                self.discard_all();
                None
            }
        }
    }

    fn extract_retaining(&mut self) -> Vec<Frame> {
        let mut frames = Vec::new();
        loop {
            match find_header(&self.buffer) {
                Some(0) => {}
                Some(pos) => {
                    log::warn!("Skipping {} bytes before frame header", pos);
                    self.statistics.garbage_discards += 1;
                    self.discard_front(pos);
                }
                None => {
                    let keep = header_prefix_len(&self.buffer);
                    let skip = self.buffer.len() - keep;
                    if skip > 0 {
                        log::warn!("Dropping garbage: {}", to_hex(&self.buffer[..skip]));
                        self.statistics.garbage_discards += 1;
                        self.discard_front(skip);
                    }
                    break;
                }
            }

            let Some(info_len) = peek_info_len(&self.buffer) else {
                break;
            };
            let total = frame_len(info_len);
            if info_len == 0 || total > self.max_buffer {
                // cannot be a frame; resync past this header
                self.statistics.truncated_frames += 1;
                self.discard_front(1);
                continue;
            }
            if self.buffer.len() < total {
                break;
            }

            match Frame::decode(&self.buffer[..total]) {
                Ok(frame) => {
                    self.buffer.advance(total);
                    self.statistics.record_frame();
                    frames.push(frame);
                }
                Err(e) => {
                    log::warn!("Discarding frame candidate: {}", e);
                    self.statistics.record_decode_error(&e);
                    self.discard_front(1);
                }
            }
        }
        frames
    }

    fn accept(&mut self, result: dtu_core::DtuResult<Frame>) -> Option<Frame> {
        match result {
            Ok(frame) => {
                self.statistics.record_frame();
                Some(frame)
            }
            Err(e) => {
                log::error!("Frame decode failed: {}", e);
                self.statistics.record_decode_error(&e);
                None
            }
        }
    }

    fn discard_front(&mut self, n: usize) {
        self.statistics.record_discard(n);
        self.buffer.advance(n);
    }

    fn discard_all(&mut self) {
        self.statistics.record_discard(self.buffer.len());
        self.buffer.clear();
    }

    /// Drop any buffered bytes, e.g. after the transport reconnected
    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    /// Bytes currently held for the next read
    pub fn buffered(&self) -> &[u8] {
        &self.buffer
    }

    pub fn mode(&self) -> ReassemblyMode {
        self.mode
    }

    pub fn statistics(&self) -> &LinkStatistics {
        &self.statistics
    }
}

impl Default for StreamReassembler {
    fn default() -> Self {
        Self::new(ReassemblyMode::default())
    }
}

/// Offset of the first `7E FF 03` triple
fn find_header(buf: &[u8]) -> Option<usize> {
    buf.windows(3).position(starts_with_header)
}

/// Length of a trailing partial header (`7E` or `7E FF`) worth keeping
fn header_prefix_len(buf: &[u8]) -> usize {
    if buf.ends_with(&[HEADER, crate::rfc1662::frame::ADDRESS]) {
        2
    } else if buf.ends_with(&[HEADER]) {
        1
    } else {
        0
    }
}
