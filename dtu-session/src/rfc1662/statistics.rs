//! Link statistics collection

use dtu_core::DtuError;

/// Counters for one reassembled serial link
///
/// Updated by the [`StreamReassembler`](crate::rfc1662::StreamReassembler)
/// owning the link; readers take a copy through `statistics()`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkStatistics {
    /// Non-empty chunks handed to the reassembler
    pub chunks_received: u64,
    pub bytes_received: u64,
    /// Frames that passed header, FCS and END checks
    pub frames_decoded: u64,
    pub header_errors: u64,
    pub fcs_errors: u64,
    /// Frames rejected for a short body or a bad END flag
    pub truncated_frames: u64,
    /// Buffers dropped because they did not look like a frame
    pub garbage_discards: u64,
    /// Buffers dropped while a frame was still incomplete
    pub incomplete_discards: u64,
    /// Buffers dropped because they outgrew the configured maximum
    pub overflow_discards: u64,
    pub bytes_discarded: u64,
}

impl LinkStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear all counters
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn record_chunk(&mut self, len: usize) {
        self.chunks_received += 1;
        self.bytes_received += len as u64;
    }

    pub fn record_frame(&mut self) {
        self.frames_decoded += 1;
    }

    pub fn record_discard(&mut self, len: usize) {
        self.bytes_discarded += len as u64;
    }

    /// Classify a frame decode failure
    pub fn record_decode_error(&mut self, error: &DtuError) {
        match error {
            DtuError::HeaderMismatch(_) => self.header_errors += 1,
            DtuError::ChecksumMismatch { .. } => self.fcs_errors += 1,
            _ => self.truncated_frames += 1,
        }
    }

    /// Percentage of frame attempts that failed decoding
    pub fn error_rate(&self) -> f64 {
        let errors = self.header_errors + self.fcs_errors + self.truncated_frames;
        let attempts = errors + self.frames_decoded;
        if attempts == 0 {
            0.0
        } else {
            (errors as f64 / attempts as f64) * 100.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let mut stats = LinkStatistics::new();
        stats.record_decode_error(&DtuError::HeaderMismatch(vec![0x00]));
        stats.record_decode_error(&DtuError::ChecksumMismatch {
            expected: 1,
            computed: 2,
        });
        stats.record_decode_error(&DtuError::Truncated("short".to_string()));
        stats.record_frame();
        assert_eq!(stats.header_errors, 1);
        assert_eq!(stats.fcs_errors, 1);
        assert_eq!(stats.truncated_frames, 1);
        assert!((stats.error_rate() - 75.0).abs() < f64::EPSILON);

        stats.clear();
        assert_eq!(stats, LinkStatistics::default());
        assert_eq!(stats.error_rate(), 0.0);
    }
}
