//! Frame Check Sequence (FCS) calculation for RFC1662 frames
//!
//! The meter firmware computes a CRC-16 (poly 0x1021, init 0xFFFF) by feeding
//! bit-reflected bytes MSB-first, complements the register and then reflects
//! its high and low bytes separately. The result is the byte-swapped form of
//! CRC-16/X.25; it is written to the wire low byte first.

/// FCS calculation constants
const INITIAL_FCS: u16 = 0xFFFF;
const POLYNOMIAL: u16 = 0x1021;

/// Bytes before the checksummed body: HEADER, ADDRESS, CONTROL
const LEADING_EXCLUDED: usize = 3;
/// Bytes after the checksummed body: FCS low, FCS high, END
const TRAILING_EXCLUDED: usize = 3;

/// Reverse the bit order of a byte
pub fn reflect_byte(b: u8) -> u8 {
    let b = (b & 0xF0) >> 4 | (b & 0x0F) << 4;
    let b = (b & 0xCC) >> 2 | (b & 0x33) << 2;
    (b & 0xAA) >> 1 | (b & 0x55) << 1
}

/// Incremental FCS calculator over a frame body
#[derive(Debug, Clone)]
pub struct FcsCalc {
    register: u16,
}

impl FcsCalc {
    pub fn new() -> Self {
        Self {
            register: INITIAL_FCS,
        }
    }

    /// Reset the register to its initial state
    pub fn reset(&mut self) {
        self.register = INITIAL_FCS;
    }

    /// Feed a single body byte
    pub fn update(&mut self, data: u8) {
        let mut c = u16::from(reflect_byte(data)) << 8;
        for _ in 0..8 {
            if (self.register ^ c) & 0x8000 != 0 {
                self.register = (self.register << 1) ^ POLYNOMIAL;
            } else {
                self.register <<= 1;
            }
            c <<= 1;
        }
    }

    pub fn update_bytes(&mut self, data: &[u8]) {
        for &byte in data {
            self.update(byte);
        }
    }

    /// Finalised FCS: complement, then reflect each byte in place
    pub fn value(&self) -> u16 {
        let crc = 0xFFFF - self.register;
        let hi = reflect_byte((crc >> 8) as u8);
        let lo = reflect_byte((crc & 0xFF) as u8);
        u16::from(hi) << 8 | u16::from(lo)
    }

    /// Finalised FCS in wire order (little-endian)
    pub fn value_bytes(&self) -> [u8; 2] {
        self.value().to_le_bytes()
    }

    /// FCS over an isolated body (PROTOCOL_ID through INFO_DATA)
    pub fn compute_body(body: &[u8]) -> u16 {
        let mut calc = Self::new();
        calc.update_bytes(body);
        calc.value()
    }

    /// FCS over a complete frame span, skipping the three leading and three trailing bytes
    pub fn compute(frame: &[u8]) -> u16 {
        let end = frame.len().saturating_sub(TRAILING_EXCLUDED);
        let body = frame.get(LEADING_EXCLUDED..end).unwrap_or(&[]);
        Self::compute_body(body)
    }

    /// Compare a received FCS against the one computed over `frame`
    pub fn verify(expected: u16, frame: &[u8]) -> bool {
        let computed = Self::compute(frame);
        log::debug!("FCS check: received 0x{:04X}, computed 0x{:04X}", expected, computed);
        expected == computed
    }
}

impl Default for FcsCalc {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reflect_byte() {
        assert_eq!(reflect_byte(0x01), 0x80);
        assert_eq!(reflect_byte(0xF0), 0x0F);
        assert_eq!(reflect_byte(0xA5), 0xA5);
        assert_eq!(reflect_byte(0x21), 0x84);
        for b in 0..=u8::MAX {
            assert_eq!(reflect_byte(reflect_byte(b)), b);
        }
    }

    #[test]
    fn test_check_value() {
        // CRC-16/X.25 check value 0x906E, byte-swapped
        assert_eq!(FcsCalc::compute_body(b"123456789"), 0x6E90);
    }

    #[test]
    fn test_compute_skips_envelope() {
        let body = [0x00, 0x21, 0x00, 0x03, 0xBF, 0xAA, 0xBB];
        let mut frame = vec![0x7E, 0xFF, 0x03];
        frame.extend_from_slice(&body);
        frame.extend_from_slice(&[0x00, 0x00, 0x7E]);

        assert_eq!(FcsCalc::compute_body(&body), 0xA4B1);
        assert_eq!(FcsCalc::compute(&frame), 0xA4B1);

        // Envelope bytes do not take part in the checksum
        frame[1] = 0x00;
        frame[11] = 0x55;
        assert_eq!(FcsCalc::compute(&frame), 0xA4B1);
    }

    #[test]
    fn test_compute_is_deterministic_and_incremental() {
        let data = [0x12, 0x34, 0x56, 0x78, 0x9A];
        let mut calc = FcsCalc::new();
        for &b in &data {
            calc.update(b);
        }
        assert_eq!(calc.value(), FcsCalc::compute_body(&data));
        assert_eq!(FcsCalc::compute_body(&data), FcsCalc::compute_body(&data));

        calc.reset();
        assert_eq!(calc.value(), FcsCalc::compute_body(&[]));
    }

    #[test]
    fn test_short_span_uses_empty_body() {
        assert_eq!(FcsCalc::compute(&[0x7E, 0xFF]), FcsCalc::compute_body(&[]));
        assert_eq!(FcsCalc::compute(&[]), FcsCalc::compute_body(&[]));
    }

    #[test]
    fn test_verify_detects_single_bit_flip() {
        let mut frame = vec![0x7E, 0xFF, 0x03, 0x00, 0x21, 0x00, 0x03, 0xBF, 0xAA, 0xBB, 0xB1, 0xA4, 0x7E];
        assert!(FcsCalc::verify(0xA4B1, &frame));
        frame[8] ^= 0x01;
        assert!(!FcsCalc::verify(0xA4B1, &frame));
    }
}
