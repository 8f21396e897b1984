//! RFC1662 frame structure and encoding/decoding
//!
//! ```text
//! 7E FF 03 | PROTOCOL_ID (LE) | INFO_LEN (BE) | INFO_CMD | INFO_DATA .. | FCS (LE) | 7E
//! ```
//!
//! Frames produced by the module (relays and replies) carry a signal-quality
//! byte in place of the protocol id's low byte, followed by the protocol id's
//! high byte. With a zero signal-quality byte this reads back as the full
//! little-endian protocol id.

use crate::rfc1662::fcs::FcsCalc;
use dtu_core::{
    AckCode, CosemCommand, Decoded, DtuError, DtuResult, GetReply, Parameter,
};
use std::fmt;

/// Frame opening flag
pub const HEADER: u8 = 0x7E;
pub const ADDRESS: u8 = 0xFF;
pub const CONTROL: u8 = 0x03;
/// Frame closing flag
pub const END: u8 = 0x7E;

/// Meter-data relay, forwarded opaquely between UART and cloud
pub const PROTOCOL_RELAY: u16 = 0x2100;
/// Module-initiated GET/SET towards the meter
pub const PROTOCOL_MODULE_COMMAND: u16 = 0x2200;

/// HEADER, ADDRESS, CONTROL, PROTOCOL_ID and INFO_LEN
pub(crate) const PREFIX_LEN: usize = 7;
/// FCS and END
pub(crate) const SUFFIX_LEN: usize = 3;

/// Signal quality reported in module-built frames
const SIGNAL_QUALITY: u8 = 0;

/// Total on-wire length of a frame declaring `info_len`
pub fn frame_len(info_len: u16) -> usize {
    PREFIX_LEN + usize::from(info_len) + SUFFIX_LEN
}

/// INFO_LEN of a buffered frame, once enough bytes are present
pub fn peek_info_len(buf: &[u8]) -> Option<u16> {
    if buf.len() < PREFIX_LEN {
        return None;
    }
    Some(u16::from_be_bytes([buf[5], buf[6]]))
}

/// True when `buf` opens with HEADER, ADDRESS, CONTROL
pub fn starts_with_header(buf: &[u8]) -> bool {
    buf.starts_with(&[HEADER, ADDRESS, CONTROL])
}

/// Space separated lowercase hex, as frames are logged
pub fn to_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Decoded RFC1662 frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    protocol_id: u16,
    info_len: u16,
    info_cmd: u8,
    info_data: Decoded,
    fcs: u16,
}

impl Frame {
    /// Decode a frame from the start of `data`
    ///
    /// Only the `7 + INFO_LEN + 3` bytes the frame declares are inspected;
    /// anything after them belongs to the next frame.
    pub fn decode(data: &[u8]) -> DtuResult<Self> {
        if !starts_with_header(data) {
            let found = data[..data.len().min(3)].to_vec();
            log::error!("Frame header mismatch: {}", to_hex(&found));
            return Err(DtuError::HeaderMismatch(found));
        }

        let info_len = peek_info_len(data).ok_or_else(|| {
            DtuError::Truncated(format!("{} bytes is shorter than the frame prefix", data.len()))
        })?;
        if info_len == 0 {
            return Err(DtuError::Truncated("INFO_LEN of zero leaves no INFO_CMD".to_string()));
        }
        let total = frame_len(info_len);
        if data.len() < total {
            return Err(DtuError::Truncated(format!(
                "frame declares {} bytes, {} available",
                total,
                data.len()
            )));
        }
        let span = &data[..total];

        let protocol_id = u16::from_le_bytes([span[3], span[4]]);
        let info_cmd = span[PREFIX_LEN];
        let fcs_pos = PREFIX_LEN + usize::from(info_len);
        let info_data = &span[PREFIX_LEN + 1..fcs_pos];
        let decoded = Parameter::decode(info_data, info_cmd, Some(info_data.len()));

        let fcs = u16::from_le_bytes([span[fcs_pos], span[fcs_pos + 1]]);
        if !FcsCalc::verify(fcs, span) {
            let computed = FcsCalc::compute(span);
            log::error!(
                "FCS check failed for protocol 0x{:04X}: {}",
                protocol_id,
                to_hex(span)
            );
            return Err(DtuError::ChecksumMismatch {
                expected: fcs,
                computed,
            });
        }

        if span[total - 1] != END {
            return Err(DtuError::Truncated(format!(
                "expected END flag 0x7E, got 0x{:02X}",
                span[total - 1]
            )));
        }

        Ok(Self {
            protocol_id,
            info_len,
            info_cmd,
            info_data: decoded,
            fcs,
        })
    }

    /// Build a 0x2100 relay frame carrying raw meter bytes
    pub fn encode_relay(payload: &[u8]) -> DtuResult<Vec<u8>> {
        if payload.is_empty() {
            return Err(DtuError::InvalidData("relay payload is empty".to_string()));
        }
        Self::assemble(
            [SIGNAL_QUALITY, (PROTOCOL_RELAY >> 8) as u8],
            CosemCommand::SeriaNet.as_u8(),
            payload,
        )
    }

    /// Build a 0x2200 module command frame
    ///
    /// A GET carries no data; every other command must carry some.
    pub fn encode_command(mode: u8, param_id: u16, data: Option<&[u8]>) -> DtuResult<Vec<u8>> {
        let is_get = mode == CosemCommand::Get.as_u8();
        let data = match (is_get, data) {
            (true, None) => &[][..],
            (false, Some(data)) => data,
            (true, Some(_)) => {
                return Err(DtuError::Arity(
                    "GET command takes (mode, param_id) without data".to_string(),
                ));
            }
            (false, None) => {
                return Err(DtuError::Arity(format!(
                    "command 0x{:02X} takes (mode, param_id, data)",
                    mode
                )));
            }
        };

        let mut info_data = Vec::with_capacity(2 + data.len());
        info_data.extend_from_slice(&param_id.to_le_bytes());
        info_data.extend_from_slice(data);
        Self::assemble(PROTOCOL_MODULE_COMMAND.to_le_bytes(), mode, &info_data)
    }

    /// Re-encode this frame as a reply with a new INFO_CMD and INFO_DATA
    pub fn encode_reply(&self, info_cmd: u8, info_data: &[u8]) -> DtuResult<Vec<u8>> {
        Self::assemble(
            [SIGNAL_QUALITY, (self.protocol_id >> 8) as u8],
            info_cmd,
            info_data,
        )
    }

    /// Answer a GET; a failed lookup is reported as an error response carrying FAILED
    pub fn reply_get(&self, reply: GetReply<'_>, success: bool) -> DtuResult<Vec<u8>> {
        if success {
            let body = self.parameter().encode_get_reply(reply)?;
            self.encode_reply(CosemCommand::GetResponse.as_u8(), &body)
        } else {
            let body = self.parameter().encode_set_ack(AckCode::Failed);
            self.encode_reply(CosemCommand::ErrorResponse.as_u8(), &body)
        }
    }

    pub fn reply_set(&self, success: bool) -> DtuResult<Vec<u8>> {
        let body = self.parameter().encode_set_ack(AckCode::from_success(success));
        self.encode_reply(CosemCommand::SetResponse.as_u8(), &body)
    }

    /// Acknowledge an event; the reply travels as SERIA_NET
    pub fn reply_event(&self) -> DtuResult<Vec<u8>> {
        self.encode_reply(CosemCommand::SeriaNet.as_u8(), &Parameter::encode_event_ack())
    }

    /// Echo a firmware block in a GET_RESP
    pub fn image_reply_get(&self, data: &[u8]) -> DtuResult<Vec<u8>> {
        let body = self.parameter().encode_image_block_ack(data);
        self.encode_reply(CosemCommand::GetResponse.as_u8(), &body)
    }

    /// Echo a firmware block in a SET_RESP
    pub fn image_reply_set(&self, data: &[u8]) -> DtuResult<Vec<u8>> {
        let body = self.parameter().encode_image_block_ack(data);
        self.encode_reply(CosemCommand::SetResponse.as_u8(), &body)
    }

    /// Lay out a frame with placeholder FCS, then splice in the computed FCS
    fn assemble(protocol: [u8; 2], info_cmd: u8, info_data: &[u8]) -> DtuResult<Vec<u8>> {
        let info_len = u16::try_from(info_data.len() + 1).map_err(|_| {
            DtuError::InvalidData(format!("INFO_DATA too long: {} bytes", info_data.len()))
        })?;

        let mut out = Vec::with_capacity(frame_len(info_len));
        out.extend_from_slice(&[HEADER, ADDRESS, CONTROL]);
        out.extend_from_slice(&protocol);
        out.extend_from_slice(&info_len.to_be_bytes());
        out.push(info_cmd);
        out.extend_from_slice(info_data);
        out.extend_from_slice(&[0x00, 0x00, END]);

        let fcs = FcsCalc::compute(&out);
        let fcs_pos = out.len() - SUFFIX_LEN;
        out[fcs_pos..fcs_pos + 2].copy_from_slice(&fcs.to_le_bytes());
        Ok(out)
    }

    pub fn protocol_id(&self) -> u16 {
        self.protocol_id
    }

    pub fn info_len(&self) -> u16 {
        self.info_len
    }

    pub fn info_cmd(&self) -> u8 {
        self.info_cmd
    }

    /// Known service code of INFO_CMD, if any
    pub fn command(&self) -> Option<CosemCommand> {
        CosemCommand::from_u8(self.info_cmd)
    }

    pub fn fcs(&self) -> u16 {
        self.fcs
    }

    /// Decode outcome of INFO_DATA, including partial or unrecognized layouts
    pub fn info_data(&self) -> &Decoded {
        &self.info_data
    }

    pub fn parameter(&self) -> &Parameter {
        self.info_data.parameter()
    }

    /// Opaque payload of a relay frame
    pub fn relay_payload(&self) -> Option<&[u8]> {
        self.parameter().payload()
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let p = self.parameter();
        writeln!(f, "{{")?;
        writeln!(f, "    header=0x7e")?;
        writeln!(f, "    address=0xff")?;
        writeln!(f, "    control=0x03")?;
        writeln!(f, "    protocol=0x{:04x}", self.protocol_id)?;
        writeln!(f, "    info_len={}", self.info_len)?;
        writeln!(f, "    info_cmd=0x{:02x}", self.info_cmd)?;
        writeln!(f, "    info_data={{")?;
        match p.param_id() {
            Some(id) => writeln!(f, "        param_id     = 0x{:04x}", id)?,
            None => writeln!(f, "        param_id     = None")?,
        }
        writeln!(f, "        param_len    = {:?}", p.param_len())?;
        match p.request_id() {
            Some(id) => writeln!(f, "        request_id   = 0x{:04x}", id)?,
            None => writeln!(f, "        request_id   = None")?,
        }
        match p.request_type() {
            Some(t) => writeln!(f, "        request_type = {}", t)?,
            None => writeln!(f, "        request_type = None")?,
        }
        match p.request_data() {
            Some(d) => writeln!(f, "        request_data = {}", d)?,
            None => writeln!(f, "        request_data = None")?,
        }
        writeln!(f, "    }}")?;
        writeln!(f, "    fcs=0x{:04x}", self.fcs)?;
        writeln!(f, "    end=0x7e")?;
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dtu_core::{DataType, RequestData};
    use tokio_test::{assert_err, assert_ok};

    const RELAY_AA_BB: [u8; 13] = [
        0x7E, 0xFF, 0x03, 0x00, 0x21, 0x00, 0x03, 0xBF, 0xAA, 0xBB, 0xB1, 0xA4, 0x7E,
    ];

    /// Build a meter-originated frame with a full little-endian protocol id
    fn meter_frame(protocol_id: u16, info_cmd: u8, info_data: &[u8]) -> Vec<u8> {
        assert_ok!(Frame::assemble(protocol_id.to_le_bytes(), info_cmd, info_data))
    }

    #[test]
    fn test_encode_relay_layout() {
        let bytes = assert_ok!(Frame::encode_relay(&[0xAA, 0xBB]));
        assert_eq!(bytes, RELAY_AA_BB.to_vec());
        assert_eq!(FcsCalc::compute_body(&bytes[3..10]), 0xA4B1);
    }

    #[test]
    fn test_relay_round_trip() {
        for payload in [vec![0x01], vec![0x7E, 0x7E, 0x7E], (0..=255u8).collect::<Vec<_>>()] {
            let bytes = assert_ok!(Frame::encode_relay(&payload));
            let frame = assert_ok!(Frame::decode(&bytes));
            assert_eq!(frame.protocol_id(), PROTOCOL_RELAY);
            assert_eq!(frame.command(), Some(CosemCommand::SeriaNet));
            assert_eq!(usize::from(frame.info_len()), payload.len() + 1);
            assert_eq!(frame.relay_payload(), Some(&payload[..]));
        }
    }

    #[test]
    fn test_encode_relay_rejects_empty() {
        assert_err!(Frame::encode_relay(&[]));
    }

    #[test]
    fn test_decode_header_mismatch() {
        let mut bytes = RELAY_AA_BB.to_vec();
        bytes[1] = 0x00;
        assert!(matches!(Frame::decode(&bytes), Err(DtuError::HeaderMismatch(h)) if h == vec![0x7E, 0x00, 0x03]));
        assert!(matches!(Frame::decode(&[0x7E]), Err(DtuError::HeaderMismatch(_))));
    }

    #[test]
    fn test_decode_checksum_mismatch() {
        let mut bytes = RELAY_AA_BB.to_vec();
        bytes[9] ^= 0x10;
        assert!(matches!(
            Frame::decode(&bytes),
            Err(DtuError::ChecksumMismatch { expected: 0xA4B1, .. })
        ));
    }

    #[test]
    fn test_decode_bad_terminator_is_truncated() {
        let mut bytes = RELAY_AA_BB.to_vec();
        bytes[12] = 0x00;
        assert!(matches!(Frame::decode(&bytes), Err(DtuError::Truncated(_))));
    }

    #[test]
    fn test_decode_short_input_is_truncated() {
        assert!(matches!(Frame::decode(&RELAY_AA_BB[..9]), Err(DtuError::Truncated(_))));
        assert!(matches!(Frame::decode(&RELAY_AA_BB[..5]), Err(DtuError::Truncated(_))));
        assert!(matches!(
            Frame::decode(&[0x7E, 0xFF, 0x03, 0x00, 0x21, 0x00, 0x00, 0x00, 0x00, 0x7E]),
            Err(DtuError::Truncated(_))
        ));
    }

    #[test]
    fn test_decode_ignores_trailing_bytes() {
        let mut bytes = RELAY_AA_BB.to_vec();
        bytes.extend_from_slice(&[0x7E, 0xFF, 0x03]);
        let frame = assert_ok!(Frame::decode(&bytes));
        assert_eq!(frame.relay_payload(), Some(&[0xAA, 0xBB][..]));
        assert_eq!(frame.fcs(), 0xA4B1);
    }

    #[test]
    fn test_encode_command_get() {
        let bytes = assert_ok!(Frame::encode_command(0xC0, 0x8003, None));
        assert_eq!(&bytes[..10], &[0x7E, 0xFF, 0x03, 0x00, 0x22, 0x00, 0x03, 0xC0, 0x03, 0x80]);
        assert_eq!(bytes.len(), 13);
        assert_eq!(*bytes.last().unwrap(), END);

        let frame = assert_ok!(Frame::decode(&bytes));
        assert_eq!(frame.protocol_id(), PROTOCOL_MODULE_COMMAND);
        assert_eq!(frame.command(), Some(CosemCommand::Get));
        assert_eq!(frame.parameter().param_id(), Some(0x8003));
    }

    #[test]
    fn test_encode_command_set() {
        let bytes = assert_ok!(Frame::encode_command(0xC1, 0x2010, Some(&[0x01, 0x02, 0x03])));
        assert_eq!(&bytes[5..7], &[0x00, 0x06]);
        assert_eq!(&bytes[7..13], &[0xC1, 0x10, 0x20, 0x01, 0x02, 0x03]);
        assert_ok!(Frame::decode(&bytes));
    }

    #[test]
    fn test_encode_command_arity() {
        assert!(matches!(
            Frame::encode_command(0xC0, 0x8003, Some(&[0x01])),
            Err(DtuError::Arity(_))
        ));
        assert!(matches!(
            Frame::encode_command(0xC1, 0x8003, None),
            Err(DtuError::Arity(_))
        ));
    }

    #[test]
    fn test_reply_get_untyped() {
        // Meter asks for the signal quality: GET 0x8003, request id 0x0001
        let request = meter_frame(0x2200, 0xC0, &[0x03, 0x80, 0x00, 0x01]);
        let frame = assert_ok!(Frame::decode(&request));
        // 0x8003 with trailing bytes is read as a module report
        assert_eq!(frame.parameter().param_id(), Some(0x8003));

        let reply = assert_ok!(frame.reply_get(GetReply::Untyped(0x1F), true));
        assert_eq!(&reply[..8], &[0x7E, 0xFF, 0x03, 0x00, 0x22, 0x00, 0x05, 0xC4]);
        assert_eq!(&reply[8..12], &[0x03, 0x80, 0x01, 0x1F]);

        let decoded = assert_ok!(Frame::decode(&reply));
        assert_eq!(decoded.command(), Some(CosemCommand::GetResponse));
        assert_eq!(decoded.parameter().payload(), Some(&[0x1F][..]));
    }

    #[test]
    fn test_reply_get_typed_and_failed() {
        let request = meter_frame(0x2200, 0xC0, &[0x10, 0x20, 0x00, 0x07]);
        let frame = assert_ok!(Frame::decode(&request));
        assert_eq!(frame.parameter().request_id(), Some(0x0007));

        let reply = assert_ok!(frame.reply_get(
            GetReply::Typed {
                data_type: DataType::Int8U,
                value: &[0x05],
            },
            true,
        ));
        assert_eq!(&reply[7..14], &[0xC4, 0x10, 0x20, 0x04, 0x00, 0x07, 0x11]);
        assert_eq!(reply[14], 0x05);

        let failed = assert_ok!(frame.reply_get(GetReply::Untyped(0), false));
        assert_eq!(&failed[7..12], &[0xC8, 0x10, 0x20, 0x01, 0x0C]);
        assert_ok!(Frame::decode(&failed));
    }

    #[test]
    fn test_reply_set() {
        let request = meter_frame(0x2200, 0xC1, &[0x02, 0x80, 0x04, 0x00, 0x01, 0x11, 0x01]);
        let frame = assert_ok!(Frame::decode(&request));
        assert_eq!(frame.parameter().request_data(), Some(&RequestData::U8(1)));

        let ok = assert_ok!(frame.reply_set(true));
        assert_eq!(&ok[5..12], &[0x00, 0x05, 0xC5, 0x02, 0x80, 0x01, 0x00]);
        let failed = assert_ok!(frame.reply_set(false));
        assert_eq!(failed[11], 0x0C);
        assert_ok!(Frame::decode(&ok));
    }

    #[test]
    fn test_reply_event() {
        let request = meter_frame(0x2100, 0xC2, &[0x01, 0x28, 0x00]);
        let frame = assert_ok!(Frame::decode(&request));
        let reply = assert_ok!(frame.reply_event());
        assert_eq!(&reply[3..10], &[0x00, 0x21, 0x00, 0x03, 0xBF, 0x01, 0x00]);
        assert_ok!(Frame::decode(&reply));
    }

    #[test]
    fn test_image_replies() {
        let block = [0x08, 0x30, 0x00, 0xDE, 0xAD];
        let request = meter_frame(0x2200, 0xC1, &block);
        let frame = assert_ok!(Frame::decode(&request));
        assert_eq!(frame.parameter().payload(), Some(&[0xDE, 0xAD][..]));

        let get = assert_ok!(frame.image_reply_get(&[0xDE, 0xAD]));
        assert_eq!(&get[7..13], &[0xC4, 0x08, 0x30, 0x02, 0xDE, 0xAD]);
        let set = assert_ok!(frame.image_reply_set(&[0xDE, 0xAD]));
        assert_eq!(set[7], 0xC5);
        assert_ok!(Frame::decode(&set));
    }

    #[test]
    fn test_display_and_hex() {
        let frame = assert_ok!(Frame::decode(&RELAY_AA_BB));
        let text = frame.to_string();
        assert!(text.contains("protocol=0x2100"));
        assert!(text.contains("info_cmd=0xbf"));
        assert!(text.contains("request_data = aa bb"));
        assert_eq!(to_hex(&RELAY_AA_BB[..3]), "7e ff 03");
    }

    #[test]
    fn test_frame_len_helpers() {
        assert_eq!(frame_len(3), 13);
        assert_eq!(peek_info_len(&RELAY_AA_BB), Some(3));
        assert_eq!(peek_info_len(&RELAY_AA_BB[..6]), None);
        assert!(starts_with_header(&RELAY_AA_BB));
        assert!(!starts_with_header(&RELAY_AA_BB[1..]));
    }
}
