//! COSEM service codes, data types and parameter identifiers
//!
//! The INFO-CMD byte of every frame carries one of the service codes below.
//! Unknown codes still travel through the codec as raw bytes; the enum is
//! only used where a decision has to be made on the code.

use crate::error::{DtuError, DtuResult};
use std::fmt;

/// COSEM service code carried in a frame's INFO-CMD byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CosemCommand {
    Get = 0xC0,
    Set = 0xC1,
    Event = 0xC2,
    Action = 0xC3,
    GetResponse = 0xC4,
    SetResponse = 0xC5,
    EventResponse = 0xC6,
    ActionResponse = 0xC7,
    ErrorResponse = 0xC8,
    /// Serial-network relay, the payload is opaque meter traffic
    SeriaNet = 0xBF,
}

impl CosemCommand {
    /// Reply code used for serial-network relays; shares its value with EVENT_RESP
    pub const SERIA_NET_RESPONSE: CosemCommand = CosemCommand::EventResponse;

    /// Map a raw INFO-CMD byte onto a known service code
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0xC0 => Some(Self::Get),
            0xC1 => Some(Self::Set),
            0xC2 => Some(Self::Event),
            0xC3 => Some(Self::Action),
            0xC4 => Some(Self::GetResponse),
            0xC5 => Some(Self::SetResponse),
            0xC6 => Some(Self::EventResponse),
            0xC7 => Some(Self::ActionResponse),
            0xC8 => Some(Self::ErrorResponse),
            0xBF => Some(Self::SeriaNet),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl From<CosemCommand> for u8 {
    fn from(command: CosemCommand) -> Self {
        command as u8
    }
}

/// Data type tag of a typed request value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DataType {
    Int32U = 0x06,
    Str = 0x09,
    Char = 0x0A,
    Int8U = 0x11,
    Int16U = 0x12,
    DateTime = 0x19,
}

impl DataType {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// CHAR and STR values are carried as length-prefixed text
    pub fn is_text(self) -> bool {
        matches!(self, DataType::Char | DataType::Str)
    }
}

impl TryFrom<u8> for DataType {
    type Error = DtuError;

    fn try_from(value: u8) -> DtuResult<Self> {
        match value {
            0x06 => Ok(DataType::Int32U),
            0x09 => Ok(DataType::Str),
            0x0A => Ok(DataType::Char),
            0x11 => Ok(DataType::Int8U),
            0x12 => Ok(DataType::Int16U),
            0x19 => Ok(DataType::DateTime),
            other => Err(DtuError::UnsupportedDataType(other)),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::Int32U => "INT32U",
            DataType::Str => "STR",
            DataType::Char => "CHAR",
            DataType::Int8U => "INT8U",
            DataType::Int16U => "INT16U",
            DataType::DateTime => "DATETIME",
        };
        write!(f, "{}(0x{:02X})", name, self.as_u8())
    }
}

/// Acknowledgement code carried in SET and event replies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AckCode {
    Success = 0x00,
    Failed = 0x0C,
}

impl AckCode {
    pub fn from_success(success: bool) -> Self {
        if success { AckCode::Success } else { AckCode::Failed }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Well-known parameter identifiers
pub mod param_id {
    /// Module state
    pub const MODULE_STATE: u16 = 0x8002;
    /// Link quality (signal strength) report
    pub const LQI: u16 = 0x8003;
    pub const METER_SN: u16 = 0x8005;
    pub const DEVICE_NAME: u16 = 0x8007;

    /// Untyped module reports: `[param_id][len][bytes]`
    pub const MODULE_REPORTS: [u16; 3] = [LQI, METER_SN, DEVICE_NAME];

    /// Firmware image block transfers; the block size is negotiated out of band
    pub const IMAGE_BLOCKS: [u16; 4] = [0x3007, 0x3008, 0x3009, 0x300A];

    /// Image lifecycle and event parameters answered with GET_RESP
    pub const IMAGE_LIFECYCLE: [u16; 10] = [
        0x280F, 0x2801, 0x2802, 0x2803, 0x2804, 0x2805, 0x2806, 0x2807, 0x2860, 0x2861,
    ];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_from_u8() {
        assert_eq!(CosemCommand::from_u8(0xBF), Some(CosemCommand::SeriaNet));
        assert_eq!(CosemCommand::from_u8(0xC8), Some(CosemCommand::ErrorResponse));
        assert_eq!(CosemCommand::from_u8(0x00), None);
        assert_eq!(CosemCommand::SERIA_NET_RESPONSE.as_u8(), 0xC6);
    }

    #[test]
    fn test_data_type_try_from() {
        assert_eq!(DataType::try_from(0x12).unwrap(), DataType::Int16U);
        assert!(DataType::try_from(0x12).unwrap().as_u8() == 0x12);
        assert!(matches!(
            DataType::try_from(0x42),
            Err(DtuError::UnsupportedDataType(0x42))
        ));
        assert!(DataType::Char.is_text());
        assert!(!DataType::Int8U.is_text());
    }

    #[test]
    fn test_ack_code() {
        assert_eq!(AckCode::from_success(true).as_u8(), 0x00);
        assert_eq!(AckCode::from_success(false).as_u8(), 0x0C);
    }
}
