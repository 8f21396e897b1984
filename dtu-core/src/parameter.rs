//! COSEM parameter codec (the INFO-DATA content of a frame)
//!
//! The layout of INFO-DATA depends jointly on the frame's INFO-CMD byte and on
//! the little-endian parameter identifier in its first two bytes:
//!
//! | Selector                          | Layout after `param_id`                          |
//! |-----------------------------------|--------------------------------------------------|
//! | `SERIA_NET`                       | none, the whole payload is opaque meter traffic  |
//! | module reports (0x8003/5/7)       | `[len][bytes; len]`                              |
//! | image blocks (0x3007..=0x300A)    | `[?][bytes; image_len - 3]`                      |
//! | `GET_RESP` + image lifecycle ids  | `[len][bytes; len]`                              |
//! | `SET`                             | `[len][request_id BE:2][type][value]`            |
//! | `GET`                             | `[request_id BE:2]`                              |
//!
//! Decoding never fails outright. Input that is too short, or a SET carrying a
//! type this codec does not understand, yields [`Decoded::Partial`] with every
//! field read up to the failure point; selector combinations with no known
//! layout yield [`Decoded::Unrecognized`] carrying only the parameter id.

use crate::cosem::{param_id, AckCode, CosemCommand, DataType};
use crate::error::{DtuError, DtuResult};
use std::fmt;

/// Value carried by a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestData {
    /// Raw bytes: relay payloads, untyped reports, text values, image blocks
    Bytes(Vec<u8>),
    U8(u8),
    U16(u16),
    /// INT32U values travel as big-endian signed integers
    I32(i32),
}

impl RequestData {
    /// Borrow the raw bytes, if this is a byte value
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            RequestData::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Widen an integer value
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            RequestData::U8(v) => Some(i64::from(*v)),
            RequestData::U16(v) => Some(i64::from(*v)),
            RequestData::I32(v) => Some(i64::from(*v)),
            RequestData::Bytes(_) => None,
        }
    }
}

impl fmt::Display for RequestData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestData::Bytes(bytes) => {
                for (i, b) in bytes.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{:02x}", b)?;
                }
                Ok(())
            }
            RequestData::U8(v) => write!(f, "{}", v),
            RequestData::U16(v) => write!(f, "{}", v),
            RequestData::I32(v) => write!(f, "{}", v),
        }
    }
}

/// Why a decode stopped before the parameter was fully populated
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartialReason {
    /// The payload ended before a field could be read
    Truncated { needed: usize, available: usize },
    /// A SET carried a type tag with no known value layout
    UnsupportedDataType(u8),
    /// An image block arrived without the negotiated block size
    MissingImageLength,
}

impl From<PartialReason> for DtuError {
    fn from(reason: PartialReason) -> Self {
        match reason {
            PartialReason::Truncated { needed, available } => DtuError::Truncated(format!(
                "parameter needs {} bytes, {} available",
                needed, available
            )),
            PartialReason::UnsupportedDataType(tag) => DtuError::UnsupportedDataType(tag),
            PartialReason::MissingImageLength => {
                DtuError::InvalidData("image block decoded without a block length".to_string())
            }
        }
    }
}

/// Outcome of [`Parameter::decode`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// Every field the layout defines was read
    Complete(Parameter),
    /// Decoding stopped early; fields read so far are kept
    Partial {
        parameter: Parameter,
        reason: PartialReason,
    },
    /// No layout is known for this command / parameter id; only `param_id` is set
    Unrecognized(Parameter),
}

impl Decoded {
    pub fn parameter(&self) -> &Parameter {
        match self {
            Decoded::Complete(parameter)
            | Decoded::Partial { parameter, .. }
            | Decoded::Unrecognized(parameter) => parameter,
        }
    }

    pub fn into_parameter(self) -> Parameter {
        match self {
            Decoded::Complete(parameter)
            | Decoded::Partial { parameter, .. }
            | Decoded::Unrecognized(parameter) => parameter,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, Decoded::Complete(_))
    }

    pub fn partial_reason(&self) -> Option<&PartialReason> {
        match self {
            Decoded::Partial { reason, .. } => Some(reason),
            _ => None,
        }
    }

    /// Convert to a strict result, treating partial and unrecognized layouts as errors
    pub fn into_result(self, mode: u8) -> DtuResult<Parameter> {
        match self {
            Decoded::Complete(parameter) => Ok(parameter),
            Decoded::Partial { reason, .. } => Err(reason.into()),
            Decoded::Unrecognized(parameter) => Err(DtuError::UnrecognizedParameter {
                param_id: parameter.param_id.unwrap_or_default(),
                mode,
            }),
        }
    }
}

/// Value of a GET reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GetReply<'a> {
    /// Typed value; text types are length-prefixed, integer types are sent as given
    Typed { data_type: DataType, value: &'a [u8] },
    /// Single untyped byte, e.g. a signal quality report
    Untyped(u8),
}

/// Structured content of a frame's INFO-DATA field
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Parameter {
    param_id: Option<u16>,
    param_len: Option<usize>,
    request_id: Option<u16>,
    request_type: Option<DataType>,
    request_data: Option<RequestData>,
    request_data_len: Option<usize>,
}

impl Parameter {
    /// Create a parameter carrying only its identifier, for building replies
    pub fn new(param_id: u16) -> Self {
        Self {
            param_id: Some(param_id),
            ..Self::default()
        }
    }

    pub fn with_request_id(mut self, request_id: u16) -> Self {
        self.request_id = Some(request_id);
        self
    }

    /// Decode INFO-DATA for the given INFO-CMD
    ///
    /// `image_len` is the negotiated firmware block length; the frame codec
    /// passes the INFO-DATA length.
    pub fn decode(data: &[u8], mode: u8, image_len: Option<usize>) -> Decoded {
        let mut parameter = Parameter::default();
        match parameter.fill(data, mode, image_len) {
            Ok(true) => Decoded::Complete(parameter),
            Ok(false) => {
                log::debug!(
                    "No layout for parameter {:04X?} under command 0x{:02X}",
                    parameter.param_id,
                    mode
                );
                Decoded::Unrecognized(parameter)
            }
            Err(reason) => {
                log::warn!(
                    "Partial decode of parameter {:04X?} (command 0x{:02X}): {:?}",
                    parameter.param_id,
                    mode,
                    reason
                );
                Decoded::Partial { parameter, reason }
            }
        }
    }

    /// Populate fields in wire order; `Ok(false)` means no layout matched
    fn fill(&mut self, data: &[u8], mode: u8, image_len: Option<usize>) -> Result<bool, PartialReason> {
        if mode == CosemCommand::SeriaNet.as_u8() {
            self.request_data = Some(RequestData::Bytes(data.to_vec()));
            return Ok(true);
        }

        let id = u16::from_le_bytes(take::<2>(data, 0)?);
        self.param_id = Some(id);

        if param_id::MODULE_REPORTS.contains(&id) && data.len() > 2 {
            let len = usize::from(data[2]);
            self.param_len = Some(len);
            self.request_data = Some(RequestData::Bytes(slice(data, 3, len)?.to_vec()));
            return Ok(true);
        }

        if param_id::IMAGE_BLOCKS.contains(&id) && data.len() > 2 {
            let image_len = image_len.ok_or(PartialReason::MissingImageLength)?;
            let len = (image_len + 1).checked_sub(4).ok_or(PartialReason::Truncated {
                needed: 3,
                available: image_len,
            })?;
            self.param_len = Some(len);
            self.request_data = Some(RequestData::Bytes(slice(data, 3, len)?.to_vec()));
            return Ok(true);
        }

        match CosemCommand::from_u8(mode) {
            Some(CosemCommand::GetResponse) if param_id::IMAGE_LIFECYCLE.contains(&id) => {
                if data.len() > 2 {
                    let len = usize::from(data[2]);
                    self.param_len = Some(len);
                    self.request_data = Some(RequestData::Bytes(slice(data, 3, len)?.to_vec()));
                    self.request_data_len = Some(len.saturating_sub(3));
                } else {
                    self.request_data_len = Some(0);
                }
                Ok(true)
            }
            Some(CosemCommand::Set) => {
                let len = usize::from(take::<1>(data, 2)?[0]);
                self.param_len = Some(len);
                self.request_id = Some(u16::from_be_bytes(take::<2>(data, 3)?));
                let tag = take::<1>(data, 5)?[0];
                let data_type =
                    DataType::try_from(tag).map_err(|_| PartialReason::UnsupportedDataType(tag))?;
                self.request_type = Some(data_type);
                let value = match data_type {
                    DataType::Char | DataType::Str => {
                        // byte 6 repeats the text length; param_len covers request_id, type and it
                        let text_len = len.checked_sub(4).ok_or(PartialReason::Truncated {
                            needed: 4,
                            available: len,
                        })?;
                        RequestData::Bytes(slice(data, 7, text_len)?.to_vec())
                    }
                    DataType::Int8U => RequestData::U8(take::<1>(data, 6)?[0]),
                    DataType::Int16U => RequestData::U16(u16::from_be_bytes(take::<2>(data, 6)?)),
                    DataType::Int32U => RequestData::I32(i32::from_be_bytes(take::<4>(data, 6)?)),
                    DataType::DateTime => return Err(PartialReason::UnsupportedDataType(tag)),
                };
                self.request_data = Some(value);
                Ok(true)
            }
            Some(CosemCommand::Get) => {
                self.request_id = Some(u16::from_be_bytes(take::<2>(data, 2)?));
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Body of a successful GET reply: `[param_id LE][param_len][body]`
    ///
    /// Typed bodies start with the request id (big-endian) when the request
    /// carried one.
    pub fn encode_get_reply(&self, reply: GetReply<'_>) -> DtuResult<Vec<u8>> {
        let mut body = Vec::new();
        match reply {
            GetReply::Typed { data_type, value } => {
                if let Some(request_id) = self.request_id {
                    body.extend_from_slice(&request_id.to_be_bytes());
                }
                match data_type {
                    DataType::Char | DataType::Str => {
                        body.push(data_type.as_u8());
                        body.push((value.len() & 0xFF) as u8);
                        body.extend_from_slice(value);
                    }
                    DataType::Int8U | DataType::Int16U => {
                        body.push(data_type.as_u8());
                        body.extend_from_slice(value);
                    }
                    other => return Err(DtuError::UnsupportedDataType(other.as_u8())),
                }
            }
            GetReply::Untyped(value) => body.push(value),
        }

        let param_len = u8::try_from(body.len()).map_err(|_| {
            DtuError::InvalidData(format!("GET reply body too long: {} bytes", body.len()))
        })?;
        let mut out = Vec::with_capacity(3 + body.len());
        out.extend_from_slice(&self.param_id_or_zero().to_le_bytes());
        out.push(param_len);
        out.extend_from_slice(&body);
        Ok(out)
    }

    /// Fixed one-byte acknowledgement: `[param_id LE][0x01][ack]`
    pub fn encode_set_ack(&self, ack: AckCode) -> Vec<u8> {
        let id = self.param_id_or_zero().to_le_bytes();
        vec![id[0], id[1], 0x01, ack.as_u8()]
    }

    /// Echo of a firmware block: `[param_id LE][len & 0xFF][data]`
    pub fn encode_image_block_ack(&self, data: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(3 + data.len());
        out.extend_from_slice(&self.param_id_or_zero().to_le_bytes());
        out.push((data.len() & 0xFF) as u8);
        out.extend_from_slice(data);
        out
    }

    /// Event acknowledgement body, independent of any parameter
    pub fn encode_event_ack() -> Vec<u8> {
        vec![0x01, AckCode::Success.as_u8()]
    }

    fn param_id_or_zero(&self) -> u16 {
        self.param_id.unwrap_or_default()
    }

    pub fn param_id(&self) -> Option<u16> {
        self.param_id
    }

    pub fn param_len(&self) -> Option<usize> {
        self.param_len
    }

    pub fn request_id(&self) -> Option<u16> {
        self.request_id
    }

    pub fn request_type(&self) -> Option<DataType> {
        self.request_type
    }

    pub fn request_data(&self) -> Option<&RequestData> {
        self.request_data.as_ref()
    }

    pub fn request_data_len(&self) -> Option<usize> {
        self.request_data_len
    }

    /// Raw relay payload, if this parameter carries bytes
    pub fn payload(&self) -> Option<&[u8]> {
        self.request_data.as_ref().and_then(RequestData::as_bytes)
    }
}

fn take<const N: usize>(data: &[u8], start: usize) -> Result<[u8; N], PartialReason> {
    let mut out = [0u8; N];
    out.copy_from_slice(slice(data, start, N)?);
    Ok(out)
}

fn slice(data: &[u8], start: usize, len: usize) -> Result<&[u8], PartialReason> {
    data.get(start..start + len).ok_or(PartialReason::Truncated {
        needed: start + len,
        available: data.len(),
    })
}
