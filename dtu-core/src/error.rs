use thiserror::Error;

/// Main error type for the DTU bridge
#[derive(Error, Debug)]
pub enum DtuError {
    #[error("Connection error: {0}")]
    Connection(#[from] std::io::Error),

    #[error("Timeout")]
    Timeout,

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Frame header mismatch: expected 7E FF 03, got {0:02X?}")]
    HeaderMismatch(Vec<u8>),

    #[error("FCS mismatch: frame carries 0x{expected:04X}, computed 0x{computed:04X}")]
    ChecksumMismatch { expected: u16, computed: u16 },

    #[error("Truncated: {0}")]
    Truncated(String),

    #[error("Unrecognized parameter 0x{param_id:04X} for command 0x{mode:02X}")]
    UnrecognizedParameter { param_id: u16, mode: u8 },

    #[error("Unsupported data type: 0x{0:02X}")]
    UnsupportedDataType(u8),

    #[error("Arity error: {0}")]
    Arity(String),

    #[error("Protocol 0x{0:04X} is already registered")]
    DuplicateRegistration(u16),

    #[error("No handler registered for protocol 0x{0:04X}")]
    UnroutableProtocolId(u16),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias for DTU bridge operations
pub type DtuResult<T> = Result<T, DtuError>;
