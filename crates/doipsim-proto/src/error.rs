//! Codec errors

use thiserror::Error;

use crate::payload::GenericNackCode;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtoError {
    #[error("Incorrect header pattern: version 0x{version:02X}, inverse 0x{inverse:02X}")]
    IncorrectPattern { version: u8, inverse: u8 },

    #[error("Unknown payload type 0x{0:04X}")]
    UnknownPayloadType(u16),

    #[error("Message too large: {length} bytes (max {max})")]
    MessageTooLarge { length: u32, max: u32 },

    #[error("Invalid payload length {length} for payload type 0x{payload_type:04X}")]
    InvalidPayloadLength { payload_type: u16, length: usize },

    #[error("Header truncated: {0} bytes")]
    Truncated(usize),
}

impl ProtoError {
    /// Generic header NACK code a DoIP entity answers this error with
    pub fn nack_code(&self) -> GenericNackCode {
        match self {
            Self::IncorrectPattern { .. } | Self::Truncated(_) => {
                GenericNackCode::IncorrectPatternFormat
            }
            Self::UnknownPayloadType(_) => GenericNackCode::UnknownPayloadType,
            Self::MessageTooLarge { .. } => GenericNackCode::MessageTooLarge,
            Self::InvalidPayloadLength { .. } => GenericNackCode::InvalidPayloadLength,
        }
    }

    /// Whether ISO 13400-2 requires closing the TCP socket after the NACK
    pub fn closes_socket(&self) -> bool {
        !matches!(self, Self::UnknownPayloadType(_) | Self::MessageTooLarge { .. })
    }
}
