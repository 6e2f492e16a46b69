//! DoIP generic header

use bytes::{Buf, BufMut};

use crate::error::ProtoError;

/// Protocol version emitted by the simulator (ISO 13400-2:2012)
pub const DEFAULT_PROTOCOL_VERSION: u8 = 0x02;

/// Default version allowed only in vehicle identification requests
const DEFAULT_VERSION_VIR: u8 = 0xFF;

pub const HEADER_LEN: usize = 8;

/// Payload types understood by the simulator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum PayloadType {
    GenericNack = 0x0000,
    VehicleIdentificationRequest = 0x0001,
    VehicleIdentificationRequestWithEid = 0x0002,
    VehicleIdentificationRequestWithVin = 0x0003,
    VehicleAnnouncement = 0x0004,
    RoutingActivationRequest = 0x0005,
    RoutingActivationResponse = 0x0006,
    AliveCheckRequest = 0x0007,
    AliveCheckResponse = 0x0008,
    EntityStatusRequest = 0x4001,
    EntityStatusResponse = 0x4002,
    PowerModeRequest = 0x4003,
    PowerModeResponse = 0x4004,
    DiagnosticMessage = 0x8001,
    DiagnosticMessagePositiveAck = 0x8002,
    DiagnosticMessageNegativeAck = 0x8003,
}

impl PayloadType {
    pub fn from_u16(value: u16) -> Option<Self> {
        use PayloadType::*;
        Some(match value {
            0x0000 => GenericNack,
            0x0001 => VehicleIdentificationRequest,
            0x0002 => VehicleIdentificationRequestWithEid,
            0x0003 => VehicleIdentificationRequestWithVin,
            0x0004 => VehicleAnnouncement,
            0x0005 => RoutingActivationRequest,
            0x0006 => RoutingActivationResponse,
            0x0007 => AliveCheckRequest,
            0x0008 => AliveCheckResponse,
            0x4001 => EntityStatusRequest,
            0x4002 => EntityStatusResponse,
            0x4003 => PowerModeRequest,
            0x4004 => PowerModeResponse,
            0x8001 => DiagnosticMessage,
            0x8002 => DiagnosticMessagePositiveAck,
            0x8003 => DiagnosticMessageNegativeAck,
            _ => return None,
        })
    }

    fn is_vehicle_identification_request(self) -> bool {
        matches!(
            self,
            Self::VehicleIdentificationRequest
                | Self::VehicleIdentificationRequestWithEid
                | Self::VehicleIdentificationRequestWithVin
        )
    }
}

impl From<PayloadType> for u16 {
    fn from(value: PayloadType) -> Self {
        value as u16
    }
}

/// Parsed generic header
///
/// The payload type is kept raw so that a frame with an unknown type can still
/// be skipped using its length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DoipHeader {
    pub protocol_version: u8,
    pub payload_type: u16,
    pub payload_length: u32,
}

impl DoipHeader {
    pub fn new(payload_type: PayloadType, payload_length: u32) -> Self {
        Self {
            protocol_version: DEFAULT_PROTOCOL_VERSION,
            payload_type: payload_type.into(),
            payload_length,
        }
    }

    /// Parse and validate the first [`HEADER_LEN`] bytes of `data`
    ///
    /// Only the synchronisation pattern is checked here; payload type and
    /// length checks are left to [`DoipHeader::payload_kind`] and
    /// [`DoipHeader::check_length`] so the caller can decide how to recover.
    pub fn parse(data: &[u8]) -> Result<Self, ProtoError> {
        if data.len() < HEADER_LEN {
            return Err(ProtoError::Truncated(data.len()));
        }
        let mut buf = &data[..HEADER_LEN];
        let version = buf.get_u8();
        let inverse = buf.get_u8();
        let payload_type = buf.get_u16();
        let payload_length = buf.get_u32();

        if version != !inverse {
            return Err(ProtoError::IncorrectPattern { version, inverse });
        }
        let version_ok = match version {
            0x01..=0x03 => true,
            DEFAULT_VERSION_VIR => PayloadType::from_u16(payload_type)
                .is_some_and(PayloadType::is_vehicle_identification_request),
            _ => false,
        };
        if !version_ok {
            return Err(ProtoError::IncorrectPattern { version, inverse });
        }

        Ok(Self {
            protocol_version: version,
            payload_type,
            payload_length,
        })
    }

    pub fn payload_kind(&self) -> Result<PayloadType, ProtoError> {
        PayloadType::from_u16(self.payload_type)
            .ok_or(ProtoError::UnknownPayloadType(self.payload_type))
    }

    pub fn check_length(&self, max_data_size: u32) -> Result<(), ProtoError> {
        if self.payload_length > max_data_size {
            return Err(ProtoError::MessageTooLarge {
                length: self.payload_length,
                max: max_data_size,
            });
        }
        Ok(())
    }

    pub fn write(&self, buf: &mut impl BufMut) {
        buf.put_u8(self.protocol_version);
        buf.put_u8(!self.protocol_version);
        buf.put_u16(self.payload_type);
        buf.put_u32(self.payload_length);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_valid_header() {
        let header = DoipHeader::parse(&[0x02, 0xFD, 0x80, 0x01, 0x00, 0x00, 0x00, 0x06]).unwrap();
        assert_eq!(header.protocol_version, 0x02);
        assert_eq!(header.payload_kind(), Ok(PayloadType::DiagnosticMessage));
        assert_eq!(header.payload_length, 6);
    }

    #[test]
    fn inverse_mismatch_is_rejected() {
        assert!(matches!(
            DoipHeader::parse(&[0x02, 0x02, 0x00, 0x05, 0, 0, 0, 7]),
            Err(ProtoError::IncorrectPattern { .. })
        ));
    }

    #[test]
    fn default_version_only_for_identification() {
        assert!(DoipHeader::parse(&[0xFF, 0x00, 0x00, 0x01, 0, 0, 0, 0]).is_ok());
        assert!(DoipHeader::parse(&[0xFF, 0x00, 0x00, 0x05, 0, 0, 0, 7]).is_err());
    }

    #[test]
    fn unknown_payload_type_keeps_length() {
        let header = DoipHeader::parse(&[0x02, 0xFD, 0x12, 0x34, 0, 0, 0, 3]).unwrap();
        assert_eq!(header.payload_kind(), Err(ProtoError::UnknownPayloadType(0x1234)));
        assert_eq!(header.payload_length, 3);
    }

    #[test]
    fn too_large() {
        let header = DoipHeader::new(PayloadType::DiagnosticMessage, 100);
        assert!(header.check_length(100).is_ok());
        assert!(matches!(
            header.check_length(99),
            Err(ProtoError::MessageTooLarge { length: 100, max: 99 })
        ));
    }

    #[test]
    fn truncated() {
        assert_eq!(DoipHeader::parse(&[0x02, 0xFD]), Err(ProtoError::Truncated(2)));
    }
}
