//! DoIP messages: one enum variant per payload type

use bytes::{Bytes, BytesMut};

use crate::error::ProtoError;
use crate::header::{DoipHeader, PayloadType, HEADER_LEN};
use crate::payload::{
    AliveCheckResponse, DiagnosticAckCode, DiagnosticMessage, DiagnosticMessageAck,
    DiagnosticNackCode, EntityStatusResponse, GenericNackCode, RoutingActivationCode,
    RoutingActivationRequest, RoutingActivationResponse, VehicleAnnouncement,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DoipMessage {
    GenericNack(GenericNackCode),
    VehicleIdentificationRequest,
    VehicleIdentificationRequestWithEid([u8; 6]),
    VehicleIdentificationRequestWithVin([u8; 17]),
    VehicleAnnouncement(VehicleAnnouncement),
    RoutingActivationRequest(RoutingActivationRequest),
    RoutingActivationResponse(RoutingActivationResponse),
    AliveCheckRequest,
    AliveCheckResponse(AliveCheckResponse),
    EntityStatusRequest,
    EntityStatusResponse(EntityStatusResponse),
    PowerModeRequest,
    PowerModeResponse(u8),
    DiagnosticMessage(DiagnosticMessage),
    DiagnosticMessagePositiveAck(DiagnosticMessageAck<DiagnosticAckCode>),
    DiagnosticMessageNegativeAck(DiagnosticMessageAck<DiagnosticNackCode>),
}

impl DoipMessage {
    pub fn routing_activation_response(
        tester_address: u16,
        entity_address: u16,
        code: RoutingActivationCode,
    ) -> Self {
        Self::RoutingActivationResponse(RoutingActivationResponse {
            tester_address,
            entity_address,
            code,
            oem_specific: None,
        })
    }

    pub fn diagnostic(source_address: u16, target_address: u16, user_data: impl Into<Bytes>) -> Self {
        Self::DiagnosticMessage(DiagnosticMessage {
            source_address,
            target_address,
            user_data: user_data.into(),
        })
    }

    pub fn diagnostic_ack(source_address: u16, target_address: u16) -> Self {
        Self::DiagnosticMessagePositiveAck(DiagnosticMessageAck {
            source_address,
            target_address,
            code: DiagnosticAckCode::Acknowledged,
            previous_data: Bytes::new(),
        })
    }

    pub fn diagnostic_nack(source_address: u16, target_address: u16, code: DiagnosticNackCode) -> Self {
        Self::DiagnosticMessageNegativeAck(DiagnosticMessageAck {
            source_address,
            target_address,
            code,
            previous_data: Bytes::new(),
        })
    }

    pub fn payload_type(&self) -> PayloadType {
        match self {
            Self::GenericNack(_) => PayloadType::GenericNack,
            Self::VehicleIdentificationRequest => PayloadType::VehicleIdentificationRequest,
            Self::VehicleIdentificationRequestWithEid(_) => {
                PayloadType::VehicleIdentificationRequestWithEid
            }
            Self::VehicleIdentificationRequestWithVin(_) => {
                PayloadType::VehicleIdentificationRequestWithVin
            }
            Self::VehicleAnnouncement(_) => PayloadType::VehicleAnnouncement,
            Self::RoutingActivationRequest(_) => PayloadType::RoutingActivationRequest,
            Self::RoutingActivationResponse(_) => PayloadType::RoutingActivationResponse,
            Self::AliveCheckRequest => PayloadType::AliveCheckRequest,
            Self::AliveCheckResponse(_) => PayloadType::AliveCheckResponse,
            Self::EntityStatusRequest => PayloadType::EntityStatusRequest,
            Self::EntityStatusResponse(_) => PayloadType::EntityStatusResponse,
            Self::PowerModeRequest => PayloadType::PowerModeRequest,
            Self::PowerModeResponse(_) => PayloadType::PowerModeResponse,
            Self::DiagnosticMessage(_) => PayloadType::DiagnosticMessage,
            Self::DiagnosticMessagePositiveAck(_) => PayloadType::DiagnosticMessagePositiveAck,
            Self::DiagnosticMessageNegativeAck(_) => PayloadType::DiagnosticMessageNegativeAck,
        }
    }

    /// Encode header and payload into one frame
    pub fn encode(&self) -> Bytes {
        let mut payload = BytesMut::new();
        self.write_payload(&mut payload);

        let mut frame = BytesMut::with_capacity(HEADER_LEN + payload.len());
        DoipHeader::new(self.payload_type(), payload.len() as u32).write(&mut frame);
        frame.extend_from_slice(&payload);
        frame.freeze()
    }

    fn write_payload(&self, buf: &mut BytesMut) {
        use bytes::BufMut;

        match self {
            Self::GenericNack(code) => buf.put_u8((*code).into()),
            Self::VehicleIdentificationRequest
            | Self::AliveCheckRequest
            | Self::EntityStatusRequest
            | Self::PowerModeRequest => {}
            Self::VehicleIdentificationRequestWithEid(eid) => buf.put_slice(eid),
            Self::VehicleIdentificationRequestWithVin(vin) => buf.put_slice(vin),
            Self::VehicleAnnouncement(vam) => vam.write(buf),
            Self::RoutingActivationRequest(req) => req.write(buf),
            Self::RoutingActivationResponse(resp) => resp.write(buf),
            Self::AliveCheckResponse(resp) => buf.put_u16(resp.source_address),
            Self::EntityStatusResponse(resp) => resp.write(buf),
            Self::PowerModeResponse(mode) => buf.put_u8(*mode),
            Self::DiagnosticMessage(msg) => msg.write(buf),
            Self::DiagnosticMessagePositiveAck(ack) => ack.write(buf),
            Self::DiagnosticMessageNegativeAck(nack) => nack.write(buf),
        }
    }

    /// Decode a payload whose header has already been parsed
    pub fn decode(header: &DoipHeader, payload: &[u8]) -> Result<Self, ProtoError> {
        let kind = header.payload_kind()?;
        let len = payload.len();
        let invalid = || ProtoError::InvalidPayloadLength {
            payload_type: kind.into(),
            length: len,
        };
        let exact = |expected: usize| if len == expected { Ok(()) } else { Err(invalid()) };
        let one_of = |a: usize, b: usize| if len == a || len == b { Ok(()) } else { Err(invalid()) };
        let at_least = |min: usize| if len >= min { Ok(()) } else { Err(invalid()) };

        let message = match kind {
            PayloadType::GenericNack => {
                exact(1)?;
                Self::GenericNack(GenericNackCode::from(payload[0]))
            }
            PayloadType::VehicleIdentificationRequest => {
                exact(0)?;
                Self::VehicleIdentificationRequest
            }
            PayloadType::VehicleIdentificationRequestWithEid => {
                let eid: [u8; 6] = payload.try_into().map_err(|_| invalid())?;
                Self::VehicleIdentificationRequestWithEid(eid)
            }
            PayloadType::VehicleIdentificationRequestWithVin => {
                let vin: [u8; 17] = payload.try_into().map_err(|_| invalid())?;
                Self::VehicleIdentificationRequestWithVin(vin)
            }
            PayloadType::VehicleAnnouncement => {
                one_of(VehicleAnnouncement::LEN, VehicleAnnouncement::LEN + 1)?;
                Self::VehicleAnnouncement(VehicleAnnouncement::read(payload))
            }
            PayloadType::RoutingActivationRequest => {
                one_of(RoutingActivationRequest::LEN, RoutingActivationRequest::LEN + 4)?;
                Self::RoutingActivationRequest(RoutingActivationRequest::read(payload))
            }
            PayloadType::RoutingActivationResponse => {
                one_of(RoutingActivationResponse::LEN, RoutingActivationResponse::LEN + 4)?;
                Self::RoutingActivationResponse(RoutingActivationResponse::read(payload))
            }
            PayloadType::AliveCheckRequest => {
                exact(0)?;
                Self::AliveCheckRequest
            }
            PayloadType::AliveCheckResponse => {
                exact(2)?;
                Self::AliveCheckResponse(AliveCheckResponse {
                    source_address: u16::from_be_bytes([payload[0], payload[1]]),
                })
            }
            PayloadType::EntityStatusRequest => {
                exact(0)?;
                Self::EntityStatusRequest
            }
            PayloadType::EntityStatusResponse => {
                one_of(EntityStatusResponse::LEN, EntityStatusResponse::LEN + 4)?;
                Self::EntityStatusResponse(EntityStatusResponse::read(payload))
            }
            PayloadType::PowerModeRequest => {
                exact(0)?;
                Self::PowerModeRequest
            }
            PayloadType::PowerModeResponse => {
                exact(1)?;
                Self::PowerModeResponse(payload[0])
            }
            PayloadType::DiagnosticMessage => {
                // A diagnostic message must carry at least one byte of user data
                at_least(DiagnosticMessage::MIN_LEN + 1)?;
                Self::DiagnosticMessage(DiagnosticMessage::read(payload))
            }
            PayloadType::DiagnosticMessagePositiveAck => {
                at_least(DiagnosticMessageAck::<DiagnosticAckCode>::MIN_LEN)?;
                Self::DiagnosticMessagePositiveAck(DiagnosticMessageAck::read(payload))
            }
            PayloadType::DiagnosticMessageNegativeAck => {
                at_least(DiagnosticMessageAck::<DiagnosticNackCode>::MIN_LEN)?;
                Self::DiagnosticMessageNegativeAck(DiagnosticMessageAck::read(payload))
            }
        };
        Ok(message)
    }
}
