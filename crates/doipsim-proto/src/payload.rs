//! Typed DoIP payloads and their code tables

use bytes::{Buf, BufMut, Bytes};

/// Generic DoIP header negative acknowledge codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenericNackCode {
    IncorrectPatternFormat,
    UnknownPayloadType,
    MessageTooLarge,
    OutOfMemory,
    InvalidPayloadLength,
    Reserved(u8),
}

impl From<u8> for GenericNackCode {
    fn from(value: u8) -> Self {
        match value {
            0x00 => Self::IncorrectPatternFormat,
            0x01 => Self::UnknownPayloadType,
            0x02 => Self::MessageTooLarge,
            0x03 => Self::OutOfMemory,
            0x04 => Self::InvalidPayloadLength,
            other => Self::Reserved(other),
        }
    }
}

impl From<GenericNackCode> for u8 {
    fn from(value: GenericNackCode) -> Self {
        match value {
            GenericNackCode::IncorrectPatternFormat => 0x00,
            GenericNackCode::UnknownPayloadType => 0x01,
            GenericNackCode::MessageTooLarge => 0x02,
            GenericNackCode::OutOfMemory => 0x03,
            GenericNackCode::InvalidPayloadLength => 0x04,
            GenericNackCode::Reserved(other) => other,
        }
    }
}

/// Routing activation type requested by the tester
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationType {
    Default,
    WwhObd,
    CentralSecurity,
    Other(u8),
}

impl ActivationType {
    /// The gateway supports default and WWH-OBD activation only
    pub fn is_supported(self) -> bool {
        matches!(self, Self::Default | Self::WwhObd)
    }
}

impl From<u8> for ActivationType {
    fn from(value: u8) -> Self {
        match value {
            0x00 => Self::Default,
            0x01 => Self::WwhObd,
            0xE0 => Self::CentralSecurity,
            other => Self::Other(other),
        }
    }
}

impl From<ActivationType> for u8 {
    fn from(value: ActivationType) -> Self {
        match value {
            ActivationType::Default => 0x00,
            ActivationType::WwhObd => 0x01,
            ActivationType::CentralSecurity => 0xE0,
            ActivationType::Other(other) => other,
        }
    }
}

/// Routing activation response codes (ISO 13400-2 table 25)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingActivationCode {
    /// 0x00
    DeniedUnknownSourceAddress,
    /// 0x01
    DeniedAllSocketsRegistered,
    /// 0x02
    DeniedDifferentSourceAddress,
    /// 0x03
    DeniedSourceAddressActiveElsewhere,
    /// 0x04
    DeniedMissingAuthentication,
    /// 0x05
    DeniedRejectedConfirmation,
    /// 0x06
    DeniedUnsupportedActivationType,
    /// 0x07
    DeniedTlsRequired,
    /// 0x10
    Success,
    /// 0x11
    SuccessConfirmationRequired,
    Reserved(u8),
}

impl RoutingActivationCode {
    /// Whether the socket stays open after this response was sent
    pub fn keeps_socket_open(self) -> bool {
        matches!(self, Self::Success | Self::SuccessConfirmationRequired)
    }
}

impl From<u8> for RoutingActivationCode {
    fn from(value: u8) -> Self {
        match value {
            0x00 => Self::DeniedUnknownSourceAddress,
            0x01 => Self::DeniedAllSocketsRegistered,
            0x02 => Self::DeniedDifferentSourceAddress,
            0x03 => Self::DeniedSourceAddressActiveElsewhere,
            0x04 => Self::DeniedMissingAuthentication,
            0x05 => Self::DeniedRejectedConfirmation,
            0x06 => Self::DeniedUnsupportedActivationType,
            0x07 => Self::DeniedTlsRequired,
            0x10 => Self::Success,
            0x11 => Self::SuccessConfirmationRequired,
            other => Self::Reserved(other),
        }
    }
}

impl From<RoutingActivationCode> for u8 {
    fn from(value: RoutingActivationCode) -> Self {
        use RoutingActivationCode::*;
        match value {
            DeniedUnknownSourceAddress => 0x00,
            DeniedAllSocketsRegistered => 0x01,
            DeniedDifferentSourceAddress => 0x02,
            DeniedSourceAddressActiveElsewhere => 0x03,
            DeniedMissingAuthentication => 0x04,
            DeniedRejectedConfirmation => 0x05,
            DeniedUnsupportedActivationType => 0x06,
            DeniedTlsRequired => 0x07,
            Success => 0x10,
            SuccessConfirmationRequired => 0x11,
            Reserved(other) => other,
        }
    }
}

/// Diagnostic message positive acknowledge code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticAckCode {
    Acknowledged,
    Reserved(u8),
}

impl From<u8> for DiagnosticAckCode {
    fn from(value: u8) -> Self {
        match value {
            0x00 => Self::Acknowledged,
            other => Self::Reserved(other),
        }
    }
}

impl From<DiagnosticAckCode> for u8 {
    fn from(value: DiagnosticAckCode) -> Self {
        match value {
            DiagnosticAckCode::Acknowledged => 0x00,
            DiagnosticAckCode::Reserved(other) => other,
        }
    }
}

/// Diagnostic message negative acknowledge codes (ISO 13400-2 table 29)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticNackCode {
    InvalidSourceAddress,
    UnknownTargetAddress,
    MessageTooLarge,
    OutOfMemory,
    TargetUnreachable,
    UnknownNetwork,
    TransportProtocolError,
    Reserved(u8),
}

impl From<u8> for DiagnosticNackCode {
    fn from(value: u8) -> Self {
        match value {
            0x02 => Self::InvalidSourceAddress,
            0x03 => Self::UnknownTargetAddress,
            0x04 => Self::MessageTooLarge,
            0x05 => Self::OutOfMemory,
            0x06 => Self::TargetUnreachable,
            0x07 => Self::UnknownNetwork,
            0x08 => Self::TransportProtocolError,
            other => Self::Reserved(other),
        }
    }
}

impl From<DiagnosticNackCode> for u8 {
    fn from(value: DiagnosticNackCode) -> Self {
        use DiagnosticNackCode::*;
        match value {
            InvalidSourceAddress => 0x02,
            UnknownTargetAddress => 0x03,
            MessageTooLarge => 0x04,
            OutOfMemory => 0x05,
            TargetUnreachable => 0x06,
            UnknownNetwork => 0x07,
            TransportProtocolError => 0x08,
            Reserved(other) => other,
        }
    }
}

/// Vehicle announcement / vehicle identification response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VehicleAnnouncement {
    pub vin: [u8; 17],
    pub logical_address: u16,
    pub eid: [u8; 6],
    pub gid: [u8; 6],
    pub further_action: u8,
    pub sync_status: Option<u8>,
}

impl VehicleAnnouncement {
    pub(crate) const LEN: usize = 32;

    pub(crate) fn write(&self, buf: &mut impl BufMut) {
        buf.put_slice(&self.vin);
        buf.put_u16(self.logical_address);
        buf.put_slice(&self.eid);
        buf.put_slice(&self.gid);
        buf.put_u8(self.further_action);
        if let Some(status) = self.sync_status {
            buf.put_u8(status);
        }
    }

    pub(crate) fn read(mut buf: &[u8]) -> Self {
        let mut vin = [0; 17];
        buf.copy_to_slice(&mut vin);
        let logical_address = buf.get_u16();
        let mut eid = [0; 6];
        buf.copy_to_slice(&mut eid);
        let mut gid = [0; 6];
        buf.copy_to_slice(&mut gid);
        let further_action = buf.get_u8();
        let sync_status = buf.has_remaining().then(|| buf.get_u8());
        Self {
            vin,
            logical_address,
            eid,
            gid,
            further_action,
            sync_status,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingActivationRequest {
    pub source_address: u16,
    pub activation_type: ActivationType,
    pub oem_specific: Option<[u8; 4]>,
}

impl RoutingActivationRequest {
    pub(crate) const LEN: usize = 7;

    pub(crate) fn write(&self, buf: &mut impl BufMut) {
        buf.put_u16(self.source_address);
        buf.put_u8(self.activation_type.into());
        buf.put_u32(0);
        if let Some(oem) = self.oem_specific {
            buf.put_slice(&oem);
        }
    }

    pub(crate) fn read(mut buf: &[u8]) -> Self {
        let source_address = buf.get_u16();
        let activation_type = ActivationType::from(buf.get_u8());
        buf.advance(4);
        let oem_specific = (buf.remaining() >= 4).then(|| {
            let mut oem = [0; 4];
            buf.copy_to_slice(&mut oem);
            oem
        });
        Self {
            source_address,
            activation_type,
            oem_specific,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingActivationResponse {
    pub tester_address: u16,
    pub entity_address: u16,
    pub code: RoutingActivationCode,
    pub oem_specific: Option<[u8; 4]>,
}

impl RoutingActivationResponse {
    pub(crate) const LEN: usize = 9;

    pub(crate) fn write(&self, buf: &mut impl BufMut) {
        buf.put_u16(self.tester_address);
        buf.put_u16(self.entity_address);
        buf.put_u8(self.code.into());
        buf.put_u32(0);
        if let Some(oem) = self.oem_specific {
            buf.put_slice(&oem);
        }
    }

    pub(crate) fn read(mut buf: &[u8]) -> Self {
        let tester_address = buf.get_u16();
        let entity_address = buf.get_u16();
        let code = RoutingActivationCode::from(buf.get_u8());
        buf.advance(4);
        let oem_specific = (buf.remaining() >= 4).then(|| {
            let mut oem = [0; 4];
            buf.copy_to_slice(&mut oem);
            oem
        });
        Self {
            tester_address,
            entity_address,
            code,
            oem_specific,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AliveCheckResponse {
    pub source_address: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityStatusResponse {
    pub node_type: u8,
    pub max_concurrent_sockets: u8,
    pub open_sockets: u8,
    pub max_data_size: Option<u32>,
}

impl EntityStatusResponse {
    pub(crate) const LEN: usize = 3;

    pub(crate) fn write(&self, buf: &mut impl BufMut) {
        buf.put_u8(self.node_type);
        buf.put_u8(self.max_concurrent_sockets);
        buf.put_u8(self.open_sockets);
        if let Some(size) = self.max_data_size {
            buf.put_u32(size);
        }
    }

    pub(crate) fn read(mut buf: &[u8]) -> Self {
        let node_type = buf.get_u8();
        let max_concurrent_sockets = buf.get_u8();
        let open_sockets = buf.get_u8();
        let max_data_size = (buf.remaining() >= 4).then(|| buf.get_u32());
        Self {
            node_type,
            max_concurrent_sockets,
            open_sockets,
            max_data_size,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticMessage {
    pub source_address: u16,
    pub target_address: u16,
    pub user_data: Bytes,
}

impl DiagnosticMessage {
    pub(crate) const MIN_LEN: usize = 4;

    pub(crate) fn write(&self, buf: &mut impl BufMut) {
        buf.put_u16(self.source_address);
        buf.put_u16(self.target_address);
        buf.put_slice(&self.user_data);
    }

    pub(crate) fn read(mut buf: &[u8]) -> Self {
        let source_address = buf.get_u16();
        let target_address = buf.get_u16();
        Self {
            source_address,
            target_address,
            user_data: Bytes::copy_from_slice(buf),
        }
    }
}

/// Body shared by diagnostic positive and negative acknowledges
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticMessageAck<C> {
    pub source_address: u16,
    pub target_address: u16,
    pub code: C,
    pub previous_data: Bytes,
}

impl<C: Copy + Into<u8> + From<u8>> DiagnosticMessageAck<C> {
    pub(crate) const MIN_LEN: usize = 5;

    pub(crate) fn write(&self, buf: &mut impl BufMut) {
        buf.put_u16(self.source_address);
        buf.put_u16(self.target_address);
        buf.put_u8(self.code.into());
        buf.put_slice(&self.previous_data);
    }

    pub(crate) fn read(mut buf: &[u8]) -> Self {
        let source_address = buf.get_u16();
        let target_address = buf.get_u16();
        let code = C::from(buf.get_u8());
        Self {
            source_address,
            target_address,
            code,
            previous_data: Bytes::copy_from_slice(buf),
        }
    }
}
