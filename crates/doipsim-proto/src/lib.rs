//! doipsim-proto - DoIP message codec
//!
//! Typed ISO 13400-2 messages and their wire encoding. The gateway simulator
//! only ever deals with [`DoipMessage`] values; this crate owns the byte
//! layout.
//!
//! # Frame layout
//!
//! ```text
//! ┌─────────┬─────────────┬──────────────┬────────────────┬─────────────┐
//! │ version │ inv version │ payload type │ payload length │ payload ... │
//! │   u8    │     u8      │   u16 (BE)   │    u32 (BE)    │             │
//! └─────────┴─────────────┴──────────────┴────────────────┴─────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use doipsim_proto::{DoipHeader, DoipMessage, RoutingActivationCode};
//!
//! let msg = DoipMessage::routing_activation_response(0x0EF1, 0x0010, RoutingActivationCode::Success);
//! let bytes = msg.encode();
//! let header = DoipHeader::parse(&bytes).unwrap();
//! let decoded = DoipMessage::decode(&header, &bytes[8..]).unwrap();
//! assert_eq!(decoded, msg);
//! ```

pub mod error;
pub mod header;
pub mod message;
pub mod payload;

pub use error::ProtoError;
pub use header::{DoipHeader, PayloadType, DEFAULT_PROTOCOL_VERSION, HEADER_LEN};
pub use message::DoipMessage;
pub use payload::{
    ActivationType, AliveCheckResponse, DiagnosticAckCode, DiagnosticMessage,
    DiagnosticMessageAck, DiagnosticNackCode, EntityStatusResponse, GenericNackCode,
    RoutingActivationCode, RoutingActivationRequest, RoutingActivationResponse,
    VehicleAnnouncement,
};
