//! Simulated ECUs behind the gateway
//!
//! The gateway only talks to the [`Ecu`] trait: it forwards diagnostic
//! requests with [`Ecu::put_request`] and receives responses on the channels
//! registered with [`Ecu::add_listener`].

mod lookup;
mod standard;
pub mod uds;

use bytes::Bytes;
use tokio::sync::mpsc;

pub use lookup::LookupTable;
pub use standard::{HookAction, RequestHook, StandardEcu};

/// How a request reached the ECU
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressingMode {
    Physical,
    Functional,
}

/// UDS request or response between the gateway and an ECU
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UdsMessage {
    pub source_address: u16,
    pub target_address: u16,
    pub addressing: AddressingMode,
    pub data: Bytes,
}

/// Channel end receiving ECU responses
pub type EcuListener = mpsc::UnboundedSender<UdsMessage>;

pub trait Ecu: Send + Sync {
    fn name(&self) -> &str;

    fn physical_address(&self) -> u16;

    fn functional_address(&self) -> u16;

    fn start(&self);

    fn stop(&self);

    /// Hand a request to the ECU; must not block
    fn put_request(&self, request: UdsMessage);

    fn add_listener(&self, listener: EcuListener);

    /// Addressing mode under which `target` reaches this ECU, if any
    fn addressing_for(&self, target: u16) -> Option<AddressingMode> {
        if target == self.physical_address() {
            Some(AddressingMode::Physical)
        } else if target == self.functional_address() {
            Some(AddressingMode::Functional)
        } else {
            None
        }
    }
}
