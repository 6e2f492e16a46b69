//! doipsim-gateway - simulated DoIP gateway
//!
//! Accepts tester connections over TCP, arbitrates routing activation
//! between them and forwards diagnostic requests to simulated ECUs.
//! Vehicle identification and entity status are answered over UDP.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Gateway                             │
//! │                                                             │
//! │  ┌─────────────┐   ┌──────────────────┐  ┌───────────────┐  │
//! │  │ TCP server  │──▶│ConnectionRegistry│  │ UDP discovery │  │
//! │  │ (framing)   │   │ (arbitration,    │  │ (VIR, status, │  │
//! │  └──────┬──────┘   │  alive check)    │  │  announce)    │  │
//! │         │          └──────────────────┘  └───────────────┘  │
//! │  ┌──────┴──────┐                                            │
//! │  │ Connection  │  inactivity timers, outbound queue         │
//! │  └──────┬──────┘                                            │
//! │         │ diagnostic messages                               │
//! │  ┌──────┴──────┐                                            │
//! │  │  dyn Ecu    │  StandardEcu: lookup table, busy handling  │
//! │  └─────────────┘                                            │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod connection;
pub mod display;
pub mod ecu;
pub mod error;
pub mod gateway;
pub mod registry;

pub use config::{EcuConfig, GatewayConfig, InactivityTimings, LookupEntryConfig, VehicleIdentity};
pub use connection::{Connection, ConnectionId, ConnectionState};
pub use ecu::{AddressingMode, Ecu, HookAction, StandardEcu, UdsMessage};
pub use error::{ConfigError, GatewayError};
pub use gateway::Gateway;
pub use registry::ConnectionRegistry;
