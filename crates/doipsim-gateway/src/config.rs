//! Gateway configuration
//!
//! Loaded from TOML. Every optional field has a default so a minimal file
//! only needs the vehicle identifiers and the ECU list.

use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ecu::LookupTable;
use crate::error::ConfigError;

/// Configuration of one simulated gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Gateway name, used in logs
    pub name: String,
    /// Local bind address for TCP and UDP
    #[serde(default = "default_local_address")]
    pub local_address: IpAddr,
    /// Local port (0 binds ephemeral ports)
    #[serde(default = "default_port")]
    pub local_port: u16,
    /// Destination of the startup vehicle announcements
    #[serde(default = "default_broadcast_address")]
    pub broadcast_address: Ipv4Addr,
    #[serde(default)]
    pub broadcast_enable: bool,
    /// Destination UDP port of the startup vehicle announcements
    #[serde(default = "default_port")]
    pub announce_port: u16,
    /// IPv4 multicast group joined by the UDP socket
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multicast_address: Option<Ipv4Addr>,
    /// DoIP logical address of the gateway
    pub logical_address: u16,
    /// Entity identification, 6 bytes as hex
    pub eid: String,
    /// Group identification, 6 bytes as hex
    pub gid: String,
    /// Vehicle identification number, 17 ASCII characters
    pub vin: String,
    #[serde(default = "default_max_registered_connections")]
    pub max_registered_connections: usize,
    /// Socket ceiling reported in entity status responses
    #[serde(default = "default_max_sockets")]
    pub max_sockets: u8,
    #[serde(default = "default_max_data_size")]
    pub max_data_size: u32,
    #[serde(default = "default_initial_inactivity_time_ms")]
    pub initial_inactivity_time_ms: u64,
    #[serde(default = "default_general_inactivity_time_ms")]
    pub general_inactivity_time_ms: u64,
    /// Payload bytes shown in log hex dumps
    #[serde(default = "default_max_byte_array_size")]
    pub max_byte_array_size_logging: usize,
    /// Request bytes considered when matching the lookup table
    #[serde(default = "default_max_byte_array_size")]
    pub max_byte_array_size_lookup: usize,
    #[serde(default)]
    pub ecus: Vec<EcuConfig>,
}

fn default_local_address() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_port() -> u16 {
    13400
}

fn default_broadcast_address() -> Ipv4Addr {
    Ipv4Addr::BROADCAST
}

fn default_max_registered_connections() -> usize {
    1
}

fn default_max_sockets() -> u8 {
    255
}

fn default_max_data_size() -> u32 {
    65536
}

fn default_initial_inactivity_time_ms() -> u64 {
    2000
}

fn default_general_inactivity_time_ms() -> u64 {
    300_000
}

fn default_max_byte_array_size() -> usize {
    64
}

/// Configuration of one ECU behind the gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EcuConfig {
    pub name: String,
    pub physical_address: u16,
    pub functional_address: u16,
    /// Ordered request/response table, first match wins
    #[serde(default)]
    pub lookup: Vec<LookupEntryConfig>,
}

/// One lookup table line
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LookupEntryConfig {
    /// Regular expression over the uppercase hex string of the request
    pub request: String,
    /// Response bytes as hex, whitespace ignored
    pub response: String,
}

/// Vehicle identifiers decoded from their textual form
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VehicleIdentity {
    pub vin: [u8; 17],
    pub eid: [u8; 6],
    pub gid: [u8; 6],
    pub logical_address: u16,
}

/// Inactivity timer durations applied to every TCP connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InactivityTimings {
    pub initial: Duration,
    pub general: Duration,
}

impl GatewayConfig {
    /// Load and validate a TOML config file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check every field the gateway depends on
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::EmptyName);
        }
        self.identity()?;
        if self.max_registered_connections == 0 {
            return Err(ConfigError::NoRegisteredConnections);
        }
        if self.initial_inactivity_time_ms == 0 {
            return Err(ConfigError::ZeroDuration("initial_inactivity_time_ms"));
        }
        if self.general_inactivity_time_ms == 0 {
            return Err(ConfigError::ZeroDuration("general_inactivity_time_ms"));
        }
        for (index, ecu) in self.ecus.iter().enumerate() {
            if ecu.name.trim().is_empty() {
                return Err(ConfigError::UnnamedEcu(index));
            }
            LookupTable::from_config(&ecu.name, &ecu.lookup)?;
        }
        Ok(())
    }

    pub fn identity(&self) -> Result<VehicleIdentity, ConfigError> {
        Ok(VehicleIdentity {
            vin: parse_vin(&self.vin)?,
            eid: parse_hex_id("eid", &self.eid)?,
            gid: parse_hex_id("gid", &self.gid)?,
            logical_address: self.logical_address,
        })
    }

    pub fn inactivity_timings(&self) -> InactivityTimings {
        InactivityTimings {
            initial: Duration::from_millis(self.initial_inactivity_time_ms),
            general: Duration::from_millis(self.general_inactivity_time_ms),
        }
    }
}

impl Default for GatewayConfig {
    /// Demo gateway with one engine ECU answering a VIN read
    fn default() -> Self {
        Self {
            name: "gateway".to_string(),
            local_address: default_local_address(),
            local_port: default_port(),
            broadcast_address: default_broadcast_address(),
            broadcast_enable: false,
            announce_port: default_port(),
            multicast_address: None,
            logical_address: 0x0010,
            eid: "102030405060".to_string(),
            gid: "102030405060".to_string(),
            vin: "WVWZZZ1JZ3W386752".to_string(),
            max_registered_connections: default_max_registered_connections(),
            max_sockets: default_max_sockets(),
            max_data_size: default_max_data_size(),
            initial_inactivity_time_ms: default_initial_inactivity_time_ms(),
            general_inactivity_time_ms: default_general_inactivity_time_ms(),
            max_byte_array_size_logging: default_max_byte_array_size(),
            max_byte_array_size_lookup: default_max_byte_array_size(),
            ecus: vec![EcuConfig {
                name: "engine".to_string(),
                physical_address: 0x0001,
                functional_address: 0xE400,
                lookup: vec![
                    LookupEntryConfig {
                        request: "22F190".to_string(),
                        response: format!("62F190{}", hex::encode_upper("WVWZZZ1JZ3W386752")),
                    },
                    LookupEntryConfig {
                        request: "1001".to_string(),
                        response: "5001003201F4".to_string(),
                    },
                    LookupEntryConfig {
                        request: "3E00".to_string(),
                        response: "7E00".to_string(),
                    },
                ],
            }],
        }
    }
}

fn parse_vin(vin: &str) -> Result<[u8; 17], ConfigError> {
    if !vin.is_ascii() {
        return Err(ConfigError::InvalidIdentifier {
            field: "vin",
            reason: "must be ASCII".to_string(),
        });
    }
    vin.as_bytes()
        .try_into()
        .map_err(|_| ConfigError::InvalidIdentifier {
            field: "vin",
            reason: format!("expected 17 characters, got {}", vin.len()),
        })
}

fn parse_hex_id(field: &'static str, value: &str) -> Result<[u8; 6], ConfigError> {
    let cleaned: String = value
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':' && *c != '-')
        .collect();
    let bytes = hex::decode(&cleaned).map_err(|e| ConfigError::InvalidIdentifier {
        field,
        reason: e.to_string(),
    })?;
    bytes
        .as_slice()
        .try_into()
        .map_err(|_| ConfigError::InvalidIdentifier {
            field,
            reason: format!("expected 6 bytes, got {}", bytes.len()),
        })
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    const MINIMAL: &str = r#"
        name = "gw"
        logical_address = 0x0010
        eid = "10:20:30:40:50:60"
        gid = "000000000000"
        vin = "WVWZZZ1JZ3W386752"
    "#;

    #[test]
    fn minimal_config_uses_defaults() {
        let config = GatewayConfig::from_toml_str(MINIMAL).unwrap();
        assert_eq!(config.local_port, 13400);
        assert_eq!(config.max_registered_connections, 1);
        assert_eq!(config.max_data_size, 65536);
        assert_eq!(config.initial_inactivity_time_ms, 2000);
        assert_eq!(config.general_inactivity_time_ms, 300_000);
        assert!(!config.broadcast_enable);
        assert_eq!(config.announce_port, 13400);
        assert!(config.ecus.is_empty());

        let identity = config.identity().unwrap();
        assert_eq!(identity.eid, [0x10, 0x20, 0x30, 0x40, 0x50, 0x60]);
        assert_eq!(&identity.vin, b"WVWZZZ1JZ3W386752");
    }

    #[test]
    fn ecus_and_lookup_tables() {
        let content = format!(
            "{MINIMAL}\n{}",
            r#"
            [[ecus]]
            name = "engine"
            physical_address = 0x0001
            functional_address = 0xE400

            [[ecus.lookup]]
            request = "22F190"
            response = "62 F1 90 01"
            "#
        );
        let config = GatewayConfig::from_toml_str(&content).unwrap();
        assert_eq!(config.ecus.len(), 1);
        assert_eq!(config.ecus[0].functional_address, 0xE400);
        assert_eq!(config.ecus[0].lookup[0].request, "22F190");
    }

    #[test]
    fn rejects_short_vin() {
        let mut config = GatewayConfig::default();
        config.vin = "WVW".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidIdentifier { field: "vin", .. })
        ));
    }

    #[test]
    fn rejects_malformed_eid() {
        let mut config = GatewayConfig::default();
        config.eid = "1020".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidIdentifier { field: "eid", .. })
        ));
        config.eid = "zz2030405060".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_limits() {
        let mut config = GatewayConfig::default();
        config.max_registered_connections = 0;
        assert_eq!(config.validate(), Err(ConfigError::NoRegisteredConnections));

        let mut config = GatewayConfig::default();
        config.general_inactivity_time_ms = 0;
        assert_eq!(
            config.validate(),
            Err(ConfigError::ZeroDuration("general_inactivity_time_ms"))
        );
    }

    #[test]
    fn rejects_unnamed_ecu_and_bad_lookup() {
        let mut config = GatewayConfig::default();
        config.ecus[0].name = String::new();
        assert_eq!(config.validate(), Err(ConfigError::UnnamedEcu(0)));

        let mut config = GatewayConfig::default();
        config.ecus[0].lookup[0].request = "22(".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::InvalidLookup { .. })));
    }

    #[test]
    fn default_config_is_valid() {
        assert!(GatewayConfig::default().validate().is_ok());
    }

    #[test]
    fn shipped_config_is_valid() {
        let config =
            GatewayConfig::from_toml_str(include_str!("../../../config/gateway.toml")).unwrap();
        assert_eq!(config.ecus.len(), 2);
        assert_eq!(config.max_registered_connections, 2);
        assert_eq!(&config.identity().unwrap().vin, b"WVWZZZ1JZ3W386752");
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MINIMAL.as_bytes()).unwrap();
        let config = GatewayConfig::from_file(file.path()).unwrap();
        assert_eq!(config.name, "gw");

        assert!(matches!(
            GatewayConfig::from_file("/nonexistent/gateway.toml"),
            Err(ConfigError::Read { .. })
        ));
    }
}
