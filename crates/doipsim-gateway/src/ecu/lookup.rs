//! Regex request/response lookup table

use regex::Regex;

use crate::config::LookupEntryConfig;
use crate::error::ConfigError;

#[derive(Debug, Clone)]
struct LookupEntry {
    pattern: Regex,
    response: Vec<u8>,
}

/// Ordered lookup table; the first matching pattern answers
///
/// Patterns are matched case-insensitively against the whole uppercase hex
/// string of the request, so `22F1..` matches any `22 F1 xx` request.
#[derive(Debug, Clone, Default)]
pub struct LookupTable {
    entries: Vec<LookupEntry>,
}

impl LookupTable {
    pub fn from_config(ecu: &str, entries: &[LookupEntryConfig]) -> Result<Self, ConfigError> {
        let invalid = |entry: &LookupEntryConfig, reason: String| ConfigError::InvalidLookup {
            ecu: ecu.to_string(),
            entry: entry.request.clone(),
            reason,
        };

        let mut table = Vec::with_capacity(entries.len());
        for entry in entries {
            let request: String = entry.request.split_whitespace().collect();
            let pattern = Regex::new(&format!("(?i)^(?:{request})$"))
                .map_err(|e| invalid(entry, e.to_string()))?;
            let response: String = entry.response.split_whitespace().collect();
            let response = hex::decode(response).map_err(|e| invalid(entry, e.to_string()))?;
            if response.is_empty() {
                return Err(invalid(entry, "empty response".to_string()));
            }
            table.push(LookupEntry { pattern, response });
        }
        Ok(Self { entries: table })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn find(&self, request: &[u8]) -> Option<&[u8]> {
        let request = hex::encode_upper(request);
        self.entries
            .iter()
            .find(|entry| entry.pattern.is_match(&request))
            .map(|entry| entry.response.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(request: &str, response: &str) -> LookupEntryConfig {
        LookupEntryConfig {
            request: request.to_string(),
            response: response.to_string(),
        }
    }

    #[test]
    fn first_match_wins() {
        let table = LookupTable::from_config(
            "ecu",
            &[
                entry("22 F1 90", "62 F1 90 01 02"),
                entry("22.*", "7F 22 31"),
            ],
        )
        .unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.find(&[0x22, 0xF1, 0x90]), Some(&[0x62, 0xF1, 0x90, 0x01, 0x02][..]));
        assert_eq!(table.find(&[0x22, 0xF1, 0x86]), Some(&[0x7F, 0x22, 0x31][..]));
        assert_eq!(table.find(&[0x10, 0x01]), None);
    }

    #[test]
    fn patterns_match_whole_request() {
        let table = LookupTable::from_config("ecu", &[entry("1001", "50 01 00 32 01 F4")]).unwrap();
        assert!(table.find(&[0x10, 0x01]).is_some());
        assert!(table.find(&[0x10, 0x01, 0x00]).is_none());
    }

    #[test]
    fn lowercase_patterns_match() {
        let table = LookupTable::from_config("ecu", &[entry("3e00", "7e00")]).unwrap();
        assert_eq!(table.find(&[0x3E, 0x00]), Some(&[0x7E, 0x00][..]));
    }

    #[test]
    fn invalid_entries_are_rejected() {
        assert!(LookupTable::from_config("ecu", &[entry("22(", "62")]).is_err());
        assert!(LookupTable::from_config("ecu", &[entry("22", "6")]).is_err());
        assert!(LookupTable::from_config("ecu", &[entry("22", "")]).is_err());
    }
}
