//! UDS constants used by the simulated ECUs

/// UDS service identifiers
pub mod service_id {
    pub const DIAGNOSTIC_SESSION_CONTROL: u8 = 0x10;
    pub const ECU_RESET: u8 = 0x11;
    pub const READ_DTC_INFO: u8 = 0x19;
    pub const READ_DATA_BY_ID: u8 = 0x22;
    pub const SECURITY_ACCESS: u8 = 0x27;
    pub const WRITE_DATA_BY_ID: u8 = 0x2E;
    pub const ROUTINE_CONTROL: u8 = 0x31;
    pub const TESTER_PRESENT: u8 = 0x3E;
    pub const NEGATIVE_RESPONSE: u8 = 0x7F;
}

/// Negative response codes
pub mod nrc {
    pub const GENERAL_REJECT: u8 = 0x10;
    pub const SERVICE_NOT_SUPPORTED: u8 = 0x11;
    pub const INCORRECT_MESSAGE_LENGTH: u8 = 0x13;
    pub const BUSY_REPEAT_REQUEST: u8 = 0x21;
    pub const CONDITIONS_NOT_CORRECT: u8 = 0x22;
    pub const REQUEST_OUT_OF_RANGE: u8 = 0x31;
    pub const RESPONSE_PENDING: u8 = 0x78;
}

/// Positive response: service id + 0x40 followed by `data`
pub fn positive_response(service_id: u8, data: &[u8]) -> Vec<u8> {
    let mut response = Vec::with_capacity(1 + data.len());
    response.push(service_id.wrapping_add(0x40));
    response.extend_from_slice(data);
    response
}

pub fn negative_response(service_id: u8, nrc: u8) -> Vec<u8> {
    vec![service_id::NEGATIVE_RESPONSE, service_id, nrc]
}

/// Service id of a request, 0x00 for an empty request
pub fn request_sid(request: &[u8]) -> u8 {
    request.first().copied().unwrap_or(0x00)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn responses() {
        assert_eq!(
            positive_response(service_id::TESTER_PRESENT, &[0x00]),
            vec![0x7E, 0x00]
        );
        assert_eq!(
            negative_response(service_id::READ_DATA_BY_ID, nrc::BUSY_REPEAT_REQUEST),
            vec![0x7F, 0x22, 0x21]
        );
        assert_eq!(request_sid(&[]), 0x00);
    }
}
