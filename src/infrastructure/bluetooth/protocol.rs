//! CT007 Detector Protocol
//!
//! Service catalog and frame layout for the detector's BLE interface.

use crate::domain::error::FrameError;
use tracing::trace;

pub use crate::domain::catalog::{
    BATTERY_LEVEL_CHAR_UUID, BATTERY_SERVICE_UUID, RAD_COUNT_CHAR_UUID, RAD_COUNT_SERVICE_UUID,
    RAD_COUNT_UPDATE_HZ,
};

/// Both frame types are a single i32
pub const FRAME_LEN: usize = 4;

/// Decode a frame: one little-endian i32 at the start of the payload.
///
/// # Frame Structure (4 bytes)
///
/// ```text
/// [0-3] : value (i32 little-endian)
/// ```
pub fn decode_i32_frame(bytes: &[u8]) -> Result<i32, FrameError> {
    let raw: [u8; FRAME_LEN] = bytes
        .get(..FRAME_LEN)
        .and_then(|b| b.try_into().ok())
        .ok_or(FrameError::Malformed {
            expected: FRAME_LEN,
            actual: bytes.len(),
        })?;

    if bytes.len() > FRAME_LEN {
        trace!("Ignoring {} trailing frame bytes", bytes.len() - FRAME_LEN);
    }

    Ok(i32::from_le_bytes(raw))
}

/// Pulses counted during one notification tick.
pub fn decode_count(bytes: &[u8]) -> Result<i32, FrameError> {
    decode_i32_frame(bytes)
}

/// Battery charge in percent.
pub fn decode_battery_level(bytes: &[u8]) -> Result<i32, FrameError> {
    decode_i32_frame(bytes)
}

/// Compare UUIDs regardless of case and dashes.
pub fn uuid_eq(a: &str, b: &str) -> bool {
    normalize_uuid(a) == normalize_uuid(b)
}

/// Lowercase, dash-free form of a UUID string.
pub fn normalize_uuid(uuid: &str) -> String {
    uuid.chars()
        .filter(|c| *c != '-')
        .collect::<String>()
        .to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_count() {
        assert_eq!(decode_count(&[0x07, 0x00, 0x00, 0x00]), Ok(7));
        assert_eq!(decode_count(&[0x00, 0x01, 0x00, 0x00]), Ok(256));
        assert_eq!(decode_count(&[0xFF, 0xFF, 0xFF, 0xFF]), Ok(-1));
        assert_eq!(decode_count(&[0x05, 0x00, 0x00, 0x00, 0xAA]), Ok(5));
    }

    #[test]
    fn test_short_frame_is_malformed() {
        assert_eq!(
            decode_count(&[0x01, 0x00, 0x00]),
            Err(FrameError::Malformed {
                expected: 4,
                actual: 3
            })
        );
        assert!(decode_battery_level(&[]).is_err());
    }

    #[test]
    fn test_battery_shares_layout() {
        assert_eq!(decode_battery_level(&[0x55, 0x00, 0x00, 0x00]), Ok(85));
    }

    #[test]
    fn test_uuid_eq() {
        assert!(uuid_eq(
            "f100ffd004514100b100000000000000",
            RAD_COUNT_SERVICE_UUID
        ));
        assert!(uuid_eq(
            "0000180F-0000-1000-8000-00805F9B34FB",
            BATTERY_SERVICE_UUID
        ));
        assert!(!uuid_eq(RAD_COUNT_CHAR_UUID, RAD_COUNT_SERVICE_UUID));
    }

    #[test]
    fn test_catalog_defaults_match_settings() {
        let config = crate::domain::settings::SessionConfig::default();
        assert!(uuid_eq(&config.rad_count_service_uuid, RAD_COUNT_SERVICE_UUID));
        assert!(uuid_eq(&config.rad_count_char_uuid, RAD_COUNT_CHAR_UUID));
        assert!(uuid_eq(&config.battery_service_uuid, BATTERY_SERVICE_UUID));
        assert!(uuid_eq(&config.battery_char_uuid, BATTERY_LEVEL_CHAR_UUID));
        assert_eq!(RAD_COUNT_UPDATE_HZ, 5);
    }
}
