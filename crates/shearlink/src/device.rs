//! Device identity: well-known data identifiers, model names, and log
//! base address handling.

/// 8-byte ASCII serial number.
pub const DID_SERIAL: u16 = 0x8010;
/// Firmware version, ASCII, up to 12 bytes.
pub const DID_FIRMWARE: u16 = 0x8011;
/// Log base address record, 9 bytes.
pub const DID_LOG_BASE: u16 = 0x8021;
/// 2-byte hardware identity code.
pub const DID_HARDWARE: u16 = 0x8050;

/// Identity of a connected dive computer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub serial: String,
    pub firmware: String,
    pub hardware: u16,
    pub model: String,
}

/// Decode an ASCII identity field, falling back to hex for raw bytes.
pub fn ascii_or_hex(raw: &[u8]) -> String {
    let trimmed: &[u8] = {
        let end = raw
            .iter()
            .rposition(|&b| b != 0 && b != b' ')
            .map_or(0, |i| i + 1);
        &raw[..end]
    };
    if !trimmed.is_empty() && trimmed.iter().all(|b| b.is_ascii_graphic() || *b == b' ') {
        String::from_utf8_lossy(trimmed).into_owned()
    } else {
        hex::encode_upper(raw)
    }
}

/// Map the hardware identity code to a marketing name.
pub fn hardware_model_name(code: u16) -> String {
    match code {
        0x0101 => "Predator".to_string(),
        0x0404 | 0x0909 => "Petrel".to_string(),
        0x0F0F => "Teric".to_string(),
        0x1512 => "Peregrine".to_string(),
        other => format!("Shearwater ({other:#06x})"),
    }
}

/// Normalise the log base address the device reports. Several firmware
/// families report aliases of the same region.
pub fn normalise_log_base(address: u32) -> u32 {
    match address {
        0xDD00_0000 | 0xC000_0000 | 0x9000_0000 => 0xC000_0000,
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii_or_hex() {
        assert_eq!(ascii_or_hex(b"9C5A8BB\0"), "9C5A8BB");
        assert_eq!(ascii_or_hex(b"V2.98\0\0\0\0\0\0\0"), "V2.98");
        assert_eq!(ascii_or_hex(&[0x01, 0x9C, 0x5A, 0x8B]), "019C5A8B");
        assert_eq!(ascii_or_hex(&[0x00; 4]), "00000000");
    }

    #[test]
    fn test_hardware_model_name() {
        assert_eq!(hardware_model_name(0x0101), "Predator");
        assert_eq!(hardware_model_name(0x0404), "Petrel");
        assert_eq!(hardware_model_name(0x0909), "Petrel");
        assert_eq!(hardware_model_name(0x0F0F), "Teric");
        assert_eq!(hardware_model_name(0x1512), "Peregrine");
        assert_eq!(hardware_model_name(0xBEEF), "Shearwater (0xbeef)");
    }

    #[test]
    fn test_normalise_log_base() {
        assert_eq!(normalise_log_base(0xDD00_0000), 0xC000_0000);
        assert_eq!(normalise_log_base(0xC000_0000), 0xC000_0000);
        assert_eq!(normalise_log_base(0x9000_0000), 0xC000_0000);
        assert_eq!(normalise_log_base(0x8000_0000), 0x8000_0000);
        assert_eq!(normalise_log_base(0x1234_5678), 0x1234_5678);
    }
}
