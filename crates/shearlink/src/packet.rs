//! Request and response packet headers.
//!
//! Requests are wrapped as `[0xFF, 0x01, len + 1, 0x00, payload…]` before
//! SLIP framing; responses arrive as `[0x01, 0xFF, len + 1, 0x00, payload…]`
//! after de-stuffing.

use crate::error::ProtocolError;

const HEADER_LEN: usize = 4;

/// Wrap a request payload in the protocol header.
pub fn build(payload: &[u8]) -> Vec<u8> {
    debug_assert!(payload.len() < 0xFF, "payload too long for length byte");
    let mut packet = Vec::with_capacity(HEADER_LEN + payload.len());
    packet.push(0xFF);
    packet.push(0x01);
    packet.push(payload.len() as u8 + 1);
    packet.push(0x00);
    packet.extend_from_slice(payload);
    packet
}

/// Validate a response packet header and return its payload.
pub fn parse(packet: &[u8]) -> Result<&[u8], ProtocolError> {
    if packet.len() < HEADER_LEN {
        return Err(ProtocolError::InvalidPacketLength);
    }
    if packet[0] != 0x01 || packet[1] != 0xFF || packet[3] != 0x00 {
        return Err(ProtocolError::InvalidPacketHeader);
    }
    let len = packet[2] as usize;
    if len < 1 || HEADER_LEN + len - 1 > packet.len() {
        return Err(ProtocolError::InvalidPacketLength);
    }
    Ok(&packet[HEADER_LEN..HEADER_LEN + len - 1])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_request() {
        assert_eq!(
            build(&[0x22, 0x80, 0x10]),
            vec![0xFF, 0x01, 0x04, 0x00, 0x22, 0x80, 0x10]
        );
    }

    #[test]
    fn test_parse_rdbi_response() {
        // Read identifier 0x8010 -> serial "3943354135384242" seen on a Petrel.
        let raw = hex::decode("01ff0c006280103943354135384242").unwrap();
        let payload = parse(&raw).expect("valid packet");
        assert_eq!(payload[0], 0x62);
        assert_eq!(&payload[1..3], &[0x80, 0x10]);
        assert_eq!(payload.len(), 11);
    }

    #[test]
    fn test_parse_rejects_bad_header() {
        assert_eq!(
            parse(&[0xFF, 0x01, 0x02, 0x00, 0x75]),
            Err(ProtocolError::InvalidPacketHeader)
        );
        assert_eq!(
            parse(&[0x01, 0xFF, 0x02, 0x01, 0x75]),
            Err(ProtocolError::InvalidPacketHeader)
        );
    }

    #[test]
    fn test_parse_rejects_bad_length() {
        assert_eq!(parse(&[0x01, 0xFF]), Err(ProtocolError::InvalidPacketLength));
        assert_eq!(
            parse(&[0x01, 0xFF, 0x00, 0x00]),
            Err(ProtocolError::InvalidPacketLength)
        );
        // Length byte promises more payload than the packet holds.
        assert_eq!(
            parse(&[0x01, 0xFF, 0x09, 0x00, 0x75, 0x00]),
            Err(ProtocolError::InvalidPacketLength)
        );
    }

    #[test]
    fn test_parse_accepts_empty_payload() {
        assert_eq!(parse(&[0x01, 0xFF, 0x01, 0x00]), Ok(&[][..]));
    }
}
