//! Dive manifest scanning.
//!
//! The device keeps a ring buffer of fixed-size index records in a
//! dedicated region. Active records carry the dive fingerprint and the
//! address of the dive's log data.

use crate::byteview::ByteView;

/// Address of the manifest region.
pub const MANIFEST_ADDRESS: u32 = 0xE000_0000;
/// Size of the manifest region in bytes.
pub const MANIFEST_SIZE: u32 = 0x600;

const RECORD_SIZE: usize = 0x20;
const RECORD_DELETED: u16 = 0x5A23;
const RECORD_ACTIVE: u16 = 0xA5C4;

/// One dive the device advertises in its manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiveCandidate {
    /// 1-based position in scan order. The device stores the manifest
    /// newest dive first.
    pub ordinal: u32,
    pub fingerprint: [u8; 4],
    /// Address of the dive's log data, relative to the device log base.
    pub address: u32,
}

/// Walk a downloaded manifest buffer and collect the active dives in
/// scan order. Deleted records are skipped; the first record with an
/// unrecognised header ends the scan.
pub fn scan(data: &[u8]) -> Vec<DiveCandidate> {
    let view = ByteView::new(data);
    let mut candidates = Vec::new();
    let mut ordinal = 1;
    let mut offset = 0;

    while let Some(header) = view.u16_at(offset) {
        match header {
            RECORD_DELETED => {}
            RECORD_ACTIVE => {
                let Some(fingerprint) = view.array::<4>(offset + 4) else {
                    break;
                };
                let Some(address) = view.u32_at(offset + 20) else {
                    break;
                };
                candidates.push(DiveCandidate {
                    ordinal,
                    fingerprint,
                    address,
                });
                ordinal += 1;
            }
            _ => break,
        }
        offset += RECORD_SIZE;
    }

    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(header: u16, fingerprint: [u8; 4], address: u32) -> Vec<u8> {
        let mut rec = vec![0u8; RECORD_SIZE];
        rec[0..2].copy_from_slice(&header.to_be_bytes());
        rec[4..8].copy_from_slice(&fingerprint);
        rec[20..24].copy_from_slice(&address.to_be_bytes());
        rec
    }

    #[test]
    fn test_scan_skips_deleted_and_stops_at_zeros() {
        let mut buffer = Vec::new();
        buffer.extend(record(RECORD_ACTIVE, [0xAA, 0x11, 0xBB, 0x22], 0x1000));
        buffer.extend(record(RECORD_DELETED, [0xDE, 0xAD, 0xDE, 0xAD], 0x1800));
        buffer.extend(record(RECORD_ACTIVE, [0xCC, 0x33, 0xDD, 0x44], 0x2000));
        buffer.extend(vec![0u8; RECORD_SIZE * 2]);

        let candidates = scan(&buffer);
        assert_eq!(
            candidates,
            vec![
                DiveCandidate {
                    ordinal: 1,
                    fingerprint: [0xAA, 0x11, 0xBB, 0x22],
                    address: 0x1000,
                },
                DiveCandidate {
                    ordinal: 2,
                    fingerprint: [0xCC, 0x33, 0xDD, 0x44],
                    address: 0x2000,
                },
            ]
        );
    }

    #[test]
    fn test_scan_ordinals_are_dense() {
        let mut buffer = Vec::new();
        for i in 0..5u8 {
            let header = if i == 2 { RECORD_DELETED } else { RECORD_ACTIVE };
            buffer.extend(record(header, [i; 4], u32::from(i) * 0x800));
        }
        let candidates = scan(&buffer);
        let ordinals: Vec<u32> = candidates.iter().map(|c| c.ordinal).collect();
        assert_eq!(ordinals, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_scan_empty_and_truncated_buffers() {
        assert!(scan(&[]).is_empty());
        // A truncated active record ends the scan without a candidate.
        let mut buffer = record(RECORD_ACTIVE, [1, 2, 3, 4], 0x1000);
        buffer.extend(&RECORD_ACTIVE.to_be_bytes());
        buffer.extend([0u8; 6]);
        assert_eq!(scan(&buffer).len(), 1);
    }
}
