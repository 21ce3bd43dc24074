//! First pass: sort the fixed-size blocks into opening, closing, sample,
//! and final records, and accumulate sample time offsets.

use crate::byteview::ByteView;
use crate::error::PnfError;

/// Every record is exactly this long.
pub const RECORD_SIZE: usize = 32;

const TYPE_SAMPLE: u8 = 0x01;
const TYPE_OPENING_FIRST: u8 = 0x10;
const TYPE_OPENING_LAST: u8 = 0x17;
const TYPE_CLOSING_FIRST: u8 = 0x20;
const TYPE_CLOSING_LAST: u8 = 0x27;
const TYPE_INFO: u8 = 0x30;
const TYPE_SAMPLE_EXT: u8 = 0xE1;
const TYPE_FINAL: u8 = 0xFF;

/// Time between samples unless the log overrides it.
const DEFAULT_SAMPLE_INTERVAL_MS: u32 = 10_000;

/// Offset of the interval override (big-endian milliseconds) in the
/// sixth opening record.
const SAMPLE_INTERVAL_OFFSET: usize = 23;

pub(crate) struct Records<'a> {
    pub opening: [Option<ByteView<'a>>; 8],
    pub closing: [Option<ByteView<'a>>; 8],
    pub final_record: Option<ByteView<'a>>,
    /// Sample blocks with their accumulated offset in milliseconds.
    pub samples: Vec<(u32, ByteView<'a>)>,
}

pub(crate) fn extract(data: &[u8]) -> Result<Records<'_>, PnfError> {
    if data.len() % RECORD_SIZE != 0 {
        return Err(PnfError::UnalignedInput(data.len()));
    }

    let mut records = Records {
        opening: [None; 8],
        closing: [None; 8],
        final_record: None,
        samples: Vec::with_capacity(data.len() / RECORD_SIZE),
    };
    let mut interval_ms = DEFAULT_SAMPLE_INTERVAL_MS;
    let mut current_ms: u32 = 0;

    for block in data.chunks_exact(RECORD_SIZE) {
        let view = ByteView::new(block);
        match block[0] {
            TYPE_SAMPLE => {
                current_ms += interval_ms;
                records.samples.push((current_ms, view));
            }
            t @ TYPE_OPENING_FIRST..=TYPE_OPENING_LAST => {
                let slot = usize::from(t - TYPE_OPENING_FIRST);
                records.opening[slot] = Some(view);
                if slot == 5 {
                    if let Some(ms) = view.u16_at(SAMPLE_INTERVAL_OFFSET) {
                        if ms > 0 {
                            interval_ms = u32::from(ms);
                        }
                    }
                }
            }
            t @ TYPE_CLOSING_FIRST..=TYPE_CLOSING_LAST => {
                records.closing[usize::from(t - TYPE_CLOSING_FIRST)] = Some(view);
            }
            TYPE_FINAL => records.final_record = Some(view),
            // Info and sample-extension records carry nothing we surface.
            TYPE_INFO | TYPE_SAMPLE_EXT => {}
            _ => {}
        }
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pnf::tests::block;

    #[test]
    fn test_rejects_unaligned_input() {
        assert!(matches!(
            extract(&[0u8; 31]),
            Err(PnfError::UnalignedInput(31))
        ));
        assert!(matches!(
            extract(&[0u8; 33]),
            Err(PnfError::UnalignedInput(33))
        ));
        assert!(extract(&[]).is_ok());
    }

    #[test]
    fn test_sample_offsets_default_interval() {
        let mut data = Vec::new();
        data.extend(block(0x10, &[]));
        data.extend(block(0x01, &[]));
        data.extend(block(0x01, &[]));
        let records = extract(&data).unwrap();
        let offsets: Vec<u32> = records.samples.iter().map(|&(t, _)| t).collect();
        assert_eq!(offsets, vec![10_000, 20_000]);
    }

    #[test]
    fn test_sample_interval_override() {
        let mut data = Vec::new();
        data.extend(block(0x15, &[(23, &250u16.to_be_bytes())]));
        data.extend(block(0x01, &[]));
        data.extend(block(0x01, &[]));
        data.extend(block(0x01, &[]));
        let records = extract(&data).unwrap();
        let offsets: Vec<u32> = records.samples.iter().map(|&(t, _)| t).collect();
        assert_eq!(offsets, vec![250, 500, 750]);
    }

    #[test]
    fn test_zero_interval_override_is_ignored() {
        let mut data = Vec::new();
        data.extend(block(0x15, &[(23, &0u16.to_be_bytes())]));
        data.extend(block(0x01, &[]));
        let records = extract(&data).unwrap();
        assert_eq!(records.samples[0].0, 10_000);
    }

    #[test]
    fn test_unknown_record_types_are_skipped() {
        let mut data = Vec::new();
        data.extend(block(0x30, &[]));
        data.extend(block(0xE1, &[]));
        data.extend(block(0x42, &[]));
        data.extend(block(0xFF, &[(13, &[8])]));
        let records = extract(&data).unwrap();
        assert!(records.samples.is_empty());
        assert!(records.final_record.is_some());
    }
}
