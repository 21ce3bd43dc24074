//! Petrel native format: the fixed-record dive log decoder.
//!
//! A dive arrives as a stream of 32-byte records: numbered opening
//! records, samples, numbered closing records, and a final record.
//! Decoding runs in passes — record extraction, header decode, sample
//! decode — and produces a [`ParsedDive`].

mod header;
mod records;
mod sample;

pub use records::RECORD_SIZE;

use crate::dive::ParsedDive;
use crate::error::PnfError;

/// Decode one downloaded log into a dive.
///
/// Fails when the input is not whole records, or when no start time or
/// no samples can be recovered from it.
pub fn parse(data: &[u8]) -> Result<ParsedDive, PnfError> {
    let records = records::extract(data)?;
    let header = header::decode(&records);

    if header.start_time == 0 || records.samples.is_empty() {
        return Err(PnfError::NoDive);
    }

    let mut tracker = sample::GasTracker::new();
    let samples: Vec<_> = records
        .samples
        .iter()
        .map(|&(t_offset_ms, block)| sample::decode(&header, t_offset_ms, block, &mut tracker))
        .collect();

    let max_depth_m = header
        .max_depth_m
        .unwrap_or_else(|| samples.iter().map(|s| s.depth_m).fold(0.0, f64::max));
    let avg_depth_m = samples.iter().map(|s| s.depth_m).sum::<f64>() / samples.len() as f64;
    let duration_s = header.duration_s.unwrap_or_else(|| {
        samples
            .last()
            .map(|s| s.t_offset.as_secs() as u32)
            .unwrap_or(0)
    });

    Ok(ParsedDive {
        fingerprint: header.fingerprint,
        start_time: i64::from(header.start_time),
        duration_s,
        max_depth_m,
        avg_depth_m,
        surface_pressure_bar: header.surface_pressure_bar,
        samples,
        gas_mixes: header.gas_mixes,
        tanks: header.tanks,
        deco_model: header.deco_model,
        gf_low: header.gf_low,
        gf_high: header.gf_high,
        dive_mode: header.dive_mode,
        water_density: header.water_density,
        timezone_offset_s: header.timezone_offset_s,
    })
}
