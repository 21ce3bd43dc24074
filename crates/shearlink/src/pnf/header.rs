//! Second pass: decode the opening, closing, and final records into the
//! dive header.

use crate::byteview::ByteView;
use crate::dive::{DiveMode, GasMix, Tank, TankUsage};

use super::records::Records;

/// Model byte of the Teric family in the final record.
pub(crate) const MODEL_TERIC: u8 = 8;

const FT_TO_M: f64 = 0.3048;

/// Gas slots available on the device; the upper half are diluents.
const GAS_SLOTS: usize = 10;
const FIRST_DILUENT_SLOT: usize = 5;

/// All gases enabled, the fallback when the log carries no mask.
const DEFAULT_GAS_MASK: u16 = 0x1F;

pub(crate) struct Header {
    pub fingerprint: [u8; 4],
    pub start_time: u32,
    pub is_imperial: bool,
    pub gf_low: Option<u8>,
    pub gf_high: Option<u8>,
    pub dive_mode: Option<DiveMode>,
    pub log_version: u8,
    pub ai_enabled: bool,
    pub deco_model: Option<String>,
    pub water_density: Option<f64>,
    pub sensor_calibration: [Option<f64>; 3],
    pub surface_pressure_bar: Option<f64>,
    pub timezone_offset_s: Option<i64>,
    pub max_depth_m: Option<f64>,
    pub duration_s: Option<u32>,
    pub gas_mixes: Vec<GasMix>,
    pub tanks: Vec<Tank>,
}

pub(crate) fn decode(records: &Records<'_>) -> Header {
    let opening = |slot: usize| records.opening[slot];

    let fingerprint = opening(0).and_then(|r| r.array::<4>(12)).unwrap_or([0; 4]);

    let mut start_time = opening(0).and_then(|r| r.u32_at(12)).unwrap_or(0);
    if start_time == 0 {
        start_time = opening(2).and_then(|r| r.u32_at(20)).unwrap_or(0);
    }

    let is_imperial = opening(0).and_then(|r| r.u8_at(8)) == Some(1);
    let gf_low = opening(0).and_then(|r| r.u8_at(4));
    let gf_high = opening(0).and_then(|r| r.u8_at(5));

    let dive_mode = opening(4).and_then(|r| r.u8_at(1)).map(DiveMode::from_u8);
    let log_version = opening(4).and_then(|r| r.u8_at(16)).unwrap_or(0);
    let gas_mask = opening(4)
        .and_then(|r| r.u16_at(17))
        .filter(|&mask| mask != 0)
        .unwrap_or(DEFAULT_GAS_MASK);
    let ai_enabled = opening(4).and_then(|r| r.u8_at(28)).unwrap_or(0) != 0;

    let deco_model = opening(2).and_then(|r| r.u8_at(18)).map(deco_model_name);

    let water_density = opening(3)
        .and_then(|r| r.u16_at(3))
        .filter(|&density| density > 0)
        .map(f64::from);

    let sensor_calibration = decode_calibration(opening(3));

    let surface_pressure_bar = opening(1)
        .and_then(|r| r.u16_at(16))
        .filter(|&pressure| pressure > 0)
        .map(|pressure| f64::from(pressure) / 1000.0);

    let (o2_percent, he_percent) = decode_gas_percents(opening(0), opening(1));

    let model = records.final_record.and_then(|r| r.u8_at(13));
    let timezone_offset_s = decode_timezone(opening(5), model, log_version);

    let (max_depth_m, duration_s) = match records.closing[0] {
        Some(r) => {
            let depth = r.u16_at(4).map(|raw| {
                let mut depth = f64::from(raw);
                if is_imperial {
                    depth *= FT_TO_M;
                }
                depth / 10.0
            });
            (depth, r.u24_at(6))
        }
        None => (None, None),
    };

    let gas_mixes = assemble_gas_mixes(
        gas_mask,
        &o2_percent,
        &he_percent,
        dive_mode.unwrap_or(DiveMode::Unknown(0xFF)),
    );
    let tanks = decode_tanks(records, model);

    Header {
        fingerprint,
        start_time,
        is_imperial,
        gf_low,
        gf_high,
        dive_mode,
        log_version,
        ai_enabled,
        deco_model,
        water_density,
        sensor_calibration,
        surface_pressure_bar,
        timezone_offset_s,
        max_depth_m,
        duration_s,
        gas_mixes,
        tanks,
    }
}

fn deco_model_name(code: u8) -> String {
    match code {
        0 => "Buhlmann ZHL-16C".to_string(),
        1 => "VPM-B".to_string(),
        2 => "VPM-B/GFS".to_string(),
        3 => "DCIEM".to_string(),
        other => format!("Unknown ({other})"),
    }
}

fn decode_calibration(opening3: Option<ByteView<'_>>) -> [Option<f64>; 3] {
    let mut calibration = [None; 3];
    let Some(r) = opening3 else {
        return calibration;
    };
    let Some(mask) = r.u8_at(6) else {
        return calibration;
    };
    for (i, slot) in calibration.iter_mut().enumerate() {
        if mask & (1 << i) != 0 {
            *slot = r.u16_at(7 + 2 * i).map(|v| f64::from(v) / 100_000.0);
        }
    }
    calibration
}

fn decode_gas_percents(
    opening0: Option<ByteView<'_>>,
    opening1: Option<ByteView<'_>>,
) -> ([u8; GAS_SLOTS], [u8; GAS_SLOTS]) {
    let mut o2 = [0u8; GAS_SLOTS];
    let mut he = [0u8; GAS_SLOTS];
    if let Some(r) = opening0 {
        if let Some(bytes) = r.slice(20, GAS_SLOTS) {
            o2.copy_from_slice(bytes);
        }
        he[0] = r.u8_at(30).unwrap_or(0);
        he[1] = r.u8_at(31).unwrap_or(0);
    }
    if let Some(r) = opening1 {
        if let Some(bytes) = r.slice(1, 8) {
            he[2..GAS_SLOTS].copy_from_slice(bytes);
        }
    }
    (o2, he)
}

/// Timezone data exists only in Teric-family logs of a new enough
/// format: minutes east of UTC plus a whole-hour DST shift.
fn decode_timezone(
    opening5: Option<ByteView<'_>>,
    model: Option<u8>,
    log_version: u8,
) -> Option<i64> {
    if model != Some(MODEL_TERIC) || log_version < 9 {
        return None;
    }
    let r = opening5?;
    let utc_minutes = r.i32_at(26)?;
    let dst_hours = r.u8_at(30)?;
    Some(i64::from(utc_minutes) * 60 + i64::from(dst_hours) * 3600)
}

fn assemble_gas_mixes(
    mask: u16,
    o2: &[u8; GAS_SLOTS],
    he: &[u8; GAS_SLOTS],
    mode: DiveMode,
) -> Vec<GasMix> {
    let mut mixes = Vec::new();
    for slot in 0..GAS_SLOTS {
        if mask & (1 << slot) == 0 {
            continue;
        }
        let is_diluent = slot >= FIRST_DILUENT_SLOT;
        if is_diluent && !mode.has_diluents() {
            continue;
        }
        if o2[slot] == 0 && he[slot] == 0 {
            continue;
        }
        mixes.push(GasMix {
            o2: f64::from(o2[slot]) / 100.0,
            he: f64::from(he[slot]) / 100.0,
            is_diluent,
        });
    }
    mixes
}

/// Transmitter serial locations: (opening slot, byte offset).
const TANK_SERIAL_SLOTS: [(usize, usize); 4] = [(5, 1), (5, 10), (6, 25), (7, 4)];

fn decode_tanks(records: &Records<'_>, model: Option<u8>) -> Vec<Tank> {
    let mut tanks = Vec::new();
    for &(slot, offset) in &TANK_SERIAL_SLOTS {
        let Some(bytes) = records.opening[slot].and_then(|r| r.array::<3>(offset)) else {
            continue;
        };
        let serial = if model == Some(MODEL_TERIC) {
            // The Teric stores transmitter serials reversed.
            let mut reversed = bytes;
            reversed.reverse();
            hex::encode_upper(reversed)
        } else {
            hex::encode_upper(bytes)
        };
        if serial == "000000" {
            continue;
        }
        tanks.push(Tank {
            name: format!("Tank {}", tanks.len() + 1),
            serial,
            usage: TankUsage::Unknown,
        });
    }
    tanks
}
