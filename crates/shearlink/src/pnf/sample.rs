//! Third pass: decode sample blocks.

use std::time::Duration;

use crate::byteview::ByteView;
use crate::dive::{DiveEvent, DiveMode, GasMix, Sample};

use super::header::Header;

const FT_TO_M: f64 = 0.3048;
const PSI_TO_BAR: f64 = 0.068_947_6;

/// NDL display caps at 99 minutes; larger stored values mean the same.
const NDL_CAP_MIN: u8 = 99;

/// Gas-change state carried across samples so repeated samples on the
/// same gas do not re-emit the event.
pub(crate) struct GasTracker {
    last_o2: u8,
    last_he: u8,
    last_is_oc: Option<bool>,
}

impl GasTracker {
    pub(crate) fn new() -> Self {
        Self {
            last_o2: 0,
            last_he: 0,
            last_is_oc: None,
        }
    }
}

pub(crate) fn decode(
    header: &Header,
    t_offset_ms: u32,
    block: ByteView<'_>,
    tracker: &mut GasTracker,
) -> Sample {
    let status = block.u8_at(12).unwrap_or(0);
    let is_oc = status & 0x10 != 0;
    let is_external_ppo2 = status & 0x02 == 0;

    let depth_m = block
        .u16_at(1)
        .map(|raw| {
            let scale = if header.is_imperial { FT_TO_M * 0.1 } else { 0.1 };
            f64::from(raw) * scale
        })
        .unwrap_or(0.0);

    let temperature_c = block
        .i8_at(14)
        .map(|raw| decode_temperature(raw, header.is_imperial));

    let tank_pressure_bar = decode_tank_pressure(header, block);

    let ppo2 = block
        .u8_at(7)
        .filter(|&v| v > 0)
        .map(|v| f64::from(v) / 100.0);
    let sensors = decode_sensors(header, block, is_oc, is_external_ppo2);

    let setpoint = block
        .u8_at(19)
        .filter(|&v| v > 0)
        .map(|v| f64::from(v) / 100.0);
    let cns = block.u8_at(23).map(|v| f64::from(v) / 100.0);

    let deco_minutes = block.u8_at(10).unwrap_or(0);
    let stop_raw = block.u16_at(3).unwrap_or(0);
    let (ndl_s, deco_ceiling_m, deco_stop_depth_m, deco_stop_time_s) = if stop_raw > 0 {
        let mut stop_depth = f64::from(stop_raw);
        if header.is_imperial {
            stop_depth *= FT_TO_M;
        }
        (
            None,
            Some(stop_depth),
            Some(stop_depth),
            Some(u32::from(deco_minutes) * 60),
        )
    } else {
        (
            Some(u32::from(deco_minutes.min(NDL_CAP_MIN)) * 60),
            None,
            None,
            None,
        )
    };

    let tts_s = block
        .u16_at(5)
        .filter(|&v| v > 0)
        .map(|v| u32::from(v) * 60);

    let (gas_mix, events) = track_gas(block, is_oc, tracker);

    Sample {
        t_offset: Duration::from_millis(u64::from(t_offset_ms)),
        depth_m,
        temperature_c,
        tank_pressure_bar,
        ppo2,
        setpoint,
        cns,
        ndl_s,
        deco_ceiling_m,
        deco_stop_depth_m,
        deco_stop_time_s,
        tts_s,
        gas_mix,
        sensors,
        is_external_ppo2,
        events,
        dive_mode: if is_oc { DiveMode::OcTec } else { DiveMode::Ccr },
    }
}

/// Temperatures below zero sit in the top of the signed range with a
/// +102 bias; the biased band saturates at zero.
fn decode_temperature(raw: i8, is_imperial: bool) -> f64 {
    let mut value = i32::from(raw);
    if value < 0 {
        value = (value + 102).min(0);
    }
    let value = f64::from(value);
    if is_imperial {
        (value - 32.0) * 5.0 / 9.0
    } else {
        value
    }
}

/// Air-integration pressure moved by one byte across firmware families.
fn pressure_offset(log_version: u8) -> usize {
    if log_version > 14 {
        28
    } else {
        27
    }
}

fn decode_tank_pressure(header: &Header, block: ByteView<'_>) -> Option<f64> {
    if !header.ai_enabled {
        return None;
    }
    let raw = block.u16_at(pressure_offset(header.log_version))?;
    if raw >= 0xFFF0 {
        // No transmitter paired or out of range.
        return None;
    }
    let psi = f64::from(raw & 0x0FFF) * 2.0;
    Some(psi * PSI_TO_BAR)
}

const SENSOR_OFFSETS: [usize; 3] = [13, 15, 16];

fn decode_sensors(
    header: &Header,
    block: ByteView<'_>,
    is_oc: bool,
    is_external_ppo2: bool,
) -> [Option<f64>; 3] {
    let mut sensors = [None; 3];
    if is_oc || !is_external_ppo2 {
        return sensors;
    }
    for (i, &offset) in SENSOR_OFFSETS.iter().enumerate() {
        if let (Some(calibration), Some(raw)) =
            (header.sensor_calibration[i], block.u8_at(offset))
        {
            sensors[i] = Some(f64::from(raw) * calibration);
        }
    }
    sensors
}

fn track_gas(
    block: ByteView<'_>,
    is_oc: bool,
    tracker: &mut GasTracker,
) -> (Option<GasMix>, Vec<DiveEvent>) {
    let gas_o2 = block.u8_at(8).unwrap_or(0);
    let gas_he = block.u8_at(9).unwrap_or(0);
    if gas_o2 == 0 && gas_he == 0 {
        return (None, Vec::new());
    }

    let mix = GasMix {
        o2: f64::from(gas_o2) / 100.0,
        he: f64::from(gas_he) / 100.0,
        is_diluent: !is_oc,
    };
    let changed = (gas_o2, gas_he) != (tracker.last_o2, tracker.last_he)
        || tracker.last_is_oc.is_some_and(|last| last != is_oc);

    let mut events = Vec::new();
    if changed {
        events.push(if is_oc {
            DiveEvent::GasChange(mix)
        } else {
            DiveEvent::DiluentChange(mix)
        });
        tracker.last_o2 = gas_o2;
        tracker.last_he = gas_he;
    }
    tracker.last_is_oc = Some(is_oc);

    (Some(mix), events)
}
