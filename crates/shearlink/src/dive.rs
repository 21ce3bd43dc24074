//! Parsed dive log model.

use std::fmt;
use std::time::Duration;

/// Operating mode of the computer, per dive or per sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiveMode {
    Ccr,
    OcTec,
    Gauge,
    Ppo2,
    SemiClosed,
    OcRec,
    Freedive,
    Avelo,
    Unknown(u8),
}

impl DiveMode {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 | 5 => Self::Ccr,
            1 => Self::OcTec,
            2 => Self::Gauge,
            3 => Self::Ppo2,
            4 => Self::SemiClosed,
            6 => Self::OcRec,
            7 => Self::Freedive,
            12 => Self::Avelo,
            other => Self::Unknown(other),
        }
    }

    /// Closed-loop modes carry diluent gas slots.
    pub fn has_diluents(self) -> bool {
        matches!(self, Self::Ccr | Self::SemiClosed)
    }
}

impl fmt::Display for DiveMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ccr => write!(f, "CCR"),
            Self::OcTec => write!(f, "OC-Tec"),
            Self::Gauge => write!(f, "Gauge"),
            Self::Ppo2 => write!(f, "PPO2"),
            Self::SemiClosed => write!(f, "SemiClosed"),
            Self::OcRec => write!(f, "OC-Rec"),
            Self::Freedive => write!(f, "Freedive"),
            Self::Avelo => write!(f, "Avelo"),
            Self::Unknown(code) => write!(f, "Unknown ({code})"),
        }
    }
}

/// A breathing gas, fractions in `0.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GasMix {
    pub o2: f64,
    pub he: f64,
    pub is_diluent: bool,
}

/// What a tank transmitter feeds.
///
/// The log does not record the transmitter-to-gas assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum TankUsage {
    Unknown,
}

/// A paired pressure transmitter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tank {
    pub name: String,
    /// Transmitter serial, six hex digits.
    pub serial: String,
    pub usage: TankUsage,
}

/// An event attached to a sample.
#[derive(Debug, Clone, PartialEq)]
pub enum DiveEvent {
    GasChange(GasMix),
    DiluentChange(GasMix),
    Warning(String),
    Error(String),
    Unknown(u8),
}

/// One decoded sample.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// Offset from the dive start. Strictly increasing across samples.
    pub t_offset: Duration,
    pub depth_m: f64,
    pub temperature_c: Option<f64>,
    pub tank_pressure_bar: Option<f64>,
    pub ppo2: Option<f64>,
    pub setpoint: Option<f64>,
    pub cns: Option<f64>,
    pub ndl_s: Option<u32>,
    pub deco_ceiling_m: Option<f64>,
    pub deco_stop_depth_m: Option<f64>,
    pub deco_stop_time_s: Option<u32>,
    pub tts_s: Option<u32>,
    /// The gas the loop was on at this sample.
    pub gas_mix: Option<GasMix>,
    /// Cell PPO2 readings, present only for calibrated external sensors.
    pub sensors: [Option<f64>; 3],
    pub is_external_ppo2: bool,
    pub events: Vec<DiveEvent>,
    pub dive_mode: DiveMode,
}

/// A fully decoded dive.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedDive {
    /// Device-assigned dive identifier, used for incremental sync.
    pub fingerprint: [u8; 4],
    /// Dive start in Unix seconds as recorded by the device clock.
    pub start_time: i64,
    pub duration_s: u32,
    pub max_depth_m: f64,
    pub avg_depth_m: f64,
    pub surface_pressure_bar: Option<f64>,
    pub samples: Vec<Sample>,
    pub gas_mixes: Vec<GasMix>,
    pub tanks: Vec<Tank>,
    pub deco_model: Option<String>,
    pub gf_low: Option<u8>,
    pub gf_high: Option<u8>,
    pub dive_mode: Option<DiveMode>,
    pub water_density: Option<f64>,
    /// Seconds east of UTC, only recorded by Teric-family logs.
    pub timezone_offset_s: Option<i64>,
}

/// One downloaded dive: the raw record stream, plus the parsed form when
/// decoding succeeded.
#[derive(Debug, Clone)]
pub struct DiveLog {
    pub fingerprint: [u8; 4],
    pub raw_data: Vec<u8>,
    pub dive: Option<ParsedDive>,
}
