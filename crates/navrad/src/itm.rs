/**
* Contract for the Irregular Terrain Model (Longley-Rice) point-to-point
* routine. The numerical model itself lives with the host; this module pins
* down the calling convention, the surface-electrical constants the blending
* code works in, and the propagation-mode/result-code vocabulary the rest of
* the receiver consumes.
*/
use serde::Serialize;

/// Surface relative permittivity (dimensionless).
pub const DIELEC_GND_AVG: f64 = 15.0;
pub const DIELEC_GND_POOR: f64 = 4.0;
pub const DIELEC_GND_GOOD: f64 = 25.0;
pub const DIELEC_WATER_FRESH: f64 = 81.0;
pub const DIELEC_WATER_SALT: f64 = 81.0;

/// Surface conductivity (Siemens per meter).
pub const CONDUCT_GND_AVG: f64 = 0.005;
pub const CONDUCT_GND_POOR: f64 = 0.001;
pub const CONDUCT_GND_GOOD: f64 = 0.02;
pub const CONDUCT_WATER_FRESH: f64 = 0.01;
pub const CONDUCT_WATER_SALT: f64 = 5.0;

/// Surface refractivity Ns (N-units).
pub const NS_EQUATORIAL: f64 = 360.0;
pub const NS_CONTINENTAL_SUBTROPICAL: f64 = 320.0;
pub const NS_MARITIME_SUBTROPICAL: f64 = 370.0;
pub const NS_DESERT: f64 = 280.0;
pub const NS_CONTINENTAL_TEMPERATE: f64 = 301.0;
pub const NS_MARITIME_TEMPERATE_LAND: f64 = 320.0;
pub const NS_MARITIME_TEMPERATE_SEA: f64 = 350.0;
pub const NS_AVG: f64 = NS_CONTINENTAL_TEMPERATE;

pub const ACCUR_MAX: f64 = 0.99;
pub const ACCUR_MIN: f64 = 0.01;

/// The model is only applicable from 20 MHz up; lower carriers (NDBs) are
/// clamped to the band edge.
pub const MIN_FREQ_MHZ: f64 = 20.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Climate {
    Equatorial = 1,
    ContinentalSubtropical = 2,
    MaritimeTropical = 3,
    Desert = 4,
    ContinentalTemperate = 5,
    MaritimeTemperateLand = 6,
    MaritimeTemperateSea = 7,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Polarization {
    Horizontal = 0,
    Vertical = 1,
}

/// Principal propagation mode classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PropMode {
    Unknown,
    LineOfSight,
    SingleHorizonDiff,
    SingleHorizonTropo,
    DoubleHorizonDiff,
    DoubleHorizonTropo,
}

impl PropMode {
    pub fn from_code(code: i32) -> PropMode {
        match code {
            0 => PropMode::LineOfSight,
            5 => PropMode::SingleHorizonDiff,
            6 => PropMode::SingleHorizonTropo,
            9 => PropMode::DoubleHorizonDiff,
            10 => PropMode::DoubleHorizonTropo,
            _ => PropMode::Unknown,
        }
    }

    pub fn code(self) -> i32 {
        match self {
            PropMode::Unknown => -1,
            PropMode::LineOfSight => 0,
            PropMode::SingleHorizonDiff => 5,
            PropMode::SingleHorizonTropo => 6,
            PropMode::DoubleHorizonDiff => 9,
            PropMode::DoubleHorizonTropo => 10,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PropMode::Unknown => "unknown",
            PropMode::LineOfSight => "line-of-sight",
            PropMode::SingleHorizonDiff => "single-horizon diffraction",
            PropMode::SingleHorizonTropo => "single-horizon troposcatter",
            PropMode::DoubleHorizonDiff => "double-horizon diffraction",
            PropMode::DoubleHorizonTropo => "double-horizon troposcatter",
        }
    }
}

/// Model result quality. Anything but `Success` means some input fell
/// outside the validated envelope and a default or extrapolation was used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ResultCode {
    Success,
    RangeSingle,
    DefaultSubst,
    RangeMulti,
}

#[derive(Debug, Clone)]
pub struct ItmRequest<'a> {
    /// Terrain elevation profile, meters, evenly spaced over `dist`.
    pub elev: &'a [f64],
    /// Great-circle distance between the antennas, meters.
    pub dist: f64,
    /// Antenna heights above local ground, meters.
    pub ht1: f64,
    pub ht2: f64,
    pub dielec: f64,
    pub conduct: f64,
    pub surfref: f64,
    pub freq_mhz: f64,
    pub climate: Climate,
    pub pol: Polarization,
    pub time_accur: f64,
    pub loc_accur: f64,
    pub conf_accur: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct ItmOutput {
    /// Median path loss, dB (positive).
    pub dbloss: f64,
    pub propmode: PropMode,
    /// Terrain irregularity parameter the model derived, meters.
    pub delta_h: f64,
    pub result: ResultCode,
}

/// The point-to-point-MDH routine of a Longley-Rice implementation.
pub trait ItmModel: Send + Sync {
    fn point_to_point_mdh(&self, req: &ItmRequest<'_>) -> ItmOutput;
}

pub fn clamp_freq_mhz(freq_hz: u64) -> f64 {
    (freq_hz as f64 / 1e6).max(MIN_FREQ_MHZ)
}

/// Cheap best-case estimate: the same model run over a two-point, dead-flat
/// profile with average ground. Terrain can only make things worse, so a
/// candidate whose flat-earth signal already sits below the noise floor can
/// be rejected without paying for a terrain probe.
pub fn flat_earth_loss(
    model: &dyn ItmModel,
    dist: f64,
    ht1: f64,
    ht2: f64,
    freq_mhz: f64,
    pol: Polarization,
) -> f64 {
    let elev = [0.0, 0.0];
    let out = model.point_to_point_mdh(&ItmRequest {
        elev: &elev,
        dist,
        ht1,
        ht2,
        dielec: DIELEC_GND_AVG,
        conduct: CONDUCT_GND_AVG,
        surfref: NS_AVG,
        freq_mhz,
        climate: Climate::ContinentalTemperate,
        pol,
        time_accur: ACCUR_MAX,
        loc_accur: ACCUR_MAX,
        conf_accur: ACCUR_MAX,
    });
    out.dbloss
}
