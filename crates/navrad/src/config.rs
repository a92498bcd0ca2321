use serde::Deserialize;

use crate::error::Error;

pub const NUM_NAV_RADIOS: usize = 2;
pub const MAX_NUM_DMES: usize = 8;
pub const MAX_STREAMS: usize = 4;

/// Host-controlled tunables. Anything changed between ticks takes effect at
/// the next worker pass.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Candidate search radius around the aircraft, nautical miles.
    pub search_range_nm: f64,
    /// Background worker cadence, seconds.
    pub worker_interval: f64,
    /// Fast-loop bailout: ticks closer together than this are ignored.
    pub min_delta_t: f64,
    /// Number of standalone DME radios, 1..=8.
    pub num_dmes: usize,
    /// Independent audio streams per radio, 1..=4.
    pub num_streams: usize,
    /// Audio sample rate; 48000 or 44100.
    pub audio_srate: u32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            search_range_nm: 300.0,
            worker_interval: 0.25,
            min_delta_t: 0.01,
            num_dmes: 1,
            num_streams: MAX_STREAMS,
            audio_srate: 48_000,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), Error> {
        if !(self.search_range_nm > 0.0) {
            return Err(Error::BadConfig("search_range_nm must be positive"));
        }
        if !(0.00025..=1.0).contains(&self.worker_interval) {
            return Err(Error::BadConfig("worker_interval outside 250us..=1s"));
        }
        if !(1..=MAX_NUM_DMES).contains(&self.num_dmes) {
            return Err(Error::BadConfig("num_dmes outside 1..=8"));
        }
        if !(1..=MAX_STREAMS).contains(&self.num_streams) {
            return Err(Error::BadConfig("num_streams outside 1..=4"));
        }
        if self.audio_srate != 48_000 && self.audio_srate != 44_100 {
            return Err(Error::BadConfig("audio_srate must be 48000 or 44100"));
        }
        Ok(())
    }
}
