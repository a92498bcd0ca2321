/**
* The per-receiver model: candidate bookkeeping, strongest-station selection
* under the co-channel interference rule, service-volume and antenna-pattern
* shaping, and the derived cockpit outputs (bearing, radial, DME distance,
* course and glide-path deviations) with calibrated noise injection.
*
* Locking: each radio owns one non-reentrant mutex over all of its mutable
* state, including the candidate sets and the per-stream distortion
* contexts. The fast loop, the audio path and the public accessors all take
* it briefly; candidate-set membership only ever changes on the worker
* thread, which keeps its expensive propagation work outside the lock and
* re-acquires it just to store results.
*/
use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, MutexGuard};

use libm::{cos, log, pow, sin};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use serde::Serialize;
use tracing::trace;

use crate::audio::{am_mix, bfo_mix, ToneSet};
use crate::config::{Config, MAX_STREAMS};
use crate::distort::Distort;
use crate::filters::{curve, filter_in, filter_in_nan, iter_fract, wavg};
use crate::geo::{
    self, dir2hdg, geo2ecef, loc_sector_width, normalize_hdg, rel_hdg, FlatPlane,
    Position3, Vec2, Vec3,
};
use crate::itm::PropMode;
use crate::morse::{encode_chunks, NUM_AUDIO_CHUNKS};
use crate::navdata::{
    is_valid_loc_freq, is_valid_ndb_freq, is_valid_vor_freq, Navaid, NavaidData,
    NavaidKey, NavaidKind,
};

pub(crate) const ANT_BASE_GAIN: f64 = 92.0; /* dB */
pub(crate) const INTERFERENCE_LIMIT: f64 = 16.0; /* dB */
pub(crate) const NOISE_LEVEL_AUDIO: f64 = -55.0; /* dB */
pub(crate) const NOISE_FLOOR_AUDIO: f64 = -80.0; /* dB */
pub(crate) const NOISE_FLOOR_ERROR_RATE: f64 = -79.0; /* dB */
pub(crate) const NOISE_FLOOR_NAV_ID: f64 = -73.0; /* dB */
pub(crate) const NOISE_FLOOR_TEST: f64 = -85.0; /* dB */
pub(crate) const NOISE_FLOOR_TOO_FAR: f64 = -100.0; /* dB */

const HDEF_MAX: f64 = 5.0; /* dots */
const VDEF_MAX: f64 = 2.5; /* dots */
const HDEF_VOR_DEG_PER_DOT: f64 = 2.0;
const HDEF_LOC_DDM_PER_DOT: f64 = 0.0775;
const VDEF_GS_DEG_PER_DOT: f64 = 3.5714;

const VOR_SIGMA_FLOOR: f64 = 2e-4;
const DME_SIGMA_FLOOR: f64 = 1e-3;
const LOC_SIGMA_FLOOR: f64 = 2e-4;
const GS_SIGMA_FLOOR: f64 = 2e-4;

/// Output hold-off after a frequency change / candidate change.
const DME_CHG_DELAY: f64 = 0.2; /* seconds */
const LOCK_DELAY_VLOC: f64 = 1.0; /* seconds */
const LOCK_DELAY_DME: f64 = 0.2; /* seconds */
const LOCK_DELAY_ADF: f64 = 0.75; /* seconds */

/// Where the bearing needle parks without a usable station.
const PARKED_BRG: f64 = 90.0;

/// Telemetry slots exposed per radio for host debugging.
pub const NUM_TELEM_SLOTS: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RadioType {
    Vloc,
    Adf,
    Dme,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AdfMode {
    Adf,
    Ant,
    AdfBfo,
    AntBfo,
}

/// Aircraft state sampled once per fast-loop tick.
#[derive(Debug, Clone, Copy)]
pub struct AircraftPose {
    pub pos: Position3,
    /// True heading, degrees.
    pub hdg: f64,
    pub pitch: f64,
    pub roll: f64,
    /// Magnetic variation at the aircraft, degrees.
    pub magvar: f64,
}

impl Default for AircraftPose {
    fn default() -> Self {
        AircraftPose {
            pos: Position3::new(0.0, 0.0, 0.0),
            hdg: 0.0,
            pitch: 0.0,
            roll: 0.0,
            magvar: 0.0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TelemSlot {
    pub id: String,
    pub kind: Option<NavaidKind>,
    pub signal_db: f64,
    pub propmode: Option<PropMode>,
}

/// A candidate station joined with receiver-relative state.
///
/// `signal_db_tgt` is the raw worker estimate; because the worker only runs
/// a few times a second, using it directly would produce stepwise audio and
/// needle behavior, so the fast loop continuously filters `signal_db_omni`
/// toward it and then derives `signal_db` by applying the antenna pattern
/// and service-volume shaping.
#[derive(Debug)]
pub(crate) struct RadioNavaid {
    pub navaid: Arc<Navaid>,
    pub signal_db: f64,
    pub signal_db_omni: f64,
    pub signal_db_tgt: f64,
    pub outdated: bool,
    pub propmode: PropMode,

    /* Only valid for VORs and NDBs in line-of-sight */
    pub gnd_dist: f64,
    pub slant_angle: f64,
    pub radial_degt: f64,

    pub audio_chunks: [bool; NUM_AUDIO_CHUNKS],
    pub cur_chunk: [usize; MAX_STREAMS],
}

impl RadioNavaid {
    fn new(navaid: Arc<Navaid>, start_chunk: usize) -> RadioNavaid {
        let start = start_chunk % NUM_AUDIO_CHUNKS;
        RadioNavaid {
            audio_chunks: encode_chunks(&navaid.id),
            navaid,
            signal_db: NOISE_FLOOR_TOO_FAR,
            signal_db_omni: NOISE_FLOOR_TOO_FAR,
            signal_db_tgt: NOISE_FLOOR_TOO_FAR,
            outdated: false,
            propmode: PropMode::Unknown,
            gnd_dist: f64::NAN,
            slant_angle: f64::NAN,
            radial_degt: f64::NAN,
            cur_chunk: [start; MAX_STREAMS],
        }
    }

    fn chunk_on(&self, stream_id: usize) -> bool {
        self.audio_chunks[self.cur_chunk[stream_id]]
    }
}

pub(crate) type CandidateSet = BTreeMap<NavaidKey, RadioNavaid>;

/// Snapshot of the winning station handed to the output computations.
#[derive(Debug, Clone)]
struct Winner {
    navaid: Arc<Navaid>,
    signal_db: f64,
    slant_angle: f64,
    radial_degt: f64,
}

pub(crate) struct RadioState {
    pub failed: bool,
    pub freq: u64,
    pub new_freq: Option<u64>,
    pub freq_chg_t: f64,
    pub ident_delay: f64,

    pub obs_pilot: f64,
    pub obs_copilot: f64,
    pub hdef_pilot: f64,
    pub tofrom_pilot: bool,
    pub hdef_copilot: f64,
    pub tofrom_copilot: bool,
    pub loc_ddm: f64,
    pub hdef_lock_t: f64,
    pub gs: f64,
    pub loc_fcrs: f64,
    pub brg: f64,
    pub brg_lock_t: f64,
    pub brg_override: bool,
    pub dme: f64,
    pub dme_lock_t: f64,
    pub adf_mode: AdfMode,

    /* input signal level driving the filter time constants */
    pub signal_db: f64,

    pub vdef: f64,
    pub gp_ddm: f64,
    pub vdef_prev: f64,
    pub vdef_rate: f64,
    pub vdef_lock_t: f64,

    pub vlocs: CandidateSet,
    pub gses: CandidateSet,
    pub dmes: CandidateSet,
    pub adfs: CandidateSet,

    pub telem: Vec<TelemSlot>,

    distort_vloc: Vec<Distort>,
    distort_dme: Vec<Distort>,

    rng: SmallRng,
}

pub(crate) struct Radio {
    pub rtype: RadioType,
    pub nr: usize,
    state: Mutex<RadioState>,
}

fn hz2mhz(freq: u64) -> f64 {
    freq as f64 / 1e6
}

fn hz2khz(freq: u64) -> f64 {
    freq as f64 / 1e3
}

/// Filter lag scaled by signal level: high SNR tracks fast (the base lag),
/// low SNR stretches the lag by up to 21x at the error floor.
fn signal_db_upd_rate(orig_rate: f64, signal_db: f64) -> f64 {
    let d_sig = signal_db - NOISE_FLOOR_ERROR_RATE;
    let div = pow(10.0, d_sig / 20.0);
    orig_rate + (orig_rate * 20.0) / div
}

/// Normally distributed error whose sigma shrinks with SNR down to a
/// per-output floor.
fn signal_error(rng: &mut SmallRng, signal_db: f64, min_sigma: f64) -> f64 {
    let d_sig = signal_db - NOISE_FLOOR_ERROR_RATE;
    let div = pow(10.0, d_sig / 10.0);
    let sigma = f64::max(1.0 / div, min_sigma);
    Normal::new(0.0, sigma).unwrap().sample(rng)
}

/// Bearing from the aircraft to a navaid, with distance and the elevation
/// angle of the sight line.
fn brg2navaid(acf_pos: Position3, nav: &Navaid) -> (f64, f64, f64) {
    let fpp = FlatPlane::new(acf_pos.horizontal());
    let v = fpp.project(nav.pos.horizontal());
    let vert = geo::vert_angle(acf_pos, nav.pos);
    (dir2hdg(v), v.abs(), vert)
}

/// Bearing from a navaid's guidance reference point to the aircraft.
fn brg_from_navaid(acf_pos: Position3, nav: &Navaid) -> (f64, f64) {
    let pos = nav.corr_pos();
    let fpp = FlatPlane::new(pos.horizontal());
    let v = fpp.project(acf_pos.horizontal());
    (dir2hdg(v), v.abs())
}

/// Cone-of-confusion bearing wander. The current radial seeds the
/// oscillation (amplified so small changes decorrelate) and the carrier
/// frequency makes the pattern unique per station.
fn brg_cone_error(rnav_slant: f64, rnav_radial: f64, freq: u64) -> f64 {
    const MAX_ERROR: f64 = 20.0;
    let f = ((rnav_slant - 60.0) / 30.0).clamp(0.0, 1.0);
    let fact = f * f * f;
    let freq_mhz = hz2mhz(freq);
    MAX_ERROR
        * fact
        * sin(rnav_radial * 2.1 + freq_mhz)
        * sin(rnav_radial * 4.35 + freq_mhz)
}

/// Picks the strongest audible candidate. When the runner-up is within the
/// interference limit the receiver blanks (co-channel interference), so the
/// winner is `None` even though a strongest station exists; the strongest
/// station's level is still reported for signal-quality purposes.
fn strongest(
    tree: &CandidateSet,
    recv_floor: f64,
) -> (Option<Winner>, f64) {
    let mut best: Option<&RadioNavaid> = None;
    let mut second: Option<&RadioNavaid> = None;

    for rnav in tree.values() {
        if rnav.signal_db < recv_floor {
            continue;
        }
        match best {
            None => best = Some(rnav),
            Some(b) if rnav.signal_db > b.signal_db => {
                second = best;
                best = Some(rnav);
            }
            _ => match second {
                None => second = Some(rnav),
                Some(s) if rnav.signal_db > s.signal_db => second = Some(rnav),
                _ => {}
            },
        }
    }

    let strongest_db = best.map_or(NOISE_FLOOR_TOO_FAR, |b| b.signal_db);
    let winner = match (best, second) {
        (Some(b), Some(s)) if b.signal_db - s.signal_db < INTERFERENCE_LIMIT => None,
        (Some(b), _) => Some(Winner {
            navaid: Arc::clone(&b.navaid),
            signal_db: b.signal_db,
            slant_angle: b.slant_angle,
            radial_degt: b.radial_degt,
        }),
        (None, _) => None,
    };
    (winner, strongest_db)
}

/// Locates a same-airport navaid conflicting with `rnav` in its own tree.
/// Used to detect opposite-facing localizer pairs: the two transmitters are
/// never radiating at once in reality, but we can't know which one is
/// active, so the back beam gets suppressed instead.
fn find_conflicting(tree: &CandidateSet, rnav: &RadioNavaid) -> bool {
    let kind = rnav.navaid.kind();
    if kind != NavaidKind::Loc && kind != NavaidKind::Dme {
        return false;
    }
    tree.values().any(|oth| {
        !Arc::ptr_eq(&oth.navaid, &rnav.navaid) && oth.navaid.icao == rnav.navaid.icao
    })
}

/// For a DME, the front course of the localizer it is paired with, if that
/// localizer is also tuned in.
fn find_paired_loc_brg(vlocs: &CandidateSet, rnav: &RadioNavaid) -> Option<f64> {
    vlocs.values().find_map(|oth| {
        if oth.navaid.kind() == NavaidKind::Loc
            && oth.navaid.id == rnav.navaid.id
            && oth.navaid.icao == rnav.navaid.icao
        {
            Some(oth.navaid.loc_brg())
        } else {
            None
        }
    })
}

/*
 * Directivity and service-volume shaping curves. Distance curves are keyed
 * on the navaid's *declared* range: a terminal VOR radiates much weaker than
 * an en-route one, which keeps short-range stations from blanketing the high
 * flight levels. Bearing curves are keyed on the angle off the front course.
 */
const ADF_DIST_CURVE: [(f64, f64); 4] = [
    (0.0, -50.0),
    (20.0 * 1852.0, -50.0),
    (120.0 * 1852.0, 0.0),
    (130.0 * 1852.0, 0.0),
];
const VOR_DIST_CURVE: [(f64, f64); 4] = [
    (0.0, -20.0),
    (20.0 * 1852.0, -20.0),
    (100.0 * 1852.0, 0.0),
    (120.0 * 1852.0, 0.0),
];
const DME_DIST_CURVE: [(f64, f64); 4] = [
    (0.0, 0.0),
    (20.0 * 1852.0, 0.0),
    (100.0 * 1852.0, 20.0),
    (120.0 * 1852.0, 20.0),
];
const ILS_DME_DIST_CURVE: [(f64, f64); 4] = [
    (0.0, -9.0),
    (20.0 * 1852.0, -9.0),
    (100.0 * 1852.0, 11.0),
    (120.0 * 1852.0, 11.0),
];
const LOC_DIST_CURVE: [(f64, f64); 4] = [
    (0.0, -30.0),
    (10.0 * 1852.0, -30.0),
    (40.0 * 1852.0, -20.0),
    (50.0 * 1852.0, -20.0),
];
const GS_DIST_CURVE: [(f64, f64); 4] = [
    (0.0, -25.0),
    (10.0 * 1852.0, -25.0),
    (40.0 * 1852.0, -15.0),
    (50.0 * 1852.0, -15.0),
];
const LOC_RBRG_CURVE: [(f64, f64); 7] = [
    (0.0, 0.0),
    (30.0, -5.0),
    (60.0, -10.0),
    (90.0, -20.0),
    (120.0, -20.0),
    (160.0, -10.0),
    (180.0, -3.0),
];
const LOC_RBRG_NOBC_CURVE: [(f64, f64); 4] = [
    (0.0, 0.0),
    (30.0, -5.0),
    (60.0, -15.0),
    (90.0, -30.0),
];
const GS_RBRG_CURVE: [(f64, f64); 4] = [
    (0.0, 0.0),
    (20.0, -5.0),
    (60.0, -10.0),
    (90.0, -40.0),
];
const VOR_ANGLE_CURVE: [(f64, f64); 10] = [
    (-5.0, -50.0),
    (-2.5, -20.0),
    (0.0, -10.0),
    (10.0, -3.0),
    (20.0, 0.0),
    (30.0, 0.0),
    (40.0, -3.0),
    (50.0, -10.0),
    (60.0, -20.0),
    (90.0, -60.0),
];
const ADF_ANGLE_CURVE: [(f64, f64); 10] = [
    (-5.0, -40.0),
    (-2.5, -15.0),
    (0.0, -5.0),
    (10.0, -1.0),
    (20.0, 0.0),
    (30.0, 0.0),
    (40.0, -3.0),
    (50.0, -5.0),
    (60.0, -20.0),
    (90.0, -40.0),
];

/// Applies the antenna-pattern and service-volume modifiers to derive the
/// audible signal level from the omnidirectional one:
///
/// 1. VORs and NDBs in line-of-sight get the cone-of-confusion angular
///    attenuation, plus the service-volume distance curve.
/// 2. DMEs on VOR channels get a range boost; DMEs on ILS channels use the
///    ILS-specific curve and, when paired with a tuned localizer, inherit
///    its directional pattern.
/// 3. Localizers combine the distance curve with a strongly directional
///    bearing curve; the back beam narrows further when an opposing
///    localizer shares the airport.
/// 4. Glideslopes do the same with a steeper sidelobe rolloff.
fn comp_signal_db(
    rnav: &mut RadioNavaid,
    fpp: &FlatPlane,
    acf_pos: Position3,
    has_bc: bool,
    paired_brg: Option<f64>,
) {
    let nav = Arc::clone(&rnav.navaid);
    match &nav.data {
        NavaidData::Ndb | NavaidData::Vor { .. } => {
            let mut angle_error = 0.0;
            if rnav.propmode == PropMode::LineOfSight {
                let pos_2d = fpp.project(nav.pos.horizontal());
                rnav.radial_degt = dir2hdg(pos_2d);
                rnav.gnd_dist = f64::max(pos_2d.abs(), 1.0);
                rnav.slant_angle =
                    geo::slant_angle(acf_pos.elev - nav.pos.elev, rnav.gnd_dist);
                let angle_curve: &[(f64, f64)] = if nav.kind() == NavaidKind::Vor {
                    &VOR_ANGLE_CURVE
                } else {
                    &ADF_ANGLE_CURVE
                };
                angle_error = curve(rnav.slant_angle, angle_curve);
            }
            let dist_curve: &[(f64, f64)] = if nav.kind() == NavaidKind::Vor {
                &VOR_DIST_CURVE
            } else {
                &ADF_DIST_CURVE
            };
            rnav.signal_db =
                rnav.signal_db_omni + angle_error + curve(nav.range, dist_curve);
        }
        NavaidData::Dme { .. } => {
            if is_valid_loc_freq(hz2mhz(nav.freq)) {
                rnav.signal_db =
                    rnav.signal_db_omni + curve(nav.range, &ILS_DME_DIST_CURVE);
                if let Some(brg) = paired_brg {
                    // Directional, paired DMEs inherit the localizer's beam
                    // pattern; vital when opposing runways share an ILS
                    // frequency.
                    let (brg_fm_nav, _, _) = brg2navaid(acf_pos, &nav);
                    let rbrg = rel_hdg(brg, brg_fm_nav).abs();
                    let c: &[(f64, f64)] = if has_bc {
                        &LOC_RBRG_CURVE
                    } else {
                        &LOC_RBRG_NOBC_CURVE
                    };
                    rnav.signal_db += curve(rbrg, c);
                }
            } else {
                rnav.signal_db =
                    rnav.signal_db_omni + curve(nav.range, &DME_DIST_CURVE);
            }
        }
        NavaidData::Loc { .. } | NavaidData::Gs { .. } => {
            let crs = match &nav.data {
                NavaidData::Loc { .. } => nav.loc_brg(),
                NavaidData::Gs { brg, .. } => *brg,
                _ => unreachable!(),
            };
            let (brg_fm_nav, _, _) = brg2navaid(acf_pos, &nav);
            let rbrg = rel_hdg(crs, brg_fm_nav).abs();
            let mut signal_db = rnav.signal_db_omni;

            if nav.kind() == NavaidKind::Loc {
                let c: &[(f64, f64)] = if has_bc {
                    &LOC_RBRG_CURVE
                } else {
                    &LOC_RBRG_NOBC_CURVE
                };
                signal_db += curve(rbrg, c);
                signal_db += curve(nav.range, &LOC_DIST_CURVE);
            } else {
                signal_db += curve(rbrg, &GS_RBRG_CURVE);
                signal_db += curve(nav.range, &GS_DIST_CURVE);
            }
            rnav.signal_db = signal_db;
        }
        _ => rnav.signal_db = rnav.signal_db_omni,
    }
}

fn signal_levels_update(
    tree: &mut CandidateSet,
    d_t: f64,
    worker_interval: f64,
    fpp: &FlatPlane,
    acf_pos: Position3,
    vlocs: Option<&CandidateSet>,
) {
    let keys: Vec<NavaidKey> = tree.keys().cloned().collect();
    for key in keys {
        let (has_bc, paired_brg) = {
            let rnav = &tree[&key];
            (
                !find_conflicting(tree, rnav),
                vlocs.and_then(|v| find_paired_loc_brg(v, rnav)),
            )
        };
        let rnav = tree.get_mut(&key).unwrap();
        filter_in(
            &mut rnav.signal_db_omni,
            rnav.signal_db_tgt,
            d_t,
            worker_interval,
        );
        comp_signal_db(rnav, fpp, acf_pos, has_bc, paired_brg);
    }
}

impl Radio {
    pub fn new(rtype: RadioType, nr: usize, cfg: &Config) -> Radio {
        let mk_distorts = || {
            (0..cfg.num_streams)
                .map(|_| Distort::new(cfg.audio_srate))
                .collect::<Vec<_>>()
        };
        Radio {
            rtype,
            nr,
            state: Mutex::new(RadioState {
                failed: false,
                freq: 0,
                new_freq: None,
                freq_chg_t: f64::NAN,
                ident_delay: 0.0,
                obs_pilot: 0.0,
                obs_copilot: 0.0,
                hdef_pilot: f64::NAN,
                tofrom_pilot: false,
                hdef_copilot: f64::NAN,
                tofrom_copilot: false,
                loc_ddm: f64::NAN,
                hdef_lock_t: f64::NAN,
                gs: f64::NAN,
                loc_fcrs: f64::NAN,
                brg: f64::NAN,
                brg_lock_t: f64::NAN,
                brg_override: false,
                dme: f64::NAN,
                dme_lock_t: f64::NAN,
                adf_mode: AdfMode::Adf,
                signal_db: NOISE_FLOOR_TOO_FAR,
                vdef: f64::NAN,
                gp_ddm: f64::NAN,
                vdef_prev: f64::NAN,
                vdef_rate: 0.0,
                vdef_lock_t: f64::NAN,
                vlocs: BTreeMap::new(),
                gses: BTreeMap::new(),
                dmes: BTreeMap::new(),
                adfs: BTreeMap::new(),
                telem: vec![TelemSlot::default(); NUM_TELEM_SLOTS],
                distort_vloc: mk_distorts(),
                distort_dme: mk_distorts(),
                rng: SmallRng::from_entropy(),
            }),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, RadioState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// One fast-loop tick: latch any pending retune, smooth candidate
    /// levels toward the worker targets, then refresh the derived outputs.
    pub fn floop(
        &self,
        pose: &AircraftPose,
        cur_t: f64,
        d_t: f64,
        worker_interval: f64,
        terrain: Option<&dyn crate::terrain::TerrainProbe>,
    ) {
        let mut st = self.lock();

        let mut new_freq = st.new_freq;
        if st.failed {
            new_freq = Some(0);
        }
        if let Some(nf) = new_freq {
            if st.freq != nf {
                st.freq = nf;
                st.freq_chg_t = cur_t;
                let frac = st.rng.gen::<f64>();
                st.ident_delay = wavg(5.0, 10.0, frac);
                trace!(nr = self.nr, freq = nf, "retuned");
            }
        }

        let fpp = FlatPlane::new(pose.pos.horizontal());
        match self.rtype {
            RadioType::Vloc => {
                let RadioState {
                    ref mut vlocs,
                    ref mut gses,
                    ref mut dmes,
                    ..
                } = *st;
                signal_levels_update(vlocs, d_t, worker_interval, &fpp, pose.pos, None);
                signal_levels_update(gses, d_t, worker_interval, &fpp, pose.pos, None);
                signal_levels_update(
                    dmes,
                    d_t,
                    worker_interval,
                    &fpp,
                    pose.pos,
                    Some(&*vlocs),
                );
            }
            RadioType::Adf => {
                let RadioState { ref mut adfs, .. } = *st;
                signal_levels_update(adfs, d_t, worker_interval, &fpp, pose.pos, None);
            }
            RadioType::Dme => {
                let RadioState {
                    ref mut vlocs,
                    ref mut dmes,
                    ..
                } = *st;
                signal_levels_update(vlocs, d_t, worker_interval, &fpp, pose.pos, None);
                signal_levels_update(
                    dmes,
                    d_t,
                    worker_interval,
                    &fpp,
                    pose.pos,
                    Some(&*vlocs),
                );
            }
        }

        match self.rtype {
            RadioType::Vloc => {
                self.hdef_update(&mut st, pose, cur_t, d_t, true);
                self.hdef_update(&mut st, pose, cur_t, d_t, false);
                self.vdef_update(&mut st, pose, cur_t, d_t, terrain);
                self.brg_update(&mut st, pose, cur_t, d_t);
                self.dme_update(&mut st, pose, cur_t, d_t);
            }
            RadioType::Adf => {
                self.brg_update(&mut st, pose, cur_t, d_t);
            }
            RadioType::Dme => {
                self.dme_update(&mut st, pose, cur_t, d_t);
            }
        }
    }

    fn is_adf_ant_mode(&self, st: &RadioState) -> bool {
        self.rtype == RadioType::Adf
            && matches!(st.adf_mode, AdfMode::Ant | AdfMode::AntBfo)
    }

    /* ---- derived outputs ---- */

    fn get_bearing(&self, st: &mut RadioState, pose: &AircraftPose, cur_t: f64) -> Option<f64> {
        debug_assert!(self.rtype == RadioType::Vloc || self.rtype == RadioType::Adf);

        let tree = if self.rtype == RadioType::Vloc {
            &st.vlocs
        } else {
            &st.adfs
        };
        let (winner, strongest_db) = strongest(tree, NOISE_FLOOR_AUDIO);
        st.signal_db = strongest_db;
        let win = winner?;

        if win.navaid.kind() == NavaidKind::Loc
            || (cur_t - st.freq_chg_t).abs() < DME_CHG_DELAY
        {
            return None;
        }
        let (true_brg, _, vert_angle) = brg2navaid(pose.pos, &win.navaid);

        if self.rtype != RadioType::Adf {
            const MAX_ERROR: f64 = 5.0;
            let error = MAX_ERROR
                * signal_error(&mut st.rng, win.signal_db, VOR_SIGMA_FLOOR)
                + brg_cone_error(win.slant_angle, win.radial_degt, win.navaid.freq);
            Some(normalize_hdg(true_brg + error))
        } else {
            // The ADF needle shows body-relative bearing, so fold in
            // station elevation plus aircraft pitch and roll: rotate a unit
            // forward vector (x right, y up, z backward) into the antenna
            // frame and read the needle angle off the horizontal plane.
            const MAX_ERROR: f64 = 25.0;
            let v = Vec3::new(0.0, 0.0, -1.0)
                .rot(-vert_angle, 0)
                .rot(true_brg - pose.hdg, 1)
                .rot(pose.pitch, 0)
                .rot(-pose.roll, 2);
            let v2 = Vec2::new(v.x, -v.z);
            if v2.is_zero() {
                return Some(PARKED_BRG);
            }
            let rel_brg = dir2hdg(v2);
            // Signal drop off the direct side is proportional to the
            // remaining on-side component.
            let signal_drop = log(v2.abs()) * 10.0;
            let error = MAX_ERROR
                * signal_error(&mut st.rng, win.signal_db + signal_drop, VOR_SIGMA_FLOOR)
                + brg_cone_error(win.slant_angle, win.radial_degt, win.navaid.freq);
            Some(rel_brg + error)
        }
    }

    fn get_radial(&self, st: &mut RadioState, pose: &AircraftPose, cur_t: f64) -> Option<f64> {
        const MAX_ERROR: f64 = 1.0;
        debug_assert_eq!(self.rtype, RadioType::Vloc);

        let (winner, strongest_db) = strongest(&st.vlocs, NOISE_FLOOR_AUDIO);
        st.signal_db = strongest_db;
        let win = winner?;
        if win.navaid.kind() == NavaidKind::Loc
            || win.navaid.freq != st.freq
            || (cur_t - st.freq_chg_t).abs() < DME_CHG_DELAY
        {
            return None;
        }

        let magvar = match win.navaid.data {
            NavaidData::Vor { magvar } => magvar,
            _ => 0.0,
        };
        let (radial, _) = brg_from_navaid(pose.pos, &win.navaid);
        let error = MAX_ERROR
            * signal_error(&mut st.rng, win.signal_db, VOR_SIGMA_FLOOR)
            + brg_cone_error(win.slant_angle, win.radial_degt, win.navaid.freq);

        Some(normalize_hdg(radial + error - magvar))
    }

    fn get_dme(&self, st: &mut RadioState, pose: &AircraftPose, cur_t: f64) -> Option<f64> {
        // DME pulse width is 3.5 us (500 kHz bandwidth). At near-noise
        // signal equivalence the pulse peak can be mislocated by up to one
        // pulse width, which is about the distance light travels in 3.5 us,
        // hence the 1000 m error base.
        const MAX_ERROR: f64 = 1000.0;

        let (winner, strongest_db) = strongest(&st.dmes, NOISE_FLOOR_AUDIO);
        st.signal_db = strongest_db;
        let win = winner?;
        if win.navaid.freq != st.freq
            || (cur_t - st.freq_chg_t).abs() < DME_CHG_DELAY
        {
            return None;
        }

        let bias = match win.navaid.data {
            NavaidData::Dme { bias, .. } => bias,
            _ => 0.0,
        };
        let acf_ecef = geo2ecef(pose.pos);
        let dist = acf_ecef.sub(&win.navaid.ecef).abs();
        let error =
            MAX_ERROR * signal_error(&mut st.rng, win.signal_db, DME_SIGMA_FLOOR);

        Some(f64::max(dist + error + bias, 0.0))
    }

    /// Localizer DDM. Within the course sector (half-width set by the
    /// reference datum distance) the DDM is linear in the angular deviation;
    /// outside it the slope blends toward 0.155/8 deg over an 8 degree
    /// veil, plus a facility-seeded sinusoidal distortion pattern and the
    /// SNR-driven random term. The back course reverses sensing.
    fn comp_hdef_loc(
        &self,
        st: &mut RadioState,
        pose: &AircraftPose,
        cur_t: f64,
    ) -> (Option<f64>, Option<f64>) {
        const MAX_ERROR: f64 = 0.1;

        let (winner, strongest_db) = strongest(&st.vlocs, NOISE_FLOOR_AUDIO);
        st.signal_db = strongest_db;
        // The vlocs set mixes VORs in with LOCs; a VOR winner means we wait
        // for the signal-level recomputation rather than emit nonsense.
        let win = match winner {
            Some(w) if w.navaid.kind() == NavaidKind::Loc => w,
            _ => {
                st.loc_fcrs = f64::NAN;
                return (None, None);
            }
        };
        if (cur_t - st.freq_chg_t).abs() < DME_CHG_DELAY {
            st.loc_fcrs = f64::NAN;
            return (None, None);
        }
        let nav = &win.navaid;
        st.loc_fcrs = nav.loc_brg();

        let (brg_raw, _) = brg_from_navaid(pose.pos, nav);
        let nav_brg = normalize_hdg(brg_raw + 180.0);
        let mut angdev = rel_hdg(nav.loc_brg(), nav_brg);

        /* reverse sensing on the back course */
        if angdev > 90.0 {
            angdev = 180.0 - angdev;
        } else if angdev < -90.0 {
            angdev = -180.0 - angdev;
        }

        let ref_datum_dist = nav.loc_ref_datum_dist();
        debug_assert!(ref_datum_dist > 0.0);
        let sector_width_deg = loc_sector_width(ref_datum_dist);

        let distort_amplitude = [
            (0.0, 0.0),
            (sector_width_deg, 0.0),
            (10.0, 0.02),
            (45.0, 0.25),
            (90.0, 0.25),
        ];
        let sig_err =
            MAX_ERROR * signal_error(&mut st.rng, win.signal_db, LOC_SIGMA_FLOOR);
        let mut hasher = DefaultHasher::new();
        nav.id.hash(&mut hasher);
        let seed = (hasher.finish() & 255) as f64;
        let distort = (sin(0.87 * angdev + seed)
            + sin(angdev + seed)
            + sin(1.89 * angdev + seed))
            * curve(angdev.abs(), &distort_amplitude);

        let angdev_outside = if angdev >= 0.0 {
            f64::max(angdev - sector_width_deg, 0.0)
        } else {
            f64::min(angdev + sector_width_deg, 0.0)
        };
        let ddm_per_deg_inner = 0.155 / sector_width_deg;
        let ddm_per_deg_outer = 0.155 / 8.0;
        let r_outside = iter_fract(angdev_outside.abs(), 0.0, 8.0, true);

        let mut ddm = sig_err
            + angdev.clamp(-sector_width_deg, sector_width_deg) * ddm_per_deg_inner
            + distort
            + angdev_outside * wavg(ddm_per_deg_inner, ddm_per_deg_outer, r_outside);
        ddm = ddm.clamp(-1.0, 1.0);

        (Some(ddm / HDEF_LOC_DDM_PER_DOT), Some(ddm))
    }

    fn comp_hdef_vor(
        &self,
        st: &mut RadioState,
        pose: &AircraftPose,
        cur_t: f64,
        pilot: bool,
    ) -> Option<(f64, bool)> {
        let radial = self.get_radial(st, pose, cur_t)?;
        let crs = if pilot { st.obs_pilot } else { st.obs_copilot };
        if !crs.is_finite() {
            return None;
        }
        let radial = normalize_hdg(radial);
        let crs = normalize_hdg(crs);

        let (hdef, tofrom) = if rel_hdg(crs, radial).abs() < 90.0 {
            (rel_hdg(radial, crs), true)
        } else {
            (rel_hdg(normalize_hdg(crs + 180.0), radial), false)
        };
        Some((hdef / HDEF_VOR_DEG_PER_DOT, tofrom))
    }

    fn hdef_update(
        &self,
        st: &mut RadioState,
        pose: &AircraftPose,
        cur_t: f64,
        d_t: f64,
        pilot: bool,
    ) {
        debug_assert_eq!(self.rtype, RadioType::Vloc);

        let (hdef, tofrom) = if is_valid_loc_freq(hz2mhz(st.freq)) {
            let (hdef, ddm) = self.comp_hdef_loc(st, pose, cur_t);
            st.loc_ddm = ddm.unwrap_or(f64::NAN);
            (hdef, false)
        } else {
            st.loc_ddm = f64::NAN;
            match self.comp_hdef_vor(st, pose, cur_t, pilot) {
                Some((h, tf)) => (Some(h), tf),
                None => (None, false),
            }
        };

        match hdef {
            Some(hdef) => {
                if (cur_t - st.hdef_lock_t).abs() < LOCK_DELAY_VLOC {
                    return;
                }
                let lag = signal_db_upd_rate(1.0, st.signal_db);
                if pilot {
                    let mut v = st.hdef_pilot;
                    filter_in_nan(&mut v, hdef, d_t, lag);
                    st.hdef_pilot = v;
                    st.tofrom_pilot = tofrom;
                } else {
                    let mut v = st.hdef_copilot;
                    filter_in_nan(&mut v, hdef, d_t, lag);
                    st.hdef_copilot = v;
                    st.tofrom_copilot = tofrom;
                }
            }
            None => {
                if pilot {
                    st.hdef_pilot = f64::NAN;
                } else {
                    st.hdef_copilot = f64::NAN;
                }
                st.hdef_lock_t = f64::NAN;
            }
        }
    }

    /// Vertical deflection off the winning glideslope. The effective
    /// antenna elevation blends from the scenery-probed ground up to the
    /// database elevation between 20 and 30 km out, so short final agrees
    /// with the runway the host actually renders. The slant angle folds
    /// into the lobe structure modulo twice the path angle, reproducing the
    /// false lobes above the true path.
    fn vdef_update(
        &self,
        st: &mut RadioState,
        pose: &AircraftPose,
        cur_t: f64,
        d_t: f64,
        terrain: Option<&dyn crate::terrain::TerrainProbe>,
    ) {
        const MAX_ERROR: f64 = 0.5;
        const OFFPATH_MAX_ERROR: f64 = 4.0;
        const RAND_COEFFS: [f64; 5] =
            [std::f64::consts::PI, 2.12, 12.28, 35.12, 75.21];
        const SIGNAL_ANGLE_CURVE: [(f64, f64); 4] =
            [(0.0, 0.0), (5.0, -2.0), (20.0, -5.0), (90.0, -20.0)];
        const DB_ELEV_DIST: f64 = 30_000.0;
        const SCENERY_ELEV_DIST: f64 = 20_000.0;
        const GS_ANT_HEIGHT: f64 = 3.0;

        debug_assert_eq!(self.rtype, RadioType::Vloc);

        let (winner, strongest_db) = strongest(&st.gses, NOISE_FLOOR_AUDIO);
        st.signal_db = strongest_db;
        let win = match winner {
            Some(w) => w,
            None => {
                st.vdef = f64::NAN;
                st.gp_ddm = f64::NAN;
                st.gs = f64::NAN;
                st.vdef_lock_t = cur_t;
                return;
            }
        };
        let nav = &win.navaid;
        let (gs_brg, gs_angle) = match nav.data {
            NavaidData::Gs { brg, gs, .. } => (brg, gs),
            _ => return,
        };
        let mut signal_db = win.signal_db;

        if (cur_t - st.vdef_lock_t).abs() < LOCK_DELAY_VLOC {
            return;
        }

        let (brg_raw, dist) = brg_from_navaid(pose.pos, nav);
        let brg = normalize_hdg(brg_raw + 180.0);
        let offpath = rel_hdg(brg, gs_brg).abs();
        let long_dist = dist * cos(offpath.to_radians());

        let nav_elev = if long_dist >= DB_ELEV_DIST {
            nav.pos.elev
        } else {
            let xp = terrain.and_then(|t| crate::navdata::xp_elev(nav, t));
            match xp {
                Some(xp_elev) => {
                    let f = iter_fract(long_dist, SCENERY_ELEV_DIST, DB_ELEV_DIST, true);
                    wavg(xp_elev, nav.pos.elev, f)
                }
                None => nav.pos.elev,
            }
        };
        let d_elev = pose.pos.elev - (nav_elev + GS_ANT_HEIGHT);
        let angle = if long_dist.abs() > 0.1 {
            libm::atan(d_elev / long_dist).to_degrees()
        } else {
            90.0
        };

        signal_db += curve(angle.abs(), &SIGNAL_ANGLE_CURVE);
        let mut error =
            MAX_ERROR * signal_error(&mut st.rng, signal_db + 4.0, GS_SIGMA_FLOOR);
        error += OFFPATH_MAX_ERROR
            * sin(gs_brg + offpath / RAND_COEFFS[0])
            * sin(gs_brg + offpath / RAND_COEFFS[1])
            * sin(gs_brg + offpath / RAND_COEFFS[2])
            * sin(offpath / RAND_COEFFS[3])
            * sin(offpath / RAND_COEFFS[4]);

        let angle_eff =
            (((angle * 1000.0) as i64) % ((gs_angle * 2.0 * 1000.0) as i64)) as f64
                / 1000.0;
        let vdef_deg = (angle_eff + error) - gs_angle;
        let vdef_dots = vdef_deg * VDEF_GS_DEG_PER_DOT;
        // ICAO Annex 10: full-scale 0.0875 DDM corresponds to an angular
        // displacement of 0.12 theta for Cat II/III facilities; deviations
        // beyond that range are treated as linear for simplicity.
        let ddm_per_deg = (0.12 * gs_angle) / 0.0875;
        st.gp_ddm = -vdef_deg / ddm_per_deg;

        let lag = signal_db_upd_rate(1.0, signal_db);
        let mut v = st.vdef;
        filter_in_nan(&mut v, vdef_dots, d_t, lag);
        st.vdef = v.clamp(-VDEF_MAX, VDEF_MAX);
        st.gs = gs_angle;

        let rate_lag = signal_db_upd_rate(0.25, signal_db);
        let rate_tgt = (st.vdef - st.vdef_prev) / d_t;
        let mut r = st.vdef_rate;
        filter_in(&mut r, rate_tgt, d_t, rate_lag);
        st.vdef_rate = r;
        st.vdef_prev = st.vdef;
    }

    fn brg_update(&self, st: &mut RadioState, pose: &AircraftPose, cur_t: f64, d_t: f64) {
        let brg = if self.is_adf_ant_mode(st) {
            Some(PARKED_BRG)
        } else {
            self.get_bearing(st, pose, cur_t)
        };

        match brg {
            Some(mut brg) => {
                let lock_delay = if self.rtype == RadioType::Adf {
                    LOCK_DELAY_ADF
                } else {
                    LOCK_DELAY_VLOC
                };
                if (cur_t - st.brg_lock_t).abs() < lock_delay {
                    return;
                }
                if st.brg.is_nan() {
                    st.brg = PARKED_BRG;
                }
                // The needle output is body-relative for both radio kinds;
                // the VLOC bearing computation yields a true bearing, so
                // fold the heading in here.
                brg = if self.rtype != RadioType::Adf {
                    normalize_hdg(brg - pose.hdg)
                } else {
                    normalize_hdg(brg)
                };
                let tgt = st.brg + rel_hdg(st.brg, brg);
                let lag = signal_db_upd_rate(1.0, st.signal_db);
                let mut v = st.brg;
                filter_in(&mut v, tgt, d_t, lag);
                st.brg = normalize_hdg(v);
            }
            None => {
                st.brg = f64::NAN;
                st.brg_lock_t = cur_t;
            }
        }
    }

    fn dme_update(&self, st: &mut RadioState, pose: &AircraftPose, cur_t: f64, d_t: f64) {
        match self.get_dme(st, pose, cur_t) {
            Some(dme) => {
                if (cur_t - st.dme_lock_t).abs() < LOCK_DELAY_DME {
                    return;
                }
                let lag = signal_db_upd_rate(1.0, st.signal_db);
                let mut v = st.dme;
                filter_in_nan(&mut v, dme, d_t, lag);
                st.dme = v;
            }
            None => {
                st.dme = f64::NAN;
                st.dme_lock_t = cur_t;
            }
        }
    }

    /* ---- public-facing helpers used by the context ---- */

    /// Freshly computed radial for the public accessor (the radial is not a
    /// smoothed output; it re-rolls its error term on every read, like a
    /// real receiver's flickering RMI).
    pub fn radial_for_api(
        &self,
        st: &mut RadioState,
        pose: &AircraftPose,
        cur_t: f64,
    ) -> f64 {
        self.get_radial(st, pose, cur_t).unwrap_or(f64::NAN)
    }

    pub fn operable(&self, st: &RadioState) -> bool {
        !st.failed && st.new_freq.map_or(true, |nf| nf == st.freq)
    }

    pub fn hdef(&self, st: &RadioState, pilot: bool) -> Option<(f64, bool)> {
        let (v, tofrom) = if pilot {
            (st.hdef_pilot, st.tofrom_pilot)
        } else {
            (st.hdef_copilot, st.tofrom_copilot)
        };
        if v.is_nan() {
            None
        } else {
            Some((v.clamp(-HDEF_MAX, HDEF_MAX), tofrom))
        }
    }

    pub fn get_id(&self, cur_t: f64) -> Option<String> {
        let mut st = self.lock();
        if st.failed {
            return None;
        }
        // Variable delay before the receiver is willing to declare an ID.
        if cur_t < st.freq_chg_t + st.ident_delay || st.freq_chg_t.is_nan() {
            return None;
        }
        let tree = match self.rtype {
            RadioType::Vloc => &st.vlocs,
            RadioType::Adf => &st.adfs,
            RadioType::Dme => &st.dmes,
        };
        let (winner, strongest_db) = strongest(tree, NOISE_FLOOR_TEST);
        let id = winner.map(|w| w.navaid.id.clone());
        st.signal_db = strongest_db;
        id
    }

    /// Signal quality linearized from the level above the error floor:
    /// +0 dB is 0, +10 dB is 0.9, +20 dB is 0.99.
    pub fn signal_quality(&self, st: &RadioState) -> f64 {
        let delta_db = st.signal_db - NOISE_FLOOR_ERROR_RATE;
        let div = pow(10.0, delta_db / 10.0);
        (1.0 - 1.0 / div).clamp(0.0, 1.0)
    }

    /* ---- audio ---- */

    /// Synthesizes the next identifier-audio buffer for one output stream.
    /// Returns `None` on a failed radio (callers must treat that as "no
    /// audio"), an all-zero buffer when squelched.
    pub fn get_audio_buf(
        &self,
        tones: &ToneSet,
        volume: f64,
        squelch: bool,
        agc: bool,
        stream_id: usize,
    ) -> Option<Vec<i16>> {
        debug_assert!(stream_id < MAX_STREAMS);
        let is_dme = self.rtype == RadioType::Dme;
        let num_samples = if is_dme {
            tones.dme_buf_samples()
        } else {
            tones.vor_buf_samples()
        };
        let tone = if is_dme { &tones.dme } else { &tones.vor };

        let mut st = self.lock();
        if st.failed {
            return None;
        }
        if stream_id >= st.distort_vloc.len() {
            return None;
        }

        let mut buf = vec![0i16; num_samples];

        let mut max_db = NOISE_LEVEL_AUDIO;
        let mut tone_db = NOISE_FLOOR_NAV_ID;
        let mut max_signal_db = NOISE_FLOOR_AUDIO;

        let tree = match self.rtype {
            RadioType::Vloc => &st.vlocs,
            RadioType::Dme => &st.dmes,
            RadioType::Adf => &st.adfs,
        };

        if agc {
            for rnav in tree.values() {
                if rnav.signal_db <= NOISE_FLOOR_AUDIO {
                    continue;
                }
                // Only keyed stations drive the gain estimate.
                if rnav.chunk_on(stream_id) {
                    max_db = f64::max(max_db, rnav.signal_db);
                    tone_db = f64::max(tone_db, rnav.signal_db);
                }
                max_signal_db = f64::max(max_signal_db, rnav.signal_db);
            }
        } else {
            max_signal_db = curve(volume, &[(0.0, 0.0), (1.0, NOISE_FLOOR_AUDIO)]);
        }

        if squelch && tone_db <= NOISE_FLOOR_NAV_ID {
            return Some(buf);
        }

        let noise_level_db = if self.rtype == RadioType::Adf {
            if self.is_adf_ant_mode(&st) {
                NOISE_LEVEL_AUDIO - 10.0
            } else {
                NOISE_LEVEL_AUDIO
            }
        } else {
            NOISE_LEVEL_AUDIO - 10.0
        };

        let span = max_db - NOISE_FLOOR_AUDIO;
        let noise_level = (noise_level_db - NOISE_FLOOR_AUDIO) / span;

        let bfo = self.rtype == RadioType::Adf
            && matches!(st.adf_mode, AdfMode::AdfBfo | AdfMode::AntBfo);
        if bfo {
            // The heterodyne is audible as a faint steady carrier that
            // swells to full level whenever any station keys.
            const NOISE_FLOOR_TONE: f64 = -100.0;
            let noise_span = (noise_level_db - 20.0) - NOISE_FLOOR_TONE;
            let tone_span = max_signal_db - NOISE_FLOOR_TONE;
            let mut level = (noise_span / tone_span).clamp(0.0, 1.0);
            for rnav in tree.values() {
                if rnav.signal_db > NOISE_FLOOR_AUDIO && rnav.chunk_on(stream_id) {
                    level = 1.0;
                    break;
                }
            }
            bfo_mix(&mut buf, tone, level);
        } else {
            for rnav in tree.values() {
                if rnav.signal_db <= NOISE_FLOOR_AUDIO || !rnav.chunk_on(stream_id) {
                    continue;
                }
                let level = (rnav.signal_db - NOISE_FLOOR_AUDIO) / span;
                am_mix(&mut buf, tone, level);
            }
        }

        let RadioState {
            ref mut vlocs,
            ref mut dmes,
            ref mut adfs,
            ..
        } = *st;
        let tree = match self.rtype {
            RadioType::Vloc => vlocs,
            RadioType::Dme => dmes,
            RadioType::Adf => adfs,
        };
        for rnav in tree.values_mut() {
            rnav.cur_chunk[stream_id] =
                (rnav.cur_chunk[stream_id] + 1) % NUM_AUDIO_CHUNKS;
        }

        let distort = if is_dme {
            &mut st.distort_dme[stream_id]
        } else {
            &mut st.distort_vloc[stream_id]
        };
        distort.process(
            &mut buf,
            volume * volume,
            (noise_level * volume) * (noise_level * volume),
        );

        Some(buf)
    }

    pub fn clear_distort_buffers(&self) {
        let mut st = self.lock();
        for d in st.distort_vloc.iter_mut() {
            d.clear_buffers();
        }
        for d in st.distort_dme.iter_mut() {
            d.clear_buffers();
        }
    }

    /// Aligns the Morse cursors of all streams to stream 0. Called while a
    /// stream is stopped so restarting playback doesn't skew identifiers
    /// between outputs.
    pub fn sync_streams(&self) {
        let mut st = self.lock();
        let RadioState {
            ref mut vlocs,
            ref mut gses,
            ref mut dmes,
            ref mut adfs,
            ..
        } = *st;
        for tree in [vlocs, gses, dmes, adfs] {
            for rnav in tree.values_mut() {
                let first = rnav.cur_chunk[0];
                for c in rnav.cur_chunk.iter_mut().skip(1) {
                    *c = first;
                }
            }
        }
    }

    /* ---- worker side ---- */

    /// Reconciles one candidate set against a fresh query result. Entries
    /// are marked outdated, re-affirmed or created from the new list, and
    /// anything left outdated is dropped.
    pub fn refresh_tree(&self, which: TreeSel, list: &[Arc<Navaid>]) {
        let mut st = self.lock();
        for rnav in tree_of(&mut st, which).values_mut() {
            rnav.outdated = true;
        }
        for nav in list {
            let key = nav.key();
            if let Some(rnav) = tree_of(&mut st, which).get_mut(&key) {
                rnav.outdated = false;
                continue;
            }
            // New candidates start their Morse cycle at a random point so
            // overlapping stations do not key in unison.
            let start = st.rng.gen_range(0..NUM_AUDIO_CHUNKS);
            tree_of(&mut st, which)
                .insert(key, RadioNavaid::new(Arc::clone(nav), start));
        }
        tree_of(&mut st, which).retain(|_, rnav| !rnav.outdated);
    }

    pub fn flush_tree(&self, which: TreeSel) {
        let mut st = self.lock();
        tree_of(&mut st, which).clear();
    }

    /// Candidate snapshot for the worker's propagation pass.
    pub fn snapshot_tree(&self, which: TreeSel) -> Vec<(NavaidKey, Arc<Navaid>)> {
        let mut st = self.lock();
        tree_of(&mut st, which)
            .iter()
            .map(|(k, rnav)| (k.clone(), Arc::clone(&rnav.navaid)))
            .collect()
    }

    pub fn store_signal_tgt(
        &self,
        which: TreeSel,
        key: &NavaidKey,
        signal_db_tgt: f64,
        propmode: PropMode,
    ) {
        let mut st = self.lock();
        if let Some(rnav) = tree_of(&mut st, which).get_mut(key) {
            rnav.signal_db_tgt = signal_db_tgt;
            rnav.propmode = propmode;
        }
    }

    pub fn current_freq(&self) -> u64 {
        self.lock().freq
    }

    pub fn set_telem(&self, slots: Vec<TelemSlot>) {
        let mut st = self.lock();
        let mut telem = slots;
        telem.truncate(NUM_TELEM_SLOTS);
        telem.resize_with(NUM_TELEM_SLOTS, TelemSlot::default);
        st.telem = telem;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TreeSel {
    Vlocs,
    Gses,
    Dmes,
    Adfs,
}

fn tree_of<'a>(st: &'a mut RadioState, which: TreeSel) -> &'a mut CandidateSet {
    match which {
        TreeSel::Vlocs => &mut st.vlocs,
        TreeSel::Gses => &mut st.gses,
        TreeSel::Dmes => &mut st.dmes,
        TreeSel::Adfs => &mut st.adfs,
    }
}

/// Candidate kinds implied by the tuned frequency for each radio type.
pub(crate) fn candidate_plan(rtype: RadioType, freq: u64) -> CandidatePlan {
    let mhz = hz2mhz(freq);
    let khz = hz2khz(freq);
    match rtype {
        RadioType::Vloc => {
            if is_valid_vor_freq(mhz) {
                CandidatePlan {
                    vlocs: Some(NavaidKind::Vor),
                    gses: None,
                    dmes: Some(NavaidKind::Dme),
                    adfs: None,
                }
            } else if is_valid_loc_freq(mhz) {
                CandidatePlan {
                    vlocs: Some(NavaidKind::Loc),
                    gses: Some(NavaidKind::Gs),
                    dmes: Some(NavaidKind::Dme),
                    adfs: None,
                }
            } else {
                CandidatePlan::empty()
            }
        }
        RadioType::Adf => {
            if is_valid_ndb_freq(khz) {
                CandidatePlan {
                    vlocs: None,
                    gses: None,
                    dmes: None,
                    adfs: Some(NavaidKind::Ndb),
                }
            } else {
                CandidatePlan::empty()
            }
        }
        RadioType::Dme => {
            let vlocs = if is_valid_loc_freq(mhz) {
                Some(NavaidKind::Loc)
            } else {
                None
            };
            let dmes = if is_valid_vor_freq(mhz) || is_valid_loc_freq(mhz) {
                Some(NavaidKind::Dme)
            } else {
                None
            };
            CandidatePlan {
                vlocs,
                gses: None,
                dmes,
                adfs: None,
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CandidatePlan {
    pub vlocs: Option<NavaidKind>,
    pub gses: Option<NavaidKind>,
    pub dmes: Option<NavaidKind>,
    pub adfs: Option<NavaidKind>,
}

impl CandidatePlan {
    fn empty() -> CandidatePlan {
        CandidatePlan {
            vlocs: None,
            gses: None,
            dmes: None,
            adfs: None,
        }
    }
}

/// Polarization by navaid kind: the VHF course aids radiate horizontally,
/// DME and NDB vertically.
pub(crate) fn polarization_of(kind: NavaidKind) -> crate::itm::Polarization {
    match kind {
        NavaidKind::Vor | NavaidKind::Loc | NavaidKind::Gs => {
            crate::itm::Polarization::Horizontal
        }
        _ => crate::itm::Polarization::Vertical,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::nm2met;
    use once_cell::sync::OnceCell;

    fn mk_navaid_full(
        kind: NavaidKind,
        id: &str,
        freq: u64,
        signal_db: f64,
        range_nm: f64,
    ) -> RadioNavaid {
        let data = match kind {
            NavaidKind::Vor => NavaidData::Vor { magvar: 0.0 },
            NavaidKind::Dme => NavaidData::Dme {
                bias: 0.0,
                arpt_id: "XYZA".into(),
            },
            NavaidKind::Loc => NavaidData::Loc {
                brg: 0.0,
                fcrs_mag: None,
                rwy_id: "35".into(),
                ref_datum_dist: 2450.0,
            },
            _ => NavaidData::Ndb,
        };
        let pos = Position3::new(47.0, 15.0, 100.0);
        let mut rnav = RadioNavaid::new(
            Arc::new(Navaid {
                data,
                pos,
                ecef: geo2ecef(pos),
                freq,
                range: nm2met(range_nm),
                id: id.into(),
                icao: "ENRT".into(),
                region: "LO".into(),
                name: String::new(),
                xp_elev: OnceCell::new(),
                loc_align: OnceCell::new(),
            }),
            0,
        );
        rnav.signal_db = signal_db;
        rnav
    }

    fn mk_navaid(kind: NavaidKind, id: &str, freq: u64, signal_db: f64) -> RadioNavaid {
        mk_navaid_full(kind, id, freq, signal_db, 100.0)
    }

    fn set_of(rnavs: Vec<RadioNavaid>) -> CandidateSet {
        rnavs
            .into_iter()
            .map(|r| (r.navaid.key(), r))
            .collect()
    }

    #[test]
    fn strongest_picks_highest() {
        let tree = set_of(vec![
            mk_navaid(NavaidKind::Vor, "AAA", 116_100_000, -60.0),
            mk_navaid(NavaidKind::Vor, "BBB", 116_100_000, -40.0),
        ]);
        let (winner, strongest_db) = strongest(&tree, NOISE_FLOOR_AUDIO);
        assert_eq!(winner.unwrap().navaid.id, "BBB");
        assert_eq!(strongest_db, -40.0);
    }

    #[test]
    fn co_channel_interference_blanks() {
        let tree = set_of(vec![
            mk_navaid(NavaidKind::Vor, "AAA", 116_100_000, -50.0),
            mk_navaid(NavaidKind::Vor, "BBB", 116_100_000, -40.0),
        ]);
        // 10 dB apart: inside the 16 dB interference limit.
        let (winner, strongest_db) = strongest(&tree, NOISE_FLOOR_AUDIO);
        assert!(winner.is_none());
        assert_eq!(strongest_db, -40.0);
    }

    #[test]
    fn sub_floor_candidates_ignored() {
        let tree = set_of(vec![
            mk_navaid(NavaidKind::Vor, "AAA", 116_100_000, -90.0),
            mk_navaid(NavaidKind::Vor, "BBB", 116_100_000, -40.0),
        ]);
        // The -90 dB one is below the floor, so no interference applies.
        let (winner, _) = strongest(&tree, NOISE_FLOOR_AUDIO);
        assert_eq!(winner.unwrap().navaid.id, "BBB");
    }

    #[test]
    fn empty_tree_reports_noise_floor() {
        let tree = CandidateSet::new();
        let (winner, strongest_db) = strongest(&tree, NOISE_FLOOR_AUDIO);
        assert!(winner.is_none());
        assert_eq!(strongest_db, NOISE_FLOOR_TOO_FAR);
    }

    #[test]
    fn candidate_plan_by_band() {
        let p = candidate_plan(RadioType::Vloc, 113_100_000);
        assert_eq!(p.vlocs, Some(NavaidKind::Vor));
        assert_eq!(p.gses, None);
        assert_eq!(p.dmes, Some(NavaidKind::Dme));

        let p = candidate_plan(RadioType::Vloc, 109_500_000);
        assert_eq!(p.vlocs, Some(NavaidKind::Loc));
        assert_eq!(p.gses, Some(NavaidKind::Gs));

        let p = candidate_plan(RadioType::Vloc, 0);
        assert_eq!(p, CandidatePlan::empty());

        let p = candidate_plan(RadioType::Adf, 375_000);
        assert_eq!(p.adfs, Some(NavaidKind::Ndb));

        let p = candidate_plan(RadioType::Dme, 109_500_000);
        assert_eq!(p.vlocs, Some(NavaidKind::Loc));
        assert_eq!(p.dmes, Some(NavaidKind::Dme));
        let p = candidate_plan(RadioType::Dme, 113_100_000);
        assert_eq!(p.vlocs, None);
        assert_eq!(p.dmes, Some(NavaidKind::Dme));
    }

    #[test]
    fn upd_rate_stretches_at_low_snr() {
        let fast = signal_db_upd_rate(1.0, -30.0);
        let slow = signal_db_upd_rate(1.0, NOISE_FLOOR_ERROR_RATE);
        assert!(fast < 1.1);
        assert!((slow - 21.0).abs() < 1e-9);
    }

    #[test]
    fn signal_quality_monotonic_and_bounded() {
        let radio = Radio::new(RadioType::Vloc, 1, &Config::default());
        let mut st = radio.lock();
        let mut last = -0.001;
        for db in [-79.0, -75.0, -70.0, -60.0, -40.0, -20.0] {
            st.signal_db = db;
            let q = radio.signal_quality(&st);
            assert!((0.0..=1.0).contains(&q));
            assert!(q >= last);
            last = q;
        }
        st.signal_db = -120.0;
        assert_eq!(radio.signal_quality(&st), 0.0);
    }

    #[test]
    fn cone_error_zero_at_low_slant() {
        assert_eq!(brg_cone_error(10.0, 123.0, 116_100_000), 0.0);
        assert!(brg_cone_error(85.0, 123.0, 116_100_000).abs() <= 20.0);
    }

    #[test]
    fn audio_buf_failed_radio_is_none() {
        let radio = Radio::new(RadioType::Vloc, 1, &Config::default());
        radio.lock().failed = true;
        let tones = ToneSet::new(48_000);
        assert!(radio.get_audio_buf(&tones, 1.0, false, true, 0).is_none());
    }

    #[test]
    fn audio_buf_squelch_is_silent() {
        let radio = Radio::new(RadioType::Vloc, 1, &Config::default());
        let tones = ToneSet::new(48_000);
        // No candidates at all: tone_db stays at the ID floor, squelch
        // closes, buffer comes back all zero at full length.
        let buf = radio.get_audio_buf(&tones, 1.0, true, true, 0).unwrap();
        assert_eq!(buf.len(), tones.vor_buf_samples());
        assert!(buf.iter().all(|&s| s == 0));
    }

    /// Aircraft position used by the shaping tests: 11 km north of the
    /// station, 3000 m up.
    fn shaping_pose() -> (FlatPlane, Position3) {
        let pos = Position3::new(47.1, 15.0, 3000.0);
        (FlatPlane::new(pos.horizontal()), pos)
    }

    #[test]
    fn vor_service_volume_keyed_on_declared_range() {
        let (fpp, acf) = shaping_pose();

        let mut enroute = mk_navaid_full(NavaidKind::Vor, "ENR", 116_100_000, 0.0, 100.0);
        enroute.signal_db_omni = -30.0;
        enroute.propmode = PropMode::LineOfSight;
        comp_signal_db(&mut enroute, &fpp, acf, true, None);

        let mut terminal = mk_navaid_full(NavaidKind::Vor, "TRM", 116_100_000, 0.0, 20.0);
        terminal.signal_db_omni = -30.0;
        terminal.propmode = PropMode::LineOfSight;
        comp_signal_db(&mut terminal, &fpp, acf, true, None);

        // A terminal VOR is suppressed by the full 20 dB relative to an
        // en-route one at the same received level.
        assert!((enroute.signal_db - terminal.signal_db - 20.0).abs() < 1e-6);

        // Line-of-sight bookkeeping got filled in.
        assert!(enroute.gnd_dist > 10_000.0);
        assert!(enroute.slant_angle > 10.0 && enroute.slant_angle < 20.0);
        assert!((enroute.radial_degt - 180.0).abs() < 0.1);
    }

    #[test]
    fn loc_back_course_attenuation() {
        // Station course is 000; the aircraft north of it sits on the back
        // side (bearing to the station is 180).
        let (fpp, acf) = shaping_pose();

        let mut bc = mk_navaid(NavaidKind::Loc, "IBC", 109_500_000, 0.0);
        bc.signal_db_omni = -20.0;
        comp_signal_db(&mut bc, &fpp, acf, true, None);

        let mut nobc = mk_navaid(NavaidKind::Loc, "INB", 109_500_000, 0.0);
        nobc.signal_db_omni = -20.0;
        comp_signal_db(&mut nobc, &fpp, acf, false, None);

        // With a conflicting opposing localizer the back beam is killed far
        // harder than the normal back-course lobe.
        assert!(bc.signal_db > nobc.signal_db + 20.0);
    }

    #[test]
    fn paired_ils_dme_inherits_loc_pattern() {
        let (fpp, acf) = shaping_pose();

        let mut plain = mk_navaid(NavaidKind::Dme, "IXY", 109_500_000, 0.0);
        plain.signal_db_omni = -20.0;
        comp_signal_db(&mut plain, &fpp, acf, true, None);

        let mut paired = mk_navaid(NavaidKind::Dme, "IXY", 109_500_000, 0.0);
        paired.signal_db_omni = -20.0;
        comp_signal_db(&mut paired, &fpp, acf, true, Some(0.0));
        // Aircraft on the back course: the paired DME loses the back-lobe
        // dBs, the unpaired one radiates omnidirectionally.
        assert!((plain.signal_db - paired.signal_db - 3.0).abs() < 1e-6);

        // On a VOR channel the DME gets the long-range boost instead.
        let mut vor_chan = mk_navaid(NavaidKind::Dme, "DVX", 113_100_000, 0.0);
        vor_chan.signal_db_omni = -20.0;
        comp_signal_db(&mut vor_chan, &fpp, acf, true, None);
        assert!((vor_chan.signal_db - 0.0).abs() < 1e-6);
    }

    #[test]
    fn omni_level_tracks_worker_target() {
        let (fpp, acf) = shaping_pose();
        let mut tree = set_of(vec![mk_navaid(NavaidKind::Vor, "AAA", 116_100_000, -100.0)]);
        for rnav in tree.values_mut() {
            rnav.signal_db_tgt = -30.0;
            rnav.propmode = PropMode::LineOfSight;
        }
        // One full worker interval of smoothing lands exactly on target.
        signal_levels_update(&mut tree, 0.25, 0.25, &fpp, acf, None);
        let rnav = tree.values().next().unwrap();
        assert_eq!(rnav.signal_db_omni, -30.0);
        // And the audible level has the service-volume shaping applied.
        assert!(rnav.signal_db < rnav.signal_db_omni + 1.0);
    }
}
