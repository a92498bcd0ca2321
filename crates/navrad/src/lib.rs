#![doc = include_str!("../readme.md")]

pub mod airport;
pub mod audio;
pub mod config;
pub mod distort;
pub mod error;
pub mod filters;
pub mod geo;
pub mod itm;
pub mod morse;
pub mod navdata;
pub mod propagation;
pub mod terrain;

mod radio;
mod worker;

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tracing::{debug, info};

use crate::audio::ToneSet;
use crate::config::Config;
use crate::error::Error;
use crate::geo::{gc_distance, nm2met};
use crate::itm::{ItmModel, PropMode};
use crate::navdata::{act_freq, Navaid, NavaidDb, NavaidKind};
use crate::propagation::{compute_signal_prop, navaid_min_hgt};
use crate::radio::{
    candidate_plan, polarization_of, Radio, TreeSel, ANT_BASE_GAIN,
    NOISE_FLOOR_TOO_FAR,
};
use crate::terrain::{PathProfile, TerrainProbe};
use crate::worker::Worker;

pub use crate::config::{MAX_NUM_DMES, MAX_STREAMS, NUM_NAV_RADIOS};
pub use crate::radio::{AdfMode, AircraftPose, RadioType, TelemSlot, NUM_TELEM_SLOTS};

pub mod prelude {
    pub use crate::airport::{Airport, AirportDb, Runway, RunwayEnd};
    pub use crate::config::Config;
    pub use crate::error::Error;
    pub use crate::geo::{Position, Position3};
    pub use crate::itm::{
        Climate, ItmModel, ItmOutput, ItmRequest, Polarization, PropMode, ResultCode,
    };
    pub use crate::navdata::{KindMask, Navaid, NavaidDb, NavaidKind};
    pub use crate::terrain::{TerrainProbe, TerrainSamples};
    pub use crate::{AdfMode, AircraftPose, NavRadio, RadioType};
}

/// Which candidate the worker should publish its terrain profile for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileDebugSel {
    pub rtype: RadioType,
    pub nr: usize,
    pub kind: NavaidKind,
    pub id: String,
}

/// The most recent profile computed for the watched candidate: raw data for
/// a host-side rendering of the terrain cut and Fresnel picture.
#[derive(Debug, Clone)]
pub struct ProfileDebugData {
    pub elev: Vec<f64>,
    pub acf_alt: f64,
    pub nav_alt: f64,
    pub dist: f64,
    /// Actual transmit frequency, Hz.
    pub freq: u64,
}

struct HostState {
    pose: AircraftPose,
    have_pose: bool,
    cur_t: f64,
    last_t: f64,
    started: bool,
}

struct NavRadCore {
    db: Arc<NavaidDb>,
    terrain: Arc<dyn TerrainProbe>,
    itm: Arc<dyn ItmModel>,
    cfg: Config,
    tones: ToneSet,
    host: Mutex<HostState>,
    vloc_radios: Vec<Radio>,
    adf_radios: Vec<Radio>,
    dme_radios: Vec<Radio>,
    debug_sel: Mutex<Option<ProfileDebugSel>>,
    debug_data: Mutex<Option<ProfileDebugData>>,
}

/**
 * The navigation-radio receiver stack: two VLOC receivers, two ADF
 * receivers and up to eight standalone DMEs over one navaid database.
 *
 * The host drives the fast loop by calling [`NavRadio::floop`] with the
 * aircraft pose and a monotonic clock; a background worker refreshes
 * candidate stations and their terrain-modeled signal levels a few times a
 * second on its own thread. Audio pulls ([`NavRadio::get_audio_buf2`]) may
 * come from any thread.
 *
 * Numeric accessors return NaN while the requested quantity is unavailable
 * (no station, co-channel interference, failed radio, invalid frequency).
 */
pub struct NavRadio {
    worker: Option<Worker>,
    core: Arc<NavRadCore>,
}

fn lock<'a, T>(m: &'a Mutex<T>) -> MutexGuard<'a, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

impl NavRadio {
    /// Builds the receiver stack and starts the background worker.
    pub fn new(
        db: Arc<NavaidDb>,
        terrain: Arc<dyn TerrainProbe>,
        itm: Arc<dyn ItmModel>,
        cfg: Config,
    ) -> Result<NavRadio, Error> {
        cfg.validate()?;

        let vloc_radios = (0..NUM_NAV_RADIOS)
            .map(|i| Radio::new(RadioType::Vloc, i + 1, &cfg))
            .collect();
        let adf_radios = (0..NUM_NAV_RADIOS)
            .map(|i| Radio::new(RadioType::Adf, i + 1, &cfg))
            .collect();
        let dme_radios = (0..cfg.num_dmes)
            .map(|i| Radio::new(RadioType::Dme, i + 1, &cfg))
            .collect();

        let core = Arc::new(NavRadCore {
            tones: ToneSet::new(cfg.audio_srate),
            db,
            terrain,
            itm,
            host: Mutex::new(HostState {
                pose: AircraftPose::default(),
                have_pose: false,
                cur_t: 0.0,
                last_t: 0.0,
                started: false,
            }),
            vloc_radios,
            adf_radios,
            dme_radios,
            debug_sel: Mutex::new(None),
            debug_data: Mutex::new(None),
            cfg,
        });

        let worker_core = Arc::clone(&core);
        let interval = Duration::from_secs_f64(core.cfg.worker_interval);
        let worker = Worker::spawn("navrad-worker", interval, move || {
            worker_pass(&worker_core);
        });
        info!(
            num_dmes = core.cfg.num_dmes,
            srate = core.cfg.audio_srate,
            "navrad initialized"
        );

        Ok(NavRadio {
            worker: Some(worker),
            core,
        })
    }

    /// Stops the worker and tears the stack down. Dropping the value does
    /// the same; this form just makes shutdown explicit at call sites.
    pub fn fini(mut self) {
        if let Some(mut worker) = self.worker.take() {
            worker.stop();
        }
    }

    /// Fast-loop tick. `now` is a monotonic seconds clock supplied by the
    /// host; if it moves backwards (replay), filter state stops chasing the
    /// old timeline. Ticks closer together than the configured minimum are
    /// ignored.
    pub fn floop(&self, pose: &AircraftPose, now: f64) {
        let core = &self.core;
        let d_t = {
            let mut host = lock(&core.host);
            host.cur_t = now;
            if !host.started {
                host.started = true;
                host.last_t = now;
                host.pose = *pose;
                host.have_pose = true;
                return;
            }
            if host.cur_t < host.last_t {
                host.last_t = host.cur_t;
            }
            let d_t = host.cur_t - host.last_t;
            if d_t < core.cfg.min_delta_t {
                host.last_t = host.cur_t;
                return;
            }
            host.pose = *pose;
            host.have_pose = true;
            d_t
        };

        for radio in self.all_radios() {
            radio.floop(
                pose,
                now,
                d_t,
                core.cfg.worker_interval,
                Some(&*core.terrain),
            );
        }

        lock(&core.host).last_t = now;
    }

    fn all_radios(&self) -> impl Iterator<Item = &Radio> {
        self.core
            .vloc_radios
            .iter()
            .chain(self.core.adf_radios.iter())
            .chain(self.core.dme_radios.iter())
    }

    fn find_radio(&self, rtype: RadioType, nr: usize) -> &Radio {
        let list = match rtype {
            RadioType::Vloc => &self.core.vloc_radios,
            RadioType::Adf => &self.core.adf_radios,
            RadioType::Dme => &self.core.dme_radios,
        };
        assert!(
            (1..=list.len()).contains(&nr),
            "radio {:?} #{} does not exist",
            rtype,
            nr
        );
        &list[nr - 1]
    }

    fn cur_t(&self) -> f64 {
        lock(&self.core.host).cur_t
    }

    /* ---- tuning and overrides ---- */

    pub fn set_freq(&self, rtype: RadioType, nr: usize, freq_hz: u64) {
        self.find_radio(rtype, nr).lock().new_freq = Some(freq_hz);
    }

    pub fn set_failed(&self, rtype: RadioType, nr: usize, flag: bool) {
        self.find_radio(rtype, nr).lock().failed = flag;
    }

    /// Pilot-side and copilot-side selected course for a VLOC radio.
    pub fn set_obs(&self, nr: usize, obs: f64) {
        let radio = self.find_radio(RadioType::Vloc, nr);
        let mut st = radio.lock();
        st.obs_pilot = obs;
        st.obs_copilot = obs;
    }

    pub fn set_obs_copilot(&self, nr: usize, obs: f64) {
        self.find_radio(RadioType::Vloc, nr).lock().obs_copilot = obs;
    }

    pub fn set_adf_mode(&self, nr: usize, mode: AdfMode) {
        self.find_radio(RadioType::Adf, nr).lock().adf_mode = mode;
    }

    pub fn get_adf_mode(&self, nr: usize) -> AdfMode {
        self.find_radio(RadioType::Adf, nr).lock().adf_mode
    }

    pub fn set_brg_override(&self, rtype: RadioType, nr: usize, flag: bool) {
        self.find_radio(rtype, nr).lock().brg_override = flag;
    }

    pub fn get_brg_override(&self, rtype: RadioType, nr: usize) -> bool {
        self.find_radio(rtype, nr).lock().brg_override
    }

    /* ---- accessors ---- */

    pub fn get_freq(&self, rtype: RadioType, nr: usize) -> u64 {
        let st = self.find_radio(rtype, nr).lock();
        if st.failed {
            0
        } else {
            st.freq
        }
    }

    /// Linearized signal quality in [0, 1]; 0 for a failed radio.
    pub fn get_signal_quality(&self, rtype: RadioType, nr: usize) -> f64 {
        let radio = self.find_radio(rtype, nr);
        let st = radio.lock();
        if st.failed {
            return 0.0;
        }
        radio.signal_quality(&st)
    }

    /// Body-relative bearing to the received station, degrees.
    pub fn get_bearing(&self, rtype: RadioType, nr: usize) -> f64 {
        let st = self.find_radio(rtype, nr).lock();
        if st.failed {
            return f64::NAN;
        }
        geo::normalize_hdg(st.brg)
    }

    pub fn have_bearing(&self, rtype: RadioType, nr: usize) -> bool {
        !self.find_radio(rtype, nr).lock().brg.is_nan()
    }

    /// Magnetic radial from the received VOR, degrees.
    pub fn get_radial(&self, nr: usize) -> f64 {
        let (pose, cur_t) = {
            let host = lock(&self.core.host);
            (host.pose, host.cur_t)
        };
        let radio = self.find_radio(RadioType::Vloc, nr);
        let mut st = radio.lock();
        if !radio.operable(&st) {
            return f64::NAN;
        }
        radio.radial_for_api(&mut st, &pose, cur_t)
    }

    /// Smoothed DME distance, meters.
    pub fn get_dme(&self, rtype: RadioType, nr: usize) -> f64 {
        assert!(rtype == RadioType::Vloc || rtype == RadioType::Dme);
        let radio = self.find_radio(rtype, nr);
        let st = radio.lock();
        if !radio.operable(&st) {
            return f64::NAN;
        }
        st.dme
    }

    /// Horizontal deflection in dots (clamped to +-5) and the TO/FROM flag.
    pub fn get_hdef(&self, nr: usize, pilot: bool) -> (f64, bool) {
        let radio = self.find_radio(RadioType::Vloc, nr);
        let st = radio.lock();
        if st.failed {
            return (f64::NAN, false);
        }
        match radio.hdef(&st, pilot) {
            Some((v, tofrom)) => (v, tofrom),
            None => (f64::NAN, false),
        }
    }

    pub fn get_vdef(&self, nr: usize) -> f64 {
        let st = self.find_radio(RadioType::Vloc, nr).lock();
        if st.failed {
            f64::NAN
        } else {
            st.vdef
        }
    }

    pub fn get_loc_ddm(&self, nr: usize) -> f64 {
        let st = self.find_radio(RadioType::Vloc, nr).lock();
        if st.failed {
            f64::NAN
        } else {
            st.loc_ddm
        }
    }

    pub fn get_gp_ddm(&self, nr: usize) -> f64 {
        let st = self.find_radio(RadioType::Vloc, nr).lock();
        if st.failed {
            f64::NAN
        } else {
            st.gp_ddm
        }
    }

    /// Front course of the received localizer, degrees true.
    pub fn get_fcrs(&self, nr: usize) -> f64 {
        let st = self.find_radio(RadioType::Vloc, nr).lock();
        if st.failed {
            f64::NAN
        } else {
            st.loc_fcrs
        }
    }

    /// Nominal glide-path angle of the received glideslope, degrees.
    pub fn get_gs(&self, nr: usize) -> f64 {
        let st = self.find_radio(RadioType::Vloc, nr).lock();
        if st.failed {
            f64::NAN
        } else {
            st.gs
        }
    }

    pub fn is_loc(&self, nr: usize) -> bool {
        let freq = self.find_radio(RadioType::Vloc, nr).lock().freq;
        navdata::is_valid_loc_freq(freq as f64 / 1e6)
    }

    /// Decoded station identifier, once the post-tune identification delay
    /// has elapsed and a station is receivable. `None` otherwise.
    pub fn get_id(&self, rtype: RadioType, nr: usize) -> Option<String> {
        self.find_radio(rtype, nr).get_id(self.cur_t())
    }

    /// Worker-populated per-candidate debugging telemetry.
    pub fn get_navaid_telemetry(&self, rtype: RadioType, nr: usize) -> Vec<TelemSlot> {
        self.find_radio(rtype, nr).lock().telem.clone()
    }

    /* ---- audio ---- */

    /// Next PCM buffer for one of the radio's audio streams. `None` means
    /// "no audio" (failed radio); treat it as silence and do not retry
    /// faster.
    pub fn get_audio_buf2(
        &self,
        rtype: RadioType,
        nr: usize,
        volume: f64,
        squelch: bool,
        agc: bool,
        stream_id: usize,
    ) -> Option<Vec<i16>> {
        assert!(stream_id < self.core.cfg.num_streams);
        self.find_radio(rtype, nr)
            .get_audio_buf(&self.core.tones, volume, squelch, agc, stream_id)
    }

    /// Stream-0 convenience wrapper.
    pub fn get_audio_buf(
        &self,
        rtype: RadioType,
        nr: usize,
        volume: f64,
        squelch: bool,
        agc: bool,
    ) -> Option<Vec<i16>> {
        self.get_audio_buf2(rtype, nr, volume, squelch, agc, 0)
    }

    /// Resets the distortion pipelines of one nav radio. Call between
    /// unrelated transmissions (e.g. after a tune) so tails don't bleed.
    pub fn done_audio(&self, nr: usize) {
        self.find_radio(RadioType::Vloc, nr).clear_distort_buffers();
    }

    /// Aligns all stream cursors of the radio to stream 0; call while the
    /// other streams are stopped.
    pub fn sync_streams(&self, rtype: RadioType, nr: usize) {
        self.find_radio(rtype, nr).sync_streams();
    }

    /* ---- profile debugging ---- */

    pub fn set_debug_navaid(&self, sel: Option<ProfileDebugSel>) {
        *lock(&self.core.debug_sel) = sel;
        *lock(&self.core.debug_data) = None;
    }

    pub fn get_debug_profile(&self) -> Option<ProfileDebugData> {
        lock(&self.core.debug_data).clone()
    }

    pub fn config(&self) -> &Config {
        &self.core.cfg
    }
}

impl Drop for NavRadio {
    fn drop(&mut self) {
        if let Some(mut worker) = self.worker.take() {
            worker.stop();
        }
    }
}

/* ---- worker side ---- */

fn worker_pass(core: &NavRadCore) {
    let (pose, have_pose) = {
        let host = lock(&core.host);
        (host.pose, host.have_pose)
    };
    if !have_pose {
        return;
    }

    for radio in core
        .vloc_radios
        .iter()
        .chain(core.adf_radios.iter())
        .chain(core.dme_radios.iter())
    {
        radio_worker(core, radio, &pose);
    }
}

fn radio_worker(core: &NavRadCore, radio: &Radio, pose: &AircraftPose) {
    let freq = radio.current_freq();
    let plan = candidate_plan(radio.rtype, freq);
    let search = nm2met(core.cfg.search_range_nm);
    let center = pose.pos.horizontal();

    let trees = [
        (TreeSel::Vlocs, plan.vlocs),
        (TreeSel::Gses, plan.gses),
        (TreeSel::Dmes, plan.dmes),
        (TreeSel::Adfs, plan.adfs),
    ];
    for (which, wanted) in trees {
        match wanted {
            Some(kind) => {
                let list =
                    core.db
                        .query(center, search, None, Some(freq), Some(kind.into()));
                radio.refresh_tree(which, &list);
            }
            None => radio.flush_tree(which),
        }
    }

    let mut telem = Vec::new();
    for (which, _) in trees {
        for (key, nav) in radio.snapshot_tree(which) {
            let (tgt, propmode) =
                candidate_signal(core, radio, &nav, pose, freq);
            if let Some(tgt) = tgt {
                radio.store_signal_tgt(which, &key, tgt, propmode);
            }
            telem.push(TelemSlot {
                id: nav.id.clone(),
                kind: Some(nav.kind()),
                signal_db: tgt.unwrap_or(f64::NAN),
                propmode: Some(propmode),
            });
        }
    }
    radio.set_telem(telem);
}

/// Computes one candidate's target signal level. Returns `(None, _)` on a
/// transient failure (terrain service not ready), which leaves the previous
/// target in place.
fn candidate_signal(
    core: &NavRadCore,
    radio: &Radio,
    nav: &Arc<Navaid>,
    pose: &AircraftPose,
    tuned_freq: u64,
) -> (Option<f64>, PropMode) {
    const ACF_MIN_HGT: f64 = 3.0;

    let kind = nav.kind();
    let xmit_freq = act_freq(kind, tuned_freq);
    let pol = polarization_of(kind);
    let dist = gc_distance(pose.pos.horizontal(), nav.pos.horizontal());
    let nav_min_hgt = navaid_min_hgt(dist);

    // Cheap flat-earth bound first: terrain can only add loss, so a
    // candidate that can't clear the far-out floor even over a smooth
    // earth skips the expensive probe entirely.
    let flat = itm::flat_earth_loss(
        &*core.itm,
        dist.clamp(terrain::PROFILE_MIN_DIST, terrain::PROFILE_MAX_DIST),
        ACF_MIN_HGT,
        nav_min_hgt,
        itm::clamp_freq_mhz(xmit_freq),
        pol,
    );
    if ANT_BASE_GAIN - flat < NOISE_FLOOR_TOO_FAR {
        debug!(id = %nav.id, "candidate below noise floor, skipping probe");
        return (Some(NOISE_FLOOR_TOO_FAR), PropMode::Unknown);
    }

    let watched = {
        let sel = lock(&core.debug_sel);
        sel.as_ref().map_or(false, |s| {
            s.rtype == radio.rtype
                && s.nr == radio.nr
                && s.kind == kind
                && s.id == nav.id
        })
    };
    let mut capture: Option<ProfileDebugData> = None;
    let mut cb = |prof: &PathProfile, h1: f64, h2: f64| {
        if watched {
            capture = Some(ProfileDebugData {
                elev: prof.elev.clone(),
                acf_alt: prof.elev[0] + h1,
                nav_alt: prof.elev[prof.elev.len() - 1] + h2,
                dist: prof.dist,
                freq: xmit_freq,
            });
        }
    };

    let res = compute_signal_prop(
        &*core.terrain,
        &*core.itm,
        pose.pos,
        nav.pos,
        ACF_MIN_HGT,
        nav_min_hgt,
        xmit_freq,
        pol,
        Some(&mut cb),
    );

    if let Some(data) = capture {
        *lock(&core.debug_data) = Some(data);
    }

    match res {
        Some(pl) => (Some(ANT_BASE_GAIN - pl.dbloss), pl.propmode),
        None => (None, PropMode::Unknown),
    }
}
