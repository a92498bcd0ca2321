/**
* Terrain-based point-to-point signal estimation: probe the profile, blend
* the surface parameters, run the ITM and report median loss plus the
* dominant propagation mode.
*
* This is also exposed publicly so hosts can run their own custom
* propagation checks; note each call costs a terrain probe of up to 600
* points, so results should be cached for a few seconds rather than
* recomputed per frame.
*/
use tracing::trace;

use crate::geo::{met2nm, Position3};
use crate::itm::{
    self, Climate, ItmModel, ItmRequest, Polarization, PropMode,
};
use crate::terrain::{sample_path, PathProfile, TerrainProbe};

#[derive(Debug, Clone, Copy)]
pub struct PathLoss {
    /// Median loss, dB (positive).
    pub dbloss: f64,
    pub propmode: PropMode,
}

/// Antenna height floor for a ground station: at least 10 m of mast, plus a
/// quarter meter per nautical mile of range as a horizon margin for the
/// long-range stations sited on towers and ridgelines.
pub fn navaid_min_hgt(dist: f64) -> f64 {
    f64::max(10.0, met2nm(dist) / 4.0)
}

/// Computes the path between two stations. `p1_min_hgt`/`p2_min_hgt` floor
/// the antenna heights above the probed ground; navaid database elevations
/// are unreliable enough (sometimes below the scenery ground) that the floor
/// does real work. Returns `None` while the terrain service is not ready.
#[allow(clippy::too_many_arguments)]
pub fn compute_signal_prop(
    terrain: &dyn TerrainProbe,
    model: &dyn ItmModel,
    p1: Position3,
    p2: Position3,
    p1_min_hgt: f64,
    p2_min_hgt: f64,
    freq_hz: u64,
    pol: Polarization,
    mut profile_cb: Option<&mut dyn FnMut(&PathProfile, f64, f64)>,
) -> Option<PathLoss> {
    debug_assert!(p1_min_hgt >= 0.0);
    debug_assert!(p2_min_hgt >= 0.0);

    let profile = sample_path(terrain, p1.horizontal(), p2.horizontal())?;

    let ht1 = f64::max(p1.elev - profile.elev[0], p1_min_hgt);
    let ht2 = f64::max(p2.elev - profile.elev[profile.elev.len() - 1], p2_min_hgt);

    let out = model.point_to_point_mdh(&ItmRequest {
        elev: &profile.elev,
        dist: profile.dist,
        ht1,
        ht2,
        dielec: profile.dielec,
        conduct: profile.conduct,
        surfref: itm::NS_AVG,
        freq_mhz: itm::clamp_freq_mhz(freq_hz),
        climate: Climate::ContinentalTemperate,
        pol,
        time_accur: itm::ACCUR_MAX,
        loc_accur: itm::ACCUR_MAX,
        conf_accur: itm::ACCUR_MAX,
    });
    trace!(
        dist = profile.dist,
        dbloss = out.dbloss,
        propmode = out.propmode.as_str(),
        "path computed"
    );

    if let Some(cb) = profile_cb.as_deref_mut() {
        cb(&profile, ht1, ht2);
    }

    Some(PathLoss {
        dbloss: out.dbloss,
        propmode: out.propmode,
    })
}
