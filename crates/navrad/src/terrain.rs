/**
* Terrain probe contract and geodesic profile sampling.
*
* The propagation model needs an elevation + water-fraction profile along
* the great circle between the two antennas. The polyline is sampled at a
* fixed 250 m spacing, bounded to 2..=600 points; the probe service fills in
* ground elevation (meters MSL) and a water fraction in [0, 1] per point.
*
* A probe returning `None` means the terrain service is not ready yet; the
* worker leaves signal targets untouched and retries on its next pass.
*/
use crate::filters::{iter_fract, wavg};
use crate::geo::{FlatPlane, Position};
use crate::itm;

pub const PROFILE_SPACING: f64 = 250.0; /* meters */
pub const PROFILE_MAX_PTS: usize = 600;
pub const PROFILE_MIN_DIST: f64 = 1000.0; /* meters */
pub const PROFILE_MAX_DIST: f64 = 1_000_000.0; /* meters */

/// Over-water path length over which conductivity ramps from fresh-water to
/// open-ocean values.
const WATER_OCEAN_MIN: f64 = 40_000.0; /* meters */
const WATER_OCEAN_MAX: f64 = 100_000.0; /* meters */

#[derive(Debug, Clone)]
pub struct TerrainSamples {
    /// Ground elevation per point, meters MSL.
    pub elev: Vec<f64>,
    /// Water fraction per point, 0 = dry land, 1 = open water.
    pub water: Vec<f64>,
}

/// Host-provided elevation service.
pub trait TerrainProbe: Send + Sync {
    /// Samples ground elevation and water fraction at each point. `filter_lin`
    /// requests linear interpolation between source data posts. Returns
    /// `None` while the service has no data yet.
    fn probe(&self, points: &[Position], filter_lin: bool) -> Option<TerrainSamples>;
}

/// A terrain profile between two stations plus the surface-electrical
/// parameters blended from its water coverage.
#[derive(Debug, Clone)]
pub struct PathProfile {
    pub dist: f64,
    pub elev: Vec<f64>,
    pub water_fract: f64,
    pub dielec: f64,
    pub conduct: f64,
}

/// Builds the sampled profile between `p1` and `p2`. Water fractions are
/// averaged along the path; dielectric blends ground to fresh water on that
/// fraction, while conductivity additionally ramps toward salt water as the
/// over-water length approaches open-ocean scale.
pub fn sample_path(
    terrain: &dyn TerrainProbe,
    p1: Position,
    p2: Position,
) -> Option<PathProfile> {
    let dist = crate::geo::gc_distance(p1, p2).clamp(PROFILE_MIN_DIST, PROFILE_MAX_DIST);
    let num_pts = ((dist / PROFILE_SPACING) as usize).clamp(2, PROFILE_MAX_PTS);

    let fpp = FlatPlane::new(p1);
    let v = fpp.project(p2);
    let mut pts = Vec::with_capacity(num_pts);
    for i in 0..num_pts {
        let f = i as f64 / (num_pts - 1) as f64;
        pts.push(fpp.unproject(v.scmul(f)));
    }

    let samples = terrain.probe(&pts, true)?;
    debug_assert_eq!(samples.elev.len(), num_pts);

    let water_part = 1.0 / num_pts as f64;
    let water_fract: f64 = samples
        .water
        .iter()
        .map(|w| w * water_part)
        .sum::<f64>()
        .clamp(0.0, 1.0);

    let water_length = dist * water_fract;
    let water_conduct = wavg(
        itm::CONDUCT_WATER_FRESH,
        itm::CONDUCT_WATER_SALT,
        iter_fract(water_length, WATER_OCEAN_MIN, WATER_OCEAN_MAX, true),
    );
    Some(PathProfile {
        dist,
        elev: samples.elev,
        water_fract,
        dielec: wavg(itm::DIELEC_GND_AVG, itm::DIELEC_WATER_FRESH, water_fract),
        conduct: wavg(itm::CONDUCT_GND_AVG, water_conduct, water_fract),
    })
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Flat terrain at a fixed elevation, optionally all water.
    pub struct FlatTerrain {
        pub elev: f64,
        pub water: f64,
        pub ready: bool,
    }

    impl FlatTerrain {
        pub fn land(elev: f64) -> Self {
            FlatTerrain {
                elev,
                water: 0.0,
                ready: true,
            }
        }
    }

    impl TerrainProbe for FlatTerrain {
        fn probe(
            &self,
            points: &[Position],
            _filter_lin: bool,
        ) -> Option<TerrainSamples> {
            if !self.ready {
                return None;
            }
            Some(TerrainSamples {
                elev: vec![self.elev; points.len()],
                water: vec![self.water; points.len()],
            })
        }
    }
}
