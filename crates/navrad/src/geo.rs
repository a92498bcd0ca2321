/**
* Minimal geodetic toolkit for the receiver model.
*
* Every angular computation in the receiver works on a local flat plane
* centered either on the aircraft or on a ground station: project the other
* party into the plane, then read bearing and ground distance off the
* resulting 2-D vector. For the distances involved (a radio horizon of a few
* hundred kilometers) an azimuthal equidistant projection is exact enough and
* keeps bearings and great-circle distances mutually consistent.
*
* Slant ranges use WGS84 ECEF coordinates, which every navaid caches at
* database load.
*/
use libm::{asin, atan2, cos, fabs, sin, sqrt};
use serde::{Deserialize, Serialize};

/// Mean earth radius used for window sizing and flat-plane work, meters.
pub const EARTH_MSL: f64 = 6_371_000.0;

const WGS84_A: f64 = 6_378_137.0;
const WGS84_E2: f64 = 6.694_379_990_141_316e-3;

pub const FEET2MET: f64 = 0.3048;
pub const NM2MET: f64 = 1852.0;

pub fn nm2met(nm: f64) -> f64 {
    nm * NM2MET
}

pub fn met2nm(met: f64) -> f64 {
    met / NM2MET
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub lat: f64,
    pub lon: f64,
}

/// Geodetic position with elevation in meters MSL.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position3 {
    pub lat: f64,
    pub lon: f64,
    pub elev: f64,
}

impl Position3 {
    pub fn new(lat: f64, lon: f64, elev: f64) -> Self {
        Self { lat, lon, elev }
    }

    pub fn horizontal(&self) -> Position {
        Position {
            lat: self.lat,
            lon: self.lon,
        }
    }
}

impl Position {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    pub fn with_elev(&self, elev: f64) -> Position3 {
        Position3 {
            lat: self.lat,
            lon: self.lon,
            elev,
        }
    }
}

pub fn is_valid_lat(lat: f64) -> bool {
    lat.is_finite() && (-90.0..=90.0).contains(&lat)
}

pub fn is_valid_lon(lon: f64) -> bool {
    lon.is_finite() && (-180.0..=180.0).contains(&lon)
}

pub fn is_valid_elev(elev: f64) -> bool {
    elev.is_finite() && (-600.0..=9000.0).contains(&elev)
}

pub fn is_valid_hdg(hdg: f64) -> bool {
    hdg.is_finite() && (0.0..=360.0).contains(&hdg)
}

/// Normalizes a heading into [0, 360).
pub fn normalize_hdg(hdg: f64) -> f64 {
    let mut h = hdg % 360.0;
    if h < 0.0 {
        h += 360.0;
    }
    if h >= 360.0 {
        h = 0.0;
    }
    h
}

/// Shortest signed angular distance from heading `from` to heading `to`,
/// in (-180, 180]. Positive means `to` lies clockwise of `from`.
pub fn rel_hdg(from: f64, to: f64) -> f64 {
    let mut d = (to - from) % 360.0;
    if d > 180.0 {
        d -= 360.0;
    } else if d <= -180.0 {
        d += 360.0;
    }
    d
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

impl Vec2 {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn abs(&self) -> f64 {
        sqrt(self.x * self.x + self.y * self.y)
    }

    pub fn scmul(&self, s: f64) -> Self {
        Self::new(self.x * s, self.y * s)
    }

    pub fn is_zero(&self) -> bool {
        self.x == 0.0 && self.y == 0.0
    }
}

/// Converts a flat-plane vector (x east, y north) into the compass heading
/// it points along.
pub fn dir2hdg(v: Vec2) -> f64 {
    normalize_hdg(atan2(v.x, v.y).to_degrees())
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn sub(&self, o: &Vec3) -> Vec3 {
        Vec3::new(self.x - o.x, self.y - o.y, self.z - o.z)
    }

    pub fn abs(&self) -> f64 {
        sqrt(self.x * self.x + self.y * self.y + self.z * self.z)
    }

    pub fn dot(&self, o: &Vec3) -> f64 {
        self.x * o.x + self.y * o.y + self.z * o.z
    }

    pub fn unit(&self) -> Option<Vec3> {
        let len = self.abs();
        if len == 0.0 {
            return None;
        }
        Some(Vec3::new(self.x / len, self.y / len, self.z / len))
    }

    /// Rotates the vector around a body axis (0 = x, 1 = y, 2 = z) by
    /// `angle` degrees. Follows the right-handed convention with x right,
    /// y up and z backward, which is what the ADF needle math expects.
    pub fn rot(&self, angle: f64, axis: u8) -> Vec3 {
        let a = angle.to_radians();
        let (s, c) = (sin(a), cos(a));
        match axis {
            0 => Vec3::new(self.x, c * self.y - s * self.z, s * self.y + c * self.z),
            1 => Vec3::new(c * self.x + s * self.z, self.y, -s * self.x + c * self.z),
            _ => Vec3::new(c * self.x - s * self.y, s * self.x + c * self.y, self.z),
        }
    }
}

/// Geodetic to earth-centered-earth-fixed, meters.
pub fn geo2ecef(pos: Position3) -> Vec3 {
    let lat = pos.lat.to_radians();
    let lon = pos.lon.to_radians();
    let sin_lat = sin(lat);
    let n = WGS84_A / sqrt(1.0 - WGS84_E2 * sin_lat * sin_lat);
    Vec3::new(
        (n + pos.elev) * cos(lat) * cos(lon),
        (n + pos.elev) * cos(lat) * sin(lon),
        (n * (1.0 - WGS84_E2) + pos.elev) * sin_lat,
    )
}

/// Great-circle distance between two positions, meters.
pub fn gc_distance(p1: Position, p2: Position) -> f64 {
    let d_lat = (p2.lat - p1.lat).to_radians();
    let d_lon = (p2.lon - p1.lon).to_radians();
    let a = sin(d_lat / 2.0) * sin(d_lat / 2.0)
        + cos(p1.lat.to_radians()) * cos(p2.lat.to_radians()) * sin(d_lon / 2.0)
            * sin(d_lon / 2.0);
    let c = 2.0 * atan2(sqrt(a), sqrt(1.0 - a));
    EARTH_MSL * c
}

/// Initial great-circle bearing from `p1` toward `p2`, degrees true.
pub fn gc_bearing(p1: Position, p2: Position) -> f64 {
    let lat1 = p1.lat.to_radians();
    let lat2 = p2.lat.to_radians();
    let d_lon = (p2.lon - p1.lon).to_radians();
    let y = sin(d_lon) * cos(lat2);
    let x = cos(lat1) * sin(lat2) - sin(lat1) * cos(lat2) * cos(d_lon);
    normalize_hdg(atan2(y, x).to_degrees())
}

/**
 * A local flat plane centered on a reference position. `project` maps a
 * geodetic position into the plane as an (east, north) vector in meters,
 * `unproject` goes the other way. Bearings and distances read off the
 * projected vectors agree with the great-circle values by construction.
 */
#[derive(Debug, Clone, Copy)]
pub struct FlatPlane {
    center: Position,
}

impl FlatPlane {
    pub fn new(center: Position) -> Self {
        Self { center }
    }

    pub fn project(&self, pos: Position) -> Vec2 {
        let dist = gc_distance(self.center, pos);
        let brg = gc_bearing(self.center, pos).to_radians();
        Vec2::new(dist * sin(brg), dist * cos(brg))
    }

    pub fn unproject(&self, v: Vec2) -> Position {
        let dist = v.abs();
        if dist == 0.0 {
            return self.center;
        }
        let brg = atan2(v.x, v.y);
        let ang = dist / EARTH_MSL;
        let lat1 = self.center.lat.to_radians();
        let lat2 = asin(sin(lat1) * cos(ang) + cos(lat1) * sin(ang) * cos(brg));
        let lon2 = self.center.lon.to_radians()
            + atan2(
                sin(brg) * sin(ang) * cos(lat1),
                cos(ang) - sin(lat1) * sin(lat2),
            );
        Position::new(lat2.to_degrees(), normalize_lon(lon2.to_degrees()))
    }
}

fn normalize_lon(lon: f64) -> f64 {
    let mut l = lon;
    while l > 180.0 {
        l -= 360.0;
    }
    while l < -180.0 {
        l += 360.0;
    }
    l
}

/// Foot of the perpendicular from `p` onto the line through `a` and `b`.
pub fn point_line_foot(p: Vec2, a: Vec2, b: Vec2) -> Vec2 {
    let ab = Vec2::new(b.x - a.x, b.y - a.y);
    let len2 = ab.x * ab.x + ab.y * ab.y;
    if len2 == 0.0 {
        return a;
    }
    let t = ((p.x - a.x) * ab.x + (p.y - a.y) * ab.y) / len2;
    Vec2::new(a.x + t * ab.x, a.y + t * ab.y)
}

/// Elevation angle from `from` toward `to` relative to the local horizontal
/// at `from`, degrees. Positive means `to` is above the horizon.
pub fn vert_angle(from: Position3, to: Position3) -> f64 {
    let from_ecef = geo2ecef(from);
    let to_ecef = geo2ecef(to);
    let d = to_ecef.sub(&from_ecef);
    let Some(up) = from_ecef.unit() else {
        return 0.0;
    };
    let Some(du) = d.unit() else {
        return 0.0;
    };
    90.0 - libm::acos(up.dot(&du)).to_degrees()
}

/// Slant angle of the aircraft as seen from an antenna: the arctangent of
/// height difference over ground distance.
pub fn slant_angle(height_diff: f64, gnd_dist: f64) -> f64 {
    if fabs(gnd_dist) < 0.1 {
        return 90.0 * height_diff.signum();
    }
    libm::atan(height_diff / gnd_dist).to_degrees()
}

/// True course sector half-width of a localizer, degrees, from its
/// reference datum distance in meters.
pub fn loc_sector_width(ref_datum_dist: f64) -> f64 {
    libm::atan(106.9 / ref_datum_dist).to_degrees()
}
