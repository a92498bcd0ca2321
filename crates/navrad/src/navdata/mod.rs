/**
* The navaid database: loading, deduplication and bounded spatial queries.
*
* Four ordered indexes are maintained over the record set: by latitude, by
* longitude, by identity tuple `(kind, region, icao, id)`, and a per-airport
* multimap keyed on `(kind, icao)`. The coordinate indexes drive the spatial
* query: starting from the would-be insertion point of the query center, each
* index is walked outward until the coordinate delta leaves the search
* window, and the union of the four walks is the result.
*
* Up to four source files are consulted in precedence order (first wins):
* user overrides, the hand-placed Global Airports localizers, vendor custom
* data, and the default dataset. A record whose identity or exact
* coordinate/kind/id slot is already occupied is dropped, except that a
* duplicate coming from the vendor file rewrites the frequency of the record
* it collides with (vendor files are the usual fix for stale hand-placed
* localizer channels).
*/
use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::airport::AirportDb;
use crate::error::Error;
use crate::geo::{
    self, gc_distance, rel_hdg, FlatPlane, Position, EARTH_MSL,
};
use crate::terrain::TerrainProbe;

pub mod navaid;

pub use navaid::{
    act_freq, is_valid_loc_freq, is_valid_ndb_freq, is_valid_vor_freq, parse_row,
    FpapPerf, KindMask, LocAlignment, LtpProvider, MarkerKind, Navaid, NavaidData,
    NavaidKey, NavaidKind, RowError, LOC_REF_DATUM_MIN,
};

const EARTH_NAV_MIN_VERSION: u32 = 1100;
const EARTH_NAV_MAX_VERSION: u32 = 1200;

/// Conflict radii for same-airport, same-kind, same-frequency records.
const LOC_CONFLICT_DIST: f64 = 1000.0;
const GS_CONFLICT_DIST: f64 = 750.0;
const DME_CONFLICT_DIST: f64 = 500.0;
const CONFLICT_BRG: f64 = 10.0;

/// Runway alignment tolerance between the file's localizer course and the
/// airport database's runway heading.
const LOC_ALIGN_TOLERANCE: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSource {
    UserOverride,
    GlobalAirports,
    VendorCustom,
    DefaultData,
}

impl DataSource {
    fn rel_path(self) -> &'static [&'static str] {
        match self {
            DataSource::UserOverride => &["Custom Data", "user_nav.dat"],
            DataSource::GlobalAirports => &[
                "Custom Scenery",
                "Global Airports",
                "Earth nav data",
                "earth_nav.dat",
            ],
            DataSource::VendorCustom => &["Custom Data", "earth_nav.dat"],
            DataSource::DefaultData => {
                &["Resources", "default data", "earth_nav.dat"]
            }
        }
    }

    const ALL: [DataSource; 4] = [
        DataSource::UserOverride,
        DataSource::GlobalAirports,
        DataSource::VendorCustom,
        DataSource::DefaultData,
    ];
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DataSource::UserOverride => "user overrides",
            DataSource::GlobalAirports => "global airports",
            DataSource::VendorCustom => "vendor custom data",
            DataSource::DefaultData => "default data",
        };
        write!(f, "{}", s)
    }
}

/// Ordering key for the coordinate indexes: coordinate first, then kind, id
/// and frequency as tiebreakers. Coordinates are validated finite at parse,
/// so the partial order is total here.
#[derive(Debug, Clone, PartialEq)]
struct CoordKey {
    coord: f64,
    kind: NavaidKind,
    id: String,
    freq: u64,
}

impl Eq for CoordKey {}

impl Ord for CoordKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.coord
            .partial_cmp(&other.coord)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| self.kind.cmp(&other.kind))
            .then_with(|| self.id.cmp(&other.id))
            .then_with(|| self.freq.cmp(&other.freq))
    }
}

impl PartialOrd for CoordKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl CoordKey {
    fn lat_of(nav: &Navaid) -> Self {
        CoordKey {
            coord: nav.pos.lat,
            kind: nav.kind(),
            id: nav.id.clone(),
            freq: nav.freq,
        }
    }

    fn lon_of(nav: &Navaid) -> Self {
        CoordKey {
            coord: nav.pos.lon,
            kind: nav.kind(),
            id: nav.id.clone(),
            freq: nav.freq,
        }
    }
}

pub struct NavaidDb {
    /// Master set in load order.
    navaids: BTreeMap<u64, Arc<Navaid>>,
    by_lat: BTreeMap<CoordKey, u64>,
    by_lon: BTreeMap<CoordKey, u64>,
    by_ident: BTreeMap<NavaidKey, u64>,
    by_airport: BTreeMap<(NavaidKind, String), Vec<u64>>,
    next_seq: u64,
    airports: Option<Arc<dyn AirportDb>>,
}

impl fmt::Debug for NavaidDb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NavaidDb")
            .field("navaids", &self.navaids.len())
            .finish()
    }
}

impl NavaidDb {
    /// Loads the database from an X-Plane style directory tree. At least one
    /// source file must parse; otherwise this fails with
    /// [`Error::NoUsableSource`].
    pub fn open(xpdir: &Path) -> Result<Self, Error> {
        Self::open_with_airports(xpdir, None)
    }

    pub fn open_with_airports(
        xpdir: &Path,
        airports: Option<Arc<dyn AirportDb>>,
    ) -> Result<Self, Error> {
        let mut db = Self::empty(airports);
        let mut usable = 0usize;

        for src in DataSource::ALL {
            let mut path = PathBuf::from(xpdir);
            for comp in src.rel_path() {
                path.push(comp);
            }
            if !path.exists() {
                debug!(source = %src, path = %path.display(), "source missing");
                continue;
            }
            match db.load_file(&path, src) {
                Ok(n) => {
                    info!(source = %src, records = n, "navaid source loaded");
                    usable += 1;
                }
                Err(e) => {
                    warn!(source = %src, error = %e, "navaid source unusable");
                }
            }
        }

        if usable == 0 {
            return Err(Error::NoUsableSource);
        }
        db.dedup_airports();
        Ok(db)
    }

    pub fn empty(airports: Option<Arc<dyn AirportDb>>) -> Self {
        NavaidDb {
            navaids: BTreeMap::new(),
            by_lat: BTreeMap::new(),
            by_lon: BTreeMap::new(),
            by_ident: BTreeMap::new(),
            by_airport: BTreeMap::new(),
            next_seq: 0,
            airports,
        }
    }

    pub fn len(&self) -> usize {
        self.navaids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.navaids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Navaid>> {
        self.navaids.values()
    }

    fn load_file(&mut self, path: &Path, src: DataSource) -> Result<usize, Error> {
        let file = File::open(path).map_err(Error::Io)?;
        self.load_reader(BufReader::new(file), src, &path.display().to_string())
    }

    /// Parses one source stream. The header line must read `I <version>`
    /// with a supported version; data rows that fail validation are logged
    /// and skipped without aborting the file.
    pub fn load_reader<R: BufRead>(
        &mut self,
        reader: R,
        src: DataSource,
        label: &str,
    ) -> Result<usize, Error> {
        let mut lines = reader.lines();

        let header = lines
            .next()
            .transpose()
            .map_err(Error::Io)?
            .ok_or_else(|| Error::BadHeader(label.to_string()))?;
        let mut toks = header.split_whitespace();
        if toks.next() != Some("I") {
            return Err(Error::BadHeader(label.to_string()));
        }
        let version: u32 = toks
            .next()
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| Error::BadHeader(label.to_string()))?;
        if !(EARTH_NAV_MIN_VERSION..=EARTH_NAV_MAX_VERSION).contains(&version) {
            return Err(Error::UnsupportedVersion(version));
        }

        let mut count = 0usize;
        let mut line_nr = 1usize;
        for line in lines {
            let line = line.map_err(Error::Io)?;
            line_nr += 1;
            // The row "99" is the end-of-data sentinel in this format.
            if line.trim() == "99" {
                break;
            }
            match parse_row(&line) {
                Ok(Some(nav)) => {
                    if self.insert(nav, src) {
                        count += 1;
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    debug!(file = label, line = line_nr, reason = %e,
                        "dropped malformed navaid row");
                }
            }
        }
        Ok(count)
    }

    /// Inserts one record unless an earlier source already claimed its slot.
    /// Returns whether the record went in. Vendor-source duplicates rewrite
    /// the preserved record's frequency instead (the vendor channel is
    /// assumed newer than any hand-placed list's).
    fn insert(&mut self, nav: Navaid, src: DataSource) -> bool {
        let lat_key = CoordKey::lat_of(&nav);
        let lon_key = CoordKey::lon_of(&nav);

        let existing = self
            .find_ident_sans_freq(&nav)
            .or_else(|| self.find_coord_sans_freq(&self.by_lat, &lat_key))
            .or_else(|| self.find_coord_sans_freq(&self.by_lon, &lon_key));

        if let Some(seq) = existing {
            if src == DataSource::VendorCustom {
                let old = &self.navaids[&seq];
                if old.freq != nav.freq {
                    debug!(id = %nav.id, old_freq = old.freq, new_freq = nav.freq,
                        "vendor data rewrites preserved navaid frequency");
                    self.rewrite_freq(seq, nav.freq);
                }
            }
            return false;
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        let arc = Arc::new(nav);
        self.by_lat.insert(lat_key, seq);
        self.by_lon.insert(lon_key, seq);
        self.by_ident.insert(arc.key(), seq);
        if !arc.icao.is_empty() && arc.icao != "ENRT" {
            self.by_airport
                .entry((arc.kind(), arc.icao.clone()))
                .or_default()
                .push(seq);
        }
        self.navaids.insert(seq, arc);
        true
    }

    fn find_ident_sans_freq(&self, nav: &Navaid) -> Option<u64> {
        let mut key = nav.key();
        key.freq = 0;
        let mut hi = nav.key();
        hi.freq = u64::MAX;
        self.by_ident.range(key..=hi).map(|(_, &seq)| seq).next()
    }

    fn find_coord_sans_freq(
        &self,
        index: &BTreeMap<CoordKey, u64>,
        key: &CoordKey,
    ) -> Option<u64> {
        let lo = CoordKey { freq: 0, ..key.clone() };
        let hi = CoordKey {
            freq: u64::MAX,
            ..key.clone()
        };
        index.range(lo..=hi).map(|(_, &seq)| seq).next()
    }

    fn rewrite_freq(&mut self, seq: u64, freq: u64) {
        let Some(old) = self.navaids.remove(&seq) else {
            return;
        };
        self.by_lat.remove(&CoordKey::lat_of(&old));
        self.by_lon.remove(&CoordKey::lon_of(&old));
        self.by_ident.remove(&old.key());

        let nav = Navaid {
            data: old.data.clone(),
            pos: old.pos,
            ecef: old.ecef,
            freq,
            range: old.range,
            id: old.id.clone(),
            icao: old.icao.clone(),
            region: old.region.clone(),
            name: old.name.clone(),
            xp_elev: Default::default(),
            loc_align: Default::default(),
        };
        let arc = Arc::new(nav);
        self.by_lat.insert(CoordKey::lat_of(&arc), seq);
        self.by_lon.insert(CoordKey::lon_of(&arc), seq);
        self.by_ident.insert(arc.key(), seq);
        self.navaids.insert(seq, arc);
        // by_airport references the seq, which is unchanged.
    }

    fn remove(&mut self, seq: u64) {
        let Some(nav) = self.navaids.remove(&seq) else {
            return;
        };
        self.by_lat.remove(&CoordKey::lat_of(&nav));
        self.by_lon.remove(&CoordKey::lon_of(&nav));
        self.by_ident.remove(&nav.key());
        if let Some(list) = self.by_airport.get_mut(&(nav.kind(), nav.icao.clone())) {
            list.retain(|&s| s != seq);
        }
    }

    /// Suppresses duplicated ILS components within an airport: two records
    /// of the same kind and frequency conflict when they sit within the
    /// kind's conflict radius (and, for the directional kinds, radiate
    /// within 10 degrees of each other). The later-loaded record wins.
    /// [`NavaidDb::open`] runs this automatically; callers assembling a
    /// database through [`NavaidDb::load_reader`] should run it once all
    /// sources are in.
    pub fn dedup_airports(&mut self) {
        let mut drop_list: Vec<u64> = Vec::new();

        for ((kind, _icao), seqs) in self.by_airport.iter() {
            let max_dist = match kind {
                NavaidKind::Loc => LOC_CONFLICT_DIST,
                NavaidKind::Gs => GS_CONFLICT_DIST,
                NavaidKind::Dme => DME_CONFLICT_DIST,
                _ => continue,
            };
            for (i, &sa) in seqs.iter().enumerate() {
                for &sb in &seqs[i + 1..] {
                    let (a, b) = (&self.navaids[&sa], &self.navaids[&sb]);
                    if a.freq != b.freq {
                        continue;
                    }
                    if gc_distance(a.pos.horizontal(), b.pos.horizontal()) > max_dist {
                        continue;
                    }
                    if let (Some(ba), Some(bb)) = (a.course(), b.course()) {
                        if rel_hdg(ba, bb).abs() >= CONFLICT_BRG {
                            continue;
                        }
                    }
                    // Later load order wins.
                    let loser = sa.min(sb);
                    debug!(id = %self.navaids[&loser].id,
                        "suppressing conflicting airport navaid");
                    drop_list.push(loser);
                }
            }
        }
        drop_list.sort_unstable();
        drop_list.dedup();
        for seq in drop_list {
            self.remove(seq);
        }
    }

    /// Bounded window query. The half-window sizes derive from the radius:
    /// `radius / (R * 2 pi) * 360` degrees of latitude, widened by
    /// `cos(lat)` on the longitude axis.
    pub fn query(
        &self,
        center: Position,
        radius: f64,
        id: Option<&str>,
        freq: Option<u64>,
        kinds: Option<KindMask>,
    ) -> Vec<Arc<Navaid>> {
        let lat_spacing = radius / (EARTH_MSL * 2.0 * std::f64::consts::PI) * 360.0;
        let lon_spacing = lat_spacing / libm::cos(center.lat.to_radians()).max(1e-3);

        let n = self.gather(center, lat_spacing, lon_spacing, id, freq, kinds, None);
        let mut out = Vec::with_capacity(n);
        self.gather(
            center,
            lat_spacing,
            lon_spacing,
            id,
            freq,
            kinds,
            Some(&mut out),
        );

        if self.airports.is_some() {
            for nav in &out {
                if matches!(nav.data, NavaidData::Loc { .. }) {
                    self.align_loc(nav);
                }
            }
        }
        out
    }

    /// Two-pass gather: without `out` it only counts, so the fill pass can
    /// allocate exactly once.
    #[allow(clippy::too_many_arguments)]
    fn gather(
        &self,
        center: Position,
        lat_spacing: f64,
        lon_spacing: f64,
        id: Option<&str>,
        freq: Option<u64>,
        kinds: Option<KindMask>,
        mut out: Option<&mut Vec<Arc<Navaid>>>,
    ) -> usize {
        let select = |nav: &Navaid| -> bool {
            id.map_or(true, |want| nav.id == want)
                && freq.map_or(true, |want| nav.freq == want)
                && kinds.map_or(true, |mask| mask.contains(nav.kind()))
        };

        let mut seen: Vec<u64> = Vec::new();
        let pivot = |coord: f64| CoordKey {
            coord,
            kind: NavaidKind::Ndb,
            id: String::new(),
            freq: 0,
        };

        let lat_pivot = pivot(center.lat);
        for (key, &seq) in self.by_lat.range(..&lat_pivot).rev() {
            if center.lat - key.coord >= lat_spacing {
                break;
            }
            if select(&self.navaids[&seq]) && !seen.contains(&seq) {
                seen.push(seq);
            }
        }
        for (key, &seq) in self.by_lat.range(&lat_pivot..) {
            if key.coord - center.lat >= lat_spacing {
                break;
            }
            if select(&self.navaids[&seq]) && !seen.contains(&seq) {
                seen.push(seq);
            }
        }
        let lon_pivot = pivot(center.lon);
        for (key, &seq) in self.by_lon.range(..&lon_pivot).rev() {
            if center.lon - key.coord >= lon_spacing {
                break;
            }
            if select(&self.navaids[&seq]) && !seen.contains(&seq) {
                seen.push(seq);
            }
        }
        for (key, &seq) in self.by_lon.range(&lon_pivot..) {
            if key.coord - center.lon >= lon_spacing {
                break;
            }
            if select(&self.navaids[&seq]) && !seen.contains(&seq) {
                seen.push(seq);
            }
        }

        let count = seen.len();
        if let Some(out) = out.as_deref_mut() {
            out.extend(seen.into_iter().map(|seq| Arc::clone(&self.navaids[&seq])));
        }
        count
    }

    /// Exact identity lookup.
    pub fn find(&self, key: &NavaidKey) -> Option<&Arc<Navaid>> {
        self.by_ident.get(key).map(|seq| &self.navaids[seq])
    }

    /// Lazily reconciles a localizer with its runway. When the airport
    /// database knows the runway and the headings agree within a degree,
    /// the antenna is dropped perpendicular onto the threshold-to-threshold
    /// line, the course snaps to the runway's true heading, and the
    /// reference datum distance becomes the true antenna-to-threshold
    /// distance (floored at 1017 m).
    pub fn align_loc(&self, nav: &Arc<Navaid>) -> Option<LocAlignment> {
        let arpts = self.airports.as_ref()?;
        *nav.loc_align.get_or_init(|| {
            let NavaidData::Loc { brg, rwy_id, .. } = &nav.data else {
                return None;
            };
            let arpt = arpts.lookup(&nav.icao)?;
            let (rwy, end) = arpt.find_runway(rwy_id)?;
            let rwy_hdg = rwy.ends[end].hdg;
            if rel_hdg(*brg, rwy_hdg).abs() > LOC_ALIGN_TOLERANCE {
                return None;
            }
            let thr = rwy.ends[end].thr;
            let fpp = FlatPlane::new(thr);
            let far = fpp.project(rwy.ends[1 - end].thr);
            let ant = fpp.project(nav.pos.horizontal());
            let foot = geo::point_line_foot(ant, geo::Vec2::default(), far);
            let corr = fpp.unproject(foot).with_elev(nav.pos.elev);
            Some(LocAlignment {
                corr_pos: corr,
                brg: rwy_hdg,
                ref_datum_dist: foot.abs().max(LOC_REF_DATUM_MIN),
            })
        })
    }
}

/// Scenery ground elevation under a navaid, probed lazily and cached for the
/// database's lifetime. Returns `None` while the terrain service is not
/// ready (the caller retries later).
pub fn xp_elev(nav: &Navaid, terrain: &dyn TerrainProbe) -> Option<f64> {
    if let Some(&v) = nav.xp_elev.get() {
        return if v.is_nan() { None } else { Some(v) };
    }
    let probed = terrain.probe(&[nav.pos.horizontal()], true)?;
    let elev = *probed.elev.first()?;
    let _ = nav.xp_elev.set(elev);
    Some(elev)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::airport::{Airport, AirportDb, Runway, RunwayEnd};
    use std::io::Cursor;

    const HEADER: &str = "I 1100 Version - data cycle\n";

    fn db_from(text: &str, src: DataSource) -> NavaidDb {
        let mut db = NavaidDb::empty(None);
        db.load_reader(
            Cursor::new(format!("{}{}", HEADER, text)),
            src,
            "test",
        )
        .unwrap();
        db.dedup_airports();
        db
    }

    #[test]
    fn version_gate() {
        let mut db = NavaidDb::empty(None);
        let err = db
            .load_reader(Cursor::new("I 900\n"), DataSource::DefaultData, "t")
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedVersion(900)));
        assert!(db
            .load_reader(Cursor::new("garbage\n"), DataSource::DefaultData, "t")
            .is_err());
    }

    #[test]
    fn bad_rows_do_not_abort_file() {
        let db = db_from(
            "3 47.0 15.0 1000 11610 130 -2.0 AAA ENRT LO ALPHA\n\
             3 99.0 15.0 1000 11610 130 -2.0 BAD ENRT LO BROKEN\n\
             2 46.0 14.0 500 375 50 0.0 OEV ENRT LO SALZBURG NDB\n\
             99\n",
            DataSource::DefaultData,
        );
        assert_eq!(db.len(), 2);
    }

    #[test]
    fn duplicate_slot_first_wins() {
        let mut db = NavaidDb::empty(None);
        db.load_reader(
            Cursor::new(format!(
                "{}3 47.0 15.0 1000 11610 130 -2.0 AAA ENRT LO FIRST\n",
                HEADER
            )),
            DataSource::UserOverride,
            "user",
        )
        .unwrap();
        db.load_reader(
            Cursor::new(format!(
                "{}3 47.0 15.0 1000 11610 130 -2.0 AAA ENRT LO SECOND\n",
                HEADER
            )),
            DataSource::DefaultData,
            "default",
        )
        .unwrap();
        assert_eq!(db.len(), 1);
        assert_eq!(db.iter().next().unwrap().name, "FIRST");
    }

    #[test]
    fn vendor_duplicate_rewrites_frequency() {
        let mut db = NavaidDb::empty(None);
        db.load_reader(
            Cursor::new(format!(
                "{}4 47.0 15.0 1000 10950 18 90.0 IAAA LOWG LO 35C HAND PLACED\n",
                HEADER
            )),
            DataSource::GlobalAirports,
            "global",
        )
        .unwrap();
        db.load_reader(
            Cursor::new(format!(
                "{}4 47.0 15.0 1000 10850 18 90.0 IAAA LOWG LO 35C VENDOR\n",
                HEADER
            )),
            DataSource::VendorCustom,
            "vendor",
        )
        .unwrap();
        assert_eq!(db.len(), 1);
        let nav = db.iter().next().unwrap();
        assert_eq!(nav.freq, 108_500_000);
        assert_eq!(nav.name, "HAND PLACED");
    }

    #[test]
    fn airport_conflict_later_wins() {
        // Two same-frequency localizers 200 m apart on the same course at
        // one airport: only the later record must survive.
        let db = db_from(
            "4 47.0000 15.0000 1000 10950 18 90.0 IONE LOWG LO 35C FIRST LOC\n\
             4 47.0018 15.0000 1000 10950 18 91.0 ITWO LOWG LO 35C SECOND LOC\n",
            DataSource::DefaultData,
        );
        assert_eq!(db.len(), 1);
        assert_eq!(db.iter().next().unwrap().id, "ITWO");
    }

    #[test]
    fn distant_same_freq_locs_coexist() {
        let db = db_from(
            "4 47.00 15.00 1000 10950 18 90.0 IONE LOWG LO 35C ONE\n\
             4 47.05 15.00 1000 10950 18 270.0 ITWO LOWG LO 17C TWO\n",
            DataSource::DefaultData,
        );
        assert_eq!(db.len(), 2);
    }

    #[test]
    fn query_filters_and_window() {
        let db = db_from(
            "3 47.0 15.0 1000 11610 130 -2.0 AAA ENRT LO NEAR\n\
             3 47.2 15.1 1000 11610 130 -2.0 BBB ENRT LO ALSO NEAR\n\
             3 55.0 25.0 1000 11630 130 -2.0 CCC ENRT LO FAR AWAY\n\
             2 47.1 15.0 500 375 50 0.0 NDB ENRT LO SOME NDB\n",
            DataSource::DefaultData,
        );
        let center = Position::new(47.05, 15.0);
        let all = db.query(center, geo::nm2met(300.0), None, None, None);
        assert_eq!(all.len(), 3);

        let vors = db.query(
            center,
            geo::nm2met(300.0),
            None,
            Some(116_100_000),
            Some(NavaidKind::Vor.into()),
        );
        assert_eq!(vors.len(), 2);

        let by_id = db.query(center, geo::nm2met(300.0), Some("BBB"), None, None);
        assert_eq!(by_id.len(), 1);
        assert_eq!(by_id[0].name, "ALSO NEAR");

        // The walks cover a cross-shaped union of the lat and lon bands, so
        // a station far north but on the center's longitude still shows up.
        let db2 = db_from(
            "3 55.0 15.0 1000 11610 130 -2.0 DDD ENRT LO SAME LONGITUDE\n",
            DataSource::DefaultData,
        );
        let hits = db2.query(center, geo::nm2met(300.0), None, None, None);
        assert_eq!(hits.len(), 1);
    }

    struct OneRunway;

    impl AirportDb for OneRunway {
        fn lookup(&self, icao: &str) -> Option<Arc<Airport>> {
            if icao != "LOWG" {
                return None;
            }
            Some(Arc::new(Airport {
                icao: "LOWG".into(),
                runways: vec![Runway {
                    ends: [
                        RunwayEnd {
                            id: "35C".into(),
                            thr: Position::new(46.985, 15.0),
                            hdg: 0.0,
                        },
                        RunwayEnd {
                            id: "17C".into(),
                            thr: Position::new(47.012, 15.0),
                            hdg: 180.0,
                        },
                    ],
                }],
            }))
        }
    }

    #[test]
    fn loc_runway_alignment() {
        let mut db = NavaidDb::empty(Some(Arc::new(OneRunway)));
        // LOC antenna slightly east of the centerline, past the far end.
        db.load_reader(
            Cursor::new(format!(
                "{}4 47.014 15.0002 1000 10950 18 0.5 IGRZ LOWG LO 35C ILS-cat-I\n",
                HEADER
            )),
            DataSource::DefaultData,
            "t",
        )
        .unwrap();
        let center = Position::new(47.0, 15.0);
        let hits = db.query(
            center,
            geo::nm2met(50.0),
            None,
            None,
            Some(NavaidKind::Loc.into()),
        );
        assert_eq!(hits.len(), 1);
        let align = hits[0].loc_align.get().unwrap().as_ref().unwrap();
        // Course snaps to the runway heading, distance floors at 1017 m.
        assert_eq!(align.brg, 0.0);
        assert!(align.ref_datum_dist >= LOC_REF_DATUM_MIN);
        // The corrected position sits on the centerline.
        assert!((align.corr_pos.lon - 15.0).abs() < 1e-4);
    }
}
