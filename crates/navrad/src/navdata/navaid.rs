/**
* Navaid records and the `earth_nav.dat` row grammar.
*
* A row is whitespace-tokenized; the leading integer selects the record kind:
*
* | code | kind | | code | kind |
* |------|-------------|------|------|
* | 2 | NDB | 9 | inner marker |
* | 3 | VOR | 12, 13 | DME |
* | 4, 5 | localizer | 14 | FPAP |
* | 6 | glideslope | 15 | GLS |
* | 7 | outer marker| 16 | LTP |
* | 8 | middle marker| | |
*
* Columns 1..=5 are `lat lon elev_ft freq range_nm`, column 6 is
* kind-specific, columns 7..=9 are `id icao region`, column 10 carries the
* runway id where applicable and the free-form name runs to end of line.
* Frequencies are stored scaled: NDB rows in kHz, VHF rows (VOR/LOC/GS/DME)
* in 10 kHz units; everything else is taken as plain Hz.
*/
use std::fmt;
use once_cell::sync::OnceCell;

use serde::Serialize;

use crate::geo::{
    geo2ecef, is_valid_elev, is_valid_hdg, is_valid_lat, is_valid_lon, Position3,
    Vec3, FEET2MET, NM2MET,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NavaidKind {
    Ndb,
    Vor,
    Loc,
    Gs,
    Mrk,
    Dme,
    Fpap,
    Ltp,
    Gls,
}

impl NavaidKind {
    pub const fn bit(self) -> u16 {
        match self {
            NavaidKind::Ndb => 1 << 0,
            NavaidKind::Vor => 1 << 1,
            NavaidKind::Loc => 1 << 2,
            NavaidKind::Gs => 1 << 3,
            NavaidKind::Mrk => 1 << 4,
            NavaidKind::Dme => 1 << 5,
            NavaidKind::Fpap => 1 << 6,
            NavaidKind::Ltp => 1 << 7,
            NavaidKind::Gls => 1 << 8,
        }
    }
}

impl fmt::Display for NavaidKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NavaidKind::Ndb => "NDB",
            NavaidKind::Vor => "VOR",
            NavaidKind::Loc => "LOC",
            NavaidKind::Gs => "GS",
            NavaidKind::Mrk => "MRK",
            NavaidKind::Dme => "DME",
            NavaidKind::Fpap => "FPAP",
            NavaidKind::Ltp => "LTP",
            NavaidKind::Gls => "GLS",
        };
        write!(f, "{}", s)
    }
}

/// Bitmask over navaid kinds for query filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct KindMask(pub u16);

impl KindMask {
    pub const ALL: KindMask = KindMask(0x1ff);

    pub fn of(kinds: &[NavaidKind]) -> Self {
        KindMask(kinds.iter().fold(0, |acc, k| acc | k.bit()))
    }

    pub fn contains(self, kind: NavaidKind) -> bool {
        self.0 & kind.bit() != 0
    }
}

impl From<NavaidKind> for KindMask {
    fn from(kind: NavaidKind) -> Self {
        KindMask(kind.bit())
    }
}

impl std::ops::BitOr for KindMask {
    type Output = KindMask;
    fn bitor(self, rhs: KindMask) -> KindMask {
        KindMask(self.0 | rhs.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerKind {
    Outer,
    Middle,
    Inner,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FpapPerf {
    Lp,
    Lpv,
    ApvII,
    Gls,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LtpProvider {
    Waas,
    Egnos,
    Msas,
    Gp,
}

/// Kind-specific payload. Markers and the GBAS family carry their runway and
/// procedure linkage; the ILS components carry course geometry.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind")]
pub enum NavaidData {
    Ndb,
    Vor {
        /// Slaved magnetic variation, degrees (east positive).
        magvar: f64,
    },
    Loc {
        /// Front course, degrees true.
        brg: f64,
        /// Magnetic front course embedded in the bearing column, if the
        /// source file carried one.
        fcrs_mag: Option<f64>,
        rwy_id: String,
        /// Antenna to reference-datum distance, meters. Defaults to 2450
        /// until runway alignment refines it; never below 1017.
        ref_datum_dist: f64,
    },
    Gs {
        brg: f64,
        /// Nominal glide path angle, degrees, in (0, 8].
        gs: f64,
        rwy_id: String,
    },
    Mrk {
        brg: f64,
        marker: MarkerKind,
        rwy_id: String,
    },
    Dme {
        /// Range bias, meters. Negative biases shorten the indication.
        bias: f64,
        arpt_id: String,
    },
    Fpap {
        crs: f64,
        proc_id: String,
        rwy_id: String,
        perf: FpapPerf,
    },
    Ltp {
        /// Threshold crossing height, meters.
        tch: f64,
        crs: f64,
        gs: f64,
        proc_id: String,
        rwy_id: String,
        prov: LtpProvider,
    },
    Gls {
        crs: f64,
        gs: f64,
        proc_id: String,
        rwy_id: String,
    },
}

/// Localizer geometry refined against the airport database: position of the
/// foot of the antenna on the runway line, runway true heading, and the true
/// antenna-to-threshold distance.
#[derive(Debug, Clone, Copy)]
pub struct LocAlignment {
    pub corr_pos: Position3,
    pub brg: f64,
    pub ref_datum_dist: f64,
}

#[derive(Debug, Serialize)]
pub struct Navaid {
    pub data: NavaidData,
    pub pos: Position3,
    #[serde(skip)]
    pub ecef: Vec3,
    /// Carrier frequency in Hz.
    pub freq: u64,
    /// Declared service range, meters.
    pub range: f64,
    pub id: String,
    pub icao: String,
    pub region: String,
    pub name: String,

    #[serde(skip)]
    pub(crate) xp_elev: OnceCell<f64>,
    #[serde(skip)]
    pub(crate) loc_align: OnceCell<Option<LocAlignment>>,
}

impl Navaid {
    pub fn kind(&self) -> NavaidKind {
        match self.data {
            NavaidData::Ndb => NavaidKind::Ndb,
            NavaidData::Vor { .. } => NavaidKind::Vor,
            NavaidData::Loc { .. } => NavaidKind::Loc,
            NavaidData::Gs { .. } => NavaidKind::Gs,
            NavaidData::Mrk { .. } => NavaidKind::Mrk,
            NavaidData::Dme { .. } => NavaidKind::Dme,
            NavaidData::Fpap { .. } => NavaidKind::Fpap,
            NavaidData::Ltp { .. } => NavaidKind::Ltp,
            NavaidData::Gls { .. } => NavaidKind::Gls,
        }
    }

    /// Identity tuple ordering key.
    pub fn key(&self) -> NavaidKey {
        NavaidKey {
            kind: self.kind(),
            region: self.region.clone(),
            icao: self.icao.clone(),
            id: self.id.clone(),
            freq: self.freq,
        }
    }

    /// The course the facility radiates along, for the kinds that have one.
    pub fn course(&self) -> Option<f64> {
        match &self.data {
            NavaidData::Loc { .. } => Some(self.loc_brg()),
            NavaidData::Gs { brg, .. } | NavaidData::Mrk { brg, .. } => Some(*brg),
            NavaidData::Fpap { crs, .. }
            | NavaidData::Ltp { crs, .. }
            | NavaidData::Gls { crs, .. } => Some(*crs),
            _ => None,
        }
    }

    /// Localizer front course, preferring the runway-aligned value.
    pub fn loc_brg(&self) -> f64 {
        if let Some(Some(align)) = self.loc_align.get() {
            return align.brg;
        }
        match &self.data {
            NavaidData::Loc { brg, .. } => *brg,
            _ => f64::NAN,
        }
    }

    /// Localizer reference-datum distance, preferring the aligned value.
    pub fn loc_ref_datum_dist(&self) -> f64 {
        if let Some(Some(align)) = self.loc_align.get() {
            return align.ref_datum_dist;
        }
        match &self.data {
            NavaidData::Loc { ref_datum_dist, .. } => *ref_datum_dist,
            _ => f64::NAN,
        }
    }

    /// Position used for guidance geometry: the runway-aligned reference
    /// point for localizers, the surveyed position otherwise.
    pub fn corr_pos(&self) -> Position3 {
        if let Some(Some(align)) = self.loc_align.get() {
            return align.corr_pos;
        }
        self.pos
    }
}

impl fmt::Display for Navaid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} ({}) {:.4} {:.4} {:.1} MHz",
            self.kind(),
            self.id,
            self.icao,
            self.pos.lat,
            self.pos.lon,
            self.freq as f64 / 1e6
        )
    }
}

/// Ordering key for the identity index: `(kind, region, icao, id)` with the
/// frequency as final tiebreaker.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct NavaidKey {
    pub kind: NavaidKind,
    pub region: String,
    pub icao: String,
    pub id: String,
    pub freq: u64,
}

pub const LOC_REF_DATUM_DFL: f64 = 2450.0;
pub const LOC_REF_DATUM_MIN: f64 = 1017.0;

/// VOR channels: 108.00-117.95 MHz in 50 kHz steps; below 112 MHz only the
/// even 100-kHz digits belong to VORs (the odd ones are localizers).
pub fn is_valid_vor_freq(freq_mhz: f64) -> bool {
    let khz = (freq_mhz * 1000.0).round() as i64;
    if !(108_000..=117_950).contains(&khz) || khz % 50 != 0 {
        return false;
    }
    khz >= 112_000 || ((khz / 100) % 10) % 2 == 0
}

/// Localizer channels: 108.10-111.95 MHz, 50 kHz steps, odd 100-kHz digit.
pub fn is_valid_loc_freq(freq_mhz: f64) -> bool {
    let khz = (freq_mhz * 1000.0).round() as i64;
    (108_100..=111_950).contains(&khz) && khz % 50 == 0 && ((khz / 100) % 10) % 2 == 1
}

/// NDB carriers: 177-1750 kHz.
pub fn is_valid_ndb_freq(freq_khz: f64) -> bool {
    (177.0..=1750.0).contains(&freq_khz)
}

/// Actual transmit frequency in Hz for a navaid sharing a tuned VHF channel.
/// Glideslopes radiate in the 329-335 MHz band (332 MHz is used as a fixed
/// stand-in), and a DME paired with a 108-118 MHz channel transmits in
/// L-band, mapped linearly onto 1041-1150 MHz.
pub fn act_freq(kind: NavaidKind, ref_freq: u64) -> u64 {
    match kind {
        NavaidKind::Gs => 332_000_000,
        NavaidKind::Dme => {
            let mhz = ref_freq as f64 / 1e6;
            if (108.0..=118.0).contains(&mhz) {
                let f = (mhz - 108.0) / 10.0;
                ((1041.0 + f * (1150.0 - 1041.0)) * 1e6) as u64
            } else {
                ref_freq
            }
        }
        _ => ref_freq,
    }
}

/// Why a row was dropped. These never abort a file; the loader logs them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowError(pub &'static str);

impl fmt::Display for RowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

struct Fields<'a> {
    toks: &'a [&'a str],
}

impl<'a> Fields<'a> {
    fn f64(&self, i: usize) -> Result<f64, RowError> {
        self.toks
            .get(i)
            .and_then(|t| t.parse::<f64>().ok())
            .ok_or(RowError("unparsable numeric field"))
    }

    fn i64(&self, i: usize) -> Result<i64, RowError> {
        self.toks
            .get(i)
            .and_then(|t| t.parse::<i64>().ok())
            .ok_or(RowError("unparsable integer field"))
    }

    fn s(&self, i: usize) -> &'a str {
        self.toks.get(i).copied().unwrap_or("")
    }

    fn name_from(&self, i: usize) -> String {
        if i >= self.toks.len() {
            return String::new();
        }
        self.toks[i..].join(" ")
    }
}

fn parse_common(
    f: &Fields,
    kind: NavaidKind,
    min_fields: usize,
    data: NavaidData,
) -> Result<Navaid, RowError> {
    if f.toks.len() < min_fields {
        return Err(RowError("too few fields"));
    }
    let lat = f.f64(1)?;
    let lon = f.f64(2)?;
    let elev = f.i64(3)? as f64 * FEET2MET;
    let raw_freq = f.i64(4)?;
    if raw_freq < 0 {
        return Err(RowError("negative frequency"));
    }
    let freq = match kind {
        NavaidKind::Ndb => raw_freq as u64 * 1000,
        NavaidKind::Vor | NavaidKind::Loc | NavaidKind::Gs | NavaidKind::Dme => {
            raw_freq as u64 * 10_000
        }
        _ => raw_freq as u64,
    };
    let range = f.f64(5)? * NM2MET;

    if !is_valid_lat(lat) || !is_valid_lon(lon) || !is_valid_elev(elev) {
        return Err(RowError("position out of range"));
    }

    let uses_proc_id =
        matches!(kind, NavaidKind::Fpap | NavaidKind::Ltp | NavaidKind::Gls);
    let id = if uses_proc_id {
        String::new()
    } else {
        let id = f.s(7);
        if id.is_empty() || id.len() > 5 {
            return Err(RowError("bad identifier"));
        }
        id.to_string()
    };
    let name = match kind {
        NavaidKind::Loc | NavaidKind::Gs | NavaidKind::Dme => f.name_from(11),
        NavaidKind::Ndb | NavaidKind::Vor => f.name_from(10),
        _ => String::new(),
    };

    let pos = Position3::new(lat, lon, elev);
    Ok(Navaid {
        data,
        pos,
        ecef: geo2ecef(pos),
        freq,
        range,
        id,
        icao: f.s(8).to_string(),
        region: f.s(9).to_string(),
        name,
        xp_elev: OnceCell::new(),
        loc_align: OnceCell::new(),
    })
}

fn hz2mhz(freq: u64) -> f64 {
    freq as f64 / 1e6
}

fn hz2khz(freq: u64) -> f64 {
    freq as f64 / 1e3
}

fn parse_ndb(f: &Fields) -> Result<Option<Navaid>, RowError> {
    let nav = parse_common(f, NavaidKind::Ndb, 11, NavaidData::Ndb)?;
    if !is_valid_ndb_freq(hz2khz(nav.freq)) {
        return Err(RowError("NDB frequency out of band"));
    }
    Ok(Some(nav))
}

fn parse_vor(f: &Fields) -> Result<Option<Navaid>, RowError> {
    // TACAN rows share the VOR record code but not its channel plan.
    if f.s(f.toks.len() - 1) == "TACAN" {
        return Ok(None);
    }
    let magvar = f.f64(6)?;
    let nav = parse_common(f, NavaidKind::Vor, 11, NavaidData::Vor { magvar })?;
    if !is_valid_vor_freq(hz2mhz(nav.freq)) {
        return Err(RowError("VOR frequency out of band"));
    }
    Ok(Some(nav))
}

/// Localizer bearing column: either a plain true course, or the true course
/// with the rounded magnetic front course embedded as `mag * 360 + true`.
fn split_loc_brg(raw: f64) -> (f64, Option<f64>) {
    if raw > 360.0 {
        let mag = (raw / 360.0).floor();
        (raw - mag * 360.0, Some(mag))
    } else {
        (raw, None)
    }
}

fn parse_loc(f: &Fields) -> Result<Option<Navaid>, RowError> {
    let (brg, fcrs_mag) = split_loc_brg(f.f64(6)?);
    if !is_valid_hdg(brg) {
        return Err(RowError("bad localizer bearing"));
    }
    let data = NavaidData::Loc {
        brg,
        fcrs_mag,
        rwy_id: f.s(10).to_string(),
        ref_datum_dist: LOC_REF_DATUM_DFL,
    };
    let nav = parse_common(f, NavaidKind::Loc, 12, data)?;
    if !is_valid_loc_freq(hz2mhz(nav.freq)) {
        return Err(RowError("localizer frequency out of band"));
    }
    Ok(Some(nav))
}

/// Glideslope column 6 packs the path angle into the leading three digits:
/// `300231.273` is a 3.00 degree path on a 231.273 course.
fn split_gs_brg(raw: &str) -> Option<(f64, f64)> {
    if raw.len() <= 3 {
        return None;
    }
    let gs = raw.get(0..3)?.parse::<u32>().ok()? as f64 / 100.0;
    let brg = raw.get(3..)?.parse::<f64>().ok()?;
    Some((gs, brg))
}

fn parse_gs(f: &Fields) -> Result<Option<Navaid>, RowError> {
    let (gs, brg) =
        split_gs_brg(f.s(6)).ok_or(RowError("bad glideslope angle encoding"))?;
    if !is_valid_hdg(brg) || gs <= 0.0 || gs > 8.0 {
        return Err(RowError("glideslope geometry out of range"));
    }
    let data = NavaidData::Gs {
        brg,
        gs,
        rwy_id: f.s(10).to_string(),
    };
    let nav = parse_common(f, NavaidKind::Gs, 12, data)?;
    if !is_valid_loc_freq(hz2mhz(nav.freq)) {
        return Err(RowError("glideslope frequency out of band"));
    }
    Ok(Some(nav))
}

fn parse_mrk(f: &Fields, marker: MarkerKind) -> Result<Option<Navaid>, RowError> {
    let brg = f.f64(6)?;
    if !is_valid_hdg(brg) {
        return Err(RowError("bad marker bearing"));
    }
    let data = NavaidData::Mrk {
        brg,
        marker,
        rwy_id: f.s(10).to_string(),
    };
    Ok(Some(parse_common(f, NavaidKind::Mrk, 12, data)?))
}

fn parse_dme(f: &Fields) -> Result<Option<Navaid>, RowError> {
    if f.toks.len() >= 2 && f.s(f.toks.len() - 2) == "TACAN" {
        return Ok(None);
    }
    let bias = f.f64(6)? * NM2MET;
    let data = NavaidData::Dme {
        bias,
        arpt_id: f.s(10).to_string(),
    };
    let nav = parse_common(f, NavaidKind::Dme, 12, data)?;
    let mhz = hz2mhz(nav.freq);
    if !is_valid_vor_freq(mhz) && !is_valid_loc_freq(mhz) {
        return Err(RowError("DME frequency out of band"));
    }
    Ok(Some(nav))
}

fn parse_fpap(f: &Fields) -> Result<Option<Navaid>, RowError> {
    let perf = match f.s(11) {
        "LP" => FpapPerf::Lp,
        "LPV" => FpapPerf::Lpv,
        "APV-II" => FpapPerf::ApvII,
        "GLS" => FpapPerf::Gls,
        _ => return Err(RowError("unknown FPAP performance class")),
    };
    let crs = f.f64(6)?;
    if !is_valid_hdg(crs) {
        return Err(RowError("bad FPAP course"));
    }
    let data = NavaidData::Fpap {
        crs,
        proc_id: f.s(7).to_string(),
        rwy_id: f.s(10).to_string(),
        perf,
    };
    Ok(Some(parse_common(f, NavaidKind::Fpap, 12, data)?))
}

/// LTP and GLS rows encode course like the glideslope; a column value below
/// 1000 means "plain course, default 3.00 degree path".
fn split_gls_crs(raw: &str) -> Option<(f64, f64)> {
    let val = raw.parse::<f64>().ok()?;
    if val < 1000.0 {
        Some((3.0, val))
    } else {
        split_gs_brg(raw)
    }
}

fn parse_ltp(f: &Fields) -> Result<Option<Navaid>, RowError> {
    let prov = match f.s(11) {
        "WAAS" => LtpProvider::Waas,
        "EGNOS" => LtpProvider::Egnos,
        "MSAS" => LtpProvider::Msas,
        "GP" => LtpProvider::Gp,
        _ => return Err(RowError("unknown LTP provider")),
    };
    let (gs, crs) = split_gls_crs(f.s(6)).ok_or(RowError("bad LTP course encoding"))?;
    if !is_valid_hdg(crs) || gs <= 0.0 || gs > 8.0 {
        return Err(RowError("LTP geometry out of range"));
    }
    let data = NavaidData::Ltp {
        tch: f.f64(5)?,
        crs,
        gs,
        proc_id: f.s(7).to_string(),
        rwy_id: f.s(10).to_string(),
        prov,
    };
    Ok(Some(parse_common(f, NavaidKind::Ltp, 12, data)?))
}

fn parse_gls(f: &Fields) -> Result<Option<Navaid>, RowError> {
    let (gs, crs) = split_gls_crs(f.s(6)).ok_or(RowError("bad GLS course encoding"))?;
    if !is_valid_hdg(crs) || gs <= 0.0 || gs > 8.0 {
        return Err(RowError("GLS geometry out of range"));
    }
    let data = NavaidData::Gls {
        crs,
        gs,
        proc_id: f.s(7).to_string(),
        rwy_id: f.s(10).to_string(),
    };
    Ok(Some(parse_common(f, NavaidKind::Gls, 12, data)?))
}

/// Parses one data row. `Ok(None)` means the row is fine but carries nothing
/// we keep (blank line, unknown code, TACAN); `Err` means a malformed row
/// that the caller should log and skip.
pub fn parse_row(line: &str) -> Result<Option<Navaid>, RowError> {
    let toks: Vec<&str> = line.split_whitespace().collect();
    if toks.is_empty() {
        return Ok(None);
    }
    let f = Fields { toks: &toks };
    let code = match toks[0].parse::<u32>() {
        Ok(c) => c,
        Err(_) => return Err(RowError("bad record code")),
    };
    match code {
        2 => parse_ndb(&f),
        3 => parse_vor(&f),
        4 | 5 => parse_loc(&f),
        6 => parse_gs(&f),
        7 => parse_mrk(&f, MarkerKind::Outer),
        8 => parse_mrk(&f, MarkerKind::Middle),
        9 => parse_mrk(&f, MarkerKind::Inner),
        12 | 13 => parse_dme(&f),
        14 => parse_fpap(&f),
        15 => parse_gls(&f),
        16 => parse_ltp(&f),
        _ => Ok(None),
    }
}

/// Renders an NDB or VOR record back into its file-row form, primarily for
/// diagnostics. Only the kinds with a simple column-6 value are supported.
pub fn serialize_row(nav: &Navaid) -> String {
    let elev_ft = (nav.pos.elev / FEET2MET).round() as i64;
    let range_nm = nav.range / NM2MET;
    match &nav.data {
        NavaidData::Ndb => format!(
            "2 {:.8} {:.8} {} {} {:.0} 0.0 {} {} {} {}",
            nav.pos.lat,
            nav.pos.lon,
            elev_ft,
            nav.freq / 1000,
            range_nm,
            nav.id,
            nav.icao,
            nav.region,
            nav.name
        ),
        NavaidData::Vor { magvar } => format!(
            "3 {:.8} {:.8} {} {} {:.0} {:.3} {} {} {} {}",
            nav.pos.lat,
            nav.pos.lon,
            elev_ft,
            nav.freq / 10_000,
            range_nm,
            magvar,
            nav.id,
            nav.icao,
            nav.region,
            nav.name
        ),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    #[test]
    fn band_predicates() {
        assert!(is_valid_vor_freq(113.10));
        assert!(is_valid_vor_freq(108.20));
        assert!(!is_valid_vor_freq(108.10)); // odd tenth below 112 = LOC
        assert!(is_valid_vor_freq(112.10)); // odd tenths are VOR above 112
        assert!(!is_valid_vor_freq(107.95));
        assert!(!is_valid_vor_freq(118.00));

        assert!(is_valid_loc_freq(108.10));
        assert!(is_valid_loc_freq(111.95));
        assert!(!is_valid_loc_freq(108.20));
        assert!(!is_valid_loc_freq(112.10));

        assert!(is_valid_ndb_freq(375.0));
        assert!(!is_valid_ndb_freq(100.0));
    }

    #[test]
    fn act_freq_mapping() {
        assert_eq!(act_freq(NavaidKind::Gs, 110_300_000), 332_000_000);
        // 108 MHz maps to the bottom of the L-band window, 118 to the top.
        assert_eq!(act_freq(NavaidKind::Dme, 108_000_000), 1_041_000_000);
        assert_eq!(act_freq(NavaidKind::Dme, 118_000_000), 1_150_000_000);
        let mid = act_freq(NavaidKind::Dme, 113_000_000);
        assert_relative_eq!(mid as f64, 1_095_500_000.0, max_relative = 1e-9);
        assert_eq!(act_freq(NavaidKind::Vor, 113_000_000), 113_000_000);
    }

    #[test]
    fn parse_vor_row() {
        let line = "3  47.07447222  15.44130556   1070 11610  130     -2.0  GRZ ENRT LO GRAZ VOR-DME";
        let nav = parse_row(line).unwrap().unwrap();
        assert_eq!(nav.kind(), NavaidKind::Vor);
        assert_eq!(nav.freq, 116_100_000);
        assert_eq!(nav.id, "GRZ");
        assert_eq!(nav.region, "LO");
        assert_eq!(nav.name, "GRAZ VOR-DME");
        assert_relative_eq!(nav.range, 130.0 * NM2MET);
        match nav.data {
            NavaidData::Vor { magvar } => assert_abs_diff_eq!(magvar, -2.0),
            _ => unreachable!(),
        }
    }

    #[test]
    fn parse_loc_row_with_embedded_mag_course() {
        // 62648.973 = 174 * 360 + 8.973: mag course 174, true course 8.973
        let line =
            "4  47.80143889  12.99721944   1449 10950  18 62648.973 OEV LOWS 16 ILS-cat-II";
        let nav = parse_row(line).unwrap().unwrap();
        match &nav.data {
            NavaidData::Loc {
                brg,
                fcrs_mag,
                rwy_id,
                ref_datum_dist,
            } => {
                assert_relative_eq!(*brg, 8.973, max_relative = 1e-9);
                assert_eq!(*fcrs_mag, Some(174.0));
                assert_eq!(rwy_id, "16");
                assert_eq!(*ref_datum_dist, LOC_REF_DATUM_DFL);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn parse_gs_row() {
        let line = "6  47.78926111  12.98322500   1402 10950  10 300165.591 OEV LOWS 16 GS";
        let nav = parse_row(line).unwrap().unwrap();
        match &nav.data {
            NavaidData::Gs { brg, gs, .. } => {
                assert_abs_diff_eq!(*gs, 3.0);
                assert_relative_eq!(*brg, 165.591, max_relative = 1e-9);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn parse_dme_bias_and_tacan_skip() {
        let line = "12 47.07447222 15.44130556 1070 11610 130 0.2 GRZ ENRT LO DME-ILS";
        let nav = parse_row(line).unwrap().unwrap();
        match nav.data {
            NavaidData::Dme { bias, .. } => {
                assert_relative_eq!(bias, 0.2 * NM2MET)
            }
            _ => unreachable!(),
        }

        let tacan = "12 34.6 69.2 5877 11610 130 0.0 KBL OAKB OA TACAN CHANNEL";
        assert!(parse_row(tacan).unwrap().is_none());
    }

    #[test]
    fn malformed_rows_are_errors_not_panics() {
        assert!(parse_row("3 91.0 0.0 0 11610 130 0.0 AAA ENRT ZZ X").is_err());
        assert!(parse_row("3 nonsense").is_err());
        assert!(parse_row("2 47.0 15.0 1000 90 50 0.0 QQ ENRT LO Q NDB").is_err());
        // Unknown codes are silently ignored.
        assert!(parse_row("99 whatever else").unwrap().is_none());
        assert!(parse_row("").unwrap().is_none());
    }

    #[test]
    fn parse_round_trips_through_serialize() {
        let line = "3 47.07447222 15.44130556 1070 11610 130 -2.000 GRZ ENRT LO GRAZ VOR-DME";
        let nav = parse_row(line).unwrap().unwrap();
        let re = parse_row(&serialize_row(&nav)).unwrap().unwrap();
        assert_eq!(re.freq, nav.freq);
        assert_eq!(re.id, nav.id);
        assert_relative_eq!(re.pos.lat, nav.pos.lat, max_relative = 1e-9);
        assert_relative_eq!(re.range, nav.range, max_relative = 1e-9);
    }
}
