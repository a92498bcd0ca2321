//! End-to-end receiver scenarios over a synthetic world: a small navaid
//! database, flat terrain and a free-space path-loss model standing in for
//! the host's Longley-Rice implementation. Each test drives the fast loop
//! with simulated time while the real background worker refreshes
//! candidates on its own thread.

use std::io::Cursor;
use std::sync::Arc;
use std::thread::sleep;
use std::time::Duration;

use approx::{assert_abs_diff_eq, assert_relative_eq};

use navrad::navdata::DataSource;
use navrad::prelude::*;

const HEADER: &str = "I 1150 Version - data cycle 1802, build 20180207\n";

struct FlatTerrain {
    elev: f64,
}

impl TerrainProbe for FlatTerrain {
    fn probe(&self, pts: &[Position], _lin: bool) -> Option<TerrainSamples> {
        Some(TerrainSamples {
            elev: vec![self.elev; pts.len()],
            water: vec![0.0; pts.len()],
        })
    }
}

/// Free-space loss: no terrain shadowing, always line-of-sight. Good enough
/// to exercise the receiver chain with realistic magnitudes.
struct FreeSpace;

impl ItmModel for FreeSpace {
    fn point_to_point_mdh(&self, req: &ItmRequest<'_>) -> ItmOutput {
        let km = (req.dist / 1000.0).max(0.01);
        ItmOutput {
            dbloss: 32.45 + 20.0 * km.log10() + 20.0 * req.freq_mhz.log10(),
            propmode: PropMode::LineOfSight,
            delta_h: 0.0,
            result: ResultCode::Success,
        }
    }
}

/// Fixed path loss regardless of geometry; used to park a station at an
/// exact signal level.
struct FixedLoss(f64);

impl ItmModel for FixedLoss {
    fn point_to_point_mdh(&self, _req: &ItmRequest<'_>) -> ItmOutput {
        ItmOutput {
            dbloss: self.0,
            propmode: PropMode::LineOfSight,
            delta_h: 0.0,
            result: ResultCode::Success,
        }
    }
}

fn build_db(rows: &str) -> Arc<NavaidDb> {
    let mut db = NavaidDb::empty(None);
    db.load_reader(
        Cursor::new(format!("{}{}", HEADER, rows)),
        DataSource::DefaultData,
        "test",
    )
    .unwrap();
    db.dedup_airports();
    Arc::new(db)
}

fn radio_stack(
    rows: &str,
    terrain_elev: f64,
    itm: Arc<dyn ItmModel>,
) -> NavRadio {
    NavRadio::new(
        build_db(rows),
        Arc::new(FlatTerrain { elev: terrain_elev }),
        itm,
        Config::default(),
    )
    .unwrap()
}

fn pose_at(lat: f64, lon: f64, elev: f64) -> AircraftPose {
    AircraftPose {
        pos: Position3::new(lat, lon, elev),
        hdg: 0.0,
        pitch: 0.0,
        roll: 0.0,
        magvar: 0.0,
    }
}

/// Ticks simulated time forward in 50 ms steps up to `until` seconds.
fn run_floop(radio: &NavRadio, pose: &AircraftPose, from: f64, until: f64) -> f64 {
    let mut t = from;
    while t < until {
        radio.floop(pose, t);
        t += 0.05;
    }
    t
}

/// Lets the background worker observe the pose and produce candidates.
fn settle(radio: &NavRadio, pose: &AircraftPose) -> f64 {
    radio.floop(pose, 0.0);
    radio.floop(pose, 0.05);
    sleep(Duration::from_millis(700));
    run_floop(radio, pose, 0.1, 4.0)
}

#[test]
fn lone_vor_in_range() {
    let radio = radio_stack(
        "3 0.0 0.0 984 11310 100 0.0 ABC ENRT ZZ TESTVOR\n",
        0.0,
        Arc::new(FreeSpace),
    );
    radio.set_freq(RadioType::Vloc, 1, 113_100_000);
    radio.set_obs(1, 360.0);

    let pose = pose_at(0.1, 0.0, 3000.0);
    let t = settle(&radio, &pose);

    // The identifier must stay quiet before the 5..10 s delay has elapsed.
    assert_eq!(radio.get_id(RadioType::Vloc, 1), None);

    // Let the needle filters run well past their time constants.
    run_floop(&radio, &pose, t, 12.0);

    // Station south of us, heading north: relative bearing 180.
    let brg = radio.get_bearing(RadioType::Vloc, 1);
    assert_abs_diff_eq!(brg, 180.0, epsilon = 0.5);
    assert!(radio.have_bearing(RadioType::Vloc, 1));

    let radial = radio.get_radial(1);
    assert!(radial < 0.5 || radial > 359.5, "radial {}", radial);
    // The radial read just refreshed the selection, so the quality readout
    // reflects the VOR.
    assert!(radio.get_signal_quality(RadioType::Vloc, 1) > 0.99);

    assert!(!radio.is_loc(1));

    let (hdef, tofrom) = radio.get_hdef(1, true);
    assert_abs_diff_eq!(hdef, 0.0, epsilon = 0.1);
    assert!(tofrom);

    assert_eq!(radio.get_id(RadioType::Vloc, 1).as_deref(), Some("ABC"));
    radio.fini();
}

#[test]
fn co_channel_interference_blanks_receiver() {
    let radio = radio_stack(
        "3 0.1 0.0 0 11310 100 0.0 AAA ENRT ZZ NORTH VOR\n\
         3 -0.1 0.0 0 11310 100 0.0 BBB ENRT ZZ SOUTH VOR\n",
        0.0,
        Arc::new(FreeSpace),
    );
    radio.set_freq(RadioType::Vloc, 1, 113_100_000);

    // Equidistant from both stations: signals within the 16 dB limit.
    let pose = pose_at(0.0, 0.0, 3000.0);
    run_floop(&radio, &pose, settle(&radio, &pose), 12.0);

    assert!(radio.get_bearing(RadioType::Vloc, 1).is_nan());
    assert_eq!(radio.get_id(RadioType::Vloc, 1), None);
    radio.fini();
}

#[test]
fn loc_course_and_back_course_sensing() {
    // Localizer at the origin, front course 090 (approach from the west).
    let rows = "4 0.0 0.0 0 10950 18 90.0 ITST XYZA ZZ 09 ILS-cat-I\n";
    let sector = libm::atan(106.9 / 2450.0).to_degrees();

    // Front side, offset north of the centerline by 0.3 sector widths.
    let offset = 0.3 * sector;
    // 10 km west of the antenna, displaced north by the offset angle.
    let west = 10_000.0 / 111_120.0; /* degrees of arc, roughly */
    let north = west * libm::tan(offset.to_radians());

    let radio = radio_stack(rows, 0.0, Arc::new(FreeSpace));
    radio.set_freq(RadioType::Vloc, 1, 109_500_000);
    let pose = pose_at(north, -west, 600.0);
    run_floop(&radio, &pose, settle(&radio, &pose), 10.0);

    assert!(radio.is_loc(1));
    let ddm_front = radio.get_loc_ddm(1);
    assert_relative_eq!(ddm_front.abs(), 0.3 * 0.155, max_relative = 0.12);
    let (hdef_front, _) = radio.get_hdef(1, true);
    assert_abs_diff_eq!(hdef_front, ddm_front / 0.0775, epsilon = 0.25);
    assert_abs_diff_eq!(radio.get_fcrs(1), 90.0);
    radio.fini();

    // Back side, same geographic displacement (north of the extended
    // centerline, now east of the antenna): reverse sensing yields a DDM of
    // the same sign, so a pilot holding the front course sees the mirror.
    let radio = radio_stack(rows, 0.0, Arc::new(FreeSpace));
    radio.set_freq(RadioType::Vloc, 1, 109_500_000);
    let pose = pose_at(north, west, 600.0);
    run_floop(&radio, &pose, settle(&radio, &pose), 10.0);

    let ddm_back = radio.get_loc_ddm(1);
    assert_relative_eq!(ddm_back.abs(), 0.3 * 0.155, max_relative = 0.12);
    assert_eq!(ddm_front.signum(), ddm_back.signum());
    radio.fini();
}

#[test]
fn dme_handoff_and_accuracy() {
    let rows = "12 0.0 0.0 0 10900 18 0.0 IDME XYZA ZZ XYZA DME-ILS\n";
    let radio = radio_stack(rows, 0.0, Arc::new(FreeSpace));
    radio.set_freq(RadioType::Vloc, 1, 109_000_000);

    let pose = pose_at(0.09, 0.0, 3000.0);
    // Within the retune hold-off the distance must be unavailable.
    radio.floop(&pose, 0.0);
    radio.floop(&pose, 0.05);
    assert!(radio.get_dme(RadioType::Vloc, 1).is_nan());

    sleep(Duration::from_millis(700));
    run_floop(&radio, &pose, 0.1, 10.0);

    let dme = radio.get_dme(RadioType::Vloc, 1);
    assert!(!dme.is_nan());
    // True slant range from the ECEF geometry the receiver measures over.
    let acf = navrad::geo::geo2ecef(pose.pos);
    let sta = navrad::geo::geo2ecef(Position3::new(0.0, 0.0, 0.0));
    let slant = acf.sub(&sta).abs();
    assert!((dme - slant).abs() < 50.0, "dme {} slant {}", dme, slant);
    assert!(radio.get_signal_quality(RadioType::Vloc, 1) > 0.99);
    radio.fini();
}

#[test]
fn glide_slope_on_path() {
    // 3.00 degree glideslope on course 090, station elevation 300 m.
    let rows = "6 0.0 0.0 984 10950 10 300090.000 ITST XYZA ZZ 09 GS\n";
    let radio = radio_stack(rows, 300.0, Arc::new(FreeSpace));
    radio.set_freq(RadioType::Vloc, 1, 109_500_000);

    // 3 NM west, on the nominal path measured from the antenna (3 m above
    // the 300 m station elevation).
    let dist = 3.0 * 1852.0;
    let m_per_deg = navrad::geo::EARTH_MSL.to_radians();
    let west = dist / m_per_deg;
    let elev = 300.0 + 3.0 + libm::tan(3.0f64.to_radians()) * dist;
    let pose = pose_at(0.0, -west, elev);
    run_floop(&radio, &pose, settle(&radio, &pose), 10.0);

    assert_abs_diff_eq!(radio.get_gs(1), 3.0);
    assert_abs_diff_eq!(radio.get_vdef(1), 0.0, epsilon = 0.1);
    assert_abs_diff_eq!(radio.get_gp_ddm(1), 0.0, epsilon = 0.03);
    radio.fini();
}

#[test]
fn squelch_gates_weak_station() {
    // Park the only station at -75 dB: audible as noise, but below the
    // -73 dB identifier floor, so squelch closes the channel entirely.
    let rows = "3 0.1 0.0 0 11310 100 0.0 WKK ENRT ZZ WEAK VOR\n";
    let radio = radio_stack(rows, 0.0, Arc::new(FixedLoss(167.0)));
    radio.set_freq(RadioType::Vloc, 1, 113_100_000);

    let pose = pose_at(0.0, 0.0, 3000.0);
    run_floop(&radio, &pose, settle(&radio, &pose), 8.0);

    let buf = radio
        .get_audio_buf2(RadioType::Vloc, 1, 1.0, true, true, 0)
        .unwrap();
    assert!(!buf.is_empty());
    assert!(buf.iter().all(|&s| s == 0));
    radio.fini();
}

#[test]
fn adf_relative_bearing() {
    let rows = "2 0.0 0.0 0 375 50 0.0 NDB ENRT ZZ TEST NDB\n";
    let radio = radio_stack(rows, 0.0, Arc::new(FreeSpace));
    radio.set_freq(RadioType::Adf, 1, 375_000);

    let pose = pose_at(0.1, 0.0, 3000.0);
    run_floop(&radio, &pose, settle(&radio, &pose), 10.0);

    // Station dead astern while heading north.
    let brg = radio.get_bearing(RadioType::Adf, 1);
    assert_abs_diff_eq!(brg, 180.0, epsilon = 2.0);

    // Antenna mode parks the needle.
    radio.set_adf_mode(1, AdfMode::Ant);
    run_floop(&radio, &pose, 10.0, 18.0);
    assert_abs_diff_eq!(radio.get_bearing(RadioType::Adf, 1), 90.0, epsilon = 1.5);
    radio.fini();
}

#[test]
fn failed_radio_goes_dark() {
    let rows = "3 0.1 0.0 0 11310 100 0.0 ABC ENRT ZZ TESTVOR\n";
    let radio = radio_stack(rows, 0.0, Arc::new(FreeSpace));
    radio.set_freq(RadioType::Vloc, 1, 113_100_000);

    let pose = pose_at(0.0, 0.0, 3000.0);
    let t = settle(&radio, &pose);
    assert!(!radio.get_bearing(RadioType::Vloc, 1).is_nan());

    radio.set_failed(RadioType::Vloc, 1, true);
    run_floop(&radio, &pose, t, t + 2.0);

    assert_eq!(radio.get_freq(RadioType::Vloc, 1), 0);
    assert!(radio.get_bearing(RadioType::Vloc, 1).is_nan());
    assert_eq!(radio.get_signal_quality(RadioType::Vloc, 1), 0.0);
    assert!(radio
        .get_audio_buf2(RadioType::Vloc, 1, 1.0, false, true, 0)
        .is_none());
    radio.fini();
}

#[test]
fn audio_stream_length_and_morse_energy() {
    let rows = "3 0.05 0.0 0 11310 100 0.0 EEE ENRT ZZ LOUD VOR\n";
    let radio = radio_stack(rows, 0.0, Arc::new(FreeSpace));
    radio.set_freq(RadioType::Vloc, 1, 113_100_000);

    let pose = pose_at(0.0, 0.0, 3000.0);
    run_floop(&radio, &pose, settle(&radio, &pose), 8.0);

    // Pull a few seconds of audio: buffers keep their nominal length and,
    // with a strong keyed station plus the noise floor, the stream carries
    // energy once the pipeline has filled.
    let mut energy = 0i64;
    for _ in 0..40 {
        let buf = radio
            .get_audio_buf2(RadioType::Vloc, 1, 1.0, false, true, 0)
            .unwrap();
        assert_eq!(buf.len(), 4800);
        energy += buf.iter().map(|&s| (s as i64).abs()).sum::<i64>();
    }
    assert!(energy > 0);

    radio.sync_streams(RadioType::Vloc, 1);
    radio.done_audio(1);
    radio.fini();
}

#[test]
fn debug_profile_capture() {
    let rows = "3 0.1 0.0 0 11310 100 0.0 ABC ENRT ZZ TESTVOR\n";
    let radio = radio_stack(rows, 0.0, Arc::new(FreeSpace));
    radio.set_freq(RadioType::Vloc, 1, 113_100_000);
    radio.set_debug_navaid(Some(navrad::ProfileDebugSel {
        rtype: RadioType::Vloc,
        nr: 1,
        kind: NavaidKind::Vor,
        id: "ABC".into(),
    }));

    let pose = pose_at(0.0, 0.0, 3000.0);
    radio.floop(&pose, 0.0);
    radio.floop(&pose, 0.05);
    sleep(Duration::from_millis(700));

    let prof = radio.get_debug_profile().expect("profile captured");
    assert!(prof.elev.len() >= 2);
    assert_abs_diff_eq!(prof.acf_alt, 3000.0, epsilon = 1.0);
    assert_eq!(prof.freq, 113_100_000);
    assert!(prof.dist > 10_000.0 && prof.dist < 12_000.0);
    radio.fini();
}
