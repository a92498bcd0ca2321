//! Minimal end-to-end receiver drive: a two-station world, a flat-terrain
//! probe and a free-space stand-in for the Longley-Rice model. Prints the
//! cockpit outputs once a second while the fast loop ticks.
//!
//! Run with `cargo run --example receiver`.

use std::io::Cursor;
use std::sync::Arc;
use std::thread::sleep;
use std::time::Duration;

use navrad::navdata::DataSource;
use navrad::prelude::*;

struct FlatTerrain;

impl TerrainProbe for FlatTerrain {
    fn probe(&self, pts: &[Position], _lin: bool) -> Option<TerrainSamples> {
        Some(TerrainSamples {
            elev: vec![0.0; pts.len()],
            water: vec![0.0; pts.len()],
        })
    }
}

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

const WORLD: &str = "I 1150 Version - demo\n\
    3 47.00000 15.00000 1148 11310 130 -2.0 DEM ENRT LO DEMO VOR\n\
    2 47.20000 15.10000 984 375 50 0.0 DNB ENRT LO DEMO NDB\n\
    99\n";

fn main() -> Result<(), Error> {
    let mut db = NavaidDb::empty(None);
    db.load_reader(Cursor::new(WORLD), DataSource::DefaultData, "demo world")?;
    db.dedup_airports();

    let radio = NavRadio::new(
        Arc::new(db),
        Arc::new(FlatTerrain),
        Arc::new(FreeSpace),
        Config::default(),
    )?;
    radio.set_freq(RadioType::Vloc, 1, 113_100_000);
    radio.set_freq(RadioType::Adf, 1, 375_000);
    radio.set_obs(1, 185.0);

    // Hold position 12 km north of the VOR, pointed at it.
    let pose = AircraftPose {
        pos: Position3::new(47.108, 15.0, 2500.0),
        hdg: 185.0,
        pitch: 0.0,
        roll: 0.0,
        magvar: -2.0,
    };

    for tick in 0..240u32 {
        let now = tick as f64 * 0.05;
        radio.floop(&pose, now);
        sleep(Duration::from_millis(50));

        if tick % 20 == 19 {
            let (hdef, tofrom) = radio.get_hdef(1, true);
            println!(
                "t={:5.1}s brg={:6.1} radial={:6.1} hdef={:+5.2} {} q={:4.2} adf={:6.1}",
                now,
                radio.get_bearing(RadioType::Vloc, 1),
                radio.get_radial(1),
                hdef,
                if tofrom { "TO" } else { "FROM" },
                radio.get_signal_quality(RadioType::Vloc, 1),
                radio.get_bearing(RadioType::Adf, 1),
            );
        }
    }

    match radio.get_id(RadioType::Vloc, 1) {
        Some(id) => println!("station identified: {}", id),
        None => println!("no station identified yet"),
    }

    // Pull one audio buffer to show the synthesis path end to end.
    if let Some(buf) = radio.get_audio_buf(RadioType::Vloc, 1, 0.8, false, true) {
        let peak = buf.iter().map(|&s| (s as i32).abs()).max().unwrap_or(0);
        println!("audio: {} samples, peak {}", buf.len(), peak);
    }

    radio.fini();
    Ok(())
}
