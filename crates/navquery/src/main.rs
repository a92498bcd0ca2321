#![doc = include_str!("../readme.md")]

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use navrad::morse;
use navrad::navdata::{DataSource, KindMask, Navaid, NavaidDb, NavaidKind};
use navrad::prelude::Position;

#[derive(Debug, Parser)]
#[command(name = "navquery", version, about = "Inspect navaid database files")]
struct Options {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run a spatial/frequency query against a navaid file
    Query {
        /// Path to an earth_nav.dat style file
        file: PathBuf,

        /// Query center latitude, degrees
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,

        /// Query center longitude, degrees
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,

        /// Search radius, nautical miles
        #[arg(long, default_value_t = 300.0)]
        radius: f64,

        /// Exact identifier filter
        #[arg(long)]
        id: Option<String>,

        /// Frequency filter, MHz (use e.g. 0.375 for an NDB)
        #[arg(long)]
        freq: Option<f64>,

        /// Comma-separated kind filter: NDB,VOR,LOC,GS,MRK,DME,FPAP,LTP,GLS
        #[arg(long, value_delimiter = ',')]
        types: Vec<String>,

        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Parse a navaid file and report diagnostics
    Check {
        /// Path to an earth_nav.dat style file
        file: PathBuf,
    },

    /// Print the Morse keying pattern for a station identifier
    Morse {
        /// Identifier, up to five characters
        id: String,
    },
}

fn parse_kind(name: &str) -> Result<NavaidKind> {
    Ok(match name.to_ascii_uppercase().as_str() {
        "NDB" => NavaidKind::Ndb,
        "VOR" => NavaidKind::Vor,
        "LOC" => NavaidKind::Loc,
        "GS" => NavaidKind::Gs,
        "MRK" => NavaidKind::Mrk,
        "DME" => NavaidKind::Dme,
        "FPAP" => NavaidKind::Fpap,
        "LTP" => NavaidKind::Ltp,
        "GLS" => NavaidKind::Gls,
        other => bail!("unknown navaid kind {:?}", other),
    })
}

fn load_db(file: &PathBuf) -> Result<NavaidDb> {
    let fh = File::open(file)
        .with_context(|| format!("cannot open {}", file.display()))?;
    let mut db = NavaidDb::empty(None);
    let count = db.load_reader(
        BufReader::new(fh),
        DataSource::DefaultData,
        &file.display().to_string(),
    )?;
    db.dedup_airports();
    tracing::info!(records = count, "file loaded");
    Ok(db)
}

fn print_row(nav: &Navaid) {
    let freq = match nav.kind() {
        NavaidKind::Ndb => format!("{:7.1} kHz", nav.freq as f64 / 1e3),
        _ => format!("{:7.2} MHz", nav.freq as f64 / 1e6),
    };
    println!(
        "{:<5} {:<5} {:<4} {:>10.4} {:>11.4} {:>6.0} {} {}",
        nav.kind().to_string(),
        nav.id,
        nav.icao,
        nav.pos.lat,
        nav.pos.lon,
        nav.pos.elev,
        freq,
        nav.name
    );
}

#[allow(clippy::too_many_arguments)]
fn cmd_query(
    file: PathBuf,
    lat: f64,
    lon: f64,
    radius: f64,
    id: Option<String>,
    freq: Option<f64>,
    types: Vec<String>,
    json: bool,
) -> Result<()> {
    let db = load_db(&file)?;

    let mask = if types.is_empty() {
        None
    } else {
        let mut mask = KindMask(0);
        for name in &types {
            mask = mask | parse_kind(name)?.into();
        }
        Some(mask)
    };
    let freq_hz = freq.map(|mhz| (mhz * 1e6).round() as u64);

    let hits = db.query(
        Position::new(lat, lon),
        radius * 1852.0,
        id.as_deref(),
        freq_hz,
        mask,
    );

    if json {
        let records: Vec<&Navaid> = hits.iter().map(|nav| nav.as_ref()).collect();
        println!("{}", serde_json::to_string_pretty(&records)?);
    } else {
        for nav in &hits {
            print_row(nav);
        }
        eprintln!("{} navaids", hits.len());
    }
    Ok(())
}

fn cmd_check(file: PathBuf) -> Result<()> {
    let db = load_db(&file)?;
    if db.is_empty() {
        bail!("{}: no usable records", file.display());
    }
    println!("{}: {} records", file.display(), db.len());
    Ok(())
}

fn cmd_morse(id: String) -> Result<()> {
    let id = id.to_ascii_uppercase();
    for c in id.chars().take(5) {
        match morse::code_for(c) {
            Some(code) => {
                let glyphs: String = code
                    .chars()
                    .map(|s| if s == '1' { '.' } else { '-' })
                    .collect();
                println!("{}  {}", c, glyphs);
            }
            None => println!("{}  (no code)", c),
        }
    }
    let chunks = morse::encode_chunks(&id);
    let timeline: String = chunks
        .iter()
        .map(|&on| if on { '#' } else { '_' })
        .collect();
    println!("{}", timeline);
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    match Options::parse().cmd {
        Command::Query {
            file,
            lat,
            lon,
            radius,
            id,
            freq,
            types,
            json,
        } => cmd_query(file, lat, lon, radius, id, freq, types, json),
        Command::Check { file } => cmd_check(file),
        Command::Morse { id } => cmd_morse(id),
    }
}
