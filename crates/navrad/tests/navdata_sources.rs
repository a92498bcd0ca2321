//! Multi-source database loading through the directory-tree entry point:
//! user overrides beat everything, the vendor file rewrites stale hand-placed
//! localizer channels, and unique records from every source coexist.

use std::fs;
use std::path::PathBuf;

use navrad::prelude::*;

const HEADER: &str = "I 1150 Version - data cycle\n";

struct TempTree {
    root: PathBuf,
}

impl TempTree {
    fn new(tag: &str) -> TempTree {
        let root = std::env::temp_dir().join(format!(
            "navrad-src-test-{}-{}",
            tag,
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&root);
        fs::create_dir_all(&root).unwrap();
        TempTree { root }
    }

    fn write(&self, rel: &[&str], rows: &str) {
        let mut path = self.root.clone();
        for comp in &rel[..rel.len() - 1] {
            path.push(comp);
        }
        fs::create_dir_all(&path).unwrap();
        path.push(rel[rel.len() - 1]);
        fs::write(&path, format!("{}{}99\n", HEADER, rows)).unwrap();
    }
}

impl Drop for TempTree {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.root);
    }
}

#[test]
fn source_precedence_and_vendor_rewrite() {
    let tree = TempTree::new("precedence");

    // User override: a VOR the default file also carries, on another
    // channel.
    tree.write(
        &["Custom Data", "user_nav.dat"],
        "3 47.0 15.0 1000 11610 130 -2.0 GRZ ENRT LO USER PLACED VOR\n",
    );
    // Hand-placed localizer from the global airports set, with a stale
    // frequency.
    tree.write(
        &["Custom Scenery", "Global Airports", "Earth nav data", "earth_nav.dat"],
        "4 47.1 15.1 1100 10950 18 90.0 IGRZ LOWG LO 09 ILS-cat-I\n",
    );
    // Vendor custom data: same localizer on the corrected channel, plus a
    // navaid nobody else has.
    tree.write(
        &["Custom Data", "earth_nav.dat"],
        "4 47.1 15.1 1100 10910 18 90.0 IGRZ LOWG LO 09 ILS-cat-I\n\
         2 46.8 15.2 900 375 50 0.0 GRA ENRT LO VENDOR NDB\n",
    );
    // Default data: duplicates the user VOR (must lose) and adds a DME.
    tree.write(
        &["Resources", "default data", "earth_nav.dat"],
        "3 47.0 15.0 1000 11630 130 -2.0 GRZ ENRT LO DEFAULT VOR\n\
         12 46.9 15.3 1000 11610 130 0.0 GRZ ENRT LO GRAZ DME\n",
    );

    let db = NavaidDb::open(&tree.root).unwrap();
    assert_eq!(db.len(), 4);

    // The user record held its channel and name.
    let vor = db
        .query(Position::new(47.0, 15.0), 50_000.0, Some("GRZ"), None,
            Some(NavaidKind::Vor.into()))
        .pop()
        .unwrap();
    assert_eq!(vor.freq, 116_100_000);
    assert_eq!(vor.name, "USER PLACED VOR");

    // The hand-placed localizer survived, but on the vendor's frequency.
    let loc = db
        .query(Position::new(47.1, 15.1), 50_000.0, Some("IGRZ"), None, None)
        .pop()
        .unwrap();
    assert_eq!(loc.freq, 109_100_000);

    // Unique records from vendor and default files both made it in.
    assert_eq!(
        db.query(Position::new(46.8, 15.2), 50_000.0, Some("GRA"), None, None)
            .len(),
        1
    );
    assert_eq!(
        db.query(
            Position::new(46.9, 15.3),
            50_000.0,
            None,
            None,
            Some(NavaidKind::Dme.into())
        )
        .len(),
        1
    );
}

#[test]
fn missing_sources_are_tolerated() {
    let tree = TempTree::new("partial");
    tree.write(
        &["Resources", "default data", "earth_nav.dat"],
        "3 47.0 15.0 1000 11610 130 -2.0 GRZ ENRT LO LONELY VOR\n",
    );
    let db = NavaidDb::open(&tree.root).unwrap();
    assert_eq!(db.len(), 1);
}

#[test]
fn no_usable_source_fails() {
    let tree = TempTree::new("empty");
    match NavaidDb::open(&tree.root) {
        Err(Error::NoUsableSource) => {}
        other => panic!("expected NoUsableSource, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn corrupt_header_does_not_count_as_usable() {
    let tree = TempTree::new("corrupt");
    let path = tree.root.join("Resources").join("default data");
    fs::create_dir_all(&path).unwrap();
    fs::write(path.join("earth_nav.dat"), "not a navaid file\n").unwrap();
    assert!(NavaidDb::open(&tree.root).is_err());
}
