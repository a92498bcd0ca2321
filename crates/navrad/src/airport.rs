//! Airport database contract. The host supplies an implementation; the
//! library only uses it to reconcile localizer records with their runways.

use std::sync::Arc;

use serde::Serialize;

use crate::geo::Position;

#[derive(Debug, Clone, Serialize)]
pub struct RunwayEnd {
    /// Runway end designator, e.g. `35C`.
    pub id: String,
    /// Threshold position.
    pub thr: Position,
    /// True heading of the runway as seen from this end.
    pub hdg: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Runway {
    pub ends: [RunwayEnd; 2],
}

#[derive(Debug, Clone, Serialize)]
pub struct Airport {
    pub icao: String,
    pub runways: Vec<Runway>,
}

impl Airport {
    /// Finds the runway owning the named end, and which end it is.
    pub fn find_runway(&self, rwy_id: &str) -> Option<(&Runway, usize)> {
        for rwy in &self.runways {
            for (i, end) in rwy.ends.iter().enumerate() {
                if end.id == rwy_id {
                    return Some((rwy, i));
                }
            }
        }
        None
    }
}

/// Lookup interface. Implementations must be safe to call from the worker
/// thread; any internal locking for multi-runway reads is theirs to handle.
pub trait AirportDb: Send + Sync {
    fn lookup(&self, icao: &str) -> Option<Arc<Airport>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_runway_returns_end_index() {
        let arpt = Airport {
            icao: "LOWI".into(),
            runways: vec![Runway {
                ends: [
                    RunwayEnd {
                        id: "08".into(),
                        thr: Position::new(47.26, 11.33),
                        hdg: 76.0,
                    },
                    RunwayEnd {
                        id: "26".into(),
                        thr: Position::new(47.26, 11.36),
                        hdg: 256.0,
                    },
                ],
            }],
        };
        let (_, end) = arpt.find_runway("26").unwrap();
        assert_eq!(end, 1);
        assert!(arpt.find_runway("09").is_none());
    }
}
