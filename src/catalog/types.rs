//! Catalog records.

use chrono::NaiveDateTime;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// One seismic event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    /// Index referenced by observations.
    pub id: usize,
    pub origin_time: NaiveDateTime,
    pub evla: f64,
    pub evlo: f64,
    /// Depth in km.
    pub evdp: f64,
    pub mag: f64,
    /// Number of observations attached to this source.
    pub num_rec: usize,
    pub event_name: String,
    pub weight: f64,
}

/// A receiver. Two observations naming the same station must agree on its
/// coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station {
    pub name: String,
    pub stla: f64,
    pub stlo: f64,
    /// Elevation in m.
    pub stel: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
pub enum DifferentialKind {
    /// Two receivers of one source (`cs`).
    #[value(name = "cs")]
    #[serde(rename = "cs")]
    CommonSource,
    /// Two sources recorded at one receiver (`cr`).
    #[value(name = "cr")]
    #[serde(rename = "cr")]
    CommonReceiver,
}

impl DifferentialKind {
    pub fn suffix(self) -> &'static str {
        match self {
            DifferentialKind::CommonSource => "cs",
            DifferentialKind::CommonReceiver => "cr",
        }
    }

    pub fn from_suffix(s: &str) -> Option<Self> {
        match s {
            "cs" => Some(DifferentialKind::CommonSource),
            "cr" => Some(DifferentialKind::CommonReceiver),
            _ => None,
        }
    }
}

/// What an observation measures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ObservationKind {
    /// Travel time from the source to `station`.
    Absolute,
    /// `tt(station) - tt(station2)` for the same source.
    CommonSource { rec_index2: usize, station2: Station },
    /// `tt(source) - tt(source2)` at the same station. The second event's
    /// coordinates are stored alongside its id.
    CommonReceiver {
        src_id2: usize,
        event_name2: String,
        evla2: f64,
        evlo2: f64,
        evdp2: f64,
    },
}

impl ObservationKind {
    pub fn differential(&self) -> Option<DifferentialKind> {
        match self {
            ObservationKind::Absolute => None,
            ObservationKind::CommonSource { .. } => Some(DifferentialKind::CommonSource),
            ObservationKind::CommonReceiver { .. } => Some(DifferentialKind::CommonReceiver),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub src_id: usize,
    /// Position within the source's observation list.
    pub rec_index: usize,
    pub station: Station,
    /// Seismic phase without any differential suffix.
    pub phase: String,
    /// Epicentral distance (deg), when known.
    pub dist_deg: Option<f64>,
    /// Travel time (s), or the time difference for differential records.
    pub tt: f64,
    pub weight: f64,
    /// Observed minus synthetic, once computed.
    pub residual: Option<f64>,
    pub kind: ObservationKind,
}

impl Observation {
    pub fn is_absolute(&self) -> bool {
        matches!(self.kind, ObservationKind::Absolute)
    }

    /// Ids of every source this record depends on.
    pub fn source_ids(&self) -> impl Iterator<Item = usize> {
        let second = match self.kind {
            ObservationKind::CommonReceiver { src_id2, .. } => Some(src_id2),
            _ => None,
        };
        std::iter::once(self.src_id).chain(second)
    }

    /// Every station this record depends on.
    pub fn stations(&self) -> impl Iterator<Item = &Station> {
        let second = match &self.kind {
            ObservationKind::CommonSource { station2, .. } => Some(station2),
            _ => None,
        };
        std::iter::once(&self.station).chain(second)
    }
}
