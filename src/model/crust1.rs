//! CRUST1.0 global crustal model.
//!
//! The model is distributed as three plain-text tables with one line per
//! 1°×1° cell and nine values per line (one per layer):
//!
//! - `crust1.vp`   P velocity (km/s)
//! - `crust1.vs`   S velocity (km/s)
//! - `crust1.bnds` elevation of each layer top (km, positive up)
//!
//! Layers are water, ice, three sediment layers, three crystalline crust
//! layers and the uppermost mantle. Cells run from 89.5°N southwards and,
//! inside each latitude row, from 179.5°W eastwards.
//!
//! The tables are read once per process and shared through [`Crust1Model::global`].

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use once_cell::sync::OnceCell;

use crate::error::AppError;
use crate::grid::GridSpec;
use crate::model::background::{BackgroundSample, VelocityType};

pub const N_LAYERS: usize = 9;
pub const N_LON: usize = 360;
pub const N_LAT: usize = 180;

/// Cells kept around the domain when cropping, in degrees.
const CROP_MARGIN_DEG: f64 = 2.0;

/// Offset placing a layer's bottom knot just above the next layer's top, so
/// velocity steps survive interpolation.
const BOTTOM_KNOT_OFFSET_KM: f64 = 1e-3;

static GLOBAL: OnceCell<Crust1Model> = OnceCell::new();

/// One 1°×1° column of the model.
#[derive(Debug, Clone, PartialEq)]
pub struct Crust1Cell {
    pub lon: f64,
    pub lat: f64,
    pub tops: [f64; N_LAYERS],
    pub vp: [f64; N_LAYERS],
    pub vs: [f64; N_LAYERS],
}

#[derive(Debug, Clone)]
pub struct Crust1Model {
    cells: Vec<Crust1Cell>,
}

impl Crust1Model {
    /// Process-wide instance, loaded from `dir` on first use.
    pub fn global(dir: &Path) -> Result<&'static Crust1Model, AppError> {
        GLOBAL.get_or_try_init(|| {
            tracing::info!(dir = %dir.display(), "loading CRUST1.0 tables");
            Self::from_dir(dir)
        })
    }

    pub fn from_dir(dir: &Path) -> Result<Self, AppError> {
        let open = |name: &str| {
            let path = dir.join(name);
            File::open(&path)
                .map(BufReader::new)
                .map_err(|e| AppError::io(format!("Failed to open CRUST1.0 table '{}': {e}", path.display())))
        };
        Self::from_readers(open("crust1.vp")?, open("crust1.vs")?, open("crust1.bnds")?)
    }

    /// Parse the three tables. Line `i` maps to the `i`-th cell in the
    /// north-to-south, west-to-east order; partial tables are accepted.
    pub fn from_readers(vp: impl BufRead, vs: impl BufRead, bnds: impl BufRead) -> Result<Self, AppError> {
        let vp = read_table("crust1.vp", vp)?;
        let vs = read_table("crust1.vs", vs)?;
        let tops = read_table("crust1.bnds", bnds)?;
        if vp.len() != vs.len() || vp.len() != tops.len() {
            return Err(AppError::format(format!(
                "CRUST1.0 tables disagree in length: vp {}, vs {}, bnds {}.",
                vp.len(),
                vs.len(),
                tops.len()
            )));
        }
        if vp.len() > N_LON * N_LAT {
            return Err(AppError::format(format!(
                "CRUST1.0 tables hold {} cells, at most {} expected.",
                vp.len(),
                N_LON * N_LAT
            )));
        }

        let cells = vp
            .into_iter()
            .zip(vs)
            .zip(tops)
            .enumerate()
            .map(|(i, ((vp, vs), tops))| {
                let (lon, lat) = cell_center(i);
                Crust1Cell { lon, lat, tops, vp, vs }
            })
            .collect();
        Ok(Self { cells })
    }

    pub fn from_cells(cells: Vec<Crust1Cell>) -> Self {
        Self { cells }
    }

    pub fn cells(&self) -> &[Crust1Cell] {
        &self.cells
    }

    /// Layer knots as scattered samples, optionally cropped to a grid domain
    /// (plus a small margin so the domain edges stay inside the sampled volume).
    pub fn knots(&self, vtype: VelocityType, crop: Option<&GridSpec>) -> Vec<BackgroundSample> {
        let mut out = Vec::new();
        for cell in &self.cells {
            let lon = match crop {
                Some(grid) => match place_longitude(cell.lon, grid.lon_range()) {
                    Some(lon) => lon,
                    None => continue,
                },
                None => cell.lon,
            };
            if let Some(grid) = crop {
                let (lo, hi) = grid.lat_range();
                if cell.lat < lo - CROP_MARGIN_DEG || cell.lat > hi + CROP_MARGIN_DEG {
                    continue;
                }
            }

            let values = match vtype {
                VelocityType::Vp => &cell.vp,
                VelocityType::Vs => &cell.vs,
            };
            push_cell_knots(&mut out, lon, cell.lat, &cell.tops, values, vtype);
        }
        out
    }
}

fn push_cell_knots(
    out: &mut Vec<BackgroundSample>,
    lon: f64,
    lat: f64,
    tops: &[f64; N_LAYERS],
    values: &[f64; N_LAYERS],
    vtype: VelocityType,
) {
    let mut knot = |depth: f64, value: f64| {
        out.push(BackgroundSample {
            lon,
            lat,
            depth,
            value,
            kind: Some(vtype),
        })
    };

    // Layer 0 is water.
    for layer in 1..N_LAYERS {
        let value = values[layer];
        if value <= 0.0 {
            continue;
        }
        let top = -tops[layer];
        if layer == N_LAYERS - 1 {
            knot(top, value);
            continue;
        }
        let bottom = -tops[layer + 1];
        let thickness = bottom - top;
        if thickness <= 0.0 {
            continue;
        }
        knot(top, value);
        if thickness > 2.0 * BOTTOM_KNOT_OFFSET_KM {
            knot(bottom - BOTTOM_KNOT_OFFSET_KM, value);
        }
    }
}

/// Centre of the `i`-th cell.
pub fn cell_center(i: usize) -> (f64, f64) {
    let row = i / N_LON;
    let col = i % N_LON;
    (-179.5 + col as f64, 89.5 - row as f64)
}

/// Shift a cell longitude by ±360° so it lands in the (margin-padded) domain.
fn place_longitude(lon: f64, domain: (f64, f64)) -> Option<f64> {
    let lo = domain.0 - CROP_MARGIN_DEG;
    let hi = domain.1 + CROP_MARGIN_DEG;
    [lon, lon - 360.0, lon + 360.0]
        .into_iter()
        .find(|&l| l >= lo && l <= hi)
}

fn read_table(name: &str, reader: impl BufRead) -> Result<Vec<[f64; N_LAYERS]>, AppError> {
    let mut rows = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| AppError::io(format!("Failed to read {name}: {e}")))?;
        if line.trim().is_empty() {
            continue;
        }
        let values: Vec<f64> = line
            .split_whitespace()
            .map(str::parse)
            .collect::<Result<_, _>>()
            .map_err(|e| AppError::format(format!("{name} line {}: {e}", idx + 1)))?;
        let row: [f64; N_LAYERS] = values.try_into().map_err(|v: Vec<f64>| {
            AppError::format(format!(
                "{name} line {}: expected {N_LAYERS} values, found {}.",
                idx + 1,
                v.len()
            ))
        })?;
        rows.push(row);
    }
    Ok(rows)
}
