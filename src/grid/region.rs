//! Optional sub-region of a grid (used to bound checkerboard perturbations).

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::grid::GridSpec;

/// Per-axis limits; `None` means "the whole axis".
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SubRegion {
    pub lon: Option<(f64, f64)>,
    pub lat: Option<(f64, f64)>,
    pub dep: Option<(f64, f64)>,
}

/// Limits resolved against a grid: every axis has a concrete `(lo, hi)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedRegion {
    pub lon: (f64, f64),
    pub lat: (f64, f64),
    pub dep: (f64, f64),
}

impl SubRegion {
    pub fn full() -> Self {
        Self::default()
    }

    /// Check the limits against the grid domain and fill unset axes.
    pub fn resolve(&self, grid: &GridSpec) -> Result<ResolvedRegion, AppError> {
        Ok(ResolvedRegion {
            lon: resolve_axis("longitude", self.lon, grid.lon_range())?,
            lat: resolve_axis("latitude", self.lat, grid.lat_range())?,
            dep: resolve_axis("depth", self.dep, grid.dep_range())?,
        })
    }
}

impl ResolvedRegion {
    pub fn contains(&self, dep: f64, lat: f64, lon: f64) -> bool {
        inside(lon, self.lon) && inside(lat, self.lat) && inside(dep, self.dep)
    }
}

// Tolerance for limits typed by hand that land a hair outside the domain.
const EDGE_TOL: f64 = 1e-9;

fn resolve_axis(name: &str, limits: Option<(f64, f64)>, domain: (f64, f64)) -> Result<(f64, f64), AppError> {
    let Some((lo, hi)) = limits else {
        return Ok(domain);
    };
    if !(lo.is_finite() && hi.is_finite()) || lo >= hi {
        return Err(AppError::validation(format!(
            "Invalid {name} bounds [{lo}, {hi}]: must be finite with lo < hi."
        )));
    }
    if lo < domain.0 - EDGE_TOL || hi > domain.1 + EDGE_TOL {
        return Err(AppError::validation(format!(
            "{name} bounds [{lo}, {hi}] fall outside the grid domain [{}, {}].",
            domain.0, domain.1
        )));
    }
    Ok((lo, hi))
}

fn inside(v: f64, range: (f64, f64)) -> bool {
    v >= range.0 - EDGE_TOL && v <= range.1 + EDGE_TOL
}
