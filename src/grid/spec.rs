//! Grid geometry.
//!
//! Axis conventions (shared by every producer and consumer of model files):
//!
//! - depth is stored **descending** (index 0 is the deepest node), so that the
//!   first axis runs with increasing radius like the solver's `r` index
//! - latitude and longitude are ascending
//!
//! Coordinates are generated as `min + i * step` with `step = (max - min) / (n - 1)`.
//! The formula is kept fixed so two runs on the same domain produce bit-identical
//! axes.

use crate::error::AppError;

/// Mean Earth radius used for depth <-> radius and degree <-> km conversions.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Length of one degree of arc on the reference sphere.
pub fn km_per_degree() -> f64 {
    2.0 * std::f64::consts::PI * EARTH_RADIUS_KM / 360.0
}

/// Immutable 3D spherical-shell grid.
#[derive(Debug, Clone, PartialEq)]
pub struct GridSpec {
    dep_range: (f64, f64),
    lat_range: (f64, f64),
    lon_range: (f64, f64),
    n_rtp: (usize, usize, usize),
    dep: Vec<f64>,
    lat: Vec<f64>,
    lon: Vec<f64>,
}

impl GridSpec {
    /// Build a grid from `(min, max)` ranges and `(n_dep, n_lat, n_lon)` node counts.
    pub fn new(
        dep_range: (f64, f64),
        lat_range: (f64, f64),
        lon_range: (f64, f64),
        n_rtp: (usize, usize, usize),
    ) -> Result<Self, AppError> {
        check_axis("depth", dep_range, n_rtp.0)?;
        check_axis("latitude", lat_range, n_rtp.1)?;
        check_axis("longitude", lon_range, n_rtp.2)?;
        if lat_range.0 < -90.0 || lat_range.1 > 90.0 {
            return Err(AppError::config(format!(
                "Latitude range [{}, {}] exceeds [-90, 90].",
                lat_range.0, lat_range.1
            )));
        }

        let mut dep = linspace(dep_range.0, dep_range.1, n_rtp.0);
        dep.reverse();
        let lat = linspace(lat_range.0, lat_range.1, n_rtp.1);
        let lon = linspace(lon_range.0, lon_range.1, n_rtp.2);

        Ok(Self {
            dep_range,
            lat_range,
            lon_range,
            n_rtp,
            dep,
            lat,
            lon,
        })
    }

    /// Depth axis (km), descending.
    pub fn dep(&self) -> &[f64] {
        &self.dep
    }

    /// Latitude axis (deg), ascending.
    pub fn lat(&self) -> &[f64] {
        &self.lat
    }

    /// Longitude axis (deg), ascending.
    pub fn lon(&self) -> &[f64] {
        &self.lon
    }

    /// Radius axis (km), ascending; same ordering as `dep`.
    pub fn radius(&self) -> Vec<f64> {
        self.dep.iter().map(|d| EARTH_RADIUS_KM - d).collect()
    }

    pub fn dep_range(&self) -> (f64, f64) {
        self.dep_range
    }

    pub fn lat_range(&self) -> (f64, f64) {
        self.lat_range
    }

    pub fn lon_range(&self) -> (f64, f64) {
        self.lon_range
    }

    /// `(n_dep, n_lat, n_lon)`.
    pub fn shape(&self) -> (usize, usize, usize) {
        self.n_rtp
    }

    pub fn n_nodes(&self) -> usize {
        self.n_rtp.0 * self.n_rtp.1 * self.n_rtp.2
    }

    /// Node spacing `(d_dep km, d_lat deg, d_lon deg)`, all positive.
    pub fn spacing(&self) -> (f64, f64, f64) {
        (
            step(self.dep_range, self.n_rtp.0),
            step(self.lat_range, self.n_rtp.1),
            step(self.lon_range, self.n_rtp.2),
        )
    }

    /// Physical length (km) of one index step along each axis.
    ///
    /// Longitude spacing is measured on the domain's central latitude.
    pub fn index_spacing_km(&self) -> [f64; 3] {
        let (dr, dt, dp) = self.spacing();
        let mid_lat = 0.5 * (self.lat_range.0 + self.lat_range.1);
        let lon_scale = mid_lat.to_radians().cos().abs().max(1e-6);
        [dr, dt * km_per_degree(), dp * km_per_degree() * lon_scale]
    }

    /// Whether a point lies inside the domain (bounds inclusive).
    pub fn contains(&self, dep: f64, lat: f64, lon: f64) -> bool {
        within(dep, self.dep_range) && within(lat, self.lat_range) && within(lon, self.lon_range)
    }

    /// Integer cell coordinates `(dep, lat, lon)` of a point, counted from the
    /// shallow / south / west corner. Points on the far boundary belong to the
    /// last cell, so in-domain indices stay in `0..=n-2`. Points outside the
    /// domain get indices outside that range rather than an error.
    pub fn cell_of(&self, dep: f64, lat: f64, lon: f64) -> (i64, i64, i64) {
        let (dr, dt, dp) = self.spacing();
        let (nr, nt, np) = self.n_rtp;
        (
            axis_cell(dep, self.dep_range, dr, nr),
            axis_cell(lat, self.lat_range, dt, nt),
            axis_cell(lon, self.lon_range, dp, np),
        )
    }
}

fn axis_cell(v: f64, range: (f64, f64), step: f64, n: usize) -> i64 {
    let idx = ((v - range.0) / step).floor() as i64;
    if within(v, range) { idx.clamp(0, n as i64 - 2) } else { idx }
}

fn check_axis(name: &str, range: (f64, f64), n: usize) -> Result<(), AppError> {
    if n < 2 {
        return Err(AppError::config(format!("Grid needs at least 2 {name} nodes, got {n}.")));
    }
    if !(range.0.is_finite() && range.1.is_finite()) || range.0 >= range.1 {
        return Err(AppError::config(format!(
            "Invalid {name} range [{}, {}]: must be finite with min < max.",
            range.0, range.1
        )));
    }
    Ok(())
}

fn step(range: (f64, f64), n: usize) -> f64 {
    (range.1 - range.0) / (n as f64 - 1.0)
}

fn linspace(min: f64, max: f64, n: usize) -> Vec<f64> {
    let d = step((min, max), n);
    (0..n).map(|i| min + i as f64 * d).collect()
}

fn within(v: f64, range: (f64, f64)) -> bool {
    v >= range.0 && v <= range.1
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> GridSpec {
        GridSpec::new((0.0, 100.0), (30.0, 40.0), (100.0, 110.0), (11, 11, 11)).unwrap()
    }

    #[test]
    fn axes_follow_conventions() {
        let g = grid();
        assert_eq!(g.dep()[0], 100.0);
        assert_eq!(g.dep()[10], 0.0);
        assert_eq!(g.lat()[0], 30.0);
        assert_eq!(g.lat()[10], 40.0);
        assert_eq!(g.lon()[0], 100.0);
        assert_eq!(g.lon()[10], 110.0);
        assert_eq!(g.radius()[0], EARTH_RADIUS_KM - 100.0);
    }

    #[test]
    fn rejects_degenerate_axes() {
        assert!(GridSpec::new((0.0, 100.0), (30.0, 40.0), (100.0, 110.0), (1, 11, 11)).is_err());
        assert!(GridSpec::new((10.0, 10.0), (30.0, 40.0), (100.0, 110.0), (2, 2, 2)).is_err());
        let err = GridSpec::new((0.0, 10.0), (40.0, 30.0), (100.0, 110.0), (2, 2, 2)).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Config);
    }

    #[test]
    fn axes_are_reproducible() {
        assert_eq!(grid(), grid());
    }

    #[test]
    fn cell_of_counts_from_corner() {
        let g = grid();
        assert_eq!(g.cell_of(15.0, 30.5, 109.99), (1, 0, 9));
        assert_eq!(g.cell_of(-1.0, 29.0, 111.0).0, -1);
    }

    #[test]
    fn far_boundary_falls_in_last_cell() {
        let g = grid();
        assert_eq!(g.cell_of(100.0, 40.0, 110.0), (9, 9, 9));
        assert_eq!(g.cell_of(95.0, 39.5, 109.5), (9, 9, 9));
        assert_eq!(g.cell_of(100.5, 40.5, 110.5), (10, 10, 10));

        let single = GridSpec::new((0.0, 100.0), (30.0, 36.0), (100.0, 106.0), (2, 2, 2)).unwrap();
        assert_eq!(single.cell_of(50.0, 33.0, 103.0), single.cell_of(100.0, 36.0, 106.0));
    }
}
