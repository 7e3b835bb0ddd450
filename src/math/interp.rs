//! Scattered-data interpolation in 3D.
//!
//! Samples and query points are given as `(lon, lat, depth)` and mapped to
//! Earth-centred Cartesian coordinates (km) before any distance is measured, so
//! degrees and kilometres never mix.
//!
//! Two methods are available:
//!
//! - `Nearest`: value of the closest sample
//! - `Linear`: barycentric weights of a tetrahedron of nearby samples that
//!   encloses the query point; when no enclosing tetrahedron exists (the point
//!   is outside the sampled volume) the nearest sample is used instead
//!
//! Layered backgrounds such as CRUST1.0 store a vertical column of depth knots
//! per surface cell. Nearby samples of such data all sit in one column and
//! never enclose anything, so column-structured sets are interpolated in two
//! steps instead: barycentric in lon/lat across a triangle of columns, then
//! linear in depth inside each column, clamped to the column ends.
//!
//! A query that coincides with a sample returns that sample exactly in both
//! modes.

use std::collections::BTreeMap;

use clap::ValueEnum;
use nalgebra::{Matrix2, Matrix3, Vector2, Vector3};
use serde::{Deserialize, Serialize};

use crate::grid::EARTH_RADIUS_KM;
use crate::math::kdtree::KdTree;

/// Candidate neighbours examined when looking for an enclosing tetrahedron.
const LINEAR_NEIGHBOURS: usize = 10;

/// Barycentric coordinates down to this value still count as "inside".
const INSIDE_TOL: f64 = -1e-9;

/// Squared distance (km²) under which a query snaps to a sample.
const EXACT_HIT_KM2: f64 = 1e-18;

/// Candidate columns examined when looking for an enclosing triangle.
const COLUMN_NEIGHBOURS: usize = 8;

/// Horizontal offset (deg) under which a query sits on a column.
const COLUMN_HIT_DEG: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum InterpMethod {
    Nearest,
    #[default]
    Linear,
}

/// Sample indices and weights that reconstruct a value at one query point.
#[derive(Debug, Clone, PartialEq)]
pub struct Stencil {
    pub entries: Vec<(usize, f64)>,
    /// `true` when the linear method had to fall back to the nearest sample.
    pub extrapolated: bool,
}

impl Stencil {
    pub fn apply(&self, values: &[f64]) -> f64 {
        self.entries.iter().map(|&(i, w)| values[i] * w).sum()
    }
}

/// Map geographic coordinates to Cartesian km.
pub fn to_cartesian(lon: f64, lat: f64, depth: f64) -> [f64; 3] {
    let r = EARTH_RADIUS_KM - depth;
    let (slat, clat) = lat.to_radians().sin_cos();
    let (slon, clon) = lon.to_radians().sin_cos();
    [r * clat * clon, r * clat * slon, r * slat]
}

/// Longitude difference folded into `[-180, 180)`.
fn wrap_deg(d: f64) -> f64 {
    (d + 180.0).rem_euclid(360.0) - 180.0
}

/// Samples sharing one surface position, sorted by depth.
#[derive(Debug, Clone)]
struct Column {
    lon: f64,
    lat: f64,
    knots: Vec<(f64, usize)>,
}

impl Column {
    /// Linear in depth between the bracketing knots; the flag is set when the
    /// depth lies outside the column and the end knot is used.
    fn weights(&self, depth: f64) -> (Vec<(usize, f64)>, bool) {
        let (first, last) = match (self.knots.first(), self.knots.last()) {
            (Some(&f), Some(&l)) => (f, l),
            _ => return (Vec::new(), true),
        };
        if depth <= first.0 {
            return (vec![(first.1, 1.0)], depth < first.0);
        }
        if depth >= last.0 {
            return (vec![(last.1, 1.0)], depth > last.0);
        }
        let upper = self.knots.partition_point(|&(d, _)| d <= depth);
        let (d0, i0) = self.knots[upper - 1];
        let (d1, i1) = self.knots[upper];
        if d0 == depth || d1 <= d0 {
            return (vec![(i0, 1.0)], false);
        }
        let t = (depth - d0) / (d1 - d0);
        (vec![(i0, 1.0 - t), (i1, t)], false)
    }
}

/// Column view of a sample set plus a surface index over the columns.
#[derive(Debug, Clone)]
struct ColumnIndex {
    columns: Vec<Column>,
    tree: KdTree,
}

impl ColumnIndex {
    /// `None` unless the samples average at least two knots per column.
    fn detect(locations: &[(f64, f64, f64)]) -> Option<Self> {
        let mut groups: BTreeMap<(u64, u64), Column> = BTreeMap::new();
        for (idx, &(lon, lat, dep)) in locations.iter().enumerate() {
            groups
                .entry((lon.to_bits(), lat.to_bits()))
                .or_insert_with(|| Column {
                    lon,
                    lat,
                    knots: Vec::new(),
                })
                .knots
                .push((dep, idx));
        }
        if groups.is_empty() || groups.len() * 2 > locations.len() {
            return None;
        }
        let columns: Vec<Column> = groups
            .into_values()
            .map(|mut c| {
                c.knots.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
                c
            })
            .collect();
        let surface = columns.iter().map(|c| to_cartesian(c.lon, c.lat, 0.0)).collect();
        Some(Self {
            columns,
            tree: KdTree::build(surface),
        })
    }

    fn stencil(&self, lon: f64, lat: f64, depth: f64) -> Option<Stencil> {
        let neighbours = self.tree.k_nearest(to_cartesian(lon, lat, 0.0), COLUMN_NEIGHBOURS);
        let &(nearest, _) = neighbours.first()?;

        let (horizontal, outside) = match self.enclosing_triangle(lon, lat, &neighbours) {
            Some(h) => (h, false),
            None => (vec![(nearest, 1.0)], true),
        };

        let mut entries = Vec::new();
        let mut clamped = false;
        for (col, wh) in horizontal {
            if wh == 0.0 {
                continue;
            }
            let (vertical, c) = self.columns[col].weights(depth);
            clamped |= c;
            entries.extend(vertical.into_iter().map(|(i, wv)| (i, wh * wv)));
        }
        Some(Stencil {
            entries,
            extrapolated: outside || clamped,
        })
    }

    /// Barycentric weights in lon/lat degrees of the first triangle of
    /// candidate columns that contains the query.
    fn enclosing_triangle(&self, lon: f64, lat: f64, neighbours: &[(usize, f64)]) -> Option<Vec<(usize, f64)>> {
        let offset = |col: usize| {
            let c = &self.columns[col];
            Vector2::new(wrap_deg(c.lon - lon), c.lat - lat)
        };

        let (first, _) = *neighbours.first()?;
        if offset(first).norm() <= COLUMN_HIT_DEG {
            return Some(vec![(first, 1.0)]);
        }

        let n = neighbours.len();
        if n < 3 {
            return None;
        }
        let extent = offset(neighbours[n - 1].0).norm().max(f64::MIN_POSITIVE);
        let det_floor = 1e-10 * extent * extent;

        for a in 0..n - 2 {
            for b in a + 1..n - 1 {
                for c in b + 1..n {
                    let ids = [neighbours[a].0, neighbours[b].0, neighbours[c].0];
                    let (p0, p1, p2) = (offset(ids[0]), offset(ids[1]), offset(ids[2]));
                    let t = Matrix2::from_columns(&[p1 - p0, p2 - p0]);
                    if t.determinant().abs() <= det_floor {
                        continue;
                    }
                    let Some(l) = t.lu().solve(&(-p0)) else {
                        continue;
                    };
                    let lambda = [1.0 - l[0] - l[1], l[0], l[1]];
                    if lambda.iter().all(|&v| v.is_finite() && v >= INSIDE_TOL) {
                        return Some(ids.into_iter().zip(lambda).collect());
                    }
                }
            }
        }
        None
    }
}

/// Spatial index over a fixed set of scattered sample locations.
#[derive(Debug, Clone)]
pub struct ScatteredInterpolator {
    tree: KdTree,
    columns: Option<ColumnIndex>,
}

impl ScatteredInterpolator {
    /// `locations` are `(lon, lat, depth)` triples.
    pub fn new(locations: &[(f64, f64, f64)]) -> Self {
        let points = locations
            .iter()
            .map(|&(lon, lat, dep)| to_cartesian(lon, lat, dep))
            .collect();
        Self {
            tree: KdTree::build(points),
            columns: ColumnIndex::detect(locations),
        }
    }

    /// Whether linear queries go through the column path.
    pub fn is_column_structured(&self) -> bool {
        self.columns.is_some()
    }

    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Stencil for one query point; `None` only when there are no samples.
    pub fn stencil(&self, lon: f64, lat: f64, depth: f64, method: InterpMethod) -> Option<Stencil> {
        let q = to_cartesian(lon, lat, depth);
        let k = match method {
            InterpMethod::Nearest => 1,
            InterpMethod::Linear => LINEAR_NEIGHBOURS,
        };
        let neighbours = self.tree.k_nearest(q, k);
        let &(nearest, d2) = neighbours.first()?;

        let nearest_only = |extrapolated| Stencil {
            entries: vec![(nearest, 1.0)],
            extrapolated,
        };

        if method == InterpMethod::Nearest || d2 <= EXACT_HIT_KM2 {
            return Some(nearest_only(false));
        }

        if let Some(columns) = &self.columns {
            return columns.stencil(lon, lat, depth);
        }

        match self.enclosing_tetrahedron(q, &neighbours) {
            Some(entries) => Some(Stencil {
                entries,
                extrapolated: false,
            }),
            None => Some(nearest_only(true)),
        }
    }

    /// First enclosing tetrahedron in lexicographic order of neighbour rank,
    /// which favours the closest samples.
    fn enclosing_tetrahedron(&self, q: [f64; 3], neighbours: &[(usize, f64)]) -> Option<Vec<(usize, f64)>> {
        let n = neighbours.len();
        if n < 4 {
            return None;
        }
        let scale = neighbours[n - 1].1.max(f64::MIN_POSITIVE).sqrt();
        let det_floor = 1e-10 * scale * scale * scale;

        for a in 0..n - 3 {
            for b in a + 1..n - 2 {
                for c in b + 1..n - 1 {
                    for d in c + 1..n {
                        let ids = [neighbours[a].0, neighbours[b].0, neighbours[c].0, neighbours[d].0];
                        if let Some(lambda) = self.barycentric(q, ids, det_floor) {
                            if lambda.iter().all(|&l| l >= INSIDE_TOL) {
                                return Some(ids.into_iter().zip(lambda).collect());
                            }
                        }
                    }
                }
            }
        }
        None
    }

    fn barycentric(&self, q: [f64; 3], ids: [usize; 4], det_floor: f64) -> Option<[f64; 4]> {
        let p0 = Vector3::from(self.tree.point(ids[0]));
        let p1 = Vector3::from(self.tree.point(ids[1]));
        let p2 = Vector3::from(self.tree.point(ids[2]));
        let p3 = Vector3::from(self.tree.point(ids[3]));

        let t = Matrix3::from_columns(&[p1 - p0, p2 - p0, p3 - p0]);
        if t.determinant().abs() <= det_floor {
            return None;
        }
        let l = t.lu().solve(&(Vector3::from(q) - p0))?;
        if !l.iter().all(|v| v.is_finite()) {
            return None;
        }
        Some([1.0 - l[0] - l[1] - l[2], l[0], l[1], l[2]])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lattice() -> (Vec<(f64, f64, f64)>, Vec<f64>) {
        let mut locs = Vec::new();
        let mut vals = Vec::new();
        for i in 0..4 {
            for j in 0..4 {
                for k in 0..4 {
                    let (lon, lat, dep) = (100.0 + i as f64, 30.0 + j as f64, k as f64 * 20.0);
                    locs.push((lon, lat, dep));
                    vals.push(5.0 + 0.01 * dep);
                }
            }
        }
        (locs, vals)
    }

    #[test]
    fn nearest_hits_sample_exactly() {
        let (locs, vals) = lattice();
        let interp = ScatteredInterpolator::new(&locs);
        for (idx, &(lon, lat, dep)) in locs.iter().enumerate() {
            let s = interp.stencil(lon, lat, dep, InterpMethod::Nearest).unwrap();
            assert_eq!(s.apply(&vals), vals[idx]);
            let s = interp.stencil(lon, lat, dep, InterpMethod::Linear).unwrap();
            assert_eq!(s.apply(&vals), vals[idx]);
        }
    }

    #[test]
    fn linear_reproduces_depth_gradient_inside_hull() {
        let (locs, vals) = lattice();
        let interp = ScatteredInterpolator::new(&locs);
        let s = interp.stencil(101.5, 31.5, 30.0, InterpMethod::Linear).unwrap();
        assert!(!s.extrapolated);
        let weight_sum: f64 = s.entries.iter().map(|(_, w)| w).sum();
        assert!((weight_sum - 1.0).abs() < 1e-9);
        // Depth is not linear in Cartesian space; the chord sagitta bounds the error.
        assert!((s.apply(&vals) - 5.3).abs() < 1e-2, "got {}", s.apply(&vals));
    }

    #[test]
    fn linear_falls_back_to_nearest_outside_hull() {
        let (locs, vals) = lattice();
        let interp = ScatteredInterpolator::new(&locs);
        let s = interp.stencil(110.0, 31.0, 200.0, InterpMethod::Linear).unwrap();
        assert!(s.extrapolated);
        assert_eq!(s.entries.len(), 1);
        assert!((s.apply(&vals) - 5.6).abs() < 1e-12);
    }

    /// 5x5 columns 1 deg apart, knots every 2 km, value equal to longitude.
    fn crust_like_columns() -> (Vec<(f64, f64, f64)>, Vec<f64>) {
        let mut locs = Vec::new();
        let mut vals = Vec::new();
        for i in 0..5 {
            for j in 0..5 {
                for k in 0..=20 {
                    let lon = 100.0 + i as f64;
                    locs.push((lon, 30.0 + j as f64, 2.0 * k as f64));
                    vals.push(lon);
                }
            }
        }
        (locs, vals)
    }

    #[test]
    fn linear_interpolates_between_columns() {
        let (locs, vals) = crust_like_columns();
        let interp = ScatteredInterpolator::new(&locs);
        assert!(interp.is_column_structured());

        let s = interp.stencil(101.5, 31.5, 11.0, InterpMethod::Linear).unwrap();
        assert!(!s.extrapolated);
        assert!(s.entries.len() > 1);
        assert!((s.apply(&vals) - 101.5).abs() < 1e-9, "got {}", s.apply(&vals));

        let s = interp.stencil(102.25, 30.75, 7.0, InterpMethod::Linear).unwrap();
        assert!(!s.extrapolated);
        assert!((s.apply(&vals) - 102.25).abs() < 1e-9);
    }

    #[test]
    fn column_depth_is_linear_and_clamped() {
        let (locs, _) = crust_like_columns();
        let depth: Vec<f64> = locs.iter().map(|l| l.2).collect();
        let interp = ScatteredInterpolator::new(&locs);

        let s = interp.stencil(101.5, 31.5, 11.0, InterpMethod::Linear).unwrap();
        assert!((s.apply(&depth) - 11.0).abs() < 1e-9);

        let s = interp.stencil(101.5, 31.5, 55.0, InterpMethod::Linear).unwrap();
        assert!(s.extrapolated);
        assert!((s.apply(&depth) - 40.0).abs() < 1e-9);
    }

    #[test]
    fn wrapped_longitudes_still_enclose() {
        let mut locs = Vec::new();
        let mut vals = Vec::new();
        for lon in [179.0, -180.0, -179.0] {
            for lat in [0.0, 1.0] {
                for dep in [0.0, 10.0] {
                    locs.push((lon, lat, dep));
                    vals.push(lat);
                }
            }
        }
        let interp = ScatteredInterpolator::new(&locs);
        let s = interp.stencil(179.5, 0.5, 5.0, InterpMethod::Linear).unwrap();
        assert!(!s.extrapolated);
        assert!((s.apply(&vals) - 0.5).abs() < 1e-9);
    }
}
