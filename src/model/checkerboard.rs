//! Checkerboard resolution-test perturbations.
//!
//! Along each axis the pattern is `sin(2π n x)` with `x` the node's fractional
//! position inside the bounds (`0` at the lower longitude/latitude bound and at
//! the shallow depth bound, `1` at the upper one). `n` counts full periods, so
//! along an axis the pattern has `n` positive and `n` negative anomalies, each
//! `extent / 2n` wide, and changes sign `2n - 1` times between the bounds. The
//! three factors are multiplied. Nodes outside the bounds are left untouched.
//!
//! - velocity: `vel *= 1 + pert * vel_amplitude`
//! - anisotropy: strength `|pert| * ani_amplitude`, fast direction `ani_dir`
//!   where the pattern is positive and `ani_dir - 90°` where it is negative,
//!   added to `xi`/`eta` as `eps * cos 2φ` and `eps * sin 2φ`

use ndarray::{Array3, Zip};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::grid::{GridSpec, ResolvedRegion, SubRegion};
use crate::model::field::ModelField;

const ZERO_SNAP: f64 = 1e-12;

/// Pattern definition. Periods are ordered `[lon, lat, dep]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Checkerboard {
    pub periods: [f64; 3],
    /// Separate periods for the anisotropy pattern; defaults to `periods`.
    pub ani_periods: Option<[f64; 3]>,
    pub vel_amplitude: f64,
    pub ani_amplitude: f64,
    /// Fast direction (degrees) inside positive anomalies.
    pub ani_dir: f64,
    pub bounds: SubRegion,
}

impl Default for Checkerboard {
    fn default() -> Self {
        Self {
            periods: [2.0, 2.0, 2.0],
            ani_periods: None,
            vel_amplitude: 0.08,
            ani_amplitude: 0.04,
            ani_dir: 135.0,
            bounds: SubRegion::full(),
        }
    }
}

/// Applied perturbation fields, for inspection next to the model.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckerboardDiagnostics {
    pub dlnv: Array3<f64>,
    pub epsilon: Array3<f64>,
    pub phi: Array3<f64>,
}

impl Checkerboard {
    pub fn new(periods: [f64; 3], vel_amplitude: f64, ani_amplitude: f64) -> Self {
        Self {
            periods,
            vel_amplitude,
            ani_amplitude,
            ..Self::default()
        }
    }

    fn validate(&self) -> Result<(), AppError> {
        let periods = self.periods.iter().chain(self.ani_periods.iter().flatten());
        for &n in periods {
            if !n.is_finite() || n < 0.0 {
                return Err(AppError::validation(format!(
                    "Checkerboard period count must be finite and >= 0, got {n}."
                )));
            }
        }
        for (name, v) in [
            ("velocity amplitude", self.vel_amplitude),
            ("anisotropy amplitude", self.ani_amplitude),
            ("anisotropy direction", self.ani_dir),
        ] {
            if !v.is_finite() {
                return Err(AppError::validation(format!("Checkerboard {name} must be finite, got {v}.")));
            }
        }
        Ok(())
    }

    /// Perturb `model` in place and return the applied fields.
    pub fn apply(&self, model: &mut ModelField, grid: &GridSpec) -> Result<CheckerboardDiagnostics, AppError> {
        self.validate()?;
        model.check_shape(grid)?;
        let region = self.bounds.resolve(grid)?;

        let vel_pattern = pattern(grid, &region, self.periods);
        let ani_pattern = match self.ani_periods {
            Some(p) => pattern(grid, &region, p),
            None => vel_pattern.clone(),
        };

        let dlnv = vel_pattern.mapv(|p| p * self.vel_amplitude);
        let epsilon = ani_pattern.mapv(|p| p.abs() * self.ani_amplitude);
        let phi = ani_pattern.mapv(|p| {
            if p > 0.0 {
                self.ani_dir
            } else if p < 0.0 {
                self.ani_dir - 90.0
            } else {
                0.0
            }
        });

        Zip::from(&mut model.vel).and(&dlnv).for_each(|v, &d| *v *= 1.0 + d);
        Zip::from(&mut model.xi)
            .and(&mut model.eta)
            .and(&epsilon)
            .and(&phi)
            .for_each(|xi, eta, &eps, &phi| {
                let two_phi = 2.0 * phi.to_radians();
                *xi += eps * two_phi.cos();
                *eta += eps * two_phi.sin();
            });

        tracing::info!(
            periods = ?self.periods,
            vel_amplitude = self.vel_amplitude,
            ani_amplitude = self.ani_amplitude,
            "applied checkerboard"
        );
        model.check_finite()?;
        Ok(CheckerboardDiagnostics { dlnv, epsilon, phi })
    }
}

fn pattern(grid: &GridSpec, region: &ResolvedRegion, periods: [f64; 3]) -> Array3<f64> {
    let f_lon: Vec<f64> = grid.lon().iter().map(|&v| factor(v, region.lon, periods[0])).collect();
    let f_lat: Vec<f64> = grid.lat().iter().map(|&v| factor(v, region.lat, periods[1])).collect();
    let f_dep: Vec<f64> = grid.dep().iter().map(|&v| factor(v, region.dep, periods[2])).collect();
    Array3::from_shape_fn(grid.shape(), |(ir, it, ip)| f_dep[ir] * f_lat[it] * f_lon[ip])
}

/// One axis of the pattern; zero outside `range` and on its bounds.
fn factor(v: f64, range: (f64, f64), n: f64) -> f64 {
    if v < range.0 || v > range.1 {
        return 0.0;
    }
    let x = (v - range.0) / (range.1 - range.0);
    let s = (2.0 * std::f64::consts::PI * n * x).sin();
    if s.abs() < ZERO_SNAP { 0.0 } else { s }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> GridSpec {
        GridSpec::new((0.0, 40.0), (0.0, 4.0), (0.0, 8.0), (9, 17, 33)).unwrap()
    }

    #[test]
    fn zero_amplitude_leaves_model_unchanged() {
        let g = grid();
        let mut model = ModelField::uniform(&g, 6.0);
        let before = model.clone();
        let diag = Checkerboard::new([2.0, 2.0, 1.0], 0.0, 0.0).apply(&mut model, &g).unwrap();
        assert_eq!(model, before);
        assert!(diag.dlnv.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn velocity_follows_pattern_sign() {
        let g = grid();
        let mut model = ModelField::uniform(&g, 6.0);
        let diag = Checkerboard::new([1.0, 1.0, 1.0], 0.1, 0.05).apply(&mut model, &g).unwrap();
        // depth index 6 is 10 km (x = 0.25), lat index 4 is 1.0, lon index 8 is 2.0
        let (ir, it, ip) = (6, 4, 8);
        assert!((diag.dlnv[[ir, it, ip]] - 0.1).abs() < 1e-12);
        assert!((model.vel[[ir, it, ip]] - 6.6).abs() < 1e-12);
        assert_eq!(diag.phi[[ir, it, ip]], 135.0);
        assert!((model.xi[[ir, it, ip]] - 0.05 * (270f64).to_radians().cos()).abs() < 1e-12);
        assert!((model.eta[[ir, it, ip]] + 0.05).abs() < 1e-12);

        // half a period further east flips the sign
        let ip = 24;
        assert!((diag.dlnv[[ir, it, ip]] + 0.1).abs() < 1e-12);
        assert_eq!(diag.phi[[ir, it, ip]], 45.0);
    }

    #[test]
    fn periods_count_pairs_of_anomalies() {
        let g = grid();
        let mut model = ModelField::uniform(&g, 6.0);
        let diag = Checkerboard::new([4.0, 1.0, 1.0], 0.1, 0.0).apply(&mut model, &g).unwrap();
        let row: Vec<f64> = diag.dlnv.slice(ndarray::s![6, 4, ..]).to_vec();

        // lon step is 0.25 deg, anomalies are 1 deg wide
        for ip in (0..33).step_by(4) {
            assert_eq!(row[ip], 0.0, "lon {}", g.lon()[ip]);
        }
        let signs: Vec<f64> = row.iter().copied().filter(|&v| v != 0.0).map(f64::signum).collect();
        let lobes = 1 + signs.windows(2).filter(|w| w[0] != w[1]).count();
        assert_eq!(lobes, 8);
        assert_eq!(signs.iter().filter(|&&s| s > 0.0).count(), signs.len() / 2);
    }

    #[test]
    fn bounds_limit_the_perturbation() {
        let g = grid();
        let mut model = ModelField::uniform(&g, 6.0);
        let board = Checkerboard {
            bounds: SubRegion {
                lon: Some((2.0, 6.0)),
                ..SubRegion::full()
            },
            ..Checkerboard::new([1.0, 1.0, 1.0], 0.1, 0.0)
        };
        board.apply(&mut model, &g).unwrap();
        for ip in (0..8).chain(25..33) {
            assert!(model.vel.index_axis(ndarray::Axis(2), ip).iter().all(|&v| v == 6.0));
        }
    }

    #[test]
    fn invalid_inputs_are_rejected() {
        let g = grid();
        let mut model = ModelField::uniform(&g, 6.0);
        let err = Checkerboard::new([1.0, 1.0, 1.0], f64::NAN, 0.0).apply(&mut model, &g).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Validation);

        let other = GridSpec::new((0.0, 40.0), (0.0, 4.0), (0.0, 8.0), (3, 3, 3)).unwrap();
        let mut wrong = ModelField::uniform(&other, 6.0);
        assert!(Checkerboard::default().apply(&mut wrong, &g).is_err());
    }
}
