//! Resample a background model onto a regular grid.

use ndarray::Array3;
use rayon::prelude::*;

use crate::error::AppError;
use crate::grid::GridSpec;
use crate::math::{InterpMethod, ScatteredInterpolator, Stencil, gaussian_filter3};
use crate::model::background::BackgroundModel;
use crate::model::field::ModelField;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ModelBuilder {
    pub method: InterpMethod,
    /// Gaussian smoothing length (km, one standard deviation). `None` disables it.
    pub smooth_sigma_km: Option<f64>,
}

impl ModelBuilder {
    pub fn new(method: InterpMethod) -> Self {
        Self {
            method,
            smooth_sigma_km: None,
        }
    }

    pub fn with_smoothing(mut self, sigma_km: f64) -> Self {
        self.smooth_sigma_km = Some(sigma_km);
        self
    }

    /// Evaluate `background` at every node of `grid`.
    ///
    /// Nodes outside the sampled volume take the nearest sample's value.
    /// Anisotropy is zero unless the background supplies it.
    pub fn build(&self, background: &BackgroundModel, grid: &GridSpec) -> Result<ModelField, AppError> {
        if let Some(sigma) = self.smooth_sigma_km {
            if !sigma.is_finite() || sigma < 0.0 {
                return Err(AppError::config(format!("Smoothing length must be >= 0 km, got {sigma}.")));
            }
        }

        let set = background.scattered(Some(grid))?;
        let values = set.values();
        if let Some(v) = values.iter().find(|v| !v.is_finite()) {
            return Err(AppError::validation(format!(
                "Background model `{}` contains non-finite value {v}.",
                background.label()
            )));
        }
        let interp = ScatteredInterpolator::new(&set.locations());

        let (nr, nt, np) = grid.shape();
        let (dep, lat, lon) = (grid.dep(), grid.lat(), grid.lon());
        let method = self.method;
        let stencils: Vec<Stencil> = (0..grid.n_nodes())
            .into_par_iter()
            .map(|flat| {
                let (ir, it, ip) = (flat / (nt * np), (flat / np) % nt, flat % np);
                interp.stencil(lon[ip], lat[it], dep[ir], method)
            })
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| AppError::value("Background model has no samples to interpolate."))?;

        let extrapolated = stencils.iter().filter(|s| s.extrapolated).count();
        tracing::info!(
            background = %background.label(),
            samples = set.len(),
            nodes = stencils.len(),
            extrapolated,
            columns = interp.is_column_structured(),
            ?method,
            "resampled background model"
        );

        let eval = |vals: &[f64]| -> Result<Array3<f64>, AppError> {
            let flat: Vec<f64> = stencils.par_iter().map(|s| s.apply(vals)).collect();
            Array3::from_shape_vec((nr, nt, np), flat)
                .map_err(|e| AppError::validation(format!("Model array shape error: {e}")))
        };

        let vel = eval(&values)?;
        let xi = match &set.xi {
            Some(v) => eval(v)?,
            None => Array3::zeros((nr, nt, np)),
        };
        let eta = match &set.eta {
            Some(v) => eval(v)?,
            None => Array3::zeros((nr, nt, np)),
        };
        let mut field = ModelField::from_arrays(vel, xi, eta)?;

        if let Some(sigma_km) = self.smooth_sigma_km.filter(|s| *s > 0.0) {
            let spacing = grid.index_spacing_km();
            let sigma = spacing.map(|h| sigma_km / h);
            tracing::debug!(?sigma, "smoothing model in index space");
            gaussian_filter3(&mut field.vel, sigma);
            if set.xi.is_some() {
                gaussian_filter3(&mut field.xi, sigma);
            }
            if set.eta.is_some() {
                gaussian_filter3(&mut field.eta, sigma);
            }
        }

        field.check_finite()?;
        Ok(field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::background::{BackgroundSample, ScatteredSet};

    fn node_samples(grid: &GridSpec, f: impl Fn(f64, f64, f64) -> f64) -> ScatteredSet {
        let mut samples = Vec::new();
        for &d in grid.dep() {
            for &la in grid.lat() {
                for &lo in grid.lon() {
                    samples.push(BackgroundSample {
                        lon: lo,
                        lat: la,
                        depth: d,
                        value: f(d, la, lo),
                        kind: None,
                    });
                }
            }
        }
        ScatteredSet::isotropic(samples)
    }

    #[test]
    fn samples_on_nodes_are_reproduced_exactly() {
        let grid = GridSpec::new((0.0, 40.0), (30.0, 31.0), (100.0, 101.0), (5, 3, 4)).unwrap();
        let bg = BackgroundModel::Samples(node_samples(&grid, |d, la, lo| 5.0 + 0.02 * d + la - lo * 0.1));
        for method in [InterpMethod::Nearest, InterpMethod::Linear] {
            let field = ModelBuilder::new(method).build(&bg, &grid).unwrap();
            for (ir, &d) in grid.dep().iter().enumerate() {
                for (it, &la) in grid.lat().iter().enumerate() {
                    for (ip, &lo) in grid.lon().iter().enumerate() {
                        assert_eq!(field.vel[[ir, it, ip]], 5.0 + 0.02 * d + la - lo * 0.1);
                    }
                }
            }
            assert!(field.xi.iter().all(|&v| v == 0.0));
        }
    }

    #[test]
    fn smoothing_keeps_constant_model() {
        let grid = GridSpec::new((0.0, 40.0), (30.0, 31.0), (100.0, 101.0), (5, 3, 4)).unwrap();
        let bg = BackgroundModel::Samples(node_samples(&grid, |_, _, _| 6.0));
        let field = ModelBuilder::new(InterpMethod::Linear)
            .with_smoothing(20.0)
            .build(&bg, &grid)
            .unwrap();
        assert!(field.vel.iter().all(|v| (v - 6.0).abs() < 1e-12));
    }

    #[test]
    fn non_finite_background_is_rejected() {
        let grid = GridSpec::new((0.0, 40.0), (30.0, 31.0), (100.0, 101.0), (2, 2, 2)).unwrap();
        let bg = BackgroundModel::Samples(node_samples(&grid, |d, _, _| if d > 0.0 { f64::NAN } else { 6.0 }));
        let err = ModelBuilder::default().build(&bg, &grid).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Validation);
    }

    #[test]
    fn empty_background_is_value_error() {
        let grid = GridSpec::new((0.0, 40.0), (30.0, 31.0), (100.0, 101.0), (2, 2, 2)).unwrap();
        let bg = BackgroundModel::Samples(ScatteredSet::default());
        let err = ModelBuilder::default().build(&bg, &grid).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Value);
    }
}
