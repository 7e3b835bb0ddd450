//! Dense model arrays on a grid.

use ndarray::Array3;

use crate::error::AppError;
use crate::grid::GridSpec;

/// Velocity and the two anisotropy parameters, each shaped `(n_dep, n_lat, n_lon)`.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelField {
    pub vel: Array3<f64>,
    pub xi: Array3<f64>,
    pub eta: Array3<f64>,
}

impl ModelField {
    pub fn zeros(grid: &GridSpec) -> Self {
        let shape = grid.shape();
        Self {
            vel: Array3::zeros(shape),
            xi: Array3::zeros(shape),
            eta: Array3::zeros(shape),
        }
    }

    /// Isotropic model with a constant velocity.
    pub fn uniform(grid: &GridSpec, vel: f64) -> Self {
        let mut field = Self::zeros(grid);
        field.vel.fill(vel);
        field
    }

    pub fn from_arrays(vel: Array3<f64>, xi: Array3<f64>, eta: Array3<f64>) -> Result<Self, AppError> {
        if vel.dim() != xi.dim() || vel.dim() != eta.dim() {
            return Err(AppError::validation(format!(
                "Model datasets disagree in shape: vel {:?}, xi {:?}, eta {:?}.",
                vel.dim(),
                xi.dim(),
                eta.dim()
            )));
        }
        Ok(Self { vel, xi, eta })
    }

    pub fn shape(&self) -> (usize, usize, usize) {
        self.vel.dim()
    }

    /// Fail unless every array matches the grid's node counts.
    pub fn check_shape(&self, grid: &GridSpec) -> Result<(), AppError> {
        let expected = grid.shape();
        for (name, arr) in self.datasets() {
            if arr.dim() != expected {
                return Err(AppError::validation(format!(
                    "Dataset `{name}` has shape {:?}, grid expects {expected:?}.",
                    arr.dim()
                )));
            }
        }
        Ok(())
    }

    /// Fail on the first NaN or infinite value.
    pub fn check_finite(&self) -> Result<(), AppError> {
        for (name, arr) in self.datasets() {
            if let Some((idx, v)) = arr.indexed_iter().find(|(_, v)| !v.is_finite()) {
                return Err(AppError::validation(format!(
                    "Dataset `{name}` holds non-finite value {v} at node {idx:?}."
                )));
            }
        }
        Ok(())
    }

    pub fn datasets(&self) -> [(&'static str, &Array3<f64>); 3] {
        [("vel", &self.vel), ("xi", &self.xi), ("eta", &self.eta)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shape_and_finiteness_checks() {
        let grid = GridSpec::new((0.0, 10.0), (0.0, 1.0), (0.0, 1.0), (3, 2, 2)).unwrap();
        let mut field = ModelField::uniform(&grid, 6.0);
        field.check_shape(&grid).unwrap();
        field.check_finite().unwrap();

        field.eta[[1, 0, 1]] = f64::NAN;
        let err = field.check_finite().unwrap_err();
        assert!(err.message().contains("eta"));

        let other = GridSpec::new((0.0, 10.0), (0.0, 1.0), (0.0, 1.0), (4, 2, 2)).unwrap();
        assert!(field.check_shape(&other).is_err());
    }
}
