//! Model container read/write.
//!
//! The container is an HDF5 file holding named `f64` datasets, the layout the
//! solver reads:
//!
//! - `dep`, `lat`, `lon`: 1D coordinate axes (depth descending)
//! - `vel`, `xi`, `eta`: 3D arrays shaped `(n_dep, n_lat, n_lon)`
//! - `zeta`: optional, carried through untouched
//! - `dlnv`, `epsilon`, `phi`: optional checkerboard diagnostics
//!
//! Values are stored as native doubles, so a read of a written file is
//! bit-identical.

use std::path::Path;

use hdf5::File as H5File;
use ndarray::Array3;

use crate::error::AppError;
use crate::grid::GridSpec;
use crate::model::{CheckerboardDiagnostics, ModelField};

/// A model as stored on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelFile {
    pub dep: Vec<f64>,
    pub lat: Vec<f64>,
    pub lon: Vec<f64>,
    pub field: ModelField,
    pub zeta: Option<Array3<f64>>,
    pub diagnostics: Option<CheckerboardDiagnostics>,
}

impl ModelFile {
    pub fn new(grid: &GridSpec, field: ModelField) -> Self {
        Self {
            dep: grid.dep().to_vec(),
            lat: grid.lat().to_vec(),
            lon: grid.lon().to_vec(),
            field,
            zeta: None,
            diagnostics: None,
        }
    }

    pub fn with_diagnostics(mut self, diagnostics: CheckerboardDiagnostics) -> Self {
        self.diagnostics = Some(diagnostics);
        self
    }

    pub fn shape(&self) -> (usize, usize, usize) {
        (self.dep.len(), self.lat.len(), self.lon.len())
    }

    /// Fail unless the stored axes are exactly those of `grid`.
    pub fn check_grid(&self, grid: &GridSpec) -> Result<(), AppError> {
        for (name, stored, expected) in [
            ("dep", &self.dep, grid.dep()),
            ("lat", &self.lat, grid.lat()),
            ("lon", &self.lon, grid.lon()),
        ] {
            if stored.as_slice() != expected {
                return Err(AppError::validation(format!(
                    "Model axis `{name}` does not match the grid ({} stored vs {} expected nodes).",
                    stored.len(),
                    expected.len()
                )));
            }
        }
        Ok(())
    }

    fn check_shapes(&self) -> Result<(), AppError> {
        let expected = self.shape();
        let mut datasets: Vec<(&str, &Array3<f64>)> = self.field.datasets().to_vec();
        if let Some(z) = &self.zeta {
            datasets.push(("zeta", z));
        }
        if let Some(d) = &self.diagnostics {
            datasets.extend([("dlnv", &d.dlnv), ("epsilon", &d.epsilon), ("phi", &d.phi)]);
        }
        for (name, arr) in datasets {
            if arr.dim() != expected {
                return Err(AppError::validation(format!(
                    "Dataset `{name}` has shape {:?}, axes give {expected:?}.",
                    arr.dim()
                )));
            }
        }
        Ok(())
    }
}

fn write_axis(file: &H5File, name: &str, values: &[f64]) -> hdf5::Result<()> {
    file.new_dataset::<f64>()
        .shape(values.len())
        .create(name)?
        .write_raw(values)
}

fn write_cube(file: &H5File, name: &str, values: &Array3<f64>) -> hdf5::Result<()> {
    let (nr, nt, np) = values.dim();
    let flat: Vec<f64> = values.iter().copied().collect();
    file.new_dataset::<f64>()
        .shape((nr, nt, np))
        .create(name)?
        .write_raw(flat.as_slice())
}

pub fn write_model_file(path: &Path, model: &ModelFile) -> Result<(), AppError> {
    model.check_shapes()?;
    let file = H5File::create(path)
        .map_err(|e| AppError::io(format!("Failed to create model file '{}': {e}", path.display())))?;

    let mut cubes: Vec<(&str, &Array3<f64>)> = model.field.datasets().to_vec();
    if let Some(z) = &model.zeta {
        cubes.push(("zeta", z));
    }
    if let Some(d) = &model.diagnostics {
        cubes.extend([("dlnv", &d.dlnv), ("epsilon", &d.epsilon), ("phi", &d.phi)]);
    }

    let written = [("dep", &model.dep), ("lat", &model.lat), ("lon", &model.lon)]
        .into_iter()
        .try_for_each(|(name, axis)| write_axis(&file, name, axis))
        .and_then(|_| cubes.into_iter().try_for_each(|(name, cube)| write_cube(&file, name, cube)))
        .and_then(|_| file.flush());
    written.map_err(|e| AppError::io(format!("Failed to write model file '{}': {e}", path.display())))?;

    tracing::info!(path = %path.display(), shape = ?model.shape(), "wrote model");
    Ok(())
}

fn read_axis(file: &H5File, path: &Path, name: &str) -> Result<Vec<f64>, AppError> {
    let ds = file
        .dataset(name)
        .map_err(|e| AppError::format(format!("'{}' has no dataset `{name}`: {e}", path.display())))?;
    if ds.ndim() != 1 {
        return Err(AppError::format(format!(
            "Dataset `{name}` in '{}' should be 1D, found shape {:?}.",
            path.display(),
            ds.shape()
        )));
    }
    ds.read_raw::<f64>()
        .map_err(|e| AppError::format(format!("Failed to read `{name}` from '{}': {e}", path.display())))
}

pub(crate) fn read_cube(file: &H5File, path: &Path, name: &str) -> Result<Array3<f64>, AppError> {
    let ds = file
        .dataset(name)
        .map_err(|e| AppError::format(format!("'{}' has no dataset `{name}`: {e}", path.display())))?;
    let shape = ds.shape();
    let &[nr, nt, np] = shape.as_slice() else {
        return Err(AppError::format(format!(
            "Dataset `{name}` in '{}' should be 3D, found shape {shape:?}.",
            path.display()
        )));
    };
    let flat = ds
        .read_raw::<f64>()
        .map_err(|e| AppError::format(format!("Failed to read `{name}` from '{}': {e}", path.display())))?;
    Array3::from_shape_vec((nr, nt, np), flat)
        .map_err(|e| AppError::format(format!("Dataset `{name}` in '{}' is malformed: {e}", path.display())))
}

fn read_optional_cube(file: &H5File, path: &Path, name: &str) -> Result<Option<Array3<f64>>, AppError> {
    if file.link_exists(name) {
        read_cube(file, path, name).map(Some)
    } else {
        Ok(None)
    }
}

/// Open an existing HDF5 file, keeping "missing" (I/O) apart from "not HDF5" (format).
pub(crate) fn open_h5(path: &Path, what: &str) -> Result<H5File, AppError> {
    std::fs::metadata(path)
        .map_err(|e| AppError::io(format!("Failed to open {what} '{}': {e}", path.display())))?;
    H5File::open(path).map_err(|e| AppError::format(format!("Invalid {what} '{}': {e}", path.display())))
}

/// Read a model file; with `expected`, also require its axes to match that grid.
pub fn read_model_file(path: &Path, expected: Option<&GridSpec>) -> Result<ModelFile, AppError> {
    let file = open_h5(path, "model file")?;

    let diagnostics = match (
        read_optional_cube(&file, path, "dlnv")?,
        read_optional_cube(&file, path, "epsilon")?,
        read_optional_cube(&file, path, "phi")?,
    ) {
        (Some(dlnv), Some(epsilon), Some(phi)) => Some(CheckerboardDiagnostics { dlnv, epsilon, phi }),
        (None, None, None) => None,
        _ => {
            return Err(AppError::format(format!(
                "'{}' holds an incomplete set of checkerboard datasets.",
                path.display()
            )));
        }
    };

    let model = ModelFile {
        dep: read_axis(&file, path, "dep")?,
        lat: read_axis(&file, path, "lat")?,
        lon: read_axis(&file, path, "lon")?,
        field: ModelField::from_arrays(
            read_cube(&file, path, "vel")?,
            read_cube(&file, path, "xi")?,
            read_cube(&file, path, "eta")?,
        )?,
        zeta: read_optional_cube(&file, path, "zeta")?,
        diagnostics,
    };
    model.check_shapes()?;
    if let Some(grid) = expected {
        model.check_grid(grid)?;
    }
    Ok(model)
}
