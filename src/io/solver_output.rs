//! Solver output fields, reassembled on the global grid.
//!
//! The solver stores each field as one flat array that concatenates its
//! subdomains (`parallel.ndiv_rtp`) in r, t, p order, each subdomain in
//! row-major `(r, t, p)` order. Along every axis a subdomain holds `n / ndiv`
//! nodes, the last one also takes the remainder, and all but the last carry
//! one extra overlap layer shared with the next.
//!
//! Node coordinates come in the same layout: `/Mesh/node_coords_{r,t,p}` in
//! the HDF5 grid file, or `p t r` columns in the ASCII one. Radii are km and
//! angles degrees.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use ndarray::{Array3, s};

use crate::error::AppError;
use crate::grid::EARTH_RADIUS_KM;
use crate::io::model_file::{ModelFile, open_h5};
use crate::model::ModelField;

/// One subdomain: global start index and extent along (r, t, p).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block {
    pub offset: [usize; 3],
    pub shape: [usize; 3],
}

impl Block {
    pub fn len(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// How the solver split the global grid across processes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decomposition {
    n_rtp: [usize; 3],
    ndiv_rtp: [usize; 3],
}

impl Decomposition {
    pub fn new(n_rtp: [usize; 3], ndiv_rtp: [usize; 3]) -> Result<Self, AppError> {
        for axis in 0..3 {
            if ndiv_rtp[axis] == 0 || ndiv_rtp[axis] > n_rtp[axis] {
                return Err(AppError::config(format!(
                    "ndiv_rtp {ndiv_rtp:?} cannot split a grid of {n_rtp:?} nodes."
                )));
            }
        }
        Ok(Self { n_rtp, ndiv_rtp })
    }

    pub fn shape(&self) -> (usize, usize, usize) {
        (self.n_rtp[0], self.n_rtp[1], self.n_rtp[2])
    }

    /// Subdomains in storage order.
    pub fn blocks(&self) -> Vec<Block> {
        let span = |axis: usize, i: usize| {
            let (n, ndiv) = (self.n_rtp[axis], self.ndiv_rtp[axis]);
            let base = n / ndiv;
            let len = if i + 1 == ndiv { base + n % ndiv } else { base + 1 };
            (i * base, len)
        };

        let [dr, dt, dp] = self.ndiv_rtp;
        let mut blocks = Vec::with_capacity(dr * dt * dp);
        for ir in 0..dr {
            for it in 0..dt {
                for ip in 0..dp {
                    let (or, nr) = span(0, ir);
                    let (ot, nt) = span(1, it);
                    let (op, np) = span(2, ip);
                    blocks.push(Block {
                        offset: [or, ot, op],
                        shape: [nr, nt, np],
                    });
                }
            }
        }
        blocks
    }

    /// Length of a flat field written by the solver, overlaps included.
    pub fn total_points(&self) -> usize {
        self.blocks().iter().map(Block::len).sum()
    }

    /// Scatter a flat solver array back onto the global grid.
    pub fn reassemble(&self, flat: &[f64]) -> Result<Array3<f64>, AppError> {
        let expected = self.total_points();
        if flat.len() != expected {
            return Err(AppError::format(format!(
                "Solver field holds {} values, the decomposition {:?} of {:?} needs {expected}.",
                flat.len(),
                self.ndiv_rtp,
                self.n_rtp
            )));
        }

        let mut global = Array3::zeros(self.shape());
        let mut start = 0;
        for b in self.blocks() {
            let sub = Array3::from_shape_vec((b.shape[0], b.shape[1], b.shape[2]), flat[start..start + b.len()].to_vec())
                .map_err(|e| AppError::format(format!("Malformed solver subdomain: {e}")))?;
            let [or, ot, op] = b.offset;
            global
                .slice_mut(s![or..or + b.shape[0], ot..ot + b.shape[1], op..op + b.shape[2]])
                .assign(&sub);
            start += b.len();
        }
        Ok(global)
    }
}

/// Solver fields on the global grid with the axes recovered from the mesh.
#[derive(Debug, Clone, PartialEq)]
pub struct SolverOutput {
    pub dep: Vec<f64>,
    pub lat: Vec<f64>,
    pub lon: Vec<f64>,
    pub fields: BTreeMap<String, Array3<f64>>,
}

/// Dataset names of the model written at inversion step `iteration`.
pub fn inversion_field_names(iteration: usize) -> [String; 3] {
    ["vel", "xi", "eta"].map(|f| format!("{f}_inv_{iteration:04}"))
}

impl SolverOutput {
    /// Read fields of `group` from an HDF5 data file; `None` reads them all.
    pub fn read_hdf5(
        data: &Path,
        grid: &Path,
        group: &str,
        names: Option<&[String]>,
        decomposition: &Decomposition,
    ) -> Result<Self, AppError> {
        let grid_file = open_h5(grid, "solver grid file")?;
        let coord = |axis: &str| -> Result<Array3<f64>, AppError> {
            let name = format!("/Mesh/node_coords_{axis}");
            let flat = grid_file
                .dataset(&name)
                .and_then(|ds| ds.read_raw::<f64>())
                .map_err(|e| AppError::format(format!("'{}': cannot read `{name}`: {e}", grid.display())))?;
            decomposition.reassemble(&flat)
        };
        let (r, t, p) = (coord("r")?, coord("t")?, coord("p")?);

        let data_file = open_h5(data, "solver data file")?;
        let group_h5 = data_file
            .group(group)
            .map_err(|e| AppError::format(format!("'{}' has no group `{group}`: {e}", data.display())))?;
        let available = group_h5
            .member_names()
            .map_err(|e| AppError::format(format!("Failed to list `{group}` in '{}': {e}", data.display())))?;
        let wanted: Vec<String> = match names {
            Some(names) => names.to_vec(),
            None => available.clone(),
        };

        let mut fields = BTreeMap::new();
        for name in wanted {
            if !available.contains(&name) {
                return Err(AppError::value(format!(
                    "Dataset `{name}` is not in group `{group}`; available: {}.",
                    available.join(", ")
                )));
            }
            let flat = group_h5
                .dataset(&name)
                .and_then(|ds| ds.read_raw::<f64>())
                .map_err(|e| AppError::format(format!("Failed to read `{group}/{name}` from '{}': {e}", data.display())))?;
            fields.insert(name, decomposition.reassemble(&flat)?);
        }

        tracing::info!(
            data = %data.display(),
            group,
            fields = fields.len(),
            shape = ?decomposition.shape(),
            "read solver output"
        );
        Ok(Self::from_mesh(&r, &t, &p, fields))
    }

    /// Read one field written as ASCII: a single value per line in `data`,
    /// `p t r` coordinates per line in `grid`.
    pub fn read_ascii(data: &Path, grid: &Path, name: &str, decomposition: &Decomposition) -> Result<Self, AppError> {
        let values = read_columns(data, 1)?;
        let coords = read_columns(grid, 3)?;
        let column = |c: usize| coords.iter().map(|row| row[c]).collect::<Vec<f64>>();

        let p = decomposition.reassemble(&column(0))?;
        let t = decomposition.reassemble(&column(1))?;
        let r = decomposition.reassemble(&column(2))?;
        let field: Vec<f64> = values.iter().map(|row| row[0]).collect();

        let mut fields = BTreeMap::new();
        fields.insert(name.to_string(), decomposition.reassemble(&field)?);
        tracing::info!(data = %data.display(), field = name, "read solver output");
        Ok(Self::from_mesh(&r, &t, &p, fields))
    }

    fn from_mesh(r: &Array3<f64>, t: &Array3<f64>, p: &Array3<f64>, fields: BTreeMap<String, Array3<f64>>) -> Self {
        Self {
            dep: r.slice(s![.., 0, 0]).iter().map(|r| EARTH_RADIUS_KM - r).collect(),
            lat: t.slice(s![0, .., 0]).to_vec(),
            lon: p.slice(s![0, 0, ..]).to_vec(),
            fields,
        }
    }

    pub fn field(&self, name: &str) -> Result<&Array3<f64>, AppError> {
        self.fields.get(name).ok_or_else(|| {
            let known: Vec<&str> = self.fields.keys().map(String::as_str).collect();
            AppError::value(format!("No field `{name}` in solver output; have: {}.", known.join(", ")))
        })
    }

    /// Model container from the `vel`, `xi` and `eta` fields named in `names`.
    pub fn to_model_file(&self, names: &[String; 3]) -> Result<ModelFile, AppError> {
        let field = ModelField::from_arrays(
            self.field(&names[0])?.clone(),
            self.field(&names[1])?.clone(),
            self.field(&names[2])?.clone(),
        )?;
        Ok(ModelFile {
            dep: self.dep.clone(),
            lat: self.lat.clone(),
            lon: self.lon.clone(),
            field,
            zeta: None,
            diagnostics: None,
        })
    }
}

fn read_columns(path: &Path, need: usize) -> Result<Vec<Vec<f64>>, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::io(format!("Failed to open solver output '{}': {e}", path.display())))?;
    let mut rows = Vec::new();
    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|e| AppError::io(format!("Failed to read '{}': {e}", path.display())))?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let row = trimmed
            .split_whitespace()
            .take(need)
            .map(str::parse::<f64>)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| AppError::format(format!("{}: line {}: {e}", path.display(), idx + 1)))?;
        if row.len() < need {
            return Err(AppError::format(format!(
                "{}: line {}: expected {need} columns, found {}.",
                path.display(),
                idx + 1,
                row.len()
            )));
        }
        rows.push(row);
    }
    Ok(rows)
}
