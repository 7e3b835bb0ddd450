//! Background model sources.
//!
//! Every source reduces to the same thing: a cloud of scattered
//! `(lon, lat, depth, value)` samples, optionally carrying anisotropy.

use std::path::PathBuf;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::grid::GridSpec;
use crate::io::ascii::{AsciiColumns, read_ascii_samples};
use crate::model::crust1::Crust1Model;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum VelocityType {
    Vp,
    Vs,
}

/// One scattered sample. `kind` is `None` when the source does not say.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackgroundSample {
    pub lon: f64,
    pub lat: f64,
    pub depth: f64,
    pub value: f64,
    pub kind: Option<VelocityType>,
}

/// Scattered samples plus per-sample anisotropy when the source provides it.
#[derive(Debug, Clone, Default)]
pub struct ScatteredSet {
    pub samples: Vec<BackgroundSample>,
    pub xi: Option<Vec<f64>>,
    pub eta: Option<Vec<f64>>,
}

impl ScatteredSet {
    pub fn isotropic(samples: Vec<BackgroundSample>) -> Self {
        Self {
            samples,
            xi: None,
            eta: None,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn locations(&self) -> Vec<(f64, f64, f64)> {
        self.samples.iter().map(|s| (s.lon, s.lat, s.depth)).collect()
    }

    pub fn values(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.value).collect()
    }
}

#[derive(Debug, Clone)]
pub enum BackgroundModel {
    /// CRUST1.0 layer knots for one velocity type.
    Crust1 {
        model: &'static Crust1Model,
        vtype: VelocityType,
    },
    /// Delimited text table of samples.
    Ascii { path: PathBuf, columns: AsciiColumns },
    /// Samples already in memory.
    Samples(ScatteredSet),
}

impl BackgroundModel {
    /// Scattered samples, cropped to the grid domain where the source is global.
    pub fn scattered(&self, crop: Option<&GridSpec>) -> Result<ScatteredSet, AppError> {
        let set = match self {
            BackgroundModel::Crust1 { model, vtype } => ScatteredSet::isotropic(model.knots(*vtype, crop)),
            BackgroundModel::Ascii { path, columns } => read_ascii_samples(path, columns)?,
            BackgroundModel::Samples(set) => set.clone(),
        };
        if set.is_empty() {
            return Err(AppError::value(format!(
                "Background model `{}` yields no samples for this domain.",
                self.label()
            )));
        }
        Ok(set)
    }

    pub fn label(&self) -> String {
        match self {
            BackgroundModel::Crust1 { vtype, .. } => format!("crust1.0 ({vtype:?})"),
            BackgroundModel::Ascii { path, .. } => path.display().to_string(),
            BackgroundModel::Samples(_) => "in-memory samples".to_string(),
        }
    }
}
