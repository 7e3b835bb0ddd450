//! Workflows behind the CLI subcommands.
//!
//! Each function takes a plain request struct so the same steps can run from
//! the binary or from tests without going through argument parsing.

use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;

use crate::catalog::{
    DifferentialKind, DifferentialOptions, DuplicateTolerance, TravelTimeCatalog, WeightTarget,
};
use crate::config::InputParams;
use crate::error::AppError;
use crate::grid::GridSpec;
use crate::io::{
    CatalogReadOptions, CatalogWriteOptions, Decomposition, ModelFile, SolverOutput, inversion_field_names,
    read_catalog, read_model_file, write_catalog, write_model_file,
};
use crate::model::{BackgroundModel, Checkerboard, ModelBuilder};

/// Resample `background` onto the grid of the parameter file and save it.
pub fn create_model(
    params: &InputParams,
    background: &BackgroundModel,
    builder: &ModelBuilder,
    output: &Path,
) -> Result<ModelFile, AppError> {
    let grid = params.grid_spec()?;
    tracing::info!(shape = ?grid.shape(), background = %background.label(), "building model");
    let field = builder.build(background, &grid)?;
    let model = ModelFile::new(&grid, field);
    write_model_file(output, &model)?;
    Ok(model)
}

/// Perturb the model at `input` and save it with the applied fields.
pub fn apply_checkerboard(
    params: &InputParams,
    board: &Checkerboard,
    input: &Path,
    output: &Path,
) -> Result<ModelFile, AppError> {
    let grid = params.grid_spec()?;
    let mut model = read_model_file(input, Some(&grid))?;
    let diagnostics = board.apply(&mut model.field, &grid)?;
    let model = model.with_diagnostics(diagnostics);
    write_model_file(output, &model)?;
    Ok(model)
}

/// Where a solver run left its fields.
#[derive(Debug, Clone)]
pub struct SolverOutputRequest {
    pub data: PathBuf,
    pub grid: PathBuf,
    pub group: String,
    pub iteration: usize,
}

/// Reassemble the model of one inversion step and save it as a model file.
pub fn extract_model(params: &InputParams, req: &SolverOutputRequest, output: &Path) -> Result<ModelFile, AppError> {
    let grid = params.grid_spec()?;
    let (nr, nt, np) = grid.shape();
    let decomposition = Decomposition::new([nr, nt, np], params.ndiv_rtp()?)?;
    let names = inversion_field_names(req.iteration);
    let solver = SolverOutput::read_hdf5(&req.data, &req.grid, &req.group, Some(&names), &decomposition)?;
    let model = solver.to_model_file(&names)?;
    write_model_file(output, &model)?;
    Ok(model)
}

/// Catalog workflow. Steps run in field order; unset steps are skipped.
#[derive(Debug, Clone, Default)]
pub struct CatalogRequest {
    pub input: PathBuf,
    pub output: PathBuf,
    pub read: CatalogReadOptions,
    pub write: CatalogWriteOptions,
    pub append: Option<PathBuf>,
    pub depth: Option<(f64, f64)>,
    pub box_region: Option<((f64, f64), (f64, f64))>,
    pub distance: Option<(f64, f64)>,
    pub phases: Vec<String>,
    pub time_window: (Option<NaiveDateTime>, Option<NaiveDateTime>),
    pub min_num_rec: Option<usize>,
    pub subgrid: Option<GridSpec>,
    pub dedup: Option<DuplicateTolerance>,
    pub double_difference: Option<(DifferentialKind, DifferentialOptions)>,
    pub weighting: Option<Weighting>,
    pub noise: Option<(f64, u64)>,
    pub residuals_from: Option<PathBuf>,
    pub reset_index: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Weighting {
    Geographic { scale_deg: f64, target: WeightTarget },
    Box { box_deg: f64, target: WeightTarget },
}

pub fn run_catalog(req: &CatalogRequest) -> Result<TravelTimeCatalog, AppError> {
    let mut cat = read_catalog(&req.input, req.read)?;

    if let Some(path) = &req.append {
        let other = read_catalog(path, req.read)?;
        cat = cat.append(&other)?;
    }
    if let Some(range) = req.depth {
        cat = cat.select_by_depth(range)?;
    }
    if let Some((lon, lat)) = req.box_region {
        cat = cat.select_by_box_region(lon, lat)?;
    }
    if let Some(range) = req.distance {
        cat = cat.select_by_distance(range)?;
    }
    if !req.phases.is_empty() {
        let phases: Vec<&str> = req.phases.iter().map(String::as_str).collect();
        cat = cat.select_by_phase(&phases);
    }
    match req.time_window {
        (None, None) => {}
        (start, end) => {
            cat = cat.select_by_datetime(
                start.unwrap_or(NaiveDateTime::MIN),
                end.unwrap_or(NaiveDateTime::MAX),
            )?;
        }
    }
    if let Some(tol) = req.dedup {
        cat = cat.erase_duplicate_events(tol)?;
    }
    if let Some(n) = req.min_num_rec {
        cat = cat.select_by_min_num_rec(n);
    }
    if let Some(grid) = &req.subgrid {
        cat = cat.select_one_event_in_each_subgrid(grid);
    }
    if let Some((kind, opts)) = req.double_difference {
        cat = cat.generate_double_difference(kind, opts)?;
    }
    match req.weighting {
        Some(Weighting::Geographic { scale_deg, target }) => cat.geo_weighting(scale_deg, target)?,
        Some(Weighting::Box { box_deg, target }) => cat.box_weighting(box_deg, target)?,
        None => {}
    }
    if let Some((std, seed)) = req.noise {
        cat.add_noise_seeded(std, seed)?;
    }
    if let Some(path) = &req.residuals_from {
        let synthetic = read_catalog(path, req.read)?;
        cat = cat.with_residuals(&synthetic);
    }
    if req.write.dist_in_data {
        cat.calc_distance();
    }
    if req.reset_index {
        cat.reset_index();
    }

    write_catalog(&req.output, &cat, req.write)?;
    Ok(cat)
}

/// Update one key of a parameter file and save it.
pub fn set_parameter(config: &Path, key: &str, value: &str, output: Option<&Path>) -> Result<(), AppError> {
    let mut params = InputParams::read(config)?;
    params.set_param(key, value)?;
    params.write(output)?;
    tracing::info!(key, value, "parameter written");
    Ok(())
}
