//! Command-line parsing for the TomoATT preparation tool.
//!
//! Argument structs only; dispatch lives in `app`.

use std::path::PathBuf;

use chrono::NaiveDateTime;
use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::catalog::{DifferentialKind, WeightTarget};
use crate::logging::LogFormat;
use crate::math::InterpMethod;
use crate::model::VelocityType;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "pta", version, about = "Model and travel-time catalog preparation for TomoATT")]
pub struct Cli {
    /// Log level used when RUST_LOG is not set.
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Compact)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Build an initial model on the grid of a parameter file.
    CreateModel(CreateModelArgs),
    /// Add a checkerboard perturbation to an existing model.
    Checkerboard(CheckerboardArgs),
    /// Set a value in a parameter file.
    Setpar(SetparArgs),
    /// Convert the model of one solver inversion step into a model file.
    ExtractModel(ExtractModelArgs),
    /// Filter, weight and transform a travel-time catalog.
    Catalog(CatalogArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackgroundKind {
    /// Built-in CRUST1.0 tables (directory from CRUST1_DIR).
    Crust1,
    /// Text file of `lon lat depth value` samples.
    Ascii,
}

#[derive(Debug, Args, Clone)]
pub struct CreateModelArgs {
    /// TomoATT parameter file providing the `domain` section.
    #[arg(short, long, value_name = "YAML")]
    pub config: PathBuf,

    /// Output model file.
    #[arg(short, long, value_name = "H5")]
    pub output: PathBuf,

    #[arg(long, value_enum, default_value_t = BackgroundKind::Crust1)]
    pub background: BackgroundKind,

    /// Velocity type taken from CRUST1.0.
    #[arg(long, value_enum, default_value_t = VelocityType::Vp)]
    pub vtype: VelocityType,

    /// Sample file for `--background ascii`.
    #[arg(long, value_name = "FILE", required_if_eq("background", "ascii"))]
    pub ascii_file: Option<PathBuf>,

    /// Column order of lon, lat, depth and value (zero-based).
    #[arg(long, value_delimiter = ',', default_values_t = [0, 1, 2, 3])]
    pub columns: Vec<usize>,

    /// Column holding xi, if any.
    #[arg(long)]
    pub xi_column: Option<usize>,

    /// Column holding eta, if any.
    #[arg(long)]
    pub eta_column: Option<usize>,

    /// Single-character delimiter; whitespace when omitted.
    #[arg(long)]
    pub delimiter: Option<char>,

    #[arg(long, value_enum, default_value_t = InterpMethod::Linear)]
    pub method: InterpMethod,

    /// Gaussian smoothing length in km.
    #[arg(long)]
    pub smooth_sigma: Option<f64>,
}

#[derive(Debug, Args, Clone)]
pub struct ExtractModelArgs {
    /// Parameter file of the solver run (`domain` and `parallel.ndiv_rtp`).
    #[arg(short, long, value_name = "YAML")]
    pub config: PathBuf,

    /// Solver data file, e.g. `OUTPUT_FILES/out_data_sim_group_0.h5`.
    #[arg(short, long, value_name = "H5")]
    pub data: PathBuf,

    /// Solver grid file holding `/Mesh/node_coords_*`.
    #[arg(short, long, value_name = "H5", default_value = "OUTPUT_FILES/out_data_grid.h5")]
    pub grid: PathBuf,

    /// Group of the data file holding the model fields.
    #[arg(long, default_value = "model")]
    pub group: String,

    /// Inversion step to extract.
    #[arg(long, default_value_t = 0)]
    pub iteration: usize,

    /// Output model file.
    #[arg(short, long, value_name = "H5")]
    pub output: PathBuf,
}

#[derive(Debug, Args, Clone)]
pub struct CheckerboardArgs {
    /// TomoATT parameter file providing the `domain` section.
    #[arg(short, long, value_name = "YAML")]
    pub config: PathBuf,

    /// Model to perturb.
    #[arg(short, long, value_name = "H5")]
    pub input: PathBuf,

    /// Output model file.
    #[arg(short, long, value_name = "H5")]
    pub output: PathBuf,

    /// Periods along lon, lat and depth.
    #[arg(long, value_delimiter = ',', default_values_t = [2.0, 2.0, 2.0])]
    pub periods: Vec<f64>,

    /// Separate anisotropy periods along lon, lat and depth.
    #[arg(long, value_delimiter = ',')]
    pub ani_periods: Option<Vec<f64>>,

    /// Velocity perturbation as a fraction.
    #[arg(long, default_value_t = 0.08)]
    pub pert_vel: f64,

    /// Anisotropy strength.
    #[arg(long, default_value_t = 0.04)]
    pub pert_ani: f64,

    /// Fast direction (deg) in positive anomalies.
    #[arg(long, default_value_t = 135.0)]
    pub ani_dir: f64,

    /// Longitude bounds `min,max`.
    #[arg(long, value_parser = parse_range)]
    pub lon_bounds: Option<(f64, f64)>,

    /// Latitude bounds `min,max`.
    #[arg(long, value_parser = parse_range)]
    pub lat_bounds: Option<(f64, f64)>,

    /// Depth bounds `min,max` (km).
    #[arg(long, value_parser = parse_range)]
    pub dep_bounds: Option<(f64, f64)>,
}

#[derive(Debug, Args, Clone)]
pub struct SetparArgs {
    /// Parameter file to edit.
    pub config: PathBuf,

    /// Dotted key, e.g. `domain.n_rtp`.
    pub key: String,

    /// New value; lists are comma separated.
    pub value: String,

    /// Write to this file instead of overwriting the input.
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Args, Clone)]
pub struct CatalogArgs {
    /// Catalog to read.
    #[arg(short, long, value_name = "SRC_REC")]
    pub input: PathBuf,

    /// Catalog to write.
    #[arg(short, long, value_name = "SRC_REC")]
    pub output: PathBuf,

    /// Input rows carry a distance column.
    #[arg(long)]
    pub dist_in_data: bool,

    /// Input station names are split in network and station columns.
    #[arg(long)]
    pub name_net_and_sta: bool,

    /// Read event lines only.
    #[arg(long)]
    pub src_only: bool,

    /// Write the distance column.
    #[arg(long)]
    pub write_distance: bool,

    /// Catalog appended after reading.
    #[arg(long, value_name = "SRC_REC")]
    pub append: Option<PathBuf>,

    /// Event depth range `min,max` (km).
    #[arg(long, value_parser = parse_range)]
    pub depth: Option<(f64, f64)>,

    /// Box longitude range `min,max`; needs `--box-lat`.
    #[arg(long, value_parser = parse_range, requires = "box_lat")]
    pub box_lon: Option<(f64, f64)>,

    /// Box latitude range `min,max`; needs `--box-lon`.
    #[arg(long, value_parser = parse_range, requires = "box_lon")]
    pub box_lat: Option<(f64, f64)>,

    /// Epicentral distance range `min,max` (deg).
    #[arg(long, value_parser = parse_range)]
    pub distance: Option<(f64, f64)>,

    /// Phases to keep.
    #[arg(long, value_delimiter = ',')]
    pub phase: Vec<String>,

    /// Origin time window start, e.g. 2019-01-01T00:00:00.
    #[arg(long, value_parser = parse_datetime)]
    pub start: Option<NaiveDateTime>,

    /// Origin time window end.
    #[arg(long, value_parser = parse_datetime)]
    pub end: Option<NaiveDateTime>,

    /// Minimum number of observations per event.
    #[arg(long)]
    pub min_num_rec: Option<usize>,

    /// Keep one event per cell of this parameter file's grid.
    #[arg(long, value_name = "YAML")]
    pub subgrid: Option<PathBuf>,

    /// Merge events closer than this in lat and lon (deg).
    #[arg(long)]
    pub dedup_deg: Option<f64>,

    /// Origin-time tolerance for merging (s).
    #[arg(long, default_value_t = 60.0)]
    pub dedup_time: f64,

    /// Depth tolerance for merging (km).
    #[arg(long)]
    pub dedup_depth: Option<f64>,

    /// Differential records to generate.
    #[arg(long, value_enum)]
    pub double_difference: Option<DifferentialKind>,

    /// Largest pair separation for differential records (deg).
    #[arg(long)]
    pub max_pair_distance: Option<f64>,

    /// Geographic weighting scale (deg).
    #[arg(long, conflicts_with = "box_weight")]
    pub geo_weight: Option<f64>,

    /// Box weighting size (deg).
    #[arg(long)]
    pub box_weight: Option<f64>,

    /// What the weighting is computed over.
    #[arg(long, value_enum, default_value_t = WeightTarget::Sources)]
    pub weight_target: WeightTarget,

    /// Gaussian travel-time noise (s).
    #[arg(long)]
    pub noise: Option<f64>,

    /// Seed for `--noise`.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Synthetic catalog for residuals.
    #[arg(long, value_name = "SRC_REC")]
    pub residuals: Option<PathBuf>,

    /// Renumber events from zero before writing.
    #[arg(long)]
    pub reset_index: bool,
}

fn parse_range(s: &str) -> Result<(f64, f64), String> {
    let (a, b) = s
        .split_once(',')
        .ok_or_else(|| format!("expected `min,max`, got '{s}'"))?;
    let a: f64 = a.trim().parse().map_err(|e| format!("bad min '{a}': {e}"))?;
    let b: f64 = b.trim().parse().map_err(|e| format!("bad max '{b}': {e}"))?;
    Ok((a, b))
}

fn parse_datetime(s: &str) -> Result<NaiveDateTime, String> {
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| {
            chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
        .ok_or_else(|| format!("expected YYYY-MM-DD[THH:MM:SS], got '{s}'"))
}
