//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - loads `.env` and sets up logging
//! - parses CLI arguments
//! - turns them into pipeline requests
//! - prints a short summary of what was written

use std::path::PathBuf;

use clap::Parser;

use crate::catalog::{DifferentialOptions, DuplicateTolerance};
use crate::cli::{BackgroundKind, CatalogArgs, CheckerboardArgs, Command, CreateModelArgs, ExtractModelArgs};
use crate::config::InputParams;
use crate::error::AppError;
use crate::grid::SubRegion;
use crate::io::{AsciiColumns, CatalogReadOptions, CatalogWriteOptions};
use crate::model::{BackgroundModel, Checkerboard, Crust1Model, ModelBuilder};

pub mod pipeline;

use pipeline::{CatalogRequest, SolverOutputRequest, Weighting};

/// Directory of the CRUST1.0 tables when `CRUST1_DIR` is unset.
const DEFAULT_CRUST1_DIR: &str = "data/crust1.0";

/// Entry point for the `pta` binary.
pub fn run() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    let cli = crate::cli::Cli::parse();
    crate::logging::init_logging(&cli.log_level, cli.log_format);

    match cli.command {
        Command::CreateModel(args) => handle_create_model(args),
        Command::Checkerboard(args) => handle_checkerboard(args),
        Command::Setpar(args) => pipeline::set_parameter(&args.config, &args.key, &args.value, args.output.as_deref()),
        Command::ExtractModel(args) => handle_extract_model(args),
        Command::Catalog(args) => handle_catalog(args),
    }
}

fn handle_extract_model(args: ExtractModelArgs) -> Result<(), AppError> {
    let params = InputParams::read(&args.config)?;
    let req = SolverOutputRequest {
        data: args.data,
        grid: args.grid,
        group: args.group,
        iteration: args.iteration,
    };
    let model = pipeline::extract_model(&params, &req, &args.output)?;
    println!(
        "Wrote {} (step {}, {}x{}x{} nodes)",
        args.output.display(),
        args.iteration,
        model.dep.len(),
        model.lat.len(),
        model.lon.len()
    );
    Ok(())
}

fn handle_create_model(args: CreateModelArgs) -> Result<(), AppError> {
    let params = InputParams::read(&args.config)?;
    let background = background_from_args(&args)?;
    let mut builder = ModelBuilder::new(args.method);
    if let Some(sigma) = args.smooth_sigma {
        builder = builder.with_smoothing(sigma);
    }
    let model = pipeline::create_model(&params, &background, &builder, &args.output)?;

    let (lo, hi) = model
        .field
        .vel
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    println!(
        "Wrote {} ({}x{}x{} nodes, vel {lo:.3}..{hi:.3})",
        args.output.display(),
        model.dep.len(),
        model.lat.len(),
        model.lon.len()
    );
    Ok(())
}

fn background_from_args(args: &CreateModelArgs) -> Result<BackgroundModel, AppError> {
    match args.background {
        BackgroundKind::Crust1 => {
            let dir = std::env::var_os("CRUST1_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CRUST1_DIR));
            Ok(BackgroundModel::Crust1 {
                model: Crust1Model::global(&dir)?,
                vtype: args.vtype,
            })
        }
        BackgroundKind::Ascii => {
            let path = args
                .ascii_file
                .clone()
                .ok_or_else(|| AppError::config("`--background ascii` needs `--ascii-file`."))?;
            let order: [usize; 4] = args.columns.as_slice().try_into().map_err(|_| {
                AppError::config(format!("`--columns` needs 4 values, got {}.", args.columns.len()))
            })?;
            let delimiter = match args.delimiter {
                None => None,
                Some(c) if c.is_ascii() => Some(c as u8),
                Some(c) => return Err(AppError::config(format!("Delimiter '{c}' is not a single byte."))),
            };
            Ok(BackgroundModel::Ascii {
                path,
                columns: AsciiColumns {
                    xi: args.xi_column,
                    eta: args.eta_column,
                    delimiter,
                    ..AsciiColumns::from_order(order)
                },
            })
        }
    }
}

fn handle_checkerboard(args: CheckerboardArgs) -> Result<(), AppError> {
    let params = InputParams::read(&args.config)?;
    let triple = |name: &str, v: &[f64]| -> Result<[f64; 3], AppError> {
        v.try_into()
            .map_err(|_| AppError::config(format!("`--{name}` needs 3 values (lon,lat,dep), got {}.", v.len())))
    };
    let board = Checkerboard {
        periods: triple("periods", &args.periods)?,
        ani_periods: args.ani_periods.as_deref().map(|v| triple("ani-periods", v)).transpose()?,
        vel_amplitude: args.pert_vel,
        ani_amplitude: args.pert_ani,
        ani_dir: args.ani_dir,
        bounds: SubRegion {
            lon: args.lon_bounds,
            lat: args.lat_bounds,
            dep: args.dep_bounds,
        },
    };
    pipeline::apply_checkerboard(&params, &board, &args.input, &args.output)?;
    println!("Wrote {}", args.output.display());
    Ok(())
}

fn handle_catalog(args: CatalogArgs) -> Result<(), AppError> {
    let subgrid = match &args.subgrid {
        Some(path) => Some(InputParams::read(path)?.grid_spec()?),
        None => None,
    };
    let weighting = match (args.geo_weight, args.box_weight) {
        (Some(scale_deg), _) => Some(Weighting::Geographic {
            scale_deg,
            target: args.weight_target,
        }),
        (None, Some(box_deg)) => Some(Weighting::Box {
            box_deg,
            target: args.weight_target,
        }),
        (None, None) => None,
    };

    let req = CatalogRequest {
        input: args.input,
        output: args.output.clone(),
        read: CatalogReadOptions {
            dist_in_data: args.dist_in_data,
            name_net_and_sta: args.name_net_and_sta,
            src_only: args.src_only,
        },
        write: CatalogWriteOptions {
            dist_in_data: args.write_distance,
        },
        append: args.append,
        depth: args.depth,
        box_region: args.box_lon.zip(args.box_lat),
        distance: args.distance,
        phases: args.phase,
        time_window: (args.start, args.end),
        min_num_rec: args.min_num_rec,
        subgrid,
        dedup: args.dedup_deg.map(|deg| DuplicateTolerance {
            deg,
            depth_km: args.dedup_depth,
            time_s: args.dedup_time,
        }),
        double_difference: args.double_difference.map(|kind| {
            (
                kind,
                DifferentialOptions {
                    max_pair_distance_deg: args.max_pair_distance,
                },
            )
        }),
        weighting,
        noise: args.noise.map(|std| (std, args.seed)),
        residuals_from: args.residuals,
        reset_index: args.reset_index,
    };

    let cat = pipeline::run_catalog(&req)?;
    println!(
        "Wrote {} ({} events, {} records)",
        args.output.display(),
        cat.sources().len(),
        cat.observations().len()
    );
    if req.residuals_from.is_some() {
        let res: Vec<f64> = cat.observations().iter().filter_map(|o| o.residual).collect();
        if !res.is_empty() {
            let mean = res.iter().sum::<f64>() / res.len() as f64;
            let rms = (res.iter().map(|r| r * r).sum::<f64>() / res.len() as f64).sqrt();
            println!("Residuals: n={} mean={mean:.4} s rms={rms:.4} s", res.len());
        }
    }
    Ok(())
}
