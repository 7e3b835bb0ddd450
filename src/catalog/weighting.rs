//! Observation weights that down-weight densely sampled areas.
//!
//! Weights are computed per point (sources or stations), given to every
//! observation of that point and then scaled so the mean observation weight is 1.

use std::collections::HashMap;

use clap::ValueEnum;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::catalog::table::TravelTimeCatalog;
use crate::error::AppError;
use crate::math::delta_deg;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum WeightTarget {
    Sources,
    Receivers,
}

impl TravelTimeCatalog {
    /// Weight by inverse geographic density: `1 / Σ exp(-(Δ/scale)²)` over all
    /// points, Δ being the great-circle distance in degrees.
    pub fn geo_weighting(&mut self, scale_deg: f64, target: WeightTarget) -> Result<(), AppError> {
        if !scale_deg.is_finite() || scale_deg <= 0.0 {
            return Err(AppError::config(format!("Weighting scale must be > 0 deg, got {scale_deg}.")));
        }
        let (keys, points) = self.weight_points(target);
        let weights: Vec<f64> = points
            .par_iter()
            .map(|&(la, lo)| {
                let density: f64 = points
                    .iter()
                    .map(|&(la2, lo2)| (-(delta_deg(la, lo, la2, lo2) / scale_deg).powi(2)).exp())
                    .sum();
                1.0 / density
            })
            .collect();
        self.assign_point_weights(target, &keys, &weights);
        tracing::info!(?target, scale_deg, points = keys.len(), "applied geographic weighting");
        Ok(())
    }

    /// Weight by inverse occupancy of `box_deg`×`box_deg` lat/lon boxes.
    pub fn box_weighting(&mut self, box_deg: f64, target: WeightTarget) -> Result<(), AppError> {
        if !box_deg.is_finite() || box_deg <= 0.0 {
            return Err(AppError::config(format!("Weighting box must be > 0 deg, got {box_deg}.")));
        }
        let (keys, points) = self.weight_points(target);
        let cell = |&(la, lo): &(f64, f64)| ((la / box_deg).floor() as i64, (lo / box_deg).floor() as i64);
        let mut counts: HashMap<(i64, i64), usize> = HashMap::new();
        for p in &points {
            *counts.entry(cell(p)).or_insert(0) += 1;
        }
        let weights: Vec<f64> = points.iter().map(|p| 1.0 / counts[&cell(p)] as f64).collect();
        self.assign_point_weights(target, &keys, &weights);
        tracing::info!(?target, box_deg, boxes = counts.len(), "applied box weighting");
        Ok(())
    }

    fn weight_points(&self, target: WeightTarget) -> (Vec<String>, Vec<(f64, f64)>) {
        match target {
            WeightTarget::Sources => self
                .sources()
                .iter()
                .map(|s| (s.id.to_string(), (s.evla, s.evlo)))
                .unzip(),
            WeightTarget::Receivers => self
                .stations()
                .into_iter()
                .map(|s| (s.name.clone(), (s.stla, s.stlo)))
                .unzip(),
        }
    }

    fn assign_point_weights(&mut self, target: WeightTarget, keys: &[String], weights: &[f64]) {
        let by_key: HashMap<&str, f64> = keys.iter().map(String::as_str).zip(weights.iter().copied()).collect();

        if target == WeightTarget::Sources {
            let mean = mean(weights);
            for s in self.sources_mut() {
                if let Some(w) = by_key.get(s.id.to_string().as_str()) {
                    s.weight = w / mean;
                }
            }
        }

        let key_of = |o: &crate::catalog::types::Observation| match target {
            WeightTarget::Sources => o.src_id.to_string(),
            WeightTarget::Receivers => o.station.name.clone(),
        };
        let raw: Vec<f64> = self
            .observations()
            .iter()
            .map(|o| by_key.get(key_of(o).as_str()).copied().unwrap_or(1.0))
            .collect();
        let mean = mean(&raw);
        for (o, w) in self.observations_mut().iter_mut().zip(raw) {
            o.weight = w / mean;
        }
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 1.0;
    }
    let m = values.iter().sum::<f64>() / values.len() as f64;
    if m > 0.0 { m } else { 1.0 }
}
