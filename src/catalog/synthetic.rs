//! Synthetic-data helpers: travel-time noise and residuals.

use std::collections::HashMap;

use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Normal;

use crate::catalog::table::TravelTimeCatalog;
use crate::catalog::types::{Observation, ObservationKind};
use crate::error::AppError;

impl TravelTimeCatalog {
    /// Add zero-mean Gaussian noise with standard deviation `std` (s) to every
    /// travel time, differential records included.
    pub fn add_noise<R: Rng + ?Sized>(&mut self, std: f64, rng: &mut R) -> Result<(), AppError> {
        if !std.is_finite() || std < 0.0 {
            return Err(AppError::value(format!("Noise standard deviation must be >= 0, got {std}.")));
        }
        if std == 0.0 {
            return Ok(());
        }
        let normal = Normal::new(0.0, std).map_err(|e| AppError::value(format!("Noise distribution error: {e}")))?;
        for obs in self.observations_mut() {
            obs.tt += normal.sample(rng);
        }
        tracing::info!(std, observations = self.observations().len(), "added travel-time noise");
        Ok(())
    }

    /// [`add_noise`](Self::add_noise) with a reproducible generator.
    pub fn add_noise_seeded(&mut self, std: f64, seed: u64) -> Result<(), AppError> {
        let mut rng = StdRng::seed_from_u64(seed);
        self.add_noise(std, &mut rng)
    }

    /// Copy of this catalog with `residual = tt - tt_syn` for every record that
    /// has a counterpart in `synthetic` (matched on event name, station, phase
    /// and the pair partner for differential records).
    pub fn with_residuals(&self, synthetic: &TravelTimeCatalog) -> Self {
        let syn: HashMap<RecordKey, f64> = synthetic
            .observations()
            .iter()
            .filter_map(|o| Some((record_key(synthetic, o)?, o.tt)))
            .collect();

        let mut out = self.clone();
        let mut unmatched = 0usize;
        let residuals: Vec<Option<f64>> = self
            .observations()
            .iter()
            .map(|o| {
                let r = record_key(self, o).and_then(|k| syn.get(&k)).map(|tt_syn| o.tt - tt_syn);
                if r.is_none() {
                    unmatched += 1;
                }
                r
            })
            .collect();
        for (o, r) in out.observations_mut().iter_mut().zip(residuals) {
            o.residual = r;
        }
        if unmatched > 0 {
            tracing::warn!(unmatched, "records without a synthetic counterpart");
        }
        out
    }
}

type RecordKey = (String, String, String, String);

fn record_key(catalog: &TravelTimeCatalog, o: &Observation) -> Option<RecordKey> {
    let event = catalog.source(o.src_id)?.event_name.clone();
    let partner = match &o.kind {
        ObservationKind::Absolute => String::new(),
        ObservationKind::CommonSource { station2, .. } => format!("cs:{}", station2.name),
        ObservationKind::CommonReceiver { event_name2, .. } => format!("cr:{event_name2}"),
    };
    Some((event, o.station.name.clone(), o.phase.clone(), partner))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::table::fixtures::*;

    fn catalog(tt: f64) -> TravelTimeCatalog {
        let a = station("A", 30.0, 100.0);
        let b = station("B", 31.0, 100.0);
        TravelTimeCatalog::new(
            vec![source(0, 30.5, 100.5, 10.0)],
            vec![obs(0, &a, "P", tt), obs(0, &b, "P", tt + 1.0)],
        )
        .unwrap()
    }

    #[test]
    fn seeded_noise_is_reproducible() {
        let mut one = catalog(10.0);
        let mut two = catalog(10.0);
        one.add_noise_seeded(0.1, 42).unwrap();
        two.add_noise_seeded(0.1, 42).unwrap();
        assert_eq!(one, two);
        assert_ne!(one, catalog(10.0));
    }

    #[test]
    fn zero_noise_is_identity_and_negative_fails() {
        let mut cat = catalog(10.0);
        cat.add_noise_seeded(0.0, 1).unwrap();
        assert_eq!(cat, catalog(10.0));
        let err = cat.add_noise_seeded(-0.5, 1).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Value);
    }

    #[test]
    fn residuals_match_by_event_station_phase() {
        let obs = catalog(10.0);
        let syn = catalog(9.5).select_by_phase(&["P"]);
        let out = obs.with_residuals(&syn);
        assert!(out.observations().iter().all(|o| o.residual == Some(0.5)));
    }
}
