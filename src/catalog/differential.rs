//! Differential travel times.
//!
//! Common-source (`cs`) records pair two stations that recorded the same event
//! and phase; common-receiver (`cr`) records pair two events recorded at the
//! same station with the same phase. The differential time is `tt1 - tt2` and
//! the weight is the geometric mean of the two input weights.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::catalog::table::TravelTimeCatalog;
use crate::catalog::types::{DifferentialKind, Observation, ObservationKind};
use crate::error::AppError;
use crate::math::delta_deg;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DifferentialOptions {
    /// Upper bound on the distance (deg) between the two stations (`cs`) or
    /// the two events (`cr`) of a pair.
    pub max_pair_distance_deg: Option<f64>,
}

impl TravelTimeCatalog {
    /// Catalog with differential records appended to the existing ones.
    ///
    /// Fails with a value error when no pair survives: either no group holds
    /// two records, or every candidate pair is rejected.
    pub fn generate_double_difference(
        &self,
        kind: DifferentialKind,
        opts: DifferentialOptions,
    ) -> Result<Self, AppError> {
        let absolute: Vec<&Observation> = self.observations().iter().filter(|o| o.is_absolute()).collect();

        let mut groups: BTreeMap<(String, String), Vec<&Observation>> = BTreeMap::new();
        for &o in &absolute {
            let key = match kind {
                DifferentialKind::CommonSource => (o.src_id.to_string(), o.phase.clone()),
                DifferentialKind::CommonReceiver => (o.station.name.clone(), o.phase.clone()),
            };
            groups.entry(key).or_default().push(o);
        }
        if groups.values().all(|g| g.len() < 2) {
            return Err(AppError::value(format!(
                "No {} pairs can be formed: every group holds fewer than two observations.",
                kind.suffix()
            )));
        }

        let mut records = Vec::new();
        for group in groups.values() {
            for (i, first) in group.iter().enumerate() {
                for second in &group[i + 1..] {
                    if let Some(rec) = self.pair(kind, first, second, &opts) {
                        records.push(rec);
                    }
                }
            }
        }

        if records.is_empty() {
            return Err(AppError::value(format!(
                "No {} pairs pass the pairing constraints.",
                kind.suffix()
            )));
        }

        tracing::info!(kind = kind.suffix(), pairs = records.len(), "generated differential records");
        let mut observations = self.observations().to_vec();
        observations.extend(records);
        let mut out = self.with_observations(observations);
        out.group_by_source();
        out.update_num_rec();
        Ok(out)
    }

    fn pair(
        &self,
        kind: DifferentialKind,
        first: &Observation,
        second: &Observation,
        opts: &DifferentialOptions,
    ) -> Option<Observation> {
        let record_kind = match kind {
            DifferentialKind::CommonSource => {
                if first.station.name == second.station.name {
                    return None;
                }
                ObservationKind::CommonSource {
                    rec_index2: second.rec_index,
                    station2: second.station.clone(),
                }
            }
            DifferentialKind::CommonReceiver => {
                if first.src_id == second.src_id {
                    return None;
                }
                let src2 = self.source(second.src_id)?;
                ObservationKind::CommonReceiver {
                    src_id2: src2.id,
                    event_name2: src2.event_name.clone(),
                    evla2: src2.evla,
                    evlo2: src2.evlo,
                    evdp2: src2.evdp,
                }
            }
        };

        if let Some(max) = opts.max_pair_distance_deg {
            let dist = match kind {
                DifferentialKind::CommonSource => delta_deg(
                    first.station.stla,
                    first.station.stlo,
                    second.station.stla,
                    second.station.stlo,
                ),
                DifferentialKind::CommonReceiver => {
                    let (a, b) = (self.source(first.src_id)?, self.source(second.src_id)?);
                    delta_deg(a.evla, a.evlo, b.evla, b.evlo)
                }
            };
            if dist > max {
                return None;
            }
        }

        Some(Observation {
            src_id: first.src_id,
            rec_index: first.rec_index,
            station: first.station.clone(),
            phase: first.phase.clone(),
            dist_deg: None,
            tt: first.tt - second.tt,
            weight: (first.weight * second.weight).sqrt(),
            residual: None,
            kind: record_kind,
        })
    }
}
