//! Merging of events reported more than once.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::catalog::table::TravelTimeCatalog;
use crate::catalog::types::{Observation, ObservationKind};
use crate::error::AppError;

/// Two events are duplicates when every difference is strictly below these.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DuplicateTolerance {
    /// Latitude and longitude difference (deg).
    pub deg: f64,
    /// Depth difference (km); `None` ignores depth.
    pub depth_km: Option<f64>,
    /// Origin-time difference (s).
    pub time_s: f64,
}

impl Default for DuplicateTolerance {
    fn default() -> Self {
        Self {
            deg: 1e-4,
            depth_km: None,
            time_s: 60.0,
        }
    }
}

impl TravelTimeCatalog {
    /// Collapse each group of duplicate events onto one survivor: the event with
    /// most observations, ties broken by lowest id. Observations of the others
    /// are moved to the survivor, except those repeating a record the survivor
    /// already holds for the same station, phase and pairing. Grouping is
    /// transitive.
    pub fn erase_duplicate_events(&self, tol: DuplicateTolerance) -> Result<Self, AppError> {
        for (name, v) in [("deg", tol.deg), ("time_s", tol.time_s)] {
            if !v.is_finite() || v < 0.0 {
                return Err(AppError::config(format!("Duplicate tolerance `{name}` must be >= 0, got {v}.")));
            }
        }

        let sources = self.sources();
        let mut order: Vec<usize> = (0..sources.len()).collect();
        order.sort_by_key(|&i| (sources[i].origin_time, sources[i].id));

        let mut sets = DisjointSets::new(sources.len());
        for (pos, &i) in order.iter().enumerate() {
            let a = &sources[i];
            for &j in &order[pos + 1..] {
                let b = &sources[j];
                let dt = (b.origin_time - a.origin_time)
                    .num_microseconds()
                    .map(|us| us as f64 / 1e6)
                    .unwrap_or(f64::INFINITY);
                if dt >= tol.time_s {
                    break;
                }
                let close = (a.evla - b.evla).abs() < tol.deg
                    && (a.evlo - b.evlo).abs() < tol.deg
                    && tol.depth_km.is_none_or(|d| (a.evdp - b.evdp).abs() < d);
                if close {
                    sets.union(i, j);
                }
            }
        }

        // survivor per group
        let mut survivor: Vec<usize> = (0..sources.len()).collect();
        for i in 0..sources.len() {
            let root = sets.find(i);
            let cur = &sources[survivor[root]];
            let cand = &sources[i];
            if cand.num_rec > cur.num_rec || (cand.num_rec == cur.num_rec && cand.id < cur.id) {
                survivor[root] = i;
            }
        }
        let target: Vec<usize> = (0..sources.len()).map(|i| sources[survivor[sets.find(i)]].id).collect();
        let remap: std::collections::HashMap<usize, usize> =
            sources.iter().zip(&target).map(|(s, &t)| (s.id, t)).collect();

        let merged = remap.iter().filter(|(from, to)| from != to).count();
        if merged == 0 {
            return Ok(self.clone());
        }

        let moved: Vec<(bool, Observation)> = self
            .observations()
            .iter()
            .cloned()
            .filter_map(|mut o| {
                let before = (o.src_id, partner_source(&o));
                o.src_id = remap[&o.src_id];
                if let ObservationKind::CommonReceiver { src_id2, .. } = &mut o.kind {
                    *src_id2 = remap[src_id2];
                    if *src_id2 == o.src_id {
                        return None;
                    }
                }
                Some((before != (o.src_id, partner_source(&o)), o))
            })
            .collect();

        let mut seen: HashSet<RowKey> = moved.iter().filter(|(m, _)| !m).map(|(_, o)| RowKey::of(o)).collect();
        let mut repeated = 0usize;
        let observations: Vec<Observation> = moved
            .into_iter()
            .filter_map(|(m, o)| {
                if m && !seen.insert(RowKey::of(&o)) {
                    repeated += 1;
                    return None;
                }
                Some(o)
            })
            .collect();
        if repeated > 0 {
            tracing::debug!(repeated, "dropped records already held by the surviving event");
        }

        let mut out = if self.is_source_only() {
            self.retain_sources(|s| remap[&s.id] == s.id)
        } else {
            self.with_observations(observations)
        };
        out.group_by_source();
        out.update_num_rec();
        tracing::info!(merged, remaining = out.sources().len(), "erased duplicate events");
        Ok(out)
    }
}

fn partner_source(o: &Observation) -> Option<usize> {
    match &o.kind {
        ObservationKind::CommonReceiver { src_id2, .. } => Some(*src_id2),
        _ => None,
    }
}

/// Identity of a record within one event.
#[derive(Debug, PartialEq, Eq, Hash)]
struct RowKey {
    src_id: usize,
    station: String,
    phase: String,
    partner: Partner,
}

#[derive(Debug, PartialEq, Eq, Hash)]
enum Partner {
    None,
    Station(String),
    Source(usize),
}

impl RowKey {
    fn of(o: &Observation) -> Self {
        let partner = match &o.kind {
            ObservationKind::Absolute => Partner::None,
            ObservationKind::CommonSource { station2, .. } => Partner::Station(station2.name.clone()),
            ObservationKind::CommonReceiver { src_id2, .. } => Partner::Source(*src_id2),
        };
        Self {
            src_id: o.src_id,
            station: o.station.name.clone(),
            phase: o.phase.clone(),
            partner,
        }
    }
}

struct DisjointSets {
    parent: Vec<usize>,
}

impl DisjointSets {
    fn new(n: usize) -> Self {
        Self { parent: (0..n).collect() }
    }

    fn find(&mut self, mut i: usize) -> usize {
        while self.parent[i] != i {
            self.parent[i] = self.parent[self.parent[i]];
            i = self.parent[i];
        }
        i
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            self.parent[ra.max(rb)] = ra.min(rb);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::table::fixtures::*;

    fn twin_catalog() -> TravelTimeCatalog {
        let a = station("A", 30.0, 100.0);
        let b = station("B", 31.0, 101.0);
        let mut first = source(0, 30.0, 100.0, 10.0);
        let mut second = source(1, 30.001, 100.0, 10.0);
        second.origin_time = first.origin_time + chrono::Duration::milliseconds(50);
        first.event_name = "orig".into();
        TravelTimeCatalog::new(
            vec![first, second, source(5, 20.0, 90.0, 10.0)],
            vec![
                obs(0, &a, "P", 5.0),
                obs(1, &b, "P", 6.0),
                obs(1, &a, "S", 9.0),
                obs(5, &a, "P", 20.0),
            ],
        )
        .unwrap()
    }

    #[test]
    fn close_events_are_merged_into_best_populated() {
        let tol = DuplicateTolerance {
            deg: 0.01,
            depth_km: None,
            time_s: 0.1,
        };
        let cat = twin_catalog().erase_duplicate_events(tol).unwrap();
        let ids: Vec<usize> = cat.sources().iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![1, 5]);
        assert_eq!(cat.source(1).unwrap().num_rec, 3);
        assert_eq!(cat.observations().len(), 4);
    }

    #[test]
    fn survivor_keeps_its_own_record_for_a_repeated_station() {
        let a = station("A", 30.0, 100.0);
        let b = station("B", 31.0, 101.0);
        let mut second = source(1, 30.001, 100.0, 10.0);
        second.origin_time += chrono::Duration::milliseconds(50);
        let cat = TravelTimeCatalog::new(
            vec![source(0, 30.0, 100.0, 10.0), second],
            vec![
                obs(0, &a, "P", 5.0),
                obs(1, &a, "P", 5.1),
                obs(1, &b, "P", 6.0),
                obs(1, &a, "S", 9.0),
            ],
        )
        .unwrap();
        let tol = DuplicateTolerance {
            deg: 0.01,
            depth_km: None,
            time_s: 0.1,
        };
        let merged = cat.erase_duplicate_events(tol).unwrap();
        assert_eq!(merged.sources().len(), 1);
        assert_eq!(merged.source(1).unwrap().num_rec, 3);
        let a_p: Vec<f64> = merged
            .observations()
            .iter()
            .filter(|o| o.station.name == "A" && o.phase == "P")
            .map(|o| o.tt)
            .collect();
        assert_eq!(a_p, vec![5.1]);
    }

    #[test]
    fn tight_tolerance_keeps_both() {
        let tol = DuplicateTolerance {
            deg: 0.0005,
            depth_km: None,
            time_s: 0.1,
        };
        let before = twin_catalog();
        let cat = before.erase_duplicate_events(tol).unwrap();
        assert_eq!(cat, before);

        let tol = DuplicateTolerance {
            deg: 0.01,
            depth_km: None,
            time_s: 0.05,
        };
        assert_eq!(before.erase_duplicate_events(tol).unwrap().sources().len(), 3);
    }
}
