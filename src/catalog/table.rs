//! The catalog container and its bookkeeping.
//!
//! Invariants kept by every constructor and operation:
//!
//! - source ids are unique and sources are ordered by id
//! - every observation references existing sources (`src_id`, and `src_id2`
//!   for common-receiver records)
//! - each station name maps to one set of coordinates
//! - weights are finite and non-negative
//! - `num_rec` equals the number of observations attached to the source, and
//!   `rec_index` runs `0..num_rec` within each source
//!
//! Sources left without observations by a filter are dropped, except in
//! source-only catalogs where there never were observations.

use std::collections::{BTreeSet, HashMap};

use crate::catalog::types::{Observation, ObservationKind, Source, Station};
use crate::error::AppError;
use crate::math::delta_deg;

/// Coordinate disagreement tolerated between two mentions of one station.
const STATION_COORD_TOL: f64 = 1e-3;

#[derive(Debug, Clone, PartialEq)]
pub struct TravelTimeCatalog {
    sources: Vec<Source>,
    observations: Vec<Observation>,
    src_only: bool,
}

impl TravelTimeCatalog {
    /// Validate and normalize a set of sources and observations.
    pub fn new(mut sources: Vec<Source>, observations: Vec<Observation>) -> Result<Self, AppError> {
        sources.sort_by_key(|s| s.id);
        if let Some(pair) = sources.windows(2).find(|w| w[0].id == w[1].id) {
            return Err(AppError::validation(format!("Duplicate source id {}.", pair[0].id)));
        }
        for s in &sources {
            check_weight(s.weight, || format!("source {}", s.id))?;
        }

        let ids: BTreeSet<usize> = sources.iter().map(|s| s.id).collect();
        let mut stations: HashMap<&str, &Station> = HashMap::new();
        for (i, obs) in observations.iter().enumerate() {
            for id in obs.source_ids() {
                if !ids.contains(&id) {
                    return Err(AppError::validation(format!(
                        "Observation {i} ({}, {}) references missing source {id}.",
                        obs.station.name, obs.phase
                    )));
                }
            }
            check_weight(obs.weight, || format!("observation {i} ({})", obs.station.name))?;
            for st in obs.stations() {
                match stations.get(st.name.as_str()) {
                    Some(prev) if !same_position(prev, st) => {
                        return Err(AppError::validation(format!(
                            "Station {} appears with conflicting coordinates ({}, {}, {}) and ({}, {}, {}).",
                            st.name, prev.stla, prev.stlo, prev.stel, st.stla, st.stlo, st.stel
                        )));
                    }
                    Some(_) => {}
                    None => {
                        stations.insert(&st.name, st);
                    }
                }
            }
        }

        let mut catalog = Self {
            sources,
            observations,
            src_only: false,
        };
        catalog.update_num_rec();
        Ok(catalog)
    }

    /// Sources without observation rows; `num_rec` is kept as given.
    pub fn source_only(sources: Vec<Source>) -> Result<Self, AppError> {
        let num_rec: HashMap<usize, usize> = sources.iter().map(|s| (s.id, s.num_rec)).collect();
        let mut catalog = Self::new(sources, Vec::new())?;
        for s in &mut catalog.sources {
            s.num_rec = num_rec.get(&s.id).copied().unwrap_or(0);
        }
        catalog.src_only = true;
        Ok(catalog)
    }

    pub fn empty() -> Self {
        Self {
            sources: Vec::new(),
            observations: Vec::new(),
            src_only: false,
        }
    }

    pub fn sources(&self) -> &[Source] {
        &self.sources
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    pub fn is_source_only(&self) -> bool {
        self.src_only
    }

    pub fn source(&self, id: usize) -> Option<&Source> {
        self.sources
            .binary_search_by_key(&id, |s| s.id)
            .ok()
            .map(|i| &self.sources[i])
    }

    /// Unique stations in first-seen order.
    pub fn stations(&self) -> Vec<&Station> {
        let mut seen = BTreeSet::new();
        self.observations
            .iter()
            .flat_map(|o| o.stations())
            .filter(|s| seen.insert(s.name.as_str()))
            .collect()
    }

    pub fn into_parts(self) -> (Vec<Source>, Vec<Observation>) {
        (self.sources, self.observations)
    }

    /// Recount observations per source and renumber `rec_index` within each.
    pub fn update_num_rec(&mut self) {
        if self.src_only {
            return;
        }
        let mut counts: HashMap<usize, usize> = HashMap::new();
        for obs in &mut self.observations {
            let n = counts.entry(obs.src_id).or_insert(0);
            obs.rec_index = *n;
            *n += 1;
        }
        for s in &mut self.sources {
            s.num_rec = counts.get(&s.id).copied().unwrap_or(0);
        }
    }

    /// Renumber sources `0..n` in id order, rewriting every reference.
    pub fn reset_index(&mut self) {
        let remap: HashMap<usize, usize> = self
            .sources
            .iter()
            .enumerate()
            .map(|(new, s)| (s.id, new))
            .collect();
        for s in &mut self.sources {
            s.id = remap[&s.id];
        }
        for obs in &mut self.observations {
            obs.src_id = remap[&obs.src_id];
            if let ObservationKind::CommonReceiver { src_id2, .. } = &mut obs.kind {
                *src_id2 = remap[src_id2];
            }
        }
        self.group_by_source();
        self.update_num_rec();
    }

    /// Stable reorder so each source's observations are contiguous.
    pub(crate) fn group_by_source(&mut self) {
        self.observations.sort_by_key(|o| o.src_id);
    }

    /// Catalog with the given observations, dropping sources nothing refers to.
    pub(crate) fn with_observations(&self, observations: Vec<Observation>) -> Self {
        if self.src_only {
            return self.clone();
        }
        let used: BTreeSet<usize> = observations.iter().flat_map(|o| o.source_ids()).collect();
        let sources = self.sources.iter().filter(|s| used.contains(&s.id)).cloned().collect();
        let mut catalog = Self {
            sources,
            observations,
            src_only: false,
        };
        catalog.update_num_rec();
        catalog
    }

    /// Catalog restricted to sources passing `keep`, plus the observations that
    /// only reference kept sources.
    pub(crate) fn retain_sources(&self, mut keep: impl FnMut(&Source) -> bool) -> Self {
        let kept: BTreeSet<usize> = self.sources.iter().filter(|s| keep(s)).map(|s| s.id).collect();
        if self.src_only {
            let mut catalog = self.clone();
            catalog.sources.retain(|s| kept.contains(&s.id));
            return catalog;
        }
        let observations = self
            .observations
            .iter()
            .filter(|o| o.source_ids().all(|id| kept.contains(&id)))
            .cloned()
            .collect();
        self.with_observations(observations)
    }

    /// Catalog keeping the observations passing `keep`.
    pub(crate) fn retain_observations(&self, keep: impl FnMut(&&Observation) -> bool) -> Self {
        let observations = self.observations.iter().filter(keep).cloned().collect();
        self.with_observations(observations)
    }

    pub(crate) fn sources_mut(&mut self) -> &mut [Source] {
        &mut self.sources
    }

    pub(crate) fn observations_mut(&mut self) -> &mut [Observation] {
        &mut self.observations
    }

    /// Append `other`, shifting its source ids past this catalog's largest id.
    pub fn append(&self, other: &TravelTimeCatalog) -> Result<Self, AppError> {
        let offset = self.sources.iter().map(|s| s.id + 1).max().unwrap_or(0);
        let mut sources = self.sources.clone();
        let mut observations = self.observations.clone();

        sources.extend(other.sources.iter().cloned().map(|mut s| {
            s.id += offset;
            s
        }));
        observations.extend(other.observations.iter().cloned().map(|mut o| {
            o.src_id += offset;
            if let ObservationKind::CommonReceiver { src_id2, .. } = &mut o.kind {
                *src_id2 += offset;
            }
            o
        }));

        if self.src_only && other.src_only {
            return Self::source_only(sources);
        }
        let mut merged = Self::new(sources, observations)?;
        merged.group_by_source();
        merged.update_num_rec();
        Ok(merged)
    }

    /// Fill `dist_deg` of absolute observations from source and station positions.
    pub fn calc_distance(&mut self) {
        let positions: HashMap<usize, (f64, f64)> = self.sources.iter().map(|s| (s.id, (s.evla, s.evlo))).collect();
        for obs in self.observations.iter_mut().filter(|o| o.is_absolute()) {
            if let Some(&(la, lo)) = positions.get(&obs.src_id) {
                obs.dist_deg = Some(delta_deg(la, lo, obs.station.stla, obs.station.stlo));
            }
        }
    }
}

fn same_position(a: &Station, b: &Station) -> bool {
    (a.stla - b.stla).abs() <= STATION_COORD_TOL
        && (a.stlo - b.stlo).abs() <= STATION_COORD_TOL
        && (a.stel - b.stel).abs() <= STATION_COORD_TOL
}

fn check_weight(w: f64, what: impl FnOnce() -> String) -> Result<(), AppError> {
    if !w.is_finite() || w < 0.0 {
        return Err(AppError::validation(format!(
            "Weight of {} must be finite and >= 0, got {w}.",
            what()
        )));
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod fixtures {
    use chrono::NaiveDate;

    use super::*;

    pub fn source(id: usize, evla: f64, evlo: f64, evdp: f64) -> Source {
        Source {
            id,
            origin_time: NaiveDate::from_ymd_opt(2020, 1, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap()
                + chrono::Duration::seconds(id as i64 * 3600),
            evla,
            evlo,
            evdp,
            mag: 3.0,
            num_rec: 0,
            event_name: format!("ev{id}"),
            weight: 1.0,
        }
    }

    pub fn station(name: &str, stla: f64, stlo: f64) -> Station {
        Station {
            name: name.to_string(),
            stla,
            stlo,
            stel: 100.0,
        }
    }

    pub fn obs(src_id: usize, st: &Station, phase: &str, tt: f64) -> Observation {
        Observation {
            src_id,
            rec_index: 0,
            station: st.clone(),
            phase: phase.to_string(),
            dist_deg: None,
            tt,
            weight: 1.0,
            residual: None,
            kind: ObservationKind::Absolute,
        }
    }
}
