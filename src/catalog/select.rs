//! Catalog filters. Each returns a new catalog; the input is left as is.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDateTime;

use crate::catalog::table::TravelTimeCatalog;
use crate::catalog::types::{Observation, ObservationKind, Source};
use crate::error::AppError;
use crate::grid::GridSpec;
use crate::math::delta_deg;

impl TravelTimeCatalog {
    /// Keep records whose sources and stations all lie inside the box
    /// (bounds inclusive).
    pub fn select_by_box_region(&self, lon: (f64, f64), lat: (f64, f64)) -> Result<Self, AppError> {
        check_range("longitude", lon)?;
        check_range("latitude", lat)?;
        let inside = |la: f64, lo: f64| la >= lat.0 && la <= lat.1 && lo >= lon.0 && lo <= lon.1;

        if self.is_source_only() {
            return Ok(self.retain_sources(|s| inside(s.evla, s.evlo)));
        }
        let src_inside: HashMap<usize, bool> = self
            .sources()
            .iter()
            .map(|s| (s.id, inside(s.evla, s.evlo)))
            .collect();
        let kept = self.retain_observations(|o| {
            o.source_ids().all(|id| src_inside.get(&id).copied().unwrap_or(false))
                && o.stations().all(|st| inside(st.stla, st.stlo))
        });
        log_filter("box region", self, &kept);
        Ok(kept)
    }

    /// Keep sources with `min <= evdp <= max`.
    pub fn select_by_depth(&self, depth: (f64, f64)) -> Result<Self, AppError> {
        check_range("depth", depth)?;
        let kept = self.retain_sources(|s| s.evdp >= depth.0 && s.evdp <= depth.1);
        log_filter("depth", self, &kept);
        Ok(kept)
    }

    /// Keep records whose every source-station distance (deg) lies in range.
    pub fn select_by_distance(&self, dist_deg: (f64, f64)) -> Result<Self, AppError> {
        check_range("distance", dist_deg)?;
        let pos: HashMap<usize, (f64, f64)> = self.sources().iter().map(|s| (s.id, (s.evla, s.evlo))).collect();
        let kept = self.retain_observations(|o| {
            pair_distances(o, &pos).into_iter().all(|d| d >= dist_deg.0 && d <= dist_deg.1)
        });
        log_filter("distance", self, &kept);
        Ok(kept)
    }

    /// Keep records of the listed phases.
    pub fn select_by_phase(&self, phases: &[&str]) -> Self {
        let kept = self.retain_observations(|o| phases.contains(&o.phase.as_str()));
        log_filter("phase", self, &kept);
        kept
    }

    /// Keep sources with `start <= origin_time <= end`.
    pub fn select_by_datetime(&self, start: NaiveDateTime, end: NaiveDateTime) -> Result<Self, AppError> {
        if start > end {
            return Err(AppError::config(format!("Empty time window: {start} is after {end}.")));
        }
        let kept = self.retain_sources(|s| s.origin_time >= start && s.origin_time <= end);
        log_filter("datetime", self, &kept);
        Ok(kept)
    }

    /// Keep sources with at least `min` observations.
    pub fn select_by_min_num_rec(&self, min: usize) -> Self {
        let kept = self.retain_sources(|s| s.num_rec >= min);
        log_filter("min num_rec", self, &kept);
        kept
    }

    /// Keep one source per cell of `grid`, the one with the lowest id. Sources
    /// outside the grid fall in cells of their own.
    pub fn select_one_event_in_each_subgrid(&self, grid: &GridSpec) -> Self {
        let mut best: BTreeMap<(i64, i64, i64), &Source> = BTreeMap::new();
        for s in self.sources() {
            let cell = grid.cell_of(s.evdp, s.evla, s.evlo);
            best.entry(cell)
                .and_modify(|cur| {
                    if s.id < cur.id {
                        *cur = s;
                    }
                })
                .or_insert(s);
        }
        let winners: Vec<usize> = best.values().map(|s| s.id).collect();
        let kept = self.retain_sources(|s| winners.contains(&s.id));
        log_filter("one event per subgrid", self, &kept);
        kept
    }
}

fn pair_distances(o: &Observation, pos: &HashMap<usize, (f64, f64)>) -> Vec<f64> {
    let first = pos.get(&o.src_id).copied();
    let second_src = match &o.kind {
        ObservationKind::CommonReceiver { evla2, evlo2, .. } => Some((*evla2, *evlo2)),
        _ => None,
    };
    let sources = first.into_iter().chain(second_src);
    let mut out = Vec::with_capacity(2);
    for (la, lo) in sources {
        for st in o.stations() {
            out.push(delta_deg(la, lo, st.stla, st.stlo));
        }
    }
    out
}

fn check_range(name: &str, range: (f64, f64)) -> Result<(), AppError> {
    if !(range.0.is_finite() && range.1.is_finite()) || range.0 > range.1 {
        return Err(AppError::config(format!(
            "Invalid {name} range [{}, {}]: must be finite with min <= max.",
            range.0, range.1
        )));
    }
    Ok(())
}

fn log_filter(name: &str, before: &TravelTimeCatalog, after: &TravelTimeCatalog) {
    tracing::info!(
        filter = name,
        sources = after.sources().len(),
        dropped_sources = before.sources().len().saturating_sub(after.sources().len()),
        observations = after.observations().len(),
        dropped_observations = before.observations().len().saturating_sub(after.observations().len()),
        "applied catalog filter"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::table::fixtures::*;

    fn sample() -> TravelTimeCatalog {
        let a = station("A", 30.0, 100.0);
        let b = station("B", 35.0, 105.0);
        TravelTimeCatalog::new(
            vec![
                source(0, 30.5, 100.5, 5.0),
                source(1, 31.0, 101.0, 50.0),
                source(2, 40.0, 110.0, 10.0),
            ],
            vec![
                obs(0, &a, "P", 5.0),
                obs(0, &b, "P", 40.0),
                obs(1, &a, "S", 12.0),
                obs(2, &a, "P", 90.0),
            ],
        )
        .unwrap()
    }

    #[test]
    fn depth_filter_drops_sources_and_their_rows() {
        let cat = sample().select_by_depth((0.0, 20.0)).unwrap();
        let ids: Vec<usize> = cat.sources().iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![0, 2]);
        assert!(cat.observations().iter().all(|o| o.src_id != 1));
    }

    #[test]
    fn box_filter_requires_source_and_station_inside() {
        let cat = sample().select_by_box_region((99.0, 102.0), (29.0, 32.0)).unwrap();
        // source 0 loses station B, source 2 is outside
        assert_eq!(cat.observations().len(), 2);
        assert_eq!(cat.source(0).unwrap().num_rec, 1);
        assert!(cat.source(2).is_none());
    }

    #[test]
    fn phase_filter_drops_orphans() {
        let cat = sample().select_by_phase(&["S"]);
        assert_eq!(cat.sources().len(), 1);
        assert_eq!(cat.sources()[0].id, 1);
    }

    #[test]
    fn distance_filter() {
        let cat = sample().select_by_distance((0.0, 2.0)).unwrap();
        assert_eq!(cat.observations().len(), 2);
        assert!(cat.observations().iter().all(|o| o.station.name == "A"));
    }

    #[test]
    fn subgrid_keeps_lowest_id_per_cell() {
        let grid = GridSpec::new((0.0, 100.0), (30.0, 36.0), (100.0, 106.0), (2, 2, 2)).unwrap();
        let a = station("A", 30.0, 100.0);
        let b = station("B", 35.0, 105.0);
        // 1 shares the cell of 0 but has more observations
        let cat = TravelTimeCatalog::new(
            vec![
                source(0, 31.0, 101.0, 50.0),
                source(1, 32.0, 102.0, 60.0),
                source(2, 40.0, 110.0, 10.0),
            ],
            vec![
                obs(0, &a, "P", 5.0),
                obs(1, &a, "P", 6.0),
                obs(1, &b, "P", 40.0),
                obs(2, &a, "P", 90.0),
            ],
        )
        .unwrap();
        let kept = cat.select_one_event_in_each_subgrid(&grid);
        let ids: Vec<usize> = kept.sources().iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![0, 2]);
    }

    #[test]
    fn subgrid_boundary_source_shares_last_cell() {
        let grid = GridSpec::new((0.0, 100.0), (30.0, 36.0), (100.0, 106.0), (2, 2, 2)).unwrap();
        let a = station("A", 30.0, 100.0);
        let cat = TravelTimeCatalog::new(
            vec![source(0, 33.0, 103.0, 50.0), source(1, 36.0, 106.0, 100.0)],
            vec![obs(0, &a, "P", 5.0), obs(1, &a, "P", 6.0)],
        )
        .unwrap();
        let kept = cat.select_one_event_in_each_subgrid(&grid);
        let ids: Vec<usize> = kept.sources().iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![0]);
    }

    #[test]
    fn invalid_range_is_config_error() {
        let err = sample().select_by_depth((10.0, 0.0)).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Config);
    }
}
