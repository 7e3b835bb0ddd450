//! Travel-time catalog text format (`src_rec`).
//!
//! Each event is a header line followed by `num_rec` observation lines:
//!
//! ```text
//! 0 2019 12 01 05 23 11.000000 30.5000 100.2000 10.0000 3.2000 2 ev_0001 1.0000
//!    0 0 ST01 30.1000 100.0000 1200.0000 P 5.2100 1.0000
//!    0 1 ST01 30.1000 100.0000 1200.0000 ST02 30.4000 100.9000 800.0000 P,cs -0.3200 1.0000
//! ```
//!
//! Header: `id year month day hour minute second evla evlo evdp mag num_rec
//! event_name [weight]`.
//!
//! Observation rows come in three shapes, told apart by the phase suffix:
//!
//! - absolute: `src rec sta stla stlo stel phase [dist] tt [weight]`
//! - common source: `src rec sta stla stlo stel rec2 sta2 stla2 stlo2 stel2 phase,cs tt [weight]`
//! - common receiver: `src rec sta stla stlo stel src2 event2 evla2 evlo2 evdp2 phase,cr tt [weight]`
//!
//! With `name_net_and_sta` every station name is preceded by a network column
//! and the two are joined as `NET_STA`. Missing weights default to 1.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::catalog::{DifferentialKind, Observation, ObservationKind, Source, Station, TravelTimeCatalog};
use crate::error::AppError;
use crate::math::delta_deg;

/// Receiver weights above this usually mean a distance column was not declared.
const SUSPICIOUS_WEIGHT: f64 = 10.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogReadOptions {
    /// Absolute rows carry an epicentral distance column before the travel time.
    pub dist_in_data: bool,
    /// Station names are split in network and station columns.
    pub name_net_and_sta: bool,
    /// Skip observation rows and keep the event list only.
    pub src_only: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogWriteOptions {
    /// Write the epicentral distance column on absolute rows.
    pub dist_in_data: bool,
}

pub fn read_catalog(path: &Path, opts: CatalogReadOptions) -> Result<TravelTimeCatalog, AppError> {
    let text = fs::read_to_string(path)
        .map_err(|e| AppError::io(format!("Failed to read catalog '{}': {e}", path.display())))?;
    let catalog = parse_catalog(&text, opts)
        .map_err(|e| AppError::new(e.kind(), format!("{}: {}", path.display(), e.message())))?;
    tracing::info!(
        path = %path.display(),
        sources = catalog.sources().len(),
        observations = catalog.observations().len(),
        "read catalog"
    );
    Ok(catalog)
}

pub fn parse_catalog(text: &str, opts: CatalogReadOptions) -> Result<TravelTimeCatalog, AppError> {
    let mut lines = text
        .lines()
        .enumerate()
        .map(|(i, l)| (i + 1, l.trim()))
        .filter(|(_, l)| !l.is_empty() && !l.starts_with('#'));

    let mut sources = Vec::new();
    let mut observations = Vec::new();
    while let Some((line_no, line)) = lines.next() {
        let row = Row::new(line_no, line);
        let source = parse_source(&row)?;
        for _ in 0..source.num_rec {
            let Some((obs_no, obs_line)) = lines.next() else {
                return Err(AppError::format(format!(
                    "line {line_no}: event {} announces {} observations, file ends early.",
                    source.id, source.num_rec
                )));
            };
            if opts.src_only {
                continue;
            }
            let obs = parse_observation(&Row::new(obs_no, obs_line), opts)?;
            if obs.src_id != source.id {
                return Err(AppError::format(format!(
                    "line {obs_no}: observation references event {}, expected {}.",
                    obs.src_id, source.id
                )));
            }
            if obs.weight > SUSPICIOUS_WEIGHT {
                tracing::warn!(line = obs_no, weight = obs.weight, "receiver weight above 10; is a distance column missing?");
            }
            observations.push(obs);
        }
        sources.push(source);
    }

    if opts.src_only {
        TravelTimeCatalog::source_only(sources)
    } else {
        TravelTimeCatalog::new(sources, observations)
    }
}

pub fn write_catalog(path: &Path, catalog: &TravelTimeCatalog, opts: CatalogWriteOptions) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::io(format!("Failed to create catalog '{}': {e}", path.display())))?;
    let mut out = BufWriter::new(file);
    write_catalog_to(&mut out, catalog, opts)
        .and_then(|_| out.flush())
        .map_err(|e| AppError::io(format!("Failed to write catalog '{}': {e}", path.display())))?;
    tracing::info!(
        path = %path.display(),
        sources = catalog.sources().len(),
        observations = catalog.observations().len(),
        "wrote catalog"
    );
    Ok(())
}

pub fn write_catalog_to(
    out: &mut impl Write,
    catalog: &TravelTimeCatalog,
    opts: CatalogWriteOptions,
) -> std::io::Result<()> {
    let mut by_source: std::collections::HashMap<usize, Vec<&Observation>> = std::collections::HashMap::new();
    for o in catalog.observations() {
        by_source.entry(o.src_id).or_default().push(o);
    }

    for s in catalog.sources() {
        let rows = by_source.remove(&s.id).unwrap_or_default();
        let num_rec = if catalog.is_source_only() { s.num_rec } else { rows.len() };
        writeln!(
            out,
            "{} {} {:.4} {:.4} {:.4} {:.4} {} {} {:.4}",
            s.id,
            s.origin_time.format("%Y %m %d %H %M %S%.6f"),
            s.evla,
            s.evlo,
            s.evdp,
            s.mag,
            num_rec,
            s.event_name,
            s.weight
        )?;
        for o in rows {
            write_observation(out, s, o, opts)?;
        }
    }
    Ok(())
}

fn write_observation(out: &mut impl Write, src: &Source, o: &Observation, opts: CatalogWriteOptions) -> std::io::Result<()> {
    let st = &o.station;
    write!(
        out,
        "   {} {} {} {:6.4} {:6.4} {:6.4}",
        o.src_id, o.rec_index, st.name, st.stla, st.stlo, st.stel
    )?;
    match &o.kind {
        ObservationKind::Absolute => {
            write!(out, " {}", o.phase)?;
            if opts.dist_in_data {
                let dist = o
                    .dist_deg
                    .unwrap_or_else(|| delta_deg(src.evla, src.evlo, st.stla, st.stlo));
                write!(out, " {dist:6.4}")?;
            }
        }
        ObservationKind::CommonSource { rec_index2, station2 } => {
            write!(
                out,
                " {} {} {:6.4} {:6.4} {:6.4} {},cs",
                rec_index2, station2.name, station2.stla, station2.stlo, station2.stel, o.phase
            )?;
        }
        ObservationKind::CommonReceiver {
            src_id2,
            event_name2,
            evla2,
            evlo2,
            evdp2,
        } => {
            write!(
                out,
                " {src_id2} {event_name2} {evla2:6.4} {evlo2:6.4} {evdp2:6.4} {},cr",
                o.phase
            )?;
        }
    }
    writeln!(out, " {:6.4} {:6.4}", o.tt, o.weight)
}

/// Whitespace-split line with its 1-based line number for error messages.
struct Row<'a> {
    line: usize,
    fields: Vec<&'a str>,
}

impl<'a> Row<'a> {
    fn new(line: usize, text: &'a str) -> Self {
        Self {
            line,
            fields: text.split_whitespace().collect(),
        }
    }

    fn len(&self) -> usize {
        self.fields.len()
    }

    fn str(&self, i: usize) -> &'a str {
        self.fields[i]
    }

    fn parse<T: std::str::FromStr>(&self, i: usize, what: &str) -> Result<T, AppError>
    where
        T::Err: std::fmt::Display,
    {
        self.fields[i]
            .parse()
            .map_err(|e| AppError::format(format!("line {}: bad {what} '{}': {e}", self.line, self.fields[i])))
    }

    fn cardinality_error(&self, expected: &str) -> AppError {
        AppError::format(format!(
            "line {}: expected {expected} columns, found {}.",
            self.line,
            self.len()
        ))
    }
}

fn parse_source(row: &Row) -> Result<Source, AppError> {
    if !(13..=14).contains(&row.len()) {
        return Err(row.cardinality_error("13 or 14 (event header)"));
    }
    let origin_time = parse_origin_time(row)?;
    Ok(Source {
        id: row.parse(0, "event id")?,
        origin_time,
        evla: row.parse(7, "evla")?,
        evlo: row.parse(8, "evlo")?,
        evdp: row.parse(9, "evdp")?,
        mag: row.parse(10, "magnitude")?,
        num_rec: row.parse(11, "num_rec")?,
        event_name: row.str(12).to_string(),
        weight: if row.len() == 14 { row.parse(13, "weight")? } else { 1.0 },
    })
}

fn parse_origin_time(row: &Row) -> Result<NaiveDateTime, AppError> {
    let year: i32 = row.parse(1, "year")?;
    let month: u32 = row.parse(2, "month")?;
    let day: u32 = row.parse(3, "day")?;
    let hour: u32 = row.parse(4, "hour")?;
    let minute: u32 = row.parse(5, "minute")?;
    let second: f64 = row.parse(6, "second")?;
    if !(0.0..=61.0).contains(&second) {
        return Err(AppError::format(format!("line {}: bad second {second}.", row.line)));
    }
    let base = NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|d| d.and_hms_opt(hour, minute, 0))
        .ok_or_else(|| {
            AppError::format(format!(
                "line {}: invalid origin time {year}-{month}-{day} {hour}:{minute}.",
                row.line
            ))
        })?;
    Ok(base + Duration::microseconds((second * 1e6).round() as i64))
}

fn parse_observation(row: &Row, opts: CatalogReadOptions) -> Result<Observation, AppError> {
    let differential = row.fields.iter().find_map(|f| {
        let (_, suffix) = f.rsplit_once(',')?;
        DifferentialKind::from_suffix(suffix)
    });
    match differential {
        None => parse_absolute(row, opts),
        Some(kind) => parse_differential(row, kind, opts),
    }
}

/// Station name at `i`, consuming a preceding network column when configured.
/// Returns the name and the index after it.
fn station_name(row: &Row, i: usize, opts: CatalogReadOptions) -> (String, usize) {
    if opts.name_net_and_sta {
        (format!("{}_{}", row.str(i), row.str(i + 1)), i + 2)
    } else {
        (row.str(i).to_string(), i + 1)
    }
}

fn parse_station(row: &Row, i: usize, opts: CatalogReadOptions) -> Result<(Station, usize), AppError> {
    let (name, j) = station_name(row, i, opts);
    let station = Station {
        name,
        stla: row.parse(j, "stla")?,
        stlo: row.parse(j + 1, "stlo")?,
        stel: row.parse(j + 2, "stel")?,
    };
    Ok((station, j + 3))
}

fn parse_absolute(row: &Row, opts: CatalogReadOptions) -> Result<Observation, AppError> {
    let net = usize::from(opts.name_net_and_sta);
    let base = 8 + net + usize::from(opts.dist_in_data);
    if row.len() != base && row.len() != base + 1 {
        return Err(row.cardinality_error(&format!("{base} or {}", base + 1)));
    }
    let (station, i) = parse_station(row, 2, opts)?;
    let phase = row.str(i).to_string();
    let (dist_deg, i) = if opts.dist_in_data {
        (Some(row.parse(i + 1, "distance")?), i + 2)
    } else {
        (None, i + 1)
    };
    Ok(Observation {
        src_id: row.parse(0, "event index")?,
        rec_index: row.parse(1, "receiver index")?,
        station,
        phase,
        dist_deg,
        tt: row.parse(i, "travel time")?,
        weight: if row.len() == base + 1 { row.parse(i + 1, "weight")? } else { 1.0 },
        residual: None,
        kind: ObservationKind::Absolute,
    })
}

fn parse_differential(row: &Row, kind: DifferentialKind, opts: CatalogReadOptions) -> Result<Observation, AppError> {
    let net = usize::from(opts.name_net_and_sta);
    let base = match kind {
        DifferentialKind::CommonSource => 13 + 2 * net,
        DifferentialKind::CommonReceiver => 13 + net,
    };
    if row.len() != base && row.len() != base + 1 {
        return Err(row.cardinality_error(&format!("{base} or {}", base + 1)));
    }
    let (station, i) = parse_station(row, 2, opts)?;
    let (obs_kind, i) = match kind {
        DifferentialKind::CommonSource => {
            let rec_index2 = row.parse(i, "second receiver index")?;
            let (station2, j) = parse_station(row, i + 1, opts)?;
            (ObservationKind::CommonSource { rec_index2, station2 }, j)
        }
        DifferentialKind::CommonReceiver => (
            ObservationKind::CommonReceiver {
                src_id2: row.parse(i, "second event index")?,
                event_name2: row.str(i + 1).to_string(),
                evla2: row.parse(i + 2, "evla2")?,
                evlo2: row.parse(i + 3, "evlo2")?,
                evdp2: row.parse(i + 4, "evdp2")?,
            },
            i + 5,
        ),
    };
    let phase = row
        .str(i)
        .rsplit_once(',')
        .map(|(p, _)| p.to_string())
        .ok_or_else(|| AppError::format(format!("line {}: differential phase expected at column {}.", row.line, i + 1)))?;
    Ok(Observation {
        src_id: row.parse(0, "event index")?,
        rec_index: row.parse(1, "receiver index")?,
        station,
        phase,
        dist_deg: None,
        tt: row.parse(i + 1, "travel time")?,
        weight: if row.len() == base + 1 { row.parse(i + 2, "weight")? } else { 1.0 },
        residual: None,
        kind: obs_kind,
    })
}
