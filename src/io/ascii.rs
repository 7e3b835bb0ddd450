//! Plain-text background samples.
//!
//! One sample per line. Columns are separated by whitespace unless a single-byte
//! delimiter is given, in which case the file goes through the `csv` reader.
//! Lines starting with `#` are comments. There is no header row.

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::model::background::{BackgroundSample, ScatteredSet};

/// Zero-based column positions of each field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AsciiColumns {
    pub lon: usize,
    pub lat: usize,
    pub depth: usize,
    pub value: usize,
    pub xi: Option<usize>,
    pub eta: Option<usize>,
    pub delimiter: Option<u8>,
}

impl Default for AsciiColumns {
    fn default() -> Self {
        Self {
            lon: 0,
            lat: 1,
            depth: 2,
            value: 3,
            xi: None,
            eta: None,
            delimiter: None,
        }
    }
}

impl AsciiColumns {
    /// Build from a `lon,lat,dep,val` permutation such as `[1, 0, 2, 3]`.
    pub fn from_order(order: [usize; 4]) -> Self {
        Self {
            lon: order[0],
            lat: order[1],
            depth: order[2],
            value: order[3],
            ..Self::default()
        }
    }

    fn min_fields(&self) -> usize {
        [self.lon, self.lat, self.depth, self.value]
            .into_iter()
            .chain(self.xi)
            .chain(self.eta)
            .max()
            .unwrap_or(0)
            + 1
    }
}

pub fn read_ascii_samples(path: &Path, columns: &AsciiColumns) -> Result<ScatteredSet, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::io(format!("Failed to open model file '{}': {e}", path.display())))?;
    parse_ascii_samples(file, columns)
        .map_err(|e| AppError::new(e.kind(), format!("{}: {}", path.display(), e.message())))
}

pub fn parse_ascii_samples(reader: impl Read, columns: &AsciiColumns) -> Result<ScatteredSet, AppError> {
    let rows = match columns.delimiter {
        Some(delim) => delimited_rows(reader, delim)?,
        None => whitespace_rows(reader)?,
    };

    let need = columns.min_fields();
    let mut samples = Vec::with_capacity(rows.len());
    let mut xi = columns.xi.map(|_| Vec::with_capacity(rows.len()));
    let mut eta = columns.eta.map(|_| Vec::with_capacity(rows.len()));

    for (line, fields) in rows {
        if fields.len() < need {
            return Err(AppError::format(format!(
                "line {line}: expected at least {need} columns, found {}.",
                fields.len()
            )));
        }
        let num = |col: usize| -> Result<f64, AppError> {
            fields[col].parse::<f64>().map_err(|e| {
                AppError::format(format!("line {line}, column {}: '{}' ({e})", col + 1, fields[col]))
            })
        };
        samples.push(BackgroundSample {
            lon: num(columns.lon)?,
            lat: num(columns.lat)?,
            depth: num(columns.depth)?,
            value: num(columns.value)?,
            kind: None,
        });
        if let (Some(col), Some(out)) = (columns.xi, xi.as_mut()) {
            out.push(num(col)?);
        }
        if let (Some(col), Some(out)) = (columns.eta, eta.as_mut()) {
            out.push(num(col)?);
        }
    }

    tracing::debug!(samples = samples.len(), "read ascii background");
    Ok(ScatteredSet { samples, xi, eta })
}

type Row = (usize, Vec<String>);

fn whitespace_rows(reader: impl Read) -> Result<Vec<Row>, AppError> {
    let mut rows = Vec::new();
    for (idx, line) in BufReader::new(reader).lines().enumerate() {
        let line = line.map_err(|e| AppError::io(format!("Failed to read line {}: {e}", idx + 1)))?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        rows.push((idx + 1, trimmed.split_whitespace().map(str::to_string).collect()));
    }
    Ok(rows)
}

fn delimited_rows(reader: impl Read, delimiter: u8) -> Result<Vec<Row>, AppError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .delimiter(delimiter)
        .comment(Some(b'#'))
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut rows = Vec::new();
    for result in csv_reader.records() {
        let record = result.map_err(|e| AppError::format(format!("CSV parse error: {e}")))?;
        let line = record.position().map(|p| p.line() as usize).unwrap_or(0);
        if record.iter().all(str::is_empty) {
            continue;
        }
        rows.push((line, record.iter().map(str::to_string).collect()));
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn reads_whitespace_with_comments() {
        let text = "# lon lat dep vp\n100.0 30.0 0.0 5.8\n\n100.5  30.5  10.0  6.1\n";
        let set = parse_ascii_samples(text.as_bytes(), &AsciiColumns::default()).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.samples[1].depth, 10.0);
        assert_eq!(set.samples[1].value, 6.1);
        assert!(set.xi.is_none());
    }

    #[test]
    fn honours_column_order_and_delimiter() {
        let text = "30.0,100.0,5.0,6.0,0.01,-0.02\n31.0,101.0,6.0,6.5,0.0,0.0\n";
        let cols = AsciiColumns {
            xi: Some(4),
            eta: Some(5),
            delimiter: Some(b','),
            ..AsciiColumns::from_order([1, 0, 2, 3])
        };
        let set = parse_ascii_samples(text.as_bytes(), &cols).unwrap();
        assert_eq!(set.samples[0].lon, 100.0);
        assert_eq!(set.samples[0].lat, 30.0);
        assert_eq!(set.xi.as_deref(), Some(&[0.01, 0.0][..]));
        assert_eq!(set.eta.as_deref(), Some(&[-0.02, 0.0][..]));
    }

    #[test]
    fn short_row_is_format_error() {
        let text = "100.0 30.0 0.0 5.8\n100.0 30.0 0.0\n";
        let err = parse_ascii_samples(text.as_bytes(), &AsciiColumns::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Format);
        assert!(err.message().contains("line 2"));
    }

    #[test]
    fn non_numeric_is_format_error() {
        let text = "100.0 30.0 abc 5.8\n";
        let err = parse_ascii_samples(text.as_bytes(), &AsciiColumns::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Format);
    }
}
