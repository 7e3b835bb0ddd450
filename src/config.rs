//! TomoATT parameter file (`input_params.yml`).
//!
//! Only the `domain` section is interpreted here; every other section is kept
//! as an untyped YAML tree so that `set_param` + `write` round-trip the file
//! without dropping solver settings we do not model.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};

use crate::error::AppError;
use crate::grid::GridSpec;

/// The `domain` section: ranges are `[min, max]`, `n_rtp` is `[n_dep, n_lat, n_lon]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainParams {
    pub min_max_dep: [f64; 2],
    pub min_max_lat: [f64; 2],
    pub min_max_lon: [f64; 2],
    pub n_rtp: [usize; 3],
}

impl DomainParams {
    pub fn grid_spec(&self) -> Result<GridSpec, AppError> {
        GridSpec::new(
            (self.min_max_dep[0], self.min_max_dep[1]),
            (self.min_max_lat[0], self.min_max_lat[1]),
            (self.min_max_lon[0], self.min_max_lon[1]),
            (self.n_rtp[0], self.n_rtp[1], self.n_rtp[2]),
        )
    }
}

/// Parsed parameter file.
#[derive(Debug, Clone)]
pub struct InputParams {
    path: PathBuf,
    root: Value,
}

impl InputParams {
    pub fn read(path: &Path) -> Result<Self, AppError> {
        let text = fs::read_to_string(path)
            .map_err(|e| AppError::io(format!("Failed to read parameter file '{}': {e}", path.display())))?;
        let mut params = Self::parse(&text)?;
        params.path = path.to_path_buf();
        Ok(params)
    }

    pub fn parse(text: &str) -> Result<Self, AppError> {
        let root: Value =
            serde_yaml::from_str(text).map_err(|e| AppError::config(format!("Invalid YAML parameter file: {e}")))?;
        if !root.is_mapping() {
            return Err(AppError::config("Parameter file must be a YAML mapping at the top level."));
        }
        Ok(Self {
            path: PathBuf::new(),
            root,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Typed view of the `domain` section.
    pub fn domain(&self) -> Result<DomainParams, AppError> {
        let section = self
            .root
            .get("domain")
            .ok_or_else(|| AppError::config("Missing `domain` section in parameter file."))?;
        serde_yaml::from_value(section.clone())
            .map_err(|e| AppError::config(format!("Invalid `domain` section: {e}")))
    }

    pub fn grid_spec(&self) -> Result<GridSpec, AppError> {
        self.domain()?.grid_spec()
    }

    /// Subdomain counts `parallel.ndiv_rtp`; a run without the key is undivided.
    pub fn ndiv_rtp(&self) -> Result<[usize; 3], AppError> {
        match self.get("parallel.ndiv_rtp") {
            None => Ok([1, 1, 1]),
            Some(v) => serde_yaml::from_value(v.clone())
                .map_err(|e| AppError::config(format!("Invalid `parallel.ndiv_rtp`: {e}"))),
        }
    }

    pub fn get(&self, dotted_key: &str) -> Option<&Value> {
        dotted_key
            .split('.')
            .try_fold(&self.root, |node, part| node.get(part))
    }

    /// Update (or create) a nested key such as `domain.n_rtp`.
    pub fn set_param(&mut self, dotted_key: &str, raw_value: &str) -> Result<(), AppError> {
        let parts: Vec<&str> = dotted_key.split('.').collect();
        if parts.iter().any(|p| p.is_empty()) {
            return Err(AppError::config(format!("Invalid parameter key '{dotted_key}'.")));
        }

        let (last, parents) = parts
            .split_last()
            .ok_or_else(|| AppError::config("Empty parameter key."))?;

        let mut node = &mut self.root;
        for part in parents {
            let map = node
                .as_mapping_mut()
                .ok_or_else(|| AppError::config(format!("Key '{dotted_key}' crosses a non-mapping value.")))?;
            node = map
                .entry(Value::from(*part))
                .or_insert_with(|| Value::Mapping(Mapping::new()));
        }

        let map = node
            .as_mapping_mut()
            .ok_or_else(|| AppError::config(format!("Key '{dotted_key}' crosses a non-mapping value.")))?;
        map.insert(Value::from(*last), parse_scalar(raw_value));
        tracing::debug!(key = dotted_key, value = raw_value, "parameter updated");
        Ok(())
    }

    /// Write back to `path`, or to the file this was read from.
    pub fn write(&self, path: Option<&Path>) -> Result<(), AppError> {
        let target = path.unwrap_or(&self.path);
        if target.as_os_str().is_empty() {
            return Err(AppError::config("No output path for parameter file."));
        }
        let text = serde_yaml::to_string(&self.root)
            .map_err(|e| AppError::config(format!("Failed to serialise parameters: {e}")))?;
        fs::write(target, text)
            .map_err(|e| AppError::io(format!("Failed to write parameter file '{}': {e}", target.display())))
    }
}

/// Interpret a command-line value: int, float, int list, float list, then string.
fn parse_scalar(raw: &str) -> Value {
    let raw = raw.trim();
    if let Ok(v) = raw.parse::<i64>() {
        return Value::from(v);
    }
    if let Ok(v) = raw.parse::<f64>() {
        return Value::from(v);
    }

    let inner = raw.trim_start_matches('[').trim_end_matches(']');
    if inner.contains(',') {
        let items: Vec<&str> = inner.split(',').map(str::trim).collect();
        if let Ok(ints) = items.iter().map(|s| s.parse::<i64>()).collect::<Result<Vec<_>, _>>() {
            return Value::Sequence(ints.into_iter().map(Value::from).collect());
        }
        if let Ok(floats) = items.iter().map(|s| s.parse::<f64>()).collect::<Result<Vec<_>, _>>() {
            return Value::Sequence(floats.into_iter().map(Value::from).collect());
        }
    }

    Value::from(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PARAMS: &str = "
domain:
  min_max_dep: [0, 100]
  min_max_lat: [30, 40]
  min_max_lon: [100, 110]
  n_rtp: [11, 11, 11]
test_section:
  key1: value1
";

    #[test]
    fn reads_domain_section() {
        let params = InputParams::parse(PARAMS).unwrap();
        let domain = params.domain().unwrap();
        assert_eq!(domain.n_rtp, [11, 11, 11]);
        assert_eq!(domain.min_max_lat, [30.0, 40.0]);
        assert_eq!(params.get("test_section.key1"), Some(&Value::from("value1")));
    }

    #[test]
    fn set_param_updates_and_creates_keys() {
        let mut params = InputParams::parse(PARAMS).unwrap();
        params.set_param("domain.n_rtp", "20,20,20").unwrap();
        assert_eq!(params.domain().unwrap().n_rtp, [20, 20, 20]);

        params.set_param("test_section.key1", "new_value").unwrap();
        assert_eq!(params.get("test_section.key1"), Some(&Value::from("new_value")));

        params.set_param("new_section.new_key", "123.45").unwrap();
        assert_eq!(params.get("new_section.new_key"), Some(&Value::from(123.45)));
    }

    #[test]
    fn ndiv_defaults_to_single_subdomain() {
        let mut params = InputParams::parse(PARAMS).unwrap();
        assert_eq!(params.ndiv_rtp().unwrap(), [1, 1, 1]);
        params.set_param("parallel.ndiv_rtp", "2,1,3").unwrap();
        assert_eq!(params.ndiv_rtp().unwrap(), [2, 1, 3]);
        params.set_param("parallel.ndiv_rtp", "two").unwrap();
        assert_eq!(params.ndiv_rtp().unwrap_err().kind(), crate::error::ErrorKind::Config);
    }

    #[test]
    fn missing_domain_is_config_error() {
        let params = InputParams::parse("other: 1\n").unwrap();
        let err = params.domain().unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Config);
    }
}
