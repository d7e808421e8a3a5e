//! Loading of the JSON configuration directory.
//!
//! ```text
//! <config>/global_attributes.json
//! <config>/datatypes.json
//! <config>/<glider>/deployment.json
//! <config>/<glider>/instruments.json
//! ```
//!
//! Everything is read up front into a [`GliderConfig`] which the rest of the
//! pipeline borrows immutably.

use crate::dataset::{AttrValue, Attributes};
use crate::datatypes::DatatypeMapper;
use crate::error::{GliderError, Result};
use log::debug;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::{
    fs,
    path::{Path, PathBuf},
};

pub const GLOBAL_ATTRIBUTES_FILE: &str = "global_attributes.json";
pub const DATATYPES_FILE:         &str = "datatypes.json";
pub const DEPLOYMENT_FILE:        &str = "deployment.json";
pub const INSTRUMENTS_FILE:       &str = "instruments.json";

pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let contents = fs::read_to_string(path)
        .map_err(|e| GliderError::config(path, format!("cannot read file: {e}")))?;
    serde_json::from_str(&contents)
        .map_err(|source| GliderError::ConfigJson { path: path.to_path_buf(), source })
}

/// Converts a JSON attribute value into an [`AttrValue`].
///
/// Integers become `Int` when they fit in 32 bits, `Long` otherwise.
/// Numeric arrays become `Ints` or `Doubles`. Objects, nulls and mixed
/// arrays have no NetCDF attribute form and are rejected.
pub fn attr_from_json(path: &Path, key: &str, value: &Value) -> Result<AttrValue> {
    let bad = || GliderError::config(path, format!("attribute `{key}` has unsupported value {value}"));
    match value {
        Value::String(s) => Ok(AttrValue::Text(s.clone())),
        Value::Bool(b) => Ok(AttrValue::Text(b.to_string())),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(i32::try_from(i).map_or(AttrValue::Long(i), AttrValue::Int))
            } else {
                n.as_f64().map(AttrValue::Double).ok_or_else(bad)
            }
        }
        Value::Array(items) if items.iter().all(|v| v.as_i64().and_then(|i| i32::try_from(i).ok()).is_some()) => {
            Ok(AttrValue::Ints(
                items.iter().filter_map(|v| v.as_i64()).map(|i| i as i32).collect(),
            ))
        }
        Value::Array(items) if items.iter().all(Value::is_number) => {
            Ok(AttrValue::Doubles(items.iter().filter_map(Value::as_f64).collect()))
        }
        _ => Err(bad()),
    }
}

pub fn attrs_from_json(path: &Path, map: &Map<String, Value>) -> Result<Attributes> {
    map.iter()
        .map(|(k, v)| Ok((k.clone(), attr_from_json(path, k, v)?)))
        .collect()
}

// ─────────────────────────────────────────────────────────────────────
// deployment.json / instruments.json
// ─────────────────────────────────────────────────────────────────────
#[derive(Debug, Deserialize)]
struct RawDeployment {
    glider:            String,
    trajectory_date:   String,
    #[serde(default)]
    global_attributes: Map<String, Value>,
    #[serde(default)]
    platform:          Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Deployment {
    pub glider:            String,
    pub trajectory_date:   String,
    pub global_attributes: Attributes,
    pub platform:          Attributes,
}

impl Deployment {
    pub fn load(path: &Path) -> Result<Deployment> {
        let raw: RawDeployment = read_json(path)?;
        Ok(Deployment {
            glider:            raw.glider,
            trajectory_date:   raw.trajectory_date,
            global_attributes: attrs_from_json(path, &raw.global_attributes)?,
            platform:          attrs_from_json(path, &raw.platform)?,
        })
    }

    /// Value stored in the `trajectory` variable.
    pub fn trajectory_id(&self) -> String {
        format!("{}-{}", self.glider, self.trajectory_date)
    }
}

#[derive(Debug, Deserialize)]
struct RawInstrument {
    name:  String,
    #[serde(default)]
    attrs: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Instrument {
    pub name:  String,
    pub attrs: Attributes,
}

pub fn load_instruments(path: &Path) -> Result<Vec<Instrument>> {
    let raw: Vec<RawInstrument> = read_json(path)?;
    raw.into_iter()
        .map(|r| {
            if r.name.is_empty() {
                return Err(GliderError::config(path, "instrument without a name"));
            }
            Ok(Instrument { name: r.name, attrs: attrs_from_json(path, &r.attrs)? })
        })
        .collect()
}

// ─────────────────────────────────────────────────────────────────────
// Whole configuration for one glider
// ─────────────────────────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub struct GliderConfig {
    pub config_dir:        PathBuf,
    /// Institution attributes overlaid with the deployment's own.
    pub global_attributes: Attributes,
    pub deployment:        Deployment,
    pub instruments:       Vec<Instrument>,
    pub datatypes:         DatatypeMapper,
}

impl GliderConfig {
    pub fn load(config_dir: &Path, glider: &str) -> Result<GliderConfig> {
        let global_path = config_dir.join(GLOBAL_ATTRIBUTES_FILE);
        let raw_global: Map<String, Value> = read_json(&global_path)?;
        let mut global_attributes = attrs_from_json(&global_path, &raw_global)?;

        let glider_dir = config_dir.join(glider);
        let deployment = Deployment::load(&glider_dir.join(DEPLOYMENT_FILE))?;
        let instruments = load_instruments(&glider_dir.join(INSTRUMENTS_FILE))?;
        let datatypes = DatatypeMapper::load(&config_dir.join(DATATYPES_FILE))?;

        for (k, v) in &deployment.global_attributes {
            global_attributes.insert(k.clone(), v.clone());
        }

        debug!(
            "loaded config for {glider}: {} global attributes, {} instruments, {} datatypes",
            global_attributes.len(),
            instruments.len(),
            datatypes.len()
        );

        Ok(GliderConfig {
            config_dir: config_dir.to_path_buf(),
            global_attributes,
            deployment,
            instruments,
            datatypes,
        })
    }
}
