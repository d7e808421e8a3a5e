//! Native glider field name → output variable mapping (`datatypes.json`).
//!
//! ```json
//! {
//!   "m_depth-m": {
//!     "name": "depth", "type": "f8", "dimension": "time",
//!     "attrs": { "units": "m", "standard_name": "depth" },
//!     "status_flag": { "attrs": { "long_name": "depth Quality Flag" } }
//!   },
//!   "timestamp": { "is_dimension": true },
//!   "m_unused-x": {}
//! }
//! ```
//!
//! Entries marked `is_dimension` and empty entries are not output variables,
//! so looking them up yields `None` just like an absent key.

use crate::config::{attrs_from_json, read_json};
use crate::dataset::{Attributes, NcType};
use crate::error::{GliderError, Result};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::{collections::HashMap, path::Path};

#[derive(Debug, Default, Deserialize)]
struct RawStatusFlag {
    #[serde(default)]
    attrs: Map<String, Value>,
}

#[derive(Debug, Default, Deserialize)]
struct RawDatatype {
    name:         Option<String>,
    #[serde(rename = "type")]
    nc_type:      Option<String>,
    dimension:    Option<String>,
    #[serde(default)]
    attrs:        Map<String, Value>,
    status_flag:  Option<RawStatusFlag>,
    #[serde(default)]
    is_dimension: bool,
}

/// Output description of one native field.
#[derive(Debug, Clone, PartialEq)]
pub struct Datatype {
    pub name:        String,
    pub nc_type:     NcType,
    pub dimension:   String,
    pub attrs:       Attributes,
    /// Attributes of the `<name>_qc` companion, when one is wanted.
    pub status_flag: Option<Attributes>,
}

impl Datatype {
    pub fn units(&self) -> Option<&str> {
        self.attrs.get("units").and_then(|v| v.as_str())
    }

    pub fn is_time_series(&self) -> bool {
        self.dimension == "time"
    }
}

#[derive(Debug, Clone, Default)]
pub struct DatatypeMapper {
    table: HashMap<String, Datatype>,
}

impl DatatypeMapper {
    pub fn load(path: &Path) -> Result<DatatypeMapper> {
        let raw: HashMap<String, RawDatatype> = read_json(path)?;
        let mut table = HashMap::with_capacity(raw.len());

        for (native, desc) in raw {
            if desc.is_dimension {
                continue;
            }
            let Some(name) = desc.name else {
                // `{}` placeholders are allowed, anything else needs a name
                if desc.nc_type.is_none() && desc.dimension.is_none() && desc.attrs.is_empty() {
                    continue;
                }
                return Err(GliderError::config(path, format!("datatype `{native}` has no name")));
            };
            let code = desc.nc_type.as_deref().unwrap_or("f8");
            let nc_type = NcType::from_code(code).ok_or_else(|| {
                GliderError::config(path, format!("datatype `{native}` has unknown type `{code}`"))
            })?;
            let status_flag = match desc.status_flag {
                Some(sf) => Some(attrs_from_json(path, &sf.attrs)?),
                None => None,
            };
            table.insert(
                native,
                Datatype {
                    name,
                    nc_type,
                    dimension: desc.dimension.unwrap_or_else(|| "time".to_string()),
                    attrs: attrs_from_json(path, &desc.attrs)?,
                    status_flag,
                },
            );
        }

        Ok(DatatypeMapper { table })
    }

    pub fn from_entries(entries: impl IntoIterator<Item = (String, Datatype)>) -> DatatypeMapper {
        DatatypeMapper { table: entries.into_iter().collect() }
    }

    /// Replaces the whole table. Needs `&mut self`, so it cannot run while a
    /// writing session still borrows the mapper.
    pub fn reload(&mut self, path: &Path) -> Result<()> {
        *self = DatatypeMapper::load(path)?;
        Ok(())
    }

    pub fn lookup(&self, native: &str) -> Option<&Datatype> {
        self.table.get(native)
    }

    /// Finds the datatype whose output name is `name`.
    pub fn by_output_name(&self, name: &str) -> Option<&Datatype> {
        self.table.values().find(|d| d.name == name)
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Datatype)> {
        self.table.iter().map(|(k, v)| (k.as_str(), v))
    }
}
