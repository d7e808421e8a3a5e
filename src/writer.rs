//! NetCDF persistence of an [`NcDataset`] through the `netcdf` crate.
//!
//! [`NcWriter`] follows the library's call ordering as a typestate:
//!
//! ```text
//! create() ─▶ NcWriter<DefineMode> ─ end_define() ─▶ NcWriter<DataMode> ─ close()
//!             dimensions, attributes,                 put values
//!             variable declarations
//! ```
//!
//! There is no way back from data mode to define mode. If a writer is
//! dropped before `close`, the partially written file is deleted.

use crate::dataset::{AttrValue, Attributes, Dimension, NcDataset, NcType, VarData, Variable, FILL_VALUE_ATTR};
use crate::error::{GliderError, Result};
use log::{debug, warn};
use netcdf::types::{FloatType, IntType, NcVariableType};
use netcdf::AttributeValue;
use std::{
    collections::HashMap,
    fs,
    marker::PhantomData,
    path::{Path, PathBuf},
};

/// zlib level used for every dimensioned numeric variable.
pub const COMP_LEVEL: i32 = 1;

pub enum DefineMode {}
pub enum DataMode {}

impl From<&AttrValue> for AttributeValue {
    fn from(value: &AttrValue) -> AttributeValue {
        match value {
            AttrValue::Text(s) => AttributeValue::Str(s.clone()),
            AttrValue::Byte(v) => AttributeValue::Schar(*v),
            AttrValue::Short(v) => AttributeValue::Short(*v),
            AttrValue::Int(v) => AttributeValue::Int(*v),
            AttrValue::Long(v) => AttributeValue::Longlong(*v),
            AttrValue::Float(v) => AttributeValue::Float(*v),
            AttrValue::Double(v) => AttributeValue::Double(*v),
            AttrValue::Bytes(v) => AttributeValue::Schars(v.clone()),
            AttrValue::Shorts(v) => AttributeValue::Shorts(v.clone()),
            AttrValue::Ints(v) => AttributeValue::Ints(v.clone()),
            AttrValue::Doubles(v) => AttributeValue::Doubles(v.clone()),
        }
    }
}

impl From<AttributeValue> for AttrValue {
    #[allow(unreachable_patterns)]
    fn from(value: AttributeValue) -> AttrValue {
        match value {
            AttributeValue::Str(s) => AttrValue::Text(s),
            AttributeValue::Strs(v) => AttrValue::Text(v.join("\n")),
            AttributeValue::Schar(v) => AttrValue::Byte(v),
            AttributeValue::Uchar(v) => AttrValue::Short(i16::from(v)),
            AttributeValue::Short(v) => AttrValue::Short(v),
            AttributeValue::Ushort(v) => AttrValue::Int(i32::from(v)),
            AttributeValue::Int(v) => AttrValue::Int(v),
            AttributeValue::Uint(v) => AttrValue::Long(i64::from(v)),
            AttributeValue::Longlong(v) => AttrValue::Long(v),
            AttributeValue::Ulonglong(v) => AttrValue::Long(v as i64),
            AttributeValue::Float(v) => AttrValue::Float(v),
            AttributeValue::Double(v) => AttrValue::Double(v),
            AttributeValue::Schars(v) => AttrValue::Bytes(v),
            AttributeValue::Uchars(v) => AttrValue::Shorts(v.into_iter().map(i16::from).collect()),
            AttributeValue::Shorts(v) => AttrValue::Shorts(v),
            AttributeValue::Ushorts(v) => AttrValue::Ints(v.into_iter().map(i32::from).collect()),
            AttributeValue::Ints(v) => AttrValue::Ints(v),
            AttributeValue::Uints(v) => AttrValue::Doubles(v.into_iter().map(f64::from).collect()),
            AttributeValue::Longlongs(v) => AttrValue::Doubles(v.into_iter().map(|x| x as f64).collect()),
            AttributeValue::Ulonglongs(v) => AttrValue::Doubles(v.into_iter().map(|x| x as f64).collect()),
            AttributeValue::Floats(v) => AttrValue::Doubles(v.into_iter().map(f64::from).collect()),
            AttributeValue::Doubles(v) => AttrValue::Doubles(v),
            other => AttrValue::Text(format!("{other:?}")),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────
// File handle that cleans up after itself
// ─────────────────────────────────────────────────────────────────────
struct Handle {
    file:      Option<netcdf::FileMut>,
    path:      PathBuf,
    committed: bool,
}

impl Handle {
    fn file(&mut self) -> Result<&mut netcdf::FileMut> {
        self.file
            .as_mut()
            .ok_or_else(|| GliderError::data(format!("{} is already closed", self.path.display())))
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        // closes the netCDF file
        drop(self.file.take());
        if !self.committed {
            match fs::remove_file(&self.path) {
                Ok(()) => warn!("removed incomplete {}", self.path.display()),
                Err(e) => warn!("cannot remove incomplete {}: {e}", self.path.display()),
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────
// Typestate writer
// ─────────────────────────────────────────────────────────────────────
pub struct NcWriter<S> {
    handle:     Handle,
    dimensions: HashMap<String, usize>,
    /// Declared type and element count of every variable.
    shapes:     HashMap<String, (NcType, Vec<usize>)>,
    _mode:      PhantomData<S>,
}

impl NcWriter<DefineMode> {
    /// Creates `path`, replacing any existing file.
    pub fn create(path: &Path) -> Result<NcWriter<DefineMode>> {
        if path.exists() {
            fs::remove_file(path)?;
        }
        let file = netcdf::create(path)?;
        Ok(NcWriter {
            handle:     Handle { file: Some(file), path: path.to_path_buf(), committed: false },
            dimensions: HashMap::new(),
            shapes:     HashMap::new(),
            _mode:      PhantomData,
        })
    }

    pub fn add_dimension(&mut self, dim: &Dimension) -> Result<()> {
        let file = self.handle.file()?;
        if dim.unlimited {
            file.add_unlimited_dimension(&dim.name)?;
        } else {
            file.add_dimension(&dim.name, dim.len)?;
        }
        self.dimensions.insert(dim.name.clone(), dim.len);
        Ok(())
    }

    pub fn add_global_attribute(&mut self, key: &str, value: &AttrValue) -> Result<()> {
        self.handle.file()?.add_attribute(key, AttributeValue::from(value))?;
        Ok(())
    }

    /// Declares `name` with the type, dimensions and attributes of `var`.
    /// The data in `var` is not written here.
    pub fn define_variable(&mut self, name: &str, var: &Variable) -> Result<()> {
        if self.shapes.contains_key(name) {
            return Err(GliderError::data(format!("variable `{name}` declared twice")));
        }
        let counts = var
            .dimensions
            .iter()
            .map(|d| {
                self.dimensions
                    .get(d)
                    .copied()
                    .ok_or_else(|| GliderError::data(format!("variable `{name}` uses undefined dimension `{d}`")))
            })
            .collect::<Result<Vec<_>>>()?;
        let dims: Vec<&str> = var.dimensions.iter().map(String::as_str).collect();
        let nc_type = var.nc_type();

        let file = self.handle.file()?;
        let mut v = match nc_type {
            NcType::Byte => file.add_variable::<i8>(name, &dims)?,
            NcType::Short => file.add_variable::<i16>(name, &dims)?,
            NcType::Int => file.add_variable::<i32>(name, &dims)?,
            NcType::Float => file.add_variable::<f32>(name, &dims)?,
            NcType::Double => file.add_variable::<f64>(name, &dims)?,
            NcType::Str => file.add_string_variable(name, &dims)?,
        };
        if !dims.is_empty() && nc_type != NcType::Str {
            v.set_compression(COMP_LEVEL, false)?;
        }
        if let Some(fill) = var.fill_value() {
            let x = fill
                .as_f64()
                .ok_or_else(|| GliderError::data(format!("variable `{name}` has a non-numeric fill value")))?;
            match nc_type {
                NcType::Byte => v.set_fill_value(x as i8)?,
                NcType::Short => v.set_fill_value(x as i16)?,
                NcType::Int => v.set_fill_value(x as i32)?,
                NcType::Float => v.set_fill_value(x as f32)?,
                NcType::Double => v.set_fill_value(x)?,
                NcType::Str => {}
            }
        }
        for (key, value) in &var.attributes {
            if key == FILL_VALUE_ATTR {
                continue;
            }
            v.put_attribute(key, AttributeValue::from(value))?;
        }

        self.shapes.insert(name.to_string(), (nc_type, counts));
        Ok(())
    }

    pub fn end_define(self) -> NcWriter<DataMode> {
        let NcWriter { handle, dimensions, shapes, .. } = self;
        NcWriter { handle, dimensions, shapes, _mode: PhantomData }
    }
}

impl NcWriter<DataMode> {
    /// Writes the whole of a declared variable. Empty data leaves the
    /// variable at its fill value.
    pub fn put(&mut self, name: &str, data: &VarData) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        let (nc_type, counts) = self
            .shapes
            .get(name)
            .cloned()
            .ok_or_else(|| GliderError::data(format!("variable `{name}` was never declared")))?;
        let expected: usize = counts.iter().product();
        if data.nc_type() != nc_type || data.len() != expected {
            return Err(GliderError::data(format!(
                "variable `{name}` declared as {nc_type:?}[{expected}], got {:?}[{}]",
                data.nc_type(),
                data.len()
            )));
        }
        let start = vec![0usize; counts.len()];
        let (start, count) = (&start[..], &counts[..]);

        let path = self.handle.path.clone();
        let mut v = self
            .handle
            .file()?
            .variable_mut(name)
            .ok_or_else(|| GliderError::data(format!("variable `{name}` missing from {}", path.display())))?;
        match data {
            VarData::Byte(d) => v.put_values(d, (start, count))?,
            VarData::Short(d) => v.put_values(d, (start, count))?,
            VarData::Int(d) => v.put_values(d, (start, count))?,
            VarData::Float(d) => v.put_values(d, (start, count))?,
            VarData::Double(d) => v.put_values(d, (start, count))?,
            VarData::Text(d) => {
                if counts.len() != 1 {
                    return Err(GliderError::data(format!("string variable `{name}` must be one-dimensional")));
                }
                for (i, s) in d.iter().enumerate() {
                    v.put_string(s, (i,))?;
                }
            }
        }
        Ok(())
    }

    pub fn close(mut self) -> Result<()> {
        self.handle.committed = true;
        drop(self.handle.file.take());
        Ok(())
    }
}

/// Writes `ds` to `path`. On any failure the file is removed.
pub fn write_dataset(path: &Path, ds: &NcDataset) -> Result<()> {
    let mut nc = NcWriter::create(path)?;
    for dim in &ds.dimensions {
        nc.add_dimension(dim)?;
    }
    for (key, value) in &ds.global_attributes {
        nc.add_global_attribute(key, value)?;
    }
    for (name, var) in &ds.variables {
        nc.define_variable(name, var)?;
    }

    let mut nc = nc.end_define();
    for (name, var) in &ds.variables {
        nc.put(name, &var.data)?;
    }
    nc.close()?;
    debug!("wrote {} variables to {}", ds.variables.len(), path.display());
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────
// Reading back
// ─────────────────────────────────────────────────────────────────────
fn nc_type_of(vartype: &NcVariableType) -> Option<NcType> {
    match vartype {
        NcVariableType::Int(IntType::I8) => Some(NcType::Byte),
        NcVariableType::Int(IntType::I16) => Some(NcType::Short),
        NcVariableType::Int(IntType::I32) => Some(NcType::Int),
        NcVariableType::Float(FloatType::F32) => Some(NcType::Float),
        NcVariableType::Float(FloatType::F64) => Some(NcType::Double),
        NcVariableType::String => Some(NcType::Str),
        _ => None,
    }
}

fn read_values(var: &netcdf::Variable<'_>, nc_type: NcType) -> Result<VarData> {
    Ok(match nc_type {
        NcType::Byte => VarData::Byte(var.get_values::<i8, _>(..)?),
        NcType::Short => VarData::Short(var.get_values::<i16, _>(..)?),
        NcType::Int => VarData::Int(var.get_values::<i32, _>(..)?),
        NcType::Float => VarData::Float(var.get_values::<f32, _>(..)?),
        NcType::Double => VarData::Double(var.get_values::<f64, _>(..)?),
        NcType::Str => VarData::Text((0..var.len()).map(|i| var.get_string((i,))).collect::<Result<_, _>>()?),
    })
}

/// Loads the structure of a NetCDF file, and the data of its variables when
/// `load_data` is set. Scalars come back with one value. Variables of types the model does not
/// cover are skipped.
pub fn read_dataset(path: &Path, load_data: bool) -> Result<NcDataset> {
    let file = netcdf::open(path)?;
    let mut ds = NcDataset::new();

    for dim in file.dimensions() {
        ds.add_dimension(&dim.name(), dim.len(), dim.is_unlimited());
    }
    for attr in file.attributes() {
        ds.global_attributes.insert(attr.name().to_string(), attr.value()?.into());
    }

    for var in file.variables() {
        let name = var.name();
        let Some(nc_type) = nc_type_of(&var.vartype()) else {
            warn!("{}: skipping `{name}` of unsupported type", path.display());
            continue;
        };
        let dimensions: Vec<String> = var.dimensions().iter().map(|d| d.name().to_string()).collect();
        let mut attributes = Attributes::new();
        for attr in var.attributes() {
            attributes.insert(attr.name().to_string(), attr.value()?.into());
        }
        let data = if load_data {
            read_values(&var, nc_type)?
        } else {
            VarData::empty(nc_type)
        };
        ds.add_variable(&name, Variable { dimensions, attributes, data });
    }

    Ok(ds)
}
