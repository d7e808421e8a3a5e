//! In-memory model of a NetCDF file: dimensions, global attributes and
//! variables with their attributes and data.
//!
//! The writer persists an [`NcDataset`], the reader loads one back, and the
//! validator inspects one. Nothing here touches the `netcdf` crate.

use log::warn;
use std::collections::BTreeMap;

/// Sorted so files come out with a stable attribute order.
pub type Attributes = BTreeMap<String, AttrValue>;

/// Name of the attribute that carries a variable's fill value.
pub const FILL_VALUE_ATTR: &str = "_FillValue";

// ─────────────────────────────────────────────────────────────────────
// Default fill values (the netCDF-C defaults)
// ─────────────────────────────────────────────────────────────────────
pub const FILL_I8:  i8  = -127;
pub const FILL_I16: i16 = -32_767;
pub const FILL_I32: i32 = -2_147_483_647;
pub const FILL_F32: f32 = 9.969_209_968_386_869e36;
pub const FILL_F64: f64 = 9.969_209_968_386_869e36;

#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Text(String),
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Bytes(Vec<i8>),
    Shorts(Vec<i16>),
    Ints(Vec<i32>),
    Doubles(Vec<f64>),
}

impl AttrValue {
    /// Empty text (after trimming) and empty arrays count as empty.
    pub fn is_empty(&self) -> bool {
        match self {
            AttrValue::Text(s) => s.trim().is_empty(),
            AttrValue::Bytes(v) => v.is_empty(),
            AttrValue::Shorts(v) => v.is_empty(),
            AttrValue::Ints(v) => v.is_empty(),
            AttrValue::Doubles(v) => v.is_empty(),
            _ => false,
        }
    }

    /// Scalar numeric value, if there is one.
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            AttrValue::Byte(v) => Some(f64::from(v)),
            AttrValue::Short(v) => Some(f64::from(v)),
            AttrValue::Int(v) => Some(f64::from(v)),
            AttrValue::Long(v) => Some(v as f64),
            AttrValue::Float(v) => Some(f64::from(v)),
            AttrValue::Double(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        AttrValue::Text(s.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(s: String) -> Self {
        AttrValue::Text(s)
    }
}

impl From<i8> for AttrValue {
    fn from(v: i8) -> Self {
        AttrValue::Byte(v)
    }
}

impl From<i16> for AttrValue {
    fn from(v: i16) -> Self {
        AttrValue::Short(v)
    }
}

impl From<i32> for AttrValue {
    fn from(v: i32) -> Self {
        AttrValue::Int(v)
    }
}

impl From<f64> for AttrValue {
    fn from(v: f64) -> Self {
        AttrValue::Double(v)
    }
}

/// Storage type of a variable. Config files use the numpy-style codes
/// (`i1`, `i2`, `i4`, `f4`, `f8`, `str`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NcType {
    Byte,
    Short,
    Int,
    Float,
    Double,
    Str,
}

impl NcType {
    pub fn from_code(code: &str) -> Option<NcType> {
        match code {
            "i1" | "b" | "byte" => Some(NcType::Byte),
            "i2" | "short" => Some(NcType::Short),
            "i4" | "int" => Some(NcType::Int),
            "f4" | "float" => Some(NcType::Float),
            "f8" | "double" => Some(NcType::Double),
            "str" | "S1" | "string" => Some(NcType::Str),
            _ => None,
        }
    }

    /// The netCDF default fill for this type, `None` for strings.
    pub fn default_fill(self) -> Option<AttrValue> {
        match self {
            NcType::Byte => Some(AttrValue::Byte(FILL_I8)),
            NcType::Short => Some(AttrValue::Short(FILL_I16)),
            NcType::Int => Some(AttrValue::Int(FILL_I32)),
            NcType::Float => Some(AttrValue::Float(FILL_F32)),
            NcType::Double => Some(AttrValue::Double(FILL_F64)),
            NcType::Str => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum VarData {
    Byte(Vec<i8>),
    Short(Vec<i16>),
    Int(Vec<i32>),
    Float(Vec<f32>),
    Double(Vec<f64>),
    Text(Vec<String>),
}

impl VarData {
    pub fn empty(nc_type: NcType) -> VarData {
        match nc_type {
            NcType::Byte => VarData::Byte(Vec::new()),
            NcType::Short => VarData::Short(Vec::new()),
            NcType::Int => VarData::Int(Vec::new()),
            NcType::Float => VarData::Float(Vec::new()),
            NcType::Double => VarData::Double(Vec::new()),
            NcType::Str => VarData::Text(Vec::new()),
        }
    }

    /// Converts a numeric column into `nc_type`, mapping `fill` (and NaN)
    /// onto the variable's own fill value. Values the type cannot hold are
    /// written as fill too, with a warning.
    pub fn from_f64(values: &[f64], fill: f64, nc_type: NcType) -> VarData {
        let missing = |v: f64| v.is_nan() || v == fill;
        let mut clipped = 0usize;
        let mut cast = |lo: f64, hi: f64| {
            let mut out = Vec::with_capacity(values.len());
            for &v in values {
                if missing(v) {
                    out.push(None);
                } else if v.trunc() < lo || v.trunc() > hi {
                    clipped += 1;
                    out.push(None);
                } else {
                    out.push(Some(v));
                }
            }
            out
        };
        let data = match nc_type {
            NcType::Byte => VarData::Byte(
                cast(i8::MIN as f64, i8::MAX as f64).into_iter().map(|v| v.map_or(FILL_I8, |v| v as i8)).collect(),
            ),
            NcType::Short => VarData::Short(
                cast(i16::MIN as f64, i16::MAX as f64).into_iter().map(|v| v.map_or(FILL_I16, |v| v as i16)).collect(),
            ),
            NcType::Int => VarData::Int(
                cast(i32::MIN as f64, i32::MAX as f64).into_iter().map(|v| v.map_or(FILL_I32, |v| v as i32)).collect(),
            ),
            NcType::Float => VarData::Float(
                cast(f32::MIN as f64, f32::MAX as f64).into_iter().map(|v| v.map_or(FILL_F32, |v| v as f32)).collect(),
            ),
            NcType::Double => VarData::Double(
                values.iter().map(|&v| if missing(v) { FILL_F64 } else { v }).collect(),
            ),
            NcType::Str => VarData::Text(
                values.iter().map(|&v| if missing(v) { String::new() } else { v.to_string() }).collect(),
            ),
        };
        if clipped > 0 {
            warn!("{clipped} values out of {nc_type:?} range written as fill");
        }
        data
    }

    pub fn len(&self) -> usize {
        match self {
            VarData::Byte(v) => v.len(),
            VarData::Short(v) => v.len(),
            VarData::Int(v) => v.len(),
            VarData::Float(v) => v.len(),
            VarData::Double(v) => v.len(),
            VarData::Text(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn nc_type(&self) -> NcType {
        match self {
            VarData::Byte(_) => NcType::Byte,
            VarData::Short(_) => NcType::Short,
            VarData::Int(_) => NcType::Int,
            VarData::Float(_) => NcType::Float,
            VarData::Double(_) => NcType::Double,
            VarData::Text(_) => NcType::Str,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Dimension {
    pub name:      String,
    pub len:       usize,
    pub unlimited: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub dimensions: Vec<String>,
    pub attributes: Attributes,
    pub data:       VarData,
}

impl Variable {
    pub fn new(nc_type: NcType, dimensions: &[&str]) -> Variable {
        Variable {
            dimensions: dimensions.iter().map(|d| d.to_string()).collect(),
            attributes: Attributes::new(),
            data:       VarData::empty(nc_type),
        }
    }

    /// Scalar variable used purely as an attribute container
    /// (`platform`, `instrument_*`).
    pub fn container() -> Variable {
        Variable::new(NcType::Byte, &[])
    }

    pub fn with_attr(mut self, key: &str, value: impl Into<AttrValue>) -> Variable {
        self.attributes.insert(key.to_string(), value.into());
        self
    }

    pub fn with_default_fill(mut self) -> Variable {
        if let Some(fill) = self.data.nc_type().default_fill() {
            self.attributes.insert(FILL_VALUE_ATTR.to_string(), fill);
        }
        self
    }

    pub fn with_data(mut self, data: VarData) -> Variable {
        self.data = data;
        self
    }

    pub fn nc_type(&self) -> NcType {
        self.data.nc_type()
    }

    pub fn fill_value(&self) -> Option<&AttrValue> {
        self.attributes.get(FILL_VALUE_ATTR)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NcDataset {
    pub dimensions:        Vec<Dimension>,
    pub global_attributes: Attributes,
    pub variables:         BTreeMap<String, Variable>,
}

impl NcDataset {
    pub fn new() -> NcDataset {
        NcDataset::default()
    }

    pub fn add_dimension(&mut self, name: &str, len: usize, unlimited: bool) {
        match self.dimensions.iter_mut().find(|d| d.name == name) {
            Some(existing) => {
                existing.len = len;
                existing.unlimited = unlimited;
            }
            None => self.dimensions.push(Dimension { name: name.to_string(), len, unlimited }),
        }
    }

    pub fn dimension(&self, name: &str) -> Option<&Dimension> {
        self.dimensions.iter().find(|d| d.name == name)
    }

    pub fn has_dimension(&self, name: &str) -> bool {
        self.dimension(name).is_some()
    }

    pub fn add_variable(&mut self, name: &str, variable: Variable) {
        self.variables.insert(name.to_string(), variable);
    }

    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variables.get(name)
    }

    pub fn set_global_attribute(&mut self, key: &str, value: impl Into<AttrValue>) {
        self.global_attributes.insert(key.to_string(), value.into());
    }

    /// Number of elements in `name` according to its dimensions; a scalar
    /// has one element.
    pub fn variable_size(&self, name: &str) -> Option<usize> {
        let var = self.variables.get(name)?;
        Some(
            var.dimensions
                .iter()
                .map(|d| self.dimension(d).map_or(0, |dim| dim.len))
                .product(),
        )
    }
}
