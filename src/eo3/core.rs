use chrono::{DateTime, SecondsFormat, Utc};
use derive_builder::Builder;
use garde::Validate;
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::{borrow::Cow, fmt};
use url::Url;

use crate::eo3::allowance::AllowancePolicy;

/// `$schema` of every eo3 dataset document.
pub const EO3_SCHEMA_URL: &str = "https://schemas.opendatacube.org/dataset";

/// Name of the grid measurements use when they don't name one.
pub const DEFAULT_GRID: &str = "default";

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

fn one_or_many<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    let value = Value::deserialize(deserializer)?;
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Array(_) => Vec::<T>::deserialize(value).map_err(de::Error::custom),
        other => Ok(vec![T::deserialize(other).map_err(de::Error::custom)?]),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Validate)]
pub struct Text(#[garde(length(min = 1))] pub Cow<'static, str>);

impl Text {
    pub fn new(text: impl ToString) -> Self {
        Self(Cow::Owned(text.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Text {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a parsed document claims to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocKind {
    Dataset,
    Product,
    MetadataType,
    StacItem,
    LegacyDataset,
    IngestionConfig,
}

impl DocKind {
    /// Filename suffix (before `.yaml`, `.json`...) used by convention for this kind.
    pub fn suffix(&self) -> Option<&'static str> {
        match self {
            DocKind::Dataset => Some(".odc-metadata"),
            DocKind::Product => Some(".odc-product"),
            DocKind::MetadataType => Some(".odc-type"),
            _ => None,
        }
    }

    pub fn from_suffix(suffix: &str) -> Option<Self> {
        match suffix.to_ascii_lowercase().as_str() {
            ".odc-metadata" => Some(DocKind::Dataset),
            ".odc-product" => Some(DocKind::Product),
            ".odc-type" => Some(DocKind::MetadataType),
            _ => None,
        }
    }
}

impl fmt::Display for DocKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let key = match self {
            DocKind::Dataset => "dataset",
            DocKind::Product => "product",
            DocKind::MetadataType => "metadata_type",
            DocKind::StacItem => "stac_item",
            DocKind::LegacyDataset => "legacy_dataset",
            DocKind::IngestionConfig => "ingestion_config",
        };
        write!(f, "{}", key)
    }
}

/// Raster sample types, named as ODC product definitions name them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum DataType {
    Bool,
    Int8,
    Uint8,
    Int16,
    Uint16,
    Int32,
    Uint32,
    Int64,
    Uint64,
    Float16,
    Float32,
    Float64,
}

impl DataType {
    pub fn is_float(&self) -> bool {
        matches!(self, DataType::Float16 | DataType::Float32 | DataType::Float64)
    }

    /// Is the value within this type's range?
    ///
    /// Integer types also need a whole number. Floats only check range, so
    /// `0.1` fits a `float32` though it is not exact there. NaN only fits
    /// floating point types.
    pub fn fits(&self, value: f64) -> bool {
        if value.is_nan() {
            return self.is_float();
        }
        let integral = value.fract() == 0.0;
        match self {
            DataType::Bool => value == 0.0 || value == 1.0,
            DataType::Int8 => integral && (i8::MIN as f64..=i8::MAX as f64).contains(&value),
            DataType::Uint8 => integral && (0.0..=u8::MAX as f64).contains(&value),
            DataType::Int16 => integral && (i16::MIN as f64..=i16::MAX as f64).contains(&value),
            DataType::Uint16 => integral && (0.0..=u16::MAX as f64).contains(&value),
            DataType::Int32 => integral && (i32::MIN as f64..=i32::MAX as f64).contains(&value),
            DataType::Uint32 => integral && (0.0..=u32::MAX as f64).contains(&value),
            DataType::Int64 => integral && (i64::MIN as f64..=i64::MAX as f64).contains(&value),
            DataType::Uint64 => integral && (0.0..=u64::MAX as f64).contains(&value),
            DataType::Float16 => value.is_infinite() || value.abs() <= 65504.0,
            DataType::Float32 => value.is_infinite() || value.abs() <= f32::MAX as f64,
            DataType::Float64 => true,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let key = match self {
            DataType::Bool => "bool",
            DataType::Int8 => "int8",
            DataType::Uint8 => "uint8",
            DataType::Int16 => "int16",
            DataType::Uint16 => "uint16",
            DataType::Int32 => "int32",
            DataType::Uint32 => "uint32",
            DataType::Int64 => "int64",
            DataType::Uint64 => "uint64",
            DataType::Float16 => "float16",
            DataType::Float32 => "float32",
            DataType::Float64 => "float64",
        };
        write!(f, "{}", key)
    }
}

impl FromStr for DataType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let dtype = match value.trim().to_ascii_lowercase().as_str() {
            "bool" => DataType::Bool,
            "int8" => DataType::Int8,
            "uint8" => DataType::Uint8,
            "int16" => DataType::Int16,
            "uint16" => DataType::Uint16,
            "int32" => DataType::Int32,
            "uint32" => DataType::Uint32,
            "int64" => DataType::Int64,
            "uint64" => DataType::Uint64,
            "float16" => DataType::Float16,
            "float32" => DataType::Float32,
            "float64" => DataType::Float64,
            other => return Err(format!("unknown dtype {other:?}")),
        };
        Ok(dtype)
    }
}

impl TryFrom<String> for DataType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// A nodata value: a number, or one of the strings `NaN`, `inf`, `-inf`
/// (JSON has no literal for them).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Nodata {
    Number(f64),
    Text(String),
}

impl Nodata {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Nodata::Number(n) => Some(*n),
            Nodata::Text(t) => match t.trim().to_ascii_lowercase().as_str() {
                "nan" => Some(f64::NAN),
                "inf" | "+inf" | "infinity" => Some(f64::INFINITY),
                "-inf" | "-infinity" => Some(f64::NEG_INFINITY),
                other => other.parse().ok(),
            },
        }
    }
}

impl fmt::Display for Nodata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Nodata::Number(n) => write!(f, "{n}"),
            Nodata::Text(t) => write!(f, "{t:?}"),
        }
    }
}

/// A property value, tagged by the shape it was written in.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    DateTime(DateTime<Utc>),
    Other(Value),
}

impl PropertyValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            PropertyValue::Null => "null",
            PropertyValue::Bool(_) => "bool",
            PropertyValue::Integer(_) => "int",
            PropertyValue::Float(_) => "float",
            PropertyValue::Text(_) => "str",
            PropertyValue::DateTime(_) => "datetime",
            PropertyValue::Other(Value::Array(_)) => "list",
            PropertyValue::Other(_) => "dict",
        }
    }
}

impl From<&Value> for PropertyValue {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => PropertyValue::Null,
            Value::Bool(b) => PropertyValue::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => PropertyValue::Integer(i),
                None => PropertyValue::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => PropertyValue::Text(s.clone()),
            other => PropertyValue::Other(other.clone()),
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Null => write!(f, "null"),
            PropertyValue::Bool(b) => write!(f, "{b}"),
            PropertyValue::Integer(i) => write!(f, "{i}"),
            PropertyValue::Float(v) => write!(f, "{v}"),
            PropertyValue::Text(s) => write!(f, "{s:?}"),
            PropertyValue::DateTime(dt) => {
                write!(f, "{}", dt.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
            PropertyValue::Other(v) => write!(f, "{v}"),
        }
    }
}

pub type Properties = Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder, Validate)]
pub struct ProductRef {
    #[garde(dive)]
    pub name: Text,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default)]
    #[garde(skip)]
    pub href: Option<Url>,
}

impl ProductRef {
    pub fn builder() -> ProductRefBuilder {
        ProductRefBuilder::default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder, Validate)]
pub struct Grid {
    /// `[height, width]`
    #[garde(length(min = 2, max = 2))]
    pub shape: Vec<u64>,
    /// Six affine coefficients, or nine ending in `0, 0, 1`.
    #[garde(length(min = 6, max = 9))]
    pub transform: Vec<f64>,
}

impl Grid {
    pub fn builder() -> GridBuilder {
        GridBuilder::default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder, Validate)]
pub struct Measurement {
    #[garde(dive)]
    pub path: Text,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default)]
    #[garde(range(min = 1))]
    pub band: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default)]
    #[garde(length(min = 1))]
    pub grid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default)]
    #[garde(skip)]
    pub layer: Option<String>,
}

impl Measurement {
    pub fn builder() -> MeasurementBuilder {
        MeasurementBuilder::default()
    }

    pub fn grid_name(&self) -> &str {
        self.grid.as_deref().unwrap_or(DEFAULT_GRID)
    }

    pub fn band_index(&self) -> u32 {
        self.band.unwrap_or(1)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder, Validate)]
pub struct Accessory {
    #[garde(dive)]
    pub path: Text,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    #[builder(default)]
    #[garde(skip)]
    pub kind: Option<String>,
}

impl Accessory {
    pub fn builder() -> AccessoryBuilder {
        AccessoryBuilder::default()
    }
}

/// An eo3 dataset document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder, Validate)]
pub struct DatasetDoc {
    #[serde(rename = "$schema")]
    #[builder(default = "EO3_SCHEMA_URL.to_string()")]
    #[garde(skip)]
    pub schema: String,
    #[garde(dive)]
    pub id: Text,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default)]
    #[garde(length(min = 1))]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default)]
    #[garde(dive)]
    pub product: Option<ProductRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default)]
    #[garde(skip)]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default)]
    #[garde(length(min = 1))]
    pub crs: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default)]
    #[garde(skip)]
    pub geometry: Option<Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    #[builder(default)]
    #[garde(dive)]
    pub grids: BTreeMap<String, Grid>,
    #[garde(skip)]
    pub properties: Properties,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    #[builder(default)]
    #[garde(dive)]
    pub measurements: BTreeMap<String, Measurement>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    #[builder(default)]
    #[garde(dive)]
    pub accessories: BTreeMap<String, Accessory>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default)]
    #[garde(skip)]
    pub lineage: Option<Value>,
}

impl DatasetDoc {
    pub fn builder() -> DatasetDocBuilder {
        DatasetDocBuilder::default()
    }

    /// The product this dataset claims, falling back to the `odc:product` property.
    pub fn product_name(&self) -> Option<&str> {
        self.product
            .as_ref()
            .map(|p| p.name.as_str())
            .or_else(|| self.properties.get("odc:product").and_then(Value::as_str))
    }

    pub fn has_some_geo(&self) -> bool {
        self.geometry.as_ref().is_some_and(|g| !g.is_null())
            || !self.grids.is_empty()
            || self.crs.is_some()
    }
}

/// One measurement a product expects every dataset to have.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder, Validate)]
pub struct MeasurementDefinition {
    #[garde(dive)]
    pub name: Text,
    #[garde(skip)]
    pub dtype: DataType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default)]
    #[garde(skip)]
    pub nodata: Option<Nodata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default)]
    #[garde(skip)]
    pub units: Option<String>,
    #[serde(default, deserialize_with = "one_or_many", skip_serializing_if = "Vec::is_empty")]
    #[builder(default)]
    #[garde(inner(length(min = 1)))]
    pub aliases: Vec<String>,
}

impl MeasurementDefinition {
    pub fn builder() -> MeasurementDefinitionBuilder {
        MeasurementDefinitionBuilder::default()
    }
}

/// A product's `metadata_type`: a name, or an inline definition carrying one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataTypeRef {
    Name(String),
    Inline(Map<String, Value>),
}

impl MetadataTypeRef {
    pub fn name(&self) -> Option<&str> {
        match self {
            MetadataTypeRef::Name(name) => Some(name),
            MetadataTypeRef::Inline(doc) => doc.get("name").and_then(Value::as_str),
        }
    }
}

/// A product definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder, Validate)]
pub struct ProductDefinition {
    #[garde(dive)]
    pub name: Text,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default)]
    #[garde(skip)]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default)]
    #[garde(skip)]
    pub license: Option<String>,
    #[garde(skip)]
    pub metadata_type: MetadataTypeRef,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    #[builder(default)]
    #[garde(skip)]
    pub metadata: Map<String, Value>,
    /// Products don't have to have measurements: null reads as none.
    #[serde(
        default,
        deserialize_with = "null_as_empty",
        skip_serializing_if = "Vec::is_empty"
    )]
    #[builder(default)]
    #[garde(dive)]
    pub measurements: Vec<MeasurementDefinition>,
    /// Parsed separately so a malformed section is reported on its own.
    #[serde(default, skip_deserializing, skip_serializing_if = "AllowancePolicy::is_empty")]
    #[builder(default)]
    #[garde(skip)]
    pub default_allowances: AllowancePolicy,
}

impl ProductDefinition {
    pub fn builder() -> ProductDefinitionBuilder {
        ProductDefinitionBuilder::default()
    }

    pub fn measurement(&self, name: &str) -> Option<&MeasurementDefinition> {
        self.measurements.iter().find(|m| m.name.as_str() == name)
    }
}

/// One field a metadata type makes searchable, with where to find it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchField {
    pub name: String,
    /// Alternative paths into a dataset document. Any one resolving is enough.
    pub offsets: Vec<Vec<String>>,
    pub nullable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A registered metadata type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataType {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Search fields, in declaration order.
    pub fields: Vec<SearchField>,
    /// Offsets of the type's system fields (`id`, `sources`, `measurements`...).
    pub system_offsets: Vec<Vec<String>>,
    pub default_allowances: AllowancePolicy,
}

impl MetadataType {
    /// Top-level dataset keys this type knows about.
    pub fn recognised_keys(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .flat_map(|f| f.offsets.iter())
            .chain(self.system_offsets.iter())
            .filter_map(|offset| offset.first().map(String::as_str))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn dtype_parses_and_displays() {
        let dtype: DataType = "UInt16".parse().unwrap();
        assert_eq!(dtype, DataType::Uint16);
        assert_eq!(dtype.to_string(), "uint16");
        assert!("complex64".parse::<DataType>().is_err());
    }

    #[test]
    fn dtype_fits_values() {
        assert!(DataType::Uint8.fits(3.0));
        assert!(!DataType::Uint8.fits(-3.0));
        assert!(DataType::Float32.fits(3.5));
        assert!(!DataType::Int16.fits(3.5));
        assert!(DataType::Float32.fits(f64::NAN));
        assert!(!DataType::Int32.fits(f64::NAN));
        assert!(DataType::Int16.fits(-999.0));
        assert!(!DataType::Uint16.fits(70000.0));
    }

    #[test]
    fn float_nodata_only_needs_to_be_in_range() {
        assert!(DataType::Float32.fits(0.1));
        assert!(DataType::Float32.fits(-0.0001));
        assert!(DataType::Float32.fits(f64::NEG_INFINITY));
        assert!(!DataType::Float32.fits(1e39));
        assert!(DataType::Float16.fits(0.1));
        assert!(!DataType::Float16.fits(70000.0));
    }

    #[test]
    fn nodata_strings_are_special_floats() {
        assert!(Nodata::Text("NaN".into()).as_f64().unwrap().is_nan());
        assert_eq!(Nodata::Text("-inf".into()).as_f64(), Some(f64::NEG_INFINITY));
        assert_eq!(Nodata::Number(-999.0).as_f64(), Some(-999.0));
        assert_eq!(Nodata::Text("nodata".into()).as_f64(), None);
    }

    #[test]
    fn dataset_defaults_are_applied() {
        let doc: DatasetDoc = serde_json::from_value(json!({
            "$schema": EO3_SCHEMA_URL,
            "id": "3fa85f64-5717-4562-b3fc-2c963f66afa6",
            "product": {"name": "fires"},
            "properties": {"datetime": "2020-01-01T00:00:00Z"},
            "measurements": {"red": {"path": "red.tif"}}
        }))
        .unwrap();
        let red = &doc.measurements["red"];
        assert_eq!(red.grid_name(), DEFAULT_GRID);
        assert_eq!(red.band_index(), 1);
        assert!(!doc.has_some_geo());
        assert_eq!(doc.product_name(), Some("fires"));
        assert!(doc.validate().is_ok());
    }

    #[test]
    fn garde_rejects_empty_paths() {
        let doc: DatasetDoc = serde_json::from_value(json!({
            "$schema": EO3_SCHEMA_URL,
            "id": "3fa85f64-5717-4562-b3fc-2c963f66afa6",
            "product": {"name": "fires"},
            "properties": {},
            "measurements": {"red": {"path": ""}}
        }))
        .unwrap();
        assert!(doc.validate().is_err());
    }

    #[test]
    fn product_metadata_type_may_be_inline() {
        let product: ProductDefinition = serde_json::from_value(json!({
            "name": "fires",
            "metadata_type": {"name": "eo3", "dataset": {"search_fields": {}}},
            "measurements": [{"name": "red", "dtype": "int16", "nodata": -999, "aliases": "band04"}]
        }))
        .unwrap();
        assert_eq!(product.metadata_type.name(), Some("eo3"));
        assert_eq!(product.measurement("red").unwrap().aliases, vec!["band04"]);
    }

    #[test]
    fn builders_fill_defaults() {
        let doc = DatasetDoc::builder()
            .id(Text::new("3fa85f64-5717-4562-b3fc-2c963f66afa6"))
            .product(Some(
                ProductRef::builder().name(Text::new("fires")).build().unwrap(),
            ))
            .properties(Properties::new())
            .build()
            .unwrap();
        assert_eq!(doc.schema, EO3_SCHEMA_URL);
        assert!(doc.measurements.is_empty());
    }

    #[test]
    fn property_values_keep_their_shape() {
        assert_eq!(PropertyValue::from(&json!(3)), PropertyValue::Integer(3));
        assert_eq!(PropertyValue::from(&json!(3.5)), PropertyValue::Float(3.5));
        assert_eq!(PropertyValue::from(&json!("x")).type_name(), "str");
        assert_eq!(PropertyValue::from(&json!([1])).type_name(), "list");
    }
}
