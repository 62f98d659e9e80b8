//! Structural checks: document shape, identifiers, and the fields a
//! metadata type expects.
//!
//! Each checker validates the raw document against its embedded JSON schema
//! first, then deserialises the typed model and applies its `garde` rules.
//! Typed values are only returned for documents that passed both.
use garde::Validate;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;
use uuid::Uuid;

use crate::eo3::allowance::{AllowancePolicy, ResolvedAllowances};
use crate::eo3::core::{DatasetDoc, EO3_SCHEMA_URL, MetadataType, ProductDefinition, SearchField};
use crate::eo3::issues::{Findings, IssueCode, Level};
use crate::eo3::schemas::DocSchema;

/// Top-level keys every eo3 dataset may carry, whatever its metadata type.
pub const BASE_DATASET_KEYS: &[&str] = &[
    "$schema",
    "id",
    "label",
    "product",
    "location",
    "locations",
    "crs",
    "geometry",
    "grids",
    "properties",
    "measurements",
    "accessories",
    "lineage",
    "extent",
    "grid_spatial",
];

/// Offsets a metadata type declares outside its search fields.
const SYSTEM_OFFSETS: &[&str] = &[
    "id",
    "sources",
    "grid_spatial",
    "measurements",
    "creation_dt",
    "label",
    "format",
];

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Raise every schema violation under `code`. True when there were any.
fn check_schema(schema: DocSchema, doc: &Value, code: IssueCode, findings: &mut Findings) -> bool {
    let violations = match schema.violations(doc) {
        Ok(violations) => violations,
        Err(e) => {
            findings.error(code, e.to_string());
            return true;
        }
    };
    for violation in &violations {
        let hint = (schema == DocSchema::Dataset
            && violation.path == "crs"
            && violation.message.contains("is not of type"))
        .then(|| "epsg codes should be prefixed with 'epsg:1234'".to_string());
        findings.raise(Level::Error, code, violation.to_string(), hint);
    }
    !violations.is_empty()
}

fn raise_garde(report: garde::Report, code: IssueCode, findings: &mut Findings) {
    for (path, error) in report.iter() {
        let path = path.to_string();
        let message = if path.is_empty() {
            error.to_string()
        } else {
            format!("({path}) {error}")
        };
        findings.error(code, message);
    }
}

/// Check a dataset document's shape, returning its typed form when it is sound.
///
/// A missing or foreign `$schema` stops all further checks, as does any
/// structure error.
pub fn check_dataset(doc: &Value, findings: &mut Findings) -> Option<DatasetDoc> {
    match doc.get("$schema") {
        None => {
            findings.error(
                IssueCode::NoSchema,
                format!(
                    "No $schema field. You probably want an ODC dataset schema {EO3_SCHEMA_URL:?}"
                ),
            );
            return None;
        }
        Some(Value::String(schema)) if schema == EO3_SCHEMA_URL => {}
        Some(schema) => {
            findings.error(
                IssueCode::UnknownDocType,
                format!(
                    "Unknown doc schema {schema}. Only ODC datasets are supported ({EO3_SCHEMA_URL:?})"
                ),
            );
            return None;
        }
    }

    if check_schema(DocSchema::Dataset, doc, IssueCode::Structure, findings) {
        return None;
    }

    let dataset: DatasetDoc = match serde_json::from_value(doc.clone()) {
        Ok(dataset) => dataset,
        Err(e) => {
            findings.error(IssueCode::Structure, e.to_string());
            return None;
        }
    };
    if let Err(report) = dataset.validate() {
        raise_garde(report, IssueCode::Structure, findings);
        return None;
    }

    if Uuid::parse_str(dataset.id.as_str()).is_err() {
        findings.error(
            IssueCode::InvalidId,
            format!("Dataset id {:?} is not a valid UUID", dataset.id.as_str()),
        );
    }
    Some(dataset)
}

enum FieldState {
    Present,
    Null,
    Missing,
}

fn field_state(doc: &Value, offsets: &[Vec<String>]) -> FieldState {
    let mut state = FieldState::Missing;
    for offset in offsets {
        let found = offset
            .iter()
            .try_fold(doc, |current, segment| current.get(segment.as_str()));
        match found {
            Some(Value::Null) => state = FieldState::Null,
            Some(_) => return FieldState::Present,
            None => {}
        }
    }
    state
}

/// Check a dataset against the fields its metadata type expects.
pub fn check_type_fields(
    doc: &Value,
    metadata_type: &MetadataType,
    allowances: &ResolvedAllowances,
    findings: &mut Findings,
) {
    for field in metadata_type.fields.iter().filter(|f| !f.nullable) {
        match field_state(doc, &field.offsets) {
            FieldState::Present => {}
            FieldState::Null if allowances.allows_null_field(&field.name) => {}
            FieldState::Null => findings.raise(
                Level::Error,
                IssueCode::NullField,
                format!(
                    "Field {:?} of metadata type {:?} is null",
                    field.name, metadata_type.name
                ),
                Some(format!(
                    "Add {:?} to allow_nullable_fields if it is optional",
                    field.name
                )),
            ),
            FieldState::Missing if allowances.allows_missing_field(&field.name) => {}
            FieldState::Missing => findings.raise(
                Level::Error,
                IssueCode::MissingField,
                format!(
                    "Dataset has no {:?} field, required by metadata type {:?}",
                    field.name, metadata_type.name
                ),
                Some(format!("Expected at {}", describe_offsets(&field.offsets))),
            ),
        }
    }

    let recognised: BTreeSet<&str> = BASE_DATASET_KEYS
        .iter()
        .copied()
        .chain(metadata_type.recognised_keys())
        .collect();
    if let Some(root) = doc.as_object() {
        for key in root.keys() {
            if !recognised.contains(key.as_str()) {
                findings.warning(
                    IssueCode::UnknownField,
                    format!(
                        "Field {key:?} is not known to metadata type {:?}",
                        metadata_type.name
                    ),
                );
            }
        }
    }
}

fn describe_offsets(offsets: &[Vec<String>]) -> String {
    offsets
        .iter()
        .map(|o| o.join("."))
        .collect::<Vec<_>>()
        .join(" or ")
}

fn check_allowances(doc: &Map<String, Value>, findings: &mut Findings) -> AllowancePolicy {
    let Some(section) = doc.get("default_allowances") else {
        return AllowancePolicy::default();
    };
    match AllowancePolicy::from_value(section) {
        Ok(policy) => policy,
        Err(e) => {
            findings.error(
                IssueCode::InvalidAllowances,
                format!("Invalid default_allowances: {e}"),
            );
            AllowancePolicy::default()
        }
    }
}

/// Check a product definition, returning it when it can be registered.
pub fn check_product(doc: &Value, findings: &mut Findings) -> Option<ProductDefinition> {
    let failed = check_schema(DocSchema::Product, doc, IssueCode::DocumentSchema, findings);
    let root = doc.as_object()?;

    // Worded separately: products list their measurements, datasets map them.
    if let Some(measurements) = root
        .get("measurements")
        .filter(|m| !m.is_array() && !m.is_null())
    {
        findings.error(
            IssueCode::MeasurementsList,
            format!(
                "Product measurements should be a list/sequence (Found a '{}').",
                type_name(measurements)
            ),
        );
        return None;
    }
    if failed {
        return None;
    }

    let mut product: ProductDefinition = match serde_json::from_value(doc.clone()) {
        Ok(product) => product,
        Err(e) => {
            findings.error(IssueCode::DocumentSchema, e.to_string());
            return None;
        }
    };
    if let Err(report) = product.validate() {
        raise_garde(report, IssueCode::DocumentSchema, findings);
        return None;
    }

    if product.license.as_deref().is_none_or(|l| l.trim().is_empty()) {
        findings.raise(
            Level::Warning,
            IssueCode::NoLicense,
            format!("Product {:?} has no license field", product.name.as_str()),
            Some(r#"Eg. "CC-BY-4.0" (SPDX format), "various" or "proprietary""#.to_string()),
        );
    }

    let mut seen: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for measurement in &product.measurements {
        let name = measurement.name.as_str();
        let fits = match &measurement.nodata {
            None => true,
            Some(nodata) => nodata
                .as_f64()
                .is_some_and(|value| measurement.dtype.fits(value)),
        };
        if !fits {
            let nodata = measurement
                .nodata
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_default();
            findings.error(
                IssueCode::UnsuitableNodata,
                format!(
                    "Measurement {name:?} nodata {nodata} does not fit a '{}'",
                    measurement.dtype
                ),
            );
        }

        let these: Vec<&str> = std::iter::once(name)
            .chain(measurement.aliases.iter().map(String::as_str))
            .collect();
        for &field in &these {
            if let Some(users) = seen.get(field).filter(|users| !users.is_empty()) {
                let seen_in = std::iter::once(name)
                    .chain(users.iter().copied())
                    .map(|s| format!("{s:?}"))
                    .collect::<Vec<_>>()
                    .join(" and ");
                findings.raise(
                    Level::Error,
                    IssueCode::DuplicateMeasurementName,
                    format!("Name {field:?} is used by multiple measurements"),
                    Some(format!(
                        "It's duplicated in an alias. Seen in measurement(s) {seen_in}"
                    )),
                );
            }
        }
        let mut sorted = these.clone();
        sorted.sort_unstable();
        for pair in sorted.windows(2) {
            if pair[0] == pair[1] {
                findings.info(
                    IssueCode::DuplicateAliasName,
                    format!(
                        "Measurement {name:?} has a duplicate alias named {:?}",
                        pair[0]
                    ),
                );
            }
        }
        for field in these {
            seen.entry(field).or_default().push(name);
        }
    }

    product.default_allowances = check_allowances(root, findings);
    debug!(product = product.name.as_str(), "product definition checked");
    Some(product)
}

/// A search field as written in a metadata type.
#[derive(Debug, Deserialize)]
struct SearchFieldDoc {
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    nullable: bool,
    #[serde(default)]
    offset: Option<Vec<String>>,
    #[serde(default)]
    min_offset: Vec<Vec<String>>,
    #[serde(default)]
    max_offset: Vec<Vec<String>>,
}

impl SearchFieldDoc {
    fn into_field(self, name: &str) -> SearchField {
        let offsets = match self.offset {
            Some(offset) => vec![offset],
            None => self.min_offset.into_iter().chain(self.max_offset).collect(),
        };
        SearchField {
            name: name.to_string(),
            offsets,
            nullable: self.nullable,
            description: self.description,
        }
    }
}

#[derive(Debug, Deserialize)]
struct MetadataTypeDoc {
    name: String,
    #[serde(default)]
    description: Option<String>,
    dataset: Map<String, Value>,
}

fn metadata_type_from(doc: &Value) -> serde_json::Result<MetadataType> {
    let definition = MetadataTypeDoc::deserialize(doc)?;
    let system_offsets = SYSTEM_OFFSETS
        .iter()
        .filter_map(|key| definition.dataset.get(*key))
        .map(Vec::<String>::deserialize)
        .collect::<Result<Vec<_>, _>>()?;
    let mut fields = Vec::new();
    if let Some(search_fields) = definition
        .dataset
        .get("search_fields")
        .and_then(Value::as_object)
    {
        for (name, field) in search_fields {
            fields.push(SearchFieldDoc::deserialize(field)?.into_field(name));
        }
    }
    Ok(MetadataType {
        name: definition.name,
        description: definition.description,
        fields,
        system_offsets,
        default_allowances: AllowancePolicy::default(),
    })
}

/// Check a metadata type definition, returning it when it can be registered.
pub fn check_metadata_type(doc: &Value, findings: &mut Findings) -> Option<MetadataType> {
    if check_schema(DocSchema::MetadataType, doc, IssueCode::DocumentSchema, findings) {
        return None;
    }
    let mut metadata_type = match metadata_type_from(doc) {
        Ok(metadata_type) => metadata_type,
        Err(e) => {
            findings.error(IssueCode::DocumentSchema, e.to_string());
            return None;
        }
    };
    if let Some(root) = doc.as_object() {
        metadata_type.default_allowances = check_allowances(root, findings);
    }
    debug!(metadata_type = metadata_type.name.as_str(), "metadata type checked");
    Some(metadata_type)
}
