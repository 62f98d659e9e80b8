//! The JSON schemas dataset, product and metadata type documents are
//! checked against before they are deserialised.
use jsonschema::{Draft, Validator};
use serde_json::Value;
use std::fmt;
use std::sync::LazyLock;

use crate::eo3::errors::{Error, Result};

/// One of the embedded document schemas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocSchema {
    Dataset,
    Product,
    MetadataType,
}

static DATASET: LazyLock<Result<Validator, String>> =
    LazyLock::new(|| compile(DocSchema::Dataset));
static PRODUCT: LazyLock<Result<Validator, String>> =
    LazyLock::new(|| compile(DocSchema::Product));
static METADATA_TYPE: LazyLock<Result<Validator, String>> =
    LazyLock::new(|| compile(DocSchema::MetadataType));

impl DocSchema {
    pub fn name(&self) -> &'static str {
        match self {
            DocSchema::Dataset => "dataset.schema.json",
            DocSchema::Product => "product.schema.json",
            DocSchema::MetadataType => "metadata_type.schema.json",
        }
    }

    fn source(&self) -> &'static str {
        match self {
            DocSchema::Dataset => include_str!("../../schemas/dataset.schema.json"),
            DocSchema::Product => include_str!("../../schemas/product.schema.json"),
            DocSchema::MetadataType => include_str!("../../schemas/metadata_type.schema.json"),
        }
    }

    fn validator(&self) -> Result<&'static Validator> {
        let compiled = match self {
            DocSchema::Dataset => &*DATASET,
            DocSchema::Product => &*PRODUCT,
            DocSchema::MetadataType => &*METADATA_TYPE,
        };
        compiled.as_ref().map_err(|reason| Error::Schema {
            name: self.name(),
            reason: reason.clone(),
        })
    }

    /// Every place the document breaks the schema, in schema order.
    pub fn violations(&self, instance: &Value) -> Result<Vec<Violation>> {
        let validator = self.validator()?;
        Ok(validator
            .iter_errors(instance)
            .map(|e| Violation {
                path: dotted(&e.instance_path.to_string()),
                message: e.to_string(),
            })
            .collect())
    }
}

fn compile(schema: DocSchema) -> Result<Validator, String> {
    let value: Value = serde_json::from_str(schema.source()).map_err(|e| e.to_string())?;
    let mut opts = jsonschema::options();
    opts.with_draft(Draft::Draft7);
    opts.build(&value).map_err(|e| e.to_string())
}

/// `/grids/default/shape/0` as `grids.default.shape.0`.
fn dotted(pointer: &str) -> String {
    pointer
        .split('/')
        .skip(1)
        .map(|segment| segment.replace("~1", "/").replace("~0", "~"))
        .collect::<Vec<_>>()
        .join(".")
}

/// A value that breaks its document's schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Dotted path to the value, empty for the document root.
    pub path: String,
    pub message: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "({}) {}", self.path, self.message)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn embedded_schemas_compile() {
        for schema in [DocSchema::Dataset, DocSchema::Product, DocSchema::MetadataType] {
            assert!(schema.validator().is_ok(), "{} does not compile", schema.name());
        }
    }

    #[test]
    fn pointers_become_dotted_paths() {
        assert_eq!(dotted(""), "");
        assert_eq!(dotted("/grids/default/shape/0"), "grids.default.shape.0");
        assert_eq!(dotted("/measurements/a~1b"), "measurements.a/b");
    }

    #[test]
    fn violations_carry_the_instance_path() {
        let doc = json!({
            "id": "x",
            "product": {"name": "fires"},
            "properties": {"datetime": "2020-01-01"},
            "grids": {"default": {"shape": [10], "transform": [1, 0, 0, 0, 1, 0]}}
        });
        let violations = DocSchema::Dataset.violations(&doc).unwrap();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].path, "grids.default.shape");
        assert!(violations[0].to_string().starts_with("(grids.default.shape) "));
    }

    #[test]
    fn root_violations_have_no_path() {
        let violations = DocSchema::Product.violations(&json!({"name": "fires"})).unwrap();
        assert!(!violations.is_empty());
        assert!(violations.iter().all(|v| v.path.is_empty()));
        assert!(violations[0].message.contains("is a required property"));
    }
}
