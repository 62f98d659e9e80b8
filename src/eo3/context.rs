//! The registry of metadata types and products known to one run.
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{info, warn};

use crate::eo3::allowance::ResolvedAllowances;
use crate::eo3::core::{MetadataType, ProductDefinition};
use crate::eo3::issues::{Findings, IssueCode};

/// Append-only. Entries are never replaced once registered.
#[derive(Debug, Clone, Default)]
pub struct ProductContext {
    metadata_types: BTreeMap<String, MetadataType>,
    products: BTreeMap<String, ProductDefinition>,
}

impl ProductContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a metadata type. A second definition of a name is ignored with a warning.
    pub fn register_metadata_type(&mut self, metadata_type: MetadataType, findings: &mut Findings) {
        if self.metadata_types.contains_key(&metadata_type.name) {
            warn!(name = %metadata_type.name, "metadata type redefined; keeping the first definition");
            findings.warning(
                IssueCode::DuplicateDefinition,
                format!(
                    "Metadata type {:?} was already defined; this definition is ignored",
                    metadata_type.name
                ),
            );
            return;
        }
        info!(name = %metadata_type.name, fields = metadata_type.fields.len(), "registered metadata type");
        self.metadata_types
            .insert(metadata_type.name.clone(), metadata_type);
    }

    /// Register a product. A second definition of a name is ignored with a warning.
    pub fn register_product(&mut self, product: ProductDefinition, findings: &mut Findings) {
        let name = product.name.as_str().to_string();
        if self.products.contains_key(&name) {
            warn!(name = %name, "product redefined; keeping the first definition");
            findings.warning(
                IssueCode::DuplicateDefinition,
                format!("Product {name:?} was already defined; this definition is ignored"),
            );
            return;
        }
        info!(name = %name, measurements = product.measurements.len(), "registered product");
        self.products.insert(name, product);
    }

    pub fn product(&self, name: &str) -> Option<&ProductDefinition> {
        self.products.get(name)
    }

    pub fn products(&self) -> impl Iterator<Item = &ProductDefinition> {
        self.products.values()
    }

    pub fn metadata_type(&self, name: &str) -> Option<&MetadataType> {
        self.metadata_types.get(name)
    }

    /// The metadata type a product refers to, if it has been registered.
    pub fn product_metadata_type(&self, product: &ProductDefinition) -> Option<&MetadataType> {
        product
            .metadata_type
            .name()
            .and_then(|name| self.metadata_type(name))
    }

    /// The effective allowances for datasets of a product.
    pub fn allowances(&self, product: &ProductDefinition) -> ResolvedAllowances {
        let type_policy = self
            .product_metadata_type(product)
            .map(|t| &t.default_allowances);
        ResolvedAllowances::resolve(Some(&product.default_allowances), type_policy)
    }

    /// The registered product whose `metadata` section differs least from the document.
    pub fn closest_product(&self, doc: &Value) -> Option<(&ProductDefinition, Vec<String>)> {
        self.products
            .values()
            .map(|product| (product, metadata_differences(doc, &product.metadata)))
            .min_by_key(|(_, differences)| differences.len())
    }

    /// Every registered product whose `metadata` section the document contains, by name.
    pub fn matching_products(&self, doc: &Value) -> Vec<&ProductDefinition> {
        self.products
            .values()
            .filter(|product| metadata_differences(doc, &product.metadata).is_empty())
            .collect()
    }
}

/// Leaf values of a nested mapping, with the keys leading to each.
fn flatten<'a>(path: Vec<&'a str>, value: &'a Value, out: &mut Vec<(Vec<&'a str>, &'a Value)>) {
    match value {
        Value::Object(map) if !map.is_empty() => {
            for (key, inner) in map {
                let mut path = path.clone();
                path.push(key);
                flatten(path, inner, out);
            }
        }
        other => out.push((path, other)),
    }
}

/// Lines describing where a document differs from a product's `metadata` section.
///
/// Empty when the document contains the whole section. Keys may contain dots.
pub fn metadata_differences(doc: &Value, metadata: &serde_json::Map<String, Value>) -> Vec<String> {
    let mut expected = Vec::new();
    for (key, value) in metadata {
        flatten(vec![key.as_str()], value, &mut expected);
    }
    expected
        .into_iter()
        .filter_map(|(path, want)| {
            let found = path
                .iter()
                .try_fold(doc, |current, segment| current.get(*segment));
            let path = path.join(".");
            match found {
                Some(have) if have == want => None,
                Some(have) => Some(format!("{path}: {have} != {want}")),
                None => Some(format!("{path}: null != {want}")),
            }
        })
        .collect()
}
