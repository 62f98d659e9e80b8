//! Allowances: per-scope relaxations of the default validation rules.
//!
//! A metadata type and a product may each declare a `default_allowances`
//! section. Every flag is optional; for each flag the most specific scope
//! that sets it wins (product, then metadata type, then the built-in
//! default). Sets are masked rather than merged.
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Which measurements a dataset may carry beyond its product's list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ExtraMeasurementsRepr", into = "ExtraMeasurementsRepr")]
pub enum ExtraMeasurements {
    All,
    Named(BTreeSet<String>),
}

impl Default for ExtraMeasurements {
    fn default() -> Self {
        Self::Named(BTreeSet::new())
    }
}

impl ExtraMeasurements {
    pub fn named<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Named(names.into_iter().map(Into::into).collect())
    }

    pub fn allows(&self, name: &str) -> bool {
        match self {
            Self::All => true,
            Self::Named(names) => names.contains(name),
        }
    }

    /// The union of two allowances. Only ever relaxes.
    pub fn union(&self, other: &Self) -> Self {
        match (self, other) {
            (Self::All, _) | (_, Self::All) => Self::All,
            (Self::Named(a), Self::Named(b)) => Self::Named(a.union(b).cloned().collect()),
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum ExtraMeasurementsRepr {
    Flag(bool),
    Keyword(String),
    Names(BTreeSet<String>),
}

impl TryFrom<ExtraMeasurementsRepr> for ExtraMeasurements {
    type Error = String;

    fn try_from(value: ExtraMeasurementsRepr) -> Result<Self, Self::Error> {
        match value {
            ExtraMeasurementsRepr::Flag(true) => Ok(Self::All),
            ExtraMeasurementsRepr::Flag(false) => Ok(Self::default()),
            ExtraMeasurementsRepr::Keyword(k) if k.eq_ignore_ascii_case("all") => Ok(Self::All),
            ExtraMeasurementsRepr::Keyword(k) => Err(format!(
                "expected \"all\" or a list of measurement names, got {k:?}"
            )),
            ExtraMeasurementsRepr::Names(names) => Ok(Self::Named(names)),
        }
    }
}

impl From<ExtraMeasurements> for ExtraMeasurementsRepr {
    fn from(value: ExtraMeasurements) -> Self {
        match value {
            ExtraMeasurements::All => Self::Keyword("all".to_string()),
            ExtraMeasurements::Named(names) => Self::Names(names),
        }
    }
}

/// A declared `default_allowances` section. Unset flags fall through.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AllowancePolicy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub require_geometry: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_nullable_fields: Option<BTreeSet<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_missing_fields: Option<BTreeSet<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_missing_measurements: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_extra_measurements: Option<ExtraMeasurements>,
}

impl AllowancePolicy {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Parse a `default_allowances` section.
    pub fn from_value(value: &serde_json::Value) -> Result<Self, serde_json::Error> {
        Self::deserialize(value)
    }
}

/// The most specific scope that contributed to a resolved policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllowanceScope {
    Default,
    TypeOverridden,
    ProductOverridden,
}

/// The fully resolved policy used for one validation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedAllowances {
    pub scope: AllowanceScope,
    pub require_geometry: bool,
    pub allow_nullable_fields: BTreeSet<String>,
    pub allow_missing_fields: BTreeSet<String>,
    pub allow_missing_measurements: bool,
    pub allow_extra_measurements: ExtraMeasurements,
}

impl Default for ResolvedAllowances {
    fn default() -> Self {
        Self {
            scope: AllowanceScope::Default,
            require_geometry: true,
            allow_nullable_fields: BTreeSet::new(),
            allow_missing_fields: BTreeSet::new(),
            allow_missing_measurements: false,
            allow_extra_measurements: ExtraMeasurements::default(),
        }
    }
}

fn pick<T: Clone>(product: Option<&Option<T>>, type_: Option<&Option<T>>, default: T) -> T {
    product
        .and_then(Option::as_ref)
        .or_else(|| type_.and_then(Option::as_ref))
        .cloned()
        .unwrap_or(default)
}

impl ResolvedAllowances {
    /// Resolve the effective policy for a dataset of a product whose
    /// metadata type may be unknown.
    pub fn resolve(product: Option<&AllowancePolicy>, type_: Option<&AllowancePolicy>) -> Self {
        let defaults = Self::default();
        let scope = match (product, type_) {
            (Some(p), _) if !p.is_empty() => AllowanceScope::ProductOverridden,
            (_, Some(t)) if !t.is_empty() => AllowanceScope::TypeOverridden,
            _ => AllowanceScope::Default,
        };
        Self {
            scope,
            require_geometry: pick(
                product.map(|p| &p.require_geometry),
                type_.map(|t| &t.require_geometry),
                defaults.require_geometry,
            ),
            allow_nullable_fields: pick(
                product.map(|p| &p.allow_nullable_fields),
                type_.map(|t| &t.allow_nullable_fields),
                defaults.allow_nullable_fields,
            ),
            allow_missing_fields: pick(
                product.map(|p| &p.allow_missing_fields),
                type_.map(|t| &t.allow_missing_fields),
                defaults.allow_missing_fields,
            ),
            allow_missing_measurements: pick(
                product.map(|p| &p.allow_missing_measurements),
                type_.map(|t| &t.allow_missing_measurements),
                defaults.allow_missing_measurements,
            ),
            allow_extra_measurements: pick(
                product.map(|p| &p.allow_extra_measurements),
                type_.map(|t| &t.allow_extra_measurements),
                defaults.allow_extra_measurements,
            ),
        }
    }

    /// Widen the extra-measurement allowance with a run-level one.
    pub fn with_run_extra(mut self, extra: &ExtraMeasurements) -> Self {
        self.allow_extra_measurements = self.allow_extra_measurements.union(extra);
        self
    }

    pub fn allows_missing_measurement(&self, name: &str) -> bool {
        self.allow_missing_measurements || self.allow_missing_fields.contains(name)
    }

    pub fn allows_extra_measurement(&self, name: &str) -> bool {
        self.allow_extra_measurements.allows(name)
    }

    pub fn allows_missing_field(&self, name: &str) -> bool {
        self.allow_missing_fields.contains(name)
    }

    pub fn allows_null_field(&self, name: &str) -> bool {
        self.allow_nullable_fields.contains(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn policy(value: serde_json::Value) -> AllowancePolicy {
        AllowancePolicy::from_value(&value).unwrap()
    }

    #[test]
    fn defaults_require_geometry() {
        let resolved = ResolvedAllowances::resolve(None, None);
        assert_eq!(resolved.scope, AllowanceScope::Default);
        assert!(resolved.require_geometry);
        assert!(!resolved.allows_extra_measurement("pan"));
        assert!(!resolved.allows_missing_measurement("blue"));
    }

    #[test]
    fn type_policy_applies_when_product_is_silent() {
        let type_ = policy(json!({"require_geometry": false}));
        let product = policy(json!({}));
        let resolved = ResolvedAllowances::resolve(Some(&product), Some(&type_));
        assert_eq!(resolved.scope, AllowanceScope::TypeOverridden);
        assert!(!resolved.require_geometry);
    }

    #[test]
    fn product_flag_masks_type_flag() {
        let type_ = policy(json!({
            "require_geometry": false,
            "allow_missing_fields": ["cloud_cover"]
        }));
        let product = policy(json!({
            "require_geometry": true,
            "allow_missing_fields": ["blue"]
        }));
        let resolved = ResolvedAllowances::resolve(Some(&product), Some(&type_));
        assert_eq!(resolved.scope, AllowanceScope::ProductOverridden);
        assert!(resolved.require_geometry);
        // Masked, not merged.
        assert!(resolved.allows_missing_field("blue"));
        assert!(!resolved.allows_missing_field("cloud_cover"));
    }

    #[test]
    fn unset_product_flags_fall_through() {
        let type_ = policy(json!({"require_geometry": false}));
        let product = policy(json!({"allow_missing_fields": ["blue"]}));
        let resolved = ResolvedAllowances::resolve(Some(&product), Some(&type_));
        assert!(!resolved.require_geometry);
        assert!(resolved.allows_missing_measurement("blue"));
    }

    #[test]
    fn extra_measurements_accepts_keyword_list_and_flag() {
        assert_eq!(
            policy(json!({"allow_extra_measurements": "all"})).allow_extra_measurements,
            Some(ExtraMeasurements::All)
        );
        assert_eq!(
            policy(json!({"allow_extra_measurements": true})).allow_extra_measurements,
            Some(ExtraMeasurements::All)
        );
        assert_eq!(
            policy(json!({"allow_extra_measurements": ["pan"]})).allow_extra_measurements,
            Some(ExtraMeasurements::named(["pan"]))
        );
        assert!(
            AllowancePolicy::from_value(&json!({"allow_extra_measurements": "some"})).is_err()
        );
    }

    #[test]
    fn unknown_allowance_keys_are_rejected() {
        assert!(AllowancePolicy::from_value(&json!({"require_geometery": false})).is_err());
    }

    #[test]
    fn run_level_extra_only_relaxes() {
        let product = policy(json!({"allow_extra_measurements": ["pan"]}));
        let resolved = ResolvedAllowances::resolve(Some(&product), None)
            .with_run_extra(&ExtraMeasurements::named(["thermal"]));
        assert!(resolved.allows_extra_measurement("pan"));
        assert!(resolved.allows_extra_measurement("thermal"));
        assert!(!resolved.allows_extra_measurement("swir"));

        let all = resolved.with_run_extra(&ExtraMeasurements::All);
        assert!(all.allows_extra_measurement("swir"));
    }
}
