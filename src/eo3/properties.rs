//! Known dataset properties and how their values are normalised.
//!
//! Properties outside this list are passed through verbatim (and flagged
//! as unknown by the matcher). Normalisers never rewrite a document: they
//! report what the normalised value would be, so the caller can compare.
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;

use crate::eo3::core::PropertyValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Normaliser {
    DateTime,
    Float,
    Integer,
    /// A float within `0..=100`.
    Percent,
    /// A float within `-360..=360`.
    Degrees,
    /// Lowercase, with underscores as dashes: `LANDSAT_8` -> `landsat-8`.
    Platform,
    /// One of a fixed set of values. Non-strict sets accept anything.
    Choice {
        values: &'static [&'static str],
        lowercase: bool,
        strict: bool,
    },
}

// Keep sorted.
const KNOWN_PROPERTIES: &[(&str, Option<Normaliser>)] = &[
    ("datetime", Some(Normaliser::DateTime)),
    (
        "dea:dataset_maturity",
        Some(Normaliser::Choice {
            values: &["final", "interim", "nrt"],
            lowercase: true,
            strict: true,
        }),
    ),
    ("dea:processing_level", None),
    ("dtr:end_datetime", Some(Normaliser::DateTime)),
    ("dtr:start_datetime", Some(Normaliser::DateTime)),
    ("eo:azimuth", Some(Normaliser::Float)),
    ("eo:cloud_cover", Some(Normaliser::Percent)),
    ("eo:constellation", None),
    ("eo:epsg", Some(Normaliser::Integer)),
    ("eo:gsd", Some(Normaliser::Float)),
    ("eo:instrument", None),
    ("eo:off_nadir", Some(Normaliser::Float)),
    ("eo:platform", Some(Normaliser::Platform)),
    ("eo:sun_azimuth", Some(Normaliser::Degrees)),
    ("eo:sun_elevation", Some(Normaliser::Degrees)),
    ("fmask:clear", Some(Normaliser::Percent)),
    ("fmask:cloud", Some(Normaliser::Percent)),
    ("fmask:cloud_shadow", Some(Normaliser::Percent)),
    ("fmask:snow", Some(Normaliser::Percent)),
    ("fmask:water", Some(Normaliser::Percent)),
    ("gqa:abs_iterative_mean_x", Some(Normaliser::Float)),
    ("gqa:abs_iterative_mean_y", Some(Normaliser::Float)),
    ("gqa:cep90", Some(Normaliser::Float)),
    ("gqa:error_message", None),
    ("gqa:final_gcp_count", Some(Normaliser::Integer)),
    ("gqa:ref_source", None),
    ("landsat:collection_category", None),
    ("landsat:collection_number", Some(Normaliser::Integer)),
    ("landsat:data_type", None),
    ("landsat:earth_sun_distance", None),
    ("landsat:ephemeris_type", None),
    ("landsat:geometric_rmse_model", None),
    ("landsat:geometric_rmse_model_x", None),
    ("landsat:geometric_rmse_model_y", None),
    ("landsat:geometric_rmse_verify", None),
    ("landsat:ground_control_points_model", None),
    ("landsat:ground_control_points_verify", None),
    ("landsat:ground_control_points_version", None),
    ("landsat:image_quality_oli", None),
    ("landsat:image_quality_tirs", None),
    ("landsat:landsat_product_id", None),
    ("landsat:landsat_scene_id", None),
    ("landsat:processing_software_version", None),
    ("landsat:station_id", None),
    ("landsat:wrs_path", Some(Normaliser::Integer)),
    ("landsat:wrs_row", Some(Normaliser::Integer)),
    ("odc:dataset_version", None),
    (
        "odc:file_format",
        Some(Normaliser::Choice {
            values: &["GeoTIFF", "NetCDF"],
            lowercase: false,
            strict: false,
        }),
    ),
    ("odc:processing_datetime", Some(Normaliser::DateTime)),
    ("odc:producer", None),
    ("odc:product", None),
    ("odc:product_family", None),
    ("odc:reference_code", None),
    ("odc:region_code", None),
    ("sentinel:datastrip_id", None),
    ("sentinel:datatake_start_datetime", Some(Normaliser::DateTime)),
    ("sentinel:product_name", None),
    ("sentinel:sentinel_tile_id", None),
];

/// Is this a key we know about? `Some(None)` is known but not normalised.
pub fn known_property(name: &str) -> Option<Option<Normaliser>> {
    KNOWN_PROPERTIES
        .binary_search_by(|(key, _)| (*key).cmp(name))
        .ok()
        .map(|i| KNOWN_PROPERTIES[i].1)
}

/// Parse any ISO8601 date or datetime. Values without a timezone are UTC.
pub fn parse_datetime(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f%#z", "%Y-%m-%dT%H:%M:%S%.f%#z"] {
        if let Ok(dt) = DateTime::parse_from_str(value, format) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    let value = value.trim_end_matches(['Z', 'z']);
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Some(dt.and_utc());
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

fn as_float(value: &Value) -> Result<f64, String> {
    match value {
        Value::Number(n) => n.as_f64().ok_or_else(|| format!("{n} is not a number")),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| format!("could not convert string to float: {s:?}")),
        other => Err(format!("expected a number, got {other}")),
    }
}

impl Normaliser {
    /// The normalised form of a value, or why it can't have one.
    pub fn normalise(&self, value: &Value) -> Result<PropertyValue, String> {
        match self {
            Normaliser::DateTime => match value {
                Value::String(s) => parse_datetime(s)
                    .map(PropertyValue::DateTime)
                    .ok_or_else(|| format!("invalid datetime {s:?}")),
                other => Err(format!("expected a datetime, got {other}")),
            },
            Normaliser::Float => as_float(value).map(PropertyValue::Float),
            Normaliser::Integer => match value {
                Value::Number(n) if n.is_i64() || n.is_u64() => {
                    n.as_i64().map(PropertyValue::Integer).ok_or_else(|| {
                        format!("{n} is out of range for an integer")
                    })
                }
                Value::Number(n) => match n.as_f64() {
                    Some(f) if f.fract() == 0.0 => Ok(PropertyValue::Integer(f as i64)),
                    _ => Err(format!("{n} is not an integer")),
                },
                Value::String(s) => s
                    .trim()
                    .parse::<i64>()
                    .map(PropertyValue::Integer)
                    .map_err(|_| format!("invalid literal for int: {s:?}")),
                other => Err(format!("expected an integer, got {other}")),
            },
            Normaliser::Percent => {
                let v = as_float(value)?;
                if !(0.0..=100.0).contains(&v) {
                    return Err(format!("expected percent between 0,100, got {v}"));
                }
                Ok(PropertyValue::Float(v))
            }
            Normaliser::Degrees => {
                let v = as_float(value)?;
                if !(-360.0..=360.0).contains(&v) {
                    return Err(format!("expected degrees between -360,360, got {v}"));
                }
                Ok(PropertyValue::Float(v))
            }
            Normaliser::Platform => match value {
                Value::String(s) => Ok(PropertyValue::Text(s.to_lowercase().replace('_', "-"))),
                other => Err(format!("expected a platform name, got {other}")),
            },
            Normaliser::Choice {
                values,
                lowercase,
                strict,
            } => match value {
                Value::String(s) => {
                    let v = if *lowercase { s.to_lowercase() } else { s.clone() };
                    if *strict && !values.contains(&v.as_str()) {
                        return Err(format!(
                            "unexpected value {v:?}. Expected one of: {}",
                            values.join(", ")
                        ));
                    }
                    Ok(PropertyValue::Text(v))
                }
                other => Err(format!("expected one of {}, got {other}", values.join(", "))),
            },
        }
    }
}

/// How a raw property value compares to its normalised form.
#[derive(Debug, Clone, PartialEq)]
pub enum Conformance {
    Normalised,
    /// The value is of a different type than expected.
    WrongType {
        expected: &'static str,
        found: &'static str,
    },
    /// Right type, but not in normalised form.
    Unnormalised { expected: PropertyValue },
    Invalid(String),
}

/// Compare a raw property value against what its normaliser expects.
pub fn conformance(normaliser: Normaliser, value: &Value) -> Conformance {
    let normalised = match normaliser.normalise(value) {
        Ok(n) => n,
        Err(reason) => return Conformance::Invalid(reason),
    };
    let raw = PropertyValue::from(value);
    match (&normalised, &raw) {
        // Datetimes are written as strings; `normalise` already parsed them.
        (PropertyValue::DateTime(_), PropertyValue::Text(_)) => Conformance::Normalised,
        (PropertyValue::Float(n), PropertyValue::Float(r)) => {
            if n == r || (n.is_nan() && r.is_nan()) {
                Conformance::Normalised
            } else {
                Conformance::Unnormalised {
                    expected: normalised,
                }
            }
        }
        // Integral literals are fine for float fields.
        (PropertyValue::Float(_), PropertyValue::Integer(_)) => Conformance::Normalised,
        (n, r) if std::mem::discriminant(n) != std::mem::discriminant(r) => {
            Conformance::WrongType {
                expected: n.type_name(),
                found: r.type_name(),
            }
        }
        (n, r) if n != r => Conformance::Unnormalised {
            expected: normalised,
        },
        _ => Conformance::Normalised,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn known_properties_are_sorted() {
        let keys: Vec<_> = KNOWN_PROPERTIES.iter().map(|(k, _)| *k).collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }

    #[test]
    fn lookup_distinguishes_unknown_from_unnormalised() {
        assert_eq!(known_property("eo:platform"), Some(Some(Normaliser::Platform)));
        assert_eq!(known_property("eo:instrument"), Some(None));
        assert_eq!(known_property("eo:platfrom"), None);
    }

    #[test]
    fn parses_common_datetime_forms() {
        for value in [
            "2020-01-01T10:20:30Z",
            "2020-01-01T10:20:30.123+10:00",
            "2020-01-01 10:20:30Z",
            "2020-01-01T10:20:30",
            "2020-01-01",
        ] {
            assert!(parse_datetime(value).is_some(), "{value}");
        }
        assert!(parse_datetime("yesterday").is_none());
    }

    #[test]
    fn platform_case_is_a_formatting_problem() {
        assert_eq!(
            conformance(Normaliser::Platform, &json!("LANDSAT_8")),
            Conformance::Unnormalised {
                expected: PropertyValue::Text("landsat-8".into())
            }
        );
        assert_eq!(
            conformance(Normaliser::Platform, &json!("landsat-8")),
            Conformance::Normalised
        );
    }

    #[test]
    fn numeric_strings_are_the_wrong_type() {
        assert_eq!(
            conformance(Normaliser::Integer, &json!("12")),
            Conformance::WrongType {
                expected: "int",
                found: "str"
            }
        );
        assert!(matches!(
            conformance(Normaliser::Integer, &json!("twelve")),
            Conformance::Invalid(_)
        ));
    }

    #[test]
    fn integers_satisfy_float_fields() {
        assert_eq!(
            conformance(Normaliser::Percent, &json!(12)),
            Conformance::Normalised
        );
        assert!(matches!(
            conformance(Normaliser::Percent, &json!(120.5)),
            Conformance::Invalid(_)
        ));
    }

    #[test]
    fn datetimes_may_be_strings() {
        assert_eq!(
            conformance(Normaliser::DateTime, &json!("2020-01-01T00:00:00Z")),
            Conformance::Normalised
        );
        assert!(matches!(
            conformance(Normaliser::DateTime, &json!("not a date")),
            Conformance::Invalid(_)
        ));
        assert!(matches!(
            conformance(Normaliser::DateTime, &json!(5)),
            Conformance::Invalid(_)
        ));
    }

    #[test]
    fn strict_choices_reject_unknown_values() {
        let maturity = known_property("dea:dataset_maturity").flatten().unwrap();
        assert_eq!(conformance(maturity, &json!("final")), Conformance::Normalised);
        assert!(matches!(
            conformance(maturity, &json!("FINAL")),
            Conformance::Unnormalised { .. }
        ));
        assert!(matches!(
            conformance(maturity, &json!("beta")),
            Conformance::Invalid(_)
        ));

        let format = known_property("odc:file_format").flatten().unwrap();
        assert_eq!(conformance(format, &json!("COG")), Conformance::Normalised);
    }
}
