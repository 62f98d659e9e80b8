use proptest::prelude::*;
use proptest::sample::subsequence;
use serde_json::{Value, json};

use eodatasets::eo3::allowance::ExtraMeasurements;
use eodatasets::eo3::{SourceDocument, ValidateConfig, validate_documents};

const PRODUCT_BANDS: &[&str] = &["red", "green", "blue"];
const EXTRA_BANDS: &[&str] = &["pan", "swir1", "swir2", "thermal"];

fn documents(product_allows: &[&str], dataset_bands: &[&str], geometry: Value) -> Vec<SourceDocument> {
    let measurements: Vec<Value> = PRODUCT_BANDS
        .iter()
        .map(|name| json!({"name": name, "dtype": "uint16", "nodata": 0}))
        .collect();
    let product = json!({
        "name": "ls_nbar",
        "license": "CC-BY-4.0",
        "metadata_type": "eo3",
        "metadata": {"product": {"name": "ls_nbar"}},
        "measurements": measurements,
        "default_allowances": {"allow_extra_measurements": product_allows}
    });
    let bands: serde_json::Map<String, Value> = dataset_bands
        .iter()
        .map(|name| (name.to_string(), json!({"path": format!("{name}.tif")})))
        .collect();
    let dataset = json!({
        "$schema": "https://schemas.opendatacube.org/dataset",
        "id": "0a4c2b3e-6a8f-4f39-9cf2-8c0a8c3f5d11",
        "product": {"name": "ls_nbar"},
        "geometry": geometry,
        "properties": {"datetime": "2021-06-01T00:00:00Z", "odc:file_format": "GeoTIFF"},
        "measurements": bands
    });
    vec![
        SourceDocument::new(product).with_location("ls_nbar.odc-product.yaml"),
        SourceDocument::new(dataset).with_location("scene.odc-metadata.yaml"),
    ]
}

fn dataset_issue_count(docs: Vec<SourceDocument>, config: ValidateConfig) -> usize {
    validate_documents(docs, config).documents[1].issues.len()
}

proptest! {
    #[test]
    fn allowing_an_extra_measurement_only_removes_issues(
        extras in subsequence(EXTRA_BANDS.to_vec(), 1..=EXTRA_BANDS.len()),
        allowed in subsequence(EXTRA_BANDS.to_vec(), 0..EXTRA_BANDS.len()),
        index in any::<prop::sample::Index>(),
    ) {
        let mut bands: Vec<&str> = PRODUCT_BANDS.to_vec();
        bands.extend(extras.iter().copied());
        let before = dataset_issue_count(documents(&allowed, &bands, Value::Null), ValidateConfig::default());

        // Allow one more of the dataset's extras than before.
        let newly = *index.get(&extras);
        let mut relaxed = allowed.clone();
        relaxed.push(newly);
        let after = dataset_issue_count(documents(&relaxed, &bands, Value::Null), ValidateConfig::default());

        if allowed.contains(&newly) {
            prop_assert_eq!(after, before);
        } else {
            prop_assert!(after < before);
        }

        // The run-level allowance relaxes the same way.
        let config = ValidateConfig::builder()
            .extra_measurements(ExtraMeasurements::named([newly]))
            .build()
            .unwrap();
        let run_relaxed = dataset_issue_count(documents(&allowed, &bands, Value::Null), config);
        prop_assert!(run_relaxed <= before);
    }

    #[test]
    fn repeated_runs_are_identical(
        bands in subsequence([PRODUCT_BANDS, EXTRA_BANDS].concat(), 0..7),
        allowed in subsequence(EXTRA_BANDS.to_vec(), 0..EXTRA_BANDS.len()),
        with_geometry in any::<bool>(),
        thorough in any::<bool>(),
    ) {
        let geometry = if with_geometry {
            json!({"type": "Polygon", "coordinates": [[[0, 0], [0, 1], [1, 1], [0, 0]]]})
        } else {
            Value::Null
        };
        let config = ValidateConfig::builder().thorough(thorough).build().unwrap();
        let first = validate_documents(documents(&allowed, &bands, geometry.clone()), config.clone());
        let second = validate_documents(documents(&allowed, &bands, geometry), config);
        prop_assert_eq!(first, second);
    }
}
