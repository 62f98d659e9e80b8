use serde_json::{Map, json};
use std::path::Path;
use tracing::debug;

use crate::eo3::core::{
    DataType, DatasetDoc, MeasurementDefinition, MetadataTypeRef, Nodata, ProductDefinition, Text,
};
use crate::eo3::errors::{Error, Result};
use crate::eo3::issues::{Findings, Level};
use crate::eo3::load::load_file;
use crate::eo3::raster::RasterReader;
use crate::eo3::schema::check_dataset;
use crate::eo3::utils::resolve_location;

fn nodata_from_raster(nodata: f64) -> Nodata {
    if nodata.is_nan() {
        Nodata::Text("NaN".to_string())
    } else if nodata.is_infinite() {
        Nodata::Text(if nodata > 0.0 { "inf" } else { "-inf" }.to_string())
    } else {
        Nodata::Number(nodata)
    }
}

/// Build a product definition that the given dataset would satisfy.
///
/// Without a reader every measurement is declared `int16` with nodata `0`.
/// With one, each measurement's file is read for its real dtype and nodata.
pub fn product_from_dataset(
    dataset: &DatasetDoc,
    metadata_type: &str,
    location: Option<&str>,
    reader: Option<&dyn RasterReader>,
) -> Result<ProductDefinition> {
    let name = dataset
        .product_name()
        .ok_or_else(|| Error::invalid_format("Dataset does not name its product"))?;

    let mut measurements = Vec::with_capacity(dataset.measurements.len());
    for (measurement_name, measurement) in &dataset.measurements {
        let (dtype, nodata) = match reader {
            Some(reader) => {
                let resolved = resolve_location(location, measurement.path.as_str());
                let info = reader.read(&resolved, measurement.band_index())?;
                debug!(measurement = %measurement_name, dtype = %info.dtype, "read measurement");
                (info.dtype, info.nodata.map(nodata_from_raster))
            }
            None => (DataType::Int16, Some(Nodata::Number(0.0))),
        };
        measurements.push(
            MeasurementDefinition::builder()
                .name(Text::new(measurement_name.clone()))
                .dtype(dtype)
                .nodata(nodata)
                .units(Some("1".to_string()))
                .build()
                .map_err(|e| Error::Builder(e.to_string()))?,
        );
    }

    let mut metadata = Map::new();
    metadata.insert("product".to_string(), json!({ "name": name }));

    ProductDefinition::builder()
        .name(Text::new(name.to_string()))
        .description(Some(format!("Product generated from dataset {}", dataset.id.as_str())))
        .metadata_type(MetadataTypeRef::Name(metadata_type.to_string()))
        .metadata(metadata)
        .measurements(measurements)
        .build()
        .map_err(|e| Error::Builder(e.to_string()))
}

/// Generate a product definition from a dataset document on disk
pub fn generate_product_from_dataset(
    dataset_path: &Path,
    metadata_type: &str,
    reader: Option<&dyn RasterReader>,
    output_path: Option<&Path>,
) -> Result<ProductDefinition> {
    let source = load_file(dataset_path, true)?
        .into_iter()
        .next()
        .ok_or_else(|| Error::invalid_format(format!("{} is empty", dataset_path.display())))?;
    let location = source.location.clone().unwrap_or_default();

    let mut findings = Findings::new(location.clone());
    let dataset = match check_dataset(&source.doc, &mut findings) {
        Some(dataset) if !findings.has_errors() => dataset,
        _ => {
            let errors: Vec<String> = findings
                .issues()
                .iter()
                .filter(|i| i.level == Level::Error)
                .map(ToString::to_string)
                .collect();
            return Err(Error::invalid_format(format!(
                "{location} is not a valid dataset: {}",
                errors.join("; ")
            )));
        }
    };

    let product = product_from_dataset(&dataset, metadata_type, Some(&location), reader)?;

    if let Some(output_path) = output_path {
        let product_yaml = serde_yaml::to_string(&product)
            .map_err(|e| Error::yaml(output_path.display(), e))?;
        std::fs::write(output_path, product_yaml)?;
    }

    Ok(product)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use crate::eo3::raster::{RasterInfo, RasterReadError};
    use crate::eo3::schema::check_product;
    use crate::eo3::utils::ResolvedLocation;

    fn dataset() -> Value {
        json!({
            "$schema": "https://schemas.opendatacube.org/dataset",
            "id": "3fa85f64-5717-4562-b3fc-2c963f66afa6",
            "product": {"name": "fires"},
            "crs": "epsg:32655",
            "grids": {"default": {"shape": [10, 10], "transform": [30, 0, 0, 0, -30, 0]}},
            "properties": {"datetime": "2020-01-01T00:00:00Z"},
            "measurements": {"red": {"path": "red.tif"}, "blue": {"path": "blue.tif"}},
        })
    }

    fn parse(doc: &Value) -> DatasetDoc {
        let mut findings = Findings::new("doc");
        check_dataset(doc, &mut findings).unwrap()
    }

    #[derive(Debug)]
    struct Float32Reader;

    impl RasterReader for Float32Reader {
        fn read(&self, _: &ResolvedLocation, _: u32) -> Result<RasterInfo, RasterReadError> {
            Ok(RasterInfo {
                dtype: DataType::Float32,
                nodata: Some(f64::NAN),
                shape: (10, 10),
                crs: Some("epsg:32655".to_string()),
                band_count: 1,
            })
        }
    }

    #[test]
    fn defaults_without_reader() {
        let product = product_from_dataset(&parse(&dataset()), "eo3", None, None).unwrap();
        assert_eq!(product.name.as_str(), "fires");
        assert_eq!(product.metadata["product"], json!({"name": "fires"}));
        let names: Vec<_> = product.measurements.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["blue", "red"]);
        assert!(product.measurements.iter().all(|m| m.dtype == DataType::Int16
            && m.nodata == Some(Nodata::Number(0.0))
            && m.units.as_deref() == Some("1")));
    }

    #[test]
    fn reader_supplies_dtype_and_nodata() {
        let product =
            product_from_dataset(&parse(&dataset()), "eo3", Some("/data/x.odc-metadata.yaml"), Some(&Float32Reader))
                .unwrap();
        let red = product.measurement("red").unwrap();
        assert_eq!(red.dtype, DataType::Float32);
        assert_eq!(red.nodata, Some(Nodata::Text("NaN".to_string())));
    }

    #[test]
    fn generated_product_checks_cleanly_apart_from_license() {
        let product = product_from_dataset(&parse(&dataset()), "eo3", None, None).unwrap();
        let doc = serde_json::to_value(&product).unwrap();
        let mut findings = Findings::new("generated");
        assert!(check_product(&doc, &mut findings).is_some());
        let codes: Vec<_> = findings.issues().iter().map(|i| i.code.as_str()).collect();
        assert_eq!(codes, vec!["no_license"]);
    }

    #[test]
    fn writes_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("x.odc-metadata.yaml");
        std::fs::write(&input, serde_yaml::to_string(&dataset()).unwrap()).unwrap();
        let output = dir.path().join("fires.odc-product.yaml");

        let product = generate_product_from_dataset(&input, "eo3", None, Some(&output)).unwrap();
        let written: ProductDefinition =
            serde_yaml::from_str(&std::fs::read_to_string(&output).unwrap()).unwrap();
        assert_eq!(written, product);
    }

    #[test]
    fn invalid_datasets_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("x.odc-metadata.yaml");
        std::fs::write(&input, "$schema: https://schemas.opendatacube.org/dataset\n").unwrap();
        assert!(matches!(
            generate_product_from_dataset(&input, "eo3", None, None),
            Err(Error::InvalidFormat(_))
        ));
    }
}
