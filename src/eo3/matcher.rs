//! Matches a dataset against its product, and checks what the product and
//! metadata type expect of it.
use serde_json::Value;

use crate::eo3::allowance::{ExtraMeasurements, ResolvedAllowances};
use crate::eo3::context::{ProductContext, metadata_differences};
use crate::eo3::core::{DEFAULT_GRID, DatasetDoc, MetadataType, ProductDefinition};
use crate::eo3::issues::{Findings, IssueCode, Level};
use crate::eo3::properties::{Conformance, conformance, known_property};
use crate::eo3::schema::check_type_fields;
use crate::eo3::utils::is_absolute;

/// What a dataset was matched to, and the policy it was checked under.
#[derive(Debug, Clone)]
pub struct ProductMatch<'c> {
    pub product: Option<&'c ProductDefinition>,
    pub metadata_type: Option<&'c MetadataType>,
    pub allowances: ResolvedAllowances,
}

fn differences_as_hint(differences: &[String]) -> String {
    differences
        .iter()
        .map(|d| format!("\t{d}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Resolve a dataset's product and run every product-dependent check.
///
/// An unknown product yields a single `unknown_product` warning (plus an
/// `unverified_type` note): nothing else can be compared.
pub fn match_dataset<'c>(
    doc: &Value,
    dataset: &DatasetDoc,
    context: &'c ProductContext,
    run_extra: &ExtraMeasurements,
    findings: &mut Findings,
) -> ProductMatch<'c> {
    let claimed = dataset.product_name();
    check_match_clash(doc, claimed, context, findings);
    let Some(product) = claimed.and_then(|name| context.product(name)) else {
        let message = match claimed {
            Some(name) => format!("Dataset claims product {name:?}, which has not been defined"),
            None => "Dataset does not name its product".to_string(),
        };
        let hint = context.closest_product(doc).map(|(closest, differences)| {
            format!(
                "Closest match is {:?}, with differences:\n{}",
                closest.name.as_str(),
                differences_as_hint(&differences)
            )
        });
        findings.raise(Level::Warning, IssueCode::UnknownProduct, message, hint);
        findings.info(
            IssueCode::UnverifiedType,
            "Product context unavailable: metadata type and measurements were not verified",
        );
        return ProductMatch {
            product: None,
            metadata_type: None,
            allowances: ResolvedAllowances::default().with_run_extra(run_extra),
        };
    };

    let differences = metadata_differences(doc, &product.metadata);
    if !differences.is_empty() {
        findings.raise(
            Level::Info,
            IssueCode::StrangeProductClaim,
            format!(
                "Dataset claims to be product {:?}, but doesn't match its fields",
                product.name.as_str()
            ),
            Some(differences_as_hint(&differences)),
        );
    }

    let metadata_type = context.product_metadata_type(product);
    let allowances = context.allowances(product).with_run_extra(run_extra);
    match metadata_type {
        Some(metadata_type) => check_type_fields(doc, metadata_type, &allowances, findings),
        None => findings.info(
            IssueCode::UnverifiedType,
            format!(
                "Metadata type {:?} of product {:?} is not known: field checks skipped",
                product.metadata_type.name().unwrap_or("?"),
                product.name.as_str()
            ),
        ),
    }

    check_measurements(dataset, product, &allowances, findings);
    check_geo(dataset, &allowances, findings);
    check_properties(dataset, findings);

    ProductMatch {
        product: Some(product),
        metadata_type,
        allowances,
    }
}

/// A dataset whose fields contain more than one product's `metadata` section
/// can't be told apart from them.
fn check_match_clash(
    doc: &Value,
    claimed: Option<&str>,
    context: &ProductContext,
    findings: &mut Findings,
) {
    let matching = context.matching_products(doc);
    if matching.len() < 2 {
        return;
    }
    let names = matching
        .iter()
        .map(|p| p.name.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    let hint = match claimed {
        Some(claimed) => format!(
            "Maybe you need more fields in the 'metadata' section?\nClaims to be a {claimed:?}, and matches {names:?}"
        ),
        None => format!("Maybe you need more fields in the 'metadata' section?\nMatches {names:?}"),
    };
    findings.raise(
        Level::Error,
        IssueCode::ProductMatchClash,
        "Multiple products match the given dataset",
        Some(hint),
    );
}

/// Compare the dataset's measurements with the product's.
pub fn check_measurements(
    dataset: &DatasetDoc,
    product: &ProductDefinition,
    allowances: &ResolvedAllowances,
    findings: &mut Findings,
) {
    let product_name = product.name.as_str();
    for expected in &product.measurements {
        let name = expected.name.as_str();
        if !dataset.measurements.contains_key(name) && !allowances.allows_missing_measurement(name)
        {
            findings.error(
                IssueCode::MissingMeasurement,
                format!("Product {product_name:?} expects a measurement {name:?}"),
            );
        }
    }

    for name in dataset.measurements.keys() {
        if product.measurement(name).is_none() && !allowances.allows_extra_measurement(name) {
            findings.raise(
                Level::Warning,
                IssueCode::ExtraMeasurement,
                format!(
                    "Dataset has measurement {name:?}, not present in product definition for {product_name:?}"
                ),
                Some(
                    "This may be valid, as it's allowed by ODC. List it in allow_extra_measurements to mute this."
                        .to_string(),
                ),
            );
        }
    }

    for (name, measurement) in &dataset.measurements {
        let grid = measurement.grid_name();
        if (grid != DEFAULT_GRID || !dataset.grids.is_empty()) && !dataset.grids.contains_key(grid)
        {
            findings.error(
                IssueCode::InvalidGridRef,
                format!("Measurement {name:?} refers to unknown grid {grid:?}"),
            );
        }
        if is_absolute(measurement.path.as_str()) {
            findings.warning(
                IssueCode::AbsolutePath,
                format!(
                    "Measurement {name:?} has an absolute path: {:?}",
                    measurement.path.as_str()
                ),
            );
        }
    }
}

/// Check geometry, grids and CRS.
pub fn check_geo(dataset: &DatasetDoc, allowances: &ResolvedAllowances, findings: &mut Findings) {
    if !dataset.has_some_geo() {
        if allowances.require_geometry {
            findings.raise(
                Level::Error,
                IssueCode::MissingGeometry,
                "Dataset has no geometry",
                Some("Set require_geometry: false in the product's default_allowances if this is expected".to_string()),
            );
        }
        return;
    }

    match dataset.geometry.as_ref().filter(|g| !g.is_null()) {
        None if allowances.require_geometry => findings.error(
            IssueCode::MissingGeometry,
            "Dataset has some geo fields but no geometry",
        ),
        None => {}
        Some(geometry) => {
            if let Err(reason) = check_geometry(geometry) {
                findings.error(
                    IssueCode::InvalidGeometry,
                    format!("Geometry is not a valid shape: {reason}"),
                );
            }
        }
    }

    if dataset.grids.is_empty() {
        findings.error(
            IssueCode::IncompleteGrids,
            "Dataset has some geo fields but no grids",
        );
    }

    let Some(crs) = &dataset.crs else {
        findings.error(
            IssueCode::IncompleteCrs,
            "Dataset has some geo fields but no crs",
        );
        return;
    };
    check_crs(crs, findings);
}

fn check_crs(crs: &str, findings: &mut Findings) {
    let lower = crs.to_ascii_lowercase();
    if let Some(code) = lower.strip_prefix("epsg:") {
        if code.is_empty() || !code.chars().all(|c| c.is_ascii_digit()) {
            findings.error(
                IssueCode::InvalidCrsEpsg,
                format!("Invalid projection: {crs:?}: EPSG codes are numeric"),
            );
        }
        if lower != crs {
            findings.warning(IssueCode::MixedCrsCase, "Recommend lowercase 'epsg:' prefix");
        }
        return;
    }
    if !looks_like_wkt(crs) {
        findings.error(
            IssueCode::InvalidCrs,
            format!("Expect either an epsg code or a WKT string: {crs:?}"),
        );
        return;
    }
    if let Some(code) = crs_epsg(crs) {
        findings.warning(
            IssueCode::NonEpsg,
            format!(
                "Prefer an EPSG code to a WKT when possible. (Can change CRS to 'epsg:{code}')"
            ),
        );
    }
}

const WKT_ROOTS: &[&str] = &[
    "PROJCS",
    "GEOGCS",
    "GEOCCS",
    "COMPD_CS",
    "LOCAL_CS",
    "VERT_CS",
    "PROJCRS",
    "GEOGCRS",
    "GEODCRS",
    "BOUNDCRS",
    "COMPOUNDCRS",
    "VERTCRS",
    "ENGCRS",
];

/// Does the string have the outline of a WKT CRS: a known root keyword and balanced brackets?
pub fn looks_like_wkt(crs: &str) -> bool {
    let crs = crs.trim();
    let Some(open) = crs.find('[') else {
        return false;
    };
    if !WKT_ROOTS.contains(&crs[..open].trim().to_ascii_uppercase().as_str()) {
        return false;
    }
    let mut depth = 0i32;
    let mut in_string = false;
    for c in crs.chars() {
        match c {
            '"' => in_string = !in_string,
            '[' if !in_string => depth += 1,
            ']' if !in_string => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
            _ => {}
        }
    }
    depth == 0 && !in_string && crs.ends_with(']')
}

/// The EPSG code of a CRS, when it is `epsg:N` or a WKT whose root carries an EPSG authority.
pub fn crs_epsg(crs: &str) -> Option<u32> {
    let crs = crs.trim();
    let lower = crs.to_ascii_lowercase();
    if let Some(code) = lower.strip_prefix("epsg:") {
        return code.parse().ok();
    }
    let upper = crs.to_ascii_uppercase();
    let start = ["AUTHORITY[\"EPSG\",", "ID[\"EPSG\","]
        .iter()
        .filter_map(|marker| upper.rfind(marker).map(|i| i + marker.len()))
        .max()?;
    let rest = &crs[start..];
    let close = rest.find(']')?;
    // Only the root's authority: nothing but closing brackets may follow it.
    if !rest[close + 1..].chars().all(|c| c == ']' || c.is_whitespace()) {
        return None;
    }
    rest[..close].trim().trim_matches('"').parse().ok()
}

fn check_position(position: &Value) -> Result<[f64; 2], String> {
    let coords = position
        .as_array()
        .ok_or_else(|| format!("position {position} is not an array"))?;
    if coords.len() < 2 {
        return Err(format!("position {position} has fewer than 2 coordinates"));
    }
    let x = coords[0].as_f64();
    let y = coords[1].as_f64();
    match (x, y) {
        (Some(x), Some(y)) if x.is_finite() && y.is_finite() => Ok([x, y]),
        _ => Err(format!("position {position} is not numeric")),
    }
}

fn check_polygon(rings: &Value) -> Result<(), String> {
    let rings = rings
        .as_array()
        .ok_or_else(|| "polygon coordinates are not a list of rings".to_string())?;
    if rings.is_empty() {
        return Err("polygon is empty".to_string());
    }
    for (i, ring) in rings.iter().enumerate() {
        let positions = ring
            .as_array()
            .ok_or_else(|| format!("ring {i} is not a list of positions"))?;
        if positions.len() < 4 {
            return Err(format!("ring {i} has {} positions, needs at least 4", positions.len()));
        }
        let points = positions
            .iter()
            .map(check_position)
            .collect::<Result<Vec<_>, _>>()?;
        if points.first() != points.last() {
            return Err(format!("ring {i} is not closed"));
        }
    }
    Ok(())
}

/// Check a GeoJSON geometry is a well-formed polygon or multipolygon.
pub fn check_geometry(geometry: &Value) -> Result<(), String> {
    let kind = geometry
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| "geometry has no 'type'".to_string())?;
    let coordinates = geometry
        .get("coordinates")
        .ok_or_else(|| "geometry has no 'coordinates'".to_string())?;
    match kind {
        "Polygon" => check_polygon(coordinates),
        "MultiPolygon" => {
            let polygons = coordinates
                .as_array()
                .ok_or_else(|| "multipolygon coordinates are not a list".to_string())?;
            if polygons.is_empty() {
                return Err("multipolygon is empty".to_string());
            }
            polygons.iter().try_for_each(check_polygon)
        }
        other => Err(format!("{other} geometries are not supported, expected a Polygon or MultiPolygon")),
    }
}

/// Check known properties are in their normalised form.
pub fn check_properties(dataset: &DatasetDoc, findings: &mut Findings) {
    for (name, value) in &dataset.properties {
        let Some(normaliser) = known_property(name) else {
            findings.warning(
                IssueCode::UnknownProperty,
                format!("Unknown stac property {name:?}"),
            );
            continue;
        };
        let Some(normaliser) = normaliser.filter(|_| !value.is_null()) else {
            continue;
        };
        match conformance(normaliser, value) {
            Conformance::Normalised => {}
            Conformance::Invalid(reason) => {
                findings.error(IssueCode::InvalidProperty, format!("{name:?}: {reason}"))
            }
            Conformance::WrongType { expected, found } => findings.error(
                IssueCode::PropertyType,
                format!("Property {name:?} value {value} expected to be {expected:?} (got {found:?})"),
            ),
            Conformance::Unnormalised { expected } => findings.warning(
                IssueCode::PropertyFormatting,
                format!("Property {name:?} value {value} expected to be {expected}"),
            ),
        }
    }

    if let Some(producer) = dataset.properties.get("odc:producer") {
        if !producer.as_str().is_some_and(|p| p.contains('.')) {
            findings.warning(
                IssueCode::ProducerDomain,
                "Property 'odc:producer' should be the organisation's domain name. Eg. 'ga.gov.au'",
            );
        }
    }

    // Only when declared: datasets without a format property are fine.
    let file_format = dataset.properties.get("odc:file_format");
    if file_format.is_some_and(|f| f.is_null() || f.as_str().is_some_and(|f| f.trim().is_empty())) {
        findings.raise(
            Level::Warning,
            IssueCode::GlobalFileFormat,
            "Property 'odc:file_format' is empty",
            Some("Usually 'GeoTIFF'".to_string()),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eo3::core::EO3_SCHEMA_URL;
    use serde_json::json;

    fn dataset(extra: Value) -> (Value, DatasetDoc) {
        let mut doc = json!({
            "$schema": EO3_SCHEMA_URL,
            "id": "3fa85f64-5717-4562-b3fc-2c963f66afa6",
            "product": {"name": "fires"},
            "properties": {
                "datetime": "2020-01-01T00:00:00Z",
                "odc:file_format": "GeoTIFF"
            },
        });
        for (key, value) in extra.as_object().cloned().unwrap_or_default() {
            doc[key] = value;
        }
        let typed = serde_json::from_value(doc.clone()).unwrap();
        (doc, typed)
    }

    fn codes(findings: &Findings) -> Vec<IssueCode> {
        findings.issues().iter().map(|i| i.code).collect()
    }

    fn square() -> Value {
        json!({
            "type": "Polygon",
            "coordinates": [[[0, 0], [0, 1], [1, 1], [1, 0], [0, 0]]]
        })
    }

    #[test]
    fn valid_geo_raises_nothing() {
        let (_, ds) = dataset(json!({
            "crs": "epsg:32655",
            "geometry": square(),
            "grids": {"default": {"shape": [10, 10], "transform": [30, 0, 0, 0, -30, 0, 0, 0, 1]}}
        }));
        let mut findings = Findings::new("doc");
        check_geo(&ds, &ResolvedAllowances::default(), &mut findings);
        assert!(findings.is_empty(), "{:?}", findings.issues());
    }

    #[test]
    fn missing_geometry_is_one_error_unless_allowed() {
        let (_, ds) = dataset(json!({"geometry": null}));
        let mut findings = Findings::new("doc");
        check_geo(&ds, &ResolvedAllowances::default(), &mut findings);
        assert_eq!(codes(&findings), vec![IssueCode::MissingGeometry]);

        let relaxed = ResolvedAllowances {
            require_geometry: false,
            ..ResolvedAllowances::default()
        };
        let mut findings = Findings::new("doc");
        check_geo(&ds, &relaxed, &mut findings);
        assert!(findings.is_empty());
    }

    #[test]
    fn partial_geo_is_incomplete() {
        let (_, ds) = dataset(json!({"geometry": square()}));
        let mut findings = Findings::new("doc");
        check_geo(&ds, &ResolvedAllowances::default(), &mut findings);
        assert_eq!(
            codes(&findings),
            vec![IssueCode::IncompleteGrids, IssueCode::IncompleteCrs]
        );
    }

    #[test]
    fn crs_forms() {
        let mut findings = Findings::new("doc");
        check_crs("EPSG:4326", &mut findings);
        check_crs("epsg:abc", &mut findings);
        check_crs("WGS 84", &mut findings);
        assert_eq!(
            codes(&findings),
            vec![
                IssueCode::MixedCrsCase,
                IssueCode::InvalidCrsEpsg,
                IssueCode::InvalidCrs
            ]
        );
    }

    #[test]
    fn wkt_with_root_authority_prefers_epsg() {
        let wkt = r#"PROJCS["WGS 84 / UTM zone 55S",GEOGCS["WGS 84",AUTHORITY["EPSG","4326"]],UNIT["metre",1],AUTHORITY["EPSG","32755"]]"#;
        assert!(looks_like_wkt(wkt));
        assert_eq!(crs_epsg(wkt), Some(32755));
        let mut findings = Findings::new("doc");
        check_crs(wkt, &mut findings);
        assert_eq!(codes(&findings), vec![IssueCode::NonEpsg]);
        assert!(findings.issues()[0].message.contains("epsg:32755"));

        let anonymous = r#"PROJCS["custom",GEOGCS["WGS 84",AUTHORITY["EPSG","4326"]],UNIT["metre",1]]"#;
        assert_eq!(crs_epsg(anonymous), None);
        assert_eq!(crs_epsg("epsg:4326"), Some(4326));
    }

    #[test]
    fn geometry_shapes() {
        assert!(check_geometry(&square()).is_ok());
        let open = json!({"type": "Polygon", "coordinates": [[[0, 0], [0, 1], [1, 1], [1, 0]]]});
        assert!(check_geometry(&open).is_err());
        let point = json!({"type": "Point", "coordinates": [0, 0]});
        assert!(check_geometry(&point).is_err());
        let multi = json!({"type": "MultiPolygon", "coordinates": [square()["coordinates"].clone()]});
        assert!(check_geometry(&multi).is_ok());
    }

    #[test]
    fn property_checks() {
        let (_, ds) = dataset(json!({
            "properties": {
                "datetime": "2020-01-01T00:00:00Z",
                "eo:platform": "LANDSAT_8",
                "eo:cloud_cover": "12",
                "landsat:wrs_path": "nine",
                "odc:producer": "ga",
                "favourite_sandwich": "cucumber"
            }
        }));
        let mut findings = Findings::new("doc");
        check_properties(&ds, &mut findings);
        assert_eq!(
            codes(&findings),
            vec![
                IssueCode::PropertyFormatting,
                IssueCode::PropertyType,
                IssueCode::InvalidProperty,
                IssueCode::UnknownProperty,
                IssueCode::ProducerDomain,
            ]
        );
    }

    #[test]
    fn file_format_is_only_checked_when_declared() {
        let properties = |format: Value| {
            let (_, ds) = dataset(json!({
                "properties": {"datetime": "2020-01-01T00:00:00Z", "odc:file_format": format}
            }));
            let mut findings = Findings::new("doc");
            check_properties(&ds, &mut findings);
            codes(&findings)
        };
        assert!(properties(json!("GeoTIFF")).is_empty());
        assert_eq!(properties(json!("")), vec![IssueCode::GlobalFileFormat]);
        assert_eq!(properties(json!(" ")), vec![IssueCode::GlobalFileFormat]);
        assert_eq!(properties(Value::Null), vec![IssueCode::GlobalFileFormat]);

        let (_, ds) = dataset(json!({"properties": {"datetime": "2020-01-01T00:00:00Z"}}));
        let mut findings = Findings::new("doc");
        check_properties(&ds, &mut findings);
        assert!(findings.is_empty(), "{:?}", findings.issues());
    }

    fn product(measurements: &[&str], metadata: Value) -> ProductDefinition {
        serde_json::from_value(json!({
            "name": "fires",
            "metadata_type": "eo3",
            "metadata": metadata,
            "measurements": measurements
                .iter()
                .map(|m| json!({"name": m, "dtype": "int16", "nodata": -999}))
                .collect::<Vec<_>>()
        }))
        .unwrap()
    }

    #[test]
    fn measurement_differences() {
        let (_, ds) = dataset(json!({
            "measurements": {"red": {"path": "red.tif"}, "pan": {"path": "/abs/pan.tif"}}
        }));
        let fires = product(&["red", "blue"], json!({}));
        let mut findings = Findings::new("doc");
        check_measurements(&ds, &fires, &ResolvedAllowances::default(), &mut findings);
        assert_eq!(
            codes(&findings),
            vec![
                IssueCode::MissingMeasurement,
                IssueCode::ExtraMeasurement,
                IssueCode::AbsolutePath
            ]
        );

        let relaxed = ResolvedAllowances::default()
            .with_run_extra(&ExtraMeasurements::named(["pan"]));
        let mut findings = Findings::new("doc");
        check_measurements(&ds, &fires, &relaxed, &mut findings);
        assert_eq!(
            codes(&findings),
            vec![IssueCode::MissingMeasurement, IssueCode::AbsolutePath]
        );
    }

    #[test]
    fn grid_references_must_exist() {
        let (_, ds) = dataset(json!({
            "grids": {"default": {"shape": [10, 10], "transform": [30, 0, 0, 0, -30, 0]}},
            "measurements": {"red": {"path": "red.tif", "grid": "g20m"}}
        }));
        let fires = product(&["red"], json!({}));
        let mut findings = Findings::new("doc");
        check_measurements(&ds, &fires, &ResolvedAllowances::default(), &mut findings);
        assert_eq!(codes(&findings), vec![IssueCode::InvalidGridRef]);
    }

    #[test]
    fn unknown_product_is_one_warning() {
        let (doc, ds) = dataset(json!({"measurements": {"red": {"path": "red.tif"}}}));
        let context = ProductContext::new();
        let mut findings = Findings::new("doc");
        let matched = match_dataset(&doc, &ds, &context, &ExtraMeasurements::default(), &mut findings);
        assert!(matched.product.is_none());
        assert_eq!(
            codes(&findings),
            vec![IssueCode::UnknownProduct, IssueCode::UnverifiedType]
        );
        assert_eq!(
            findings.issues().iter().filter(|i| i.level == Level::Warning).count(),
            1
        );
    }

    fn context_of(products: &[(&str, Value)]) -> ProductContext {
        let mut context = ProductContext::new();
        let mut registration = Findings::new("product");
        for (name, metadata) in products {
            let mut definition = product(&["red"], metadata.clone());
            definition.name = crate::eo3::core::Text::new(*name);
            context.register_product(definition, &mut registration);
        }
        context
    }

    #[test]
    fn invalid_geometry_through_match_dataset() {
        let context = context_of(&[("fires", json!({"product": {"name": "fires"}}))]);
        let geo = |geometry: Value| {
            json!({
                "crs": "epsg:32655",
                "grids": {"default": {"shape": [10, 10], "transform": [30, 0, 0, 0, -30, 0]}},
                "measurements": {"red": {"path": "red.tif"}},
                "geometry": geometry
            })
        };

        let unclosed = json!({"type": "Polygon", "coordinates": [[[0, 0], [0, 1], [1, 1], [1, 0], [2, 2]]]});
        let too_short = json!({"type": "Polygon", "coordinates": [[[0, 0], [0, 1], [0, 0]]]});
        for (geometry, reason) in [(unclosed, "ring 0 is not closed"), (too_short, "ring 0 has 3 positions")] {
            let (doc, ds) = dataset(geo(geometry));
            let mut findings = Findings::new("doc");
            match_dataset(&doc, &ds, &context, &ExtraMeasurements::default(), &mut findings);
            let invalid: Vec<_> = findings
                .issues()
                .iter()
                .filter(|i| i.code == IssueCode::InvalidGeometry)
                .collect();
            assert_eq!(invalid.len(), 1, "{:?}", findings.issues());
            assert_eq!(invalid[0].level, Level::Error);
            assert!(invalid[0].message.contains(reason), "{}", invalid[0].message);
        }

        let (doc, ds) = dataset(geo(square()));
        let mut findings = Findings::new("doc");
        match_dataset(&doc, &ds, &context, &ExtraMeasurements::default(), &mut findings);
        assert!(!codes(&findings).contains(&IssueCode::InvalidGeometry));
    }

    #[test]
    fn products_with_the_same_match_rules_clash() {
        let ls8 = json!({"properties": {"eo:platform": "landsat-8"}});
        let context = context_of(&[("ls8_a", ls8.clone()), ("ls8_b", ls8), ("fires", json!({"product": {"name": "fires"}}))]);
        let (doc, ds) = dataset(json!({
            "geometry": null,
            "measurements": {"red": {"path": "red.tif"}},
            "properties": {"datetime": "2020-01-01T00:00:00Z", "eo:platform": "landsat-8"}
        }));
        let mut findings = Findings::new("doc");
        match_dataset(&doc, &ds, &context, &ExtraMeasurements::default(), &mut findings);
        let clash = &findings.issues()[0];
        assert_eq!(clash.code, IssueCode::ProductMatchClash);
        assert_eq!(clash.level, Level::Error);
        assert_eq!(clash.message, "Multiple products match the given dataset");
        assert_eq!(
            clash.hint.as_deref(),
            Some("Maybe you need more fields in the 'metadata' section?\nClaims to be a \"fires\", and matches \"fires, ls8_a, ls8_b\"")
        );
    }

    #[test]
    fn one_matching_product_is_no_clash() {
        let context = context_of(&[
            ("ls8", json!({"properties": {"eo:platform": "landsat-8"}})),
            ("ls9", json!({"properties": {"eo:platform": "landsat-9"}})),
        ]);
        let (doc, ds) = dataset(json!({
            "product": {"name": "ls8"},
            "geometry": null,
            "measurements": {"red": {"path": "red.tif"}},
            "properties": {"datetime": "2020-01-01T00:00:00Z", "eo:platform": "landsat-8"}
        }));
        let mut findings = Findings::new("doc");
        match_dataset(&doc, &ds, &context, &ExtraMeasurements::default(), &mut findings);
        assert!(!codes(&findings).contains(&IssueCode::ProductMatchClash));
    }

    #[test]
    fn strange_claims_are_informational() {
        let (doc, ds) = dataset(json!({
            "geometry": null,
            "measurements": {"red": {"path": "red.tif"}}
        }));
        let mut context = ProductContext::new();
        let mut registration = Findings::new("product");
        context.register_product(
            product(&["red"], json!({"properties": {"eo:platform": "landsat-8"}})),
            &mut registration,
        );
        let mut findings = Findings::new("doc");
        let matched = match_dataset(&doc, &ds, &context, &ExtraMeasurements::default(), &mut findings);
        assert!(matched.product.is_some());
        assert_eq!(
            codes(&findings),
            vec![
                IssueCode::StrangeProductClaim,
                IssueCode::UnverifiedType,
                IssueCode::MissingGeometry
            ]
        );
    }
}
