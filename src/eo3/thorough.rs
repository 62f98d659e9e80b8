//! Thorough validation: compare what a dataset declares with the files it references.
use std::sync::Arc;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::eo3::core::DatasetDoc;
use crate::eo3::issues::{Findings, IssueCode, Level};
use crate::eo3::matcher::{ProductMatch, crs_epsg};
use crate::eo3::raster::{RasterInfo, RasterReadError, RasterReader};
use crate::eo3::utils::{ResolvedLocation, calculate_sha256, resolve_location, same_nodata};

const CHECKSUM_PREFIX: &str = "checksum:";

/// Opens every referenced file of a dataset.
#[derive(Debug, Clone)]
pub struct Verifier {
    reader: Arc<dyn RasterReader>,
    read_timeout: Duration,
    max_parallel_reads: usize,
}

struct Read {
    name: String,
    location: ResolvedLocation,
    band: u32,
}

impl Verifier {
    pub fn new(reader: Arc<dyn RasterReader>, read_timeout: Duration, max_parallel_reads: usize) -> Self {
        Self {
            reader,
            read_timeout,
            max_parallel_reads: max_parallel_reads.max(1),
        }
    }

    /// Read every measurement, in parallel batches, returning results in measurement order.
    fn read_all(&self, reads: &[Read]) -> Vec<Result<RasterInfo, RasterReadError>> {
        let mut results = Vec::with_capacity(reads.len());
        for batch in reads.chunks(self.max_parallel_reads) {
            let started = Instant::now();
            let receivers: Vec<_> = batch
                .iter()
                .map(|read| {
                    let (tx, rx) = mpsc::channel();
                    let reader = Arc::clone(&self.reader);
                    let location = read.location.clone();
                    let band = read.band;
                    // A hung read is abandoned: its thread is never joined.
                    thread::spawn(move || {
                        let _ = tx.send(reader.read(&location, band));
                    });
                    rx
                })
                .collect();
            for (read, rx) in batch.iter().zip(receivers) {
                let remaining = self.read_timeout.saturating_sub(started.elapsed());
                let result = match rx.recv_timeout(remaining) {
                    Ok(result) => result,
                    Err(mpsc::RecvTimeoutError::Timeout) => {
                        Err(RasterReadError::Timeout(self.read_timeout))
                    }
                    Err(mpsc::RecvTimeoutError::Disconnected) => Err(RasterReadError::Decode(
                        "reader stopped without a result".to_string(),
                    )),
                };
                if let Err(e) = &result {
                    warn!(measurement = %read.name, location = %read.location, error = %e, "raster read failed");
                }
                results.push(result);
            }
        }
        results
    }

    /// Compare each measurement's file with the dataset and its product, then check accessories.
    pub fn verify(
        &self,
        dataset: &DatasetDoc,
        location: Option<&str>,
        matched: &ProductMatch,
        findings: &mut Findings,
    ) {
        let reads: Vec<Read> = dataset
            .measurements
            .iter()
            .map(|(name, measurement)| Read {
                name: name.clone(),
                location: resolve_location(location, measurement.path.as_str()),
                band: measurement.band_index(),
            })
            .collect();
        debug!(reads = reads.len(), "reading measurements");
        let results = self.read_all(&reads);

        for (read, result) in reads.iter().zip(results) {
            match result {
                Ok(info) => compare(dataset, matched, &read.name, &info, findings),
                Err(RasterReadError::NoSuchBand { band, count }) => findings.raise(
                    Level::Error,
                    IssueCode::IncorrectBand,
                    format!("Measurement {:?} file contains no band {band}", read.name),
                    Some(format!("contains {count} band(s)")),
                ),
                Err(e) => findings.error(
                    IssueCode::UnreadableMeasurement,
                    format!(
                        "Measurement {:?} could not be read from {}: {e}",
                        read.name, read.location
                    ),
                ),
            }
        }

        check_accessories(dataset, location, findings);
    }
}

fn compare(
    dataset: &DatasetDoc,
    matched: &ProductMatch,
    name: &str,
    info: &RasterInfo,
    findings: &mut Findings,
) {
    let expected = matched.product.and_then(|p| p.measurement(name));
    match expected {
        None => {
            let product_has_measurements = matched
                .product
                .is_some_and(|p| !p.measurements.is_empty());
            if product_has_measurements && !matched.allowances.allows_extra_measurement(name) {
                findings.info(
                    IssueCode::UnspecifiedMeasurement,
                    format!("Measurement {name:?} is not in the product"),
                );
            }
        }
        Some(expected) => {
            if expected.dtype != info.dtype {
                findings.error(
                    IssueCode::DifferentDtype,
                    format!(
                        "{name} dtype: product '{}' != dataset '{}'",
                        expected.dtype, info.dtype
                    ),
                );
            }
            // A file without nodata accepts any product nodata.
            if let Some(actual) = info.nodata {
                let declared = expected.nodata.as_ref().and_then(|n| n.as_f64());
                if !declared.is_some_and(|d| same_nodata(d, actual)) {
                    let declared = expected
                        .nodata
                        .as_ref()
                        .map_or_else(|| "None".to_string(), ToString::to_string);
                    findings.error(
                        IssueCode::DifferentNodata,
                        format!("{name} nodata: product {declared} != dataset {actual}"),
                    );
                }
            }
        }
    }

    if let Some(measurement) = dataset.measurements.get(name) {
        let grid_name = measurement.grid_name();
        if let Some(grid) = dataset.grids.get(grid_name) {
            let file_shape = [info.shape.0, info.shape.1];
            if grid.shape[..] != file_shape[..] {
                findings.error(
                    IssueCode::DifferentShape,
                    format!(
                        "{name} shape: grid {grid_name:?} {:?} != file {:?}",
                        grid.shape, file_shape
                    ),
                );
            }
        }
    }

    let declared = dataset.crs.as_deref().and_then(crs_epsg);
    let actual = info.crs.as_deref().and_then(crs_epsg);
    if let (Some(declared), Some(actual)) = (declared, actual) {
        if declared != actual {
            findings.error(
                IssueCode::DifferentCrs,
                format!("{name} crs: dataset epsg:{declared} != file epsg:{actual}"),
            );
        }
    }
}

fn check_accessories(dataset: &DatasetDoc, location: Option<&str>, findings: &mut Findings) {
    for (name, accessory) in &dataset.accessories {
        let resolved = resolve_location(location, accessory.path.as_str());
        let ResolvedLocation::Local(path) = &resolved else {
            debug!(accessory = %name, location = %resolved, "skipping remote accessory");
            continue;
        };
        if !path.exists() {
            findings.error(
                IssueCode::MissingAccessory,
                format!("Accessory {name:?} not found at {}", path.display()),
            );
            continue;
        }
        let Some(algorithm) = name.strip_prefix(CHECKSUM_PREFIX) else {
            continue;
        };
        if algorithm.eq_ignore_ascii_case("sha256") {
            verify_checksums(name, path, findings);
        } else {
            findings.info(
                IssueCode::UnsupportedChecksum,
                format!("Checksums of type {algorithm:?} are not verified"),
            );
        }
    }
}

/// Verify a `<hex digest>\t<relative path>` checksum file.
fn verify_checksums(name: &str, path: &std::path::Path, findings: &mut Findings) {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            findings.error(
                IssueCode::MissingAccessory,
                format!("Accessory {name:?} could not be read: {e}"),
            );
            return;
        }
    };
    let base = path.to_str();
    for line in content.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let Some((expected, file)) = line.split_once(char::is_whitespace) else {
            findings.error(
                IssueCode::ChecksumMismatch,
                format!("Unreadable checksum line {line:?} in {name:?}"),
            );
            continue;
        };
        let file = file.trim();
        let ResolvedLocation::Local(target) = resolve_location(base, file) else {
            continue;
        };
        match calculate_sha256(&target) {
            Ok(actual) if actual.eq_ignore_ascii_case(expected) => {}
            Ok(actual) => findings.error(
                IssueCode::ChecksumMismatch,
                format!("{file}: checksum {actual} != expected {expected}"),
            ),
            Err(e) => findings.error(
                IssueCode::ChecksumMismatch,
                format!("{file}: could not be checksummed: {e}"),
            ),
        }
    }
}
