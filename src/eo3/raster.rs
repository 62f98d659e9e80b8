//! Reading raster properties for thorough validation.
use std::fmt;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tiff::decoder::Decoder;
use tiff::tags::Tag;

use crate::eo3::core::DataType;
use crate::eo3::utils::ResolvedLocation;

const GDAL_NODATA: u16 = 42113;
const GEO_KEY_DIRECTORY: u16 = 34735;
const GEOGRAPHIC_TYPE_KEY: u16 = 2048;
const PROJECTED_CS_TYPE_KEY: u16 = 3072;
const USER_DEFINED: u16 = 32767;

/// What a raster file says about one of its bands.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterInfo {
    pub dtype: DataType,
    pub nodata: Option<f64>,
    /// `(height, width)`
    pub shape: (u64, u64),
    /// `epsg:N`, when the file declares one.
    pub crs: Option<String>,
    pub band_count: u32,
}

#[derive(Debug, Error)]
pub enum RasterReadError {
    #[error("no such file: {0}")]
    NotFound(String),
    #[error("unsupported: {0}")]
    Unsupported(String),
    #[error("band {band} requested but the file has {count} band(s)")]
    NoSuchBand { band: u32, count: u32 },
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("could not decode: {0}")]
    Decode(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl From<tiff::TiffError> for RasterReadError {
    fn from(e: tiff::TiffError) -> Self {
        match e {
            tiff::TiffError::IoError(e) => Self::Io(e),
            other => Self::Decode(other.to_string()),
        }
    }
}

/// Reads raster properties. Implementations must be shareable across reader threads.
pub trait RasterReader: Send + Sync + fmt::Debug {
    fn read(&self, location: &ResolvedLocation, band: u32) -> Result<RasterInfo, RasterReadError>;
}

/// Reads local GeoTIFFs.
#[derive(Debug, Clone, Copy, Default)]
pub struct TiffRasterReader;

impl RasterReader for TiffRasterReader {
    fn read(&self, location: &ResolvedLocation, band: u32) -> Result<RasterInfo, RasterReadError> {
        match location {
            ResolvedLocation::Local(path) => read_tiff(path, band),
            ResolvedLocation::Remote(url) => Err(RasterReadError::Unsupported(format!(
                "remote location {url} is not fetched"
            ))),
        }
    }
}

fn sample_dtype(format: u16, bits: u16) -> Option<DataType> {
    let dtype = match (format, bits) {
        (1, 1) => DataType::Bool,
        (1, 8) => DataType::Uint8,
        (2, 8) => DataType::Int8,
        (1, 16) => DataType::Uint16,
        (2, 16) => DataType::Int16,
        (1, 32) => DataType::Uint32,
        (2, 32) => DataType::Int32,
        (1, 64) => DataType::Uint64,
        (2, 64) => DataType::Int64,
        (3, 16) => DataType::Float16,
        (3, 32) => DataType::Float32,
        (3, 64) => DataType::Float64,
        _ => return None,
    };
    Some(dtype)
}

/// The EPSG code declared in a GeoTIFF key directory.
pub fn epsg_from_geokeys(keys: &[u16]) -> Option<u32> {
    let count = usize::from(*keys.get(3)?);
    let entries = keys.get(4..4 + count * 4)?;
    let mut geographic = None;
    for entry in entries.chunks_exact(4) {
        let (id, location, value) = (entry[0], entry[1], entry[3]);
        if location != 0 || value == 0 || value == USER_DEFINED {
            continue;
        }
        match id {
            PROJECTED_CS_TYPE_KEY => return Some(u32::from(value)),
            GEOGRAPHIC_TYPE_KEY => geographic = Some(u32::from(value)),
            _ => {}
        }
    }
    geographic
}

fn pick(values: &[u16], band: u32, default: u16) -> u16 {
    let index = usize::try_from(band.saturating_sub(1)).unwrap_or(0);
    values
        .get(index)
        .or_else(|| values.first())
        .copied()
        .unwrap_or(default)
}

fn read_tiff(path: &Path, band: u32) -> Result<RasterInfo, RasterReadError> {
    let file = File::open(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => RasterReadError::NotFound(path.display().to_string()),
        _ => RasterReadError::Io(e),
    })?;
    let mut decoder = Decoder::new(BufReader::new(file))?;

    let (width, height) = decoder.dimensions()?;
    let band_count = decoder
        .find_tag_unsigned::<u32>(Tag::SamplesPerPixel)?
        .unwrap_or(1);
    if band == 0 || band > band_count {
        return Err(RasterReadError::NoSuchBand {
            band,
            count: band_count,
        });
    }

    let bits = decoder
        .find_tag_unsigned_vec::<u16>(Tag::BitsPerSample)?
        .unwrap_or_else(|| vec![1]);
    let formats = decoder
        .find_tag_unsigned_vec::<u16>(Tag::SampleFormat)?
        .unwrap_or_else(|| vec![1]);
    let (format, bits) = (pick(&formats, band, 1), pick(&bits, band, 1));
    let dtype = sample_dtype(format, bits).ok_or_else(|| {
        RasterReadError::Unsupported(format!("sample format {format} with {bits} bits"))
    })?;

    let nodata = match decoder.find_tag(Tag::from_u16_exhaustive(GDAL_NODATA))? {
        Some(value) => {
            let text = value.into_string()?;
            let text = text.trim_matches(char::from(0)).trim();
            Some(parse_nodata(text).ok_or_else(|| {
                RasterReadError::Decode(format!("unreadable nodata value {text:?}"))
            })?)
        }
        None => None,
    };

    let crs = decoder
        .find_tag_unsigned_vec::<u16>(Tag::from_u16_exhaustive(GEO_KEY_DIRECTORY))?
        .and_then(|keys| epsg_from_geokeys(&keys))
        .map(|code| format!("epsg:{code}"));

    Ok(RasterInfo {
        dtype,
        nodata,
        shape: (u64::from(height), u64::from(width)),
        crs,
        band_count,
    })
}

fn parse_nodata(text: &str) -> Option<f64> {
    match text.to_ascii_lowercase().as_str() {
        "nan" | "-nan" => Some(f64::NAN),
        "inf" | "+inf" => Some(f64::INFINITY),
        "-inf" => Some(f64::NEG_INFINITY),
        other => other.parse().ok(),
    }
}
