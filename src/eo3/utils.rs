use crate::eo3::core::DocKind;
use crate::eo3::errors::{Error, Result};
use path_clean::PathClean;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use url::Url;

const DOC_FORMATS: &[&str] = &[".yaml", ".yml", ".json"];

/// Documents may be gzipped: `.yaml.gz`, `.json.gz`...
pub const GZIP_SUFFIX: &str = ".gz";

/// Calculate the SHA-256 hash of a file, hex encoded.
pub fn calculate_sha256(file_path: &Path) -> Result<String> {
    let mut file = File::open(file_path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => Error::file_not_found(file_path),
        _ => Error::Io(e),
    })?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

/// Strip a `#part=N` fragment, as added to multi-document locations.
pub fn strip_fragment(location: &str) -> &str {
    location.split_once('#').map_or(location, |(base, _)| base)
}

/// Does the string look like a URL rather than a local path?
pub fn is_url(location: &str) -> bool {
    // Windows drive letters parse as one-letter schemes.
    matches!(Url::parse(location), Ok(url) if url.scheme().len() > 1)
}

fn suffixes(location: &str) -> Vec<String> {
    let path = strip_fragment(location);
    let name = path.rsplit(['/', '\\']).next().unwrap_or(path);
    name.split('.')
        .skip(1)
        .map(|s| format!(".{}", s.to_ascii_lowercase()))
        .collect()
}

/// The document kind a filename's naming convention declares, if any.
///
/// `LC8_2014.odc-metadata.yaml` -> dataset, `ls8_fc.odc-product.json` -> product.
pub fn filename_doc_kind(location: &str) -> Option<DocKind> {
    suffixes(location)
        .iter()
        .rev()
        .find_map(|s| DocKind::from_suffix(s))
}

/// The document format extension (`.yaml`, `.json.gz`...) of a location, if it is one we read.
pub fn readable_doc_extension(location: &str) -> Option<String> {
    let suffixes = suffixes(location);
    let (last, rest) = suffixes.split_last()?;
    if last == GZIP_SUFFIX {
        let format = rest.last().filter(|s| DOC_FORMATS.contains(&s.as_str()))?;
        return Some(format!("{format}{GZIP_SUFFIX}"));
    }
    DOC_FORMATS.contains(&last.as_str()).then(|| last.clone())
}

/// Where a path inside a document points, resolved against the document's location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedLocation {
    Local(PathBuf),
    Remote(Url),
}

impl std::fmt::Display for ResolvedLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolvedLocation::Local(path) => write!(f, "{}", path.display()),
            ResolvedLocation::Remote(url) => write!(f, "{url}"),
        }
    }
}

/// Resolve a (possibly relative) path against the location of the document naming it.
pub fn resolve_location(base: Option<&str>, path: &str) -> ResolvedLocation {
    if is_url(path) {
        return match Url::parse(path) {
            Ok(url) if url.scheme() == "file" => url
                .to_file_path()
                .map(|p| ResolvedLocation::Local(p.clean()))
                .unwrap_or(ResolvedLocation::Remote(url)),
            Ok(url) => ResolvedLocation::Remote(url),
            Err(_) => ResolvedLocation::Local(PathBuf::from(path)),
        };
    }
    let Some(base) = base.map(strip_fragment) else {
        return ResolvedLocation::Local(PathBuf::from(path).clean());
    };
    if is_url(base) {
        if let Ok(base_url) = Url::parse(base) {
            if base_url.scheme() == "file" {
                if let Ok(base_path) = base_url.to_file_path() {
                    return resolve_location(base_path.to_str(), path);
                }
            }
            if let Ok(joined) = base_url.join(path) {
                return ResolvedLocation::Remote(joined);
            }
        }
        return ResolvedLocation::Local(PathBuf::from(path).clean());
    }
    let path = Path::new(path);
    if path.is_absolute() {
        return ResolvedLocation::Local(path.clean());
    }
    let dir = Path::new(base).parent().unwrap_or(Path::new(""));
    ResolvedLocation::Local(dir.join(path).clean())
}

/// Is the path absolute, either as a URL or a filesystem path?
pub fn is_absolute(path: &str) -> bool {
    is_url(path) || Path::new(path).is_absolute() || path.starts_with('/')
}

/// NaN-aware equality of nodata values.
pub fn same_nodata(a: f64, b: f64) -> bool {
    a == b || (a.is_nan() && b.is_nan())
}
