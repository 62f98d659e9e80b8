//! Reading documents from files and directories.
use flate2::read::GzDecoder;
use serde::Deserialize;
use serde_json::{Map, Number, Value};
use std::fs;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::eo3::errors::{Error, Result};
use crate::eo3::utils::{GZIP_SUFFIX, is_url, readable_doc_extension};
use crate::eo3::validate::SourceDocument;

/// Convert YAML to JSON values. Non-finite floats become the strings
/// `NaN`, `inf` and `-inf`, which is how nodata values are written as text.
pub fn yaml_to_json(value: serde_yaml::Value) -> Value {
    match value {
        serde_yaml::Value::Null => Value::Null,
        serde_yaml::Value::Bool(b) => Value::Bool(b),
        serde_yaml::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::from(i)
            } else if let Some(u) = n.as_u64() {
                Value::from(u)
            } else {
                let f = n.as_f64().unwrap_or(f64::NAN);
                match Number::from_f64(f) {
                    Some(number) => Value::Number(number),
                    None if f.is_nan() => Value::String("NaN".to_string()),
                    None if f > 0.0 => Value::String("inf".to_string()),
                    None => Value::String("-inf".to_string()),
                }
            }
        }
        serde_yaml::Value::String(s) => Value::String(s),
        serde_yaml::Value::Sequence(items) => {
            Value::Array(items.into_iter().map(yaml_to_json).collect())
        }
        serde_yaml::Value::Mapping(mapping) => {
            let mut map = Map::with_capacity(mapping.len());
            for (key, value) in mapping {
                map.insert(yaml_key(key), yaml_to_json(value));
            }
            Value::Object(map)
        }
        serde_yaml::Value::Tagged(tagged) => yaml_to_json(tagged.value),
    }
}

fn yaml_key(key: serde_yaml::Value) -> String {
    match key {
        serde_yaml::Value::String(s) => s,
        other => match yaml_to_json(other) {
            Value::String(s) => s,
            other => other.to_string(),
        },
    }
}

/// Parse every document in a YAML stream. Empty documents are dropped.
pub fn parse_yaml_documents(text: &str, location: &str) -> Result<Vec<Value>> {
    let mut docs = Vec::new();
    for document in serde_yaml::Deserializer::from_str(text) {
        let value = serde_yaml::Value::deserialize(document).map_err(|e| Error::yaml(location, e))?;
        if !value.is_null() {
            docs.push(yaml_to_json(value));
        }
    }
    Ok(docs)
}

/// Read the documents in one file.
///
/// A file holding several documents gets `#part=N` locations, numbered from zero.
pub fn load_file(path: &Path, explicit: bool) -> Result<Vec<SourceDocument>> {
    let location = path.display().to_string();
    let extension = readable_doc_extension(&location).ok_or_else(|| {
        Error::invalid_format(format!("{location}: not a .yaml, .yml or .json file"))
    })?;
    let file = fs::File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => Error::file_not_found(path),
        _ => Error::Io(e),
    })?;

    let mut text = String::new();
    let extension = match extension.strip_suffix(GZIP_SUFFIX) {
        Some(format) => {
            GzDecoder::new(file).read_to_string(&mut text)?;
            format
        }
        None => {
            BufReader::new(file).read_to_string(&mut text)?;
            extension.as_str()
        }
    };

    let docs = if extension == ".json" {
        vec![serde_json::from_str(&text)?]
    } else {
        parse_yaml_documents(&text, &location)?
    };
    debug!(path = %location, documents = docs.len(), "loaded");

    let several = docs.len() > 1;
    Ok(docs
        .into_iter()
        .enumerate()
        .map(|(i, doc)| {
            let location = if several {
                format!("{location}#part={i}")
            } else {
                location.clone()
            };
            SourceDocument {
                location: Some(location),
                doc,
                explicit,
            }
        })
        .collect())
}

fn walk_dir(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    let mut entries = fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()?;
    entries.sort();
    for path in entries {
        if path.is_dir() {
            walk_dir(&path, out)?;
        } else if readable_doc_extension(&path.display().to_string()).is_some() {
            out.push(path);
        }
    }
    Ok(())
}

/// Load documents from files and directories, in the order given.
///
/// Directories are searched recursively, in sorted order, for `.yaml`, `.yml`
/// and `.json` files, gzipped or not. Files found this way that cannot be read are skipped.
pub fn load_paths<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<SourceDocument>> {
    let mut sources = Vec::new();
    for path in paths {
        let path = path.as_ref();
        let text = path.display().to_string();
        if is_url(&text) && !text.starts_with("file:") {
            return Err(Error::UnsupportedLocation(text));
        }
        let path = match url::Url::parse(&text) {
            Ok(url) if url.scheme() == "file" => url
                .to_file_path()
                .map_err(|_| Error::UnsupportedLocation(text.clone()))?,
            _ => path.to_path_buf(),
        };

        if path.is_dir() {
            let mut found = Vec::new();
            walk_dir(&path, &mut found)?;
            for file in found {
                match load_file(&file, false) {
                    Ok(docs) => sources.extend(docs),
                    Err(e) => warn!(path = %file.display(), error = %e, "skipping unreadable file"),
                }
            }
        } else {
            sources.extend(load_file(&path, true)?);
        }
    }
    Ok(sources)
}
