//! Validation runs: classify each document, check it, and collect its issues.
use derive_builder::Builder;
use serde::Serialize;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::eo3::allowance::ExtraMeasurements;
use crate::eo3::context::ProductContext;
use crate::eo3::core::{DocKind, EO3_SCHEMA_URL};
use crate::eo3::errors::Result;
use crate::eo3::issues::{Findings, Issue, IssueCode, Level};
use crate::eo3::load::load_paths;
use crate::eo3::matcher::match_dataset;
use crate::eo3::raster::{RasterReader, TiffRasterReader};
use crate::eo3::schema::{check_dataset, check_metadata_type, check_product};
use crate::eo3::thorough::Verifier;
use crate::eo3::utils::{filename_doc_kind, readable_doc_extension};

const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_MAX_PARALLEL_READS: usize = 4;

/// Options for one validation run.
#[derive(Debug, Clone, PartialEq, Builder)]
pub struct ValidateConfig {
    /// Open referenced files too.
    #[builder(default)]
    pub thorough: bool,
    /// Documents with an issue at or above this level fail.
    #[builder(default = "Level::Error")]
    pub threshold: Level,
    /// Extra measurements to accept from every dataset in the run.
    #[builder(default)]
    pub extra_measurements: ExtraMeasurements,
    #[builder(default = "DEFAULT_READ_TIMEOUT")]
    pub read_timeout: Duration,
    #[builder(default = "DEFAULT_MAX_PARALLEL_READS")]
    pub max_parallel_reads: usize,
}

impl ValidateConfig {
    pub fn builder() -> ValidateConfigBuilder {
        ValidateConfigBuilder::default()
    }
}

impl Default for ValidateConfig {
    fn default() -> Self {
        Self {
            thorough: false,
            threshold: Level::Error,
            extra_measurements: ExtraMeasurements::default(),
            read_timeout: DEFAULT_READ_TIMEOUT,
            max_parallel_reads: DEFAULT_MAX_PARALLEL_READS,
        }
    }
}

/// A parsed document and where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceDocument {
    pub location: Option<String>,
    pub doc: Value,
    /// Named by the caller, rather than found by scanning a directory.
    pub explicit: bool,
}

impl SourceDocument {
    pub fn new(doc: Value) -> Self {
        Self {
            location: None,
            doc,
            explicit: true,
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn discovered(mut self) -> Self {
        self.explicit = false;
        self
    }
}

/// What the contents of a document look like.
pub fn guess_kind_from_contents(doc: &Value) -> Option<DocKind> {
    if doc.get("$schema").and_then(Value::as_str) == Some(EO3_SCHEMA_URL) {
        return Some(DocKind::Dataset);
    }
    if doc.get("metadata_type").is_some() {
        if doc.get("source_type").is_some() {
            return Some(DocKind::IngestionConfig);
        }
        return Some(DocKind::Product);
    }
    if doc
        .get("dataset")
        .and_then(|d| d.get("search_fields"))
        .is_some()
    {
        return Some(DocKind::MetadataType);
    }
    if doc.get("id").is_some() {
        if doc.get("lineage").is_some() && doc.get("platform").is_some() {
            return Some(DocKind::LegacyDataset);
        }
        if doc
            .get("properties")
            .and_then(|p| p.get("datetime"))
            .is_some()
        {
            return Some(DocKind::StacItem);
        }
    }
    None
}

/// The issues raised for one document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentReport {
    pub document: String,
    pub kind: Option<DocKind>,
    pub issues: Vec<Issue>,
}

impl DocumentReport {
    pub fn count(&self, level: Level) -> usize {
        self.issues.iter().filter(|i| i.level == level).count()
    }

    pub fn passes(&self, threshold: Level) -> bool {
        self.issues.iter().all(|i| i.level < threshold)
    }
}

/// Every document's issues, in input order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub threshold: Level,
    pub documents: Vec<DocumentReport>,
}

impl RunReport {
    pub fn count(&self, level: Level) -> usize {
        self.documents.iter().map(|d| d.count(level)).sum()
    }

    pub fn failed_count(&self) -> usize {
        self.documents
            .iter()
            .filter(|d| !d.passes(self.threshold))
            .count()
    }

    pub fn is_success(&self) -> bool {
        self.failed_count() == 0
    }

    pub fn issues(&self) -> impl Iterator<Item = &Issue> {
        self.documents.iter().flat_map(|d| d.issues.iter())
    }
}

/// Validates a stream of documents. Each instance owns its own product context.
#[derive(Debug)]
pub struct Validator {
    config: ValidateConfig,
    context: ProductContext,
    verifier: Verifier,
}

impl Validator {
    pub fn new(config: ValidateConfig) -> Self {
        Self::with_reader(config, Arc::new(TiffRasterReader))
    }

    pub fn with_reader(config: ValidateConfig, reader: Arc<dyn RasterReader>) -> Self {
        let verifier = Verifier::new(reader, config.read_timeout, config.max_parallel_reads);
        Self {
            config,
            context: ProductContext::new(),
            verifier,
        }
    }

    /// Start from definitions obtained elsewhere.
    pub fn with_context(mut self, context: ProductContext) -> Self {
        self.context = context;
        self
    }

    pub fn context(&self) -> &ProductContext {
        &self.context
    }

    pub fn config(&self) -> &ValidateConfig {
        &self.config
    }

    /// Validate one document. `None` when it was discovered rather than named,
    /// and isn't a kind of document we validate.
    pub fn validate(&mut self, source: &SourceDocument) -> Option<DocumentReport> {
        let name = source
            .location
            .clone()
            .unwrap_or_else(|| "document".to_string());
        self.validate_named(name, source)
    }

    /// Validate documents strictly in order: later documents may rely on earlier definitions.
    pub fn validate_all<I>(&mut self, sources: I) -> RunReport
    where
        I: IntoIterator<Item = SourceDocument>,
    {
        let documents = sources
            .into_iter()
            .enumerate()
            .filter_map(|(i, source)| {
                let name = source
                    .location
                    .clone()
                    .unwrap_or_else(|| format!("document #{}", i + 1));
                self.validate_named(name, &source)
            })
            .collect();
        RunReport {
            threshold: self.config.threshold,
            documents,
        }
    }

    fn validate_named(&mut self, name: String, source: &SourceDocument) -> Option<DocumentReport> {
        let mut findings = Findings::new(name);
        let kind = classify(source, &mut findings);
        debug!(document = findings.document(), kind = ?kind, "classified");

        match kind {
            Some(DocKind::Dataset) => self.validate_dataset(source, &mut findings),
            Some(DocKind::Product) => {
                if let Some(product) = check_product(&source.doc, &mut findings) {
                    self.context.register_product(product, &mut findings);
                }
            }
            Some(DocKind::MetadataType) => {
                if let Some(metadata_type) = check_metadata_type(&source.doc, &mut findings) {
                    self.context
                        .register_metadata_type(metadata_type, &mut findings);
                }
            }
            Some(other) if source.explicit => findings.error(
                IssueCode::UnsupportedDocument,
                format!("Cannot currently validate {other} documents"),
            ),
            None if source.explicit => {
                findings.error(IssueCode::UnknownDocument, "Unknown document type")
            }
            // Found by scanning, and not ours: skip it.
            _ => return None,
        }

        let report = DocumentReport {
            document: findings.document().to_string(),
            kind,
            issues: findings.into_issues(),
        };
        debug!(
            document = %report.document,
            issues = report.issues.len(),
            passed = report.passes(self.config.threshold),
            "validated"
        );
        Some(report)
    }

    fn validate_dataset(&self, source: &SourceDocument, findings: &mut Findings) {
        let Some(dataset) = check_dataset(&source.doc, findings) else {
            return;
        };
        let matched = match_dataset(
            &source.doc,
            &dataset,
            &self.context,
            &self.config.extra_measurements,
            findings,
        );
        if self.config.thorough {
            self.verifier
                .verify(&dataset, source.location.as_deref(), &matched, findings);
        }
    }
}

/// Decide what a document is. The filename's convention wins over the contents.
fn classify(source: &SourceDocument, findings: &mut Findings) -> Option<DocKind> {
    let location = source.location.as_deref();
    if let Some(kind) = location.and_then(filename_doc_kind) {
        return Some(kind);
    }
    let kind = guess_kind_from_contents(&source.doc)?;
    if let (Some(location), Some(suffix)) = (location, kind.suffix()) {
        let extension = readable_doc_extension(location).unwrap_or_else(|| ".yaml".to_string());
        findings.warning(
            IssueCode::MissingSuffix,
            format!(
                "Document looks like a {kind} but does not have filename extension \"{suffix}{extension}\""
            ),
        );
    }
    Some(kind)
}

/// Validate documents against a fresh context.
pub fn validate_documents<I>(sources: I, config: ValidateConfig) -> RunReport
where
    I: IntoIterator<Item = SourceDocument>,
{
    Validator::new(config).validate_all(sources)
}

/// Load and validate files and directories, in the order given.
pub fn validate_paths<P: AsRef<Path>>(paths: &[P], config: ValidateConfig) -> Result<RunReport> {
    let sources = load_paths(paths)?;
    Ok(validate_documents(sources, config))
}

/// Validate one file with the default options.
pub fn validate_file(file_path: &Path) -> Result<RunReport> {
    validate_paths(&[file_path], ValidateConfig::default())
}
