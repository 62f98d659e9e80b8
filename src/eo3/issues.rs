//! Typed diagnostics: the only output vocabulary of the validation engine.
use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity of an [`Issue`]. Ordered so that thresholds can be compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    Info,
    Warning,
    Error,
}

impl Level {
    /// Single-letter tag used by the plain reporter.
    pub fn initial(&self) -> char {
        match self {
            Level::Info => 'I',
            Level::Warning => 'W',
            Level::Error => 'E',
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let key = match self {
            Level::Info => "info",
            Level::Warning => "warning",
            Level::Error => "error",
        };
        write!(f, "{}", key)
    }
}

/// Broad category of an issue. Each [`IssueCode`] belongs to exactly one kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    /// Document shape.
    Structural,
    /// Unknown or mismatched product/type references.
    Reference,
    /// Measurement, property or geometry mismatch.
    Semantic,
    /// Thorough-mode disagreement between the document and the files it references.
    DataIntegrity,
    /// The document could not be processed at all.
    Fatal,
}

macro_rules! issue_codes {
    ($($variant:ident => ($code:literal, $kind:ident)),+ $(,)?) => {
        /// Stable machine-readable issue identifiers.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum IssueCode {
            $($variant),+
        }

        impl IssueCode {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(IssueCode::$variant => $code),+
                }
            }

            pub fn kind(&self) -> IssueKind {
                match self {
                    $(IssueCode::$variant => IssueKind::$kind),+
                }
            }
        }
    };
}

issue_codes! {
    NoSchema => ("no_schema", Structural),
    UnknownDocType => ("unknown_doc_type", Structural),
    Structure => ("structure", Structural),
    InvalidId => ("invalid_id", Structural),
    MissingField => ("missing_field", Structural),
    NullField => ("null_field", Structural),
    UnknownField => ("unknown_field", Structural),
    DocumentSchema => ("document_schema", Structural),
    MeasurementsList => ("measurements_list", Structural),
    NoLicense => ("no_license", Structural),
    UnsuitableNodata => ("unsuitable_nodata", Structural),
    DuplicateMeasurementName => ("duplicate_measurement_name", Structural),
    DuplicateAliasName => ("duplicate_alias_name", Structural),
    InvalidAllowances => ("invalid_allowances", Structural),
    MissingSuffix => ("missing_suffix", Structural),

    UnknownProduct => ("unknown_product", Reference),
    UnverifiedType => ("unverified_type", Reference),
    StrangeProductClaim => ("strange_product_claim", Reference),
    ProductMatchClash => ("product_match_clash", Reference),
    DuplicateDefinition => ("duplicate_definition", Reference),

    MissingMeasurement => ("missing_measurement", Semantic),
    ExtraMeasurement => ("extra_measurement", Semantic),
    InvalidGridRef => ("invalid_grid_ref", Semantic),
    AbsolutePath => ("absolute_path", Semantic),
    MissingGeometry => ("missing_geometry", Semantic),
    InvalidGeometry => ("invalid_geometry", Semantic),
    IncompleteGrids => ("incomplete_grids", Semantic),
    IncompleteCrs => ("incomplete_crs", Semantic),
    InvalidCrsEpsg => ("invalid_crs_epsg", Semantic),
    MixedCrsCase => ("mixed_crs_case", Semantic),
    InvalidCrs => ("invalid_crs", Semantic),
    NonEpsg => ("non_epsg", Semantic),
    UnknownProperty => ("unknown_property", Semantic),
    InvalidProperty => ("invalid_property", Semantic),
    PropertyType => ("property_type", Semantic),
    PropertyFormatting => ("property_formatting", Semantic),
    ProducerDomain => ("producer_domain", Semantic),
    GlobalFileFormat => ("global_file_format", Semantic),

    UnreadableMeasurement => ("unreadable_measurement", DataIntegrity),
    IncorrectBand => ("incorrect_band", DataIntegrity),
    DifferentDtype => ("different_dtype", DataIntegrity),
    DifferentNodata => ("different_nodata", DataIntegrity),
    UnspecifiedMeasurement => ("unspecified_measurement", DataIntegrity),
    DifferentShape => ("different_shape", DataIntegrity),
    DifferentCrs => ("different_crs", DataIntegrity),
    MissingAccessory => ("missing_accessory", DataIntegrity),
    ChecksumMismatch => ("checksum_mismatch", DataIntegrity),
    UnsupportedChecksum => ("unsupported_checksum", DataIntegrity),

    UnknownDocument => ("unknown_document", Fatal),
    UnsupportedDocument => ("unsupported_document", Fatal),
}

impl fmt::Display for IssueCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One diagnostic raised against one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub level: Level,
    pub code: IssueCode,
    pub document: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl Issue {
    pub fn kind(&self) -> IssueKind {
        self.code.kind()
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)?;
        if let Some(hint) = &self.hint {
            write!(f, " (Hint: {hint})")?;
        }
        Ok(())
    }
}

/// Accumulates the issues raised for one document, in detection order.
#[derive(Debug, Clone)]
pub struct Findings {
    document: String,
    issues: Vec<Issue>,
}

impl Findings {
    pub fn new(document: impl Into<String>) -> Self {
        Self {
            document: document.into(),
            issues: Vec::new(),
        }
    }

    pub fn document(&self) -> &str {
        &self.document
    }

    pub fn raise(
        &mut self,
        level: Level,
        code: IssueCode,
        message: impl Into<String>,
        hint: Option<String>,
    ) {
        self.issues.push(Issue {
            level,
            code,
            document: self.document.clone(),
            message: message.into(),
            hint,
        });
    }

    pub fn error(&mut self, code: IssueCode, message: impl Into<String>) {
        self.raise(Level::Error, code, message, None);
    }

    pub fn warning(&mut self, code: IssueCode, message: impl Into<String>) {
        self.raise(Level::Warning, code, message, None);
    }

    pub fn info(&mut self, code: IssueCode, message: impl Into<String>) {
        self.raise(Level::Info, code, message, None);
    }

    pub fn issues(&self) -> &[Issue] {
        &self.issues
    }

    pub fn len(&self) -> usize {
        self.issues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn has_errors(&self) -> bool {
        self.issues.iter().any(|i| i.level == Level::Error)
    }

    pub fn into_issues(self) -> Vec<Issue> {
        self.issues
    }
}
