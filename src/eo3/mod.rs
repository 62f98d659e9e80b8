//! Validation of eo3 dataset documents, and the product and metadata type
//! definitions they are checked against.
pub mod allowance;
pub mod context;
pub mod core;
pub mod errors;
pub mod generate;
pub mod issues;
pub mod load;
pub mod matcher;
pub mod properties;
pub mod raster;
pub mod schema;
pub mod schemas;
pub mod thorough;
pub mod utils;
pub mod validate;

pub use errors::{Error, Result};
pub use issues::{Issue, IssueCode, IssueKind, Level};
pub use validate::{
    DocumentReport, RunReport, SourceDocument, ValidateConfig, Validator, validate_documents,
    validate_file, validate_paths,
};
