use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum GdcError {
    #[error("GDC request failed: {0}")]
    Http(String),

    #[error("GDC returned status {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("error parsing returned object: {0}")]
    ResultParse(String),

    #[error("no files to download")]
    NoFiles,

    #[error("field given was not valid: {field}. Some close matches: {}", .matches.join(", "))]
    UnknownField { field: String, matches: Vec<String> },

    #[error("at least one value given for {field} was invalid: {}", .values.join(", "))]
    InvalidValue { field: String, values: Vec<String> },

    #[error("no values given for filter field: {0}")]
    EmptyValues(String),

    #[error("conflicting filter: {0}")]
    ConflictingFilter(String),

    #[error("invalid endpoint name: {0}")]
    InvalidEndpoint(String),

    #[error("fetcher invocation failed: {0}")]
    Fetcher(String),

    #[error("token_path setting was not provided & is required for downloads")]
    MissingToken,

    #[error("missing config file gdc-query.json in current directory")]
    MissingConfig,

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("failed to parse clinical file: {0}")]
    ClinicalParse(String),
}
