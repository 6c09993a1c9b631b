//! Data-acquisition client for the GDC (Genomic Data Commons) REST API:
//! filtered queries, paginated manifest assembly, gdc-client driven
//! download-and-verify, and clinical-XML-to-tabular transformation.

pub mod app;
pub mod clinical;
pub mod domain;
pub mod download;
pub mod error;
pub mod fields;
pub mod fileinfo;
pub mod filters;
pub mod http;
pub mod manifest;
pub mod paginate;
pub mod settings;
