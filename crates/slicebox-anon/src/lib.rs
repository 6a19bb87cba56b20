//! Anonymisation key service (spec.md §4.B): persistence-backed lookup,
//! dedup-on-insert, and pseudonym generation for the DICOM stream pipeline.

pub mod pseudonym;
pub mod service;

pub use service::AnonymizationService;
