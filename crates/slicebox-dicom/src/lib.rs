//! DICOM streaming pipeline (spec.md §4.C): tag-action anonymisation,
//! key-driven reverse-anonymisation, caller-supplied modification, and the
//! validate/collect/fork pipeline graph that ties them together.

pub mod anonymize;
pub mod modify;
pub mod parser;
pub mod parts;
pub mod pipeline;
pub mod reverse;
pub mod tags;

pub use parser::DicomByteParser;
pub use parts::{DicomPart, ValidationContexts};
pub use pipeline::{
    extract_original_identifiers, run_incoming_pipeline, run_outgoing_pipeline, PipelineOutput,
};
pub use slicebox_anon::service::OriginalIdentifiers;
