//! Seam between raw DICOM bytes and the `DicomPart` stream this crate
//! transforms. Parsing itself is an external collaborator (spec.md §1
//! Non-goals: "assumes an available parser that emits a lazy sequence of
//! typed parts"), injected here the way the teacher injects its transport
//! and time effects rather than depending on a concrete implementation.

use crate::DicomPart;
use bytes::Bytes;
use futures::stream::BoxStream;

pub trait DicomByteParser: Send + Sync + 'static {
    /// Tokenise a complete DICOM object's bytes into its part sequence.
    fn parse(&self, bytes: Bytes) -> BoxStream<'static, DicomPart>;
}
