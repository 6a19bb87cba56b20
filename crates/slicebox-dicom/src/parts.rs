//! The lazy DICOM part stream the pipeline consumes. Parsing bytes into
//! parts is an external collaborator (spec.md §1 Non-goals); this crate
//! only transforms an already-tokenised sequence.

use crate::tags::Tag;
use slicebox_core::model::AnonymizationKey;

/// One element of the in-order part sequence emitted by the (external)
/// DICOM parser, per spec.md §4.C and the iterator-adapter redesign note
/// in §9.
#[derive(Debug, Clone, PartialEq)]
pub enum DicomPart {
    /// A data element header: tag, value representation, declared length.
    Header { tag: Tag, vr: String, length: Option<u32> },
    /// Raw value bytes following a `Header`. A value may span several
    /// chunks; chunk boundaries carry no semantic meaning.
    ValueChunk(Vec<u8>),
    /// Start of a sequence (VR `SQ`) item group.
    SequenceStart { tag: Tag },
    SequenceEnd,
    /// Start of one item inside a sequence or pixel-data fragment run.
    Item,
    /// Encapsulated pixel-data fragments (compressed transfer syntaxes).
    Fragments,
    /// Synthetic part carrying the `(SOPClassUID, TransferSyntaxUID)` pair
    /// read from the object's preamble/meta group, used by `validate`.
    MetaPart { sop_class_uid: String, transfer_syntax_uid: String },
    /// Synthetic part injected once `lookupForImage` resolves a key,
    /// activating the reverse-anonymise flow for the rest of the stream.
    AnonKeyPart { key: Box<AnonymizationKey> },
}

/// `(SOPClassUID, TransferSyntaxUID)` pairs the pipeline accepts. Rejection
/// drains the remaining input before failing (spec.md §4.C).
#[derive(Debug, Clone)]
pub struct ValidationContexts {
    allowed: Vec<(String, String)>,
}

impl ValidationContexts {
    pub fn new(allowed: Vec<(String, String)>) -> Self {
        Self { allowed }
    }

    pub fn accepts(&self, sop_class_uid: &str, transfer_syntax_uid: &str) -> bool {
        self.allowed
            .iter()
            .any(|(sop, ts)| sop == sop_class_uid && ts == transfer_syntax_uid)
    }
}

/// DEFLATE-compressed transfer syntax UID (Explicit VR Little Endian,
/// deflated). Its presence in a `MetaPart` triggers the deflate branch.
pub const DEFLATED_EXPLICIT_VR_LITTLE_ENDIAN: &str = "1.2.840.10008.1.2.1.99";
