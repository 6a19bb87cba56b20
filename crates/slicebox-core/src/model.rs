//! Domain types from spec.md §3.

use crate::ids::{
    AnonymizationKeyId, BoxId, ImageId, IncomingImageId, IncomingTransactionId, OutgoingImageId,
    OutgoingTagValueId, OutgoingTransactionId,
};
use crate::time::EpochMillis;
use serde::{Deserialize, Serialize};

/// How a peer box receives images: it is pushed to, or it polls for work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SendMethod {
    Push,
    Poll,
}

/// Shared transaction status machine for both outgoing and incoming
/// transactions (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionStatus {
    Waiting,
    Processing,
    Failed,
    Finished,
}

impl TransactionStatus {
    /// No transaction transitions backward out of a terminal state
    /// (invariant 6, spec.md §8).
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Failed | Self::Finished)
    }
}

/// Identity of a peer Slicebox instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Box {
    pub id: BoxId,
    pub name: String,
    pub token: String,
    pub base_url: String,
    pub send_method: SendMethod,
    pub online: bool,
}

/// One logical "send N images to box B".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingTransaction {
    pub id: OutgoingTransactionId,
    pub box_id: BoxId,
    pub box_name: String,
    pub sent_image_count: i32,
    pub total_image_count: i32,
    pub created: EpochMillis,
    pub updated: EpochMillis,
    pub status: TransactionStatus,
}

impl OutgoingTransaction {
    /// Invariant 1 (spec.md §8): `sentImageCount == totalImageCount` iff
    /// status is FINISHED. Call after every mutation, before commit.
    pub fn check_finished_invariant(&self) -> bool {
        (self.sent_image_count == self.total_image_count) == (self.status == TransactionStatus::Finished)
    }
}

/// One image within an outgoing transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingImage {
    pub id: OutgoingImageId,
    pub outgoing_transaction_id: OutgoingTransactionId,
    pub image_id: ImageId,
    pub sequence_number: i32,
    pub sent: bool,
}

/// Forced attribute override applied while streaming one outgoing image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingTagValue {
    pub id: OutgoingTagValueId,
    pub outgoing_image_id: OutgoingImageId,
    pub tag: u32,
    pub value: String,
}

/// Mirror of an OutgoingTransaction on the receiver side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomingTransaction {
    pub id: IncomingTransactionId,
    pub box_id: BoxId,
    pub outgoing_transaction_id: OutgoingTransactionId,
    pub received_image_count: i32,
    pub added_image_count: i32,
    pub total_image_count: i32,
    pub created: EpochMillis,
    pub updated: EpochMillis,
    pub status: TransactionStatus,
}

impl IncomingTransaction {
    /// Invariant 2 (spec.md §8).
    pub fn check_counter_invariant(&self) -> bool {
        self.received_image_count <= self.total_image_count
            && self.added_image_count <= self.received_image_count
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomingImage {
    pub id: IncomingImageId,
    pub incoming_transaction_id: IncomingTransactionId,
    pub sequence_number: i32,
    pub image_id: ImageId,
    pub overwrite: bool,
}

/// Which level of the hierarchy an `AnonymizationKey` lookup matched at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AnonymizationKeyLevel {
    Patient,
    Study,
    Series,
    Image,
}

/// Pseudonym mapping for one image (spec.md §3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnonymizationKey {
    pub id: AnonymizationKeyId,
    pub created: EpochMillis,
    pub image_id: ImageId,

    pub patient_name: String,
    pub anon_patient_name: String,
    pub patient_id: String,
    pub anon_patient_id: String,
    pub study_instance_uid: String,
    pub anon_study_instance_uid: String,
    pub series_instance_uid: String,
    pub anon_series_instance_uid: String,
    pub sop_instance_uid: String,
    pub anon_sop_instance_uid: String,

    pub patient_birth_date: Option<String>,
    pub study_description: Option<String>,
    pub frame_of_reference_uid: Option<String>,
    pub anon_frame_of_reference_uid: Option<String>,

    /// Present once a lookup has resolved this key; not persisted.
    #[serde(skip)]
    pub level: Option<AnonymizationKeyLevel>,
}

impl AnonymizationKey {
    /// Equality for deduplication (spec.md §3/§4.B): matching original and
    /// pseudonym on PatientName, PatientID, StudyInstanceUID, SeriesInstanceUID.
    pub fn matches_for_dedup(&self, other: &AnonymizationKey) -> bool {
        self.patient_name == other.patient_name
            && self.anon_patient_name == other.anon_patient_name
            && self.patient_id == other.patient_id
            && self.anon_patient_id == other.anon_patient_id
            && self.study_instance_uid == other.study_instance_uid
            && self.anon_study_instance_uid == other.anon_study_instance_uid
            && self.series_instance_uid == other.series_instance_uid
            && self.anon_series_instance_uid == other.anon_series_instance_uid
    }
}

/// Attribute extract handed to the (out-of-scope) metadata service after a
/// successful pipeline run. Minimal shape per SPEC_FULL.md §3 ambient note.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataAttributes(pub std::collections::BTreeMap<u32, String>);

impl MetadataAttributes {
    pub fn get(&self, tag: u32) -> Option<&str> {
        self.0.get(&tag).map(String::as_str)
    }

    pub fn set(&mut self, tag: u32, value: impl Into<String>) {
        self.0.insert(tag, value.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx(sent: i32, total: i32, status: TransactionStatus) -> OutgoingTransaction {
        OutgoingTransaction {
            id: OutgoingTransactionId::new(),
            box_id: BoxId::new(),
            box_name: "peer".into(),
            sent_image_count: sent,
            total_image_count: total,
            created: EpochMillis(0),
            updated: EpochMillis(0),
            status,
        }
    }

    #[test]
    fn finished_invariant_holds_both_directions() {
        assert!(tx(2, 2, TransactionStatus::Finished).check_finished_invariant());
        assert!(tx(1, 2, TransactionStatus::Processing).check_finished_invariant());
        assert!(!tx(2, 2, TransactionStatus::Processing).check_finished_invariant());
        assert!(!tx(1, 2, TransactionStatus::Finished).check_finished_invariant());
    }

    #[test]
    fn terminal_states_are_failed_and_finished_only() {
        assert!(TransactionStatus::Finished.is_terminal());
        assert!(TransactionStatus::Failed.is_terminal());
        assert!(!TransactionStatus::Waiting.is_terminal());
        assert!(!TransactionStatus::Processing.is_terminal());
    }
}
