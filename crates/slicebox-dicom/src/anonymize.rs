//! Anonymise flow (spec.md §4.C): a stateful iterator adapter that consumes
//! one `DicomPart` at a time and emits zero-or-more, per the redesign note
//! in spec.md §9 ("explicit iterator adapter pipeline").
//!
//! Pseudonyms are not generated here — they come from the
//! `AnonymizationKey` the key service already resolved for this image
//! (spec.md §4.B), so the same original UID always anonymises to the same
//! pseudonym and the reverse flow can find its way back.

use crate::parts::DicomPart;
use crate::tags::{self, Tag, TagAction, DEIDENTIFICATION_METHOD_DESCRIPTION};
use slicebox_core::model::AnonymizationKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pending {
    Remove,
    Zero,
    ReplaceUid(Tag),
    ReplacePatientIdentity(Tag),
    Keep,
}

pub struct AnonymizeStage<'a> {
    key: &'a AnonymizationKey,
    pending: Option<Pending>,
}

impl<'a> AnonymizeStage<'a> {
    pub fn new(key: &'a AnonymizationKey) -> Self {
        Self { key, pending: None }
    }

    pub fn step(&mut self, part: DicomPart) -> Vec<DicomPart> {
        match part {
            DicomPart::Header { tag, vr, length } => {
                let action = tags::anonymize_action(tag);
                self.pending = Some(match action {
                    TagAction::Remove => Pending::Remove,
                    TagAction::Zero => Pending::Zero,
                    TagAction::ReplaceUid => Pending::ReplaceUid(tag),
                    TagAction::ReplacePatientIdentity => Pending::ReplacePatientIdentity(tag),
                    TagAction::Keep => Pending::Keep,
                });
                if matches!(action, TagAction::Remove) {
                    vec![]
                } else {
                    vec![DicomPart::Header { tag, vr, length }]
                }
            }
            DicomPart::ValueChunk(bytes) => match self.pending {
                Some(Pending::Remove) => vec![],
                Some(Pending::Zero) => vec![DicomPart::ValueChunk(vec![])],
                Some(Pending::ReplaceUid(tag)) => {
                    vec![DicomPart::ValueChunk(self.uid_replacement(tag).into_bytes())]
                }
                Some(Pending::ReplacePatientIdentity(tag)) => {
                    let replacement = if tag == tags::PATIENT_NAME {
                        self.key.anon_patient_name.clone()
                    } else {
                        self.key.anon_patient_id.clone()
                    };
                    vec![DicomPart::ValueChunk(replacement.into_bytes())]
                }
                Some(Pending::Keep) | None => vec![DicomPart::ValueChunk(bytes)],
            },
            other => {
                self.pending = None;
                vec![other]
            }
        }
    }

    fn uid_replacement(&self, tag: Tag) -> String {
        match tag {
            tags::STUDY_INSTANCE_UID => self.key.anon_study_instance_uid.clone(),
            tags::SERIES_INSTANCE_UID => self.key.anon_series_instance_uid.clone(),
            tags::SOP_INSTANCE_UID => self.key.anon_sop_instance_uid.clone(),
            tags::FRAME_OF_REFERENCE_UID => self.key.anon_frame_of_reference_uid.clone().unwrap_or_default(),
            _ => String::new(),
        }
    }

    /// Forced attributes inserted into every anonymised object (spec.md
    /// §4.C): `PatientIdentityRemoved = "YES"` and `DeidentificationMethod`.
    /// Call once after the source stream is exhausted.
    pub fn finish(&self) -> Vec<DicomPart> {
        vec![
            DicomPart::Header { tag: tags::PATIENT_IDENTITY_REMOVED, vr: "CS".to_string(), length: Some(3) },
            DicomPart::ValueChunk(b"YES".to_vec()),
            DicomPart::Header { tag: tags::DEIDENTIFICATION_METHOD, vr: "LO".to_string(), length: None },
            DicomPart::ValueChunk(DEIDENTIFICATION_METHOD_DESCRIPTION.as_bytes().to_vec()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slicebox_core::ids::{AnonymizationKeyId, ImageId};
    use slicebox_core::time::EpochMillis;

    fn sample_key() -> AnonymizationKey {
        AnonymizationKey {
            id: AnonymizationKeyId::new(),
            created: EpochMillis(0),
            image_id: ImageId("img-1".into()),
            patient_name: "Doe^Jane".into(),
            anon_patient_name: "Anon40^Morgan".into(),
            patient_id: "pid-1".into(),
            anon_patient_id: "anon-pid-1".into(),
            study_instance_uid: "1.2.3".into(),
            anon_study_instance_uid: "2.25.1".into(),
            series_instance_uid: "1.2.3.4".into(),
            anon_series_instance_uid: "2.25.2".into(),
            sop_instance_uid: "1.2.3.4.5".into(),
            anon_sop_instance_uid: "2.25.3".into(),
            patient_birth_date: None,
            study_description: None,
            frame_of_reference_uid: None,
            anon_frame_of_reference_uid: None,
            level: None,
        }
    }

    #[test]
    fn removed_tag_drops_header_and_value() {
        let key = sample_key();
        let mut stage = AnonymizeStage::new(&key);
        let out1 = stage.step(DicomPart::Header { tag: tags::INSTITUTION_NAME, vr: "LO".into(), length: Some(4) });
        let out2 = stage.step(DicomPart::ValueChunk(b"ACME".to_vec()));
        assert!(out1.is_empty());
        assert!(out2.is_empty());
    }

    #[test]
    fn replace_uid_uses_the_resolved_key_consistently() {
        let key = sample_key();
        let mut stage = AnonymizeStage::new(&key);
        stage.step(DicomPart::Header { tag: tags::STUDY_INSTANCE_UID, vr: "UI".into(), length: Some(10) });
        let first = stage.step(DicomPart::ValueChunk(b"1.2.3".to_vec()));
        stage.step(DicomPart::Header { tag: tags::STUDY_INSTANCE_UID, vr: "UI".into(), length: Some(10) });
        let second = stage.step(DicomPart::ValueChunk(b"1.2.3".to_vec()));
        assert_eq!(first, second);
        assert_eq!(first, vec![DicomPart::ValueChunk(b"2.25.1".to_vec())]);
    }

    #[test]
    fn patient_name_is_replaced_with_synthesized_pseudonym() {
        let key = sample_key();
        let mut stage = AnonymizeStage::new(&key);
        stage.step(DicomPart::Header { tag: tags::PATIENT_NAME, vr: "PN".into(), length: Some(8) });
        let value = stage.step(DicomPart::ValueChunk(b"Doe^Jane".to_vec()));
        assert_eq!(value, vec![DicomPart::ValueChunk(b"Anon40^Morgan".to_vec())]);
    }

    #[test]
    fn birth_date_is_zeroed_not_pseudonymised() {
        let key = sample_key();
        let mut stage = AnonymizeStage::new(&key);
        stage.step(DicomPart::Header { tag: tags::PATIENT_BIRTH_DATE, vr: "DA".into(), length: Some(8) });
        let value = stage.step(DicomPart::ValueChunk(b"19800101".to_vec()));
        assert_eq!(value, vec![DicomPart::ValueChunk(vec![])]);
    }
}
