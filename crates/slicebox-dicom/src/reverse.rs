//! Reverse-anonymise flow (spec.md §4.C): restores original values for the
//! tags a matched `AnonymizationKey` has authority over. Inert until an
//! `AnonKeyPart` appears in the stream (spec.md S4: no key, no-op).

use crate::parts::DicomPart;
use crate::tags::{self, Tag};
use slicebox_core::model::AnonymizationKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pending {
    Restore(Tag),
    PassThrough,
}

#[derive(Debug, Default)]
pub struct ReverseAnonymizeStage {
    key: Option<AnonymizationKey>,
    pending: Option<Pending>,
}

impl ReverseAnonymizeStage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step(&mut self, part: DicomPart) -> Vec<DicomPart> {
        match part {
            DicomPart::AnonKeyPart { key } => {
                self.key = Some(*key);
                vec![]
            }
            DicomPart::Header { tag, vr, length } => {
                self.pending = Some(self.classify(tag));
                vec![DicomPart::Header { tag, vr, length }]
            }
            DicomPart::ValueChunk(bytes) => match self.pending {
                Some(Pending::Restore(tag)) => match self.original_value(tag) {
                    Some(original) => vec![DicomPart::ValueChunk(original.into_bytes())],
                    None => vec![DicomPart::ValueChunk(bytes)],
                },
                _ => vec![DicomPart::ValueChunk(bytes)],
            },
            other => {
                self.pending = None;
                vec![other]
            }
        }
    }

    fn classify(&self, tag: Tag) -> Pending {
        let Some(ref key) = self.key else {
            return Pending::PassThrough;
        };
        if tag == tags::PATIENT_IDENTITY_REMOVED || tag == tags::DEIDENTIFICATION_METHOD {
            return Pending::Restore(tag);
        }
        match (tags::reverse_tag_required_level(tag), key.level) {
            (Some(required), Some(matched)) if tags::level_ordinal(matched) >= tags::level_ordinal(required) => {
                Pending::Restore(tag)
            }
            _ => Pending::PassThrough,
        }
    }

    fn original_value(&self, tag: Tag) -> Option<String> {
        let key = self.key.as_ref()?;
        match tag {
            tags::PATIENT_IDENTITY_REMOVED => Some("NO".to_string()),
            tags::DEIDENTIFICATION_METHOD => Some(String::new()),
            tags::PATIENT_NAME => Some(key.patient_name.clone()),
            tags::PATIENT_ID => Some(key.patient_id.clone()),
            tags::PATIENT_BIRTH_DATE => key.patient_birth_date.clone(),
            tags::STUDY_INSTANCE_UID => Some(key.study_instance_uid.clone()),
            tags::STUDY_DESCRIPTION => key.study_description.clone(),
            tags::SERIES_INSTANCE_UID => Some(key.series_instance_uid.clone()),
            tags::FRAME_OF_REFERENCE_UID => key.frame_of_reference_uid.clone(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slicebox_core::ids::{AnonymizationKeyId, ImageId};
    use slicebox_core::model::AnonymizationKeyLevel;
    use slicebox_core::time::EpochMillis;

    fn key_at(level: AnonymizationKeyLevel) -> AnonymizationKey {
        AnonymizationKey {
            id: AnonymizationKeyId::new(),
            created: EpochMillis(0),
            image_id: ImageId("img".into()),
            patient_name: "Doe^Jane".into(),
            anon_patient_name: "Anon40^Morgan".into(),
            patient_id: "pid-1".into(),
            anon_patient_id: "anon-1".into(),
            study_instance_uid: "1.2.3".into(),
            anon_study_instance_uid: "2.25.1".into(),
            series_instance_uid: "1.2.3.4".into(),
            anon_series_instance_uid: "2.25.2".into(),
            sop_instance_uid: "1.2.3.4.5".into(),
            anon_sop_instance_uid: "2.25.3".into(),
            patient_birth_date: Some("19800101".into()),
            study_description: None,
            frame_of_reference_uid: None,
            level: Some(level),
        }
    }

    #[test]
    fn no_key_is_a_no_op() {
        let mut stage = ReverseAnonymizeStage::new();
        stage.step(DicomPart::Header { tag: tags::PATIENT_NAME, vr: "PN".into(), length: Some(8) });
        let out = stage.step(DicomPart::ValueChunk(b"Anon40^Morgan".to_vec()));
        assert_eq!(out, vec![DicomPart::ValueChunk(b"Anon40^Morgan".to_vec())]);
    }

    #[test]
    fn patient_level_key_restores_patient_name_not_series() {
        let mut stage = ReverseAnonymizeStage::new();
        stage.step(DicomPart::AnonKeyPart { key: Box::new(key_at(AnonymizationKeyLevel::Patient)) });

        stage.step(DicomPart::Header { tag: tags::PATIENT_NAME, vr: "PN".into(), length: Some(8) });
        let name = stage.step(DicomPart::ValueChunk(b"Anon40^Morgan".to_vec()));
        assert_eq!(name, vec![DicomPart::ValueChunk(b"Doe^Jane".to_vec())]);

        stage.step(DicomPart::Header { tag: tags::SERIES_INSTANCE_UID, vr: "UI".into(), length: Some(10) });
        let series = stage.step(DicomPart::ValueChunk(b"2.25.2".to_vec()));
        assert_eq!(series, vec![DicomPart::ValueChunk(b"2.25.2".to_vec())]);
    }

    #[test]
    fn image_level_key_forces_identity_flags() {
        let mut stage = ReverseAnonymizeStage::new();
        stage.step(DicomPart::AnonKeyPart { key: Box::new(key_at(AnonymizationKeyLevel::Image)) });
        stage.step(DicomPart::Header { tag: tags::PATIENT_IDENTITY_REMOVED, vr: "CS".into(), length: Some(2) });
        let removed = stage.step(DicomPart::ValueChunk(b"YES".to_vec()));
        assert_eq!(removed, vec![DicomPart::ValueChunk(b"NO".to_vec())]);
    }
}
