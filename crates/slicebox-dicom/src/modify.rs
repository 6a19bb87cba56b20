//! Modify flow (spec.md §4.C): applies caller-supplied `(tag, newValue,
//! insertIfMissing)` overrides, the same mechanism the outgoing transfer
//! engine uses to apply `OutgoingTagValue` rows while streaming.

use crate::parts::DicomPart;
use crate::tags::Tag;

#[derive(Debug, Clone)]
pub struct ModifyOverride {
    pub tag: Tag,
    pub new_value: String,
    pub insert_if_missing: bool,
}

#[derive(Debug, Default)]
pub struct ModifyStage {
    overrides: Vec<ModifyOverride>,
    seen: Vec<Tag>,
    pending: Option<Tag>,
}

impl ModifyStage {
    pub fn new(overrides: Vec<ModifyOverride>) -> Self {
        Self { overrides, seen: Vec::new(), pending: None }
    }

    pub fn step(&mut self, part: DicomPart) -> Vec<DicomPart> {
        match part {
            DicomPart::Header { tag, vr, length } => {
                self.pending = Some(tag);
                if self.override_for(tag).is_some() {
                    self.seen.push(tag);
                }
                vec![DicomPart::Header { tag, vr, length }]
            }
            DicomPart::ValueChunk(bytes) => match self.pending.and_then(|tag| self.override_for(tag)) {
                Some(ov) => vec![DicomPart::ValueChunk(ov.new_value.clone().into_bytes())],
                None => vec![DicomPart::ValueChunk(bytes)],
            },
            other => {
                self.pending = None;
                vec![other]
            }
        }
    }

    fn override_for(&self, tag: Tag) -> Option<&ModifyOverride> {
        self.overrides.iter().find(|ov| ov.tag == tag)
    }

    /// Elements with `insert_if_missing = true` that never appeared in the
    /// source stream, appended once the source is exhausted.
    pub fn finish(&self) -> Vec<DicomPart> {
        self.overrides
            .iter()
            .filter(|ov| ov.insert_if_missing && !self.seen.contains(&ov.tag))
            .flat_map(|ov| {
                vec![
                    DicomPart::Header { tag: ov.tag, vr: "LO".to_string(), length: None },
                    DicomPart::ValueChunk(ov.new_value.clone().into_bytes()),
                ]
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tags::STUDY_DESCRIPTION;

    #[test]
    fn override_replaces_existing_value() {
        let mut stage = ModifyStage::new(vec![ModifyOverride {
            tag: STUDY_DESCRIPTION,
            new_value: "Routine follow-up".into(),
            insert_if_missing: false,
        }]);
        stage.step(DicomPart::Header { tag: STUDY_DESCRIPTION, vr: "LO".into(), length: Some(4) });
        let out = stage.step(DicomPart::ValueChunk(b"old".to_vec()));
        assert_eq!(out, vec![DicomPart::ValueChunk(b"Routine follow-up".to_vec())]);
        assert!(stage.finish().is_empty());
    }

    #[test]
    fn missing_tag_is_appended_when_insert_if_missing() {
        let stage = ModifyStage::new(vec![ModifyOverride {
            tag: STUDY_DESCRIPTION,
            new_value: "Inserted".into(),
            insert_if_missing: true,
        }]);
        let appended = stage.finish();
        assert_eq!(appended.len(), 2);
    }
}
