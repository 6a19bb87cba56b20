//! DICOM tag constants and the per-tag action tables for the anonymise and
//! reverse-anonymise flows (spec.md §4.C).

/// A DICOM data element tag as `(group << 16) | element`.
pub type Tag = u32;

pub const PATIENT_NAME: Tag = 0x0010_0010;
pub const PATIENT_ID: Tag = 0x0010_0020;
pub const PATIENT_BIRTH_DATE: Tag = 0x0010_0030;
pub const PATIENT_SEX: Tag = 0x0010_0040;
pub const PATIENT_AGE: Tag = 0x0010_1010;
pub const STUDY_INSTANCE_UID: Tag = 0x0020_000D;
pub const STUDY_DESCRIPTION: Tag = 0x0008_1030;
pub const STUDY_ID: Tag = 0x0020_0010;
pub const ACCESSION_NUMBER: Tag = 0x0008_0050;
pub const SERIES_INSTANCE_UID: Tag = 0x0020_000E;
pub const SERIES_DESCRIPTION: Tag = 0x0008_103E;
pub const PROTOCOL_NAME: Tag = 0x0018_1030;
pub const SOP_INSTANCE_UID: Tag = 0x0008_0018;
pub const SOP_CLASS_UID: Tag = 0x0008_0016;
pub const FRAME_OF_REFERENCE_UID: Tag = 0x0020_0052;
pub const PATIENT_IDENTITY_REMOVED: Tag = 0x0012_0062;
pub const DEIDENTIFICATION_METHOD: Tag = 0x0012_0063;
pub const INSTITUTION_NAME: Tag = 0x0008_0080;
pub const REFERRING_PHYSICIAN_NAME: Tag = 0x0008_0090;
pub const PERFORMING_PHYSICIAN_NAME: Tag = 0x0008_1050;

/// Per-tag disposition during anonymisation. DUMMY/CLEAN/REMOVE_OR_ZERO from
/// the standard profile collapse onto `Zero`, the stricter choice (spec.md
/// §9 Open Questions — pinned behaviour, not the full PS3.15 profile).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagAction {
    /// Drop the element entirely.
    Remove,
    /// Keep the header, empty the value.
    Zero,
    /// Swap in the pseudonym UID the anonymisation key service resolved
    /// for this (study/series/image), so the value is stable across all
    /// elements referencing the same original UID.
    ReplaceUid,
    /// Swap in the key's synthesized `PatientName`/`PatientID`.
    ReplacePatientIdentity,
    /// Pass the value through unchanged.
    Keep,
}

pub fn anonymize_action(tag: Tag) -> TagAction {
    match tag {
        PATIENT_NAME | PATIENT_ID => TagAction::ReplacePatientIdentity,
        PATIENT_BIRTH_DATE => TagAction::Zero,
        STUDY_INSTANCE_UID | SERIES_INSTANCE_UID | SOP_INSTANCE_UID | FRAME_OF_REFERENCE_UID => {
            TagAction::ReplaceUid
        }
        STUDY_DESCRIPTION | STUDY_ID | ACCESSION_NUMBER | SERIES_DESCRIPTION | PROTOCOL_NAME => {
            TagAction::Zero
        }
        INSTITUTION_NAME | REFERRING_PHYSICIAN_NAME | PERFORMING_PHYSICIAN_NAME => TagAction::Remove,
        PATIENT_SEX | PATIENT_AGE | SOP_CLASS_UID => TagAction::Keep,
        _ => TagAction::Keep,
    }
}

/// The minimum `AnonymizationKeyLevel` (spec.md §3/§4.B) that authorises
/// restoring a tag's original value during reverse-anonymisation. Patient
/// is weakest (0), Image is strongest (3); a key matched at a given level
/// authorises itself and every weaker level.
pub fn reverse_tag_required_level(tag: Tag) -> Option<slicebox_core::model::AnonymizationKeyLevel> {
    use slicebox_core::model::AnonymizationKeyLevel::*;
    match tag {
        PATIENT_NAME | PATIENT_ID | PATIENT_BIRTH_DATE => Some(Patient),
        STUDY_INSTANCE_UID | STUDY_DESCRIPTION | STUDY_ID | ACCESSION_NUMBER => Some(Study),
        SERIES_INSTANCE_UID | SERIES_DESCRIPTION | PROTOCOL_NAME | FRAME_OF_REFERENCE_UID => Some(Series),
        _ => None,
    }
}

pub fn level_ordinal(level: slicebox_core::model::AnonymizationKeyLevel) -> u8 {
    use slicebox_core::model::AnonymizationKeyLevel::*;
    match level {
        Patient => 0,
        Study => 1,
        Series => 2,
        Image => 3,
    }
}

/// Description embedded in `DeidentificationMethod` on anonymise.
pub const DEIDENTIFICATION_METHOD_DESCRIPTION: &str = "Slicebox pseudonymisation profile v1";

#[cfg(test)]
mod tests {
    use super::*;
    use slicebox_core::model::AnonymizationKeyLevel;

    #[test]
    fn identifying_tags_replace_uid_name_or_zero() {
        assert_eq!(anonymize_action(PATIENT_NAME), TagAction::ReplacePatientIdentity);
        assert_eq!(anonymize_action(PATIENT_BIRTH_DATE), TagAction::Zero);
        assert_eq!(anonymize_action(STUDY_INSTANCE_UID), TagAction::ReplaceUid);
        assert_eq!(anonymize_action(INSTITUTION_NAME), TagAction::Remove);
    }

    #[test]
    fn series_level_key_authorises_study_and_series_tags_not_patient_only_fields() {
        let series = level_ordinal(AnonymizationKeyLevel::Series);
        let study_required = level_ordinal(reverse_tag_required_level(STUDY_INSTANCE_UID).unwrap());
        let series_required = level_ordinal(reverse_tag_required_level(SERIES_INSTANCE_UID).unwrap());
        assert!(series >= study_required);
        assert!(series >= series_required);
    }
}
