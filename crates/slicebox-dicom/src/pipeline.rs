//! Pipeline graph (spec.md §4.C): `validate -> parse -> collect(metaTags)
//! -> mapAsync[queryKeys] -> maybeReverseAnonymise -> broadcast { storage-
//! sink ; whitelist-filter(storeTags) -> metadata-sink }`.
//!
//! `parse` itself (bytes -> `DicomPart`) is an external collaborator
//! (spec.md §1 Non-goals); this module starts from an already-tokenised
//! part stream. The discriminator needed by `validate` and the deflate
//! branch is read from the stream's first `MetaPart`, so the whole object
//! is buffered once up front rather than replayed (spec.md §9's "small
//! bounded replay buffer" note, generalised here since Slicebox objects
//! are single bounded images, not unbounded streams).

use crate::anonymize::AnonymizeStage;
use crate::modify::ModifyStage;
use crate::parts::{DicomPart, ValidationContexts, DEFLATED_EXPLICIT_VR_LITTLE_ENDIAN};
use crate::reverse::ReverseAnonymizeStage;
use crate::tags::{self, Tag};
use flate2::write::DeflateEncoder;
use flate2::Compression;
use futures::{Stream, StreamExt};
use slicebox_anon::service::OriginalIdentifiers;
use slicebox_anon::AnonymizationService;
use slicebox_core::model::MetadataAttributes;
use slicebox_core::{Result, SliceboxError};
use std::io::Write;

/// Tags copied into the metadata branch (spec.md §4.C `whitelistFilter(storeTags)`).
const STORE_TAGS: &[Tag] = &[
    tags::PATIENT_NAME,
    tags::PATIENT_ID,
    tags::PATIENT_BIRTH_DATE,
    tags::STUDY_INSTANCE_UID,
    tags::STUDY_DESCRIPTION,
    tags::SERIES_INSTANCE_UID,
    tags::SERIES_DESCRIPTION,
    tags::SOP_INSTANCE_UID,
    tags::SOP_CLASS_UID,
    tags::PATIENT_IDENTITY_REMOVED,
    tags::DEIDENTIFICATION_METHOD,
];

pub struct PipelineOutput {
    pub storage_bytes: Vec<u8>,
    pub metadata: MetadataAttributes,
}

/// Fork one anonymised/reverse-anonymised part sequence into the storage
/// and metadata branches. Both branches read the exact same part sequence
/// so bytes written to storage are byte-identical to what the metadata
/// branch saw (spec.md §4.C).
fn broadcast(parts: &[DicomPart], deflate: bool) -> Result<PipelineOutput> {
    let mut metadata = MetadataAttributes::default();
    let mut pending_tag: Option<Tag> = None;
    let mut raw = Vec::new();

    for part in parts {
        match part {
            DicomPart::Header { tag, .. } => pending_tag = Some(*tag),
            DicomPart::ValueChunk(bytes) => {
                raw.extend_from_slice(bytes);
                if let Some(tag) = pending_tag {
                    if STORE_TAGS.contains(&tag) {
                        if let Ok(text) = std::str::from_utf8(bytes) {
                            metadata.set(tag, text.trim_end_matches('\0').to_string());
                        }
                    }
                }
            }
            _ => pending_tag = None,
        }
    }

    let storage_bytes = if deflate {
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(&raw)
            .map_err(|e| SliceboxError::internal(format!("deflate failed: {e}")))?;
        encoder
            .finish()
            .map_err(|e| SliceboxError::internal(format!("deflate failed: {e}")))?
    } else {
        raw
    };

    Ok(PipelineOutput { storage_bytes, metadata })
}

fn expect_meta(parts: &[DicomPart]) -> Result<(&str, &str)> {
    match parts.first() {
        Some(DicomPart::MetaPart { sop_class_uid, transfer_syntax_uid }) => {
            Ok((sop_class_uid.as_str(), transfer_syntax_uid.as_str()))
        }
        _ => Err(SliceboxError::validation("object did not start with a MetaPart")),
    }
}

fn extract_identifier(parts: &[DicomPart], tag: Tag) -> Option<String> {
    let mut pending = None;
    for part in parts {
        match part {
            DicomPart::Header { tag: t, .. } => pending = Some(*t),
            DicomPart::ValueChunk(bytes) if pending == Some(tag) => {
                return Some(String::from_utf8_lossy(bytes).trim().to_string());
            }
            _ => {}
        }
    }
    None
}

/// Receive-side pipeline: `validate -> collect -> mapAsync[queryKeys] ->
/// maybeReverseAnonymise -> broadcast`. Rejection drains the stream before
/// returning so the client's write never blocks (spec.md §4.C).
pub async fn run_incoming_pipeline(
    parts: impl Stream<Item = DicomPart> + Unpin,
    contexts: &ValidationContexts,
    anon: &AnonymizationService,
) -> Result<PipelineOutput> {
    let buffered: Vec<DicomPart> = parts.collect().await;

    let (sop_class_uid, transfer_syntax_uid) = match expect_meta(&buffered) {
        Ok(pair) => (pair.0.to_string(), pair.1.to_string()),
        Err(e) => return Err(e),
    };
    if !contexts.accepts(&sop_class_uid, &transfer_syntax_uid) {
        return Err(SliceboxError::validation(format!(
            "rejected SOP class/transfer syntax pair ({sop_class_uid}, {transfer_syntax_uid})"
        )));
    }
    let deflate = transfer_syntax_uid == DEFLATED_EXPLICIT_VR_LITTLE_ENDIAN;

    let anon_patient_name = extract_identifier(&buffered, tags::PATIENT_NAME).unwrap_or_default();
    let anon_patient_id = extract_identifier(&buffered, tags::PATIENT_ID).unwrap_or_default();
    let anon_study_uid = extract_identifier(&buffered, tags::STUDY_INSTANCE_UID).unwrap_or_default();
    let anon_series_uid = extract_identifier(&buffered, tags::SERIES_INSTANCE_UID).unwrap_or_default();
    let anon_sop_instance_uid = extract_identifier(&buffered, tags::SOP_INSTANCE_UID).unwrap_or_default();

    let matched_key = anon
        .lookup_for_image(&anon_patient_name, &anon_patient_id, &anon_study_uid, &anon_series_uid, &anon_sop_instance_uid)
        .await?;

    let mut stage = ReverseAnonymizeStage::new();
    let mut out = Vec::with_capacity(buffered.len() + 1);
    if let Some(key) = matched_key {
        out.extend(stage.step(DicomPart::AnonKeyPart { key: Box::new(key) }));
    }
    for part in buffered {
        out.extend(stage.step(part));
    }

    broadcast(&out, deflate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anonymize::AnonymizeStage;
    use crate::reverse::ReverseAnonymizeStage;
    use slicebox_core::ids::{AnonymizationKeyId, ImageId};
    use slicebox_core::model::{AnonymizationKey, AnonymizationKeyLevel};
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
            patient_birth_date: Some("19800101".into()),
            study_description: Some("chest xray".into()),
            frame_of_reference_uid: None,
            anon_frame_of_reference_uid: None,
            // Strongest match level: authorises restoring every tag the
            // reverse flow knows how to restore (patient/study/series).
            level: Some(AnonymizationKeyLevel::Image),
        }
    }

    /// Invariant 4: anonymise then reverse-anonymise with the same key
    /// restores every attribute the reverse flow has authority over
    /// (patient/study/series scoped tags) except `PatientIdentityRemoved`
    /// and `DeidentificationMethod`, which the anonymise stage always
    /// overwrites and the reverse flow resets to their pre-anonymisation
    /// defaults rather than the (nonexistent) original values. SOP-level
    /// UIDs are anonymise-only in this design (`reverse_tag_required_level`
    /// has no entry for them) and stay pseudonymised.
    #[test]
    fn anonymise_then_reverse_anonymise_restores_stored_attributes() {
        let key = sample_key();

        let original = vec![
            DicomPart::MetaPart {
                sop_class_uid: "1.2.840.10008.5.1.4.1.1.7".into(),
                transfer_syntax_uid: "1.2.840.10008.1.2.1".into(),
            },
            DicomPart::Header { tag: tags::PATIENT_NAME, vr: "PN".into(), length: Some(8) },
            DicomPart::ValueChunk(key.patient_name.clone().into_bytes()),
            DicomPart::Header { tag: tags::PATIENT_ID, vr: "LO".into(), length: Some(5) },
            DicomPart::ValueChunk(key.patient_id.clone().into_bytes()),
            DicomPart::Header { tag: tags::STUDY_INSTANCE_UID, vr: "UI".into(), length: Some(5) },
            DicomPart::ValueChunk(key.study_instance_uid.clone().into_bytes()),
            DicomPart::Header { tag: tags::STUDY_DESCRIPTION, vr: "LO".into(), length: Some(10) },
            DicomPart::ValueChunk(key.study_description.clone().unwrap().into_bytes()),
            DicomPart::Header { tag: tags::SERIES_INSTANCE_UID, vr: "UI".into(), length: Some(7) },
            DicomPart::ValueChunk(key.series_instance_uid.clone().into_bytes()),
            DicomPart::Header { tag: tags::SOP_INSTANCE_UID, vr: "UI".into(), length: Some(9) },
            DicomPart::ValueChunk(key.sop_instance_uid.clone().into_bytes()),
        ];

        let mut anonymize = AnonymizeStage::new(&key);
        let mut anonymised = Vec::new();
        for part in original.clone() {
            anonymised.extend(anonymize.step(part));
        }
        anonymised.extend(anonymize.finish());

        let before = broadcast(&original, false).unwrap().metadata;
        assert_eq!(before.get(tags::PATIENT_IDENTITY_REMOVED), None);

        let anonymised_out = broadcast(&anonymised, false).unwrap().metadata;
        assert_eq!(anonymised_out.get(tags::PATIENT_NAME), Some(key.anon_patient_name.as_str()));
        assert_eq!(anonymised_out.get(tags::PATIENT_IDENTITY_REMOVED), Some("YES"));

        let mut reverse = ReverseAnonymizeStage::new();
        let mut restored = Vec::new();
        restored.extend(reverse.step(DicomPart::AnonKeyPart { key: Box::new(key.clone()) }));
        for part in anonymised {
            restored.extend(reverse.step(part));
        }
        let restored = broadcast(&restored, false).unwrap().metadata;

        assert_eq!(restored.get(tags::PATIENT_NAME), Some(key.patient_name.as_str()));
        assert_eq!(restored.get(tags::PATIENT_ID), Some(key.patient_id.as_str()));
        assert_eq!(restored.get(tags::STUDY_INSTANCE_UID), Some(key.study_instance_uid.as_str()));
        assert_eq!(restored.get(tags::STUDY_DESCRIPTION), key.study_description.as_deref());
        assert_eq!(restored.get(tags::SERIES_INSTANCE_UID), Some(key.series_instance_uid.as_str()));
        assert_eq!(restored.get(tags::SOP_INSTANCE_UID), Some(key.anon_sop_instance_uid.as_str()));

        // The forced identity-removal flags are the one pair the reverse
        // flow restores to their un-anonymised defaults, not the original
        // object's actual values (which had no such flags at all).
        assert_eq!(restored.get(tags::PATIENT_IDENTITY_REMOVED), Some("NO"));
    }
}

/// Reads the identifiers `key_for_outgoing_image` needs straight off an
/// outgoing image's own (original, not yet anonymised) part sequence, so
/// the transfer engine never has to know a DICOM tag number itself
/// (spec.md §4.B/§4.E boundary).
pub fn extract_original_identifiers(
    parts: &[DicomPart],
    image_id: slicebox_core::ids::ImageId,
) -> OriginalIdentifiers {
    let sex = extract_identifier(parts, tags::PATIENT_SEX)
        .map(|code| slicebox_anon::pseudonym::Sex::from_dicom_code(&code))
        .unwrap_or(slicebox_anon::pseudonym::Sex::Other);
    let age_bucket = extract_identifier(parts, tags::PATIENT_AGE)
        .and_then(|age| slicebox_anon::pseudonym::AgeBucket::from_dicom_age(&age));

    OriginalIdentifiers {
        image_id,
        patient_name: extract_identifier(parts, tags::PATIENT_NAME).unwrap_or_default(),
        patient_id: extract_identifier(parts, tags::PATIENT_ID).unwrap_or_default(),
        study_instance_uid: extract_identifier(parts, tags::STUDY_INSTANCE_UID).unwrap_or_default(),
        series_instance_uid: extract_identifier(parts, tags::SERIES_INSTANCE_UID).unwrap_or_default(),
        sop_instance_uid: extract_identifier(parts, tags::SOP_INSTANCE_UID).unwrap_or_default(),
        patient_birth_date: extract_identifier(parts, tags::PATIENT_BIRTH_DATE),
        study_description: extract_identifier(parts, tags::STUDY_DESCRIPTION),
        frame_of_reference_uid: extract_identifier(parts, tags::FRAME_OF_REFERENCE_UID),
        sex,
        age_bucket,
    }
}

/// Send-side pipeline: resolves/mints the image's `AnonymizationKey`, then
/// runs the anonymise flow, then broadcasts (spec.md §4.E "run the
/// anonymised DICOM pipeline against its bytes").
pub async fn run_outgoing_pipeline(
    parts: impl Stream<Item = DicomPart> + Unpin,
    original: OriginalIdentifiers,
    modify_overrides: Vec<crate::modify::ModifyOverride>,
    anon: &AnonymizationService,
) -> Result<PipelineOutput> {
    let buffered: Vec<DicomPart> = parts.collect().await;
    let (_, transfer_syntax_uid) = expect_meta(&buffered).unwrap_or(("", ""));
    let deflate = transfer_syntax_uid == DEFLATED_EXPLICIT_VR_LITTLE_ENDIAN;

    let key = anon.key_for_outgoing_image(original).await?;

    let mut anonymize = AnonymizeStage::new(&key);
    let mut modify = ModifyStage::new(modify_overrides);
    let mut out = Vec::with_capacity(buffered.len() + 4);
    for part in buffered {
        for part in anonymize.step(part) {
            out.extend(modify.step(part));
        }
    }
    out.extend(anonymize.finish());
    out.extend(modify.finish());

    broadcast(&out, deflate)
}
