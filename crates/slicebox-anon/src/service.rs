//! Anonymisation key service (spec.md §4.B): the dedup-on-insert rule and
//! the four-step hierarchical lookup used by the reverse-anonymise flow.

use crate::pseudonym;
use slicebox_core::ids::ImageId;
use slicebox_core::model::{AnonymizationKey, AnonymizationKeyLevel};
use slicebox_core::Result;
use slicebox_db::Db;

/// Original identifiers read off an outgoing image's headers, used to
/// resolve or mint its `AnonymizationKey` before the anonymise flow runs.
#[derive(Debug, Clone)]
pub struct OriginalIdentifiers {
    pub image_id: ImageId,
    pub patient_name: String,
    pub patient_id: String,
    pub study_instance_uid: String,
    pub series_instance_uid: String,
    pub sop_instance_uid: String,
    pub patient_birth_date: Option<String>,
    pub study_description: Option<String>,
    pub frame_of_reference_uid: Option<String>,
    pub sex: pseudonym::Sex,
    pub age_bucket: Option<pseudonym::AgeBucket>,
}

#[derive(Debug, Clone)]
pub struct AnonymizationService {
    db: Db,
}

impl AnonymizationService {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// `insertAnonymizationKey(k) -> k`, but first looks up existing keys
    /// matching `k`'s original identifiers; if one also matches on the
    /// pseudonym fields under `AnonymizationKey::matches_for_dedup`, that
    /// key is reused rather than inserting a duplicate (spec.md §4.B).
    pub async fn insert_or_reuse(&self, key: AnonymizationKey) -> Result<AnonymizationKey> {
        let candidates = self.db.query_protected_keys(&key.patient_name, &key.patient_id).await?;
        if let Some(existing) = candidates.into_iter().find(|c| c.matches_for_dedup(&key)) {
            return Ok(existing);
        }
        self.db.insert_anonymization_key(key).await
    }

    /// `lookupForImage(anonPatientName, anonPatientID, anonStudyUID,
    /// anonSeriesUID, anonSOPInstanceUID) -> Option<AnonymizationKey>`:
    /// cascades image -> series -> study -> patient, tagging the result
    /// with the level it matched at so callers know which fields are
    /// authoritative for the reverse-anonymise flow.
    pub async fn lookup_for_image(
        &self,
        anon_patient_name: &str,
        anon_patient_id: &str,
        anon_study_uid: &str,
        anon_series_uid: &str,
        anon_sop_instance_uid: &str,
    ) -> Result<Option<AnonymizationKey>> {
        if let Some(key) = self
            .db
            .anonymization_keys_by_anon_sop_instance_uid(anon_sop_instance_uid)
            .await?
            .into_iter()
            .next()
        {
            return Ok(Some(with_level(key, AnonymizationKeyLevel::Image)));
        }

        if let Some(key) = self
            .db
            .anonymization_keys_by_anon_series_instance_uid(anon_series_uid)
            .await?
            .into_iter()
            .next()
        {
            return Ok(Some(with_level(key, AnonymizationKeyLevel::Series)));
        }

        if let Some(key) = self
            .db
            .anonymization_keys_by_anon_study_instance_uid(anon_study_uid)
            .await?
            .into_iter()
            .next()
        {
            return Ok(Some(with_level(key, AnonymizationKeyLevel::Study)));
        }

        if let Some(key) = self
            .db
            .query_anonymous_keys(anon_patient_name, anon_patient_id)
            .await?
            .into_iter()
            .next()
        {
            return Ok(Some(with_level(key, AnonymizationKeyLevel::Patient)));
        }

        Ok(None)
    }

    /// Resolve the `AnonymizationKey` for an outgoing image: reuse it if
    /// this exact image was anonymised before (replay), else reuse the
    /// patient/study/series pseudonym components from a sibling image in
    /// the same series, minting only a fresh image-level UID; else mint a
    /// whole new key (spec.md §4.B dedup + pseudonym-generation rules).
    pub async fn key_for_outgoing_image(&self, original: OriginalIdentifiers) -> Result<AnonymizationKey> {
        if let Some(existing) = self.db.anonymization_key_for_image(&original.image_id).await? {
            return Ok(existing);
        }

        let siblings = self
            .db
            .query_protected_keys(&original.patient_name, &original.patient_id)
            .await?;
        let sibling = siblings.into_iter().find(|k| {
            k.study_instance_uid == original.study_instance_uid
                && k.series_instance_uid == original.series_instance_uid
        });

        let (anon_patient_name, anon_patient_id, anon_study_instance_uid, anon_series_instance_uid, anon_frame_of_reference_uid) =
            match &sibling {
                Some(k) => (
                    k.anon_patient_name.clone(),
                    k.anon_patient_id.clone(),
                    k.anon_study_instance_uid.clone(),
                    k.anon_series_instance_uid.clone(),
                    k.anon_frame_of_reference_uid.clone(),
                ),
                None => {
                    let name = pseudonym::synthesize_patient_name(
                        original.sex,
                        original.age_bucket.unwrap_or(pseudonym::AgeBucket(0)),
                    );
                    let anon_frame = original.frame_of_reference_uid.as_ref().map(|_| pseudonym::generate_uid());
                    (name, pseudonym::generate_uid(), pseudonym::generate_uid(), pseudonym::generate_uid(), anon_frame)
                }
            };

        // `patient_birth_date`/`study_description`/`frame_of_reference_uid`
        // hold the ORIGINAL values, kept only so the reverse-anonymise flow
        // can restore them; the anonymised stream itself gets the zeroed/
        // empty value directly from the anonymise flow's tag action table.
        let candidate = AnonymizationKey {
            id: slicebox_core::ids::AnonymizationKeyId::new(),
            created: slicebox_core::time::EpochMillis::now(),
            image_id: original.image_id,
            patient_name: original.patient_name,
            anon_patient_name,
            patient_id: original.patient_id,
            anon_patient_id,
            study_instance_uid: original.study_instance_uid,
            anon_study_instance_uid,
            series_instance_uid: original.series_instance_uid,
            anon_series_instance_uid,
            sop_instance_uid: original.sop_instance_uid,
            anon_sop_instance_uid: pseudonym::generate_uid(),
            patient_birth_date: original.patient_birth_date,
            study_description: original.study_description,
            frame_of_reference_uid: original.frame_of_reference_uid,
            anon_frame_of_reference_uid,
            level: None,
        };

        self.db.insert_anonymization_key(candidate).await
    }

    pub async fn query_protected_keys(&self, patient_name: &str, patient_id: &str) -> Result<Vec<AnonymizationKey>> {
        self.db.query_protected_keys(patient_name, patient_id).await
    }

    pub async fn query_anonymous_keys(&self, anon_patient_name: &str, anon_patient_id: &str) -> Result<Vec<AnonymizationKey>> {
        self.db.query_anonymous_keys(anon_patient_name, anon_patient_id).await
    }

    /// `deleteForImageIds([imageId...])` under a purge policy flag; callers
    /// gate this on their own retention policy before calling.
    pub async fn delete_for_image_ids(&self, image_ids: &[ImageId]) -> Result<u64> {
        self.db.delete_anonymization_keys_for_image_ids(image_ids).await
    }
}

fn with_level(mut key: AnonymizationKey, level: AnonymizationKeyLevel) -> AnonymizationKey {
    key.level = Some(level);
    key
}
