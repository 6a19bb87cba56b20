use crate::rows::AnonymizationKeyRow;
use crate::{classify_sqlx_error, Db};
use slicebox_core::ids::{AnonymizationKeyId, ImageId};
use slicebox_core::model::AnonymizationKey;
use slicebox_core::time::EpochMillis;
use slicebox_core::Result;

impl Db {
    /// `insertAnonymizationKey(k) -> k` with generated id and `created` stamp.
    pub async fn insert_anonymization_key(&self, key: AnonymizationKey) -> Result<AnonymizationKey> {
        let id = AnonymizationKeyId::new();
        let created = EpochMillis::now();
        sqlx::query(
            "INSERT INTO anonymization_keys
             (id, created, image_id, patient_name, anon_patient_name, patient_id, anon_patient_id,
              study_instance_uid, anon_study_instance_uid, series_instance_uid, anon_series_instance_uid,
              sop_instance_uid, anon_sop_instance_uid, patient_birth_date, study_description,
              frame_of_reference_uid, anon_frame_of_reference_uid)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)",
        )
        .bind(id.uuid())
        .bind(created.0)
        .bind(&key.image_id.0)
        .bind(&key.patient_name)
        .bind(&key.anon_patient_name)
        .bind(&key.patient_id)
        .bind(&key.anon_patient_id)
        .bind(&key.study_instance_uid)
        .bind(&key.anon_study_instance_uid)
        .bind(&key.series_instance_uid)
        .bind(&key.anon_series_instance_uid)
        .bind(&key.sop_instance_uid)
        .bind(&key.anon_sop_instance_uid)
        .bind(&key.patient_birth_date)
        .bind(&key.study_description)
        .bind(&key.frame_of_reference_uid)
        .bind(&key.anon_frame_of_reference_uid)
        .execute(self.pool())
        .await
        .map_err(classify_sqlx_error)?;

        Ok(AnonymizationKey { id, created, ..key })
    }

    pub async fn anonymization_key_for_image(&self, image_id: &ImageId) -> Result<Option<AnonymizationKey>> {
        let row: Option<AnonymizationKeyRow> =
            sqlx::query_as("SELECT * FROM anonymization_keys WHERE image_id = $1")
                .bind(&image_id.0)
                .fetch_optional(self.pool())
                .await
                .map_err(classify_sqlx_error)?;
        Ok(row.map(AnonymizationKeyRow::into_domain))
    }

    /// Image-level match for `lookupForImage`'s cascade (spec.md §4.B).
    pub async fn anonymization_keys_by_anon_sop_instance_uid(&self, uid: &str) -> Result<Vec<AnonymizationKey>> {
        self.query_keys("anon_sop_instance_uid", uid).await
    }

    /// Series-level match for `lookupForImage`'s cascade.
    pub async fn anonymization_keys_by_anon_series_instance_uid(&self, uid: &str) -> Result<Vec<AnonymizationKey>> {
        self.query_keys("anon_series_instance_uid", uid).await
    }

    /// Study-level match for `lookupForImage`'s cascade.
    pub async fn anonymization_keys_by_anon_study_instance_uid(&self, uid: &str) -> Result<Vec<AnonymizationKey>> {
        self.query_keys("anon_study_instance_uid", uid).await
    }

    /// `queryProtectedKeys(patientName, patientID)`: by originals, used on
    /// the send/outgoing path to find an existing key for a not-yet-sent
    /// image before minting a new one (`AnonymizationService::insert_or_reuse`,
    /// `key_for_outgoing_image`).
    pub async fn query_protected_keys(&self, patient_name: &str, patient_id: &str) -> Result<Vec<AnonymizationKey>> {
        let rows: Vec<AnonymizationKeyRow> = sqlx::query_as(
            "SELECT * FROM anonymization_keys WHERE patient_name = $1 AND patient_id = $2",
        )
        .bind(patient_name)
        .bind(patient_id)
        .fetch_all(self.pool())
        .await
        .map_err(classify_sqlx_error)?;
        Ok(rows.into_iter().map(AnonymizationKeyRow::into_domain).collect())
    }

    /// `queryAnonymousKeys(anonPatientName, anonPatientID)`: by pseudonyms,
    /// used on the send/forward path for deduplication (spec.md §4.B).
    pub async fn query_anonymous_keys(
        &self,
        anon_patient_name: &str,
        anon_patient_id: &str,
    ) -> Result<Vec<AnonymizationKey>> {
        let rows: Vec<AnonymizationKeyRow> = sqlx::query_as(
            "SELECT * FROM anonymization_keys WHERE anon_patient_name = $1 AND anon_patient_id = $2",
        )
        .bind(anon_patient_name)
        .bind(anon_patient_id)
        .fetch_all(self.pool())
        .await
        .map_err(classify_sqlx_error)?;
        Ok(rows.into_iter().map(AnonymizationKeyRow::into_domain).collect())
    }

    async fn query_keys(&self, column: &str, value: &str) -> Result<Vec<AnonymizationKey>> {
        // `column` is always one of the fixed literals passed by the methods
        // above, never caller-controlled, so string-built SQL is safe here.
        let sql = format!("SELECT * FROM anonymization_keys WHERE {column} = $1");
        let rows: Vec<AnonymizationKeyRow> = sqlx::query_as(&sql)
            .bind(value)
            .fetch_all(self.pool())
            .await
            .map_err(classify_sqlx_error)?;
        Ok(rows.into_iter().map(AnonymizationKeyRow::into_domain).collect())
    }

    /// `deleteForImageIds([imageId...])` under a purge policy flag (spec.md §4.B).
    pub async fn delete_anonymization_keys_for_image_ids(&self, image_ids: &[ImageId]) -> Result<u64> {
        if image_ids.is_empty() {
            return Ok(0);
        }
        let ids: Vec<&str> = image_ids.iter().map(|i| i.0.as_str()).collect();
        let result = sqlx::query("DELETE FROM anonymization_keys WHERE image_id = ANY($1)")
            .bind(&ids as &[&str])
            .execute(self.pool())
            .await
            .map_err(classify_sqlx_error)?;
        Ok(result.rows_affected())
    }
}
