//! `sqlx::FromRow` row shapes and their conversions to/from the domain
//! model in `slicebox_core::model`. Kept separate from the query modules so
//! the column-to-enum mapping lives in one place.

use slicebox_core::ids::{
    AnonymizationKeyId, BoxId, IncomingImageId, IncomingTransactionId, OutgoingImageId,
    OutgoingTagValueId, OutgoingTransactionId,
};
use slicebox_core::ids::ImageId;
use slicebox_core::model::{
    AnonymizationKey, Box, IncomingImage, IncomingTransaction, OutgoingImage, OutgoingTagValue,
    OutgoingTransaction, SendMethod, TransactionStatus,
};
use slicebox_core::time::EpochMillis;
use slicebox_core::SliceboxError;

pub(crate) fn send_method_to_sql(m: SendMethod) -> &'static str {
    match m {
        SendMethod::Push => "PUSH",
        SendMethod::Poll => "POLL",
    }
}

pub(crate) fn send_method_from_sql(s: &str) -> Result<SendMethod, SliceboxError> {
    match s {
        "PUSH" => Ok(SendMethod::Push),
        "POLL" => Ok(SendMethod::Poll),
        other => Err(SliceboxError::internal(format!("unknown send_method {other}"))),
    }
}

pub(crate) fn status_to_sql(s: TransactionStatus) -> &'static str {
    match s {
        TransactionStatus::Waiting => "WAITING",
        TransactionStatus::Processing => "PROCESSING",
        TransactionStatus::Failed => "FAILED",
        TransactionStatus::Finished => "FINISHED",
    }
}

pub(crate) fn status_from_sql(s: &str) -> Result<TransactionStatus, SliceboxError> {
    match s {
        "WAITING" => Ok(TransactionStatus::Waiting),
        "PROCESSING" => Ok(TransactionStatus::Processing),
        "FAILED" => Ok(TransactionStatus::Failed),
        "FINISHED" => Ok(TransactionStatus::Finished),
        other => Err(SliceboxError::internal(format!("unknown status {other}"))),
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct BoxRow {
    pub id: uuid::Uuid,
    pub name: String,
    pub token: String,
    pub base_url: String,
    pub send_method: String,
    pub online: bool,
    #[allow(dead_code)]
    pub last_seen_ms: i64,
}

impl BoxRow {
    pub(crate) fn into_domain(self) -> Result<Box, SliceboxError> {
        Ok(Box {
            id: BoxId::from_uuid(self.id),
            name: self.name,
            token: self.token,
            base_url: self.base_url,
            send_method: send_method_from_sql(&self.send_method)?,
            online: self.online,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct OutgoingTransactionRow {
    pub id: uuid::Uuid,
    pub box_id: uuid::Uuid,
    pub box_name: String,
    pub sent_image_count: i32,
    pub total_image_count: i32,
    pub created: i64,
    pub updated: i64,
    pub status: String,
}

impl OutgoingTransactionRow {
    pub(crate) fn into_domain(self) -> Result<OutgoingTransaction, SliceboxError> {
        Ok(OutgoingTransaction {
            id: OutgoingTransactionId::from_uuid(self.id),
            box_id: BoxId::from_uuid(self.box_id),
            box_name: self.box_name,
            sent_image_count: self.sent_image_count,
            total_image_count: self.total_image_count,
            created: EpochMillis(self.created),
            updated: EpochMillis(self.updated),
            status: status_from_sql(&self.status)?,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct OutgoingImageRow {
    pub id: uuid::Uuid,
    pub outgoing_transaction_id: uuid::Uuid,
    pub image_id: String,
    pub sequence_number: i32,
    pub sent: bool,
}

impl OutgoingImageRow {
    pub(crate) fn into_domain(self) -> OutgoingImage {
        OutgoingImage {
            id: OutgoingImageId::from_uuid(self.id),
            outgoing_transaction_id: OutgoingTransactionId::from_uuid(self.outgoing_transaction_id),
            image_id: ImageId(self.image_id),
            sequence_number: self.sequence_number,
            sent: self.sent,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct OutgoingTagValueRow {
    pub id: uuid::Uuid,
    pub outgoing_image_id: uuid::Uuid,
    pub tag: i32,
    pub value: String,
}

impl OutgoingTagValueRow {
    pub(crate) fn into_domain(self) -> OutgoingTagValue {
        OutgoingTagValue {
            id: OutgoingTagValueId::from_uuid(self.id),
            outgoing_image_id: OutgoingImageId::from_uuid(self.outgoing_image_id),
            tag: self.tag as u32,
            value: self.value,
        }
    }
}

/// Flattened join row for `next_outgoing_transaction_image_for_box_id`:
/// sqlx has no built-in way to decode a join into two separate `FromRow`
/// structs, so the query aliases the image's `id` to avoid a column clash
/// and this type splits itself into `(OutgoingTransaction, OutgoingImage)`.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct NextOutgoingRow {
    pub id: uuid::Uuid,
    pub box_id: uuid::Uuid,
    pub box_name: String,
    pub sent_image_count: i32,
    pub total_image_count: i32,
    pub created: i64,
    pub updated: i64,
    pub status: String,
    pub image_row_id: uuid::Uuid,
    pub outgoing_transaction_id: uuid::Uuid,
    pub image_id: String,
    pub sequence_number: i32,
    pub sent: bool,
}

impl NextOutgoingRow {
    pub(crate) fn into_domain(self) -> Result<(OutgoingTransaction, OutgoingImage), SliceboxError> {
        let transaction = OutgoingTransactionRow {
            id: self.id,
            box_id: self.box_id,
            box_name: self.box_name,
            sent_image_count: self.sent_image_count,
            total_image_count: self.total_image_count,
            created: self.created,
            updated: self.updated,
            status: self.status,
        }
        .into_domain()?;
        let image = OutgoingImageRow {
            id: self.image_row_id,
            outgoing_transaction_id: self.outgoing_transaction_id,
            image_id: self.image_id,
            sequence_number: self.sequence_number,
            sent: self.sent,
        }
        .into_domain();
        Ok((transaction, image))
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct IncomingTransactionRow {
    pub id: uuid::Uuid,
    pub box_id: uuid::Uuid,
    pub outgoing_transaction_id: uuid::Uuid,
    pub received_image_count: i32,
    pub added_image_count: i32,
    pub total_image_count: i32,
    pub created: i64,
    pub updated: i64,
    pub status: String,
}

impl IncomingTransactionRow {
    pub(crate) fn into_domain(self) -> Result<IncomingTransaction, SliceboxError> {
        Ok(IncomingTransaction {
            id: IncomingTransactionId::from_uuid(self.id),
            box_id: BoxId::from_uuid(self.box_id),
            outgoing_transaction_id: OutgoingTransactionId::from_uuid(self.outgoing_transaction_id),
            received_image_count: self.received_image_count,
            added_image_count: self.added_image_count,
            total_image_count: self.total_image_count,
            created: EpochMillis(self.created),
            updated: EpochMillis(self.updated),
            status: status_from_sql(&self.status)?,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct IncomingImageRow {
    pub id: uuid::Uuid,
    pub incoming_transaction_id: uuid::Uuid,
    pub sequence_number: i32,
    pub image_id: String,
    pub overwrite: bool,
}

impl IncomingImageRow {
    pub(crate) fn into_domain(self) -> IncomingImage {
        IncomingImage {
            id: IncomingImageId::from_uuid(self.id),
            incoming_transaction_id: IncomingTransactionId::from_uuid(self.incoming_transaction_id),
            sequence_number: self.sequence_number,
            image_id: ImageId(self.image_id),
            overwrite: self.overwrite,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct AnonymizationKeyRow {
    pub id: uuid::Uuid,
    pub created: i64,
    pub image_id: String,
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
}

impl AnonymizationKeyRow {
    pub(crate) fn into_domain(self) -> AnonymizationKey {
        AnonymizationKey {
            id: AnonymizationKeyId::from_uuid(self.id),
            created: EpochMillis(self.created),
            image_id: ImageId(self.image_id),
            patient_name: self.patient_name,
            anon_patient_name: self.anon_patient_name,
            patient_id: self.patient_id,
            anon_patient_id: self.anon_patient_id,
            study_instance_uid: self.study_instance_uid,
            anon_study_instance_uid: self.anon_study_instance_uid,
            series_instance_uid: self.series_instance_uid,
            anon_series_instance_uid: self.anon_series_instance_uid,
            sop_instance_uid: self.sop_instance_uid,
            anon_sop_instance_uid: self.anon_sop_instance_uid,
            patient_birth_date: self.patient_birth_date,
            study_description: self.study_description,
            frame_of_reference_uid: self.frame_of_reference_uid,
            anon_frame_of_reference_uid: self.anon_frame_of_reference_uid,
            level: None,
        }
    }
}
