use crate::rows::{status_to_sql, IncomingTransactionRow};
use crate::{classify_sqlx_error, Db};
use slicebox_core::ids::{BoxId, ImageId, IncomingTransactionId, OutgoingTransactionId};
use slicebox_core::model::{IncomingTransaction, TransactionStatus};
use slicebox_core::time::EpochMillis;
use slicebox_core::Result;

/// Outcome of `update_incoming`, handed back to the incoming transfer
/// engine (§4.F) so it knows whether to call `move()` against a path that
/// already held a prior image for this sequence number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateIncomingResult {
    pub transaction: IncomingTransaction,
    pub was_existing_image: bool,
}

impl Db {
    /// `updateIncoming(box, outgoingTransactionId, seq, total, imageId, overwrite)`:
    /// upsert an `IncomingTransaction` keyed by `(boxId, outgoingTransactionId)`,
    /// bump `receivedImageCount = min(total, prev+1)`, bump `addedImageCount`
    /// only for genuinely new images, then upsert the `IncomingImage` keyed
    /// by `(txId, seq)`. Entire action is transactional (spec.md §4.A).
    ///
    /// Whether the image is new is decided by looking up
    /// `(incoming_transaction_id, sequence_number)` inside the same
    /// transaction, not by trusting a caller-supplied `overwrite` flag —
    /// that is what makes a replayed `POST /incoming` idempotent
    /// (invariant 5, spec.md §8).
    pub async fn update_incoming(
        &self,
        box_id: BoxId,
        outgoing_transaction_id: OutgoingTransactionId,
        sequence_number: i32,
        total_image_count: i32,
        image_id: &ImageId,
    ) -> Result<UpdateIncomingResult> {
        let mut tx = self.pool().begin().await.map_err(classify_sqlx_error)?;
        let now = EpochMillis::now();

        let existing: Option<IncomingTransactionRow> = sqlx::query_as(
            "SELECT * FROM incoming_transactions WHERE box_id = $1 AND outgoing_transaction_id = $2",
        )
        .bind(box_id.uuid())
        .bind(outgoing_transaction_id.uuid())
        .fetch_optional(&mut *tx)
        .await
        .map_err(classify_sqlx_error)?;

        let incoming_transaction_id = match existing {
            Some(ref row) => IncomingTransactionId::from_uuid(row.id),
            None => IncomingTransactionId::new(),
        };

        let existing_image_row: Option<(String,)> = sqlx::query_as(
            "SELECT image_id FROM incoming_images WHERE incoming_transaction_id = $1 AND sequence_number = $2",
        )
        .bind(incoming_transaction_id.uuid())
        .bind(sequence_number)
        .fetch_optional(&mut *tx)
        .await
        .map_err(classify_sqlx_error)?;
        let was_existing_image = existing_image_row.is_some();

        let (prev_received, prev_added, prev_created) = existing
            .as_ref()
            .map(|r| (r.received_image_count, r.added_image_count, r.created))
            .unwrap_or((0, 0, now.0));

        let received_image_count = if was_existing_image {
            prev_received
        } else {
            (prev_received + 1).min(total_image_count)
        };
        let added_image_count = if was_existing_image {
            prev_added
        } else {
            (prev_added + 1).min(received_image_count)
        };
        let status = if received_image_count >= total_image_count {
            TransactionStatus::Finished
        } else {
            TransactionStatus::Processing
        };

        if existing.is_some() {
            sqlx::query(
                "UPDATE incoming_transactions
                 SET received_image_count = $2, added_image_count = $3,
                     total_image_count = $4, status = $5, updated = $6
                 WHERE id = $1",
            )
            .bind(incoming_transaction_id.uuid())
            .bind(received_image_count)
            .bind(added_image_count)
            .bind(total_image_count)
            .bind(status_to_sql(status))
            .bind(now.0)
            .execute(&mut *tx)
            .await
            .map_err(classify_sqlx_error)?;
        } else {
            sqlx::query(
                "INSERT INTO incoming_transactions
                 (id, box_id, outgoing_transaction_id, received_image_count, added_image_count,
                  total_image_count, created, updated, status)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $7, $8)",
            )
            .bind(incoming_transaction_id.uuid())
            .bind(box_id.uuid())
            .bind(outgoing_transaction_id.uuid())
            .bind(received_image_count)
            .bind(added_image_count)
            .bind(total_image_count)
            .bind(now.0)
            .bind(status_to_sql(status))
            .execute(&mut *tx)
            .await
            .map_err(classify_sqlx_error)?;
        }

        if was_existing_image {
            sqlx::query(
                "UPDATE incoming_images SET image_id = $3, overwrite = TRUE
                 WHERE incoming_transaction_id = $1 AND sequence_number = $2",
            )
            .bind(incoming_transaction_id.uuid())
            .bind(sequence_number)
            .bind(&image_id.0)
            .execute(&mut *tx)
            .await
            .map_err(classify_sqlx_error)?;
        } else {
            let id = slicebox_core::ids::IncomingImageId::new();
            sqlx::query(
                "INSERT INTO incoming_images (id, incoming_transaction_id, sequence_number, image_id, overwrite)
                 VALUES ($1, $2, $3, $4, FALSE)",
            )
            .bind(id.uuid())
            .bind(incoming_transaction_id.uuid())
            .bind(sequence_number)
            .bind(&image_id.0)
            .execute(&mut *tx)
            .await
            .map_err(classify_sqlx_error)?;
        }

        tx.commit().await.map_err(classify_sqlx_error)?;

        Ok(UpdateIncomingResult {
            transaction: IncomingTransaction {
                id: incoming_transaction_id,
                box_id,
                outgoing_transaction_id,
                received_image_count,
                added_image_count,
                total_image_count,
                created: EpochMillis(prev_created),
                updated: now,
                status,
            },
            was_existing_image,
        })
    }

    pub async fn incoming_transaction_by_box_and_outgoing_id(
        &self,
        box_id: BoxId,
        outgoing_transaction_id: OutgoingTransactionId,
    ) -> Result<Option<IncomingTransaction>> {
        let row: Option<IncomingTransactionRow> = sqlx::query_as(
            "SELECT * FROM incoming_transactions WHERE box_id = $1 AND outgoing_transaction_id = $2",
        )
        .bind(box_id.uuid())
        .bind(outgoing_transaction_id.uuid())
        .fetch_optional(self.pool())
        .await
        .map_err(classify_sqlx_error)?;
        row.map(IncomingTransactionRow::into_domain).transpose()
    }

    pub async fn incoming_transactions_in_status_older_than(
        &self,
        status: TransactionStatus,
        updated_before_ms: i64,
    ) -> Result<Vec<IncomingTransactionId>> {
        let rows: Vec<(uuid::Uuid,)> = sqlx::query_as(
            "SELECT id FROM incoming_transactions WHERE status = $1 AND updated < $2",
        )
        .bind(status_to_sql(status))
        .bind(updated_before_ms)
        .fetch_all(self.pool())
        .await
        .map_err(classify_sqlx_error)?;
        Ok(rows.into_iter().map(|(id,)| IncomingTransactionId::from_uuid(id)).collect())
    }

    pub async fn set_incoming_transaction_status(
        &self,
        id: IncomingTransactionId,
        status: TransactionStatus,
    ) -> Result<()> {
        let now = EpochMillis::now();
        sqlx::query("UPDATE incoming_transactions SET status = $2, updated = $3 WHERE id = $1")
            .bind(id.uuid())
            .bind(status_to_sql(status))
            .bind(now.0)
            .execute(self.pool())
            .await
            .map_err(classify_sqlx_error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Db;
    use slicebox_core::model::SendMethod;

    #[sqlx::test(migrations = "./migrations")]
    async fn counts_stay_within_bounds_as_images_arrive(pool: sqlx::PgPool) {
        let db = Db::from_pool(pool);
        let b = db.insert_box("box-c", "tok-c", "http://c", SendMethod::Push).await.unwrap();
        let outgoing_tx = OutgoingTransactionId::new();

        let first = db
            .update_incoming(b.id, outgoing_tx, 1, 2, &ImageId("img-1".into()))
            .await
            .unwrap();
        assert_eq!(first.transaction.received_image_count, 1);
        assert_eq!(first.transaction.added_image_count, 1);
        assert!(!first.was_existing_image);
        assert!(first.transaction.received_image_count <= first.transaction.total_image_count);
        assert!(first.transaction.added_image_count <= first.transaction.received_image_count);

        let second = db
            .update_incoming(b.id, outgoing_tx, 2, 2, &ImageId("img-2".into()))
            .await
            .unwrap();
        assert_eq!(second.transaction.received_image_count, 2);
        assert_eq!(second.transaction.added_image_count, 2);
        assert_eq!(second.transaction.status, TransactionStatus::Finished);
    }

    /// Invariant 5: replaying `(boxId, outgoingTransactionId, seq)` any
    /// number of times yields the same final counts as one delivery.
    #[sqlx::test(migrations = "./migrations")]
    async fn replayed_sequence_number_is_idempotent(pool: sqlx::PgPool) {
        let db = Db::from_pool(pool);
        let b = db.insert_box("box-d", "tok-d", "http://d", SendMethod::Push).await.unwrap();
        let outgoing_tx = OutgoingTransactionId::new();

        let once = db
            .update_incoming(b.id, outgoing_tx, 1, 2, &ImageId("img-1".into()))
            .await
            .unwrap();
        assert!(!once.was_existing_image);
        assert_eq!(once.transaction.received_image_count, 1);
        assert_eq!(once.transaction.added_image_count, 1);

        let replayed = db
            .update_incoming(b.id, outgoing_tx, 1, 2, &ImageId("img-1".into()))
            .await
            .unwrap();
        assert!(replayed.was_existing_image);
        assert_eq!(replayed.transaction.received_image_count, 1);
        assert_eq!(replayed.transaction.added_image_count, 1);

        let stored = db.incoming_transaction_by_box_and_outgoing_id(b.id, outgoing_tx).await.unwrap().unwrap();
        assert_eq!(stored.received_image_count, 1);
        assert_eq!(stored.added_image_count, 1);
    }
}
