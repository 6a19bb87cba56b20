use crate::rows::{status_to_sql, NextOutgoingRow, OutgoingTagValueRow, OutgoingTransactionRow};
use crate::{classify_sqlx_error, Db};
use slicebox_core::ids::{BoxId, ImageId, OutgoingImageId, OutgoingTransactionId};
use slicebox_core::model::{OutgoingImage, OutgoingTagValue, OutgoingTransaction, TransactionStatus};
use slicebox_core::time::EpochMillis;
use slicebox_core::{Result, SliceboxError};

impl Db {
    pub async fn insert_outgoing_transaction(
        &self,
        box_id: BoxId,
        box_name: &str,
        total_image_count: i32,
    ) -> Result<OutgoingTransaction> {
        let id = OutgoingTransactionId::new();
        let now = EpochMillis::now();
        sqlx::query(
            "INSERT INTO outgoing_transactions
             (id, box_id, box_name, sent_image_count, total_image_count, created, updated, status)
             VALUES ($1, $2, $3, 0, $4, $5, $5, 'WAITING')",
        )
        .bind(id.uuid())
        .bind(box_id.uuid())
        .bind(box_name)
        .bind(total_image_count)
        .bind(now.0)
        .execute(self.pool())
        .await
        .map_err(classify_sqlx_error)?;

        Ok(OutgoingTransaction {
            id,
            box_id,
            box_name: box_name.to_string(),
            sent_image_count: 0,
            total_image_count,
            created: now,
            updated: now,
            status: TransactionStatus::Waiting,
        })
    }

    pub async fn insert_outgoing_image(
        &self,
        outgoing_transaction_id: OutgoingTransactionId,
        image_id: &ImageId,
        sequence_number: i32,
    ) -> Result<OutgoingImage> {
        let id = OutgoingImageId::new();
        sqlx::query(
            "INSERT INTO outgoing_images (id, outgoing_transaction_id, image_id, sequence_number, sent)
             VALUES ($1, $2, $3, $4, FALSE)",
        )
        .bind(id.uuid())
        .bind(outgoing_transaction_id.uuid())
        .bind(&image_id.0)
        .bind(sequence_number)
        .execute(self.pool())
        .await
        .map_err(classify_sqlx_error)?;

        Ok(OutgoingImage {
            id,
            outgoing_transaction_id,
            image_id: image_id.clone(),
            sequence_number,
            sent: false,
        })
    }

    pub async fn insert_outgoing_tag_value(
        &self,
        outgoing_image_id: slicebox_core::ids::OutgoingImageId,
        tag: u32,
        value: &str,
    ) -> Result<()> {
        let id = slicebox_core::ids::OutgoingTagValueId::new();
        sqlx::query(
            "INSERT INTO outgoing_tag_values (id, outgoing_image_id, tag, value) VALUES ($1, $2, $3, $4)",
        )
        .bind(id.uuid())
        .bind(outgoing_image_id.uuid())
        .bind(tag as i32)
        .bind(value)
        .execute(self.pool())
        .await
        .map_err(classify_sqlx_error)?;
        Ok(())
    }

    pub async fn tag_values_for_image(&self, outgoing_image_id: OutgoingImageId) -> Result<Vec<OutgoingTagValue>> {
        let rows: Vec<OutgoingTagValueRow> =
            sqlx::query_as("SELECT * FROM outgoing_tag_values WHERE outgoing_image_id = $1")
                .bind(outgoing_image_id.uuid())
                .fetch_all(self.pool())
                .await
                .map_err(classify_sqlx_error)?;
        Ok(rows.into_iter().map(OutgoingTagValueRow::into_domain).collect())
    }

    pub async fn outgoing_transaction_by_id(
        &self,
        id: OutgoingTransactionId,
    ) -> Result<Option<OutgoingTransaction>> {
        let row: Option<OutgoingTransactionRow> =
            sqlx::query_as("SELECT * FROM outgoing_transactions WHERE id = $1")
                .bind(id.uuid())
                .fetch_optional(self.pool())
                .await
                .map_err(classify_sqlx_error)?;
        row.map(OutgoingTransactionRow::into_domain).transpose()
    }

    /// `nextOutgoingTransactionImageForBoxId(boxId) -> Option<(transaction, image)>`:
    /// the oldest not-yet-sent image for that box, excluding FAILED/FINISHED
    /// transactions, ordered by `(transaction.created ASC, image.sequenceNumber ASC)`
    /// (spec.md §4.A).
    pub async fn next_outgoing_transaction_image_for_box_id(
        &self,
        box_id: BoxId,
    ) -> Result<Option<(OutgoingTransaction, OutgoingImage)>> {
        let row: Option<NextOutgoingRow> = sqlx::query_as(
            "SELECT
                t.id, t.box_id, t.box_name,
                t.sent_image_count, t.total_image_count,
                t.created, t.updated, t.status,
                i.id AS image_row_id, i.outgoing_transaction_id,
                i.image_id, i.sequence_number, i.sent
             FROM outgoing_transactions t
             JOIN outgoing_images i ON i.outgoing_transaction_id = t.id
             WHERE t.box_id = $1 AND i.sent = FALSE
               AND t.status NOT IN ('FAILED', 'FINISHED')
             ORDER BY t.created ASC, i.sequence_number ASC
             LIMIT 1",
        )
        .bind(box_id.uuid())
        .fetch_optional(self.pool())
        .await
        .map_err(classify_sqlx_error)?;

        row.map(NextOutgoingRow::into_domain).transpose()
    }

    /// `updateOutgoingTransaction(tx, image)`: within a single transaction,
    /// marks the image sent and bumps the transaction's `sentImageCount`,
    /// flipping status to FINISHED iff the count now equals the total
    /// (spec.md §4.A — "a crash must not leave all images sent, status != FINISHED").
    pub async fn update_outgoing_transaction(
        &self,
        transaction_id: OutgoingTransactionId,
        image_id: OutgoingImageId,
    ) -> Result<OutgoingTransaction> {
        let mut tx = self
            .pool()
            .begin()
            .await
            .map_err(classify_sqlx_error)?;

        let marked = sqlx::query("UPDATE outgoing_images SET sent = TRUE WHERE id = $1 AND sent = FALSE")
            .bind(image_id.uuid())
            .execute(&mut *tx)
            .await
            .map_err(classify_sqlx_error)?;

        if marked.rows_affected() == 0 {
            // Already sent: a retried ack or a retried PUSH 2xx after a
            // dropped response. No-op rather than double-counting.
            let row: OutgoingTransactionRow = sqlx::query_as("SELECT * FROM outgoing_transactions WHERE id = $1")
                .bind(transaction_id.uuid())
                .fetch_one(&mut *tx)
                .await
                .map_err(classify_sqlx_error)?;
            tx.commit().await.map_err(classify_sqlx_error)?;
            return row.into_domain();
        }

        let now = EpochMillis::now();
        let row: OutgoingTransactionRow = sqlx::query_as(
            "UPDATE outgoing_transactions
             SET sent_image_count = sent_image_count + 1, updated = $2
             WHERE id = $1
             RETURNING *",
        )
        .bind(transaction_id.uuid())
        .bind(now.0)
        .fetch_one(&mut *tx)
        .await
        .map_err(classify_sqlx_error)?;

        let mut updated = row.into_domain()?;
        if updated.sent_image_count >= updated.total_image_count {
            sqlx::query("UPDATE outgoing_transactions SET status = 'FINISHED' WHERE id = $1")
                .bind(transaction_id.uuid())
                .execute(&mut *tx)
                .await
                .map_err(classify_sqlx_error)?;
            updated.status = TransactionStatus::Finished;
        } else if updated.status == TransactionStatus::Waiting {
            sqlx::query("UPDATE outgoing_transactions SET status = 'PROCESSING' WHERE id = $1")
                .bind(transaction_id.uuid())
                .execute(&mut *tx)
                .await
                .map_err(classify_sqlx_error)?;
            updated.status = TransactionStatus::Processing;
        }

        tx.commit().await.map_err(classify_sqlx_error)?;
        Ok(updated)
    }

    /// Demote PROCESSING -> WAITING after a network error (spec.md §4.E),
    /// or move a transaction to FAILED on a permanent 4xx/validation error.
    pub async fn set_outgoing_transaction_status(
        &self,
        id: OutgoingTransactionId,
        status: TransactionStatus,
    ) -> Result<()> {
        if status == TransactionStatus::Finished {
            return Err(SliceboxError::internal(
                "FINISHED must be set via update_outgoing_transaction to preserve invariant 1",
            ));
        }
        let now = EpochMillis::now();
        sqlx::query("UPDATE outgoing_transactions SET status = $2, updated = $3 WHERE id = $1")
            .bind(id.uuid())
            .bind(status_to_sql(status))
            .bind(now.0)
            .execute(self.pool())
            .await
            .map_err(classify_sqlx_error)?;
        Ok(())
    }

    pub async fn outgoing_transactions_in_status_older_than(
        &self,
        status: TransactionStatus,
        updated_before_ms: i64,
    ) -> Result<Vec<OutgoingTransactionId>> {
        let rows: Vec<(uuid::Uuid,)> = sqlx::query_as(
            "SELECT id FROM outgoing_transactions WHERE status = $1 AND updated < $2",
        )
        .bind(status_to_sql(status))
        .bind(updated_before_ms)
        .fetch_all(self.pool())
        .await
        .map_err(classify_sqlx_error)?;
        Ok(rows.into_iter().map(|(id,)| OutgoingTransactionId::from_uuid(id)).collect())
    }

    pub async fn outgoing_images_by_transaction_id(
        &self,
        transaction_id: OutgoingTransactionId,
    ) -> Result<Vec<OutgoingImage>> {
        let rows: Vec<crate::rows::OutgoingImageRow> = sqlx::query_as(
            "SELECT * FROM outgoing_images WHERE outgoing_transaction_id = $1 ORDER BY sequence_number",
        )
        .bind(transaction_id.uuid())
        .fetch_all(self.pool())
        .await
        .map_err(classify_sqlx_error)?;
        Ok(rows.into_iter().map(crate::rows::OutgoingImageRow::into_domain).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slicebox_core::model::SendMethod;

    #[sqlx::test(migrations = "./migrations")]
    async fn duplicate_ack_does_not_double_count(pool: sqlx::PgPool) {
        let db = Db::from_pool(pool);
        let b = db.insert_box("box-a", "tok-a", "http://a", SendMethod::Push).await.unwrap();
        let tx = db.insert_outgoing_transaction(b.id, &b.name, 2).await.unwrap();
        let img = db.insert_outgoing_image(tx.id, &ImageId("img-1".into()), 1).await.unwrap();

        let first = db.update_outgoing_transaction(tx.id, img.id).await.unwrap();
        assert_eq!(first.sent_image_count, 1);
        assert_eq!(first.status, TransactionStatus::Processing);

        // Replayed ack for the same image: sentImageCount must not move.
        let second = db.update_outgoing_transaction(tx.id, img.id).await.unwrap();
        assert_eq!(second.sent_image_count, 1);
        assert_eq!(second.status, TransactionStatus::Processing);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn status_is_finished_iff_sent_equals_total(pool: sqlx::PgPool) {
        let db = Db::from_pool(pool);
        let b = db.insert_box("box-b", "tok-b", "http://b", SendMethod::Push).await.unwrap();
        let tx = db.insert_outgoing_transaction(b.id, &b.name, 2).await.unwrap();
        let img1 = db.insert_outgoing_image(tx.id, &ImageId("img-1".into()), 1).await.unwrap();
        let img2 = db.insert_outgoing_image(tx.id, &ImageId("img-2".into()), 2).await.unwrap();

        let after_first = db.update_outgoing_transaction(tx.id, img1.id).await.unwrap();
        assert_ne!(after_first.sent_image_count, after_first.total_image_count);
        assert_ne!(after_first.status, TransactionStatus::Finished);

        let after_second = db.update_outgoing_transaction(tx.id, img2.id).await.unwrap();
        assert_eq!(after_second.sent_image_count, after_second.total_image_count);
        assert_eq!(after_second.status, TransactionStatus::Finished);

        // Replaying the last ack again must not regress the status or count.
        let replayed = db.update_outgoing_transaction(tx.id, img2.id).await.unwrap();
        assert_eq!(replayed.sent_image_count, 2);
        assert_eq!(replayed.status, TransactionStatus::Finished);
    }

    /// Invariant 3: at most one `OutgoingImages` row per `(txId, seq)`,
    /// enforced by `idx_unique_outgoing_image`.
    #[sqlx::test(migrations = "./migrations")]
    async fn duplicate_sequence_number_is_rejected(pool: sqlx::PgPool) {
        let db = Db::from_pool(pool);
        let b = db.insert_box("box-g", "tok-g", "http://g", SendMethod::Push).await.unwrap();
        let tx = db.insert_outgoing_transaction(b.id, &b.name, 2).await.unwrap();

        db.insert_outgoing_image(tx.id, &ImageId("img-1".into()), 1).await.unwrap();
        let result = db.insert_outgoing_image(tx.id, &ImageId("img-2".into()), 1).await;
        assert!(result.is_err());
    }
}
