use crate::{classify_sqlx_error, Db};
use slicebox_core::time::EpochMillis;
use slicebox_core::Result;

impl Db {
    /// `updateStatusForBoxesAndTransactions(now, timeoutMs)`:
    /// (a) sets `online = (now - last_seen) < timeout` for every POLL box;
    /// (b) demotes every PROCESSING transaction (incoming and outgoing)
    /// whose `updated` is older than the timeout back to WAITING
    /// (spec.md §4.A, driven periodically by the supervisor, §4.G).
    pub async fn update_status_for_boxes_and_transactions(
        &self,
        now: EpochMillis,
        poll_timeout_ms: i64,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE boxes SET online = ((($1::bigint) - last_seen_ms) < $2)
             WHERE send_method = 'POLL'",
        )
        .bind(now.0)
        .bind(poll_timeout_ms)
        .execute(self.pool())
        .await
        .map_err(classify_sqlx_error)?;

        let stalled_before = now.0 - poll_timeout_ms;

        sqlx::query(
            "UPDATE outgoing_transactions SET status = 'WAITING'
             WHERE status = 'PROCESSING' AND updated < $1",
        )
        .bind(stalled_before)
        .execute(self.pool())
        .await
        .map_err(classify_sqlx_error)?;

        sqlx::query(
            "UPDATE incoming_transactions SET status = 'WAITING'
             WHERE status = 'PROCESSING' AND updated < $1",
        )
        .bind(stalled_before)
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
    use slicebox_core::ids::ImageId;
    use slicebox_core::model::{SendMethod, TransactionStatus};

    /// S6: a stalled PROCESSING transaction is demoted to WAITING once
    /// `updated` is older than the timeout, and a fresh one is left alone.
    #[sqlx::test(migrations = "./migrations")]
    async fn stalled_processing_transaction_is_demoted_to_waiting(pool: sqlx::PgPool) {
        let db = Db::from_pool(pool);
        let b = db.insert_box("box-e", "tok-e", "http://e", SendMethod::Push).await.unwrap();

        let stalled = db.insert_outgoing_transaction(b.id, &b.name, 2).await.unwrap();
        let img = db.insert_outgoing_image(stalled.id, &ImageId("img-1".into()), 1).await.unwrap();
        db.update_outgoing_transaction(stalled.id, img.id).await.unwrap();

        let fresh = db.insert_outgoing_transaction(b.id, &b.name, 2).await.unwrap();

        let timeout_ms = 1_000;
        let far_future = EpochMillis(fresh.updated.0 + timeout_ms * 3);
        db.update_status_for_boxes_and_transactions(far_future, timeout_ms).await.unwrap();

        let stalled_after = db.outgoing_transaction_by_id(stalled.id).await.unwrap().unwrap();
        assert_eq!(stalled_after.status, TransactionStatus::Waiting);

        let fresh_after = db.outgoing_transaction_by_id(fresh.id).await.unwrap().unwrap();
        assert_eq!(fresh_after.status, TransactionStatus::Waiting);
    }

    /// No transaction transitions backward out of FINISHED or FAILED.
    #[sqlx::test(migrations = "./migrations")]
    async fn finished_and_failed_transactions_are_never_reverted(pool: sqlx::PgPool) {
        let db = Db::from_pool(pool);
        let b = db.insert_box("box-f", "tok-f", "http://f", SendMethod::Push).await.unwrap();

        let finished = db.insert_outgoing_transaction(b.id, &b.name, 1).await.unwrap();
        let img = db.insert_outgoing_image(finished.id, &ImageId("img-1".into()), 1).await.unwrap();
        let finished = db.update_outgoing_transaction(finished.id, img.id).await.unwrap();
        assert_eq!(finished.status, TransactionStatus::Finished);

        let failed = db.insert_outgoing_transaction(b.id, &b.name, 1).await.unwrap();
        db.set_outgoing_transaction_status(failed.id, TransactionStatus::Failed).await.unwrap();

        let timeout_ms = 1_000;
        let far_future = EpochMillis(finished.updated.0 + timeout_ms * 3);
        db.update_status_for_boxes_and_transactions(far_future, timeout_ms).await.unwrap();

        let finished_after = db.outgoing_transaction_by_id(finished.id).await.unwrap().unwrap();
        assert_eq!(finished_after.status, TransactionStatus::Finished);

        let failed_after = db.outgoing_transaction_by_id(failed.id).await.unwrap().unwrap();
        assert_eq!(failed_after.status, TransactionStatus::Failed);
    }
}
