use crate::rows::{send_method_to_sql, BoxRow};
use crate::{classify_sqlx_error, Db};
use slicebox_core::ids::BoxId;
use slicebox_core::model::{Box, SendMethod};
use slicebox_core::{Result, SliceboxError};

impl Db {
    /// `insertBox(Box) -> Box` with generated id; fails on duplicate name
    /// (unique index `idx_unique_box_name`).
    pub async fn insert_box(
        &self,
        name: &str,
        token: &str,
        base_url: &str,
        send_method: SendMethod,
    ) -> Result<Box> {
        let id = BoxId::new();
        sqlx::query(
            "INSERT INTO boxes (id, name, token, base_url, send_method, online, last_seen_ms)
             VALUES ($1, $2, $3, $4, $5, FALSE, 0)",
        )
        .bind(id.uuid())
        .bind(name)
        .bind(token)
        .bind(base_url)
        .bind(send_method_to_sql(send_method))
        .execute(self.pool())
        .await
        .map_err(classify_sqlx_error)?;

        Ok(Box {
            id,
            name: name.to_string(),
            token: token.to_string(),
            base_url: base_url.to_string(),
            send_method,
            online: false,
        })
    }

    pub async fn box_by_id(&self, id: BoxId) -> Result<Option<Box>> {
        let row: Option<BoxRow> = sqlx::query_as("SELECT * FROM boxes WHERE id = $1")
            .bind(id.uuid())
            .fetch_optional(self.pool())
            .await
            .map_err(classify_sqlx_error)?;
        row.map(BoxRow::into_domain).transpose()
    }

    pub async fn box_by_name(&self, name: &str) -> Result<Option<Box>> {
        let row: Option<BoxRow> = sqlx::query_as("SELECT * FROM boxes WHERE name = $1")
            .bind(name)
            .fetch_optional(self.pool())
            .await
            .map_err(classify_sqlx_error)?;
        row.map(BoxRow::into_domain).transpose()
    }

    /// `pollBoxByToken(token) -> Option<Box>` filtered to POLL method, used
    /// to authenticate `GET /outgoing/poll` requests.
    pub async fn poll_box_by_token(&self, token: &str) -> Result<Option<Box>> {
        let row: Option<BoxRow> =
            sqlx::query_as("SELECT * FROM boxes WHERE token = $1 AND send_method = 'POLL'")
                .bind(token)
                .fetch_optional(self.pool())
                .await
                .map_err(classify_sqlx_error)?;
        row.map(BoxRow::into_domain).transpose()
    }

    /// Any box (PUSH or POLL) by token — used to authenticate `POST /incoming`.
    pub async fn box_by_token(&self, token: &str) -> Result<Option<Box>> {
        let row: Option<BoxRow> = sqlx::query_as("SELECT * FROM boxes WHERE token = $1")
            .bind(token)
            .fetch_optional(self.pool())
            .await
            .map_err(classify_sqlx_error)?;
        row.map(BoxRow::into_domain).transpose()
    }

    pub async fn list_boxes(&self) -> Result<Vec<Box>> {
        let rows: Vec<BoxRow> = sqlx::query_as("SELECT * FROM boxes ORDER BY name")
            .fetch_all(self.pool())
            .await
            .map_err(classify_sqlx_error)?;
        rows.into_iter().map(BoxRow::into_domain).collect()
    }

    /// Deletes a box; cascades its outgoing transactions/images/tag values
    /// via `ON DELETE CASCADE` (spec.md §3 ownership summary).
    pub async fn remove_box(&self, id: BoxId) -> Result<()> {
        let result = sqlx::query("DELETE FROM boxes WHERE id = $1")
            .bind(id.uuid())
            .execute(self.pool())
            .await
            .map_err(classify_sqlx_error)?;
        if result.rows_affected() == 0 {
            return Err(SliceboxError::not_found(format!("no such box {id}")));
        }
        Ok(())
    }

    /// Used by the outgoing worker after every push attempt (spec.md §4.E:
    /// "The box online flag is updated on every attempt").
    pub async fn set_box_online(&self, id: BoxId, online: bool) -> Result<()> {
        sqlx::query("UPDATE boxes SET online = $2 WHERE id = $1")
            .bind(id.uuid())
            .bind(online)
            .execute(self.pool())
            .await
            .map_err(classify_sqlx_error)?;
        Ok(())
    }

    pub async fn touch_poll(&self, id: BoxId, now_ms: i64) -> Result<()> {
        sqlx::query("UPDATE boxes SET online = TRUE, last_seen_ms = $2 WHERE id = $1")
            .bind(id.uuid())
            .bind(now_ms)
            .execute(self.pool())
            .await
            .map_err(classify_sqlx_error)?;
        Ok(())
    }
}
