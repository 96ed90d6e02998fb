//! Session state reads and writes.

use anyhow::Result;
use sqlx::Row;

use super::db::{unix_timestamp, StateDb};
use crate::control::ContextId;

/// Persisted session flags and counters (the single `session` row).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionRow {
    pub is_detecting: bool,
    pub active_context_id: Option<ContextId>,
    pub is_downloading: bool,
    pub downloaded_count: i64,
    pub total_files: i64,
    pub download_queue: Vec<String>,
}

impl StateDb {
    /// Load the persisted session row.
    pub async fn load_session(&self) -> Result<SessionRow> {
        let row = sqlx::query(
            r#"
            SELECT is_detecting, active_context_id, is_downloading,
                   downloaded_count, total_files, download_queue
            FROM session
            WHERE id = 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(SessionRow::default());
        };

        let is_detecting: i64 = row.get("is_detecting");
        let active_context_id: Option<i64> = row.get("active_context_id");
        let is_downloading: i64 = row.get("is_downloading");
        let downloaded_count: i64 = row.get("downloaded_count");
        let total_files: i64 = row.get("total_files");
        let download_queue: String = row.get("download_queue");

        Ok(SessionRow {
            is_detecting: is_detecting != 0,
            active_context_id,
            is_downloading: is_downloading != 0,
            downloaded_count,
            total_files,
            download_queue: serde_json::from_str(&download_queue).unwrap_or_default(),
        })
    }

    /// Mirror the whole session row.
    pub async fn save_session(&self, session: &SessionRow) -> Result<()> {
        let now = unix_timestamp();
        let queue_json = serde_json::to_string(&session.download_queue)?;
        sqlx::query(
            r#"
            UPDATE session
            SET is_detecting = ?1,
                active_context_id = ?2,
                is_downloading = ?3,
                downloaded_count = ?4,
                total_files = ?5,
                download_queue = ?6,
                updated_at = ?7
            WHERE id = 1
            "#,
        )
        .bind(session.is_detecting as i64)
        .bind(session.active_context_id)
        .bind(session.is_downloading as i64)
        .bind(session.downloaded_count)
        .bind(session.total_files)
        .bind(queue_json)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Mirror only the progress counters and the queue snapshot. Called on
    /// every settlement, so it touches nothing else.
    pub async fn save_progress(
        &self,
        downloaded_count: i64,
        total_files: i64,
        queue: &[String],
    ) -> Result<()> {
        let now = unix_timestamp();
        let queue_json = serde_json::to_string(queue)?;
        sqlx::query(
            r#"
            UPDATE session
            SET downloaded_count = ?1,
                total_files = ?2,
                download_queue = ?3,
                updated_at = ?4
            WHERE id = 1
            "#,
        )
        .bind(downloaded_count)
        .bind(total_files)
        .bind(queue_json)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Reset stale flags and counters after a restart. In-flight transfers
    /// from a previous process are gone, so detection/download state cannot
    /// be resumed; recorded context URLs are kept.
    pub async fn recover_session(&self) -> Result<()> {
        let now = unix_timestamp();
        sqlx::query(
            r#"
            UPDATE session
            SET is_detecting = 0,
                is_downloading = 0,
                downloaded_count = 0,
                total_files = 0,
                download_queue = '[]',
                updated_at = ?1
            WHERE id = 1
            "#,
        )
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Append one URL to a context's recorded list.
    pub async fn append_context_url(&self, context_id: ContextId, url: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO context_urls (context_id, position, url)
            VALUES (
                ?1,
                (SELECT COALESCE(MAX(position) + 1, 0) FROM context_urls WHERE context_id = ?1),
                ?2
            )
            "#,
        )
        .bind(context_id)
        .bind(url)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Drop the recorded URL list of one context.
    pub async fn clear_context_urls(&self, context_id: ContextId) -> Result<()> {
        sqlx::query(r#"DELETE FROM context_urls WHERE context_id = ?1"#)
            .bind(context_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Drop every recorded URL list.
    pub async fn clear_all_context_urls(&self) -> Result<()> {
        sqlx::query(r#"DELETE FROM context_urls"#)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Load all recorded URL lists, each in insertion order.
    pub async fn load_context_urls(&self) -> Result<Vec<(ContextId, Vec<String>)>> {
        let rows = sqlx::query(
            r#"
            SELECT context_id, url
            FROM context_urls
            ORDER BY context_id ASC, position ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut out: Vec<(ContextId, Vec<String>)> = Vec::new();
        for row in rows {
            let context_id: i64 = row.get("context_id");
            let url: String = row.get("url");
            match out.last_mut() {
                Some((id, urls)) if *id == context_id => urls.push(url),
                _ => out.push((context_id, vec![url])),
            }
        }
        Ok(out)
    }
}
