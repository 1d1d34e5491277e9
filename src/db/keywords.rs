use chrono::{DateTime, Utc};
use tracing::info;

use crate::db::models::KeywordRow;
use crate::db::to_ts;
use crate::error::{AppError, Result};
use crate::types::{Keyword, KeywordOrigin, KeywordStatus, Scale};

const KEYWORD_COLUMNS: &str = "keyword, origin, status, scale, added_at, last_searched_at";

/// Catalog of tracked keywords. Keys are normalized keyword strings; callers
/// normalize before reaching the registry.
#[derive(Clone)]
pub struct KeywordRegistry {
    pool: sqlx::SqlitePool,
}

impl KeywordRegistry {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert-or-ignore seed keywords as `active`. Returns how many were new.
    pub async fn load_seeds(&self, seeds: &[String], now: DateTime<Utc>) -> Result<usize> {
        let mut inserted = 0usize;
        for keyword in seeds {
            if keyword.is_empty() {
                continue;
            }
            let result = sqlx::query(
                r#"
                INSERT OR IGNORE INTO keywords (keyword, origin, status, added_at)
                VALUES (?, ?, ?, ?)
                "#,
            )
            .bind(keyword)
            .bind(KeywordOrigin::Seed.as_str())
            .bind(KeywordStatus::Active.as_str())
            .bind(to_ts(now))
            .execute(&self.pool)
            .await?;
            inserted += result.rows_affected() as usize;
        }
        Ok(inserted)
    }

    /// Register a user search. Existing keywords get `last_searched_at` bumped
    /// and, if inactive, are reactivated; new ones are inserted as active
    /// `user_search`. Returns the keyword and whether it still needs a scale.
    pub async fn ensure_tracked(&self, keyword: &str, now: DateTime<Utc>) -> Result<(Keyword, bool)> {
        let ts = to_ts(now);
        let result = sqlx::query(
            r#"
            UPDATE keywords
            SET last_searched_at = ?,
                status = CASE WHEN status = 'inactive' THEN 'active' ELSE status END
            WHERE keyword = ?
            "#,
        )
        .bind(ts)
        .bind(keyword)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            sqlx::query(
                r#"
                INSERT OR IGNORE INTO keywords (keyword, origin, status, added_at, last_searched_at)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(keyword)
            .bind(KeywordOrigin::UserSearch.as_str())
            .bind(KeywordStatus::Active.as_str())
            .bind(ts)
            .bind(ts)
            .execute(&self.pool)
            .await?;
            info!(keyword, "Tracking new user-searched keyword");
        }

        let tracked = self
            .get(keyword)
            .await?
            .ok_or_else(|| AppError::NotFound(keyword.to_string()))?;
        let needs_scale = tracked.scale.is_none();
        Ok((tracked, needs_scale))
    }

    /// Insert a discovered candidate as `pending_review`. False if it already existed.
    pub async fn insert_discovered(&self, keyword: &str, now: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO keywords (keyword, origin, status, added_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(keyword)
        .bind(KeywordOrigin::AutoDiscovered.as_str())
        .bind(KeywordStatus::PendingReview.as_str())
        .bind(to_ts(now))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn get(&self, keyword: &str) -> Result<Option<Keyword>> {
        let row: Option<KeywordRow> = sqlx::query_as(&format!(
            "SELECT {KEYWORD_COLUMNS} FROM keywords WHERE keyword = ?"
        ))
        .bind(keyword)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Keyword::from))
    }

    /// Every keyword except inactive ones, newest first.
    pub async fn list_tracked(&self) -> Result<Vec<Keyword>> {
        let rows: Vec<KeywordRow> = sqlx::query_as(&format!(
            "SELECT {KEYWORD_COLUMNS} FROM keywords WHERE status != 'inactive' ORDER BY added_at DESC, id DESC"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Keyword::from).collect())
    }

    /// Non-inactive keyword names in insertion order.
    pub async fn tracked_names(&self) -> Result<Vec<String>> {
        let names: Vec<String> =
            sqlx::query_scalar("SELECT keyword FROM keywords WHERE status != 'inactive' ORDER BY id")
                .fetch_all(&self.pool)
                .await?;
        Ok(names)
    }

    /// Every keyword name regardless of status.
    pub async fn all_names(&self) -> Result<Vec<String>> {
        let names: Vec<String> = sqlx::query_scalar("SELECT keyword FROM keywords ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(names)
    }

    /// Keywords eligible for scheduled collection.
    pub async fn active_keywords(&self) -> Result<Vec<String>> {
        let names: Vec<String> =
            sqlx::query_scalar("SELECT keyword FROM keywords WHERE status = 'active' ORDER BY id")
                .fetch_all(&self.pool)
                .await?;
        Ok(names)
    }

    pub async fn active_with_scale(&self) -> Result<Vec<(String, Option<Scale>)>> {
        let rows: Vec<(String, Option<String>)> =
            sqlx::query_as("SELECT keyword, scale FROM keywords WHERE status = 'active' ORDER BY id")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows
            .into_iter()
            .map(|(k, s)| (k, s.as_deref().and_then(Scale::parse)))
            .collect())
    }

    /// Non-inactive keywords that have never been given a scale.
    pub async fn unscaled(&self) -> Result<Vec<String>> {
        let names: Vec<String> = sqlx::query_scalar(
            "SELECT keyword FROM keywords WHERE scale IS NULL AND status != 'inactive' ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(names)
    }

    pub async fn scale_of(&self, keyword: &str) -> Result<Option<Scale>> {
        let scale: Option<Option<String>> =
            sqlx::query_scalar("SELECT scale FROM keywords WHERE keyword = ?")
                .bind(keyword)
                .fetch_optional(&self.pool)
                .await?;
        Ok(scale.flatten().as_deref().and_then(Scale::parse))
    }

    pub async fn set_scale(&self, keyword: &str, scale: Scale) -> Result<()> {
        sqlx::query("UPDATE keywords SET scale = ? WHERE keyword = ?")
            .bind(scale.as_str())
            .bind(keyword)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Explicit promotion: makes a keyword `active` and eligible for collection.
    pub async fn activate(&self, keyword: &str) -> Result<()> {
        let result = sqlx::query("UPDATE keywords SET status = 'active' WHERE keyword = ?")
            .bind(keyword)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(keyword.to_string()));
        }
        Ok(())
    }

    /// Flip an inactive keyword back to active. No-op for any other status.
    pub async fn reactivate(&self, keyword: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE keywords SET status = 'active' WHERE keyword = ? AND status = 'inactive'",
        )
        .bind(keyword)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Stop tracking a keyword. Seed keywords are rejected for every caller.
    pub async fn deactivate(&self, keyword: &str) -> Result<()> {
        let tracked = self
            .get(keyword)
            .await?
            .ok_or_else(|| AppError::NotFound(keyword.to_string()))?;
        if tracked.origin == KeywordOrigin::Seed {
            return Err(AppError::SeedProtected(keyword.to_string()));
        }
        sqlx::query("UPDATE keywords SET status = 'inactive' WHERE keyword = ?")
            .bind(keyword)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Deactivate active `user_search` keywords not searched since `cutoff`.
    pub async fn expire_stale_user_keywords(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE keywords SET status = 'inactive'
            WHERE origin = 'user_search' AND status = 'active'
              AND (last_searched_at IS NULL OR last_searched_at < ?)
            "#,
        )
        .bind(to_ts(cutoff))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
