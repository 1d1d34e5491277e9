use crate::db::models::{RankedScoreRow, ScoreRow};
use crate::db::to_ts;
use crate::error::Result;
use crate::types::{Period, ScoreRecord};

const SCORE_COLUMNS: &str =
    "keyword, period_days, volume_growth, price_growth, composite_score, lifecycle_stage, computed_at";

/// Latest score per `(keyword, period_days)`. History is not retained.
#[derive(Clone)]
pub struct ScoreStore {
    pool: sqlx::SqlitePool,
}

impl ScoreStore {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }

    /// Replace the stored score for the record's `(keyword, period_days)`.
    /// Delete and insert run in one transaction.
    pub async fn replace(&self, score: &ScoreRecord) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM scores WHERE keyword = ? AND period_days = ?")
            .bind(&score.keyword)
            .bind(score.period_days)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO scores (
                keyword, period_days, volume_growth, price_growth,
                composite_score, lifecycle_stage, computed_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&score.keyword)
        .bind(score.period_days)
        .bind(score.volume_growth)
        .bind(score.price_growth)
        .bind(score.composite_score)
        .bind(score.lifecycle_stage.as_str())
        .bind(to_ts(score.computed_at))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    pub async fn get(&self, keyword: &str, period: Period) -> Result<Option<ScoreRecord>> {
        let row: Option<ScoreRow> = sqlx::query_as(&format!(
            "SELECT {SCORE_COLUMNS} FROM scores WHERE keyword = ? AND period_days = ?"
        ))
        .bind(keyword)
        .bind(period.days())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(ScoreRecord::from))
    }

    /// Number of stored scores for the keyword across all periods.
    pub async fn count_for(&self, keyword: &str) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM scores WHERE keyword = ?")
            .bind(keyword)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Composite scores across every stored period for the keyword.
    pub async fn composite_scores(&self, keyword: &str) -> Result<Vec<f64>> {
        let scores: Vec<f64> =
            sqlx::query_scalar("SELECT composite_score FROM scores WHERE keyword = ? ORDER BY period_days")
                .bind(keyword)
                .fetch_all(&self.pool)
                .await?;
        Ok(scores)
    }

    /// All scores for a period joined with keyword scale/origin, skipping
    /// inactive keywords. Scores for unregistered keywords are kept.
    pub async fn ranking_rows(&self, period: Period) -> Result<Vec<RankedScoreRow>> {
        let rows: Vec<RankedScoreRow> = sqlx::query_as(
            r#"
            SELECT s.keyword AS keyword, s.composite_score AS composite_score,
                   s.volume_growth AS volume_growth, s.price_growth AS price_growth,
                   s.lifecycle_stage AS lifecycle_stage, s.computed_at AS computed_at,
                   k.scale AS scale, k.origin AS origin
            FROM scores s
            LEFT JOIN keywords k ON s.keyword = k.keyword
            WHERE s.period_days = ? AND (k.status IS NULL OR k.status != 'inactive')
            ORDER BY s.keyword
            "#,
        )
        .bind(period.days())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::types::LifecycleStage;
    use chrono::{TimeZone, Utc};

    fn score(keyword: &str, period_days: i64, composite: f64) -> ScoreRecord {
        ScoreRecord {
            keyword: keyword.to_string(),
            period_days,
            volume_growth: composite,
            price_growth: 0.0,
            composite_score: composite,
            lifecycle_stage: LifecycleStage::Emerging,
            computed_at: Utc.with_ymd_and_hms(2026, 5, 1, 0, 0, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn replace_keeps_one_row_per_keyword_and_period() {
        let store = ScoreStore::new(test_pool().await);
        store.replace(&score("y2k", 7, 10.0)).await.unwrap();
        store.replace(&score("y2k", 7, 20.0)).await.unwrap();
        store.replace(&score("y2k", 14, 5.0)).await.unwrap();

        assert_eq!(store.count_for("y2k").await.unwrap(), 2);
        let current = store.get("y2k", Period::new(7).unwrap()).await.unwrap().unwrap();
        assert_eq!(current.composite_score, 20.0);
        assert_eq!(store.composite_scores("y2k").await.unwrap(), vec![20.0, 5.0]);
    }

    #[tokio::test]
    async fn ranking_rows_skip_inactive_keywords() {
        let pool = test_pool().await;
        let store = ScoreStore::new(pool.clone());
        let registry = crate::db::KeywordRegistry::new(pool);
        let now = Utc.with_ymd_and_hms(2026, 5, 1, 0, 0, 0).unwrap();
        registry.ensure_tracked("kept", now).await.unwrap();
        registry.ensure_tracked("dropped", now).await.unwrap();
        registry.deactivate("dropped").await.unwrap();

        store.replace(&score("kept", 7, 1.0)).await.unwrap();
        store.replace(&score("dropped", 7, 2.0)).await.unwrap();
        store.replace(&score("orphan", 7, 3.0)).await.unwrap();

        let names: Vec<String> = store
            .ranking_rows(Period::new(7).unwrap())
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.keyword)
            .collect();
        assert_eq!(names, vec!["kept".to_string(), "orphan".to_string()]);
    }
}
