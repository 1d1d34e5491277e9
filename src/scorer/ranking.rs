use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::db::from_ts;
use crate::db::models::RankedScoreRow;
use crate::types::{KeywordOrigin, LifecycleStage, Scale};

/// One row of the top-trends list.
#[derive(Debug, Clone, Serialize)]
pub struct RankedTrend {
    pub rank: usize,
    pub keyword: String,
    pub composite_score: f64,
    pub volume_growth: f64,
    pub price_growth: f64,
    pub lifecycle_stage: LifecycleStage,
    pub computed_at: DateTime<Utc>,
    pub origin: KeywordOrigin,
    pub scale: Scale,
    /// Position within the keyword's scale group, 1.0 = best in group.
    pub percentile: f64,
}

impl RankedTrend {
    fn from_row(row: RankedScoreRow, scale: Scale, percentile: f64, rank: usize) -> Self {
        Self {
            rank,
            composite_score: row.composite_score,
            volume_growth: row.volume_growth,
            price_growth: row.price_growth,
            lifecycle_stage: LifecycleStage::parse(&row.lifecycle_stage)
                .unwrap_or(LifecycleStage::Peak),
            computed_at: from_ts(row.computed_at),
            // Scores without a registry row were created before seeding moved into the registry.
            origin: row
                .origin
                .as_deref()
                .and_then(KeywordOrigin::parse)
                .unwrap_or(KeywordOrigin::Seed),
            scale,
            percentile,
            keyword: row.keyword,
        }
    }
}

/// Rank items within their scale group by `score` (descending), convert each
/// in-group position to `(group_size - index) / group_size`, then merge the
/// groups and order by percentile, breaking ties on the raw score.
///
/// Unscaled items rank with the macro group. Input order is the final
/// tiebreaker, so callers pass a deterministic order.
pub fn percentile_rank<T>(
    items: Vec<T>,
    scale_of: impl Fn(&T) -> Scale,
    score_of: impl Fn(&T) -> f64,
) -> Vec<(T, f64)> {
    let mut macro_group = Vec::new();
    let mut micro_group = Vec::new();
    for item in items {
        match scale_of(&item) {
            Scale::Macro => macro_group.push(item),
            Scale::Micro => micro_group.push(item),
        }
    }

    let mut merged = Vec::with_capacity(macro_group.len() + micro_group.len());
    for mut group in [macro_group, micro_group] {
        group.sort_by(|a, b| desc(score_of(a), score_of(b)));
        let size = group.len() as f64;
        for (index, item) in group.into_iter().enumerate() {
            let percentile = (size - index as f64) / size;
            merged.push((item, percentile));
        }
    }

    merged.sort_by(|(a, pa), (b, pb)| desc(*pa, *pb).then_with(|| desc(score_of(a), score_of(b))));
    merged
}

fn desc(a: f64, b: f64) -> Ordering {
    b.partial_cmp(&a).unwrap_or(Ordering::Equal)
}

/// Build the ranked list from joined score rows and truncate to `limit`.
pub fn rank_rows(rows: Vec<RankedScoreRow>, limit: usize) -> Vec<RankedTrend> {
    let with_scale: Vec<(RankedScoreRow, Scale)> = rows
        .into_iter()
        .map(|row| {
            let scale = row.scale.as_deref().and_then(Scale::parse).unwrap_or(Scale::Macro);
            (row, scale)
        })
        .collect();

    percentile_rank(with_scale, |(_, scale)| *scale, |(row, _)| row.composite_score)
        .into_iter()
        .take(limit)
        .enumerate()
        .map(|(i, ((row, scale), percentile))| RankedTrend::from_row(row, scale, percentile, i + 1))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(keyword: &str, composite: f64, scale: Option<&str>) -> RankedScoreRow {
        RankedScoreRow {
            keyword: keyword.to_string(),
            composite_score: composite,
            volume_growth: composite,
            price_growth: 0.0,
            lifecycle_stage: "Emerging".to_string(),
            computed_at: 0,
            scale: scale.map(str::to_string),
            origin: Some("seed".to_string()),
        }
    }

    #[test]
    fn top_micro_outranks_mid_macro() {
        let mut rows: Vec<RankedScoreRow> = (0..10)
            .map(|i| row(&format!("macro{i}"), 1000.0 - i as f64 * 10.0, Some("macro")))
            .collect();
        rows.push(row("micro-best", 5.0, Some("micro")));
        rows.push(row("micro-second", 1.0, Some("micro")));

        let ranked = rank_rows(rows, 50);
        let pos = |k: &str| ranked.iter().position(|r| r.keyword == k).unwrap();

        let macro_sixth = ranked.iter().find(|r| r.keyword == "macro5").unwrap();
        assert_eq!(macro_sixth.percentile, 0.5);
        let micro_first = ranked.iter().find(|r| r.keyword == "micro-best").unwrap();
        assert_eq!(micro_first.percentile, 1.0);
        assert!(pos("micro-best") < pos("macro5"));
        // Same percentile: raw score breaks the tie.
        assert_eq!(ranked[0].keyword, "macro0");
        assert_eq!(ranked[1].keyword, "micro-best");
    }

    #[test]
    fn ranks_are_sequential_and_limit_applies() {
        let rows = vec![
            row("a", 3.0, Some("macro")),
            row("b", 9.0, None),
            row("c", 6.0, Some("macro")),
        ];
        let ranked = rank_rows(rows, 2);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].keyword, "b");
        assert_eq!(ranked[0].rank, 1);
        assert_eq!(ranked[0].scale, Scale::Macro);
        assert_eq!(ranked[1].keyword, "c");
        assert_eq!(ranked[1].rank, 2);
    }

    #[test]
    fn single_member_group_is_full_percentile() {
        let ranked = percentile_rank(vec![("solo", Scale::Micro, -40.0)], |t| t.1, |t| t.2);
        assert_eq!(ranked[0].1, 1.0);
    }

    #[test]
    fn missing_origin_reads_as_seed() {
        let mut orphan = row("orphan", 1.0, None);
        orphan.origin = None;
        let ranked = rank_rows(vec![orphan], 10);
        assert_eq!(ranked[0].origin, KeywordOrigin::Seed);
    }
}
