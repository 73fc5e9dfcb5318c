use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};
use serde::Serialize;

/// Window used for `recent_average`, independent of the requested range.
pub const RECENT_DAYS: i64 = 7;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreDistribution {
    /// score >= 90
    pub excellent: usize,
    /// 70 <= score < 90
    pub good: usize,
    /// score < 70
    pub needs_improvement: usize,
}

impl ScoreDistribution {
    fn add(&mut self, score: u8) {
        match score {
            90.. => self.excellent += 1,
            70..=89 => self.good += 1,
            _ => self.needs_improvement += 1,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreBucket {
    pub date: String,
    pub attempts: usize,
    pub avg_score: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreStats {
    pub range_days: usize,
    pub total_attempts: usize,
    pub average_score: Option<f64>,
    pub recent_average: Option<f64>,
    pub distribution: ScoreDistribution,
    pub buckets: Vec<ScoreBucket>,
}

/// Fold `(unix_seconds, score)` rows, already limited to the range, into
/// totals and per-day buckets.
pub(crate) fn aggregate(rows: &[(i64, u8)], range_days: usize, now: DateTime<Utc>) -> ScoreStats {
    #[derive(Default)]
    struct DayAgg {
        attempts: usize,
        score_total: u64,
    }

    let recent_cutoff = (now - Duration::days(RECENT_DAYS)).timestamp();
    let mut buckets: BTreeMap<(i32, u32, u32), DayAgg> = BTreeMap::new();
    let mut distribution = ScoreDistribution::default();
    let mut score_total = 0u64;
    let mut recent_total = 0u64;
    let mut recent_count = 0usize;

    for &(ts, score) in rows {
        let dt = Utc.timestamp_opt(ts, 0).single().unwrap_or(now);
        let day = buckets.entry((dt.year(), dt.month(), dt.day())).or_default();
        day.attempts += 1;
        day.score_total += u64::from(score);

        distribution.add(score);
        score_total += u64::from(score);
        if ts >= recent_cutoff {
            recent_total += u64::from(score);
            recent_count += 1;
        }
    }

    let mean = |total: u64, count: usize| (count > 0).then(|| total as f64 / count as f64);

    ScoreStats {
        range_days,
        total_attempts: rows.len(),
        average_score: mean(score_total, rows.len()),
        recent_average: mean(recent_total, recent_count),
        distribution,
        buckets: buckets
            .into_iter()
            .map(|((y, m, d), day)| ScoreBucket {
                date: format!("{y:04}-{m:02}-{d:02}"),
                attempts: day.attempts,
                avg_score: day.score_total as f64 / day.attempts as f64,
            })
            .collect(),
    }
}
