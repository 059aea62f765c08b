//! Read-only views over stored counters: today's summary, the posts/replies
//! heatmap buckets and goal progress.

use std::fmt::Write as _;

use chrono::Days;
use serde::Serialize;

use post_tracker_core_types::{DailyCounts, DateKey, DayCounters, GoalConfig, GoalKind};

/// Longest activity strip a summary carries.
pub const MAX_RECENT_DAYS: usize = 366;

/// Heatmap buckets by posts + replies, in ascending order. `None` is unbounded.
const BUCKETS: [(Option<u64>, &str); 5] = [
    (Some(0), "No posts/replies"),
    (Some(2), "1-2 posts/replies"),
    (Some(4), "3-4 posts/replies"),
    (Some(6), "5-6 posts/replies"),
    (None, "7+ posts/replies"),
];

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HeatBucket {
    pub level: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<u64>,
    pub label: &'static str,
}

pub fn heat_bucket(total: u64) -> HeatBucket {
    let level = BUCKETS
        .iter()
        .position(|(max, _)| max.map_or(true, |max| total <= max))
        .unwrap_or(BUCKETS.len() - 1);
    bucket_at(level)
}

pub fn legend() -> Vec<HeatBucket> {
    (0..BUCKETS.len()).map(bucket_at).collect()
}

fn bucket_at(level: usize) -> HeatBucket {
    let (max, label) = BUCKETS[level];
    HeatBucket { level, max, label }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GoalProgress {
    pub goal: GoalKind,
    pub achieved: u64,
    pub target: u64,
    /// Fraction in `[0, 1]`; a zero target counts as met.
    pub percent: f64,
    pub complete: bool,
}

impl GoalProgress {
    pub fn new(goal: GoalKind, achieved: u64, target: u64) -> Self {
        let percent = if target > 0 {
            (achieved as f64 / target as f64).min(1.0)
        } else {
            1.0
        };
        Self {
            goal,
            achieved,
            target,
            percent,
            complete: percent >= 1.0,
        }
    }

    pub fn text(&self) -> String {
        format!("{} / {}", self.achieved, self.target)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DayCell {
    pub key: DateKey,
    pub total: u64,
    pub level: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AllTimeTotals {
    pub likes: u64,
    pub reposts: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DailySummary {
    pub key: DateKey,
    pub posts: u64,
    pub replies: u64,
    pub reposts: u64,
    pub likes: u64,
    pub total: u64,
    pub bucket: HeatBucket,
    pub goals: Vec<GoalProgress>,
    #[serde(rename = "allTime")]
    pub all_time: AllTimeTotals,
    /// Trailing days ending at `key`, oldest first, at most [`MAX_RECENT_DAYS`].
    pub recent: Vec<DayCell>,
}

impl DailySummary {
    pub fn build(daily: &DailyCounts, goals: &GoalConfig, key: DateKey, days: usize) -> Self {
        let today = daily.get(&key).copied().unwrap_or_default();
        let total = today.total();
        Self {
            key,
            posts: today.posts,
            replies: today.replies,
            reposts: today.reposts,
            likes: today.likes,
            total,
            bucket: heat_bucket(total),
            goals: GoalKind::ALL
                .iter()
                .map(|kind| GoalProgress::new(*kind, kind.achieved(&today), goals.target(*kind)))
                .collect(),
            all_time: all_time_totals(daily),
            recent: recent_cells(daily, key, days),
        }
    }

    /// "1 post/reply" or "N posts/replies".
    pub fn headline(&self) -> String {
        let noun = if self.total == 1 {
            "post/reply"
        } else {
            "posts/replies"
        };
        format!("{} {noun}", self.total)
    }

    pub fn breakdown(&self) -> String {
        format!(
            "{} {} · {} {}",
            self.posts,
            pluralize("post", "posts", self.posts),
            self.replies,
            pluralize("reply", "replies", self.replies)
        )
    }

    pub fn secondary(&self) -> String {
        format!(
            "{} {} · {} {}",
            self.reposts,
            pluralize("repost", "reposts", self.reposts),
            self.likes,
            pluralize("like", "likes", self.likes)
        )
    }

    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{}: {}", self.key, self.headline());
        let _ = writeln!(out, "  {}", self.breakdown());
        let _ = writeln!(out, "  {}", self.secondary());
        let _ = writeln!(out, "  Activity: {}", self.bucket.label);
        for row in &self.goals {
            let mark = if row.complete { "done" } else { "open" };
            let _ = writeln!(
                out,
                "  Goal {:<8} {:>9}  {:>3.0}%  {mark}",
                row.goal.label(),
                row.text(),
                row.percent * 100.0
            );
        }
        let _ = writeln!(
            out,
            "  All time: {} {} · {} {}",
            self.all_time.likes,
            pluralize("like", "likes", self.all_time.likes),
            self.all_time.reposts,
            pluralize("repost", "reposts", self.all_time.reposts)
        );
        if !self.recent.is_empty() {
            let strip: Vec<String> = self
                .recent
                .iter()
                .map(|cell| format!("{}:{}", &cell.key.to_string()[5..], cell.level))
                .collect();
            let _ = writeln!(out, "  Recent: {}", strip.join(" "));
        }
        out
    }
}

fn pluralize(singular: &'static str, plural: &'static str, value: u64) -> &'static str {
    if value == 1 {
        singular
    } else {
        plural
    }
}

pub fn all_time_totals(daily: &DailyCounts) -> AllTimeTotals {
    daily.values().fold(
        AllTimeTotals {
            likes: 0,
            reposts: 0,
        },
        |acc, day| AllTimeTotals {
            likes: acc.likes + day.likes,
            reposts: acc.reposts + day.reposts,
        },
    )
}

fn recent_cells(daily: &DailyCounts, end: DateKey, days: usize) -> Vec<DayCell> {
    let days = days.min(MAX_RECENT_DAYS);
    (0..days)
        .rev()
        .filter_map(|back| end.date().checked_sub_days(Days::new(back as u64)))
        .map(|date| {
            let key = DateKey::new(date);
            let total = daily.get(&key).map_or(0, DayCounters::total);
            DayCell {
                key,
                total,
                level: heat_bucket(total).level,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(day: u32) -> DateKey {
        DateKey::from_ymd(2024, 6, day).unwrap()
    }

    fn counts(posts: u64, replies: u64, reposts: u64, likes: u64) -> DayCounters {
        DayCounters {
            posts,
            replies,
            reposts,
            likes,
        }
    }

    #[test]
    fn buckets_follow_thresholds() {
        let levels: Vec<usize> = [0, 1, 2, 3, 4, 5, 6, 7, 40]
            .into_iter()
            .map(|total| heat_bucket(total).level)
            .collect();
        assert_eq!(levels, vec![0, 1, 1, 2, 2, 3, 3, 4, 4]);
        assert_eq!(heat_bucket(9).label, "7+ posts/replies");
        assert_eq!(legend().len(), 5);
        assert_eq!(legend()[0].label, "No posts/replies");
    }

    #[test]
    fn goal_progress_caps_and_treats_zero_target_as_met() {
        let half = GoalProgress::new(GoalKind::Posts, 1, 2);
        assert_eq!(half.percent, 0.5);
        assert!(!half.complete);
        assert_eq!(half.text(), "1 / 2");

        let over = GoalProgress::new(GoalKind::Replies, 5, 2);
        assert_eq!(over.percent, 1.0);
        assert!(over.complete);

        let none = GoalProgress::new(GoalKind::Posts, 0, 0);
        assert!(none.complete);
    }

    #[test]
    fn summary_reads_today_and_sums_all_time() {
        let mut daily = DailyCounts::new();
        daily.insert(key(1), counts(1, 0, 2, 3));
        daily.insert(key(3), counts(2, 1, 1, 1));
        let summary = DailySummary::build(&daily, &GoalConfig::default(), key(3), 3);

        assert_eq!(summary.total, 3);
        assert_eq!(summary.bucket.level, 2);
        assert_eq!(summary.headline(), "3 posts/replies");
        assert_eq!(summary.breakdown(), "2 posts · 1 reply");
        assert_eq!(summary.secondary(), "1 repost · 1 like");
        assert_eq!(summary.all_time, AllTimeTotals { likes: 4, reposts: 3 });
        let totals: Vec<u64> = summary.recent.iter().map(|cell| cell.total).collect();
        assert_eq!(totals, vec![1, 0, 3]);
        assert!(summary.goals.iter().all(|row| row.complete));
    }

    #[test]
    fn missing_day_renders_empty() {
        let summary = DailySummary::build(&DailyCounts::new(), &GoalConfig::default(), key(2), 0);
        assert_eq!(summary.headline(), "0 posts/replies");
        assert_eq!(summary.breakdown(), "0 posts · 0 replies");
        assert_eq!(summary.bucket.level, 0);
        assert!(summary.recent.is_empty());
        assert!(summary.render_text().contains("No posts/replies"));
    }

    #[test]
    fn recent_strip_is_capped_and_stops_at_the_calendar_start() {
        let summary =
            DailySummary::build(&DailyCounts::new(), &GoalConfig::default(), key(1), 200_000_000);
        assert_eq!(summary.recent.len(), MAX_RECENT_DAYS);
        assert_eq!(summary.recent.last().map(|cell| cell.key), Some(key(1)));
        assert_eq!(
            summary.recent.first().map(|cell| cell.key),
            DateKey::from_ymd(2023, 6, 2)
        );

        let earliest = DateKey::new(chrono::NaiveDate::MIN);
        let edge = DailySummary::build(&DailyCounts::new(), &GoalConfig::default(), earliest, 5);
        assert_eq!(edge.recent.len(), 1);
        assert_eq!(edge.recent[0].key, earliest);
    }
}
