use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tracing::debug;

use crate::context::MetricsContext;
use crate::month::YearMonth;
use crate::stats::round2;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyCount {
    pub period: YearMonth,
    pub date: NaiveDate,
    pub count: usize,
    pub cumulative: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeakMonth {
    pub period: YearMonth,
    pub date: NaiveDate,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendSeries {
    pub months: Vec<MonthlyCount>,
    pub total: usize,
    pub out_of_window: usize,
    pub average_per_month: f64,
    pub peak: Option<PeakMonth>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendReport {
    pub window_months: u32,
    pub registrations: TrendSeries,
    pub enrollments: TrendSeries,
}

pub fn analyze(ctx: &MetricsContext<'_>) -> TrendReport {
    let window = ctx.config.trends.window_months;
    let end = YearMonth::of(&ctx.now);
    let snapshot = ctx.snapshot;

    let report = TrendReport {
        window_months: window,
        registrations: monthly_series(snapshot.users.iter().map(|u| u.created_at), end, window),
        enrollments: monthly_series(snapshot.enrollments.iter().map(|e| e.enrolled_at), end, window),
    };

    debug!(
        registrations = report.registrations.total,
        enrollments = report.enrollments.total,
        "trend metrics computed"
    );
    report
}

/// Counts timestamps per calendar month over the `window` months ending with
/// `end`. Every month in the window is present, empty ones with 0.
pub fn monthly_series<I>(timestamps: I, end: YearMonth, window: u32) -> TrendSeries
where
    I: IntoIterator<Item = DateTime<Utc>>,
{
    let months = end.trailing(window);
    let mut counts: BTreeMap<YearMonth, usize> = months.iter().map(|m| (*m, 0)).collect();
    let mut out_of_window = 0;

    for timestamp in timestamps {
        match counts.get_mut(&YearMonth::of(&timestamp)) {
            Some(count) => *count += 1,
            None => out_of_window += 1,
        }
    }

    let ordered: Vec<usize> = counts.values().copied().collect();
    let running = cumulative(&ordered);
    let series: Vec<MonthlyCount> = counts
        .into_iter()
        .zip(running)
        .map(|((period, count), cumulative)| MonthlyCount {
            period,
            date: period.first_day(),
            count,
            cumulative,
        })
        .collect();

    let total: usize = ordered.iter().sum();
    TrendSeries {
        peak: peak(&series),
        average_per_month: if series.is_empty() {
            0.0
        } else {
            round2(total as f64 / series.len() as f64)
        },
        months: series,
        total,
        out_of_window,
    }
}

pub fn cumulative(counts: &[usize]) -> Vec<usize> {
    counts
        .iter()
        .scan(0usize, |running, count| {
            *running += *count;
            Some(*running)
        })
        .collect()
}

/// Busiest month, earliest on ties. None when nothing happened.
pub fn peak(months: &[MonthlyCount]) -> Option<PeakMonth> {
    let mut best: Option<&MonthlyCount> = None;
    for month in months {
        if month.count > best.map_or(0, |b| b.count) {
            best = Some(month);
        }
    }
    best.map(|m| PeakMonth {
        period: m.period,
        date: m.date,
        count: m.count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn at(year: i32, month: u32, day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(year, month, day, 12, 0, 0).unwrap()
    }

    #[test]
    fn empty_months_are_filled_with_zero() {
        let mut stamps: Vec<DateTime<Utc>> = (0..5).map(|d| at(2024, 1, d + 1)).collect();
        stamps.extend((0..10).map(|d| at(2024, 3, d + 1)));

        let series = monthly_series(stamps, YearMonth { year: 2024, month: 3 }, 3);
        let counts: Vec<usize> = series.months.iter().map(|m| m.count).collect();
        let running: Vec<usize> = series.months.iter().map(|m| m.cumulative).collect();
        assert_eq!(counts, vec![5, 0, 10]);
        assert_eq!(running, vec![5, 5, 15]);
        assert_eq!(series.total, 15);
        assert_eq!(series.average_per_month, 5.0);
    }

    #[test]
    fn cumulative_of_worked_example() {
        assert_eq!(cumulative(&[5, 0, 10]), vec![5, 5, 15]);
        assert!(cumulative(&[]).is_empty());
    }

    #[test]
    fn peak_prefers_earliest_month_on_ties() {
        let stamps = vec![at(2024, 2, 1), at(2024, 4, 1), at(2024, 2, 9), at(2024, 4, 3)];
        let series = monthly_series(stamps, YearMonth { year: 2024, month: 6 }, 12);
        let peak = series.peak.unwrap();
        assert_eq!(peak.period.to_string(), "2024-02");
        assert_eq!(peak.count, 2);
        assert_eq!(peak.date, NaiveDate::from_ymd_opt(2024, 2, 1).unwrap());
    }

    #[test]
    fn no_events_means_no_peak() {
        let series = monthly_series(Vec::new(), YearMonth { year: 2024, month: 6 }, 12);
        assert_eq!(series.months.len(), 12);
        assert!(series.peak.is_none());
        assert_eq!(series.total, 0);
    }

    #[test]
    fn timestamps_outside_window_are_counted_separately() {
        let stamps = vec![at(2022, 5, 1), at(2024, 6, 1), at(2024, 7, 1)];
        let series = monthly_series(stamps, YearMonth { year: 2024, month: 6 }, 12);
        assert_eq!(series.total, 1);
        assert_eq!(series.out_of_window, 2);
        assert_eq!(series.months[0].period.to_string(), "2023-07");
    }

    proptest! {
        #[test]
        fn in_window_counts_sum_to_input(offsets in prop::collection::vec((0u32..12, 1u32..28), 0..300)) {
            let end = YearMonth { year: 2024, month: 5 };
            let stamps: Vec<DateTime<Utc>> = offsets
                .iter()
                .map(|(back, day)| {
                    let month = end.back(*back);
                    at(month.year, month.month, *day)
                })
                .collect();
            let series = monthly_series(stamps.clone(), end, 12);

            prop_assert_eq!(series.months.iter().map(|m| m.count).sum::<usize>(), stamps.len());
            prop_assert_eq!(series.out_of_window, 0);
            let running: Vec<usize> = series.months.iter().map(|m| m.cumulative).collect();
            prop_assert!(running.windows(2).all(|w| w[0] <= w[1]));
            prop_assert_eq!(running.last().copied(), Some(stamps.len()));
        }
    }
}
