use std::fmt;

use chrono::DateTime;
use chrono_tz::Tz;

use super::series::AggregatedSeries;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Advisory finding about a generation series. Never blocks reporting.
#[derive(Debug, Clone, PartialEq)]
pub enum QualityIssue {
    /// Total generation below the configured fraction of the series mean
    LowGeneration { timestamps: Vec<DateTime<Tz>> },
    /// A major category read exactly zero
    ZeroMajorSource {
        category: String,
        timestamps: Vec<DateTime<Tz>>,
    },
}

impl fmt::Display for QualityIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LowGeneration { timestamps } => write!(
                f,
                "Found unusually low generation periods: {}",
                format_timestamps(timestamps)
            ),
            Self::ZeroMajorSource {
                category,
                timestamps,
            } => write!(
                f,
                "Found periods with zero {} generation: {}",
                category,
                format_timestamps(timestamps)
            ),
        }
    }
}

fn format_timestamps(timestamps: &[DateTime<Tz>]) -> String {
    let formatted: Vec<String> = timestamps
        .iter()
        .map(|t| t.format(TIMESTAMP_FORMAT).to_string())
        .collect();
    format!("[{}]", formatted.join(", "))
}

/// Flag rows whose total falls strictly below `low_fraction` of the mean total, and
/// rows where any of `major_categories` reads exactly zero. Flagged timestamps are
/// reported in `tz`.
///
/// Major categories missing from the series are not reported.
pub fn check_quality(
    aggregated: &AggregatedSeries,
    low_fraction: f64,
    major_categories: &[String],
    tz: Tz,
) -> Vec<QualityIssue> {
    let mut issues = Vec::new();
    if aggregated.is_empty() {
        return issues;
    }

    let index = aggregated.index();
    let totals = aggregated.row_totals();
    let mean = totals.iter().sum::<f64>() / totals.len() as f64;
    let threshold = mean * low_fraction;

    let low: Vec<_> = index
        .iter()
        .zip(&totals)
        .filter(|(_, total)| **total < threshold)
        .map(|(t, _)| t.with_timezone(&tz))
        .collect();
    if !low.is_empty() {
        issues.push(QualityIssue::LowGeneration { timestamps: low });
    }

    for category in major_categories {
        let Some(column) = aggregated.column(category) else {
            continue;
        };
        let zero: Vec<_> = index
            .iter()
            .zip(&column.values)
            .filter(|(_, value)| **value == 0.0)
            .map(|(t, _)| t.with_timezone(&tz))
            .collect();
        if !zero.is_empty() {
            issues.push(QualityIssue::ZeroMajorSource {
                category: category.clone(),
                timestamps: zero,
            });
        }
    }

    issues
}
