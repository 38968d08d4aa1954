use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;

use super::series::{AggregatedSeries, Column, ShareSeries, TimeTable};

/// Summary of the total generation of one country over one analysis window
#[derive(Debug, Clone, PartialEq)]
pub struct StatisticsSummary {
    pub max_power_mw: f64,
    pub min_power_mw: f64,
    pub avg_power_mw: f64,
    /// Coefficient of variation of daily mean generation, in percent, over the
    /// calendar days of the reporting zone. `None` with fewer than two days of data.
    pub daily_volatility_pct: Option<f64>,
    pub peak_time: DateTime<Utc>,
    pub trough_time: DateTime<Utc>,
}

/// Divide every column by its row total. Rows totalling zero yield zero shares.
pub fn shares(aggregated: &AggregatedSeries) -> ShareSeries {
    let totals = aggregated.row_totals();
    let mut shares = TimeTable::with_index_of(aggregated);

    for column in aggregated.columns() {
        let values = column
            .values
            .iter()
            .zip(&totals)
            .map(|(value, total)| if *total == 0.0 { 0.0 } else { value / total })
            .collect();
        shares.columns_mut().push(Column {
            label: column.label.clone(),
            values,
        });
    }

    shares
}

/// Mean share per category over the window, largest first
pub fn mean_mix(shares: &ShareSeries) -> Vec<(String, f64)> {
    if shares.is_empty() {
        return Vec::new();
    }

    let rows = shares.len() as f64;
    let mut mix: Vec<(String, f64)> = shares
        .columns()
        .iter()
        .map(|c| (c.label.clone(), c.values.iter().sum::<f64>() / rows))
        .collect();
    mix.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    mix
}

pub fn calculate_statistics(aggregated: &AggregatedSeries, tz: Tz) -> Option<StatisticsSummary> {
    let totals = aggregated.row_totals();
    let index = aggregated.index();
    if totals.is_empty() {
        return None;
    }

    // first occurrence wins on ties
    let mut peak = 0;
    let mut trough = 0;
    for (i, total) in totals.iter().enumerate() {
        if *total > totals[peak] {
            peak = i;
        }
        if *total < totals[trough] {
            trough = i;
        }
    }

    Some(StatisticsSummary {
        max_power_mw: totals[peak],
        min_power_mw: totals[trough],
        avg_power_mw: mean(&totals),
        daily_volatility_pct: daily_volatility(index, &totals, tz),
        peak_time: index[peak],
        trough_time: index[trough],
    })
}

/// Coefficient of variation (sample standard deviation / mean * 100) of daily means
fn daily_volatility(index: &[DateTime<Utc>], totals: &[f64], tz: Tz) -> Option<f64> {
    let mut days: Vec<(NaiveDate, f64, usize)> = Vec::new();
    for (timestamp, total) in index.iter().zip(totals) {
        let day = timestamp.with_timezone(&tz).date_naive();
        match days.last_mut() {
            Some((current, sum, count)) if *current == day => {
                *sum += total;
                *count += 1;
            }
            _ => days.push((day, *total, 1)),
        }
    }

    if days.len() < 2 {
        return None;
    }

    let daily_means: Vec<f64> = days
        .iter()
        .map(|(_, sum, count)| sum / *count as f64)
        .collect();
    let mean = mean(&daily_means);
    if mean == 0.0 {
        return None;
    }

    let variance = daily_means
        .iter()
        .map(|v| (v - mean).powi(2))
        .sum::<f64>()
        / (daily_means.len() - 1) as f64;

    Some(variance.sqrt() / mean * 100.0)
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}
