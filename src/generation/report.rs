use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::category::CategoryMapping;
use super::chart::{self, ChartError};
use super::quality::{QualityIssue, check_quality};
use super::series::{AggregatedSeries, ShareSeries};
use super::stats::{StatisticsSummary, calculate_statistics, mean_mix, shares};
use crate::config::{CountryEntry, GenerationConfig};
use crate::entsoe::availability::{AnalysisWindow, Availability, latest_available};
use crate::entsoe::{EntsoeError, GenerationSource, areas};

/// Why a country produced no report. Never stops the run.
#[derive(Error, Debug)]
pub enum SkipReason {
    #[error("unknown area '{0}'")]
    UnknownArea(String),
    #[error("no recent data found")]
    NoRecentData,
    #[error("no data returned for the analysis window")]
    EmptyWindow,
    #[error("query failed: {0}")]
    Query(#[from] EntsoeError),
    #[error("chart output failed: {0}")]
    Chart(#[from] ChartError),
}

/// Failures that make any further output impossible
#[derive(Error, Debug)]
pub enum FatalError {
    #[error("failed to create output directory {path}: {source}")]
    OutputDirectory {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug)]
pub struct CountryReport {
    pub key: String,
    pub name: String,
    pub window: AnalysisWindow,
    pub aggregated: AggregatedSeries,
    pub shares: ShareSeries,
    pub statistics: StatisticsSummary,
    /// Mean share per category, largest first
    pub mix: Vec<(String, f64)>,
    pub quality_issues: Vec<QualityIssue>,
    pub charts: Vec<PathBuf>,
}

#[derive(Debug)]
pub enum CountryOutcome {
    Reported(Box<CountryReport>),
    Skipped(SkipReason),
}

pub struct GenerationReporter<'a, S> {
    source: &'a S,
    config: &'a GenerationConfig,
    mapping: CategoryMapping,
}

/// Create the output directory, including parents
pub fn prepare_output_dir(path: &Path) -> Result<(), FatalError> {
    fs::create_dir_all(path).map_err(|source| FatalError::OutputDirectory {
        path: path.to_path_buf(),
        source,
    })?;
    info!("Output directory created/verified at: {}", path.display());
    Ok(())
}

impl<'a, S: GenerationSource> GenerationReporter<'a, S> {
    pub fn new(source: &'a S, config: &'a GenerationConfig, mapping: CategoryMapping) -> Self {
        Self {
            source,
            config,
            mapping,
        }
    }

    /// Report on every configured country in turn.
    ///
    /// A country that fails is recorded as skipped and the run carries on; only an
    /// unusable output directory aborts.
    pub async fn run(
        &self,
        output_dir: &Path,
        now: DateTime<Utc>,
    ) -> Result<Vec<(String, CountryOutcome)>, FatalError> {
        prepare_output_dir(output_dir)?;

        let mut results = Vec::with_capacity(self.config.countries.len());
        for country in &self.config.countries {
            info!("Processing {}...", country.name);

            let outcome = match self.report_country(country, output_dir, now).await {
                Ok(report) => {
                    print_report(&report, self.config.timezone);
                    CountryOutcome::Reported(Box::new(report))
                }
                Err(reason) => {
                    warn!(
                        "Skipping visualization for {} due to data issues: {}",
                        country.name, reason
                    );
                    CountryOutcome::Skipped(reason)
                }
            };
            results.push((country.key.clone(), outcome));
        }

        Ok(results)
    }

    async fn report_country(
        &self,
        country: &CountryEntry,
        output_dir: &Path,
        now: DateTime<Utc>,
    ) -> Result<CountryReport, SkipReason> {
        let mut report = self.analyze_country(country, now).await?;
        report.charts = self.write_charts(&report, output_dir).map_err(|e| {
            error!("Error saving plot for {}: {}", country.name, e);
            e
        })?;
        Ok(report)
    }

    /// Fetch the most recent analysis window for one country and derive its report
    pub async fn analyze_country(
        &self,
        country: &CountryEntry,
        now: DateTime<Utc>,
    ) -> Result<CountryReport, SkipReason> {
        let area = areas::lookup(&country.key)
            .ok_or_else(|| SkipReason::UnknownArea(country.key.clone()))?;
        debug!("Resolved {} to area {} [{}]", country.name, area, area.code);

        let latest = match latest_available(self.source, area, now, self.config.lookback_days).await
        {
            Availability::Available(latest) => latest,
            Availability::Unavailable => {
                error!("No recent data found for {}", country.key);
                return Err(SkipReason::NoRecentData);
            }
        };

        let window = AnalysisWindow::ending_at(latest, self.config.window_days);
        let raw = self
            .source
            .query_generation(area, window.start, window.end)
            .await
            .map_err(|e| {
                error!("Error analyzing {}: {}", country.key, e);
                e
            })?;
        if raw.is_empty() {
            error!("No data returned for {}", country.key);
            return Err(SkipReason::EmptyWindow);
        }

        let aggregated = self.mapping.aggregate(&raw);
        let shares = shares(&aggregated);
        let statistics = calculate_statistics(&aggregated, self.config.timezone)
            .ok_or(SkipReason::EmptyWindow)?;

        let quality_issues = check_quality(
            &aggregated,
            self.config.low_generation_fraction,
            &self.config.major_categories,
            self.config.timezone,
        );
        if !quality_issues.is_empty() {
            warn!("Data quality issues for {}:", country.key);
            for issue in &quality_issues {
                warn!("  - {}", issue);
            }
        }

        Ok(CountryReport {
            key: country.key.clone(),
            name: country.name.clone(),
            window,
            mix: mean_mix(&shares),
            aggregated,
            shares,
            statistics,
            quality_issues,
            charts: Vec::new(),
        })
    }

    fn write_charts(
        &self,
        report: &CountryReport,
        output_dir: &Path,
    ) -> Result<Vec<PathBuf>, ChartError> {
        let mut charts = vec![chart::render_png(
            &report.aggregated,
            &report.name,
            &self.config.colors,
            self.config.timezone,
            output_dir,
        )?];
        if self.config.write_html {
            charts.push(chart::render_html(
                &report.aggregated,
                &report.name,
                &self.config.colors,
                self.config.timezone,
                output_dir,
            )?);
        }
        for path in &charts {
            info!("Successfully saved plot to {}", path.display());
        }
        Ok(charts)
    }
}

fn print_report(report: &CountryReport, tz: Tz) {
    let stats = &report.statistics;
    let local = |t: DateTime<Utc>| t.with_timezone(&tz).format("%Y-%m-%d %H:%M");

    println!(
        "\n{} Generation Mix ({} to {}):",
        report.name,
        local(report.window.start),
        local(report.window.end)
    );
    for (category, share) in &report.mix {
        println!("  {:<35} {:>6.2} %", category, share * 100.0);
    }

    println!("{} Statistics:", report.name);
    println!("  Max power:        {:.1} MW", stats.max_power_mw);
    println!("  Min power:        {:.1} MW", stats.min_power_mw);
    println!("  Average power:    {:.1} MW", stats.avg_power_mw);
    match stats.daily_volatility_pct {
        Some(cv) => println!("  Daily volatility: {:.2} %", cv),
        None => println!("  Daily volatility: n/a"),
    }
    println!("  Peak hour:        {}", local(stats.peak_time));
    println!("  Trough hour:      {}", local(stats.trough_time));
}
