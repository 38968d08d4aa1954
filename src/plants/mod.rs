//! Renewable power plant map from the Global Power Plant Database CSV.
pub(crate) mod map;

use std::collections::BTreeSet;
use std::io::Read;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum PlantError {
    #[error("failed to open plant database {path}: {source}")]
    Open { path: PathBuf, source: csv::Error },
    #[error("malformed plant record: {0}")]
    Record(#[from] csv::Error),
}

/// One row of the plant database. Unparsable numeric cells read as `None`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PlantRecord {
    #[serde(default)]
    pub name: String,
    pub country_long: String,
    pub primary_fuel: String,
    #[serde(deserialize_with = "csv::invalid_option")]
    pub capacity_mw: Option<f64>,
    #[serde(deserialize_with = "csv::invalid_option")]
    pub latitude: Option<f64>,
    #[serde(deserialize_with = "csv::invalid_option")]
    pub longitude: Option<f64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    pub commissioning_year: Option<f64>,
}

impl PlantRecord {
    /// `(latitude, longitude)` when both are present
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        // "nan" parses as a float, so it has to be excluded here
        Some((self.latitude?, self.longitude?))
            .filter(|(lat, lon)| lat.is_finite() && lon.is_finite())
    }
}

/// Plant count and capacity of one fuel type in one country
#[derive(Debug, Clone, PartialEq)]
pub struct FuelSummary {
    pub country: String,
    pub fuel: String,
    pub plants: usize,
    pub capacity_mw: f64,
}

pub fn load_plants(path: &Path) -> Result<Vec<PlantRecord>, PlantError> {
    info!("Loading data from {}", path.display());
    let reader = csv::Reader::from_path(path).map_err(|source| PlantError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    read_plants(reader)
}

pub fn read_plants<R: Read>(mut reader: csv::Reader<R>) -> Result<Vec<PlantRecord>, PlantError> {
    let plants = reader
        .deserialize()
        .collect::<Result<Vec<PlantRecord>, _>>()?;

    let countries: BTreeSet<_> = plants.iter().map(|p| p.country_long.as_str()).collect();
    let fuels: BTreeSet<_> = plants.iter().map(|p| p.primary_fuel.as_str()).collect();
    debug!("Unique countries found: {:?}", countries);
    debug!("Unique fuel types found: {:?}", fuels);

    Ok(plants)
}

/// Keep plants in one of `countries`, with a fuel in `fuels` and both coordinates present
pub fn filter_plants(
    plants: &[PlantRecord],
    countries: &[String],
    fuels: &[&str],
) -> Vec<PlantRecord> {
    plants
        .iter()
        .filter(|p| countries.contains(&p.country_long))
        .filter(|p| fuels.contains(&p.primary_fuel.as_str()))
        .filter(|p| p.coordinates().is_some())
        .cloned()
        .collect()
}

/// Count and total capacity for every country/fuel pair, in the given order
pub fn summarize(plants: &[PlantRecord], countries: &[String], fuels: &[&str]) -> Vec<FuelSummary> {
    let mut summary = Vec::with_capacity(countries.len() * fuels.len());
    for country in countries {
        for fuel in fuels {
            let matching: Vec<_> = plants
                .iter()
                .filter(|p| &p.country_long == country && p.primary_fuel == *fuel)
                .collect();
            summary.push(FuelSummary {
                country: country.clone(),
                fuel: fuel.to_string(),
                plants: matching.len(),
                capacity_mw: matching.iter().filter_map(|p| p.capacity_mw).sum(),
            });
        }
    }
    summary
}

pub fn log_summary(selected: usize, summary: &[FuelSummary]) {
    info!("Found {} renewable plants in selected countries", selected);
    for entry in summary {
        info!(
            "  {} {}: {} plants, {:.1} MW total capacity",
            entry.country, entry.fuel, entry.plants, entry.capacity_mw
        );
    }
}
