//! Run configuration.
//!
//! Every field has a default, so the binary runs without a config file. A TOML file
//! passed with `--config` overrides any subset of the fields.
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::entsoe::BASE_URL;
use crate::generation::category::{CategoryGroup, CategoryMapping, MappingError};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid category mapping: {0}")]
    Mapping(#[from] MappingError),
    #[error("{0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub generation: GenerationConfig,
    pub plants: PlantsConfig,
}

/// A country to report on: ENTSO-E area key and display name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountryEntry {
    pub key: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Environment variable holding the ENTSO-E security token
    pub api_key_env: String,
    /// ENTSO-E Transparency Platform REST endpoint
    pub api_url: String,
    pub output_dir: PathBuf,
    pub countries: Vec<CountryEntry>,
    pub categories: Vec<CategoryGroup>,
    /// Categories whose zero readings are reported as quality issues
    pub major_categories: Vec<String>,
    /// Chart colour per category, `#RRGGBB`
    pub colors: BTreeMap<String, String>,
    /// Window searched for the most recent sample
    pub lookback_days: i64,
    /// Length of the analysis window ending at the most recent sample
    pub window_days: i64,
    /// Zone whose calendar days are used for daily grouping, day lines and printed times
    pub timezone: Tz,
    /// Totals below this fraction of the mean are flagged
    pub low_generation_fraction: f64,
    /// Also write an interactive HTML chart next to each PNG
    pub write_html: bool,
}

/// Marker style for one fuel type on the plant map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuelStyle {
    pub fuel: String,
    pub color: String,
    /// Font Awesome icon name
    pub icon: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlantsConfig {
    pub database: PathBuf,
    pub output_dir: PathBuf,
    /// Values of the `country_long` column to keep
    pub countries: Vec<String>,
    pub fuels: Vec<FuelStyle>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        let countries = [
            ("FR", "France"),
            ("DE_LU", "Germany/Luxembourg"),
            ("IT", "Italy"),
            ("ES", "Spain"),
        ];
        let colors = [
            ("Nuclear", "#7E57C2"),
            ("Fossil Gas", "#FF7043"),
            ("Coal and Lignite", "#5D4037"),
            ("Wind", "#81C784"),
            ("Solar", "#FFD54F"),
            ("Hydro", "#4FC3F7"),
            ("Other Renewables", "#66BB6A"),
            ("Fossil Oil", "#8D6E63"),
            ("Other", "#90A4AE"),
            ("Biomass", "#A5D6A7"),
            ("Waste", "#FFAB91"),
        ];

        Self {
            api_key_env: "ENTSOE_API_KEY".to_string(),
            api_url: BASE_URL.to_string(),
            output_dir: PathBuf::from("images"),
            countries: countries
                .iter()
                .map(|(key, name)| CountryEntry {
                    key: key.to_string(),
                    name: name.to_string(),
                })
                .collect(),
            categories: default_category_groups(),
            major_categories: vec![
                "Fossil Gas".to_string(),
                "Nuclear".to_string(),
                "Coal and Lignite".to_string(),
            ],
            colors: colors
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            lookback_days: 30,
            window_days: 10,
            timezone: chrono_tz::Europe::Brussels,
            low_generation_fraction: 0.2,
            write_html: true,
        }
    }
}

impl Default for PlantsConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::from("global_power_plant_database.csv"),
            output_dir: PathBuf::from("."),
            countries: ["Spain", "France", "Germany", "Italy"]
                .iter()
                .map(|c| c.to_string())
                .collect(),
            fuels: vec![
                FuelStyle {
                    fuel: "Solar".to_string(),
                    color: "orange".to_string(),
                    icon: "sun".to_string(),
                },
                FuelStyle {
                    fuel: "Wind".to_string(),
                    color: "lightblue".to_string(),
                    icon: "fan".to_string(),
                },
            ],
        }
    }
}

pub fn default_category_groups() -> Vec<CategoryGroup> {
    vec![
        CategoryGroup::new("Wind", &["Wind Offshore", "Wind Onshore"]),
        CategoryGroup::new(
            "Other Renewables",
            &["Other renewable", "Waste", "Geothermal", "Biomass"],
        ),
        CategoryGroup::new(
            "Hydro",
            &[
                "Hydro Run-of-river and poundage",
                "Hydro Water Reservoir",
                "Hydro Pumped Storage",
            ],
        ),
        CategoryGroup::new(
            "Coal and Lignite",
            &[
                "Fossil Brown coal/Lignite",
                "Fossil Coal-derived gas",
                "Fossil Hard coal",
            ],
        ),
    ]
}

impl Config {
    /// Load from a TOML file, or use defaults when no path is given
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => {
                let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;
                toml::from_str(&raw).map_err(|source| ConfigError::Parse {
                    path: path.to_path_buf(),
                    source,
                })?
            }
            None => Config::default(),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let generation = &self.generation;
        if generation.lookback_days <= 0 || generation.window_days <= 0 {
            return Err(ConfigError::Invalid(
                "lookback_days and window_days must be positive".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&generation.low_generation_fraction) {
            return Err(ConfigError::Invalid(format!(
                "low_generation_fraction must be within [0, 1], got {}",
                generation.low_generation_fraction
            )));
        }
        generation.category_mapping()?;

        Ok(())
    }
}

impl GenerationConfig {
    pub fn category_mapping(&self) -> Result<CategoryMapping, MappingError> {
        CategoryMapping::new(self.categories.clone())
    }
}

impl PlantsConfig {
    pub fn fuel_names(&self) -> Vec<&str> {
        self.fuels.iter().map(|f| f.fuel.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_without_file_uses_defaults() {
        let config = Config::load(None).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.generation.countries.len(), 4);
        assert_eq!(config.generation.timezone, chrono_tz::Europe::Brussels);
        assert_eq!(config.plants.fuel_names(), vec!["Solar", "Wind"]);
    }

    #[test]
    fn test_empty_toml_matches_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[generation]
window_days = 3
timezone = "Europe/Madrid"
countries = [{{ key = "NL", name = "Netherlands" }}]

[plants]
countries = ["Netherlands"]
"#
        )
        .unwrap();

        let config = Config::load(Some(file.path())).unwrap();

        assert_eq!(config.generation.window_days, 3);
        assert_eq!(config.generation.lookback_days, 30);
        assert_eq!(config.generation.timezone, chrono_tz::Europe::Madrid);
        assert_eq!(config.generation.countries[0].key, "NL");
        assert_eq!(config.plants.countries, vec!["Netherlands"]);
        assert_eq!(config.plants.fuels.len(), 2);
    }

    #[test]
    fn test_load_rejects_ambiguous_mapping() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[[generation.categories]]
name = "Wind"
members = ["Wind Onshore"]

[[generation.categories]]
name = "Onshore"
members = ["Wind Onshore"]
"#
        )
        .unwrap();

        assert!(matches!(
            Config::load(Some(file.path())),
            Err(ConfigError::Mapping(_))
        ));
    }

    #[test]
    fn test_load_rejects_unknown_timezone() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[generation]\ntimezone = \"Europe/Atlantis\"").unwrap();

        assert!(matches!(
            Config::load(Some(file.path())),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_load_missing_file() {
        assert!(matches!(
            Config::load(Some(Path::new("does/not/exist.toml"))),
            Err(ConfigError::Read { .. })
        ));
    }
}
