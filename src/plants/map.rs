use std::fs;
use std::path::{Path, PathBuf};

use askama::Template;
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use super::PlantRecord;
use crate::config::{FuelStyle, PlantsConfig};

pub const MAP_FILE_NAME: &str = "renewable_plants_map.html";

/// Centre of Western Europe
const MAP_CENTER: (f64, f64) = (47.0, 5.0);
const MAP_ZOOM: u8 = 5;

#[derive(Error, Debug)]
pub enum MapError {
    #[error("failed to encode marker data: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("failed to render map: {0}")]
    Render(#[from] askama::Error),
    #[error("failed to write map {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, Serialize)]
struct Marker<'a> {
    lat: f64,
    lon: f64,
    name: &'a str,
    country: &'a str,
    fuel: &'a str,
    capacity_mw: Option<f64>,
    commissioning_year: Option<i64>,
}

/// One marker cluster per country and fuel type
#[derive(Debug, Serialize)]
struct ClusterLayer<'a> {
    name: String,
    color: &'a str,
    icon: &'a str,
    markers: Vec<Marker<'a>>,
}

#[derive(Template)]
#[template(path = "plant_map.html")]
struct PlantMapTemplate<'a> {
    center_lat: f64,
    center_lon: f64,
    zoom: u8,
    layers_json: String,
    legend: &'a [FuelStyle],
}

fn cluster_layers<'a>(plants: &'a [PlantRecord], config: &'a PlantsConfig) -> Vec<ClusterLayer<'a>> {
    let mut layers = Vec::new();
    for country in &config.countries {
        for style in &config.fuels {
            let markers: Vec<Marker> = plants
                .iter()
                .filter(|p| &p.country_long == country && p.primary_fuel == style.fuel)
                .filter_map(|p| {
                    let (lat, lon) = p.coordinates()?;
                    Some(Marker {
                        lat,
                        lon,
                        name: &p.name,
                        country: &p.country_long,
                        fuel: &p.primary_fuel,
                        capacity_mw: p.capacity_mw.filter(|c| c.is_finite()),
                        commissioning_year: p
                            .commissioning_year
                            .filter(|y| y.is_finite())
                            .map(|y| y.trunc() as i64),
                    })
                })
                .collect();
            if markers.is_empty() {
                continue;
            }

            layers.push(ClusterLayer {
                name: format!("{} {} ({} plants)", country, style.fuel, markers.len()),
                color: &style.color,
                icon: &style.icon,
                markers,
            });
        }
    }
    layers
}

/// Render the interactive map of `plants` as a standalone HTML page
pub fn render_map(plants: &[PlantRecord], config: &PlantsConfig) -> Result<String, MapError> {
    let layers = cluster_layers(plants, config);
    // keep plant names from closing the surrounding script element
    let layers_json = serde_json::to_string(&layers)?.replace("</", "<\\/");

    let template = PlantMapTemplate {
        center_lat: MAP_CENTER.0,
        center_lon: MAP_CENTER.1,
        zoom: MAP_ZOOM,
        layers_json,
        legend: &config.fuels,
    };

    Ok(template.render()?)
}

/// Render and save the map as `renewable_plants_map.html` in `output_dir`
pub fn write_map(
    plants: &[PlantRecord],
    config: &PlantsConfig,
    output_dir: &Path,
) -> Result<PathBuf, MapError> {
    let html = render_map(plants, config)?;
    let path = output_dir.join(MAP_FILE_NAME);
    fs::write(&path, html).map_err(|source| MapError::Write {
        path: path.clone(),
        source,
    })?;

    info!("Map saved to {}", path.display());
    Ok(path)
}
