use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, TimeZone, Utc};
use chrono_tz::Tz;
use plotly::common::Mode;
use plotly::layout::Axis;
use plotly::{Layout, Plot, Scatter};
use plotters::prelude::*;
use thiserror::Error;

use super::series::AggregatedSeries;

const CHART_SIZE: (u32, u32) = (1500, 800);

/// Used for categories without a configured colour
const FALLBACK_PALETTE: &[RGBColor] = &[
    RGBColor(31, 119, 180),
    RGBColor(255, 127, 14),
    RGBColor(44, 160, 44),
    RGBColor(214, 39, 40),
    RGBColor(148, 103, 189),
    RGBColor(140, 86, 75),
    RGBColor(227, 119, 194),
    RGBColor(127, 127, 127),
    RGBColor(188, 189, 34),
    RGBColor(23, 190, 207),
];

#[derive(Error, Debug)]
pub enum ChartError {
    #[error("nothing to plot")]
    Empty,
    #[error("failed to render chart {path}: {message}")]
    Render { path: PathBuf, message: String },
    #[error("failed to write chart {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// File name stem for a country, e.g. "Germany/Luxembourg" -> "germany_luxembourg"
pub fn country_slug(country_name: &str) -> String {
    country_name.to_lowercase().replace(['/', ' '], "_")
}

/// Parse `#RRGGBB`
pub fn parse_hex_color(hex: &str) -> Option<RGBColor> {
    let hex = hex.strip_prefix('#')?;
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    Some(RGBColor(channel(0)?, channel(2)?, channel(4)?))
}

fn category_colors(series: &AggregatedSeries, colors: &BTreeMap<String, String>) -> Vec<RGBColor> {
    let mut fallback = FALLBACK_PALETTE.iter().cycle();
    series
        .labels()
        .map(|label| {
            colors
                .get(label)
                .and_then(|hex| parse_hex_color(hex))
                .unwrap_or_else(|| *fallback.next().unwrap_or(&BLACK))
        })
        .collect()
}

fn chart_title(series: &AggregatedSeries, country_name: &str, tz: Tz) -> Result<String, ChartError> {
    let (Some(first), Some(last)) = (series.first_timestamp(), series.last_timestamp()) else {
        return Err(ChartError::Empty);
    };
    Ok(format!(
        "{} Power Generation Mix\n{} to {}",
        country_name,
        first.with_timezone(&tz).format("%Y-%m-%d"),
        last.with_timezone(&tz).format("%Y-%m-%d")
    ))
}

/// Local midnights in `tz` strictly inside `(first, last]`
fn day_boundaries(first: DateTime<Utc>, last: DateTime<Utc>, tz: Tz) -> Vec<DateTime<Utc>> {
    let mut boundaries = Vec::new();
    let mut day = first.with_timezone(&tz).date_naive();
    while let Some(next) = day.succ_opt() {
        day = next;
        let Some(midnight) = day
            .and_hms_opt(0, 0, 0)
            .and_then(|m| tz.from_local_datetime(&m).earliest())
        else {
            continue;
        };
        let midnight = midnight.with_timezone(&Utc);
        if midnight > last {
            break;
        }
        boundaries.push(midnight);
    }
    boundaries
}

/// Render a stacked area chart of every category to `<slug>_generation.png` in `output_dir`
pub fn render_png(
    series: &AggregatedSeries,
    country_name: &str,
    colors: &BTreeMap<String, String>,
    tz: Tz,
    output_dir: &Path,
) -> Result<PathBuf, ChartError> {
    let title = chart_title(series, country_name, tz)?;
    let path = output_dir.join(format!("{}_generation.png", country_slug(country_name)));

    draw_png(series, &title, &category_colors(series, colors), tz, &path).map_err(|message| {
        ChartError::Render {
            path: path.clone(),
            message,
        }
    })?;

    Ok(path)
}

fn draw_png(
    series: &AggregatedSeries,
    title: &str,
    colors: &[RGBColor],
    tz: Tz,
    path: &Path,
) -> Result<(), String> {
    let index = series.index();
    let first = index[0];
    // a single sample still needs a non-empty x range
    let last = index[index.len() - 1].max(first + Duration::hours(1));

    // running totals, bottom layer first
    let mut stacked: Vec<Vec<f64>> = Vec::with_capacity(series.columns().len());
    for column in series.columns() {
        let layer = match stacked.last() {
            Some(below) => below.iter().zip(&column.values).map(|(b, v)| b + v).collect(),
            None => column.values.clone(),
        };
        stacked.push(layer);
    }
    let y_max = stacked
        .last()
        .map(|top| top.iter().copied().fold(0.0, f64::max))
        .unwrap_or(0.0)
        .max(1.0)
        * 1.05;

    let root = BitMapBackend::new(path, CHART_SIZE).into_drawing_area();
    root.fill(&WHITE).map_err(|e| e.to_string())?;

    // one caption row per title line
    let mut plot_area = root.clone();
    for line in title.lines() {
        plot_area = plot_area
            .titled(line, ("sans-serif", 26).into_font())
            .map_err(|e| e.to_string())?;
    }

    let mut chart = ChartBuilder::on(&plot_area)
        .margin(15)
        .x_label_area_size(50)
        .y_label_area_size(80)
        .build_cartesian_2d(first..last, 0.0..y_max)
        .map_err(|e| e.to_string())?;

    chart
        .configure_mesh()
        .x_desc("Time")
        .y_desc("Power [MW]")
        .x_label_formatter(&|t| t.with_timezone(&tz).format("%m-%d %H:%M").to_string())
        .draw()
        .map_err(|e| e.to_string())?;

    // top layer first so lower layers paint over it
    for ((column, layer), color) in series.columns().iter().zip(&stacked).zip(colors).rev() {
        let color = *color;
        chart
            .draw_series(AreaSeries::new(
                index.iter().copied().zip(layer.iter().copied()),
                0.0,
                color.mix(0.9),
            ))
            .map_err(|e| e.to_string())?
            .label(column.label.as_str())
            .legend(move |(x, y)| Rectangle::new([(x, y - 5), (x + 10, y + 5)], color.filled()));
    }

    // day boundaries
    chart
        .draw_series(day_boundaries(first, last, tz).into_iter().map(|day| {
            PathElement::new(
                vec![(day, 0.0), (day, y_max)],
                RGBColor(128, 128, 128).mix(0.5).stroke_width(1),
            )
        }))
        .map_err(|e| e.to_string())?;

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperRight)
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()
        .map_err(|e| e.to_string())?;

    root.present().map_err(|e| e.to_string())
}

/// Write an interactive stacked chart to `<slug>_generation.html` in `output_dir`
pub fn render_html(
    series: &AggregatedSeries,
    country_name: &str,
    colors: &BTreeMap<String, String>,
    tz: Tz,
    output_dir: &Path,
) -> Result<PathBuf, ChartError> {
    let title = chart_title(series, country_name, tz)?.replace('\n', "<br>");
    let path = output_dir.join(format!("{}_generation.html", country_slug(country_name)));

    let timestamps: Vec<String> = series
        .index()
        .iter()
        .map(|t| t.with_timezone(&tz).format("%Y-%m-%d %H:%M").to_string())
        .collect();

    let mut plot = Plot::new();
    for (column, color) in series.columns().iter().zip(category_colors(series, colors)) {
        let trace = Scatter::new(timestamps.clone(), column.values.clone())
            .name(column.label.as_str())
            .mode(Mode::Lines)
            .stack_group("generation")
            .line(plotly::common::Line::new().color(plotly::color::Rgb::new(
                color.0, color.1, color.2,
            )));
        plot.add_trace(trace);
    }
    plot.set_layout(
        Layout::new()
            .title(title.as_str())
            .x_axis(Axis::new().title("Time"))
            .y_axis(Axis::new().title("Power [MW]")),
    );

    fs::write(&path, plot.to_html()).map_err(|source| ChartError::Write {
        path: path.clone(),
        source,
    })?;

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::series::tests::table;
    use crate::generation::series::TimeTable;
    use chrono_tz::Europe::Brussels;
    use tempfile::tempdir;

    #[test]
    fn test_country_slug() {
        assert_eq!(country_slug("Germany/Luxembourg"), "germany_luxembourg");
        assert_eq!(country_slug("France"), "france");
    }

    #[test]
    fn test_parse_hex_color() {
        assert_eq!(parse_hex_color("#7E57C2"), Some(RGBColor(0x7E, 0x57, 0xC2)));
        assert_eq!(parse_hex_color("7E57C2"), None);
        assert_eq!(parse_hex_color("#7E57"), None);
        assert_eq!(parse_hex_color("#GG0000"), None);
    }

    #[test]
    fn test_unmapped_categories_use_fallback_palette() {
        let series = table(&[("Nuclear", &[1.0]), ("Marine", &[1.0]), ("Other", &[1.0])]);
        let colors = BTreeMap::from([("Nuclear".to_string(), "#7E57C2".to_string())]);

        assert_eq!(
            category_colors(&series, &colors),
            vec![RGBColor(0x7E, 0x57, 0xC2), FALLBACK_PALETTE[0], FALLBACK_PALETTE[1]]
        );
    }

    #[test]
    fn test_day_boundaries_follow_local_midnight() {
        let first = Utc.with_ymd_and_hms(2024, 3, 1, 5, 0, 0).unwrap();
        let last = Utc.with_ymd_and_hms(2024, 3, 3, 0, 0, 0).unwrap();

        assert_eq!(
            day_boundaries(first, last, Tz::UTC),
            vec![
                Utc.with_ymd_and_hms(2024, 3, 2, 0, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2024, 3, 3, 0, 0, 0).unwrap(),
            ]
        );
        // CET is UTC+1 in March
        assert_eq!(
            day_boundaries(first, last, Brussels),
            vec![
                Utc.with_ymd_and_hms(2024, 3, 1, 23, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2024, 3, 2, 23, 0, 0).unwrap(),
            ]
        );
    }

    #[test]
    fn test_day_boundaries_across_dst_change() {
        // clocks go forward on 2024-03-31, CEST is UTC+2 from then on
        let first = Utc.with_ymd_and_hms(2024, 3, 30, 12, 0, 0).unwrap();
        let last = Utc.with_ymd_and_hms(2024, 4, 1, 12, 0, 0).unwrap();

        assert_eq!(
            day_boundaries(first, last, Brussels),
            vec![
                Utc.with_ymd_and_hms(2024, 3, 30, 23, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2024, 3, 31, 22, 0, 0).unwrap(),
            ]
        );
    }

    #[test]
    fn test_chart_title_uses_local_dates() {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 23, 0, 0).unwrap();
        let index = (0..2).map(|i| start + Duration::hours(i)).collect();
        let mut series = TimeTable::new(index).unwrap();
        series.push_column("Nuclear", vec![1.0, 1.0]).unwrap();

        assert_eq!(
            chart_title(&series, "France", Brussels).unwrap(),
            "France Power Generation Mix\n2024-03-02 to 2024-03-02"
        );
    }

    #[test]
    fn test_render_png_writes_file() {
        let dir = tempdir().unwrap();
        let series = table(&[("Nuclear", &[100.0, 110.0, 90.0]), ("Solar", &[0.0, 15.0, 5.0])]);

        let path = render_png(&series, "France", &BTreeMap::new(), Brussels, dir.path()).unwrap();

        assert_eq!(path, dir.path().join("france_generation.png"));
        assert!(fs::metadata(&path).unwrap().len() > 0);
    }

    #[test]
    fn test_render_html_writes_file() {
        let dir = tempdir().unwrap();
        let series = table(&[("Nuclear", &[100.0, 110.0]), ("Wind", &[15.0, 20.0])]);

        let path = render_html(&series, "Germany/Luxembourg", &BTreeMap::new(), Brussels, dir.path()).unwrap();

        assert_eq!(path, dir.path().join("germany_luxembourg_generation.html"));
        let html = fs::read_to_string(path).unwrap();
        assert!(html.contains("Power Generation Mix"));
        assert!(html.contains("Nuclear"));
    }

    #[test]
    fn test_empty_series_is_not_rendered() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            render_png(&TimeTable::default(), "France", &BTreeMap::new(), Brussels, dir.path()),
            Err(ChartError::Empty)
        ));
    }
}
