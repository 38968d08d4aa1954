pub(crate) mod areas;
pub(crate) mod availability;
pub(crate) mod psr;

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::entsoe::areas::Area;
use crate::generation::series::{GenerationSeries, SeriesError, TimeTable};

pub const BASE_URL: &str = "https://web-api.tp.entsoe.eu/api";

/// Acknowledgement reason code for an empty result
const NO_MATCHING_DATA: &str = "999";

#[derive(Error, Debug)]
pub enum EntsoeError {
    #[error("HTTP request failed: {0}")]
    Request(reqwest::Error),
    #[error("XML parsing failed: {0}")]
    XmlParsing(#[from] quick_xml::DeError),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Request rejected: {0}")]
    Rejected(String),
    #[error("No matching data found")]
    NoMatchingData,
    #[error("Invalid resolution format: {0}")]
    InvalidResolution(String),
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),
    #[error("Inconsistent series: {0}")]
    Series(#[from] SeriesError),
}

// The request URL carries the security token, so it never goes into an error
impl From<reqwest::Error> for EntsoeError {
    fn from(e: reqwest::Error) -> Self {
        Self::Request(e.without_url())
    }
}

// Main response structure
#[derive(Debug, Deserialize)]
#[serde(rename = "GL_MarketDocument")]
pub struct GlMarketDocument {
    #[serde(rename = "mRID")]
    pub mrid: Option<String>,
    #[serde(rename = "type")]
    pub doc_type: Option<String>,
    #[serde(rename = "process.processType")]
    pub process_type: Option<String>,
    #[serde(rename = "time_Period.timeInterval")]
    pub time_period_interval: Option<TimeInterval>,
    #[serde(rename = "TimeSeries", default)]
    pub time_series: Vec<TimeSeries>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TimeInterval {
    pub start: String,
    pub end: String,
}

#[derive(Debug, Deserialize)]
pub struct TimeSeries {
    #[serde(rename = "mRID")]
    pub mrid: Option<String>,
    #[serde(rename = "businessType")]
    pub business_type: Option<String>,
    #[serde(rename = "outBiddingZone_Domain.mRID")]
    pub out_bidding_zone: Option<AreaId>,
    #[serde(rename = "inBiddingZone_Domain.mRID")]
    pub in_bidding_zone: Option<AreaId>,
    #[serde(rename = "quantity_Measure_Unit.name")]
    pub quantity_measure_unit: Option<String>,
    #[serde(rename = "curveType")]
    pub curve_type: Option<String>,
    #[serde(rename = "MktPSRType")]
    pub psr_type: Option<MktPsrType>,
    #[serde(rename = "Period", default)]
    pub periods: Vec<Period>,
}

#[derive(Debug, Deserialize)]
pub struct AreaId {
    #[serde(rename = "$value")]
    pub value: String,
    #[serde(rename = "@codingScheme")]
    pub coding_scheme: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MktPsrType {
    #[serde(rename = "psrType")]
    pub psr_type: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Period {
    #[serde(rename = "timeInterval")]
    pub time_interval: TimeInterval,
    pub resolution: String,
    #[serde(rename = "Point", default)]
    pub points: Vec<Point>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Point {
    pub position: u32,
    pub quantity: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename = "Acknowledgement_MarketDocument")]
struct AcknowledgementDocument {
    #[serde(rename = "Reason", default)]
    reasons: Vec<Reason>,
}

#[derive(Debug, Deserialize)]
struct Reason {
    code: String,
    text: Option<String>,
}

/// Second column level of a generation query: whether a series is production or
/// consumption (e.g. pumped storage pumping)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProductionFlag {
    ActualAggregated,
    ActualConsumption,
}

impl fmt::Display for ProductionFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ActualAggregated => write!(f, "Actual Aggregated"),
            Self::ActualConsumption => write!(f, "Actual Consumption"),
        }
    }
}

/// A point expanded to the interval `[start, start + resolution)` it covers
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub quantity: f64,
}

/// Anything that can answer "actual generation per production type" queries
#[allow(async_fn_in_trait)]
pub trait GenerationSource {
    async fn query_generation(
        &self,
        area: &Area,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<GenerationSeries, EntsoeError>;
}

pub struct EntsoeClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl EntsoeClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Fetch actual generation per production type (A75, realised A16)
    /// Example: France domain "10YFR-RTE------C"
    pub async fn fetch_actual_generation(
        &self,
        in_domain: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<GlMarketDocument, EntsoeError> {
        let (period_start, period_end) = format_period(start, end);
        let url = format!(
            "{}?securityToken={}&documentType=A75&processType=A16&in_Domain={}&periodStart={}&periodEnd={}",
            self.base_url, self.api_key, in_domain, period_start, period_end
        );
        debug!(in_domain, %period_start, %period_end, "querying actual generation");

        self.fetch_and_parse(&url).await
    }

    async fn fetch_and_parse(&self, url: &str) -> Result<GlMarketDocument, EntsoeError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        let xml = response.text().await?;

        // Errors and empty results come back as acknowledgement documents
        if xml.contains("Acknowledgement_MarketDocument") {
            return Err(acknowledgement_error(&xml));
        }
        if !status.is_success() {
            return Err(EntsoeError::InvalidResponse(format!("HTTP {status}")));
        }

        let document: GlMarketDocument = quick_xml::de::from_str(&xml).map_err(|e| {
            debug!("Failed to parse XML: {}", e);
            debug!("XML content: {}", xml);
            e
        })?;

        Ok(document)
    }
}

impl GenerationSource for EntsoeClient {
    async fn query_generation(
        &self,
        area: &Area,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<GenerationSeries, EntsoeError> {
        match self.fetch_actual_generation(area.code, start, end).await {
            Ok(document) => document.generation_series(),
            Err(EntsoeError::NoMatchingData) => Ok(GenerationSeries::default()),
            Err(e) => Err(e),
        }
    }
}

fn acknowledgement_error(xml: &str) -> EntsoeError {
    let Ok(ack) = quick_xml::de::from_str::<AcknowledgementDocument>(xml) else {
        return EntsoeError::InvalidResponse(xml.to_string());
    };

    if ack.reasons.iter().any(|r| r.code == NO_MATCHING_DATA) {
        return EntsoeError::NoMatchingData;
    }

    let reasons: Vec<String> = ack
        .reasons
        .iter()
        .map(|r| match &r.text {
            Some(text) => format!("{} ({})", text, r.code),
            None => r.code.clone(),
        })
        .collect();
    EntsoeError::Rejected(reasons.join("; "))
}

/// Format period times for the ENTSO-E API (YYYYMMDDHHmm, UTC)
pub fn format_period(start: DateTime<Utc>, end: DateTime<Utc>) -> (String, String) {
    (
        start.format("%Y%m%d%H%M").to_string(),
        end.format("%Y%m%d%H%M").to_string(),
    )
}

/// Parse ISO 8601 duration format (PT15M, PT30M, PT60M, PT1H)
fn parse_resolution(resolution: &str) -> Result<Duration, EntsoeError> {
    let invalid = || EntsoeError::InvalidResolution(resolution.to_string());

    let body = resolution.strip_prefix("PT").ok_or_else(invalid)?;
    let unit_at = body.len() - body.chars().last().map_or(0, char::len_utf8);
    let (amount, unit) = body.split_at(unit_at);
    let amount: i64 = amount.parse().map_err(|_| invalid())?;
    if amount <= 0 {
        return Err(invalid());
    }

    match unit {
        "M" => Ok(Duration::minutes(amount)),
        "H" => Ok(Duration::hours(amount)),
        _ => Err(invalid()),
    }
}

fn parse_timestamp(timestamp: &str) -> Result<DateTime<Utc>, EntsoeError> {
    let normalized = if timestamp.len() == 17 && timestamp.ends_with('Z') {
        let mut s = timestamp.to_string();
        s.insert_str(16, ":00"); // add seconds
        s
    } else {
        timestamp.to_string()
    };

    DateTime::parse_from_rfc3339(&normalized)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| EntsoeError::InvalidTimestamp(timestamp.to_string()))
}

impl Period {
    /// Expand the period into one block per resolution step.
    ///
    /// With curve type A03 repeated values are omitted from the document, so every
    /// missing position takes the value of the last position before it.
    pub fn blocks(&self, curve_type: Option<&str>) -> Result<Vec<Block>, EntsoeError> {
        let start_time = parse_timestamp(&self.time_interval.start)?;
        let resolution = parse_resolution(&self.resolution)?;

        let mut points = self.points.clone();
        points.sort_by_key(|p| p.position);

        let positioned: Vec<(u32, f64)> = if curve_type == Some("A03") {
            let end_time = parse_timestamp(&self.time_interval.end)?;
            let span = (end_time - start_time).num_seconds() / resolution.num_seconds();
            let steps = u32::try_from(span).map_err(|_| {
                EntsoeError::InvalidResponse(format!(
                    "period ends before it starts: {} to {}",
                    self.time_interval.start, self.time_interval.end
                ))
            })?;
            let mut filled = Vec::with_capacity(steps as usize);
            let mut current = points.iter().peekable();
            let mut last = None;
            for position in 1..=steps {
                while let Some(point) = current.next_if(|p| p.position <= position) {
                    last = Some(point.quantity);
                }
                if let Some(quantity) = last {
                    filled.push((position, quantity));
                }
            }
            filled
        } else {
            points.iter().map(|p| (p.position, p.quantity)).collect()
        };

        positioned
            .into_iter()
            .map(|(position, quantity)| {
                // Position starts at 1, so subtract 1 to get offset
                let start = i32::try_from(position)
                    .ok()
                    .and_then(|p| resolution.checked_mul(p - 1))
                    .and_then(|offset| start_time.checked_add_signed(offset));
                let end = start.and_then(|s| s.checked_add_signed(resolution));
                match (start, end) {
                    (Some(start), Some(end)) => Ok(Block {
                        start,
                        end,
                        quantity,
                    }),
                    _ => Err(EntsoeError::InvalidResponse(format!(
                        "point position {position} out of range"
                    ))),
                }
            })
            .collect()
    }
}

impl TimeSeries {
    pub fn flag(&self) -> ProductionFlag {
        if self.out_bidding_zone.is_some() {
            ProductionFlag::ActualConsumption
        } else {
            ProductionFlag::ActualAggregated
        }
    }

    /// Production type label, e.g. "Fossil Gas"
    pub fn label(&self) -> String {
        match &self.psr_type {
            Some(psr) => psr::label(&psr.psr_type)
                .map(str::to_string)
                .unwrap_or_else(|| psr.psr_type.clone()),
            None => "Unknown".to_string(),
        }
    }
}

impl GlMarketDocument {
    /// Build the "Actual Aggregated" generation table, one column per production type.
    ///
    /// The index is the union of all block starts. A cell takes the value of the
    /// block covering its timestamp, or zero when none does, so production types
    /// reported at coarser resolutions are held over their whole interval.
    pub fn generation_series(&self) -> Result<GenerationSeries, EntsoeError> {
        let mut labels: Vec<String> = Vec::new();
        let mut blocks: HashMap<String, Vec<Block>> = HashMap::new();

        for series in &self.time_series {
            let flag = series.flag();
            if flag != ProductionFlag::ActualAggregated {
                debug!("Dropping {} series for {}", flag, series.label());
                continue;
            }
            let label = series.label();
            if !blocks.contains_key(&label) {
                labels.push(label.clone());
            }
            let entry = blocks.entry(label).or_default();
            for period in &series.periods {
                entry.extend(period.blocks(series.curve_type.as_deref())?);
            }
        }

        let index: BTreeSet<DateTime<Utc>> = blocks
            .values()
            .flatten()
            .map(|block| block.start)
            .collect();
        let index: Vec<_> = index.into_iter().collect();

        let mut table = TimeTable::new(index.clone())?;
        for label in labels {
            let mut column_blocks = blocks.remove(&label).unwrap_or_default();
            column_blocks.sort_by_key(|b| b.start);
            let values = index
                .iter()
                .map(|t| covering_value(&column_blocks, *t))
                .collect();
            table.push_column(label, values)?;
        }

        Ok(table)
    }
}

/// Value of the block covering `timestamp`; `blocks` must be sorted by start
fn covering_value(blocks: &[Block], timestamp: DateTime<Utc>) -> f64 {
    let after = blocks.partition_point(|b| b.start <= timestamp);
    match after.checked_sub(1).map(|i| &blocks[i]) {
        Some(block) if timestamp < block.end => block.quantity,
        _ => 0.0,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};
    use rstest::rstest;

    pub(crate) const GENERATION_XML: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<GL_MarketDocument xmlns="urn:iec62325.351:tc57wg16:451-6:generationloaddocument:3:0">
    <mRID>test123</mRID>
    <revisionNumber>1</revisionNumber>
    <type>A75</type>
    <process.processType>A16</process.processType>
    <createdDateTime>2024-03-05T10:00:00Z</createdDateTime>
    <time_Period.timeInterval>
        <start>2024-03-01T00:00Z</start>
        <end>2024-03-01T02:00Z</end>
    </time_Period.timeInterval>
    <TimeSeries>
        <mRID>1</mRID>
        <businessType>A01</businessType>
        <objectAggregation>A08</objectAggregation>
        <inBiddingZone_Domain.mRID codingScheme="A01">10YFR-RTE------C</inBiddingZone_Domain.mRID>
        <quantity_Measure_Unit.name>MAW</quantity_Measure_Unit.name>
        <curveType>A01</curveType>
        <MktPSRType>
            <psrType>B14</psrType>
        </MktPSRType>
        <Period>
            <timeInterval>
                <start>2024-03-01T00:00Z</start>
                <end>2024-03-01T02:00Z</end>
            </timeInterval>
            <resolution>PT60M</resolution>
            <Point>
                <position>1</position>
                <quantity>40000</quantity>
            </Point>
            <Point>
                <position>2</position>
                <quantity>41000</quantity>
            </Point>
        </Period>
    </TimeSeries>
    <TimeSeries>
        <mRID>2</mRID>
        <businessType>A01</businessType>
        <objectAggregation>A08</objectAggregation>
        <inBiddingZone_Domain.mRID codingScheme="A01">10YFR-RTE------C</inBiddingZone_Domain.mRID>
        <quantity_Measure_Unit.name>MAW</quantity_Measure_Unit.name>
        <curveType>A01</curveType>
        <MktPSRType>
            <psrType>B19</psrType>
        </MktPSRType>
        <Period>
            <timeInterval>
                <start>2024-03-01T00:00Z</start>
                <end>2024-03-01T01:00Z</end>
            </timeInterval>
            <resolution>PT30M</resolution>
            <Point>
                <position>1</position>
                <quantity>5000</quantity>
            </Point>
            <Point>
                <position>2</position>
                <quantity>5200</quantity>
            </Point>
        </Period>
    </TimeSeries>
    <TimeSeries>
        <mRID>3</mRID>
        <businessType>A04</businessType>
        <objectAggregation>A08</objectAggregation>
        <outBiddingZone_Domain.mRID codingScheme="A01">10YFR-RTE------C</outBiddingZone_Domain.mRID>
        <quantity_Measure_Unit.name>MAW</quantity_Measure_Unit.name>
        <curveType>A01</curveType>
        <MktPSRType>
            <psrType>B10</psrType>
        </MktPSRType>
        <Period>
            <timeInterval>
                <start>2024-03-01T00:00Z</start>
                <end>2024-03-01T01:00Z</end>
            </timeInterval>
            <resolution>PT60M</resolution>
            <Point>
                <position>1</position>
                <quantity>900</quantity>
            </Point>
        </Period>
    </TimeSeries>
</GL_MarketDocument>"#;

    #[rstest]
    #[case("PT15M", Duration::minutes(15))]
    #[case("PT30M", Duration::minutes(30))]
    #[case("PT60M", Duration::minutes(60))]
    #[case("PT1H", Duration::hours(1))]
    fn test_parse_resolution(#[case] resolution: &str, #[case] expected: Duration) {
        assert_eq!(parse_resolution(resolution).unwrap(), expected);
    }

    #[rstest]
    #[case("invalid")]
    #[case("P1D")]
    #[case("PT")]
    #[case("PTxM")]
    #[case("PT0M")]
    #[case("PT-15M")]
    fn test_parse_resolution_invalid(#[case] resolution: &str) {
        assert!(parse_resolution(resolution).is_err());
    }

    #[test]
    fn test_parse_timestamp() {
        let ts = parse_timestamp("2023-08-14T22:00Z").unwrap();
        assert_eq!(ts.year(), 2023);
        assert_eq!(ts.month(), 8);
        assert_eq!(ts.day(), 14);
        assert_eq!(ts.hour(), 22);
    }

    #[test]
    fn test_generation_series_from_document() {
        let doc: GlMarketDocument = quick_xml::de::from_str(GENERATION_XML).unwrap();
        let series = doc.generation_series().unwrap();

        // consumption series is dropped
        assert_eq!(series.labels().collect::<Vec<_>>(), vec!["Nuclear", "Wind Onshore"]);

        let index: Vec<String> = series.index().iter().map(|t| t.to_rfc3339()).collect();
        assert_eq!(
            index,
            vec![
                "2024-03-01T00:00:00+00:00",
                "2024-03-01T00:30:00+00:00",
                "2024-03-01T01:00:00+00:00",
            ]
        );

        // hourly nuclear is held over the half hour
        assert_eq!(
            series.column("Nuclear").unwrap().values,
            vec![40000.0, 40000.0, 41000.0]
        );
        // wind data ends at 01:00
        assert_eq!(
            series.column("Wind Onshore").unwrap().values,
            vec![5000.0, 5200.0, 0.0]
        );
    }

    #[test]
    fn test_a03_curve_forward_fills_omitted_positions() {
        let period = Period {
            time_interval: TimeInterval {
                start: "2024-03-01T00:00Z".to_string(),
                end: "2024-03-01T01:00Z".to_string(),
            },
            resolution: "PT15M".to_string(),
            points: vec![
                Point {
                    position: 1,
                    quantity: 10.0,
                },
                Point {
                    position: 3,
                    quantity: 30.0,
                },
            ],
        };

        let quantities: Vec<f64> = period
            .blocks(Some("A03"))
            .unwrap()
            .iter()
            .map(|b| b.quantity)
            .collect();
        assert_eq!(quantities, vec![10.0, 10.0, 30.0, 30.0]);

        assert_eq!(period.blocks(Some("A01")).unwrap().len(), 2);
    }

    #[test]
    fn test_malformed_period_is_an_error() {
        let period = |resolution: &str, end: &str| Period {
            time_interval: TimeInterval {
                start: "2024-03-01T00:00Z".to_string(),
                end: end.to_string(),
            },
            resolution: resolution.to_string(),
            points: vec![Point {
                position: 1,
                quantity: 10.0,
            }],
        };

        assert!(matches!(
            period("PT0M", "2024-03-01T01:00Z").blocks(Some("A03")),
            Err(EntsoeError::InvalidResolution(_))
        ));
        assert!(matches!(
            period("PT-15M", "2024-03-01T01:00Z").blocks(Some("A03")),
            Err(EntsoeError::InvalidResolution(_))
        ));
        assert!(matches!(
            period("PT15M", "2024-02-29T23:00Z").blocks(Some("A03")),
            Err(EntsoeError::InvalidResponse(_))
        ));

        let mut far = period("PT15M", "2024-03-01T01:00Z");
        far.points[0].position = u32::MAX;
        assert!(matches!(far.blocks(None), Err(EntsoeError::InvalidResponse(_))));
    }

    #[tokio::test]
    async fn test_request_error_does_not_expose_token() {
        let client = EntsoeClient::new("SECRET_TOKEN_123").with_base_url("http://127.0.0.1:1/api");
        let start = parse_timestamp("2024-03-01T00:00Z").unwrap();
        let end = parse_timestamp("2024-03-02T00:00Z").unwrap();

        let err = client
            .fetch_actual_generation("10YFR-RTE------C", start, end)
            .await
            .unwrap_err();

        assert!(matches!(err, EntsoeError::Request(_)));
        assert!(!err.to_string().contains("SECRET_TOKEN_123"));
        assert!(!format!("{err:?}").contains("SECRET_TOKEN_123"));
    }

    #[test]
    fn test_acknowledgement_no_data() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<Acknowledgement_MarketDocument xmlns="urn:iec62325.351:tc57wg16:451-1:acknowledgementdocument:7:0">
    <mRID>abc</mRID>
    <createdDateTime>2024-03-05T10:00:00Z</createdDateTime>
    <Reason>
        <code>999</code>
        <text>No matching data found for Data item ACTUAL_GENERATION_PER_PRODUCTION_TYPE</text>
    </Reason>
</Acknowledgement_MarketDocument>"#;

        assert!(matches!(acknowledgement_error(xml), EntsoeError::NoMatchingData));
    }

    #[test]
    fn test_acknowledgement_rejection() {
        let xml = r#"<Acknowledgement_MarketDocument>
    <Reason>
        <code>A01</code>
        <text>Unauthorized</text>
    </Reason>
</Acknowledgement_MarketDocument>"#;

        match acknowledgement_error(xml) {
            EntsoeError::Rejected(message) => assert_eq!(message, "Unauthorized (A01)"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_production_flag_labels() {
        assert_eq!(ProductionFlag::ActualAggregated.to_string(), "Actual Aggregated");
        assert_eq!(ProductionFlag::ActualConsumption.to_string(), "Actual Consumption");
    }

    #[test]
    fn test_format_period() {
        let start = parse_timestamp("2024-03-01T00:00Z").unwrap();
        let end = parse_timestamp("2024-03-11T01:00Z").unwrap();
        assert_eq!(
            format_period(start, end),
            ("202403010000".to_string(), "202403110100".to_string())
        );
    }
}
