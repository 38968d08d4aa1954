//! Generation mix reporting: category aggregation, shares and statistics, quality
//! checks and chart output.
pub(crate) mod category;
pub(crate) mod chart;
pub(crate) mod quality;
pub(crate) mod report;
pub(crate) mod series;
pub(crate) mod stats;
