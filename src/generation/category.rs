use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::series::{AggregatedSeries, Column, GenerationSeries, TimeTable};

#[derive(Error, Debug, PartialEq)]
pub enum MappingError {
    #[error("raw label '{label}' is listed in both '{first}' and '{second}'")]
    AmbiguousLabel {
        label: String,
        first: String,
        second: String,
    },
}

/// A canonical category and the raw production-type labels that roll up into it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryGroup {
    pub name: String,
    pub members: Vec<String>,
}

impl CategoryGroup {
    pub fn new(name: &str, members: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            members: members.iter().map(|m| m.to_string()).collect(),
        }
    }
}

/// Ordered raw label to category lookup. Unlisted labels are their own category.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryMapping {
    groups: Vec<CategoryGroup>,
}

impl CategoryMapping {
    pub fn new(groups: Vec<CategoryGroup>) -> Result<Self, MappingError> {
        let mut owner: HashMap<&str, &str> = HashMap::new();
        for group in &groups {
            for member in &group.members {
                if let Some(first) = owner.insert(member, &group.name) {
                    return Err(MappingError::AmbiguousLabel {
                        label: member.clone(),
                        first: first.to_string(),
                        second: group.name.clone(),
                    });
                }
            }
        }

        Ok(Self { groups })
    }

    /// Canonical category for a raw label: the first group listing it, else the label itself
    pub fn category_for<'a>(&'a self, raw_label: &'a str) -> &'a str {
        self.groups
            .iter()
            .find(|g| g.members.iter().any(|m| m == raw_label))
            .map_or(raw_label, |g| g.name.as_str())
    }

    /// Sum raw columns into their canonical categories.
    ///
    /// Every raw column contributes to exactly one output column. Output columns
    /// appear in order of first contribution.
    pub fn aggregate(&self, series: &GenerationSeries) -> AggregatedSeries {
        let mut aggregated = TimeTable::with_index_of(series);
        let mut positions: HashMap<&str, usize> = HashMap::new();
        let rows = series.len();

        for raw in series.columns() {
            let category = self.category_for(&raw.label);
            let columns = aggregated.columns_mut();
            let position = *positions.entry(category).or_insert_with(|| {
                // categories start zero-filled before their first contribution
                columns.push(Column {
                    label: category.to_string(),
                    values: vec![0.0; rows],
                });
                columns.len() - 1
            });

            for (acc, value) in columns[position].values.iter_mut().zip(&raw.values) {
                *acc += value;
            }
        }

        aggregated
    }
}
