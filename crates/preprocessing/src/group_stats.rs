//! Row-wise statistics over named feature groups.
//!
//! Only meaningful for version 1 data, where feature names embed one of the
//! six attribute groups.

use blocks_core::stats::{mean, skewness, std_dev};
use blocks_core::{Dataset, Error, Processor, Result};

/// Attribute groups of version 1 data.
pub const GROUP_NAMES: [&str; 6] = [
    "intelligence",
    "wisdom",
    "charisma",
    "dexterity",
    "strength",
    "constitution",
];

/// Adds mean, standard deviation and skew of each feature group.
#[derive(Debug, Clone)]
pub struct GroupStatsPreProcessor {
    group_names: Vec<String>,
}

impl Default for GroupStatsPreProcessor {
    fn default() -> Self {
        Self {
            group_names: GROUP_NAMES.iter().map(|g| g.to_string()).collect(),
        }
    }
}

impl GroupStatsPreProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    fn check_data_validity(&self, dataset: &Dataset) -> Result<()> {
        match dataset.meta().version {
            None => Err(Error::precondition(format!(
                "Version should be specified for '{}'. This processor only works on version 1 data.",
                self.name()
            ))),
            Some(1) => Ok(()),
            Some(v) => Err(Error::precondition(format!(
                "'{}' only works on version 1 data. Got version: '{v}'.",
                self.name()
            ))),
        }
    }
}

impl Processor for GroupStatsPreProcessor {
    fn name(&self) -> &str {
        "GroupStatsPreProcessor"
    }

    fn transform(&self, dataset: &Dataset) -> Result<Dataset> {
        self.check_data_validity(dataset)?;

        let mut output = dataset.clone();
        let mut row = Vec::new();
        for group in &self.group_names {
            let cols = output
                .column_names()
                .iter()
                .filter(|c| c.contains(group.as_str()))
                .map(|c| output.float_column(c))
                .collect::<Result<Vec<_>>>()?;

            let n_members = cols.len();
            let n = output.n_rows();
            let (mut means, mut stds, mut skews) =
                (Vec::with_capacity(n), Vec::with_capacity(n), Vec::with_capacity(n));
            for i in 0..n {
                row.clear();
                row.extend(cols.iter().map(|c| c[i]).filter(|v| !v.is_nan()));
                means.push(mean(&row));
                stds.push(std_dev(&row, 1));
                skews.push(skewness(&row));
            }

            output.insert_column(format!("feature_{group}_mean"), means)?;
            output.insert_column(format!("feature_{group}_std"), stds)?;
            output.insert_column(format!("feature_{group}_skew"), skews)?;
            tracing::debug!(group = %group, members = n_members, "added group statistics");
        }
        Ok(output)
    }
}
