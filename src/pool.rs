//! Flat (non-pivot) data pool: raw field values, one query per source.

use crate::error::Result;
use crate::group::{group_flat_terms, FieldGroup};
use crate::normalize::{normalize_flat, FlatSeries, FlatTermSpec};
use crate::spec::SeriesInput;
use crate::value::Row;
use indexmap::{IndexMap, IndexSet};
use log::debug;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct DataPool {
    series: FlatSeries,
    query_groups: Vec<FieldGroup>,
    /// Rows per term. Terms of the same group share one row set.
    data: IndexMap<String, Arc<Vec<Row>>>,
}

impl DataPool {
    pub fn new(series: &SeriesInput) -> Result<Self> {
        let series = normalize_flat(series)?;
        let query_groups = group_flat_terms(&series);

        let mut data = IndexMap::new();
        for group in &query_groups {
            let fields: IndexSet<String> = group
                .terms
                .iter()
                .filter_map(|name| series.get(name).map(|spec| spec.field.clone()))
                .collect();
            let fields: Vec<String> = fields.into_iter().collect();
            let rows = Arc::new(group.source.select(&fields)?);
            debug!(
                "selected {:?} from '{}': {} rows",
                fields,
                group.source.identity(),
                rows.len()
            );
            for name in &group.terms {
                data.insert(name.clone(), Arc::clone(&rows));
            }
        }

        Ok(Self {
            series,
            query_groups,
            data,
        })
    }

    pub fn series(&self) -> &FlatSeries {
        &self.series
    }

    pub fn query_groups(&self) -> &[FieldGroup] {
        &self.query_groups
    }

    pub fn term(&self, name: &str) -> Option<&FlatTermSpec> {
        self.series.get(name)
    }

    pub fn rows(&self, name: &str) -> Option<&Arc<Vec<Row>>> {
        self.data.get(name)
    }

    /// Whether two terms were fetched by the same query.
    pub fn same_rows(&self, a: &str, b: &str) -> bool {
        match (self.data.get(a), self.data.get(b)) {
            (Some(x), Some(y)) => Arc::ptr_eq(x, y),
            _ => false,
        }
    }
}
