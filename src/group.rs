//! Partition normalized terms into groups that can share one query.

use crate::normalize::{FlatSeries, PivotSeries};
use crate::source::{SourceIdentity, SourceRef};
use indexmap::IndexMap;

/// Pivot terms sharing a source, category fields and legend fields.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryGroup {
    pub source: SourceRef,
    pub categories: Vec<String>,
    pub legend_by: Vec<String>,
    /// Term names in declaration order.
    pub terms: Vec<String>,
}

impl QueryGroup {
    /// Fields the group query groups by: categories then legend fields.
    pub fn group_by(&self) -> Vec<String> {
        self.categories
            .iter()
            .chain(self.legend_by.iter())
            .cloned()
            .collect()
    }
}

/// Flat terms sharing a source.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldGroup {
    pub source: SourceRef,
    pub terms: Vec<String>,
}

type PivotKey = (SourceIdentity, Vec<String>, Vec<String>);

/// Group pivot terms by `(source identity, categories, legend_by)`.
///
/// Groups appear in the order of their first term.
pub fn group_pivot_terms(series: &PivotSeries) -> Vec<QueryGroup> {
    let mut groups: IndexMap<PivotKey, QueryGroup> = IndexMap::new();
    for (name, term) in series {
        let key = (
            term.source.identity(),
            term.categories.clone(),
            term.legend_by.clone(),
        );
        groups
            .entry(key)
            .or_insert_with(|| QueryGroup {
                source: term.source.clone(),
                categories: term.categories.clone(),
                legend_by: term.legend_by.clone(),
                terms: Vec::new(),
            })
            .terms
            .push(name.clone());
    }
    groups.into_values().collect()
}

/// Group flat terms by source identity.
pub fn group_flat_terms(series: &FlatSeries) -> Vec<FieldGroup> {
    let mut groups: IndexMap<SourceIdentity, FieldGroup> = IndexMap::new();
    for (name, term) in series {
        groups
            .entry(term.source.identity())
            .or_insert_with(|| FieldGroup {
                source: term.source.clone(),
                terms: Vec::new(),
            })
            .terms
            .push(name.clone());
    }
    groups.into_values().collect()
}
