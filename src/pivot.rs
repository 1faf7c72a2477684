//! Pivot aggregation.
//!
//! Each query group is fetched with one grouped aggregate query. The rows are
//! then pivoted per term: grouped by category tuple, truncated to the top
//! value groups of each category and spread over legend tuples. Running totals
//! for the global top-N and pareto terms are accumulated across all groups and
//! decide which categories survive and in what order.

use crate::axis::{AxisTransform, AxisValues, Fallback};
use crate::error::Result;
use crate::group::{group_pivot_terms, QueryGroup};
use crate::normalize::{normalize_pivot, PivotSeries, PivotTermSpec};
use crate::source::{AggregateQuery, OrderBy};
use crate::spec::SeriesInput;
use crate::value::{CategoryTuple, LegendTuple, Row, Tuple, Value, NULL};
use indexmap::{IndexMap, IndexSet};
use log::{debug, warn};
use serde::Deserialize;
use std::cmp::Ordering;

/// Pool-wide ranking options.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct PivotOptions {
    /// Term whose per-category total decides the global top-N.
    pub top_n_term: Option<String>,
    /// Number of categories to keep. Positive keeps the largest totals,
    /// negative the smallest.
    pub top_n: i64,
    /// Term whose per-category total orders the axis, largest first.
    pub pareto_term: Option<String>,
}

/// Pivoted values of one term.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TermData {
    pub cells: IndexMap<CategoryTuple, IndexMap<LegendTuple, Value>>,
    /// Distinct legend tuples, in natural order. `[[]]` when the term has no legend fields.
    pub legends: Vec<LegendTuple>,
}

impl TermData {
    pub fn value(&self, category: &CategoryTuple, legend: &LegendTuple) -> Option<&Value> {
        self.cells.get(category).and_then(|by_legend| by_legend.get(legend))
    }
}

/// Result of pivot aggregation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PivotData {
    pub terms: IndexMap<String, TermData>,
    pub categories: AxisValues,
}

#[derive(Default)]
struct RunningTotals {
    top_n: IndexMap<CategoryTuple, f64>,
    pareto: IndexMap<CategoryTuple, f64>,
}

/// The ranking terms that actually apply to `series`.
struct Ranking<'a> {
    top_n_term: Option<&'a str>,
    top_n: i64,
    pareto_term: Option<&'a str>,
}

impl<'a> Ranking<'a> {
    fn resolve(options: &'a PivotOptions, series: &PivotSeries) -> Self {
        let known = |role: &str, term: &'a Option<String>| -> Option<&'a str> {
            let term = term.as_deref()?;
            if series.contains_key(term) {
                Some(term)
            } else {
                warn!("{} '{}' is not a term of this pool; ignoring it", role, term);
                None
            }
        };
        let mut top_n_term = known("top_n_term", &options.top_n_term);
        if top_n_term.is_some() && options.top_n == 0 {
            warn!("top_n_term is set but top_n is 0; ignoring it");
            top_n_term = None;
        }
        Ranking {
            top_n_term,
            top_n: options.top_n,
            pareto_term: known("pareto_term", &options.pareto_term),
        }
    }
}

/// Run every group query and pivot the results.
pub fn aggregate(
    series: &PivotSeries,
    groups: &[QueryGroup],
    options: &PivotOptions,
    transform: &AxisTransform,
) -> Result<PivotData> {
    let ranking = Ranking::resolve(options, series);
    let mut seen: IndexSet<CategoryTuple> = IndexSet::new();
    let mut totals = RunningTotals::default();
    let mut terms = IndexMap::new();

    for group in groups {
        let query = group_query(series, group);
        let rows = group.source.group_aggregate(&query)?;
        debug!(
            "query on '{}' grouped by {:?} returned {} rows for {} terms",
            group.source.identity(),
            query.group_by,
            rows.len(),
            group.terms.len()
        );
        for name in &group.terms {
            let Some(spec) = series.get(name) else {
                continue;
            };
            let data = pivot_term(name, spec, &rows, &ranking, &mut seen, &mut totals);
            terms.insert(name.clone(), data);
        }
    }

    let categories = order_categories(seen, totals, &ranking, transform);
    debug!("pivot axis has {} categories", categories.raw.len());
    Ok(PivotData { terms, categories })
}

fn group_query(series: &PivotSeries, group: &QueryGroup) -> AggregateQuery {
    let aggregates: Vec<_> = group
        .terms
        .iter()
        .filter_map(|name| series.get(name).map(|spec| (name.clone(), spec.func.clone())))
        .collect();
    let mut order_by: Vec<OrderBy> = group.categories.iter().map(|c| OrderBy::asc(c)).collect();
    if let Some(first) = group.terms.first() {
        match series.get(first).map(|spec| spec.top_n_per_cat.cmp(&0)) {
            Some(Ordering::Greater) => order_by.push(OrderBy::desc(first)),
            Some(Ordering::Less) => order_by.push(OrderBy::asc(first)),
            _ => {}
        }
    }
    AggregateQuery {
        group_by: group.group_by(),
        aggregates,
        order_by,
    }
}

fn cell<'r>(row: &'r Row, name: &str) -> &'r Value {
    row.get(name).unwrap_or(&NULL)
}

fn tuple_of(row: &Row, fields: &[String]) -> Tuple {
    fields
        .iter()
        .map(|f| row.get(f).unwrap_or(&NULL).stringify())
        .collect()
}

fn pivot_term(
    name: &str,
    spec: &PivotTermSpec,
    rows: &[Row],
    ranking: &Ranking<'_>,
    seen: &mut IndexSet<CategoryTuple>,
    totals: &mut RunningTotals,
) -> TermData {
    let mut by_category: IndexMap<CategoryTuple, Vec<&Row>> = IndexMap::new();
    for row in rows {
        by_category
            .entry(tuple_of(row, &spec.categories))
            .or_default()
            .push(row);
    }

    let mut data = TermData::default();
    let mut legends: IndexSet<LegendTuple> = IndexSet::new();
    for (category, mut members) in by_category {
        seen.insert(category.clone());
        match spec.top_n_per_cat.cmp(&0) {
            Ordering::Greater => members.sort_by(|a, b| cell(b, name).cmp(cell(a, name))),
            Ordering::Less => members.sort_by(|a, b| cell(a, name).cmp(cell(b, name))),
            Ordering::Equal => {}
        }
        let kept = top_value_groups(members, name, spec.top_n_per_cat);

        let cells = data.cells.entry(category.clone()).or_default();
        for row in kept {
            let value = cell(row, name).clone();
            let amount = value.as_f64().unwrap_or(0.0);
            if ranking.top_n_term == Some(name) {
                *totals.top_n.entry(category.clone()).or_default() += amount;
            }
            if ranking.pareto_term == Some(name) {
                *totals.pareto.entry(category.clone()).or_default() += amount;
            }
            let legend = tuple_of(row, &spec.legend_by);
            legends.insert(legend.clone());
            cells.insert(legend, value);
        }
    }

    data.legends = legends.into_iter().collect();
    data.legends.sort();
    data
}

/// Keep the rows of the first `|n|` runs of equal values. Ties never split a run.
fn top_value_groups<'a>(rows: Vec<&'a Row>, name: &str, n: i64) -> Vec<&'a Row> {
    if n == 0 {
        return rows;
    }
    let limit = n.unsigned_abs() as usize;
    let mut kept = Vec::with_capacity(rows.len());
    let mut runs = 0;
    let mut previous: Option<&Value> = None;
    for row in rows {
        let value = cell(row, name);
        if previous != Some(value) {
            runs += 1;
            if runs > limit {
                break;
            }
            previous = Some(value);
        }
        kept.push(row);
    }
    kept
}

fn ranked(totals: IndexMap<CategoryTuple, f64>, descending: bool) -> Vec<CategoryTuple> {
    let mut items: Vec<(CategoryTuple, f64)> = totals.into_iter().collect();
    items.sort_by(|a, b| {
        if descending {
            b.1.total_cmp(&a.1)
        } else {
            a.1.total_cmp(&b.1)
        }
    });
    items.into_iter().map(|(category, _)| category).collect()
}

fn order_categories(
    seen: IndexSet<CategoryTuple>,
    totals: RunningTotals,
    ranking: &Ranking<'_>,
    transform: &AxisTransform,
) -> AxisValues {
    let (candidates, fallback) = match ranking.top_n_term {
        Some(_) => {
            let mut top = ranked(totals.top_n, ranking.top_n > 0);
            top.truncate(ranking.top_n.unsigned_abs() as usize);
            (top, Fallback::Preserve)
        }
        None => (seen.into_iter().collect::<Vec<_>>(), Fallback::Natural),
    };

    if ranking.pareto_term.is_some() {
        let members: IndexSet<&CategoryTuple> = candidates.iter().collect();
        let order: Vec<(Tuple, ())> = ranked(totals.pareto, true)
            .into_iter()
            .filter(|category| members.contains(category))
            .map(|category| (category, ()))
            .collect();
        return transform.map_only(order).into_iter().collect();
    }

    let items = candidates.into_iter().map(|category| (category, ())).collect();
    transform.arrange(items, fallback).into_iter().collect()
}

/// Pivoted data over one or more sources, computed eagerly on construction.
#[derive(Debug, Clone)]
pub struct PivotDataPool {
    series: PivotSeries,
    query_groups: Vec<QueryGroup>,
    options: PivotOptions,
    data: PivotData,
}

impl PivotDataPool {
    pub fn new(
        series: &SeriesInput,
        options: PivotOptions,
        transform: AxisTransform,
    ) -> Result<Self> {
        let series = normalize_pivot(series)?;
        let query_groups = group_pivot_terms(&series);
        debug!(
            "pivot pool with {} terms in {} query groups",
            series.len(),
            query_groups.len()
        );
        let data = aggregate(&series, &query_groups, &options, &transform)?;
        Ok(Self {
            series,
            query_groups,
            options,
            data,
        })
    }

    pub fn series(&self) -> &PivotSeries {
        &self.series
    }

    pub fn query_groups(&self) -> &[QueryGroup] {
        &self.query_groups
    }

    pub fn options(&self) -> &PivotOptions {
        &self.options
    }

    pub fn data(&self) -> &PivotData {
        &self.data
    }

    pub fn term(&self, name: &str) -> Option<&TermData> {
        self.data.terms.get(name)
    }

    /// Category tuples in axis order, before mapping.
    pub fn categories_raw(&self) -> &[Tuple] {
        &self.data.categories.raw
    }

    /// Category tuples in axis order, as displayed.
    pub fn categories(&self) -> &[Tuple] {
        &self.data.categories.display
    }
}
