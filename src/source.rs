//! The data source capability interface.
//!
//! The pivot engine never talks to a database directly. Anything that can
//! resolve field paths against a schema, project fields and run a
//! "group by these fields, aggregate these expressions" query can back a
//! [`DataPool`](crate::pool::DataPool) or [`PivotDataPool`](crate::pivot::PivotDataPool).

use crate::error::SpecError;
use crate::value::{Row, Value, NULL};
use indexmap::IndexMap;
use std::cmp::Ordering;
use std::fmt;
use std::ops::Deref;
use std::str::FromStr;
use std::sync::Arc;

/// Separator between segments of a relation path (`bookstore__city__state`).
pub const PATH_SEPARATOR: &str = "__";

pub trait DataSource: Send + Sync {
    fn name(&self) -> &str;

    /// Structural identity. Two sources with equal identities must return the
    /// same rows for the same query.
    fn identity(&self) -> SourceIdentity;

    fn schema(&self) -> &Schema;

    /// Resolve a field path and return the verbose name of the final field.
    fn resolve_field(&self, path: &str) -> Result<String, SpecError> {
        self.schema()
            .resolve(path, self.name())
            .map(|f| f.verbose_name.clone())
    }

    /// Return one row per record, projected onto `fields`.
    fn select(&self, fields: &[String]) -> anyhow::Result<Vec<Row>>;

    /// Group by `query.group_by`, compute every aggregate (keyed by its alias)
    /// and return the rows ordered by `query.order_by`.
    fn group_aggregate(&self, query: &AggregateQuery) -> anyhow::Result<Vec<Row>>;
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SourceIdentity(pub String);

impl fmt::Display for SourceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Shared handle to a data source. Compares by structural identity.
#[derive(Clone)]
pub struct SourceRef(Arc<dyn DataSource>);

impl SourceRef {
    pub fn new<S: DataSource + 'static>(source: S) -> Self {
        SourceRef(Arc::new(source))
    }
}

impl From<Arc<dyn DataSource>> for SourceRef {
    fn from(source: Arc<dyn DataSource>) -> Self {
        SourceRef(source)
    }
}

impl Deref for SourceRef {
    type Target = dyn DataSource;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

impl fmt::Debug for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SourceRef").field(&self.identity().0).finish()
    }
}

impl PartialEq for SourceRef {
    fn eq(&self, other: &Self) -> bool {
        self.identity() == other.identity()
    }
}

// =============================================================================
// Schema
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schema {
    fields: IndexMap<String, Field>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub verbose_name: String,
    /// Schema of the related record when this field is a relation.
    pub related: Option<Schema>,
}

impl Field {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            verbose_name: name.replace('_', " "),
            related: None,
        }
    }

    pub fn verbose(mut self, verbose_name: &str) -> Self {
        self.verbose_name = verbose_name.to_string();
        self
    }

    pub fn related(mut self, schema: Schema) -> Self {
        self.related = Some(schema);
        self
    }
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field(mut self, field: Field) -> Self {
        self.fields.insert(field.name.clone(), field);
        self
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.get(name)
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.fields.keys().map(|k| k.as_str()).collect()
    }

    /// Build a schema from flat column names, turning `a__b__c` into nested relations.
    pub fn from_paths<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut schema = Schema::new();
        for path in paths {
            let segments: Vec<&str> = path.as_ref().split(PATH_SEPARATOR).collect();
            schema.insert_path(&segments);
        }
        schema
    }

    fn insert_path(&mut self, segments: &[&str]) {
        let Some((head, rest)) = segments.split_first() else {
            return;
        };
        let field = self
            .fields
            .entry(head.to_string())
            .or_insert_with(|| Field::new(head));
        if !rest.is_empty() {
            field
                .related
                .get_or_insert_with(Schema::new)
                .insert_path(rest);
        }
    }

    /// Walk a `__`-separated path and return the final field.
    pub fn resolve(&self, path: &str, source_name: &str) -> Result<&Field, SpecError> {
        let (head, rest) = match path.split_once(PATH_SEPARATOR) {
            Some((head, rest)) => (head, Some(rest)),
            None => (path, None),
        };
        let field = self.field(head).ok_or_else(|| SpecError::UnknownFieldPath {
            path: head.to_string(),
            source_name: source_name.to_string(),
            valid: self.field_names().join(", "),
        })?;
        match rest {
            None => Ok(field),
            Some(rest) => match &field.related {
                Some(related) => related.resolve(rest, source_name),
                None => Err(SpecError::UnknownFieldPath {
                    path: path.to_string(),
                    source_name: source_name.to_string(),
                    valid: format!("'{}' is not a relation", head),
                }),
            },
        }
    }
}

// =============================================================================
// Aggregates
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateKind {
    Avg,
    Count,
    Max,
    Min,
    StdDev,
    Sum,
    Variance,
}

impl AggregateKind {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "avg" | "mean" => Some(AggregateKind::Avg),
            "count" => Some(AggregateKind::Count),
            "max" => Some(AggregateKind::Max),
            "min" => Some(AggregateKind::Min),
            "stddev" => Some(AggregateKind::StdDev),
            "sum" => Some(AggregateKind::Sum),
            "variance" => Some(AggregateKind::Variance),
            _ => None,
        }
    }
}

impl fmt::Display for AggregateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AggregateKind::Avg => "Avg",
            AggregateKind::Count => "Count",
            AggregateKind::Max => "Max",
            AggregateKind::Min => "Min",
            AggregateKind::StdDev => "StdDev",
            AggregateKind::Sum => "Sum",
            AggregateKind::Variance => "Variance",
        };
        write!(f, "{}", name)
    }
}

/// An aggregate expression over one field, e.g. `Avg(price)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Aggregate {
    pub kind: AggregateKind,
    pub field: String,
}

impl Aggregate {
    pub fn new(kind: AggregateKind, field: &str) -> Self {
        Self {
            kind,
            field: field.to_string(),
        }
    }

    pub fn avg(field: &str) -> Self {
        Self::new(AggregateKind::Avg, field)
    }

    pub fn sum(field: &str) -> Self {
        Self::new(AggregateKind::Sum, field)
    }

    pub fn count(field: &str) -> Self {
        Self::new(AggregateKind::Count, field)
    }

    pub fn max(field: &str) -> Self {
        Self::new(AggregateKind::Max, field)
    }

    pub fn min(field: &str) -> Self {
        Self::new(AggregateKind::Min, field)
    }

    /// Fold the non-null values of one group into the aggregate result.
    pub fn compute<'a, I>(&self, values: I) -> Value
    where
        I: IntoIterator<Item = &'a Value>,
    {
        let values: Vec<&Value> = values.into_iter().filter(|v| !v.is_null()).collect();
        match self.kind {
            AggregateKind::Count => Value::Int(values.len() as i64),
            AggregateKind::Max => values.into_iter().max().cloned().unwrap_or(Value::Null),
            AggregateKind::Min => values.into_iter().min().cloned().unwrap_or(Value::Null),
            AggregateKind::Sum => {
                if values.is_empty() {
                    Value::Null
                } else if let Some(total) = values.iter().try_fold(0i64, |acc, v| match v {
                    Value::Int(i) => acc.checked_add(*i),
                    _ => None,
                }) {
                    Value::Int(total)
                } else {
                    // Non-integer input, or an integer sum that overflows i64.
                    Value::Float(values.iter().filter_map(|v| v.as_f64()).sum())
                }
            }
            AggregateKind::Avg | AggregateKind::Variance | AggregateKind::StdDev => {
                let nums: Vec<f64> = values.iter().filter_map(|v| v.as_f64()).collect();
                if nums.is_empty() {
                    return Value::Null;
                }
                let n = nums.len() as f64;
                let mean = nums.iter().sum::<f64>() / n;
                if self.kind == AggregateKind::Avg {
                    return Value::Float(mean);
                }
                let variance = nums.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
                if self.kind == AggregateKind::Variance {
                    Value::Float(variance)
                } else {
                    Value::Float(variance.sqrt())
                }
            }
        }
    }
}

impl fmt::Display for Aggregate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.kind, self.field)
    }
}

impl FromStr for Aggregate {
    type Err = SpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        crate::parser::parse_aggregate_expr(s)
    }
}

// =============================================================================
// Queries
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub field: String,
    pub descending: bool,
}

impl OrderBy {
    pub fn asc(field: &str) -> Self {
        Self {
            field: field.to_string(),
            descending: false,
        }
    }

    pub fn desc(field: &str) -> Self {
        Self {
            field: field.to_string(),
            descending: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregateQuery {
    pub group_by: Vec<String>,
    /// (alias, aggregate) in annotation order.
    pub aggregates: Vec<(String, Aggregate)>,
    pub order_by: Vec<OrderBy>,
}

/// Stable sort of result rows by a list of order terms. Missing fields sort as null.
pub fn sort_rows(rows: &mut [Row], order_by: &[OrderBy]) {
    if order_by.is_empty() {
        return;
    }
    rows.sort_by(|a, b| {
        order_by
            .iter()
            .map(|o| {
                let va = a.get(&o.field).unwrap_or(&NULL);
                let vb = b.get(&o.field).unwrap_or(&NULL);
                if o.descending {
                    vb.cmp(va)
                } else {
                    va.cmp(vb)
                }
            })
            .find(|ord| *ord != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book_schema() -> Schema {
        Schema::from_paths([
            "price",
            "bookstore__city__state",
            "bookstore__city__city",
            "book__genre__name",
        ])
    }

    #[test]
    fn test_resolve_nested_path() {
        let schema = book_schema();
        let field = schema.resolve("bookstore__city__state", "sales").unwrap();
        assert_eq!(field.name, "state");
        assert_eq!(field.verbose_name, "state");
    }

    #[test]
    fn test_resolve_unknown_field_lists_valid_lookups() {
        let schema = book_schema();
        let err = schema.resolve("bookstor__city", "sales").unwrap_err();
        match err {
            SpecError::UnknownFieldPath { path, valid, .. } => {
                assert_eq!(path, "bookstor");
                assert_eq!(valid, "price, bookstore, book");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_resolve_through_non_relation_fails() {
        let schema = book_schema();
        assert!(schema.resolve("price__amount", "sales").is_err());
    }

    #[test]
    fn test_aggregate_compute() {
        let values = vec![Value::Int(2), Value::Null, Value::Int(4)];
        assert_eq!(Aggregate::sum("x").compute(&values), Value::Int(6));
        assert_eq!(Aggregate::avg("x").compute(&values), Value::Float(3.0));
        assert_eq!(Aggregate::count("x").compute(&values), Value::Int(2));
        assert_eq!(Aggregate::max("x").compute(&values), Value::Int(4));
        assert_eq!(
            Aggregate::new(AggregateKind::Variance, "x").compute(&values),
            Value::Float(1.0)
        );
        assert_eq!(Aggregate::sum("x").compute(&Vec::new()), Value::Null);
    }

    #[test]
    fn test_integer_sum_overflow_becomes_float() {
        let values = vec![Value::Int(i64::MAX), Value::Int(1)];
        assert_eq!(
            Aggregate::sum("x").compute(&values),
            Value::Float(i64::MAX as f64 + 1.0)
        );
        let mixed = vec![Value::Int(1), Value::Float(0.5)];
        assert_eq!(Aggregate::sum("x").compute(&mixed), Value::Float(1.5));
    }

    #[test]
    fn test_sort_rows_multi_key() {
        let mut rows: Vec<Row> = vec![
            [("c", Value::text("b")), ("v", Value::Int(1))],
            [("c", Value::text("a")), ("v", Value::Int(1))],
            [("c", Value::text("a")), ("v", Value::Int(5))],
        ]
        .into_iter()
        .map(|r| r.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
        .collect();
        sort_rows(&mut rows, &[OrderBy::asc("c"), OrderBy::desc("v")]);
        let order: Vec<(String, i64)> = rows
            .iter()
            .map(|r| match (&r["c"], &r["v"]) {
                (Value::Text(c), Value::Int(v)) => (c.clone(), *v),
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(
            order,
            vec![("a".to_string(), 5), ("a".to_string(), 1), ("b".to_string(), 1)]
        );
    }
}
