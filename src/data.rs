use crate::source::{
    sort_rows, AggregateQuery, DataSource, Schema, SourceIdentity,
};
use crate::value::{Row, Value, NULL};
use anyhow::{anyhow, Context, Result};
use indexmap::IndexMap;
use serde_json::Value as JsonValue;
use std::io::Read;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_TABLE: AtomicU64 = AtomicU64::new(1);

/// In-memory table implementing [`DataSource`].
///
/// Column names double as field paths; `a__b` columns become relation paths in
/// the schema. Filtered views share the underlying rows.
#[derive(Debug, Clone)]
pub struct MemorySource {
    name: String,
    /// Assigned once per loaded table; views and clones keep it.
    table: u64,
    schema: Arc<Schema>,
    rows: Arc<Vec<Row>>,
    filters: Vec<(String, Value)>,
}

impl MemorySource {
    /// Create a source from column headers and positional rows.
    pub fn new(name: &str, headers: Vec<String>, rows: Vec<Vec<Value>>) -> Result<Self> {
        let mut records = Vec::with_capacity(rows.len());
        for (idx, row) in rows.into_iter().enumerate() {
            if row.len() != headers.len() {
                return Err(anyhow!(
                    "Row {} of '{}' has {} values, expected {}",
                    idx + 1,
                    name,
                    row.len(),
                    headers.len()
                ));
            }
            records.push(headers.iter().cloned().zip(row).collect::<Row>());
        }
        Ok(Self::from_rows(name, Schema::from_paths(&headers), records))
    }

    pub fn from_rows(name: &str, schema: Schema, rows: Vec<Row>) -> Self {
        Self {
            name: name.to_string(),
            table: NEXT_TABLE.fetch_add(1, Ordering::Relaxed),
            schema: Arc::new(schema),
            rows: Arc::new(rows),
            filters: Vec::new(),
        }
    }

    /// Read CSV with a header row. Cells are type-inferred.
    pub fn from_csv_reader<R: Read>(name: &str, reader: R) -> Result<Self> {
        let mut rdr = csv::Reader::from_reader(reader);
        let headers: Vec<String> = rdr
            .headers()
            .context("Failed to read CSV headers")?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        let mut rows = Vec::new();
        for (idx, record) in rdr.records().enumerate() {
            let record = record.with_context(|| format!("Failed to read CSV record {}", idx + 1))?;
            rows.push(record.iter().map(Value::infer).collect());
        }
        Self::new(name, headers, rows)
    }

    pub fn from_csv_path(name: &str, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .with_context(|| format!("Failed to open '{}'", path.display()))?;
        Self::from_csv_reader(name, file)
    }

    /// Create a source from a JSON array of objects
    pub fn from_json(name: &str, value: &JsonValue) -> Result<Self> {
        let array = value
            .as_array()
            .ok_or_else(|| anyhow!("Input data must be a JSON array of objects"))?;

        if array.is_empty() {
            return Err(anyhow!("Input data array is empty"));
        }

        // Headers are the union of keys, in order of first appearance
        let mut headers: Vec<String> = Vec::new();
        for item in array {
            let obj = item
                .as_object()
                .ok_or_else(|| anyhow!("Items in array must be objects"))?;
            for key in obj.keys() {
                if !headers.contains(key) {
                    headers.push(key.clone());
                }
            }
        }

        let rows = array
            .iter()
            .filter_map(|item| item.as_object())
            .map(|obj| {
                headers
                    .iter()
                    .map(|h| obj.get(h).map(Value::from_json).unwrap_or(Value::Null))
                    .collect()
            })
            .collect();
        Self::new(name, headers, rows)
    }

    /// Replace the inferred schema, e.g. to supply verbose names.
    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.schema = Arc::new(schema);
        self
    }

    /// A view restricted to rows where `field == value`.
    pub fn filter(&self, field: &str, value: impl Into<Value>) -> Self {
        let mut view = self.clone();
        view.filters.push((field.to_string(), value.into()));
        view.filters.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
        view
    }

    /// Number of rows visible through the current filters.
    pub fn len(&self) -> usize {
        self.matching_rows().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn matching_rows(&self) -> impl Iterator<Item = &Row> {
        self.rows.iter().filter(move |row| {
            self.filters
                .iter()
                .all(|(field, value)| row.get(field).unwrap_or(&NULL) == value)
        })
    }
}

impl DataSource for MemorySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn identity(&self) -> SourceIdentity {
        let table = format!("{}#{}", self.name, self.table);
        if self.filters.is_empty() {
            return SourceIdentity(table);
        }
        let clauses: Vec<String> = self
            .filters
            .iter()
            .map(|(field, value)| format!("{} = {:?}", field, value))
            .collect();
        SourceIdentity(format!("{} WHERE {}", table, clauses.join(" AND ")))
    }

    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn select(&self, fields: &[String]) -> Result<Vec<Row>> {
        Ok(self
            .matching_rows()
            .map(|row| {
                fields
                    .iter()
                    .map(|f| (f.clone(), row.get(f).cloned().unwrap_or(Value::Null)))
                    .collect()
            })
            .collect())
    }

    fn group_aggregate(&self, query: &AggregateQuery) -> Result<Vec<Row>> {
        let mut groups: IndexMap<Vec<Value>, Vec<&Row>> = IndexMap::new();
        for row in self.matching_rows() {
            let key: Vec<Value> = query
                .group_by
                .iter()
                .map(|f| row.get(f).cloned().unwrap_or(Value::Null))
                .collect();
            groups.entry(key).or_default().push(row);
        }

        let mut out = Vec::with_capacity(groups.len());
        for (key, members) in groups {
            let mut row: Row = query.group_by.iter().cloned().zip(key).collect();
            for (alias, aggregate) in &query.aggregates {
                let values = members
                    .iter()
                    .map(|r| r.get(&aggregate.field).unwrap_or(&NULL));
                row.insert(alias.clone(), aggregate.compute(values));
            }
            out.push(row);
        }
        sort_rows(&mut out, &query.order_by);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{Aggregate, OrderBy};

    fn make_source() -> MemorySource {
        let csv = "state,city,genre,price\n\
                   CA,San Jose,Fiction,10\n\
                   CA,San Jose,Fiction,20\n\
                   CA,San Jose,Poetry,5\n\
                   WA,Seattle,Fiction,7\n";
        MemorySource::from_csv_reader("sales", csv.as_bytes()).unwrap()
    }

    #[test]
    fn test_csv_inference() {
        let src = make_source();
        assert_eq!(src.len(), 4);
        let rows = src.select(&["price".to_string()]).unwrap();
        assert_eq!(rows[0]["price"], Value::Int(10));
    }

    #[test]
    fn test_group_aggregate_orders_rows() {
        let src = make_source();
        let query = AggregateQuery {
            group_by: vec!["state".into(), "genre".into()],
            aggregates: vec![("total".into(), Aggregate::sum("price"))],
            order_by: vec![OrderBy::asc("state"), OrderBy::desc("total")],
        };
        let rows = src.group_aggregate(&query).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0]["genre"], Value::text("Fiction"));
        assert_eq!(rows[0]["total"], Value::Int(30));
        assert_eq!(rows[1]["total"], Value::Int(5));
        assert_eq!(rows[2]["state"], Value::text("WA"));
    }

    #[test]
    fn test_filtered_view_identity() {
        let src = make_source();
        let a = src.filter("state", "CA").filter("genre", "Fiction");
        let b = src.filter("genre", "Fiction").filter("state", "CA");
        assert_eq!(a.identity(), b.identity());
        assert_ne!(a.identity(), src.identity());
        assert_eq!(a.len(), 2);
    }

    #[test]
    fn test_same_name_different_tables() {
        let first = MemorySource::from_csv_reader("sales", "region,units\nA,1\n".as_bytes()).unwrap();
        let second = MemorySource::from_csv_reader("sales", "region,units\nZ,999\n".as_bytes()).unwrap();
        assert_ne!(first.identity(), second.identity());
        assert_ne!(first.filter("region", "A").identity(), second.filter("region", "A").identity());
        assert_eq!(first.clone().identity(), first.identity());
    }

    #[test]
    fn test_from_json_union_of_keys() {
        let json = serde_json::json!([
            {"month": 1, "temp": 40.5},
            {"month": 2, "rain": 3}
        ]);
        let src = MemorySource::from_json("weather", &json).unwrap();
        assert_eq!(src.schema().field_names(), vec!["month", "temp", "rain"]);
        let rows = src.select(&["rain".to_string()]).unwrap();
        assert_eq!(rows[0]["rain"], Value::Null);
    }

    #[test]
    fn test_from_json_rejects_non_array() {
        assert!(MemorySource::from_json("x", &serde_json::json!({"a": 1})).is_err());
    }

    #[test]
    fn test_ragged_rows_rejected() {
        let res = MemorySource::new("t", vec!["a".into(), "b".into()], vec![vec![Value::Int(1)]]);
        assert!(res.is_err());
    }

    #[test]
    fn test_relation_columns_build_schema() {
        let csv = "bookstore__city__state,price\nCA,3\n";
        let src = MemorySource::from_csv_reader("sales", csv.as_bytes()).unwrap();
        assert_eq!(src.resolve_field("bookstore__city__state").unwrap(), "state");
    }
}
