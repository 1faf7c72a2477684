//! JSON chart documents.
//!
//! A document describes one chart: the pool series (with sources referenced by
//! name), the pool ranking options, the chart's series options and extra chart
//! options. Aggregates are written as text, e.g. `"Avg(price)"`. Axis sort and
//! map functions are expressed declaratively through [`AxisSpec`].
//!
//! ```json
//! {
//!   "kind": "pivot",
//!   "series": [{
//!     "options": {"source": "sales", "categories": "state", "legend_by": "genre"},
//!     "terms": {"avg_price": "Avg(price)"}
//!   }],
//!   "top_n_term": "avg_price",
//!   "top_n": 5,
//!   "series_options": [{"options": {"type": "column"}, "terms": ["avg_price"]}]
//! }
//! ```

use crate::axis::AxisTransform;
use crate::chart::{Chart, ChartConfig, ChartOptions, ChartSeriesOptions, PivotChart, PivotSeriesOptions};
use crate::data::MemorySource;
use crate::error::{Result, SpecError};
use crate::pivot::{PivotDataPool, PivotOptions};
use crate::pool::DataPool;
use crate::source::{Aggregate, SourceRef};
use crate::spec::{FieldList, SeriesBlock, SeriesInput, TermEntry, TermListItem, TermOptions, TermsInput};
use crate::value::{join_tuple, Value};
use indexmap::IndexMap;
use log::debug;
use serde::Deserialize;
use serde_json::Value as Json;

/// Named data sources a document can reference.
#[derive(Debug, Clone, Default)]
pub struct SourceRegistry {
    sources: IndexMap<String, MemorySource>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: &str, source: MemorySource) {
        self.sources.insert(name.to_string(), source);
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn resolve(&self, spec: &SourceSpec) -> std::result::Result<SourceRef, SpecError> {
        let (name, filter) = match spec {
            SourceSpec::Name(name) => (name, None),
            SourceSpec::Filtered { name, filter } => (name, Some(filter)),
        };
        let source = self.sources.get(name).ok_or_else(|| SpecError::UnknownSource {
            name: name.clone(),
            valid: self.sources.keys().cloned().collect::<Vec<_>>().join(", "),
        })?;
        let mut view = source.clone();
        for (field, value) in filter.into_iter().flatten() {
            view = view.filter(field, Value::from_json(value));
        }
        Ok(SourceRef::new(view))
    }
}

/// A registered source by name, optionally restricted to rows matching `filter`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum SourceSpec {
    Name(String),
    Filtered {
        name: String,
        #[serde(default)]
        filter: IndexMap<String, Json>,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TermOptionsDoc {
    pub source: Option<SourceSpec>,
    pub field: Option<String>,
    #[serde(alias = "field_alias")]
    pub alias: Option<String>,
    pub func: Option<String>,
    pub categories: Option<FieldList>,
    pub legend_by: Option<FieldList>,
    pub top_n_per_cat: Option<i64>,
    pub field_aliases: Option<IndexMap<String, String>>,
}

/// A term value: text (an aggregate for pivot charts, a field path otherwise)
/// or options overriding the block.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum TermEntryDoc {
    Text(String),
    Options(TermOptionsDoc),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum TermListItemDoc {
    Name(String),
    Named(IndexMap<String, TermEntryDoc>),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum TermsDoc {
    List(Vec<TermListItemDoc>),
    Map(IndexMap<String, TermEntryDoc>),
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SeriesBlockDoc {
    pub options: Option<TermOptionsDoc>,
    pub terms: Option<TermsDoc>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum SeriesDoc {
    Blocks(Vec<SeriesBlockDoc>),
    Flat(IndexMap<String, TermOptionsDoc>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartKind {
    /// Aggregated values pivoted by category and legend.
    Pivot,
    /// Raw field values plotted against an x term.
    Chart,
}

/// Declarative axis ordering and labelling.
///
/// Tuples are matched by their values joined with `:`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct AxisSpec {
    /// Values listed here come first, in this order; the rest follow in natural order.
    pub order: Vec<String>,
    /// Display label per value.
    pub labels: IndexMap<String, String>,
    /// Apply `labels` before ordering.
    pub map_then_sort: bool,
}

impl AxisSpec {
    pub fn transform(&self) -> AxisTransform {
        let mut transform = AxisTransform::identity().map_then_sort(self.map_then_sort);
        if !self.order.is_empty() {
            let order = self.order.clone();
            transform = transform.sort_by(move |tuple| {
                let key = join_tuple(tuple, ":");
                let rank = order.iter().position(|o| *o == key).unwrap_or(order.len());
                let mut sort_key = vec![Value::Int(rank as i64)];
                sort_key.extend(tuple.iter().cloned());
                sort_key
            });
        }
        if !self.labels.is_empty() {
            let labels = self.labels.clone();
            transform = transform.map_with(move |tuple| {
                labels
                    .get(&join_tuple(tuple, ":"))
                    .map(|label| vec![Value::text(label.as_str())])
                    .unwrap_or_else(|| tuple.clone())
            });
        }
        transform
    }
}

/// One chart described in JSON.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChartDocument {
    pub kind: ChartKind,
    pub series: SeriesDoc,
    #[serde(flatten)]
    pub pivot: PivotOptions,
    /// Pivot or flat series options, depending on `kind`.
    pub series_options: Json,
    #[serde(default)]
    pub chart_options: Option<ChartOptions>,
    /// One entry per x axis. Pivot charts only use the first.
    #[serde(default)]
    pub x_axis: Vec<AxisSpec>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DocumentSet {
    Many(Vec<ChartDocument>),
    One(Box<ChartDocument>),
}

/// Parse a single document or an array of documents.
pub fn parse_documents(text: &str) -> serde_json::Result<Vec<ChartDocument>> {
    Ok(match serde_json::from_str(text)? {
        DocumentSet::Many(docs) => docs,
        DocumentSet::One(doc) => vec![*doc],
    })
}

/// A chart built from a document.
#[derive(Debug, Clone, PartialEq)]
pub enum BuiltChart {
    Pivot(PivotChart),
    Chart(Chart),
}

impl ChartConfig for BuiltChart {
    fn options(&self) -> &ChartOptions {
        match self {
            BuiltChart::Pivot(chart) => chart.options(),
            BuiltChart::Chart(chart) => chart.options(),
        }
    }
}

impl ChartDocument {
    /// Resolve sources and aggregates into the typed series input.
    pub fn series_input(&self, registry: &SourceRegistry) -> std::result::Result<SeriesInput, SpecError> {
        let ctx = Resolver {
            registry,
            kind: self.kind,
        };
        Ok(match &self.series {
            SeriesDoc::Flat(map) => SeriesInput::Flat(
                map.iter()
                    .map(|(name, opts)| Ok((name.clone(), ctx.options(opts)?)))
                    .collect::<std::result::Result<_, SpecError>>()?,
            ),
            SeriesDoc::Blocks(blocks) => SeriesInput::Blocks(
                blocks
                    .iter()
                    .map(|block| ctx.block(block))
                    .collect::<std::result::Result<_, SpecError>>()?,
            ),
        })
    }

    /// Build the pool and the chart.
    pub fn build(&self, registry: &SourceRegistry) -> Result<BuiltChart> {
        let series = self.series_input(registry)?;
        let transforms: Vec<AxisTransform> = self.x_axis.iter().map(AxisSpec::transform).collect();
        debug!("building {:?} chart", self.kind);
        match self.kind {
            ChartKind::Pivot => {
                let series_options: PivotSeriesOptions = serde_json::from_value(self.series_options.clone())
                    .map_err(|e| SpecError::mismatch("series_options", "pivot series options", e.to_string()))?;
                let transform = transforms.into_iter().next().unwrap_or_default();
                let pool = PivotDataPool::new(&series, self.pivot.clone(), transform)?;
                let chart = PivotChart::new(&pool, &series_options, self.chart_options.as_ref())?;
                Ok(BuiltChart::Pivot(chart))
            }
            ChartKind::Chart => {
                let series_options: ChartSeriesOptions = serde_json::from_value(self.series_options.clone())
                    .map_err(|e| SpecError::mismatch("series_options", "chart series options", e.to_string()))?;
                let pool = DataPool::new(&series)?;
                let chart = Chart::new(&pool, &series_options, self.chart_options.as_ref(), &transforms)?;
                Ok(BuiltChart::Chart(chart))
            }
        }
    }
}

struct Resolver<'a> {
    registry: &'a SourceRegistry,
    kind: ChartKind,
}

impl Resolver<'_> {
    fn options(&self, doc: &TermOptionsDoc) -> std::result::Result<TermOptions, SpecError> {
        let source = doc
            .source
            .as_ref()
            .map(|s| self.registry.resolve(s))
            .transpose()?;
        let func = doc
            .func
            .as_deref()
            .map(str::parse::<Aggregate>)
            .transpose()?;
        Ok(TermOptions {
            source,
            field: doc.field.clone(),
            field_alias: doc.alias.clone(),
            func,
            categories: doc.categories.clone(),
            legend_by: doc.legend_by.clone(),
            top_n_per_cat: doc.top_n_per_cat,
            field_aliases: doc.field_aliases.clone(),
        })
    }

    fn entry(&self, entry: &TermEntryDoc) -> std::result::Result<TermEntry, SpecError> {
        Ok(match (entry, self.kind) {
            (TermEntryDoc::Text(text), ChartKind::Pivot) => TermEntry::Aggregate(text.parse()?),
            (TermEntryDoc::Text(text), ChartKind::Chart) => TermEntry::Field(text.clone()),
            (TermEntryDoc::Options(opts), _) => TermEntry::Options(self.options(opts)?),
        })
    }

    fn entries(
        &self,
        map: &IndexMap<String, TermEntryDoc>,
    ) -> std::result::Result<IndexMap<String, TermEntry>, SpecError> {
        map.iter()
            .map(|(name, entry)| Ok((name.clone(), self.entry(entry)?)))
            .collect()
    }

    fn block(&self, block: &SeriesBlockDoc) -> std::result::Result<SeriesBlock, SpecError> {
        let options = block.options.as_ref().map(|o| self.options(o)).transpose()?;
        let terms = match &block.terms {
            None => None,
            Some(TermsDoc::Map(map)) => Some(TermsInput::Map(self.entries(map)?)),
            Some(TermsDoc::List(items)) => Some(TermsInput::List(
                items
                    .iter()
                    .map(|item| {
                        Ok(match item {
                            TermListItemDoc::Name(name) => TermListItem::Name(name.clone()),
                            TermListItemDoc::Named(map) => TermListItem::Named(self.entries(map)?),
                        })
                    })
                    .collect::<std::result::Result<_, SpecError>>()?,
            )),
        };
        Ok(SeriesBlock { options, terms })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::AggregateKind;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn registry() -> SourceRegistry {
        let mut registry = SourceRegistry::new();
        let csv = "state,genre,price\nCA,Fiction,10\nCA,Poetry,4\nWA,Fiction,7\n";
        registry.register("sales", MemorySource::from_csv_reader("sales", csv.as_bytes()).unwrap());
        registry
    }

    fn pivot_doc() -> ChartDocument {
        serde_json::from_value(json!({
            "kind": "pivot",
            "series": [{
                "options": {"source": "sales", "categories": "state", "legend_by": ["genre"]},
                "terms": {
                    "avg_price": "Avg(price)",
                    "max_price": {"func": "max(price)", "top_n_per_cat": 1}
                }
            }],
            "top_n_term": "avg_price",
            "top_n": 1,
            "series_options": {"avg_price": {"type": "column"}}
        }))
        .unwrap()
    }

    #[test]
    fn test_document_resolves_aggregates() {
        let doc = pivot_doc();
        assert_eq!(doc.pivot.top_n, 1);
        let SeriesInput::Blocks(blocks) = doc.series_input(&registry()).unwrap() else {
            panic!("expected blocks");
        };
        let Some(TermsInput::Map(terms)) = &blocks[0].terms else {
            panic!("expected a term map");
        };
        assert_eq!(terms["avg_price"], TermEntry::Aggregate(Aggregate::avg("price")));
        match &terms["max_price"] {
            TermEntry::Options(opts) => {
                assert_eq!(opts.func.as_ref().map(|f| f.kind), Some(AggregateKind::Max));
                assert_eq!(opts.top_n_per_cat, Some(1));
            }
            other => panic!("unexpected entry {:?}", other),
        }
    }

    #[test]
    fn test_build_pivot_document() {
        let chart = pivot_doc().build(&registry()).unwrap();
        let options = chart.options();
        // CA totals 14 over its two genres, WA only 7
        assert_eq!(options["xAxis"][0]["categories"], json!(["CA"]));
        assert_eq!(options["series"][0]["type"], json!("column"));
    }

    #[test]
    fn test_unknown_source() {
        let doc: ChartDocument = serde_json::from_value(json!({
            "kind": "chart",
            "series": [{"options": {"source": "inventory"}, "terms": ["price"]}],
            "series_options": {}
        }))
        .unwrap();
        let err = doc.series_input(&registry()).unwrap_err();
        assert_eq!(
            err,
            SpecError::UnknownSource {
                name: "inventory".into(),
                valid: "sales".into()
            }
        );
    }

    #[test]
    fn test_filtered_source() {
        let spec: SourceSpec = serde_json::from_value(json!({"name": "sales", "filter": {"state": "WA"}})).unwrap();
        let source = registry().resolve(&spec).unwrap();
        assert_eq!(source.select(&["price".to_string()]).unwrap().len(), 1);
    }

    #[test]
    fn test_unknown_aggregate() {
        let doc: ChartDocument = serde_json::from_value(json!({
            "kind": "pivot",
            "series": [{"options": {"source": "sales", "categories": "state"}, "terms": {"p": "Median(price)"}}],
            "series_options": {"p": {}}
        }))
        .unwrap();
        assert!(matches!(
            doc.series_input(&registry()),
            Err(SpecError::UnknownAggregate(_))
        ));
    }

    #[test]
    fn test_axis_spec_order_and_labels() {
        let axis = AxisSpec {
            order: vec!["WA".into()],
            labels: [("CA".to_string(), "California".to_string())].into_iter().collect(),
            map_then_sort: false,
        };
        let transform = axis.transform();
        let items = vec![(vec![Value::text("CA")], ()), (vec![Value::text("WA")], ())];
        let arranged = transform.arrange(items, crate::axis::Fallback::Natural);
        assert_eq!(arranged[0].display, vec![Value::text("WA")]);
        assert_eq!(arranged[1].display, vec![Value::text("California")]);
    }

    #[test]
    fn test_parse_single_or_many() {
        let one = r#"{"kind": "chart", "series": {}, "series_options": {}}"#;
        assert_eq!(parse_documents(one).unwrap().len(), 1);
        let many = format!("[{}, {}]", one, one);
        assert_eq!(parse_documents(&many).unwrap().len(), 2);
    }
}
