//! Chart assembly.
//!
//! Walks a pool's data and emits a charting-library options object: a `series`
//! array with one record per plotted line plus axis and title settings. Options
//! are plain JSON objects; anything the user passes is deep merged over the
//! generated defaults.

use crate::axis::{AxisTransform, Fallback};
use crate::error::{Result, SpecError};
use crate::normalize::title_case;
use crate::pivot::PivotDataPool;
use crate::pool::DataPool;
use crate::value::{join_tuple, Tuple, Value, NULL};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{json, Map, Value as Json};
use std::collections::BTreeMap;

pub type ChartOptions = Map<String, Json>;

/// Key naming the x-axis term in the map form of flat series options.
pub const X_AXIS_TERM: &str = "_x_axis_term";

const DEFAULT_RENDER_TO: &str = "container";

/// Anything that carries a finished options object.
pub trait ChartConfig {
    fn options(&self) -> &ChartOptions;
}

/// Deep merge `overrides` into `target`. Nested objects merge; everything else is replaced.
pub fn merge_options(target: &mut ChartOptions, overrides: &ChartOptions) {
    for (key, value) in overrides {
        if let (Some(Json::Object(existing)), Json::Object(incoming)) = (target.get_mut(key), value)
        {
            merge_options(existing, incoming);
            continue;
        }
        target.insert(key.clone(), value.clone());
    }
}

fn object(value: Json) -> ChartOptions {
    match value {
        Json::Object(map) => map,
        _ => Map::new(),
    }
}

fn ensure_object(slot: &mut Json) -> &mut ChartOptions {
    if !slot.is_object() {
        *slot = Json::Object(Map::new());
    }
    match slot {
        Json::Object(map) => map,
        _ => unreachable!("slot holds an object"),
    }
}

/// The axis list under `key`, wrapping a single axis object and padding to `len`.
fn axis_list<'a>(options: &'a mut ChartOptions, key: &str, len: usize) -> &'a mut Vec<Json> {
    let slot = options
        .entry(key.to_string())
        .or_insert_with(|| Json::Array(Vec::new()));
    if !slot.is_array() {
        let single = std::mem::take(slot);
        *slot = Json::Array(if single.is_object() { vec![single] } else { Vec::new() });
    }
    match slot {
        Json::Array(axes) => {
            while axes.len() < len {
                axes.push(json!({}));
            }
            axes
        }
        _ => unreachable!("slot holds an array"),
    }
}

fn has_title(axis: &Json) -> bool {
    axis.pointer("/title/text")
        .and_then(Json::as_str)
        .map_or(false, |t| !t.is_empty())
}

fn unknown_term(term: &str, valid: impl Iterator<Item = impl AsRef<str>>) -> SpecError {
    SpecError::UnknownTerm {
        term: term.to_string(),
        valid: valid.map(|v| v.as_ref().to_string()).collect::<Vec<_>>().join(", "),
    }
}

/// A term listed in series options: a bare name or `{name: options}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ChartTermItem {
    Name(String),
    Named(IndexMap<String, ChartOptions>),
}

impl ChartTermItem {
    fn resolve(&self, defaults: &ChartOptions) -> Vec<(String, ChartOptions)> {
        match self {
            ChartTermItem::Name(name) => vec![(name.clone(), defaults.clone())],
            ChartTermItem::Named(map) => map
                .iter()
                .map(|(name, overrides)| {
                    let mut opts = defaults.clone();
                    opts.extend(overrides.clone());
                    (name.clone(), opts)
                })
                .collect(),
        }
    }
}

// =============================================================================
// Pivot charts
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PivotOptionsBlock {
    pub options: Option<ChartOptions>,
    pub terms: Option<Vec<ChartTermItem>>,
}

/// Per-term display options of a pivot chart.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum PivotSeriesOptions {
    Map(IndexMap<String, ChartOptions>),
    Blocks(Vec<PivotOptionsBlock>),
}

impl PivotSeriesOptions {
    /// Plot `terms` with the same display options.
    pub fn terms<I, S>(options: ChartOptions, terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        PivotSeriesOptions::Blocks(vec![PivotOptionsBlock {
            options: Some(options),
            terms: Some(terms.into_iter().map(|t| ChartTermItem::Name(t.into())).collect()),
        }])
    }

    fn clean(&self, pool: &PivotDataPool) -> std::result::Result<IndexMap<String, ChartOptions>, SpecError> {
        let cleaned = match self {
            PivotSeriesOptions::Map(map) => map.clone(),
            PivotSeriesOptions::Blocks(blocks) => {
                let mut cleaned = IndexMap::new();
                for (idx, block) in blocks.iter().enumerate() {
                    let context = format!("series_options block {}", idx);
                    let options = block
                        .options
                        .as_ref()
                        .ok_or_else(|| SpecError::missing("options", context.as_str()))?;
                    let terms = block
                        .terms
                        .as_ref()
                        .ok_or_else(|| SpecError::missing("terms", context.as_str()))?;
                    for item in terms {
                        cleaned.extend(item.resolve(options));
                    }
                }
                cleaned
            }
        };
        if cleaned.is_empty() {
            return Err(SpecError::EmptyCollection("series_options".to_string()));
        }
        for term in cleaned.keys() {
            if !pool.series().contains_key(term) {
                return Err(unknown_term(term, pool.series().keys()));
            }
        }
        Ok(cleaned)
    }
}

/// Chart over a [`PivotDataPool`]: one series per term and legend tuple.
#[derive(Debug, Clone, PartialEq)]
pub struct PivotChart {
    options: ChartOptions,
}

impl PivotChart {
    pub fn new(
        pool: &PivotDataPool,
        series_options: &PivotSeriesOptions,
        chart_options: Option<&ChartOptions>,
    ) -> Result<Self> {
        let series_options = series_options.clean(pool)?;

        let mut options = object(json!({
            "chart": {"renderTo": DEFAULT_RENDER_TO},
            "title": {"text": pivot_title(pool, &series_options)},
        }));
        if let Some(user) = chart_options {
            merge_options(&mut options, user);
        }

        let mut series = Vec::new();
        for (term, term_options) in &series_options {
            let Some(data) = pool.term(term) else {
                continue;
            };
            for legend in &data.legends {
                let values: Vec<Json> = pool
                    .categories_raw()
                    .iter()
                    .map(|category| data.value(category, legend).unwrap_or(&NULL).to_json())
                    .collect();
                let name = if legend.is_empty() {
                    title_case(&term.replace('_', " "))
                } else {
                    join_tuple(legend, "-")
                };
                let mut record = term_options.clone();
                record.insert("data".to_string(), Json::Array(values));
                record.insert("name".to_string(), Json::String(name));
                series.push(Json::Object(record));
            }
        }
        options.insert("series".to_string(), Json::Array(series));

        let categories: Vec<Json> = pool
            .categories()
            .iter()
            .map(|c| Json::String(join_tuple(c, ":")))
            .collect();
        let x_axes = axis_list(&mut options, "xAxis", 1);
        ensure_object(&mut x_axes[0]).insert("categories".to_string(), Json::Array(categories));

        Ok(Self { options })
    }
}

fn pivot_title(pool: &PivotDataPool, series_options: &IndexMap<String, ChartOptions>) -> String {
    let series = pool.series();
    let mut parts = Vec::new();
    for term in series_options.keys() {
        let Some(spec) = series.get(term) else {
            continue;
        };
        let legend: Vec<&str> = spec
            .legend_by
            .iter()
            .map(|l| spec.field_aliases.get(l).map_or(l.as_str(), |a| a.as_str()))
            .collect();
        if legend.is_empty() {
            parts.push(title_case(term));
        } else {
            parts.push(format!(
                "{} (lgnd. by {})",
                title_case(term),
                title_case(&legend.join(":"))
            ));
        }
    }
    let categories = series_options
        .keys()
        .next()
        .and_then(|term| series.get(term))
        .map(|spec| {
            spec.categories
                .iter()
                .map(|c| title_case(spec.field_aliases.get(c).map_or(c.as_str(), |a| a.as_str())))
                .collect::<Vec<_>>()
                .join(":")
        })
        .unwrap_or_default();
    format!("{} vs. {}", parts.join(", "), categories)
}

impl ChartConfig for PivotChart {
    fn options(&self) -> &ChartOptions {
        &self.options
    }
}

impl Serialize for PivotChart {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.options.serialize(serializer)
    }
}

// =============================================================================
// Flat charts
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ChartOptionsBlock {
    pub options: Option<ChartOptions>,
    /// x term -> y terms plotted against it.
    pub terms: Option<IndexMap<String, Vec<ChartTermItem>>>,
}

/// Per-term display options of a flat chart.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ChartSeriesOptions {
    /// y term -> options, each carrying `_x_axis_term`.
    Map(IndexMap<String, ChartOptions>),
    Blocks(Vec<ChartOptionsBlock>),
}

impl ChartSeriesOptions {
    /// Plot `y_terms` against `x_term` with the same display options.
    pub fn plot<I, S>(options: ChartOptions, x_term: &str, y_terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let items = y_terms.into_iter().map(|t| ChartTermItem::Name(t.into())).collect();
        ChartSeriesOptions::Blocks(vec![ChartOptionsBlock {
            options: Some(options),
            terms: Some([(x_term.to_string(), items)].into_iter().collect()),
        }])
    }

    fn clean(&self, pool: &DataPool) -> std::result::Result<IndexMap<String, YTerm>, SpecError> {
        let mut cleaned = IndexMap::new();
        match self {
            ChartSeriesOptions::Map(map) => {
                for (y_term, opts) in map {
                    let mut options = opts.clone();
                    let x_term = match options.remove(X_AXIS_TERM) {
                        Some(Json::String(x)) => x,
                        Some(other) => {
                            return Err(SpecError::mismatch(
                                X_AXIS_TERM,
                                "a term name",
                                other.to_string(),
                            ))
                        }
                        None => {
                            return Err(SpecError::missing(
                                X_AXIS_TERM,
                                format!("series options of '{}'", y_term),
                            ))
                        }
                    };
                    cleaned.insert(y_term.clone(), YTerm { x_term, options });
                }
            }
            ChartSeriesOptions::Blocks(blocks) => {
                for (idx, block) in blocks.iter().enumerate() {
                    let context = format!("series_options block {}", idx);
                    let options = block
                        .options
                        .as_ref()
                        .ok_or_else(|| SpecError::missing("options", context.as_str()))?;
                    let terms = block
                        .terms
                        .as_ref()
                        .ok_or_else(|| SpecError::missing("terms", context.as_str()))?;
                    if terms.is_empty() {
                        return Err(SpecError::EmptyCollection(format!("terms of {}", context)));
                    }
                    for (x_term, y_items) in terms {
                        for item in y_items {
                            for (y_term, options) in item.resolve(options) {
                                let x_term = x_term.clone();
                                cleaned.insert(y_term, YTerm { x_term, options });
                            }
                        }
                    }
                }
            }
        }

        if cleaned.is_empty() {
            return Err(SpecError::EmptyCollection("series_options".to_string()));
        }
        for (y_term, y) in &cleaned {
            for term in [y_term, &y.x_term] {
                if pool.term(term).is_none() {
                    return Err(unknown_term(term, pool.series().keys()));
                }
            }
            if !pool.same_rows(y_term, &y.x_term) {
                return Err(SpecError::Malformed(format!(
                    "'{}' and '{}' do not belong to the same table",
                    y_term, y.x_term
                )));
            }
        }
        Ok(cleaned)
    }
}

#[derive(Debug, Clone)]
struct YTerm {
    x_term: String,
    options: ChartOptions,
}

impl YTerm {
    fn axis_index(&self, key: &str) -> usize {
        self.options
            .get(key)
            .and_then(Json::as_u64)
            .unwrap_or(0) as usize
    }

    fn chart_type(&self) -> &str {
        self.options
            .get("type")
            .and_then(Json::as_str)
            .unwrap_or("line")
    }

    fn plot_kind(&self) -> PlotKind {
        match self.chart_type() {
            "scatter" | "pie" => PlotKind::Scatter,
            _ => PlotKind::Line,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum PlotKind {
    /// `[x, y]` pairs.
    Scatter,
    /// y values against shared x categories.
    Line,
}

/// y terms plotted against one x term, all from the same rows.
type XYTerms = (String, Vec<String>);

/// Chart over a flat [`DataPool`].
#[derive(Debug, Clone, PartialEq)]
pub struct Chart {
    options: ChartOptions,
}

impl Chart {
    /// `x_transforms[n]` orders and maps the values of x axis `n`; missing entries are identity.
    pub fn new(
        pool: &DataPool,
        series_options: &ChartSeriesOptions,
        chart_options: Option<&ChartOptions>,
        x_transforms: &[AxisTransform],
    ) -> Result<Self> {
        let terms = series_options.clean(pool)?;
        let axes = group_by_axis_and_rows(pool, &terms);

        let mut options = object(json!({
            "chart": {"renderTo": DEFAULT_RENDER_TO},
            "title": {"text": flat_title(pool, &axes)},
        }));
        if let Some(user) = chart_options {
            merge_options(&mut options, user);
        }
        set_axis_titles(&mut options, pool, &terms);

        let mut series = Vec::new();
        for (axis, pairs) in &axes {
            let transform = x_transforms.get(*axis).cloned().unwrap_or_default();
            let mut by_kind: IndexMap<PlotKind, Vec<XYTerms>> = IndexMap::new();
            for (x_term, y_terms) in pairs {
                let mut split: IndexMap<PlotKind, Vec<String>> = IndexMap::new();
                for y_term in y_terms {
                    split.entry(terms[y_term].plot_kind()).or_default().push(y_term.clone());
                }
                for (kind, ys) in split {
                    by_kind.entry(kind).or_default().push((x_term.clone(), ys));
                }
            }
            for (kind, pairs) in by_kind {
                let plot = Plot {
                    pool,
                    terms: &terms,
                    transform: &transform,
                };
                match kind {
                    PlotKind::Scatter => {
                        for pair in &pairs {
                            series.extend(plot.scatter(pair));
                        }
                    }
                    PlotKind::Line => {
                        let (categories, records) = plot.lines(&pairs);
                        let x_axes = axis_list(&mut options, "xAxis", axis + 1);
                        ensure_object(&mut x_axes[*axis])
                            .insert("categories".to_string(), Json::Array(categories));
                        series.extend(records);
                    }
                }
            }
        }
        options.insert("series".to_string(), Json::Array(series));
        Ok(Self { options })
    }
}

impl ChartConfig for Chart {
    fn options(&self) -> &ChartOptions {
        &self.options
    }
}

impl Serialize for Chart {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.options.serialize(serializer)
    }
}

/// x axis index -> (x term, y terms), with pairs of the same query adjacent.
fn group_by_axis_and_rows(
    pool: &DataPool,
    terms: &IndexMap<String, YTerm>,
) -> BTreeMap<usize, Vec<XYTerms>> {
    let group_of = |term: &str| {
        pool.query_groups()
            .iter()
            .position(|g| g.terms.iter().any(|t| t == term))
            .unwrap_or(0)
    };
    let mut axes: BTreeMap<usize, BTreeMap<usize, IndexMap<String, Vec<String>>>> = BTreeMap::new();
    for (y_term, y) in terms {
        axes.entry(y.axis_index("xAxis"))
            .or_default()
            .entry(group_of(&y.x_term))
            .or_default()
            .entry(y.x_term.clone())
            .or_default()
            .push(y_term.clone());
    }
    axes.into_iter()
        .map(|(axis, groups)| (axis, groups.into_values().flatten().collect()))
        .collect()
}

fn alias(pool: &DataPool, term: &str) -> String {
    pool.term(term)
        .map(|t| t.field_alias.clone())
        .unwrap_or_else(|| term.to_string())
}

fn flat_title(pool: &DataPool, axes: &BTreeMap<usize, Vec<XYTerms>>) -> String {
    axes.values()
        .flatten()
        .map(|(x_term, y_terms)| {
            let ys: Vec<String> = y_terms.iter().map(|y| title_case(&alias(pool, y))).collect();
            format!("{} vs. {}", ys.join(", "), title_case(&alias(pool, x_term)))
        })
        .collect::<Vec<_>>()
        .join(" & ")
}

fn set_axis_titles(options: &mut ChartOptions, pool: &DataPool, terms: &IndexMap<String, YTerm>) {
    let x_titles: Vec<(String, usize)> = terms
        .values()
        .map(|y| (title_case(&alias(pool, &y.x_term)), y.axis_index("xAxis")))
        .collect();
    let y_titles: Vec<(String, usize)> = terms
        .iter()
        .map(|(name, y)| (title_case(&alias(pool, name)), y.axis_index("yAxis")))
        .collect();

    for (key, titles) in [("xAxis", x_titles), ("yAxis", y_titles)] {
        let max_index = titles.iter().map(|t| t.1).max().unwrap_or(0);
        let axes = axis_list(options, key, max_index + 1);
        for (i, axis) in axes.iter_mut().enumerate() {
            if has_title(axis) {
                continue;
            }
            let text = titles
                .iter()
                .filter(|t| t.1 == i)
                .map(|t| t.0.as_str())
                .collect::<IndexSet<_>>()
                .into_iter()
                .collect::<Vec<_>>()
                .join(" & ");
            let axis = ensure_object(axis);
            ensure_object(axis.entry("title").or_insert_with(|| json!({})))
                .insert("text".to_string(), Json::String(text));
        }
        if max_index == 1 {
            let second = ensure_object(&mut axes[1]);
            if second.get("opposite") != Some(&Json::Bool(false)) {
                second.insert("opposite".to_string(), Json::Bool(true));
            }
        }
    }
}

fn x_json(display: &Tuple) -> Json {
    match display.as_slice() {
        [single] => single.to_json(),
        many => Json::String(join_tuple(many, ":")),
    }
}

struct Plot<'a> {
    pool: &'a DataPool,
    terms: &'a IndexMap<String, YTerm>,
    transform: &'a AxisTransform,
}

impl<'a> Plot<'a> {
    fn field(&self, term: &str) -> String {
        self.pool
            .term(term)
            .map(|t| t.field.clone())
            .unwrap_or_else(|| term.to_string())
    }

    /// (x, y values) per row of the x term's query.
    fn rows(&self, x_term: &str, y_terms: &[String]) -> Vec<(Value, Vec<Json>)> {
        let x_field = self.field(x_term);
        let y_fields: Vec<String> = y_terms.iter().map(|y| self.field(y)).collect();
        let Some(rows) = self.pool.rows(x_term) else {
            return Vec::new();
        };
        rows.iter()
            .map(|row| {
                let x = row.get(&x_field).unwrap_or(&NULL).clone();
                let ys = y_fields
                    .iter()
                    .map(|f| row.get(f).unwrap_or(&NULL).to_json())
                    .collect();
                (x, ys)
            })
            .collect()
    }

    fn records(&self, y_terms: &[String]) -> Vec<ChartOptions> {
        y_terms
            .iter()
            .map(|y_term| {
                let term = &self.terms[y_term];
                let mut record = term.options.clone();
                record.insert("name".to_string(), Json::String(alias(self.pool, y_term)));
                record.insert("type".to_string(), Json::String(term.chart_type().to_string()));
                record
            })
            .collect()
    }

    fn arrange(&self, data: Vec<(Value, Vec<Json>)>) -> Vec<(Json, Vec<Json>)> {
        let items = data.into_iter().map(|(x, ys)| (vec![x], ys)).collect();
        self.transform
            .arrange(items, Fallback::Natural)
            .into_iter()
            .map(|a| (x_json(&a.display), a.payload))
            .collect()
    }

    fn scatter(&self, (x_term, y_terms): &XYTerms) -> Vec<Json> {
        let data = self.arrange(self.rows(x_term, y_terms));
        self.records(y_terms)
            .into_iter()
            .enumerate()
            .map(|(i, mut record)| {
                let points = data
                    .iter()
                    .map(|(x, ys)| json!([x, ys.get(i).cloned().unwrap_or(Json::Null)]))
                    .collect();
                record.insert("data".to_string(), Json::Array(points));
                Json::Object(record)
            })
            .collect()
    }

    /// Line-like series sharing one category axis. Several x terms are merged
    /// on equal x values, with `null` where a term has no value.
    fn lines(&self, pairs: &[XYTerms]) -> (Vec<Json>, Vec<Json>) {
        let mut merged: IndexMap<Value, Vec<Json>> = IndexMap::new();
        let mut width = 0;
        let mut y_all = Vec::new();
        for (x_term, y_terms) in pairs {
            for (x, ys) in self.rows(x_term, y_terms) {
                let slot = merged.entry(x).or_default();
                slot.resize(width, Json::Null);
                slot.extend(ys);
            }
            width += y_terms.len();
            for values in merged.values_mut() {
                values.resize(width, Json::Null);
            }
            y_all.extend(y_terms.iter().cloned());
        }

        let data = self.arrange(merged.into_iter().collect());
        let categories = data.iter().map(|(x, _)| x.clone()).collect();
        let records = self
            .records(&y_all)
            .into_iter()
            .enumerate()
            .map(|(i, mut record)| {
                let values = data
                    .iter()
                    .map(|(_, ys)| ys.get(i).cloned().unwrap_or(Json::Null))
                    .collect();
                record.insert("data".to_string(), Json::Array(values));
                Json::Object(record)
            })
            .collect();
        (categories, records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::axis::AxisTransform;
    use crate::data::MemorySource;
    use crate::pivot::PivotOptions;
    use crate::source::{Aggregate, SourceRef};
    use crate::spec::{SeriesBlock, SeriesInput, TermListItem, TermOptions, TermsInput};
    use pretty_assertions::assert_eq;

    fn sales_pool() -> PivotDataPool {
        let csv = "state,city,genre,price\n\
                   CA,San Jose,Fiction,10\n\
                   CA,San Jose,Poetry,4\n\
                   WA,Seattle,Fiction,7\n";
        let source = MemorySource::from_csv_reader("sales", csv.as_bytes()).unwrap();
        let series = SeriesInput::from(SeriesBlock::new(
            TermOptions::new()
                .source(SourceRef::new(source))
                .categories(["state", "city"])
                .legend_by("genre"),
            TermsInput::map([("avg_price", Aggregate::avg("price"))]),
        ));
        PivotDataPool::new(&series, PivotOptions::default(), AxisTransform::identity()).unwrap()
    }

    fn weather_pool() -> DataPool {
        let weather = MemorySource::from_csv_reader(
            "weather",
            "month,boston_temp,houston_temp\n2,35,55\n1,30,50\n".as_bytes(),
        )
        .unwrap();
        let rain = MemorySource::from_csv_reader("rain", "month,rainfall\n1,3\n3,4\n".as_bytes()).unwrap();
        let series = SeriesInput::Blocks(vec![
            SeriesBlock::new(
                TermOptions::new().source(SourceRef::new(weather)),
                TermsInput::names(["month", "boston_temp", "houston_temp"]),
            ),
            SeriesBlock::new(
                TermOptions::new().source(SourceRef::new(rain)),
                TermsInput::List(vec![
                    TermListItem::Named(
                        [("rain_month".to_string(), crate::spec::TermEntry::Field("month".into()))]
                            .into_iter()
                            .collect(),
                    ),
                    TermListItem::Name("rainfall".into()),
                ]),
            ),
        ]);
        DataPool::new(&series).unwrap()
    }

    #[test]
    fn test_merge_options_is_deep() {
        let mut base = object(json!({"chart": {"renderTo": "container", "type": "line"}, "title": {"text": "a"}}));
        let over = object(json!({"chart": {"type": "column"}, "title": "plain"}));
        merge_options(&mut base, &over);
        assert_eq!(
            Json::Object(base),
            json!({"chart": {"renderTo": "container", "type": "column"}, "title": "plain"})
        );
    }

    #[test]
    fn test_pivot_chart_series_and_axis() {
        let pool = sales_pool();
        let so = PivotSeriesOptions::terms(object(json!({"type": "column"})), ["avg_price"]);
        let chart = PivotChart::new(&pool, &so, None).unwrap();
        let options = Json::Object(chart.options().clone());

        assert_eq!(options["chart"]["renderTo"], json!("container"));
        assert_eq!(options["title"]["text"], json!("Avg_Price (lgnd. by Genre) vs. State:City"));
        assert_eq!(options["xAxis"][0]["categories"], json!(["CA:San Jose", "WA:Seattle"]));
        assert_eq!(
            options["series"],
            json!([
                {"type": "column", "data": [10.0, 7.0], "name": "Fiction"},
                {"type": "column", "data": [4.0, null], "name": "Poetry"},
            ])
        );
    }

    #[test]
    fn test_pivot_chart_user_options_win() {
        let pool = sales_pool();
        let so = PivotSeriesOptions::Map([("avg_price".to_string(), ChartOptions::new())].into_iter().collect());
        let user = object(json!({"title": {"text": "Prices"}, "chart": {"renderTo": "prices"}}));
        let chart = PivotChart::new(&pool, &so, Some(&user)).unwrap();
        assert_eq!(chart.options()["title"]["text"], json!("Prices"));
        assert_eq!(chart.options()["chart"]["renderTo"], json!("prices"));
    }

    #[test]
    fn test_pivot_chart_rejects_unknown_term() {
        let pool = sales_pool();
        let so = PivotSeriesOptions::terms(ChartOptions::new(), ["max_price"]);
        let err = PivotChart::new(&pool, &so, None).unwrap_err();
        assert!(matches!(err.spec(), Some(SpecError::UnknownTerm { .. })));
    }

    #[test]
    fn test_pivot_series_options_deserialize() {
        let so: PivotSeriesOptions = serde_json::from_value(json!([
            {"options": {"type": "column", "stacking": true},
             "terms": ["avg_price", {"max_price": {"type": "line"}}]}
        ]))
        .unwrap();
        let PivotSeriesOptions::Blocks(blocks) = so else {
            panic!("expected blocks");
        };
        let terms = blocks[0].terms.as_ref().unwrap();
        assert_eq!(terms[0], ChartTermItem::Name("avg_price".into()));
        let resolved = terms[1].resolve(blocks[0].options.as_ref().unwrap());
        assert_eq!(Json::Object(resolved[0].1.clone()), json!({"type": "line", "stacking": true}));
    }

    #[test]
    fn test_line_chart_sorted_categories() {
        let pool = weather_pool();
        let so = ChartSeriesOptions::plot(ChartOptions::new(), "month", ["boston_temp", "houston_temp"]);
        let chart = Chart::new(&pool, &so, None, &[]).unwrap();
        let options = chart.options();
        assert_eq!(options["title"]["text"], json!("Boston Temp, Houston Temp vs. Month"));
        assert_eq!(options["xAxis"][0]["categories"], json!([1, 2]));
        assert_eq!(options["xAxis"][0]["title"]["text"], json!("Month"));
        assert_eq!(options["yAxis"][0]["title"]["text"], json!("Boston Temp & Houston Temp"));
        assert_eq!(options["series"][0]["data"], json!([30, 35]));
        assert_eq!(options["series"][1]["name"], json!("Houston Temp"));
        assert_eq!(options["series"][1]["type"], json!("line"));
    }

    #[test]
    fn test_scatter_pairs_with_mapped_axis() {
        let pool = weather_pool();
        let so = ChartSeriesOptions::plot(object(json!({"type": "scatter"})), "month", ["boston_temp"]);
        let names = AxisTransform::identity().map_with(|t| match t.first() {
            Some(Value::Int(1)) => vec![Value::text("Jan")],
            Some(Value::Int(2)) => vec![Value::text("Feb")],
            _ => t.clone(),
        });
        let chart = Chart::new(&pool, &so, None, &[names]).unwrap();
        assert_eq!(chart.options()["series"][0]["data"], json!([["Jan", 30], ["Feb", 35]]));
    }

    #[test]
    fn test_multiple_tables_merge_on_x() {
        let pool = weather_pool();
        let so: ChartSeriesOptions = serde_json::from_value(json!([
            {"options": {}, "terms": {"month": ["boston_temp"]}},
            {"options": {"type": "column"}, "terms": {"rain_month": ["rainfall"]}},
        ]))
        .unwrap();
        let chart = Chart::new(&pool, &so, None, &[]).unwrap();
        let options = chart.options();
        assert_eq!(options["xAxis"][0]["categories"], json!([1, 2, 3]));
        assert_eq!(options["series"][0]["data"], json!([30, 35, null]));
        assert_eq!(options["series"][1]["data"], json!([3, null, 4]));
        assert_eq!(
            options["title"]["text"],
            json!("Boston Temp vs. Month & Rainfall vs. Rain_Month")
        );
    }

    #[test]
    fn test_secondary_axis_is_opposite() {
        let pool = weather_pool();
        let so: ChartSeriesOptions = serde_json::from_value(json!({
            "boston_temp": {"_x_axis_term": "month"},
            "rainfall": {"_x_axis_term": "rain_month", "yAxis": 1},
        }))
        .unwrap();
        let chart = Chart::new(&pool, &so, None, &[]).unwrap();
        let options = chart.options();
        assert_eq!(options["yAxis"][1]["opposite"], json!(true));
        assert_eq!(options["yAxis"][1]["title"]["text"], json!("Rainfall"));
        assert!(options["series"][0].get(X_AXIS_TERM).is_none());
    }

    #[test]
    fn test_chart_rejects_terms_from_different_tables() {
        let pool = weather_pool();
        let so = ChartSeriesOptions::plot(ChartOptions::new(), "month", ["rainfall"]);
        let err = Chart::new(&pool, &so, None, &[]).unwrap_err();
        assert!(matches!(err.spec(), Some(SpecError::Malformed(_))));
    }

    #[test]
    fn test_chart_requires_x_axis_term() {
        let pool = weather_pool();
        let so = ChartSeriesOptions::Map([("boston_temp".to_string(), ChartOptions::new())].into_iter().collect());
        let err = Chart::new(&pool, &so, None, &[]).unwrap_err();
        assert!(matches!(err.spec(), Some(SpecError::MissingField { .. })));
    }
}
