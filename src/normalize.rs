//! Input validation and normalization.
//!
//! Both pool kinds accept the block form and the flat form of
//! [`SeriesInput`]; normalization always produces one canonical map of term
//! name to fully resolved term spec. Term names are unique in the result: when
//! the same name is declared twice the later declaration overwrites the
//! earlier one (a warning is logged).

use crate::error::SpecError;
use crate::source::{Aggregate, SourceRef};
use crate::spec::{SeriesBlock, SeriesInput, TermEntry, TermListItem, TermOptions, TermsInput};
use indexmap::IndexMap;
use log::warn;

/// A fully resolved pivot term.
#[derive(Debug, Clone, PartialEq)]
pub struct PivotTermSpec {
    pub source: SourceRef,
    pub func: Aggregate,
    pub categories: Vec<String>,
    pub legend_by: Vec<String>,
    pub top_n_per_cat: i64,
    /// Display alias for every category and legend field path.
    pub field_aliases: IndexMap<String, String>,
}

/// A fully resolved flat (non-pivot) term.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatTermSpec {
    pub source: SourceRef,
    pub field: String,
    pub field_alias: String,
}

pub type PivotSeries = IndexMap<String, PivotTermSpec>;
pub type FlatSeries = IndexMap<String, FlatTermSpec>;

#[derive(Clone, Copy, PartialEq)]
enum PoolKind {
    Pivot,
    Flat,
}

/// Normalize a pivot series specification.
pub fn normalize_pivot(series: &SeriesInput) -> Result<PivotSeries, SpecError> {
    let terms = flatten(series, PoolKind::Pivot)?;
    terms
        .iter()
        .map(|(name, opts)| Ok((name.clone(), clean_pivot_term(name, opts)?)))
        .collect()
}

/// Normalize a flat series specification.
pub fn normalize_flat(series: &SeriesInput) -> Result<FlatSeries, SpecError> {
    let terms = flatten(series, PoolKind::Flat)?;
    terms
        .iter()
        .map(|(name, opts)| Ok((name.clone(), clean_flat_term(name, opts)?)))
        .collect()
}

fn flatten(
    series: &SeriesInput,
    kind: PoolKind,
) -> Result<IndexMap<String, TermOptions>, SpecError> {
    let terms = match series {
        SeriesInput::Flat(map) => map.clone(),
        SeriesInput::Blocks(blocks) => {
            let mut terms = IndexMap::new();
            for (idx, block) in blocks.iter().enumerate() {
                flatten_block(idx, block, kind, &mut terms)?;
            }
            terms
        }
    };
    if terms.is_empty() {
        return Err(SpecError::EmptyCollection("series".to_string()));
    }
    Ok(terms)
}

fn flatten_block(
    idx: usize,
    block: &SeriesBlock,
    kind: PoolKind,
    out: &mut IndexMap<String, TermOptions>,
) -> Result<(), SpecError> {
    let context = format!("series block {}", idx);
    let options = block
        .options
        .as_ref()
        .ok_or_else(|| SpecError::missing("options", context.as_str()))?;
    let terms = block
        .terms
        .as_ref()
        .ok_or_else(|| SpecError::missing("terms", context.as_str()))?;

    match terms {
        TermsInput::Map(map) => {
            if map.is_empty() {
                return Err(SpecError::EmptyCollection(format!("terms of {}", context)));
            }
            for (name, entry) in map {
                let opts = resolve_entry(name, entry, options, kind)?;
                insert_term(out, name, opts);
            }
        }
        TermsInput::List(_) if kind == PoolKind::Pivot => {
            return Err(SpecError::mismatch(
                "terms",
                "a map of term name to aggregate or options",
                format!("a list in {}", context),
            ));
        }
        TermsInput::List(items) => {
            for item in items {
                match item {
                    TermListItem::Name(name) => insert_term(out, name, options.clone()),
                    TermListItem::Named(map) => {
                        for (name, entry) in map {
                            let opts = resolve_entry(name, entry, options, kind)?;
                            insert_term(out, name, opts);
                        }
                    }
                }
            }
        }
    }
    Ok(())
}

fn resolve_entry(
    name: &str,
    entry: &TermEntry,
    defaults: &TermOptions,
    kind: PoolKind,
) -> Result<TermOptions, SpecError> {
    let key = format!("term '{}'", name);
    match (entry, kind) {
        (TermEntry::Options(overrides), _) => Ok(defaults.merged(overrides)),
        (TermEntry::Aggregate(func), PoolKind::Pivot) => {
            Ok(defaults.merged(&TermOptions::new().func(func.clone())))
        }
        (TermEntry::Field(field), PoolKind::Flat) => {
            Ok(defaults.merged(&TermOptions::new().field(field)))
        }
        (TermEntry::Field(field), PoolKind::Pivot) => Err(SpecError::mismatch(
            &key,
            "an aggregate or an options map",
            format!("field path {:?}", field),
        )),
        (TermEntry::Aggregate(func), PoolKind::Flat) => Err(SpecError::mismatch(
            &key,
            "a field path or an options map",
            format!("aggregate {}", func),
        )),
    }
}

fn insert_term(out: &mut IndexMap<String, TermOptions>, name: &str, opts: TermOptions) {
    if out.insert(name.to_string(), opts).is_some() {
        warn!("term '{}' is declared more than once; the last declaration wins", name);
    }
}

fn clean_pivot_term(name: &str, opts: &TermOptions) -> Result<PivotTermSpec, SpecError> {
    let context = format!("term '{}'", name);
    let source = opts
        .source
        .clone()
        .ok_or_else(|| SpecError::missing("source", context.as_str()))?;
    let func = opts
        .func
        .clone()
        .ok_or_else(|| SpecError::missing("func", context.as_str()))?;
    let categories = opts
        .categories
        .clone()
        .ok_or_else(|| SpecError::missing("categories", context.as_str()))?
        .into_vec();
    if categories.is_empty() {
        return Err(SpecError::EmptyCollection(format!("categories of {}", context)));
    }
    let legend_by = opts
        .legend_by
        .clone()
        .map(|l| l.into_vec())
        .unwrap_or_default();
    // The aggregate is stored under the term name, next to the group-by columns.
    if categories.iter().chain(legend_by.iter()).any(|f| f == name) {
        return Err(SpecError::Malformed(format!(
            "term '{}' has the same name as one of its categories or legend_by fields",
            name
        )));
    }

    source.resolve_field(&func.field)?;

    // Legend aliases first, then categories, then whatever the user supplied.
    let mut field_aliases = IndexMap::new();
    for path in legend_by.iter().chain(categories.iter()) {
        field_aliases.insert(path.clone(), source.resolve_field(path)?);
    }
    if let Some(user) = &opts.field_aliases {
        for (path, alias) in user {
            field_aliases.insert(path.clone(), alias.clone());
        }
    }

    Ok(PivotTermSpec {
        source,
        func,
        categories,
        legend_by,
        top_n_per_cat: opts.top_n_per_cat.unwrap_or(0),
        field_aliases,
    })
}

fn clean_flat_term(name: &str, opts: &TermOptions) -> Result<FlatTermSpec, SpecError> {
    let source = opts
        .source
        .clone()
        .ok_or_else(|| SpecError::missing("source", format!("term '{}'", name)))?;
    let field = opts.field.clone().unwrap_or_else(|| name.to_string());
    let verbose_name = source.resolve_field(&field)?;
    // A term name that differs from its field path is the alias.
    let field_alias = match &opts.field_alias {
        Some(alias) => alias.clone(),
        None if name != field => name.to_string(),
        None => title_case(&verbose_name),
    };
    Ok(FlatTermSpec {
        source,
        field,
        field_alias,
    })
}

impl From<&PivotTermSpec> for TermOptions {
    fn from(spec: &PivotTermSpec) -> Self {
        TermOptions::new()
            .source(spec.source.clone())
            .func(spec.func.clone())
            .categories(spec.categories.clone())
            .legend_by(spec.legend_by.clone())
            .top_n_per_cat(spec.top_n_per_cat)
            .field_aliases(spec.field_aliases.clone())
    }
}

impl From<&FlatTermSpec> for TermOptions {
    fn from(spec: &FlatTermSpec) -> Self {
        TermOptions::new()
            .source(spec.source.clone())
            .field(&spec.field)
            .alias(&spec.field_alias)
    }
}

impl From<&PivotSeries> for SeriesInput {
    fn from(series: &PivotSeries) -> Self {
        SeriesInput::Flat(
            series
                .iter()
                .map(|(name, spec)| (name.clone(), TermOptions::from(spec)))
                .collect(),
        )
    }
}

impl From<&FlatSeries> for SeriesInput {
    fn from(series: &FlatSeries) -> Self {
        SeriesInput::Flat(
            series
                .iter()
                .map(|(name, spec)| (name.clone(), TermOptions::from(spec)))
                .collect(),
        )
    }
}

/// Capitalize the first letter of every word, lowercase the rest.
pub fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_word = false;
    for c in s.chars() {
        if c.is_alphabetic() {
            if in_word {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            in_word = true;
        } else {
            out.push(c);
            in_word = false;
        }
    }
    out
}
