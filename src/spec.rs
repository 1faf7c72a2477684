//! User-facing series specification shapes.
//!
//! A series specification is either a list of `{options, terms}` blocks where
//! `options` supplies defaults for every term in the block, or an already flat
//! map of term name to term options. Both shapes are normalized by
//! [`crate::normalize`].

use crate::source::{Aggregate, SourceRef};
use indexmap::IndexMap;
use serde::Deserialize;

/// One field path or an ordered list of field paths.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum FieldList {
    One(String),
    Many(Vec<String>),
}

impl FieldList {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            FieldList::One(s) => vec![s],
            FieldList::Many(v) => v,
        }
    }
}

impl From<&str> for FieldList {
    fn from(s: &str) -> Self {
        FieldList::One(s.to_string())
    }
}

impl From<String> for FieldList {
    fn from(s: String) -> Self {
        FieldList::One(s)
    }
}

impl From<Vec<&str>> for FieldList {
    fn from(v: Vec<&str>) -> Self {
        FieldList::Many(v.into_iter().map(String::from).collect())
    }
}

impl From<Vec<String>> for FieldList {
    fn from(v: Vec<String>) -> Self {
        FieldList::Many(v)
    }
}

impl<const N: usize> From<[&str; N]> for FieldList {
    fn from(v: [&str; N]) -> Self {
        FieldList::Many(v.iter().map(|s| s.to_string()).collect())
    }
}

/// Options for a term. Unset options fall back to the enclosing block.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TermOptions {
    pub source: Option<SourceRef>,
    /// Field path to extract (flat pools). Defaults to the term name.
    pub field: Option<String>,
    /// Display alias of the extracted field (flat pools).
    pub field_alias: Option<String>,
    /// Aggregate to compute (pivot pools).
    pub func: Option<Aggregate>,
    pub categories: Option<FieldList>,
    pub legend_by: Option<FieldList>,
    pub top_n_per_cat: Option<i64>,
    /// Field path -> display alias. Replaces, never merges with, the block value.
    pub field_aliases: Option<IndexMap<String, String>>,
}

impl TermOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn source(mut self, source: SourceRef) -> Self {
        self.source = Some(source);
        self
    }

    pub fn field(mut self, field: &str) -> Self {
        self.field = Some(field.to_string());
        self
    }

    pub fn alias(mut self, alias: &str) -> Self {
        self.field_alias = Some(alias.to_string());
        self
    }

    pub fn func(mut self, func: Aggregate) -> Self {
        self.func = Some(func);
        self
    }

    pub fn categories(mut self, categories: impl Into<FieldList>) -> Self {
        self.categories = Some(categories.into());
        self
    }

    pub fn legend_by(mut self, legend_by: impl Into<FieldList>) -> Self {
        self.legend_by = Some(legend_by.into());
        self
    }

    pub fn top_n_per_cat(mut self, n: i64) -> Self {
        self.top_n_per_cat = Some(n);
        self
    }

    pub fn field_aliases<I, K, V>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.field_aliases = Some(
            aliases
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        );
        self
    }

    /// Overlay every option set in `overrides` on top of `self`.
    pub fn merged(&self, overrides: &TermOptions) -> TermOptions {
        TermOptions {
            source: overrides.source.clone().or_else(|| self.source.clone()),
            field: overrides.field.clone().or_else(|| self.field.clone()),
            field_alias: overrides
                .field_alias
                .clone()
                .or_else(|| self.field_alias.clone()),
            func: overrides.func.clone().or_else(|| self.func.clone()),
            categories: overrides
                .categories
                .clone()
                .or_else(|| self.categories.clone()),
            legend_by: overrides
                .legend_by
                .clone()
                .or_else(|| self.legend_by.clone()),
            top_n_per_cat: overrides.top_n_per_cat.or(self.top_n_per_cat),
            field_aliases: overrides
                .field_aliases
                .clone()
                .or_else(|| self.field_aliases.clone()),
        }
    }
}

/// Value attached to a term name inside a block.
#[derive(Debug, Clone, PartialEq)]
pub enum TermEntry {
    /// A field path to extract (flat pools only).
    Field(String),
    /// An aggregate (pivot pools only), shorthand for `{func: aggregate}`.
    Aggregate(Aggregate),
    /// Options overriding the block defaults.
    Options(TermOptions),
}

impl From<&str> for TermEntry {
    fn from(field: &str) -> Self {
        TermEntry::Field(field.to_string())
    }
}

impl From<Aggregate> for TermEntry {
    fn from(func: Aggregate) -> Self {
        TermEntry::Aggregate(func)
    }
}

impl From<TermOptions> for TermEntry {
    fn from(opts: TermOptions) -> Self {
        TermEntry::Options(opts)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TermListItem {
    /// A bare field name used as both term name and field path.
    Name(String),
    Named(IndexMap<String, TermEntry>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum TermsInput {
    List(Vec<TermListItem>),
    Map(IndexMap<String, TermEntry>),
}

impl TermsInput {
    /// Build the map form from `(name, entry)` pairs.
    pub fn map<I, K, E>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, E)>,
        K: Into<String>,
        E: Into<TermEntry>,
    {
        TermsInput::Map(
            entries
                .into_iter()
                .map(|(k, e)| (k.into(), e.into()))
                .collect(),
        )
    }

    /// Build the list form from bare field names.
    pub fn names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        TermsInput::List(
            names
                .into_iter()
                .map(|n| TermListItem::Name(n.into()))
                .collect(),
        )
    }
}

/// A `{options, terms}` block. Both keys are required; `None` models a missing key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeriesBlock {
    pub options: Option<TermOptions>,
    pub terms: Option<TermsInput>,
}

impl SeriesBlock {
    pub fn new(options: TermOptions, terms: TermsInput) -> Self {
        Self {
            options: Some(options),
            terms: Some(terms),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SeriesInput {
    Blocks(Vec<SeriesBlock>),
    Flat(IndexMap<String, TermOptions>),
}

impl From<Vec<SeriesBlock>> for SeriesInput {
    fn from(blocks: Vec<SeriesBlock>) -> Self {
        SeriesInput::Blocks(blocks)
    }
}

impl From<SeriesBlock> for SeriesInput {
    fn from(block: SeriesBlock) -> Self {
        SeriesInput::Blocks(vec![block])
    }
}

impl From<IndexMap<String, TermOptions>> for SeriesInput {
    fn from(map: IndexMap<String, TermOptions>) -> Self {
        SeriesInput::Flat(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_list_from_str_is_single() {
        assert_eq!(FieldList::from("state").into_vec(), vec!["state"]);
        assert_eq!(
            FieldList::from(["state", "city"]).into_vec(),
            vec!["state", "city"]
        );
    }

    #[test]
    fn test_merged_prefers_overrides() {
        let base = TermOptions::new()
            .categories("state")
            .top_n_per_cat(3)
            .field_aliases([("state", "State")]);
        let over = TermOptions::new()
            .top_n_per_cat(2)
            .field_aliases([("city", "City")]);
        let merged = base.merged(&over);
        assert_eq!(merged.top_n_per_cat, Some(2));
        assert_eq!(merged.categories, Some(FieldList::One("state".into())));
        // aliases are replaced wholesale
        let aliases = merged.field_aliases.unwrap();
        assert_eq!(aliases.len(), 1);
        assert_eq!(aliases["city"], "City");
    }
}
