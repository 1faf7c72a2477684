//! Sort and map transforms for category axes.
//!
//! A sort function turns a tuple into the key it is ordered by; a map function
//! turns a raw tuple into its display form. Both must be pure: they are called
//! any number of times and in either order depending on `mts`.

use crate::value::Tuple;
use std::fmt;
use std::sync::Arc;

pub type SortFn = Arc<dyn Fn(&Tuple) -> Tuple + Send + Sync>;
pub type MapFn = Arc<dyn Fn(&Tuple) -> Tuple + Send + Sync>;

/// What to do when no sort function is configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fallback {
    /// Natural tuple order.
    Natural,
    /// Keep the incoming order.
    Preserve,
}

/// One axis entry after arrangement.
#[derive(Debug, Clone, PartialEq)]
pub struct Arranged<T> {
    pub raw: Tuple,
    pub display: Tuple,
    pub payload: T,
}

#[derive(Clone, Default)]
pub struct AxisTransform {
    pub sortf: Option<SortFn>,
    pub mapf: Option<MapFn>,
    /// Map then sort. When false, raw tuples are sorted and then mapped.
    pub mts: bool,
}

impl fmt::Debug for AxisTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AxisTransform")
            .field("sortf", &self.sortf.is_some())
            .field("mapf", &self.mapf.is_some())
            .field("mts", &self.mts)
            .finish()
    }
}

impl AxisTransform {
    pub fn identity() -> Self {
        Self::default()
    }

    pub fn sort_by<F>(mut self, f: F) -> Self
    where
        F: Fn(&Tuple) -> Tuple + Send + Sync + 'static,
    {
        self.sortf = Some(Arc::new(f));
        self
    }

    pub fn map_with<F>(mut self, f: F) -> Self
    where
        F: Fn(&Tuple) -> Tuple + Send + Sync + 'static,
    {
        self.mapf = Some(Arc::new(f));
        self
    }

    pub fn map_then_sort(mut self, mts: bool) -> Self {
        self.mts = mts;
        self
    }

    /// Display form of a raw tuple.
    pub fn map(&self, raw: &Tuple) -> Tuple {
        match &self.mapf {
            Some(mapf) => mapf(raw),
            None => raw.clone(),
        }
    }

    /// Order `items` by their tuples and attach display tuples.
    ///
    /// Without `mts` the raw tuples are sorted and then mapped; with `mts` the
    /// mapped tuples are sorted. Sorting is stable.
    pub fn arrange<T>(&self, items: Vec<(Tuple, T)>, fallback: Fallback) -> Vec<Arranged<T>> {
        let mut arranged = self.map_only(items);
        let sort_on_display = self.mts;
        let key_of = |a: &Arranged<T>| -> Tuple {
            let basis = if sort_on_display { &a.display } else { &a.raw };
            match &self.sortf {
                Some(sortf) => sortf(basis),
                None => basis.clone(),
            }
        };
        if self.sortf.is_some() || fallback == Fallback::Natural {
            arranged.sort_by_cached_key(key_of);
        }
        arranged
    }

    /// Attach display tuples, keeping the incoming order.
    pub fn map_only<T>(&self, items: Vec<(Tuple, T)>) -> Vec<Arranged<T>> {
        items
            .into_iter()
            .map(|(raw, payload)| Arranged {
                display: self.map(&raw),
                raw,
                payload,
            })
            .collect()
    }
}

/// Ordered raw and display category tuples of one axis.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AxisValues {
    pub raw: Vec<Tuple>,
    pub display: Vec<Tuple>,
}

impl<T> FromIterator<Arranged<T>> for AxisValues {
    fn from_iter<I: IntoIterator<Item = Arranged<T>>>(iter: I) -> Self {
        let (raw, display) = iter.into_iter().map(|a| (a.raw, a.display)).unzip();
        AxisValues { raw, display }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;
    use pretty_assertions::assert_eq;

    fn ints(values: &[i64]) -> Vec<(Tuple, ())> {
        values.iter().map(|v| (vec![Value::Int(*v)], ())).collect()
    }

    fn firsts(tuples: &[Tuple]) -> Vec<i64> {
        tuples
            .iter()
            .map(|t| match t[0] {
                Value::Int(i) => i,
                _ => unreachable!(),
            })
            .collect()
    }

    fn ten_minus() -> AxisTransform {
        AxisTransform::identity()
            .sort_by(|t| t.clone())
            .map_with(|t| match t[0] {
                Value::Int(n) => vec![Value::Int(10 - n)],
                _ => t.clone(),
            })
    }

    #[test]
    fn test_sort_then_map() {
        let axis: AxisValues = ten_minus().arrange(ints(&[3, 1, 2]), Fallback::Natural).into_iter().collect();
        assert_eq!(firsts(&axis.raw), vec![1, 2, 3]);
        assert_eq!(firsts(&axis.display), vec![9, 8, 7]);
    }

    #[test]
    fn test_map_then_sort() {
        let transform = ten_minus().map_then_sort(true);
        let mapped = transform.map_only(ints(&[3, 1, 2]));
        let display: Vec<Tuple> = mapped.into_iter().map(|a| a.display).collect();
        assert_eq!(firsts(&display), vec![7, 9, 8]);

        let axis: AxisValues = transform.arrange(ints(&[3, 1, 2]), Fallback::Natural).into_iter().collect();
        assert_eq!(firsts(&axis.display), vec![7, 8, 9]);
        assert_eq!(firsts(&axis.raw), vec![3, 2, 1]);
    }

    #[test]
    fn test_fallback() {
        let identity = AxisTransform::identity();
        let natural: AxisValues = identity.arrange(ints(&[3, 1, 2]), Fallback::Natural).into_iter().collect();
        assert_eq!(firsts(&natural.raw), vec![1, 2, 3]);
        let kept: AxisValues = identity.arrange(ints(&[3, 1, 2]), Fallback::Preserve).into_iter().collect();
        assert_eq!(firsts(&kept.raw), vec![3, 1, 2]);
    }

    #[test]
    fn test_reverse_sort_key() {
        let transform = AxisTransform::identity().sort_by(|t| match t[0] {
            Value::Int(n) => vec![Value::Int(-n)],
            _ => t.clone(),
        });
        let axis: AxisValues = transform.arrange(ints(&[2, 3, 1]), Fallback::Preserve).into_iter().collect();
        assert_eq!(firsts(&axis.raw), vec![3, 2, 1]);
    }

    #[test]
    fn test_payload_follows_tuple() {
        let items = vec![
            (vec![Value::text("b")], 2),
            (vec![Value::text("a")], 1),
        ];
        let arranged = AxisTransform::identity().arrange(items, Fallback::Natural);
        assert_eq!(arranged[0].payload, 1);
        assert_eq!(arranged[1].payload, 2);
    }
}
