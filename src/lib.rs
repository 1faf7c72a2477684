// Library exports for chartpool

pub mod error;
pub mod value;
pub mod source;
pub mod data;
pub mod parser;

// Pool construction
pub mod spec;
pub mod normalize;
pub mod group;
pub mod axis;
pub mod pivot;
pub mod pool;

// Output
pub mod chart;
pub mod embed;
pub mod document;

pub use axis::AxisTransform;
pub use chart::{Chart, ChartConfig, ChartOptions, ChartSeriesOptions, PivotChart, PivotSeriesOptions};
pub use data::MemorySource;
pub use document::{ChartDocument, SourceRegistry};
pub use error::{Error, Result, SpecError};
pub use pivot::{PivotDataPool, PivotOptions};
pub use pool::DataPool;
pub use source::{Aggregate, AggregateKind, DataSource, SourceRef};
pub use spec::{SeriesBlock, SeriesInput, TermEntry, TermOptions, TermsInput};
pub use value::Value;
