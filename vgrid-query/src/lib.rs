//! Filtering and sorting of records without copying them.
//!
//! An [IndexQuery] never reorders the underlying records, it produces an
//! [IndexSet] of record indices which the viewport maps visible rows through.

mod model;
mod query;

pub use self::model::{FilterClause, FilterSpec, ModelError, SortDirection, SortKey, SortSpec};
pub use self::query::{locale_cmp, Dataset, IndexQuery, IndexSet};
