use std::borrow::Cow;
use std::cmp::Ordering;
use std::fmt::Write as _;
use std::time::Instant;

use tracing::{debug, warn};
use vgrid_store::{
    BufferLease,
    CellValue,
    Column,
    DecodeError,
    MaterializedRows,
    RowSource,
};

use crate::model::{FilterSpec, SortDirection, SortSpec};

/// Random access to the rows a query runs over.
pub trait Dataset {
    /// The number of rows in the dataset.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the row at `index`.
    fn row(&self, index: usize) -> Result<RowSource<'_>, DecodeError>;

    /// The revision of the underlying data, used to key name caches.
    fn revision(&self) -> u64 {
        0
    }
}

impl Dataset for BufferLease<'_> {
    fn len(&self) -> usize {
        self.record_count()
    }

    fn row(&self, index: usize) -> Result<RowSource<'_>, DecodeError> {
        self.view(index).map(RowSource::Decoded)
    }

    fn revision(&self) -> u64 {
        BufferLease::revision(self)
    }
}

impl Dataset for MaterializedRows {
    fn len(&self) -> usize {
        MaterializedRows::len(self)
    }

    fn row(&self, index: usize) -> Result<RowSource<'_>, DecodeError> {
        self.get(index)
            .map(RowSource::Materialized)
            .ok_or(DecodeError::RecordOutOfRange {
                index,
                count: MaterializedRows::len(self),
            })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
/// The ordered record indices passing the current filter, in the current sort order.
///
/// The set only ever holds indices into the dataset, never copies of rows.
pub struct IndexSet {
    indices: Vec<u32>,
}

impl IndexSet {
    #[inline]
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    #[inline]
    /// Maps a position in the set to a record index.
    pub fn get(&self, position: usize) -> Option<usize> {
        self.indices.get(position).map(|&index| index as usize)
    }

    pub fn as_slice(&self) -> &[u32] {
        &self.indices
    }
}

impl From<Vec<u32>> for IndexSet {
    fn from(indices: Vec<u32>) -> Self {
        Self { indices }
    }
}

#[derive(Debug)]
struct ResolvedClause {
    column: Column,
    needle: String,
}

#[derive(Debug)]
struct ResolvedKey {
    column: Column,
    direction: SortDirection,
}

#[derive(Debug)]
/// A filter and sort resolved against the record layout.
///
/// Clauses and keys naming a column the layout does not define are dropped
/// when the query is built, an unknown filter column matches every row and an
/// unknown sort key is skipped.
pub struct IndexQuery {
    clauses: Vec<ResolvedClause>,
    keys: Vec<ResolvedKey>,
}

impl IndexQuery {
    /// Builds a query from the grid's filter and sort specs.
    pub fn new(filter: &FilterSpec, sort: &SortSpec) -> Self {
        let mut clauses: Vec<ResolvedClause> = Vec::with_capacity(filter.clauses().len());
        for clause in filter.clauses() {
            let Some(column) = Column::from_name(&clause.column) else {
                debug!(column = %clause.column, "Ignoring filter on unknown column");
                continue;
            };

            let needle = clause.needle.to_lowercase();
            match clauses.iter_mut().find(|resolved| resolved.column == column) {
                Some(existing) => {
                    warn!(column = %column, "Column filtered twice, keeping the last clause");
                    existing.needle = needle;
                },
                None => clauses.push(ResolvedClause { column, needle }),
            }
        }

        let keys = sort
            .keys()
            .iter()
            .filter_map(|key| match Column::from_name(&key.column) {
                Some(column) => Some(ResolvedKey {
                    column,
                    direction: key.direction,
                }),
                None => {
                    debug!(column = %key.column, "Ignoring sort on unknown column");
                    None
                },
            })
            .collect();

        Self { clauses, keys }
    }

    /// Computes the filtered and sorted [IndexSet] over the dataset.
    ///
    /// The result is recomputed from scratch every call.
    pub fn evaluate<D: Dataset + ?Sized>(&self, dataset: &D) -> IndexSet {
        let start = Instant::now();

        let total = dataset.len();
        let mut indices = self.filter(dataset);
        let retained = indices.len();

        if !self.keys.is_empty() {
            indices = self.sort(dataset, indices);
        }

        debug!(
            total,
            retained,
            elapsed = ?start.elapsed(),
            "Evaluated index query"
        );

        IndexSet { indices }
    }

    fn filter<D: Dataset + ?Sized>(&self, dataset: &D) -> Vec<u32> {
        let total = dataset.len();
        if self.clauses.is_empty() {
            return (0..total as u32).collect();
        }

        let mut scratch = String::new();
        let mut failed = 0usize;
        let indices = (0..total)
            .filter(|&index| match self.matches(dataset, index, &mut scratch) {
                Ok(matches) => matches,
                Err(_) => {
                    failed += 1;
                    false
                },
            })
            .map(|index| index as u32)
            .collect();

        if failed > 0 {
            warn!(failed, "Rows failed to decode while filtering and were excluded");
        }

        indices
    }

    fn matches<D: Dataset + ?Sized>(
        &self,
        dataset: &D,
        index: usize,
        scratch: &mut String,
    ) -> Result<bool, DecodeError> {
        let row = dataset.row(index)?;
        for clause in &self.clauses {
            let cell = row.cell(clause.column)?;
            if !contains_ignore_case(&cell, &clause.needle, scratch) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn sort<D: Dataset + ?Sized>(&self, dataset: &D, indices: Vec<u32>) -> Vec<u32> {
        let width = self.keys.len();

        // Decorate each retained row with its sort keys so every row is decoded once.
        let mut values: Vec<SortValue<'_>> = Vec::with_capacity(indices.len() * width);
        for &index in &indices {
            let row = dataset.row(index as usize);
            for key in &self.keys {
                let value = match &row {
                    Ok(row) => row.cell(key.column).map(SortValue::from).unwrap_or(SortValue::Missing),
                    Err(_) => SortValue::Missing,
                };
                values.push(value);
            }
        }

        let mut order: Vec<usize> = (0..indices.len()).collect();
        // `sort_by` is stable, equal rows keep their relative order.
        order.sort_by(|&lhs, &rhs| {
            let lhs_values = &values[lhs * width..(lhs + 1) * width];
            let rhs_values = &values[rhs * width..(rhs + 1) * width];
            for (key, (l, r)) in self.keys.iter().zip(lhs_values.iter().zip(rhs_values)) {
                let ordering = match (l, r, key.direction) {
                    // Missing values stay last in either direction.
                    (SortValue::Missing, _, _) | (_, SortValue::Missing, _) => l.compare(r),
                    (_, _, SortDirection::Asc) => l.compare(r),
                    (_, _, SortDirection::Desc) => l.compare(r).reverse(),
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            Ordering::Equal
        });

        order.into_iter().map(|position| indices[position]).collect()
    }
}

/// Checks if the displayed form of `cell` contains `needle`, which must
/// already be lowercase.
fn contains_ignore_case(cell: &CellValue<'_>, needle: &str, scratch: &mut String) -> bool {
    if needle.is_empty() {
        return true;
    }

    scratch.clear();
    let _ = write!(scratch, "{cell}");
    if scratch.is_ascii() {
        scratch.make_ascii_lowercase();
        scratch.contains(needle)
    } else {
        scratch.to_lowercase().contains(needle)
    }
}

#[derive(Debug)]
enum SortValue<'a> {
    Unsigned(u32),
    Float(f64),
    Text(Cow<'a, str>),
    /// The row could not be decoded, sorts after every present value
    /// regardless of direction.
    Missing,
}

impl<'a> From<CellValue<'a>> for SortValue<'a> {
    fn from(value: CellValue<'a>) -> Self {
        match value {
            CellValue::Unsigned(v) => SortValue::Unsigned(v),
            // NaN has no numeric position, it sorts with the missing values.
            CellValue::Float(v) if v.is_nan() => SortValue::Missing,
            CellValue::Float(v) => SortValue::Float(v),
            CellValue::Text(v) => SortValue::Text(v),
        }
    }
}

impl SortValue<'_> {
    fn compare(&self, other: &Self) -> Ordering {
        match (self, other) {
            (SortValue::Unsigned(l), SortValue::Unsigned(r)) => l.cmp(r),
            (SortValue::Float(l), SortValue::Float(r)) => l.total_cmp(r),
            (SortValue::Text(l), SortValue::Text(r)) => locale_cmp(l, r),
            (SortValue::Missing, SortValue::Missing) => Ordering::Equal,
            (SortValue::Missing, _) => Ordering::Greater,
            (_, SortValue::Missing) => Ordering::Less,
            // Values of a single column always share a variant.
            _ => Ordering::Equal,
        }
    }
}

/// Compares two strings the way a user expects to see them ordered.
///
/// Strings are compared case-insensitively first, on a case-only difference
/// the lowercase form sorts first, and anything left is decided by code point.
pub fn locale_cmp(lhs: &str, rhs: &str) -> Ordering {
    let folded = lhs
        .chars()
        .flat_map(char::to_lowercase)
        .cmp(rhs.chars().flat_map(char::to_lowercase));
    if folded != Ordering::Equal {
        return folded;
    }

    lhs.chars()
        .zip(rhs.chars())
        .find(|(l, r)| l != r)
        .map(|(l, r)| match (l.is_lowercase(), r.is_lowercase()) {
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            _ => l.cmp(&r),
        })
        .unwrap_or_else(|| lhs.len().cmp(&rhs.len()))
}

#[cfg(test)]
mod tests {
    use vgrid_store::{DatasetBuilder, RawRecord, RecordStore, RecordValues};

    use super::*;

    fn store_with(records: &[(u32, &str)]) -> RecordStore {
        let mut builder = DatasetBuilder::default();
        for (id, name) in records {
            builder.push(*id, RecordValues::default(), name);
        }
        let store = RecordStore::new();
        store.populate_from(builder).unwrap();
        store
    }

    fn evaluate(store: &RecordStore, filter: &FilterSpec, sort: &SortSpec) -> Vec<u32> {
        let lease = store.lease();
        IndexQuery::new(filter, sort).evaluate(&lease).as_slice().to_vec()
    }

    #[test]
    fn test_filter_name_case_insensitive() {
        let store = store_with(&[(0, "Row 0"), (1, "Row 1"), (2, "Row 2")]);
        let filter = FilterSpec::new().with("name", "row 1");
        assert_eq!(evaluate(&store, &filter, &SortSpec::new()), vec![1]);
    }

    #[test]
    fn test_sort_id_descending() {
        let store = store_with(&[(2, "a"), (0, "b"), (1, "c")]);
        let sort = SortSpec::new().then_by("id", SortDirection::Desc);
        assert_eq!(evaluate(&store, &FilterSpec::new(), &sort), vec![0, 2, 1]);
    }

    #[rstest::rstest]
    #[case(FilterSpec::new(), vec![0, 1, 2, 3])]
    #[case(FilterSpec::new().with("id", "1"), vec![1, 3])]
    #[case(FilterSpec::new().with("value", "4"), vec![0, 1, 2, 3])]
    #[case(FilterSpec::new().with("a", "1.1"), vec![0, 1, 2, 3])]
    #[case(FilterSpec::new().with("value", "43"), vec![])]
    #[case(FilterSpec::new().with("name", "BETA"), vec![1, 3])]
    #[case(FilterSpec::new().with("name", "beta").with("id", "11"), vec![3])]
    #[case(FilterSpec::new().with("speculative", "zzz"), vec![0, 1, 2, 3])]
    #[case(FilterSpec::new().with("name", ""), vec![0, 1, 2, 3])]
    fn test_filter_cases(#[case] filter: FilterSpec, #[case] expected: Vec<u32>) {
        let store = store_with(&[(0, "alpha"), (1, "beta"), (2, "gamma"), (11, "Beta two")]);
        assert_eq!(evaluate(&store, &filter, &SortSpec::new()), expected);
    }

    #[test]
    fn test_duplicate_filter_column_last_wins() {
        let store = store_with(&[(0, "alpha"), (1, "beta")]);
        let filter: FilterSpec = serde_json::from_value(serde_json::json!([
            { "column": "name", "needle": "alpha" },
            { "column": "name", "needle": "beta" },
        ]))
        .unwrap();
        assert_eq!(evaluate(&store, &filter, &SortSpec::new()), vec![1]);
    }

    #[test]
    fn test_multi_key_sort_is_stable() {
        let store = store_with(&[(1, "b"), (0, "a"), (1, "a"), (0, "b"), (1, "a")]);

        let sort = SortSpec::new()
            .then_by("id", SortDirection::Asc)
            .then_by("name", SortDirection::Desc);
        assert_eq!(evaluate(&store, &FilterSpec::new(), &sort), vec![3, 1, 0, 2, 4]);

        // Ties on every key keep their original relative order.
        let sort = SortSpec::new().then_by("value", SortDirection::Desc);
        assert_eq!(evaluate(&store, &FilterSpec::new(), &sort), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_unknown_sort_key_is_skipped() {
        let store = store_with(&[(2, "a"), (0, "b"), (1, "c")]);
        let sort = SortSpec::new()
            .then_by("speculative", SortDirection::Asc)
            .then_by("id", SortDirection::Asc);
        assert_eq!(evaluate(&store, &FilterSpec::new(), &sort), vec![1, 2, 0]);
    }

    #[test]
    fn test_name_sort_is_case_insensitive() {
        let store = store_with(&[(0, "banana"), (1, "Apple"), (2, "apple"), (3, "Cherry")]);
        let sort = SortSpec::new().then_by("name", SortDirection::Asc);
        assert_eq!(evaluate(&store, &FilterSpec::new(), &sort), vec![2, 1, 0, 3]);
    }

    #[test]
    fn test_undecodable_rows() {
        let mut builder = DatasetBuilder::default();
        builder
            .push(0, RecordValues::default(), "fine")
            .push_raw(RawRecord::new(1, RecordValues::default(), u32::MAX, 8))
            .push(2, RecordValues::default(), "also fine");
        let store = RecordStore::new();
        store.populate_from(builder).unwrap();

        // A filter touching the broken name excludes only that row.
        let filter = FilterSpec::new().with("name", "fine");
        assert_eq!(evaluate(&store, &filter, &SortSpec::new()), vec![0, 2]);

        // Sorting never drops rows, the broken one sorts last.
        let sort = SortSpec::new().then_by("name", SortDirection::Asc);
        assert_eq!(evaluate(&store, &FilterSpec::new(), &sort), vec![2, 0, 1]);

        let sort = SortSpec::new().then_by("name", SortDirection::Desc);
        assert_eq!(evaluate(&store, &FilterSpec::new(), &sort), vec![0, 2, 1]);
    }

    #[test]
    fn test_nan_values_sort_last() {
        let mut builder = DatasetBuilder::default();
        let mut seed = 0x2545_f491_u32;
        for id in 0..2_000u32 {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            let value = if id % 3 == 0 { f64::NAN } else { f64::from(seed % 10_000) - 5_000.0 };
            builder.push(id, RecordValues { value, ..RecordValues::default() }, "row");
        }
        let store = RecordStore::new();
        store.populate_from(builder).unwrap();
        let lease = store.lease();

        for direction in [SortDirection::Asc, SortDirection::Desc] {
            let sort = SortSpec::new().then_by("value", direction);
            let indices = IndexQuery::new(&FilterSpec::new(), &sort).evaluate(&lease);
            assert_eq!(indices.len(), 2_000);

            let values: Vec<f64> = indices
                .as_slice()
                .iter()
                .map(|&index| lease.view(index as usize).unwrap().value().unwrap())
                .collect();
            let (present, nan): (Vec<f64>, Vec<f64>) = values.iter().partition(|v| !v.is_nan());
            assert_eq!(nan.len(), 667);
            assert!(values[present.len()..].iter().all(|v| v.is_nan()));

            let ordered = present.windows(2).all(|pair| match direction {
                SortDirection::Asc => pair[0] <= pair[1],
                SortDirection::Desc => pair[0] >= pair[1],
            });
            assert!(ordered, "numeric values out of order for {direction:?}");
        }
    }

    #[test]
    fn test_empty_dataset() {
        let store = RecordStore::new();
        let filter = FilterSpec::new().with("name", "x");
        let sort = SortSpec::new().then_by("id", SortDirection::Asc);
        assert!(evaluate(&store, &filter, &sort).is_empty());
    }

    #[test]
    fn test_filter_narrowing_is_monotonic() {
        let store = RecordStore::new();
        store.populate(200).unwrap();
        let sort = SortSpec::new().then_by("id", SortDirection::Desc);

        let specs = [
            FilterSpec::new(),
            FilterSpec::new().with("name", "row 1"),
            FilterSpec::new().with("name", "row 1").with("id", "5"),
            FilterSpec::new().with("name", "row 1").with("id", "5").with("value", "42"),
            FilterSpec::new().with("name", "row 1").with("id", "5").with("value", "7"),
        ];

        let mut previous = usize::MAX;
        for spec in &specs {
            let count = evaluate(&store, spec, &sort).len();
            assert!(count <= previous, "{spec:?} retained {count} > {previous}");
            previous = count;
        }
    }

    #[test]
    fn test_sorted_result_is_permutation_of_filtered() {
        let store = RecordStore::new();
        store.populate(120).unwrap();
        store.advance_time_to(1234.0).unwrap();
        let filter = FilterSpec::new().with("name", "1");

        let unsorted = evaluate(&store, &filter, &SortSpec::new());
        for sort in [
            SortSpec::new().then_by("id", SortDirection::Desc),
            SortSpec::new().then_by("name", SortDirection::Asc),
            SortSpec::new()
                .then_by("time_ms", SortDirection::Asc)
                .then_by("name", SortDirection::Desc),
        ] {
            let mut sorted = evaluate(&store, &filter, &sort);
            assert_eq!(sorted.len(), unsorted.len());
            sorted.sort_unstable();
            assert_eq!(sorted, unsorted, "{sort:?}");
        }
    }

    #[test]
    fn test_materialized_dataset_matches_buffer() {
        let store = RecordStore::new();
        store.populate(50).unwrap();
        store.advance_time_to(99.0).unwrap();
        let mut rows = MaterializedRows::populate(50);
        rows.advance_time_to(99.0);

        let query = IndexQuery::new(
            &FilterSpec::new().with("name", "row 2"),
            &SortSpec::new().then_by("id", SortDirection::Desc),
        );
        let from_buffer = query.evaluate(&store.lease());
        let from_rows = query.evaluate(&rows);
        assert_eq!(from_buffer, from_rows);
        assert_eq!(from_rows.get(0), Some(29));
    }

    #[rstest::rstest]
    #[case("a", "b", Ordering::Less)]
    #[case("B", "a", Ordering::Greater)]
    #[case("a", "A", Ordering::Less)]
    #[case("Row 10", "Row 2", Ordering::Less)]
    #[case("same", "same", Ordering::Equal)]
    #[case("ab", "a", Ordering::Greater)]
    fn test_locale_cmp(#[case] lhs: &str, #[case] rhs: &str, #[case] expected: Ordering) {
        assert_eq!(locale_cmp(lhs, rhs), expected);
    }
}
