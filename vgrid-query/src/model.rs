//! The filter and sort models as configured by the grid.
//!
//! Column ids are kept as plain strings here, they are only resolved against
//! the record layout when a query is built so that speculative columns
//! configured by the grid never fail.

use std::collections::BTreeMap;

use serde_derive::Deserialize;
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
/// An error that can occur when reading a grid model.
pub enum ModelError {
    #[error("malformed grid model: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
/// A single `contains` predicate on a column.
pub struct FilterClause {
    pub column: String,
    pub needle: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
/// A set of [FilterClause]s that must all match for a row to be retained.
///
/// Each column appears at most once, inserting a clause for a column that
/// already has one replaces it.
pub struct FilterSpec {
    clauses: Vec<FilterClause>,
}

impl FilterSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a clause, returning the updated spec.
    pub fn with(mut self, column: impl Into<String>, needle: impl Into<String>) -> Self {
        self.insert(column, needle);
        self
    }

    /// Adds a clause, replacing any existing clause on the same column.
    pub fn insert(&mut self, column: impl Into<String>, needle: impl Into<String>) {
        let column = column.into();
        let needle = needle.into();
        match self.clauses.iter_mut().find(|clause| clause.column == column) {
            Some(existing) => existing.needle = needle,
            None => self.clauses.push(FilterClause { column, needle }),
        }
    }

    pub fn clauses(&self) -> &[FilterClause] {
        &self.clauses
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Reads the grid's filter model.
    ///
    /// The model maps column ids to filter instances, e.g.
    /// `{"name": {"filterType": "text", "filter": "row 1"}}`. Only text filters
    /// with a non-empty needle are kept, anything else is ignored.
    pub fn from_grid_model(model: &Value) -> Result<Self, ModelError> {
        let entries: BTreeMap<String, GridFilterEntry> = serde_json::from_value(model.clone())?;

        let mut spec = Self::new();
        for (column, entry) in entries {
            if entry.filter_type.as_deref() != Some("text") {
                continue;
            }

            match entry.filter {
                Some(Value::String(needle)) if !needle.is_empty() => spec.insert(column, needle),
                _ => {},
            }
        }

        Ok(spec)
    }

    /// Rebuilds the spec so that only the last clause per column remains.
    ///
    /// Specs built through [FilterSpec::insert] already satisfy this, it is
    /// only needed for specs deserialized from a clause list.
    pub fn dedup(self) -> Self {
        let mut spec = Self::new();
        for clause in self.clauses {
            spec.insert(clause.column, clause.needle);
        }
        spec
    }
}

#[derive(Debug, Deserialize)]
struct GridFilterEntry {
    #[serde(rename = "filterType")]
    filter_type: Option<String>,
    filter: Option<Value>,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
/// A single sort key as sent by the grid, `{"col_id": "id", "sort": "desc"}`.
pub struct SortKey {
    #[serde(rename = "col_id")]
    pub column: String,
    #[serde(rename = "sort")]
    pub direction: SortDirection,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
/// An ordered list of sort keys, the first key dominates and later keys
/// only break ties.
pub struct SortSpec {
    keys: Vec<SortKey>,
}

impl SortSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then_by(mut self, column: impl Into<String>, direction: SortDirection) -> Self {
        self.keys.push(SortKey {
            column: column.into(),
            direction,
        });
        self
    }

    pub fn keys(&self) -> &[SortKey] {
        &self.keys
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Reads the grid's sort model, `[{"col_id": "...", "sort": "asc"}]`.
    pub fn from_grid_model(model: &Value) -> Result<Self, ModelError> {
        Ok(serde_json::from_value(model.clone())?)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_insert_replaces_existing_column() {
        let spec = FilterSpec::new().with("name", "row").with("id", "1").with("name", "col");
        assert_eq!(
            spec.clauses(),
            &[
                FilterClause { column: "name".into(), needle: "col".into() },
                FilterClause { column: "id".into(), needle: "1".into() },
            ]
        );
    }

    #[test]
    fn test_filter_from_grid_model() {
        let model = json!({
            "name": { "filterType": "text", "type": "contains", "filter": "row 1" },
            "id": { "filterType": "number", "filter": 4 },
            "value": { "filterType": "text", "filter": "" },
            "a": { "filterType": "text" },
        });
        let spec = FilterSpec::from_grid_model(&model).unwrap();
        assert_eq!(spec, FilterSpec::new().with("name", "row 1"));
    }

    #[rstest::rstest]
    #[case(json!({}), true)]
    #[case(json!({ "name": { "filterType": "text", "filter": "x" } }), true)]
    #[case(json!([1, 2]), false)]
    #[case(json!({ "name": "not an object" }), false)]
    fn test_filter_grid_model_parse(#[case] model: Value, #[case] is_ok: bool) {
        let result = FilterSpec::from_grid_model(&model);
        assert_eq!(result.is_ok(), is_ok, "Expected parse status ok={is_ok}, got: {result:?}");
    }

    #[test]
    fn test_filter_deserialize_and_dedup() {
        let spec: FilterSpec = serde_json::from_value(json!([
            { "column": "name", "needle": "a" },
            { "column": "name", "needle": "b" },
        ]))
        .unwrap();
        assert_eq!(spec.clauses().len(), 2);
        assert_eq!(spec.dedup(), FilterSpec::new().with("name", "b"));
    }

    #[rstest::rstest]
    #[case(json!([]), true)]
    #[case(json!([{ "col_id": "id", "sort": "desc" }, { "col_id": "name", "sort": "asc" }]), true)]
    #[case(json!([{ "col_id": "id", "sort": "sideways" }]), false)]
    #[case(json!([{ "sort": "asc" }]), false)]
    fn test_sort_grid_model_parse(#[case] model: Value, #[case] is_ok: bool) {
        let result = SortSpec::from_grid_model(&model);
        assert_eq!(result.is_ok(), is_ok, "Expected parse status ok={is_ok}, got: {result:?}");
    }

    #[test]
    fn test_sort_from_grid_model() {
        let model = json!([{ "col_id": "id", "sort": "desc" }, { "col_id": "name", "sort": "asc" }]);
        let spec = SortSpec::from_grid_model(&model).unwrap();
        assert_eq!(
            spec,
            SortSpec::new()
                .then_by("id", SortDirection::Desc)
                .then_by("name", SortDirection::Asc)
        );
    }
}
