use std::time::Duration;

use clap::Subcommand;
use tracing::info;
use vgrid_query::{FilterSpec, SortDirection, SortSpec};

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run a live viewport session against a generated dataset
    Run {
        #[arg(long, env = "VGRID_ROWS", default_value_t = 100_000)]
        /// The number of records to populate the store with.
        rows: usize,
        #[arg(long, env = "VGRID_REFRESH_INTERVAL_MS", default_value_t = 1000)]
        /// How often, in milliseconds, the records' time is advanced and the
        /// visible rows are pushed.
        refresh_interval_ms: u64,
        #[arg(long, env = "VGRID_FIRST_ROW", default_value_t = 0)]
        /// The first visible row position.
        first: usize,
        #[arg(long, env = "VGRID_LAST_ROW", default_value_t = 19)]
        /// The last visible row position, inclusive.
        last: usize,
        #[arg(long = "filter", value_parser = parse_filter_clause)]
        /// A case-insensitive `column=needle` filter, may be repeated.
        filters: Vec<(String, String)>,
        #[arg(long = "sort", value_parser = parse_sort_key)]
        /// A `column:asc` or `column:desc` sort key, may be repeated.
        ///
        /// The first key dominates, later keys only break ties.
        sorts: Vec<(String, SortDirection)>,
    },
    /// Compare query timings over the shared buffer and materialized rows
    Bench {
        #[arg(long, env = "VGRID_ROWS", default_value_t = 100_000)]
        /// The number of records in each backend.
        rows: usize,
        #[arg(long, env = "VGRID_BENCH_ITERATIONS", default_value_t = 10)]
        /// How many times each query is evaluated per backend.
        iterations: usize,
    },
}

impl Commands {
    /// Triggers any additional startup messages which are aware
    /// of the provided subcommand.
    pub fn display_startup_message(&self) {
        match self {
            Commands::Run {
                rows,
                refresh_interval_ms,
                first,
                last,
                filters,
                sorts,
            } => {
                info!(
                    rows = %format_count(*rows),
                    refresh_interval_ms,
                    first,
                    last,
                    filters = filters.len(),
                    sorts = sorts.len(),
                    "Starting viewport session"
                );
            },
            Commands::Bench { rows, iterations } => {
                info!(rows = %format_count(*rows), iterations, "Starting query benchmark");
            },
        }
    }

    /// Executes the command
    pub async fn execute(self) -> anyhow::Result<()> {
        match self {
            Commands::Run {
                rows,
                refresh_interval_ms,
                first,
                last,
                filters,
                sorts,
            } => {
                let filter = filters
                    .into_iter()
                    .fold(FilterSpec::new(), |spec, (column, needle)| spec.with(column, needle));
                let sort = sorts
                    .into_iter()
                    .fold(SortSpec::new(), |spec, (column, direction)| spec.then_by(column, direction));

                crate::session::run(crate::session::SessionConfig {
                    rows,
                    refresh_interval: Duration::from_millis(refresh_interval_ms),
                    first,
                    last,
                    filter,
                    sort,
                })
                .await?
            },
            Commands::Bench { rows, iterations } => crate::bench::run(rows, iterations)?,
        }

        Ok(())
    }
}

fn parse_filter_clause(s: &str) -> Result<(String, String), String> {
    let (column, needle) = s
        .split_once('=')
        .ok_or_else(|| format!("expected `column=needle`, got {s:?}"))?;
    if column.is_empty() {
        return Err("filter column must not be empty".to_string());
    }
    Ok((column.to_string(), needle.to_string()))
}

fn parse_sort_key(s: &str) -> Result<(String, SortDirection), String> {
    let (column, direction) = match s.split_once(':') {
        Some((column, direction)) => (column, direction),
        None => (s, "asc"),
    };
    if column.is_empty() {
        return Err("sort column must not be empty".to_string());
    }

    let direction = match direction.to_ascii_lowercase().as_str() {
        "asc" => SortDirection::Asc,
        "desc" => SortDirection::Desc,
        other => return Err(format!("unknown sort direction {other:?}, expected `asc` or `desc`")),
    };
    Ok((column.to_string(), direction))
}

/// Formats a count with a compact magnitude suffix, `1500` becomes `1.5K`.
pub fn format_count(count: usize) -> String {
    const UNITS: [(f64, &str); 3] = [(1e9, "B"), (1e6, "M"), (1e3, "K")];

    let value = count as f64;
    for (scale, suffix) in UNITS {
        if value >= scale {
            let scaled = format!("{:.1}", value / scale);
            let scaled = scaled.strip_suffix(".0").unwrap_or(&scaled);
            return format!("{scaled}{suffix}");
        }
    }

    count.to_string()
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(0, "0")]
    #[case(999, "999")]
    #[case(1000, "1K")]
    #[case(1500, "1.5K")]
    #[case(100_000, "100K")]
    #[case(2_000_000, "2M")]
    #[case(3_500_000_000, "3.5B")]
    fn test_format_count(#[case] count: usize, #[case] expected: &str) {
        assert_eq!(format_count(count), expected);
    }

    #[rstest]
    #[case("name=row 1", Some(("name", "row 1")))]
    #[case("id=", Some(("id", "")))]
    #[case("a=b=c", Some(("a", "b=c")))]
    #[case("name", None)]
    #[case("=needle", None)]
    fn test_parse_filter_clause(#[case] input: &str, #[case] expected: Option<(&str, &str)>) {
        let parsed = parse_filter_clause(input).ok();
        let expected = expected.map(|(column, needle)| (column.to_string(), needle.to_string()));
        assert_eq!(parsed, expected);
    }

    #[rstest]
    #[case("id:asc", Some(("id", SortDirection::Asc)))]
    #[case("name:DESC", Some(("name", SortDirection::Desc)))]
    #[case("value", Some(("value", SortDirection::Asc)))]
    #[case("value:sideways", None)]
    #[case(":desc", None)]
    fn test_parse_sort_key(#[case] input: &str, #[case] expected: Option<(&str, SortDirection)>) {
        let parsed = parse_sort_key(input).ok();
        let expected = expected.map(|(column, direction)| (column.to_string(), direction));
        assert_eq!(parsed, expected);
    }
}
