use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::info;
use vgrid_query::{Dataset, FilterSpec, IndexQuery, SortDirection, SortSpec};
use vgrid_store::{MaterializedRows, RecordStore};

use crate::commands::format_count;

/// Times the same filter and sort over the shared buffer and over
/// materialized rows holding identical data.
pub fn run(rows: usize, iterations: usize) -> Result<()> {
    let iterations = iterations.max(1);

    let store = RecordStore::new();
    store.populate(rows).context("Populate record store")?;
    store.advance_time_now().context("Advance record time")?;

    let filter = FilterSpec::new().with("name", "7");
    let sort = SortSpec::new()
        .then_by("name", SortDirection::Desc)
        .then_by("id", SortDirection::Asc);
    let query = IndexQuery::new(&filter, &sort);

    let lease = store.lease();
    let materialized = MaterializedRows::from_lease(&lease).context("Materialize rows")?;

    let (buffer_elapsed, buffer_matches) = time_query(&query, &lease, iterations);
    drop(lease);
    let (materialized_elapsed, materialized_matches) = time_query(&query, &materialized, iterations);

    info!(
        backend = "shared-buffer",
        rows = %format_count(rows),
        matches = %format_count(buffer_matches),
        per_iteration = ?per_iteration(buffer_elapsed, iterations),
        "Benchmark complete"
    );
    info!(
        backend = "materialized",
        rows = %format_count(rows),
        matches = %format_count(materialized_matches),
        per_iteration = ?per_iteration(materialized_elapsed, iterations),
        "Benchmark complete"
    );

    anyhow::ensure!(
        buffer_matches == materialized_matches,
        "Backends disagree on the number of matches: {buffer_matches} != {materialized_matches}"
    );

    Ok(())
}

fn time_query<D: Dataset + ?Sized>(
    query: &IndexQuery,
    dataset: &D,
    iterations: usize,
) -> (Duration, usize) {
    let mut matches = 0;
    let start = Instant::now();
    for _ in 0..iterations {
        matches = query.evaluate(dataset).len();
    }
    (start.elapsed(), matches)
}

fn per_iteration(elapsed: Duration, iterations: usize) -> Duration {
    elapsed.div_f64(iterations.max(1) as f64)
}
