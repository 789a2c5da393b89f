use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{debug, info};
use vgrid_common::signal_handler::wait_shutdown_signal;
use vgrid_query::{FilterSpec, SortSpec};
use vgrid_store::RecordStore;
use vgrid_viewport::{spawn_viewport, GridConsumer, RowMap, SchedulerOptions};

use crate::commands::format_count;

pub struct SessionConfig {
    pub rows: usize,
    pub refresh_interval: Duration,
    pub first: usize,
    pub last: usize,
    pub filter: FilterSpec,
    pub sort: SortSpec,
}

/// Populates the store, attaches a logging consumer to a new viewport and
/// keeps it refreshing until the process is asked to shut down.
pub async fn run(config: SessionConfig) -> Result<()> {
    let shutdown = wait_shutdown_signal().context("Register shutdown signal")?;

    let store = Arc::new(RecordStore::new());
    store.populate(config.rows).context("Populate record store")?;

    let options = SchedulerOptions::builder()
        .refresh_interval(config.refresh_interval)
        .build();
    let handle = spawn_viewport(store.clone(), options).context("Spawn viewport")?;
    info!(window_id = %handle.window_id(), "Viewport is ready");

    handle.init(LoggingConsumer::default()).await?;
    if !config.filter.is_empty() {
        handle.set_filter(config.filter).await?;
    }
    if !config.sort.is_empty() {
        handle.set_sort(config.sort).await?;
    }
    handle
        .set_range(config.first, config.last)
        .await
        .context("Set visible range")?;

    shutdown.await;

    handle.destroy().await?;
    store.shutdown();
    info!("Goodbye");

    Ok(())
}

#[derive(Default)]
/// Reports every update from the viewport to the log.
struct LoggingConsumer {
    pushes: u64,
}

#[async_trait]
impl GridConsumer for LoggingConsumer {
    async fn set_row_count(&mut self, total_row_count: usize) {
        info!(row_count = %format_count(total_row_count), "Row count changed");
    }

    async fn set_row_data(&mut self, rows: RowMap) {
        self.pushes += 1;

        let first = rows.first_key_value();
        info!(
            push = self.pushes,
            rows = rows.len(),
            first_position = first.map(|(position, _)| *position),
            first_name = first.map(|(_, row)| &*row.name),
            "Received visible rows"
        );

        for (position, row) in &rows {
            debug!(position, id = row.id, value = row.value, time_ms = row.time_ms, name = %row.name, "Row");
        }
    }
}
