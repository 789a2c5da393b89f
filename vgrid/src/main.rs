mod bench;
mod commands;
mod logging;
mod session;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use crate::logging::init_logging;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Debug, Parser)]
#[command(version, about)]
/// vgrid, a virtualized grid over a shared record buffer.
///
/// Records are decoded in place from a fixed-stride buffer, filtered and sorted
/// through an index set, and only the visible rows are ever materialized.
pub struct Args {
    #[arg(long, env = "VGRID_LOG_LEVEL", default_value = "info")]
    /// Set the log level.
    ///
    /// This can filter on various levels, for example `info,vgrid_query=debug`
    /// will display all logs at `info` level severity and above, plus the query
    /// timings emitted by `vgrid_query`.
    log_level: String,
    #[arg(long, env = "VGRID_LOG_JSON")]
    /// Emit logs in JSON format rather than as plain text.
    log_json: bool,
    #[arg(long, env = "VGRID_LOG_NO_ANSI")]
    /// Disable ANSI colour codes being present in the logs.
    log_no_ansi: bool,
    #[command(subcommand)]
    command: commands::Commands,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_logging(&args).context("Init logging")?;

    info!("vgrid v{}", env!("CARGO_PKG_VERSION"));

    args.command.display_startup_message();
    args.command.execute().await
}
