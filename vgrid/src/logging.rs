use std::str::FromStr;

use anyhow::{anyhow, Context, Result};
use tracing_subscriber::EnvFilter;

use crate::Args;

/// Installs the global tracing subscriber described by the CLI flags.
pub fn init_logging(args: &Args) -> Result<()> {
    let filter = EnvFilter::from_str(&args.log_level)
        .with_context(|| format!("Parse log level {:?}", args.log_level))?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(!args.log_no_ansi)
        .with_thread_names(true);

    let result = if args.log_json {
        builder.json().with_current_span(true).try_init()
    } else {
        builder.compact().try_init()
    };

    result.map_err(|e| anyhow!(e)).context("Install tracing subscriber")
}
