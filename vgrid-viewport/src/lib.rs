//! The virtualized viewport over a shared record buffer.
//!
//! A [ViewportWindow] maps the positions a grid displays onto record indices
//! produced by an [IndexQuery](vgrid_query::IndexQuery). The coordinator
//! spawned by [spawn_viewport] owns the window, ticks the producer on a fixed
//! interval and pushes the decoded visible rows to a [GridConsumer].

mod consumer;
mod scheduler;
mod window;

pub use self::consumer::{ChannelConsumer, GridConsumer, GridUpdate};
pub use self::scheduler::{spawn_viewport, SchedulerError, SchedulerOptions, ViewportHandle};
pub use self::window::{
    ReadyPhase,
    RowMap,
    ViewportError,
    ViewportRange,
    ViewportWindow,
    WindowId,
    WindowState,
};
