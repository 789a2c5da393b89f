use async_trait::async_trait;

use crate::window::RowMap;

#[async_trait]
/// The grid the viewport pushes data to.
///
/// The coordinator only calls into the consumer between decode passes,
/// never while the shared buffer is leased.
pub trait GridConsumer: Send + 'static {
    /// The total number of rows passing the current filter changed.
    async fn set_row_count(&mut self, total_row_count: usize);

    /// Rows of the visible range, keyed by their position.
    async fn set_row_data(&mut self, rows: RowMap);
}

#[derive(Debug)]
/// An update pushed to a [ChannelConsumer].
pub enum GridUpdate {
    RowCount(usize),
    Rows(RowMap),
}

/// A [GridConsumer] that forwards every update into a channel.
pub struct ChannelConsumer {
    tx: flume::Sender<GridUpdate>,
}

impl ChannelConsumer {
    /// Creates a new consumer and the receiving end of its updates.
    pub fn new() -> (Self, flume::Receiver<GridUpdate>) {
        let (tx, rx) = flume::unbounded();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl GridConsumer for ChannelConsumer {
    async fn set_row_count(&mut self, total_row_count: usize) {
        let _ = self.tx.send_async(GridUpdate::RowCount(total_row_count)).await;
    }

    async fn set_row_data(&mut self, rows: RowMap) {
        let _ = self.tx.send_async(GridUpdate::Rows(rows)).await;
    }
}
