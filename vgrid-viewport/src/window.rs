use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::ops::RangeInclusive;

use tracing::{debug, warn};
use vgrid_query::{Dataset, IndexSet};
use vgrid_store::{DecodedRow, NameCache};

/// Decoded rows keyed by their position in the current [IndexSet].
///
/// The map is sparse, positions without data are simply absent.
pub type RowMap = BTreeMap<usize, DecodedRow>;

#[derive(Debug, thiserror::Error, Eq, PartialEq)]
/// An error that can occur when configuring the viewport.
pub enum ViewportError {
    #[error("invalid viewport range: first row {first} is after last row {last}")]
    InvalidRange { first: usize, last: usize },
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
/// An inclusive window of positions in the current [IndexSet].
pub struct ViewportRange {
    first: usize,
    last: usize,
}

impl ViewportRange {
    /// Creates a new range, `first` must not be after `last`.
    pub fn new(first: usize, last: usize) -> Result<Self, ViewportError> {
        if first > last {
            return Err(ViewportError::InvalidRange { first, last });
        }
        Ok(Self { first, last })
    }

    #[inline]
    pub fn first(&self) -> usize {
        self.first
    }

    #[inline]
    pub fn last(&self) -> usize {
        self.last
    }

    #[inline]
    pub fn positions(&self) -> RangeInclusive<usize> {
        self.first..=self.last
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
/// A unique identifier of a viewport window, attached to its logs.
pub struct WindowId(ulid::Ulid);

impl WindowId {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self(ulid::Ulid::new())
    }
}

impl Display for WindowId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        <ulid::Ulid as Display>::fmt(&self.0, f)
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
/// The last thing that caused a ready window to resolve its rows.
pub enum ReadyPhase {
    /// The window was initialised but has not resolved yet.
    Initialized,
    /// The consumer changed the visible range.
    RangeSet,
    /// The scheduler refreshed the index set.
    Refreshed,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum WindowState {
    Uninitialized,
    Ready(ReadyPhase),
    /// The consumer detached, every further call is a no-op.
    Destroyed,
}

#[derive(Debug)]
/// The visible window of the grid and the index set it is mapped through.
pub struct ViewportWindow {
    id: WindowId,
    state: WindowState,
    range: Option<ViewportRange>,
    index_set: IndexSet,
    reported_row_count: Option<usize>,
}

impl Default for ViewportWindow {
    fn default() -> Self {
        Self::new()
    }
}

impl ViewportWindow {
    pub fn new() -> Self {
        Self {
            id: WindowId::new(),
            state: WindowState::Uninitialized,
            range: None,
            index_set: IndexSet::default(),
            reported_row_count: None,
        }
    }

    #[inline]
    pub fn id(&self) -> WindowId {
        self.id
    }

    #[inline]
    pub fn state(&self) -> WindowState {
        self.state
    }

    #[inline]
    pub fn range(&self) -> Option<ViewportRange> {
        self.range
    }

    #[inline]
    pub fn index_set(&self) -> &IndexSet {
        &self.index_set
    }

    #[inline]
    pub fn is_ready(&self) -> bool {
        matches!(self.state, WindowState::Ready(_))
    }

    /// Moves the window into the ready state with the given total row count.
    ///
    /// Returns `false` if the window was already initialised or destroyed.
    pub fn init(&mut self, total_row_count: usize) -> bool {
        if self.state != WindowState::Uninitialized {
            debug!(window_id = %self.id, state = ?self.state, "Ignoring repeated init");
            return false;
        }

        self.state = WindowState::Ready(ReadyPhase::Initialized);
        self.reported_row_count = Some(total_row_count);
        true
    }

    /// Sets the visible range.
    ///
    /// Returns `false` if the window is not ready, in which case the range is ignored.
    pub fn set_range(&mut self, range: ViewportRange) -> bool {
        if !self.is_ready() {
            return false;
        }

        self.range = Some(range);
        self.state = WindowState::Ready(ReadyPhase::RangeSet);
        true
    }

    /// Replaces the index set the visible range is mapped through.
    ///
    /// Returns the new row count if it differs from the count last
    /// reported to the consumer.
    pub fn replace_index_set(&mut self, index_set: IndexSet) -> Option<usize> {
        if self.state == WindowState::Destroyed {
            return None;
        }

        self.index_set = index_set;
        if !self.is_ready() {
            return None;
        }

        self.state = WindowState::Ready(ReadyPhase::Refreshed);
        let count = self.index_set.len();
        if self.reported_row_count == Some(count) {
            return None;
        }
        self.reported_row_count = Some(count);
        Some(count)
    }

    /// Decodes the rows of the current visible range.
    pub fn resolve<D: Dataset + ?Sized>(&self, dataset: &D) -> RowMap {
        match self.range {
            Some(range) => self.resolve_range(dataset, range),
            None => RowMap::new(),
        }
    }

    /// Decodes the rows at the given positions of the index set.
    ///
    /// Positions beyond the end of the index set are skipped and rows
    /// that fail to decode are left out of the map.
    pub fn resolve_range<D: Dataset + ?Sized>(&self, dataset: &D, range: ViewportRange) -> RowMap {
        let mut rows = RowMap::new();
        if !self.is_ready() {
            return rows;
        }

        let mut cache = NameCache::default();
        let revision = dataset.revision();
        let end = range.last().min(self.index_set.len().saturating_sub(1));
        if self.index_set.is_empty() || range.first() > end {
            return rows;
        }

        for position in range.first()..=end {
            let Some(index) = self.index_set.get(position) else { break };

            let decoded = dataset
                .row(index)
                .and_then(|row| row.to_decoded(&mut cache, revision));
            match decoded {
                Ok(row) => {
                    rows.insert(position, row);
                },
                Err(e) => {
                    warn!(window_id = %self.id, position, index, error = %e, "Skipping row that failed to decode");
                },
            }
        }

        rows
    }

    /// Detaches the window, after this every call becomes a no-op.
    pub fn destroy(&mut self) {
        self.state = WindowState::Destroyed;
        self.range = None;
        self.index_set = IndexSet::default();
    }
}
