use std::fmt::Write as _;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::{RwLock, RwLockReadGuard};
use tracing::{debug, error, info};

use crate::buffer::{DecodeError, SharedBuffer};
use crate::layout::{Field, RawRecord, RecordValues, RECORD_STRIDE};
use crate::view::RecordView;

#[derive(Debug, thiserror::Error)]
/// An error that can occur when accessing or mutating the record store.
pub enum StoreError {
    #[error("stale buffer handle: expected generation {expected}, buffer is at generation {current}")]
    /// The buffer was replaced or resized since the handle was captured.
    ///
    /// The caller should drop any cached bounds and acquire a new lease.
    StaleBufferHandle { expected: u64, current: u64 },
    #[error("string arena exceeds the 32-bit pointer range at offset {0}")]
    /// The buffer grew beyond what a `u32` name pointer can address.
    ArenaOverflow(usize),
    #[error("Decode Error: {0}")]
    Decode(#[from] DecodeError),
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
/// The bounds of the buffer at the time a lease was taken.
pub struct BufferExtent {
    /// Bumped whenever the buffer is replaced or changes length.
    pub generation: u64,
    /// Bumped on every producer mutation, including in-place writes.
    pub revision: u64,
    /// The length of the buffer in bytes.
    pub byte_len: usize,
    /// The number of records at the start of the buffer.
    pub record_count: usize,
}

#[derive(Debug, Default)]
struct StoreState {
    buffer: SharedBuffer,
    record_count: usize,
    generation: u64,
    revision: u64,
}

impl StoreState {
    fn extent(&self) -> BufferExtent {
        BufferExtent {
            generation: self.generation,
            revision: self.revision,
            byte_len: self.buffer.len(),
            record_count: self.record_count,
        }
    }
}

/// The producer side of the shared record buffer.
///
/// The core only ever reads from the buffer via a [BufferLease], everything
/// else is owned by the producer.
pub trait RecordProducer: Send + Sync + 'static {
    /// Acquires read access to the current buffer.
    fn lease(&self) -> BufferLease<'_>;

    /// Acquires read access to the current buffer, failing if it was replaced
    /// since `expected` was captured.
    fn lease_checked(&self, expected: &BufferExtent) -> Result<BufferLease<'_>, StoreError> {
        let lease = self.lease();
        let current = lease.extent().generation;
        if current != expected.generation {
            return Err(StoreError::StaleBufferHandle {
                expected: expected.generation,
                current,
            });
        }
        Ok(lease)
    }

    /// The number of records currently in the buffer.
    fn record_count(&self) -> usize;

    /// The byte distance between two records.
    fn record_stride(&self) -> usize {
        RECORD_STRIDE
    }

    /// Updates the time-varying fields of every record in place.
    fn advance_time(&self);
}

#[derive(Clone, Default)]
/// The process-wide dataset.
///
/// The dataset is created by the first [RecordStore::populate] call, replaced
/// wholesale by any subsequent populate and torn down by [RecordStore::shutdown].
///
/// Buffer layout is `[record_count * RECORD_STRIDE bytes of records][string arena]`.
pub struct RecordStore {
    state: Arc<RwLock<StoreState>>,
}

impl RecordStore {
    /// Creates a new, empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the dataset with `count` records named `Row {id}`.
    pub fn populate(&self, count: usize) -> Result<(), StoreError> {
        let mut builder = DatasetBuilder::with_capacity(count);
        let mut name = String::new();
        for id in 0..count {
            name.clear();
            let _ = write!(name, "Row {id}");
            builder.push(id as u32, RecordValues::default(), &name);
        }
        self.populate_from(builder)
    }

    /// Replaces the dataset with the records held by the builder.
    pub fn populate_from(&self, builder: DatasetBuilder) -> Result<(), StoreError> {
        let (buffer, record_count) = builder.build()?;

        let mut state = self.state.write();
        state.buffer = buffer;
        state.record_count = record_count;
        state.generation += 1;
        state.revision += 1;

        info!(
            record_count,
            byte_len = state.buffer.len(),
            generation = state.generation,
            "Populated record store"
        );

        Ok(())
    }

    /// Sets `time_ms` of every record to the current time and rewrites
    /// each name to include it.
    pub fn advance_time_now(&self) -> Result<(), StoreError> {
        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as f64)
            .unwrap_or(0.0);
        self.advance_time_to(now_ms)
    }

    /// Sets `time_ms` of every record to `now_ms` and rewrites each name
    /// to `Row {id} at time {now_ms}`.
    ///
    /// The arena is reset before the names are written so it never grows
    /// beyond one name per record.
    pub fn advance_time_to(&self, now_ms: f64) -> Result<(), StoreError> {
        let mut state = self.state.write();
        let old_len = state.buffer.len();
        let record_count = state.record_count;

        let result = rewrite_time_and_names(&mut state.buffer, record_count, now_ms);

        state.revision += 1;
        if state.buffer.len() != old_len {
            state.generation += 1;
            debug!(
                old_len,
                new_len = state.buffer.len(),
                generation = state.generation,
                "Buffer resized"
            );
        }

        result
    }

    /// Tears down the dataset.
    ///
    /// Any lease taken afterwards sees an empty buffer.
    pub fn shutdown(&self) {
        let mut state = self.state.write();
        state.buffer = SharedBuffer::default();
        state.record_count = 0;
        state.generation += 1;
        state.revision += 1;
        info!("Record store shut down");
    }

    /// Acquires read access to the current buffer.
    ///
    /// The producer cannot mutate the buffer while the lease is alive,
    /// so leases should be held only for a single decode pass.
    pub fn lease(&self) -> BufferLease<'_> {
        BufferLease {
            state: self.state.read(),
        }
    }

    /// Returns the current bounds of the buffer.
    pub fn extent(&self) -> BufferExtent {
        self.state.read().extent()
    }

    pub fn record_count(&self) -> usize {
        self.state.read().record_count
    }
}

impl RecordProducer for RecordStore {
    fn lease(&self) -> BufferLease<'_> {
        RecordStore::lease(self)
    }

    fn record_count(&self) -> usize {
        RecordStore::record_count(self)
    }

    fn advance_time(&self) {
        if let Err(e) = self.advance_time_now() {
            error!(error = ?e, "Failed to advance record time");
        }
    }
}

fn rewrite_time_and_names(
    buffer: &mut SharedBuffer,
    record_count: usize,
    now_ms: f64,
) -> Result<(), StoreError> {
    buffer.truncate(record_count * RECORD_STRIDE);

    let time_bytes = now_ms.to_le_bytes();
    let mut name = String::new();
    for index in 0..record_count {
        let base = index * RECORD_STRIDE;
        let id = buffer.read_field_u32(base, Field::Id)?;

        name.clear();
        let _ = write!(name, "Row {id} at time {now_ms}");

        let offset = buffer.append(name.as_bytes());
        let pointer = u32::try_from(offset).map_err(|_| StoreError::ArenaOverflow(offset))?;

        buffer.write_at(base + Field::TimeMs.offset(), &time_bytes)?;
        buffer.write_at(base + Field::NamePtr.offset(), &pointer.to_le_bytes())?;
        buffer.write_at(base + Field::NameLen.offset(), &(name.len() as u32).to_le_bytes())?;
    }

    Ok(())
}

/// Read access to the buffer for the duration of one decode pass.
pub struct BufferLease<'a> {
    state: RwLockReadGuard<'a, StoreState>,
}

impl BufferLease<'_> {
    #[inline]
    pub fn extent(&self) -> BufferExtent {
        self.state.extent()
    }

    #[inline]
    pub fn record_count(&self) -> usize {
        self.state.record_count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.state.record_count == 0
    }

    #[inline]
    /// The producer revision the lease observes, used to key name caches.
    pub fn revision(&self) -> u64 {
        self.state.revision
    }

    #[inline]
    pub fn buffer(&self) -> &SharedBuffer {
        &self.state.buffer
    }

    /// Creates a zero-copy view of the record at `index`.
    pub fn view(&self, index: usize) -> Result<RecordView<'_>, DecodeError> {
        RecordView::new(&self.state.buffer, self.state.record_count, index)
    }
}

#[derive(Debug, Copy, Clone)]
enum PendingRecord {
    /// The name pointer is relative to the start of the arena.
    Relative(RawRecord),
    /// The name pointer is used as-is.
    Absolute(RawRecord),
}

#[derive(Debug, Default)]
/// Assembles a record buffer and its string arena.
pub struct DatasetBuilder {
    records: Vec<PendingRecord>,
    arena: Vec<u8>,
}

impl DatasetBuilder {
    pub fn with_capacity(records: usize) -> Self {
        Self {
            records: Vec::with_capacity(records),
            arena: Vec::new(),
        }
    }

    /// Adds a record with the given name.
    pub fn push(&mut self, id: u32, values: RecordValues, name: &str) -> &mut Self {
        self.push_with_name_bytes(id, values, name.as_bytes())
    }

    /// Adds a record whose name span covers exactly `name`, which may
    /// contain NUL bytes or invalid UTF-8.
    pub fn push_with_name_bytes(&mut self, id: u32, values: RecordValues, name: &[u8]) -> &mut Self {
        let pointer = self.arena.len() as u32;
        self.arena.extend_from_slice(name);
        let record = RawRecord::new(id, values, pointer, name.len() as u32);
        self.records.push(PendingRecord::Relative(record));
        self
    }

    /// Adds a record as-is, its name pointer is treated as an absolute
    /// buffer offset.
    pub fn push_raw(&mut self, record: RawRecord) -> &mut Self {
        self.records.push(PendingRecord::Absolute(record));
        self
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub(crate) fn build(self) -> Result<(SharedBuffer, usize), StoreError> {
        let records_len = self.records.len() * RECORD_STRIDE;
        let total_len = records_len + self.arena.len();
        let arena_base =
            u32::try_from(records_len).map_err(|_| StoreError::ArenaOverflow(records_len))?;
        if u32::try_from(total_len).is_err() {
            return Err(StoreError::ArenaOverflow(total_len));
        }

        let mut bytes = Vec::with_capacity(total_len);
        for pending in &self.records {
            let record = match *pending {
                PendingRecord::Relative(mut record) => {
                    record.rebase_name(arena_base);
                    record
                },
                PendingRecord::Absolute(record) => record,
            };
            bytes.extend_from_slice(bytemuck::bytes_of(&record));
        }
        bytes.extend_from_slice(&self.arena);

        Ok((SharedBuffer::from_vec(bytes), self.records.len()))
    }
}
