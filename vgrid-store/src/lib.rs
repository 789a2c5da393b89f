//! Zero-copy access to fixed-stride records held in a producer owned buffer.
//!
//! The producer ([RecordStore]) owns and mutates the buffer, readers take a short
//! lived [BufferLease] and decode individual fields through a [RecordView] without
//! copying the record out.

mod arena;
mod buffer;
mod layout;
mod materialized;
mod row;
mod store;
mod view;

pub use self::arena::{decode_name, NameCache, NameSpan};
pub use self::buffer::{DecodeError, SharedBuffer};
pub use self::layout::{Column, Encoding, Field, RawRecord, RecordValues, RECORD_STRIDE};
pub use self::materialized::MaterializedRows;
pub use self::row::{CellValue, DecodedRow, RowSource};
pub use self::store::{
    BufferExtent,
    BufferLease,
    DatasetBuilder,
    RecordProducer,
    RecordStore,
    StoreError,
};
pub use self::view::RecordView;
