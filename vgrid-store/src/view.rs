use std::borrow::Cow;
use std::sync::Arc;

use crate::arena::{decode_name, NameCache, NameSpan};
use crate::buffer::{DecodeError, SharedBuffer};
use crate::layout::{Column, Field, RECORD_STRIDE};
use crate::row::{CellValue, DecodedRow};

#[derive(Debug, Copy, Clone)]
/// A zero-copy view of a single record in the shared buffer.
///
/// No field is decoded until it is requested and every accessor performs
/// exactly one bounded read at `index * stride + offset`.
///
/// Views borrow the buffer, so they cannot outlive the lease they were
/// created from.
pub struct RecordView<'a> {
    buffer: &'a SharedBuffer,
    index: usize,
    base: usize,
}

impl<'a> RecordView<'a> {
    /// Creates a view of the record at `index`.
    ///
    /// Indexes at or beyond `record_count` are rejected rather than clamped.
    pub(crate) fn new(
        buffer: &'a SharedBuffer,
        record_count: usize,
        index: usize,
    ) -> Result<Self, DecodeError> {
        if index >= record_count {
            return Err(DecodeError::RecordOutOfRange {
                index,
                count: record_count,
            });
        }

        Ok(Self {
            buffer,
            index,
            base: index * RECORD_STRIDE,
        })
    }

    #[inline]
    /// The index of the record within the store.
    pub fn index(&self) -> usize {
        self.index
    }

    #[inline]
    pub fn id(&self) -> Result<u32, DecodeError> {
        self.buffer.read_field_u32(self.base, Field::Id)
    }

    #[inline]
    pub fn value(&self) -> Result<f64, DecodeError> {
        self.buffer.read_field_f64(self.base, Field::Value)
    }

    #[inline]
    pub fn time_ms(&self) -> Result<f64, DecodeError> {
        self.buffer.read_field_f64(self.base, Field::TimeMs)
    }

    #[inline]
    /// Reads any of the `f64` fields of the record.
    pub fn f64_field(&self, field: Field) -> Result<f64, DecodeError> {
        self.buffer.read_field_f64(self.base, field)
    }

    /// Reads the `(pointer, length)` pair referencing the record's name.
    pub fn name_span(&self) -> Result<NameSpan, DecodeError> {
        let pointer = self.buffer.read_field_u32(self.base, Field::NamePtr)?;
        let length = self.buffer.read_field_u32(self.base, Field::NameLen)?;
        Ok(NameSpan { pointer, length })
    }

    /// Decodes the record's name from the string arena.
    pub fn name(&self) -> Result<Cow<'a, str>, DecodeError> {
        let span = self.name_span()?;
        decode_name(self.buffer, span)
    }

    /// Reads the value of a single grid column.
    pub fn cell(&self, column: Column) -> Result<CellValue<'a>, DecodeError> {
        let Some(field) = column.field() else {
            return self.name().map(CellValue::Text);
        };

        match field {
            Field::Id => self.id().map(CellValue::Unsigned),
            field => self.f64_field(field).map(CellValue::Float),
        }
    }

    /// Copies every field out of the buffer into an owned [DecodedRow].
    ///
    /// The name is resolved through `cache` which is keyed on `revision`.
    pub fn decode(&self, cache: &mut NameCache, revision: u64) -> Result<DecodedRow, DecodeError> {
        let name: Arc<str> = cache.get_or_decode(self.buffer, revision, self.name_span()?)?;
        Ok(DecodedRow {
            id: self.id()?,
            value: self.value()?,
            a: self.f64_field(Field::A)?,
            b: self.f64_field(Field::B)?,
            c: self.f64_field(Field::C)?,
            d: self.f64_field(Field::D)?,
            e: self.f64_field(Field::E)?,
            f: self.f64_field(Field::F)?,
            g: self.f64_field(Field::G)?,
            h: self.f64_field(Field::H)?,
            time_ms: self.time_ms()?,
            name,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{RawRecord, RecordValues};

    fn buffer_with_records(records: &[RawRecord], arena: &[u8]) -> SharedBuffer {
        let mut bytes = Vec::new();
        for record in records {
            bytes.extend_from_slice(bytemuck::bytes_of(record));
        }
        bytes.extend_from_slice(arena);
        SharedBuffer::from_vec(bytes)
    }

    #[test]
    fn test_view_reads_fields() {
        let arena_base = (2 * RECORD_STRIDE) as u32;
        let values = RecordValues {
            time_ms: 1234.5,
            ..RecordValues::default()
        };
        let records = [
            RawRecord::new(10, values, arena_base, 5),
            RawRecord::new(11, RecordValues::default(), arena_base + 5, 5),
        ];
        let buffer = buffer_with_records(&records, b"Row 0Row 1");

        let view = RecordView::new(&buffer, 2, 1).unwrap();
        assert_eq!(view.index(), 1);
        assert_eq!(view.id(), Ok(11));
        assert_eq!(view.value(), Ok(42.0));
        assert_eq!(view.f64_field(Field::H), Ok(8.8));
        assert_eq!(view.name().unwrap(), "Row 1");

        let view = RecordView::new(&buffer, 2, 0).unwrap();
        assert_eq!(view.time_ms(), Ok(1234.5));
        assert_eq!(view.name_span(), Ok(NameSpan { pointer: arena_base, length: 5 }));
    }

    #[test]
    fn test_view_rejects_out_of_range_index() {
        let buffer = buffer_with_records(&[RawRecord::new(0, RecordValues::default(), 0, 0)], b"");
        let err = RecordView::new(&buffer, 1, 1).unwrap_err();
        assert_eq!(err, DecodeError::RecordOutOfRange { index: 1, count: 1 });
    }

    #[test]
    fn test_view_detects_truncated_buffer() {
        // A record count larger than what the buffer holds must not read past the end.
        let buffer = buffer_with_records(&[RawRecord::new(0, RecordValues::default(), 0, 0)], b"");
        let view = RecordView::new(&buffer, 2, 1).unwrap();
        assert!(matches!(view.id(), Err(DecodeError::OutOfBounds { .. })));
    }

    #[test]
    fn test_empty_name() {
        let buffer = buffer_with_records(&[RawRecord::new(0, RecordValues::default(), 0, 0)], b"");
        let view = RecordView::new(&buffer, 1, 0).unwrap();
        assert_eq!(view.name().unwrap(), "");
        assert_eq!(view.cell(Column::Name).unwrap().to_string(), "");
    }

    #[test]
    fn test_repeated_reads_are_identical() {
        let buffer = buffer_with_records(&[RawRecord::new(3, RecordValues::default(), 96, 3)], b"abc");
        let view = RecordView::new(&buffer, 1, 0).unwrap();
        let mut cache = NameCache::default();

        for column in Column::ALL {
            assert_eq!(view.cell(column), view.cell(column), "column {column}");
        }
        assert_eq!(view.decode(&mut cache, 0), view.decode(&mut cache, 0));
    }

    #[test]
    fn test_decode_out_of_bounds_name() {
        let buffer = buffer_with_records(&[RawRecord::new(0, RecordValues::default(), 90, 64)], b"");
        let view = RecordView::new(&buffer, 1, 0).unwrap();
        let mut cache = NameCache::default();

        assert!(matches!(view.name(), Err(DecodeError::OutOfBounds { .. })));
        assert!(view.decode(&mut cache, 0).is_err());
        // Scalar fields are still readable.
        assert_eq!(view.id(), Ok(0));
    }
}
