use crate::layout::{Encoding, Field};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
/// An error that can occur when decoding a value from the buffer.
///
/// Decode errors are scoped to a single read, they never invalidate
/// the buffer or any other row.
pub enum DecodeError {
    #[error("read of {width} bytes at offset {offset} exceeds buffer length {len}")]
    /// The computed offset (record field or string span) falls
    /// outside the current extent of the buffer.
    OutOfBounds {
        offset: usize,
        width: usize,
        len: usize,
    },
    #[error("record {index} out of range, the store holds {count} records")]
    /// The requested record index is beyond the record count.
    RecordOutOfRange { index: usize, count: usize },
}

#[derive(Debug, Default)]
/// The producer owned byte buffer.
///
/// All reads go through [SharedBuffer::read_at] which bounds checks
/// every access, views into the buffer never hold raw pointers.
pub struct SharedBuffer {
    bytes: Vec<u8>,
}

impl SharedBuffer {
    pub(crate) fn from_vec(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    #[inline]
    /// The current length of the buffer in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    #[inline]
    /// Reads `width` bytes starting at `offset`.
    pub fn read_at(&self, offset: usize, width: usize) -> Result<&[u8], DecodeError> {
        offset
            .checked_add(width)
            .and_then(|end| self.bytes.get(offset..end))
            .ok_or(DecodeError::OutOfBounds {
                offset,
                width,
                len: self.bytes.len(),
            })
    }

    #[inline]
    pub fn read_u32_le(&self, offset: usize) -> Result<u32, DecodeError> {
        let slice = self.read_at(offset, 4)?;
        let mut raw = [0; 4];
        raw.copy_from_slice(slice);
        Ok(u32::from_le_bytes(raw))
    }

    #[inline]
    pub fn read_f64_le(&self, offset: usize) -> Result<f64, DecodeError> {
        let slice = self.read_at(offset, 8)?;
        let mut raw = [0; 8];
        raw.copy_from_slice(slice);
        Ok(f64::from_le_bytes(raw))
    }

    /// Reads the given field of the record starting at `record_base`.
    pub(crate) fn read_field_u32(&self, record_base: usize, field: Field) -> Result<u32, DecodeError> {
        debug_assert_eq!(field.encoding(), Encoding::U32Le);
        self.read_u32_le(record_base + field.offset())
    }

    pub(crate) fn read_field_f64(&self, record_base: usize, field: Field) -> Result<f64, DecodeError> {
        debug_assert_eq!(field.encoding(), Encoding::F64Le);
        self.read_f64_le(record_base + field.offset())
    }

    pub(crate) fn write_at(&mut self, offset: usize, data: &[u8]) -> Result<(), DecodeError> {
        let len = self.bytes.len();
        let target = offset
            .checked_add(data.len())
            .and_then(|end| self.bytes.get_mut(offset..end))
            .ok_or(DecodeError::OutOfBounds {
                offset,
                width: data.len(),
                len,
            })?;
        target.copy_from_slice(data);
        Ok(())
    }

    pub(crate) fn truncate(&mut self, len: usize) {
        self.bytes.truncate(len);
    }

    pub(crate) fn append(&mut self, data: &[u8]) -> usize {
        let offset = self.bytes.len();
        self.bytes.extend_from_slice(data);
        offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_within_bounds() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&9u32.to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(&1.5f64.to_le_bytes());
        let buffer = SharedBuffer::from_vec(bytes);

        assert_eq!(buffer.read_u32_le(0), Ok(9));
        assert_eq!(buffer.read_f64_le(8), Ok(1.5));
        assert_eq!(buffer.read_at(12, 4).map(|s| s.len()), Ok(4));
    }

    #[rstest::rstest]
    #[case(13, 4)]
    #[case(16, 1)]
    #[case(usize::MAX, 2)]
    fn test_read_out_of_bounds(#[case] offset: usize, #[case] width: usize) {
        let buffer = SharedBuffer::from_vec(vec![0; 16]);
        let err = buffer.read_at(offset, width).unwrap_err();
        assert_eq!(err, DecodeError::OutOfBounds { offset, width, len: 16 });
    }

    #[test]
    fn test_zero_width_read_at_end() {
        let buffer = SharedBuffer::from_vec(vec![0; 16]);
        assert_eq!(buffer.read_at(16, 0), Ok(&[][..]));
    }

    #[test]
    fn test_write_and_append() {
        let mut buffer = SharedBuffer::from_vec(vec![0; 8]);
        buffer.write_at(4, &[1, 2, 3, 4]).unwrap();
        assert_eq!(buffer.read_at(4, 4), Ok(&[1, 2, 3, 4][..]));
        assert!(buffer.write_at(6, &[0; 4]).is_err());

        let offset = buffer.append(b"abc");
        assert_eq!(offset, 8);
        assert_eq!(buffer.len(), 11);

        buffer.truncate(8);
        assert_eq!(buffer.len(), 8);
    }
}
