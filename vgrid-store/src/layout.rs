//! The fixed-stride binary schema shared with the record producer.
//!
//! Every record occupies exactly [RECORD_STRIDE] bytes, all fields are little-endian.
//!
//! ```text
//! 0      4      8       16 ... 72      80        88         92         96
//! [ id ][ pad ][ value ][ a .. h    ][ time_ms ][ name_ptr ][ name_len ]
//! ```
//!
//! The 4 byte gap after `id` keeps the `f64` fields 8-byte aligned and is never read.

use std::fmt::{Display, Formatter};

/// The byte distance between two consecutive records.
pub const RECORD_STRIDE: usize = 96;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
/// How a field is encoded in the buffer.
pub enum Encoding {
    /// A 4 byte little-endian unsigned integer.
    U32Le,
    /// An 8 byte little-endian IEEE-754 double.
    F64Le,
}

impl Encoding {
    #[inline]
    /// The number of bytes occupied by a value of this encoding.
    pub const fn width(self) -> usize {
        match self {
            Encoding::U32Le => 4,
            Encoding::F64Le => 8,
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
/// A physical field within a record.
pub enum Field {
    Id,
    Value,
    A,
    B,
    C,
    D,
    E,
    F,
    G,
    H,
    TimeMs,
    NamePtr,
    NameLen,
}

impl Field {
    #[inline]
    /// The byte offset of the field relative to the start of its record.
    pub const fn offset(self) -> usize {
        match self {
            Field::Id => 0,
            Field::Value => 8,
            Field::A => 16,
            Field::B => 24,
            Field::C => 32,
            Field::D => 40,
            Field::E => 48,
            Field::F => 56,
            Field::G => 64,
            Field::H => 72,
            Field::TimeMs => 80,
            Field::NamePtr => 88,
            Field::NameLen => 92,
        }
    }

    #[inline]
    /// The encoding of the field.
    pub const fn encoding(self) -> Encoding {
        match self {
            Field::Id | Field::NamePtr | Field::NameLen => Encoding::U32Le,
            _ => Encoding::F64Le,
        }
    }

    #[inline]
    pub const fn width(self) -> usize {
        self.encoding().width()
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
/// A logical column as exposed to the grid.
///
/// Unlike a [Field], the `name` column is resolved through the string arena
/// rather than being read directly from the record.
pub enum Column {
    Id,
    Value,
    A,
    B,
    C,
    D,
    E,
    F,
    G,
    H,
    TimeMs,
    Name,
}

impl Column {
    /// All columns in display order.
    pub const ALL: [Column; 12] = [
        Column::Id,
        Column::Value,
        Column::A,
        Column::B,
        Column::C,
        Column::D,
        Column::E,
        Column::F,
        Column::G,
        Column::H,
        Column::TimeMs,
        Column::Name,
    ];

    /// Resolves a grid column id into a [Column].
    ///
    /// Returns `None` for columns the layout does not define.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|column| column.name() == name)
    }

    /// The column id used by the grid.
    pub const fn name(self) -> &'static str {
        match self {
            Column::Id => "id",
            Column::Value => "value",
            Column::A => "a",
            Column::B => "b",
            Column::C => "c",
            Column::D => "d",
            Column::E => "e",
            Column::F => "f",
            Column::G => "g",
            Column::H => "h",
            Column::TimeMs => "time_ms",
            Column::Name => "name",
        }
    }

    /// The record field backing this column, `None` for the out-of-line `name`.
    pub const fn field(self) -> Option<Field> {
        match self {
            Column::Id => Some(Field::Id),
            Column::Value => Some(Field::Value),
            Column::A => Some(Field::A),
            Column::B => Some(Field::B),
            Column::C => Some(Field::C),
            Column::D => Some(Field::D),
            Column::E => Some(Field::E),
            Column::F => Some(Field::F),
            Column::G => Some(Field::G),
            Column::H => Some(Field::H),
            Column::TimeMs => Some(Field::TimeMs),
            Column::Name => None,
        }
    }
}

impl Display for Column {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
/// The raw in-buffer representation of a single record.
///
/// All values are held in their little-endian byte order, so the struct
/// can be copied into the buffer as-is with [bytemuck::bytes_of] regardless
/// of the host's endianness. Use [RawRecord::new] rather than building it by hand.
pub struct RawRecord {
    id: u32,
    _padding: u32,
    value: f64,
    a: f64,
    b: f64,
    c: f64,
    d: f64,
    e: f64,
    f: f64,
    g: f64,
    h: f64,
    time_ms: f64,
    name_ptr: u32,
    name_len: u32,
}

const _: () = assert!(std::mem::size_of::<RawRecord>() == RECORD_STRIDE);

#[derive(Debug, Copy, Clone, PartialEq)]
/// The numeric payload of a record.
pub struct RecordValues {
    pub value: f64,
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
    pub g: f64,
    pub h: f64,
    pub time_ms: f64,
}

impl Default for RecordValues {
    fn default() -> Self {
        Self {
            value: 42.0,
            a: 1.1,
            b: 2.2,
            c: 3.3,
            d: 4.4,
            e: 5.5,
            f: 6.6,
            g: 7.7,
            h: 8.8,
            time_ms: 0.0,
        }
    }
}

#[inline]
fn f64_le(v: f64) -> f64 {
    f64::from_bits(v.to_bits().to_le())
}

impl RawRecord {
    /// Creates a new record with the given values and name span.
    pub fn new(id: u32, values: RecordValues, name_ptr: u32, name_len: u32) -> Self {
        Self {
            id: id.to_le(),
            _padding: 0,
            value: f64_le(values.value),
            a: f64_le(values.a),
            b: f64_le(values.b),
            c: f64_le(values.c),
            d: f64_le(values.d),
            e: f64_le(values.e),
            f: f64_le(values.f),
            g: f64_le(values.g),
            h: f64_le(values.h),
            time_ms: f64_le(values.time_ms),
            name_ptr: name_ptr.to_le(),
            name_len: name_len.to_le(),
        }
    }

    /// Moves the name pointer by `delta` bytes.
    pub(crate) fn rebase_name(&mut self, delta: u32) {
        let ptr = u32::from_le(self.name_ptr).wrapping_add(delta);
        self.name_ptr = ptr.to_le();
    }
}
