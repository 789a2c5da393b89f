use std::borrow::Cow;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

use crate::arena::NameCache;
use crate::buffer::DecodeError;
use crate::layout::Column;
use crate::view::RecordView;

#[derive(Debug, Clone, PartialEq)]
/// A fully decoded, owned copy of a record.
///
/// This is what gets handed to the grid once a row is visible.
pub struct DecodedRow {
    pub id: u32,
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
    pub name: Arc<str>,
}

impl DecodedRow {
    /// Returns the value of the given column.
    pub fn cell(&self, column: Column) -> CellValue<'_> {
        match column {
            Column::Id => CellValue::Unsigned(self.id),
            Column::Value => CellValue::Float(self.value),
            Column::A => CellValue::Float(self.a),
            Column::B => CellValue::Float(self.b),
            Column::C => CellValue::Float(self.c),
            Column::D => CellValue::Float(self.d),
            Column::E => CellValue::Float(self.e),
            Column::F => CellValue::Float(self.f),
            Column::G => CellValue::Float(self.g),
            Column::H => CellValue::Float(self.h),
            Column::TimeMs => CellValue::Float(self.time_ms),
            Column::Name => CellValue::Text(Cow::Borrowed(&self.name)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
/// A single decoded cell.
pub enum CellValue<'a> {
    Unsigned(u32),
    Float(f64),
    Text(Cow<'a, str>),
}

impl Display for CellValue<'_> {
    /// Formats the value the way the grid displays it, integral floats
    /// have no trailing `.0`.
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            CellValue::Unsigned(v) => write!(f, "{v}"),
            CellValue::Float(v) if v.is_infinite() => {
                f.write_str(if v.is_sign_positive() { "Infinity" } else { "-Infinity" })
            },
            CellValue::Float(v) => write!(f, "{v}"),
            CellValue::Text(v) => f.write_str(v),
        }
    }
}

#[derive(Debug, Copy, Clone)]
/// Where the data of a row lives.
///
/// Rows are either read live from the shared buffer or come from an
/// already materialized [DecodedRow], callers match on the variant once
/// per access instead of probing which one is present.
pub enum RowSource<'a> {
    Decoded(RecordView<'a>),
    Materialized(&'a DecodedRow),
}

impl<'a> RowSource<'a> {
    /// Returns the value of the given column.
    pub fn cell(&self, column: Column) -> Result<CellValue<'a>, DecodeError> {
        match self {
            RowSource::Decoded(view) => view.cell(column),
            RowSource::Materialized(row) => Ok(row.cell(column)),
        }
    }

    /// Produces an owned copy of the row.
    pub fn to_decoded(&self, cache: &mut NameCache, revision: u64) -> Result<DecodedRow, DecodeError> {
        match self {
            RowSource::Decoded(view) => view.decode(cache, revision),
            RowSource::Materialized(row) => Ok((*row).clone()),
        }
    }
}
