use std::sync::Arc;

use crate::arena::NameCache;
use crate::buffer::DecodeError;
use crate::layout::RecordValues;
use crate::row::DecodedRow;
use crate::store::BufferLease;

#[derive(Debug, Default)]
/// A dataset of plain owned rows.
///
/// This is the copy-everything baseline the shared buffer is measured against,
/// every row is a separate allocation and every refresh rewrites them all.
pub struct MaterializedRows {
    rows: Vec<DecodedRow>,
}

impl MaterializedRows {
    /// Creates `count` rows named `Row {id}` with the default template values.
    pub fn populate(count: usize) -> Self {
        let values = RecordValues::default();
        let rows = (0..count)
            .map(|id| DecodedRow {
                id: id as u32,
                value: values.value,
                a: values.a,
                b: values.b,
                c: values.c,
                d: values.d,
                e: values.e,
                f: values.f,
                g: values.g,
                h: values.h,
                time_ms: values.time_ms,
                name: Arc::from(format!("Row {id}")),
            })
            .collect();
        Self { rows }
    }

    /// Copies every record visible through the lease.
    pub fn from_lease(lease: &BufferLease<'_>) -> Result<Self, DecodeError> {
        let mut cache = NameCache::default();
        let revision = lease.revision();
        let rows = (0..lease.record_count())
            .map(|index| lease.view(index)?.decode(&mut cache, revision))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rows })
    }

    /// Sets `time_ms` of every row to `now_ms` and renames it accordingly.
    pub fn advance_time_to(&mut self, now_ms: f64) {
        for row in self.rows.iter_mut() {
            row.time_ms = now_ms;
            row.name = Arc::from(format!("Row {} at time {now_ms}", row.id));
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<&DecodedRow> {
        self.rows.get(index)
    }

    pub fn rows(&self) -> &[DecodedRow] {
        &self.rows
    }
}
