//! Read-only file mapping and the per-store record index.
//!
//! A store file is a plain concatenation of records, each a little-endian
//! `id: u32, n: u32` header followed by `n` fixed-stride items. Opening a
//! store makes a single sequential pass over the headers and remembers, per
//! id, where its item array lives. Interval data itself is never copied;
//! every later operation reads straight through the mapping.

use byteorder::{ByteOrder, LittleEndian};
use memmap2::Mmap;
use rustc_hash::FxHashMap;
use std::fs::File;
use std::path::Path;

use crate::error::{Result, StoreError};

/// Minimum number of ids before the aggregate operations fan out to rayon.
/// Below this, sequential accumulation beats the thread pool overhead.
pub(crate) const PARALLEL_THRESHOLD: usize = 4096;

/// Map a file read-only.
///
/// Zero-length files are valid empty stores, but `mmap(2)` rejects
/// zero-length mappings, so they are represented as `None`.
pub(crate) fn map_readonly(path: &Path) -> Result<Option<Mmap>> {
    let file = File::open(path)?;
    if file.metadata()?.len() == 0 {
        return Ok(None);
    }
    let mmap = unsafe { Mmap::map(&file) }?;
    Ok(Some(mmap))
}

/// Location of one record's item array inside the mapping.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RecordSlice {
    /// Byte offset of the first item (just past the record header).
    pub offset: usize,
    /// Number of items in the record.
    pub count: usize,
}

/// In-memory index over a mapped store: `id -> item array location`.
#[derive(Debug, Default)]
pub(crate) struct RecordIndex {
    slices: FxHashMap<u32, RecordSlice>,
    ids: Vec<u32>,
}

impl RecordIndex {
    /// Build the index with one sequential header pass.
    ///
    /// `stride` is the byte width of a single item (8 for interval sets,
    /// `8 + payload_len` for interval lists). Duplicate ids are tolerated;
    /// the record appearing last in the file wins, which makes appended
    /// files behave as overwrites.
    pub fn build(data: &[u8], stride: usize) -> Result<Self> {
        let mut slices: FxHashMap<u32, RecordSlice> = FxHashMap::default();
        let mut pos = 0usize;

        while pos < data.len() {
            if data.len() - pos < 8 {
                return Err(StoreError::MalformedFile(format!(
                    "truncated record header at offset {}",
                    pos
                )));
            }
            let id = LittleEndian::read_u32(&data[pos..]);
            let count = LittleEndian::read_u32(&data[pos + 4..]) as usize;
            pos += 8;

            let body = count.checked_mul(stride).ok_or_else(|| {
                StoreError::MalformedFile(format!(
                    "record for id {} overflows the file length",
                    id
                ))
            })?;
            if data.len() - pos < body {
                return Err(StoreError::MalformedFile(format!(
                    "record for id {} extends past end of file ({} items at offset {})",
                    id, count, pos
                )));
            }

            slices.insert(id, RecordSlice { offset: pos, count });
            pos += body;
        }

        let mut ids: Vec<u32> = slices.keys().copied().collect();
        ids.sort_unstable();

        Ok(Self { slices, ids })
    }

    /// Number of distinct ids.
    #[inline]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// All ids, ascending.
    #[inline]
    pub fn ids(&self) -> &[u32] {
        &self.ids
    }

    #[inline]
    pub fn contains(&self, id: u32) -> bool {
        self.slices.contains_key(&id)
    }

    #[inline]
    pub fn get(&self, id: u32) -> Option<RecordSlice> {
        self.slices.get(&id).copied()
    }
}
