//! Memory-mapped interval list store.
//!
//! Each id maps to a list of entries `(a, b, payload)` sorted by `a`.
//! Unlike the set store, entries may overlap and multiple entries may share
//! a start; the payload discriminates sub-tracks within one id. Every read
//! operation takes a [`PayloadFilter`] and only admits entries whose payload
//! passes it.
//!
//! Because entries are not disjoint, a binary search on `a` alone cannot
//! bound the candidates overlapping a point: `is_contained` takes a caller
//! supplied `search_window` that must be at least the longest stored entry,
//! and the probe walks scan forward from the record start, cutting off at
//! the first `a >= probe.end`.

use byteorder::{ByteOrder, LittleEndian};
use memmap2::Mmap;
use rayon::prelude::*;
use std::path::Path;

use crate::error::{Result, StoreError};
use crate::interval::{deoverlap, Interval, PayloadEntry, PayloadFilter};
use crate::mmap::{map_readonly, RecordIndex, PARALLEL_THRESHOLD};

/// A read-only, memory-mapped map from id to a sorted list of
/// payload-tagged intervals.
///
/// The payload width is fixed per file (0 to 8 bytes, little-endian) and
/// must be supplied at open time; it is not recorded in the format.
pub struct IntervalListMapping {
    mmap: Option<Mmap>,
    index: RecordIndex,
    payload_len: usize,
}

impl IntervalListMapping {
    /// Open a store file whose entries carry `payload_len`-byte payloads.
    pub fn open<P: AsRef<Path>>(path: P, payload_len: usize) -> Result<Self> {
        if payload_len > 8 {
            return Err(StoreError::InvalidArgument(format!(
                "payload length {} exceeds 8 bytes",
                payload_len
            )));
        }
        let mmap = map_readonly(path.as_ref())?;
        let data = mmap.as_deref().unwrap_or(&[]);
        let index = RecordIndex::build(data, 8 + payload_len)?;
        Ok(Self {
            mmap,
            index,
            payload_len,
        })
    }

    /// Width in bytes of the payload attached to each entry.
    pub fn payload_len(&self) -> usize {
        self.payload_len
    }

    /// Number of distinct ids in the store.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Returns true if the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.index.len() == 0
    }

    /// All ids in ascending order.
    pub fn get_ids(&self) -> &[u32] {
        self.index.ids()
    }

    /// Check whether an id is present.
    pub fn has_id(&self, id: u32) -> bool {
        self.index.contains(id)
    }

    /// Count the admitted entries in an id's record.
    pub fn get_interval_count(&self, id: u32, filter: PayloadFilter) -> Result<usize> {
        let rec = self.record(id).ok_or(StoreError::IdNotFound(id))?;
        Ok(rec.iter().filter(|e| filter.admits(e.payload)).count())
    }

    /// Materialise the admitted entries as plain intervals, in storage
    /// order (sorted by start, stable for ties). No deoverlapping.
    pub fn get_intervals(
        &self,
        id: u32,
        filter: PayloadFilter,
        use_default: bool,
    ) -> Result<Vec<Interval>> {
        match self.record_or_default(id, use_default)? {
            Some(rec) => Ok(rec
                .iter()
                .filter(|e| filter.admits(e.payload))
                .map(|e| e.interval)
                .collect()),
            None => Ok(Vec::new()),
        }
    }

    /// Materialise every entry with its payload, unfiltered.
    pub fn get_intervals_with_payload(
        &self,
        id: u32,
        use_default: bool,
    ) -> Result<Vec<PayloadEntry>> {
        match self.record_or_default(id, use_default)? {
            Some(rec) => Ok(rec.iter().collect()),
            None => Ok(Vec::new()),
        }
    }

    /// Total admitted time across all ids.
    pub fn sum(&self, filter: PayloadFilter) -> u64 {
        let ids = self.index.ids();
        let record_sum = |&id: &u32| -> u64 {
            self.record(id).map_or(0, |rec| {
                rec.iter()
                    .filter(|e| filter.admits(e.payload))
                    .map(|e| u64::from(e.interval.len()))
                    .sum()
            })
        };
        if ids.len() < PARALLEL_THRESHOLD {
            ids.iter().map(record_sum).sum()
        } else {
            ids.par_iter().map(record_sum).sum()
        }
    }

    /// Check whether a time point falls inside an admitted entry.
    ///
    /// Candidates are the entries whose start lies in
    /// `[target - search_window, target]`, located by binary search;
    /// `search_window` must be at least the longest stored entry or
    /// containing entries further back will be missed.
    pub fn is_contained(
        &self,
        id: u32,
        target: u32,
        filter: PayloadFilter,
        use_default: bool,
        search_window: u32,
    ) -> Result<bool> {
        let Some(rec) = self.record_or_default(id, use_default)? else {
            return Ok(false);
        };
        let mut k = rec.lower_bound_start(target.saturating_sub(search_window));
        while k < rec.len() {
            let entry = rec.get(k);
            if entry.interval.start > target {
                break;
            }
            if filter.admits(entry.payload) && target < entry.interval.end {
                return Ok(true);
            }
            k += 1;
        }
        Ok(false)
    }

    /// Clip the admitted entries against each probe, in probe order then
    /// entry order, coalescing strictly overlapping successive pieces.
    ///
    /// The coalescing here is the fuzz-0 merge (true overlap only); runs
    /// that merely touch stay separate. Fuzzed set semantics live in the
    /// composition layer.
    pub fn intersect(
        &self,
        id: u32,
        probes: &[Interval],
        filter: PayloadFilter,
        use_default: bool,
    ) -> Result<Vec<Interval>> {
        let Some(rec) = self.record_or_default(id, use_default)? else {
            return Ok(Vec::new());
        };
        let mut out = Vec::new();
        for probe in probes {
            rec.for_each_clipped(probe, filter, |iv| out.push(iv));
        }
        Ok(deoverlap(out, 0))
    }

    /// Total raw clipped length across the admitted entries, counting
    /// overlapping entries multiply (unlike `intersect`, nothing is
    /// coalesced).
    pub fn intersect_sum(
        &self,
        id: u32,
        probes: &[Interval],
        filter: PayloadFilter,
        use_default: bool,
    ) -> Result<u64> {
        let Some(rec) = self.record_or_default(id, use_default)? else {
            return Ok(0);
        };
        let mut total = 0u64;
        for probe in probes {
            rec.for_each_clipped(probe, filter, |iv| total += u64::from(iv.len()));
        }
        Ok(total)
    }

    fn data(&self) -> &[u8] {
        self.mmap.as_deref().unwrap_or(&[])
    }

    fn record(&self, id: u32) -> Option<ListRecord<'_>> {
        let slice = self.index.get(id)?;
        let stride = 8 + self.payload_len;
        let data = self.data();
        Some(ListRecord {
            data: &data[slice.offset..slice.offset + slice.count * stride],
            payload_len: self.payload_len,
        })
    }

    fn record_or_default(&self, id: u32, use_default: bool) -> Result<Option<ListRecord<'_>>> {
        match self.record(id) {
            Some(rec) => Ok(Some(rec)),
            None if use_default => Ok(None),
            None => Err(StoreError::IdNotFound(id)),
        }
    }
}

/// Zero-copy view of one record's entry array.
#[derive(Clone, Copy)]
struct ListRecord<'a> {
    data: &'a [u8],
    payload_len: usize,
}

impl<'a> ListRecord<'a> {
    #[inline]
    fn stride(&self) -> usize {
        8 + self.payload_len
    }

    #[inline]
    fn len(&self) -> usize {
        self.data.len() / self.stride()
    }

    #[inline]
    fn start_at(&self, k: usize) -> u32 {
        LittleEndian::read_u32(&self.data[k * self.stride()..])
    }

    #[inline]
    fn get(&self, k: usize) -> PayloadEntry {
        let off = k * self.stride();
        let start = LittleEndian::read_u32(&self.data[off..]);
        let end = LittleEndian::read_u32(&self.data[off + 4..]);
        let payload = if self.payload_len == 0 {
            0
        } else {
            LittleEndian::read_uint(&self.data[off + 8..], self.payload_len)
        };
        PayloadEntry::new(start, end, payload)
    }

    fn iter(&self) -> impl Iterator<Item = PayloadEntry> + 'a {
        let rec = *self;
        (0..rec.len()).map(move |k| rec.get(k))
    }

    /// First k with `start >= t`.
    fn lower_bound_start(&self, t: u32) -> usize {
        let (mut lo, mut hi) = (0, self.len());
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if self.start_at(mid) < t {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        lo
    }

    /// Walk the admitted entries overlapping `probe` in entry order,
    /// passing each clipped piece to `emit`. Entries are scanned from the
    /// record start (they may overlap arbitrarily far back), stopping at
    /// the first `start >= probe.end`.
    fn for_each_clipped<F: FnMut(Interval)>(
        &self,
        probe: &Interval,
        filter: PayloadFilter,
        mut emit: F,
    ) {
        for k in 0..self.len() {
            if self.start_at(k) >= probe.end {
                break;
            }
            let entry = self.get(k);
            if !filter.admits(entry.payload) {
                continue;
            }
            if let Some(clipped) = entry.interval.intersect(probe) {
                emit(clipped);
            }
        }
    }
}
