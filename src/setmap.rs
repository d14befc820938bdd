//! Memory-mapped interval set store.
//!
//! Each id maps to a sorted array of non-overlapping, non-touching
//! half-open intervals, decoded on the fly from the mapping. The record
//! ordering invariant is what makes the binary searches below valid: the
//! first interval that can overlap a probe `[a, b)` is the lower bound on
//! `end > a`, and the walk stops at the first `start >= b`.

use byteorder::{ByteOrder, LittleEndian};
use memmap2::Mmap;
use rayon::prelude::*;
use std::path::Path;

use crate::error::{Result, StoreError};
use crate::interval::Interval;
use crate::mmap::{map_readonly, RecordIndex, PARALLEL_THRESHOLD};

/// Byte width of one stored interval (`a: u32, b: u32`).
const ITEM_STRIDE: usize = 8;

/// A read-only, memory-mapped map from id to a sorted set of disjoint
/// intervals.
///
/// The handle is immutable after open and safe to share across threads.
pub struct IntervalSetMapping {
    mmap: Option<Mmap>,
    index: RecordIndex,
}

impl IntervalSetMapping {
    /// Open a store file and build its record index.
    ///
    /// Fails with [`StoreError::MalformedFile`] on truncated headers or
    /// records extending past the end of the file. Zero-byte files yield
    /// an empty store.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mmap = map_readonly(path.as_ref())?;
        let data = mmap.as_deref().unwrap_or(&[]);
        let index = RecordIndex::build(data, ITEM_STRIDE)?;
        Ok(Self { mmap, index })
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

    /// Number of intervals stored for an id.
    pub fn get_interval_count(&self, id: u32) -> Result<usize> {
        self.record(id)
            .map(|r| r.len())
            .ok_or(StoreError::IdNotFound(id))
    }

    /// Fetch the `k`-th interval of an id's record.
    pub fn get_interval(&self, id: u32, k: usize) -> Result<Interval> {
        let rec = self.record(id).ok_or(StoreError::IdNotFound(id))?;
        if k >= rec.len() {
            return Err(StoreError::IndexOutOfRange {
                id,
                index: k,
                count: rec.len(),
            });
        }
        Ok(rec.get(k))
    }

    /// Materialise a copy of an id's intervals.
    pub fn get_intervals(&self, id: u32, use_default: bool) -> Result<Vec<Interval>> {
        match self.record_or_default(id, use_default)? {
            Some(rec) => Ok(rec.iter().collect()),
            None => Ok(Vec::new()),
        }
    }

    /// Check whether a time point falls inside one of an id's intervals.
    pub fn is_contained(&self, id: u32, target: u32, use_default: bool) -> Result<bool> {
        let Some(rec) = self.record_or_default(id, use_default)? else {
            return Ok(false);
        };
        // Largest k with start <= target, then test target < end.
        let k = rec.upper_bound_start(target);
        if k == 0 {
            return Ok(false);
        }
        Ok(target < rec.get(k - 1).end)
    }

    /// Check whether a probe interval overlaps any of an id's intervals.
    pub fn has_intersection(&self, id: u32, probe: Interval, use_default: bool) -> Result<bool> {
        let Some(rec) = self.record_or_default(id, use_default)? else {
            return Ok(false);
        };
        if probe.is_empty() {
            return Ok(false);
        }
        let k = rec.lower_bound_end(probe.start);
        Ok(k < rec.len() && rec.get(k).start < probe.end)
    }

    /// Total stored time across all ids.
    pub fn sum(&self) -> u64 {
        let ids = self.index.ids();
        let record_sum = |&id: &u32| -> u64 {
            self.record(id)
                .map_or(0, |rec| rec.iter().map(|iv| u64::from(iv.len())).sum())
        };
        if ids.len() < PARALLEL_THRESHOLD {
            ids.iter().map(record_sum).sum()
        } else {
            ids.par_iter().map(record_sum).sum()
        }
    }

    /// Clip the id's intervals against each probe, in probe order.
    ///
    /// Probes need not be sorted or disjoint; within one probe the output
    /// follows record order. Results are not deoverlapped.
    pub fn intersect(
        &self,
        id: u32,
        probes: &[Interval],
        use_default: bool,
    ) -> Result<Vec<Interval>> {
        let Some(rec) = self.record_or_default(id, use_default)? else {
            return Ok(Vec::new());
        };
        let mut out = Vec::new();
        for probe in probes {
            rec.for_each_clipped(probe, |iv| out.push(iv));
        }
        Ok(out)
    }

    /// Total length `intersect` would produce, without materialising it.
    pub fn intersect_sum(&self, id: u32, probes: &[Interval], use_default: bool) -> Result<u64> {
        let Some(rec) = self.record_or_default(id, use_default)? else {
            return Ok(0);
        };
        let mut total = 0u64;
        for probe in probes {
            rec.for_each_clipped(probe, |iv| total += u64::from(iv.len()));
        }
        Ok(total)
    }

    /// Subtract the id's intervals from each probe independently, emitting
    /// the leftover gaps in ascending order within each probe.
    ///
    /// Probes are not unioned: a probe lying entirely inside a stored
    /// interval contributes nothing, one fully outside contributes itself.
    /// A missing id under `use_default` behaves as an empty record.
    pub fn minus(&self, id: u32, probes: &[Interval], use_default: bool) -> Result<Vec<Interval>> {
        let rec = match self.record_or_default(id, use_default)? {
            Some(rec) => rec,
            None => {
                return Ok(probes.iter().filter(|p| !p.is_empty()).copied().collect());
            }
        };
        let mut out = Vec::new();
        for probe in probes {
            if probe.is_empty() {
                continue;
            }
            let mut cursor = probe.start;
            let mut k = rec.lower_bound_end(probe.start);
            while k < rec.len() {
                let iv = rec.get(k);
                if iv.start >= probe.end {
                    break;
                }
                if iv.start > cursor {
                    out.push(Interval::new(cursor, iv.start));
                }
                cursor = cursor.max(iv.end);
                if cursor >= probe.end {
                    break;
                }
                k += 1;
            }
            if cursor < probe.end {
                out.push(Interval::new(cursor, probe.end));
            }
        }
        Ok(out)
    }

    fn data(&self) -> &[u8] {
        self.mmap.as_deref().unwrap_or(&[])
    }

    fn record(&self, id: u32) -> Option<SetRecord<'_>> {
        let slice = self.index.get(id)?;
        let data = self.data();
        Some(SetRecord {
            data: &data[slice.offset..slice.offset + slice.count * ITEM_STRIDE],
        })
    }

    /// Resolve an id, collapsing a missing one into `None` under
    /// `use_default` and into [`StoreError::IdNotFound`] otherwise.
    fn record_or_default(&self, id: u32, use_default: bool) -> Result<Option<SetRecord<'_>>> {
        match self.record(id) {
            Some(rec) => Ok(Some(rec)),
            None if use_default => Ok(None),
            None => Err(StoreError::IdNotFound(id)),
        }
    }
}

/// Zero-copy view of one record's interval array.
#[derive(Clone, Copy)]
struct SetRecord<'a> {
    data: &'a [u8],
}

impl<'a> SetRecord<'a> {
    #[inline]
    fn len(&self) -> usize {
        self.data.len() / ITEM_STRIDE
    }

    #[inline]
    fn get(&self, k: usize) -> Interval {
        let off = k * ITEM_STRIDE;
        Interval::new(
            LittleEndian::read_u32(&self.data[off..]),
            LittleEndian::read_u32(&self.data[off + 4..]),
        )
    }

    fn iter(&self) -> impl Iterator<Item = Interval> + 'a {
        let rec = *self;
        (0..rec.len()).map(move |k| rec.get(k))
    }

    /// First k with `end > t`. Valid because ends are strictly increasing
    /// in a disjoint sorted record.
    fn lower_bound_end(&self, t: u32) -> usize {
        let (mut lo, mut hi) = (0, self.len());
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if self.get(mid).end <= t {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        lo
    }

    /// First k with `start > t`.
    fn upper_bound_start(&self, t: u32) -> usize {
        let (mut lo, mut hi) = (0, self.len());
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if self.get(mid).start <= t {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        lo
    }

    /// Walk the intervals overlapping `probe` in record order, passing
    /// each clipped piece to `emit`.
    fn for_each_clipped<F: FnMut(Interval)>(&self, probe: &Interval, mut emit: F) {
        let mut k = self.lower_bound_end(probe.start);
        while k < self.len() {
            let iv = self.get(k);
            if iv.start >= probe.end {
                break;
            }
            if let Some(clipped) = iv.intersect(probe) {
                emit(clipped);
            }
            k += 1;
        }
    }
}
