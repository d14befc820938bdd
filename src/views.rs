//! Composition layer: logical interval set views.
//!
//! The adapters here present richer sources as one logical interval set
//! map: a payload-filtered projection of an interval list store, a union
//! of several such projections, an id-restricted subset, and an
//! intersection of several set maps. Every materialised interval list a
//! wrapper returns is deoverlapped, with an optional `fuzz` slack that
//! also merges near-adjacent runs.
//!
//! Id lists that require combining several constituents are computed once
//! on first use and published through a `OnceLock`, so concurrent readers
//! always observe a fully built list.

use rustc_hash::FxHashSet;
use std::sync::OnceLock;

use crate::error::{Result, StoreError};
use crate::interval::{deoverlap, Interval, PayloadFilter};
use crate::listmap::IntervalListMapping;
use crate::setmap::IntervalSetMapping;

/// The read operations shared by [`IntervalSetMapping`] and every adapter
/// in this module.
pub trait IntervalSetView {
    /// Number of distinct ids.
    fn len(&self) -> usize;

    /// All ids in ascending order.
    fn get_ids(&self) -> &[u32];

    /// Check whether an id is present.
    fn has_id(&self, id: u32) -> bool;

    /// Total covered time across all ids.
    fn sum(&self) -> u64;

    /// Materialise an id's intervals as a deoverlapped set.
    fn get_intervals(&self, id: u32, use_default: bool) -> Result<Vec<Interval>>;

    /// Check whether a time point is covered.
    fn is_contained(&self, id: u32, target: u32, use_default: bool) -> Result<bool>;

    /// Clip the id's coverage against each probe, in probe order.
    fn intersect(&self, id: u32, probes: &[Interval], use_default: bool)
        -> Result<Vec<Interval>>;

    /// Total length `intersect` would produce.
    fn intersect_sum(&self, id: u32, probes: &[Interval], use_default: bool) -> Result<u64>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl IntervalSetView for IntervalSetMapping {
    fn len(&self) -> usize {
        IntervalSetMapping::len(self)
    }

    fn get_ids(&self) -> &[u32] {
        IntervalSetMapping::get_ids(self)
    }

    fn has_id(&self, id: u32) -> bool {
        IntervalSetMapping::has_id(self, id)
    }

    fn sum(&self) -> u64 {
        IntervalSetMapping::sum(self)
    }

    fn get_intervals(&self, id: u32, use_default: bool) -> Result<Vec<Interval>> {
        IntervalSetMapping::get_intervals(self, id, use_default)
    }

    fn is_contained(&self, id: u32, target: u32, use_default: bool) -> Result<bool> {
        IntervalSetMapping::is_contained(self, id, target, use_default)
    }

    fn intersect(
        &self,
        id: u32,
        probes: &[Interval],
        use_default: bool,
    ) -> Result<Vec<Interval>> {
        IntervalSetMapping::intersect(self, id, probes, use_default)
    }

    fn intersect_sum(&self, id: u32, probes: &[Interval], use_default: bool) -> Result<u64> {
        IntervalSetMapping::intersect_sum(self, id, probes, use_default)
    }
}

impl<T: IntervalSetView + ?Sized> IntervalSetView for &T {
    fn len(&self) -> usize {
        (**self).len()
    }

    fn get_ids(&self) -> &[u32] {
        (**self).get_ids()
    }

    fn has_id(&self, id: u32) -> bool {
        (**self).has_id(id)
    }

    fn sum(&self) -> u64 {
        (**self).sum()
    }

    fn get_intervals(&self, id: u32, use_default: bool) -> Result<Vec<Interval>> {
        (**self).get_intervals(id, use_default)
    }

    fn is_contained(&self, id: u32, target: u32, use_default: bool) -> Result<bool> {
        (**self).is_contained(id, target, use_default)
    }

    fn intersect(
        &self,
        id: u32,
        probes: &[Interval],
        use_default: bool,
    ) -> Result<Vec<Interval>> {
        (**self).intersect(id, probes, use_default)
    }

    fn intersect_sum(&self, id: u32, probes: &[Interval], use_default: bool) -> Result<u64> {
        (**self).intersect_sum(id, probes, use_default)
    }
}

fn intervals_len(intervals: &[Interval]) -> u64 {
    intervals.iter().map(|iv| u64::from(iv.len())).sum()
}

/// An interval list store projected through a payload filter, viewed as a
/// deoverlapped interval set map.
pub struct ListProjection<'a> {
    list: &'a IntervalListMapping,
    filter: PayloadFilter,
    search_window: u32,
    fuzz: u32,
}

impl<'a> ListProjection<'a> {
    /// Project `list` through `filter`. `search_window` bounds the
    /// containment scan and must be at least the longest stored entry.
    pub fn new(list: &'a IntervalListMapping, filter: PayloadFilter, search_window: u32) -> Self {
        Self {
            list,
            filter,
            search_window,
            fuzz: 0,
        }
    }

    /// Also merge runs lying within `fuzz` of each other.
    pub fn with_fuzz(mut self, fuzz: u32) -> Self {
        self.fuzz = fuzz;
        self
    }
}

impl IntervalSetView for ListProjection<'_> {
    fn len(&self) -> usize {
        self.list.len()
    }

    fn get_ids(&self) -> &[u32] {
        self.list.get_ids()
    }

    fn has_id(&self, id: u32) -> bool {
        self.list.has_id(id)
    }

    /// Sums deoverlapped coverage over all entries, ignoring the
    /// projection's filter.
    fn sum(&self) -> u64 {
        let mut total = 0u64;
        for &id in self.list.get_ids() {
            let entries = self
                .list
                .get_intervals(id, PayloadFilter::ANY, true)
                .unwrap_or_default();
            total += intervals_len(&deoverlap(entries, self.fuzz));
        }
        total
    }

    fn get_intervals(&self, id: u32, use_default: bool) -> Result<Vec<Interval>> {
        let intervals = self.list.get_intervals(id, self.filter, use_default)?;
        Ok(deoverlap(intervals, self.fuzz))
    }

    fn is_contained(&self, id: u32, target: u32, use_default: bool) -> Result<bool> {
        self.list
            .is_contained(id, target, self.filter, use_default, self.search_window)
    }

    fn intersect(
        &self,
        id: u32,
        probes: &[Interval],
        use_default: bool,
    ) -> Result<Vec<Interval>> {
        let pieces = self.list.intersect(id, probes, self.filter, use_default)?;
        Ok(deoverlap(pieces, self.fuzz))
    }

    fn intersect_sum(&self, id: u32, probes: &[Interval], use_default: bool) -> Result<u64> {
        Ok(intervals_len(&self.intersect(id, probes, use_default)?))
    }
}

/// The union of several payload-filtered interval list projections,
/// viewed as one deoverlapped interval set map.
pub struct UnionProjection<'a> {
    lists: Vec<&'a IntervalListMapping>,
    filter: PayloadFilter,
    search_window: u32,
    fuzz: u32,
    ids: OnceLock<Vec<u32>>,
}

impl<'a> UnionProjection<'a> {
    pub fn new(
        lists: Vec<&'a IntervalListMapping>,
        filter: PayloadFilter,
        search_window: u32,
    ) -> Self {
        Self {
            lists,
            filter,
            search_window,
            fuzz: 0,
            ids: OnceLock::new(),
        }
    }

    /// Also merge runs lying within `fuzz` of each other.
    pub fn with_fuzz(mut self, fuzz: u32) -> Self {
        self.fuzz = fuzz;
        self
    }

    fn cached_ids(&self) -> &[u32] {
        self.ids.get_or_init(|| {
            let mut ids: Vec<u32> = self
                .lists
                .iter()
                .flat_map(|list| list.get_ids().iter().copied())
                .collect();
            ids.sort_unstable();
            ids.dedup();
            ids
        })
    }

    /// Collect each constituent's output and merge into one start-sorted
    /// stream. The constituents are individually sorted, so sorting the
    /// concatenation is equivalent to a k-way merge.
    fn merge<F>(&self, mut collect: F) -> Result<Vec<Interval>>
    where
        F: FnMut(&IntervalListMapping) -> Result<Vec<Interval>>,
    {
        let mut merged = Vec::new();
        for &list in &self.lists {
            merged.extend(collect(list)?);
        }
        merged.sort_unstable();
        Ok(merged)
    }
}

impl IntervalSetView for UnionProjection<'_> {
    fn len(&self) -> usize {
        self.cached_ids().len()
    }

    fn get_ids(&self) -> &[u32] {
        self.cached_ids()
    }

    fn has_id(&self, id: u32) -> bool {
        self.lists.iter().any(|list| list.has_id(id))
    }

    fn sum(&self) -> u64 {
        let mut total = 0u64;
        for &id in self.cached_ids() {
            let merged = self
                .merge(|list| list.get_intervals(id, PayloadFilter::ANY, true))
                .unwrap_or_default();
            total += intervals_len(&deoverlap(merged, self.fuzz));
        }
        total
    }

    fn get_intervals(&self, id: u32, use_default: bool) -> Result<Vec<Interval>> {
        let merged = self.merge(|list| list.get_intervals(id, self.filter, use_default))?;
        Ok(deoverlap(merged, self.fuzz))
    }

    fn is_contained(&self, id: u32, target: u32, use_default: bool) -> Result<bool> {
        for list in &self.lists {
            if list.is_contained(id, target, self.filter, use_default, self.search_window)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Only constituents that actually hold the id participate, so an id
    /// present anywhere never trips `IdNotFound` on the others.
    fn intersect(
        &self,
        id: u32,
        probes: &[Interval],
        use_default: bool,
    ) -> Result<Vec<Interval>> {
        let merged = self.merge(|list| {
            if list.has_id(id) {
                list.intersect(id, probes, self.filter, use_default)
            } else {
                Ok(Vec::new())
            }
        })?;
        Ok(deoverlap(merged, self.fuzz))
    }

    fn intersect_sum(&self, id: u32, probes: &[Interval], use_default: bool) -> Result<u64> {
        Ok(intervals_len(&self.intersect(id, probes, use_default)?))
    }
}

/// A view restricted to an explicit set of admissible ids.
///
/// Admissible ids pass through transparently; all others behave exactly
/// like ids absent from the base map.
pub struct SubsetView<S> {
    base: S,
    admissible: FxHashSet<u32>,
    ids: OnceLock<Vec<u32>>,
}

impl<S: IntervalSetView> SubsetView<S> {
    pub fn new(base: S, admissible: impl IntoIterator<Item = u32>) -> Self {
        Self {
            base,
            admissible: admissible.into_iter().collect(),
            ids: OnceLock::new(),
        }
    }

    fn cached_ids(&self) -> &[u32] {
        self.ids.get_or_init(|| {
            self.base
                .get_ids()
                .iter()
                .copied()
                .filter(|id| self.admissible.contains(id))
                .collect()
        })
    }

    /// Membership gate: `Ok(true)` to delegate, `Ok(false)` to yield the
    /// identity value, `Err` for an inadmissible id without a default.
    fn admit(&self, id: u32, use_default: bool) -> Result<bool> {
        if self.admissible.contains(&id) {
            Ok(true)
        } else if use_default {
            Ok(false)
        } else {
            Err(StoreError::IdNotFound(id))
        }
    }
}

impl<S: IntervalSetView> IntervalSetView for SubsetView<S> {
    fn len(&self) -> usize {
        self.cached_ids().len()
    }

    fn get_ids(&self) -> &[u32] {
        self.cached_ids()
    }

    fn has_id(&self, id: u32) -> bool {
        self.admissible.contains(&id) && self.base.has_id(id)
    }

    fn sum(&self) -> u64 {
        let mut total = 0u64;
        for &id in self.cached_ids() {
            let intervals = self.base.get_intervals(id, true).unwrap_or_default();
            total += intervals_len(&intervals);
        }
        total
    }

    fn get_intervals(&self, id: u32, use_default: bool) -> Result<Vec<Interval>> {
        if !self.admit(id, use_default)? {
            return Ok(Vec::new());
        }
        self.base.get_intervals(id, use_default)
    }

    fn is_contained(&self, id: u32, target: u32, use_default: bool) -> Result<bool> {
        if !self.admit(id, use_default)? {
            return Ok(false);
        }
        self.base.is_contained(id, target, use_default)
    }

    fn intersect(
        &self,
        id: u32,
        probes: &[Interval],
        use_default: bool,
    ) -> Result<Vec<Interval>> {
        if !self.admit(id, use_default)? {
            return Ok(Vec::new());
        }
        self.base.intersect(id, probes, use_default)
    }

    fn intersect_sum(&self, id: u32, probes: &[Interval], use_default: bool) -> Result<u64> {
        if !self.admit(id, use_default)? {
            return Ok(0);
        }
        self.base.intersect_sum(id, probes, use_default)
    }
}

/// The set intersection of several views.
///
/// Per-id coverage is the fold of the first map's intervals through each
/// remaining map's `intersect`; constituent inputs are disjoint sets, so
/// every output here is disjoint without a deoverlap pass.
pub struct IntersectionView<S> {
    maps: Vec<S>,
    ids: OnceLock<Vec<u32>>,
}

impl<S: IntervalSetView> IntersectionView<S> {
    pub fn new(maps: Vec<S>) -> Self {
        Self {
            maps,
            ids: OnceLock::new(),
        }
    }

    fn cached_ids(&self) -> &[u32] {
        self.ids.get_or_init(|| match self.maps.split_first() {
            None => Vec::new(),
            Some((first, rest)) => first
                .get_ids()
                .iter()
                .copied()
                .filter(|&id| rest.iter().all(|map| map.has_id(id)))
                .collect(),
        })
    }
}

impl<S: IntervalSetView> IntervalSetView for IntersectionView<S> {
    fn len(&self) -> usize {
        self.cached_ids().len()
    }

    fn get_ids(&self) -> &[u32] {
        self.cached_ids()
    }

    fn has_id(&self, id: u32) -> bool {
        !self.maps.is_empty() && self.maps.iter().all(|map| map.has_id(id))
    }

    fn sum(&self) -> u64 {
        let mut total = 0u64;
        for &id in self.cached_ids() {
            let intervals = self.get_intervals(id, true).unwrap_or_default();
            total += intervals_len(&intervals);
        }
        total
    }

    fn get_intervals(&self, id: u32, use_default: bool) -> Result<Vec<Interval>> {
        let Some((first, rest)) = self.maps.split_first() else {
            return Ok(Vec::new());
        };
        let mut current = first.get_intervals(id, use_default)?;
        for map in rest {
            if current.is_empty() {
                break;
            }
            current = map.intersect(id, &current, use_default)?;
        }
        Ok(current)
    }

    fn is_contained(&self, id: u32, target: u32, use_default: bool) -> Result<bool> {
        if self.maps.is_empty() {
            return Ok(false);
        }
        for map in &self.maps {
            if !map.is_contained(id, target, use_default)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn intersect(
        &self,
        id: u32,
        probes: &[Interval],
        use_default: bool,
    ) -> Result<Vec<Interval>> {
        if self.maps.is_empty() {
            return Ok(Vec::new());
        }
        let mut current = probes.to_vec();
        for map in &self.maps {
            if current.is_empty() {
                break;
            }
            current = map.intersect(id, &current, use_default)?;
        }
        Ok(current)
    }

    /// Folds through all but the last constituent, then lets the last one
    /// sum without materialising the final list.
    fn intersect_sum(&self, id: u32, probes: &[Interval], use_default: bool) -> Result<u64> {
        let Some((last, rest)) = self.maps.split_last() else {
            return Ok(0);
        };
        let mut current = probes.to_vec();
        for map in rest {
            if current.is_empty() {
                return Ok(0);
            }
            current = map.intersect(id, &current, use_default)?;
        }
        last.intersect_sum(id, &current, use_default)
    }
}
