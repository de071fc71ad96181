// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! A map from address ranges to values that allows ranges to overlap.

use crate::{range::AddressRange, DeviceAddress, DeviceSize};
use smallvec::SmallVec;
use std::{
    collections::BTreeMap,
    fmt::{Debug, Error as FmtError, Formatter},
};

/// A map whose keys are half-open address ranges `[begin, end)`.
///
/// Unlike a range map that coalesces or splits ranges on insertion, every inserted range is kept
/// as is, and any number of ranges may overlap. This is what's needed to find all the buffers that
/// contain an address when memory is aliased.
///
/// Lookups only visit the ranges whose start lies within the longest stored range below the
/// queried address, so they stay cheap as long as no single range is huge compared to the
/// others.
#[derive(Clone)]
pub struct AddressMap<V> {
    // Stores the range start in the key and the range end in the corresponding entries.
    btm: BTreeMap<DeviceAddress, SmallVec<[Entry<V>; 1]>>,
    // Length of the longest range that was ever inserted. Not shrunk on removal.
    longest: DeviceSize,
    len: usize,
}

#[derive(Clone)]
struct Entry<V> {
    end: DeviceAddress,
    value: V,
}

impl<V> Default for AddressMap<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> AddressMap<V> {
    /// Makes a new empty `AddressMap`.
    #[inline]
    pub const fn new() -> Self {
        AddressMap {
            btm: BTreeMap::new(),
            longest: 0,
            len: 0,
        }
    }

    /// Returns the number of ranges in the map.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Inserts `value` for `range`. Existing ranges are left untouched, even if they overlap.
    ///
    /// Empty ranges don't contain any address, so they are not stored.
    pub fn insert(&mut self, range: AddressRange, value: V) {
        if range.is_empty() {
            return;
        }

        self.btm.entry(range.begin).or_default().push(Entry {
            end: range.end,
            value,
        });
        self.longest = self.longest.max(range.len());
        self.len += 1;
    }

    /// Removes the first value stored for exactly `range` for which `pred` returns `true`, and
    /// returns it.
    pub fn remove(
        &mut self,
        range: AddressRange,
        mut pred: impl FnMut(&V) -> bool,
    ) -> Option<V> {
        let entries = self.btm.get_mut(&range.begin)?;
        let index = entries
            .iter()
            .position(|entry| entry.end == range.end && pred(&entry.value))?;
        let entry = entries.remove(index);

        if entries.is_empty() {
            self.btm.remove(&range.begin);
        }

        self.len -= 1;

        Some(entry.value)
    }

    /// Removes all values for which `pred` returns `false`.
    pub fn retain(&mut self, mut pred: impl FnMut(AddressRange, &V) -> bool) {
        let mut removed = 0;

        self.btm.retain(|&begin, entries| {
            let before = entries.len();
            entries.retain(|entry| pred(AddressRange::new(begin, entry.end), &entry.value));
            removed += before - entries.len();

            !entries.is_empty()
        });

        self.len -= removed;
    }

    /// Returns an iterator over all the ranges that contain `address`, with their values.
    pub fn overlapping(
        &self,
        address: DeviceAddress,
    ) -> impl Iterator<Item = (AddressRange, &V)> + '_ {
        self.candidates(address, address)
            .filter(move |(range, _)| range.contains(address))
    }

    /// Returns an iterator over all the stored ranges that share at least one address with
    /// `range`, with their values.
    pub fn overlapping_range(
        &self,
        range: AddressRange,
    ) -> impl Iterator<Item = (AddressRange, &V)> + '_ {
        (!range.is_empty())
            .then(|| self.candidates(range.begin, range.end - 1))
            .into_iter()
            .flatten()
            .filter(move |(stored, _)| stored.intersects(range))
    }

    /// Returns an iterator over all the ranges in the map, ordered by start address.
    pub fn iter(&self) -> impl Iterator<Item = (AddressRange, &V)> + '_ {
        self.btm.iter().flat_map(|(&begin, entries)| {
            entries
                .iter()
                .map(move |entry| (AddressRange::new(begin, entry.end), &entry.value))
        })
    }

    // Visits the ranges starting in `first - longest + 1 ..= last`. Those are the only ones that
    // can reach `first`. Requires `first <= last`.
    fn candidates(
        &self,
        first: DeviceAddress,
        last: DeviceAddress,
    ) -> impl Iterator<Item = (AddressRange, &V)> + '_ {
        let lower = first.saturating_sub(self.longest.saturating_sub(1));

        self.btm.range(lower..=last).flat_map(|(&begin, entries)| {
            entries
                .iter()
                .map(move |entry| (AddressRange::new(begin, entry.end), &entry.value))
        })
    }
}

impl<V> Debug for AddressMap<V>
where
    V: Debug,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        f.debug_map().entries(self.iter()).finish()
    }
}
