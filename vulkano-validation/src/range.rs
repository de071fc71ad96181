// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! Half-open ranges over the 64-bit device address space.

use crate::{DeviceAddress, DeviceSize};
use std::{cmp, fmt, ops::Range};

/// A half-open range `[begin, end)` of device addresses, or of offsets into a memory object.
///
/// An empty range (`begin == end`) is allowed. It never intersects anything, not even itself.
///
/// Ranges are ordered by `(begin, end)`, so they can be used as keys of sorted containers.
///
/// `begin` must not be greater than `end`. This is not checked outside of debug builds; every
/// constructor in this crate upholds it.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AddressRange {
    pub begin: DeviceAddress,
    pub end: DeviceAddress,
}

impl AddressRange {
    /// The empty range at address zero.
    pub const EMPTY: Self = AddressRange { begin: 0, end: 0 };

    #[inline]
    pub const fn new(begin: DeviceAddress, end: DeviceAddress) -> Self {
        debug_assert!(begin <= end);

        AddressRange { begin, end }
    }

    /// Returns the range of `size` bytes starting at `begin`. The end saturates at the top of the
    /// address space.
    #[inline]
    pub const fn with_size(begin: DeviceAddress, size: DeviceSize) -> Self {
        AddressRange {
            begin,
            end: begin.saturating_add(size),
        }
    }

    #[inline]
    pub const fn len(self) -> DeviceSize {
        self.end - self.begin
    }

    #[inline]
    pub const fn is_empty(self) -> bool {
        self.begin == self.end
    }

    /// Returns whether `address` lies inside the range.
    #[inline]
    pub const fn contains(self, address: DeviceAddress) -> bool {
        self.begin <= address && address < self.end
    }

    /// Returns the part of the range that is also covered by `other`, or an empty range if the
    /// two are disjoint.
    #[inline]
    pub fn intersection(self, other: Self) -> Self {
        let begin = cmp::max(self.begin, other.begin);
        let end = cmp::min(self.end, other.end);

        if begin < end {
            AddressRange { begin, end }
        } else {
            Self::EMPTY
        }
    }

    /// Returns whether `other` lies entirely inside `self`.
    #[inline]
    pub const fn includes(self, other: Self) -> bool {
        self.begin <= other.begin && other.end <= self.end
    }

    /// Returns whether the two ranges share at least one address.
    #[inline]
    pub const fn intersects(self, other: Self) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.begin < other.end
            && other.begin < self.end
    }
}

impl From<Range<DeviceAddress>> for AddressRange {
    #[inline]
    fn from(range: Range<DeviceAddress>) -> Self {
        AddressRange::new(range.start, range.end)
    }
}

impl From<AddressRange> for Range<DeviceAddress> {
    #[inline]
    fn from(range: AddressRange) -> Self {
        range.begin..range.end
    }
}

impl fmt::Debug for AddressRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:#x}, {:#x})", self.begin, self.end)
    }
}

impl fmt::Display for AddressRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
