// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! Tracked device memory objects.
//!
//! Buffers get their device addresses from the memory they are bound to. Two buffers bound to
//! overlapping ranges of the same `DeviceMemory` alias each other, which is why a device address
//! can resolve to more than one buffer.

use crate::{
    macros::vulkan_bitflags, object::ObjectHandle, range::AddressRange, DeviceAddress,
    DeviceSize, NonExhaustive,
};
use ash::vk;
use std::{
    fmt,
    sync::atomic::{AtomicBool, Ordering},
};

vulkan_bitflags! {
    /// Properties of a memory type.
    MemoryPropertyFlags = MemoryPropertyFlags(u32);

    /// The memory is located on the device, and is allocated from a heap that also has the
    /// `DEVICE_LOCAL` flag set.
    DEVICE_LOCAL = DEVICE_LOCAL,

    /// The memory can be mapped into the memory space of the host and accessed as regular RAM.
    HOST_VISIBLE = HOST_VISIBLE,

    /// Host writes are visible to the device without explicit flushes, and the other way around.
    HOST_COHERENT = HOST_COHERENT,

    /// The memory is cached by the host.
    HOST_CACHED = HOST_CACHED,

    /// Allocations made from this memory type are lazily allocated.
    LAZILY_ALLOCATED = LAZILY_ALLOCATED,

    /// The memory can only be accessed by the device, and allows protected queue access.
    PROTECTED = PROTECTED,
}

vulkan_bitflags! {
    /// Flags specifying additional properties of a memory allocation.
    MemoryAllocateFlags = MemoryAllocateFlags(u32);

    DEVICE_MASK = DEVICE_MASK,

    /// Buffers bound to the allocation can have their device address queried.
    DEVICE_ADDRESS = DEVICE_ADDRESS,

    DEVICE_ADDRESS_CAPTURE_REPLAY = DEVICE_ADDRESS_CAPTURE_REPLAY,
}

/// Parameters to allocate a new `DeviceMemory`.
#[derive(Clone, Debug)]
pub struct MemoryAllocateInfo {
    /// The number of bytes to allocate.
    ///
    /// The default value is `0`, which must be overridden.
    pub allocation_size: DeviceSize,

    /// The index of the memory type to allocate from.
    ///
    /// The default value is `u32::MAX`, which must be overridden.
    pub memory_type_index: u32,

    /// The property flags of the memory type at `memory_type_index`.
    ///
    /// The default value is [`MemoryPropertyFlags::DEVICE_LOCAL`].
    pub property_flags: MemoryPropertyFlags,

    /// Additional flags for the allocation.
    ///
    /// The default value is [`MemoryAllocateFlags::DEVICE_ADDRESS`].
    pub flags: MemoryAllocateFlags,

    pub _ne: NonExhaustive,
}

impl Default for MemoryAllocateInfo {
    #[inline]
    fn default() -> Self {
        MemoryAllocateInfo {
            allocation_size: 0,
            memory_type_index: u32::MAX,
            property_flags: MemoryPropertyFlags::DEVICE_LOCAL,
            flags: MemoryAllocateFlags::DEVICE_ADDRESS,
            _ne: NonExhaustive(()),
        }
    }
}

/// The state of a `VkDeviceMemory` allocation.
pub struct DeviceMemory {
    handle: vk::DeviceMemory,
    allocation_size: DeviceSize,
    memory_type_index: u32,
    property_flags: MemoryPropertyFlags,
    flags: MemoryAllocateFlags,
    device_address: Option<DeviceAddress>,
    freed: AtomicBool,
}

impl DeviceMemory {
    pub(crate) fn new(
        handle: vk::DeviceMemory,
        allocate_info: &MemoryAllocateInfo,
        device_address: Option<DeviceAddress>,
    ) -> Self {
        let &MemoryAllocateInfo {
            allocation_size,
            memory_type_index,
            property_flags,
            flags,
            _ne: _,
        } = allocate_info;

        DeviceMemory {
            handle,
            allocation_size,
            memory_type_index,
            property_flags,
            flags,
            device_address,
            freed: AtomicBool::new(false),
        }
    }

    #[inline]
    pub fn handle(&self) -> vk::DeviceMemory {
        self.handle
    }

    #[inline]
    pub fn allocation_size(&self) -> DeviceSize {
        self.allocation_size
    }

    #[inline]
    pub fn memory_type_index(&self) -> u32 {
        self.memory_type_index
    }

    #[inline]
    pub fn property_flags(&self) -> MemoryPropertyFlags {
        self.property_flags
    }

    #[inline]
    pub fn flags(&self) -> MemoryAllocateFlags {
        self.flags
    }

    /// Returns the device address of the first byte of the allocation, if the allocation was
    /// made with [`MemoryAllocateFlags::DEVICE_ADDRESS`].
    #[inline]
    pub fn device_address(&self) -> Option<DeviceAddress> {
        self.device_address
    }

    /// Returns `false` once the memory has been freed.
    #[inline]
    pub fn is_alive(&self) -> bool {
        !self.freed.load(Ordering::Acquire)
    }

    pub(crate) fn mark_freed(&self) {
        self.freed.store(true, Ordering::Release);
    }
}

impl fmt::Debug for DeviceMemory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceMemory")
            .field("handle", &self.handle)
            .field("allocation_size", &self.allocation_size)
            .field("memory_type_index", &self.memory_type_index)
            .field("property_flags", &self.property_flags)
            .field("device_address", &self.device_address)
            .field("alive", &self.is_alive())
            .finish()
    }
}

/// The memory requirements of a resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MemoryRequirements {
    /// The number of bytes of memory the resource occupies.
    pub size: DeviceSize,

    /// The alignment that the offset of the resource in its memory must have.
    pub alignment: DeviceSize,

    /// Indicates which memory types can be used. Each bit that is set to 1 means that the memory
    /// type whose index is the same as the position of the bit can be used.
    pub memory_type_bits: u32,
}

/// Rounds `value` up to a multiple of `alignment`, which must be a power of two. Returns `None` on
/// overflow.
#[inline]
pub(crate) fn align_up(value: DeviceSize, alignment: DeviceSize) -> Option<DeviceSize> {
    debug_assert!(alignment.is_power_of_two());

    Some(value.checked_add(alignment - 1)? & !(alignment - 1))
}

/// Returns whether `value` is a multiple of `alignment`. An alignment of zero places no
/// requirement.
#[inline]
pub(crate) fn is_aligned(value: DeviceSize, alignment: DeviceSize) -> bool {
    value
        .checked_rem(alignment)
        .is_none_or(|remainder| remainder == 0)
}

/// A range of bytes inside one memory object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MemoryRegion {
    pub memory: vk::DeviceMemory,
    /// Offsets into `memory`.
    pub range: AddressRange,
}

impl MemoryRegion {
    /// Returns the bytes shared by the two regions. Regions in different memory objects never
    /// overlap.
    #[inline]
    pub fn overlap(&self, other: &MemoryRegion) -> Option<AddressRange> {
        if self.memory != other.memory {
            return None;
        }

        let overlap = self.range.intersection(other.range);

        (!overlap.is_empty()).then_some(overlap)
    }
}

impl fmt::Display for MemoryRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {}",
            self.range,
            ObjectHandle::new(self.memory),
        )
    }
}
