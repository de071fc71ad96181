// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! Tracked buffer objects.
//!
//! A [`Buffer`] is the validation-side view of a `VkBuffer`: what it was created with, which
//! memory it is bound to and which device addresses it covers. The state can change at any time
//! from another thread (the buffer can be bound or destroyed), so every accessor returns a
//! snapshot.

pub use self::usage::BufferUsage;
use crate::{
    macros::vulkan_bitflags,
    memory::{DeviceMemory, MemoryRegion, MemoryRequirements},
    range::AddressRange,
    DeviceAddress, DeviceSize, NonExhaustive,
};
use ash::vk;
use parking_lot::RwLock;
use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

pub mod address;
mod usage;

vulkan_bitflags! {
    /// Flags to specify properties of a buffer.
    BufferCreateFlags = BufferCreateFlags(u32);

    /// The buffer is backed by sparse memory binding.
    SPARSE_BINDING = SPARSE_BINDING,

    /// The buffer can be partially backed by memory. Requires `SPARSE_BINDING`.
    SPARSE_RESIDENCY = SPARSE_RESIDENCY,

    /// The buffer can be backed by memory that is also backing another resource.
    /// Requires `SPARSE_BINDING`.
    SPARSE_ALIASED = SPARSE_ALIASED,

    PROTECTED = PROTECTED,

    DEVICE_ADDRESS_CAPTURE_REPLAY = DEVICE_ADDRESS_CAPTURE_REPLAY,
}

/// Parameters to create a new `Buffer`.
#[derive(Clone, Debug)]
pub struct BufferCreateInfo {
    /// Flags to enable.
    ///
    /// The default value is empty.
    pub flags: BufferCreateFlags,

    /// The size in bytes of the buffer.
    ///
    /// The default value is `0`, which must be overridden.
    pub size: DeviceSize,

    /// How the buffer is going to be used.
    ///
    /// The default value is empty, which must be overridden.
    pub usage: BufferUsage,

    pub _ne: NonExhaustive,
}

impl Default for BufferCreateInfo {
    #[inline]
    fn default() -> Self {
        Self {
            flags: BufferCreateFlags::empty(),
            size: 0,
            usage: BufferUsage::empty(),
            _ne: NonExhaustive(()),
        }
    }
}

/// The memory a buffer is bound to.
#[derive(Clone, Debug)]
pub struct MemoryBinding {
    pub memory: Arc<DeviceMemory>,
    /// The offset of the start of the buffer in `memory`.
    pub offset: DeviceSize,
}

/// The state of a `VkBuffer`.
pub struct Buffer {
    handle: vk::Buffer,
    flags: BufferCreateFlags,
    size: DeviceSize,
    usage: BufferUsage,
    memory_requirements: MemoryRequirements,
    state: RwLock<BufferState>,
    destroyed: AtomicBool,
}

#[derive(Default)]
struct BufferState {
    memory: Option<MemoryBinding>,
    device_address: Option<DeviceAddress>,
}

impl Buffer {
    pub(crate) fn new(
        handle: vk::Buffer,
        create_info: &BufferCreateInfo,
        memory_requirements: MemoryRequirements,
    ) -> Self {
        let &BufferCreateInfo {
            flags,
            size,
            usage,
            _ne: _,
        } = create_info;

        Buffer {
            handle,
            flags,
            size,
            usage,
            memory_requirements,
            state: RwLock::new(BufferState::default()),
            destroyed: AtomicBool::new(false),
        }
    }

    #[inline]
    pub fn handle(&self) -> vk::Buffer {
        self.handle
    }

    #[inline]
    pub fn flags(&self) -> BufferCreateFlags {
        self.flags
    }

    /// Returns the size of the buffer in bytes.
    #[inline]
    pub fn size(&self) -> DeviceSize {
        self.size
    }

    #[inline]
    pub fn usage(&self) -> BufferUsage {
        self.usage
    }

    #[inline]
    pub fn memory_requirements(&self) -> &MemoryRequirements {
        &self.memory_requirements
    }

    /// Returns whether the buffer was created with [`BufferCreateFlags::SPARSE_BINDING`]. Sparse
    /// buffers are never bound to a single memory object.
    #[inline]
    pub fn is_sparse(&self) -> bool {
        self.flags.intersects(BufferCreateFlags::SPARSE_BINDING)
    }

    /// Returns `false` once the buffer has been destroyed.
    #[inline]
    pub fn is_alive(&self) -> bool {
        !self.destroyed.load(Ordering::Acquire)
    }

    /// Returns the memory the buffer is bound to, if any.
    #[inline]
    pub fn bound_memory(&self) -> Option<MemoryBinding> {
        self.state.read().memory.clone()
    }

    /// Returns the device address of the first byte of the buffer.
    ///
    /// Returns `None` if the buffer has no device address or has been destroyed.
    #[inline]
    pub fn device_address(&self) -> Option<DeviceAddress> {
        if !self.is_alive() {
            return None;
        }

        self.state.read().device_address
    }

    /// Returns the range of device addresses covered by the buffer.
    ///
    /// Returns `None` if the buffer has no device address or has been destroyed.
    #[inline]
    pub fn device_address_range(&self) -> Option<AddressRange> {
        self.device_address()
            .map(|address| AddressRange::with_size(address, self.size))
    }

    /// Returns the part of the bound memory that backs `range`, a range of device addresses.
    ///
    /// `range` is clipped to the buffer. Returns `None` if the buffer is not bound to memory, has
    /// no device address, or if `range` lies outside the buffer.
    pub fn memory_region(&self, range: AddressRange) -> Option<MemoryRegion> {
        let buffer_range = self.device_address_range()?;
        let state = self.state.read();
        let binding = state.memory.as_ref()?;
        let range = buffer_range.intersection(range);

        if range.is_empty() {
            return None;
        }

        let begin = binding.offset + (range.begin - buffer_range.begin);

        Some(MemoryRegion {
            memory: binding.memory.handle(),
            range: AddressRange::with_size(begin, range.len()),
        })
    }

    /// Returns the region of memory that backs the whole buffer.
    #[inline]
    pub fn whole_memory_region(&self) -> Option<MemoryRegion> {
        let state = self.state.read();
        let binding = state.memory.as_ref()?;

        Some(MemoryRegion {
            memory: binding.memory.handle(),
            range: AddressRange::with_size(binding.offset, self.size),
        })
    }

    pub(crate) fn bind_memory(
        &self,
        binding: MemoryBinding,
        device_address: Option<DeviceAddress>,
    ) {
        let mut state = self.state.write();
        debug_assert!(state.memory.is_none());
        state.memory = Some(binding);
        state.device_address = device_address;
    }

    pub(crate) fn set_device_address(&self, device_address: DeviceAddress) {
        self.state.write().device_address = Some(device_address);
    }

    pub(crate) fn mark_destroyed(&self) {
        self.destroyed.store(true, Ordering::Release);
    }
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();

        f.debug_struct("Buffer")
            .field("handle", &self.handle)
            .field("flags", &self.flags)
            .field("size", &self.size)
            .field("usage", &self.usage)
            .field("memory", &state.memory.as_ref().map(|b| (b.memory.handle(), b.offset)))
            .field("device_address", &state.device_address)
            .field("alive", &self.is_alive())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryAllocateInfo;
    use ash::vk::Handle;

    fn buffer(size: DeviceSize) -> Buffer {
        Buffer::new(
            vk::Buffer::from_raw(1),
            &BufferCreateInfo {
                size,
                usage: BufferUsage::STORAGE_BUFFER | BufferUsage::SHADER_DEVICE_ADDRESS,
                ..Default::default()
            },
            MemoryRequirements {
                size,
                alignment: 16,
                memory_type_bits: 1,
            },
        )
    }

    fn memory() -> Arc<DeviceMemory> {
        Arc::new(DeviceMemory::new(
            vk::DeviceMemory::from_raw(9),
            &MemoryAllocateInfo {
                allocation_size: 0x1000,
                memory_type_index: 0,
                ..Default::default()
            },
            Some(0x10000),
        ))
    }

    #[test]
    fn unbound_buffer_has_no_address() {
        let buffer = buffer(256);

        assert!(buffer.is_alive());
        assert!(buffer.bound_memory().is_none());
        assert_eq!(buffer.device_address_range(), None);
        assert_eq!(buffer.memory_region(AddressRange::new(0, u64::MAX)), None);
    }

    #[test]
    fn bound_buffer() {
        let buffer = buffer(256);
        buffer.bind_memory(
            MemoryBinding {
                memory: memory(),
                offset: 0x100,
            },
            Some(0x10100),
        );

        assert_eq!(
            buffer.device_address_range(),
            Some(AddressRange::new(0x10100, 0x10200)),
        );
        assert_eq!(
            buffer.memory_region(AddressRange::new(0x10180, 0x10400)),
            Some(MemoryRegion {
                memory: vk::DeviceMemory::from_raw(9),
                range: AddressRange::new(0x180, 0x200),
            }),
        );
        assert_eq!(buffer.memory_region(AddressRange::new(0x10200, 0x10400)), None);
        assert_eq!(
            buffer.whole_memory_region().map(|region| region.range),
            Some(AddressRange::new(0x100, 0x200)),
        );
    }

    #[test]
    fn destroyed_buffer_loses_its_address() {
        let buffer = buffer(256);
        buffer.bind_memory(
            MemoryBinding {
                memory: memory(),
                offset: 0,
            },
            Some(0x10000),
        );
        buffer.mark_destroyed();

        assert!(!buffer.is_alive());
        assert_eq!(buffer.device_address(), None);
        assert_eq!(buffer.device_address_range(), None);
        assert!(buffer.bound_memory().is_some());
    }
}
