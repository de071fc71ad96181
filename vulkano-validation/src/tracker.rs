// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! The object state that validation reads.
//!
//! Validation never owns objects. It reads them through the [`ObjectTracker`] trait, which the
//! layer implements on top of whatever registry it keeps. [`ObjectTable`] is a self-contained
//! implementation that also hands out handles and device addresses, the way a driver would.

use crate::{
    acceleration_structure::{
        AccelerationStructure, AccelerationStructureBuildSizesInfo,
        AccelerationStructureCreateInfo,
    },
    address_map::AddressMap,
    buffer::{address::BufferCandidates, Buffer, BufferCreateInfo, BufferUsage, MemoryBinding},
    memory::{
        align_up, DeviceMemory, MemoryAllocateFlags, MemoryAllocateInfo, MemoryRequirements,
    },
    range::AddressRange,
    DeviceAddress, DeviceSize,
};
use ash::vk::{self, Handle};
use foldhash::HashMap;
use parking_lot::{Mutex, RwLock};
use std::{
    error::Error,
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Weak,
    },
};

const LOG_TARGET: &str = "vulkano_validation";

/// The first device address handed out by an `ObjectTable`.
pub const ADDRESS_SPACE_START: DeviceAddress = 0x1_0000;

/// The alignment of the device address ranges handed out by an `ObjectTable`.
pub const ADDRESS_SPACE_ALIGNMENT: DeviceSize = 0x1_0000;

/// Read access to the objects of a device.
///
/// Implementations are shared between threads, and objects can be created, bound and destroyed
/// concurrently with validation. The objects returned are snapshots: a buffer returned by
/// [`find_buffers_by_address`](Self::find_buffers_by_address) may be destroyed before it is
/// looked at.
pub trait ObjectTracker: Send + Sync {
    /// Returns every live buffer whose device address range contains `address`.
    ///
    /// A buffer that was destroyed while the lookup was running may be returned as `None`.
    fn find_buffers_by_address(&self, address: DeviceAddress) -> BufferCandidates;

    /// Returns the buffer with the given handle, if it is alive.
    fn buffer(&self, handle: vk::Buffer) -> Option<Arc<Buffer>>;

    /// Returns the acceleration structure with the given handle, if it is alive.
    fn acceleration_structure(
        &self,
        handle: vk::AccelerationStructureKHR,
    ) -> Option<Arc<AccelerationStructure>>;
}

/// A thread-safe registry of memory, buffer and acceleration structure objects.
#[derive(Debug)]
pub struct ObjectTable {
    next_handle: AtomicU64,
    next_address: Mutex<DeviceAddress>,
    memories: RwLock<HashMap<vk::DeviceMemory, Arc<DeviceMemory>>>,
    buffers: RwLock<HashMap<vk::Buffer, Arc<Buffer>>>,
    buffer_addresses: RwLock<AddressMap<Weak<Buffer>>>,
    acceleration_structures:
        RwLock<HashMap<vk::AccelerationStructureKHR, Arc<AccelerationStructure>>>,
}

impl ObjectTable {
    pub fn new() -> Self {
        ObjectTable {
            next_handle: AtomicU64::new(1),
            next_address: Mutex::new(ADDRESS_SPACE_START),
            memories: RwLock::new(HashMap::default()),
            buffers: RwLock::new(HashMap::default()),
            buffer_addresses: RwLock::new(AddressMap::new()),
            acceleration_structures: RwLock::new(HashMap::default()),
        }
    }

    fn next_handle<H: Handle>(&self) -> H {
        H::from_raw(self.next_handle.fetch_add(1, Ordering::Relaxed))
    }

    // Reserves `size` bytes of device address space.
    fn reserve_addresses(&self, size: DeviceSize) -> Result<DeviceAddress, ObjectTableError> {
        let mut next_address = self.next_address.lock();
        let base = *next_address;
        let next = base
            .checked_add(size)
            .and_then(|end| align_up(end, ADDRESS_SPACE_ALIGNMENT))
            .ok_or(ObjectTableError::AddressSpaceExhausted)?;
        *next_address = next;

        Ok(base)
    }

    /// Allocates a new memory object. If `allocate_info.flags` contains
    /// [`MemoryAllocateFlags::DEVICE_ADDRESS`], the allocation gets a range of device addresses.
    pub fn allocate_memory(
        &self,
        allocate_info: &MemoryAllocateInfo,
    ) -> Result<Arc<DeviceMemory>, ObjectTableError> {
        if allocate_info.allocation_size == 0 {
            return Err(ObjectTableError::ZeroSize);
        }

        let device_address = if allocate_info
            .flags
            .intersects(MemoryAllocateFlags::DEVICE_ADDRESS)
        {
            Some(self.reserve_addresses(allocate_info.allocation_size)?)
        } else {
            None
        };

        let memory = Arc::new(DeviceMemory::new(
            self.next_handle(),
            allocate_info,
            device_address,
        ));
        self.memories
            .write()
            .insert(memory.handle(), memory.clone());

        log::trace!(target: LOG_TARGET, "allocated {:?}", memory);

        Ok(memory)
    }

    /// Frees a memory object. Buffers bound to it stay alive, but their memory is no longer
    /// valid.
    pub fn free_memory(&self, handle: vk::DeviceMemory) -> Result<(), ObjectTableError> {
        let memory = self
            .memories
            .write()
            .remove(&handle)
            .ok_or(ObjectTableError::UnknownMemory(handle))?;
        memory.mark_freed();

        Ok(())
    }

    #[inline]
    pub fn memory(&self, handle: vk::DeviceMemory) -> Option<Arc<DeviceMemory>> {
        self.memories.read().get(&handle).cloned()
    }

    /// Creates a new buffer.
    ///
    /// Sparse buffers with the [`BufferUsage::SHADER_DEVICE_ADDRESS`] usage get their device
    /// address immediately, since they are never bound with
    /// [`bind_buffer_memory`](Self::bind_buffer_memory).
    pub fn create_buffer(
        &self,
        create_info: &BufferCreateInfo,
    ) -> Result<Arc<Buffer>, ObjectTableError> {
        if create_info.size == 0 {
            return Err(ObjectTableError::ZeroSize);
        }

        let alignment = if create_info.usage.intersects(
            BufferUsage::UNIFORM_BUFFER
                | BufferUsage::STORAGE_BUFFER
                | BufferUsage::ACCELERATION_STRUCTURE_STORAGE
                | BufferUsage::SHADER_BINDING_TABLE,
        ) {
            256
        } else {
            16
        };
        let memory_requirements = MemoryRequirements {
            size: align_up(create_info.size, alignment)
                .ok_or(ObjectTableError::AddressSpaceExhausted)?,
            alignment,
            memory_type_bits: u32::MAX,
        };

        let buffer = Arc::new(Buffer::new(
            self.next_handle(),
            create_info,
            memory_requirements,
        ));

        if buffer.is_sparse()
            && buffer
                .usage()
                .intersects(BufferUsage::SHADER_DEVICE_ADDRESS)
        {
            let device_address = self.reserve_addresses(buffer.size())?;
            buffer.set_device_address(device_address);
            self.buffer_addresses.write().insert(
                AddressRange::with_size(device_address, buffer.size()),
                Arc::downgrade(&buffer),
            );
        }

        self.buffers
            .write()
            .insert(buffer.handle(), buffer.clone());

        log::trace!(target: LOG_TARGET, "created {:?}", buffer);

        Ok(buffer)
    }

    /// Binds a non-sparse buffer to memory, as with `vkBindBufferMemory`.
    pub fn bind_buffer_memory(
        &self,
        buffer: vk::Buffer,
        memory: vk::DeviceMemory,
        offset: DeviceSize,
    ) -> Result<(), ObjectTableError> {
        let buffer = self
            .buffer(buffer)
            .ok_or(ObjectTableError::UnknownBuffer(buffer))?;
        let memory = self
            .memory(memory)
            .ok_or(ObjectTableError::UnknownMemory(memory))?;

        if buffer.is_sparse() {
            return Err(ObjectTableError::SparseBuffer(buffer.handle()));
        }

        if buffer.bound_memory().is_some() {
            return Err(ObjectTableError::AlreadyBound(buffer.handle()));
        }

        let alignment = buffer.memory_requirements().alignment;

        if offset % alignment != 0 {
            return Err(ObjectTableError::MisalignedOffset { offset, alignment });
        }

        if offset
            .checked_add(buffer.size())
            .is_none_or(|end| end > memory.allocation_size())
        {
            return Err(ObjectTableError::OutOfRange {
                offset,
                size: buffer.size(),
                allocation_size: memory.allocation_size(),
            });
        }

        let device_address = memory
            .device_address()
            .filter(|_| {
                buffer
                    .usage()
                    .intersects(BufferUsage::SHADER_DEVICE_ADDRESS)
            })
            .map(|base| base + offset);

        buffer.bind_memory(MemoryBinding { memory, offset }, device_address);

        if let Some(device_address) = device_address {
            self.buffer_addresses.write().insert(
                AddressRange::with_size(device_address, buffer.size()),
                Arc::downgrade(&buffer),
            );
        }

        Ok(())
    }

    /// Destroys a buffer. It is no longer returned by lookups, but references to it that are
    /// still held see it as destroyed.
    pub fn destroy_buffer(&self, handle: vk::Buffer) -> Result<(), ObjectTableError> {
        let buffer = self
            .buffers
            .write()
            .remove(&handle)
            .ok_or(ObjectTableError::UnknownBuffer(handle))?;

        if let Some(range) = buffer.device_address_range() {
            self.buffer_addresses
                .write()
                .remove(range, |weak| weak.as_ptr() == Arc::as_ptr(&buffer));
        }

        buffer.mark_destroyed();

        Ok(())
    }

    /// Creates an acceleration structure in an existing buffer. `build_sizes` are the sizes
    /// queried for the geometry it is going to be built with, if known.
    ///
    /// No validation happens here; see
    /// [`DeviceValidator::validate_create_acceleration_structure`].
    ///
    /// [`DeviceValidator::validate_create_acceleration_structure`]: crate::device::DeviceValidator::validate_create_acceleration_structure
    pub fn create_acceleration_structure(
        &self,
        create_info: &AccelerationStructureCreateInfo,
        build_sizes: Option<AccelerationStructureBuildSizesInfo>,
    ) -> Result<Arc<AccelerationStructure>, ObjectTableError> {
        let buffer = self
            .buffer(create_info.buffer)
            .ok_or(ObjectTableError::UnknownBuffer(create_info.buffer))?;
        let acceleration_structure = Arc::new(AccelerationStructure::new(
            self.next_handle(),
            buffer,
            create_info,
            build_sizes,
        ));
        self.acceleration_structures.write().insert(
            acceleration_structure.handle(),
            acceleration_structure.clone(),
        );

        Ok(acceleration_structure)
    }

    pub fn destroy_acceleration_structure(
        &self,
        handle: vk::AccelerationStructureKHR,
    ) -> Result<(), ObjectTableError> {
        let acceleration_structure = self
            .acceleration_structures
            .write()
            .remove(&handle)
            .ok_or(ObjectTableError::UnknownAccelerationStructure(handle))?;
        acceleration_structure.mark_destroyed();

        Ok(())
    }
}

impl Default for ObjectTable {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectTracker for ObjectTable {
    fn find_buffers_by_address(&self, address: DeviceAddress) -> BufferCandidates {
        self.buffer_addresses
            .read()
            .overlapping(address)
            .map(|(_, buffer)| buffer.upgrade())
            .collect()
    }

    #[inline]
    fn buffer(&self, handle: vk::Buffer) -> Option<Arc<Buffer>> {
        self.buffers.read().get(&handle).cloned()
    }

    #[inline]
    fn acceleration_structure(
        &self,
        handle: vk::AccelerationStructureKHR,
    ) -> Option<Arc<AccelerationStructure>> {
        self.acceleration_structures.read().get(&handle).cloned()
    }
}

/// Error that can happen when operating on an `ObjectTable`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ObjectTableError {
    UnknownBuffer(vk::Buffer),
    UnknownMemory(vk::DeviceMemory),
    UnknownAccelerationStructure(vk::AccelerationStructureKHR),

    /// An allocation or a buffer was requested with a size of zero.
    ZeroSize,

    /// No more device addresses are available.
    AddressSpaceExhausted,

    /// The buffer is already bound to memory.
    AlreadyBound(vk::Buffer),

    /// Sparse buffers can't be bound with `bind_buffer_memory`.
    SparseBuffer(vk::Buffer),

    /// The offset is not a multiple of the buffer's memory alignment requirement.
    MisalignedOffset {
        offset: DeviceSize,
        alignment: DeviceSize,
    },

    /// The buffer doesn't fit in the memory at the given offset.
    OutOfRange {
        offset: DeviceSize,
        size: DeviceSize,
        allocation_size: DeviceSize,
    },
}

impl Error for ObjectTableError {}

impl fmt::Display for ObjectTableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            Self::UnknownBuffer(handle) => write!(f, "unknown buffer {:#x}", handle.as_raw()),
            Self::UnknownMemory(handle) => {
                write!(f, "unknown device memory {:#x}", handle.as_raw())
            }
            Self::UnknownAccelerationStructure(handle) => {
                write!(f, "unknown acceleration structure {:#x}", handle.as_raw())
            }
            Self::ZeroSize => write!(f, "the requested size was zero"),
            Self::AddressSpaceExhausted => write!(f, "the device address space is exhausted"),
            Self::AlreadyBound(handle) => {
                write!(f, "buffer {:#x} is already bound to memory", handle.as_raw())
            }
            Self::SparseBuffer(handle) => write!(
                f,
                "buffer {:#x} is a sparse buffer and can't be bound to a single memory object",
                handle.as_raw(),
            ),
            Self::MisalignedOffset { offset, alignment } => write!(
                f,
                "the offset {} is not a multiple of the required alignment {}",
                offset, alignment,
            ),
            Self::OutOfRange {
                offset,
                size,
                allocation_size,
            } => write!(
                f,
                "a buffer of size {} at offset {} does not fit in an allocation of size {}",
                size, offset, allocation_size,
            ),
        }
    }
}
