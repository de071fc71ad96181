// Copyright (c) 2021 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! Tracked acceleration structures, and the parameters of the commands that build and copy them.
//!
//! Acceleration structure commands refer to their inputs (vertices, indices, instances, scratch
//! space) by device address. The types in this module carry those addresses as they were given to
//! the command, without resolving them to buffers.

use crate::{
    buffer::Buffer, memory::MemoryRegion, range::AddressRange, DeviceAddress, DeviceSize,
    NonExhaustive,
};
use ash::vk;
use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

/// The type of an acceleration structure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum AccelerationStructureType {
    /// Refers to bottom-level acceleration structures, through instances.
    TopLevel,

    /// Contains triangles or axis-aligned bounding boxes.
    BottomLevel,

    /// The type is determined at build time. Only allowed for creation.
    Generic,
}

impl From<AccelerationStructureType> for vk::AccelerationStructureTypeKHR {
    #[inline]
    fn from(val: AccelerationStructureType) -> Self {
        match val {
            AccelerationStructureType::TopLevel => vk::AccelerationStructureTypeKHR::TOP_LEVEL,
            AccelerationStructureType::BottomLevel => {
                vk::AccelerationStructureTypeKHR::BOTTOM_LEVEL
            }
            AccelerationStructureType::Generic => vk::AccelerationStructureTypeKHR::GENERIC,
        }
    }
}

/// Parameters to create a new `AccelerationStructure`.
#[derive(Clone, Debug)]
pub struct AccelerationStructureCreateInfo {
    /// The buffer to store the acceleration structure in.
    ///
    /// The default value is a null handle, which must be overridden.
    pub buffer: vk::Buffer,

    /// The offset in bytes of the acceleration structure in `buffer`.
    ///
    /// The default value is `0`.
    pub offset: DeviceSize,

    /// The size in bytes of the acceleration structure.
    ///
    /// The default value is `0`, which must be overridden.
    pub size: DeviceSize,

    /// The type of acceleration structure to create.
    ///
    /// The default value is [`AccelerationStructureType::Generic`].
    pub ty: AccelerationStructureType,

    pub _ne: NonExhaustive,
}

impl Default for AccelerationStructureCreateInfo {
    #[inline]
    fn default() -> Self {
        Self {
            buffer: vk::Buffer::null(),
            offset: 0,
            size: 0,
            ty: AccelerationStructureType::Generic,
            _ne: NonExhaustive(()),
        }
    }
}

/// The sizes needed to build an acceleration structure, as returned by
/// `vkGetAccelerationStructureBuildSizesKHR`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AccelerationStructureBuildSizesInfo {
    /// The minimum size of the acceleration structure.
    pub acceleration_structure_size: DeviceSize,

    /// The minimum size of the scratch space for an update operation.
    pub update_scratch_size: DeviceSize,

    /// The minimum size of the scratch space for a build operation.
    pub build_scratch_size: DeviceSize,
}

/// The state of a `VkAccelerationStructureKHR`.
pub struct AccelerationStructure {
    handle: vk::AccelerationStructureKHR,
    buffer: Arc<Buffer>,
    offset: DeviceSize,
    size: DeviceSize,
    ty: AccelerationStructureType,
    build_sizes: Option<AccelerationStructureBuildSizesInfo>,
    destroyed: AtomicBool,
}

impl AccelerationStructure {
    pub(crate) fn new(
        handle: vk::AccelerationStructureKHR,
        buffer: Arc<Buffer>,
        create_info: &AccelerationStructureCreateInfo,
        build_sizes: Option<AccelerationStructureBuildSizesInfo>,
    ) -> Self {
        let &AccelerationStructureCreateInfo {
            buffer: _,
            offset,
            size,
            ty,
            _ne: _,
        } = create_info;

        AccelerationStructure {
            handle,
            buffer,
            offset,
            size,
            ty,
            build_sizes,
            destroyed: AtomicBool::new(false),
        }
    }

    #[inline]
    pub fn handle(&self) -> vk::AccelerationStructureKHR {
        self.handle
    }

    /// Returns the buffer that the acceleration structure is stored in.
    #[inline]
    pub fn buffer(&self) -> &Arc<Buffer> {
        &self.buffer
    }

    #[inline]
    pub fn offset(&self) -> DeviceSize {
        self.offset
    }

    #[inline]
    pub fn size(&self) -> DeviceSize {
        self.size
    }

    #[inline]
    pub fn ty(&self) -> AccelerationStructureType {
        self.ty
    }

    /// Returns the build sizes that were queried for the geometry this acceleration structure
    /// was created for, if they are known.
    #[inline]
    pub fn build_sizes(&self) -> Option<&AccelerationStructureBuildSizesInfo> {
        self.build_sizes.as_ref()
    }

    #[inline]
    pub fn is_alive(&self) -> bool {
        !self.destroyed.load(Ordering::Acquire)
    }

    /// Returns the device address of the acceleration structure storage.
    #[inline]
    pub fn device_address(&self) -> Option<DeviceAddress> {
        self.buffer
            .device_address()
            .and_then(|address| address.checked_add(self.offset))
    }

    /// Returns the device memory that backs the acceleration structure, if its buffer is bound.
    ///
    /// The offset is not checked against the buffer when the acceleration structure is created,
    /// so this also returns `None` if the offset lies past the end of the address space.
    pub fn memory_region(&self) -> Option<MemoryRegion> {
        let binding = self.buffer.bound_memory()?;

        Some(MemoryRegion {
            memory: binding.memory.handle(),
            range: AddressRange::with_size(binding.offset.checked_add(self.offset)?, self.size),
        })
    }

    pub(crate) fn mark_destroyed(&self) {
        self.destroyed.store(true, Ordering::Release);
    }
}

impl fmt::Debug for AccelerationStructure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccelerationStructure")
            .field("handle", &self.handle)
            .field("buffer", &self.buffer.handle())
            .field("offset", &self.offset)
            .field("size", &self.size)
            .field("ty", &self.ty)
            .field("build_sizes", &self.build_sizes)
            .finish_non_exhaustive()
    }
}

/// The mode of an acceleration structure build.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BuildAccelerationStructureMode {
    /// Build a new acceleration structure from scratch.
    Build,

    /// Update a previously built source acceleration structure with new data, storing the
    /// updated structure in the destination.
    Update(vk::AccelerationStructureKHR),
}

/// A description of the data that is used to build an acceleration structure.
#[derive(Clone, Debug)]
pub struct AccelerationStructureBuildGeometryInfo {
    /// The type of acceleration structure to build. Must not be
    /// [`AccelerationStructureType::Generic`].
    ///
    /// The default value is [`AccelerationStructureType::BottomLevel`].
    pub ty: AccelerationStructureType,

    /// The mode that the build command should operate in.
    ///
    /// The default value is [`BuildAccelerationStructureMode::Build`].
    pub mode: BuildAccelerationStructureMode,

    /// The acceleration structure to build or update.
    ///
    /// There is no default value.
    pub dst_acceleration_structure: Option<vk::AccelerationStructureKHR>,

    /// The data that will be used to build the acceleration structure.
    pub geometries: AccelerationStructureGeometries,

    /// The device address of the scratch space used during the build.
    ///
    /// There is no default value.
    pub scratch_data: Option<DeviceAddress>,

    pub _ne: NonExhaustive,
}

impl AccelerationStructureBuildGeometryInfo {
    /// Returns a `AccelerationStructureBuildGeometryInfo` with the specified `geometries`, and a
    /// type matching them.
    #[inline]
    pub fn new(geometries: AccelerationStructureGeometries) -> Self {
        Self {
            ty: match geometries {
                AccelerationStructureGeometries::Instances(_) => {
                    AccelerationStructureType::TopLevel
                }
                _ => AccelerationStructureType::BottomLevel,
            },
            mode: BuildAccelerationStructureMode::Build,
            dst_acceleration_structure: None,
            geometries,
            scratch_data: None,
            _ne: NonExhaustive(()),
        }
    }
}

/// The geometries of an acceleration structure build. All geometries of one build have the same
/// type.
#[derive(Clone, Debug)]
pub enum AccelerationStructureGeometries {
    Triangles(Vec<AccelerationStructureGeometryTrianglesData>),
    Aabbs(Vec<AccelerationStructureGeometryAabbsData>),
    Instances(AccelerationStructureGeometryInstancesData),
}

impl AccelerationStructureGeometries {
    /// Returns the number of geometries.
    #[inline]
    pub fn len(&self) -> usize {
        match self {
            AccelerationStructureGeometries::Triangles(geometries) => geometries.len(),
            AccelerationStructureGeometries::Aabbs(geometries) => geometries.len(),
            AccelerationStructureGeometries::Instances(_) => 1,
        }
    }
}

/// A bottom-level geometry consisting of triangles.
#[derive(Clone, Debug)]
pub struct AccelerationStructureGeometryTrianglesData {
    /// The format of each vertex in `vertex_data`.
    ///
    /// The default value is `vk::Format::UNDEFINED`, which must be overridden.
    pub vertex_format: vk::Format,

    /// The device address of the vertex data.
    ///
    /// The default value is `None`, which must be overridden.
    pub vertex_data: Option<DeviceAddress>,

    /// The number of bytes between the start of successive elements in `vertex_data`.
    ///
    /// The default value is `0`, which must be overridden.
    pub vertex_stride: u32,

    /// The highest vertex index that may be read from `vertex_data`.
    ///
    /// The default value is `0`.
    pub max_vertex: u32,

    /// If indices are used, the device address and type of the index data.
    ///
    /// The default value is `None`.
    pub index_data: Option<IndexData>,

    /// Optionally, the device address of a 3x4 row-major affine transformation matrix applied to
    /// the vertices.
    ///
    /// The default value is `None`.
    pub transform_data: Option<DeviceAddress>,

    pub _ne: NonExhaustive,
}

impl AccelerationStructureGeometryTrianglesData {
    /// Returns a `AccelerationStructureGeometryTrianglesData` with the specified `vertex_format`.
    #[inline]
    pub fn new(vertex_format: vk::Format) -> Self {
        Self {
            vertex_format,
            vertex_data: None,
            vertex_stride: 0,
            max_vertex: 0,
            index_data: None,
            transform_data: None,
            _ne: NonExhaustive(()),
        }
    }
}

/// Returns the size in bytes of the smallest component of a vertex format, or `None` if the
/// format can't be used for acceleration structure vertices.
pub fn vertex_format_component_size(format: vk::Format) -> Option<DeviceSize> {
    match format {
        vk::Format::R32G32_SFLOAT | vk::Format::R32G32B32_SFLOAT => Some(4),
        vk::Format::R16G16_SFLOAT
        | vk::Format::R16G16B16A16_SFLOAT
        | vk::Format::R16G16_SNORM
        | vk::Format::R16G16B16A16_SNORM
        | vk::Format::R16G16B16A16_UNORM
        | vk::Format::R16G16_UNORM => Some(2),
        vk::Format::R8G8_SNORM
        | vk::Format::R8G8B8A8_SNORM
        | vk::Format::R8G8_UNORM
        | vk::Format::R8G8B8A8_UNORM => Some(1),
        vk::Format::A2B10G10R10_UNORM_PACK32 => Some(1),
        _ => None,
    }
}

/// The index buffer of a triangles geometry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IndexData {
    pub address: DeviceAddress,
    pub index_type: IndexType,
}

/// The type of indices of a triangles geometry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IndexType {
    U16,
    U32,
}

impl IndexType {
    /// Returns the size in bytes of an index of this type.
    #[inline]
    pub fn size(self) -> DeviceSize {
        match self {
            IndexType::U16 => 2,
            IndexType::U32 => 4,
        }
    }
}

impl From<IndexType> for vk::IndexType {
    #[inline]
    fn from(val: IndexType) -> Self {
        match val {
            IndexType::U16 => vk::IndexType::UINT16,
            IndexType::U32 => vk::IndexType::UINT32,
        }
    }
}

/// A bottom-level geometry consisting of axis-aligned bounding boxes.
#[derive(Clone, Debug)]
pub struct AccelerationStructureGeometryAabbsData {
    /// The device address of the AABB data.
    ///
    /// The default value is `None`, which must be overridden.
    pub data: Option<DeviceAddress>,

    /// The number of bytes between the start of successive elements in `data`.
    ///
    /// The default value is `24`.
    pub stride: u32,

    pub _ne: NonExhaustive,
}

impl Default for AccelerationStructureGeometryAabbsData {
    #[inline]
    fn default() -> Self {
        Self {
            data: None,
            stride: 24,
            _ne: NonExhaustive(()),
        }
    }
}

/// The instances of a top-level acceleration structure.
#[derive(Clone, Debug)]
pub struct AccelerationStructureGeometryInstancesData {
    /// The device address of the instance data.
    ///
    /// The default value is `None`, which must be overridden.
    pub data: Option<DeviceAddress>,

    /// Whether `data` is an array of device addresses of instances, rather than an array of
    /// instances.
    ///
    /// The default value is `false`.
    pub array_of_pointers: bool,

    pub _ne: NonExhaustive,
}

impl Default for AccelerationStructureGeometryInstancesData {
    #[inline]
    fn default() -> Self {
        Self {
            data: None,
            array_of_pointers: false,
            _ne: NonExhaustive(()),
        }
    }
}

/// Counts and offsets for an acceleration structure build operation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct AccelerationStructureBuildRangeInfo {
    /// The number of primitives.
    pub primitive_count: u32,

    /// The offset (in bytes) into the buffer holding geometric data,
    /// from where primitives should be read.
    pub primitive_offset: u32,

    /// The index of the first vertex to build from.
    ///
    /// This is used only for triangle geometries.
    pub first_vertex: u32,

    /// The offset (in bytes) into the buffer holding transform matrices,
    /// from where the matrix should be read.
    ///
    /// This is used only for triangle geometries.
    pub transform_offset: u32,
}

/// What mode an acceleration structure copy command should operate in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CopyAccelerationStructureMode {
    /// Copy the source into the destination.
    Clone,

    /// Create a more compact version of the source in the destination.
    Compact,

    /// Serialize the acceleration structure into data in a semi-opaque format,
    /// that can be deserialized by a compatible Vulkan implementation.
    Serialize,

    /// Deserialize data back into an acceleration structure.
    Deserialize,
}

/// Parameters for copying an acceleration structure into memory.
#[derive(Clone, Debug)]
pub struct CopyAccelerationStructureToMemoryInfo {
    /// The acceleration structure to copy from.
    pub src: vk::AccelerationStructureKHR,

    /// The device address to copy the serialized data to.
    pub dst: DeviceAddress,

    /// The mode of the copy. Must be [`CopyAccelerationStructureMode::Serialize`].
    ///
    /// The default value is [`CopyAccelerationStructureMode::Serialize`].
    pub mode: CopyAccelerationStructureMode,

    pub _ne: NonExhaustive,
}

impl CopyAccelerationStructureToMemoryInfo {
    #[inline]
    pub fn new(src: vk::AccelerationStructureKHR, dst: DeviceAddress) -> Self {
        Self {
            src,
            dst,
            mode: CopyAccelerationStructureMode::Serialize,
            _ne: NonExhaustive(()),
        }
    }
}

/// Parameters for copying from memory into an acceleration structure.
#[derive(Clone, Debug)]
pub struct CopyMemoryToAccelerationStructureInfo {
    /// The device address of the serialized data to copy from.
    pub src: DeviceAddress,

    /// The acceleration structure to copy into.
    pub dst: vk::AccelerationStructureKHR,

    /// The mode of the copy. Must be [`CopyAccelerationStructureMode::Deserialize`].
    ///
    /// The default value is [`CopyAccelerationStructureMode::Deserialize`].
    pub mode: CopyAccelerationStructureMode,

    pub _ne: NonExhaustive,
}

impl CopyMemoryToAccelerationStructureInfo {
    #[inline]
    pub fn new(src: DeviceAddress, dst: vk::AccelerationStructureKHR) -> Self {
        Self {
            src,
            dst,
            mode: CopyAccelerationStructureMode::Deserialize,
            _ne: NonExhaustive(()),
        }
    }
}
