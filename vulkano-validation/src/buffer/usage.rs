// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

use crate::macros::vulkan_bitflags;

vulkan_bitflags! {
    /// Describes how a buffer is going to be used. This is **not** just an optimization.
    ///
    /// Using a buffer in a way that wasn't declared at creation is a validation error.
    BufferUsage = BufferUsageFlags(u32);

    /// The buffer can be used as a source for transfer, blit, resolve and clear commands.
    TRANSFER_SRC = TRANSFER_SRC,

    /// The buffer can be used as a destination for transfer, blit, resolve and clear commands.
    TRANSFER_DST = TRANSFER_DST,

    /// The buffer can be used as a uniform texel buffer in a descriptor set.
    UNIFORM_TEXEL_BUFFER = UNIFORM_TEXEL_BUFFER,

    /// The buffer can be used as a storage texel buffer in a descriptor set.
    STORAGE_TEXEL_BUFFER = STORAGE_TEXEL_BUFFER,

    /// The buffer can be used as a uniform buffer in a descriptor set.
    UNIFORM_BUFFER = UNIFORM_BUFFER,

    /// The buffer can be used as a storage buffer in a descriptor set, and as scratch memory for
    /// acceleration structure builds.
    STORAGE_BUFFER = STORAGE_BUFFER,

    /// The buffer can be used as an index buffer.
    INDEX_BUFFER = INDEX_BUFFER,

    /// The buffer can be used as a vertex or instance buffer.
    VERTEX_BUFFER = VERTEX_BUFFER,

    /// The buffer can be used as an indirect buffer, including for indirect ray tracing.
    INDIRECT_BUFFER = INDIRECT_BUFFER,

    /// The buffer's device address can be retrieved.
    ///
    /// A buffer created with this usage only gets a device address when it is bound to memory
    /// allocated with [`MemoryAllocateFlags::DEVICE_ADDRESS`].
    ///
    /// [`MemoryAllocateFlags::DEVICE_ADDRESS`]: crate::memory::MemoryAllocateFlags::DEVICE_ADDRESS
    SHADER_DEVICE_ADDRESS = SHADER_DEVICE_ADDRESS,

    /// The buffer can be used as read-only input to an acceleration structure build.
    ACCELERATION_STRUCTURE_BUILD_INPUT_READ_ONLY = ACCELERATION_STRUCTURE_BUILD_INPUT_READ_ONLY_KHR,

    /// The buffer can be used as storage space for an acceleration structure.
    ACCELERATION_STRUCTURE_STORAGE = ACCELERATION_STRUCTURE_STORAGE_KHR,

    /// The buffer can be used as a shader binding table.
    SHADER_BINDING_TABLE = SHADER_BINDING_TABLE_KHR,
}
