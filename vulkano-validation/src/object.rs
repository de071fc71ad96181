// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! Type-erased object handles, as attached to diagnostics.

use ash::vk::{self, Handle};
use smallvec::SmallVec;
use std::{fmt, slice};

/// A Vulkan handle together with its object type.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectHandle {
    pub ty: vk::ObjectType,
    pub raw: u64,
}

impl ObjectHandle {
    #[inline]
    pub fn new<H: Handle>(handle: H) -> Self {
        ObjectHandle {
            ty: H::TYPE,
            raw: handle.as_raw(),
        }
    }

    #[inline]
    pub fn is_null(self) -> bool {
        self.raw == 0
    }

    /// Returns the name of the Vulkan type of the handle, e.g. `VkBuffer`.
    pub fn type_name(self) -> &'static str {
        match self.ty {
            vk::ObjectType::BUFFER => "VkBuffer",
            vk::ObjectType::DEVICE_MEMORY => "VkDeviceMemory",
            vk::ObjectType::ACCELERATION_STRUCTURE_KHR => "VkAccelerationStructureKHR",
            vk::ObjectType::COMMAND_BUFFER => "VkCommandBuffer",
            vk::ObjectType::DEVICE => "VkDevice",
            vk::ObjectType::PIPELINE => "VkPipeline",
            _ => "VkObject",
        }
    }
}

impl fmt::Debug for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:#x}", self.type_name(), self.raw)
    }
}

/// An ordered list of the objects a diagnostic is about.
///
/// Every handle appears at most once; adding a handle that is already present does nothing.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ObjectList {
    objects: SmallVec<[ObjectHandle; 4]>,
}

impl ObjectList {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a handle to the list. Returns `false` if it was already present or is null.
    #[inline]
    pub fn add<H: Handle>(&mut self, handle: H) -> bool {
        self.add_object(ObjectHandle::new(handle))
    }

    /// Like [`add`](Self::add), for an already type-erased handle.
    pub fn add_object(&mut self, object: ObjectHandle) -> bool {
        if object.is_null() || self.objects.contains(&object) {
            return false;
        }

        self.objects.push(object);

        true
    }

    #[inline]
    pub fn contains<H: Handle>(&self, handle: H) -> bool {
        self.objects.contains(&ObjectHandle::new(handle))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    #[inline]
    pub fn as_slice(&self) -> &[ObjectHandle] {
        &self.objects
    }

    #[inline]
    pub fn iter(&self) -> slice::Iter<'_, ObjectHandle> {
        self.objects.iter()
    }
}

impl<'a> IntoIterator for &'a ObjectList {
    type Item = &'a ObjectHandle;
    type IntoIter = slice::Iter<'a, ObjectHandle>;

    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl fmt::Debug for ObjectList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}
