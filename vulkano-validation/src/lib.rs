// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! Runtime validation of buffer device addresses used by Vulkan ray tracing and acceleration
//! structure commands.
//!
//! Commands such as `vkCmdBuildAccelerationStructuresKHR` or `vkCmdTraceRaysKHR` don't take buffer
//! handles, they take raw 64-bit device addresses. Because several live buffers can be bound to
//! the same memory (aliasing), a single address can belong to more than one buffer, and the
//! address usage is valid as soon as *one* of those buffers satisfies every requirement of the
//! command.
//!
//! # Overview
//!
//! - The [`ObjectTracker`](crate::tracker::ObjectTracker) trait is the view of the object state
//!   that validation needs: it resolves a device address to the candidate
//!   [`Buffer`](crate::buffer::Buffer)s that contain it.
//!   [`ObjectTable`](crate::tracker::ObjectTable) is a thread-safe implementation of it.
//!
//! - A [`BufferAddressValidator`](crate::buffer::address::BufferAddressValidator) holds a small set
//!   of [`BufferRule`](crate::buffer::address::BufferRule)s. It first checks, without building any
//!   strings, whether the candidates are acceptable. Only when they aren't does it build one
//!   diagnostic per violated rule, listing every offending buffer with its own reason.
//!
//! - Diagnostics go to a [`DebugReport`](crate::report::DebugReport), which forwards them to user
//!   callbacks and to the [`log`] facade.
//!
//! - [`DeviceValidator`](crate::device::DeviceValidator) ties everything together and exposes the
//!   `validate_*` entry points for the individual Vulkan commands. Each of them returns `true`
//!   when the command should be skipped.

pub use ash::vk::Handle;
use std::{borrow::Cow, error::Error, fmt};

mod macros;
#[macro_use]
mod tests;
pub mod acceleration_structure;
pub mod address_map;
pub mod buffer;
pub mod command_buffer;
pub mod device;
pub mod memory;
pub mod object;
pub mod range;
pub mod report;
pub mod tracker;

/// Represents memory size and offset values on a Vulkan device.
/// Analogous to the Rust `usize` type on the host.
pub use ash::vk::DeviceSize;

/// A 64-bit address of a location inside the memory of a buffer, as returned by
/// `vkGetBufferDeviceAddress`.
pub use ash::vk::DeviceAddress;

/// A helper type for non-exhaustive structs.
///
/// This type cannot be constructed outside this crate. Structures with a field of this type can
/// only be constructed by calling a constructor function or `Default::default()`. The effect is
/// similar to the standard Rust `#[non_exhaustive]` attribute, except that it does not prevent
/// update syntax from being used.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)] // add traits as needed
pub struct NonExhaustive(pub(crate) ());

/// The arguments or other context of a call to a Vulkan function were not valid.
///
/// This is used for the checks that only look at the arguments themselves. Checks that need to
/// resolve device addresses report through the [`DebugReport`](crate::report::DebugReport)
/// instead, because they can produce several diagnostics at once.
#[derive(Clone, Debug, Default)]
pub struct ValidationError {
    /// The context in which the problem exists (e.g. a specific parameter).
    pub context: Cow<'static, str>,

    /// A description of the problem.
    pub problem: Cow<'static, str>,

    /// *Valid Usage IDs* (VUIDs) in the Vulkan specification that relate to the problem.
    pub vuids: &'static [&'static str],

    pub _ne: NonExhaustive,
}

impl ValidationError {
    /// Prepends `context` to the existing context, separated by a dot.
    pub(crate) fn add_context(
        mut self: Box<Self>,
        context: impl Into<Cow<'static, str>>,
    ) -> Box<Self> {
        if self.context.is_empty() {
            self.context = context.into();
        } else {
            self.context = format!("{}.{}", context.into(), self.context).into();
        }

        self
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.context.is_empty() {
            write!(f, "{}", self.problem)?;
        } else {
            write!(f, "{}: {}", self.context, self.problem)?;
        }

        if !self.vuids.is_empty() {
            write!(f, "\n\nVulkan VUIDs:")?;

            for vuid in self.vuids {
                write!(f, "\n    {}", vuid)?;
            }
        }

        Ok(())
    }
}

impl Error for ValidationError {}
