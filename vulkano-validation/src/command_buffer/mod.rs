// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! Validation of commands recorded into a command buffer.
//!
//! The methods are defined on [`DeviceValidator`](crate::device::DeviceValidator), and are called
//! when the command is recorded. Each takes the handle of the command buffer, which is listed first
//! in every message about the command.
//!
//! Device addresses given to these commands are resolved to buffers at record time. An address
//! that more than one buffer could be meant by passes as long as one of those buffers satisfies
//! every requirement; only when none does is every offending buffer listed, one message per
//! requirement.

pub use self::ray_tracing::ShaderBindingTableAddresses;

mod acceleration_structure;
mod ray_tracing;
