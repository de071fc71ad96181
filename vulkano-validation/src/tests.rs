// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

#![cfg(test)]

use crate::{
    buffer::{Buffer, BufferCreateInfo, BufferUsage},
    device::{DeviceValidator, DeviceValidatorCreateInfo, RayTracingProperties},
    memory::{DeviceMemory, MemoryAllocateInfo, MemoryPropertyFlags},
    object::ObjectHandle,
    report::{DebugReport, DebugReportCreateInfo, Message, MessageSeverity, UserCallback},
    tracker::ObjectTable,
    DeviceSize,
};
use std::sync::{Arc, Mutex};

/// Creates a `DeviceValidator` on top of a fresh `ObjectTable`, with the given features enabled.
/// Evaluates to `(validator, table, captured)`.
macro_rules! device_validator {
    ($($feature:ident),*) => ({
        use crate::device::{DeviceValidator, DeviceValidatorCreateInfo, EnabledFeatures};
        use crate::tests::CapturedMessages;
        use crate::tracker::ObjectTable;
        use std::sync::Arc;

        let table = Arc::new(ObjectTable::new());
        let (report, captured) = CapturedMessages::report();
        let validator = DeviceValidator::new(
            table.clone(),
            Arc::new(report),
            DeviceValidatorCreateInfo {
                enabled_features: EnabledFeatures {
                    $($feature: true,)*
                    ..EnabledFeatures::empty()
                },
                ..Default::default()
            },
        );

        (validator, table, captured)
    });
}

/// Creates a `DeviceValidator` with the given limits and no feature enabled.
pub(crate) fn device_validator_with_properties(
    properties: RayTracingProperties,
) -> (DeviceValidator, Arc<ObjectTable>, CapturedMessages) {
    let table = Arc::new(ObjectTable::new());
    let (report, captured) = CapturedMessages::report();
    let validator = DeviceValidator::new(
        table.clone(),
        Arc::new(report),
        DeviceValidatorCreateInfo {
            properties,
            ..Default::default()
        },
    );

    (validator, table, captured)
}

/// A message as received by a callback, with owned fields.
#[derive(Clone, Debug)]
pub(crate) struct CapturedMessage {
    pub severity: MessageSeverity,
    pub vuid: String,
    pub objects: Vec<ObjectHandle>,
    pub location: String,
    pub description: String,
    pub text: String,
}

/// Collects the messages delivered to its callbacks.
#[derive(Clone, Default)]
pub(crate) struct CapturedMessages {
    messages: Arc<Mutex<Vec<CapturedMessage>>>,
}

impl CapturedMessages {
    /// Returns a report that delivers every message, along with the messages it delivers.
    pub fn report() -> (DebugReport, CapturedMessages) {
        let captured = CapturedMessages::default();
        let report = DebugReport::new(DebugReportCreateInfo {
            duplicate_message_limit: 0,
            user_callbacks: vec![captured.callback()],
            ..Default::default()
        });

        (report, captured)
    }

    pub fn callback(&self) -> UserCallback {
        let messages = self.messages.clone();

        Arc::new(move |msg: &Message<'_>| {
            messages.lock().unwrap().push(CapturedMessage {
                severity: msg.severity,
                vuid: msg.vuid.to_owned(),
                objects: msg.objects.to_vec(),
                location: msg.location.to_owned(),
                description: msg.description.to_owned(),
                text: msg.text.to_owned(),
            });
        })
    }

    /// Removes and returns the messages received so far.
    pub fn take(&self) -> Vec<CapturedMessage> {
        std::mem::take(&mut *self.messages.lock().unwrap())
    }

    /// Removes the messages received so far and returns their VUIDs.
    pub fn take_vuids(&self) -> Vec<String> {
        self.take().into_iter().map(|msg| msg.vuid).collect()
    }
}

/// Allocates device-local memory that buffers can get device addresses from.
pub(crate) fn memory(table: &ObjectTable, size: DeviceSize) -> Arc<DeviceMemory> {
    table
        .allocate_memory(&MemoryAllocateInfo {
            allocation_size: size,
            memory_type_index: 0,
            ..Default::default()
        })
        .unwrap()
}

/// Allocates host-visible memory that buffers can get device addresses from.
pub(crate) fn host_visible_memory(table: &ObjectTable, size: DeviceSize) -> Arc<DeviceMemory> {
    table
        .allocate_memory(&MemoryAllocateInfo {
            allocation_size: size,
            memory_type_index: 1,
            property_flags: MemoryPropertyFlags::HOST_VISIBLE | MemoryPropertyFlags::HOST_COHERENT,
            ..Default::default()
        })
        .unwrap()
}

/// Creates a buffer with `usage` and `SHADER_DEVICE_ADDRESS`, and binds it at `offset` in
/// `memory`.
pub(crate) fn bound_buffer(
    table: &ObjectTable,
    memory: &Arc<DeviceMemory>,
    offset: DeviceSize,
    size: DeviceSize,
    usage: BufferUsage,
) -> Arc<Buffer> {
    let buffer = table
        .create_buffer(&BufferCreateInfo {
            size,
            usage: usage | BufferUsage::SHADER_DEVICE_ADDRESS,
            ..Default::default()
        })
        .unwrap();
    table
        .bind_buffer_memory(buffer.handle(), memory.handle(), offset)
        .unwrap();

    buffer
}
