// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! The per-device validation state, and the entry points for device-level commands.
//!
//! A [`DeviceValidator`] is created once per `VkDevice`, with the limits and enabled features of
//! that device. Every `validate_*` method checks one Vulkan call, reports what it finds to the
//! [`DebugReport`] and returns `true` if the call should be skipped. Methods validating commands
//! recorded into a command buffer live in the [`command_buffer`](crate::command_buffer) module.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use vulkano_validation::{
//!     device::{DeviceValidator, DeviceValidatorCreateInfo},
//!     report::{DebugReport, DebugReportCreateInfo},
//!     tracker::ObjectTable,
//! };
//!
//! let table = Arc::new(ObjectTable::new());
//! let report = Arc::new(DebugReport::new(DebugReportCreateInfo::from_env()));
//! let validator = DeviceValidator::new(table, report, DeviceValidatorCreateInfo::default());
//!
//! assert_eq!(validator.report().error_count(), 0);
//! ```

use crate::{
    buffer::address::BufferCandidates, object::ObjectHandle, report::DebugReport,
    tracker::ObjectTracker, DeviceAddress, DeviceSize, Handle, NonExhaustive,
};
use std::{fmt, sync::Arc};

pub(crate) use self::acceleration_structure::BuildTargets;

mod acceleration_structure;

/// Validates the calls made on one device.
pub struct DeviceValidator {
    tracker: Arc<dyn ObjectTracker>,
    report: Arc<DebugReport>,
    properties: RayTracingProperties,
    enabled_features: EnabledFeatures,
}

impl DeviceValidator {
    /// Creates a new `DeviceValidator` that reads objects from `tracker` and reports to `report`.
    pub fn new(
        tracker: Arc<dyn ObjectTracker>,
        report: Arc<DebugReport>,
        create_info: DeviceValidatorCreateInfo,
    ) -> Self {
        let DeviceValidatorCreateInfo {
            properties,
            enabled_features,
            _ne: _,
        } = create_info;

        log::debug!(
            target: "vulkano_validation",
            "creating a device validator with {:?}",
            enabled_features,
        );

        for (name, alignment) in [
            (
                "min_acceleration_structure_scratch_offset_alignment",
                properties.min_acceleration_structure_scratch_offset_alignment,
            ),
            (
                "shader_group_handle_alignment",
                properties.shader_group_handle_alignment,
            ),
            ("shader_group_base_alignment", properties.shader_group_base_alignment),
        ] {
            if !alignment.is_power_of_two() {
                log::warn!(
                    target: "vulkano_validation",
                    "the `{}` device property ({}) is not a power of two",
                    name,
                    alignment,
                );
            }
        }

        DeviceValidator {
            tracker,
            report,
            properties,
            enabled_features,
        }
    }

    #[inline]
    pub fn tracker(&self) -> &Arc<dyn ObjectTracker> {
        &self.tracker
    }

    #[inline]
    pub fn report(&self) -> &Arc<DebugReport> {
        &self.report
    }

    /// Returns the limits the validator checks against.
    #[inline]
    pub fn properties(&self) -> &RayTracingProperties {
        &self.properties
    }

    #[inline]
    pub fn enabled_features(&self) -> &EnabledFeatures {
        &self.enabled_features
    }

    /// Gives a name to an object, as with `vkSetDebugUtilsObjectNameEXT`. The name is shown next
    /// to the handle in every later message. `None` removes the name.
    #[inline]
    pub fn set_debug_utils_object_name<H: Handle>(&self, handle: H, name: Option<&str>) {
        self.report.set_object_name(ObjectHandle::new(handle), name);
    }

    /// Returns the buffers whose device address range contains `address`.
    #[inline]
    pub(crate) fn buffer_candidates(&self, address: DeviceAddress) -> BufferCandidates {
        self.tracker.find_buffers_by_address(address)
    }
}

impl fmt::Debug for DeviceValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceValidator")
            .field("properties", &self.properties)
            .field("enabled_features", &self.enabled_features)
            .finish_non_exhaustive()
    }
}

/// Parameters to create a new `DeviceValidator`.
#[derive(Clone, Debug)]
pub struct DeviceValidatorCreateInfo {
    /// The limits of the device.
    ///
    /// The default value is [`RayTracingProperties::default()`].
    pub properties: RayTracingProperties,

    /// The features that were enabled on the device.
    ///
    /// The default value is [`EnabledFeatures::empty()`].
    pub enabled_features: EnabledFeatures,

    pub _ne: NonExhaustive,
}

impl Default for DeviceValidatorCreateInfo {
    #[inline]
    fn default() -> Self {
        Self {
            properties: RayTracingProperties::default(),
            enabled_features: EnabledFeatures::empty(),
            _ne: NonExhaustive(()),
        }
    }
}

/// The device limits of `VK_KHR_acceleration_structure` and `VK_KHR_ray_tracing_pipeline`.
///
/// The default values are the minimums that the Vulkan specification requires of every
/// implementation that supports the extensions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RayTracingProperties {
    /// The alignment of the scratch data of acceleration structure builds.
    pub min_acceleration_structure_scratch_offset_alignment: u32,

    /// The maximum number of geometries in a bottom-level acceleration structure.
    pub max_geometry_count: DeviceSize,

    /// The maximum number of instances in a top-level acceleration structure.
    pub max_instance_count: DeviceSize,

    /// The maximum number of triangles or AABBs in all geometries of a bottom-level acceleration
    /// structure.
    pub max_primitive_count: DeviceSize,

    /// The size in bytes of a shader group handle.
    pub shader_group_handle_size: u32,

    /// The alignment of the stride between shader group handles in a shader binding table.
    pub shader_group_handle_alignment: u32,

    /// The alignment of the base address of a shader binding table.
    pub shader_group_base_alignment: u32,

    /// The maximum stride between shader group handles in a shader binding table.
    pub max_shader_group_stride: u32,

    /// The maximum number of ray generation shader invocations of one trace rays command.
    pub max_ray_dispatch_invocation_count: u32,

    pub _ne: NonExhaustive,
}

impl Default for RayTracingProperties {
    #[inline]
    fn default() -> Self {
        Self {
            min_acceleration_structure_scratch_offset_alignment: 256,
            max_geometry_count: 1 << 24,
            max_instance_count: 1 << 24,
            max_primitive_count: 1 << 29,
            shader_group_handle_size: 32,
            shader_group_handle_alignment: 32,
            shader_group_base_alignment: 64,
            max_shader_group_stride: 4096,
            max_ray_dispatch_invocation_count: 1 << 30,
            _ne: NonExhaustive(()),
        }
    }
}

/// The device features that change what validation allows.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct EnabledFeatures {
    /// `accelerationStructureHostCommands`: acceleration structures can be built on the host.
    pub acceleration_structure_host_commands: bool,

    /// `rayTracingPipelineTraceRaysIndirect`: `vkCmdTraceRaysIndirectKHR` can be used.
    pub ray_tracing_pipeline_trace_rays_indirect: bool,
}

impl EnabledFeatures {
    /// Returns an `EnabledFeatures` with no feature enabled.
    #[inline]
    pub const fn empty() -> Self {
        Self {
            acceleration_structure_host_commands: false,
            ray_tracing_pipeline_trace_rays_indirect: false,
        }
    }

    /// Returns an `EnabledFeatures` with every feature enabled.
    #[inline]
    pub const fn all() -> Self {
        Self {
            acceleration_structure_host_commands: true,
            ray_tracing_pipeline_trace_rays_indirect: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk;

    #[test]
    fn default_properties_are_powers_of_two() {
        let properties = RayTracingProperties::default();

        assert!(properties
            .min_acceleration_structure_scratch_offset_alignment
            .is_power_of_two());
        assert!(properties.shader_group_handle_alignment.is_power_of_two());
        assert!(properties.shader_group_base_alignment.is_power_of_two());
        assert!(properties.shader_group_handle_size <= properties.max_shader_group_stride);
    }

    #[test]
    fn object_names_show_up_in_messages() {
        let (validator, _table, captured) = device_validator!();
        let buffer = vk::Buffer::from_raw(0x2a);

        validator.set_debug_utils_object_name(buffer, Some("vertices"));

        let mut objects = crate::object::ObjectList::new();
        objects.add(buffer);
        validator
            .report()
            .log_error("VUID-test", &objects, "vkTest()", "broken");

        let messages = captured.take();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].text.contains("VkBuffer 0x2a[vertices]"));
    }

    #[test]
    fn features_macro() {
        let (validator, _table, _captured) =
            device_validator!(acceleration_structure_host_commands);

        assert!(validator.enabled_features().acceleration_structure_host_commands);
        assert!(!validator.enabled_features().ray_tracing_pipeline_trace_rays_indirect);
    }

    #[test]
    fn all_features() {
        assert_eq!(
            EnabledFeatures::all(),
            EnabledFeatures {
                acceleration_structure_host_commands: true,
                ray_tracing_pipeline_trace_rays_indirect: true,
            },
        );
        assert_eq!(EnabledFeatures::default(), EnabledFeatures::empty());
    }
}
