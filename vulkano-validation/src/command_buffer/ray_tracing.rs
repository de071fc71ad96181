// Copyright (c) 2024 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

use crate::{
    buffer::{
        address::{BufferAddressValidator, BufferCheck, BufferRule, DiagnosticContext},
        BufferUsage,
    },
    device::DeviceValidator,
    memory::is_aligned,
    object::ObjectList,
    range::AddressRange,
    DeviceAddress, DeviceSize, ValidationError,
};
use ash::vk;

macro_rules! vuid {
    ($vuid_type:ident, $id:literal) => {
        match $vuid_type {
            VuidType::TraceRays => concat!("VUID-vkCmdTraceRaysKHR-", $id),
            VuidType::TraceRaysIndirect => concat!("VUID-vkCmdTraceRaysIndirectKHR-", $id),
        }
    };
}

/// The size in bytes of a `VkTraceRaysIndirectCommandKHR`.
const TRACE_RAYS_INDIRECT_COMMAND_SIZE: DeviceSize = 12;

/// An object that holds the strided addresses of the shader groups in a shader binding table.
#[derive(Clone, Copy, Debug, Default)]
pub struct ShaderBindingTableAddresses {
    /// The address of the ray generation shader group handles.
    pub raygen: vk::StridedDeviceAddressRegionKHR,
    /// The address of the miss shader group handles.
    pub miss: vk::StridedDeviceAddressRegionKHR,
    /// The address of the hit shader group handles.
    pub hit: vk::StridedDeviceAddressRegionKHR,
    /// The address of the callable shader group handles.
    pub callable: vk::StridedDeviceAddressRegionKHR,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum VuidType {
    TraceRays,
    TraceRaysIndirect,
}

impl VuidType {
    fn command_name(self) -> &'static str {
        match self {
            VuidType::TraceRays => "vkCmdTraceRaysKHR()",
            VuidType::TraceRaysIndirect => "vkCmdTraceRaysIndirectKHR()",
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum TableKind {
    Raygen,
    Miss,
    Hit,
    Callable,
}

impl TableKind {
    fn parameter_name(self) -> &'static str {
        match self {
            TableKind::Raygen => "pRaygenShaderBindingTable",
            TableKind::Miss => "pMissShaderBindingTable",
            TableKind::Hit => "pHitShaderBindingTable",
            TableKind::Callable => "pCallableShaderBindingTable",
        }
    }

    fn field_name(self) -> &'static str {
        match self {
            TableKind::Raygen => "raygen",
            TableKind::Miss => "miss",
            TableKind::Hit => "hit",
            TableKind::Callable => "callable",
        }
    }
}

struct RegionVuids {
    memory_bound: &'static str,
    usage: &'static str,
    base_alignment: &'static str,
    // Not set for the ray generation table, whose stride must equal its size.
    stride_alignment: Option<&'static str>,
    max_stride: Option<&'static str>,
}

fn region_vuids(vuid_type: VuidType, kind: TableKind) -> RegionVuids {
    match kind {
        TableKind::Raygen => RegionVuids {
            memory_bound: vuid!(vuid_type, "pRayGenShaderBindingTable-03680"),
            usage: vuid!(vuid_type, "pRayGenShaderBindingTable-03681"),
            base_alignment: vuid!(vuid_type, "pRayGenShaderBindingTable-03682"),
            stride_alignment: None,
            max_stride: None,
        },
        TableKind::Miss => RegionVuids {
            memory_bound: vuid!(vuid_type, "pMissShaderBindingTable-03683"),
            usage: vuid!(vuid_type, "pMissShaderBindingTable-03684"),
            base_alignment: vuid!(vuid_type, "pMissShaderBindingTable-03685"),
            stride_alignment: Some(vuid!(vuid_type, "stride-03686")),
            max_stride: Some(vuid!(vuid_type, "stride-04029")),
        },
        TableKind::Hit => RegionVuids {
            memory_bound: vuid!(vuid_type, "pHitShaderBindingTable-03687"),
            usage: vuid!(vuid_type, "pHitShaderBindingTable-03688"),
            base_alignment: vuid!(vuid_type, "pHitShaderBindingTable-03689"),
            stride_alignment: Some(vuid!(vuid_type, "stride-03690")),
            max_stride: Some(vuid!(vuid_type, "stride-04035")),
        },
        TableKind::Callable => RegionVuids {
            memory_bound: vuid!(vuid_type, "pCallableShaderBindingTable-03691"),
            usage: vuid!(vuid_type, "pCallableShaderBindingTable-03692"),
            base_alignment: vuid!(vuid_type, "pCallableShaderBindingTable-03693"),
            stride_alignment: Some(vuid!(vuid_type, "stride-03694")),
            max_stride: Some(vuid!(vuid_type, "stride-04041")),
        },
    }
}

impl DeviceValidator {
    /// Validates a call to `vkCmdTraceRaysKHR`.
    pub fn validate_cmd_trace_rays(
        &self,
        command_buffer: vk::CommandBuffer,
        shader_binding_table_addresses: &ShaderBindingTableAddresses,
        dimensions: [u32; 3],
    ) -> bool {
        let vuid_type = VuidType::TraceRays;
        let mut objects = ObjectList::new();
        objects.add(command_buffer);

        let mut skip = self.validate_shader_binding_tables(
            vuid_type,
            &objects,
            shader_binding_table_addresses,
        );

        // Three `u32`s always fit.
        let invocation_count = dimensions
            .iter()
            .map(|&dimension| dimension as u128)
            .product::<u128>();
        let max_ray_dispatch_invocation_count =
            self.properties().max_ray_dispatch_invocation_count as u128;

        if invocation_count > max_ray_dispatch_invocation_count {
            skip |= self.report().log_validation_error(
                &objects,
                vuid_type.command_name(),
                &ValidationError {
                    context: "dimensions".into(),
                    problem: format!(
                        "the product of all dimensions ({}) is greater than the \
                        `max_ray_dispatch_invocation_count` device property ({})",
                        invocation_count, max_ray_dispatch_invocation_count,
                    )
                    .into(),
                    vuids: &["VUID-vkCmdTraceRaysKHR-width-03641"],
                    ..Default::default()
                },
            );
        }

        skip
    }

    /// Validates a call to `vkCmdTraceRaysIndirectKHR`. The dimensions are read from a
    /// `VkTraceRaysIndirectCommandKHR` at `indirect_device_address` when the command executes.
    pub fn validate_cmd_trace_rays_indirect(
        &self,
        command_buffer: vk::CommandBuffer,
        shader_binding_table_addresses: &ShaderBindingTableAddresses,
        indirect_device_address: DeviceAddress,
    ) -> bool {
        let vuid_type = VuidType::TraceRaysIndirect;
        let location = vuid_type.command_name();
        let mut objects = ObjectList::new();
        objects.add(command_buffer);

        let mut skip = false;

        if !self
            .enabled_features()
            .ray_tracing_pipeline_trace_rays_indirect
        {
            skip |= self.report().log_validation_error(
                &objects,
                location,
                &ValidationError {
                    problem: "the `ray_tracing_pipeline_trace_rays_indirect` feature is not \
                        enabled on the device"
                        .into(),
                    vuids: &[
                        "VUID-vkCmdTraceRaysIndirectKHR-rayTracingPipelineTraceRaysIndirect-03637",
                    ],
                    ..Default::default()
                },
            );
        }

        skip |= self.validate_shader_binding_tables(
            vuid_type,
            &objects,
            shader_binding_table_addresses,
        );

        if indirect_device_address % 4 != 0 {
            skip |= self.report().log_validation_error(
                &objects,
                location,
                &ValidationError {
                    context: "indirect_device_address".into(),
                    problem: "is not a multiple of 4".into(),
                    vuids: &["VUID-vkCmdTraceRaysIndirectKHR-indirectDeviceAddress-03634"],
                    ..Default::default()
                },
            );
        }

        let validator = BufferAddressValidator::new()
            .with_rule(BufferRule::new(
                "VUID-vkCmdTraceRaysIndirectKHR-indirectDeviceAddress-03632",
                BufferCheck::MemoryBound,
                || "The buffer must be bound to memory.".to_owned(),
            ))
            .with_rule(BufferRule::new(
                "VUID-vkCmdTraceRaysIndirectKHR-indirectDeviceAddress-03633",
                BufferCheck::Usage(BufferUsage::INDIRECT_BUFFER),
                || {
                    "The buffer must have been created with the \
                    `BufferUsage::INDIRECT_BUFFER` usage."
                        .to_owned()
                },
            ))
            .with_rule(BufferRule::new(
                "VUID-vkCmdTraceRaysIndirectKHR-indirectDeviceAddress-03636",
                BufferCheck::Contains(AddressRange::with_size(
                    indirect_device_address,
                    TRACE_RAYS_INDIRECT_COMMAND_SIZE,
                )),
                || {
                    format!(
                        "The buffer must contain the {} bytes of a \
                        `VkTraceRaysIndirectCommandKHR`.",
                        TRACE_RAYS_INDIRECT_COMMAND_SIZE,
                    )
                },
            ));
        let context = DiagnosticContext {
            report: self.report(),
            objects: &objects,
            location: "vkCmdTraceRaysIndirectKHR(): indirectDeviceAddress",
            address: Some(indirect_device_address),
        };
        skip |= validator.log_errors_if_no_valid_buffer(
            &self.buffer_candidates(indirect_device_address),
            &context,
        );

        skip
    }

    fn validate_shader_binding_tables(
        &self,
        vuid_type: VuidType,
        objects: &ObjectList,
        shader_binding_table_addresses: &ShaderBindingTableAddresses,
    ) -> bool {
        let &ShaderBindingTableAddresses {
            raygen,
            miss,
            hit,
            callable,
        } = shader_binding_table_addresses;

        let mut skip = false;

        if raygen.size != raygen.stride {
            skip |= self.report().log_validation_error(
                objects,
                vuid_type.command_name(),
                &ValidationError {
                    context: "shader_binding_table_addresses.raygen".into(),
                    problem: "`size` is not equal to `stride`".into(),
                    vuids: match vuid_type {
                        VuidType::TraceRays => &["VUID-vkCmdTraceRaysKHR-size-04023"],
                        VuidType::TraceRaysIndirect => {
                            &["VUID-vkCmdTraceRaysIndirectKHR-size-04023"]
                        }
                    },
                    ..Default::default()
                },
            );
        }

        for (kind, region) in [
            (TableKind::Raygen, raygen),
            (TableKind::Miss, miss),
            (TableKind::Hit, hit),
            (TableKind::Callable, callable),
        ] {
            // Unused tables are given as zeroed regions.
            if kind != TableKind::Raygen && region.device_address == 0 {
                continue;
            }

            skip |= self.validate_shader_binding_table(vuid_type, objects, kind, &region);
        }

        skip
    }

    fn validate_shader_binding_table(
        &self,
        vuid_type: VuidType,
        objects: &ObjectList,
        kind: TableKind,
        region: &vk::StridedDeviceAddressRegionKHR,
    ) -> bool {
        let properties = self.properties();
        let vuids = region_vuids(vuid_type, kind);
        let command_name = vuid_type.command_name();
        let mut skip = false;

        let mut log_stateless = |vuid: &'static str, problem: String| {
            skip |= self.report().log_error(
                vuid,
                objects,
                command_name,
                &format!(
                    "shader_binding_table_addresses.{} {}",
                    kind.field_name(),
                    problem,
                ),
            );
        };

        let shader_group_base_alignment = properties.shader_group_base_alignment as DeviceSize;

        if !is_aligned(region.device_address, shader_group_base_alignment) {
            log_stateless(
                vuids.base_alignment,
                format!(
                    "has a device address ({:#x}) that is not a multiple of the \
                    `shader_group_base_alignment` device property ({})",
                    region.device_address, shader_group_base_alignment,
                ),
            );
        }

        if let Some(vuid) = vuids.stride_alignment {
            let shader_group_handle_alignment =
                properties.shader_group_handle_alignment as DeviceSize;

            if !is_aligned(region.stride, shader_group_handle_alignment) {
                log_stateless(
                    vuid,
                    format!(
                        "has a stride ({}) that is not a multiple of the \
                        `shader_group_handle_alignment` device property ({})",
                        region.stride, shader_group_handle_alignment,
                    ),
                );
            }
        }

        if let Some(vuid) = vuids.max_stride {
            let max_shader_group_stride = properties.max_shader_group_stride as DeviceSize;

            if region.stride > max_shader_group_stride {
                log_stateless(
                    vuid,
                    format!(
                        "has a stride ({}) that is greater than the `max_shader_group_stride` \
                        device property ({})",
                        region.stride, max_shader_group_stride,
                    ),
                );
            }
        }

        let stride = region.stride;
        let validator = BufferAddressValidator::new()
            .with_rule(BufferRule::new(
                vuids.memory_bound,
                BufferCheck::MemoryBound,
                || "The buffer must be bound to memory.".to_owned(),
            ))
            .with_rule(BufferRule::new(
                vuids.usage,
                BufferCheck::Usage(BufferUsage::SHADER_BINDING_TABLE),
                || {
                    "The buffer must have been created with the \
                    `BufferUsage::SHADER_BINDING_TABLE` usage."
                        .to_owned()
                },
            ))
            .with_rule(BufferRule::new(
                "VUID-VkStridedDeviceAddressRegionKHR-size-04631",
                BufferCheck::Contains(AddressRange::with_size(region.device_address, region.size)),
                || "The buffer must contain the whole region.".to_owned(),
            ))
            .with_rule(BufferRule::from_fn(
                "VUID-VkStridedDeviceAddressRegionKHR-size-04632",
                move |buffer, reason| {
                    let fits = stride <= buffer.size();

                    if let (false, Some(reason)) = (fits, reason) {
                        *reason = format!(
                            "has a size of {:#x}, which is less than the stride ({:#x})",
                            buffer.size(),
                            stride,
                        );
                    }

                    fits
                },
                || "The stride must not be greater than the size of the buffer.".to_owned(),
            ));

        let location = format!("{}: {}->deviceAddress", command_name, kind.parameter_name());
        let context = DiagnosticContext {
            report: self.report(),
            objects,
            location: &location,
            address: Some(region.device_address),
        };
        skip |= validator.log_errors_if_no_valid_buffer(
            &self.buffer_candidates(region.device_address),
            &context,
        );

        skip
    }
}
