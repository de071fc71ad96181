// Copyright (c) 2021 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

use crate::{
    acceleration_structure::{
        vertex_format_component_size, AccelerationStructure,
        AccelerationStructureBuildGeometryInfo, AccelerationStructureBuildRangeInfo,
        AccelerationStructureGeometries, AccelerationStructureGeometryAabbsData,
        AccelerationStructureGeometryInstancesData, AccelerationStructureGeometryTrianglesData,
        AccelerationStructureType, BuildAccelerationStructureMode, CopyAccelerationStructureMode,
        CopyAccelerationStructureToMemoryInfo, CopyMemoryToAccelerationStructureInfo,
    },
    buffer::{
        address::{BufferAddressValidator, BufferCheck, BufferRule, DiagnosticContext},
        BufferUsage,
    },
    device::{BuildTargets, DeviceValidator},
    memory::{is_aligned, MemoryRegion},
    object::ObjectList,
    range::AddressRange,
    DeviceAddress, DeviceSize, ValidationError,
};
use ash::vk;
use smallvec::SmallVec;

impl DeviceValidator {
    /// Validates a call to `vkCmdBuildAccelerationStructuresKHR`.
    ///
    /// `build_range_infos[i]` holds the build ranges of the geometries of `infos[i]`.
    pub fn validate_cmd_build_acceleration_structures(
        &self,
        command_buffer: vk::CommandBuffer,
        infos: &[AccelerationStructureBuildGeometryInfo],
        build_range_infos: &[&[AccelerationStructureBuildRangeInfo]],
    ) -> bool {
        let location = "vkCmdBuildAccelerationStructuresKHR()";
        let mut objects = ObjectList::new();
        objects.add(command_buffer);

        if infos.len() != build_range_infos.len() {
            return self.report().log_validation_error(
                &objects,
                location,
                &ValidationError {
                    problem: "`infos` and `build_range_infos` do not have the same length".into(),
                    ..Default::default()
                },
            );
        }

        let mut skip = false;
        let mut accesses: SmallVec<[BuildAccesses; 4]> = SmallVec::new();

        for (info_index, (info, build_range_infos)) in
            infos.iter().zip(build_range_infos).enumerate()
        {
            let info_location = format!("{}: pInfos[{}]", location, info_index);

            let (targets, scratch_data) =
                match self.validate_build_geometry_info(info, build_range_infos) {
                    Ok(x) => x,
                    Err(err) => {
                        skip |= self.report().log_validation_error(
                            &objects,
                            &info_location,
                            &err.add_context(format!("infos[{}]", info_index)),
                        );
                        continue;
                    }
                };

            let mut info_objects = objects.clone();
            info_objects.add(targets.dst.handle());

            let (scratch_range, scratch_skip) = self.validate_build_scratch_data(
                &info_objects,
                &info_location,
                info.mode,
                &targets,
                scratch_data,
            );
            skip |= scratch_skip;

            for input in geometry_inputs(&info.geometries, &info_location) {
                skip |= self.validate_build_input(&info_objects, &input);
            }

            accesses.push(BuildAccesses {
                info_index,
                dst: targets.dst.handle(),
                dst_region: targets.dst.memory_region(),
                scratch_range,
            });
        }

        for (index, current) in accesses.iter().enumerate() {
            for earlier in &accesses[..index] {
                let mut pair_objects = objects.clone();
                pair_objects.add(earlier.dst);
                pair_objects.add(current.dst);

                if current.scratch_range.intersects(earlier.scratch_range) {
                    skip |= self.report().log_error(
                        "VUID-vkCmdBuildAccelerationStructuresKHR-scratchData-03704",
                        &pair_objects,
                        location,
                        &format!(
                            "The scratch memory of `infos[{}]` ({}) overlaps the scratch memory \
                            of `infos[{}]` ({}).",
                            current.info_index,
                            current.scratch_range,
                            earlier.info_index,
                            earlier.scratch_range,
                        ),
                    );
                }

                if let (Some(current_region), Some(earlier_region)) =
                    (current.dst_region, earlier.dst_region)
                {
                    if let Some(overlap) = current_region.overlap(&earlier_region) {
                        skip |= self.report().log_error(
                            "VUID-vkCmdBuildAccelerationStructuresKHR-dstAccelerationStructure-03702",
                            &pair_objects,
                            location,
                            &format!(
                                "The memory of `infos[{}].dst_acceleration_structure` overlaps \
                                the memory of `infos[{}].dst_acceleration_structure` on {}.",
                                current.info_index,
                                earlier.info_index,
                                MemoryRegion {
                                    memory: current_region.memory,
                                    range: overlap,
                                },
                            ),
                        );
                    }
                }
            }
        }

        skip
    }

    // Checks that only look at the parameters and the acceleration structures. Returns the
    // acceleration structures of the build and its scratch address.
    fn validate_build_geometry_info(
        &self,
        info: &AccelerationStructureBuildGeometryInfo,
        build_range_infos: &[AccelerationStructureBuildRangeInfo],
    ) -> Result<(BuildTargets, DeviceAddress), Box<ValidationError>> {
        let &AccelerationStructureBuildGeometryInfo {
            ty,
            mode: _,
            dst_acceleration_structure: _,
            ref geometries,
            scratch_data,
            _ne: _,
        } = info;

        let properties = self.properties();

        match (ty, geometries) {
            (AccelerationStructureType::Generic, _) => {
                return Err(Box::new(ValidationError {
                    context: "ty".into(),
                    problem: "is `AccelerationStructureType::Generic`".into(),
                    vuids: &["VUID-VkAccelerationStructureBuildGeometryInfoKHR-type-03654"],
                    ..Default::default()
                }));
            }
            (
                AccelerationStructureType::TopLevel,
                AccelerationStructureGeometries::Instances(_),
            ) => (),
            (AccelerationStructureType::TopLevel, _) => {
                return Err(Box::new(ValidationError {
                    problem: "`ty` is `AccelerationStructureType::TopLevel`, but `geometries` is \
                        not `AccelerationStructureGeometries::Instances`"
                        .into(),
                    vuids: &["VUID-VkAccelerationStructureBuildGeometryInfoKHR-type-03789"],
                    ..Default::default()
                }));
            }
            (
                AccelerationStructureType::BottomLevel,
                AccelerationStructureGeometries::Instances(_),
            ) => {
                return Err(Box::new(ValidationError {
                    problem: "`ty` is `AccelerationStructureType::BottomLevel`, but `geometries` \
                        is `AccelerationStructureGeometries::Instances`"
                        .into(),
                    vuids: &["VUID-VkAccelerationStructureBuildGeometryInfoKHR-type-03791"],
                    ..Default::default()
                }));
            }
            (AccelerationStructureType::BottomLevel, _) => (),
        }

        let targets =
            self.build_targets(info, &["VUID-vkCmdBuildAccelerationStructuresKHR-pInfos-04630"])?;

        match (ty, targets.dst.ty()) {
            (AccelerationStructureType::TopLevel, AccelerationStructureType::BottomLevel) => {
                return Err(Box::new(ValidationError {
                    problem: "`ty` is `AccelerationStructureType::TopLevel`, but \
                        `dst_acceleration_structure` was created as a bottom-level \
                        acceleration structure"
                        .into(),
                    vuids: &["VUID-vkCmdBuildAccelerationStructuresKHR-pInfos-03699"],
                    ..Default::default()
                }));
            }
            (AccelerationStructureType::BottomLevel, AccelerationStructureType::TopLevel) => {
                return Err(Box::new(ValidationError {
                    problem: "`ty` is `AccelerationStructureType::BottomLevel`, but \
                        `dst_acceleration_structure` was created as a top-level \
                        acceleration structure"
                        .into(),
                    vuids: &["VUID-vkCmdBuildAccelerationStructuresKHR-pInfos-03700"],
                    ..Default::default()
                }));
            }
            _ => (),
        }

        let scratch_data = scratch_data.ok_or_else(|| {
            Box::new(ValidationError {
                context: "scratch_data".into(),
                problem: "is `None`".into(),
                ..Default::default()
            })
        })?;

        if !is_aligned(
            scratch_data,
            properties.min_acceleration_structure_scratch_offset_alignment as DeviceSize,
        ) {
            return Err(Box::new(ValidationError {
                context: "scratch_data".into(),
                problem: "is not a multiple of the \
                    `min_acceleration_structure_scratch_offset_alignment` device property"
                    .into(),
                vuids: &["VUID-vkCmdBuildAccelerationStructuresKHR-pInfos-03710"],
                ..Default::default()
            }));
        }

        if geometries.len() != build_range_infos.len() {
            return Err(Box::new(ValidationError {
                problem: "`geometries` and `build_range_infos` do not have the same length".into(),
                vuids: &["VUID-vkCmdBuildAccelerationStructuresKHR-ppBuildRangeInfos-03676"],
                ..Default::default()
            }));
        }

        if ty == AccelerationStructureType::BottomLevel
            && geometries.len() as DeviceSize > properties.max_geometry_count
        {
            return Err(Box::new(ValidationError {
                context: "geometries".into(),
                problem: "has more elements than the `max_geometry_count` limit".into(),
                vuids: &["VUID-VkAccelerationStructureBuildGeometryInfoKHR-type-03793"],
                ..Default::default()
            }));
        }

        let total_primitive_count: DeviceSize = build_range_infos
            .iter()
            .map(|build_range_info| build_range_info.primitive_count as DeviceSize)
            .sum();

        match geometries {
            AccelerationStructureGeometries::Triangles(geometries) => {
                if total_primitive_count > properties.max_primitive_count {
                    return Err(Box::new(ValidationError {
                        context: "build_range_infos".into(),
                        problem: "the sum of `primitive_count` of all elements exceeds the \
                            `max_primitive_count` limit"
                            .into(),
                        vuids: &["VUID-VkAccelerationStructureBuildGeometryInfoKHR-type-03795"],
                        ..Default::default()
                    }));
                }

                for (geometry_index, (triangles_data, build_range_info)) in
                    geometries.iter().zip(build_range_infos).enumerate()
                {
                    validate_triangles(geometry_index, triangles_data, build_range_info)?;
                }
            }
            AccelerationStructureGeometries::Aabbs(geometries) => {
                if total_primitive_count > properties.max_primitive_count {
                    return Err(Box::new(ValidationError {
                        context: "build_range_infos".into(),
                        problem: "the sum of `primitive_count` of all elements exceeds the \
                            `max_primitive_count` limit"
                            .into(),
                        vuids: &["VUID-VkAccelerationStructureBuildGeometryInfoKHR-type-03794"],
                        ..Default::default()
                    }));
                }

                for (geometry_index, (aabbs_data, build_range_info)) in
                    geometries.iter().zip(build_range_infos).enumerate()
                {
                    validate_aabbs(geometry_index, aabbs_data, build_range_info)?;
                }
            }
            AccelerationStructureGeometries::Instances(instances_data) => {
                if total_primitive_count > properties.max_instance_count {
                    return Err(Box::new(ValidationError {
                        context: "build_range_infos[0].primitive_count".into(),
                        problem: "exceeds the `max_instance_count` limit".into(),
                        vuids: &["VUID-vkCmdBuildAccelerationStructuresKHR-pInfos-03801"],
                        ..Default::default()
                    }));
                }

                if let Some(build_range_info) = build_range_infos.first() {
                    validate_instances(instances_data, build_range_info)?;
                }
            }
        }

        Ok((targets, scratch_data))
    }

    // Returns the range of scratch memory used by the build, and whether the command should be
    // skipped.
    fn validate_build_scratch_data(
        &self,
        objects: &ObjectList,
        info_location: &str,
        mode: BuildAccelerationStructureMode,
        targets: &BuildTargets,
        scratch_data: DeviceAddress,
    ) -> (AddressRange, bool) {
        let scratch_size = targets.dst.build_sizes().map(|build_sizes| match mode {
            BuildAccelerationStructureMode::Build => build_sizes.build_scratch_size,
            BuildAccelerationStructureMode::Update(_) => build_sizes.update_scratch_size,
        });
        // Without the sizes, only the first byte is known to be used.
        let scratch_range = AddressRange::with_size(scratch_data, scratch_size.unwrap_or(1));

        let mut validator = BufferAddressValidator::new().with_rule(BufferRule::new(
            "VUID-vkCmdBuildAccelerationStructuresKHR-pInfos-03674",
            BufferCheck::Usage(BufferUsage::STORAGE_BUFFER),
            || {
                "The buffer must have been created with the `BufferUsage::STORAGE_BUFFER` usage."
                    .to_owned()
            },
        ));

        if let Some(scratch_size) = scratch_size {
            let vuid = match mode {
                BuildAccelerationStructureMode::Build => {
                    "VUID-vkCmdBuildAccelerationStructuresKHR-pInfos-03671"
                }
                BuildAccelerationStructureMode::Update(_) => {
                    "VUID-vkCmdBuildAccelerationStructuresKHR-pInfos-03672"
                }
            };

            validator.push(BufferRule::new(
                vuid,
                BufferCheck::Contains(scratch_range),
                move || {
                    format!(
                        "The buffer must contain the {:#x} bytes of scratch memory returned by \
                        `vkGetAccelerationStructureBuildSizesKHR` for this build.",
                        scratch_size,
                    )
                },
            ));
        }

        if let Some(region) = targets.dst.memory_region() {
            validator.push(overlap_rule(
                "VUID-vkCmdBuildAccelerationStructuresKHR-dstAccelerationStructure-03703",
                scratch_range,
                region,
                "dst_acceleration_structure",
            ));
        }

        if let Some(region) = targets.src.as_ref().and_then(|src| src.memory_region()) {
            validator.push(overlap_rule(
                "VUID-vkCmdBuildAccelerationStructuresKHR-scratchData-03705",
                scratch_range,
                region,
                "the source acceleration structure",
            ));
        }

        let location = format!("{}.scratchData.deviceAddress", info_location);
        let context = DiagnosticContext {
            report: self.report(),
            objects,
            location: &location,
            address: Some(scratch_data),
        };
        let skip = validator
            .log_errors_if_no_valid_buffer(&self.buffer_candidates(scratch_data), &context);

        (scratch_range, skip)
    }

    fn validate_build_input(&self, objects: &ObjectList, input: &GeometryInput) -> bool {
        let validator = BufferAddressValidator::new()
            .with_rule(BufferRule::new(
                "VUID-vkCmdBuildAccelerationStructuresKHR-geometry-03673",
                BufferCheck::Usage(BufferUsage::ACCELERATION_STRUCTURE_BUILD_INPUT_READ_ONLY),
                || {
                    "The buffer must have been created with the \
                    `BufferUsage::ACCELERATION_STRUCTURE_BUILD_INPUT_READ_ONLY` usage."
                        .to_owned()
                },
            ))
            .with_rule(BufferRule::new(
                input.memory_bound_vuid,
                BufferCheck::MemoryBound,
                || "The buffer must be bound to memory.".to_owned(),
            ));
        let context = DiagnosticContext {
            report: self.report(),
            objects,
            location: &input.location,
            address: Some(input.address),
        };

        validator.log_errors_if_no_valid_buffer(&self.buffer_candidates(input.address), &context)
    }

    /// Validates a call to `vkCmdCopyAccelerationStructureToMemoryKHR`.
    pub fn validate_cmd_copy_acceleration_structure_to_memory(
        &self,
        command_buffer: vk::CommandBuffer,
        info: &CopyAccelerationStructureToMemoryInfo,
    ) -> bool {
        let location = "vkCmdCopyAccelerationStructureToMemoryKHR(): pInfo";
        let &CopyAccelerationStructureToMemoryInfo {
            src,
            dst,
            mode,
            _ne: _,
        } = info;

        let mut objects = ObjectList::new();
        objects.add(command_buffer);
        objects.add(src);

        let mut skip = false;

        if mode != CopyAccelerationStructureMode::Serialize {
            skip |= self.report().log_validation_error(
                &objects,
                location,
                &ValidationError {
                    context: "info.mode".into(),
                    problem: "is not `CopyAccelerationStructureMode::Serialize`".into(),
                    vuids: &["VUID-VkCopyAccelerationStructureToMemoryInfoKHR-mode-03412"],
                    ..Default::default()
                },
            );
        }

        if dst % 256 != 0 {
            skip |= self.report().log_validation_error(
                &objects,
                location,
                &ValidationError {
                    context: "info.dst".into(),
                    problem: "is not a multiple of 256".into(),
                    vuids: &["VUID-vkCmdCopyAccelerationStructureToMemoryKHR-pInfo-03740"],
                    ..Default::default()
                },
            );
        }

        match self.live_acceleration_structure(src, "src") {
            Ok(src) => {
                skip |= self.validate_acceleration_structure_bound(
                    &objects,
                    &src,
                    "VUID-vkCmdCopyAccelerationStructureToMemoryKHR-buffer-03736",
                    &format!("{}->src", location),
                );
            }
            Err(err) => {
                skip |= self.report().log_validation_error(
                    &objects,
                    location,
                    &err.add_context("info"),
                );
            }
        }

        skip |= self.validate_copy_memory(
            &objects,
            dst,
            "VUID-vkCmdCopyAccelerationStructureToMemoryKHR-pInfo-03739",
            &format!("{}->dst.deviceAddress", location),
        );

        skip
    }

    /// Validates a call to `vkCmdCopyMemoryToAccelerationStructureKHR`.
    pub fn validate_cmd_copy_memory_to_acceleration_structure(
        &self,
        command_buffer: vk::CommandBuffer,
        info: &CopyMemoryToAccelerationStructureInfo,
    ) -> bool {
        let location = "vkCmdCopyMemoryToAccelerationStructureKHR(): pInfo";
        let &CopyMemoryToAccelerationStructureInfo {
            src,
            dst,
            mode,
            _ne: _,
        } = info;

        let mut objects = ObjectList::new();
        objects.add(command_buffer);
        objects.add(dst);

        let mut skip = false;

        if mode != CopyAccelerationStructureMode::Deserialize {
            skip |= self.report().log_validation_error(
                &objects,
                location,
                &ValidationError {
                    context: "info.mode".into(),
                    problem: "is not `CopyAccelerationStructureMode::Deserialize`".into(),
                    vuids: &["VUID-VkCopyMemoryToAccelerationStructureInfoKHR-mode-03413"],
                    ..Default::default()
                },
            );
        }

        if src % 256 != 0 {
            skip |= self.report().log_validation_error(
                &objects,
                location,
                &ValidationError {
                    context: "info.src".into(),
                    problem: "is not a multiple of 256".into(),
                    vuids: &["VUID-vkCmdCopyMemoryToAccelerationStructureKHR-pInfo-03743"],
                    ..Default::default()
                },
            );
        }

        match self.live_acceleration_structure(dst, "dst") {
            Ok(dst) => {
                skip |= self.validate_acceleration_structure_bound(
                    &objects,
                    &dst,
                    "VUID-vkCmdCopyMemoryToAccelerationStructureKHR-buffer-03745",
                    &format!("{}->dst", location),
                );
            }
            Err(err) => {
                skip |= self.report().log_validation_error(
                    &objects,
                    location,
                    &err.add_context("info"),
                );
            }
        }

        skip |= self.validate_copy_memory(
            &objects,
            src,
            "VUID-vkCmdCopyMemoryToAccelerationStructureKHR-pInfo-03742",
            &format!("{}->src.deviceAddress", location),
        );

        skip
    }

    fn validate_copy_memory(
        &self,
        objects: &ObjectList,
        address: DeviceAddress,
        vuid: &'static str,
        location: &str,
    ) -> bool {
        let validator = BufferAddressValidator::new().with_rule(BufferRule::new(
            vuid,
            BufferCheck::MemoryBound,
            || "The buffer must be bound to memory.".to_owned(),
        ));
        let context = DiagnosticContext {
            report: self.report(),
            objects,
            location,
            address: Some(address),
        };

        validator.log_errors_if_no_valid_buffer(&self.buffer_candidates(address), &context)
    }

    // The buffer of an acceleration structure is known by handle, so it is the only candidate.
    fn validate_acceleration_structure_bound(
        &self,
        objects: &ObjectList,
        acceleration_structure: &AccelerationStructure,
        vuid: &'static str,
        location: &str,
    ) -> bool {
        let validator = BufferAddressValidator::new().with_rule(BufferRule::new(
            vuid,
            BufferCheck::MemoryBound,
            || {
                "The buffer the acceleration structure is stored in must be bound to memory."
                    .to_owned()
            },
        ));
        let context = DiagnosticContext {
            report: self.report(),
            objects,
            location,
            address: None,
        };

        validator.log_errors_if_invalid_buffer_found(
            &[Some(acceleration_structure.buffer().clone())],
            &context,
        )
    }
}

struct BuildAccesses {
    info_index: usize,
    dst: vk::AccelerationStructureKHR,
    dst_region: Option<MemoryRegion>,
    scratch_range: AddressRange,
}

/// A device address read by a build, with where it came from.
struct GeometryInput {
    location: String,
    address: DeviceAddress,
    memory_bound_vuid: &'static str,
}

fn geometry_inputs(
    geometries: &AccelerationStructureGeometries,
    info_location: &str,
) -> SmallVec<[GeometryInput; 4]> {
    let mut inputs = SmallVec::new();
    let mut push = |location: String, address: Option<DeviceAddress>, vuid: &'static str| {
        if let Some(address) = address {
            inputs.push(GeometryInput {
                location,
                address,
                memory_bound_vuid: vuid,
            });
        }
    };

    match geometries {
        AccelerationStructureGeometries::Triangles(geometries) => {
            for (geometry_index, triangles_data) in geometries.iter().enumerate() {
                let prefix = format!(
                    "{}.pGeometries[{}].geometry.triangles",
                    info_location, geometry_index,
                );
                push(
                    format!("{}.vertexData.deviceAddress", prefix),
                    triangles_data.vertex_data,
                    "VUID-vkCmdBuildAccelerationStructuresKHR-pInfos-03805",
                );
                push(
                    format!("{}.indexData.deviceAddress", prefix),
                    triangles_data.index_data.map(|index_data| index_data.address),
                    "VUID-vkCmdBuildAccelerationStructuresKHR-pInfos-03807",
                );
                push(
                    format!("{}.transformData.deviceAddress", prefix),
                    triangles_data.transform_data,
                    "VUID-vkCmdBuildAccelerationStructuresKHR-pInfos-03809",
                );
            }
        }
        AccelerationStructureGeometries::Aabbs(geometries) => {
            for (geometry_index, aabbs_data) in geometries.iter().enumerate() {
                push(
                    format!(
                        "{}.pGeometries[{}].geometry.aabbs.data.deviceAddress",
                        info_location, geometry_index,
                    ),
                    aabbs_data.data,
                    "VUID-vkCmdBuildAccelerationStructuresKHR-pInfos-03812",
                );
            }
        }
        AccelerationStructureGeometries::Instances(instances_data) => {
            push(
                format!(
                    "{}.pGeometries[0].geometry.instances.data.deviceAddress",
                    info_location,
                ),
                instances_data.data,
                "VUID-vkCmdBuildAccelerationStructuresKHR-pInfos-03814",
            );
        }
    }

    inputs
}

fn overlap_rule(
    vuid: &'static str,
    scratch_range: AddressRange,
    region: MemoryRegion,
    what: &'static str,
) -> BufferRule<'static> {
    BufferRule::new(
        vuid,
        BufferCheck::NoMemoryOverlap {
            range: scratch_range,
            region,
        },
        move || format!("The scratch memory must not overlap the memory of {}.", what),
    )
}

fn validate_triangles(
    geometry_index: usize,
    triangles_data: &AccelerationStructureGeometryTrianglesData,
    build_range_info: &AccelerationStructureBuildRangeInfo,
) -> Result<(), Box<ValidationError>> {
    let &AccelerationStructureGeometryTrianglesData {
        vertex_format,
        vertex_data,
        vertex_stride,
        max_vertex: _,
        index_data,
        transform_data,
        _ne: _,
    } = triangles_data;
    let &AccelerationStructureBuildRangeInfo {
        primitive_count: _,
        primitive_offset,
        first_vertex: _,
        transform_offset,
    } = build_range_info;

    let vertex_data = vertex_data.ok_or_else(|| {
        Box::new(ValidationError {
            context: format!("geometries[{}].vertex_data", geometry_index).into(),
            problem: "is `None`".into(),
            ..Default::default()
        })
    })?;

    let smallest_component_bytes = vertex_format_component_size(vertex_format).ok_or_else(|| {
        Box::new(ValidationError {
            context: format!("geometries[{}].vertex_format", geometry_index).into(),
            problem: "is not a format that can be used for acceleration structure vertices"
                .into(),
            vuids: &["VUID-VkAccelerationStructureGeometryTrianglesDataKHR-vertexFormat-03797"],
            ..Default::default()
        })
    })?;

    if vertex_data % smallest_component_bytes != 0 {
        return Err(Box::new(ValidationError {
            context: format!("geometries[{}].vertex_data", geometry_index).into(),
            problem: "is not a multiple of the byte size of the smallest component of \
                `vertex_format`"
                .into(),
            vuids: &["VUID-vkCmdBuildAccelerationStructuresKHR-pInfos-03711"],
            ..Default::default()
        }));
    }

    if vertex_stride as DeviceSize % smallest_component_bytes != 0 {
        return Err(Box::new(ValidationError {
            context: format!("geometries[{}].vertex_stride", geometry_index).into(),
            problem: "is not a multiple of the byte size of the smallest component of \
                `vertex_format`"
                .into(),
            vuids: &["VUID-VkAccelerationStructureGeometryTrianglesDataKHR-vertexStride-03735"],
            ..Default::default()
        }));
    }

    if let Some(index_data) = index_data {
        let index_size = index_data.index_type.size();

        if index_data.address % index_size != 0 {
            return Err(Box::new(ValidationError {
                context: format!("geometries[{}].index_data", geometry_index).into(),
                problem: "the device address is not a multiple of the size of the index type"
                    .into(),
                vuids: &["VUID-vkCmdBuildAccelerationStructuresKHR-pInfos-03712"],
                ..Default::default()
            }));
        }

        if primitive_offset as DeviceSize % index_size != 0 {
            return Err(Box::new(ValidationError {
                context: format!("build_range_infos[{}].primitive_offset", geometry_index).into(),
                problem: format!(
                    "is not a multiple of the size of the index type of \
                    `geometries[{}].index_data`",
                    geometry_index,
                )
                .into(),
                vuids: &["VUID-VkAccelerationStructureBuildRangeInfoKHR-primitiveOffset-03656"],
                ..Default::default()
            }));
        }
    } else if primitive_offset as DeviceSize % smallest_component_bytes != 0 {
        return Err(Box::new(ValidationError {
            context: format!("build_range_infos[{}].primitive_offset", geometry_index).into(),
            problem: format!(
                "is not a multiple of the byte size of the smallest component of \
                `geometries[{}].vertex_format`",
                geometry_index,
            )
            .into(),
            vuids: &["VUID-VkAccelerationStructureBuildRangeInfoKHR-primitiveOffset-03657"],
            ..Default::default()
        }));
    }

    if let Some(transform_data) = transform_data {
        if transform_data % 16 != 0 {
            return Err(Box::new(ValidationError {
                context: format!("geometries[{}].transform_data", geometry_index).into(),
                problem: "is not a multiple of 16".into(),
                vuids: &["VUID-vkCmdBuildAccelerationStructuresKHR-pInfos-03810"],
                ..Default::default()
            }));
        }

        if transform_offset % 16 != 0 {
            return Err(Box::new(ValidationError {
                context: format!("build_range_infos[{}].transform_offset", geometry_index).into(),
                problem: "is not a multiple of 16".into(),
                vuids: &["VUID-VkAccelerationStructureBuildRangeInfoKHR-transformOffset-03658"],
                ..Default::default()
            }));
        }
    }

    Ok(())
}

fn validate_aabbs(
    geometry_index: usize,
    aabbs_data: &AccelerationStructureGeometryAabbsData,
    build_range_info: &AccelerationStructureBuildRangeInfo,
) -> Result<(), Box<ValidationError>> {
    let &AccelerationStructureGeometryAabbsData {
        data,
        stride,
        _ne: _,
    } = aabbs_data;

    let data = data.ok_or_else(|| {
        Box::new(ValidationError {
            context: format!("geometries[{}].data", geometry_index).into(),
            problem: "is `None`".into(),
            ..Default::default()
        })
    })?;

    if stride % 8 != 0 {
        return Err(Box::new(ValidationError {
            context: format!("geometries[{}].stride", geometry_index).into(),
            problem: "is not a multiple of 8".into(),
            vuids: &["VUID-VkAccelerationStructureGeometryAabbsDataKHR-stride-03545"],
            ..Default::default()
        }));
    }

    if data % 8 != 0 {
        return Err(Box::new(ValidationError {
            context: format!("geometries[{}].data", geometry_index).into(),
            problem: "is not a multiple of 8".into(),
            vuids: &["VUID-vkCmdBuildAccelerationStructuresKHR-pInfos-03714"],
            ..Default::default()
        }));
    }

    if build_range_info.primitive_offset % 8 != 0 {
        return Err(Box::new(ValidationError {
            context: format!("build_range_infos[{}].primitive_offset", geometry_index).into(),
            problem: "is not a multiple of 8".into(),
            vuids: &["VUID-VkAccelerationStructureBuildRangeInfoKHR-primitiveOffset-03659"],
            ..Default::default()
        }));
    }

    Ok(())
}

fn validate_instances(
    instances_data: &AccelerationStructureGeometryInstancesData,
    build_range_info: &AccelerationStructureBuildRangeInfo,
) -> Result<(), Box<ValidationError>> {
    let &AccelerationStructureGeometryInstancesData {
        data,
        array_of_pointers,
        _ne: _,
    } = instances_data;

    let data = data.ok_or_else(|| {
        Box::new(ValidationError {
            context: "geometries.data".into(),
            problem: "is `None`".into(),
            ..Default::default()
        })
    })?;

    if array_of_pointers {
        if data % 8 != 0 {
            return Err(Box::new(ValidationError {
                context: "geometries.data".into(),
                problem: "`geometries.array_of_pointers` is `true`, and `geometries.data` is \
                    not a multiple of 8"
                    .into(),
                vuids: &["VUID-vkCmdBuildAccelerationStructuresKHR-pInfos-03716"],
                ..Default::default()
            }));
        }
    } else if data % 16 != 0 {
        return Err(Box::new(ValidationError {
            context: "geometries.data".into(),
            problem: "is not a multiple of 16".into(),
            vuids: &["VUID-vkCmdBuildAccelerationStructuresKHR-pInfos-03715"],
            ..Default::default()
        }));
    }

    if build_range_info.primitive_offset % 16 != 0 {
        return Err(Box::new(ValidationError {
            context: "build_range_infos[0].primitive_offset".into(),
            problem: "is not a multiple of 16".into(),
            vuids: &["VUID-VkAccelerationStructureBuildRangeInfoKHR-primitiveOffset-03660"],
            ..Default::default()
        }));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::{
        acceleration_structure::{
            AccelerationStructure, AccelerationStructureBuildGeometryInfo,
            AccelerationStructureBuildRangeInfo, AccelerationStructureBuildSizesInfo,
            AccelerationStructureCreateInfo, AccelerationStructureGeometries,
            AccelerationStructureGeometryTrianglesData, AccelerationStructureType,
            BuildAccelerationStructureMode, CopyAccelerationStructureMode,
            CopyAccelerationStructureToMemoryInfo, CopyMemoryToAccelerationStructureInfo,
        },
        buffer::{Buffer, BufferCreateInfo, BufferUsage},
        device::{DeviceValidator, RayTracingProperties},
        memory::DeviceMemory,
        object::ObjectHandle,
        tests::{bound_buffer, device_validator_with_properties, memory, CapturedMessages},
        tracker::ObjectTable,
        DeviceSize,
    };
    use ash::vk::{self, Handle};
    use std::sync::Arc;

    const RANGES: &[AccelerationStructureBuildRangeInfo] = &[AccelerationStructureBuildRangeInfo {
        primitive_count: 1,
        primitive_offset: 0,
        first_vertex: 0,
        transform_offset: 0,
    }];

    // A bottom-level acceleration structure at offset 0 of the memory, scratch space at 0x1000
    // and vertices at 0x2000.
    struct Fixture {
        validator: DeviceValidator,
        table: Arc<ObjectTable>,
        captured: CapturedMessages,
        memory: Arc<DeviceMemory>,
        dst: Arc<AccelerationStructure>,
        scratch: Arc<Buffer>,
        vertices: Arc<Buffer>,
    }

    impl Fixture {
        fn new() -> Self {
            Self::with_properties(RayTracingProperties::default())
        }

        fn with_properties(properties: RayTracingProperties) -> Self {
            let (validator, table, captured) = device_validator_with_properties(properties);
            let memory = memory(&table, 0x10000);
            let dst = acceleration_structure(&table, &memory, 0);
            let scratch =
                bound_buffer(&table, &memory, 0x1000, 0x1000, BufferUsage::STORAGE_BUFFER);
            let vertices = bound_buffer(
                &table,
                &memory,
                0x2000,
                0x1000,
                BufferUsage::ACCELERATION_STRUCTURE_BUILD_INPUT_READ_ONLY,
            );

            Fixture {
                validator,
                table,
                captured,
                memory,
                dst,
                scratch,
                vertices,
            }
        }

        fn command_buffer(&self) -> vk::CommandBuffer {
            vk::CommandBuffer::from_raw(0xc0)
        }

        fn triangles_info(&self) -> AccelerationStructureBuildGeometryInfo {
            AccelerationStructureBuildGeometryInfo {
                dst_acceleration_structure: Some(self.dst.handle()),
                scratch_data: self.scratch.device_address(),
                ..AccelerationStructureBuildGeometryInfo::new(
                    AccelerationStructureGeometries::Triangles(vec![
                        AccelerationStructureGeometryTrianglesData {
                            vertex_data: self.vertices.device_address(),
                            vertex_stride: 12,
                            max_vertex: 2,
                            ..AccelerationStructureGeometryTrianglesData::new(
                                vk::Format::R32G32B32_SFLOAT,
                            )
                        },
                    ]),
                )
            }
        }

        fn build(&self, infos: &[AccelerationStructureBuildGeometryInfo]) -> bool {
            let build_range_infos = vec![RANGES; infos.len()];

            self.validator.validate_cmd_build_acceleration_structures(
                self.command_buffer(),
                infos,
                &build_range_infos,
            )
        }
    }

    fn acceleration_structure(
        table: &ObjectTable,
        memory: &Arc<DeviceMemory>,
        offset: DeviceSize,
    ) -> Arc<AccelerationStructure> {
        let buffer = bound_buffer(
            table,
            memory,
            offset,
            0x1000,
            BufferUsage::ACCELERATION_STRUCTURE_STORAGE,
        );

        table
            .create_acceleration_structure(
                &AccelerationStructureCreateInfo {
                    buffer: buffer.handle(),
                    size: 0x1000,
                    ty: AccelerationStructureType::BottomLevel,
                    ..Default::default()
                },
                Some(AccelerationStructureBuildSizesInfo {
                    acceleration_structure_size: 0x1000,
                    update_scratch_size: 0x100,
                    build_scratch_size: 0x200,
                }),
            )
            .unwrap()
    }

    #[test]
    fn valid_build() {
        let fx = Fixture::new();

        assert!(!fx.build(&[fx.triangles_info()]));
        assert!(fx.captured.take().is_empty());
    }

    #[test]
    fn aliased_scratch_with_one_storage_buffer() {
        let fx = Fixture::new();
        let _uniform = bound_buffer(
            &fx.table,
            &fx.memory,
            0x1000,
            0x1000,
            BufferUsage::UNIFORM_BUFFER,
        );

        assert!(!fx.build(&[fx.triangles_info()]));
        assert!(fx.captured.take().is_empty());
    }

    #[test]
    fn scratch_without_storage_usage() {
        let fx = Fixture::new();
        let uniform = bound_buffer(
            &fx.table,
            &fx.memory,
            0x3000,
            0x1000,
            BufferUsage::UNIFORM_BUFFER,
        );
        let info = AccelerationStructureBuildGeometryInfo {
            scratch_data: uniform.device_address(),
            ..fx.triangles_info()
        };

        assert!(fx.build(&[info]));

        let messages = fx.captured.take();
        assert_eq!(messages.len(), 1);
        assert_eq!(
            messages[0].vuid,
            "VUID-vkCmdBuildAccelerationStructuresKHR-pInfos-03674",
        );
        assert_eq!(
            messages[0].objects,
            [
                ObjectHandle::new(fx.command_buffer()),
                ObjectHandle::new(fx.dst.handle()),
                ObjectHandle::new(uniform.handle()),
            ],
        );
        assert_eq!(
            messages[0].location,
            "vkCmdBuildAccelerationStructuresKHR(): pInfos[0].scratchData.deviceAddress",
        );
    }

    #[test]
    fn scratch_too_small() {
        let fx = Fixture::new();
        let small = bound_buffer(&fx.table, &fx.memory, 0x3000, 0x100, BufferUsage::STORAGE_BUFFER);
        let info = AccelerationStructureBuildGeometryInfo {
            scratch_data: small.device_address(),
            ..fx.triangles_info()
        };

        assert!(fx.build(&[info]));

        let messages = fx.captured.take();
        assert_eq!(messages.len(), 1);
        assert_eq!(
            messages[0].vuid,
            "VUID-vkCmdBuildAccelerationStructuresKHR-pInfos-03671",
        );
        assert!(messages[0].description.contains("the 0x200 bytes of scratch memory"));
    }

    #[test]
    fn scratch_overlapping_dst() {
        // The scratch buffer aliases the buffer of the acceleration structure, which is found
        // at the same address.
        let fx = Fixture::new();
        let aliased = bound_buffer(&fx.table, &fx.memory, 0, 0x1000, BufferUsage::STORAGE_BUFFER);
        let info = AccelerationStructureBuildGeometryInfo {
            scratch_data: aliased.device_address(),
            ..fx.triangles_info()
        };

        assert!(fx.build(&[info]));
        assert_eq!(
            fx.captured.take_vuids(),
            [
                "VUID-vkCmdBuildAccelerationStructuresKHR-pInfos-03674",
                "VUID-vkCmdBuildAccelerationStructuresKHR-dstAccelerationStructure-03703",
            ],
        );
    }

    #[test]
    fn misaligned_scratch_stops_at_first_error() {
        let fx = Fixture::new();
        let info = AccelerationStructureBuildGeometryInfo {
            scratch_data: fx.scratch.device_address().map(|address| address + 0x80),
            ..fx.triangles_info()
        };

        assert!(fx.build(&[info]));

        let messages = fx.captured.take();
        assert_eq!(messages.len(), 1);
        assert_eq!(
            messages[0].vuid,
            "VUID-vkCmdBuildAccelerationStructuresKHR-pInfos-03710",
        );
        assert_eq!(messages[0].location, "vkCmdBuildAccelerationStructuresKHR(): pInfos[0]");
        assert!(messages[0].description.starts_with("infos[0].scratch_data is not a multiple"));
    }

    #[test]
    fn zero_scratch_alignment() {
        let fx = Fixture::with_properties(RayTracingProperties {
            min_acceleration_structure_scratch_offset_alignment: 0,
            ..Default::default()
        });
        let info = AccelerationStructureBuildGeometryInfo {
            scratch_data: fx.scratch.device_address().map(|address| address + 0x80),
            ..fx.triangles_info()
        };

        assert!(!fx.build(&[info]));
        assert!(fx.captured.take().is_empty());
    }

    #[test]
    fn update_scratch_too_small() {
        let fx = Fixture::new();
        let src = acceleration_structure(&fx.table, &fx.memory, 0x4000);
        let small = bound_buffer(&fx.table, &fx.memory, 0x3000, 0x80, BufferUsage::STORAGE_BUFFER);
        let info = AccelerationStructureBuildGeometryInfo {
            mode: BuildAccelerationStructureMode::Update(src.handle()),
            scratch_data: small.device_address(),
            ..fx.triangles_info()
        };

        assert!(fx.build(&[info]));

        let messages = fx.captured.take();
        assert_eq!(messages.len(), 1);
        assert_eq!(
            messages[0].vuid,
            "VUID-vkCmdBuildAccelerationStructuresKHR-pInfos-03672",
        );
        assert_eq!(
            messages[0].objects,
            [
                ObjectHandle::new(fx.command_buffer()),
                ObjectHandle::new(fx.dst.handle()),
                ObjectHandle::new(small.handle()),
            ],
        );
        assert!(messages[0].description.contains("the 0x100 bytes of scratch memory"));
    }

    #[test]
    fn update_scratch_overlapping_src() {
        // The scratch buffer aliases the buffer of the source acceleration structure.
        let fx = Fixture::new();
        let src = acceleration_structure(&fx.table, &fx.memory, 0x4000);
        let aliased = bound_buffer(
            &fx.table,
            &fx.memory,
            0x4000,
            0x1000,
            BufferUsage::STORAGE_BUFFER,
        );
        let info = AccelerationStructureBuildGeometryInfo {
            mode: BuildAccelerationStructureMode::Update(src.handle()),
            scratch_data: aliased.device_address(),
            ..fx.triangles_info()
        };

        assert!(fx.build(&[info]));

        let messages = fx.captured.take();
        let vuids: Vec<_> = messages.iter().map(|msg| msg.vuid.as_str()).collect();
        assert_eq!(
            vuids,
            [
                "VUID-vkCmdBuildAccelerationStructuresKHR-pInfos-03674",
                "VUID-vkCmdBuildAccelerationStructuresKHR-scratchData-03705",
            ],
        );
        assert_eq!(
            messages[1].objects[..2],
            [
                ObjectHandle::new(fx.command_buffer()),
                ObjectHandle::new(fx.dst.handle()),
            ],
        );
        assert!(messages[1]
            .objects
            .contains(&ObjectHandle::new(aliased.handle())));
        assert!(messages[1]
            .objects
            .contains(&ObjectHandle::new(src.buffer().handle())));
        assert!(messages[1]
            .description
            .contains("must not overlap the memory of the source acceleration structure"));
    }

    #[test]
    fn dst_offset_past_end_of_address_space() {
        let fx = Fixture::new();
        let buffer = bound_buffer(
            &fx.table,
            &fx.memory,
            0x4000,
            0x1000,
            BufferUsage::ACCELERATION_STRUCTURE_STORAGE,
        );
        let dst = fx
            .table
            .create_acceleration_structure(
                &AccelerationStructureCreateInfo {
                    buffer: buffer.handle(),
                    offset: u64::MAX - 0xff,
                    size: 0x1000,
                    ty: AccelerationStructureType::BottomLevel,
                    ..Default::default()
                },
                None,
            )
            .unwrap();
        let info = AccelerationStructureBuildGeometryInfo {
            dst_acceleration_structure: Some(dst.handle()),
            ..fx.triangles_info()
        };

        assert!(!fx.build(&[info]));
        assert!(fx.captured.take().is_empty());
    }

    #[test]
    fn instances_in_bottom_level_build() {
        let fx = Fixture::new();
        let info = AccelerationStructureBuildGeometryInfo {
            ty: AccelerationStructureType::BottomLevel,
            dst_acceleration_structure: Some(fx.dst.handle()),
            scratch_data: fx.scratch.device_address(),
            ..AccelerationStructureBuildGeometryInfo::new(
                AccelerationStructureGeometries::Instances(Default::default()),
            )
        };

        assert!(fx.build(&[info]));
        assert_eq!(
            fx.captured.take_vuids(),
            ["VUID-VkAccelerationStructureBuildGeometryInfoKHR-type-03791"],
        );
    }

    #[test]
    fn range_count_mismatch() {
        let fx = Fixture::new();

        assert!(fx.validator.validate_cmd_build_acceleration_structures(
            fx.command_buffer(),
            &[fx.triangles_info()],
            &[&[]],
        ));
        assert_eq!(
            fx.captured.take_vuids(),
            ["VUID-vkCmdBuildAccelerationStructuresKHR-ppBuildRangeInfos-03676"],
        );
    }

    #[test]
    fn vertices_without_build_input_usage() {
        let fx = Fixture::new();
        let vertices = bound_buffer(
            &fx.table,
            &fx.memory,
            0x3000,
            0x1000,
            BufferUsage::VERTEX_BUFFER,
        );
        let mut info = fx.triangles_info();

        if let AccelerationStructureGeometries::Triangles(geometries) = &mut info.geometries {
            geometries[0].vertex_data = vertices.device_address();
        }

        assert!(fx.build(&[info]));

        let messages = fx.captured.take();
        assert_eq!(messages.len(), 1);
        assert_eq!(
            messages[0].vuid,
            "VUID-vkCmdBuildAccelerationStructuresKHR-geometry-03673",
        );
        assert_eq!(
            messages[0].location,
            "vkCmdBuildAccelerationStructuresKHR(): \
            pInfos[0].pGeometries[0].geometry.triangles.vertexData.deviceAddress",
        );
    }

    #[test]
    fn vertices_at_unknown_address() {
        let fx = Fixture::new();
        let mut info = fx.triangles_info();

        if let AccelerationStructureGeometries::Triangles(geometries) = &mut info.geometries {
            geometries[0].vertex_data = Some(0xdead_0000);
        }

        assert!(fx.build(&[info]));

        let messages = fx.captured.take();
        let vuids: Vec<_> = messages.iter().map(|msg| msg.vuid.as_str()).collect();
        assert_eq!(
            vuids,
            [
                "VUID-vkCmdBuildAccelerationStructuresKHR-geometry-03673",
                "VUID-vkCmdBuildAccelerationStructuresKHR-pInfos-03805",
            ],
        );

        for message in &messages {
            assert!(message
                .description
                .contains("No live buffer contains this device address."));
            assert!(message.description.contains("0xdead0000"));
        }
    }

    #[test]
    fn infos_sharing_scratch() {
        let fx = Fixture::new();
        let other = acceleration_structure(&fx.table, &fx.memory, 0x4000);
        let info = AccelerationStructureBuildGeometryInfo {
            dst_acceleration_structure: Some(other.handle()),
            ..fx.triangles_info()
        };

        assert!(fx.build(&[fx.triangles_info(), info]));

        let messages = fx.captured.take();
        assert_eq!(messages.len(), 1);
        assert_eq!(
            messages[0].vuid,
            "VUID-vkCmdBuildAccelerationStructuresKHR-scratchData-03704",
        );
        assert!(messages[0]
            .description
            .starts_with("The scratch memory of `infos[1]`"));
    }

    #[test]
    fn infos_sharing_dst() {
        let fx = Fixture::new();
        let scratch = bound_buffer(
            &fx.table,
            &fx.memory,
            0x5000,
            0x1000,
            BufferUsage::STORAGE_BUFFER,
        );
        let info = AccelerationStructureBuildGeometryInfo {
            scratch_data: scratch.device_address(),
            ..fx.triangles_info()
        };

        assert!(fx.build(&[fx.triangles_info(), info]));
        assert_eq!(
            fx.captured.take_vuids(),
            ["VUID-vkCmdBuildAccelerationStructuresKHR-dstAccelerationStructure-03702"],
        );
    }

    #[test]
    fn copy_to_memory() {
        let fx = Fixture::new();
        let dst = fx.scratch.device_address().unwrap();
        let info = CopyAccelerationStructureToMemoryInfo::new(fx.dst.handle(), dst);

        assert!(!fx
            .validator
            .validate_cmd_copy_acceleration_structure_to_memory(fx.command_buffer(), &info));
        assert!(fx.captured.take().is_empty());

        let info = CopyAccelerationStructureToMemoryInfo {
            mode: CopyAccelerationStructureMode::Clone,
            ..CopyAccelerationStructureToMemoryInfo::new(fx.dst.handle(), dst + 0x10)
        };

        assert!(fx
            .validator
            .validate_cmd_copy_acceleration_structure_to_memory(fx.command_buffer(), &info));
        assert_eq!(
            fx.captured.take_vuids(),
            [
                "VUID-VkCopyAccelerationStructureToMemoryInfoKHR-mode-03412",
                "VUID-vkCmdCopyAccelerationStructureToMemoryKHR-pInfo-03740",
            ],
        );
    }

    #[test]
    fn copy_from_unbound_acceleration_structure() {
        let fx = Fixture::new();
        let unbound = fx
            .table
            .create_buffer(&BufferCreateInfo {
                size: 0x1000,
                usage: BufferUsage::ACCELERATION_STRUCTURE_STORAGE
                    | BufferUsage::SHADER_DEVICE_ADDRESS,
                ..Default::default()
            })
            .unwrap();
        let src = fx
            .table
            .create_acceleration_structure(
                &AccelerationStructureCreateInfo {
                    buffer: unbound.handle(),
                    size: 0x1000,
                    ty: AccelerationStructureType::BottomLevel,
                    ..Default::default()
                },
                None,
            )
            .unwrap();
        let dst = fx.scratch.device_address().unwrap();
        let info = CopyAccelerationStructureToMemoryInfo::new(src.handle(), dst);

        assert!(fx
            .validator
            .validate_cmd_copy_acceleration_structure_to_memory(fx.command_buffer(), &info));

        let messages = fx.captured.take();
        assert_eq!(messages.len(), 1);
        assert_eq!(
            messages[0].vuid,
            "VUID-vkCmdCopyAccelerationStructureToMemoryKHR-buffer-03736",
        );
        assert_eq!(
            messages[0].objects,
            [
                ObjectHandle::new(fx.command_buffer()),
                ObjectHandle::new(src.handle()),
                ObjectHandle::new(unbound.handle()),
            ],
        );
    }

    #[test]
    fn copy_to_freed_memory() {
        let fx = Fixture::new();
        let other_memory = memory(&fx.table, 0x1000);
        let target = bound_buffer(&fx.table, &other_memory, 0, 0x1000, BufferUsage::STORAGE_BUFFER);
        let dst = target.device_address().unwrap();
        fx.table.free_memory(other_memory.handle()).unwrap();

        let info = CopyAccelerationStructureToMemoryInfo::new(fx.dst.handle(), dst);

        assert!(fx
            .validator
            .validate_cmd_copy_acceleration_structure_to_memory(fx.command_buffer(), &info));

        let messages = fx.captured.take();
        assert_eq!(messages.len(), 1);
        assert_eq!(
            messages[0].vuid,
            "VUID-vkCmdCopyAccelerationStructureToMemoryKHR-pInfo-03739",
        );
        assert_eq!(
            messages[0].objects,
            [
                ObjectHandle::new(fx.command_buffer()),
                ObjectHandle::new(fx.dst.handle()),
                ObjectHandle::new(target.handle()),
            ],
        );
        assert_eq!(
            messages[0].location,
            "vkCmdCopyAccelerationStructureToMemoryKHR(): pInfo->dst.deviceAddress",
        );
    }

    #[test]
    fn copy_from_freed_memory() {
        let fx = Fixture::new();
        let src = fx.scratch.device_address().unwrap();
        fx.table.free_memory(fx.memory.handle()).unwrap();

        let info = CopyMemoryToAccelerationStructureInfo::new(src, fx.dst.handle());

        assert!(fx
            .validator
            .validate_cmd_copy_memory_to_acceleration_structure(fx.command_buffer(), &info));

        let messages = fx.captured.take();
        let vuids: Vec<_> = messages.iter().map(|msg| msg.vuid.as_str()).collect();
        assert_eq!(
            vuids,
            [
                "VUID-vkCmdCopyMemoryToAccelerationStructureKHR-buffer-03745",
                "VUID-vkCmdCopyMemoryToAccelerationStructureKHR-pInfo-03742",
            ],
        );
        assert!(messages[1].description.contains("that has been freed"));
    }
}
