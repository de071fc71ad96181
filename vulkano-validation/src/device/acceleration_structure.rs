// Copyright (c) 2021 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

use super::DeviceValidator;
use crate::{
    acceleration_structure::{
        AccelerationStructure, AccelerationStructureBuildGeometryInfo,
        AccelerationStructureCreateInfo, BuildAccelerationStructureMode,
    },
    buffer::{
        address::{BufferAddressValidator, BufferCheck, BufferRule, DiagnosticContext},
        BufferUsage,
    },
    object::ObjectList,
    ValidationError,
};
use ash::vk;
use std::sync::Arc;

/// The acceleration structures written and read by one build.
pub(crate) struct BuildTargets {
    pub dst: Arc<AccelerationStructure>,
    pub src: Option<Arc<AccelerationStructure>>,
}

impl DeviceValidator {
    /// Validates a call to `vkCreateAccelerationStructureKHR`.
    ///
    /// The buffer that is going to hold the acceleration structure is known by handle, so any
    /// problem with it is an error.
    pub fn validate_create_acceleration_structure(
        &self,
        create_info: &AccelerationStructureCreateInfo,
    ) -> bool {
        let location = "vkCreateAccelerationStructureKHR(): pCreateInfo";
        let &AccelerationStructureCreateInfo {
            buffer,
            offset,
            size,
            ty: _,
            _ne: _,
        } = create_info;

        let mut objects = ObjectList::new();
        objects.add(buffer);

        let buffer = match self.tracker.buffer(buffer) {
            Some(buffer) => buffer,
            None => {
                return self.report.log_validation_error(
                    &objects,
                    location,
                    &ValidationError {
                        context: "create_info.buffer".into(),
                        problem: "is not a live buffer".into(),
                        vuids: &["VUID-VkAccelerationStructureCreateInfoKHR-buffer-parameter"],
                        ..Default::default()
                    },
                );
            }
        };

        let mut skip = false;

        if offset % 256 != 0 {
            skip |= self.report.log_validation_error(
                &objects,
                location,
                &ValidationError {
                    context: "create_info.offset".into(),
                    problem: "is not a multiple of 256".into(),
                    vuids: &["VUID-VkAccelerationStructureCreateInfoKHR-offset-03734"],
                    ..Default::default()
                },
            );
        }

        let validator = BufferAddressValidator::new()
            .with_rule(BufferRule::new(
                "VUID-VkAccelerationStructureCreateInfoKHR-buffer-03614",
                BufferCheck::Usage(BufferUsage::ACCELERATION_STRUCTURE_STORAGE),
                || {
                    "The buffer must have been created with the \
                    `BufferUsage::ACCELERATION_STRUCTURE_STORAGE` usage."
                        .to_owned()
                },
            ))
            .with_rule(BufferRule::new(
                "VUID-VkAccelerationStructureCreateInfoKHR-buffer-03615",
                BufferCheck::NotSparseResidency,
                || {
                    "The buffer must not have been created with \
                    `BufferCreateFlags::SPARSE_RESIDENCY`."
                        .to_owned()
                },
            ))
            .with_rule(BufferRule::from_fn(
                "VUID-VkAccelerationStructureCreateInfoKHR-offset-03616",
                move |buffer, reason| {
                    let fits = offset
                        .checked_add(size)
                        .is_some_and(|end| end <= buffer.size());

                    if let (false, Some(reason)) = (fits, reason) {
                        *reason = format!(
                            "has a size of {:#x}, which is less than the sum of \
                            `create_info.offset` ({:#x}) and `create_info.size` ({:#x})",
                            buffer.size(),
                            offset,
                            size,
                        );
                    }

                    fits
                },
                || {
                    "The sum of `create_info.offset` and `create_info.size` must not be greater \
                    than the size of the buffer."
                        .to_owned()
                },
            ));

        let context = DiagnosticContext {
            report: &self.report,
            objects: &ObjectList::new(),
            location,
            address: None,
        };
        skip |= validator.log_errors_if_invalid_buffer_found(&[Some(buffer)], &context);

        skip
    }

    /// Validates a call to `vkBuildAccelerationStructuresKHR`, which builds acceleration
    /// structures on the host.
    ///
    /// The geometry of a host build is given by host address, so only the acceleration structures
    /// themselves are checked.
    pub fn validate_build_acceleration_structures(
        &self,
        infos: &[AccelerationStructureBuildGeometryInfo],
    ) -> bool {
        let location = "vkBuildAccelerationStructuresKHR()";
        let mut skip = false;

        if !self.enabled_features.acceleration_structure_host_commands {
            skip |= self.report.log_validation_error(
                &ObjectList::new(),
                location,
                &ValidationError {
                    problem: "the `acceleration_structure_host_commands` feature is not \
                        enabled on the device"
                        .into(),
                    vuids: &[
                        "VUID-vkBuildAccelerationStructuresKHR-accelerationStructureHostCommands-03581",
                    ],
                    ..Default::default()
                },
            );
        }

        for (info_index, info) in infos.iter().enumerate() {
            let info_location = format!("{}: pInfos[{}]", location, info_index);

            let targets =
                self.build_targets(info, &["VUID-vkBuildAccelerationStructuresKHR-pInfos-04630"]);

            match targets {
                Ok(BuildTargets { dst, src }) => {
                    skip |= self.validate_host_accessible(
                        &dst,
                        "VUID-vkBuildAccelerationStructuresKHR-pInfos-03722",
                        &format!("{}.dstAccelerationStructure", info_location),
                    );

                    if let Some(src) = src {
                        skip |= self.validate_host_accessible(
                            &src,
                            "VUID-vkBuildAccelerationStructuresKHR-pInfos-03723",
                            &format!("{}.srcAccelerationStructure", info_location),
                        );
                    }
                }
                Err(err) => {
                    skip |= self.report.log_validation_error(
                        &ObjectList::new(),
                        &info_location,
                        &err.add_context(format!("infos[{}]", info_index)),
                    );
                }
            }
        }

        skip
    }

    /// Looks up the destination and, for updates, the source acceleration structure of a build.
    pub(crate) fn build_targets(
        &self,
        info: &AccelerationStructureBuildGeometryInfo,
        null_src_vuids: &'static [&'static str],
    ) -> Result<BuildTargets, Box<ValidationError>> {
        let dst = info.dst_acceleration_structure.ok_or_else(|| {
            Box::new(ValidationError {
                context: "dst_acceleration_structure".into(),
                problem: "is `None`".into(),
                ..Default::default()
            })
        })?;
        let dst = self.live_acceleration_structure(dst, "dst_acceleration_structure")?;

        let src = match info.mode {
            BuildAccelerationStructureMode::Build => None,
            BuildAccelerationStructureMode::Update(src) => {
                if src == vk::AccelerationStructureKHR::null() {
                    return Err(Box::new(ValidationError {
                        context: "mode".into(),
                        problem: "is `BuildAccelerationStructureMode::Update`, but the source \
                            acceleration structure is a null handle"
                            .into(),
                        vuids: null_src_vuids,
                        ..Default::default()
                    }));
                }

                Some(self.live_acceleration_structure(src, "mode")?)
            }
        };

        Ok(BuildTargets { dst, src })
    }

    pub(crate) fn live_acceleration_structure(
        &self,
        handle: vk::AccelerationStructureKHR,
        context: &'static str,
    ) -> Result<Arc<AccelerationStructure>, Box<ValidationError>> {
        self.tracker
            .acceleration_structure(handle)
            .ok_or_else(|| {
                Box::new(ValidationError {
                    context: context.into(),
                    problem: "is not a live acceleration structure".into(),
                    ..Default::default()
                })
            })
    }

    fn validate_host_accessible(
        &self,
        acceleration_structure: &AccelerationStructure,
        vuid: &'static str,
        location: &str,
    ) -> bool {
        let mut objects = ObjectList::new();
        objects.add(acceleration_structure.handle());

        let validator = BufferAddressValidator::new().with_rule(BufferRule::new(
            vuid,
            BufferCheck::HostVisible,
            || {
                "The acceleration structure must be stored in a buffer bound to host-visible \
                memory."
                    .to_owned()
            },
        ));
        let context = DiagnosticContext {
            report: &self.report,
            objects: &objects,
            location,
            address: None,
        };

        validator.log_errors_if_invalid_buffer_found(
            &[Some(acceleration_structure.buffer().clone())],
            &context,
        )
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        acceleration_structure::{
            AccelerationStructureBuildGeometryInfo, AccelerationStructureCreateInfo,
            AccelerationStructureGeometries, AccelerationStructureType,
            BuildAccelerationStructureMode,
        },
        buffer::{BufferCreateFlags, BufferCreateInfo, BufferUsage},
        object::ObjectHandle,
        tests::{bound_buffer, host_visible_memory, memory},
    };
    use ash::vk::{self, Handle};

    fn create_info(buffer: vk::Buffer) -> AccelerationStructureCreateInfo {
        AccelerationStructureCreateInfo {
            buffer,
            offset: 0,
            size: 0x400,
            ty: AccelerationStructureType::BottomLevel,
            ..Default::default()
        }
    }

    #[test]
    fn create_valid() {
        let (validator, table, captured) = device_validator!();
        let memory = memory(&table, 0x1000);
        let buffer = bound_buffer(
            &table,
            &memory,
            0,
            0x800,
            BufferUsage::ACCELERATION_STRUCTURE_STORAGE,
        );

        assert!(!validator.validate_create_acceleration_structure(&create_info(buffer.handle())));
        assert!(captured.take().is_empty());
    }

    #[test]
    fn create_unknown_buffer() {
        let (validator, _table, captured) = device_validator!();

        assert!(validator
            .validate_create_acceleration_structure(&create_info(vk::Buffer::from_raw(0x99))));
        assert_eq!(
            captured.take_vuids(),
            ["VUID-VkAccelerationStructureCreateInfoKHR-buffer-parameter"],
        );
    }

    #[test]
    fn create_reports_every_violation() {
        let (validator, table, captured) = device_validator!();
        let memory = memory(&table, 0x1000);
        let buffer = bound_buffer(&table, &memory, 0, 0x400, BufferUsage::STORAGE_BUFFER);

        assert!(validator.validate_create_acceleration_structure(
            &AccelerationStructureCreateInfo {
                offset: 0x80,
                ..create_info(buffer.handle())
            },
        ));

        let messages = captured.take();
        let vuids: Vec<_> = messages.iter().map(|msg| msg.vuid.as_str()).collect();
        assert_eq!(
            vuids,
            [
                "VUID-VkAccelerationStructureCreateInfoKHR-offset-03734",
                "VUID-VkAccelerationStructureCreateInfoKHR-buffer-03614",
                "VUID-VkAccelerationStructureCreateInfoKHR-offset-03616",
            ],
        );
        assert_eq!(messages[1].objects, [ObjectHandle::new(buffer.handle())]);
        assert!(messages[2].description.contains("has a size of 0x400"));
    }

    #[test]
    fn create_in_sparse_residency_buffer() {
        let (validator, table, captured) = device_validator!();
        let buffer = table
            .create_buffer(&BufferCreateInfo {
                flags: BufferCreateFlags::SPARSE_BINDING | BufferCreateFlags::SPARSE_RESIDENCY,
                size: 0x1000,
                usage: BufferUsage::ACCELERATION_STRUCTURE_STORAGE,
                ..Default::default()
            })
            .unwrap();

        assert!(validator.validate_create_acceleration_structure(&create_info(buffer.handle())));
        assert_eq!(
            captured.take_vuids(),
            ["VUID-VkAccelerationStructureCreateInfoKHR-buffer-03615"],
        );
    }

    #[test]
    fn host_build_needs_feature() {
        let (validator, table, captured) = device_validator!();
        let memory = host_visible_memory(&table, 0x1000);
        let buffer = bound_buffer(
            &table,
            &memory,
            0,
            0x1000,
            BufferUsage::ACCELERATION_STRUCTURE_STORAGE,
        );
        let dst = table
            .create_acceleration_structure(&create_info(buffer.handle()), None)
            .unwrap();

        let info = AccelerationStructureBuildGeometryInfo {
            dst_acceleration_structure: Some(dst.handle()),
            ..AccelerationStructureBuildGeometryInfo::new(
                AccelerationStructureGeometries::Triangles(Vec::new()),
            )
        };

        assert!(validator.validate_build_acceleration_structures(&[info]));
        assert_eq!(
            captured.take_vuids(),
            ["VUID-vkBuildAccelerationStructuresKHR-accelerationStructureHostCommands-03581"],
        );
    }

    #[test]
    fn host_build_in_device_local_memory() {
        let (validator, table, captured) =
            device_validator!(acceleration_structure_host_commands);
        let host_memory = host_visible_memory(&table, 0x1000);
        let device_memory = memory(&table, 0x1000);
        let src_buffer = bound_buffer(
            &table,
            &host_memory,
            0,
            0x1000,
            BufferUsage::ACCELERATION_STRUCTURE_STORAGE,
        );
        let dst_buffer = bound_buffer(
            &table,
            &device_memory,
            0,
            0x1000,
            BufferUsage::ACCELERATION_STRUCTURE_STORAGE,
        );
        let src = table
            .create_acceleration_structure(&create_info(src_buffer.handle()), None)
            .unwrap();
        let dst = table
            .create_acceleration_structure(&create_info(dst_buffer.handle()), None)
            .unwrap();

        let info = AccelerationStructureBuildGeometryInfo {
            mode: BuildAccelerationStructureMode::Update(src.handle()),
            dst_acceleration_structure: Some(dst.handle()),
            ..AccelerationStructureBuildGeometryInfo::new(
                AccelerationStructureGeometries::Triangles(Vec::new()),
            )
        };

        assert!(validator.validate_build_acceleration_structures(&[info]));

        let messages = captured.take();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].vuid, "VUID-vkBuildAccelerationStructuresKHR-pInfos-03722");
        assert_eq!(
            messages[0].objects,
            [
                ObjectHandle::new(dst.handle()),
                ObjectHandle::new(dst_buffer.handle()),
            ],
        );
        assert!(messages[0].description.contains("which are not HOST_VISIBLE"));
    }

    #[test]
    fn host_update_from_device_local_memory() {
        let (validator, table, captured) =
            device_validator!(acceleration_structure_host_commands);
        let host_memory = host_visible_memory(&table, 0x1000);
        let device_memory = memory(&table, 0x1000);
        let src_buffer = bound_buffer(
            &table,
            &device_memory,
            0,
            0x1000,
            BufferUsage::ACCELERATION_STRUCTURE_STORAGE,
        );
        let dst_buffer = bound_buffer(
            &table,
            &host_memory,
            0,
            0x1000,
            BufferUsage::ACCELERATION_STRUCTURE_STORAGE,
        );
        let src = table
            .create_acceleration_structure(&create_info(src_buffer.handle()), None)
            .unwrap();
        let dst = table
            .create_acceleration_structure(&create_info(dst_buffer.handle()), None)
            .unwrap();

        let info = AccelerationStructureBuildGeometryInfo {
            mode: BuildAccelerationStructureMode::Update(src.handle()),
            dst_acceleration_structure: Some(dst.handle()),
            ..AccelerationStructureBuildGeometryInfo::new(
                AccelerationStructureGeometries::Triangles(Vec::new()),
            )
        };

        assert!(validator.validate_build_acceleration_structures(&[info]));

        let messages = captured.take();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].vuid, "VUID-vkBuildAccelerationStructuresKHR-pInfos-03723");
        assert_eq!(
            messages[0].objects,
            [
                ObjectHandle::new(src.handle()),
                ObjectHandle::new(src_buffer.handle()),
            ],
        );
        assert_eq!(
            messages[0].location,
            "vkBuildAccelerationStructuresKHR(): pInfos[0].srcAccelerationStructure",
        );
    }

    #[test]
    fn host_build_unknown_dst() {
        let (validator, _table, captured) =
            device_validator!(acceleration_structure_host_commands);
        let info = AccelerationStructureBuildGeometryInfo {
            dst_acceleration_structure: Some(vk::AccelerationStructureKHR::from_raw(0x77)),
            ..AccelerationStructureBuildGeometryInfo::new(
                AccelerationStructureGeometries::Aabbs(Vec::new()),
            )
        };

        assert!(validator.validate_build_acceleration_structures(&[info]));

        let messages = captured.take();
        assert_eq!(messages.len(), 1);
        assert_eq!(
            messages[0].description,
            "infos[0].dst_acceleration_structure is not a live acceleration structure",
        );
    }
}
