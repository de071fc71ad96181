// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! Validation of device addresses against the buffers that may contain them.
//!
//! A device address doesn't identify a buffer: several live buffers can be bound to overlapping
//! memory, in which case all of them contain the address. The usage of an address is valid if at
//! least one of those candidate buffers satisfies every requirement of the command.
//!
//! Requirements are expressed as [`BufferRule`]s, each pairing a [`BufferPredicate`] with the VUID
//! to report and a lazily built header describing the requirement. A
//! [`BufferAddressValidator`] evaluates a set of rules in two phases:
//!
//! 1. [`has_valid_buffer`] / [`has_invalid_buffer`] only ask the predicates for a yes or no
//!    answer, and stop as soon as the answer is known. No strings are built.
//! 2. Only if phase 1 found a problem, [`log_invalid_buffers`] evaluates every rule against every
//!    candidate again, this time asking for reasons, and emits one diagnostic per violated rule
//!    that lists every offending buffer.
//!
//! ```
//! # use std::sync::Arc;
//! # use vulkano_validation::{buffer::Buffer, report::DebugReport, object::ObjectList};
//! use vulkano_validation::buffer::{
//!     address::{BufferAddressValidator, BufferCheck, BufferRule, DiagnosticContext},
//!     BufferUsage,
//! };
//!
//! # fn example(candidates: &[Option<Arc<Buffer>>], report: &DebugReport) -> bool {
//! let validator = BufferAddressValidator::new().with_rule(BufferRule::new(
//!     "VUID-vkCmdBuildAccelerationStructuresKHR-pInfos-03674",
//!     BufferCheck::Usage(BufferUsage::STORAGE_BUFFER),
//!     || "The buffer must have been created with STORAGE_BUFFER usage.".to_owned(),
//! ));
//!
//! validator.log_errors_if_no_valid_buffer(
//!     candidates,
//!     &DiagnosticContext {
//!         report,
//!         objects: &ObjectList::new(),
//!         location: "vkCmdBuildAccelerationStructuresKHR(): pInfos[0].scratchData",
//!         address: Some(0x10000),
//!     },
//! )
//! # }
//! ```
//!
//! [`has_valid_buffer`]: BufferAddressValidator::has_valid_buffer
//! [`has_invalid_buffer`]: BufferAddressValidator::has_invalid_buffer
//! [`log_invalid_buffers`]: BufferAddressValidator::log_invalid_buffers

use super::{Buffer, BufferCreateFlags, BufferUsage};
use crate::{
    memory::{MemoryPropertyFlags, MemoryRegion},
    object::{ObjectHandle, ObjectList},
    range::AddressRange,
    report::DebugReport,
    DeviceAddress,
};
use smallvec::SmallVec;
use std::{fmt, fmt::Write as _, sync::Arc};

const LOG_TARGET: &str = "vulkano_validation";

/// A requirement on a single buffer.
///
/// Predicates must be deterministic and free of side effects: they are evaluated any number of
/// times, against any number of buffers.
///
/// When `reason` is `Some`, a failing predicate should write a description of what is wrong with
/// this particular buffer into it. When it is `None`, the predicate must not build any string.
/// A failure without a reason is not reported.
///
/// The trait is implemented for closures with the same signature as [`check`](Self::check).
pub trait BufferPredicate {
    fn check(&self, buffer: &Buffer, reason: Option<&mut String>) -> bool;
}

impl<F> BufferPredicate for F
where
    F: Fn(&Buffer, Option<&mut String>) -> bool,
{
    #[inline]
    fn check(&self, buffer: &Buffer, reason: Option<&mut String>) -> bool {
        self(buffer, reason)
    }
}

/// The common requirements on buffers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BufferCheck {
    /// The buffer must not have been destroyed.
    Alive,

    /// The buffer must be alive and bound to memory that hasn't been freed. Sparse buffers always
    /// pass as long as they are alive.
    MemoryBound,

    /// The buffer must have been created with all of the given usages.
    Usage(BufferUsage),

    /// The device address range of the buffer must include the given range.
    Contains(AddressRange),

    /// The buffer must not have been created with [`BufferCreateFlags::SPARSE_RESIDENCY`].
    NotSparseResidency,

    /// The memory backing the part of the buffer at `range` must not overlap `region`.
    NoMemoryOverlap {
        range: AddressRange,
        region: MemoryRegion,
    },

    /// The buffer must be bound to memory with the `HOST_VISIBLE` property, that hasn't been
    /// freed.
    HostVisible,
}

impl BufferPredicate for BufferCheck {
    fn check(&self, buffer: &Buffer, reason: Option<&mut String>) -> bool {
        match self.failure(buffer) {
            None => true,
            Some(failure) => {
                if let Some(reason) = reason {
                    let _ = write!(reason, "{}", failure);
                }

                false
            }
        }
    }
}

impl BufferCheck {
    // Returns a lazily formatted description of the failure, or `None` if the buffer passes.
    fn failure(&self, buffer: &Buffer) -> Option<Failure> {
        if !buffer.is_alive() {
            return Some(Failure::Destroyed);
        }

        match *self {
            BufferCheck::Alive => None,
            BufferCheck::MemoryBound => {
                if buffer.is_sparse() {
                    return None;
                }

                match buffer.bound_memory() {
                    None => Some(Failure::NotBound),
                    Some(binding) if !binding.memory.is_alive() => {
                        Some(Failure::MemoryFreed(ObjectHandle::new(binding.memory.handle())))
                    }
                    Some(_) => None,
                }
            }
            BufferCheck::Usage(usage) => {
                let missing = usage - buffer.usage();

                (!missing.is_empty()).then_some(Failure::MissingUsage {
                    usage: buffer.usage(),
                    missing,
                })
            }
            BufferCheck::Contains(range) => match buffer.device_address_range() {
                None => Some(Failure::NoDeviceAddress),
                Some(buffer_range) if !buffer_range.includes(range) => {
                    Some(Failure::OutOfRange {
                        buffer_range,
                        range,
                    })
                }
                Some(_) => None,
            },
            BufferCheck::NotSparseResidency => buffer
                .flags()
                .intersects(BufferCreateFlags::SPARSE_RESIDENCY)
                .then_some(Failure::SparseResidency),
            BufferCheck::NoMemoryOverlap { range, ref region } => {
                let own = buffer.memory_region(range)?;
                let overlap = own.overlap(region)?;

                Some(Failure::MemoryOverlap {
                    own,
                    other: *region,
                    overlap,
                })
            }
            BufferCheck::HostVisible => {
                let binding = match buffer.bound_memory() {
                    Some(binding) => binding,
                    None => return Some(Failure::NotBound),
                };
                let property_flags = binding.memory.property_flags();

                if !binding.memory.is_alive() {
                    Some(Failure::MemoryFreed(ObjectHandle::new(binding.memory.handle())))
                } else if !property_flags.intersects(MemoryPropertyFlags::HOST_VISIBLE) {
                    Some(Failure::NotHostVisible(property_flags))
                } else {
                    None
                }
            }
        }
    }
}

enum Failure {
    Destroyed,
    NotBound,
    MemoryFreed(ObjectHandle),
    MissingUsage {
        usage: BufferUsage,
        missing: BufferUsage,
    },
    NoDeviceAddress,
    OutOfRange {
        buffer_range: AddressRange,
        range: AddressRange,
    },
    SparseResidency,
    MemoryOverlap {
        own: MemoryRegion,
        other: MemoryRegion,
        overlap: AddressRange,
    },
    NotHostVisible(MemoryPropertyFlags),
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Failure::Destroyed => write!(f, "has been destroyed"),
            Failure::NotBound => write!(f, "is not bound to memory"),
            Failure::MemoryFreed(memory) => {
                write!(f, "is bound to memory ({}) that has been freed", memory)
            }
            Failure::MissingUsage { usage, missing } => write!(
                f,
                "was created with usage {:?}, which is missing {:?}",
                usage, missing,
            ),
            Failure::NoDeviceAddress => write!(f, "has no device address"),
            Failure::OutOfRange {
                buffer_range,
                range,
            } => write!(
                f,
                "has device address range {}, which does not include {} (size {:#x})",
                buffer_range,
                range,
                range.len(),
            ),
            Failure::SparseResidency => write!(f, "was created with SPARSE_RESIDENCY"),
            Failure::MemoryOverlap {
                own,
                other,
                overlap,
            } => write!(
                f,
                "is backed by {}, which overlaps {} on {}",
                own, other, overlap,
            ),
            Failure::NotHostVisible(flags) => write!(
                f,
                "is bound to memory with properties {:?}, which are not HOST_VISIBLE",
                flags,
            ),
        }
    }
}

/// A predicate together with the VUID that is reported when no buffer satisfies it.
pub struct BufferRule<'a> {
    pub vuid: &'static str,
    pub predicate: Box<dyn BufferPredicate + 'a>,
    /// Builds the sentence describing the requirement. Only called when a diagnostic is emitted.
    pub header: Box<dyn Fn() -> String + 'a>,
}

impl<'a> BufferRule<'a> {
    #[inline]
    pub fn new(
        vuid: &'static str,
        predicate: impl BufferPredicate + 'a,
        header: impl Fn() -> String + 'a,
    ) -> Self {
        BufferRule {
            vuid,
            predicate: Box::new(predicate),
            header: Box::new(header),
        }
    }

    /// Like [`new`](Self::new), for a predicate written as a closure.
    #[inline]
    pub fn from_fn(
        vuid: &'static str,
        predicate: impl Fn(&Buffer, Option<&mut String>) -> bool + 'a,
        header: impl Fn() -> String + 'a,
    ) -> Self {
        Self::new(vuid, predicate, header)
    }
}

impl fmt::Debug for BufferRule<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferRule")
            .field("vuid", &self.vuid)
            .finish_non_exhaustive()
    }
}

/// Where and about what diagnostics are reported.
#[derive(Clone, Copy, Debug)]
pub struct DiagnosticContext<'a> {
    pub report: &'a DebugReport,
    /// Objects listed in every diagnostic, before the offending buffers.
    pub objects: &'a ObjectList,
    /// The command and parameter being validated, e.g.
    /// `vkCmdTraceRaysKHR(): pRaygenShaderBindingTable->deviceAddress`.
    pub location: &'a str,
    /// The device address the candidates were found for, if any.
    pub address: Option<DeviceAddress>,
}

/// The buffers that may contain a device address. `None` entries are buffers that disappeared
/// between the lookup and the validation, and are skipped.
pub type BufferCandidates = SmallVec<[Option<Arc<Buffer>>; 2]>;

/// Validates the candidate buffers of one device address against a set of rules.
#[derive(Debug, Default)]
pub struct BufferAddressValidator<'a> {
    rules: SmallVec<[BufferRule<'a>; 3]>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Policy {
    NoValidBuffer,
    InvalidBufferFound,
}

impl<'a> BufferAddressValidator<'a> {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn with_rule(mut self, rule: BufferRule<'a>) -> Self {
        self.rules.push(rule);
        self
    }

    #[inline]
    pub fn push(&mut self, rule: BufferRule<'a>) {
        self.rules.push(rule);
    }

    #[inline]
    pub fn rules(&self) -> &[BufferRule<'a>] {
        &self.rules
    }

    /// Returns whether at least one candidate satisfies every rule.
    ///
    /// An empty candidate list has no valid buffer.
    pub fn has_valid_buffer(&self, candidates: &[Option<Arc<Buffer>>]) -> bool {
        candidates
            .iter()
            .flatten()
            .any(|buffer| self.satisfies_all(buffer))
    }

    /// Returns whether at least one candidate violates at least one rule.
    ///
    /// This is not the complement of [`has_valid_buffer`](Self::has_valid_buffer): with several
    /// candidates, both can be true at once.
    pub fn has_invalid_buffer(&self, candidates: &[Option<Arc<Buffer>>]) -> bool {
        candidates
            .iter()
            .flatten()
            .any(|buffer| !self.satisfies_all(buffer))
    }

    #[inline]
    fn satisfies_all(&self, buffer: &Buffer) -> bool {
        self.rules
            .iter()
            .all(|rule| rule.predicate.check(buffer, None))
    }

    /// Emits one diagnostic for every rule that is violated by at least one candidate, listing
    /// all the buffers that violate it along with their reasons.
    ///
    /// If there are no candidates, every rule gets a diagnostic saying that no live buffer
    /// contains the address.
    ///
    /// Returns `true` if any of the diagnostics was recorded as an error.
    pub fn log_invalid_buffers(
        &self,
        candidates: &[Option<Arc<Buffer>>],
        context: &DiagnosticContext<'_>,
    ) -> bool {
        self.log_with_policy(candidates, context, Policy::NoValidBuffer)
    }

    /// Emits diagnostics if no candidate satisfies every rule. Used when an address is allowed to
    /// be ambiguous, as long as one of the buffers it may refer to is suitable.
    ///
    /// Returns `true` if the command should be skipped.
    pub fn log_errors_if_no_valid_buffer(
        &self,
        candidates: &[Option<Arc<Buffer>>],
        context: &DiagnosticContext<'_>,
    ) -> bool {
        if self.has_valid_buffer(candidates) {
            return false;
        }

        self.log_with_policy(candidates, context, Policy::NoValidBuffer)
    }

    /// Emits diagnostics if any candidate violates a rule. Used when exactly one buffer is
    /// expected, and any nonconformance is an error.
    ///
    /// Returns `true` if the command should be skipped.
    pub fn log_errors_if_invalid_buffer_found(
        &self,
        candidates: &[Option<Arc<Buffer>>],
        context: &DiagnosticContext<'_>,
    ) -> bool {
        if !self.has_invalid_buffer(candidates) {
            return false;
        }

        self.log_with_policy(candidates, context, Policy::InvalidBufferFound)
    }

    fn log_with_policy(
        &self,
        candidates: &[Option<Arc<Buffer>>],
        context: &DiagnosticContext<'_>,
        policy: Policy,
    ) -> bool {
        let mut buffers: SmallVec<[&Arc<Buffer>; 4]> = SmallVec::new();

        for buffer in candidates.iter().flatten() {
            if !buffers.iter().any(|&seen| Arc::ptr_eq(seen, buffer)) {
                buffers.push(buffer);
            }
        }

        log::trace!(
            target: LOG_TARGET,
            "{}: building diagnostics for {} rule(s) and {} buffer(s)",
            context.location,
            self.rules.len(),
            buffers.len(),
        );

        let mut violations: SmallVec<[Violation; 3]> = self
            .rules
            .iter()
            .map(|_| Violation {
                objects: context.objects.clone(),
                lines: String::new(),
            })
            .collect();

        if buffers.is_empty() {
            for violation in &mut violations {
                violation
                    .lines
                    .push_str("\n    No live buffer contains this device address.");
            }
        } else {
            let mut reason = String::new();

            for buffer in &buffers {
                for (rule, violation) in self.rules.iter().zip(&mut violations) {
                    reason.clear();

                    if rule.predicate.check(buffer, Some(&mut reason)) || reason.is_empty() {
                        continue;
                    }

                    let object = ObjectHandle::new(buffer.handle());
                    violation.objects.add_object(object);
                    let _ = write!(
                        violation.lines,
                        "\n    {}: {}",
                        context.report.format_object(object),
                        reason,
                    );
                }
            }
        }

        let mut skip = false;

        for (rule, violation) in self.rules.iter().zip(&violations) {
            if violation.lines.is_empty() {
                continue;
            }

            let message = format!(
                "{} {}\nThe following buffers violate this rule:{}",
                Preamble { context, policy },
                (rule.header)(),
                violation.lines,
            );

            skip |= context.report.log_error(
                rule.vuid,
                &violation.objects,
                context.location,
                &message,
            );
        }

        skip
    }
}

struct Violation {
    objects: ObjectList,
    lines: String,
}

struct Preamble<'a, 'b> {
    context: &'a DiagnosticContext<'b>,
    policy: Policy,
}

impl fmt::Display for Preamble<'_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.policy, self.context.address) {
            (Policy::NoValidBuffer, Some(address)) => write!(
                f,
                "No buffer associated with the device address {:#x} satisfies every \
                requirement. At least one of them must be valid.",
                address,
            ),
            (Policy::NoValidBuffer, None) => write!(f, "No buffer satisfies every requirement."),
            (Policy::InvalidBufferFound, Some(address)) => write!(
                f,
                "A buffer associated with the device address {:#x} is not valid.",
                address,
            ),
            (Policy::InvalidBufferFound, None) => write!(f, "The buffer is not valid."),
        }
    }
}
