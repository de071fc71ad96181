// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! The sink that validation diagnostics are sent to.
//!
//! Every diagnostic is identified by a VUID and carries the list of objects it is about, the
//! location of the problem (e.g. `vkCmdTraceRaysKHR(): pRaygenShaderBindingTable`) and a
//! description. A [`DebugReport`] formats it, writes it to the [`log`] facade and hands it to the
//! registered user callbacks.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use vulkano_validation::report::{DebugReport, DebugReportCreateInfo, Message};
//!
//! let report = DebugReport::new(DebugReportCreateInfo {
//!     user_callbacks: vec![Arc::new(|msg: &Message<'_>| {
//!         eprintln!("{}", msg.text);
//!     })],
//!     ..DebugReportCreateInfo::from_env()
//! });
//! ```

use crate::{
    macros::vulkan_bitflags,
    object::{ObjectHandle, ObjectList},
    NonExhaustive, ValidationError,
};
use foldhash::{HashMap, HashSet};
use parking_lot::{Mutex, RwLock};
use std::{
    env, fmt,
    fmt::Write as _,
    panic::{catch_unwind, AssertUnwindSafe, RefUnwindSafe},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

pub type UserCallback = Arc<dyn Fn(&Message<'_>) + RefUnwindSafe + Send + Sync>;

/// The key used for messages that don't correspond to a VUID.
pub const UNASSIGNED_VUID: &str = "UNASSIGNED-vulkano-validation";

/// Environment variable holding a comma separated list of VUIDs to mute.
pub const MESSAGE_ID_FILTER_ENV: &str = "VK_LAYER_MESSAGE_ID_FILTER";

/// Environment variable holding the number of times the same VUID is reported.
pub const DUPLICATE_MESSAGE_LIMIT_ENV: &str = "VK_LAYER_DUPLICATE_MESSAGE_LIMIT";

const LOG_TARGET: &str = "vulkano_validation";

vulkan_bitflags! {
    /// Severity of message.
    MessageSeverity = DebugUtilsMessageSeverityFlagsEXT(u32);

    /// Diagnostic messages that are useful when debugging the validation itself.
    VERBOSE = VERBOSE,

    /// Informational messages.
    INFO = INFO,

    /// Use of the API that is valid but likely to be a mistake.
    WARNING = WARNING,

    /// Use of the API that violates a valid usage rule.
    ERROR = ERROR,
}

impl MessageSeverity {
    /// Returns a `MessageSeverity` with the `ERROR` and `WARNING` flags set.
    #[inline]
    pub const fn errors_and_warnings() -> Self {
        Self::ERROR.union(Self::WARNING)
    }

    fn label(self) -> &'static str {
        if self.intersects(Self::ERROR) {
            "Validation Error"
        } else if self.intersects(Self::WARNING) {
            "Validation Warning"
        } else if self.intersects(Self::INFO) {
            "Validation Information"
        } else {
            "Validation Verbose"
        }
    }

    fn log_level(self) -> log::Level {
        if self.intersects(Self::ERROR) {
            log::Level::Error
        } else if self.intersects(Self::WARNING) {
            log::Level::Warn
        } else if self.intersects(Self::INFO) {
            log::Level::Info
        } else {
            log::Level::Debug
        }
    }
}

/// A message received by the callbacks.
pub struct Message<'a> {
    /// Severity of message.
    pub severity: MessageSeverity,
    /// The VUID of the rule that was violated, or [`UNASSIGNED_VUID`].
    pub vuid: &'a str,
    /// The objects the message is about.
    pub objects: &'a [ObjectHandle],
    /// Where the problem was found.
    pub location: &'a str,
    /// Description of the problem.
    pub description: &'a str,
    /// The fully formatted message, including object names.
    pub text: &'a str,
}

/// Parameters to create a `DebugReport`.
#[derive(Clone)]
pub struct DebugReportCreateInfo {
    /// The message severities that the callbacks should be called for.
    ///
    /// The default value is [`MessageSeverity::errors_and_warnings()`].
    pub message_severity: MessageSeverity,

    /// VUIDs whose messages are dropped entirely.
    ///
    /// The default value is empty.
    pub muted_vuids: Vec<String>,

    /// The number of times a message with the same VUID is delivered. Later ones are still
    /// counted, but not delivered. `0` means no limit.
    ///
    /// The default value is `10`.
    pub duplicate_message_limit: u32,

    /// Whether messages are also written to the `log` facade.
    ///
    /// The default value is `true`.
    pub log_messages: bool,

    /// The closures that should be called.
    ///
    /// The closures must not make any calls to the Vulkan API.
    /// If a closure panics, the panic is caught and ignored.
    ///
    /// The default value is empty.
    pub user_callbacks: Vec<UserCallback>,

    pub _ne: NonExhaustive,
}

impl Default for DebugReportCreateInfo {
    #[inline]
    fn default() -> Self {
        Self {
            message_severity: MessageSeverity::errors_and_warnings(),
            muted_vuids: Vec::new(),
            duplicate_message_limit: 10,
            log_messages: true,
            user_callbacks: Vec::new(),
            _ne: NonExhaustive(()),
        }
    }
}

impl DebugReportCreateInfo {
    /// Returns the default settings, overridden by the [`MESSAGE_ID_FILTER_ENV`] and
    /// [`DUPLICATE_MESSAGE_LIMIT_ENV`] environment variables when they are set.
    pub fn from_env() -> Self {
        Self::default().with_settings(|name| env::var(name).ok())
    }

    fn with_settings(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(filter) = lookup(MESSAGE_ID_FILTER_ENV) {
            self.muted_vuids.extend(
                filter
                    .split(',')
                    .map(str::trim)
                    .filter(|vuid| !vuid.is_empty())
                    .map(ToOwned::to_owned),
            );
        }

        if let Some(limit) = lookup(DUPLICATE_MESSAGE_LIMIT_ENV) {
            match limit.trim().parse() {
                Ok(limit) => self.duplicate_message_limit = limit,
                Err(err) => log::warn!(
                    target: LOG_TARGET,
                    "ignoring {}={:?}: {}",
                    DUPLICATE_MESSAGE_LIMIT_ENV,
                    limit,
                    err,
                ),
            }
        }

        self
    }
}

impl fmt::Debug for DebugReportCreateInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Self {
            message_severity,
            muted_vuids,
            duplicate_message_limit,
            log_messages,
            user_callbacks,
            _ne: _,
        } = self;

        f.debug_struct("DebugReportCreateInfo")
            .field("message_severity", message_severity)
            .field("muted_vuids", muted_vuids)
            .field("duplicate_message_limit", duplicate_message_limit)
            .field("log_messages", log_messages)
            .field("user_callbacks", &user_callbacks.len())
            .finish_non_exhaustive()
    }
}

/// Collects validation messages and delivers them.
pub struct DebugReport {
    message_severity: MessageSeverity,
    muted_vuids: HashSet<String>,
    duplicate_message_limit: u32,
    log_messages: bool,
    user_callbacks: RwLock<Vec<UserCallback>>,
    object_names: RwLock<HashMap<ObjectHandle, String>>,
    message_counts: Mutex<HashMap<String, u32>>,
    error_count: AtomicU64,
}

impl DebugReport {
    pub fn new(create_info: DebugReportCreateInfo) -> Self {
        let DebugReportCreateInfo {
            message_severity,
            muted_vuids,
            duplicate_message_limit,
            log_messages,
            user_callbacks,
            _ne: _,
        } = create_info;

        DebugReport {
            message_severity,
            muted_vuids: muted_vuids.into_iter().collect(),
            duplicate_message_limit,
            log_messages,
            user_callbacks: RwLock::new(user_callbacks),
            object_names: RwLock::new(HashMap::default()),
            message_counts: Mutex::new(HashMap::default()),
            error_count: AtomicU64::new(0),
        }
    }

    /// Adds a callback that is called for every delivered message.
    pub fn register_callback(&self, user_callback: UserCallback) {
        self.user_callbacks.write().push(user_callback);
    }

    /// Sets the debug name of an object, as with `vkSetDebugUtilsObjectNameEXT`. An empty or
    /// absent name removes it.
    pub fn set_object_name(&self, object: ObjectHandle, name: Option<&str>) {
        let mut object_names = self.object_names.write();

        match name {
            Some(name) if !name.is_empty() => {
                object_names.insert(object, name.to_owned());
            }
            _ => {
                object_names.remove(&object);
            }
        }
    }

    #[inline]
    pub fn object_name(&self, object: ObjectHandle) -> Option<String> {
        self.object_names.read().get(&object).cloned()
    }

    /// Formats an object handle followed by its debug name, e.g. `VkBuffer 0x2a[scratch]`.
    pub fn format_object(&self, object: ObjectHandle) -> String {
        match self.object_names.read().get(&object) {
            Some(name) => format!("{}[{}]", object, name),
            None => object.to_string(),
        }
    }

    /// Returns the number of error messages that were recorded, including the ones that were not
    /// delivered because of the duplicate message limit.
    #[inline]
    pub fn error_count(&self) -> u64 {
        self.error_count.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn is_muted(&self, vuid: &str) -> bool {
        self.muted_vuids.contains(vuid_key(vuid))
    }

    /// Records a message.
    ///
    /// Returns `true` if an error was recorded, which means that the command should be skipped.
    /// Muted messages return `false`.
    pub fn emit(
        &self,
        severity: MessageSeverity,
        vuid: &str,
        objects: &ObjectList,
        location: &str,
        description: &str,
    ) -> bool {
        let vuid = vuid_key(vuid);

        if self.muted_vuids.contains(vuid) {
            log::trace!(target: LOG_TARGET, "muted message {}", vuid);
            return false;
        }

        let is_error = severity.intersects(MessageSeverity::ERROR);

        if is_error {
            self.error_count.fetch_add(1, Ordering::Relaxed);
        }

        let count = {
            let mut message_counts = self.message_counts.lock();
            let count = message_counts.entry(vuid.to_owned()).or_insert(0);
            *count = count.saturating_add(1);
            *count
        };
        let limit = self.duplicate_message_limit;

        if limit != 0 && count > limit {
            log::trace!(
                target: LOG_TARGET,
                "message {} not delivered, it was reported {} times",
                vuid,
                count,
            );
            return is_error;
        }

        let mut text = self.format_message(severity, vuid, objects, location, description);

        if limit != 0 && count == limit {
            let _ = write!(
                text,
                "\n(The duplicate message limit of {} has been reached for {}, further messages \
                with this VUID will not be delivered.)",
                limit, vuid,
            );
        }

        if self.log_messages {
            log::log!(target: LOG_TARGET, severity.log_level(), "{}", text);
        }

        if self.message_severity.intersects(severity) {
            let message = Message {
                severity,
                vuid,
                objects: objects.as_slice(),
                location,
                description,
                text: &text,
            };
            let user_callbacks = self.user_callbacks.read().clone();

            for user_callback in &user_callbacks {
                if catch_unwind(AssertUnwindSafe(|| user_callback(&message))).is_err() {
                    log::warn!(target: LOG_TARGET, "a debug report callback panicked");
                }
            }
        }

        is_error
    }

    /// Records an error message.
    #[inline]
    pub fn log_error(
        &self,
        vuid: &str,
        objects: &ObjectList,
        location: &str,
        description: &str,
    ) -> bool {
        self.emit(MessageSeverity::ERROR, vuid, objects, location, description)
    }

    /// Records a warning message. Warnings never cause a command to be skipped.
    #[inline]
    pub fn log_warning(&self, vuid: &str, objects: &ObjectList, location: &str, description: &str) {
        self.emit(MessageSeverity::WARNING, vuid, objects, location, description);
    }

    /// Records the result of a failed stateless check as an error message, using the first of its
    /// VUIDs.
    pub fn log_validation_error(
        &self,
        objects: &ObjectList,
        location: &str,
        error: &ValidationError,
    ) -> bool {
        let vuid = error.vuids.first().copied().unwrap_or(UNASSIGNED_VUID);
        let description = if error.context.is_empty() {
            error.problem.to_string()
        } else {
            format!("{} {}", error.context, error.problem)
        };

        self.log_error(vuid, objects, location, &description)
    }

    fn format_message(
        &self,
        severity: MessageSeverity,
        vuid: &str,
        objects: &ObjectList,
        location: &str,
        description: &str,
    ) -> String {
        let mut text = format!("{}: [ {} ]", severity.label(), vuid);

        for (index, &object) in objects.iter().enumerate() {
            let _ = write!(text, " Object {}: {};", index, self.format_object(object));
        }

        let _ = write!(text, " | {}: {}", location, description);

        text
    }
}

impl Default for DebugReport {
    #[inline]
    fn default() -> Self {
        Self::new(DebugReportCreateInfo::default())
    }
}

impl fmt::Debug for DebugReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DebugReport")
            .field("message_severity", &self.message_severity)
            .field("muted_vuids", &self.muted_vuids)
            .field("duplicate_message_limit", &self.duplicate_message_limit)
            .field("error_count", &self.error_count())
            .finish_non_exhaustive()
    }
}

#[inline]
fn vuid_key(vuid: &str) -> &str {
    if vuid.is_empty() {
        UNASSIGNED_VUID
    } else {
        vuid
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::CapturedMessages;
    use ash::vk::{self, Handle};

    fn report(create_info: DebugReportCreateInfo) -> (DebugReport, CapturedMessages) {
        let captured = CapturedMessages::default();
        let report = DebugReport::new(DebugReportCreateInfo {
            user_callbacks: vec![captured.callback()],
            ..create_info
        });

        (report, captured)
    }

    #[test]
    fn error_is_delivered_and_counted() {
        let (report, captured) = report(DebugReportCreateInfo::default());
        let mut objects = ObjectList::new();
        objects.add(vk::Buffer::from_raw(0x2a));
        report.set_object_name(ObjectHandle::new(vk::Buffer::from_raw(0x2a)), Some("scratch"));

        assert!(report.log_error("VUID-test-01", &objects, "vkCmdTest()", "went wrong"));
        assert_eq!(report.error_count(), 1);

        let messages = captured.take();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].vuid, "VUID-test-01");
        assert_eq!(
            messages[0].text,
            "Validation Error: [ VUID-test-01 ] Object 0: VkBuffer 0x2a[scratch]; \
            | vkCmdTest(): went wrong",
        );
    }

    #[test]
    fn warnings_dont_skip() {
        let (report, captured) = report(DebugReportCreateInfo::default());

        report.log_warning("VUID-test-02", &ObjectList::new(), "here", "hmm");

        assert_eq!(report.error_count(), 0);
        assert!(captured.take()[0].text.starts_with("Validation Warning: "));
    }

    #[test]
    fn severity_filter() {
        let (report, captured) = report(DebugReportCreateInfo {
            message_severity: MessageSeverity::ERROR,
            ..Default::default()
        });

        report.log_warning("VUID-test-02", &ObjectList::new(), "here", "hmm");

        assert!(captured.take().is_empty());
    }

    #[test]
    fn muted_vuid() {
        let (report, captured) = report(DebugReportCreateInfo {
            muted_vuids: vec!["VUID-test-01".to_owned()],
            ..Default::default()
        });

        assert!(!report.log_error("VUID-test-01", &ObjectList::new(), "here", "muted"));
        assert!(report.log_error("VUID-test-03", &ObjectList::new(), "here", "not muted"));
        assert_eq!(report.error_count(), 1);
        assert_eq!(captured.take().len(), 1);
    }

    #[test]
    fn duplicate_message_limit() {
        let (report, captured) = report(DebugReportCreateInfo {
            duplicate_message_limit: 2,
            ..Default::default()
        });

        for _ in 0..4 {
            assert!(report.log_error("VUID-test-01", &ObjectList::new(), "here", "again"));
        }

        let messages = captured.take();
        assert_eq!(messages.len(), 2);
        assert!(!messages[0].text.contains("duplicate message limit"));
        assert!(messages[1].text.contains("duplicate message limit of 2"));
        assert_eq!(report.error_count(), 4);
    }

    #[test]
    fn empty_vuid_is_unassigned() {
        let (report, captured) = report(DebugReportCreateInfo::default());

        report.log_error("", &ObjectList::new(), "here", "no vuid");

        assert_eq!(captured.take()[0].vuid, UNASSIGNED_VUID);
    }

    #[test]
    fn panicking_callback_is_contained() {
        let (report, captured) = report(DebugReportCreateInfo::default());
        report.register_callback(Arc::new(|_: &Message<'_>| panic!("callback panic")));
        report.register_callback(captured.callback());

        assert!(report.log_error("VUID-test-01", &ObjectList::new(), "here", "boom"));
        assert_eq!(captured.take().len(), 2);
    }

    #[test]
    fn validation_error_uses_first_vuid() {
        let (report, captured) = report(DebugReportCreateInfo::default());
        let error = ValidationError {
            context: "info.offset".into(),
            problem: "is not a multiple of 256".into(),
            vuids: &["VUID-a", "VUID-b"],
            ..Default::default()
        };

        assert!(report.log_validation_error(&ObjectList::new(), "vkTest()", &error));

        let messages = captured.take();
        assert_eq!(messages[0].vuid, "VUID-a");
        assert_eq!(messages[0].description, "info.offset is not a multiple of 256");
    }

    #[test]
    fn settings_from_environment() {
        let create_info = DebugReportCreateInfo::default().with_settings(|name| match name {
            MESSAGE_ID_FILTER_ENV => Some(" VUID-a, ,VUID-b".to_owned()),
            DUPLICATE_MESSAGE_LIMIT_ENV => Some("0".to_owned()),
            _ => None,
        });

        assert_eq!(create_info.muted_vuids, ["VUID-a", "VUID-b"]);
        assert_eq!(create_info.duplicate_message_limit, 0);

        let create_info = DebugReportCreateInfo::default().with_settings(|name| {
            (name == DUPLICATE_MESSAGE_LIMIT_ENV).then(|| "many".to_owned())
        });

        assert_eq!(create_info.duplicate_message_limit, 10);
    }

    #[test]
    fn object_names() {
        let report = DebugReport::default();
        let object = ObjectHandle::new(vk::Buffer::from_raw(1));

        report.set_object_name(object, Some("vertices"));
        assert_eq!(report.format_object(object), "VkBuffer 0x1[vertices]");

        report.set_object_name(object, Some(""));
        assert_eq!(report.object_name(object), None);
        assert_eq!(report.format_object(object), "VkBuffer 0x1");
    }
}
