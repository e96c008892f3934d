// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::fmt;
use std::hash::{Hash, Hasher};

/// Storage class of a log group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum LogGroupClass {
    #[default]
    Standard,
    InfrequentAccess,
}

/// One delivery destination: a log group and a stream inside it.
///
/// Two targets are equal when they name the same group and stream; the class
/// and retention only matter when the destination has to be created or
/// configured.
#[derive(Debug, Clone)]
pub struct Target {
    pub group: String,
    pub stream: String,
    pub class: LogGroupClass,
    /// Retention to apply to the group, in days. `None` leaves it untouched.
    pub retention_in_days: Option<u32>,
}

impl Target {
    pub fn new(group: impl Into<String>, stream: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            stream: stream.into(),
            class: LogGroupClass::default(),
            retention_in_days: None,
        }
    }

    #[must_use]
    pub fn with_class(mut self, class: LogGroupClass) -> Self {
        self.class = class;
        self
    }

    #[must_use]
    pub fn with_retention(mut self, days: u32) -> Self {
        self.retention_in_days = Some(days);
        self
    }

    /// Retention in days when one should be applied to the group.
    #[must_use]
    pub fn retention(&self) -> Option<u32> {
        self.retention_in_days.filter(|days| *days > 0)
    }
}

impl PartialEq for Target {
    fn eq(&self, other: &Self) -> bool {
        self.group == other.group && self.stream == other.stream
    }
}

impl Eq for Target {}

impl Hash for Target {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.group.hash(state);
        self.stream.hash(state);
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.group, self.stream)
    }
}
