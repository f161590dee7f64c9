// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Error types.

use alloc::string::String;
use core::fmt;

use crate::host::PatchTarget;

/// Why a host accessor could not be used.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UnsupportedReason {
    /// The host does not define the property at all.
    Missing,
    /// The property exists but is not the kind of descriptor we wrap
    /// (for example a plain value where a getter was expected).
    WrongShape,
    /// The property exists but cannot be redefined.
    NotConfigurable,
}

impl fmt::Display for UnsupportedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Missing => "is missing",
            Self::WrongShape => "has an unexpected descriptor shape",
            Self::NotConfigurable => "is not configurable",
        })
    }
}

/// Errors raised while starting or driving screen scaling.
///
/// Everything here is fatal for the caller: an unsupported host or a misuse
/// of the API. An out-of-range viewport is not an error; it is reported as
/// [`ScaleState::OutOfRange`](crate::ScaleState::OutOfRange).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScaleError {
    /// A required host accessor is unusable.
    EnvironmentUnsupported {
        /// Object the accessor lives on.
        target: PatchTarget,
        /// Property name.
        property: &'static str,
        /// What is wrong with it.
        reason: UnsupportedReason,
    },
    /// The configured root element does not exist in the host document.
    MissingRootElement {
        /// The id that was looked up.
        id: String,
    },
    /// `install` was called while a patch set is already installed.
    AlreadyInstalled,
    /// A scaling context is already alive on this thread.
    ContextAlreadyActive,
    /// A zoom step outside the scale factor table.
    ZoomStepOutOfRange(i32),
}

impl fmt::Display for ScaleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EnvironmentUnsupported {
                target,
                property,
                reason,
            } => write!(f, "unsupported host: {target:?}.{property} {reason}"),
            Self::MissingRootElement { id } => {
                write!(f, "root element with id {id:?} does not exist")
            }
            Self::AlreadyInstalled => f.write_str("a patch set is already installed"),
            Self::ContextAlreadyActive => {
                f.write_str("a screen scaling context is already active on this thread")
            }
            Self::ZoomStepOutOfRange(step) => {
                write!(f, "zoom step {step} is outside the scale factor table")
            }
        }
    }
}

impl core::error::Error for ScaleError {}

/// Failure reported by a [`KeyValueStore`](crate::KeyValueStore).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreError {
    /// Human readable description from the backing store.
    pub message: String,
}

impl StoreError {
    /// Creates a store error with the given message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "key-value store failure: {}", self.message)
    }
}

impl core::error::Error for StoreError {}
