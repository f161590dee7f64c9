// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Discrete zoom ladder.
//!
//! Host zoom percentages are collapsed onto a small signed [`ZoomStep`]. Each
//! step maps to a fixed magnification through [`ScaleFactorTable`]; the
//! multiplier handed to target-width policies is the reciprocal of that
//! magnification.

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ScaleError;

/// Magnification for each zoom step, from [`ZoomStep::MIN`] to [`ZoomStep::MAX`].
pub const MAGNIFICATIONS: [f64; 17] = [
    0.25, 0.33, 0.5, 0.66, 0.75, 0.8, 0.9, 1.0, 1.1, 1.25, 1.5, 1.75, 2.0, 2.5, 3.0, 4.0, 5.0,
];

/// A position on the zoom ladder, always within `[-7, 9]`.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(into = "i32", from = "StoredStep")]
pub struct ZoomStep(i8);

/// A step as found in a persisted record, possibly off the ladder.
#[derive(Deserialize)]
#[serde(transparent)]
struct StoredStep(i32);

impl ZoomStep {
    /// Lowest step.
    pub const MIN: Self = Self(-7);
    /// Highest step.
    pub const MAX: Self = Self(9);
    /// The neutral step (magnification `1.0`).
    pub const ZERO: Self = Self(0);

    /// Clamps an arbitrary integer onto the ladder.
    #[must_use]
    pub fn saturating(step: i32) -> Self {
        #[expect(clippy::cast_possible_truncation, reason = "clamped to [-7, 9]")]
        Self(step.clamp(i32::from(Self::MIN.0), i32::from(Self::MAX.0)) as i8)
    }

    /// Returns the step as a plain integer.
    #[must_use]
    #[inline]
    pub fn get(self) -> i32 {
        i32::from(self.0)
    }

    /// Moves one step up or down, staying on the ladder.
    #[must_use]
    pub fn nudge(self, up: bool) -> Self {
        Self::saturating(self.get() + if up { 1 } else { -1 })
    }

    /// Index of this step into [`MAGNIFICATIONS`].
    #[inline]
    fn index(self) -> usize {
        // `self >= MIN`, so the offset is never negative.
        usize::from((self.0 - Self::MIN.0).unsigned_abs())
    }
}

impl TryFrom<i32> for ZoomStep {
    type Error = ScaleError;

    fn try_from(step: i32) -> Result<Self, Self::Error> {
        if (Self::MIN.get()..=Self::MAX.get()).contains(&step) {
            Ok(Self::saturating(step))
        } else {
            Err(ScaleError::ZoomStepOutOfRange(step))
        }
    }
}

// Persisted records may carry anything; loading clamps.
impl From<StoredStep> for ZoomStep {
    fn from(StoredStep(step): StoredStep) -> Self {
        Self::saturating(step)
    }
}

impl From<ZoomStep> for i32 {
    fn from(step: ZoomStep) -> Self {
        step.get()
    }
}

impl fmt::Display for ZoomStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:+}", self.0)
    }
}

/// Mapping from [`ZoomStep`] to magnification.
///
/// The table is monotonically non-decreasing, so a higher step never
/// magnifies less than a lower one.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ScaleFactorTable;

impl ScaleFactorTable {
    /// Magnification ratio for `step`.
    #[must_use]
    pub fn magnification(self, step: ZoomStep) -> f64 {
        MAGNIFICATIONS[step.index()]
    }

    /// Multiplier passed to target-width policies: `1 / magnification`.
    #[must_use]
    pub fn multiplier(self, step: ZoomStep) -> f64 {
        1.0 / self.magnification(step)
    }

    /// Magnification for a raw integer step.
    ///
    /// Returns [`ScaleError::ZoomStepOutOfRange`] when `step` is not on the
    /// ladder; no clamping happens here.
    pub fn magnification_of(self, step: i32) -> Result<f64, ScaleError> {
        ZoomStep::try_from(step).map(|step| self.magnification(step))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_is_monotonic_over_the_whole_ladder() {
        let table = ScaleFactorTable;
        for step in ZoomStep::MIN.get()..ZoomStep::MAX.get() {
            let lo = ZoomStep::try_from(step).unwrap();
            let hi = ZoomStep::try_from(step + 1).unwrap();
            assert!(table.magnification(lo) <= table.magnification(hi));
            assert!(table.multiplier(lo) >= table.multiplier(hi));
        }
    }

    #[test]
    fn table_endpoints() {
        let table = ScaleFactorTable;
        assert_eq!(table.magnification(ZoomStep::MIN), 0.25);
        assert_eq!(table.magnification(ZoomStep::ZERO), 1.0);
        assert_eq!(table.magnification(ZoomStep::MAX), 5.0);
        assert_eq!(table.multiplier(ZoomStep::MIN), 4.0);
    }

    #[test]
    fn out_of_table_steps_are_rejected() {
        assert_eq!(
            ScaleFactorTable.magnification_of(10),
            Err(ScaleError::ZoomStepOutOfRange(10))
        );
        assert_eq!(
            ZoomStep::try_from(-8),
            Err(ScaleError::ZoomStepOutOfRange(-8))
        );
        assert_eq!(ScaleFactorTable.magnification_of(2), Ok(1.25));
    }

    #[test]
    fn nudge_stays_on_the_ladder() {
        assert_eq!(ZoomStep::MAX.nudge(true), ZoomStep::MAX);
        assert_eq!(ZoomStep::MIN.nudge(false), ZoomStep::MIN);
        assert_eq!(ZoomStep::ZERO.nudge(true).get(), 1);
        assert_eq!(ZoomStep::ZERO.nudge(false).get(), -1);
    }

    #[test]
    fn persisted_steps_are_clamped() {
        let step: ZoomStep = serde_json::from_str("42").unwrap();
        assert_eq!(step, ZoomStep::MAX);
        assert_eq!(ZoomStep::try_from(42), Err(ScaleError::ZoomStepOutOfRange(42)));
        assert_eq!(serde_json::to_string(&ZoomStep::MIN).unwrap(), "-7");
    }
}
