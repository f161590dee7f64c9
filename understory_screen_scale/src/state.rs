// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Scale state and the pure function that derives it.

use alloc::rc::Rc;
use core::cell::Cell;
use core::fmt;

use kurbo::Size;

use crate::listeners::{CancellationScope, ListenerList, Subscription};

/// Size of the root content box in physical host units.
///
/// This is measured on the document's root content element rather than the
/// window, so pinch zooming on touch devices does not cause recomputation.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ViewportMeasurement {
    /// Measured width.
    pub actual_width: f64,
    /// Measured height.
    pub actual_height: f64,
}

impl ViewportMeasurement {
    /// Creates a measurement.
    #[must_use]
    pub fn new(actual_width: f64, actual_height: f64) -> Self {
        Self {
            actual_width,
            actual_height,
        }
    }

    /// The measurement as a [`Size`].
    #[must_use]
    pub fn size(self) -> Size {
        Size::new(self.actual_width, self.actual_height)
    }
}

/// Inputs handed to a target-width policy.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PolicyInput {
    /// Measured root content box.
    pub measurement: ViewportMeasurement,
    /// `1 / magnification` for the current zoom step.
    pub scale_multiplier: f64,
    /// `actual_width * portrait_aspect_ratio < actual_height`.
    pub is_portrait: bool,
}

/// Policy callback: design width for a viewport, or `None` when the shape is
/// not supported.
pub type TargetWidthPolicy = Rc<dyn Fn(&PolicyInput) -> Option<f64>>;

/// How the design width is chosen.
#[derive(Clone)]
pub enum TargetWidth {
    /// Always scale to this width, regardless of shape or zoom.
    Fixed(f64),
    /// Ask a policy on every recomputation.
    Policy(TargetWidthPolicy),
}

impl TargetWidth {
    /// A constant design width.
    #[must_use]
    pub fn fixed(width: f64) -> Self {
        Self::Fixed(width)
    }

    /// A computed design width.
    #[must_use]
    pub fn policy(policy: impl Fn(&PolicyInput) -> Option<f64> + 'static) -> Self {
        Self::Policy(Rc::new(policy))
    }

    /// Evaluates the target width for `input`.
    #[must_use]
    pub fn resolve(&self, input: &PolicyInput) -> Option<f64> {
        match self {
            Self::Fixed(width) => Some(*width),
            Self::Policy(policy) => policy(input),
        }
    }
}

impl fmt::Debug for TargetWidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(width) => f.debug_tuple("Fixed").field(width).finish(),
            Self::Policy(_) => f.write_str("Policy(..)"),
        }
    }
}

/// The one live description of how content is scaled.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ScaleState {
    /// The policy declined this viewport; content is not scaled.
    OutOfRange {
        /// Measured width.
        actual_width: f64,
        /// Measured height.
        actual_height: f64,
    },
    /// Content is scaled from the design size up (or down) to the actual size.
    InRange {
        /// Measured width.
        actual_width: f64,
        /// Measured height.
        actual_height: f64,
        /// `actual_width / target_width`.
        scale_factor: f64,
        /// Design width.
        target_width: f64,
        /// `actual_height / scale_factor`.
        target_height: f64,
    },
}

impl Default for ScaleState {
    fn default() -> Self {
        Self::OutOfRange {
            actual_width: 0.0,
            actual_height: 0.0,
        }
    }
}

impl ScaleState {
    /// Derives the state for `input` using `target_width`.
    ///
    /// A degenerate result (zero width, or a non-finite or non-positive
    /// target) is classified as out of range.
    #[must_use]
    pub fn compute(input: &PolicyInput, target_width: &TargetWidth) -> Self {
        let ViewportMeasurement {
            actual_width,
            actual_height,
        } = input.measurement;
        let out_of_range = Self::OutOfRange {
            actual_width,
            actual_height,
        };
        let Some(target) = target_width.resolve(input) else {
            return out_of_range;
        };
        let scale_factor = actual_width / target;
        if !target.is_finite() || target <= 0.0 || !scale_factor.is_normal() {
            tracing::warn!(
                target_width = target,
                actual_width,
                "degenerate target width; treating viewport as out of range"
            );
            return out_of_range;
        }
        Self::InRange {
            actual_width,
            actual_height,
            scale_factor,
            target_width: target,
            target_height: actual_height / scale_factor,
        }
    }

    /// Returns `true` for [`ScaleState::OutOfRange`].
    #[must_use]
    pub fn is_out_of_range(&self) -> bool {
        matches!(self, Self::OutOfRange { .. })
    }

    /// Factor every physical value is divided by; `1.0` when out of range.
    #[must_use]
    pub fn effective_scale_factor(&self) -> f64 {
        match self {
            Self::OutOfRange { .. } => 1.0,
            Self::InRange { scale_factor, .. } => *scale_factor,
        }
    }

    /// Measured size.
    #[must_use]
    pub fn actual_size(&self) -> Size {
        match *self {
            Self::OutOfRange {
                actual_width,
                actual_height,
            }
            | Self::InRange {
                actual_width,
                actual_height,
                ..
            } => Size::new(actual_width, actual_height),
        }
    }

    /// Design size, when in range.
    #[must_use]
    pub fn target_size(&self) -> Option<Size> {
        match *self {
            Self::OutOfRange { .. } => None,
            Self::InRange {
                target_width,
                target_height,
                ..
            } => Some(Size::new(target_width, target_height)),
        }
    }

    /// Window inner size as application code should see it.
    #[must_use]
    pub fn inner_size(&self) -> Size {
        self.target_size().unwrap_or_else(|| self.actual_size())
    }
}

/// Shared read access to the live [`ScaleState`] plus its change listeners.
///
/// Handles are cheap to clone; interception closures hold one and read the
/// state fresh on every call.
#[derive(Clone, Debug, Default)]
pub struct ScaleStateHandle {
    state: Rc<Cell<ScaleState>>,
    listeners: ListenerList<ScaleState>,
}

impl ScaleStateHandle {
    /// Creates a handle holding `initial`.
    #[must_use]
    pub fn new(initial: ScaleState) -> Self {
        Self {
            state: Rc::new(Cell::new(initial)),
            listeners: ListenerList::new(),
        }
    }

    /// The latest state.
    #[must_use]
    pub fn get(&self) -> ScaleState {
        self.state.get()
    }

    /// Shorthand for `self.get().effective_scale_factor()`.
    #[must_use]
    pub fn effective_scale_factor(&self) -> f64 {
        self.get().effective_scale_factor()
    }

    /// Listens to every published state.
    pub fn subscribe(&self, listener: impl Fn(&ScaleState) + 'static) -> Subscription {
        self.listeners.subscribe(listener)
    }

    /// Listens to published states until `scope` is cancelled.
    pub fn subscribe_scoped(
        &self,
        scope: &CancellationScope,
        listener: impl Fn(&ScaleState) + 'static,
    ) -> Subscription {
        self.listeners.subscribe_scoped(scope, listener)
    }

    /// Replaces the state and notifies listeners.
    pub(crate) fn publish(&self, state: ScaleState) {
        self.state.set(state);
        self.listeners.notify(&state);
    }

    /// Drops every listener.
    pub(crate) fn clear_listeners(&self) {
        self.listeners.clear();
    }

    /// Number of live listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(width: f64, height: f64) -> PolicyInput {
        PolicyInput {
            measurement: ViewportMeasurement::new(width, height),
            scale_multiplier: 1.0,
            is_portrait: false,
        }
    }

    #[test]
    fn in_range_state_recovers_actual_size() {
        let state = ScaleState::compute(&input(1920.0, 1080.0), &TargetWidth::fixed(960.0));
        let ScaleState::InRange {
            scale_factor,
            target_width,
            target_height,
            ..
        } = state
        else {
            panic!("expected in-range state, got {state:?}");
        };
        assert_eq!(scale_factor, 2.0);
        assert!((target_width * scale_factor - 1920.0).abs() < 1e-9);
        assert!((target_height * scale_factor - 1080.0).abs() < 1e-9);
        assert_eq!(state.inner_size(), Size::new(960.0, 540.0));
    }

    #[test]
    fn declined_policy_is_out_of_range_with_unit_factor() {
        let policy = TargetWidth::policy(|_| None);
        let state = ScaleState::compute(&input(300.0, 900.0), &policy);
        assert!(state.is_out_of_range());
        assert_eq!(state.effective_scale_factor(), 1.0);
        assert_eq!(state.inner_size(), Size::new(300.0, 900.0));
        assert_eq!(state.target_size(), None);
    }

    #[test]
    fn degenerate_targets_are_out_of_range() {
        for target in [0.0, -10.0, f64::NAN, f64::INFINITY] {
            let state = ScaleState::compute(&input(1000.0, 800.0), &TargetWidth::fixed(target));
            assert!(state.is_out_of_range(), "target {target} should be rejected");
        }
        let state = ScaleState::compute(&input(0.0, 0.0), &TargetWidth::fixed(800.0));
        assert!(state.is_out_of_range());
    }

    #[test]
    fn policy_sees_its_inputs() {
        let policy = TargetWidth::policy(|input| {
            assert!(input.is_portrait);
            Some(400.0 * input.scale_multiplier)
        });
        let mut portrait = input(400.0, 900.0);
        portrait.is_portrait = true;
        portrait.scale_multiplier = 0.5;
        let state = ScaleState::compute(&portrait, &policy);
        assert_eq!(state.effective_scale_factor(), 2.0);
    }

    #[test]
    fn handle_publishes_to_listeners() {
        let handle = ScaleStateHandle::default();
        let seen = Rc::new(Cell::new(0.0));
        let _sub = {
            let seen = seen.clone();
            handle.subscribe(move |state| seen.set(state.effective_scale_factor()))
        };
        let state = ScaleState::compute(&input(1200.0, 600.0), &TargetWidth::fixed(600.0));
        handle.publish(state);
        assert_eq!(handle.get(), state);
        assert_eq!(seen.get(), 2.0);
    }
}
