// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Viewport state engine.
//!
//! The engine owns the single live [`ScaleState`]. It recomputes eagerly on
//! each qualifying host event (a resize or a density change) from an
//! immutable input snapshot:
//!
//! ```text
//! measurement ─┐
//!              ├─> (width, height, multiplier) ─dedup─> policy ─> ScaleState
//! zoom step ───┘
//! ```
//!
//! Listeners are notified synchronously, in subscription order. Identical
//! consecutive inputs are suppressed and produce no notification.

use alloc::boxed::Box;
use core::cell::{Cell, RefCell};
use core::fmt;

use crate::listeners::Subscription;
use crate::preference::{ZoomPreference, ZoomTracker};
use crate::state::{PolicyInput, ScaleState, ScaleStateHandle, TargetWidth, ViewportMeasurement};

/// Default aspect ratio for the portrait heuristic.
pub const DEFAULT_PORTRAIT_ASPECT_RATIO: f64 = 1.3;

/// Reads the root content box from the host.
pub trait ViewportSource {
    /// Current size of the root content box, in physical units.
    fn measure(&self) -> ViewportMeasurement;
}

impl<F: Fn() -> ViewportMeasurement> ViewportSource for F {
    fn measure(&self) -> ViewportMeasurement {
        self()
    }
}

/// Engine configuration.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// How the design width is chosen.
    pub target_width: TargetWidth,
    /// A viewport is portrait when `width * portrait_aspect_ratio < height`.
    pub portrait_aspect_ratio: f64,
}

impl EngineConfig {
    /// Configuration with the default portrait heuristic.
    #[must_use]
    pub fn new(target_width: TargetWidth) -> Self {
        Self {
            target_width,
            portrait_aspect_ratio: DEFAULT_PORTRAIT_ASPECT_RATIO,
        }
    }

    /// Sets the portrait aspect ratio.
    #[must_use]
    pub fn with_portrait_aspect_ratio(mut self, ratio: f64) -> Self {
        self.portrait_aspect_ratio = ratio;
        self
    }
}

/// The inputs a recomputation depends on.
#[derive(Clone, Copy, Debug, PartialEq)]
struct InputKey {
    measurement: ViewportMeasurement,
    multiplier: f64,
}

/// Computes and publishes the live [`ScaleState`].
pub struct ViewportEngine {
    source: Box<dyn ViewportSource>,
    zoom: RefCell<ZoomTracker>,
    config: EngineConfig,
    handle: ScaleStateHandle,
    last_inputs: Cell<Option<InputKey>>,
    stopped: Cell<bool>,
}

impl fmt::Debug for ViewportEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewportEngine")
            .field("config", &self.config)
            .field("state", &self.handle.get())
            .field("zoom", &self.zoom.borrow().preference())
            .field("stopped", &self.stopped.get())
            .finish_non_exhaustive()
    }
}

impl ViewportEngine {
    /// Starts the engine and computes the initial state.
    #[must_use]
    pub fn start(source: Box<dyn ViewportSource>, zoom: ZoomTracker, config: EngineConfig) -> Self {
        let engine = Self {
            source,
            zoom: RefCell::new(zoom),
            config,
            handle: ScaleStateHandle::default(),
            last_inputs: Cell::new(None),
            stopped: Cell::new(false),
        };
        engine.recompute();
        engine
    }

    /// The latest computed state.
    #[must_use]
    pub fn current_state(&self) -> ScaleState {
        self.handle.get()
    }

    /// A shared handle to the live state.
    #[must_use]
    pub fn state_handle(&self) -> ScaleStateHandle {
        self.handle.clone()
    }

    /// Registers a listener for every published state.
    pub fn on_state_change(&self, listener: impl Fn(&ScaleState) + 'static) -> Subscription {
        self.handle.subscribe(listener)
    }

    /// The current zoom preference.
    #[must_use]
    pub fn zoom_preference(&self) -> ZoomPreference {
        self.zoom.borrow().preference()
    }

    /// Writes a zoom step taken while loading the preference back to the
    /// store. See [`ZoomTracker::persist`].
    pub fn persist_zoom_preference(&self) {
        self.zoom.borrow_mut().persist();
    }

    /// Host resize notification.
    pub fn handle_resize(&self) {
        self.recompute();
    }

    /// Host device pixel density notification.
    ///
    /// Moves the zoom step when the density changed and recomputes.
    pub fn handle_density_change(&self, device_pixel_density: f64) {
        if self.stopped.get() {
            return;
        }
        let changed = self
            .zoom
            .borrow_mut()
            .observe_density(device_pixel_density)
            .is_some();
        if changed {
            self.recompute();
        }
    }

    /// Re-reads the inputs and publishes a new state if they changed.
    pub fn recompute(&self) {
        if self.stopped.get() {
            return;
        }
        let key = InputKey {
            measurement: self.source.measure(),
            multiplier: self.zoom.borrow().multiplier(),
        };
        if self.last_inputs.get() == Some(key) {
            tracing::trace!(?key, "viewport inputs unchanged; skipping recomputation");
            return;
        }
        self.last_inputs.set(Some(key));

        let ViewportMeasurement {
            actual_width,
            actual_height,
        } = key.measurement;
        let input = PolicyInput {
            measurement: key.measurement,
            scale_multiplier: key.multiplier,
            is_portrait: actual_width * self.config.portrait_aspect_ratio < actual_height,
        };
        let state = ScaleState::compute(&input, &self.config.target_width);
        tracing::debug!(?state, "publishing scale state");
        self.handle.publish(state);
    }

    /// Stops reacting to host events and severs every listener.
    ///
    /// The last state stays readable.
    pub fn stop(&self) {
        if self.stopped.replace(true) {
            return;
        }
        self.handle.clear_listeners();
    }

    /// Returns `true` after [`stop`](Self::stop).
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stopped.get()
    }

    /// Snapshot of the engine for debugging and inspection.
    #[must_use]
    pub fn debug_info(&self) -> EngineDebugInfo {
        let zoom = self.zoom.borrow();
        EngineDebugInfo {
            state: self.handle.get(),
            zoom: zoom.preference(),
            multiplier: zoom.multiplier(),
            last_measurement: self.last_inputs.get().map(|key| key.measurement),
            listener_count: self.handle.listener_count(),
            stopped: self.stopped.get(),
        }
    }
}

/// Debug snapshot of a [`ViewportEngine`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EngineDebugInfo {
    /// Live state.
    pub state: ScaleState,
    /// Current zoom preference.
    pub zoom: ZoomPreference,
    /// Multiplier for the current zoom step.
    pub multiplier: f64,
    /// Measurement used for the last recomputation.
    pub last_measurement: Option<ViewportMeasurement>,
    /// Number of live state listeners.
    pub listener_count: usize,
    /// Whether the engine has been stopped.
    pub stopped: bool,
}

#[cfg(test)]
mod tests {
    use alloc::rc::Rc;
    use alloc::vec::Vec;

    use super::*;
    use crate::preference::{MemoryStore, ZOOM_PREFERENCE_KEY, ZoomPreferenceStore};

    struct Fixture {
        size: Rc<Cell<ViewportMeasurement>>,
        engine: ViewportEngine,
        seen: Rc<RefCell<Vec<ScaleState>>>,
    }

    fn fixture(width: f64, height: f64, target_width: TargetWidth) -> Fixture {
        let size = Rc::new(Cell::new(ViewportMeasurement::new(width, height)));
        let source = {
            let size = size.clone();
            move || size.get()
        };
        let store = ZoomPreferenceStore::new(Rc::new(MemoryStore::new()), ZOOM_PREFERENCE_KEY);
        let engine = ViewportEngine::start(
            Box::new(source),
            ZoomTracker::load(store, 1.0),
            EngineConfig::new(target_width),
        );
        let seen = Rc::new(RefCell::new(Vec::new()));
        {
            let seen = seen.clone();
            let _ = engine.on_state_change(move |state| seen.borrow_mut().push(*state));
        }
        Fixture { size, engine, seen }
    }

    #[test]
    fn initial_state_is_computed_on_start() {
        let f = fixture(1920.0, 1080.0, TargetWidth::fixed(960.0));
        assert_eq!(f.engine.current_state().effective_scale_factor(), 2.0);
        assert!(f.seen.borrow().is_empty());
    }

    #[test]
    fn identical_inputs_notify_once() {
        let f = fixture(1920.0, 1080.0, TargetWidth::fixed(960.0));
        f.size.set(ViewportMeasurement::new(1280.0, 720.0));
        f.engine.handle_resize();
        f.engine.handle_resize();
        assert_eq!(f.seen.borrow().len(), 1);
        assert_eq!(f.seen.borrow()[0].effective_scale_factor(), 1280.0 / 960.0);
    }

    #[test]
    fn zoom_step_change_recomputes_without_resize() {
        let policy = TargetWidth::policy(|input| Some(1000.0 * input.scale_multiplier));
        let f = fixture(2000.0, 1000.0, policy);
        assert_eq!(f.engine.current_state().effective_scale_factor(), 2.0);

        // Host zoomed in: step 0 -> 1 (magnification 1.1).
        f.engine.handle_density_change(1.1);
        assert_eq!(f.seen.borrow().len(), 1);
        let expected = 2000.0 / (1000.0 / 1.1);
        assert!((f.engine.current_state().effective_scale_factor() - expected).abs() < 1e-9);

        // Same density again: nothing happens.
        f.engine.handle_density_change(1.1);
        assert_eq!(f.seen.borrow().len(), 1);
        assert_eq!(f.engine.zoom_preference().zoom_step.get(), 1);
    }

    #[test]
    fn portrait_heuristic_feeds_the_policy() {
        let policy = TargetWidth::policy(|input| (!input.is_portrait).then_some(800.0));
        let f = fixture(1600.0, 900.0, policy);
        assert!(!f.engine.current_state().is_out_of_range());

        f.size.set(ViewportMeasurement::new(400.0, 900.0));
        f.engine.handle_resize();
        assert!(f.engine.current_state().is_out_of_range());

        // Taller than wide, but not by enough to count as portrait.
        f.size.set(ViewportMeasurement::new(1000.0, 1200.0));
        f.engine.handle_resize();
        assert!(!f.engine.current_state().is_out_of_range());
    }

    #[test]
    fn stop_severs_listeners_and_freezes_state() {
        let f = fixture(1920.0, 1080.0, TargetWidth::fixed(960.0));
        f.engine.stop();
        f.size.set(ViewportMeasurement::new(960.0, 540.0));
        f.engine.handle_resize();
        assert!(f.seen.borrow().is_empty());
        assert_eq!(f.engine.current_state().effective_scale_factor(), 2.0);

        let info = f.engine.debug_info();
        assert!(info.stopped);
        assert_eq!(info.listener_count, 0);
    }
}
