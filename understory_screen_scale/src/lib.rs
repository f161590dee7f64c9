// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

// After you edit the crate's doc comment, run this command, then check README.md for any missing links
// cargo rdme --workspace-project=understory_screen_scale --heading-base-level=0

//! Understory Screen Scale: lay out at a design width, show at any size.
//!
//! An application is laid out as if the viewport were a fixed *design width*
//! wide; the container is then visually scaled to fill the real viewport.
//! Because the host still measures everything physically, every geometry
//! query the application can make is intercepted and answered in design
//! space, so layout code and pointer handling stay consistent.
//!
//! The crate is made of a few small pieces:
//! - [`ZoomTracker`] collapses host zoom (device pixel density changes) onto
//!   a discrete [`ZoomStep`] ladder and persists it through a
//!   [`KeyValueStore`].
//! - [`ViewportEngine`] owns the single live [`ScaleState`], recomputed on
//!   resize and zoom changes from a [`TargetWidth`] policy.
//! - [`InterceptionRegistry`] replaces the geometry and pointer surface of a
//!   [`HostObjectModel`] with design-space versions, and restores the
//!   originals exactly on uninstall or during [`bypass`](InterceptionRegistry::bypass).
//! - [`ScaledResizeObserver`] fires resize observations when only the scale
//!   factor changed.
//! - [`StyleApplier`] writes the container transform.
//! - [`ScreenScalingContext`] wires all of it to one host.
//!
//! Hosts implement [`HostObjectModel`] and [`StyleSurface`]; [`MemoryHost`]
//! is an in-memory implementation used for tests and headless embedding.
//!
//! ## Example
//!
//! ```rust
//! use std::rc::Rc;
//!
//! use kurbo::{Rect, Size};
//! use understory_screen_scale::{
//!     ElementLayout, HostObjectModel, MemoryHost, MemoryStore, PatchTarget,
//!     ScreenScaleConfig, ScreenScalingContext, TargetWidth, read_property,
//! };
//!
//! let host = Rc::new(MemoryHost::new(Size::new(1920.0, 1080.0)));
//! host.add_element(Some("root"), ElementLayout::new(Rect::new(0.0, 0.0, 1920.0, 1080.0)));
//! let button = host.add_element(None, ElementLayout::new(Rect::new(200.0, 40.0, 300.0, 100.0)));
//!
//! let context = ScreenScalingContext::create(
//!     host.clone(),
//!     Rc::new(MemoryStore::new()),
//!     ScreenScaleConfig::new("root", TargetWidth::fixed(960.0)),
//! )
//! .unwrap();
//! assert_eq!(context.state().effective_scale_factor(), 2.0);
//!
//! // Application code sees design-space geometry.
//! let rect = read_property(&*host, PatchTarget::Element, "getBoundingClientRect", &button);
//! assert_eq!(rect.as_rect(), Some(Rect::new(100.0, 20.0, 150.0, 50.0)));
//!
//! // Trusted code can still see physical values.
//! let physical = context.bypass(|| {
//!     read_property(&*host, PatchTarget::Window, "innerWidth", &host.window()).as_number()
//! });
//! assert_eq!(physical, Some(1920.0));
//! ```
//!
//! The crate is single-threaded and keeps per-thread state (the active
//! context and the bypass hook), so it requires `std`.

extern crate alloc;

mod bypass;
mod context;
mod engine;
mod error;
mod geometry;
pub mod host;
mod intercept;
mod listeners;
mod preference;
mod resize;
mod state;
mod style;
mod zoom;

pub use bypass::{
    BypassHook, clear_bypass_hook, has_bypass_hook, inject_bypass_hook, perform_without_scaling,
    remove_bypass_hook,
};
pub use context::{ScreenScaleConfig, ScreenScalingContext};
pub use engine::{
    DEFAULT_PORTRAIT_ASPECT_RATIO, EngineConfig, EngineDebugInfo, ViewportEngine, ViewportSource,
};
pub use error::{ScaleError, StoreError, UnsupportedReason};
pub use geometry::{
    BoxSize, ClientMetrics, ClientMetricsProvider, GeometryProvider, PointerCoordinateProvider,
    PointerCoordinates, ScaledGeometry, ViewportProvider, VisualViewport, to_design,
    to_design_box_size, to_design_client_metrics, to_design_point, to_design_pointer,
    to_design_rect, to_design_visual_viewport,
};
pub use host::{
    ElementLayout, HostFn, HostObjectModel, HostSetter, HostValue, HostViewportSource,
    MemoryHost, MemoryObject, NodeId, PatchTarget, PropertyDescriptor, StyleNode, StyleSurface,
    read_property,
};
pub use intercept::{
    Axis, HostGeometry, InterceptionRegistry, PatchEntry, PatchRecord, PatchSet, Replacement,
    Requirement, STANDARD_PATCH_SET,
};
pub use listeners::{CancellationScope, ListenerList, Subscription};
pub use preference::{
    KeyValueStore, MemoryStore, ZOOM_PREFERENCE_KEY, ZoomPreference, ZoomPreferenceStore,
    ZoomTracker,
};
pub use resize::{
    ObserveOptions, ResizeCallback, ResizeObservation, ResizeObserverBox,
    ResizeObserverConstructor, ResizeObserverEntry, ScaledResizeObserver,
};
pub use state::{
    PolicyInput, ScaleState, ScaleStateHandle, TargetWidth, TargetWidthPolicy,
    ViewportMeasurement,
};
pub use style::{ContainerStyle, Presentation, StyleApplier};
pub use zoom::{MAGNIFICATIONS, ScaleFactorTable, ZoomStep};
