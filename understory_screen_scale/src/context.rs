// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The top-level handle wiring every component to one host.

use alloc::borrow::Cow;
use alloc::rc::{Rc, Weak};
use alloc::string::String;
use core::cell::Cell;
use core::fmt;

use kurbo::Size;

use crate::bypass::{BypassHook, inject_bypass_hook, remove_bypass_hook};
use crate::engine::{DEFAULT_PORTRAIT_ASPECT_RATIO, EngineConfig, ViewportEngine};
use crate::error::ScaleError;
use crate::geometry::ScaledGeometry;
use crate::host::{HostObjectModel, HostViewportSource, StyleSurface};
use crate::intercept::{HostGeometry, InterceptionRegistry, PatchSet, STANDARD_PATCH_SET};
use crate::listeners::{CancellationScope, ListenerList, Subscription};
use crate::preference::{
    KeyValueStore, ZOOM_PREFERENCE_KEY, ZoomPreference, ZoomPreferenceStore, ZoomTracker,
};
use crate::state::{ScaleState, ScaleStateHandle, TargetWidth};
use crate::style::{Presentation, StyleApplier};

std::thread_local! {
    static ACTIVE: Cell<bool> = const { Cell::new(false) };
}

/// Configuration of a [`ScreenScalingContext`].
#[derive(Clone, Debug)]
pub struct ScreenScaleConfig {
    /// Id of the application root element.
    pub root_element_id: String,
    /// How the design width is chosen.
    pub target_width: TargetWidth,
    /// A viewport is portrait when `width * portrait_aspect_ratio < height`.
    pub portrait_aspect_ratio: f64,
    /// Key of the persisted zoom preference.
    pub storage_key: Cow<'static, str>,
    /// Properties to intercept.
    pub patch_set: PatchSet,
}

impl ScreenScaleConfig {
    /// Configuration with default heuristics, storage key and patch set.
    #[must_use]
    pub fn new(root_element_id: impl Into<String>, target_width: TargetWidth) -> Self {
        Self {
            root_element_id: root_element_id.into(),
            target_width,
            portrait_aspect_ratio: DEFAULT_PORTRAIT_ASPECT_RATIO,
            storage_key: Cow::Borrowed(ZOOM_PREFERENCE_KEY),
            patch_set: STANDARD_PATCH_SET,
        }
    }

    /// Sets the portrait aspect ratio.
    #[must_use]
    pub fn with_portrait_aspect_ratio(mut self, ratio: f64) -> Self {
        self.portrait_aspect_ratio = ratio;
        self
    }

    /// Sets the key of the persisted zoom preference.
    #[must_use]
    pub fn with_storage_key(mut self, key: impl Into<Cow<'static, str>>) -> Self {
        self.storage_key = key.into();
        self
    }

    /// Sets the properties to intercept.
    #[must_use]
    pub fn with_patch_set(mut self, patch_set: PatchSet) -> Self {
        self.patch_set = patch_set;
        self
    }
}

/// Screen scaling for one host, from creation to disposal.
///
/// At most one context is alive per thread. Creating it starts the engine,
/// installs interception, sets up the page styles and routes
/// [`perform_without_scaling`](crate::perform_without_scaling) through its
/// registry. Dropping it (or calling [`dispose`](Self::dispose)) undoes all
/// of that and severs every listener.
pub struct ScreenScalingContext<H: HostObjectModel + StyleSurface + 'static> {
    host: Rc<H>,
    engine: ViewportEngine,
    registry: Rc<InterceptionRegistry<H>>,
    styles: Rc<StyleApplier<H>>,
    out_of_range: ListenerList<bool>,
    scope: CancellationScope,
    bypass_hook: BypassHook,
    disposed: Cell<bool>,
}

impl<H: HostObjectModel + StyleSurface + 'static> fmt::Debug for ScreenScalingContext<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScreenScalingContext")
            .field("engine", &self.engine)
            .field("registry", &self.registry)
            .field("styles", &self.styles)
            .field("disposed", &self.disposed.get())
            .finish_non_exhaustive()
    }
}

impl<H: HostObjectModel + StyleSurface + 'static> ScreenScalingContext<H> {
    /// Starts screen scaling on `host`.
    ///
    /// Fails without side effects when a context is already alive on this
    /// thread, the root element is missing, or the host lacks a required
    /// accessor. A zoom step reconciled from storage is only written back
    /// once creation has succeeded.
    pub fn create(
        host: Rc<H>,
        store: Rc<dyn KeyValueStore>,
        config: ScreenScaleConfig,
    ) -> Result<Self, ScaleError> {
        if ACTIVE.with(Cell::get) {
            return Err(ScaleError::ContextAlreadyActive);
        }
        if host.element_by_id(&config.root_element_id).is_none() {
            return Err(ScaleError::MissingRootElement {
                id: config.root_element_id,
            });
        }

        let source = HostViewportSource::capture(&*host)?;
        let zoom = ZoomTracker::load(
            ZoomPreferenceStore::new(store, config.storage_key),
            host.device_pixel_density(),
        );
        let engine = ViewportEngine::start(
            source.boxed(),
            zoom,
            EngineConfig::new(config.target_width)
                .with_portrait_aspect_ratio(config.portrait_aspect_ratio),
        );

        let registry = Rc::new(InterceptionRegistry::new(host.clone(), engine.state_handle()));
        registry.install(&config.patch_set)?;

        let styles = Rc::new(StyleApplier::new(host.clone()));
        let initial = engine.current_state();
        styles.attach(&initial);

        let scope = CancellationScope::new();
        let handle = engine.state_handle();
        {
            let styles = styles.clone();
            let _ = handle.subscribe_scoped(&scope, move |state| {
                styles.apply(state);
            });
        }
        let out_of_range = ListenerList::new();
        {
            let out_of_range = out_of_range.clone();
            let last = Cell::new(initial.is_out_of_range());
            let _ = handle.subscribe_scoped(&scope, move |state| {
                let now = state.is_out_of_range();
                if last.replace(now) != now {
                    out_of_range.notify(&now);
                }
            });
        }

        let weak: Weak<InterceptionRegistry<H>> = Rc::downgrade(&registry);
        let bypass_hook = inject_bypass_hook(move |action| match weak.upgrade() {
            Some(registry) => registry.bypass(action),
            None => action(),
        });

        engine.persist_zoom_preference();
        ACTIVE.with(|active| active.set(true));
        tracing::info!(
            root = %config.root_element_id,
            state = ?initial,
            "screen scaling context created"
        );
        Ok(Self {
            host,
            engine,
            registry,
            styles,
            out_of_range,
            scope,
            bypass_hook,
            disposed: Cell::new(false),
        })
    }

    /// The latest state.
    #[must_use]
    pub fn state(&self) -> ScaleState {
        self.engine.current_state()
    }

    /// A shared handle to the live state.
    #[must_use]
    pub fn state_handle(&self) -> ScaleStateHandle {
        self.engine.state_handle()
    }

    /// What the application should currently show.
    #[must_use]
    pub fn presentation(&self) -> Presentation {
        Presentation::for_state(&self.state())
    }

    /// The current zoom preference.
    #[must_use]
    pub fn zoom_preference(&self) -> ZoomPreference {
        self.engine.zoom_preference()
    }

    /// Listens to every published state.
    pub fn on_state_change(&self, listener: impl Fn(&ScaleState) + 'static) -> Subscription {
        self.engine.on_state_change(listener)
    }

    /// Listens to flips between in range (`false`) and out of range (`true`).
    pub fn on_out_of_range_change(&self, listener: impl Fn(bool) + 'static) -> Subscription {
        self.out_of_range.subscribe(move |out| listener(*out))
    }

    /// Host resize notification.
    pub fn handle_resize(&self) {
        self.engine.handle_resize();
    }

    /// Host device pixel density notification; reads the density from the
    /// host.
    pub fn handle_density_change(&self) {
        let density = self.host.device_pixel_density();
        self.engine.handle_density_change(density);
    }

    /// Runs `action` with interception bypassed.
    pub fn bypass<T>(&self, action: impl FnOnce() -> T) -> T {
        self.registry.bypass(action)
    }

    /// The window's real inner size in physical units.
    #[must_use]
    pub fn real_inner_size(&self) -> Size {
        self.registry.real_inner_size()
    }

    /// Design-space geometry of the host.
    #[must_use]
    pub fn geometry(&self) -> ScaledGeometry<HostGeometry<H>> {
        self.registry.geometry()
    }

    /// The engine.
    #[must_use]
    pub fn engine(&self) -> &ViewportEngine {
        &self.engine
    }

    /// The interception registry.
    #[must_use]
    pub fn registry(&self) -> &InterceptionRegistry<H> {
        &self.registry
    }

    /// Returns `true` after [`dispose`](Self::dispose).
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed.get()
    }

    /// Stops scaling and restores the host. Later calls do nothing.
    pub fn dispose(&self) {
        if self.disposed.replace(true) {
            return;
        }
        self.scope.cancel();
        self.out_of_range.clear();
        self.engine.stop();
        self.registry.uninstall();
        self.styles.restore();
        let _ = remove_bypass_hook(&self.bypass_hook);
        ACTIVE.with(|active| active.set(false));
        tracing::info!("screen scaling context disposed");
    }
}

impl<H: HostObjectModel + StyleSurface + 'static> Drop for ScreenScalingContext<H> {
    fn drop(&mut self) {
        self.dispose();
    }
}
