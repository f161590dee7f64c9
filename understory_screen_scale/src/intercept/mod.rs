// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Interception of the host's geometry surface.
//!
//! [`InterceptionRegistry::install`] replaces every property in a
//! [`PatchSet`] with a design-space version, recording the original
//! descriptor first. [`uninstall`](InterceptionRegistry::uninstall) defines
//! the originals back, so the host is observationally identical to how it
//! was before.
//!
//! Installation is all-or-nothing: every entry is inspected and every
//! replacement built before the first property is touched. A required entry
//! that cannot be replaced fails the whole installation with
//! [`ScaleError::EnvironmentUnsupported`] and leaves the host untouched.
//!
//! Replacements never cache a factor: each call reads the live
//! [`ScaleStateHandle`].

mod patch_set;

pub use patch_set::{Axis, PatchEntry, PatchSet, Replacement, Requirement, STANDARD_PATCH_SET};

use alloc::rc::Rc;
use alloc::vec;
use alloc::vec::Vec;
use core::cell::{Cell, RefCell};
use core::fmt;

use hashbrown::HashMap;
use kurbo::{Point, Rect, Size, Vec2};

use crate::error::{ScaleError, UnsupportedReason};
use crate::geometry::{
    ClientMetrics, ClientMetricsProvider, GeometryProvider, PointerCoordinateProvider,
    PointerCoordinates, ScaledGeometry, ViewportProvider, VisualViewport,
};
use crate::host::{HostObjectModel, HostValue, PatchTarget, PropertyDescriptor};
use crate::state::ScaleStateHandle;
use patch_set::ReplacementEnv;

/// The original descriptor of one intercepted property.
#[derive(Clone, Debug)]
pub struct PatchRecord<O> {
    /// Shared object defining the property.
    pub target: PatchTarget,
    /// Property name.
    pub property: &'static str,
    /// Descriptor as it was before installation.
    pub original: PropertyDescriptor<O>,
}

type Originals<O> = HashMap<(PatchTarget, &'static str), PropertyDescriptor<O>>;

/// Physical geometry, read through the host's original descriptors.
///
/// Properties that were intercepted are read through their recorded
/// originals; everything else is read live.
pub struct HostGeometry<H: HostObjectModel> {
    host: Rc<H>,
    originals: Rc<Originals<H::Object>>,
}

impl<H: HostObjectModel> Clone for HostGeometry<H> {
    fn clone(&self) -> Self {
        Self {
            host: self.host.clone(),
            originals: self.originals.clone(),
        }
    }
}

impl<H: HostObjectModel> fmt::Debug for HostGeometry<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostGeometry")
            .field("originals", &self.originals.len())
            .finish_non_exhaustive()
    }
}

impl<H: HostObjectModel> HostGeometry<H> {
    fn live(host: Rc<H>) -> Self {
        Self {
            host,
            originals: Rc::new(HashMap::new()),
        }
    }

    fn read(
        &self,
        target: PatchTarget,
        name: &'static str,
        this: &H::Object,
    ) -> HostValue<H::Object> {
        match self.originals.get(&(target, name)) {
            Some(original) => original.resolve(this),
            None => self
                .host
                .own_property(target, name)
                .map_or(HostValue::Undefined, |descriptor| descriptor.resolve(this)),
        }
    }

    fn number(&self, target: PatchTarget, name: &'static str, this: &H::Object) -> f64 {
        self.read(target, name, this).as_number().unwrap_or(0.0)
    }

    /// Element or text range, by the object's own kind.
    fn node_target(&self, node: &H::Object) -> PatchTarget {
        match self.host.target_of(node) {
            Some(PatchTarget::TextRange) => PatchTarget::TextRange,
            _ => PatchTarget::Element,
        }
    }

    /// `innerWidth`/`innerHeight`, when the host exposes both.
    fn window_size(&self) -> Option<Size> {
        let window = self.host.window();
        let width = self
            .read(PatchTarget::Window, "innerWidth", &window)
            .as_number()?;
        let height = self
            .read(PatchTarget::Window, "innerHeight", &window)
            .as_number()?;
        Some(Size::new(width, height))
    }
}

impl<H: HostObjectModel> GeometryProvider<H::Object> for HostGeometry<H> {
    fn bounding_client_rect(&self, node: &H::Object) -> Rect {
        self.read(self.node_target(node), "getBoundingClientRect", node)
            .as_rect()
            .unwrap_or(Rect::ZERO)
    }

    fn client_rects(&self, node: &H::Object) -> Vec<Rect> {
        match self.read(self.node_target(node), "getClientRects", node) {
            HostValue::Rects(rects) => rects,
            _ => vec![self.bounding_client_rect(node)],
        }
    }
}

impl<H: HostObjectModel> ClientMetricsProvider<H::Object> for HostGeometry<H> {
    fn client_metrics(&self, node: &H::Object) -> ClientMetrics {
        let read = |name| self.number(PatchTarget::Element, name, node);
        ClientMetrics {
            left: read("clientLeft"),
            top: read("clientTop"),
            width: read("clientWidth"),
            height: read("clientHeight"),
        }
    }
}

impl<H: HostObjectModel> PointerCoordinateProvider<H::Object> for HostGeometry<H> {
    fn pointer_coordinates(&self, event: &H::Object) -> PointerCoordinates {
        let read = |name| self.number(PatchTarget::PointerEvent, name, event);
        let point = |x, y| Point::new(read(x), read(y));
        PointerCoordinates {
            client: point("clientX", "clientY"),
            page: point("pageX", "pageY"),
            layer: point("layerX", "layerY"),
            offset: point("offsetX", "offsetY"),
            screen: point("screenX", "screenY"),
            movement: Vec2::new(read("movementX"), read("movementY")),
        }
    }
}

impl<H: HostObjectModel> ViewportProvider for HostGeometry<H> {
    fn inner_size(&self) -> Size {
        self.window_size().unwrap_or(Size::ZERO)
    }

    fn visual_viewport(&self) -> Option<VisualViewport> {
        let window = self.host.window();
        self.read(PatchTarget::Window, "visualViewport", &window)
            .as_visual_viewport()
    }
}

struct Installation<H: HostObjectModel> {
    version: u32,
    records: Vec<PatchRecord<H::Object>>,
    replacements: Vec<PropertyDescriptor<H::Object>>,
    geometry: HostGeometry<H>,
    suspended: bool,
}

impl<H: HostObjectModel> Installation<H> {
    fn restore(&self, host: &H) {
        for record in self.records.iter().rev() {
            host.define_property(record.target, record.property, record.original.clone());
        }
    }

    fn apply(&self, host: &H) {
        for (record, replacement) in self.records.iter().zip(&self.replacements) {
            host.define_property(record.target, record.property, replacement.clone());
        }
    }
}

/// Installs, suspends and restores interception on a host.
pub struct InterceptionRegistry<H: HostObjectModel + 'static> {
    host: Rc<H>,
    state: ScaleStateHandle,
    installation: RefCell<Option<Installation<H>>>,
    bypass_depth: Cell<usize>,
}

impl<H: HostObjectModel + 'static> fmt::Debug for InterceptionRegistry<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptionRegistry")
            .field("installed_version", &self.installed_version())
            .field("patched", &self.record_count())
            .field("bypass_depth", &self.bypass_depth.get())
            .finish_non_exhaustive()
    }
}

impl<H: HostObjectModel + 'static> InterceptionRegistry<H> {
    /// Creates a registry for `host`; replacements will read `state`.
    #[must_use]
    pub fn new(host: Rc<H>, state: ScaleStateHandle) -> Self {
        Self {
            host,
            state,
            installation: RefCell::new(None),
            bypass_depth: Cell::new(0),
        }
    }

    /// Intercepts every entry of `patch_set`.
    ///
    /// Optional entries the host lacks (or cannot have replaced) are skipped.
    /// On error nothing has been modified.
    pub fn install(&self, patch_set: &PatchSet) -> Result<(), ScaleError> {
        if self.installation.borrow().is_some() {
            return Err(ScaleError::AlreadyInstalled);
        }

        // Inspect every entry before touching anything.
        let mut planned = Vec::with_capacity(patch_set.entries.len());
        for entry in patch_set.entries {
            let unsupported = |reason| ScaleError::EnvironmentUnsupported {
                target: entry.target,
                property: entry.property,
                reason,
            };
            let Some(original) = self.host.own_property(entry.target, entry.property) else {
                if entry.is_required() {
                    return Err(unsupported(UnsupportedReason::Missing));
                }
                tracing::debug!(
                    object = ?entry.target,
                    property = entry.property,
                    "property absent; not intercepted"
                );
                continue;
            };
            if !original.is_configurable() {
                if entry.is_required() {
                    return Err(unsupported(UnsupportedReason::NotConfigurable));
                }
                tracing::debug!(
                    object = ?entry.target,
                    property = entry.property,
                    "property not configurable; not intercepted"
                );
                continue;
            }
            planned.push((*entry, original));
        }

        let originals: Originals<H::Object> = planned
            .iter()
            .map(|(entry, original)| ((entry.target, entry.property), original.clone()))
            .collect();
        let geometry = HostGeometry {
            host: self.host.clone(),
            originals: Rc::new(originals),
        };
        let env = ReplacementEnv {
            state: self.state.clone(),
            geometry: Rc::new(ScaledGeometry::new(geometry.clone(), self.state.clone())),
        };

        let mut records = Vec::with_capacity(planned.len());
        let mut replacements = Vec::with_capacity(planned.len());
        for (entry, original) in planned {
            let Some(replacement) = entry.replacement.build(&original, &env) else {
                if entry.is_required() {
                    return Err(ScaleError::EnvironmentUnsupported {
                        target: entry.target,
                        property: entry.property,
                        reason: UnsupportedReason::WrongShape,
                    });
                }
                tracing::debug!(
                    object = ?entry.target,
                    property = entry.property,
                    "unexpected property shape; not intercepted"
                );
                continue;
            };
            records.push(PatchRecord {
                target: entry.target,
                property: entry.property,
                original,
            });
            replacements.push(replacement);
        }

        let installation = Installation {
            version: patch_set.version,
            records,
            replacements,
            geometry,
            suspended: false,
        };
        installation.apply(&self.host);
        tracing::info!(
            version = patch_set.version,
            patched = installation.records.len(),
            "geometry interception installed"
        );
        *self.installation.borrow_mut() = Some(installation);

        if self.bypass_depth.get() > 0 {
            self.suspend();
        }
        Ok(())
    }

    /// Restores every original descriptor. Does nothing when not installed.
    pub fn uninstall(&self) {
        let Some(installation) = self.installation.borrow_mut().take() else {
            return;
        };
        if !installation.suspended {
            installation.restore(&self.host);
        }
        tracing::info!(
            version = installation.version,
            restored = installation.records.len(),
            "geometry interception uninstalled"
        );
    }

    /// Returns `true` between a successful install and the next uninstall.
    #[must_use]
    pub fn is_installed(&self) -> bool {
        self.installation.borrow().is_some()
    }

    /// Version of the installed patch set.
    #[must_use]
    pub fn installed_version(&self) -> Option<u32> {
        self.installation
            .borrow()
            .as_ref()
            .map(|installation| installation.version)
    }

    /// Number of intercepted properties.
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.installation
            .borrow()
            .as_ref()
            .map_or(0, |installation| installation.records.len())
    }

    /// The original descriptors of every intercepted property.
    #[must_use]
    pub fn records(&self) -> Vec<PatchRecord<H::Object>> {
        self.installation
            .borrow()
            .as_ref()
            .map_or_else(Vec::new, |installation| installation.records.clone())
    }

    /// Returns `true` while inside [`bypass`](Self::bypass).
    #[must_use]
    pub fn is_bypassed(&self) -> bool {
        self.bypass_depth.get() > 0
    }

    /// Runs `action` with the original descriptors in place.
    ///
    /// Bypasses nest; interception comes back when the outermost one exits,
    /// whether `action` returns or unwinds.
    pub fn bypass<T>(&self, action: impl FnOnce() -> T) -> T {
        let depth = self.bypass_depth.get();
        self.bypass_depth.set(depth + 1);
        if depth == 0 {
            self.suspend();
        }
        let _resume = BypassGuard { registry: self };
        action()
    }

    fn suspend(&self) {
        let mut installation = self.installation.borrow_mut();
        if let Some(installation) = installation.as_mut().filter(|i| !i.suspended) {
            installation.restore(&self.host);
            installation.suspended = true;
            tracing::trace!("geometry interception suspended");
        }
    }

    fn resume(&self) {
        let mut installation = self.installation.borrow_mut();
        if let Some(installation) = installation.as_mut().filter(|i| i.suspended) {
            installation.apply(&self.host);
            installation.suspended = false;
            tracing::trace!("geometry interception resumed");
        }
    }

    /// Physical geometry, unaffected by interception.
    #[must_use]
    pub fn physical_geometry(&self) -> HostGeometry<H> {
        self.installation.borrow().as_ref().map_or_else(
            || HostGeometry::live(self.host.clone()),
            |installation| installation.geometry.clone(),
        )
    }

    /// Design-space geometry, whether or not interception is installed.
    #[must_use]
    pub fn geometry(&self) -> ScaledGeometry<HostGeometry<H>> {
        ScaledGeometry::new(self.physical_geometry(), self.state.clone())
    }

    /// The window's real inner size in physical units.
    ///
    /// Falls back to the measured size when the host has no inner size.
    #[must_use]
    pub fn real_inner_size(&self) -> Size {
        self.physical_geometry()
            .window_size()
            .unwrap_or_else(|| self.state.get().actual_size())
    }
}

impl<H: HostObjectModel + 'static> Drop for InterceptionRegistry<H> {
    fn drop(&mut self) {
        self.uninstall();
    }
}

struct BypassGuard<'a, H: HostObjectModel + 'static> {
    registry: &'a InterceptionRegistry<H>,
}

impl<H: HostObjectModel + 'static> Drop for BypassGuard<'_, H> {
    fn drop(&mut self) {
        let depth = self.registry.bypass_depth.get().saturating_sub(1);
        self.registry.bypass_depth.set(depth);
        if depth == 0 {
            self.registry.resume();
        }
    }
}
