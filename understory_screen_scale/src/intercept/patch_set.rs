// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The list of properties to intercept and how to replace each one.

use alloc::boxed::Box;
use alloc::rc::Rc;

use crate::geometry::GeometryProvider;
use crate::host::{HostFn, HostValue, PatchTarget, PropertyDescriptor};
use crate::resize::{ResizeCallback, ResizeObservation, ScaledResizeObserver};
use crate::state::ScaleStateHandle;

use PatchTarget::{Element, PointerEvent, ResizeObserverEntry, TextRange, Window};
use Replacement::{DesignInnerSize, ResizeObserverShim, ScaledAccessor, ScaledMethod};

/// An axis of the window's inner size.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Axis {
    /// Width.
    Horizontal,
    /// Height.
    Vertical,
}

/// How an intercepted property is replaced.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Replacement {
    /// A getter reporting the design size from the live state.
    ///
    /// The original getter is never consulted while installed.
    DesignInnerSize(Axis),
    /// A getter reporting the original getter's value in design space.
    ScaledAccessor,
    /// A method returning the original method's result in design space.
    ScaledMethod,
    /// A resize observer constructor producing [`ScaledResizeObserver`]s.
    ResizeObserverShim,
}

/// Whether an entry may be absent from the host.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Requirement {
    /// Installation fails if the property is absent or cannot be replaced.
    Required,
    /// The entry is skipped if the property is absent or cannot be replaced.
    Optional,
}

/// One property to intercept.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PatchEntry {
    /// Shared object defining the property.
    pub target: PatchTarget,
    /// Property name.
    pub property: &'static str,
    /// Replacement behavior.
    pub replacement: Replacement,
    /// What happens when the host lacks it.
    pub requirement: Requirement,
}

impl PatchEntry {
    /// A required entry.
    #[must_use]
    pub const fn required(
        target: PatchTarget,
        property: &'static str,
        replacement: Replacement,
    ) -> Self {
        Self {
            target,
            property,
            replacement,
            requirement: Requirement::Required,
        }
    }

    /// An optional entry.
    #[must_use]
    pub const fn optional(
        target: PatchTarget,
        property: &'static str,
        replacement: Replacement,
    ) -> Self {
        Self {
            target,
            property,
            replacement,
            requirement: Requirement::Optional,
        }
    }

    /// Returns `true` for [`Requirement::Required`].
    #[must_use]
    pub fn is_required(&self) -> bool {
        self.requirement == Requirement::Required
    }
}

/// A versioned list of patch entries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PatchSet {
    /// Bumped whenever entries are added or removed.
    pub version: u32,
    /// Entries, installed in order and restored in reverse.
    pub entries: &'static [PatchEntry],
}

impl Default for PatchSet {
    fn default() -> Self {
        STANDARD_PATCH_SET
    }
}

const STANDARD_ENTRIES: [PatchEntry; 30] = [
    PatchEntry::optional(Window, "innerWidth", DesignInnerSize(Axis::Horizontal)),
    PatchEntry::optional(Window, "innerHeight", DesignInnerSize(Axis::Vertical)),
    PatchEntry::optional(Window, "visualViewport", ScaledAccessor),
    PatchEntry::optional(Window, "ResizeObserver", ResizeObserverShim),
    PatchEntry::required(Element, "getBoundingClientRect", ScaledMethod),
    PatchEntry::optional(Element, "getClientRects", ScaledMethod),
    PatchEntry::optional(Element, "clientLeft", ScaledAccessor),
    PatchEntry::optional(Element, "clientTop", ScaledAccessor),
    PatchEntry::required(Element, "clientWidth", ScaledAccessor),
    PatchEntry::required(Element, "clientHeight", ScaledAccessor),
    PatchEntry::optional(TextRange, "getBoundingClientRect", ScaledMethod),
    PatchEntry::optional(TextRange, "getClientRects", ScaledMethod),
    PatchEntry::optional(ResizeObserverEntry, "contentRect", ScaledAccessor),
    PatchEntry::optional(ResizeObserverEntry, "borderBoxSize", ScaledAccessor),
    PatchEntry::optional(ResizeObserverEntry, "contentBoxSize", ScaledAccessor),
    PatchEntry::optional(
        ResizeObserverEntry,
        "devicePixelContentBoxSize",
        ScaledAccessor,
    ),
    PatchEntry::required(PointerEvent, "clientX", ScaledAccessor),
    PatchEntry::required(PointerEvent, "clientY", ScaledAccessor),
    PatchEntry::optional(PointerEvent, "x", ScaledAccessor),
    PatchEntry::optional(PointerEvent, "y", ScaledAccessor),
    PatchEntry::optional(PointerEvent, "pageX", ScaledAccessor),
    PatchEntry::optional(PointerEvent, "pageY", ScaledAccessor),
    PatchEntry::optional(PointerEvent, "layerX", ScaledAccessor),
    PatchEntry::optional(PointerEvent, "layerY", ScaledAccessor),
    PatchEntry::optional(PointerEvent, "offsetX", ScaledAccessor),
    PatchEntry::optional(PointerEvent, "offsetY", ScaledAccessor),
    PatchEntry::optional(PointerEvent, "screenX", ScaledAccessor),
    PatchEntry::optional(PointerEvent, "screenY", ScaledAccessor),
    PatchEntry::optional(PointerEvent, "movementX", ScaledAccessor),
    PatchEntry::optional(PointerEvent, "movementY", ScaledAccessor),
];

/// Every geometry and pointer property a browser-like host exposes.
pub const STANDARD_PATCH_SET: PatchSet = PatchSet {
    version: 1,
    entries: &STANDARD_ENTRIES,
};

/// What replacements read at call time.
pub(crate) struct ReplacementEnv<O> {
    pub(crate) state: ScaleStateHandle,
    pub(crate) geometry: Rc<dyn GeometryProvider<O>>,
}

impl Replacement {
    /// Builds the replacement descriptor for `original`.
    ///
    /// Returns `None` when `original` does not have the shape this
    /// replacement expects (for example a getter where a method was
    /// expected).
    pub(crate) fn build<O: Clone + PartialEq + 'static>(
        self,
        original: &PropertyDescriptor<O>,
        env: &ReplacementEnv<O>,
    ) -> Option<PropertyDescriptor<O>> {
        let enumerable = original.is_enumerable();
        match self {
            Self::DesignInnerSize(axis) => {
                original.getter_fn()?;
                let state = env.state.clone();
                Some(read_only_accessor(enumerable, move |_| {
                    let size = state.get().inner_size();
                    HostValue::Number(match axis {
                        Axis::Horizontal => size.width,
                        Axis::Vertical => size.height,
                    })
                }))
            }
            Self::ScaledAccessor => {
                let get = original.getter_fn()?.clone();
                let state = env.state.clone();
                Some(read_only_accessor(enumerable, move |this| {
                    get(this).to_design(state.effective_scale_factor())
                }))
            }
            Self::ScaledMethod => {
                let method = original.method_fn()?.clone();
                let state = env.state.clone();
                let scaled: HostFn<O> =
                    Rc::new(move |this: &O| method(this).to_design(state.effective_scale_factor()));
                Some(PropertyDescriptor::Data {
                    value: HostValue::Method(scaled),
                    writable: false,
                    enumerable,
                    configurable: true,
                })
            }
            Self::ResizeObserverShim => {
                let PropertyDescriptor::Data {
                    value: HostValue::ResizeObserver(native),
                    ..
                } = original
                else {
                    return None;
                };
                let native = native.clone();
                let state = env.state.clone();
                let geometry = env.geometry.clone();
                Some(PropertyDescriptor::Data {
                    value: HostValue::ResizeObserver(Rc::new(move |callback: ResizeCallback<O>| {
                        Box::new(ScaledResizeObserver::new(
                            &native,
                            callback,
                            state.clone(),
                            geometry.clone(),
                        )) as Box<dyn ResizeObservation<O>>
                    })),
                    writable: false,
                    enumerable,
                    configurable: true,
                })
            }
        }
    }
}

fn read_only_accessor<O>(
    enumerable: bool,
    get: impl Fn(&O) -> HostValue<O> + 'static,
) -> PropertyDescriptor<O> {
    PropertyDescriptor::Accessor {
        get: Some(Rc::new(get)),
        set: None,
        enumerable,
        configurable: true,
    }
}
