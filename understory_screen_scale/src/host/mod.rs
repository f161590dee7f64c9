// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The host environment boundary.
//!
//! The host (a browser binding, an embedded script engine, or
//! [`MemoryHost`]) exposes its geometry surface as shared objects
//! ("prototypes", identified by [`PatchTarget`]) carrying named properties.
//! Each property is described by a [`PropertyDescriptor`]: either a plain
//! value or an accessor pair, plus attribute flags. Methods are plain values
//! holding a callable.
//!
//! Interception works purely through this boundary: read the current
//! descriptor, define a replacement, and later define the original back.

use alloc::boxed::Box;
use alloc::rc::Rc;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use kurbo::Rect;

use crate::engine::ViewportSource;
use crate::error::{ScaleError, UnsupportedReason};
use crate::geometry::{
    BoxSize, VisualViewport, to_design, to_design_box_size, to_design_rect,
    to_design_visual_viewport,
};
use crate::resize::ResizeObserverConstructor;
use crate::state::ViewportMeasurement;

pub mod memory;

pub use memory::{ElementLayout, MemoryHost, MemoryObject, NodeId};

/// A shared host object whose properties can be intercepted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PatchTarget {
    /// The global window object.
    Window,
    /// Shared behavior of every element.
    Element,
    /// Shared behavior of text ranges.
    TextRange,
    /// Shared behavior of resize observation entries.
    ResizeObserverEntry,
    /// Shared behavior of pointer (mouse) events.
    PointerEvent,
}

/// A getter, or a zero-argument method, invoked on a receiver.
pub type HostFn<O> = Rc<dyn Fn(&O) -> HostValue<O>>;

/// A setter invoked on a receiver.
pub type HostSetter<O> = Rc<dyn Fn(&O, HostValue<O>)>;

/// A value flowing through the host surface.
pub enum HostValue<O> {
    /// No value.
    Undefined,
    /// A number (lengths, coordinates).
    Number(f64),
    /// A single rectangle (`DOMRect`).
    Rect(Rect),
    /// A rectangle list (`DOMRectList`).
    Rects(Vec<Rect>),
    /// A box size list (resize observation sizes).
    BoxSizes(Vec<BoxSize>),
    /// A visual viewport object.
    VisualViewport(VisualViewport),
    /// A callable taking only its receiver.
    Method(HostFn<O>),
    /// A resize observation constructor.
    ResizeObserver(ResizeObserverConstructor<O>),
}

impl<O> Clone for HostValue<O> {
    fn clone(&self) -> Self {
        match self {
            Self::Undefined => Self::Undefined,
            Self::Number(n) => Self::Number(*n),
            Self::Rect(r) => Self::Rect(*r),
            Self::Rects(r) => Self::Rects(r.clone()),
            Self::BoxSizes(s) => Self::BoxSizes(s.clone()),
            Self::VisualViewport(v) => Self::VisualViewport(*v),
            Self::Method(f) => Self::Method(f.clone()),
            Self::ResizeObserver(c) => Self::ResizeObserver(c.clone()),
        }
    }
}

impl<O> fmt::Debug for HostValue<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undefined => f.write_str("Undefined"),
            Self::Number(n) => f.debug_tuple("Number").field(n).finish(),
            Self::Rect(r) => f.debug_tuple("Rect").field(r).finish(),
            Self::Rects(r) => f.debug_tuple("Rects").field(r).finish(),
            Self::BoxSizes(s) => f.debug_tuple("BoxSizes").field(s).finish(),
            Self::VisualViewport(v) => f.debug_tuple("VisualViewport").field(v).finish(),
            Self::Method(_) => f.write_str("Method(..)"),
            Self::ResizeObserver(_) => f.write_str("ResizeObserver(..)"),
        }
    }
}

impl<O> HostValue<O> {
    /// The number, if this is one.
    #[must_use]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// The rectangle, if this is one.
    #[must_use]
    pub fn as_rect(&self) -> Option<Rect> {
        match self {
            Self::Rect(r) => Some(*r),
            _ => None,
        }
    }

    /// The rectangle list, if this is one.
    #[must_use]
    pub fn as_rects(&self) -> Option<&[Rect]> {
        match self {
            Self::Rects(r) => Some(r),
            _ => None,
        }
    }

    /// The visual viewport, if this is one.
    #[must_use]
    pub fn as_visual_viewport(&self) -> Option<VisualViewport> {
        match self {
            Self::VisualViewport(v) => Some(*v),
            _ => None,
        }
    }

    /// Translates every geometric payload into design space.
    ///
    /// Callables and `Undefined` are returned unchanged.
    #[must_use]
    pub fn to_design(self, factor: f64) -> Self {
        match self {
            Self::Number(n) => Self::Number(to_design(n, factor)),
            Self::Rect(r) => Self::Rect(to_design_rect(r, factor)),
            Self::Rects(rects) => Self::Rects(
                rects
                    .into_iter()
                    .map(|r| to_design_rect(r, factor))
                    .collect(),
            ),
            Self::BoxSizes(sizes) => Self::BoxSizes(
                sizes
                    .into_iter()
                    .map(|s| to_design_box_size(s, factor))
                    .collect(),
            ),
            Self::VisualViewport(v) => Self::VisualViewport(to_design_visual_viewport(v, factor)),
            other => other,
        }
    }

    /// Observational identity: same payload, or the very same callable.
    #[must_use]
    pub fn same_as(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Undefined, Self::Undefined) => true,
            (Self::Number(a), Self::Number(b)) => a.to_bits() == b.to_bits(),
            (Self::Rect(a), Self::Rect(b)) => a == b,
            (Self::Rects(a), Self::Rects(b)) => a == b,
            (Self::BoxSizes(a), Self::BoxSizes(b)) => a == b,
            (Self::VisualViewport(a), Self::VisualViewport(b)) => a == b,
            (Self::Method(a), Self::Method(b)) => Rc::ptr_eq(a, b),
            (Self::ResizeObserver(a), Self::ResizeObserver(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// Description of one property: a value or an accessor pair, with flags.
pub enum PropertyDescriptor<O> {
    /// A stored value.
    Data {
        /// The value.
        value: HostValue<O>,
        /// Whether assignment replaces the value.
        writable: bool,
        /// Whether the property shows up in enumeration.
        enumerable: bool,
        /// Whether the property can be redefined.
        configurable: bool,
    },
    /// A getter/setter pair.
    Accessor {
        /// Getter, if any.
        get: Option<HostFn<O>>,
        /// Setter, if any. Without one, writes are ignored.
        set: Option<HostSetter<O>>,
        /// Whether the property shows up in enumeration.
        enumerable: bool,
        /// Whether the property can be redefined.
        configurable: bool,
    },
}

impl<O> Clone for PropertyDescriptor<O> {
    fn clone(&self) -> Self {
        match self {
            Self::Data {
                value,
                writable,
                enumerable,
                configurable,
            } => Self::Data {
                value: value.clone(),
                writable: *writable,
                enumerable: *enumerable,
                configurable: *configurable,
            },
            Self::Accessor {
                get,
                set,
                enumerable,
                configurable,
            } => Self::Accessor {
                get: get.clone(),
                set: set.clone(),
                enumerable: *enumerable,
                configurable: *configurable,
            },
        }
    }
}

impl<O> fmt::Debug for PropertyDescriptor<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Data {
                value,
                writable,
                enumerable,
                configurable,
            } => f
                .debug_struct("Data")
                .field("value", value)
                .field("writable", writable)
                .field("enumerable", enumerable)
                .field("configurable", configurable)
                .finish(),
            Self::Accessor {
                get,
                set,
                enumerable,
                configurable,
            } => f
                .debug_struct("Accessor")
                .field("get", &get.is_some())
                .field("set", &set.is_some())
                .field("enumerable", enumerable)
                .field("configurable", configurable)
                .finish(),
        }
    }
}

impl<O> PropertyDescriptor<O> {
    /// A read-only, enumerable, configurable accessor.
    #[must_use]
    pub fn getter(get: impl Fn(&O) -> HostValue<O> + 'static) -> Self {
        Self::Accessor {
            get: Some(Rc::new(get)),
            set: None,
            enumerable: true,
            configurable: true,
        }
    }

    /// A writable, enumerable, configurable method.
    #[must_use]
    pub fn method(method: impl Fn(&O) -> HostValue<O> + 'static) -> Self {
        Self::Data {
            value: HostValue::Method(Rc::new(method)),
            writable: true,
            enumerable: true,
            configurable: true,
        }
    }

    /// A writable, enumerable, configurable value.
    #[must_use]
    pub fn value(value: HostValue<O>) -> Self {
        Self::Data {
            value,
            writable: true,
            enumerable: true,
            configurable: true,
        }
    }

    /// Whether the property can be redefined.
    #[must_use]
    pub fn is_configurable(&self) -> bool {
        match self {
            Self::Data { configurable, .. } | Self::Accessor { configurable, .. } => *configurable,
        }
    }

    /// Whether the property shows up in enumeration.
    #[must_use]
    pub fn is_enumerable(&self) -> bool {
        match self {
            Self::Data { enumerable, .. } | Self::Accessor { enumerable, .. } => *enumerable,
        }
    }

    /// The getter of an accessor.
    #[must_use]
    pub fn getter_fn(&self) -> Option<&HostFn<O>> {
        match self {
            Self::Accessor { get, .. } => get.as_ref(),
            Self::Data { .. } => None,
        }
    }

    /// The callable of a method.
    #[must_use]
    pub fn method_fn(&self) -> Option<&HostFn<O>> {
        match self {
            Self::Data {
                value: HostValue::Method(method),
                ..
            } => Some(method),
            _ => None,
        }
    }

    /// Reads the property on `this`: runs the getter, calls a zero-argument
    /// method, or returns the stored value.
    #[must_use]
    pub fn resolve(&self, this: &O) -> HostValue<O> {
        match self {
            Self::Data {
                value: HostValue::Method(method),
                ..
            } => method(this),
            Self::Data { value, .. } => value.clone(),
            Self::Accessor { get: Some(get), .. } => get(this),
            Self::Accessor { get: None, .. } => HostValue::Undefined,
        }
    }

    /// Observational identity with `other`: same kind, same flags, same
    /// callables (by pointer) and same values.
    #[must_use]
    pub fn same_as(&self, other: &Self) -> bool {
        fn same_fn<T: ?Sized>(a: Option<&Rc<T>>, b: Option<&Rc<T>>) -> bool {
            match (a, b) {
                (None, None) => true,
                (Some(a), Some(b)) => Rc::ptr_eq(a, b),
                _ => false,
            }
        }
        match (self, other) {
            (
                Self::Data {
                    value: va,
                    writable: wa,
                    enumerable: ea,
                    configurable: ca,
                },
                Self::Data {
                    value: vb,
                    writable: wb,
                    enumerable: eb,
                    configurable: cb,
                },
            ) => wa == wb && ea == eb && ca == cb && va.same_as(vb),
            (
                Self::Accessor {
                    get: ga,
                    set: sa,
                    enumerable: ea,
                    configurable: ca,
                },
                Self::Accessor {
                    get: gb,
                    set: sb,
                    enumerable: eb,
                    configurable: cb,
                },
            ) => {
                ea == eb
                    && ca == cb
                    && same_fn(ga.as_ref(), gb.as_ref())
                    && same_fn(sa.as_ref(), sb.as_ref())
            }
            _ => false,
        }
    }
}

/// The host's object model, as far as screen scaling needs it.
///
/// Hosts are single-threaded and mutate through shared references, like the
/// script objects they usually wrap.
pub trait HostObjectModel {
    /// Handle to a host object (window, element, range, entry, event).
    type Object: Clone + PartialEq + 'static;

    /// The descriptor of `name` defined directly on `target`.
    fn own_property(
        &self,
        target: PatchTarget,
        name: &str,
    ) -> Option<PropertyDescriptor<Self::Object>>;

    /// Defines (or redefines) `name` on `target`.
    fn define_property(
        &self,
        target: PatchTarget,
        name: &'static str,
        descriptor: PropertyDescriptor<Self::Object>,
    );

    /// Which shared object `object` takes its behavior from.
    fn target_of(&self, object: &Self::Object) -> Option<PatchTarget>;

    /// The window object.
    fn window(&self) -> Self::Object;

    /// The document's root content element.
    fn document_element(&self) -> Self::Object;

    /// Looks up an element by id.
    fn element_by_id(&self, id: &str) -> Option<Self::Object>;

    /// Current device pixel density.
    fn device_pixel_density(&self) -> f64;
}

/// Reads `name` on `this` the way script code would: through whatever
/// descriptor `target` currently defines.
pub fn read_property<H: HostObjectModel + ?Sized>(
    host: &H,
    target: PatchTarget,
    name: &str,
    this: &H::Object,
) -> HostValue<H::Object> {
    host.own_property(target, name)
        .map_or(HostValue::Undefined, |descriptor| descriptor.resolve(this))
}

/// Captures the getter of a required accessor.
pub(crate) fn required_getter<H: HostObjectModel + ?Sized>(
    host: &H,
    target: PatchTarget,
    property: &'static str,
) -> Result<HostFn<H::Object>, ScaleError> {
    let unsupported = |reason| ScaleError::EnvironmentUnsupported {
        target,
        property,
        reason,
    };
    let descriptor = host
        .own_property(target, property)
        .ok_or_else(|| unsupported(UnsupportedReason::Missing))?;
    descriptor
        .getter_fn()
        .cloned()
        .ok_or_else(|| unsupported(UnsupportedReason::WrongShape))
}

/// Measures the document's root content element with the host's original
/// `clientWidth`/`clientHeight` getters.
///
/// The getters are captured once, before anything is intercepted, so later
/// interception never feeds design-space values back into the engine.
pub struct HostViewportSource<O> {
    element: O,
    width: HostFn<O>,
    height: HostFn<O>,
}

impl<O> fmt::Debug for HostViewportSource<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostViewportSource").finish_non_exhaustive()
    }
}

impl<O: Clone + 'static> HostViewportSource<O> {
    /// Captures the measurement accessors.
    ///
    /// Fails with [`ScaleError::EnvironmentUnsupported`] when the host does
    /// not expose them as getters.
    pub fn capture<H>(host: &H) -> Result<Self, ScaleError>
    where
        H: HostObjectModel<Object = O> + ?Sized,
    {
        Ok(Self {
            element: host.document_element(),
            width: required_getter(host, PatchTarget::Element, "clientWidth")?,
            height: required_getter(host, PatchTarget::Element, "clientHeight")?,
        })
    }

    /// Boxes this source for [`ViewportEngine::start`](crate::ViewportEngine::start).
    #[must_use]
    pub fn boxed(self) -> Box<dyn ViewportSource> {
        Box::new(self)
    }
}

impl<O> ViewportSource for HostViewportSource<O> {
    fn measure(&self) -> ViewportMeasurement {
        let width = (self.width)(&self.element).as_number().unwrap_or(0.0);
        let height = (self.height)(&self.element).as_number().unwrap_or(0.0);
        ViewportMeasurement::new(width, height)
    }
}

/// Element whose inline style is touched by the style applier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StyleNode {
    /// The document element (`<html>`).
    Document,
    /// The scaled container (`<body>`).
    Container,
    /// The application root element.
    Root,
}

/// Inline style access on the few elements the style applier manages.
pub trait StyleSurface {
    /// Current inline value of `name` on `node`; empty when unset.
    fn style_property(&self, node: StyleNode, name: &str) -> String;

    /// Sets the inline value of `name` on `node`; an empty value unsets it.
    fn set_style_property(&self, node: StyleNode, name: &str, value: &str);
}
