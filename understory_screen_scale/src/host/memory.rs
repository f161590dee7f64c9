// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! An in-memory host with a browser-shaped geometry surface.
//!
//! [`MemoryHost`] models a window, a document element, further elements by
//! id, text ranges, pointer events and native resize observation. Its layout
//! is set explicitly; nothing is computed. It is meant for tests and for
//! headless embedding.

use alloc::borrow::ToOwned;
use alloc::boxed::Box;
use alloc::rc::{Rc, Weak};
use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;
use core::cell::RefCell;
use core::fmt;

use hashbrown::HashMap;
use kurbo::{Rect, Size};

use super::{
    HostObjectModel, HostValue, PatchTarget, PropertyDescriptor, StyleNode, StyleSurface,
};
use crate::geometry::{BoxSize, ClientMetrics, PointerCoordinates, VisualViewport};
use crate::resize::{
    ObserveOptions, ResizeCallback, ResizeObservation, ResizeObserverConstructor,
    ResizeObserverEntry,
};

/// Identifier of an element or text range in a [`MemoryHost`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

/// A handle to an object living in a [`MemoryHost`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MemoryObject {
    /// The window.
    Window,
    /// An element.
    Element(NodeId),
    /// A text range.
    TextRange(NodeId),
    /// A resize observation entry describing an element.
    ResizeEntry(NodeId),
    /// A pointer event.
    Pointer(u32),
}

/// Layout of one element.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ElementLayout {
    /// Border box in client coordinates.
    pub bounds: Rect,
    /// Client area metrics.
    pub client: ClientMetrics,
    /// Line boxes; the bounds alone when empty.
    pub fragments: Vec<Rect>,
}

impl ElementLayout {
    /// A borderless element covering `bounds`.
    #[must_use]
    pub fn new(bounds: Rect) -> Self {
        Self {
            bounds,
            client: ClientMetrics {
                left: 0.0,
                top: 0.0,
                width: bounds.width(),
                height: bounds.height(),
            },
            fragments: Vec::new(),
        }
    }

    fn rects(&self) -> Vec<Rect> {
        if self.fragments.is_empty() {
            vec![self.bounds]
        } else {
            self.fragments.clone()
        }
    }
}

/// The document element always exists with this id.
const DOCUMENT_ELEMENT: NodeId = NodeId(0);

struct ObserverState {
    callback: ResizeCallback<MemoryObject>,
    targets: Vec<MemoryObject>,
}

#[derive(Default)]
struct World {
    inner_size: Size,
    device_pixel_density: f64,
    visual_viewport: Option<VisualViewport>,
    next_id: u32,
    elements: HashMap<NodeId, ElementLayout>,
    ids: HashMap<String, NodeId>,
    ranges: HashMap<NodeId, Vec<Rect>>,
    pointers: HashMap<u32, PointerCoordinates>,
    observers: Vec<Weak<RefCell<ObserverState>>>,
}

impl World {
    fn with_element(
        &self,
        object: &MemoryObject,
        f: impl FnOnce(&ElementLayout) -> HostValue<MemoryObject>,
    ) -> HostValue<MemoryObject> {
        self.element(object).map_or(HostValue::Undefined, f)
    }

    fn element(&self, object: &MemoryObject) -> Option<&ElementLayout> {
        match object {
            MemoryObject::Element(id) | MemoryObject::ResizeEntry(id) => self.elements.get(id),
            _ => None,
        }
    }

    fn pointer(&self, object: &MemoryObject) -> Option<PointerCoordinates> {
        match object {
            MemoryObject::Pointer(id) => self.pointers.get(id).copied(),
            _ => None,
        }
    }

    fn allocate(&mut self) -> NodeId {
        self.next_id += 1;
        NodeId(self.next_id)
    }
}

type Shared = Rc<RefCell<World>>;

/// A native resize observer of a [`MemoryHost`].
struct MemoryResizeObserver {
    state: Rc<RefCell<ObserverState>>,
}

impl ResizeObservation<MemoryObject> for MemoryResizeObserver {
    fn observe(&mut self, target: MemoryObject, _options: ObserveOptions) {
        let mut state = self.state.borrow_mut();
        if !state.targets.contains(&target) {
            state.targets.push(target);
        }
    }

    fn unobserve(&mut self, target: &MemoryObject) {
        self.state.borrow_mut().targets.retain(|t| t != target);
    }

    fn disconnect(&mut self) {
        self.state.borrow_mut().targets.clear();
    }
}

/// An in-memory host.
///
/// Every shared object starts with the standard surface defined as a browser
/// would: geometry methods as writable data properties, lengths and
/// coordinates as getter-only accessors, all configurable.
pub struct MemoryHost {
    world: Shared,
    properties: RefCell<HashMap<(PatchTarget, &'static str), PropertyDescriptor<MemoryObject>>>,
    styles: RefCell<HashMap<(StyleNode, String), String>>,
}

impl fmt::Debug for MemoryHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let world = self.world.borrow();
        f.debug_struct("MemoryHost")
            .field("inner_size", &world.inner_size)
            .field("device_pixel_density", &world.device_pixel_density)
            .field("elements", &world.elements.len())
            .field("properties", &self.properties.borrow().len())
            .finish_non_exhaustive()
    }
}

fn number(value: f64) -> HostValue<MemoryObject> {
    HostValue::Number(value)
}

impl MemoryHost {
    /// A host whose window (and document element) measures `inner_size`,
    /// with the full standard geometry surface defined.
    #[must_use]
    pub fn new(inner_size: Size) -> Self {
        let host = Self::empty(inner_size);
        host.define_standard_surface();
        host
    }

    /// A host with layout but no properties defined.
    #[must_use]
    pub fn empty(inner_size: Size) -> Self {
        let mut world = World {
            device_pixel_density: 1.0,
            ..World::default()
        };
        world.elements.insert(
            DOCUMENT_ELEMENT,
            ElementLayout::new(Rect::from_origin_size((0.0, 0.0), inner_size)),
        );
        world.inner_size = inner_size;
        Self {
            world: Rc::new(RefCell::new(world)),
            properties: RefCell::new(HashMap::new()),
            styles: RefCell::new(HashMap::new()),
        }
    }

    fn define_standard_surface(&self) {
        use PatchTarget::{Element, PointerEvent, ResizeObserverEntry, TextRange, Window};

        let world = &self.world;
        let getter = |f: fn(&World, &MemoryObject) -> HostValue<MemoryObject>| {
            let world = world.clone();
            PropertyDescriptor::getter(move |this| f(&world.borrow(), this))
        };
        let method = |f: fn(&World, &MemoryObject) -> HostValue<MemoryObject>| {
            let world = world.clone();
            PropertyDescriptor::method(move |this| f(&world.borrow(), this))
        };

        self.define_property(Window, "innerWidth", getter(|w, _| number(w.inner_size.width)));
        self.define_property(Window, "innerHeight", getter(|w, _| number(w.inner_size.height)));
        self.define_property(
            Window,
            "visualViewport",
            getter(|w, _| {
                w.visual_viewport
                    .map_or(HostValue::Undefined, HostValue::VisualViewport)
            }),
        );
        self.define_property(
            Window,
            "ResizeObserver",
            PropertyDescriptor::value(HostValue::ResizeObserver(self.native_resize_observer())),
        );

        self.define_property(
            Element,
            "getBoundingClientRect",
            method(|w, this| w.with_element(this, |e| HostValue::Rect(e.bounds))),
        );
        self.define_property(
            Element,
            "getClientRects",
            method(|w, this| w.with_element(this, |e| HostValue::Rects(e.rects()))),
        );
        self.define_property(
            Element,
            "clientLeft",
            getter(|w, this| w.with_element(this, |e| number(e.client.left))),
        );
        self.define_property(
            Element,
            "clientTop",
            getter(|w, this| w.with_element(this, |e| number(e.client.top))),
        );
        self.define_property(
            Element,
            "clientWidth",
            getter(|w, this| w.with_element(this, |e| number(e.client.width))),
        );
        self.define_property(
            Element,
            "clientHeight",
            getter(|w, this| w.with_element(this, |e| number(e.client.height))),
        );

        self.define_property(
            TextRange,
            "getBoundingClientRect",
            method(|w, this| match this {
                MemoryObject::TextRange(id) => {
                    w.ranges.get(id).map_or(HostValue::Undefined, |rects| {
                        let union = rects.iter().copied().reduce(|a, b| a.union(b));
                        HostValue::Rect(union.unwrap_or(Rect::ZERO))
                    })
                }
                _ => HostValue::Undefined,
            }),
        );
        self.define_property(
            TextRange,
            "getClientRects",
            method(|w, this| match this {
                MemoryObject::TextRange(id) => w
                    .ranges
                    .get(id)
                    .map_or(HostValue::Undefined, |rects| HostValue::Rects(rects.clone())),
                _ => HostValue::Undefined,
            }),
        );

        self.define_property(
            ResizeObserverEntry,
            "contentRect",
            getter(|w, this| {
                w.element(this).map_or(HostValue::Undefined, |e| {
                    HostValue::Rect(Rect::new(0.0, 0.0, e.client.width, e.client.height))
                })
            }),
        );
        self.define_property(
            ResizeObserverEntry,
            "borderBoxSize",
            getter(|w, this| {
                w.element(this).map_or(HostValue::Undefined, |e| {
                    HostValue::BoxSizes(vec![BoxSize::of_rect(e.bounds)])
                })
            }),
        );
        self.define_property(
            ResizeObserverEntry,
            "contentBoxSize",
            getter(|w, this| {
                w.element(this)
                    .map_or(HostValue::Undefined, |e| HostValue::BoxSizes(vec![content_box(e)]))
            }),
        );
        self.define_property(
            ResizeObserverEntry,
            "devicePixelContentBoxSize",
            getter(|w, this| {
                w.element(this).map_or(HostValue::Undefined, |e| {
                    let content = content_box(e);
                    HostValue::BoxSizes(vec![BoxSize {
                        inline_size: content.inline_size * w.device_pixel_density,
                        block_size: content.block_size * w.device_pixel_density,
                    }])
                })
            }),
        );

        let pointer = |f: fn(PointerCoordinates) -> f64| {
            let world = world.clone();
            PropertyDescriptor::getter(move |this| {
                world
                    .borrow()
                    .pointer(this)
                    .map_or(HostValue::Undefined, |p| number(f(p)))
            })
        };
        self.define_property(PointerEvent, "clientX", pointer(|p| p.client.x));
        self.define_property(PointerEvent, "clientY", pointer(|p| p.client.y));
        self.define_property(PointerEvent, "x", pointer(|p| p.x()));
        self.define_property(PointerEvent, "y", pointer(|p| p.y()));
        self.define_property(PointerEvent, "pageX", pointer(|p| p.page.x));
        self.define_property(PointerEvent, "pageY", pointer(|p| p.page.y));
        self.define_property(PointerEvent, "layerX", pointer(|p| p.layer.x));
        self.define_property(PointerEvent, "layerY", pointer(|p| p.layer.y));
        self.define_property(PointerEvent, "offsetX", pointer(|p| p.offset.x));
        self.define_property(PointerEvent, "offsetY", pointer(|p| p.offset.y));
        self.define_property(PointerEvent, "screenX", pointer(|p| p.screen.x));
        self.define_property(PointerEvent, "screenY", pointer(|p| p.screen.y));
        self.define_property(PointerEvent, "movementX", pointer(|p| p.movement.x));
        self.define_property(PointerEvent, "movementY", pointer(|p| p.movement.y));
    }

    fn native_resize_observer(&self) -> ResizeObserverConstructor<MemoryObject> {
        let world = Rc::downgrade(&self.world);
        Rc::new(move |callback: ResizeCallback<MemoryObject>| {
            let state = Rc::new(RefCell::new(ObserverState {
                callback,
                targets: Vec::new(),
            }));
            if let Some(world) = world.upgrade() {
                world.borrow_mut().observers.push(Rc::downgrade(&state));
            }
            Box::new(MemoryResizeObserver { state }) as Box<dyn ResizeObservation<MemoryObject>>
        })
    }

    /// Removes `name` from `target`, as an environment lacking it would.
    pub fn remove_property(&self, target: PatchTarget, name: &str) {
        self.properties
            .borrow_mut()
            .retain(|(t, n), _| !(*t == target && *n == name));
    }

    /// Assigns `value` to `name` on `this` the way script code would.
    ///
    /// Returns `false` when the write was ignored: the property is missing,
    /// read-only, or an accessor without a setter.
    pub fn assign(
        &self,
        target: PatchTarget,
        name: &'static str,
        this: &MemoryObject,
        value: HostValue<MemoryObject>,
    ) -> bool {
        let Some(descriptor) = self.own_property(target, name) else {
            return false;
        };
        match descriptor {
            PropertyDescriptor::Data {
                writable: true,
                enumerable,
                configurable,
                ..
            } => {
                self.define_property(
                    target,
                    name,
                    PropertyDescriptor::Data {
                        value,
                        writable: true,
                        enumerable,
                        configurable,
                    },
                );
                true
            }
            PropertyDescriptor::Accessor { set: Some(set), .. } => {
                set(this, value);
                true
            }
            _ => false,
        }
    }

    /// Resizes the window; the document element follows.
    pub fn set_inner_size(&self, size: Size) {
        let mut world = self.world.borrow_mut();
        world.inner_size = size;
        world.elements.insert(
            DOCUMENT_ELEMENT,
            ElementLayout::new(Rect::from_origin_size((0.0, 0.0), size)),
        );
    }

    /// Sets the device pixel density.
    pub fn set_device_pixel_density(&self, density: f64) {
        self.world.borrow_mut().device_pixel_density = density;
    }

    /// Sets (or with `None`, removes) the visual viewport.
    pub fn set_visual_viewport(&self, viewport: Option<VisualViewport>) {
        self.world.borrow_mut().visual_viewport = viewport;
    }

    /// Adds an element, optionally reachable by `id`.
    pub fn add_element(&self, id: Option<&str>, layout: ElementLayout) -> MemoryObject {
        let mut world = self.world.borrow_mut();
        let node = world.allocate();
        world.elements.insert(node, layout);
        if let Some(id) = id {
            world.ids.insert(id.to_owned(), node);
        }
        MemoryObject::Element(node)
    }

    /// Replaces the layout of an element.
    pub fn set_element_layout(&self, element: &MemoryObject, layout: ElementLayout) {
        if let MemoryObject::Element(id) = element {
            self.world.borrow_mut().elements.insert(*id, layout);
        }
    }

    /// Adds a text range made of `rects`.
    pub fn add_text_range(&self, rects: Vec<Rect>) -> MemoryObject {
        let mut world = self.world.borrow_mut();
        let node = world.allocate();
        world.ranges.insert(node, rects);
        MemoryObject::TextRange(node)
    }

    /// Adds a pointer event carrying `coordinates`.
    pub fn add_pointer_event(&self, coordinates: PointerCoordinates) -> MemoryObject {
        let mut world = self.world.borrow_mut();
        let id = world.allocate().0;
        world.pointers.insert(id, coordinates);
        MemoryObject::Pointer(id)
    }

    /// The resize entry object describing `element`.
    #[must_use]
    pub fn resize_entry_for(&self, element: &MemoryObject) -> Option<MemoryObject> {
        match element {
            MemoryObject::Element(id) => Some(MemoryObject::ResizeEntry(*id)),
            _ => None,
        }
    }

    /// Runs one round of native resize observation.
    ///
    /// Every live observer with targets receives one batch of physical
    /// entries. Returns the number of batches delivered.
    pub fn deliver_resize_observations(&self) -> usize {
        let pending: Vec<(ResizeCallback<MemoryObject>, Vec<ResizeObserverEntry<MemoryObject>>)> = {
            let mut world = self.world.borrow_mut();
            world.observers.retain(|o| o.strong_count() > 0);
            world
                .observers
                .iter()
                .filter_map(Weak::upgrade)
                .filter_map(|observer| {
                    let observer = observer.borrow();
                    let entries: Vec<_> = observer
                        .targets
                        .iter()
                        .filter_map(|target| {
                            let layout = world.element(target)?;
                            let content = content_box(layout);
                            let mut entry = ResizeObserverEntry::uniform(
                                *target,
                                Rect::new(0.0, 0.0, content.inline_size, content.block_size),
                            );
                            entry.border_box_size[0] = BoxSize::of_rect(layout.bounds);
                            entry.device_pixel_content_box_size[0] = BoxSize {
                                inline_size: content.inline_size * world.device_pixel_density,
                                block_size: content.block_size * world.device_pixel_density,
                            };
                            Some(entry)
                        })
                        .collect();
                    (!entries.is_empty()).then(|| (observer.callback.clone(), entries))
                })
                .collect()
        };
        for (callback, entries) in &pending {
            callback(entries);
        }
        pending.len()
    }
}

fn content_box(layout: &ElementLayout) -> BoxSize {
    BoxSize {
        inline_size: layout.client.width,
        block_size: layout.client.height,
    }
}

impl HostObjectModel for MemoryHost {
    type Object = MemoryObject;

    fn own_property(
        &self,
        target: PatchTarget,
        name: &str,
    ) -> Option<PropertyDescriptor<MemoryObject>> {
        self.properties
            .borrow()
            .iter()
            .find(|((t, n), _)| *t == target && *n == name)
            .map(|(_, descriptor)| descriptor.clone())
    }

    fn define_property(
        &self,
        target: PatchTarget,
        name: &'static str,
        descriptor: PropertyDescriptor<MemoryObject>,
    ) {
        self.properties
            .borrow_mut()
            .insert((target, name), descriptor);
    }

    fn target_of(&self, object: &MemoryObject) -> Option<PatchTarget> {
        Some(match object {
            MemoryObject::Window => PatchTarget::Window,
            MemoryObject::Element(_) => PatchTarget::Element,
            MemoryObject::TextRange(_) => PatchTarget::TextRange,
            MemoryObject::ResizeEntry(_) => PatchTarget::ResizeObserverEntry,
            MemoryObject::Pointer(_) => PatchTarget::PointerEvent,
        })
    }

    fn window(&self) -> MemoryObject {
        MemoryObject::Window
    }

    fn document_element(&self) -> MemoryObject {
        MemoryObject::Element(DOCUMENT_ELEMENT)
    }

    fn element_by_id(&self, id: &str) -> Option<MemoryObject> {
        self.world
            .borrow()
            .ids
            .get(id)
            .map(|node| MemoryObject::Element(*node))
    }

    fn device_pixel_density(&self) -> f64 {
        self.world.borrow().device_pixel_density
    }
}

impl StyleSurface for MemoryHost {
    fn style_property(&self, node: StyleNode, name: &str) -> String {
        self.styles
            .borrow()
            .get(&(node, name.to_owned()))
            .cloned()
            .unwrap_or_default()
    }

    fn set_style_property(&self, node: StyleNode, name: &str, value: &str) {
        let mut styles = self.styles.borrow_mut();
        if value.is_empty() {
            styles.remove(&(node, name.to_owned()));
        } else {
            styles.insert((node, name.to_owned()), value.to_owned());
        }
    }
}

#[cfg(test)]
mod tests {
    use core::cell::Cell;

    use super::*;
    use crate::host::read_property;

    #[test]
    fn standard_surface_reports_layout() {
        let host = MemoryHost::new(Size::new(1920.0, 1080.0));
        let root = host.document_element();
        assert_eq!(
            read_property(&host, PatchTarget::Element, "clientWidth", &root).as_number(),
            Some(1920.0)
        );
        let layout = ElementLayout::new(Rect::new(10.0, 20.0, 110.0, 70.0));
        let app = host.add_element(Some("app"), layout);
        assert_eq!(host.element_by_id("app"), Some(app));
        assert_eq!(
            read_property(&host, PatchTarget::Element, "getBoundingClientRect", &app).as_rect(),
            Some(Rect::new(10.0, 20.0, 110.0, 70.0))
        );
        assert_eq!(
            read_property(&host, PatchTarget::Window, "innerHeight", &host.window()).as_number(),
            Some(1080.0)
        );
    }

    #[test]
    fn getter_only_properties_ignore_writes() {
        let host = MemoryHost::new(Size::new(800.0, 600.0));
        let window = host.window();
        assert!(!host.assign(PatchTarget::Window, "innerWidth", &window, number(1.0)));
        assert_eq!(
            read_property(&host, PatchTarget::Window, "innerWidth", &window).as_number(),
            Some(800.0)
        );
    }

    #[test]
    fn native_observers_receive_physical_entries() {
        let host = MemoryHost::new(Size::new(800.0, 600.0));
        let element = host.add_element(None, ElementLayout::new(Rect::new(0.0, 0.0, 300.0, 200.0)));
        let HostValue::ResizeObserver(ctor) =
            read_property(&host, PatchTarget::Window, "ResizeObserver", &host.window())
        else {
            panic!("memory host defines a resize observer constructor");
        };
        let widths = Rc::new(Cell::new(0.0));
        let mut observer = {
            let widths = widths.clone();
            ctor(Rc::new(move |entries: &[ResizeObserverEntry<MemoryObject>]| {
                widths.set(entries[0].content_rect.width());
            }))
        };
        assert_eq!(host.deliver_resize_observations(), 0);
        observer.observe(element, ObserveOptions::default());
        assert_eq!(host.deliver_resize_observations(), 1);
        assert_eq!(widths.get(), 300.0);
        observer.disconnect();
        assert_eq!(host.deliver_resize_observations(), 0);
    }

    #[test]
    fn styles_unset_on_empty_value() {
        let host = MemoryHost::new(Size::new(800.0, 600.0));
        host.set_style_property(StyleNode::Root, "overflow", "auto");
        assert_eq!(host.style_property(StyleNode::Root, "overflow"), "auto");
        host.set_style_property(StyleNode::Root, "overflow", "");
        assert_eq!(host.style_property(StyleNode::Root, "overflow"), "");
    }
}
