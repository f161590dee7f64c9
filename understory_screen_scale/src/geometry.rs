// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Physical → design coordinate translation.
//!
//! Every value the host reports in physical pixels is reported to
//! application code in design-space units instead: divided by the effective
//! scale factor of the live [`ScaleState`](crate::ScaleState) (`1.0` when out
//! of range). The free functions here are the single place that division
//! happens; the interception registry, the resize-observation shim, and
//! [`ScaledGeometry`] all go through them.
//!
//! Code that can choose what it calls should consume the capability traits
//! ([`GeometryProvider`], [`ClientMetricsProvider`],
//! [`PointerCoordinateProvider`], [`ViewportProvider`]) through a
//! [`ScaledGeometry`] rather than the patched host surface.

use alloc::vec::Vec;

use kurbo::{Point, Rect, Size, Vec2};

use crate::state::ScaleStateHandle;

/// One box size in a resize observation (`inlineSize`/`blockSize`).
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BoxSize {
    /// Size along the inline axis (width in horizontal writing modes).
    pub inline_size: f64,
    /// Size along the block axis.
    pub block_size: f64,
}

impl BoxSize {
    /// Box size matching the width and height of `rect`.
    #[must_use]
    pub fn of_rect(rect: Rect) -> Self {
        Self {
            inline_size: rect.width(),
            block_size: rect.height(),
        }
    }
}

/// Client area metrics of an element (`clientLeft`/`clientTop`/
/// `clientWidth`/`clientHeight`).
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ClientMetrics {
    /// Left border width.
    pub left: f64,
    /// Top border width.
    pub top: f64,
    /// Inner width.
    pub width: f64,
    /// Inner height.
    pub height: f64,
}

/// Visual viewport as exposed by the host.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct VisualViewport {
    /// Offset from the layout viewport, left edge.
    pub offset_left: f64,
    /// Offset from the layout viewport, top edge.
    pub offset_top: f64,
    /// Offset from the document, left edge.
    pub page_left: f64,
    /// Offset from the document, top edge.
    pub page_top: f64,
    /// Visible width.
    pub width: f64,
    /// Visible height.
    pub height: f64,
    /// Pinch-zoom scale.
    pub scale: f64,
}

/// All coordinates carried by a pointer event.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PointerCoordinates {
    /// `clientX`/`clientY`; also reported as `x`/`y`.
    pub client: Point,
    /// `pageX`/`pageY`.
    pub page: Point,
    /// `layerX`/`layerY`.
    pub layer: Point,
    /// `offsetX`/`offsetY`.
    pub offset: Point,
    /// `screenX`/`screenY`.
    pub screen: Point,
    /// `movementX`/`movementY`.
    pub movement: Vec2,
}

impl PointerCoordinates {
    /// Alias of `client.x`.
    #[must_use]
    pub fn x(&self) -> f64 {
        self.client.x
    }

    /// Alias of `client.y`.
    #[must_use]
    pub fn y(&self) -> f64 {
        self.client.y
    }
}

/// Divides a length by `factor`.
#[must_use]
#[inline]
pub fn to_design(value: f64, factor: f64) -> f64 {
    value / factor
}

/// Divides every edge of `rect` by `factor`; width and height follow.
#[must_use]
pub fn to_design_rect(rect: Rect, factor: f64) -> Rect {
    Rect::new(
        rect.x0 / factor,
        rect.y0 / factor,
        rect.x1 / factor,
        rect.y1 / factor,
    )
}

/// Divides both axes of a point.
#[must_use]
pub fn to_design_point(point: Point, factor: f64) -> Point {
    Point::new(point.x / factor, point.y / factor)
}

/// Divides a box size.
#[must_use]
pub fn to_design_box_size(size: BoxSize, factor: f64) -> BoxSize {
    BoxSize {
        inline_size: size.inline_size / factor,
        block_size: size.block_size / factor,
    }
}

/// Divides client metrics.
#[must_use]
pub fn to_design_client_metrics(metrics: ClientMetrics, factor: f64) -> ClientMetrics {
    ClientMetrics {
        left: metrics.left / factor,
        top: metrics.top / factor,
        width: metrics.width / factor,
        height: metrics.height / factor,
    }
}

/// Divides the visible size; offsets and pinch scale are passed through.
///
/// `scale` is a ratio of two lengths that both scale by `factor`, so it
/// is unchanged by the translation. It is still re-read from the host on
/// every access, like the other members.
#[must_use]
pub fn to_design_visual_viewport(viewport: VisualViewport, factor: f64) -> VisualViewport {
    VisualViewport {
        width: viewport.width / factor,
        height: viewport.height / factor,
        ..viewport
    }
}

/// Divides every pointer coordinate.
#[must_use]
pub fn to_design_pointer(coords: PointerCoordinates, factor: f64) -> PointerCoordinates {
    PointerCoordinates {
        client: to_design_point(coords.client, factor),
        page: to_design_point(coords.page, factor),
        layer: to_design_point(coords.layer, factor),
        offset: to_design_point(coords.offset, factor),
        screen: to_design_point(coords.screen, factor),
        movement: coords.movement / factor,
    }
}

/// Bounding geometry of nodes (elements or text ranges).
pub trait GeometryProvider<N: ?Sized> {
    /// Union box of the node (`getBoundingClientRect`).
    fn bounding_client_rect(&self, node: &N) -> Rect;

    /// Individual boxes of the node (`getClientRects`).
    fn client_rects(&self, node: &N) -> Vec<Rect>;
}

/// Client area metrics of elements.
pub trait ClientMetricsProvider<N: ?Sized> {
    /// `clientLeft`/`clientTop`/`clientWidth`/`clientHeight` of `node`.
    fn client_metrics(&self, node: &N) -> ClientMetrics;
}

/// Pointer coordinates of events.
pub trait PointerCoordinateProvider<E: ?Sized> {
    /// Every coordinate carried by `event`.
    fn pointer_coordinates(&self, event: &E) -> PointerCoordinates;
}

/// Window-level sizes.
pub trait ViewportProvider {
    /// `innerWidth`/`innerHeight`.
    fn inner_size(&self) -> Size;

    /// The visual viewport, when the host has one.
    fn visual_viewport(&self) -> Option<VisualViewport>;
}

/// Reports a physical provider's values in design space.
///
/// Values are translated on every call using the state at that moment; no
/// result is cached.
#[derive(Clone, Debug)]
pub struct ScaledGeometry<P> {
    physical: P,
    state: ScaleStateHandle,
}

impl<P> ScaledGeometry<P> {
    /// Wraps `physical`, dividing by the factor in `state`.
    #[must_use]
    pub fn new(physical: P, state: ScaleStateHandle) -> Self {
        Self { physical, state }
    }

    /// The wrapped provider, for trusted callers that need physical values.
    #[must_use]
    pub fn physical(&self) -> &P {
        &self.physical
    }

    fn factor(&self) -> f64 {
        self.state.effective_scale_factor()
    }
}

impl<N: ?Sized, P: GeometryProvider<N>> GeometryProvider<N> for ScaledGeometry<P> {
    fn bounding_client_rect(&self, node: &N) -> Rect {
        to_design_rect(self.physical.bounding_client_rect(node), self.factor())
    }

    fn client_rects(&self, node: &N) -> Vec<Rect> {
        let factor = self.factor();
        self.physical
            .client_rects(node)
            .into_iter()
            .map(|rect| to_design_rect(rect, factor))
            .collect()
    }
}

impl<N: ?Sized, P: ClientMetricsProvider<N>> ClientMetricsProvider<N> for ScaledGeometry<P> {
    fn client_metrics(&self, node: &N) -> ClientMetrics {
        to_design_client_metrics(self.physical.client_metrics(node), self.factor())
    }
}

impl<E: ?Sized, P: PointerCoordinateProvider<E>> PointerCoordinateProvider<E>
    for ScaledGeometry<P>
{
    fn pointer_coordinates(&self, event: &E) -> PointerCoordinates {
        to_design_pointer(self.physical.pointer_coordinates(event), self.factor())
    }
}

impl<P: ViewportProvider> ViewportProvider for ScaledGeometry<P> {
    /// Derived from the live state, not from the physical provider.
    fn inner_size(&self) -> Size {
        self.state.get().inner_size()
    }

    fn visual_viewport(&self) -> Option<VisualViewport> {
        let factor = self.factor();
        self.physical
            .visual_viewport()
            .map(|viewport| to_design_visual_viewport(viewport, factor))
    }
}
