// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tests for the `understory_screen_scale` crate.
//!
//! These drive a full `ScreenScalingContext` over the in-memory host: what
//! application code observes while scaling is active, and that the host is
//! left exactly as it was afterwards.

use std::cell::RefCell;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::rc::Rc;

use kurbo::{Point, Rect, Size, Vec2};
use understory_screen_scale::{
    BoxSize, ClientMetrics, ClientMetricsProvider, ElementLayout, GeometryProvider,
    HostObjectModel, HostValue, KeyValueStore, MemoryHost, MemoryObject, MemoryStore,
    ObserveOptions, PatchTarget, PointerCoordinates,
    PropertyDescriptor, ResizeObservation, ResizeObserverEntry, STANDARD_PATCH_SET, ScaleError,
    ScreenScaleConfig, ScreenScalingContext, StyleNode, StyleSurface, TargetWidth,
    UnsupportedReason, VisualViewport, ZOOM_PREFERENCE_KEY, perform_without_scaling,
    read_property,
};

const EPSILON: f64 = 1e-9;

fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < EPSILON
}

struct Page {
    host: Rc<MemoryHost>,
    store: Rc<MemoryStore>,
    button: MemoryObject,
}

fn page(size: Size) -> Page {
    let host = Rc::new(MemoryHost::new(size));
    host.add_element(
        Some("root"),
        ElementLayout::new(Rect::from_origin_size((0.0, 0.0), size)),
    );
    let button = host.add_element(
        Some("button"),
        ElementLayout::new(Rect::new(200.0, 40.0, 300.0, 100.0)),
    );
    Page {
        host,
        store: Rc::new(MemoryStore::new()),
        button,
    }
}

fn start(page: &Page, target_width: TargetWidth) -> ScreenScalingContext<MemoryHost> {
    ScreenScalingContext::create(
        page.host.clone(),
        page.store.clone(),
        ScreenScaleConfig::new("root", target_width),
    )
    .expect("context starts on the standard host")
}

fn snapshot(host: &MemoryHost) -> Vec<Option<PropertyDescriptor<MemoryObject>>> {
    STANDARD_PATCH_SET
        .entries
        .iter()
        .map(|entry| host.own_property(entry.target, entry.property))
        .collect()
}

fn unchanged(
    before: &[Option<PropertyDescriptor<MemoryObject>>],
    after: &[Option<PropertyDescriptor<MemoryObject>>],
) -> bool {
    before.len() == after.len()
        && before.iter().zip(after).all(|pair| match pair {
            (None, None) => true,
            (Some(a), Some(b)) => a.same_as(b),
            _ => false,
        })
}

fn number(host: &MemoryHost, target: PatchTarget, name: &str, this: &MemoryObject) -> f64 {
    read_property(host, target, name, this)
        .as_number()
        .expect("property reads as a number")
}

fn box_sizes(host: &MemoryHost, name: &str, entry: &MemoryObject) -> Vec<BoxSize> {
    match read_property(host, PatchTarget::ResizeObserverEntry, name, entry) {
        HostValue::BoxSizes(sizes) => sizes,
        other => panic!("{name} should be a box size list, got {other:?}"),
    }
}

#[test]
fn geometry_is_reported_in_design_space() {
    let page = page(Size::new(1920.0, 1080.0));
    let pointer = page.host.add_pointer_event(PointerCoordinates {
        client: Point::new(400.0, 200.0),
        page: Point::new(400.0, 1200.0),
        screen: Point::new(420.0, 260.0),
        movement: Vec2::new(4.0, -2.0),
        ..PointerCoordinates::default()
    });
    page.host.set_visual_viewport(Some(VisualViewport {
        width: 1920.0,
        height: 1080.0,
        scale: 1.0,
        ..VisualViewport::default()
    }));
    let context = start(&page, TargetWidth::fixed(960.0));
    let host = &*page.host;
    let window = host.window();

    let rect = read_property(host, PatchTarget::Element, "getBoundingClientRect", &page.button);
    assert_eq!(rect.as_rect(), Some(Rect::new(100.0, 20.0, 150.0, 50.0)));
    assert_eq!(number(host, PatchTarget::Element, "clientWidth", &page.button), 50.0);
    assert_eq!(number(host, PatchTarget::Window, "innerWidth", &window), 960.0);
    assert_eq!(number(host, PatchTarget::Window, "innerHeight", &window), 540.0);

    assert_eq!(number(host, PatchTarget::PointerEvent, "clientX", &pointer), 200.0);
    assert_eq!(number(host, PatchTarget::PointerEvent, "y", &pointer), 100.0);
    assert_eq!(number(host, PatchTarget::PointerEvent, "pageY", &pointer), 600.0);
    assert_eq!(number(host, PatchTarget::PointerEvent, "movementY", &pointer), -1.0);

    let viewport = read_property(host, PatchTarget::Window, "visualViewport", &window)
        .as_visual_viewport()
        .expect("host has a visual viewport");
    assert_eq!((viewport.width, viewport.height, viewport.scale), (960.0, 540.0, 1.0));

    // The capability adapter agrees with the intercepted surface.
    let geometry = context.geometry();
    assert_eq!(
        geometry.bounding_client_rect(&page.button),
        Rect::new(100.0, 20.0, 150.0, 50.0)
    );
    assert_eq!(geometry.client_metrics(&page.button).height, 30.0);
    assert_eq!(context.real_inner_size(), Size::new(1920.0, 1080.0));
}

#[test]
fn element_range_and_entry_surfaces_are_scaled() {
    let page = page(Size::new(1920.0, 1080.0));
    page.host.set_element_layout(
        &page.button,
        ElementLayout {
            bounds: Rect::new(200.0, 40.0, 300.0, 100.0),
            client: ClientMetrics {
                left: 2.0,
                top: 4.0,
                width: 96.0,
                height: 52.0,
            },
            fragments: vec![
                Rect::new(200.0, 40.0, 260.0, 70.0),
                Rect::new(200.0, 70.0, 300.0, 100.0),
            ],
        },
    );
    let range = page.host.add_text_range(vec![
        Rect::new(0.0, 0.0, 40.0, 10.0),
        Rect::new(40.0, 0.0, 80.0, 20.0),
    ]);
    let entry = page
        .host
        .resize_entry_for(&page.button)
        .expect("elements have resize entries");
    let _context = start(&page, TargetWidth::fixed(960.0));
    // Not reported to the engine; only the device pixel box reads it.
    page.host.set_device_pixel_density(2.0);
    let host = &*page.host;

    let fragments = read_property(host, PatchTarget::Element, "getClientRects", &page.button);
    assert_eq!(
        fragments.as_rects(),
        Some(&[Rect::new(100.0, 20.0, 130.0, 35.0), Rect::new(100.0, 35.0, 150.0, 50.0)][..])
    );
    assert_eq!(number(host, PatchTarget::Element, "clientLeft", &page.button), 1.0);
    assert_eq!(number(host, PatchTarget::Element, "clientTop", &page.button), 2.0);
    assert_eq!(number(host, PatchTarget::Element, "clientHeight", &page.button), 26.0);

    let bounds = read_property(host, PatchTarget::TextRange, "getBoundingClientRect", &range);
    assert_eq!(bounds.as_rect(), Some(Rect::new(0.0, 0.0, 40.0, 10.0)));
    let lines = read_property(host, PatchTarget::TextRange, "getClientRects", &range);
    assert_eq!(
        lines.as_rects(),
        Some(&[Rect::new(0.0, 0.0, 20.0, 5.0), Rect::new(20.0, 0.0, 40.0, 10.0)][..])
    );

    let content = read_property(host, PatchTarget::ResizeObserverEntry, "contentRect", &entry);
    assert_eq!(content.as_rect(), Some(Rect::new(0.0, 0.0, 48.0, 26.0)));
    let size = |inline_size, block_size| BoxSize {
        inline_size,
        block_size,
    };
    assert_eq!(box_sizes(host, "borderBoxSize", &entry), [size(50.0, 30.0)]);
    assert_eq!(box_sizes(host, "contentBoxSize", &entry), [size(48.0, 26.0)]);
    assert_eq!(
        box_sizes(host, "devicePixelContentBoxSize", &entry),
        [size(96.0, 52.0)]
    );
}

#[test]
fn every_pointer_coordinate_is_scaled() {
    let page = page(Size::new(1920.0, 1080.0));
    let pointer = page.host.add_pointer_event(PointerCoordinates {
        client: Point::new(400.0, 200.0),
        page: Point::new(400.0, 1200.0),
        layer: Point::new(40.0, 20.0),
        offset: Point::new(4.0, 2.0),
        screen: Point::new(500.0, 300.0),
        movement: Vec2::new(-6.0, 8.0),
    });
    let _context = start(&page, TargetWidth::fixed(960.0));
    let host = &*page.host;

    let expected = [
        ("x", 200.0),
        ("y", 100.0),
        ("pageX", 200.0),
        ("pageY", 600.0),
        ("layerX", 20.0),
        ("layerY", 10.0),
        ("offsetX", 2.0),
        ("offsetY", 1.0),
        ("screenX", 250.0),
        ("screenY", 150.0),
        ("movementX", -3.0),
        ("movementY", 4.0),
    ];
    for (name, value) in expected {
        assert_eq!(number(host, PatchTarget::PointerEvent, name, &pointer), value, "{name}");
    }
}

#[test]
fn reads_follow_the_live_scale_factor() {
    let page = page(Size::new(1920.0, 1080.0));
    let context = start(&page, TargetWidth::fixed(960.0));
    let host = &*page.host;
    let bounds = || {
        read_property(host, PatchTarget::Element, "getBoundingClientRect", &page.button).as_rect()
    };
    assert_eq!(bounds(), Some(Rect::new(100.0, 20.0, 150.0, 50.0)));

    host.set_inner_size(Size::new(3840.0, 2160.0));
    context.handle_resize();
    assert_eq!(context.state().effective_scale_factor(), 4.0);
    assert_eq!(bounds(), Some(Rect::new(50.0, 10.0, 75.0, 25.0)));
    assert_eq!(number(host, PatchTarget::Window, "innerHeight", &host.window()), 540.0);
}

#[test]
fn failed_start_leaves_the_stored_zoom_alone() {
    let stored = r#"{"devicePixelDensity":1,"zoomStep":0}"#;
    let broken = page(Size::new(1920.0, 1080.0));
    broken
        .store
        .set(ZOOM_PREFERENCE_KEY, stored.as_bytes())
        .expect("memory store accepts writes");
    broken.host.set_device_pixel_density(1.25);
    broken.host.remove_property(PatchTarget::PointerEvent, "clientY");

    let result = ScreenScalingContext::create(
        broken.host.clone(),
        broken.store.clone(),
        ScreenScaleConfig::new("root", TargetWidth::fixed(960.0)),
    );
    assert!(matches!(
        result,
        Err(ScaleError::EnvironmentUnsupported {
            property: "clientY",
            ..
        })
    ));
    assert_eq!(broken.store.get_string(ZOOM_PREFERENCE_KEY).as_deref(), Some(stored));

    // A start that succeeds records the step taken for the new density.
    let fresh = Page {
        store: broken.store.clone(),
        ..page(Size::new(1920.0, 1080.0))
    };
    fresh.host.set_device_pixel_density(1.25);
    let context = start(&fresh, TargetWidth::fixed(960.0));
    assert_eq!(context.zoom_preference().zoom_step.get(), 1);
    assert_eq!(
        fresh.store.get_string(ZOOM_PREFERENCE_KEY).as_deref(),
        Some(r#"{"devicePixelDensity":1.25,"zoomStep":1}"#)
    );
}

#[test]
fn out_of_range_passes_physical_values_through() {
    let page = page(Size::new(600.0, 900.0));
    let context = start(
        &page,
        TargetWidth::policy(|input| (!input.is_portrait).then_some(1200.0)),
    );
    assert!(context.state().is_out_of_range());
    let host = &*page.host;

    let rect = read_property(host, PatchTarget::Element, "getBoundingClientRect", &page.button);
    assert_eq!(rect.as_rect(), Some(Rect::new(200.0, 40.0, 300.0, 100.0)));
    assert_eq!(number(host, PatchTarget::Window, "innerWidth", &host.window()), 600.0);
}

#[test]
fn dispose_restores_the_host_exactly() {
    let page = page(Size::new(1920.0, 1080.0));
    page.host.remove_property(PatchTarget::PointerEvent, "layerX");
    page.host.set_style_property(StyleNode::Container, "margin", "8px");
    let before = snapshot(&page.host);

    let context = start(&page, TargetWidth::fixed(960.0));
    assert!(!unchanged(&before, &snapshot(&page.host)));
    assert_eq!(page.host.style_property(StyleNode::Container, "transform"), "scale(2)");
    assert_eq!(page.host.style_property(StyleNode::Container, "width"), "960px");
    assert_eq!(page.host.style_property(StyleNode::Document, "overflow"), "hidden");
    drop(context);

    assert!(unchanged(&before, &snapshot(&page.host)));
    assert!(page.host.own_property(PatchTarget::PointerEvent, "layerX").is_none());
    assert_eq!(page.host.style_property(StyleNode::Container, "margin"), "8px");
    assert_eq!(page.host.style_property(StyleNode::Container, "transform"), "");
    assert_eq!(page.host.style_property(StyleNode::Root, "height"), "");
}

#[test]
fn bypass_reinstalls_even_when_the_action_panics() {
    let page = page(Size::new(1920.0, 1080.0));
    let context = start(&page, TargetWidth::fixed(960.0));
    let host = &*page.host;
    let inner_width = || number(host, PatchTarget::Window, "innerWidth", &host.window());

    assert_eq!(perform_without_scaling(inner_width), 1920.0);
    assert_eq!(context.bypass(|| perform_without_scaling(inner_width)), 1920.0);
    assert_eq!(inner_width(), 960.0);

    let outcome = catch_unwind(AssertUnwindSafe(|| {
        perform_without_scaling(|| -> f64 { panic!("layout probe failed") })
    }));
    assert!(outcome.is_err(), "the probe panicked");
    assert!(!context.registry().is_bypassed());
    assert_eq!(inner_width(), 960.0);

    drop(context);
    assert_eq!(perform_without_scaling(inner_width), 1920.0);
}

#[test]
fn zoom_change_without_resize_notifies_resize_observers_once() {
    let page = page(Size::new(1920.0, 1080.0));
    let context = start(
        &page,
        TargetWidth::policy(|input| Some(960.0 * input.scale_multiplier)),
    );
    let host = &*page.host;

    let HostValue::ResizeObserver(construct) =
        read_property(host, PatchTarget::Window, "ResizeObserver", &host.window())
    else {
        panic!("the window exposes a resize observer constructor");
    };
    let batches: Rc<RefCell<Vec<Vec<ResizeObserverEntry<MemoryObject>>>>> = Rc::default();
    let mut observer = {
        let batches = batches.clone();
        construct(Rc::new(move |entries: &[ResizeObserverEntry<MemoryObject>]| {
            batches.borrow_mut().push(entries.to_vec());
        }))
    };
    observer.observe(page.button, ObserveOptions::default());

    host.set_device_pixel_density(1.1);
    context.handle_density_change();
    context.handle_resize();
    assert_eq!(context.zoom_preference().zoom_step.get(), 1);
    assert_eq!(batches.borrow().len(), 1, "exactly one synthesized batch");

    let factor = context.state().effective_scale_factor();
    assert!(approx(factor, 2.2));
    {
        let batches = batches.borrow();
        let entry = &batches[0][0];
        assert_eq!(entry.target, page.button);
        assert!(approx(entry.content_rect.width(), 100.0 / factor));
        assert!(approx(entry.border_box_size[0].block_size, 60.0 / factor));
    }

    // Native observations arrive translated as well.
    assert_eq!(host.deliver_resize_observations(), 1);
    let batches = batches.borrow();
    assert_eq!(batches.len(), 2);
    assert!(approx(batches[1][0].content_rect.width(), 100.0 / factor));
}

#[test]
fn zoom_preference_survives_a_new_context() {
    let page = page(Size::new(1920.0, 1080.0));
    let context = start(&page, TargetWidth::fixed(960.0));
    page.host.set_device_pixel_density(1.25);
    context.handle_density_change();
    drop(context);
    assert_eq!(
        page.store.get_string(ZOOM_PREFERENCE_KEY).as_deref(),
        Some(r#"{"devicePixelDensity":1.25,"zoomStep":1}"#)
    );

    let context = start(&page, TargetWidth::fixed(960.0));
    assert_eq!(context.zoom_preference().zoom_step.get(), 1);
}

#[test]
fn only_one_context_per_thread() {
    let page = page(Size::new(1920.0, 1080.0));
    let first = start(&page, TargetWidth::fixed(960.0));
    let second = ScreenScalingContext::create(
        page.host.clone(),
        page.store.clone(),
        ScreenScaleConfig::new("root", TargetWidth::fixed(960.0)),
    );
    assert_eq!(second.err(), Some(ScaleError::ContextAlreadyActive));
    assert!(first.registry().is_installed());
}

#[test]
fn missing_measurement_accessor_is_fatal() {
    let page = page(Size::new(1920.0, 1080.0));
    page.host.remove_property(PatchTarget::Element, "clientWidth");
    let before = snapshot(&page.host);

    let result = ScreenScalingContext::create(
        page.host.clone(),
        page.store.clone(),
        ScreenScaleConfig::new("root", TargetWidth::fixed(960.0)),
    );
    assert_eq!(
        result.err(),
        Some(ScaleError::EnvironmentUnsupported {
            target: PatchTarget::Element,
            property: "clientWidth",
            reason: UnsupportedReason::Missing,
        })
    );
    assert!(unchanged(&before, &snapshot(&page.host)));
    assert_eq!(page.host.style_property(StyleNode::Document, "height"), "");
}
