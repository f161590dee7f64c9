// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Resize observation that reacts to scale changes.
//!
//! When the scale factor changes, an element's design-space size can change
//! without its physical size changing, so the host never reports it. A
//! [`ScaledResizeObserver`] wraps the host's native observer and, while it has
//! targets, also listens to [`ScaleStateHandle`]: every published state
//! produces one callback with a synthesized entry per observed target.
//!
//! Native entries pass through the same translation, so callers only ever see
//! design-space sizes.

use alloc::boxed::Box;
use alloc::rc::{Rc, Weak};
use alloc::vec::Vec;
use core::cell::RefCell;
use core::fmt;

use kurbo::Rect;
use smallvec::{SmallVec, smallvec};

use crate::geometry::{BoxSize, GeometryProvider, to_design_box_size, to_design_rect};
use crate::listeners::{CancellationScope, Subscription};
use crate::state::ScaleStateHandle;

/// One entry of a resize observation.
#[derive(Clone, Debug, PartialEq)]
pub struct ResizeObserverEntry<O> {
    /// The observed object.
    pub target: O,
    /// Content rectangle.
    pub content_rect: Rect,
    /// Border box sizes, one per fragment.
    pub border_box_size: SmallVec<[BoxSize; 1]>,
    /// Content box sizes, one per fragment.
    pub content_box_size: SmallVec<[BoxSize; 1]>,
    /// Content box sizes in device pixels, one per fragment.
    pub device_pixel_content_box_size: SmallVec<[BoxSize; 1]>,
}

impl<O> ResizeObserverEntry<O> {
    /// An entry whose every size matches `rect`.
    #[must_use]
    pub fn uniform(target: O, rect: Rect) -> Self {
        let size = BoxSize::of_rect(rect);
        Self {
            target,
            content_rect: rect,
            border_box_size: smallvec![size],
            content_box_size: smallvec![size],
            device_pixel_content_box_size: smallvec![size],
        }
    }

    /// The entry with every length divided by `factor`.
    #[must_use]
    pub fn to_design(self, factor: f64) -> Self {
        let scale = |sizes: SmallVec<[BoxSize; 1]>| {
            sizes
                .into_iter()
                .map(|size| to_design_box_size(size, factor))
                .collect()
        };
        Self {
            target: self.target,
            content_rect: to_design_rect(self.content_rect, factor),
            border_box_size: scale(self.border_box_size),
            content_box_size: scale(self.content_box_size),
            device_pixel_content_box_size: scale(self.device_pixel_content_box_size),
        }
    }
}

/// Which box an observation tracks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ResizeObserverBox {
    /// The content box.
    #[default]
    ContentBox,
    /// The border box.
    BorderBox,
    /// The content box, in device pixels.
    DevicePixelContentBox,
}

/// Options passed to [`ResizeObservation::observe`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ObserveOptions {
    /// Which box to track.
    pub box_model: ResizeObserverBox,
}

/// Callback receiving a batch of entries.
pub type ResizeCallback<O> = Rc<dyn Fn(&[ResizeObserverEntry<O>])>;

/// Creates an observer around a callback.
pub type ResizeObserverConstructor<O> =
    Rc<dyn Fn(ResizeCallback<O>) -> Box<dyn ResizeObservation<O>>>;

/// The resize observation contract shared by native and scaled observers.
pub trait ResizeObservation<O> {
    /// Starts observing `target`.
    fn observe(&mut self, target: O, options: ObserveOptions);

    /// Stops observing `target`.
    fn unobserve(&mut self, target: &O);

    /// Stops observing everything.
    fn disconnect(&mut self);
}

struct Session<O> {
    targets: SmallVec<[O; 4]>,
    scope: CancellationScope,
    subscription: Option<Subscription>,
}

impl<O> Session<O> {
    /// Cancels the current state subscription and prepares a fresh scope.
    fn end(&mut self) {
        self.scope.cancel();
        self.scope = CancellationScope::new();
        self.subscription = None;
        self.targets.clear();
    }
}

/// A resize observer that also fires when the scale factor changes.
pub struct ScaledResizeObserver<O> {
    native: Box<dyn ResizeObservation<O>>,
    session: Rc<RefCell<Session<O>>>,
    state: ScaleStateHandle,
    geometry: Rc<dyn GeometryProvider<O>>,
    callback: ResizeCallback<O>,
}

impl<O> fmt::Debug for ScaledResizeObserver<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let session = self.session.borrow();
        f.debug_struct("ScaledResizeObserver")
            .field("targets", &session.targets.len())
            .field("subscribed", &session.subscription.is_some())
            .finish_non_exhaustive()
    }
}

impl<O: Clone + PartialEq + 'static> ScaledResizeObserver<O> {
    /// Creates the native observer through `native` and wraps it.
    ///
    /// `geometry` must report design-space rectangles; synthesized entries
    /// are built from its bounding rectangles.
    pub fn new(
        native: &ResizeObserverConstructor<O>,
        callback: ResizeCallback<O>,
        state: ScaleStateHandle,
        geometry: Rc<dyn GeometryProvider<O>>,
    ) -> Self {
        let translating: ResizeCallback<O> = {
            let state = state.clone();
            let callback = callback.clone();
            Rc::new(move |entries: &[ResizeObserverEntry<O>]| {
                let factor = state.effective_scale_factor();
                let translated: Vec<_> = entries
                    .iter()
                    .cloned()
                    .map(|entry| entry.to_design(factor))
                    .collect();
                callback(&translated);
            })
        };
        Self {
            native: native(translating),
            session: Rc::new(RefCell::new(Session {
                targets: SmallVec::new(),
                scope: CancellationScope::new(),
                subscription: None,
            })),
            state,
            geometry,
            callback,
        }
    }

    /// Objects currently observed.
    #[must_use]
    pub fn targets(&self) -> Vec<O> {
        self.session.borrow().targets.to_vec()
    }

    /// Returns `true` while this observer listens to scale changes.
    #[must_use]
    pub fn is_subscribed(&self) -> bool {
        let session = self.session.borrow();
        session.subscription.is_some() && !session.scope.is_cancelled()
    }

    fn subscribe(&self) {
        let scope = self.session.borrow().scope.clone();
        let weak: Weak<RefCell<Session<O>>> = Rc::downgrade(&self.session);
        let geometry = self.geometry.clone();
        let callback = self.callback.clone();
        let subscription = self.state.subscribe_scoped(&scope, move |_| {
            let Some(session) = weak.upgrade() else {
                return;
            };
            let targets = session.borrow().targets.clone();
            if targets.is_empty() {
                return;
            }
            let entries: Vec<_> = targets
                .into_iter()
                .map(|target| {
                    let rect = geometry.bounding_client_rect(&target);
                    ResizeObserverEntry::uniform(target, rect)
                })
                .collect();
            tracing::trace!(count = entries.len(), "synthesizing resize entries");
            callback(&entries);
        });
        self.session.borrow_mut().subscription = Some(subscription);
        tracing::debug!("resize observer subscribed to scale changes");
    }
}

impl<O: Clone + PartialEq + 'static> ResizeObservation<O> for ScaledResizeObserver<O> {
    fn observe(&mut self, target: O, options: ObserveOptions) {
        let first = {
            let mut session = self.session.borrow_mut();
            let first = session.targets.is_empty();
            if !session.targets.contains(&target) {
                session.targets.push(target.clone());
            }
            first && session.subscription.is_none()
        };
        if first {
            self.subscribe();
        }
        self.native.observe(target, options);
    }

    fn unobserve(&mut self, target: &O) {
        let emptied = {
            let mut session = self.session.borrow_mut();
            let before = session.targets.len();
            session.targets.retain(|t| t != target);
            before > 0 && session.targets.is_empty()
        };
        if emptied {
            self.session.borrow_mut().end();
            tracing::debug!("last target unobserved; resize observer unsubscribed");
        }
        self.native.unobserve(target);
    }

    fn disconnect(&mut self) {
        self.session.borrow_mut().end();
        self.native.disconnect();
    }
}

impl<O> Drop for ScaledResizeObserver<O> {
    fn drop(&mut self) {
        if let Ok(session) = self.session.try_borrow() {
            session.scope.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec;
    use core::cell::Cell;

    use super::*;
    use crate::state::{PolicyInput, ScaleState, TargetWidth, ViewportMeasurement};

    #[derive(Default)]
    struct NativeLog {
        observed: Vec<u32>,
        disconnects: usize,
    }

    struct Native {
        log: Rc<RefCell<NativeLog>>,
    }

    impl ResizeObservation<u32> for Native {
        fn observe(&mut self, target: u32, _: ObserveOptions) {
            self.log.borrow_mut().observed.push(target);
        }

        fn unobserve(&mut self, target: &u32) {
            self.log.borrow_mut().observed.retain(|t| t != target);
        }

        fn disconnect(&mut self) {
            let mut log = self.log.borrow_mut();
            log.observed.clear();
            log.disconnects += 1;
        }
    }

    struct Boxes;

    impl GeometryProvider<u32> for Boxes {
        fn bounding_client_rect(&self, node: &u32) -> Rect {
            Rect::new(0.0, 0.0, f64::from(*node) * 10.0, 10.0)
        }

        fn client_rects(&self, node: &u32) -> Vec<Rect> {
            vec![self.bounding_client_rect(node)]
        }
    }

    struct Fixture {
        state: ScaleStateHandle,
        log: Rc<RefCell<NativeLog>>,
        native_callback: Rc<RefCell<Option<ResizeCallback<u32>>>>,
        batches: Rc<RefCell<Vec<Vec<ResizeObserverEntry<u32>>>>>,
        observer: ScaledResizeObserver<u32>,
    }

    fn fixture() -> Fixture {
        let state = ScaleStateHandle::default();
        let log = Rc::new(RefCell::new(NativeLog::default()));
        let native_callback = Rc::new(RefCell::new(None));
        let ctor: ResizeObserverConstructor<u32> = {
            let log = log.clone();
            let native_callback = native_callback.clone();
            Rc::new(move |cb: ResizeCallback<u32>| {
                *native_callback.borrow_mut() = Some(cb);
                Box::new(Native { log: log.clone() })
            })
        };
        let batches = Rc::new(RefCell::new(Vec::new()));
        let callback: ResizeCallback<u32> = {
            let batches = batches.clone();
            Rc::new(move |entries: &[ResizeObserverEntry<u32>]| {
                batches.borrow_mut().push(entries.to_vec());
            })
        };
        let observer = ScaledResizeObserver::new(&ctor, callback, state.clone(), Rc::new(Boxes));
        Fixture {
            state,
            log,
            native_callback,
            batches,
            observer,
        }
    }

    fn publish(state: &ScaleStateHandle, width: f64) {
        let input = PolicyInput {
            measurement: ViewportMeasurement::new(width, 500.0),
            scale_multiplier: 1.0,
            is_portrait: false,
        };
        state.publish(ScaleState::compute(&input, &TargetWidth::fixed(500.0)));
    }

    #[test]
    fn state_change_synthesizes_one_batch() {
        let mut f = fixture();
        f.observer.observe(1, ObserveOptions::default());
        f.observer.observe(2, ObserveOptions::default());
        assert_eq!(f.log.borrow().observed, vec![1, 2]);

        publish(&f.state, 1000.0);
        let batches = f.batches.borrow();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 2);
        assert_eq!(batches[0][1].target, 2);
        assert_eq!(batches[0][1].content_rect, Rect::new(0.0, 0.0, 20.0, 10.0));
    }

    #[test]
    fn last_unobserve_unsubscribes() {
        let mut f = fixture();
        f.observer.observe(1, ObserveOptions::default());
        f.observer.unobserve(&1);
        assert!(!f.observer.is_subscribed());
        publish(&f.state, 1000.0);
        assert!(f.batches.borrow().is_empty());

        // Observing again starts a fresh subscription.
        f.observer.observe(3, ObserveOptions::default());
        assert!(f.observer.is_subscribed());
        publish(&f.state, 2000.0);
        assert_eq!(f.batches.borrow().len(), 1);
    }

    #[test]
    fn disconnect_always_unsubscribes() {
        let mut f = fixture();
        f.observer.observe(1, ObserveOptions::default());
        f.observer.disconnect();
        assert!(!f.observer.is_subscribed());
        assert!(f.observer.targets().is_empty());
        assert_eq!(f.log.borrow().disconnects, 1);
        publish(&f.state, 1000.0);
        assert!(f.batches.borrow().is_empty());
        assert_eq!(f.state.listener_count(), 0);
    }

    #[test]
    fn native_entries_are_translated() {
        let f = fixture();
        publish(&f.state, 1000.0);
        let cb = f.native_callback.borrow().clone();
        let cb = cb.expect("native observer was created");
        let physical = [ResizeObserverEntry::uniform(
            7,
            Rect::new(0.0, 0.0, 200.0, 100.0),
        )];
        cb(&physical[..]);
        let batches = f.batches.borrow();
        assert_eq!(batches[0][0].content_rect, Rect::new(0.0, 0.0, 100.0, 50.0));
        assert_eq!(
            batches[0][0].border_box_size[0],
            BoxSize {
                inline_size: 100.0,
                block_size: 50.0
            }
        );
    }

    #[test]
    fn dropping_the_observer_releases_the_listener() {
        let hits = Rc::new(Cell::new(0));
        let mut f = fixture();
        f.observer.observe(1, ObserveOptions::default());
        {
            let hits = hits.clone();
            let _ = f.state.subscribe(move |_| hits.set(hits.get() + 1));
        }
        let Fixture {
            state, observer, ..
        } = f;
        drop(observer);
        publish(&state, 1000.0);
        assert_eq!(hits.get(), 1);
        assert_eq!(state.listener_count(), 1);
    }
}
