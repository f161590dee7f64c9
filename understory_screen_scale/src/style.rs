// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Visual transform of the scaled container.

use alloc::format;
use alloc::rc::Rc;
use alloc::string::String;
use alloc::vec::Vec;
use core::cell::RefCell;
use core::fmt;

use crate::host::{StyleNode, StyleSurface};
use crate::state::ScaleState;

/// Inline style of the container for an in-range state.
#[derive(Clone, Debug, PartialEq)]
pub struct ContainerStyle {
    /// `scale(<factor>)`.
    pub transform: String,
    /// Always the top-left corner.
    pub transform_origin: &'static str,
    /// Design width in pixels.
    pub width: String,
    /// Design height in pixels.
    pub height: String,
    /// Always `hidden`.
    pub overflow: &'static str,
}

impl ContainerStyle {
    /// The container style for `state`, or `None` when out of range.
    #[must_use]
    pub fn for_state(state: &ScaleState) -> Option<Self> {
        match *state {
            ScaleState::OutOfRange { .. } => None,
            ScaleState::InRange {
                scale_factor,
                target_width,
                target_height,
                ..
            } => Some(Self {
                transform: format!("scale({scale_factor})"),
                transform_origin: "0 0",
                width: format!("{target_width}px"),
                height: format!("{target_height}px"),
                overflow: "hidden",
            }),
        }
    }

    /// Property/value pairs, in application order.
    #[must_use]
    pub fn declarations(&self) -> [(&'static str, &str); 5] {
        [
            ("transform", self.transform.as_str()),
            ("transform-origin", self.transform_origin),
            ("width", self.width.as_str()),
            ("height", self.height.as_str()),
            ("overflow", self.overflow),
        ]
    }
}

/// What the application should show.
#[derive(Clone, Debug, PartialEq)]
pub enum Presentation {
    /// The content, inside a container styled like this.
    Scaled(ContainerStyle),
    /// The caller's fallback instead of the content.
    Fallback,
}

impl Presentation {
    /// The presentation for `state`.
    #[must_use]
    pub fn for_state(state: &ScaleState) -> Self {
        ContainerStyle::for_state(state).map_or(Self::Fallback, Self::Scaled)
    }

    /// Picks `content` or `fallback`.
    pub fn render<T>(
        &self,
        content: impl FnOnce(&ContainerStyle) -> T,
        fallback: impl FnOnce() -> T,
    ) -> T {
        match self {
            Self::Scaled(style) => content(style),
            Self::Fallback => fallback(),
        }
    }
}

/// Inline styles the applier may change; all of them are snapshotted.
const TOUCHED: [(StyleNode, &str); 10] = [
    (StyleNode::Document, "height"),
    (StyleNode::Document, "overflow"),
    (StyleNode::Container, "margin"),
    (StyleNode::Container, "transform"),
    (StyleNode::Container, "transform-origin"),
    (StyleNode::Container, "width"),
    (StyleNode::Container, "height"),
    (StyleNode::Container, "overflow"),
    (StyleNode::Root, "height"),
    (StyleNode::Root, "overflow"),
];

/// Page setup applied once on attach.
const PAGE_SETUP: [(StyleNode, &str, &str); 5] = [
    (StyleNode::Document, "height", "100vh"),
    (StyleNode::Document, "overflow", "hidden"),
    (StyleNode::Root, "height", "100%"),
    (StyleNode::Root, "overflow", "auto"),
    (StyleNode::Container, "margin", "0"),
];

/// Writes the container transform to a [`StyleSurface`].
pub struct StyleApplier<S: StyleSurface> {
    surface: Rc<S>,
    snapshot: RefCell<Option<Vec<(StyleNode, &'static str, String)>>>,
}

impl<S: StyleSurface> fmt::Debug for StyleApplier<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StyleApplier")
            .field("attached", &self.is_attached())
            .finish_non_exhaustive()
    }
}

impl<S: StyleSurface> StyleApplier<S> {
    /// Creates a detached applier.
    #[must_use]
    pub fn new(surface: Rc<S>) -> Self {
        Self {
            surface,
            snapshot: RefCell::new(None),
        }
    }

    /// Returns `true` between [`attach`](Self::attach) and
    /// [`restore`](Self::restore).
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.snapshot.borrow().is_some()
    }

    /// Snapshots the touched styles, sets up the page and applies `state`.
    ///
    /// Attaching twice keeps the first snapshot.
    pub fn attach(&self, state: &ScaleState) -> Presentation {
        if !self.is_attached() {
            let snapshot = TOUCHED
                .iter()
                .map(|&(node, name)| (node, name, self.surface.style_property(node, name)))
                .collect();
            *self.snapshot.borrow_mut() = Some(snapshot);
            for (node, name, value) in PAGE_SETUP {
                self.surface.set_style_property(node, name, value);
            }
        }
        self.apply(state)
    }

    /// Applies the container transform for `state`.
    ///
    /// An out-of-range state leaves the last transform in place; the content
    /// is replaced by the fallback anyway.
    pub fn apply(&self, state: &ScaleState) -> Presentation {
        let presentation = Presentation::for_state(state);
        if let Presentation::Scaled(style) = &presentation {
            for (name, value) in style.declarations() {
                self.surface.set_style_property(StyleNode::Container, name, value);
            }
        }
        presentation
    }

    /// Writes every snapshotted value back. Does nothing when detached.
    pub fn restore(&self) {
        let Some(snapshot) = self.snapshot.borrow_mut().take() else {
            return;
        };
        for (node, name, value) in snapshot {
            self.surface.set_style_property(node, name, &value);
        }
    }
}
