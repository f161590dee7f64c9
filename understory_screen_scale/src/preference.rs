// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Persisted zoom preference.
//!
//! The host reports device pixel density changes whenever the user drives
//! its own zoom controls. Instead of tracking absolute densities, we nudge a
//! [`ZoomStep`] one notch in the same direction, so arbitrary host zoom
//! percentages collapse onto the small ladder in [`crate::zoom`].
//!
//! The preference survives sessions through a [`KeyValueStore`] as a JSON
//! record `{ "devicePixelDensity": number, "zoomStep": integer }`.

use alloc::borrow::Cow;
use alloc::rc::Rc;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::cell::RefCell;

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::zoom::{ScaleFactorTable, ZoomStep};

/// Storage key used for the persisted preference unless configured otherwise.
pub const ZOOM_PREFERENCE_KEY: &str = "screen-scaler-zoom-level";

/// The user's zoom step together with the density it was last observed at.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoomPreference {
    /// Device pixel density observed when `zoom_step` last changed.
    pub device_pixel_density: f64,
    /// Position on the zoom ladder.
    pub zoom_step: ZoomStep,
}

impl ZoomPreference {
    /// First-run preference: neutral step at the current density.
    #[must_use]
    pub fn initial(device_pixel_density: f64) -> Self {
        Self {
            device_pixel_density,
            zoom_step: ZoomStep::ZERO,
        }
    }

    /// Applies a density observation.
    ///
    /// Returns `None` when the density is unchanged. Otherwise the step moves
    /// by exactly one notch towards the density change (clamped to the
    /// ladder) and the new density is recorded with it.
    #[must_use]
    pub fn advance(self, device_pixel_density: f64) -> Option<Self> {
        if self.device_pixel_density == device_pixel_density {
            return None;
        }
        Some(Self {
            device_pixel_density,
            zoom_step: self
                .zoom_step
                .nudge(device_pixel_density > self.device_pixel_density),
        })
    }
}

/// A durable byte store keyed by string, such as browser local storage.
pub trait KeyValueStore {
    /// Reads the bytes stored under `key`.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Replaces the bytes stored under `key`.
    fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError>;
}

impl<S: KeyValueStore + ?Sized> KeyValueStore for Rc<S> {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        (**self).set(key, value)
    }
}

/// In-memory [`KeyValueStore`], for tests and hosts without durable storage.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RefCell<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the stored bytes as UTF-8, if present and valid.
    #[must_use]
    pub fn get_string(&self, key: &str) -> Option<String> {
        self.entries
            .borrow()
            .get(key)
            .and_then(|bytes| core::str::from_utf8(bytes).ok().map(ToString::to_string))
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.entries.borrow().get(key).cloned())
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.entries
            .borrow_mut()
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }
}

/// Loads and saves [`ZoomPreference`] records under one key.
///
/// Persistence is best-effort: failures are logged and otherwise ignored,
/// because losing a zoom preference must never stop the application.
#[derive(Clone)]
pub struct ZoomPreferenceStore {
    store: Rc<dyn KeyValueStore>,
    key: Cow<'static, str>,
}

impl core::fmt::Debug for ZoomPreferenceStore {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ZoomPreferenceStore")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

impl ZoomPreferenceStore {
    /// Creates a preference store over `store` using `key`.
    #[must_use]
    pub fn new(store: Rc<dyn KeyValueStore>, key: impl Into<Cow<'static, str>>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }

    /// Returns the storage key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Loads the stored preference, if there is a readable one.
    #[must_use]
    pub fn load(&self) -> Option<ZoomPreference> {
        let bytes = match self.store.get(&self.key) {
            Ok(bytes) => bytes?,
            Err(err) => {
                tracing::warn!(key = %self.key, error = %err, "could not read zoom preference");
                return None;
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(preference) => Some(preference),
            Err(err) => {
                tracing::warn!(key = %self.key, error = %err, "ignoring corrupt zoom preference");
                None
            }
        }
    }

    /// Persists `preference`.
    pub fn save(&self, preference: &ZoomPreference) {
        let bytes = match serde_json::to_vec(preference) {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::warn!(error = %err, "could not encode zoom preference");
                return;
            }
        };
        if let Err(err) = self.store.set(&self.key, &bytes) {
            tracing::warn!(key = %self.key, error = %err, "could not persist zoom preference");
        }
    }
}

/// Live zoom preference fed by density notifications.
#[derive(Debug)]
pub struct ZoomTracker {
    store: ZoomPreferenceStore,
    current: ZoomPreference,
    table: ScaleFactorTable,
    unsaved: bool,
}

impl ZoomTracker {
    /// Resumes the stored preference, or starts at the neutral step for
    /// `device_pixel_density` when nothing usable is stored.
    ///
    /// A stored preference recorded at another density is advanced once, as
    /// if the host had reported the change while nothing was listening. That
    /// step is not written back until [`persist`](Self::persist) or the next
    /// density change.
    #[must_use]
    pub fn load(store: ZoomPreferenceStore, device_pixel_density: f64) -> Self {
        let stored = store.load();
        let mut tracker = Self {
            store,
            current: stored.unwrap_or(ZoomPreference::initial(device_pixel_density)),
            table: ScaleFactorTable,
            unsaved: false,
        };
        if stored.is_some() && tracker.step(device_pixel_density).is_some() {
            tracker.unsaved = true;
        }
        tracker
    }

    /// The current preference.
    #[must_use]
    pub fn preference(&self) -> ZoomPreference {
        self.current
    }

    /// Scale multiplier for the current step.
    #[must_use]
    pub fn multiplier(&self) -> f64 {
        self.table.multiplier(self.current.zoom_step)
    }

    /// Returns `true` while a step taken by [`load`](Self::load) has not
    /// been written to the store.
    #[must_use]
    pub fn has_unsaved_change(&self) -> bool {
        self.unsaved
    }

    /// Writes a pending step back to the store. Does nothing when the
    /// store is already current.
    pub fn persist(&mut self) {
        if core::mem::take(&mut self.unsaved) {
            self.store.save(&self.current);
        }
    }

    /// Applies a host density notification.
    ///
    /// Returns the new preference when it changed; it has already been
    /// persisted by then.
    pub fn observe_density(&mut self, device_pixel_density: f64) -> Option<ZoomPreference> {
        let next = self.step(device_pixel_density)?;
        self.unsaved = false;
        self.store.save(&next);
        Some(next)
    }

    fn step(&mut self, device_pixel_density: f64) -> Option<ZoomPreference> {
        let next = self.current.advance(device_pixel_density)?;
        tracing::debug!(
            from = %self.current.zoom_step,
            to = %next.zoom_step,
            density = device_pixel_density,
            "zoom step changed"
        );
        self.current = next;
        Some(next)
    }
}
