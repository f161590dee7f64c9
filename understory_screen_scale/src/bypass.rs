// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A thread-wide escape hatch for code that needs physical geometry.
//!
//! Library code that cannot reach a [`ScreenScalingContext`] calls
//! [`perform_without_scaling`]. With no context alive the action simply runs;
//! while a context is alive it runs with interception bypassed.
//!
//! [`ScreenScalingContext`]: crate::ScreenScalingContext

use alloc::rc::Rc;
use core::cell::RefCell;

/// Runs the action it is given, in whatever environment it sets up.
pub type BypassHook = Rc<dyn Fn(&mut dyn FnMut())>;

std::thread_local! {
    static HOOK: RefCell<Option<BypassHook>> = const { RefCell::new(None) };
}

/// Installs `hook` for this thread, replacing any previous one.
///
/// Returns the installed hook so its owner can later remove exactly that
/// hook with [`remove_bypass_hook`].
pub fn inject_bypass_hook(hook: impl Fn(&mut dyn FnMut()) + 'static) -> BypassHook {
    let hook: BypassHook = Rc::new(hook);
    HOOK.with(|slot| *slot.borrow_mut() = Some(hook.clone()));
    hook
}

/// Removes the hook for this thread.
pub fn clear_bypass_hook() {
    HOOK.with(|slot| *slot.borrow_mut() = None);
}

/// Removes `hook` if it is still the one installed on this thread.
///
/// Returns `false`, leaving the slot alone, when another hook replaced it.
pub fn remove_bypass_hook(hook: &BypassHook) -> bool {
    HOOK.with(|slot| {
        let mut slot = slot.borrow_mut();
        let installed = slot.as_ref().is_some_and(|current| Rc::ptr_eq(current, hook));
        if installed {
            *slot = None;
        }
        installed
    })
}

/// Returns `true` if a hook is installed on this thread.
#[must_use]
pub fn has_bypass_hook() -> bool {
    HOOK.with(|slot| slot.borrow().is_some())
}

/// Runs `action` without screen scaling and returns its result.
///
/// # Panics
///
/// Panics if the installed hook returns without running the action.
pub fn perform_without_scaling<T>(action: impl FnOnce() -> T) -> T {
    let Some(hook) = HOOK.with(|slot| slot.borrow().clone()) else {
        return action();
    };
    let mut action = Some(action);
    let mut result = None;
    hook(&mut || {
        if let Some(action) = action.take() {
            result = Some(action());
        }
    });
    match result {
        Some(result) => result,
        None => panic!("bypass hook returned without running its action"),
    }
}
