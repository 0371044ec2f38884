//! Shared state store.
//!
//! One explicit context struct holds the ownership record, the surface
//! flags, and the suspend/lock bits, observable through typed key-level
//! subscriptions. There is no ambient global: components receive a
//! [`KitState`] handle and register subscribers whose teardown handles are
//! collected in a [`SubscriptionSet`] for deterministic shutdown.
//!
//! Setters no-op when the value is already the target, so a subscriber that
//! re-enters a setter while a prior notification for the same key is still
//! settling converges instead of looping. Subscribers run outside the store
//! lock and must not block.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Keys for field-level subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateKey {
    Pid,
    ScriptPath,
    SurfaceVisible,
    IgnoreBlur,
    ModifiedByUser,
    Suspended,
    ScreenLocked,
    SuspendWatchers,
    Debugging,
}

/// A single field mutation, delivered to subscribers of its key.
#[derive(Debug, Clone)]
pub enum StateChange {
    Pid(Option<u32>),
    ScriptPath(Option<PathBuf>),
    SurfaceVisible(bool),
    IgnoreBlur(bool),
    ModifiedByUser(bool),
    Suspended(bool),
    ScreenLocked(bool),
    SuspendWatchers(bool),
    Debugging(bool),
}

impl StateChange {
    pub fn key(&self) -> StateKey {
        match self {
            StateChange::Pid(_) => StateKey::Pid,
            StateChange::ScriptPath(_) => StateKey::ScriptPath,
            StateChange::SurfaceVisible(_) => StateKey::SurfaceVisible,
            StateChange::IgnoreBlur(_) => StateKey::IgnoreBlur,
            StateChange::ModifiedByUser(_) => StateKey::ModifiedByUser,
            StateChange::Suspended(_) => StateKey::Suspended,
            StateChange::ScreenLocked(_) => StateKey::ScreenLocked,
            StateChange::SuspendWatchers(_) => StateKey::SuspendWatchers,
            StateChange::Debugging(_) => StateKey::Debugging,
        }
    }
}

/// Point-in-time view of the ownership record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OwnershipSnapshot {
    pub pid: Option<u32>,
    pub script_path: Option<PathBuf>,
    pub surface_visible: bool,
}

type Callback = Arc<dyn Fn(&StateChange) + Send + Sync>;

struct Subscriber {
    id: u64,
    callback: Callback,
}

#[derive(Default)]
struct StateInner {
    pid: Option<u32>,
    script_path: Option<PathBuf>,
    surface_visible: bool,
    ignore_blur: bool,
    modified_by_user: bool,
    suspended: bool,
    screen_locked: bool,
    suspend_watchers: bool,
    debugging: bool,
    subscribers: HashMap<StateKey, Vec<Subscriber>>,
    next_subscriber_id: u64,
}

/// Handle to the shared state store. Cheap to clone.
#[derive(Clone)]
pub struct KitState {
    inner: Arc<Mutex<StateInner>>,
}

impl Default for KitState {
    fn default() -> Self {
        Self::new()
    }
}

impl KitState {
    pub fn new() -> Self {
        KitState {
            inner: Arc::new(Mutex::new(StateInner::default())),
        }
    }

    // ------------------------------------------------------------------
    // Getters
    // ------------------------------------------------------------------

    pub fn pid(&self) -> Option<u32> {
        self.inner.lock().pid
    }

    pub fn script_path(&self) -> Option<PathBuf> {
        self.inner.lock().script_path.clone()
    }

    pub fn surface_visible(&self) -> bool {
        self.inner.lock().surface_visible
    }

    pub fn ignore_blur(&self) -> bool {
        self.inner.lock().ignore_blur
    }

    pub fn modified_by_user(&self) -> bool {
        self.inner.lock().modified_by_user
    }

    pub fn suspended(&self) -> bool {
        self.inner.lock().suspended
    }

    pub fn screen_locked(&self) -> bool {
        self.inner.lock().screen_locked
    }

    pub fn suspend_watchers(&self) -> bool {
        self.inner.lock().suspend_watchers
    }

    pub fn debugging(&self) -> bool {
        self.inner.lock().debugging
    }

    pub fn ownership(&self) -> OwnershipSnapshot {
        let inner = self.inner.lock();
        OwnershipSnapshot {
            pid: inner.pid,
            script_path: inner.script_path.clone(),
            surface_visible: inner.surface_visible,
        }
    }

    /// Whether `pid` is the worker currently bound to the surface.
    pub fn owns_surface(&self, pid: u32) -> bool {
        self.inner.lock().pid == Some(pid)
    }

    // ------------------------------------------------------------------
    // Setters - each is a no-op when the value is unchanged
    // ------------------------------------------------------------------

    pub fn set_pid(&self, pid: Option<u32>) {
        self.mutate(|inner| {
            if inner.pid == pid {
                return None;
            }
            inner.pid = pid;
            Some(StateChange::Pid(pid))
        });
    }

    pub fn set_script_path(&self, path: Option<PathBuf>) {
        self.mutate(|inner| {
            if inner.script_path == path {
                return None;
            }
            inner.script_path = path.clone();
            Some(StateChange::ScriptPath(path))
        });
    }

    pub fn set_surface_visible(&self, visible: bool) {
        self.mutate(|inner| {
            if inner.surface_visible == visible {
                return None;
            }
            inner.surface_visible = visible;
            Some(StateChange::SurfaceVisible(visible))
        });
    }

    pub fn set_ignore_blur(&self, ignore: bool) {
        self.mutate(|inner| {
            if inner.ignore_blur == ignore {
                return None;
            }
            inner.ignore_blur = ignore;
            Some(StateChange::IgnoreBlur(ignore))
        });
    }

    pub fn set_modified_by_user(&self, modified: bool) {
        self.mutate(|inner| {
            if inner.modified_by_user == modified {
                return None;
            }
            inner.modified_by_user = modified;
            Some(StateChange::ModifiedByUser(modified))
        });
    }

    pub fn set_suspended(&self, suspended: bool) {
        self.mutate(|inner| {
            if inner.suspended == suspended {
                return None;
            }
            inner.suspended = suspended;
            Some(StateChange::Suspended(suspended))
        });
    }

    pub fn set_screen_locked(&self, locked: bool) {
        self.mutate(|inner| {
            if inner.screen_locked == locked {
                return None;
            }
            inner.screen_locked = locked;
            Some(StateChange::ScreenLocked(locked))
        });
    }

    pub fn set_suspend_watchers(&self, suspend: bool) {
        self.mutate(|inner| {
            if inner.suspend_watchers == suspend {
                return None;
            }
            inner.suspend_watchers = suspend;
            Some(StateChange::SuspendWatchers(suspend))
        });
    }

    pub fn set_debugging(&self, debugging: bool) {
        self.mutate(|inner| {
            if inner.debugging == debugging {
                return None;
            }
            inner.debugging = debugging;
            Some(StateChange::Debugging(debugging))
        });
    }

    /// Clear the ownership record in one pass (worker exit, surface hide).
    pub fn clear_ownership(&self) {
        self.set_pid(None);
        self.set_script_path(None);
    }

    // ------------------------------------------------------------------
    // Subscriptions
    // ------------------------------------------------------------------

    /// Register a subscriber for one key. The returned handle removes the
    /// subscriber when dropped or cancelled.
    pub fn subscribe<F>(&self, key: StateKey, callback: F) -> Subscription
    where
        F: Fn(&StateChange) + Send + Sync + 'static,
    {
        let mut inner = self.inner.lock();
        let id = inner.next_subscriber_id;
        inner.next_subscriber_id += 1;
        inner.subscribers.entry(key).or_default().push(Subscriber {
            id,
            callback: Arc::new(callback),
        });
        Subscription {
            state: Arc::downgrade(&self.inner),
            key,
            id,
        }
    }

    /// Apply a mutation, then notify subscribers outside the lock.
    fn mutate<F>(&self, f: F)
    where
        F: FnOnce(&mut StateInner) -> Option<StateChange>,
    {
        let (change, callbacks) = {
            let mut inner = self.inner.lock();
            let Some(change) = f(&mut inner) else {
                return;
            };
            let callbacks: Vec<Callback> = inner
                .subscribers
                .get(&change.key())
                .map(|subs| subs.iter().map(|s| Arc::clone(&s.callback)).collect())
                .unwrap_or_default();
            (change, callbacks)
        };
        debug!(change = ?change, "State changed");
        for callback in callbacks {
            callback(&change);
        }
    }
}

/// Teardown handle for one subscriber. Dropping it unsubscribes.
pub struct Subscription {
    state: std::sync::Weak<Mutex<StateInner>>,
    key: StateKey,
    id: u64,
}

impl Subscription {
    /// Explicitly remove the subscriber now.
    pub fn cancel(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.state.upgrade() {
            let mut inner = inner.lock();
            if let Some(subs) = inner.subscribers.get_mut(&self.key) {
                subs.retain(|s| s.id != self.id);
            }
        }
    }
}

/// Collects subscription handles so shutdown tears them all down in one
/// place, in registration order.
#[derive(Default)]
pub struct SubscriptionSet {
    subscriptions: Vec<Subscription>,
}

impl SubscriptionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, subscription: Subscription) {
        self.subscriptions.push(subscription);
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    /// Drop every handle, unsubscribing all collected subscribers.
    pub fn clear(&mut self) {
        self.subscriptions.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_setter_notifies_subscriber() {
        let state = KitState::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = Arc::clone(&seen);

        let _sub = state.subscribe(StateKey::SurfaceVisible, move |change| {
            assert!(matches!(change, StateChange::SurfaceVisible(true)));
            seen_clone.fetch_add(1, Ordering::SeqCst);
        });

        state.set_surface_visible(true);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unchanged_value_is_noop() {
        let state = KitState::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = Arc::clone(&seen);

        let _sub = state.subscribe(StateKey::IgnoreBlur, move |_| {
            seen_clone.fetch_add(1, Ordering::SeqCst);
        });

        state.set_ignore_blur(true);
        state.set_ignore_blur(true); // re-entrant no-op
        state.set_ignore_blur(true);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_subscriber_only_sees_its_key() {
        let state = KitState::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = Arc::clone(&seen);

        let _sub = state.subscribe(StateKey::Suspended, move |_| {
            seen_clone.fetch_add(1, Ordering::SeqCst);
        });

        state.set_screen_locked(true);
        state.set_surface_visible(true);
        assert_eq!(seen.load(Ordering::SeqCst), 0);

        state.set_suspended(true);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_dropped_subscription_stops_notifications() {
        let state = KitState::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = Arc::clone(&seen);

        let sub = state.subscribe(StateKey::Debugging, move |_| {
            seen_clone.fetch_add(1, Ordering::SeqCst);
        });

        state.set_debugging(true);
        sub.cancel();
        state.set_debugging(false);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_subscription_set_clear_tears_down_all() {
        let state = KitState::new();
        let seen = Arc::new(AtomicUsize::new(0));

        let mut set = SubscriptionSet::new();
        for _ in 0..3 {
            let seen_clone = Arc::clone(&seen);
            set.add(state.subscribe(StateKey::Pid, move |_| {
                seen_clone.fetch_add(1, Ordering::SeqCst);
            }));
        }
        assert_eq!(set.len(), 3);

        state.set_pid(Some(1));
        assert_eq!(seen.load(Ordering::SeqCst), 3);

        set.clear();
        state.set_pid(Some(2));
        assert_eq!(seen.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_subscriber_can_reenter_setter() {
        // A subscriber writing the same value back must settle, not loop.
        let state = KitState::new();
        let state_clone = state.clone();

        let _sub = state.subscribe(StateKey::SurfaceVisible, move |change| {
            if let StateChange::SurfaceVisible(v) = change {
                state_clone.set_surface_visible(*v);
            }
        });

        state.set_surface_visible(true);
        assert!(state.surface_visible());
    }

    #[test]
    fn test_ownership_snapshot() {
        let state = KitState::new();
        state.set_pid(Some(77));
        state.set_script_path(Some(PathBuf::from("/kenv/scripts/foo.js")));
        state.set_surface_visible(true);

        let snap = state.ownership();
        assert_eq!(snap.pid, Some(77));
        assert_eq!(snap.script_path, Some(PathBuf::from("/kenv/scripts/foo.js")));
        assert!(snap.surface_visible);
        assert!(state.owns_surface(77));
        assert!(!state.owns_surface(78));

        state.clear_ownership();
        assert_eq!(state.pid(), None);
        assert_eq!(state.script_path(), None);
    }
}
