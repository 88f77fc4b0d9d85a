use std::sync::Arc;

use dashmap::DashMap;

use crate::registry::WindowRegistry;
use crate::types::{Observation, WindowId, WindowStatus, WindowTarget};

// ---------------------------------------------------------------------------
// WindowStore
// ---------------------------------------------------------------------------

/// Latest observation per registered window.
///
/// One writer (the monitor engine, sweep or ad-hoc) and many readers (HTTP
/// handlers). Every write replaces a whole record while holding only that
/// record's shard lock, so readers never wait on a sweep and never see a
/// half-written observation.
pub struct WindowStore {
    /// Registry order, used for `get_all`.
    targets: Vec<WindowTarget>,
    /// window_id → latest observation
    observations: DashMap<WindowId, Observation>,
}

impl WindowStore {
    pub fn new(registry: &WindowRegistry) -> Arc<Self> {
        let observations = DashMap::with_capacity(registry.len());
        for target in registry.targets() {
            observations.insert(target.id(), Observation::unchecked());
        }
        Arc::new(Self {
            targets: registry.targets().to_vec(),
            observations,
        })
    }

    pub fn contains(&self, id: &WindowId) -> bool {
        self.observations.contains_key(id)
    }

    /// Copy of the current observation. `None` only for windows outside the registry.
    pub fn get(&self, id: &WindowId) -> Option<Observation> {
        if !self.contains(id) {
            return None;
        }
        Some(
            self.observations
                .get(id)
                .map(|o| o.clone())
                .unwrap_or_else(Observation::unchecked),
        )
    }

    /// Every window in registry order, each record copied under its own lock.
    pub fn get_all(&self) -> Vec<(WindowTarget, Observation)> {
        self.targets
            .iter()
            .map(|t| {
                let obs = self
                    .observations
                    .get(&t.id())
                    .map(|o| o.clone())
                    .unwrap_or_else(Observation::unchecked);
                (t.clone(), obs)
            })
            .collect()
    }

    /// Atomically replace a window's observation. Ignored for unknown windows.
    pub fn put(&self, id: &WindowId, observation: Observation) -> bool {
        self.apply(id, move |_| (observation, ())).is_some()
    }

    /// Read-modify-write of one record under its lock.
    ///
    /// `f` receives the previous observation and returns the replacement plus a
    /// value handed back to the caller. `last_checked_at` never moves backwards.
    /// Returns `None` for windows outside the registry.
    pub fn apply<F, T>(&self, id: &WindowId, f: F) -> Option<T>
    where
        F: FnOnce(&Observation) -> (Observation, T),
    {
        let mut entry = self.observations.get_mut(id)?;
        let (mut next, out) = f(entry.value());
        if next.last_checked_at < entry.last_checked_at {
            next.last_checked_at = entry.last_checked_at;
        }
        *entry = next;
        Some(out)
    }

    /// Number of windows currently in each status, for the health endpoint.
    pub fn status_counts(&self) -> Vec<(WindowStatus, usize)> {
        let all = [
            WindowStatus::Unchecked,
            WindowStatus::Ok,
            WindowStatus::NoResults,
            WindowStatus::Error,
            WindowStatus::RateLimited,
        ];
        all.iter()
            .map(|status| {
                let n = self
                    .observations
                    .iter()
                    .filter(|entry| entry.value().status == *status)
                    .count();
                (*status, n)
            })
            .collect()
    }

    pub fn window_count(&self) -> usize {
        self.targets.len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
