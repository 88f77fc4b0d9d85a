//! Shared engine health for the /health endpoint.
//! Updated by the monitor engine, read by the API and the TUI.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};

use chrono::{DateTime, TimeZone, Utc};

/// Sweep and alert counters. All fields are plain atomics so handlers never
/// wait on the engine.
#[derive(Default)]
pub struct HealthState {
    /// True while a sweep is iterating the registry.
    pub sweep_running: AtomicBool,
    pub sweeps_completed: AtomicU64,
    /// Unix millis of the last finished sweep (0 = none yet).
    pub last_sweep_at_ms: AtomicI64,
    pub windows_checked: AtomicU64,
    pub alerts_fired: AtomicU64,
    pub notify_failures: AtomicU64,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sweep_started(&self) {
        self.sweep_running.store(true, Ordering::Relaxed);
    }

    pub fn sweep_finished(&self, at: DateTime<Utc>) {
        self.sweep_running.store(false, Ordering::Relaxed);
        self.sweeps_completed.fetch_add(1, Ordering::Relaxed);
        self.last_sweep_at_ms.store(at.timestamp_millis(), Ordering::Relaxed);
    }

    pub fn inc_windows_checked(&self) {
        self.windows_checked.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_alerts_fired(&self) {
        self.alerts_fired.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_notify_failures(&self) {
        self.notify_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn sweep_running(&self) -> bool {
        self.sweep_running.load(Ordering::Relaxed)
    }

    pub fn sweeps_completed(&self) -> u64 {
        self.sweeps_completed.load(Ordering::Relaxed)
    }

    pub fn last_sweep_at(&self) -> Option<DateTime<Utc>> {
        match self.last_sweep_at_ms.load(Ordering::Relaxed) {
            0 => None,
            ms => Utc.timestamp_millis_opt(ms).single(),
        }
    }

    pub fn windows_checked(&self) -> u64 {
        self.windows_checked.load(Ordering::Relaxed)
    }

    pub fn alerts_fired(&self) -> u64 {
        self.alerts_fired.load(Ordering::Relaxed)
    }

    pub fn notify_failures(&self) -> u64 {
        self.notify_failures.load(Ordering::Relaxed)
    }
}
