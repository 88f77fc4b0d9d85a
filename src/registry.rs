use std::collections::HashSet;

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::types::{WindowId, WindowTarget};

/// Fixed, ordered set of windows monitored for the process lifetime.
#[derive(Debug, Clone)]
pub struct WindowRegistry {
    targets: Vec<WindowTarget>,
}

impl WindowRegistry {
    /// Validates and freezes the targets. Any error here is fatal at startup.
    pub fn new(targets: Vec<WindowTarget>) -> Result<Self> {
        if targets.is_empty() {
            return Err(AppError::Registry("no windows configured".to_string()));
        }

        let mut seen = HashSet::with_capacity(targets.len());
        for target in &targets {
            let id = target.id();
            if !is_iata(&target.origin) || !is_iata(&target.destination) {
                return Err(AppError::Registry(format!("{id}: airports must be 3-letter IATA codes")));
            }
            if target.origin == target.destination {
                return Err(AppError::Registry(format!("{id}: origin and destination are the same")));
            }
            if let Some(stop) = &target.preferred_stopover {
                if !is_iata(stop) {
                    return Err(AppError::Registry(format!("{id}: preferred stopover '{stop}' is not an IATA code")));
                }
            }
            if target.return_date <= target.outbound_date {
                return Err(AppError::Registry(format!("{id}: return date must be after outbound date")));
            }
            if !seen.insert(id.clone()) {
                return Err(AppError::Registry(format!("{id}: configured twice")));
            }
        }

        Ok(Self { targets })
    }

    pub fn from_config(cfg: &Config) -> Result<Self> {
        let targets = cfg
            .target_windows
            .iter()
            .map(|&(outbound_date, return_date)| WindowTarget {
                origin: cfg.origin.clone(),
                destination: cfg.destination.clone(),
                outbound_date,
                return_date,
                preferred_stopover: cfg.preferred_stop.clone(),
                max_stopover_minutes: cfg.max_stopover_minutes,
            })
            .collect();
        Self::new(targets)
    }

    pub fn targets(&self) -> &[WindowTarget] {
        &self.targets
    }

    pub fn get(&self, id: &WindowId) -> Option<&WindowTarget> {
        self.targets.iter().find(|t| &t.id() == id)
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }
}

pub fn is_iata(code: &str) -> bool {
    code.len() == 3 && code.bytes().all(|b| b.is_ascii_uppercase())
}
