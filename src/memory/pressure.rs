use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::constants::{
    PRESSURE_CRITICAL_RATIO, PRESSURE_HIGH_RATIO, PRESSURE_LOW_RATIO, PRESSURE_MEDIUM_RATIO,
};

/// Severity of memory usage relative to the configured limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum PressureLevel {
    /// Below every threshold, or no limit configured.
    #[default]
    None = 0,
    /// Low priority caches should be trimmed.
    Low = 1,
    /// Low and medium priority caches should be trimmed.
    Medium = 2,
    /// All caches should be trimmed.
    High = 3,
    /// All caches trimmed plus aggressive lifecycle cleanup.
    Critical = 4,
}

impl PressureLevel {
    /// Returns the level name.
    pub fn as_str(self) -> &'static str {
        match self {
            PressureLevel::None => "none",
            PressureLevel::Low => "low",
            PressureLevel::Medium => "medium",
            PressureLevel::High => "high",
            PressureLevel::Critical => "critical",
        }
    }

    /// Returns the next lower level, if any.
    pub fn lower(self) -> Option<PressureLevel> {
        match self {
            PressureLevel::None => None,
            PressureLevel::Low => Some(PressureLevel::None),
            PressureLevel::Medium => Some(PressureLevel::Low),
            PressureLevel::High => Some(PressureLevel::Medium),
            PressureLevel::Critical => Some(PressureLevel::High),
        }
    }

    /// Levels whose subscribers hear about a transition to `self`: `self`
    /// first, then every lower level except `None`.
    pub fn cascade(self) -> impl Iterator<Item = PressureLevel> {
        std::iter::successors(Some(self), |level| {
            level.lower().filter(|l| *l != PressureLevel::None)
        })
    }
}

impl fmt::Display for PressureLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Usage ratios at which each pressure level starts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PressureThresholds {
    pub low: f64,
    pub medium: f64,
    pub high: f64,
    pub critical: f64,
}

impl Default for PressureThresholds {
    fn default() -> Self {
        Self {
            low: PRESSURE_LOW_RATIO,
            medium: PRESSURE_MEDIUM_RATIO,
            high: PRESSURE_HIGH_RATIO,
            critical: PRESSURE_CRITICAL_RATIO,
        }
    }
}

impl PressureThresholds {
    /// Returns the highest level whose threshold `ratio` reaches.
    pub fn level_for(&self, ratio: f64) -> PressureLevel {
        if ratio >= self.critical {
            PressureLevel::Critical
        } else if ratio >= self.high {
            PressureLevel::High
        } else if ratio >= self.medium {
            PressureLevel::Medium
        } else if ratio >= self.low {
            PressureLevel::Low
        } else {
            PressureLevel::None
        }
    }
}

/// Callback invoked when a pressure level is reached.
pub type PressureCallback = Arc<dyn Fn(PressureLevel) + Send + Sync>;

struct Subscriber {
    id: u64,
    level: PressureLevel,
    callback: PressureCallback,
}

/// Registry of pressure level callbacks.
#[derive(Default)]
pub(crate) struct PressureSubscribers {
    next_id: AtomicU64,
    entries: Mutex<Vec<Subscriber>>,
}

impl PressureSubscribers {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn subscribe(
        self: &Arc<Self>,
        level: PressureLevel,
        callback: PressureCallback,
    ) -> PressureSubscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries.lock().push(Subscriber {
            id,
            level,
            callback,
        });
        PressureSubscription {
            id,
            subscribers: Arc::downgrade(self),
        }
    }

    fn unsubscribe(&self, id: u64) -> bool {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|s| s.id != id);
        entries.len() != before
    }

    /// Calls the subscribers of every level in `level.cascade()`.
    ///
    /// Callbacks run without the registry lock held, so they may subscribe
    /// or unsubscribe.
    pub(crate) fn notify(&self, level: PressureLevel) {
        for notified in level.cascade() {
            let callbacks: Vec<PressureCallback> = self
                .entries
                .lock()
                .iter()
                .filter(|s| s.level == notified)
                .map(|s| s.callback.clone())
                .collect();
            for callback in callbacks {
                callback(notified);
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub(crate) fn clear(&self) {
        let entries = std::mem::take(&mut *self.entries.lock());
        drop(entries);
    }
}

/// Handle returned by
/// [`BlockRuntime::on_memory_pressure_level`](crate::BlockRuntime::on_memory_pressure_level).
///
/// The callback stays registered until [`unsubscribe`](Self::unsubscribe)
/// is called; dropping the handle does not remove it.
#[derive(Debug)]
pub struct PressureSubscription {
    id: u64,
    subscribers: Weak<PressureSubscribers>,
}

impl PressureSubscription {
    /// Removes the callback. Returns false if it was already gone.
    pub fn unsubscribe(self) -> bool {
        self.subscribers
            .upgrade()
            .is_some_and(|subscribers| subscribers.unsubscribe(self.id))
    }
}
