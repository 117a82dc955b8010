// Folder trigger loop
// Decides on a fixed cadence whether the report job should run, using one of
// three interchangeable strategies (cooldown, name diffing, recency).

pub mod engine;
pub mod state;
pub mod strategy;

use chrono::{DateTime, Utc};
use std::sync::Mutex;

pub use engine::{ShutdownHandle, TickOutcome, TriggerLoop, TriggerLoopConfig};
pub use state::{SeenFileSet, SeenFileStore, TriggerPhase, TriggerState};
pub use strategy::{
    build_strategy, CooldownStrategy, Detection, NameDiffStrategy, RecencyStrategy, SkipReason,
    TriggerStrategy,
};

/// Source of "now" for tick decisions
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}
