//! Injectable time source.
//!
//! `now` must resolve to the workflow's deterministic time under the durable
//! runtime, never wall-clock directly, so a replayed workflow renders the
//! same template twice identically (Design Note: "Durable workflow engine
//! coupling").

use chrono::{DateTime, Utc};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Fixed-time clock for deterministic replay and tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}
