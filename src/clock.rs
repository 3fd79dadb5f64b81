use std::sync::Arc;

use chrono::{DateTime, Utc};

/// Source of the current time for gate checks and age computation
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// A shared reference to a clock
pub type SharedClock = Arc<dyn Clock>;

/// Wall clock time
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

impl SystemClock {
    pub fn shared() -> SharedClock {
        Arc::new(Self)
    }
}

/// A clock frozen at a given instant, for tests and replays
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

impl FixedClock {
    pub fn shared(at: DateTime<Utc>) -> SharedClock {
        Arc::new(Self(at))
    }
}
