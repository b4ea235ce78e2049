use std::sync::{Arc, Mutex};

use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

pub trait TimeSource {
    fn now(&self) -> OffsetDateTime;

    // Return an ISO timestamp
    fn current_time(&self) -> String {
        self.now()
            .format(&Rfc3339)
            .unwrap_or_else(|_| self.now().unix_timestamp().to_string())
    }
}

#[derive(Clone)]
pub struct SystemTime {}

impl TimeSource for SystemTime {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// A settable clock for tests.
#[derive(Clone)]
pub struct FixedTime {
    time: Arc<Mutex<OffsetDateTime>>,
}

impl FixedTime {
    pub fn new(time: OffsetDateTime) -> Self {
        FixedTime {
            time: Arc::new(Mutex::new(time)),
        }
    }

    pub fn advance(&self, by: time::Duration) {
        if let Ok(mut time) = self.time.lock() {
            *time += by;
        }
    }
}

impl TimeSource for FixedTime {
    fn now(&self) -> OffsetDateTime {
        match self.time.lock() {
            Ok(time) => *time,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}
