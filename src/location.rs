//! Location service boundary.
//!
//! A watch hands back a [`Subscription`] that owns the receiving end of a FIFO
//! channel. The recorder drains it on its own event loop; cancelling drops the
//! receiver, so no event is delivered once `cancel` has returned.

use crate::config::Tracking;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchOptions {
    pub high_accuracy: bool,
    pub max_age_ms: u64,
    pub fix_timeout_ms: u64,
}

impl From<&Tracking> for WatchOptions {
    fn from(t: &Tracking) -> Self {
        Self {
            high_accuracy: t.high_accuracy,
            max_age_ms: t.max_age_ms,
            fix_timeout_ms: t.fix_timeout_ms,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LocationError {
    #[error("location permission denied")]
    PermissionDenied,
    #[error("position unavailable: {0}")]
    PositionUnavailable(String),
    #[error("no fix within {0} ms")]
    Timeout(u64),
}

/// A single successful reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fix {
    pub latitude: f64,
    pub longitude: f64,
    pub at_millis: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LocationEvent {
    Fix(Fix),
    Error(LocationError),
}

pub trait LocationService {
    fn watch(&mut self, opts: &WatchOptions) -> Result<Subscription, LocationError>;
}

static NEXT_SUBSCRIPTION: AtomicU64 = AtomicU64::new(1);

pub struct Subscription {
    id: u64,
    events: Receiver<LocationEvent>,
}

impl Subscription {
    pub fn new(events: Receiver<LocationEvent>) -> Self {
        Self {
            id: NEXT_SUBSCRIPTION.fetch_add(1, Ordering::Relaxed),
            events,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Next queued event, if any. `None` when the queue is empty or the
    /// producing side has gone away.
    pub fn try_next(&self) -> Option<LocationEvent> {
        match self.events.try_recv() {
            Ok(ev) => Some(ev),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    pub fn cancel(self) {
        drop(self.events);
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

type Slot = Arc<Mutex<Option<Sender<LocationEvent>>>>;

/// Location service fed by hand (drive replays, tests, or a reader thread).
///
/// Each `watch` replaces the previous channel, so at most one subscription
/// receives events.
#[derive(Default)]
pub struct ManualFeed {
    slot: Slot,
    deny: bool,
    last_options: Option<WatchOptions>,
}

impl ManualFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// A feed whose watches are refused, as when the user denies permission.
    pub fn denied() -> Self {
        Self {
            deny: true,
            ..Self::default()
        }
    }

    pub fn feeder(&self) -> FixFeeder {
        FixFeeder {
            slot: Arc::clone(&self.slot),
        }
    }

    pub fn last_options(&self) -> Option<WatchOptions> {
        self.last_options
    }
}

impl LocationService for ManualFeed {
    fn watch(&mut self, opts: &WatchOptions) -> Result<Subscription, LocationError> {
        self.last_options = Some(*opts);
        if self.deny {
            return Err(LocationError::PermissionDenied);
        }
        let (tx, rx) = mpsc::channel();
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        *slot = Some(tx);
        Ok(Subscription::new(rx))
    }
}

/// Producer handle for a [`ManualFeed`]. Cheap to clone and `Send`.
#[derive(Clone)]
pub struct FixFeeder {
    slot: Slot,
}

impl FixFeeder {
    /// Queues a fix. Returns `false` when no live subscription will receive it.
    pub fn push_fix(&self, latitude: f64, longitude: f64, at_millis: i64) -> bool {
        self.send(LocationEvent::Fix(Fix {
            latitude,
            longitude,
            at_millis,
        }))
    }

    pub fn push_error(&self, err: LocationError) -> bool {
        self.send(LocationEvent::Error(err))
    }

    fn send(&self, ev: LocationEvent) -> bool {
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        match slot.as_ref() {
            Some(tx) => {
                if tx.send(ev).is_ok() {
                    true
                } else {
                    *slot = None;
                    false
                }
            }
            None => false,
        }
    }
}
