//! Cached bus availability with explicit re-probe control.
//!
//! The first [`BusAvailability::check`] probes the transport; the verdict is
//! cached. With no re-probe interval the cache is never refreshed
//! automatically. With an interval, an *unavailable* verdict older than the
//! interval is probed again on the next check (half-open). Callers can always
//! force a fresh probe with [`BusAvailability::reprobe`].

use crate::BusTransport;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Current availability verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AvailabilityState {
    /// Never probed.
    Unknown,
    Available { since: Instant },
    Unavailable { since: Instant },
}

impl AvailabilityState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Available { .. } => "available",
            Self::Unavailable { .. } => "unavailable",
        }
    }
}

pub struct BusAvailability {
    state: Mutex<AvailabilityState>,
    reprobe_after: Option<Duration>,
}

impl BusAvailability {
    pub fn new(reprobe_after: Option<Duration>) -> Self {
        Self {
            state: Mutex::new(AvailabilityState::Unknown),
            reprobe_after,
        }
    }

    /// Whether the bus is reachable, probing only when the cache allows it.
    pub async fn check(&self, transport: &dyn BusTransport) -> bool {
        let mut state = self.state.lock().await;

        match *state {
            AvailabilityState::Available { .. } => return true,
            AvailabilityState::Unavailable { since } => match self.reprobe_after {
                Some(after) if since.elapsed() >= after => {
                    debug!(
                        unavailable_for_ms = since.elapsed().as_millis() as u64,
                        "Re-probing bus availability"
                    );
                }
                _ => return false,
            },
            AvailabilityState::Unknown => {}
        }

        let available = transport.is_available().await;
        *state = verdict(available);

        if available {
            info!("Bloodbank bus is available");
        } else {
            warn!("bb command not found - events will only be written to WAL");
        }
        available
    }

    /// Drop the cached verdict and probe again.
    pub async fn reprobe(&self, transport: &dyn BusTransport) -> bool {
        *self.state.lock().await = AvailabilityState::Unknown;
        self.check(transport).await
    }

    /// Record that a delivery found the bus unreachable.
    pub async fn mark_unavailable(&self) {
        let mut state = self.state.lock().await;
        if !matches!(*state, AvailabilityState::Unavailable { .. }) {
            warn!("Marking bus unavailable after unreachable delivery");
            *state = AvailabilityState::Unavailable {
                since: Instant::now(),
            };
        }
    }

    pub async fn state(&self) -> AvailabilityState {
        *self.state.lock().await
    }
}

fn verdict(available: bool) -> AvailabilityState {
    let since = Instant::now();
    if available {
        AvailabilityState::Available { since }
    } else {
        AvailabilityState::Unavailable { since }
    }
}
