//! Tasks at the device boundary.
//!
//! Drivers run on their own I/O threads and hand decoded messages over
//! bounded queues. Each monitor task drains its queue once per cycle and is
//! the only writer of the fields it publishes.

pub mod adcs;
pub mod clock_manager;
pub mod gps;

pub use adcs::{AdcsMonitor, AdcsReading};
pub use clock_manager::ClockManager;
pub use gps::{GpsMessage, GpsMonitor, GpsTime, GpsTimeSerializer};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Bounded device queue. Producers use `try_send` and drop on overflow.
pub fn device_queue<T>(depth: usize) -> (mpsc::Sender<T>, mpsc::Receiver<T>) {
    mpsc::channel(depth.max(1))
}

/// Result of draining a device queue for one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Drain {
    Received(usize),
    Empty,
    Disconnected,
}

/// Pulls every queued message, passing each to `handle`, without blocking.
pub(crate) fn drain<T>(rx: &mut mpsc::Receiver<T>, mut handle: impl FnMut(T)) -> Drain {
    let mut received = 0;
    loop {
        match rx.try_recv() {
            Ok(message) => {
                handle(message);
                received += 1;
            }
            Err(mpsc::error::TryRecvError::Empty) => break,
            Err(mpsc::error::TryRecvError::Disconnected) => {
                if received == 0 {
                    return Drain::Disconnected;
                }
                break;
            }
        }
    }
    if received == 0 {
        Drain::Empty
    } else {
        Drain::Received(received)
    }
}

/// Counts cycles since a device last reported.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub(crate) struct Staleness {
    limit_cycles: u32,
    silent_cycles: u32,
}

impl Staleness {
    pub(crate) fn new(limit_cycles: u32) -> Self {
        Self {
            limit_cycles: limit_cycles.max(1),
            silent_cycles: 0,
        }
    }

    pub(crate) fn heard(&mut self) {
        self.silent_cycles = 0;
    }

    /// Returns true exactly on the cycle the device turns stale.
    pub(crate) fn silent(&mut self) -> bool {
        self.silent_cycles = self.silent_cycles.saturating_add(1);
        self.silent_cycles == self.limit_cycles
    }
}
