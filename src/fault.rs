use heapless::Vec;
use serde::{Deserialize, Serialize};

const MAX_FAULT_HISTORY: usize = 64;

/// Recoverable faults absorbed by the component that detected them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FaultKind {
    StoreWriteFailed,
    DetumbleTimeout,
    AdcsUnhealthy,
    GpsUnhealthy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaultRecord {
    pub id: u32,
    pub kind: FaultKind,
    pub cycle: u64,
    pub resolved_cycle: Option<u64>,
}

impl FaultRecord {
    pub fn is_active(&self) -> bool {
        self.resolved_cycle.is_none()
    }
}

#[derive(Debug)]
pub struct FaultLog {
    history: Vec<FaultRecord, MAX_FAULT_HISTORY>,
    next_id: u32,
    total_recorded: u32,
}

impl FaultLog {
    pub fn new() -> Self {
        Self {
            history: Vec::new(),
            next_id: 1,
            total_recorded: 0,
        }
    }

    pub fn record(&mut self, kind: FaultKind, cycle: u64) -> u32 {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        self.total_recorded = self.total_recorded.saturating_add(1);

        if self.history.is_full() {
            self.history.remove(0);
        }
        let _ = self.history.push(FaultRecord {
            id,
            kind,
            cycle,
            resolved_cycle: None,
        });
        id
    }

    /// Marks every active fault of `kind` resolved. Returns how many were.
    pub fn resolve(&mut self, kind: FaultKind, cycle: u64) -> usize {
        let mut resolved = 0;
        for record in self.history.iter_mut().filter(|r| r.kind == kind && r.is_active()) {
            record.resolved_cycle = Some(cycle);
            resolved += 1;
        }
        resolved
    }

    pub fn is_active(&self, kind: FaultKind) -> bool {
        self.history.iter().any(|r| r.kind == kind && r.is_active())
    }

    pub fn get_active_faults(&self) -> impl Iterator<Item = &FaultRecord> {
        self.history.iter().filter(|r| r.is_active())
    }

    /// Most recent faults, oldest first.
    pub fn get_history(&self) -> &[FaultRecord] {
        &self.history
    }

    pub fn count(&self, kind: FaultKind) -> usize {
        self.history.iter().filter(|r| r.kind == kind).count()
    }

    pub fn total_recorded(&self) -> u32 {
        self.total_recorded
    }
}

impl Default for FaultLog {
    fn default() -> Self {
        Self::new()
    }
}
