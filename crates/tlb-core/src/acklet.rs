//! Reverse-direction (ACK) path pinning.
//!
//! An acklet stays on its path while the reverse direction keeps talking.
//! A gap longer than the acklet timeout is a safe point to re-select; a gap
//! longer than the black-hole threshold means the pinned path has probably
//! been silently eating packets, so the next acklet is forced elsewhere.

use crate::config::AckletConfig;
use crate::time::SimTime;
use crate::topology::{FlowId, PathId};
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct AckletRecord {
    pub path: PathId,
    pub last_active: SimTime,
}

/// What the store knows about a flow's reverse path at `now`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckletState {
    /// Within the acklet timeout; keep the pinned path.
    Fresh(PathId),
    /// Past the acklet timeout; free to re-select.
    Expired(PathId),
    /// Past the black-hole threshold; move off the pinned path.
    BlackHole(PathId),
    Absent,
}

#[derive(Debug, Default)]
pub struct AckletStore {
    acklets: HashMap<FlowId, AckletRecord>,
}

impl AckletStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, flow: FlowId, now: SimTime, cfg: &AckletConfig) -> AckletState {
        match self.acklets.get(&flow) {
            None => AckletState::Absent,
            Some(a) => {
                let idle = now.saturating_since(a.last_active);
                if idle > cfg.black_hole {
                    AckletState::BlackHole(a.path)
                } else if idle > cfg.timeout {
                    AckletState::Expired(a.path)
                } else {
                    AckletState::Fresh(a.path)
                }
            }
        }
    }

    /// Pins `flow` to `path` and marks it active.
    pub fn pin(&mut self, flow: FlowId, path: PathId, now: SimTime) {
        self.acklets.insert(
            flow,
            AckletRecord {
                path,
                last_active: now,
            },
        );
    }

    pub fn get(&self, flow: FlowId) -> Option<&AckletRecord> {
        self.acklets.get(&flow)
    }

    pub fn len(&self) -> usize {
        self.acklets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.acklets.is_empty()
    }

    /// Drops acklets idle for at least `max_idle`. Returns how many were removed.
    pub fn expire(&mut self, now: SimTime, max_idle: Duration) -> usize {
        let before = self.acklets.len();
        self.acklets
            .retain(|_, a| now.saturating_since(a.last_active) < max_idle);
        before - self.acklets.len()
    }
}
