use crate::topology::{FlowId, GroupId, PathId};
use std::net::IpAddr;
use thiserror::Error;

/// Failures reported by the engine.
///
/// None of these are fatal: the engine logs them where they are detected and
/// hands them back so the caller can decide whether to hold the packet.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TlbError {
    #[error("no destination group registered for address {addr}")]
    LookupFailure { addr: IpAddr },
    #[error("no admissible paths registered for group {group}")]
    NoPathsForGroup { group: GroupId },
    #[error("path {path} is not admissible toward group {group}")]
    UnknownPath { group: GroupId, path: PathId },
    #[error("flow {flow} is no longer assigned to path {path}")]
    StaleAssignment { flow: FlowId, path: PathId },
    #[error("unknown flow {flow}")]
    UnknownFlow { flow: FlowId },
    #[error("no candidate path for group {group}")]
    ExhaustedCandidates { group: GroupId },
}

impl TlbError {
    /// Lookup-class failures mean the caller must not send this packet.
    pub fn is_lookup(&self) -> bool {
        matches!(
            self,
            TlbError::LookupFailure { .. }
                | TlbError::NoPathsForGroup { .. }
                | TlbError::UnknownPath { .. }
                | TlbError::ExhaustedCandidates { .. }
        )
    }

    pub fn is_stale(&self) -> bool {
        matches!(self, TlbError::StaleAssignment { .. })
    }
}
