//! Static address → group → admissible-path tables.
//!
//! Populated once at setup by the topology collaborator. Paths are enumerated
//! per destination group (rack), never per address.

use crate::error::TlbError;
use std::collections::HashMap;
use std::net::IpAddr;

pub type FlowId = u64;
pub type GroupId = u32;
pub type PathId = u32;

#[derive(Debug, Default, Clone)]
pub struct Topology {
    groups: HashMap<IpAddr, GroupId>,
    paths: HashMap<GroupId, Vec<PathId>>,
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_address_with_group(&mut self, addr: IpAddr, group: GroupId) {
        if let Some(prev) = self.groups.insert(addr, group) {
            if prev != group {
                tracing::debug!(%addr, prev, group, "address moved to a new group");
            }
        }
    }

    /// Registers `path` as admissible toward `group`. Duplicates are ignored.
    pub fn add_available_path(&mut self, group: GroupId, path: PathId) {
        let paths = self.paths.entry(group).or_default();
        if !paths.contains(&path) {
            paths.push(path);
        }
    }

    pub fn group_of(&self, addr: IpAddr) -> Result<GroupId, TlbError> {
        self.groups
            .get(&addr)
            .copied()
            .ok_or(TlbError::LookupFailure { addr })
    }

    pub fn paths_for_group(&self, group: GroupId) -> Result<&[PathId], TlbError> {
        match self.paths.get(&group) {
            Some(paths) if !paths.is_empty() => Ok(paths),
            _ => Err(TlbError::NoPathsForGroup { group }),
        }
    }

    /// Admissible paths toward the group `addr` resolves to.
    pub fn get_available_paths(&self, addr: IpAddr) -> Result<&[PathId], TlbError> {
        let group = self.group_of(addr)?;
        self.paths_for_group(group)
    }

    pub fn groups(&self) -> impl Iterator<Item = (GroupId, &[PathId])> {
        self.paths.iter().map(|(g, p)| (*g, p.as_slice()))
    }
}
