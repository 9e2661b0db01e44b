//! Path-selection observability hooks.
//!
//! One callback slot per event type, invoked synchronously from inside the
//! engine call that made the decision.

use crate::path::{Candidate, PathSnapshot};
use crate::topology::{FlowId, GroupId, PathId};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct PathSelectedEvent {
    pub flow: FlowId,
    pub src_group: Option<GroupId>,
    pub dst_group: GroupId,
    pub path: PathId,
    pub random_fallback: bool,
    pub snapshot: PathSnapshot,
    pub parallel: Vec<Candidate>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PathChangedEvent {
    pub flow: FlowId,
    pub src_group: Option<GroupId>,
    pub dst_group: GroupId,
    pub new_path: PathId,
    pub old_path: PathId,
    pub random_fallback: bool,
    pub parallel: Vec<Candidate>,
}

type Slot<E> = Option<Box<dyn FnMut(&E) + Send>>;

#[derive(Default)]
pub struct Observers {
    path_selected: Slot<PathSelectedEvent>,
    path_changed: Slot<PathChangedEvent>,
}

impl Observers {
    pub fn set_path_selected(&mut self, f: impl FnMut(&PathSelectedEvent) + Send + 'static) {
        self.path_selected = Some(Box::new(f));
    }

    pub fn set_path_changed(&mut self, f: impl FnMut(&PathChangedEvent) + Send + 'static) {
        self.path_changed = Some(Box::new(f));
    }

    pub fn wants_path_selected(&self) -> bool {
        self.path_selected.is_some()
    }

    pub fn wants_path_changed(&self) -> bool {
        self.path_changed.is_some()
    }

    pub fn emit_path_selected(&mut self, event: &PathSelectedEvent) {
        if let Some(f) = self.path_selected.as_mut() {
            f(event);
        }
    }

    pub fn emit_path_changed(&mut self, event: &PathChangedEvent) {
        if let Some(f) = self.path_changed.as_mut() {
            f(event);
        }
    }
}

impl std::fmt::Debug for Observers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observers")
            .field("path_selected", &self.path_selected.is_some())
            .field("path_changed", &self.path_changed.is_some())
            .finish()
    }
}
