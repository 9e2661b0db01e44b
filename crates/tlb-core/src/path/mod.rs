//! Per-path health state.
//!
//! Every (destination group, path) pair the engine has observed owns a
//! [`record::PathRecord`]. The [`classify::Classifier`] turns a record into a
//! [`classify::PathTier`]:
//!
//! ```text
//! Fail  ← high retransmission | very timeout | probing timeout
//! Good  ← low RTT/ECN score and no retransmission/timeout flag
//! Bad   ← high RTT/ECN score | timeout | retransmission
//! Grey  ← everything else
//! ```
//!
//! and the [`select::Selector`] searches the tiers in order.

pub mod classify;
pub mod dre;
pub mod record;
pub mod rtt;
pub mod select;

pub use classify::{Classifier, PathSnapshot, PathTier};
pub use dre::Dre;
pub use record::{PathRecord, PathStore};
pub use select::{Candidate, Selection, Selector, TieBreak};
