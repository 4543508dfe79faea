//! Presence broadcasting: every net change of the online set is pushed, as a
//! full snapshot, to every live connection.

mod broadcaster;

pub use broadcaster::{AnnounceResult, PresenceBroadcaster};
