//! Change feed: remote snapshots and program events for one table.

pub mod adapter;
pub mod events;

pub use adapter::{ChangeFeed, FeedHandle, FeedReceiver};
pub use events::{TableEvent, parse_log_batch, parse_log_line};

use crate::table::Table;

/// One authoritative remote change.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FeedUpdate {
    /// Full account state.
    Snapshot(Table),
    /// Delta emitted by the game program.
    Event(TableEvent),
}

impl FeedUpdate {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Snapshot(_) => "snapshot",
            Self::Event(event) => event.tag(),
        }
    }
}
