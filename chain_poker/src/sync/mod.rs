//! Per-table sync sessions.

pub mod actor;
pub mod messages;
pub mod reconciler;
pub mod store;

pub use actor::{Subscriber, TableHandle, TableSyncActor};
pub use messages::{SyncMessage, SyncNotification, TableState};
pub use reconciler::{Discard, Outcome, PendingAction, Reconciler, SyncPhase};
pub use store::SyncStore;
