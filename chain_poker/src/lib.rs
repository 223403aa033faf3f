//! # Chain Poker
//!
//! Client-side table state synchronization and turn-action engine for a
//! Texas Hold'em game whose authoritative state lives on a ledger.
//!
//! The game program owns the truth. This crate keeps a consistent local
//! view of each joined table by merging two remote channels (account
//! snapshots and program event logs), tells the local player which actions
//! are legal, and shows a submitted action optimistically until the ledger
//! confirms it, reverting if it never does.
//!
//! ## Core Modules
//!
//! - [`table`]: Table model, invariants, account codec and transitions
//! - [`legality`]: Legal action evaluation
//! - [`feed`]: Change feed merging snapshots and events
//! - [`sync`]: Reconciler, per-table sync actor and the store
//! - [`remote`]: Traits for the ledger connection, directory and signer
//!
//! ## Example
//!
//! ```
//! use chain_poker::table::{ParticipantId, Table, decode_table, encode_table};
//!
//! let table = Table::new(1, ParticipantId::default(), 5, 10, 6, 500);
//! let bytes = encode_table(&table).unwrap();
//! assert_eq!(decode_table(&bytes).unwrap(), table);
//! ```

pub mod config;
pub mod error;
pub mod feed;
pub mod legality;
pub mod remote;
pub mod sync;
pub mod table;

pub use config::SyncConfig;
pub use error::{
    DecodeError, DirectoryError, FeedError, SignerError, SubmissionError, SubmitError, SyncError,
    SyncResult,
};
pub use legality::{ActionChoice, ActionChoices, IllegalAction, IllegalInstruction};
pub use sync::{SyncNotification, SyncStore, TableHandle, TableState};
pub use table::{Action, ParticipantId, Table, TableId};
