//! Capabilities the sync engine needs from the outside world.
//!
//! The engine never talks to the network or holds keys itself. The client
//! binary plugs in a ledger connection, a table directory and a signer;
//! tests plug in in-memory fakes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::{sync::mpsc, task::JoinHandle};

use crate::{
    error::{DirectoryError, FeedError, SubmitError},
    table::{Action, Chips, SeatIndex, Table, TableId},
};

/// A ledger account address in its textual form.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Address(pub String);

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Address {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Ledger transaction identifier returned on acceptance.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(transparent)]
pub struct TransactionId(pub String);

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A player action ready to be signed.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ActionRequest {
    pub table_id: TableId,
    pub actor_seat: SeatIndex,
    pub action: Action,
}

/// Seat and hand management on behalf of the local participant.
///
/// Unlike actions these are never shown optimistically; the table changes
/// once the ledger reports it.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(tag = "instruction", rename_all = "snake_case")]
pub enum TableInstruction {
    /// Buy in and take `seat`.
    Sit { table_id: TableId, seat: SeatIndex },
    /// Give up the seat between hands.
    Stand { table_id: TableId },
    /// Deal the next hand.
    StartHand { table_id: TableId },
}

impl TableInstruction {
    #[must_use]
    pub fn table_id(&self) -> TableId {
        match self {
            Self::Sit { table_id, .. } | Self::Stand { table_id } | Self::StartHand { table_id } => {
                *table_id
            }
        }
    }
}

impl fmt::Display for TableInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sit { seat, .. } => write!(f, "sit at seat {seat}"),
            Self::Stand { .. } => write!(f, "stand up"),
            Self::StartHand { .. } => write!(f, "start the hand"),
        }
    }
}

/// Directory listing entry for an open table.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct TableSummary {
    pub table_id: TableId,
    pub small_blind: Chips,
    pub big_blind: Chips,
    pub player_count: u8,
    pub max_players: u8,
    pub buy_in: Chips,
}

impl From<&Table> for TableSummary {
    fn from(table: &Table) -> Self {
        Self {
            table_id: table.table_id,
            small_blind: table.small_blind,
            big_blind: table.big_blind,
            player_count: table.player_count,
            max_players: table.max_players,
            buy_in: table.buy_in,
        }
    }
}

/// Stops a remote subscription when cancelled or dropped.
pub struct CancelHandle(Option<Box<dyn FnOnce() + Send>>);

impl CancelHandle {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self(Some(Box::new(cancel)))
    }

    /// Cancel by aborting the task that drives the subscription.
    #[must_use]
    pub fn from_task(task: JoinHandle<()>) -> Self {
        Self::new(move || task.abort())
    }

    pub fn cancel(mut self) {
        if let Some(cancel) = self.0.take() {
            cancel();
        }
    }
}

impl Drop for CancelHandle {
    fn drop(&mut self) {
        if let Some(cancel) = self.0.take() {
            cancel();
        }
    }
}

impl fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CancelHandle").field(&self.0.is_some()).finish()
    }
}

/// A live stream of remote items plus the means to stop it.
///
/// The stream ends with at most one `Err`, after which the sender is
/// dropped.
#[derive(Debug)]
pub struct Subscription<T> {
    pub receiver: mpsc::Receiver<Result<T, FeedError>>,
    pub cancel: CancelHandle,
}

/// Push-based access to ledger state.
#[async_trait]
pub trait RemoteConnection: Send + Sync {
    /// Raw account data of `account` each time it changes.
    async fn subscribe_snapshots(&self, account: &Address)
    -> Result<Subscription<Vec<u8>>, FeedError>;

    /// Log lines of every transaction that touches `program`, one batch per
    /// transaction.
    async fn subscribe_logs(&self, program: &Address)
    -> Result<Subscription<Vec<String>>, FeedError>;
}

/// Discovery of open tables.
#[async_trait]
pub trait TableDirectory: Send + Sync {
    async fn list_tables(&self) -> Result<Vec<TableSummary>, DirectoryError>;

    async fn table_address(&self, table_id: TableId) -> Result<Address, DirectoryError>;
}

/// Signs transactions on the local participant's behalf and submits them.
#[async_trait]
pub trait Signer: Send + Sync {
    async fn sign_and_submit(&self, request: ActionRequest) -> Result<TransactionId, SubmitError>;

    async fn submit_instruction(
        &self,
        instruction: TableInstruction,
    ) -> Result<TransactionId, SubmitError>;
}
