//! Sync session message types.

use std::{collections::BTreeSet, sync::Arc};
use tokio::sync::{mpsc, oneshot};

use super::reconciler::SyncPhase;
use crate::{
    error::{FeedError, SubmitError, SyncResult},
    feed::{FeedHandle, FeedReceiver},
    legality::ActionChoices,
    remote::{TableInstruction, TransactionId},
    table::{Action, Card, ParticipantId, SeatIndex, Table, TableId},
};

/// Messages that can be sent to a `TableSyncActor`
#[derive(Debug)]
pub enum SyncMessage {
    /// Submit a local action
    SubmitAction {
        action: Action,
        response: oneshot::Sender<SyncResult<TransactionId>>,
    },

    /// Sign a seat or hand instruction for the local participant
    SubmitInstruction {
        instruction: TableInstruction,
        response: oneshot::Sender<SyncResult<TransactionId>>,
    },

    /// Get current session state
    GetState {
        response: oneshot::Sender<TableState>,
    },

    /// Get the local participant's legal actions
    GetLegalActions {
        response: oneshot::Sender<SyncResult<ActionChoices>>,
    },

    /// Subscribe to session notifications
    Subscribe {
        subscriber_id: u64,
        sender: mpsc::Sender<SyncNotification>,
    },

    /// Unsubscribe from session notifications
    Unsubscribe { subscriber_id: u64 },

    /// Replace an interrupted change feed
    Resubscribe {
        handle: FeedHandle,
        feed: FeedReceiver,
    },

    /// Signer result for a pending action (sent by the session itself)
    SubmissionFinished {
        action_id: u64,
        result: Result<TransactionId, SubmitError>,
    },

    /// Close the session
    Leave { response: oneshot::Sender<()> },
}

/// Notifications pushed to session subscribers
#[derive(Clone, Debug)]
pub enum SyncNotification {
    /// A new table was committed (or an optimistic one projected/reverted)
    StateChanged(TableState),

    /// The ledger reflected the local participant's action
    ActionConfirmed { seat: SeatIndex, action: Action },

    /// A local action went unconfirmed past its deadline and was reverted
    ActionTimedOut { seat: SeatIndex, action: Action },

    /// Signing or submission failed; the optimistic table was reverted
    ActionRejected { action: Action, error: SubmitError },

    /// The change feed stopped; resubscribe to resume
    FeedInterrupted(FeedError),
}

/// Point-in-time view of one table session.
#[derive(Clone, Debug)]
pub struct TableState {
    pub table_id: TableId,
    pub phase: SyncPhase,
    /// Optimistic table while an action is pending.
    pub table: Option<Arc<Table>>,
    pub local: ParticipantId,
    pub local_seat: Option<SeatIndex>,
    pub pending: Option<Action>,
    /// Seats whose hole cards were shown this hand.
    pub revealed: BTreeSet<SeatIndex>,
}

impl TableState {
    #[must_use]
    pub fn is_local_turn(&self) -> bool {
        match (&self.table, self.local_seat) {
            (Some(table), Some(seat)) => table.is_turn(seat),
            _ => false,
        }
    }

    /// Hole cards of `seat` as far as the local participant may see them.
    #[must_use]
    pub fn visible_hole_cards(&self, seat: SeatIndex) -> [Option<Card>; 2] {
        let visible = self.local_seat == Some(seat) || self.revealed.contains(&seat);
        match &self.table {
            Some(table) if visible => table.player(seat).map_or([None; 2], |p| p.hole_cards),
            _ => [None; 2],
        }
    }
}
