//! Per-table reconciliation state machine.
//!
//! Merges authoritative remote updates with at most one outstanding local
//! action. The reconciler is synchronous and clock-agnostic: callers pass
//! the current instant in, so the owning actor decides when time passes.

use enum_dispatch::enum_dispatch;
use log::debug;
use serde::{Deserialize, Serialize};
use std::{collections::VecDeque, fmt, mem, sync::Arc, time::Duration};
use tokio::time::Instant;

use crate::{
    error::{SyncError, SyncResult},
    feed::{FeedUpdate, TableEvent},
    remote::TransactionId,
    table::{Action, InvariantViolation, SeatIndex, Table, TableId},
};

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum SyncPhase {
    Unsynced,
    Synced,
    PendingLocalAction,
    Closed,
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let repr = match self {
            Self::Unsynced => "unsynced",
            Self::Synced => "synced",
            Self::PendingLocalAction => "pending",
            Self::Closed => "closed",
        };
        write!(f, "{repr}")
    }
}

/// A local action awaiting remote confirmation.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PendingAction {
    pub id: u64,
    pub seat: SeatIndex,
    pub action: Action,
    pub submitted_at: Instant,
    pub deadline: Instant,
    pub transaction: Option<TransactionId>,
}

impl PendingAction {
    /// Whether `table` shows this action as taken by its seat.
    fn is_reflected_in(&self, update: &FeedUpdate, table: &Table) -> bool {
        match update {
            FeedUpdate::Event(TableEvent::ActionTaken(e)) => {
                e.seat == self.seat && e.action_type == self.action.action_type()
            }
            FeedUpdate::Event(_) => false,
            FeedUpdate::Snapshot(_) => table.player(self.seat).is_some_and(|p| {
                p.has_acted && p.last_action == Some(self.action.action_type())
            }),
        }
    }
}

/// Why an update left the state untouched.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Discard {
    Stale { incoming: u64, current: u64 },
    Rejected(InvariantViolation),
    Closed,
}

impl Discard {
    /// The error this discard corresponds to, if it is worth surfacing.
    #[must_use]
    pub fn error(&self) -> Option<SyncError> {
        match self {
            Self::Stale { incoming, current } => Some(SyncError::StaleUpdate {
                incoming: *incoming,
                current: *current,
            }),
            Self::Rejected(_) => None,
            Self::Closed => Some(SyncError::TableClosed),
        }
    }
}

impl fmt::Display for Discard {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Stale { incoming, current } => {
                write!(f, "stale version {incoming} (have {current})")
            }
            Self::Rejected(violation) => write!(f, "rejected: {violation}"),
            Self::Closed => write!(f, "session closed"),
        }
    }
}

/// Result of feeding one remote update to the reconciler.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Outcome {
    /// A new authoritative table was committed.
    Committed,
    /// Committed, and the update reflects the pending local action.
    Confirmed(PendingAction),
    /// Committed; the pending action was dropped in favour of remote state.
    Superseded(PendingAction),
    /// Held until a baseline snapshot arrives.
    Buffered,
    Discarded(Discard),
}

impl Outcome {
    #[must_use]
    pub fn is_commit(&self) -> bool {
        matches!(
            self,
            Self::Committed | Self::Confirmed(_) | Self::Superseded(_)
        )
    }
}

#[enum_dispatch]
trait ReconcileStep {
    fn phase(&self) -> SyncPhase;

    /// The table a UI should display.
    fn visible(&self) -> Option<&Arc<Table>>;

    /// The last remotely confirmed table.
    fn confirmed(&self) -> Option<&Arc<Table>>;
}

#[derive(Debug, Default)]
struct Unsynced {
    buffer: VecDeque<FeedUpdate>,
}

#[derive(Debug)]
struct Synced {
    table: Arc<Table>,
}

#[derive(Debug)]
struct PendingLocalAction {
    confirmed: Arc<Table>,
    optimistic: Arc<Table>,
    pending: PendingAction,
}

#[derive(Debug)]
struct Closed;

impl ReconcileStep for Unsynced {
    fn phase(&self) -> SyncPhase {
        SyncPhase::Unsynced
    }

    fn visible(&self) -> Option<&Arc<Table>> {
        None
    }

    fn confirmed(&self) -> Option<&Arc<Table>> {
        None
    }
}

impl ReconcileStep for Synced {
    fn phase(&self) -> SyncPhase {
        SyncPhase::Synced
    }

    fn visible(&self) -> Option<&Arc<Table>> {
        Some(&self.table)
    }

    fn confirmed(&self) -> Option<&Arc<Table>> {
        Some(&self.table)
    }
}

impl ReconcileStep for PendingLocalAction {
    fn phase(&self) -> SyncPhase {
        SyncPhase::PendingLocalAction
    }

    fn visible(&self) -> Option<&Arc<Table>> {
        Some(&self.optimistic)
    }

    fn confirmed(&self) -> Option<&Arc<Table>> {
        Some(&self.confirmed)
    }
}

impl ReconcileStep for Closed {
    fn phase(&self) -> SyncPhase {
        SyncPhase::Closed
    }

    fn visible(&self) -> Option<&Arc<Table>> {
        None
    }

    fn confirmed(&self) -> Option<&Arc<Table>> {
        None
    }
}

#[enum_dispatch(ReconcileStep)]
#[derive(Debug)]
enum ReconcileState {
    Unsynced,
    Synced,
    PendingLocalAction,
    Closed,
}

impl Default for ReconcileState {
    fn default() -> Self {
        Self::Closed(Closed)
    }
}

/// Reconciliation state for one table.
#[derive(Debug)]
pub struct Reconciler {
    table_id: TableId,
    state: ReconcileState,
    next_action_id: u64,
}

impl Reconciler {
    #[must_use]
    pub fn new(table_id: TableId) -> Self {
        Self {
            table_id,
            state: Unsynced::default().into(),
            next_action_id: 1,
        }
    }

    #[must_use]
    pub fn table_id(&self) -> TableId {
        self.table_id
    }

    #[must_use]
    pub fn phase(&self) -> SyncPhase {
        self.state.phase()
    }

    /// Optimistic table while an action is pending, confirmed table
    /// otherwise.
    #[must_use]
    pub fn table(&self) -> Option<&Arc<Table>> {
        self.state.visible()
    }

    #[must_use]
    pub fn confirmed_table(&self) -> Option<&Arc<Table>> {
        self.state.confirmed()
    }

    #[must_use]
    pub fn pending(&self) -> Option<&PendingAction> {
        match &self.state {
            ReconcileState::PendingLocalAction(p) => Some(&p.pending),
            _ => None,
        }
    }

    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.pending().map(|p| p.deadline)
    }

    /// Number of updates held while waiting for a baseline.
    #[must_use]
    pub fn buffered(&self) -> usize {
        match &self.state {
            ReconcileState::Unsynced(u) => u.buffer.len(),
            _ => 0,
        }
    }

    /// Merge one remote update.
    pub fn apply(&mut self, update: FeedUpdate) -> Outcome {
        match mem::take(&mut self.state) {
            ReconcileState::Closed(closed) => {
                self.state = closed.into();
                Outcome::Discarded(Discard::Closed)
            }
            ReconcileState::Unsynced(mut unsynced) => match update {
                FeedUpdate::Snapshot(table) => {
                    debug!(
                        "Table {}: baseline at version {}, replaying {} buffered update(s)",
                        self.table_id,
                        table.sequence,
                        unsynced.buffer.len()
                    );
                    self.state = Synced {
                        table: Arc::new(table),
                    }
                    .into();
                    for buffered in unsynced.buffer.drain(..) {
                        if let Outcome::Discarded(reason) = self.apply(buffered) {
                            debug!("Table {}: buffered update {reason}", self.table_id);
                        }
                    }
                    Outcome::Committed
                }
                FeedUpdate::Event(_) => {
                    unsynced.buffer.push_back(update);
                    self.state = unsynced.into();
                    Outcome::Buffered
                }
            },
            ReconcileState::Synced(synced) => match merge(&synced.table, &update) {
                Ok(table) => {
                    self.state = Synced { table }.into();
                    Outcome::Committed
                }
                Err(reason) => {
                    self.state = synced.into();
                    Outcome::Discarded(reason)
                }
            },
            ReconcileState::PendingLocalAction(pending) => {
                match merge(&pending.confirmed, &update) {
                    Ok(table) => {
                        let confirmed = pending.pending.is_reflected_in(&update, &table);
                        self.state = Synced { table }.into();
                        if confirmed {
                            Outcome::Confirmed(pending.pending)
                        } else {
                            Outcome::Superseded(pending.pending)
                        }
                    }
                    Err(reason) => {
                        self.state = pending.into();
                        Outcome::Discarded(reason)
                    }
                }
            }
        }
    }

    /// Apply a local action optimistically and start its confirmation clock.
    ///
    /// # Errors
    ///
    /// Fails unless the session is synced with no other action in flight,
    /// or when the action is illegal for `seat`.
    pub fn begin_local_action(
        &mut self,
        seat: SeatIndex,
        action: Action,
        now: Instant,
        timeout: Duration,
    ) -> SyncResult<&PendingAction> {
        let synced = match mem::take(&mut self.state) {
            ReconcileState::Synced(synced) => synced,
            other => {
                let error = match other.phase() {
                    SyncPhase::Unsynced => SyncError::NotSynced,
                    SyncPhase::PendingLocalAction => SyncError::ActionInFlight,
                    _ => SyncError::TableClosed,
                };
                self.state = other;
                return Err(error);
            }
        };

        let optimistic = match synced.table.apply_action(seat, &action) {
            Ok(table) => Arc::new(table),
            Err(illegal) => {
                self.state = synced.into();
                return Err(illegal.into());
            }
        };

        let id = self.next_action_id;
        self.next_action_id += 1;
        self.state = PendingLocalAction {
            confirmed: synced.table,
            optimistic,
            pending: PendingAction {
                id,
                seat,
                action,
                submitted_at: now,
                deadline: now + timeout,
                transaction: None,
            },
        }
        .into();

        match &self.state {
            ReconcileState::PendingLocalAction(p) => Ok(&p.pending),
            _ => Err(SyncError::TableClosed),
        }
    }

    /// Note the ledger transaction carrying pending action `id`.
    pub fn record_transaction(&mut self, id: u64, transaction: TransactionId) -> bool {
        match &mut self.state {
            ReconcileState::PendingLocalAction(p) if p.pending.id == id => {
                p.pending.transaction = Some(transaction);
                true
            }
            _ => false,
        }
    }

    /// Revert pending action `id` after its submission failed.
    ///
    /// Returns `None` if that action is no longer pending.
    pub fn fail_local_action(&mut self, id: u64) -> Option<PendingAction> {
        self.revert_if(|p| p.id == id)
    }

    /// Revert the pending action if its deadline has passed. Fires at most
    /// once per action.
    pub fn expire(&mut self, now: Instant) -> Option<PendingAction> {
        self.revert_if(|p| now >= p.deadline)
    }

    fn revert_if(&mut self, predicate: impl FnOnce(&PendingAction) -> bool) -> Option<PendingAction> {
        match mem::take(&mut self.state) {
            ReconcileState::PendingLocalAction(p) if predicate(&p.pending) => {
                self.state = Synced { table: p.confirmed }.into();
                Some(p.pending)
            }
            other => {
                self.state = other;
                None
            }
        }
    }

    /// Drop everything; later updates are discarded.
    pub fn close(&mut self) -> Option<PendingAction> {
        match mem::replace(&mut self.state, Closed.into()) {
            ReconcileState::PendingLocalAction(p) => Some(p.pending),
            _ => None,
        }
    }
}

fn merge(current: &Arc<Table>, update: &FeedUpdate) -> Result<Arc<Table>, Discard> {
    match update {
        FeedUpdate::Snapshot(table) if table.sequence > current.sequence => {
            Ok(Arc::new(table.clone()))
        }
        FeedUpdate::Snapshot(table) => Err(Discard::Stale {
            incoming: table.sequence,
            current: current.sequence,
        }),
        FeedUpdate::Event(event) => current
            .apply_event(event)
            .map(Arc::new)
            .map_err(Discard::Rejected),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        feed::events::{ActionTaken, GameStarted, PlayerJoined},
        legality::IllegalAction,
        table::{ActionType, ParticipantId, Player, Round},
    };

    const TIMEOUT: Duration = Duration::from_secs(30);

    fn id(byte: u8) -> ParticipantId {
        ParticipantId([byte; 32])
    }

    /// Blinds 1000/2000, seat 0 posted small blind and is on the clock.
    fn preflop(sequence: u64) -> Table {
        let mut table = Table::new(5, id(1), 1000, 2000, 6, 50_000);
        let mut small = Player::new(id(1), 0, 50_000);
        small.stack -= 1000;
        small.bet = 1000;
        let mut big = Player::new(id(2), 1, 50_000);
        big.stack -= 2000;
        big.bet = 2000;
        table.seats[0] = Some(small);
        table.seats[1] = Some(big);
        table.player_count = 2;
        table.game_state = crate::table::GameState::PreFlop;
        table.small_blind_position = 0;
        table.big_blind_position = 1;
        table.current_actor = Some(0);
        table.pot = 3000;
        table.sequence = sequence;
        table
    }

    /// Seated and between hands.
    fn waiting(sequence: u64) -> Table {
        let mut table = Table::new(5, id(1), 1000, 2000, 6, 50_000);
        table.seats[0] = Some(Player::new(id(1), 0, 50_000));
        table.seats[1] = Some(Player::new(id(2), 1, 50_000));
        table.player_count = 2;
        table.sequence = sequence;
        table
    }

    /// `preflop` after seat 0 called; the clock moved to seat 1.
    fn called(sequence: u64) -> Table {
        let mut table = preflop(sequence);
        if let Some(p) = table.player_mut(0) {
            p.stack = 48_000;
            p.bet = 2000;
            p.has_acted = true;
            p.last_action = Some(ActionType::Call);
        }
        table.current_actor = Some(1);
        table.pot = 4000;
        table
    }

    fn synced(sequence: u64) -> Reconciler {
        let mut reconciler = Reconciler::new(5);
        assert_eq!(
            reconciler.apply(FeedUpdate::Snapshot(preflop(sequence))),
            Outcome::Committed
        );
        reconciler
    }

    fn action_by(seat: SeatIndex, player: u8, action_type: ActionType, amount: u64) -> FeedUpdate {
        FeedUpdate::Event(TableEvent::ActionTaken(ActionTaken {
            table_id: 5,
            player: id(player),
            seat,
            action_type,
            amount,
            new_pot: 3000 + amount,
            round: Round::PreFlop,
        }))
    }

    #[test]
    fn test_starts_unsynced() {
        let reconciler = Reconciler::new(5);
        assert_eq!(reconciler.phase(), SyncPhase::Unsynced);
        assert!(reconciler.table().is_none());
    }

    #[test]
    fn test_events_buffered_until_baseline() {
        let mut reconciler = Reconciler::new(5);
        let joined = FeedUpdate::Event(TableEvent::PlayerJoined(PlayerJoined {
            table_id: 5,
            player: id(3),
            seat: 4,
            stack: 50_000,
        }));
        assert_eq!(reconciler.apply(joined), Outcome::Buffered);
        assert_eq!(reconciler.buffered(), 1);

        assert_eq!(
            reconciler.apply(FeedUpdate::Snapshot(waiting(1))),
            Outcome::Committed
        );
        let table = reconciler.table().unwrap();
        assert_eq!(table.seat_of(&id(3)), Some(4));
        assert_eq!(reconciler.buffered(), 0);
    }

    #[test]
    fn test_buffered_action_already_in_baseline_not_replayed() {
        let mut reconciler = Reconciler::new(5);
        reconciler.apply(action_by(0, 1, ActionType::Call, 1000));
        assert_eq!(
            reconciler.apply(FeedUpdate::Snapshot(called(2))),
            Outcome::Committed
        );

        let table = reconciler.table().unwrap();
        assert_eq!(table.as_ref(), &called(2));
        assert_eq!(table.player(0).unwrap().bet, 2000);
        assert_eq!(table.player(0).unwrap().stack, 48_000);
    }

    #[test]
    fn test_action_in_newer_snapshot_not_reapplied() {
        let mut reconciler = synced(3);
        reconciler.apply(FeedUpdate::Snapshot(called(4)));

        let outcome = reconciler.apply(action_by(0, 1, ActionType::Call, 1000));
        assert_eq!(
            outcome,
            Outcome::Discarded(Discard::Rejected(InvariantViolation::OutOfTurn {
                seat: 0,
                actor: Some(1),
            }))
        );
        let table = reconciler.table().unwrap();
        assert_eq!(table.as_ref(), &called(4));
        assert!(crate::legality::evaluate_seat(table, 1).contains(&Action::Check));
    }

    #[test]
    fn test_invalid_buffered_event_dropped_on_replay() {
        let mut reconciler = Reconciler::new(5);
        let bad = FeedUpdate::Event(TableEvent::GameStarted(GameStarted {
            table_id: 5,
            dealer_position: 0,
            small_blind_position: 4,
            big_blind_position: 5,
        }));
        reconciler.apply(bad);
        reconciler.apply(FeedUpdate::Snapshot(preflop(1)));
        assert_eq!(reconciler.phase(), SyncPhase::Synced);
        assert_eq!(reconciler.table().unwrap().as_ref(), &preflop(1));
    }

    #[test]
    fn test_newer_snapshot_adopted() {
        let mut reconciler = synced(3);
        assert_eq!(
            reconciler.apply(FeedUpdate::Snapshot(preflop(4))),
            Outcome::Committed
        );
        assert_eq!(reconciler.table().unwrap().sequence, 4);
    }

    #[test]
    fn test_stale_snapshot_discarded() {
        let mut reconciler = synced(3);
        let mut old = preflop(3);
        old.pot = 1;
        assert_eq!(
            reconciler.apply(FeedUpdate::Snapshot(old)),
            Outcome::Discarded(Discard::Stale {
                incoming: 3,
                current: 3
            })
        );
        assert_eq!(reconciler.table().unwrap().pot, 3000);
    }

    #[test]
    fn test_invalid_event_discarded() {
        let mut reconciler = synced(3);
        let outcome = reconciler.apply(action_by(0, 9, ActionType::Call, 1000));
        assert!(matches!(
            outcome,
            Outcome::Discarded(Discard::Rejected(InvariantViolation::SeatHolderMismatch { .. }))
        ));
        assert_eq!(reconciler.table().unwrap().as_ref(), &preflop(3));
    }

    #[test]
    fn test_local_raise_is_optimistic() {
        let mut reconciler = synced(3);
        let now = Instant::now();
        let pending = reconciler
            .begin_local_action(0, Action::Raise(5000), now, TIMEOUT)
            .unwrap();
        assert_eq!(pending.deadline, now + TIMEOUT);
        assert_eq!(reconciler.phase(), SyncPhase::PendingLocalAction);
        assert_eq!(reconciler.table().unwrap().pot, 8000);
        assert_eq!(reconciler.confirmed_table().unwrap().pot, 3000);
    }

    #[test]
    fn test_second_action_rejected_while_pending() {
        let mut reconciler = synced(3);
        let now = Instant::now();
        reconciler
            .begin_local_action(0, Action::Call, now, TIMEOUT)
            .unwrap();
        assert_eq!(
            reconciler.begin_local_action(0, Action::Fold, now, TIMEOUT),
            Err(SyncError::ActionInFlight)
        );
    }

    #[test]
    fn test_illegal_action_leaves_state() {
        let mut reconciler = synced(3);
        assert_eq!(
            reconciler.begin_local_action(1, Action::Check, Instant::now(), TIMEOUT),
            Err(SyncError::IllegalAction(IllegalAction::NotYourTurn))
        );
        assert_eq!(reconciler.phase(), SyncPhase::Synced);
    }

    #[test]
    fn test_action_before_baseline_rejected() {
        let mut reconciler = Reconciler::new(5);
        assert_eq!(
            reconciler.begin_local_action(0, Action::Fold, Instant::now(), TIMEOUT),
            Err(SyncError::NotSynced)
        );
    }

    #[test]
    fn test_matching_event_confirms() {
        let mut reconciler = synced(3);
        reconciler
            .begin_local_action(0, Action::Call, Instant::now(), TIMEOUT)
            .unwrap();
        let outcome = reconciler.apply(action_by(0, 1, ActionType::Call, 1000));
        assert!(matches!(outcome, Outcome::Confirmed(ref p) if p.seat == 0));
        assert_eq!(reconciler.phase(), SyncPhase::Synced);
        assert_eq!(reconciler.table().unwrap().pot, 4000);
    }

    #[test]
    fn test_conflicting_event_supersedes_optimistic_table() {
        let mut reconciler = synced(3);
        reconciler
            .begin_local_action(0, Action::Raise(5000), Instant::now(), TIMEOUT)
            .unwrap();
        // Seat 0 folded from another device before the raise landed.
        let outcome = reconciler.apply(action_by(0, 1, ActionType::Fold, 0));
        assert!(matches!(outcome, Outcome::Superseded(_)));
        let table = reconciler.table().unwrap();
        assert_eq!(table.pot, 3000);
        assert_eq!(table.player(0).unwrap().bet, 1000);
    }

    #[test]
    fn test_stale_snapshot_keeps_pending() {
        let mut reconciler = synced(3);
        reconciler
            .begin_local_action(0, Action::Raise(5000), Instant::now(), TIMEOUT)
            .unwrap();
        let outcome = reconciler.apply(FeedUpdate::Snapshot(preflop(2)));
        assert!(matches!(outcome, Outcome::Discarded(Discard::Stale { .. })));
        assert_eq!(reconciler.phase(), SyncPhase::PendingLocalAction);
        assert_eq!(reconciler.table().unwrap().pot, 8000);
    }

    #[test]
    fn test_confirming_snapshot() {
        let mut reconciler = synced(3);
        reconciler
            .begin_local_action(0, Action::Fold, Instant::now(), TIMEOUT)
            .unwrap();
        let mut remote = preflop(4);
        if let Some(p) = remote.player_mut(0) {
            p.has_folded = true;
            p.has_acted = true;
            p.last_action = Some(ActionType::Fold);
        }
        remote.current_actor = Some(1);
        let outcome = reconciler.apply(FeedUpdate::Snapshot(remote));
        assert!(matches!(outcome, Outcome::Confirmed(_)));
    }

    #[test]
    fn test_timeout_reverts_exactly_once() {
        let mut reconciler = synced(3);
        let now = Instant::now();
        reconciler
            .begin_local_action(0, Action::Raise(5000), now, TIMEOUT)
            .unwrap();

        assert_eq!(reconciler.expire(now + Duration::from_secs(29)), None);
        let expired = reconciler.expire(now + TIMEOUT).unwrap();
        assert_eq!(expired.action, Action::Raise(5000));
        assert_eq!(reconciler.table().unwrap().as_ref(), &preflop(3));
        assert_eq!(reconciler.expire(now + TIMEOUT * 2), None);
    }

    #[test]
    fn test_submission_failure_reverts() {
        let mut reconciler = synced(3);
        let action_id = reconciler
            .begin_local_action(0, Action::Call, Instant::now(), TIMEOUT)
            .unwrap()
            .id;
        assert!(reconciler.fail_local_action(action_id + 1).is_none());
        assert!(reconciler.fail_local_action(action_id).is_some());
        assert_eq!(reconciler.phase(), SyncPhase::Synced);
        assert_eq!(reconciler.table().unwrap().as_ref(), &preflop(3));
    }

    #[test]
    fn test_closed_drops_everything() {
        let mut reconciler = synced(3);
        reconciler
            .begin_local_action(0, Action::Call, Instant::now(), TIMEOUT)
            .unwrap();
        assert!(reconciler.close().is_some());
        assert_eq!(
            reconciler.apply(FeedUpdate::Snapshot(preflop(9))),
            Outcome::Discarded(Discard::Closed)
        );
        assert!(reconciler.table().is_none());
    }
}
