//! Table sync actor: the single task through which all of a table's
//! updates pass.

use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};
use tokio::{
    sync::{mpsc, oneshot},
    time::{Instant, sleep_until},
};

use super::{
    messages::{SyncMessage, SyncNotification, TableState},
    reconciler::{Discard, Outcome, Reconciler},
};
use crate::{
    config::SyncConfig,
    error::{FeedError, SubmitError, SyncError, SyncResult},
    feed::{FeedHandle, FeedReceiver, FeedUpdate, TableEvent},
    legality::{self, ActionChoices},
    remote::{ActionRequest, Signer, TableInstruction, TransactionId},
    table::{Action, Card, GameState, ParticipantId, SeatIndex, Table, TableId},
};

/// Handle for talking to a table session. Cheap to clone.
#[derive(Clone, Debug)]
pub struct TableHandle {
    sender: mpsc::Sender<SyncMessage>,
    table_id: TableId,
    local: ParticipantId,
    notification_capacity: usize,
    next_subscriber: Arc<AtomicU64>,
}

impl TableHandle {
    fn new(
        sender: mpsc::Sender<SyncMessage>,
        table_id: TableId,
        local: ParticipantId,
        notification_capacity: usize,
    ) -> Self {
        Self {
            sender,
            table_id,
            local,
            notification_capacity: notification_capacity.max(1),
            next_subscriber: Arc::new(AtomicU64::new(1)),
        }
    }

    #[must_use]
    pub fn table_id(&self) -> TableId {
        self.table_id
    }

    #[must_use]
    pub fn local(&self) -> ParticipantId {
        self.local
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Send a message to the session
    pub async fn send(&self, message: SyncMessage) -> SyncResult<()> {
        self.sender
            .send(message)
            .await
            .map_err(|_| SyncError::TableClosed)
    }

    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> SyncMessage) -> SyncResult<T> {
        let (response, rx) = oneshot::channel();
        self.send(build(response)).await?;
        rx.await.map_err(|_| SyncError::TableClosed)
    }

    pub async fn state(&self) -> SyncResult<TableState> {
        self.request(|response| SyncMessage::GetState { response }).await
    }

    pub async fn legal_actions(&self) -> SyncResult<ActionChoices> {
        self.request(|response| SyncMessage::GetLegalActions { response })
            .await?
    }

    /// Submit `action` for the local seat.
    ///
    /// The optimistic table is visible to subscribers before this resolves.
    /// Resolves with the transaction id once the ledger accepts the
    /// transaction; confirmation of its effect arrives later through the
    /// feed.
    pub async fn submit_action(&self, action: Action) -> SyncResult<TransactionId> {
        self.request(|response| SyncMessage::SubmitAction { action, response })
            .await?
    }

    /// Take `seat` at this table. Resolves once the ledger accepts the
    /// transaction; the seat shows up through the feed.
    pub async fn sit(&self, seat: SeatIndex) -> SyncResult<TransactionId> {
        self.instruct(TableInstruction::Sit {
            table_id: self.table_id,
            seat,
        })
        .await
    }

    /// Give up the local seat between hands.
    pub async fn stand(&self) -> SyncResult<TransactionId> {
        self.instruct(TableInstruction::Stand {
            table_id: self.table_id,
        })
        .await
    }

    /// Ask the game program to deal the next hand.
    pub async fn start_hand(&self) -> SyncResult<TransactionId> {
        self.instruct(TableInstruction::StartHand {
            table_id: self.table_id,
        })
        .await
    }

    async fn instruct(&self, instruction: TableInstruction) -> SyncResult<TransactionId> {
        self.request(|response| SyncMessage::SubmitInstruction {
            instruction,
            response,
        })
        .await?
    }

    /// Subscribe to session notifications.
    pub async fn subscribe(&self) -> SyncResult<Subscriber> {
        let subscriber_id = self.next_subscriber.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::channel(self.notification_capacity);
        self.send(SyncMessage::Subscribe {
            subscriber_id,
            sender,
        })
        .await?;
        Ok(Subscriber {
            id: subscriber_id,
            receiver,
        })
    }

    pub async fn unsubscribe(&self, subscriber_id: u64) -> SyncResult<()> {
        self.send(SyncMessage::Unsubscribe { subscriber_id }).await
    }

    /// Close the session. Idempotent.
    pub async fn leave(&self) {
        if self
            .request(|response| SyncMessage::Leave { response })
            .await
            .is_err()
        {
            log::debug!("Table {}: session already closed", self.table_id);
        }
    }
}

/// Receiving end of a session subscription.
#[derive(Debug)]
pub struct Subscriber {
    pub id: u64,
    pub receiver: mpsc::Receiver<SyncNotification>,
}

impl Subscriber {
    pub async fn recv(&mut self) -> Option<SyncNotification> {
        self.receiver.recv().await
    }
}

/// Sync actor owning one table's reconciler and change feed
pub struct TableSyncActor {
    /// Table ID
    id: TableId,

    config: SyncConfig,

    /// Local participant bound to this session
    local: ParticipantId,

    reconciler: Reconciler,

    /// Message inbox
    inbox: mpsc::Receiver<SyncMessage>,

    /// Weak self-sender for signer results
    mailbox: mpsc::WeakSender<SyncMessage>,

    feed: Option<FeedReceiver>,
    feed_handle: Option<FeedHandle>,

    signer: Arc<dyn Signer>,

    /// Caller waiting on `submit_action`, by pending action id
    awaiting_submission: Option<(u64, oneshot::Sender<SyncResult<TransactionId>>)>,

    /// Seats that showed their cards this hand, with the cards shown
    revealed: BTreeMap<SeatIndex, [Card; 2]>,

    is_closed: bool,

    /// State change subscribers (`subscriber_id` -> channel)
    subscribers: HashMap<u64, mpsc::Sender<SyncNotification>>,
}

impl TableSyncActor {
    /// Create a new sync actor
    ///
    /// # Returns
    ///
    /// * `(TableSyncActor, TableHandle)` - Actor and handle for sending messages
    pub fn new(
        id: TableId,
        local: ParticipantId,
        config: SyncConfig,
        feed: (FeedHandle, FeedReceiver),
        signer: Arc<dyn Signer>,
    ) -> (Self, TableHandle) {
        let (sender, inbox) = mpsc::channel(config.inbox_capacity.max(1));
        let (feed_handle, feed) = feed;
        let handle = TableHandle::new(sender.clone(), id, local, config.notification_capacity);

        let actor = Self {
            id,
            config,
            local,
            reconciler: Reconciler::new(id),
            inbox,
            mailbox: sender.downgrade(),
            feed: Some(feed),
            feed_handle: Some(feed_handle),
            signer,
            awaiting_submission: None,
            revealed: BTreeMap::new(),
            is_closed: false,
            subscribers: HashMap::new(),
        };

        (actor, handle)
    }

    /// Run the actor event loop
    pub async fn run(mut self) {
        log::info!("Table {} sync session starting for {}", self.id, self.local.short());

        loop {
            let deadline = self.reconciler.deadline();
            tokio::select! {
                message = self.inbox.recv() => match message {
                    Some(message) => self.handle_message(message),
                    None => break,
                },

                update = next_update(&mut self.feed) => match update {
                    Some(Ok(update)) => self.handle_update(update),
                    Some(Err(e)) => self.handle_interruption(e),
                    None => self.feed = None,
                },

                () = wait_until(deadline) => self.handle_deadline(),
            }

            if self.is_closed {
                break;
            }
        }

        self.close();
        log::info!("Table {} sync session closed", self.id);
    }

    fn handle_message(&mut self, message: SyncMessage) {
        match message {
            SyncMessage::SubmitAction { action, response } => {
                self.handle_submit(action, response);
            }

            SyncMessage::SubmitInstruction {
                instruction,
                response,
            } => {
                self.handle_instruction(instruction, response);
            }

            SyncMessage::GetState { response } => {
                let _ = response.send(self.snapshot_state());
            }

            SyncMessage::GetLegalActions { response } => {
                let _ = response.send(self.legal_actions());
            }

            SyncMessage::Subscribe {
                subscriber_id,
                sender,
            } => {
                self.subscribers.insert(subscriber_id, sender);
                log::debug!("Subscriber {} attached to table {}", subscriber_id, self.id);
            }

            SyncMessage::Unsubscribe { subscriber_id } => {
                self.subscribers.remove(&subscriber_id);
                log::debug!("Subscriber {} detached from table {}", subscriber_id, self.id);
            }

            SyncMessage::Resubscribe { handle, feed } => {
                log::info!("Table {}: change feed resubscribed", self.id);
                if let Some(old) = self.feed_handle.replace(handle) {
                    old.cancel();
                }
                self.feed = Some(feed);
            }

            SyncMessage::SubmissionFinished { action_id, result } => {
                self.handle_submission_result(action_id, result);
            }

            SyncMessage::Leave { response } => {
                self.close();
                let _ = response.send(());
            }
        }
    }

    fn handle_update(&mut self, update: FeedUpdate) {
        let kind = update.kind();
        let before = self.reconciler.confirmed_table().cloned();
        let shown = match &update {
            FeedUpdate::Event(TableEvent::CardRevealed(e)) => Some((e.seat, e.cards)),
            _ => None,
        };

        let outcome = self.reconciler.apply(update);
        if outcome.is_commit() {
            if let Some((seat, cards)) = shown {
                self.revealed.insert(seat, cards);
            }
            if let Some(after) = self.reconciler.confirmed_table().cloned() {
                self.forget_stale_reveals(before.as_deref(), &after);
            }
        }

        match outcome {
            Outcome::Committed => {
                log::debug!("Table {}: applied {}", self.id, kind);
            }
            Outcome::Confirmed(pending) => {
                log::info!(
                    "Table {}: seat {} {} confirmed by {}",
                    self.id,
                    pending.seat,
                    pending.action,
                    kind
                );
                self.notify(SyncNotification::ActionConfirmed {
                    seat: pending.seat,
                    action: pending.action,
                });
            }
            Outcome::Superseded(pending) => {
                log::debug!(
                    "Table {}: {} superseded optimistic {} by seat {}",
                    self.id,
                    kind,
                    pending.action,
                    pending.seat
                );
            }
            Outcome::Buffered => {
                log::debug!("Table {}: buffered {} until baseline", self.id, kind);
                return;
            }
            Outcome::Discarded(Discard::Rejected(violation)) => {
                log::warn!("Table {}: discarding {}: {}", self.id, kind, violation);
                return;
            }
            Outcome::Discarded(discard) => {
                if let Some(e) = discard.error() {
                    log::debug!("Table {}: discarding {}: {}", self.id, kind, e);
                }
                return;
            }
        }

        self.notify_state();
    }

    /// Drop reveals that no longer describe the cards on the table. A new
    /// hand may arrive as a snapshot alone, with none of the events that end
    /// the old one.
    fn forget_stale_reveals(&mut self, before: Option<&Table>, after: &Table) {
        if before.is_some_and(|before| starts_new_hand(before, after)) {
            if !self.revealed.is_empty() {
                log::debug!("Table {}: new hand, hiding revealed cards", self.id);
            }
            self.revealed.clear();
            return;
        }
        self.revealed.retain(|seat, cards| {
            let Some(player) = after.player(*seat) else {
                return false;
            };
            let recommitted = before
                .and_then(|before| before.player(*seat))
                .is_some_and(|old| old.hole_cards_committed != player.hole_cards_committed);
            !recommitted && player.hole_cards == [Some(cards[0]), Some(cards[1])]
        });
    }

    fn handle_interruption(&mut self, error: FeedError) {
        log::warn!("Table {}: {}", self.id, error);
        self.feed = None;
        if let Some(handle) = self.feed_handle.take() {
            handle.cancel();
        }
        self.notify(SyncNotification::FeedInterrupted(error));
    }

    fn handle_submit(&mut self, action: Action, response: oneshot::Sender<SyncResult<TransactionId>>) {
        let seat = match self.local_seat() {
            Some(seat) => seat,
            None if self.reconciler.table().is_none() => {
                let _ = response.send(Err(SyncError::NotSynced));
                return;
            }
            None => {
                let _ = response.send(Err(SyncError::NotSeated));
                return;
            }
        };

        let timeout = self.config.action_timeout;
        let action_id = match self
            .reconciler
            .begin_local_action(seat, action.clone(), Instant::now(), timeout)
        {
            Ok(pending) => pending.id,
            Err(e) => {
                log::debug!("Table {}: refusing {} from seat {}: {}", self.id, action, seat, e);
                let _ = response.send(Err(e));
                return;
            }
        };

        log::info!("Table {}: seat {} {} (optimistic)", self.id, seat, action);
        self.awaiting_submission = Some((action_id, response));
        self.notify_state();

        let request = ActionRequest {
            table_id: self.id,
            actor_seat: seat,
            action,
        };
        let signer = self.signer.clone();
        let mailbox = self.mailbox.clone();
        tokio::spawn(async move {
            let result = signer.sign_and_submit(request).await;
            if let Some(sender) = mailbox.upgrade() {
                let _ = sender
                    .send(SyncMessage::SubmissionFinished { action_id, result })
                    .await;
            }
        });
    }

    fn handle_instruction(
        &self,
        instruction: TableInstruction,
        response: oneshot::Sender<SyncResult<TransactionId>>,
    ) {
        let Some(table) = self.reconciler.table() else {
            let _ = response.send(Err(SyncError::NotSynced));
            return;
        };
        if let Err(e) = legality::check_instruction(table, &self.local, &instruction) {
            log::debug!("Table {}: refusing to {}: {}", self.id, instruction, e);
            let _ = response.send(Err(e.into()));
            return;
        }

        log::info!("Table {}: {} asks to {}", self.id, self.local.short(), instruction);
        let signer = self.signer.clone();
        let table_id = self.id;
        tokio::spawn(async move {
            let result = signer.submit_instruction(instruction).await;
            if let Err(e) = &result {
                log::warn!("Table {}: instruction failed: {}", table_id, e);
            }
            let _ = response.send(result.map_err(SyncError::from));
        });
    }

    fn handle_submission_result(&mut self, action_id: u64, result: Result<TransactionId, SubmitError>) {
        let responder = match self.awaiting_submission.take() {
            Some((id, responder)) if id == action_id => Some(responder),
            other => {
                self.awaiting_submission = other;
                None
            }
        };

        match result {
            Ok(transaction) => {
                log::debug!("Table {}: action {} submitted as {}", self.id, action_id, transaction);
                self.reconciler.record_transaction(action_id, transaction.clone());
                if let Some(responder) = responder {
                    let _ = responder.send(Ok(transaction));
                }
            }
            Err(e) => {
                log::warn!("Table {}: action {} failed: {}", self.id, action_id, e);
                if let Some(pending) = self.reconciler.fail_local_action(action_id) {
                    self.notify_state();
                    self.notify(SyncNotification::ActionRejected {
                        action: pending.action,
                        error: e.clone(),
                    });
                }
                if let Some(responder) = responder {
                    let _ = responder.send(Err(e.into()));
                }
            }
        }
    }

    fn handle_deadline(&mut self) {
        let Some(pending) = self.reconciler.expire(Instant::now()) else {
            return;
        };
        log::warn!(
            "Table {}: seat {} {} unconfirmed after {:?}, reverting",
            self.id,
            pending.seat,
            pending.action,
            self.config.action_timeout
        );
        self.notify_state();
        self.notify(SyncNotification::ActionTimedOut {
            seat: pending.seat,
            action: pending.action,
        });
        if let Some((id, responder)) = self.awaiting_submission.take() {
            if id == pending.id {
                let _ = responder.send(Err(SyncError::ActionTimedOut));
            } else {
                self.awaiting_submission = Some((id, responder));
            }
        }
    }

    fn close(&mut self) {
        if self.is_closed {
            return;
        }
        self.is_closed = true;
        if let Some(pending) = self.reconciler.close() {
            log::debug!("Table {}: dropping unconfirmed {}", self.id, pending.action);
        }
        if let Some(handle) = self.feed_handle.take() {
            handle.cancel();
        }
        self.feed = None;
        if let Some((_, responder)) = self.awaiting_submission.take() {
            let _ = responder.send(Err(SyncError::TableClosed));
        }
        self.subscribers.clear();
    }

    fn local_seat(&self) -> Option<u8> {
        self.reconciler.table()?.seat_of(&self.local)
    }

    fn legal_actions(&self) -> SyncResult<ActionChoices> {
        let table = self.reconciler.table().ok_or(SyncError::NotSynced)?;
        if self.reconciler.pending().is_some() {
            return Ok(ActionChoices::default());
        }
        Ok(legality::evaluate(table, &self.local))
    }

    fn snapshot_state(&self) -> TableState {
        TableState {
            table_id: self.id,
            phase: self.reconciler.phase(),
            table: self.reconciler.table().cloned(),
            local: self.local,
            local_seat: self.local_seat(),
            pending: self.reconciler.pending().map(|p| p.action.clone()),
            revealed: self.revealed.keys().copied().collect(),
        }
    }

    fn notify_state(&mut self) {
        let state = self.snapshot_state();
        self.notify(SyncNotification::StateChanged(state));
    }

    /// Broadcast a notification to all subscribers
    fn notify(&mut self, notification: SyncNotification) {
        let table_id = self.id;
        self.subscribers.retain(|subscriber_id, sender| {
            match sender.try_send(notification.clone()) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    log::warn!(
                        "Table {}: subscriber {} channel full, dropping notification",
                        table_id,
                        subscriber_id
                    );
                    true
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    log::debug!("Table {}: subscriber {} gone, removing", table_id, subscriber_id);
                    false
                }
            }
        });
    }
}

/// Whether `after` belongs to a later hand than `before`.
fn starts_new_hand(before: &Table, after: &Table) -> bool {
    let dealing = matches!(
        after.game_state,
        GameState::Waiting | GameState::Starting | GameState::PreFlop
    );
    (dealing && after.game_state != before.game_state)
        || after.dealer_position != before.dealer_position
}

async fn next_update(feed: &mut Option<FeedReceiver>) -> Option<Result<FeedUpdate, FeedError>> {
    match feed {
        Some(feed) => feed.recv().await,
        None => std::future::pending().await,
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
