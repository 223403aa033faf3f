//! In-memory ledger, directory and signer used by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chain_poker::{
    error::{DirectoryError, FeedError, SubmitError},
    feed::TableEvent,
    remote::{
        ActionRequest, Address, CancelHandle, RemoteConnection, Signer, Subscription,
        TableDirectory, TableInstruction, TableSummary, TransactionId,
    },
    sync::{Subscriber, SyncNotification, TableHandle},
    table::{Card, GameState, ParticipantId, Player, Round, Table, TableId, encode_table},
};
use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};
use tokio::sync::mpsc;

pub const TABLE_ID: TableId = 77;
pub const WAIT: Duration = Duration::from_secs(2);

pub fn participant(n: u8) -> ParticipantId {
    ParticipantId([n; 32])
}

/// Blinds 1000/2000; seat 0 (participant 1) posted the small blind and is on
/// the clock, seat 1 (participant 2) posted the big blind.
pub fn preflop_table(sequence: u64) -> Table {
    let mut table = Table::new(TABLE_ID, participant(1), 1000, 2000, 6, 50_000);
    let mut small = Player::new(participant(1), 0, 49_000);
    small.bet = 1000;
    let mut big = Player::new(participant(2), 1, 48_000);
    big.bet = 2000;
    table.seats[0] = Some(small);
    table.seats[1] = Some(big);
    table.player_count = 2;
    table.game_state = GameState::PreFlop;
    table.small_blind_position = 0;
    table.big_blind_position = 1;
    table.current_actor = Some(0);
    table.pot = 3000;
    table.sequence = sequence;
    table
}

/// Two players seated between hands.
pub fn waiting_table(sequence: u64) -> Table {
    let mut table = Table::new(TABLE_ID, participant(1), 1000, 2000, 6, 50_000);
    table.seats[0] = Some(Player::new(participant(1), 0, 50_000));
    table.seats[1] = Some(Player::new(participant(2), 1, 50_000));
    table.player_count = 2;
    table.sequence = sequence;
    table
}

/// The pre-flop hand run out to showdown with a full board.
pub fn showdown_table(sequence: u64) -> Table {
    let mut table = preflop_table(sequence);
    table.game_state = GameState::Showdown;
    table.round = Round::River;
    table.current_actor = None;
    for (slot, index) in table.community_cards.iter_mut().zip([3, 17, 30, 44, 50]) {
        *slot = Card::from_u8(index);
    }
    table
}

type Senders<T> = Mutex<Vec<mpsc::Sender<Result<T, FeedError>>>>;

/// Ledger that pushes whatever the test tells it to.
#[derive(Default)]
pub struct FakeLedger {
    snapshots: Senders<Vec<u8>>,
    logs: Senders<Vec<String>>,
    cancelled: Arc<AtomicUsize>,
    refuse_logs: Mutex<bool>,
}

impl FakeLedger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn refuse_log_subscriptions(&self, refuse: bool) {
        *self.refuse_logs.lock().unwrap() = refuse;
    }

    pub async fn push_snapshot(&self, table: &Table) {
        let bytes = encode_table(table).unwrap();
        let senders = self.snapshots.lock().unwrap().clone();
        for sender in senders {
            let _ = sender.send(Ok(bytes.clone())).await;
        }
    }

    pub async fn push_raw_snapshot(&self, bytes: Vec<u8>) {
        let senders = self.snapshots.lock().unwrap().clone();
        for sender in senders {
            let _ = sender.send(Ok(bytes.clone())).await;
        }
    }

    pub async fn push_events(&self, events: &[TableEvent]) {
        let mut lines = vec!["Program invoke [1]".to_string()];
        lines.extend(events.iter().map(|e| e.to_log_line().unwrap()));
        lines.push("Program success".to_string());
        let senders = self.logs.lock().unwrap().clone();
        for sender in senders {
            let _ = sender.send(Ok(lines.clone())).await;
        }
    }

    pub async fn break_logs(&self, reason: &str) {
        let senders: Vec<_> = self.logs.lock().unwrap().drain(..).collect();
        for sender in senders {
            let _ = sender.send(Err(FeedError::Interrupted(reason.to_string()))).await;
        }
    }

    pub fn cancelled(&self) -> usize {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn open_subscriptions(&self) -> usize {
        live(&self.snapshots.lock().unwrap()) + live(&self.logs.lock().unwrap())
    }

    fn cancel_handle(&self) -> CancelHandle {
        let cancelled = self.cancelled.clone();
        CancelHandle::new(move || {
            cancelled.fetch_add(1, Ordering::SeqCst);
        })
    }
}

fn live<T>(senders: &[mpsc::Sender<T>]) -> usize {
    senders.iter().filter(|s| !s.is_closed()).count()
}

#[async_trait]
impl RemoteConnection for FakeLedger {
    async fn subscribe_snapshots(
        &self,
        _account: &Address,
    ) -> Result<Subscription<Vec<u8>>, FeedError> {
        let (tx, receiver) = mpsc::channel(16);
        self.snapshots.lock().unwrap().push(tx);
        Ok(Subscription {
            receiver,
            cancel: self.cancel_handle(),
        })
    }

    async fn subscribe_logs(
        &self,
        _program: &Address,
    ) -> Result<Subscription<Vec<String>>, FeedError> {
        if *self.refuse_logs.lock().unwrap() {
            return Err(FeedError::Subscribe("logs unavailable".to_string()));
        }
        let (tx, receiver) = mpsc::channel(16);
        self.logs.lock().unwrap().push(tx);
        Ok(Subscription {
            receiver,
            cancel: self.cancel_handle(),
        })
    }
}

pub struct FakeDirectory {
    tables: Vec<TableSummary>,
}

impl FakeDirectory {
    pub fn with_tables(tables: &[Table]) -> Arc<Self> {
        Arc::new(Self {
            tables: tables.iter().map(TableSummary::from).collect(),
        })
    }
}

#[async_trait]
impl TableDirectory for FakeDirectory {
    async fn list_tables(&self) -> Result<Vec<TableSummary>, DirectoryError> {
        Ok(self.tables.clone())
    }

    async fn table_address(&self, table_id: TableId) -> Result<Address, DirectoryError> {
        self.tables
            .iter()
            .find(|t| t.table_id == table_id)
            .map(|t| Address(format!("table-{}", t.table_id)))
            .ok_or(DirectoryError::UnknownTable(table_id))
    }
}

#[derive(Clone)]
pub enum SignerMode {
    Accept,
    Reject(SubmitError),
    Hang,
}

pub struct FakeSigner {
    mode: Mutex<SignerMode>,
    pub requests: Mutex<Vec<ActionRequest>>,
    pub instructions: Mutex<Vec<TableInstruction>>,
}

impl FakeSigner {
    pub fn new(mode: SignerMode) -> Arc<Self> {
        Arc::new(Self {
            mode: Mutex::new(mode),
            requests: Mutex::new(Vec::new()),
            instructions: Mutex::new(Vec::new()),
        })
    }

    pub fn submitted(&self) -> Vec<ActionRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn instructed(&self) -> Vec<TableInstruction> {
        self.instructions.lock().unwrap().clone()
    }

    fn mode(&self) -> SignerMode {
        self.mode.lock().unwrap().clone()
    }
}

#[async_trait]
impl Signer for FakeSigner {
    async fn sign_and_submit(&self, request: ActionRequest) -> Result<TransactionId, SubmitError> {
        let count = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request);
            requests.len()
        };
        settle(self.mode(), format!("tx-{count}")).await
    }

    async fn submit_instruction(
        &self,
        instruction: TableInstruction,
    ) -> Result<TransactionId, SubmitError> {
        let count = {
            let mut instructions = self.instructions.lock().unwrap();
            instructions.push(instruction);
            instructions.len()
        };
        settle(self.mode(), format!("ix-{count}")).await
    }
}

async fn settle(mode: SignerMode, id: String) -> Result<TransactionId, SubmitError> {
    match mode {
        SignerMode::Accept => Ok(TransactionId(id)),
        SignerMode::Reject(e) => Err(e),
        SignerMode::Hang => std::future::pending().await,
    }
}

/// Subscribe and make sure the session has registered the subscriber.
pub async fn subscribe(handle: &TableHandle) -> Subscriber {
    let subscriber = handle.subscribe().await.unwrap();
    handle.state().await.unwrap();
    subscriber
}

/// Next notification, failing the test if none arrives in time.
pub async fn next(subscriber: &mut Subscriber) -> SyncNotification {
    tokio::time::timeout(WAIT, subscriber.recv())
        .await
        .expect("timed out waiting for notification")
        .expect("session closed")
}

/// Assert nothing arrives within `window`.
pub async fn assert_quiet(subscriber: &mut Subscriber, window: Duration) {
    if let Ok(Some(notification)) = tokio::time::timeout(window, subscriber.recv()).await {
        panic!("unexpected notification: {notification:?}");
    }
}
