use log::{debug, warn};
use tokio::{sync::mpsc, task::JoinHandle};

use super::{FeedUpdate, events::parse_log_batch};
use crate::{
    error::FeedError,
    remote::{Address, RemoteConnection, Subscription},
    table::{TableId, decode_table},
};

/// Receiving half of a table's merged change feed.
pub type FeedReceiver = mpsc::Receiver<Result<FeedUpdate, FeedError>>;

/// Owns the merge task; cancelling or dropping it tears down both remote
/// subscriptions.
#[derive(Debug)]
pub struct FeedHandle {
    table_id: TableId,
    task: Option<JoinHandle<()>>,
}

impl FeedHandle {
    #[must_use]
    pub fn table_id(&self) -> TableId {
        self.table_id
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(JoinHandle::is_finished)
    }

    pub fn cancel(mut self) {
        self.abort();
    }

    fn abort(&mut self) {
        if let Some(task) = self.task.take() {
            debug!("Table {}: cancelling change feed", self.table_id);
            task.abort();
        }
    }
}

impl Drop for FeedHandle {
    fn drop(&mut self) {
        self.abort();
    }
}

/// Merges a table's snapshot subscription and the program's log
/// subscription into one typed stream.
pub struct ChangeFeed;

impl ChangeFeed {
    /// Open both subscriptions and start merging.
    ///
    /// Snapshots that fail to decode and events for other tables are
    /// dropped. The first transport failure on either side is forwarded as
    /// a single `FeedError::Interrupted`, after which the stream ends.
    ///
    /// # Errors
    ///
    /// Fails if either subscription can't be established; nothing is left
    /// running in that case.
    pub async fn subscribe(
        connection: &dyn RemoteConnection,
        table_id: TableId,
        table_address: &Address,
        program_address: &Address,
        capacity: usize,
    ) -> Result<(FeedHandle, FeedReceiver), FeedError> {
        let snapshots = connection.subscribe_snapshots(table_address).await?;
        let logs = connection.subscribe_logs(program_address).await?;
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let task = tokio::spawn(merge(table_id, snapshots, logs, tx));
        debug!("Table {table_id}: change feed subscribed to {table_address}");
        Ok((
            FeedHandle {
                table_id,
                task: Some(task),
            },
            rx,
        ))
    }
}

fn interrupted(error: FeedError) -> FeedError {
    match error {
        FeedError::Subscribe(reason) | FeedError::Interrupted(reason) => {
            FeedError::Interrupted(reason)
        }
    }
}

async fn merge(
    table_id: TableId,
    snapshots: Subscription<Vec<u8>>,
    logs: Subscription<Vec<String>>,
    tx: mpsc::Sender<Result<FeedUpdate, FeedError>>,
) {
    let Subscription {
        receiver: mut snapshot_rx,
        cancel: _snapshot_cancel,
    } = snapshots;
    let Subscription {
        receiver: mut log_rx,
        cancel: _log_cancel,
    } = logs;

    let failure = loop {
        tokio::select! {
            item = snapshot_rx.recv() => match item {
                Some(Ok(bytes)) => match decode_table(&bytes) {
                    Ok(table) if table.table_id != table_id => {
                        warn!("Table {table_id}: ignoring snapshot of table {}", table.table_id);
                    }
                    Ok(table) => {
                        if tx.send(Ok(FeedUpdate::Snapshot(table))).await.is_err() {
                            return;
                        }
                    }
                    Err(e) => warn!("Table {table_id}: discarding undecodable snapshot: {e}"),
                },
                Some(Err(e)) => break interrupted(e),
                None => break FeedError::Interrupted("snapshot subscription closed".to_string()),
            },
            item = log_rx.recv() => match item {
                Some(Ok(lines)) => {
                    for event in parse_log_batch(&lines) {
                        match event {
                            Ok(event) if event.table_id() == table_id => {
                                if tx.send(Ok(FeedUpdate::Event(event))).await.is_err() {
                                    return;
                                }
                            }
                            Ok(_) => {}
                            Err(e) => warn!("Table {table_id}: discarding event: {e}"),
                        }
                    }
                }
                Some(Err(e)) => break interrupted(e),
                None => break FeedError::Interrupted("log subscription closed".to_string()),
            },
        }
    };

    warn!("Table {table_id}: {failure}");
    let _ = tx.send(Err(failure)).await;
}
