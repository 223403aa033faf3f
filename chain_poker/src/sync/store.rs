//! Sync store: spawns and tracks one sync session per joined table.

use std::{collections::HashMap, sync::Arc};
use tokio::sync::RwLock;

use super::{
    actor::{TableHandle, TableSyncActor},
    messages::SyncMessage,
};
use crate::{
    config::SyncConfig,
    error::{SyncError, SyncResult},
    feed::{ChangeFeed, FeedHandle, FeedReceiver},
    remote::{Address, RemoteConnection, Signer, TableDirectory, TableSummary},
    table::{ParticipantId, TableId},
};

/// Holder of every table session in the process.
pub struct SyncStore {
    /// Shared ledger connection
    connection: Arc<dyn RemoteConnection>,

    directory: Arc<dyn TableDirectory>,

    signer: Arc<dyn Signer>,

    /// Game program whose logs carry table events
    program: Address,

    config: SyncConfig,

    /// Active session handles
    tables: Arc<RwLock<HashMap<TableId, TableHandle>>>,
}

impl SyncStore {
    pub fn new(
        connection: Arc<dyn RemoteConnection>,
        directory: Arc<dyn TableDirectory>,
        signer: Arc<dyn Signer>,
        program: Address,
        config: SyncConfig,
    ) -> Self {
        Self {
            connection,
            directory,
            signer,
            program,
            config,
            tables: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    #[must_use]
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Open tables as reported by the directory.
    pub async fn list_tables(&self) -> SyncResult<Vec<TableSummary>> {
        Ok(self.directory.list_tables().await?)
    }

    /// Start a session for `table_id` bound to `local`.
    ///
    /// The session is unsynced until the table's first snapshot arrives.
    pub async fn join_table(&self, table_id: TableId, local: ParticipantId) -> SyncResult<TableHandle> {
        if self.tables.read().await.contains_key(&table_id) {
            return Err(SyncError::AlreadyJoined(table_id));
        }

        let feed = self.open_feed(table_id).await?;

        let mut tables = self.tables.write().await;
        if tables.contains_key(&table_id) {
            // Lost a race with a concurrent join; `feed` is cancelled on drop.
            return Err(SyncError::AlreadyJoined(table_id));
        }

        let (actor, handle) =
            TableSyncActor::new(table_id, local, self.config.clone(), feed, self.signer.clone());
        tokio::spawn(actor.run());
        tables.insert(table_id, handle.clone());

        log::info!("Joined table {} as {}", table_id, local.short());
        Ok(handle)
    }

    /// Close the session for `table_id`.
    pub async fn leave_table(&self, table_id: TableId) -> SyncResult<()> {
        let handle = self
            .tables
            .write()
            .await
            .remove(&table_id)
            .ok_or(SyncError::TableNotFound(table_id))?;
        handle.leave().await;
        log::info!("Left table {}", table_id);
        Ok(())
    }

    /// Replace a table's change feed after an interruption.
    pub async fn resubscribe(&self, table_id: TableId) -> SyncResult<()> {
        let handle = self
            .get_table(table_id)
            .await
            .ok_or(SyncError::TableNotFound(table_id))?;
        let (feed_handle, feed) = self.open_feed(table_id).await?;
        handle
            .send(SyncMessage::Resubscribe {
                handle: feed_handle,
                feed,
            })
            .await
    }

    pub async fn get_table(&self, table_id: TableId) -> Option<TableHandle> {
        self.tables.read().await.get(&table_id).cloned()
    }

    pub async fn joined_tables(&self) -> Vec<TableId> {
        let mut ids: Vec<_> = self.tables.read().await.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Leave every joined table.
    pub async fn shutdown(&self) {
        let handles: Vec<_> = self.tables.write().await.drain().map(|(_, h)| h).collect();
        for handle in handles {
            handle.leave().await;
        }
    }

    async fn open_feed(&self, table_id: TableId) -> SyncResult<(FeedHandle, FeedReceiver)> {
        let address = self.directory.table_address(table_id).await?;
        let feed = ChangeFeed::subscribe(
            self.connection.as_ref(),
            table_id,
            &address,
            &self.program,
            self.config.feed_capacity,
        )
        .await?;
        Ok(feed)
    }
}
