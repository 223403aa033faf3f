use thiserror::Error;

use crate::{
    legality::{IllegalAction, IllegalInstruction},
    table::{InvariantViolation, TableId},
};

/// Failures turning remote bytes or log lines into typed values.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("account discriminator {found:02x?} is not a table account")]
    Discriminator { found: Vec<u8> },
    #[error("unsupported table schema version {found} (expected {expected})")]
    SchemaVersion { expected: u8, found: u8 },
    #[error("account data truncated at {0} bytes")]
    Truncated(usize),
    #[error("table body: {0}")]
    Body(#[from] bincode::error::DecodeError),
    #[error("{0} unexpected trailing bytes after table body")]
    TrailingBytes(usize),
    #[error("decoded table is invalid: {0}")]
    Invariant(#[from] InvariantViolation),
    #[error("malformed {tag} payload: {source}")]
    EventPayload {
        tag: String,
        source: serde_json::Error,
    },
}

/// Failures of the remote change feed.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum FeedError {
    #[error("subscription could not be established: {0}")]
    Subscribe(String),
    #[error("feed interrupted: {0}")]
    Interrupted(String),
}

/// The signing capability refused or failed to sign.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum SignerError {
    #[error("no signer available")]
    Unavailable,
    #[error("signing declined: {0}")]
    Declined(String),
    #[error("signer failure: {0}")]
    Failed(String),
}

/// The ledger did not accept a signed transaction.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum SubmissionError {
    #[error("transaction rejected: {0}")]
    Rejected(String),
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("unexpected response: {0}")]
    InvalidResponse(String),
}

/// Either half of signing-and-submitting can fail.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum SubmitError {
    #[error(transparent)]
    Signer(#[from] SignerError),
    #[error(transparent)]
    Submission(#[from] SubmissionError),
}

/// Table discovery failures.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum DirectoryError {
    #[error("table {0} does not exist")]
    UnknownTable(TableId),
    #[error("table directory unavailable: {0}")]
    Unavailable(String),
}

/// Errors surfaced by a table sync session.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum SyncError {
    #[error("snapshot version {incoming} is not newer than {current}")]
    StaleUpdate { incoming: u64, current: u64 },
    #[error(transparent)]
    FeedInterrupted(#[from] FeedError),
    #[error(transparent)]
    Signer(SignerError),
    #[error(transparent)]
    Submission(SubmissionError),
    #[error("action was not confirmed in time")]
    ActionTimedOut,
    #[error(transparent)]
    IllegalAction(#[from] IllegalAction),
    #[error(transparent)]
    IllegalInstruction(#[from] IllegalInstruction),
    #[error("local participant is not seated")]
    NotSeated,
    #[error("another action is already awaiting confirmation")]
    ActionInFlight,
    #[error("table has not been synchronized yet")]
    NotSynced,
    #[error(transparent)]
    Directory(#[from] DirectoryError),
    #[error("table {0} is not joined")]
    TableNotFound(TableId),
    #[error("table {0} is already joined")]
    AlreadyJoined(TableId),
    #[error("table session closed")]
    TableClosed,
}

impl From<SubmitError> for SyncError {
    fn from(value: SubmitError) -> Self {
        match value {
            SubmitError::Signer(e) => Self::Signer(e),
            SubmitError::Submission(e) => Self::Submission(e),
        }
    }
}

pub type SyncResult<T> = Result<T, SyncError>;
